//! WS wire framing for provider B (§4.4, §6): each binary frame is a
//! sequence of `{kind: u8, varint_len, payload[len]}` records. Like
//! `streamcore-spotify::proto`, these are hand-written structs with
//! explicit encode/decode rather than `prost`-generated protobuf types —
//! the shapes this rework needs (`Payload{msg_id, msg_date, dests, payload}`,
//! `QConnectBatch{version, ts_ms, proto, seq, messages}`) are fixed binary
//! layouts with no need for a schema compiler in the build.

use bytes::{Buf, BufMut, BytesMut};

pub const KIND_AUTHENTICATE: u8 = 0x02;
pub const KIND_PAYLOAD: u8 = 0x03;
pub const KIND_SUBSCRIBE: u8 = 0x04;
pub const KIND_PING: u8 = 0x05;
pub const KIND_PONG: u8 = 0x06;

/// One `{kind, varint_len, payload}` record (§4.4 "Outbound envelope").
pub struct Record {
    pub kind: u8,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(1 + 5 + self.payload.len());
        buf.put_u8(self.kind);
        put_varint(&mut buf, self.payload.len() as u64);
        buf.put_slice(&self.payload);
        buf.to_vec()
    }

    pub fn decode(mut bytes: &[u8]) -> Option<(Self, usize)> {
        let total_len = bytes.len();
        if bytes.remaining() < 1 {
            return None;
        }
        let kind = bytes.get_u8();
        let len = get_varint(&mut bytes)? as usize;
        if bytes.remaining() < len {
            return None;
        }
        let payload = bytes[..len].to_vec();
        let consumed = total_len - bytes.remaining() + len;
        Some((Record { kind, payload }, consumed))
    }
}

fn put_varint(buf: &mut BytesMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

fn get_varint(bytes: &mut &[u8]) -> Option<u64> {
    let mut value = 0u64;
    let mut shift = 0;
    loop {
        if bytes.remaining() < 1 || shift >= 64 {
            return None;
        }
        let byte = bytes.get_u8();
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Some(value);
        }
        shift += 7;
    }
}

/// The `Payload{msg_id, msg_date, dests[], payload[]}` envelope carried by
/// every `KIND_PAYLOAD` record.
pub struct Payload {
    pub msg_id: u64,
    pub msg_date_ms: i64,
    pub dests: Vec<[u8; 16]>,
    pub batch: Vec<u8>,
}

impl Payload {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u64(self.msg_id);
        buf.put_i64(self.msg_date_ms);
        buf.put_u16(self.dests.len() as u16);
        for dest in &self.dests {
            buf.put_slice(dest);
        }
        buf.put_u32(self.batch.len() as u32);
        buf.put_slice(&self.batch);
        buf.to_vec()
    }

    pub fn decode(mut bytes: &[u8]) -> Option<Self> {
        if bytes.remaining() < 8 + 8 + 2 {
            return None;
        }
        let msg_id = bytes.get_u64();
        let msg_date_ms = bytes.get_i64();
        let dest_count = bytes.get_u16() as usize;
        let mut dests = Vec::with_capacity(dest_count);
        for _ in 0..dest_count {
            if bytes.remaining() < 16 {
                return None;
            }
            let mut dest = [0u8; 16];
            bytes.copy_to_slice(&mut dest);
            dests.push(dest);
        }
        if bytes.remaining() < 4 {
            return None;
        }
        let batch_len = bytes.get_u32() as usize;
        if bytes.remaining() < batch_len {
            return None;
        }
        let batch = bytes[..batch_len].to_vec();
        Some(Payload { msg_id, msg_date_ms, dests, batch })
    }
}

/// Destination marking "the controller" (§4.8 "destination list `[[0x02]]`").
pub fn controller_destination() -> [u8; 16] {
    let mut dest = [0u8; 16];
    dest[0] = 0x02;
    dest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trips_through_encode_decode() {
        let record = Record { kind: KIND_PAYLOAD, payload: b"hello".to_vec() };
        let encoded = record.encode();
        let (decoded, consumed) = Record::decode(&encoded).unwrap();
        assert_eq!(decoded.kind, KIND_PAYLOAD);
        assert_eq!(decoded.payload, b"hello");
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn varint_handles_multi_byte_lengths() {
        let payload = vec![0u8; 300];
        let record = Record { kind: KIND_SUBSCRIBE, payload };
        let encoded = record.encode();
        let (decoded, _) = Record::decode(&encoded).unwrap();
        assert_eq!(decoded.payload.len(), 300);
    }

    #[test]
    fn payload_round_trips_with_destinations() {
        let payload = Payload {
            msg_id: 42,
            msg_date_ms: 1_700_000_000_000,
            dests: vec![controller_destination()],
            batch: b"batch-bytes".to_vec(),
        };
        let encoded = payload.encode();
        let decoded = Payload::decode(&encoded).unwrap();
        assert_eq!(decoded.msg_id, 42);
        assert_eq!(decoded.dests, vec![controller_destination()]);
        assert_eq!(decoded.batch, b"batch-bytes");
    }

    #[test]
    fn decode_rejects_truncated_records() {
        let mut bytes = vec![KIND_PAYLOAD, 200];
        bytes.extend_from_slice(&[0u8; 5]);
        assert!(Record::decode(&bytes).is_none());
    }
}
