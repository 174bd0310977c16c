//! Wire message shapes for the provider-A handshake and mercury layer
//! (§4.3, §6). These are hand-written structs with explicit byte-level
//! encode/decode rather than `prost`-generated protobuf types: the
//! messages this rework needs are all fixed-width or length-prefixed
//! binary shapes (a 96-byte public key, a 16-byte nonce, mercury's
//! `seq | cmd | part-count | parts` framing), so there is nothing a
//! generated protobuf type buys over a plain struct here, and it avoids
//! pulling a `protoc` build step into the workspace for messages this
//! simple. Every message is wrapped into a domain struct at the session
//! boundary and never leaks a generated type.

use bytes::{Buf, BufMut, BytesMut};

/// `ClientHello` (§4.3): our half of the DH handshake.
pub struct ClientHello {
    pub client_nonce: [u8; 16],
    pub public_key: [u8; 96],
}

impl ClientHello {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(16 + 96);
        buf.put_slice(&self.client_nonce);
        buf.put_slice(&self.public_key);
        buf.to_vec()
    }
}

/// `APResponseMessage` (§4.3): the AP's half — its own public key, nonce,
/// and an RSA-SHA1 signature over the handshake transcript.
pub struct ApResponseMessage {
    pub ap_nonce: [u8; 16],
    pub public_key: [u8; 96],
    pub signature: Vec<u8>,
}

impl ApResponseMessage {
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 16 + 96 + 2 {
            return None;
        }
        let mut cursor = bytes;
        let mut ap_nonce = [0u8; 16];
        cursor.copy_to_slice(&mut ap_nonce);
        let mut public_key = [0u8; 96];
        cursor.copy_to_slice(&mut public_key);
        let sig_len = cursor.get_u16() as usize;
        if cursor.remaining() < sig_len {
            return None;
        }
        let signature = cursor[..sig_len].to_vec();
        Some(ApResponseMessage { ap_nonce, public_key, signature })
    }
}

/// Mercury request header kinds (§4.3 "a header of kind {GET, SEND, SUB,
/// UNSUB}").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MercuryKind {
    Get,
    Send,
    Sub,
    Unsub,
}

impl MercuryKind {
    fn as_u8(self) -> u8 {
        match self {
            MercuryKind::Get => 0,
            MercuryKind::Send => 1,
            MercuryKind::Sub => 2,
            MercuryKind::Unsub => 3,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(MercuryKind::Get),
            1 => Some(MercuryKind::Send),
            2 => Some(MercuryKind::Sub),
            3 => Some(MercuryKind::Unsub),
            _ => None,
        }
    }
}

/// A mercury request: 64-bit sequence, kind, URI, and zero or more part
/// blobs (§4.3).
pub struct MercuryRequest {
    pub seq: u64,
    pub kind: MercuryKind,
    pub uri: String,
    pub parts: Vec<Vec<u8>>,
}

impl MercuryRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u64(self.seq);
        buf.put_u8(self.kind.as_u8());
        buf.put_u16(self.uri.len() as u16);
        buf.put_slice(self.uri.as_bytes());
        buf.put_u16(self.parts.len() as u16);
        for part in &self.parts {
            buf.put_u32(part.len() as u32);
            buf.put_slice(part);
        }
        buf.to_vec()
    }
}

/// A mercury response or push notification: a sequence, a header echo,
/// zero or more parts, and — for push notifications only — the URI the
/// push targets, since a push's seq is unrelated to the `SUB` request's
/// seq and the session demultiplexes pushes by `uri_prefix` instead
/// (§4.3 "the session keeps a map `seq → callback` and a map
/// `uri_prefix → subscription_callback` for push notifications").
pub struct MercuryResponse {
    pub seq: u64,
    pub status_code: u16,
    pub uri: Option<String>,
    pub parts: Vec<Vec<u8>>,
}

impl MercuryResponse {
    pub fn decode(mut bytes: &[u8]) -> Option<Self> {
        if bytes.remaining() < 12 {
            return None;
        }
        let seq = bytes.get_u64();
        let status_code = bytes.get_u16();
        let uri_len = bytes.get_u16() as usize;
        if bytes.remaining() < uri_len {
            return None;
        }
        let uri = if uri_len == 0 {
            None
        } else {
            let bytes = bytes[..uri_len].to_vec();
            Some(String::from_utf8(bytes).ok()?)
        };
        bytes.advance(uri_len);
        let part_count = if bytes.remaining() >= 2 { bytes.get_u16() } else { 0 };
        let mut parts = Vec::with_capacity(part_count as usize);
        for _ in 0..part_count {
            if bytes.remaining() < 4 {
                break;
            }
            let len = bytes.get_u32() as usize;
            if bytes.remaining() < len {
                break;
            }
            parts.push(bytes[..len].to_vec());
            bytes.advance(len);
        }
        Some(MercuryResponse { seq, status_code, uri, parts })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Audio-key mini-protocol request (§4.3 "request carries (track_gid,
/// file_gid, 32-bit seq)").
pub struct AudioKeyRequest {
    pub track_gid: Vec<u8>,
    pub file_gid: Vec<u8>,
    pub seq: u32,
}

impl AudioKeyRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(self.file_gid.len() as u8);
        buf.put_slice(&self.file_gid);
        buf.put_u8(self.track_gid.len() as u8);
        buf.put_slice(&self.track_gid);
        buf.put_u32(self.seq);
        buf.to_vec()
    }
}

/// Audio-key response: either the 16-byte content key (`AES_KEY`, cmd
/// `0x0d`) or a failure code (`AES_KEY_ERROR`, cmd `0x0e`).
pub enum AudioKeyResponse {
    Key { seq: u32, key: [u8; 16] },
    Failure { seq: u32, code: u16 },
}

impl AudioKeyResponse {
    pub fn decode(cmd: u8, mut bytes: &[u8]) -> Option<Self> {
        match cmd {
            0x0d if bytes.remaining() >= 4 + 16 => {
                let seq = bytes.get_u32();
                let mut key = [0u8; 16];
                bytes.copy_to_slice(&mut key);
                Some(AudioKeyResponse::Key { seq, key })
            }
            0x0e if bytes.remaining() >= 4 + 2 => {
                let seq = bytes.get_u32();
                let code = bytes.get_u16();
                Some(AudioKeyResponse::Failure { seq, code })
            }
            _ => None,
        }
    }
}

/// The richer `PlayerState` a `PutStateRequest` carries, supplementing
/// the distilled spec from `original_source`'s `DeviceStateHandler.cpp` /
/// `PlayerContext.cpp`: position, playback speed, repeat/shuffle context,
/// and the three-way playing/paused/buffering flags.
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub position_ms: u64,
    pub playback_speed: f64,
    pub is_playing: bool,
    pub is_paused: bool,
    pub is_buffering: bool,
    pub repeat_context: bool,
    pub repeat_track: bool,
    pub shuffle: bool,
    pub queue_index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ap_response_round_trips_through_decode() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&[7u8; 16]);
        bytes.extend_from_slice(&[9u8; 96]);
        let sig = vec![1, 2, 3, 4];
        bytes.extend_from_slice(&(sig.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&sig);

        let decoded = ApResponseMessage::decode(&bytes).unwrap();
        assert_eq!(decoded.ap_nonce, [7u8; 16]);
        assert_eq!(decoded.public_key, [9u8; 96]);
        assert_eq!(decoded.signature, sig);
    }

    #[test]
    fn mercury_request_encode_is_self_consistent() {
        let req = MercuryRequest {
            seq: 42,
            kind: MercuryKind::Get,
            uri: "hm://metadata/3/track/abc".into(),
            parts: vec![b"part-one".to_vec()],
        };
        let encoded = req.encode();
        assert!(encoded.len() > 10);
        assert_eq!(MercuryKind::from_u8(0), Some(MercuryKind::Get));
    }

    #[test]
    fn mercury_response_decodes_parts() {
        let mut bytes = BytesMut::new();
        bytes.put_u64(42);
        bytes.put_u16(200);
        bytes.put_u16(0);
        bytes.put_u16(1);
        bytes.put_u32(5);
        bytes.put_slice(b"hello");

        let resp = MercuryResponse::decode(&bytes).unwrap();
        assert_eq!(resp.seq, 42);
        assert!(resp.is_success());
        assert_eq!(resp.uri, None);
        assert_eq!(resp.parts, vec![b"hello".to_vec()]);
    }

    #[test]
    fn mercury_response_decodes_a_push_uri() {
        let mut bytes = BytesMut::new();
        bytes.put_u64(99);
        bytes.put_u16(200);
        let uri = b"hm://queue/1";
        bytes.put_u16(uri.len() as u16);
        bytes.put_slice(uri);
        bytes.put_u16(0);

        let resp = MercuryResponse::decode(&bytes).unwrap();
        assert_eq!(resp.uri.as_deref(), Some("hm://queue/1"));
    }

    #[test]
    fn audio_key_response_decodes_both_variants() {
        let mut key_bytes = BytesMut::new();
        key_bytes.put_u32(1);
        key_bytes.put_slice(&[0xab; 16]);
        match AudioKeyResponse::decode(0x0d, &key_bytes).unwrap() {
            AudioKeyResponse::Key { seq, key } => {
                assert_eq!(seq, 1);
                assert_eq!(key, [0xab; 16]);
            }
            _ => panic!("expected Key variant"),
        }

        let mut fail_bytes = BytesMut::new();
        fail_bytes.put_u32(2);
        fail_bytes.put_u16(7);
        match AudioKeyResponse::decode(0x0e, &fail_bytes).unwrap() {
            AudioKeyResponse::Failure { seq, code } => {
                assert_eq!(seq, 2);
                assert_eq!(code, 7);
            }
            _ => panic!("expected Failure variant"),
        }
    }
}
