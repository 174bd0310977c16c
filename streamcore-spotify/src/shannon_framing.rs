//! Post-handshake packet framing (§4.3, §6): `u8 cmd | u16 be len |
//! bytes[len] | u32 mac`, encrypted under the Shannon stream cipher with
//! a monotonically increasing 32-bit nonce per direction.

use crate::error::{Result, SpotifyError};
use crate::handshake::HandshakeKeys;
use streamcore_crypto::shannon::Shannon;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const HEADER_LEN: usize = 3;
const MAC_LEN: usize = 4;

/// A provider-A transport wrapped with its send/recv Shannon ciphers and
/// per-direction nonce counters. Owns the underlying stream exclusively —
/// only the session task ever touches it (§5 "single-writer invariant").
pub struct FramedSession<S> {
    stream: S,
    send_cipher: Shannon,
    recv_cipher: Shannon,
    send_nonce: u32,
    recv_nonce: u32,
}

impl<S> FramedSession<S>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    pub fn new(stream: S, keys: HandshakeKeys) -> Self {
        FramedSession {
            stream,
            send_cipher: Shannon::new(&keys.send_key),
            recv_cipher: Shannon::new(&keys.recv_key),
            send_nonce: 0,
            recv_nonce: 0,
        }
    }

    /// Encrypts and writes one frame, advancing the send nonce.
    pub async fn write_frame(&mut self, cmd: u8, payload: &[u8]) -> Result<()> {
        let mut plaintext = Vec::with_capacity(HEADER_LEN + payload.len());
        plaintext.push(cmd);
        plaintext.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        plaintext.extend_from_slice(payload);

        self.send_cipher.nonce(&self.send_nonce.to_be_bytes());
        self.send_cipher.encrypt(&mut plaintext);
        let mac = self.send_cipher.finish(MAC_LEN);

        self.stream.write_all(&plaintext).await?;
        self.stream.write_all(&mac).await?;
        self.send_nonce = self.send_nonce.wrapping_add(1);
        Ok(())
    }

    /// Reads, decrypts, and MAC-verifies one frame, advancing the recv
    /// nonce. Returns `(cmd, payload)`.
    pub async fn read_frame(&mut self) -> Result<(u8, Vec<u8>)> {
        self.recv_cipher.nonce(&self.recv_nonce.to_be_bytes());

        let mut header = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut header).await?;
        self.recv_cipher.decrypt(&mut header);
        let cmd = header[0];
        let len = u16::from_be_bytes([header[1], header[2]]) as usize;

        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await?;
        self.recv_cipher.decrypt(&mut payload);

        let mut mac = [0u8; MAC_LEN];
        self.stream.read_exact(&mut mac).await?;
        let expected_mac = self.recv_cipher.finish(MAC_LEN);
        if mac.as_slice() != expected_mac.as_slice() {
            return Err(SpotifyError::BadMac);
        }

        self.recv_nonce = self.recv_nonce.wrapping_add(1);
        Ok((cmd, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn keys(seed: u8) -> HandshakeKeys {
        HandshakeKeys { send_key: [seed; 32], recv_key: [seed.wrapping_add(1); 32] }
    }

    #[tokio::test]
    async fn a_frame_written_by_one_side_decodes_on_the_other() {
        let (client_io, server_io) = duplex(4096);

        let client_keys = keys(0x11);
        // The peer's recv key must equal this side's send key, and vice
        // versa, for the two directions to line up.
        let server_keys = HandshakeKeys { send_key: client_keys.recv_key, recv_key: client_keys.send_key };

        let mut client = FramedSession::new(client_io, client_keys);
        let mut server = FramedSession::new(server_io, server_keys);

        client.write_frame(0xAB, b"hello mercury").await.unwrap();
        let (cmd, payload) = server.read_frame().await.unwrap();

        assert_eq!(cmd, 0xAB);
        assert_eq!(payload, b"hello mercury");
    }
}
