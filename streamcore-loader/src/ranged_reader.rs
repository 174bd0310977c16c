//! The CDN reader (§4.6 step 5): a ranged GET, retried per
//! `streamcore_net::retry::RetryPolicy::loader_default()`, optionally
//! decrypted with the provider-A content key and fixed base IV.

use crate::error::Result;
use streamcore_crypto::aes_ctr::CdnDecryptor;
use streamcore_net::ranged::get_range;
use streamcore_net::retry::RetryPolicy;

/// Pull size per iteration and ring headroom (§4.6 "Backpressure").
pub const PULL: usize = 4 * 1024;
pub const HEADROOM: usize = 1024;

pub struct RangedReader {
    client: reqwest::Client,
    url: String,
    decryptor: Option<CdnDecryptor>,
    policy: RetryPolicy,
    position: u64,
}

impl RangedReader {
    pub fn new(client: reqwest::Client, url: String, content_key: Option<[u8; 16]>, base_offset: u64) -> Self {
        let decryptor = content_key.map(|key| CdnDecryptor::new(&key, base_offset));
        RangedReader { client, url, decryptor, policy: RetryPolicy::loader_default(), position: base_offset }
    }

    /// Reads up to `PULL` bytes starting at the reader's current
    /// position, decrypting in place when a content key is configured.
    /// Returns an empty buffer at clean EOF.
    pub async fn read_chunk(&mut self) -> Result<Vec<u8>> {
        let end = self.position + PULL as u64 - 1;
        let bytes = get_range(&self.client, &self.url, self.position, Some(end), &self.policy).await?;
        let mut chunk = bytes.to_vec();
        if let Some(decryptor) = &mut self.decryptor {
            decryptor.decrypt(&mut chunk);
        }
        self.position += chunk.len() as u64;
        Ok(chunk)
    }

    /// Reopens the stream at a new byte offset after a seek (§4.6 step
    /// 6), rounded down to the 16-byte AES-CTR block boundary the spec
    /// requires.
    pub fn seek_to(&mut self, byte_offset: u64, content_key: Option<[u8; 16]>) {
        let aligned = byte_offset - (byte_offset % 16);
        self.position = aligned;
        self.decryptor = content_key.map(|key| CdnDecryptor::new(&key, aligned));
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_to_rounds_down_to_a_16_byte_boundary() {
        let client = reqwest::Client::new();
        let mut reader = RangedReader::new(client, "http://example.test/track".into(), None, 0);
        reader.seek_to(41, None);
        assert_eq!(reader.position(), 32);
    }
}
