//! Audio-key mini-protocol (§4.3 "Audio key service", §4.6 step 2): a
//! request carrying `(track_gid, file_gid, seq)` answered by either the
//! 16-byte content key or a failure code. Keys are never cached across
//! power cycles (§4.3) — this module holds no persistent key store.

use crate::error::{Result, SpotifyError};
use crate::proto::AudioKeyResponse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::oneshot;

pub(crate) enum AudioKeyCommand {
    Request { track_gid: Vec<u8>, file_gid: Vec<u8>, reply: oneshot::Sender<Result<[u8; 16]>> },
}

/// The session-task-owned seq→callback map for in-flight key requests.
pub(crate) struct AudioKeyMultiplexer {
    next_seq: AtomicU32,
    pending: HashMap<u32, oneshot::Sender<Result<[u8; 16]>>>,
}

impl AudioKeyMultiplexer {
    pub fn new() -> Self {
        AudioKeyMultiplexer { next_seq: AtomicU32::new(1), pending: HashMap::new() }
    }

    pub fn register(&mut self, reply: oneshot::Sender<Result<[u8; 16]>>) -> u32 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.pending.insert(seq, reply);
        seq
    }

    /// Routes one decoded [`AudioKeyResponse`] to its pending request.
    pub fn dispatch(&mut self, response: AudioKeyResponse) {
        match response {
            AudioKeyResponse::Key { seq, key } => self.resolve(seq, Ok(key)),
            AudioKeyResponse::Failure { seq, code } => {
                self.resolve(seq, Err(SpotifyError::AudioKeyFailed { seq, code }))
            }
        }
    }

    fn resolve(&mut self, seq: u32, outcome: Result<[u8; 16]>) {
        if let Some(reply) = self.pending.remove(&seq) {
            let _ = reply.send(outcome);
        }
    }
}

/// The three audio-format tiers the loader falls back through (§4.6 step
/// 2, §9 Open Question 3: "kept as specified, unchanged").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatTier {
    Lossless,
    Kbps160,
    Kbps96,
}

impl FormatTier {
    /// The next, lower tier to retry at after exhausting the key-request
    /// budget at this one, or `None` if already at the floor.
    pub fn downgrade(self) -> Option<FormatTier> {
        match self {
            FormatTier::Lossless => Some(FormatTier::Kbps160),
            FormatTier::Kbps160 => Some(FormatTier::Kbps96),
            FormatTier::Kbps96 => None,
        }
    }
}

/// Key-request budget per tier before downgrading (§4.6 step 2: "retry up
/// to 10 times; after 10, downgrade... if already at lowest tier, mark
/// FAILED").
pub const AUDIO_KEY_RETRY_CAP: u32 = 10;

/// Drives the retry-then-downgrade policy: calls `request` up to
/// [`AUDIO_KEY_RETRY_CAP`] times at `tier`; on repeated failure,
/// downgrades and recurses; returns the key and the tier it was obtained
/// at, or [`SpotifyError::AudioKeyExhausted`] once the lowest tier fails.
pub async fn request_key_with_retry<F, Fut>(mut tier: FormatTier, mut request: F) -> Result<([u8; 16], FormatTier)>
where
    F: FnMut(FormatTier) -> Fut,
    Fut: std::future::Future<Output = Result<[u8; 16]>>,
{
    loop {
        let mut last_err = None;
        for _ in 0..AUDIO_KEY_RETRY_CAP {
            match request(tier).await {
                Ok(key) => return Ok((key, tier)),
                Err(err) => last_err = Some(err),
            }
        }
        match tier.downgrade() {
            Some(next) => tier = next,
            None => return Err(last_err.unwrap_or(SpotifyError::AudioKeyExhausted)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32 as Counter, Ordering as Ord};

    #[tokio::test]
    async fn succeeds_immediately_without_downgrading() {
        let (key, tier) = request_key_with_retry(FormatTier::Lossless, |_t| async { Ok([1u8; 16]) }).await.unwrap();
        assert_eq!(key, [1u8; 16]);
        assert_eq!(tier, FormatTier::Lossless);
    }

    #[tokio::test]
    async fn downgrades_after_exhausting_the_cap_at_a_tier() {
        let calls = Counter::new(0);
        let (_, tier) = request_key_with_retry(FormatTier::Lossless, |t| {
            let n = calls.fetch_add(1, Ord::SeqCst);
            async move {
                if t == FormatTier::Lossless {
                    Err(SpotifyError::AudioKeyExhausted)
                } else {
                    Ok([2u8; 16])
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(tier, FormatTier::Kbps160);
        assert!(calls.load(Ord::SeqCst) >= AUDIO_KEY_RETRY_CAP);
    }

    #[tokio::test]
    async fn fails_after_exhausting_every_tier() {
        let result = request_key_with_retry(FormatTier::Kbps96, |_t| async { Err(SpotifyError::AudioKeyExhausted) }).await;
        assert!(result.is_err());
    }
}
