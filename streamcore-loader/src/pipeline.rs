//! The per-track loader pipeline (§4.6): metadata → stream URL/key →
//! probe → stream → seek, run on a single task per preloaded track. The
//! reducer's preload window (default 3 tracks ahead) decides how many
//! `LoaderTask`s run concurrently; each is independent and owns its own
//! `RangedReader`.

use crate::error::{LoaderError, Result};
use crate::flac_probe::{self, FlacProbeResult};
use crate::metadata::{MetadataSource, TrackMetadata, TrackSource};
use crate::ranged_reader::{RangedReader, PULL};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One decoded audio chunk, ready to feed to `streamcore-sink`.
#[derive(Debug)]
pub enum LoaderEvent {
    /// The synthesized or parsed STREAMINFO header, emitted once before
    /// the first data chunk.
    Header(Vec<u8>),
    Data(Bytes),
    Eof,
    Failed(String),
}

const VORBIS_PREFIX_LEN: usize = 167;
const PROBE_WINDOW: u64 = 1024;

pub struct LoaderTask {
    client: reqwest::Client,
    source: Arc<dyn MetadataSource>,
    events: mpsc::UnboundedSender<LoaderEvent>,
}

impl LoaderTask {
    pub fn new(client: reqwest::Client, source: Arc<dyn MetadataSource>) -> (Self, mpsc::UnboundedReceiver<LoaderEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (LoaderTask { client, source, events }, rx)
    }

    /// Drives the full pipeline for `track_id`, emitting [`LoaderEvent`]s
    /// until the track ends or the pipeline fails.
    pub async fn run(&self, track_id: &str) -> Result<()> {
        let metadata = self.source.resolve(track_id).await?;
        let (url, content_key) = self.source.resolve_stream(&metadata).await?;

        let probe_bytes = get_probe_window(&self.client, &url).await?;
        let (header, base_offset) = match &metadata.source {
            TrackSource::ProviderA { .. } => (None, VORBIS_PREFIX_LEN as u64),
            TrackSource::ProviderB { .. } => {
                let probe = probe_flac(&probe_bytes)?;
                (Some(probe.streaminfo.to_vec()), probe.base_offset as u64)
            }
        };

        if let Some(header) = header {
            if self.events.send(LoaderEvent::Header(header)).is_err() {
                return Ok(());
            }
        }

        let mut reader = RangedReader::new(self.client.clone(), url, content_key, base_offset);
        self.stream_until_eof(&mut reader).await
    }

    async fn stream_until_eof(&self, reader: &mut RangedReader) -> Result<()> {
        let mut consecutive_failures = 0u32;
        loop {
            match reader.read_chunk().await {
                Ok(chunk) if chunk.is_empty() => {
                    let _ = self.events.send(LoaderEvent::Eof);
                    return Ok(());
                }
                Ok(chunk) => {
                    consecutive_failures = 0;
                    if self.events.send(LoaderEvent::Data(Bytes::from(chunk))).is_err() {
                        return Ok(());
                    }
                }
                Err(LoaderError::Net(streamcore_net::error::NetError::UnexpectedStatus { status: 416, .. })) => {
                    // §4.6 "HTTP 416 on resume -> treat as clean EOF".
                    let _ = self.events.send(LoaderEvent::Eof);
                    return Ok(());
                }
                Err(err) => {
                    consecutive_failures += 1;
                    if consecutive_failures > 1 {
                        warn!(error = %err, "loader giving up after retry");
                        let message = err.to_string();
                        let _ = self.events.send(LoaderEvent::Failed(message));
                        return Err(err);
                    }
                    info!(error = %err, "loader retrying once after a transient failure");
                }
            }
        }
    }

    /// Reopens the reader at a new position after an externally signaled
    /// seek (§4.6 step 6): `byte_off = pos_ms / duration_ms * playable_bytes`,
    /// rounded down to 16 by `RangedReader::seek_to`.
    pub fn seek(&self, reader: &mut RangedReader, pos_ms: u64, duration_ms: u64, playable_bytes: u64, content_key: Option<[u8; 16]>) {
        let byte_off = if duration_ms == 0 { 0 } else { pos_ms * playable_bytes / duration_ms };
        reader.seek_to(byte_off, content_key);
    }
}

async fn get_probe_window(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let bytes = streamcore_net::ranged::get_range(client, url, 0, Some(PROBE_WINDOW - 1), &streamcore_net::retry::RetryPolicy::loader_default())
        .await?;
    Ok(bytes.to_vec())
}

fn probe_flac(window: &[u8]) -> Result<FlacProbeResult> {
    flac_probe::probe(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{TrackMetadata, TrackSource};
    use async_trait::async_trait;

    struct FakeSource;

    #[async_trait]
    impl MetadataSource for FakeSource {
        async fn resolve(&self, _track_id: &str) -> Result<TrackMetadata> {
            Ok(TrackMetadata {
                title: "Test Track".into(),
                artist: "Test Artist".into(),
                album: "Test Album".into(),
                art_url: None,
                duration_ms: 180_000,
                sample_rate: 44_100,
                channels: 2,
                bits_per_sample: 16,
                source: TrackSource::ProviderB { stream_url: "http://example.test/track.flac".into() },
            })
        }

        async fn resolve_stream(&self, _metadata: &TrackMetadata) -> Result<(String, Option<[u8; 16]>)> {
            Ok(("http://example.test/track.flac".into(), None))
        }
    }

    #[test]
    fn seek_computes_proportional_byte_offset() {
        let client = reqwest::Client::new();
        let source: Arc<dyn MetadataSource> = Arc::new(FakeSource);
        let (task, _rx) = LoaderTask::new(client.clone(), source);
        let mut reader = RangedReader::new(client, "http://example.test/track".into(), None, 0);

        task.seek(&mut reader, 90_000, 180_000, 1_000_000, None);
        assert_eq!(reader.position(), 500_000 - (500_000 % 16));
    }

    #[test]
    fn pull_size_matches_the_documented_backpressure_constant() {
        assert_eq!(PULL, 4 * 1024);
    }
}
