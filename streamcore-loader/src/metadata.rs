//! Provider-agnostic track metadata (§4.6 step 1): both providers resolve
//! a `TrackMetadata` through entirely different calls (mercury GET vs.
//! two signed HTTPS calls), so the pipeline only depends on this trait,
//! never on `streamcore-spotify`/`streamcore-qobuz` directly.

use crate::error::Result;
use async_trait::async_trait;

/// What the loader pipeline needs to know about a track before it can
/// start streaming it.
#[derive(Debug, Clone)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub art_url: Option<String>,
    pub duration_ms: u64,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u16,
    pub source: TrackSource,
}

/// Provider-specific addressing needed for the later pipeline stages
/// (content key + CDN URL for provider A, direct stream URL for
/// provider B).
#[derive(Debug, Clone)]
pub enum TrackSource {
    ProviderA { track_gid: Vec<u8>, file_gid: Vec<u8> },
    ProviderB { stream_url: String },
}

/// Resolves track metadata and, for provider A, the decrypted stream URL
/// (steps 1–3 of §4.6); implemented once per provider in
/// `streamcore-spotify`/`streamcore-qobuz` and injected into the loader
/// so this crate stays provider-agnostic.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn resolve(&self, track_id: &str) -> Result<TrackMetadata>;

    /// Resolves the CDN URL and, where applicable, the content key for
    /// an already-resolved track (§4.6 steps 2–3). Provider B returns
    /// the stream URL unchanged and no key.
    async fn resolve_stream(&self, metadata: &TrackMetadata) -> Result<(String, Option<[u8; 16]>)>;
}
