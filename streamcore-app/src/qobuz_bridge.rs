//! Bridges the provider-B (Qobuz-compatible) session's signed HTTPS API
//! into the provider-agnostic `streamcore_loader::MetadataSource` trait
//! (§4.6 step 1: "HTTPS GET `/track/get?track_id=…` then
//! `/track/getFileUrl?format_id=…&intent=stream&track_id=…` (signed);
//! extract URL, duration, sample rate, bit depth, channel count, blob").

use async_trait::async_trait;
use serde_json::Value;
use streamcore_loader::{LoaderError, MetadataSource, Result, TrackMetadata, TrackSource};
use streamcore_qobuz::QobuzSession;

/// Format id requested from `track/getFileUrl`; `27` is Qobuz's FLAC
/// hi-res/lossless tier, matching the "hi-res → lossless → lossy"
/// fallback chain's top rung (§3 "preferred audio format").
const FORMAT_ID_LOSSLESS: &str = "27";

pub struct QobuzMetadataSource {
    session: QobuzSession,
}

impl QobuzMetadataSource {
    pub fn new(session: QobuzSession) -> Self {
        QobuzMetadataSource { session }
    }
}

#[async_trait]
impl MetadataSource for QobuzMetadataSource {
    async fn resolve(&self, track_id: &str) -> Result<TrackMetadata> {
        let body = self.session.api().track_get(track_id).await.map_err(|_| LoaderError::Metadata)?;

        let title = field_str(&body, "title").unwrap_or_default();
        let artist = body
            .get("performer")
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let album = body.get("album").and_then(|a| a.get("title")).and_then(Value::as_str).unwrap_or_default().to_string();
        let art_url = body
            .get("album")
            .and_then(|a| a.get("image"))
            .and_then(|i| i.get("large"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let duration_s = body.get("duration").and_then(Value::as_f64).unwrap_or(0.0);

        Ok(TrackMetadata {
            title,
            artist,
            album,
            art_url,
            duration_ms: (duration_s * 1000.0) as u64,
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: 16,
            source: TrackSource::ProviderB { stream_url: track_id.to_string() },
        })
    }

    async fn resolve_stream(&self, metadata: &TrackMetadata) -> Result<(String, Option<[u8; 16]>)> {
        let TrackSource::ProviderB { stream_url: track_id } = &metadata.source else {
            return Err(LoaderError::Metadata);
        };

        let body = self
            .session
            .api()
            .track_get_file_url(track_id, FORMAT_ID_LOSSLESS)
            .await
            .map_err(|_| LoaderError::Metadata)?;
        let url = field_str(&body, "url").ok_or(LoaderError::Metadata)?;
        Ok((url, None))
    }
}

fn field_str(body: &Value, field: &str) -> Option<String> {
    body.get(field).and_then(Value::as_str).map(str::to_string)
}
