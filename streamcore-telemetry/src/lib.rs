//! Track-metrics event builder and JSON envelope for observers (C11,
//! §2, §6 "JSON envelope for observers"). Grounded on
//! `pmocontrol::events`/`pmoaudio::events`'s event-struct-plus-channel
//! pattern: a typed event enum fed into an `mpsc::Sender`, consumed by
//! whichever `TelemetrySink` is registered (stdout-JSON, a file, or
//! nothing — `streamcore-app` wires the concrete choice).

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::trace;

/// The three points in a track's life telemetry is emitted for (§4.7,
/// §6): play start, a position update, and end-of-track/seek.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackMetricsEvent {
    Started {
        provider: String,
        queue_item_id: u32,
        uri: String,
        timestamp_ms: u64,
    },
    Position {
        provider: String,
        queue_item_id: u32,
        position_ms: u64,
        timestamp_ms: u64,
    },
    Ended {
        provider: String,
        queue_item_id: u32,
        played_for_s: f64,
        timestamp_ms: u64,
    },
}

impl TrackMetricsEvent {
    pub fn started(provider: impl Into<String>, queue_item_id: u32, uri: impl Into<String>, now_ms: u64) -> Self {
        TrackMetricsEvent::Started {
            provider: provider.into(),
            queue_item_id,
            uri: uri.into(),
            timestamp_ms: now_ms,
        }
    }

    pub fn position(provider: impl Into<String>, queue_item_id: u32, position_ms: u64, now_ms: u64) -> Self {
        TrackMetricsEvent::Position {
            provider: provider.into(),
            queue_item_id,
            position_ms,
            timestamp_ms: now_ms,
        }
    }

    pub fn ended(provider: impl Into<String>, queue_item_id: u32, played_for_s: f64, now_ms: u64) -> Self {
        TrackMetricsEvent::Ended {
            provider: provider.into(),
            queue_item_id,
            played_for_s,
            timestamp_ms: now_ms,
        }
    }

    /// Serializes to the JSON envelope §6 implies for observers.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("TrackMetricsEvent always serializes")
    }
}

/// An object-safe sink for telemetry events, so `streamcore-app` can
/// wire a concrete observer (stdout, file, nothing) without the
/// producing tasks knowing which.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TrackMetricsEvent);
}

/// A sink that logs each event as a `tracing::trace!` line — the default
/// wired when no richer observer is configured.
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: TrackMetricsEvent) {
        trace!(event = %event.to_json(), "telemetry");
    }
}

/// A sink that forwards every event onto a channel, for tests or a
/// separate consumer task (e.g. the Web UI's `{type:"debug",...}`
/// outbound message, §6).
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TrackMetricsEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TrackMetricsEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSink { tx }, rx)
    }
}

impl TelemetrySink for ChannelSink {
    fn emit(&self, event: TrackMetricsEvent) {
        let _ = self.tx.send(event);
    }
}

/// Milliseconds since the Unix epoch, for callers without their own
/// injected clock (telemetry timestamps are wall-clock per §6, unlike
/// the synced clock §9 mandates for signing/positions).
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn started_event_serializes_with_tag() {
        let event = TrackMetricsEvent::started("spotify", 7, "spotify:track:abc", 1000);
        let json = event.to_json();
        assert!(json.contains("\"kind\":\"started\""));
        assert!(json.contains("\"queue_item_id\":7"));
    }

    #[test]
    fn channel_sink_forwards_emitted_events() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(TrackMetricsEvent::ended("qobuz", 3, 120.5, 2000));
        let received = rx.try_recv().unwrap();
        match received {
            TrackMetricsEvent::Ended { queue_item_id, played_for_s, .. } => {
                assert_eq!(queue_item_id, 3);
                assert_eq!(played_for_s, 120.5);
            }
            _ => panic!("expected Ended variant"),
        }
    }

    #[test]
    fn tracing_sink_does_not_panic() {
        let sink = TracingSink;
        sink.emit(TrackMetricsEvent::position("spotify", 1, 5000, 3000));
    }
}
