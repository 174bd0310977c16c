//! Maps provider-B's renderer state fields onto
//! [`streamcore_queue::QueueMessage`] (§4.5, §4.3 supplement grounded on
//! `original_source/StreamCore32/stream/qobuz/src/QobuzPlayer.cpp`),
//! mirroring `streamcore_spotify::renderer_state`'s trait so the control
//! plane stays provider-agnostic.

use serde::Deserialize;
use streamcore_queue::{LoopMode, QueueMessage};

/// The subset of a `QConnectBatch` renderer-state message this rework
/// cares about, deserialized straight off the decoded JSON/batch payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RendererState {
    pub queue_index: usize,
    pub position_ms: u64,
    pub repeat_mode: RepeatMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    Off,
    One,
    All,
}

pub trait IntoRendererState {
    fn into_renderer_state(self) -> Vec<QueueMessage>;
}

impl IntoRendererState for RendererState {
    fn into_renderer_state(self) -> Vec<QueueMessage> {
        let mode = match self.repeat_mode {
            RepeatMode::Off => LoopMode::Off,
            RepeatMode::One => LoopMode::One,
            RepeatMode::All => LoopMode::Context,
        };
        vec![
            QueueMessage::RendererStateUpdated { index: self.queue_index, position_ms: self.position_ms },
            QueueMessage::SetLoopMode { mode },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_repeat_all_to_context_loop_mode() {
        let state = RendererState { queue_index: 1, position_ms: 2_500, repeat_mode: RepeatMode::All };
        let messages = state.into_renderer_state();
        assert!(matches!(messages[0], QueueMessage::RendererStateUpdated { index: 1, position_ms: 2_500 }));
        assert!(matches!(messages[1], QueueMessage::SetLoopMode { mode: LoopMode::Context }));
    }
}
