//! Maps provider-A's [`PlayerState`] onto the provider-agnostic
//! [`streamcore_queue::QueueMessage`] the reducer understands, so the
//! control plane never needs to know which provider produced a state
//! update (§4.5, §4.3 supplement from `original_source`'s
//! `DeviceStateHandler.cpp`).

use crate::proto::PlayerState;
use streamcore_queue::{LoopMode, QueueMessage};

/// Converts a provider's own state shape into the reducer's message
/// vocabulary. Implemented for both provider sessions so the control
/// plane can stay provider-agnostic (§4.7 "the control plane only ever
/// sees `QueueMessage`s").
pub trait IntoRendererState {
    fn into_renderer_state(self) -> Vec<QueueMessage>;
}

impl IntoRendererState for PlayerState {
    fn into_renderer_state(self) -> Vec<QueueMessage> {
        let mut messages = vec![QueueMessage::RendererStateUpdated {
            index: self.queue_index,
            position_ms: self.position_ms,
        }];

        let mode = match (self.repeat_context, self.repeat_track) {
            (_, true) => LoopMode::One,
            (true, false) => LoopMode::Context,
            (false, false) => LoopMode::Off,
        };
        messages.push(QueueMessage::SetLoopMode { mode });

        messages
    }
}
