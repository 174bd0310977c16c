//! Executes the reducer's [`ReducerEffect`]s for one provider (§4.7/§4.8
//! "C8 (trigger play/seek/stop)"), bridging `streamcore-control`'s
//! provider-agnostic effect list to a concrete `PlayerTask` and queue
//! state snapshot.

use async_trait::async_trait;
use std::sync::Arc;
use streamcore_control::EffectSink;
use streamcore_player::PlayerTask;
use streamcore_queue::QueueState;
use tokio::sync::Mutex;
use tracing::warn;

pub struct PlayerEffectSink {
    player: PlayerTask,
    state: Arc<Mutex<QueueState>>,
}

impl PlayerEffectSink {
    pub fn new(player: PlayerTask, state: Arc<Mutex<QueueState>>) -> Self {
        PlayerEffectSink { player, state }
    }

    async fn advance_to_current(&self) {
        let (track, repeat_one) = {
            let state = self.state.lock().await;
            (state.current_track().cloned(), state.loop_mode == streamcore_queue::LoopMode::One)
        };
        let Some(track) = track else {
            warn!("effect sink: no current track to advance to");
            return;
        };
        if track.is_delimiter() || track.is_autoplay() {
            return;
        }
        if let Err(err) = self.player.advance_to(track, repeat_one).await {
            warn!(error = %err, "effect sink: failed to advance player to current track");
        }
    }
}

#[async_trait]
impl EffectSink for PlayerEffectSink {
    async fn start_player(&self) {
        self.advance_to_current().await;
    }

    async fn stop_player(&self) {
        self.player.stop();
    }

    async fn restart_player(&self) {
        self.advance_to_current().await;
    }

    async fn request_queue_state(&self) {
        // Provider-specific request wiring (mercury GET / WS message) is
        // owned by the session bridge, not this generic effect sink.
    }

    async fn request_renderer_state(&self) {}

    async fn request_autoplay(&self) {}

    async fn clear_preload(&self) {}

    async fn drop_preload(&self, _queue_item_ids: Vec<u32>) {}

    async fn truncate_preload(&self) {}

    async fn seek_within_track(&self, position_ms: u64) {
        self.player.seek(position_ms).await;
    }

    async fn stop_current_and_prepare(&self, _target_queue_item: Option<u32>) {
        self.advance_to_current().await;
    }

    async fn set_playing(&self, playing: bool) {
        // Track switches already reach the sink through
        // `stop_current_and_prepare`/`start_player`; this duty only has
        // something to do on a plain pause with no target change.
        if !playing {
            self.player.pause();
        }
    }

    async fn forward_volume(&self, linear: u8) {
        self.player.set_volume(linear);
    }

    async fn stop_playback(&self) {
        self.player.stop();
    }
}
