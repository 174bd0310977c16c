//! Routes inbound provider messages into the reducer and executes the
//! effects it returns (C9, §4.8 "Inbound: the reverse, with the reducer
//! invoked for each message"). The reducer itself is pure and
//! provider-agnostic (`streamcore-queue`); executing a [`ReducerEffect`]
//! means telling the right player/loader/transport to act, which is
//! provider-specific, so that part is injected through [`EffectSink`].

use async_trait::async_trait;
use std::sync::Arc;
use streamcore_queue::{QueueMessage, QueueState, Reducer, ReducerEffect};
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Executes the side effects the reducer requests. Implemented once per
/// provider wiring in the composition root, bridging back to that
/// provider's `PlayerTask`, preload manager, and outbound dispatcher.
#[async_trait]
pub trait EffectSink: Send + Sync {
    async fn start_player(&self);
    async fn stop_player(&self);
    async fn restart_player(&self);
    async fn request_queue_state(&self);
    async fn request_renderer_state(&self);
    async fn request_autoplay(&self);
    async fn clear_preload(&self);
    async fn drop_preload(&self, queue_item_ids: Vec<u32>);
    async fn truncate_preload(&self);
    async fn seek_within_track(&self, position_ms: u64);
    async fn stop_current_and_prepare(&self, target_queue_item: Option<u32>);
    async fn set_playing(&self, playing: bool);
    async fn forward_volume(&self, linear: u8);
    async fn stop_playback(&self);
}

/// Owns the reducer's state for one provider and the sink that executes
/// its effects. `state` is behind a `Mutex` since the only concurrent
/// access is from the session's inbound-message loop and, for volume
/// changes, a renderer-state poll; the reducer call itself never awaits.
pub struct ControlPoint<E> {
    reducer: Reducer,
    state: Arc<Mutex<QueueState>>,
    effects: E,
}

impl<E: EffectSink> ControlPoint<E> {
    /// Creates a control point with its own fresh queue state.
    pub fn new(our_renderer_id: impl Into<String>, effects: E) -> Self {
        Self::with_shared_state(our_renderer_id, Arc::new(Mutex::new(QueueState::new())), effects)
    }

    /// Creates a control point over an externally-owned queue state,
    /// letting `effects` (e.g. a player's track-advance logic) read the
    /// same state the reducer mutates without a second copy.
    pub fn with_shared_state(our_renderer_id: impl Into<String>, state: Arc<Mutex<QueueState>>, effects: E) -> Self {
        ControlPoint { reducer: Reducer::new(our_renderer_id), state, effects }
    }

    /// The shared queue state, for callers that need to read it outside
    /// of an effect (e.g. to build an [`EffectSink`] before the control
    /// point is constructed).
    pub fn shared_state(&self) -> Arc<Mutex<QueueState>> {
        self.state.clone()
    }

    /// Applies one inbound message to the reducer and executes whatever
    /// effects it returns, in order.
    pub async fn dispatch(&self, message: QueueMessage) {
        trace!(?message, "control point: dispatching inbound message");
        let effects = {
            let mut state = self.state.lock().await;
            self.reducer.apply(&mut state, message)
        };
        for effect in effects {
            self.execute(effect).await;
        }
    }

    /// A read-only snapshot of the current queue state, e.g. for the
    /// heartbeat's "emit current renderer state if active" duty.
    pub async fn snapshot(&self) -> QueueState {
        self.state.lock().await.clone()
    }

    async fn execute(&self, effect: ReducerEffect) {
        debug!(?effect, "control point: executing reducer effect");
        match effect {
            ReducerEffect::StartPlayer => self.effects.start_player().await,
            ReducerEffect::StopPlayer => self.effects.stop_player().await,
            ReducerEffect::RestartPlayer => self.effects.restart_player().await,
            ReducerEffect::RequestQueueState => self.effects.request_queue_state().await,
            ReducerEffect::RequestRendererState => self.effects.request_renderer_state().await,
            ReducerEffect::RequestAutoplay => self.effects.request_autoplay().await,
            ReducerEffect::ClearPreload => self.effects.clear_preload().await,
            ReducerEffect::DropPreload(ids) => self.effects.drop_preload(ids).await,
            ReducerEffect::TruncatePreload => self.effects.truncate_preload().await,
            ReducerEffect::SeekWithinTrack { position_ms } => self.effects.seek_within_track(position_ms).await,
            ReducerEffect::StopCurrentAndPrepare { target_queue_item } => {
                self.effects.stop_current_and_prepare(target_queue_item).await
            }
            ReducerEffect::SetPlaying(playing) => self.effects.set_playing(playing).await,
            ReducerEffect::ForwardVolume(linear) => self.effects.forward_volume(linear).await,
            ReducerEffect::StopPlayback => self.effects.stop_playback().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use streamcore_queue::TrackRef;

    #[derive(Default)]
    struct RecordingEffects {
        player_started: AtomicBool,
    }

    #[async_trait]
    impl EffectSink for Arc<RecordingEffects> {
        async fn start_player(&self) {
            self.player_started.store(true, Ordering::SeqCst);
        }
        async fn stop_player(&self) {}
        async fn restart_player(&self) {}
        async fn request_queue_state(&self) {}
        async fn request_renderer_state(&self) {}
        async fn request_autoplay(&self) {}
        async fn clear_preload(&self) {}
        async fn drop_preload(&self, _queue_item_ids: Vec<u32>) {}
        async fn truncate_preload(&self) {}
        async fn seek_within_track(&self, _position_ms: u64) {}
        async fn stop_current_and_prepare(&self, _target_queue_item: Option<u32>) {}
        async fn set_playing(&self, _playing: bool) {}
        async fn forward_volume(&self, _linear: u8) {}
        async fn stop_playback(&self) {}
    }

    #[tokio::test]
    async fn active_renderer_changed_starts_the_player() {
        let effects = Arc::new(RecordingEffects::default());
        let control_point = ControlPoint::new("us", effects.clone());

        control_point
            .dispatch(QueueMessage::ActiveRendererChanged { renderer_id: "us".into() })
            .await;

        assert!(effects.player_started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn queue_tracks_loaded_is_visible_in_the_snapshot() {
        let effects = Arc::new(RecordingEffects::default());
        let control_point = ControlPoint::new("us", effects);

        control_point
            .dispatch(QueueMessage::QueueTracksLoaded {
                tracks: vec![TrackRef::new("spotify", "spotify:track:1", 1)],
                version: Default::default(),
                context_uuid: [0; 16],
            })
            .await;

        let snapshot = control_point.snapshot().await;
        assert_eq!(snapshot.tracks.len(), 1);
    }
}
