//! The reducer: `apply(&mut QueueState, QueueMessage) -> Vec<ReducerEffect>`.
//! A pure function over state that returns side effects for C9/C8 to
//! execute rather than calling back into them directly (Design Notes §9,
//! see module doc in `lib.rs`).

use crate::track::{LoopMode, QueueMessage, QueueState, QueueVersion, TrackRef};
use tracing::{debug, warn};

/// A side effect the reducer asks the caller to perform. The reducer
/// never calls back into the player/control-plane itself.
#[derive(Debug, Clone, PartialEq)]
pub enum ReducerEffect {
    StartPlayer,
    StopPlayer,
    RestartPlayer,
    RequestQueueState,
    RequestRendererState,
    RequestAutoplay,
    ClearPreload,
    DropPreload(Vec<u32>),
    TruncatePreload,
    SeekWithinTrack { position_ms: u64 },
    StopCurrentAndPrepare { target_queue_item: Option<u32> },
    SetPlaying(bool),
    ForwardVolume(u8),
    StopPlayback,
}

/// The pure reducer over [`QueueState`].
#[derive(Debug, Default)]
pub struct Reducer {
    pub our_renderer_id: String,
}

impl Reducer {
    pub fn new(our_renderer_id: impl Into<String>) -> Self {
        Reducer { our_renderer_id: our_renderer_id.into() }
    }

    pub fn apply(&self, state: &mut QueueState, msg: QueueMessage) -> Vec<ReducerEffect> {
        let effects = match msg {
            QueueMessage::SessionState { queue_version, session_id } => {
                self.on_session_state(state, queue_version, session_id)
            }
            QueueMessage::ActiveRendererChanged { renderer_id } => {
                self.on_active_renderer_changed(state, renderer_id)
            }
            QueueMessage::QueueState { tracks, autoplay_tracks, shuffled_indexes, version } => {
                self.on_queue_state(state, tracks, autoplay_tracks, shuffled_indexes, version)
            }
            QueueMessage::QueueTracksLoaded { tracks, version, context_uuid } => {
                self.on_tracks_loaded(state, tracks, version, context_uuid)
            }
            QueueMessage::QueueTracksInserted { tracks, insert_after, autoplay_reset } => {
                self.on_tracks_inserted(state, tracks, insert_after, autoplay_reset)
            }
            QueueMessage::QueueTracksAdded { tracks, autoplay_reset } => {
                self.on_tracks_added(state, tracks, autoplay_reset)
            }
            QueueMessage::QueueTracksRemoved { queue_item_ids } => {
                self.on_tracks_removed(state, queue_item_ids)
            }
            QueueMessage::AutoplayTracksLoaded { tracks, context_uuid: _ } => {
                state.autoplay_tracks = tracks;
                state.autoplay_loaded = true;
                vec![]
            }
            QueueMessage::RendererStateUpdated { index, position_ms } => {
                self.on_renderer_state_updated(state, index, position_ms)
            }
            QueueMessage::SetState { target_queue_item, next_queue_item, position_ms, playing } => {
                self.on_set_state(state, target_queue_item, next_queue_item, position_ms, playing)
            }
            QueueMessage::SetLoopMode { mode } => self.on_set_loop_mode(state, mode),
            QueueMessage::VolumeChanged { renderer_id, volume, max_volume } => {
                self.on_volume_changed(state, renderer_id, volume, max_volume)
            }
            QueueMessage::QueueError { message, reported_version } => {
                self.on_queue_error(state, message, reported_version)
            }
            QueueMessage::CurrentTrackNotFound { queue_item_id } => {
                self.on_track_not_found(state, queue_item_id)
            }
        };

        debug_assert!(
            state.shuffle.is_empty() || state.shuffle.len() == state.tracks.len(),
            "shuffle.size() must be 0 or tracks.size() after every mutation"
        );
        debug_assert!(state.index <= state.tracks.len(), "index must never exceed tracks.size()");

        effects
    }

    fn on_session_state(
        &self,
        state: &mut QueueState,
        queue_version: QueueVersion,
        _session_id: String,
    ) -> Vec<ReducerEffect> {
        state.queue_version = queue_version;
        vec![ReducerEffect::RequestQueueState, ReducerEffect::RequestRendererState]
    }

    fn on_active_renderer_changed(
        &self,
        state: &mut QueueState,
        renderer_id: String,
    ) -> Vec<ReducerEffect> {
        if renderer_id == self.our_renderer_id {
            state.is_active = true;
            vec![ReducerEffect::StartPlayer]
        } else if state.is_active {
            state.is_active = false;
            vec![ReducerEffect::StopPlayer]
        } else {
            vec![]
        }
    }

    fn on_queue_state(
        &self,
        state: &mut QueueState,
        tracks: Vec<TrackRef>,
        autoplay_tracks: Vec<TrackRef>,
        shuffled_indexes: Option<Vec<usize>>,
        version: QueueVersion,
    ) -> Vec<ReducerEffect> {
        state.tracks = tracks;
        state.autoplay_tracks = autoplay_tracks;
        state.queue_version = version;
        match shuffled_indexes {
            Some(shuffle) if shuffle.len() == state.tracks.len() => state.shuffle = shuffle,
            Some(_) => {
                warn!("adopted shuffle length mismatched track count, resetting to identity");
                state.reset_shuffle_identity();
            }
            None => state.clear_shuffle(),
        }
        state.index = state.index.min(state.tracks.len());
        vec![ReducerEffect::ClearPreload]
    }

    fn on_tracks_loaded(
        &self,
        state: &mut QueueState,
        tracks: Vec<TrackRef>,
        version: QueueVersion,
        _context_uuid: [u8; 16],
    ) -> Vec<ReducerEffect> {
        let old_len = state.tracks.len();
        state.tracks = tracks;
        state.queue_version = version;
        if state.shuffle.len() != state.tracks.len() {
            state.reset_shuffle_identity();
        }
        state.index = state.index.min(state.tracks.len());

        if state.is_active && old_len != state.tracks.len() {
            vec![ReducerEffect::RestartPlayer]
        } else {
            vec![]
        }
    }

    fn on_tracks_inserted(
        &self,
        state: &mut QueueState,
        tracks: Vec<TrackRef>,
        insert_after: u32,
        autoplay_reset: bool,
    ) -> Vec<ReducerEffect> {
        if autoplay_reset {
            state.autoplay_tracks.clear();
            state.autoplay_loaded = false;
        }

        let count = tracks.len();
        let insert_pos = state
            .tracks
            .iter()
            .position(|t| t.queue_item_id == insert_after)
            .map(|i| i + 1)
            .unwrap_or(state.tracks.len());

        for (offset, track) in tracks.into_iter().enumerate() {
            state.tracks.insert(insert_pos + offset, track);
        }

        if !state.shuffle.is_empty() {
            for slot in state.shuffle.iter_mut() {
                if *slot >= insert_pos {
                    *slot += count;
                }
            }
            state.shuffle.extend(insert_pos..insert_pos + count);
        }

        if state.index >= insert_pos {
            state.index += count;
        }

        vec![]
    }

    fn on_tracks_added(
        &self,
        state: &mut QueueState,
        tracks: Vec<TrackRef>,
        autoplay_reset: bool,
    ) -> Vec<ReducerEffect> {
        if autoplay_reset {
            state.autoplay_tracks.clear();
            state.autoplay_loaded = false;
        }
        let start = state.tracks.len();
        let count = tracks.len();
        state.tracks.extend(tracks);
        if !state.shuffle.is_empty() {
            state.shuffle.extend(start..start + count);
        }
        vec![]
    }

    fn on_tracks_removed(&self, state: &mut QueueState, queue_item_ids: Vec<u32>) -> Vec<ReducerEffect> {
        let removed_positions: Vec<usize> = state
            .tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| queue_item_ids.contains(&t.queue_item_id))
            .map(|(i, _)| i)
            .collect();

        if removed_positions.is_empty() {
            return vec![];
        }

        // Open Question (§9), decided: if the currently-playing id is
        // removed, continue the current track; advance `index` only if
        // the removed id preceded it.
        let current_id = state.tracks.get(state.index).map(|t| t.queue_item_id);
        let removed_before_index = removed_positions.iter().filter(|&&p| p < state.index).count();

        state.tracks.retain(|t| !queue_item_ids.contains(&t.queue_item_id));

        if !state.shuffle.is_empty() {
            state.shuffle.retain(|&pos| !removed_positions.contains(&pos));
            for slot in state.shuffle.iter_mut() {
                let shift = removed_positions.iter().filter(|&&p| p < *slot).count();
                *slot -= shift;
            }
        }

        match current_id {
            Some(id) if queue_item_ids.contains(&id) => {
                // current track itself removed: keep pointing at the same
                // logical slot (now occupied by the next track), only
                // shifting back by however many removals preceded it.
                state.index = state.index.saturating_sub(removed_before_index).min(state.tracks.len());
            }
            _ => {
                state.index = state.index.saturating_sub(removed_before_index).min(state.tracks.len());
            }
        }

        vec![ReducerEffect::DropPreload(queue_item_ids)]
    }

    fn on_renderer_state_updated(
        &self,
        state: &mut QueueState,
        index: usize,
        _position_ms: u64,
    ) -> Vec<ReducerEffect> {
        state.index = index.min(state.tracks.len());
        vec![]
    }

    fn on_set_state(
        &self,
        _state: &mut QueueState,
        target_queue_item: Option<u32>,
        next_queue_item: Option<u32>,
        position_ms: u64,
        playing: bool,
    ) -> Vec<ReducerEffect> {
        let mut effects = Vec::new();
        if next_queue_item.is_none() && target_queue_item.is_none() {
            effects.push(ReducerEffect::SeekWithinTrack { position_ms });
        } else {
            effects.push(ReducerEffect::StopCurrentAndPrepare { target_queue_item });
        }
        effects.push(ReducerEffect::SetPlaying(playing));
        effects
    }

    fn on_set_loop_mode(&self, state: &mut QueueState, mode: LoopMode) -> Vec<ReducerEffect> {
        let turning_off_context_repeat = state.loop_mode == LoopMode::Context && mode != LoopMode::Context;
        let past_end = state.index >= state.tracks.len();
        state.loop_mode = mode;
        if turning_off_context_repeat && past_end {
            vec![ReducerEffect::TruncatePreload]
        } else {
            vec![]
        }
    }

    fn on_volume_changed(
        &self,
        _state: &mut QueueState,
        renderer_id: String,
        volume: u32,
        max_volume: u32,
    ) -> Vec<ReducerEffect> {
        if renderer_id != self.our_renderer_id || max_volume == 0 {
            return vec![];
        }
        let linear = ((volume as u64 * 100) / max_volume as u64).min(100) as u8;
        vec![ReducerEffect::ForwardVolume(linear)]
    }

    fn on_queue_error(
        &self,
        state: &mut QueueState,
        message: String,
        reported_version: QueueVersion,
    ) -> Vec<ReducerEffect> {
        if message == "Queue version mismatch" {
            debug!(?reported_version, "queue version mismatch, adopting peer version");
            state.queue_version = reported_version;
            vec![ReducerEffect::RequestAutoplay]
        } else {
            vec![]
        }
    }

    fn on_track_not_found(&self, state: &mut QueueState, queue_item_id: u32) -> Vec<ReducerEffect> {
        if state.not_found_seen.contains(&queue_item_id) {
            vec![ReducerEffect::StopPlayback]
        } else {
            state.not_found_seen.push(queue_item_id);
            vec![ReducerEffect::RequestQueueState]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: u32) -> TrackRef {
        TrackRef::new("queue", format!("spotify:track:{id}"), id)
    }

    fn state_with(n: u32) -> QueueState {
        let mut state = QueueState::new();
        state.tracks = (0..n).map(track).collect();
        state.reset_shuffle_identity();
        state
    }

    #[test]
    fn active_renderer_changed_starts_player_for_our_renderer() {
        let reducer = Reducer::new("us");
        let mut state = QueueState::new();
        let effects = reducer.apply(
            &mut state,
            QueueMessage::ActiveRendererChanged { renderer_id: "us".into() },
        );
        assert!(state.is_active);
        assert_eq!(effects, vec![ReducerEffect::StartPlayer]);
    }

    #[test]
    fn active_renderer_changed_stops_player_when_we_lose_active() {
        let reducer = Reducer::new("us");
        let mut state = QueueState::new();
        state.is_active = true;
        let effects = reducer.apply(
            &mut state,
            QueueMessage::ActiveRendererChanged { renderer_id: "someone-else".into() },
        );
        assert!(!state.is_active);
        assert_eq!(effects, vec![ReducerEffect::StopPlayer]);
    }

    #[test]
    fn queue_tracks_inserted_shifts_shuffle_and_index() {
        let reducer = Reducer::new("us");
        let mut state = state_with(3);
        state.index = 2;

        reducer.apply(
            &mut state,
            QueueMessage::QueueTracksInserted {
                tracks: vec![track(100), track(101)],
                insert_after: 0,
                autoplay_reset: false,
            },
        );

        assert_eq!(state.tracks.len(), 5);
        assert_eq!(state.tracks[1].queue_item_id, 100);
        assert_eq!(state.tracks[2].queue_item_id, 101);
        assert_eq!(state.index, 4);
        assert!(state.invariants_hold());
    }

    #[test]
    fn queue_tracks_removed_advances_index_only_if_removed_preceded_it() {
        let reducer = Reducer::new("us");
        let mut state = state_with(4);
        state.index = 3;

        reducer.apply(
            &mut state,
            QueueMessage::QueueTracksRemoved { queue_item_ids: vec![0, 1] },
        );

        assert_eq!(state.tracks.len(), 2);
        assert_eq!(state.index, 1);
        assert!(state.invariants_hold());
    }

    #[test]
    fn queue_tracks_removed_on_current_track_continues_without_oob_index() {
        let reducer = Reducer::new("us");
        let mut state = state_with(3);
        state.index = 1;

        reducer.apply(
            &mut state,
            QueueMessage::QueueTracksRemoved { queue_item_ids: vec![1] },
        );

        assert_eq!(state.tracks.len(), 2);
        assert!(state.invariants_hold());
    }

    #[test]
    fn queue_version_mismatch_adopts_peer_version_without_stopping_or_clearing() {
        let reducer = Reducer::new("us");
        let mut state = state_with(2);
        state.queue_version = QueueVersion::new(3, 4);

        let effects = reducer.apply(
            &mut state,
            QueueMessage::QueueError {
                message: "Queue version mismatch".into(),
                reported_version: QueueVersion::new(3, 5),
            },
        );

        assert_eq!(state.queue_version, QueueVersion::new(3, 5));
        assert_eq!(effects, vec![ReducerEffect::RequestAutoplay]);
    }

    #[test]
    fn track_not_found_resubmits_once_then_stops_on_repeat() {
        let reducer = Reducer::new("us");
        let mut state = state_with(2);

        let first = reducer.apply(&mut state, QueueMessage::CurrentTrackNotFound { queue_item_id: 9 });
        assert_eq!(first, vec![ReducerEffect::RequestQueueState]);

        let second = reducer.apply(&mut state, QueueMessage::CurrentTrackNotFound { queue_item_id: 9 });
        assert_eq!(second, vec![ReducerEffect::StopPlayback]);
    }

    #[test]
    fn set_state_with_only_position_change_seeks_within_track() {
        let reducer = Reducer::new("us");
        let mut state = state_with(2);
        let effects = reducer.apply(
            &mut state,
            QueueMessage::SetState {
                target_queue_item: None,
                next_queue_item: None,
                position_ms: 50_000,
                playing: true,
            },
        );
        assert!(effects.contains(&ReducerEffect::SeekWithinTrack { position_ms: 50_000 }));
        assert!(effects.contains(&ReducerEffect::SetPlaying(true)));
    }

    #[test]
    fn volume_changed_maps_peer_range_to_linear_0_100() {
        let reducer = Reducer::new("renderer-1");
        let mut state = QueueState::new();
        let effects = reducer.apply(
            &mut state,
            QueueMessage::VolumeChanged { renderer_id: "renderer-1".into(), volume: 50, max_volume: 200 },
        );
        assert_eq!(effects, vec![ReducerEffect::ForwardVolume(25)]);
    }

    #[test]
    fn volume_changed_ignored_for_other_renderers() {
        let reducer = Reducer::new("renderer-1");
        let mut state = QueueState::new();
        let effects = reducer.apply(
            &mut state,
            QueueMessage::VolumeChanged { renderer_id: "renderer-2".into(), volume: 50, max_volume: 100 },
        );
        assert!(effects.is_empty());
    }

    #[test]
    fn queue_state_message_clears_preload_and_adopts_shuffle() {
        let reducer = Reducer::new("us");
        let mut state = QueueState::new();
        let effects = reducer.apply(
            &mut state,
            QueueMessage::QueueState {
                tracks: vec![track(1), track(2), track(3)],
                autoplay_tracks: vec![],
                shuffled_indexes: Some(vec![2, 0, 1]),
                version: QueueVersion::new(1, 0),
            },
        );
        assert_eq!(state.shuffle, vec![2, 0, 1]);
        assert_eq!(effects, vec![ReducerEffect::ClearPreload]);
        assert!(state.invariants_hold());
    }
}
