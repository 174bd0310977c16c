//! The track reference type (§3 "Track reference"), the queue/renderer
//! state (§3 "Queue/renderer state"), and the inbound message taxonomy
//! (§4.5).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A track as exchanged with peers. `provider="autoplay"` implies no
/// index into the owning context; `uri` ending in `"…delimiter"` marks
/// an inert boundary that MUST NOT be fed to the decoder (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRef {
    pub provider: String,
    pub uri: String,
    pub uid: Option<String>,
    pub queue_item_id: u32,
    pub original_index: u32,
    pub context_uuid: [u8; 16],
    pub metadata: IndexMap<String, String>,
}

impl TrackRef {
    pub fn new(provider: impl Into<String>, uri: impl Into<String>, queue_item_id: u32) -> Self {
        TrackRef {
            provider: provider.into(),
            uri: uri.into(),
            uid: None,
            queue_item_id,
            original_index: 0,
            context_uuid: [0; 16],
            metadata: IndexMap::new(),
        }
    }

    /// A delimiter entry terminates a context and must never be handed
    /// to the decoder (§3).
    pub fn is_delimiter(&self) -> bool {
        self.uri.ends_with("delimiter")
    }

    pub fn is_autoplay(&self) -> bool {
        self.provider == "autoplay"
    }
}

/// Repeat mode (§3 "loop mode").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    Context,
    One,
}

/// A `(major, minor)` monotone pair assigned by the peer to detect
/// concurrent queue edits (§3, GLOSSARY "Queue version").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct QueueVersion {
    pub major: u32,
    pub minor: u32,
}

impl QueueVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        QueueVersion { major, minor }
    }
}

/// The reducer-owned queue/renderer state (§3). `shuffle` is either
/// empty or a permutation of `[0, tracks.len())`; `index` never exceeds
/// `tracks.len()`.
#[derive(Debug, Clone, Default)]
pub struct QueueState {
    pub tracks: Vec<TrackRef>,
    pub autoplay_tracks: Vec<TrackRef>,
    pub shuffle: Vec<usize>,
    pub index: usize,
    pub loop_mode: LoopMode,
    pub autoplay_loaded: bool,
    pub queue_version: QueueVersion,
    pub is_active: bool,
    /// Track ids for which a "not found in queue nor autoplay" error has
    /// already triggered one re-submission (§4.5 error handling).
    pub(crate) not_found_seen: Vec<u32>,
}

impl QueueState {
    pub fn new() -> Self {
        QueueState::default()
    }

    /// All tracks visible to the player: queue tracks followed by the
    /// autoplay tail.
    pub fn effective_tracks(&self) -> impl Iterator<Item = &TrackRef> {
        self.tracks.iter().chain(self.autoplay_tracks.iter())
    }

    pub fn current_track(&self) -> Option<&TrackRef> {
        self.tracks.get(self.index)
    }

    /// Rebuilds `shuffle` as the identity permutation `[0, len)`. Called
    /// whenever the track list's length changes and no explicit shuffle
    /// order was supplied by the peer.
    pub fn reset_shuffle_identity(&mut self) {
        self.shuffle = (0..self.tracks.len()).collect();
    }

    pub fn clear_shuffle(&mut self) {
        self.shuffle.clear();
    }

    #[cfg(test)]
    pub(crate) fn invariants_hold(&self) -> bool {
        (self.shuffle.is_empty() || self.shuffle.len() == self.tracks.len())
            && self.index <= self.tracks.len()
    }
}

/// The inbound message taxonomy the reducer consumes (§4.5, normative
/// subset reproduced in full).
#[derive(Debug, Clone)]
pub enum QueueMessage {
    SessionState {
        queue_version: QueueVersion,
        session_id: String,
    },
    ActiveRendererChanged {
        renderer_id: String,
    },
    QueueState {
        tracks: Vec<TrackRef>,
        autoplay_tracks: Vec<TrackRef>,
        shuffled_indexes: Option<Vec<usize>>,
        version: QueueVersion,
    },
    QueueTracksLoaded {
        tracks: Vec<TrackRef>,
        version: QueueVersion,
        context_uuid: [u8; 16],
    },
    QueueTracksInserted {
        tracks: Vec<TrackRef>,
        insert_after: u32,
        autoplay_reset: bool,
    },
    QueueTracksAdded {
        tracks: Vec<TrackRef>,
        autoplay_reset: bool,
    },
    QueueTracksRemoved {
        queue_item_ids: Vec<u32>,
    },
    AutoplayTracksLoaded {
        tracks: Vec<TrackRef>,
        context_uuid: [u8; 16],
    },
    RendererStateUpdated {
        index: usize,
        position_ms: u64,
    },
    SetState {
        target_queue_item: Option<u32>,
        next_queue_item: Option<u32>,
        position_ms: u64,
        playing: bool,
    },
    SetLoopMode {
        mode: LoopMode,
    },
    VolumeChanged {
        renderer_id: String,
        volume: u32,
        max_volume: u32,
    },
    QueueError {
        message: String,
        reported_version: QueueVersion,
    },
    CurrentTrackNotFound {
        queue_item_id: u32,
    },
}
