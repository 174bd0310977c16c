//! Queue/renderer reducer (C5, §4.5): a deterministic reducer over
//! inbound control messages producing a linear track list, a current
//! position snapshot, and a shuffle index. Generalized from
//! `pmocontrol::queue::interne::InternalQueue`'s shape (items + index)
//! with shuffle/loop/version/autoplay added per spec, and from
//! `pmocontrol::control_point::music_queue::MusicQueue`'s trait-dispatch
//! shape into an explicit [`ReducerEffect`] list (Design Notes §9: "the
//! reducer is the sole mutator... no iterators are kept across reducer
//! calls").

pub mod reducer;
pub mod track;

pub use reducer::{Reducer, ReducerEffect};
pub use track::{LoopMode, QueueMessage, QueueState, TrackRef};
