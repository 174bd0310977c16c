//! The audio sink (C7, §4.1/§4.2): a single-chip scheduler arbitrating
//! multiple producer streams. See [`scheduler`] for the task itself,
//! [`buffer`] for the per-stream ring, and [`chip`] for the hardware
//! boundary it drives.

pub mod buffer;
pub mod chip;
pub mod scheduler;
pub mod volume;

pub use buffer::{StreamBuffer, StreamState};
pub use chip::{AudioFormat, DecoderChip, NullDecoderChip};
pub use scheduler::{spawn_sink, Sink};
