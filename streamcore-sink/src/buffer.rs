//! `StreamBuffer` (§3 "Stream buffer", §4.1/§4.2): a fixed-capacity ring
//! owned by the sink, keyed by a monotonic stream-id. Ring storage is a
//! plain `VecDeque<u8>` used circularly, matching the teacher's
//! preference for concrete buffer types over an external ring-buffer
//! crate (`pmoaudio::nodes::audio_sink::SharedBuffer` uses a `VecDeque`
//! the same way).

use std::collections::VecDeque;

/// Per-stream state machine (§3). Only the front-of-queue stream is ever
/// decoded; every other queued stream sits in `PlaybackStart` until it
/// becomes the front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    PlaybackStart,
    Playback,
    PlaybackSeekable,
    PlaybackPaused,
    SoftCancel,
    Cancel,
    CancelAwait,
    Stopped,
}

/// A fixed-capacity ring buffer keyed by stream-id, plus the bookkeeping
/// the scheduler needs: producer-declared header size (for seek-position
/// computation) and the opaque source pointer identifying the owning
/// player (§3).
pub struct StreamBuffer {
    pub id: u32,
    pub source: u64,
    pub state: StreamState,
    pub header_size: Option<usize>,
    /// Packets the scheduler has handed to the chip for this stream so
    /// far; used to compute `header_size = packet_size × packets_sent`
    /// when the chip first reports the seekable bit (§4.1 step 3).
    pub packets_sent: u64,
    capacity: usize,
    ring: VecDeque<u8>,
}

impl StreamBuffer {
    pub fn new(id: u32, source: u64, capacity: usize) -> Self {
        StreamBuffer {
            id,
            source,
            state: StreamState::PlaybackStart,
            header_size: None,
            packets_sent: 0,
            capacity,
            ring: VecDeque::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn free_space(&self) -> usize {
        self.capacity.saturating_sub(self.ring.len())
    }

    /// Appends `bytes`, never exceeding `capacity`; if `volatile` and a
    /// header size has already been declared, the ring is cleared first
    /// (§4.2: "used with `volatile_flag=true` after a seek clears the
    /// buffer atomically before writing"). Returns the number of bytes
    /// actually accepted — short of `bytes.len()` on overrun (§4.1
    /// "Failure semantics... buffer overrun is reported as short feed").
    pub fn feed(&mut self, bytes: &[u8], volatile: bool) -> usize {
        if volatile && self.header_size.is_some() {
            self.ring.clear();
        }
        let accept = bytes.len().min(self.free_space());
        self.ring.extend(bytes[..accept].iter().copied());
        accept
    }

    /// Removes and returns up to `max_len` bytes from the front, FIFO.
    pub fn take(&mut self, max_len: usize) -> Vec<u8> {
        let n = max_len.min(self.ring.len());
        self.ring.drain(..n).collect()
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_then_take_returns_a_fifo_prefix() {
        let mut buf = StreamBuffer::new(1, 0, 1024);
        let accepted = buf.feed(b"hello world", false);
        assert_eq!(accepted, 11);
        let out = buf.take(5);
        assert_eq!(out, b"hello");
        let rest = buf.take(100);
        assert_eq!(rest, b" world");
    }

    #[test]
    fn feed_beyond_capacity_is_a_short_feed() {
        let mut buf = StreamBuffer::new(1, 0, 4);
        let accepted = buf.feed(b"abcdef", false);
        assert_eq!(accepted, 4);
        assert_eq!(buf.take(100), b"abcd");
    }

    #[test]
    fn volatile_feed_after_header_clears_ring_first() {
        let mut buf = StreamBuffer::new(1, 0, 1024);
        buf.feed(b"stale-bytes", false);
        buf.header_size = Some(4);
        let accepted = buf.feed(b"fresh", true);
        assert_eq!(accepted, 5);
        assert_eq!(buf.take(100), b"fresh");
    }

    #[test]
    fn cancelled_stream_reads_as_zero_length() {
        let mut buf = StreamBuffer::new(1, 0, 1024);
        buf.feed(b"data", false);
        buf.clear();
        buf.state = StreamState::Stopped;
        assert_eq!(buf.take(100), Vec::<u8>::new());
    }
}
