//! `DecoderChip`: the trait boundary to the hardware decoder (§1 "hardware
//! GPIO/SPI driver for the decoder chip" is out of scope; this is the
//! collaborator contract the scheduler drives). A real implementation
//! talks SPI to a VS1053-class part; [`NullDecoderChip`] is the reference
//! implementation used in tests and headless operation, grounded on the
//! same "logic struct decoupled from the real transport" split
//! `pmoaudio::nodes::audio_sink::AudioSinkLogic` uses for its
//! `use_null_output` mode.

use std::cell::Cell;
use std::io;

/// Which fill-byte family a decoded stream belongs to (§4.1 step 3's
/// "Every REPORT_INTERVAL packets, read chip audio format and update
/// `endFillByte`/`endFillBytes`"). The spec keeps both constants rather
/// than folding one into the other (§9 Open Question) because they are
/// genuinely different per codec family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Flac,
    Other,
}

impl AudioFormat {
    /// `endFillByte` value for this format family.
    pub fn end_fill_byte(self) -> u8 {
        match self {
            AudioFormat::Flac => 0,
            AudioFormat::Other => 0,
        }
    }

    /// `endFillBytes` count for this format family: FLAC family 12288,
    /// others 2050 (§4.1 step 3).
    pub fn end_fill_bytes(self) -> u32 {
        match self {
            AudioFormat::Flac => 12288,
            AudioFormat::Other => 2050,
        }
    }
}

/// The hardware boundary the sink scheduler drives (§4.1). A real
/// implementation maps these onto SPI register transactions; every
/// suspension point here (a real `write`) would cross the SPI bus and
/// must not be called while holding any other lock (§5).
pub trait DecoderChip: Send {
    /// Writes up to `bytes.len()` bytes to the chip's data FIFO,
    /// respecting the chip's data-request line; returns the number of
    /// bytes actually accepted.
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Whether the chip currently reports the "seekable bit" — frames
    /// are parseable and a clean header-size boundary can be captured
    /// (§4.1 step 3, `PlaybackSeekable`).
    fn is_seekable(&self) -> bool;

    fn cancel_bit(&self) -> bool;
    fn set_cancel_bit(&mut self, v: bool);

    /// Clears the chip's "do not jump" bit, part of the hard-reset path
    /// in `CancelAwait` when the cancel bit never clears (§4.1 step 3).
    fn clear_do_not_jump(&mut self);

    fn reset_decode_time(&mut self);

    /// Forces an immediate reinitialization of the chip, used when
    /// `CancelAwait` exhausts its retry budget (§4.1 step 3).
    fn hard_reset(&mut self);

    fn audio_format(&self) -> AudioFormat;

    /// Applies a linear 0..100 volume to the chip's own volume register,
    /// invoked from the scheduler's command queue (§4.1 "feed_command...
    /// volume, skip").
    fn set_volume(&mut self, linear_0_100: u8);
}

/// Reference `DecoderChip` with no physical transport: accepts every
/// byte immediately and tracks cancel-bit/seekable state purely in
/// memory. Used for tests and headless operation (no SPI bus on a
/// development machine).
#[derive(Debug)]
pub struct NullDecoderChip {
    seekable: bool,
    cancel_bit: Cell<bool>,
    /// Polls remaining before `cancel_bit()` self-clears, simulating a
    /// real chip that drops its cancel bit once the flush completes.
    /// `None` means the bit never clears on its own (exercises the
    /// `CancelAwait` hard-reset path in tests).
    cancel_auto_clear_after: Option<u32>,
    cancel_polls: Cell<u32>,
    format: AudioFormat,
    bytes_written: u64,
    seekable_after_bytes: u64,
    volume: u8,
}

impl Clone for NullDecoderChip {
    fn clone(&self) -> Self {
        NullDecoderChip {
            seekable: self.seekable,
            cancel_bit: Cell::new(self.cancel_bit.get()),
            cancel_auto_clear_after: self.cancel_auto_clear_after,
            cancel_polls: Cell::new(self.cancel_polls.get()),
            format: self.format,
            bytes_written: self.bytes_written,
            seekable_after_bytes: self.seekable_after_bytes,
            volume: self.volume,
        }
    }
}

impl NullDecoderChip {
    pub fn new() -> Self {
        NullDecoderChip {
            seekable: false,
            cancel_bit: Cell::new(false),
            cancel_auto_clear_after: Some(1),
            cancel_polls: Cell::new(0),
            format: AudioFormat::Other,
            bytes_written: 0,
            seekable_after_bytes: 32,
            volume: 100,
        }
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn with_format(format: AudioFormat) -> Self {
        NullDecoderChip { format, ..NullDecoderChip::new() }
    }

    /// After `n` polls of `cancel_bit()` following a `set_cancel_bit(true)`,
    /// the bit reports clear — used to exercise the `CancelAwait` retry
    /// path in the sink scheduler's tests without an actual bus.
    pub fn with_cancel_auto_clear(n: u32) -> Self {
        NullDecoderChip { cancel_auto_clear_after: Some(n), ..NullDecoderChip::new() }
    }

    /// A chip whose cancel bit never clears on its own, forcing the
    /// scheduler's hard-reset path.
    pub fn with_cancel_never_clearing() -> Self {
        NullDecoderChip { cancel_auto_clear_after: None, ..NullDecoderChip::new() }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl Default for NullDecoderChip {
    fn default() -> Self {
        NullDecoderChip::new()
    }
}

impl DecoderChip for NullDecoderChip {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.bytes_written += bytes.len() as u64;
        if self.bytes_written >= self.seekable_after_bytes {
            self.seekable = true;
        }
        Ok(bytes.len())
    }

    fn is_seekable(&self) -> bool {
        self.seekable
    }

    fn cancel_bit(&self) -> bool {
        if !self.cancel_bit.get() {
            return false;
        }
        let Some(clear_after) = self.cancel_auto_clear_after else { return true };
        let polls = self.cancel_polls.get() + 1;
        self.cancel_polls.set(polls);
        if polls > clear_after {
            self.cancel_bit.set(false);
            false
        } else {
            true
        }
    }

    fn set_cancel_bit(&mut self, v: bool) {
        self.cancel_bit.set(v);
        self.cancel_polls.set(0);
    }

    fn clear_do_not_jump(&mut self) {}

    fn reset_decode_time(&mut self) {
        self.seekable = false;
    }

    fn hard_reset(&mut self) {
        self.seekable = false;
        self.cancel_bit.set(false);
    }

    fn audio_format(&self) -> AudioFormat {
        self.format
    }

    fn set_volume(&mut self, linear_0_100: u8) {
        self.volume = linear_0_100;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flac_and_other_have_the_spec_fill_byte_counts() {
        assert_eq!(AudioFormat::Flac.end_fill_bytes(), 12288);
        assert_eq!(AudioFormat::Other.end_fill_bytes(), 2050);
    }

    #[test]
    fn null_chip_becomes_seekable_after_enough_bytes() {
        let mut chip = NullDecoderChip::new();
        assert!(!chip.is_seekable());
        chip.write(&[0u8; 32]).unwrap();
        assert!(chip.is_seekable());
    }

    #[test]
    fn null_chip_cancel_bit_round_trips() {
        let mut chip = NullDecoderChip::new();
        chip.set_cancel_bit(true);
        assert!(chip.cancel_bit());
        chip.hard_reset();
        assert!(!chip.cancel_bit());
    }
}
