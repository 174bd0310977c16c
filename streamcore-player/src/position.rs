//! Position snapshot (§4.7): `{value_ms, timestamp_ms}`, a value frozen
//! at the moment it was last updated rather than a continuously-ticking
//! clock — callers project the live position by adding elapsed wall time
//! since `timestamp_ms` while playing.

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock is after the Unix epoch").as_millis() as u64
}

/// A position snapshot plus whether playback is currently advancing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub value_ms: u64,
    pub timestamp_ms: u64,
    pub playing: bool,
}

impl Position {
    pub fn at(value_ms: u64) -> Self {
        Position { value_ms, timestamp_ms: now_ms(), playing: false }
    }

    /// The live position: frozen `value_ms` if paused, else projected
    /// forward by elapsed wall time since `timestamp_ms`.
    pub fn live_value_ms(&self) -> u64 {
        if !self.playing {
            return self.value_ms;
        }
        let elapsed = now_ms().saturating_sub(self.timestamp_ms);
        self.value_ms + elapsed
    }

    /// Freezes the position at its current live value (§4.7 `Paused` ->
    /// "freeze position.value := now - position.timestamp + position.value").
    pub fn freeze(&mut self) {
        self.value_ms = self.live_value_ms();
        self.timestamp_ms = now_ms();
        self.playing = false;
    }

    pub fn resume(&mut self) {
        self.timestamp_ms = now_ms();
        self.playing = true;
    }

    /// Resets to an externally signaled position (§4.7 seek handling:
    /// "position.value := N, position.timestamp := now").
    pub fn seek_to(&mut self, value_ms: u64) {
        self.value_ms = value_ms;
        self.timestamp_ms = now_ms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freeze_stops_the_position_from_advancing_further() {
        let mut position = Position::at(1_000);
        position.playing = true;
        position.freeze();
        assert!(!position.playing);
        assert_eq!(position.value_ms, position.live_value_ms());
    }

    #[test]
    fn seek_to_overrides_value_and_resets_the_timestamp() {
        let mut position = Position::at(1_000);
        position.seek_to(42_000);
        assert_eq!(position.value_ms, 42_000);
    }
}
