//! A clock synced to a provider session's estimate of server time (§3
//! "Time is provided by a shared synced clock (owned by C3 session)"),
//! read by the loader (request signing) and the player (event
//! timestamps). Provider-agnostic: the owning session pushes offset
//! updates in, everything downstream just reads `now_ms()`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct SyncedClock {
    offset_ms: AtomicI64,
}

impl SyncedClock {
    pub fn new() -> Self {
        SyncedClock { offset_ms: AtomicI64::new(0) }
    }

    pub fn set_offset_ms(&self, offset_ms: i64) {
        self.offset_ms.store(offset_ms, Ordering::SeqCst);
    }

    /// The local wall clock adjusted by the last known server offset.
    pub fn now_ms(&self) -> i64 {
        let local = SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock is after the Unix epoch").as_millis() as i64;
        local + self.offset_ms.load(Ordering::SeqCst)
    }
}

impl Default for SyncedClock {
    fn default() -> Self {
        SyncedClock::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_shifts_now_ms_by_exactly_its_value() {
        let clock = SyncedClock::new();
        let before = clock.now_ms();
        clock.set_offset_ms(5_000);
        let after = clock.now_ms();
        assert!(after - before >= 4_900);
    }
}
