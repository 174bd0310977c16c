//! Clock synchronization with the access point (§4.3 "Time sync"): a
//! periodic ping/pong pair lets the session estimate clock offset from
//! the access point, used to keep position reporting honest across a
//! long-lived connection.

use std::time::{Duration, Instant};

/// One resolved round trip: `offset_ms` is the estimated AP-minus-local
/// clock skew, `rtt_ms` the measured round-trip time.
#[derive(Debug, Clone, Copy)]
pub struct TimeSyncSample {
    pub offset_ms: i64,
    pub rtt_ms: u64,
}

/// Tracks the most recent time-sync sample and decides when the next
/// ping is due.
pub struct TimeSync {
    period: Duration,
    last_sync: Option<Instant>,
    last_sample: Option<TimeSyncSample>,
}

impl TimeSync {
    pub fn new(period: Duration) -> Self {
        TimeSync { period, last_sync: None, last_sample: None }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_sync {
            Some(last) => now.duration_since(last) >= self.period,
            None => true,
        }
    }

    /// Resolves a round trip given the local send/receive instants and
    /// the AP timestamp echoed back in its pong payload.
    pub fn record(&mut self, sent_at: Instant, received_at: Instant, ap_timestamp_ms: i64, local_sent_ms: i64) {
        let rtt_ms = received_at.duration_since(sent_at).as_millis() as u64;
        // Assume the AP's clock read landed at the midpoint of the round
        // trip; offset is how far ahead of us it claims to be at that point.
        let local_midpoint_ms = local_sent_ms + (rtt_ms / 2) as i64;
        let offset_ms = ap_timestamp_ms - local_midpoint_ms;
        self.last_sample = Some(TimeSyncSample { offset_ms, rtt_ms });
        self.last_sync = Some(received_at);
    }

    pub fn latest(&self) -> Option<TimeSyncSample> {
        self.last_sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_due_before_any_sync_has_happened() {
        let sync = TimeSync::new(Duration::from_secs(60));
        assert!(sync.is_due(Instant::now()));
    }

    #[test]
    fn records_a_sample_and_is_not_due_immediately_after() {
        let mut sync = TimeSync::new(Duration::from_secs(60));
        let sent = Instant::now();
        let received = sent + Duration::from_millis(40);
        sync.record(sent, received, 1_000_040, 1_000_000);

        let sample = sync.latest().unwrap();
        assert_eq!(sample.rtt_ms, 40);
        assert!(!sync.is_due(received));
    }
}
