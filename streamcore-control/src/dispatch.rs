//! Outbound batch wrapping and inbound decode dispatch (C9, §4.8): "wraps
//! N typed messages into a `Batch(version=1, timestamp_ms, seq=++message_id,
//! messages=[...])`, then into an envelope with destination list `[[0x02]]`,
//! then into one framed record (kind=PAYLOAD)". The wire shape of a
//! message/envelope differs per provider (mercury vs. protobuf), so this
//! module only owns the parts that are the same across both: the strictly
//! increasing `seq`, the `version`/`timestamp_ms` wrapper, and the
//! single-destination/single-record framing contract, expressed as a
//! transport trait each provider crate's session satisfies.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// "destination list `[[0x02]]`" (§4.8): every outbound batch addresses
/// exactly the controller destination.
pub const CONTROLLER_DESTINATION: [u8; 1] = [0x02];

/// A wrapped batch of already-encoded messages, ready to hand to a
/// provider session for framing and transmission.
#[derive(Debug, Clone)]
pub struct OutboundBatch {
    pub version: u8,
    pub timestamp_ms: u64,
    pub seq: u64,
    pub messages: Vec<Vec<u8>>,
}

/// What a provider session exposes to the dispatcher for sending an
/// already-wrapped batch (mercury framing for provider A, WS envelope +
/// protobuf `Payload` for provider B — each crate implements this over
/// its own session type).
#[async_trait]
pub trait OutboundTransport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn send_batch(&self, batch: OutboundBatch) -> Result<(), Self::Error>;
}

/// Owns the strictly-increasing `message_id`/`seq` counter (§4.8:
/// "`message_id` is an `AtomicU64` incremented with `Ordering::SeqCst`,
/// satisfying §5's 'strictly increasing per provider' ordering guarantee
/// without a lock").
pub struct BatchDispatcher<T> {
    transport: Arc<T>,
    message_id: AtomicU64,
}

impl<T: OutboundTransport> BatchDispatcher<T> {
    pub fn new(transport: Arc<T>) -> Self {
        BatchDispatcher { transport, message_id: AtomicU64::new(0) }
    }

    /// Wraps `messages` into a `Batch(version=1, timestamp_ms, seq, messages)`
    /// and hands it to the transport.
    pub async fn dispatch(&self, timestamp_ms: u64, messages: Vec<Vec<u8>>) -> Result<u64, T::Error> {
        let seq = self.message_id.fetch_add(1, Ordering::SeqCst) + 1;
        let batch = OutboundBatch { version: 1, timestamp_ms, seq, messages };
        self.transport.send_batch(batch).await?;
        Ok(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, thiserror::Error)]
    #[error("fake transport error")]
    struct FakeError;

    struct RecordingTransport {
        sent: Mutex<Vec<OutboundBatch>>,
    }

    #[async_trait]
    impl OutboundTransport for RecordingTransport {
        type Error = FakeError;

        async fn send_batch(&self, batch: OutboundBatch) -> Result<(), Self::Error> {
            self.sent.lock().unwrap().push(batch);
            Ok(())
        }
    }

    #[tokio::test]
    async fn seq_increases_strictly_across_dispatches() {
        let transport = Arc::new(RecordingTransport { sent: Mutex::new(Vec::new()) });
        let dispatcher = BatchDispatcher::new(transport.clone());

        let first = dispatcher.dispatch(1_000, vec![vec![1, 2, 3]]).await.unwrap();
        let second = dispatcher.dispatch(1_001, vec![vec![4]]).await.unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(transport.sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn controller_destination_is_the_single_documented_byte() {
        assert_eq!(CONTROLLER_DESTINATION, [0x02]);
    }
}
