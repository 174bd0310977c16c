//! Mercury request/response demultiplexing (§4.3 "Mercury multiplexing").
//! A single session task owns the framed transport and a seq→callback
//! map plus a seq→subscription map; callers interact through a cheap
//! cloneable [`MercuryClient`] handle that sends commands over a channel,
//! directly modeled on `pmoqobuz::client::QobuzClient`'s "cache-or-fetch"
//! method shape, generalized here to "pending-or-push".

use crate::error::{Result, SpotifyError};
use crate::proto::{MercuryKind, MercuryRequest, MercuryResponse};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// A resolved mercury response or subscription push, stripped of the
/// seq/kind framing the caller never needs.
#[derive(Debug, Clone)]
pub struct MercuryResult {
    pub status: u16,
    pub parts: Vec<Vec<u8>>,
}

impl MercuryResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub(crate) enum MercuryCommand {
    Request {
        kind: MercuryKind,
        uri: String,
        parts: Vec<Vec<u8>>,
        reply: oneshot::Sender<Result<MercuryResult>>,
    },
    Subscribe {
        uri_prefix: String,
        reply: oneshot::Sender<mpsc::UnboundedReceiver<MercuryResult>>,
    },
}

/// A cheap, cloneable handle to the mercury layer of a running session.
#[derive(Clone)]
pub struct MercuryClient {
    tx: mpsc::UnboundedSender<MercuryCommand>,
}

impl MercuryClient {
    pub(crate) fn new(tx: mpsc::UnboundedSender<MercuryCommand>) -> Self {
        MercuryClient { tx }
    }

    /// Issues a `GET` and awaits the response (§4.3 "the caller gets a
    /// sequence immediately; the callback is invoked... with either
    /// `{parts, header}` or `{fail}`").
    pub async fn get(&self, uri: impl Into<String>) -> Result<MercuryResult> {
        self.request(MercuryKind::Get, uri, Vec::new()).await
    }

    pub async fn send(&self, uri: impl Into<String>, parts: Vec<Vec<u8>>) -> Result<MercuryResult> {
        self.request(MercuryKind::Send, uri, parts).await
    }

    async fn request(&self, kind: MercuryKind, uri: impl Into<String>, parts: Vec<Vec<u8>>) -> Result<MercuryResult> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MercuryCommand::Request { kind, uri: uri.into(), parts, reply })
            .map_err(|_| SpotifyError::Closed)?;
        rx.await.map_err(|_| SpotifyError::Closed)?
    }

    /// Subscribes to push notifications whose URI matches `uri_prefix`.
    pub async fn subscribe(&self, uri_prefix: impl Into<String>) -> Result<mpsc::UnboundedReceiver<MercuryResult>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MercuryCommand::Subscribe { uri_prefix: uri_prefix.into(), reply })
            .map_err(|_| SpotifyError::Closed)?;
        rx.await.map_err(|_| SpotifyError::Closed)
    }
}

/// The session-task-owned demultiplexer state: `seq → pending oneshot`
/// for in-flight requests, and `uri_prefix → subscription sender` for
/// push notifications (§4.3) — pushes carry their own seq, unrelated to
/// the `SUB` request's, so they're routed by matching the push's URI
/// against the registered prefixes instead.
pub(crate) struct MercuryMultiplexer {
    next_seq: AtomicU64,
    pending: HashMap<u64, oneshot::Sender<Result<MercuryResult>>>,
    subscriptions: HashMap<String, mpsc::UnboundedSender<MercuryResult>>,
    pending_subscribes: HashMap<u64, (String, oneshot::Sender<mpsc::UnboundedReceiver<MercuryResult>>)>,
}

impl MercuryMultiplexer {
    pub fn new() -> Self {
        MercuryMultiplexer {
            next_seq: AtomicU64::new(1),
            pending: HashMap::new(),
            subscriptions: HashMap::new(),
            pending_subscribes: HashMap::new(),
        }
    }

    fn alloc_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Builds the wire request for a plain `GET`/`SEND` and registers the
    /// reply channel under the allocated seq.
    pub fn build_request(
        &mut self,
        kind: MercuryKind,
        uri: String,
        parts: Vec<Vec<u8>>,
        reply: oneshot::Sender<Result<MercuryResult>>,
    ) -> MercuryRequest {
        let seq = self.alloc_seq();
        self.pending.insert(seq, reply);
        MercuryRequest { seq, kind, uri, parts }
    }

    /// Builds the wire request for a `SUB` and parks the subscription's
    /// receiver until the ack arrives.
    pub fn build_subscribe(
        &mut self,
        uri_prefix: String,
        reply: oneshot::Sender<mpsc::UnboundedReceiver<MercuryResult>>,
    ) -> MercuryRequest {
        let seq = self.alloc_seq();
        self.pending_subscribes.insert(seq, (uri_prefix.clone(), reply));
        MercuryRequest { seq, kind: MercuryKind::Sub, uri: uri_prefix, parts: Vec::new() }
    }

    /// Routes one decoded [`MercuryResponse`]: a `SUB` ack or a plain
    /// request/response by its seq, or a push notification by matching
    /// its `uri` against the registered `uri_prefix`es (§4.3: "the
    /// session keeps a map `seq → callback` and a map `uri_prefix →
    /// subscription_callback` for push notifications").
    pub fn dispatch(&mut self, response: MercuryResponse) {
        if let Some((uri_prefix, reply)) = self.pending_subscribes.remove(&response.seq) {
            let (tx, rx) = mpsc::unbounded_channel();
            self.subscriptions.insert(uri_prefix, tx);
            let _ = reply.send(rx);
            return;
        }

        if let Some(reply) = self.pending.remove(&response.seq) {
            let result = MercuryResult { status: response.status_code, parts: response.parts };
            let outcome = if result.is_success() { Ok(result) } else { Err(SpotifyError::MercuryFailed { seq: response.seq }) };
            let _ = reply.send(outcome);
            return;
        }

        if let Some(uri) = &response.uri {
            if let Some(prefix) = self.subscriptions.keys().find(|prefix| uri.starts_with(prefix.as_str())).cloned() {
                let result = MercuryResult { status: response.status_code, parts: response.parts };
                if self.subscriptions.get(&prefix).map(|sender| sender.send(result).is_err()).unwrap_or(false) {
                    self.subscriptions.remove(&prefix);
                }
                return;
            }
        }

        warn!(seq = response.seq, uri = ?response.uri, "mercury: unmatched response, dropping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::MercuryResponse;

    #[test]
    fn a_request_resolves_through_dispatch() {
        let mut mux = MercuryMultiplexer::new();
        let (reply, mut rx) = oneshot::channel();
        let request = mux.build_request(MercuryKind::Get, "hm://metadata/3/track/abc".into(), Vec::new(), reply);

        mux.dispatch(MercuryResponse { seq: request.seq, status_code: 200, uri: None, parts: vec![b"ok".to_vec()] });

        let result = rx.try_recv().unwrap().unwrap();
        assert!(result.is_success());
        assert_eq!(result.parts, vec![b"ok".to_vec()]);
    }

    #[test]
    fn a_failed_request_resolves_to_an_error() {
        let mut mux = MercuryMultiplexer::new();
        let (reply, mut rx) = oneshot::channel();
        let request = mux.build_request(MercuryKind::Get, "hm://metadata/3/track/missing".into(), Vec::new(), reply);

        mux.dispatch(MercuryResponse { seq: request.seq, status_code: 404, uri: None, parts: vec![] });

        assert!(rx.try_recv().unwrap().is_err());
    }

    #[test]
    fn subscription_pushes_are_routed_by_uri_prefix_not_seq() {
        let mut mux = MercuryMultiplexer::new();
        let (reply, rx_of_rx) = oneshot::channel();
        let request = mux.build_subscribe("hm://queue".into(), reply);

        // The SUB ack arrives tagged with the SUB's own seq.
        mux.dispatch(MercuryResponse { seq: request.seq, status_code: 200, uri: None, parts: vec![] });
        let mut rx = rx_of_rx.try_recv().unwrap();

        // Pushes arrive on unrelated seqs, matched by uri prefix instead.
        mux.dispatch(MercuryResponse {
            seq: 9001,
            status_code: 200,
            uri: Some("hm://queue/1".into()),
            parts: vec![b"push-1".to_vec()],
        });
        mux.dispatch(MercuryResponse {
            seq: 9002,
            status_code: 200,
            uri: Some("hm://queue/2".into()),
            parts: vec![b"push-2".to_vec()],
        });

        assert_eq!(rx.try_recv().unwrap().parts, vec![b"push-1".to_vec()]);
        assert_eq!(rx.try_recv().unwrap().parts, vec![b"push-2".to_vec()]);
    }

    #[test]
    fn a_push_with_no_matching_prefix_is_dropped_not_misrouted() {
        let mut mux = MercuryMultiplexer::new();
        let (reply, rx_of_rx) = oneshot::channel();
        let request = mux.build_subscribe("hm://queue".into(), reply);
        mux.dispatch(MercuryResponse { seq: request.seq, status_code: 200, uri: None, parts: vec![] });
        let mut rx = rx_of_rx.try_recv().unwrap();

        mux.dispatch(MercuryResponse {
            seq: 4242,
            status_code: 200,
            uri: Some("hm://unrelated/topic".into()),
            parts: vec![b"stray".to_vec()],
        });

        assert!(rx.try_recv().is_err());
    }
}
