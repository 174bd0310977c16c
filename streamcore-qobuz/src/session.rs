//! The provider-B session (§4.4): establishes `session/start` over HTTPS,
//! connects the WebSocket, authenticates it, and runs a read loop that
//! hands decoded [`Payload`] envelopes to whoever holds the session.
//! Batch decoding into `QueueMessage` stays the control plane's job
//! (§3 data flow: "C3/C4 → C9 (decode envelope) → C5 (mutate state)"),
//! so this crate only unwraps the wire envelope, never the inner batch.

use crate::api::QobuzApi;
use crate::envelope::{controller_destination, Payload, KIND_AUTHENTICATE};
use crate::error::{QobuzError, Result};
use crate::ws::QobuzWs;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use streamcore_net::session::{ProviderSession, SessionState};
use tokio::sync::mpsc;
use tracing::{info, warn};

fn state_to_u8(state: SessionState) -> u8 {
    match state {
        SessionState::Disconnected => 0,
        SessionState::Handshaking => 1,
        SessionState::Authenticating => 2,
        SessionState::Ready => 3,
        SessionState::Recovering => 4,
        SessionState::Closed => 5,
    }
}

fn u8_to_state(v: u8) -> SessionState {
    match v {
        0 => SessionState::Disconnected,
        1 => SessionState::Handshaking,
        2 => SessionState::Authenticating,
        3 => SessionState::Ready,
        4 => SessionState::Recovering,
        _ => SessionState::Closed,
    }
}

/// A cheap, cloneable handle to a running provider-B session.
#[derive(Clone)]
pub struct QobuzSession {
    api: Arc<QobuzApi>,
    profile: Arc<str>,
    state: Arc<AtomicU8>,
    message_id: Arc<AtomicU64>,
    outbound_tx: mpsc::UnboundedSender<Payload>,
    reconnect_tx: mpsc::UnboundedSender<()>,
}

/// Performs the WS handshake plus the auth payload send that both the
/// initial connect and a post-refresh reconnect need (§4.4/§4.8: "close
/// the socket; the task loop reconnects using the new endpoint/jwt").
async fn establish_ws(ws_url: &str, api: &QobuzApi) -> Result<QobuzWs> {
    let mut ws = QobuzWs::connect(ws_url).await?;
    let auth_payload = Payload {
        msg_id: 0,
        msg_date_ms: 0,
        dests: vec![controller_destination()],
        batch: api.auth().session_id.clone().into_bytes(),
    };
    ws.send_payload(&auth_payload).await?;
    Ok(ws)
}

enum LoopExit {
    Reconnect,
    Closed,
}

impl QobuzSession {
    /// Starts a session against `ws_url`, performing `session/start`,
    /// the WS handshake, and authentication. Returns the handle plus the
    /// inbound-payload receiver (taken once by the caller, typically
    /// `streamcore-control`'s dispatch loop).
    pub async fn connect(
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        profile: &str,
        ws_url: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Payload>)> {
        let state = Arc::new(AtomicU8::new(state_to_u8(SessionState::Handshaking)));
        let api = Arc::new(QobuzApi::new(app_id, app_secret)?);
        api.session_start(profile).await?;

        state.store(state_to_u8(SessionState::Authenticating), Ordering::SeqCst);
        let ws = establish_ws(ws_url, &api).await?;

        state.store(state_to_u8(SessionState::Ready), Ordering::SeqCst);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Payload>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (reconnect_tx, reconnect_rx) = mpsc::unbounded_channel::<()>();

        let loop_state = state.clone();
        let loop_api = api.clone();
        let loop_ws_url = ws_url.to_string();
        tokio::spawn(run_supervisor(ws, loop_ws_url, loop_api, outbound_rx, inbound_tx, loop_state, reconnect_rx));

        Ok((
            QobuzSession {
                api,
                profile: Arc::from(profile),
                state,
                message_id: Arc::new(AtomicU64::new(1)),
                outbound_tx,
                reconnect_tx,
            },
            inbound_rx,
        ))
    }

    pub fn api(&self) -> &QobuzApi {
        &self.api
    }

    /// Re-calls `session/start` if the current `X-Session-Id` is stale
    /// (§4.8 duty (b)), then closes and reconnects the socket so the new
    /// session id reaches the WS authenticate payload. Returns whether a
    /// restart actually happened.
    pub async fn restart_session_if_expired(&self) -> Result<bool> {
        if !self.api.session_expiring_soon() {
            return Ok(false);
        }
        self.api.session_start(&self.profile).await?;
        self.request_reconnect()?;
        Ok(true)
    }

    /// Wraps `batch` (an already-serialized `QConnectBatch`) into a
    /// `Payload` with a strictly increasing `msg_id` (§4.8 "Outbound
    /// envelope `msg_id` is strictly increasing per provider") and queues
    /// it for the session loop to send.
    pub fn send_batch(&self, batch: Vec<u8>, msg_date_ms: i64) -> Result<()> {
        let msg_id = self.message_id.fetch_add(1, Ordering::SeqCst);
        let payload = Payload { msg_id, msg_date_ms, dests: vec![controller_destination()], batch };
        self.outbound_tx.send(payload).map_err(|_| QobuzError::Closed)
    }

    /// Closes the current socket and reconnects using whatever endpoint/
    /// auth `self.api` currently holds (§4.8: "close the socket; the task
    /// loop reconnects using the new endpoint/jwt"). Called by the
    /// heartbeat duty right after a successful token refresh.
    pub fn request_reconnect(&self) -> Result<()> {
        self.reconnect_tx.send(()).map_err(|_| QobuzError::Closed)
    }
}

#[async_trait]
impl ProviderSession for QobuzSession {
    type Error = QobuzError;

    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn send_heartbeat(&mut self) -> Result<()> {
        // The WS keepalive ping/pong is driven inside `QobuzWs::recv_record`.
        // Token refresh is gated and driven from `streamcore-control`'s
        // heartbeat duties instead (this tick has nothing of its own to do).
        Ok(())
    }

    fn state(&self) -> SessionState {
        u8_to_state(self.state.load(Ordering::SeqCst))
    }
}

async fn run_supervisor(
    mut ws: QobuzWs,
    ws_url: String,
    api: Arc<QobuzApi>,
    mut outbound_rx: mpsc::UnboundedReceiver<Payload>,
    inbound_tx: mpsc::UnboundedSender<Payload>,
    state: Arc<AtomicU8>,
    mut reconnect_rx: mpsc::UnboundedReceiver<()>,
) {
    loop {
        match run_session_loop(&mut ws, &mut outbound_rx, &inbound_tx, &state, &mut reconnect_rx).await {
            LoopExit::Closed => return,
            LoopExit::Reconnect => match establish_ws(&ws_url, &api).await {
                Ok(new_ws) => {
                    ws = new_ws;
                    state.store(state_to_u8(SessionState::Ready), Ordering::SeqCst);
                    info!("provider-B reconnected with refreshed credentials");
                }
                Err(err) => {
                    warn!(error = %err, "provider-B reconnect failed");
                    state.store(state_to_u8(SessionState::Closed), Ordering::SeqCst);
                    return;
                }
            },
        }
    }
}

async fn run_session_loop(
    ws: &mut QobuzWs,
    outbound_rx: &mut mpsc::UnboundedReceiver<Payload>,
    inbound_tx: &mpsc::UnboundedSender<Payload>,
    state: &Arc<AtomicU8>,
    reconnect_rx: &mut mpsc::UnboundedReceiver<()>,
) -> LoopExit {
    loop {
        tokio::select! {
            Some(()) = reconnect_rx.recv() => {
                let _ = ws.close().await;
                state.store(state_to_u8(SessionState::Recovering), Ordering::SeqCst);
                return LoopExit::Reconnect;
            }
            Some(payload) = outbound_rx.recv() => {
                if ws.send_payload(&payload).await.is_err() {
                    state.store(state_to_u8(SessionState::Closed), Ordering::SeqCst);
                    return LoopExit::Closed;
                }
            }
            record = ws.recv_record() => {
                match record {
                    Ok(Some(record)) if record.kind == KIND_AUTHENTICATE => {
                        info!("provider-B re-authentication acknowledged");
                    }
                    Ok(Some(record)) => {
                        if let Some(payload) = Payload::decode(&record.payload) {
                            if inbound_tx.send(payload).is_err() {
                                return LoopExit::Closed;
                            }
                        } else {
                            warn!("dropping malformed provider-B payload");
                        }
                    }
                    Ok(None) => {
                        state.store(state_to_u8(SessionState::Recovering), Ordering::SeqCst);
                        return LoopExit::Closed;
                    }
                    Err(err) => {
                        warn!(error = %err, "provider-B session loop ended");
                        state.store(state_to_u8(SessionState::Recovering), Ordering::SeqCst);
                        return LoopExit::Closed;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_its_u8_encoding() {
        for state in [
            SessionState::Disconnected,
            SessionState::Handshaking,
            SessionState::Authenticating,
            SessionState::Ready,
            SessionState::Recovering,
            SessionState::Closed,
        ] {
            assert_eq!(u8_to_state(state_to_u8(state)), state);
        }
    }
}
