//! WebSocket transport for provider B (§4.4): handshake, envelope framing
//! over binary frames, and the ping/pong keepalive. Grounded on
//! `original_source/StreamCore32/stream/qobuz/src/WebSocketClient.cpp`'s
//! connect/keepalive loop, rebuilt atop `tokio-tungstenite` rather than
//! the original's hand-rolled socket loop.

use crate::envelope::{Payload, Record, KIND_PAYLOAD, KIND_PING, KIND_PONG};
use crate::error::{QobuzError, Result};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

/// §4.4: "send a Ping if no outbound traffic for `ping_every_ms`".
pub const DEFAULT_PING_EVERY_MS: u64 = 30_000;
/// §4.4: "fail the connection if no Pong arrives within `pong_timeout_ms`".
pub const DEFAULT_PONG_TIMEOUT_MS: u64 = 10_000;
/// §4.4 timeouts table: "WS handshake 6 s".
pub const WS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(6);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct QobuzWs {
    stream: WsStream,
    last_rx: Instant,
    last_tx: Instant,
    pong_deadline: Option<Instant>,
}

impl QobuzWs {
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _response) = time::timeout(WS_HANDSHAKE_TIMEOUT, tokio_tungstenite::connect_async(url))
            .await
            .map_err(|_| QobuzError::WsClosed)??;
        let now = Instant::now();
        Ok(QobuzWs { stream, last_rx: now, last_tx: now, pong_deadline: None })
    }

    /// Sends one payload envelope wrapped as a `KIND_PAYLOAD` record
    /// (§4.8 "then into one framed record (kind=PAYLOAD)").
    pub async fn send_payload(&mut self, payload: &Payload) -> Result<()> {
        let record = Record { kind: KIND_PAYLOAD, payload: payload.encode() };
        self.stream.send(Message::Binary(record.encode())).await?;
        self.last_tx = Instant::now();
        Ok(())
    }

    async fn send_ping(&mut self) -> Result<()> {
        let record = Record { kind: KIND_PING, payload: Vec::new() };
        self.stream.send(Message::Binary(record.encode())).await?;
        self.last_tx = Instant::now();
        self.pong_deadline = Some(Instant::now() + Duration::from_millis(DEFAULT_PONG_TIMEOUT_MS));
        Ok(())
    }

    /// Reads the next record, transparently answering Pings with Pongs
    /// and clearing the pong deadline on Pong receipt (§4.4 "On receipt
    /// of a Ping, reply with the same payload as Pong"). Returns `None`
    /// on connection close.
    pub async fn recv_record(&mut self) -> Result<Option<Record>> {
        loop {
            let ping_every = Duration::from_millis(DEFAULT_PING_EVERY_MS);
            let idle_for = Instant::now().duration_since(self.last_tx);
            let next_ping_in = ping_every.saturating_sub(idle_for);

            let next_wakeup = match self.pong_deadline {
                Some(deadline) => next_ping_in.min(deadline.saturating_duration_since(Instant::now())),
                None => next_ping_in,
            };

            tokio::select! {
                _ = time::sleep(next_wakeup) => {
                    if let Some(deadline) = self.pong_deadline {
                        if Instant::now() >= deadline {
                            warn!("pong not received in time, closing websocket");
                            return Err(QobuzError::PongTimeout);
                        }
                    }
                    if Instant::now().duration_since(self.last_tx) >= ping_every {
                        self.send_ping().await?;
                    }
                }
                message = self.stream.next() => {
                    let message = match message {
                        Some(Ok(m)) => m,
                        Some(Err(err)) => return Err(QobuzError::WsHandshake(err)),
                        None => return Ok(None),
                    };
                    self.last_rx = Instant::now();

                    let bytes = match message {
                        Message::Binary(bytes) => bytes,
                        Message::Close(_) => return Ok(None),
                        _ => continue,
                    };

                    let (record, _consumed) = Record::decode(&bytes).ok_or(QobuzError::MalformedEnvelope)?;
                    match record.kind {
                        KIND_PING => {
                            let pong = Record { kind: KIND_PONG, payload: record.payload };
                            self.stream.send(Message::Binary(pong.encode())).await?;
                            self.last_tx = Instant::now();
                        }
                        KIND_PONG => {
                            self.pong_deadline = None;
                        }
                        _ => return Ok(Some(record)),
                    }
                }
            }
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_keepalive_timings_match_the_documented_defaults() {
        assert_eq!(DEFAULT_PING_EVERY_MS, 30_000);
        assert_eq!(DEFAULT_PONG_TIMEOUT_MS, 10_000);
    }
}
