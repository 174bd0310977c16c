//! The provider-A session (§4.3): owns the TCP connection to an access
//! point, drives the DH handshake and login exchange, and runs a single
//! read loop that demultiplexes mercury responses, audio-key responses,
//! and pings to their respective handlers. External callers interact
//! through the cloneable [`MercuryClient`] handle; the session itself
//! only implements [`ProviderSession`] for the heartbeat driver in
//! `streamcore-net`.

use crate::audio_key::{AudioKeyCommand, AudioKeyMultiplexer};
use crate::error::{Result, SpotifyError};
use crate::handshake::perform_handshake;
use crate::mercury::{MercuryClient, MercuryCommand, MercuryMultiplexer};
use crate::proto::{AudioKeyRequest, AudioKeyResponse, MercuryResponse};
use crate::shannon_framing::FramedSession;
use crate::time_sync::TimeSync;
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use streamcore_net::session::{ProviderSession, SessionState};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

const CMD_LOGIN_REQUEST: u8 = 0xAB;
const CMD_LOGIN_OK: u8 = 0xAC;
const CMD_LOGIN_DECLINED: u8 = 0xAD;
const CMD_MERCURY_REQUEST: u8 = 0xB2;
const CMD_MERCURY_RESPONSE: u8 = 0xB3;
const CMD_AUDIO_KEY_REQUEST: u8 = 0x0c;
const CMD_AUDIO_KEY_RESPONSE_OK: u8 = 0x0d;
const CMD_AUDIO_KEY_RESPONSE_ERR: u8 = 0x0e;
const CMD_PING: u8 = 0x04;
const CMD_PONG: u8 = 0x49;

/// A stored, reusable login credential (§4.3 "RECOVERING attempts at most
/// one reconnect with the saved reusable credential").
#[derive(Clone)]
pub struct StoredCredential {
    pub username: String,
    pub auth_data: Vec<u8>,
}

/// Handle side of the running session: the piece `streamcore-control`
/// holds onto. Cloning is cheap; all clones share the same background
/// task.
#[derive(Clone)]
pub struct SpotifySession {
    mercury: MercuryClient,
    audio_key_tx: mpsc::UnboundedSender<AudioKeyCommand>,
    state: std::sync::Arc<std::sync::atomic::AtomicU8>,
    heartbeat_tx: mpsc::UnboundedSender<()>,
    clock_offset_ms: Arc<AtomicI64>,
}

fn epoch_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

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

impl SpotifySession {
    /// Connects to `host:port`, performs the handshake and login, and
    /// spawns the background frame loop. Returns a handle once `READY`.
    pub async fn connect(host: &str, port: u16, credential: StoredCredential) -> Result<Self> {
        let state = std::sync::Arc::new(std::sync::atomic::AtomicU8::new(state_to_u8(SessionState::Handshaking)));

        let mut tcp = TcpStream::connect((host, port)).await?;
        let keys = perform_handshake(&mut tcp).await?;

        let mut framed = FramedSession::new(tcp, keys);

        state.store(state_to_u8(SessionState::Authenticating), std::sync::atomic::Ordering::SeqCst);
        let login_payload = encode_login_request(&credential);
        framed.write_frame(CMD_LOGIN_REQUEST, &login_payload).await?;
        let (cmd, _payload) = framed.read_frame().await?;
        match cmd {
            CMD_LOGIN_OK => {}
            CMD_LOGIN_DECLINED => return Err(SpotifyError::LoginDeclined),
            other => return Err(SpotifyError::UnexpectedCommand(other)),
        }
        state.store(state_to_u8(SessionState::Ready), std::sync::atomic::Ordering::SeqCst);

        let (mercury_tx, mercury_rx) = mpsc::unbounded_channel();
        let (audio_key_tx, audio_key_rx) = mpsc::unbounded_channel();
        let (heartbeat_tx, heartbeat_rx) = mpsc::unbounded_channel();
        let clock_offset_ms = Arc::new(AtomicI64::new(0));

        let loop_state = state.clone();
        let loop_clock_offset = clock_offset_ms.clone();
        tokio::spawn(run_session_loop(framed, mercury_rx, audio_key_rx, heartbeat_rx, loop_state, loop_clock_offset));

        Ok(SpotifySession {
            mercury: MercuryClient::new(mercury_tx),
            audio_key_tx,
            state,
            heartbeat_tx,
            clock_offset_ms,
        })
    }

    pub fn mercury(&self) -> &MercuryClient {
        &self.mercury
    }

    /// Requests the content key for `(track_gid, file_gid)` (§4.3 "Audio
    /// key service").
    pub async fn request_audio_key(&self, track_gid: Vec<u8>, file_gid: Vec<u8>) -> Result<[u8; 16]> {
        let (reply, rx) = oneshot::channel();
        self.audio_key_tx
            .send(AudioKeyCommand::Request { track_gid, file_gid, reply })
            .map_err(|_| SpotifyError::Closed)?;
        rx.await.map_err(|_| SpotifyError::Closed)?
    }

    /// The AP-minus-local clock offset from the most recent ping/pong
    /// round trip (§3/§4.3 "shared synced clock owned by C3 session"),
    /// zero until the first round trip resolves. The composition root
    /// polls this into the shared `SyncedClock` it hands to the player.
    pub fn clock_offset_ms(&self) -> i64 {
        self.clock_offset_ms.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderSession for SpotifySession {
    type Error = SpotifyError;

    async fn connect(&mut self) -> Result<()> {
        // The real connection is established in the associated
        // `SpotifySession::connect` constructor; `ProviderSession::connect`
        // is a no-op once a handle already exists, matching
        // `run_heartbeat`'s expectation of an already-live session.
        Ok(())
    }

    async fn send_heartbeat(&mut self) -> Result<()> {
        self.heartbeat_tx.send(()).map_err(|_| SpotifyError::Closed)
    }

    fn state(&self) -> SessionState {
        u8_to_state(self.state.load(std::sync::atomic::Ordering::SeqCst))
    }
}

fn encode_login_request(credential: &StoredCredential) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + credential.username.len() + 2 + credential.auth_data.len());
    buf.extend_from_slice(&(credential.username.len() as u16).to_be_bytes());
    buf.extend_from_slice(credential.username.as_bytes());
    buf.extend_from_slice(&(credential.auth_data.len() as u16).to_be_bytes());
    buf.extend_from_slice(&credential.auth_data);
    buf
}

/// The single task that owns the framed transport: writes mercury/audio-
/// key requests as they arrive on their command channels, and dispatches
/// every inbound frame to the right demultiplexer.
async fn run_session_loop(
    mut framed: FramedSession<TcpStream>,
    mut mercury_rx: mpsc::UnboundedReceiver<MercuryCommand>,
    mut audio_key_rx: mpsc::UnboundedReceiver<AudioKeyCommand>,
    mut heartbeat_rx: mpsc::UnboundedReceiver<()>,
    state: std::sync::Arc<std::sync::atomic::AtomicU8>,
    clock_offset_ms: Arc<AtomicI64>,
) {
    let mut mercury_mux = MercuryMultiplexer::new();
    let mut audio_key_mux = AudioKeyMultiplexer::new();
    let mut time_sync = TimeSync::new(Duration::from_secs(300));
    // Set when a ping is sent, cleared once its pong resolves a sample
    // (§4.3 "Time sync... periodic ping with server timestamp").
    let mut pending_ping: Option<(Instant, i64)> = None;

    loop {
        tokio::select! {
            Some(command) = mercury_rx.recv() => {
                let request = match command {
                    MercuryCommand::Request { kind, uri, parts, reply } => {
                        mercury_mux.build_request(kind, uri, parts, reply)
                    }
                    MercuryCommand::Subscribe { uri_prefix, reply } => {
                        mercury_mux.build_subscribe(uri_prefix, reply)
                    }
                };
                if framed.write_frame(CMD_MERCURY_REQUEST, &request.encode()).await.is_err() {
                    state.store(state_to_u8(SessionState::Closed), std::sync::atomic::Ordering::SeqCst);
                    return;
                }
            }
            Some(AudioKeyCommand::Request { track_gid, file_gid, reply }) = audio_key_rx.recv() => {
                let seq = audio_key_mux.register(reply);
                let request = AudioKeyRequest { track_gid, file_gid, seq };
                if framed.write_frame(CMD_AUDIO_KEY_REQUEST, &request.encode()).await.is_err() {
                    state.store(state_to_u8(SessionState::Closed), std::sync::atomic::Ordering::SeqCst);
                    return;
                }
            }
            Some(()) = heartbeat_rx.recv() => {
                let local_sent_ms = epoch_ms();
                if framed.write_frame(CMD_PING, &local_sent_ms.to_be_bytes()).await.is_err() {
                    state.store(state_to_u8(SessionState::Closed), std::sync::atomic::Ordering::SeqCst);
                    return;
                }
                pending_ping = Some((Instant::now(), local_sent_ms));
            }
            frame = framed.read_frame() => {
                match frame {
                    Ok((CMD_MERCURY_RESPONSE, payload)) => {
                        if let Some(response) = MercuryResponse::decode(&payload) {
                            mercury_mux.dispatch(response);
                        }
                    }
                    Ok((cmd, payload)) if cmd == CMD_AUDIO_KEY_RESPONSE_OK || cmd == CMD_AUDIO_KEY_RESPONSE_ERR => {
                        if let Some(response) = AudioKeyResponse::decode(cmd, &payload) {
                            audio_key_mux.dispatch(response);
                        }
                    }
                    Ok((CMD_PONG, payload)) => {
                        if let (Some((sent_at, local_sent_ms)), true) = (pending_ping.take(), payload.len() >= 8) {
                            let mut ap_timestamp_bytes = [0u8; 8];
                            ap_timestamp_bytes.copy_from_slice(&payload[..8]);
                            let ap_timestamp_ms = i64::from_be_bytes(ap_timestamp_bytes);
                            time_sync.record(sent_at, Instant::now(), ap_timestamp_ms, local_sent_ms);
                            if let Some(sample) = time_sync.latest() {
                                clock_offset_ms.store(sample.offset_ms, Ordering::SeqCst);
                            }
                        }
                    }
                    Ok((cmd, _)) => {
                        warn!(cmd = format!("{cmd:#x}"), "unhandled provider-A frame");
                    }
                    Err(SpotifyError::BadMac) => {
                        // §4.3 "closed on MAC failure" / §4.6 "decrypt
                        // MAC/tag error (provider A frame path) -> abort
                        // the session (not the track)": a bad MAC means
                        // the cipher state is desynced, so there's nothing
                        // to recover from within this connection — close
                        // outright rather than going through `Recovering`.
                        warn!("provider-A frame MAC verification failed, aborting session");
                        state.store(state_to_u8(SessionState::Closed), std::sync::atomic::Ordering::SeqCst);
                        return;
                    }
                    Err(err) => {
                        warn!(error = %err, "provider-A frame loop ended");
                        state.store(state_to_u8(SessionState::Recovering), std::sync::atomic::Ordering::SeqCst);
                        return;
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
    fn encode_login_request_carries_username_and_auth_data() {
        let credential = StoredCredential { username: "listener".into(), auth_data: vec![1, 2, 3] };
        let encoded = encode_login_request(&credential);
        assert!(encoded.len() > credential.username.len() + credential.auth_data.len());
    }

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
