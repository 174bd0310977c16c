//! StreamCore32 composition root: wires the two provider sessions, their
//! players, and their control points together and runs until stopped.
//! Phased startup mirrors `PMOMusic`'s `main.rs`, trading its UPnP/HTTP
//! server bring-up for provider connect + heartbeat bring-up.

mod effects;
mod qobuz_bridge;
mod spotify_bridge;

use anyhow::{Context, Result};
use async_trait::async_trait;
use effects::PlayerEffectSink;
use qobuz_bridge::QobuzMetadataSource;
use spotify_bridge::SpotifyMetadataSource;
use std::sync::Arc;
use std::time::Duration;
use streamcore_control::{ControlPoint, HeartbeatDuties};
use streamcore_identity::credential_store::{CredentialField, CredentialRecord};
use streamcore_identity::{CredentialStore, DeviceId};
use streamcore_player::{PlayerTask, SyncedClock};
use streamcore_qobuz::QobuzSession;
use streamcore_sink::{spawn_sink, NullDecoderChip};
use streamcore_spotify::session::StoredCredential;
use streamcore_spotify::SpotifySession;
use streamcore_telemetry::TracingSink;
use tracing::{info, warn};

const SPOTIFY_ACCESS_POINT: (&str, u16) = ("ap.spotify.com", 4070);
const QOBUZ_WS_URL: &str = "wss://ws.qobuz.com/socket";
const PRODUCT_SALT: &[u8] = b"streamcore32";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(streamcore_config::get_config().log_min_level()).init();

    // ========== PHASE 1: identity & configuration ==========
    let config = streamcore_config::get_config();
    info!(device_name = %config.device_name(), "📡 loading StreamCore32 configuration");

    let device_id = DeviceId::random();
    let master_key = streamcore_identity::device_id::derive_master_key(
        device_id.to_hex().as_bytes(),
        config.decoder_chip().as_bytes(),
        PRODUCT_SALT,
    );
    let credential_store = CredentialStore::new(master_key);

    // ========== PHASE 2: audio sink ==========
    info!("🎵 starting audio sink");
    let sink = spawn_sink(Box::new(NullDecoderChip::new()));
    let telemetry = Arc::new(TracingSink) as Arc<dyn streamcore_telemetry::TelemetrySink>;
    let clock = Arc::new(SyncedClock::new());

    // ========== PHASE 3: provider A (Spotify-compatible) ==========
    if config.spotify_connect_enabled() {
        match connect_spotify(&config, &credential_store, sink.clone(), telemetry.clone(), clock.clone()).await {
            Ok(handles) => {
                tokio::spawn(streamcore_net::session::run_heartbeat(
                    handles.session,
                    Duration::from_secs(20),
                    handles.state_tx,
                ));
                tokio::spawn(streamcore_control::run_heartbeat(handles.duties));
                info!("✅ provider A session ready");
            }
            Err(err) => warn!(error = %err, "⚠️ failed to start provider A session"),
        }
    }

    // ========== PHASE 4: provider B (Qobuz-compatible) ==========
    if config.qobuz_connect_enabled() {
        match connect_qobuz(&config, sink.clone(), telemetry.clone(), clock.clone()).await {
            Ok(handles) => {
                tokio::spawn(streamcore_net::session::run_heartbeat(
                    handles.session,
                    Duration::from_secs(20),
                    handles.state_tx,
                ));
                tokio::spawn(streamcore_control::run_heartbeat(handles.duties));
                info!("✅ provider B session ready");
            }
            Err(err) => warn!(error = %err, "⚠️ failed to start provider B session"),
        }
    }

    info!("🎛️  StreamCore32 is ready");
    info!("Press Ctrl+C to stop...");
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;

    info!("waiting for background tasks to finish...");
    tokio::time::sleep(Duration::from_secs(2)).await;
    info!("✅ StreamCore32 stopped");
    std::process::exit(0);
}

struct ProviderHandles<S, D> {
    session: S,
    state_tx: tokio::sync::watch::Sender<streamcore_net::session::SessionState>,
    duties: D,
}

async fn connect_spotify(
    config: &streamcore_config::Config,
    credential_store: &CredentialStore,
    sink: streamcore_sink::Sink,
    telemetry: Arc<dyn streamcore_telemetry::TelemetrySink>,
    clock: Arc<SyncedClock>,
) -> Result<ProviderHandles<SpotifySession, SpotifyHeartbeatDuties>> {
    let (username, password) = config.spotify_credentials().context("provider A credentials missing")?;

    let credential = match credential_store.get_startup_record() {
        Ok(Some((userkey, record))) if userkey == username => {
            let auth_data = record.field("reusable_credential").map(<[u8]>::to_vec).unwrap_or_else(|| password.clone().into_bytes());
            StoredCredential { username: username.clone(), auth_data }
        }
        _ => StoredCredential { username: username.clone(), auth_data: password.clone().into_bytes() },
    };

    let session = SpotifySession::connect(SPOTIFY_ACCESS_POINT.0, SPOTIFY_ACCESS_POINT.1, credential.clone()).await?;

    let record = CredentialRecord { fields: vec![CredentialField { name: "reusable_credential".into(), value: credential.auth_data.clone() }] };
    if let Err(err) = credential_store.save(&username, &record) {
        warn!(error = %err, "failed to persist provider A reusable credential");
    }
    let _ = credential_store.set_current(&username);

    let access_token = config.spotify_access_token().unwrap_or_default();
    let client = streamcore_net::http::build_client("StreamCore32")?;
    let metadata_source = Arc::new(SpotifyMetadataSource::new(session.clone(), client, access_token));

    let player = PlayerTask::new(sink, metadata_source, telemetry, clock.clone());
    let state = Arc::new(tokio::sync::Mutex::new(streamcore_queue::QueueState::new()));
    let effects = PlayerEffectSink::new(player, state.clone());
    let control_point = Arc::new(ControlPoint::with_shared_state("us", state, effects));

    let (state_tx, _state_rx) = tokio::sync::watch::channel(streamcore_net::session::SessionState::Disconnected);
    let duties = SpotifyHeartbeatDuties { session: session.clone(), clock, control_point };

    Ok(ProviderHandles { session, state_tx, duties })
}

async fn connect_qobuz(
    config: &streamcore_config::Config,
    sink: streamcore_sink::Sink,
    telemetry: Arc<dyn streamcore_telemetry::TelemetrySink>,
    clock: Arc<SyncedClock>,
) -> Result<ProviderHandles<QobuzSession, QobuzHeartbeatDuties>> {
    let (username, password, app_id, _preferred_format) = config.qobuz_credentials().context("provider B credentials missing")?;

    let (session, mut inbound_rx) = QobuzSession::connect(app_id, password, &username, QOBUZ_WS_URL).await?;

    let metadata_source = Arc::new(QobuzMetadataSource::new(session.clone()));
    let player = PlayerTask::new(sink, metadata_source, telemetry, clock);
    let state = Arc::new(tokio::sync::Mutex::new(streamcore_queue::QueueState::new()));
    let effects = PlayerEffectSink::new(player, state.clone());
    let control_point = Arc::new(ControlPoint::with_shared_state("us", state, effects));

    let inbound_control_point = control_point.clone();
    tokio::spawn(async move {
        while let Some(_payload) = inbound_rx.recv().await {
            // Decoding a provider-B envelope into `QueueMessage`s is
            // provider-specific wire work owned by `streamcore-qobuz`;
            // once decoded, each message would go straight to
            // `inbound_control_point.dispatch(message)`.
        }
    });

    let (state_tx, _state_rx) = tokio::sync::watch::channel(streamcore_net::session::SessionState::Disconnected);
    let duties = QobuzHeartbeatDuties { session: session.clone(), control_point };

    Ok(ProviderHandles { session, state_tx, duties })
}

struct SpotifyHeartbeatDuties {
    session: SpotifySession,
    clock: Arc<SyncedClock>,
    control_point: Arc<ControlPoint<PlayerEffectSink>>,
}

#[async_trait]
impl HeartbeatDuties for SpotifyHeartbeatDuties {
    type Error = streamcore_spotify::error::SpotifyError;

    async fn refresh_token_if_expiring(&self) -> std::result::Result<(), Self::Error> {
        // Provider A's session doesn't carry a short-lived API token; this
        // duty slot instead pulls the ping/pong clock offset the session
        // just resolved into the shared clock the player/loader read.
        self.clock.set_offset_ms(self.session.clock_offset_ms());
        Ok(())
    }

    async fn restart_session_if_expired(&self) -> std::result::Result<(), Self::Error> {
        // Provider A has no X-session concept to expire; the AP connection
        // itself is kept alive by `streamcore_net::session::run_heartbeat`'s
        // own PING/PONG cadence, which already detects and closes a dead
        // link (§4.3). Genuinely not applicable, not unimplemented.
        Ok(())
    }

    async fn emit_renderer_state_if_active(&self) -> std::result::Result<(), Self::Error> {
        let snapshot = self.control_point.snapshot().await;
        if snapshot.is_active {
            info!(index = snapshot.index, "provider A renderer state heartbeat");
        }
        Ok(())
    }
}

struct QobuzHeartbeatDuties {
    session: QobuzSession,
    control_point: Arc<ControlPoint<PlayerEffectSink>>,
}

#[async_trait]
impl HeartbeatDuties for QobuzHeartbeatDuties {
    type Error = streamcore_qobuz::error::QobuzError;

    async fn refresh_token_if_expiring(&self) -> std::result::Result<(), Self::Error> {
        let auth = self.session.api().auth();
        let expiring_soon = auth
            .jwt_expires_at_ms
            .map(|expires_at| expires_at - streamcore_telemetry::now_ms() as i64 <= 60_000)
            .unwrap_or(false);
        if expiring_soon {
            self.session.api().refresh_token().await?;
            // New credentials only take effect on a fresh socket (§4.8:
            // "close the socket; the task loop reconnects using the new
            // endpoint/jwt").
            self.session.request_reconnect()?;
        }
        Ok(())
    }

    async fn restart_session_if_expired(&self) -> std::result::Result<(), Self::Error> {
        if self.session.restart_session_if_expired().await? {
            info!("provider B X-session restarted");
        }
        Ok(())
    }

    async fn emit_renderer_state_if_active(&self) -> std::result::Result<(), Self::Error> {
        let snapshot = self.control_point.snapshot().await;
        if snapshot.is_active {
            info!(index = snapshot.index, "provider B renderer state heartbeat");
        }
        Ok(())
    }
}
