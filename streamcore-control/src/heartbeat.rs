//! The control-plane heartbeat (C9, §4.8): "a separate periodic task
//! that, every 30 s, (a) refreshes provider-B API JWT if within 60 s of
//! expiry, (b) re-calls `session/start` if the X-session expires, (c)
//! emits current renderer state if active." Provider-specific duties are
//! injected through [`HeartbeatDuties`] so this crate stays independent
//! of `streamcore-spotify`/`streamcore-qobuz`.

use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(30);

/// The three duties §4.8 assigns the heartbeat task, implemented once
/// per provider by whichever crate owns that provider's session (the
/// composition root wires the concrete type in).
#[async_trait]
pub trait HeartbeatDuties: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// (a) Refreshes the provider API token if it is within 60 s of
    /// expiry. A no-op for providers without a token lifetime (provider A).
    async fn refresh_token_if_expiring(&self) -> Result<(), Self::Error>;

    /// (b) Re-establishes the session if the provider's short-lived
    /// session handle has expired.
    async fn restart_session_if_expired(&self) -> Result<(), Self::Error>;

    /// (c) Emits the current renderer state to the peer, only if this
    /// provider is the currently active renderer.
    async fn emit_renderer_state_if_active(&self) -> Result<(), Self::Error>;
}

/// Runs the three duties on a fixed 30 s period until the duties
/// implementation signals a fatal error by... actually, per §7 heartbeat
/// failures are logged and retried on the next tick, not fatal — this
/// loop never exits on its own.
pub async fn run_heartbeat<D: HeartbeatDuties>(duties: D) {
    let mut ticker = tokio::time::interval(HEARTBEAT_PERIOD);
    loop {
        ticker.tick().await;

        if let Err(err) = duties.refresh_token_if_expiring().await {
            warn!(error = %err, "heartbeat: token refresh failed");
        }
        if let Err(err) = duties.restart_session_if_expired().await {
            warn!(error = %err, "heartbeat: session restart failed");
        }
        if let Err(err) = duties.emit_renderer_state_if_active().await {
            warn!(error = %err, "heartbeat: renderer state emit failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, thiserror::Error)]
    #[error("fake duty error")]
    struct FakeError;

    struct CountingDuties {
        ticks: Arc<AtomicU32>,
    }

    #[async_trait]
    impl HeartbeatDuties for CountingDuties {
        type Error = FakeError;

        async fn refresh_token_if_expiring(&self) -> Result<(), Self::Error> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn restart_session_if_expired(&self) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn emit_renderer_state_if_active(&self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_runs_every_tick() {
        let ticks = Arc::new(AtomicU32::new(0));
        let duties = CountingDuties { ticks: ticks.clone() };

        let handle = tokio::spawn(run_heartbeat(duties));
        tokio::time::advance(HEARTBEAT_PERIOD * 3 + Duration::from_millis(1)).await;
        handle.abort();

        assert!(ticks.load(Ordering::SeqCst) >= 3);
    }
}
