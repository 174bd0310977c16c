//! Signed HTTPS JSON API client for provider B (§4.6 step 1/3, §6
//! "HTTPS JSON API"). Generalizes `pmoqobuz::api::QobuzApi`'s
//! request/response handling to the object/action surface this rework
//! needs: `track/get`, `track/getFileUrl`, and the `session/start` +
//! token-refresh calls §4.8's heartbeat drives.

use crate::error::{QobuzError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};
use streamcore_crypto::qobuz_sign::{request_timestamp, sign};
use streamcore_net::http::build_client;
use tracing::{debug, warn};

const API_BASE_URL: &str = "https://www.qobuz.com/api.json/0.2";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:67.0) Gecko/20100101 Firefox/67.0";

/// How long an `X-Session-Id` from `session/start` is treated as valid
/// before the heartbeat re-calls `session/start` (§4.8 duty (b)). Not
/// specified on the wire; chosen to comfortably outlast the 30s heartbeat
/// period while still catching a stale session well before a provider
/// would reject it.
const SESSION_TTL_MS: i64 = 60 * 60 * 1000;

fn epoch_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

/// Authentication material the heartbeat (C9) refreshes on a schedule
/// (§4.8 "JWT refresh within 60 s of expiry").
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub session_id: String,
    pub user_auth_token: Option<String>,
    pub bearer_jwt: Option<String>,
    pub jwt_expires_at_ms: Option<i64>,
    pub session_established_at_ms: Option<i64>,
}

pub struct QobuzApi {
    client: reqwest::Client,
    app_id: String,
    app_secret: String,
    auth: RwLock<AuthState>,
}

impl QobuzApi {
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Result<Self> {
        let client = build_client(USER_AGENT)?;
        Ok(QobuzApi { client, app_id: app_id.into(), app_secret: app_secret.into(), auth: RwLock::new(AuthState::default()) })
    }

    pub fn set_auth(&self, auth: AuthState) {
        *self.auth.write().unwrap() = auth;
    }

    pub fn auth(&self) -> AuthState {
        self.auth.read().unwrap().clone()
    }

    /// `track/get?track_id=…` (§4.6 step 1).
    pub async fn track_get(&self, track_id: &str) -> Result<Value> {
        self.request_unsigned("track", "get", &[("track_id", track_id)]).await
    }

    /// `track/getFileUrl?format_id=…&intent=stream&track_id=…`, signed
    /// (§4.6 step 1, §6 "requests that require signing").
    pub async fn track_get_file_url(&self, track_id: &str, format_id: &str) -> Result<Value> {
        let params = [("track_id", track_id), ("format_id", format_id), ("intent", "stream")];
        self.request_signed("track", "getFileUrl", &params).await
    }

    /// `session/start`, signed, establishing `X-Session-Id` for the
    /// WebSocket handshake that follows (§4.4). Records the session's
    /// establishment time so the heartbeat can detect when it's stale
    /// and re-call this.
    pub async fn session_start(&self, profile: &str) -> Result<Value> {
        let response = self.request_signed("session", "start", &[("profile", profile)]).await?;
        if let Some(session_id) = response.get("session_id").and_then(Value::as_str) {
            let mut auth = self.auth.write().unwrap();
            auth.session_id = session_id.to_string();
            auth.session_established_at_ms = Some(epoch_ms());
        }
        Ok(response)
    }

    /// True once the current session is within `SESSION_TTL_MS` of the
    /// age at which the heartbeat should re-establish it (§4.8 duty (b)).
    pub fn session_expiring_soon(&self) -> bool {
        match self.auth.read().unwrap().session_established_at_ms {
            Some(established_at) => epoch_ms() - established_at >= SESSION_TTL_MS,
            None => true,
        }
    }

    /// Fixed 2 s backoff token refresh (§4.8 heartbeat note).
    pub async fn refresh_token(&self) -> Result<()> {
        let response = self.request_signed("session", "refresh", &[]).await?;
        if let Some(token) = response.get("user_auth_token").and_then(Value::as_str) {
            let mut auth = self.auth.write().unwrap();
            auth.user_auth_token = Some(token.to_string());
        }
        Ok(())
    }

    async fn request_unsigned(&self, object: &str, action: &str, params: &[(&str, &str)]) -> Result<Value> {
        self.request(object, action, params, false).await
    }

    async fn request_signed(&self, object: &str, action: &str, params: &[(&str, &str)]) -> Result<Value> {
        self.request(object, action, params, true).await
    }

    async fn request(&self, object: &str, action: &str, params: &[(&str, &str)], signed: bool) -> Result<Value> {
        let url = format!("{API_BASE_URL}/{object}/{action}");
        let mut query: Vec<(String, String)> = params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();

        if signed {
            let ts = request_timestamp();
            let sig = sign(object, action, params, &ts, &self.app_secret);
            query.push(("request_ts".into(), ts));
            query.push(("request_sig".into(), sig));
        }

        let auth = self.auth.read().unwrap().clone();
        let mut builder = self
            .client
            .get(&url)
            .query(&query)
            .header("X-App-Id", &self.app_id)
            .header("Referer", "https://play.qobuz.com/")
            .header("Origin", "https://play.qobuz.com");
        if !auth.session_id.is_empty() {
            builder = builder.header("X-Session-Id", &auth.session_id);
        }
        if let Some(jwt) = &auth.bearer_jwt {
            builder = builder.header("Authorization", format!("Bearer {jwt}"));
        } else if let Some(token) = &auth.user_auth_token {
            builder = builder.header("X-User-Auth-Token", token);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(object, action, status = status.as_u16(), "qobuz api call failed");
            return Err(QobuzError::from_status_code(status.as_u16(), body));
        }

        let body: Value = response.json().await?;
        debug!(object, action, "qobuz api call succeeded");
        parse_api_body(body)
    }
}

fn parse_api_body(body: Value) -> Result<Value> {
    if let Some(status) = body.get("status").and_then(Value::as_str) {
        if status == "error" {
            let message = body.get("message").and_then(Value::as_str).unwrap_or("unknown api error").to_string();
            return Err(QobuzError::Api { code: 0, message });
        }
    }
    Ok(body)
}

pub fn parse_json<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(QobuzError::Json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_api_body_surfaces_error_status() {
        let body = serde_json::json!({"status": "error", "message": "bad track id"});
        let result = parse_api_body(body);
        assert!(result.is_err());
    }

    #[test]
    fn parse_api_body_passes_through_success() {
        let body = serde_json::json!({"id": 42});
        let result = parse_api_body(body.clone()).unwrap();
        assert_eq!(result, body);
    }
}
