//! Error taxonomy for the provider-B session (§4.4, §6, §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QobuzError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Qobuz API error (code {code}): {message}")]
    Api { code: u16, message: String },

    #[error("authentication failed: {0}")]
    Unauthorized(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("websocket handshake failed: {0}")]
    WsHandshake(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("websocket connection closed")]
    WsClosed,

    #[error("pong not received within the timeout")]
    PongTimeout,

    #[error("malformed envelope record")]
    MalformedEnvelope,

    #[error("session is closed")]
    Closed,
}

impl QobuzError {
    pub fn from_status_code(code: u16, message: impl Into<String>) -> Self {
        match code {
            401 | 403 => QobuzError::Unauthorized(message.into()),
            429 => QobuzError::RateLimited,
            _ => QobuzError::Api { code, message: message.into() },
        }
    }
}

pub type Result<T> = std::result::Result<T, QobuzError>;
