//! Error taxonomy for the provider-A session (§4.3, §7 "Fatal-to-session").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpotifyError {
    #[error("access point connection failed: {0}")]
    Connect(#[from] std::io::Error),

    #[error("AP signature verification failed")]
    BadSignature,

    #[error("login declined by access point")]
    LoginDeclined,

    #[error("mercury request {seq} failed")]
    MercuryFailed { seq: u64 },

    #[error("mercury request {seq} timed out")]
    MercuryTimeout { seq: u64 },

    #[error("audio key request exhausted its retry budget")]
    AudioKeyExhausted,

    #[error("audio key request {seq} failed with code {code:#x}")]
    AudioKeyFailed { seq: u32, code: u16 },

    #[error("frame MAC verification failed")]
    BadMac,

    #[error("unexpected frame command {0:#x}")]
    UnexpectedCommand(u8),

    #[error("session is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, SpotifyError>;
