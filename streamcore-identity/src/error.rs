use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("device id must be exactly 16 bytes, got {0}")]
    BadLength(usize),

    #[error("invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("invalid base64url encoding: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("credential blob has bad magic bytes")]
    BadMagic,

    #[error("credential blob is shorter than the fixed header")]
    Truncated,

    #[error("unsupported credential blob version {0}")]
    UnsupportedVersion(u8),

    #[error("decryption failed (wrong device key or corrupted blob)")]
    DecryptFailed,

    #[error("no record found for user key {0:?}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, IdentityError>;
