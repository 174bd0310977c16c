use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("AP signature verification failed")]
    SignatureInvalid,

    #[error("DH public key out of range")]
    InvalidPublicKey,

    #[error("MAC mismatch on incoming frame")]
    MacMismatch,

    #[error("key material has wrong length: expected {expected}, got {got}")]
    BadKeyLength { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, CryptoError>;
