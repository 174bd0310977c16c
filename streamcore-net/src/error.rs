use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned rate-limit status, retry after {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("ranged read exhausted {attempts} attempts against {url}")]
    RangedReadExhausted { url: String, attempts: u32 },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
}

pub type Result<T> = std::result::Result<T, NetError>;
