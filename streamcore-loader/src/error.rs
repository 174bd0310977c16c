//! Error taxonomy for the track loader (§4.6, §7 "Transient-network /
//! Fatal-to-track").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("network error: {0}")]
    Net(#[from] streamcore_net::error::NetError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("metadata resolution failed: {0}")]
    Metadata(String),

    #[error("content key exhausted its retry budget at every format tier")]
    KeyExhausted,

    #[error("could not locate a usable audio frame in the probe window")]
    ProbeFailed,

    #[error("loader task is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, LoaderError>;
