//! Error taxonomy for the player task (§4.7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("loader error: {0}")]
    Loader(#[from] streamcore_loader::LoaderError),

    #[error("player is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, PlayerError>;
