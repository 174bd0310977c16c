//! Error taxonomy for the control plane (C9, §4.8).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("net error: {0}")]
    Net(#[from] streamcore_net::error::NetError),

    #[error("player error: {0}")]
    Player(#[from] streamcore_player::PlayerError),

    #[error("control plane is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ControlError>;
