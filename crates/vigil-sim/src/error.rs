//! Error types for the simulation layer

use thiserror::Error;

/// Simulation failures
#[derive(Debug, Error)]
pub enum SimError {
    /// Socket setup or accept failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Agent or server settings are unusable
    #[error("invalid simulation config: {0}")]
    InvalidConfig(String),

    /// An event could not be serialized as a frame
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    /// The feed server has stopped
    #[error("feed server stopped")]
    Stopped,
}
