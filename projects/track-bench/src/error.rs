//! Error types for the evaluation core

use thiserror::Error;

/// Result type alias for the evaluation core
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors that abort a single run
#[derive(Error, Debug)]
pub enum EvalError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Player {player_idx} not found (only {detected} detected)")]
    PlayerNotFound { player_idx: usize, detected: usize },

    #[error("Tracking stream failed: {0}")]
    UpstreamStreamFailure(String),

    #[error("Tracker config error: {0}")]
    TrackerConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl EvalError {
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn upstream<S: Into<String>>(msg: S) -> Self {
        Self::UpstreamStreamFailure(msg.into())
    }

    pub fn tracker_config<S: Into<String>>(msg: S) -> Self {
        Self::TrackerConfig(msg.into())
    }
}
