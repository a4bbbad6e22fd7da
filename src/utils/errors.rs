// src/utils/errors.rs
//! Error types for the control plane
//!
//! All failures are contained: nothing in this taxonomy is allowed to take
//! down the command reader or an in-flight exchange. Handlers log and move
//! on; `Result` is propagated only up to the nearest dispatch boundary.

use thiserror::Error;

/// Control-plane error type
#[derive(Error, Debug)]
pub enum CoreError {
    /// A command line failed to parse as the protocol grammar
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A command referenced an exchange id or key with no live entry
    #[error("Unknown flow: {0}")]
    UnknownFlow(String),

    /// The engine rejected a replay resubmission
    #[error("Replay failed: {0}")]
    ReplayFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;
