//! Error types shared across Servitor crates.

use thiserror::Error;

/// Errors raised while constructing core values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A component name was empty or malformed.
    #[error("invalid component name: {0}")]
    InvalidComponent(String),
}

/// Result type for core value construction.
pub type CoreResult<T> = Result<T, CoreError>;

/// Failure reported by a [`ProcessLauncher`](crate::ProcessLauncher).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LaunchError {
    /// The host process could not be started or located.
    #[error("process {process_name} unavailable: {reason}")]
    ProcessUnavailable {
        /// Name of the process that was requested.
        process_name: String,
        /// Why it could not be provided.
        reason: String,
    },

    /// The launcher refused to start the process for this caller.
    #[error("launch denied: {0}")]
    Denied(String),
}

/// Failure reported when linking a death recipient to a connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    /// The remote end of the connection is already gone.
    #[error("connection already dead")]
    ConnectionDead,

    /// The connection does not support death notifications.
    #[error("death notifications unsupported: {0}")]
    Unsupported(String),
}
