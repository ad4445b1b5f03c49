//! Executor and driver error types

use thiserror::Error;

/// Execution result type
pub type ExecResult<T> = Result<T, ExecError>;

/// Executor and driver errors
#[derive(Error, Debug)]
pub enum ExecError {
    /// Command template references a field no profile/override supplies.
    /// Reported before any transport attempt.
    #[error("Unresolved placeholder '{name}' in command '{command}'")]
    UnresolvedPlaceholder { name: String, command: String },

    #[error("Failed to spawn '{program}': {message}")]
    Spawn { program: String, message: String },

    #[error("Connection to {host}:{port} failed: {message}")]
    Connect {
        host: String,
        port: u16,
        message: String,
    },

    #[error("Authentication failed for {username}@{host}: {message}")]
    Auth {
        username: String,
        host: String,
        message: String,
    },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Command timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Script harness error: {0}")]
    Script(String),
}

impl ExecError {
    /// Whether this is a configuration error (bad command definition)
    /// rather than an execution error (transport/auth/timeout).
    pub fn is_configuration(&self) -> bool {
        matches!(self, ExecError::UnresolvedPlaceholder { .. })
    }
}
