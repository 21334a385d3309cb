//! Error types for upkeep-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while executing a command
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Command ran but exited unsuccessfully
    #[error("command execution failed: {status} - {stderr}")]
    CommandFailed {
        /// Exit status code
        status: i32,
        /// Stderr output
        stderr: String,
    },

    /// Command timed out
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// Process spawn error
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// I/O error during execution
    #[error("I/O error: {0}")]
    IoError(String),
}

impl ExecError {
    /// Exit status carried by the error, if the process ran at all
    #[must_use]
    pub fn status(&self) -> Option<i32> {
        match self {
            ExecError::CommandFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}
