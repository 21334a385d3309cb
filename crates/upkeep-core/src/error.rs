//! Core error types for upkeep-core

use std::path::PathBuf;

use thiserror::Error;
use upkeep_pkg::PackageError;

/// Errors that can occur while orchestrating updates and schedules
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// No known package manager is installed
    #[error("no supported package manager: {0}")]
    NoSupportedBackend(String),

    /// Backend-specific setup failed
    #[error("backend preparation failed: {0}")]
    Prepare(String),

    /// Period text did not name a known period
    #[error("invalid period '{0}' (expected daily, weekly or monthly)")]
    InvalidPeriod(String),

    /// A step of the schedule installation failed
    #[error("schedule installation failed at {step}: {message}")]
    SchedulerInstallFailed {
        /// Step that failed
        step: String,
        /// Failure details
        message: String,
    },

    /// Another run holds the run lock
    #[error("another update run is in progress (lock held on {})", .0.display())]
    AlreadyRunning(PathBuf),

    /// Lock file could not be opened or locked
    #[error("failed to lock {}: {message}", .path.display())]
    Lock {
        /// Lock file path
        path: PathBuf,
        /// Underlying error
        message: String,
    },

    /// Reading the period from the user failed
    #[error("failed to read period: {0}")]
    Prompt(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl CoreError {
    pub(crate) fn install(step: impl Into<String>, message: impl ToString) -> Self {
        CoreError::SchedulerInstallFailed {
            step: step.into(),
            message: message.to_string(),
        }
    }
}

impl From<PackageError> for CoreError {
    fn from(err: PackageError) -> Self {
        match err {
            PackageError::NoSupportedBackend { .. } => CoreError::NoSupportedBackend(err.to_string()),
            PackageError::Prepare { .. } => CoreError::Prepare(err.to_string()),
        }
    }
}
