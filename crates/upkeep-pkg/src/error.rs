//! Error types for upkeep-pkg

use thiserror::Error;

/// Errors that can occur during backend detection and preparation
#[derive(Error, Debug, Clone)]
pub enum PackageError {
    /// None of the known package managers is installed
    #[error("no supported package manager found (probed: {})", .probed.join(", "))]
    NoSupportedBackend {
        /// Probe paths that were checked
        probed: Vec<String>,
    },

    /// Backend-specific setup failed
    #[error("failed to prepare {path}: {message}")]
    Prepare {
        /// Path that could not be created
        path: String,
        /// Underlying I/O error
        message: String,
    },
}
