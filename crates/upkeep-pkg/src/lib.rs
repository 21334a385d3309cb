//! upkeep-pkg: Package manager detection and command mapping
//!
//! Detects which supported package manager is installed on the local host
//! and maps it to the update and cleanup commands for that backend.

pub mod commands;
pub mod distro;
pub mod error;
pub mod registry;
pub mod types;

pub use commands::{Action, CommandSet, Step, commands_for, prepare};
pub use distro::DistroInfo;
pub use error::PackageError;
pub use registry::{detect, detect_in};
pub use types::Backend;
