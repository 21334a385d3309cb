//! upkeep-exec: Local command execution
//!
//! Provides structured command descriptors and a runner that executes them on
//! the local host, with optional timeouts.

pub mod command;
pub mod error;
pub mod local;
pub mod result;
pub mod traits;

pub use command::CommandSpec;
pub use error::ExecError;
pub use local::LocalExecutor;
pub use result::CommandResult;
pub use traits::CommandRunner;
