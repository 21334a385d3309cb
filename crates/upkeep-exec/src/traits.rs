//! Command runner trait

use std::time::Duration;

use async_trait::async_trait;

use crate::command::CommandSpec;
use crate::error::ExecError;
use crate::result::CommandResult;

/// Executes structured commands
///
/// A non-zero exit is reported through `CommandResult::status`, not as an
/// error. Errors are reserved for commands that could not run to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandResult, ExecError>;

    async fn run_with_timeout(
        &self,
        cmd: &CommandSpec,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;
}
