//! Local command execution using `tokio::process`

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, instrument};

use crate::command::CommandSpec;
use crate::error::ExecError;
use crate::result::CommandResult;
use crate::traits::CommandRunner;

/// Local command executor
///
/// Executes commands on the local machine using `tokio::process::Command`.
/// Programs are spawned directly, without a shell.
#[derive(Debug, Clone)]
pub struct LocalExecutor;

impl LocalExecutor {
    /// Create a new local executor
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Internal method to execute command
    #[instrument(skip(self), fields(command = %cmd), level = "debug")]
    async fn execute(&self, cmd: &CommandSpec) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        debug!("executing local command");

        let mut child = Command::new(&cmd.program)
            .args(&cmd.args)
            .envs(cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if cmd.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the future on timeout must not leave the child running
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::SpawnError(format!("{}: {e}", cmd.program)))?;

        if let Some(input) = &cmd.stdin
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            // Close stdin so the child sees EOF
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let duration = start.elapsed();
        let status = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        debug!(status = status, duration = ?duration, "command completed");

        Ok(CommandResult {
            status,
            stdout,
            stderr,
            duration,
        })
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for LocalExecutor {
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandResult, ExecError> {
        self.execute(cmd).await
    }

    #[instrument(skip(self), fields(command = %cmd), level = "debug")]
    async fn run_with_timeout(
        &self,
        cmd: &CommandSpec,
        timeout_duration: Duration,
    ) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        debug!(timeout = ?timeout_duration, "executing with timeout");

        match timeout(timeout_duration, self.execute(cmd)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    timeout = ?timeout_duration,
                    elapsed = ?start.elapsed(),
                    "command timed out"
                );
                Err(ExecError::Timeout {
                    timeout: timeout_duration,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_run_success() {
        let executor = LocalExecutor::new();
        let result = executor
            .run(&CommandSpec::new("echo").arg("hello"))
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_failure() {
        let executor = LocalExecutor::new();
        let result = executor.run(&sh("exit 42")).await.unwrap();
        assert!(!result.success());
        assert_eq!(result.status, 42);
    }

    #[tokio::test]
    async fn test_arguments_are_not_shell_expanded() {
        let executor = LocalExecutor::new();
        let result = executor
            .run(&CommandSpec::new("echo").arg("$(id -u); true"))
            .await
            .unwrap();
        assert_eq!(result.stdout.trim(), "$(id -u); true");
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let executor = LocalExecutor::new();
        let result = executor
            .run_with_timeout(&CommandSpec::new("sleep").arg("5"), Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(ExecError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_run_with_stdin_and_env() {
        let executor = LocalExecutor::new();
        let cmd = sh("cat; printf %s \"$UPKEEP_TEST\"")
            .env("UPKEEP_TEST", "-env")
            .stdin("from-stdin");
        let result = executor.run(&cmd).await.unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "from-stdin-env");
    }

    #[tokio::test]
    async fn test_spawn_error() {
        let executor = LocalExecutor::new();
        let result = executor
            .run(&CommandSpec::new("/nonexistent/upkeep-test-binary"))
            .await;
        assert!(matches!(result, Err(ExecError::SpawnError(_))));
    }
}
