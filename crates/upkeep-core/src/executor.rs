//! Update executor: runs one update-and-cleanup cycle
//!
//! The update action must fully succeed. Cleanup only runs after a successful
//! update, and its failure is reported but never changes the run's outcome.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};
use upkeep_exec::{CommandResult, CommandRunner, CommandSpec, ExecError};
use upkeep_pkg::{Action, Backend, CommandSet, DistroInfo, Step};

/// Outcome of one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Every step exited 0
    Succeeded,
    /// A step failed; later steps of the action were not run
    Failed {
        /// The failing command line
        command: String,
        /// Exit status, if the process ran to completion
        status: Option<i32>,
        /// Error details
        message: String,
    },
    /// The action was not attempted
    Skipped,
}

impl StepOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Succeeded)
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Succeeded => write!(f, "ok"),
            StepOutcome::Skipped => write!(f, "skipped"),
            StepOutcome::Failed {
                command, message, ..
            } => write!(f, "failed ({command}: {message})"),
        }
    }
}

/// Result of one update cycle
#[derive(Debug, Clone)]
pub struct RunResult {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub backend: Backend,
    /// Distribution label, e.g. `debian 12`
    pub distro: String,
    pub update: StepOutcome,
    pub cleanup: StepOutcome,
}

impl RunResult {
    /// Whether the update action succeeded; cleanup is not considered
    #[must_use]
    pub fn success(&self) -> bool {
        self.update.is_success()
    }

    /// Process exit status mirroring the update action
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match &self.update {
            StepOutcome::Succeeded => 0,
            StepOutcome::Failed {
                status: Some(status),
                ..
            } if *status > 0 => *status,
            StepOutcome::Failed { .. } | StepOutcome::Skipped => 1,
        }
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] backend={} distro={} update={} cleanup={} duration={}s",
            self.finished_at.format("%Y-%m-%d %H:%M:%S"),
            self.backend,
            self.distro,
            self.update,
            self.cleanup,
            (self.finished_at - self.started_at).num_seconds()
        )
    }
}

/// Failure of a single step
struct StepFailure {
    command: String,
    status: Option<i32>,
    message: String,
}

impl From<StepFailure> for StepOutcome {
    fn from(f: StepFailure) -> Self {
        StepOutcome::Failed {
            command: f.command,
            status: f.status,
            message: f.message,
        }
    }
}

/// Runs command sets against the local package manager
pub struct UpdateExecutor {
    runner: Arc<dyn CommandRunner>,
    step_timeout: Option<Duration>,
}

impl UpdateExecutor {
    /// Create an executor without a step timeout
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            step_timeout: None,
        }
    }

    /// Bound every step by `timeout`
    #[must_use]
    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Run one update cycle
    #[instrument(skip_all, fields(backend = %commands.backend))]
    pub async fn run(&self, commands: &CommandSet, distro: &DistroInfo) -> RunResult {
        let started_at = Utc::now();
        let distro = distro.label();

        info!(backend = %commands.backend, distro = %distro, "starting system update");

        let update = self.run_action(&commands.update).await;
        let cleanup = match &update {
            StepOutcome::Failed { message, .. } => {
                error!(backend = %commands.backend, error = %message, "update failed, skipping cleanup");
                StepOutcome::Skipped
            }
            _ => {
                let cleanup = self.run_action(&commands.cleanup).await;
                if let StepOutcome::Failed { message, .. } = &cleanup {
                    warn!(backend = %commands.backend, error = %message, "cleanup failed");
                }
                cleanup
            }
        };

        let result = RunResult {
            started_at,
            finished_at: Utc::now(),
            backend: commands.backend,
            distro,
            update,
            cleanup,
        };

        if result.success() {
            info!(backend = %result.backend, "system update completed successfully");
        }
        info!("{result}");

        result
    }

    async fn run_action(&self, action: &Action) -> StepOutcome {
        for step in action.steps() {
            if let Err(failure) = self.run_step(step).await {
                return failure.into();
            }
        }
        StepOutcome::Succeeded
    }

    async fn run_step(&self, step: &Step) -> Result<(), StepFailure> {
        let mut command = step.command.clone();

        if let Some(query) = &step.operands {
            let operands = self.query_operands(query).await?;
            if operands.is_empty() {
                debug!(command = %command, "no operands, skipping step");
                return Ok(());
            }
            command = command.args(operands);
        }

        info!(command = %command, "running");
        let result = self.exec(&command).await.map_err(|e| StepFailure {
            command: command.to_string(),
            status: e.status(),
            message: e.to_string(),
        })?;
        log_output(&result);

        if result.success() {
            Ok(())
        } else {
            Err(StepFailure {
                command: command.to_string(),
                status: Some(result.status),
                message: failure_message(&result),
            })
        }
    }

    /// Run an operand query; a failing query with no output means "nothing to do"
    async fn query_operands(&self, query: &CommandSpec) -> Result<Vec<String>, StepFailure> {
        let result = self.exec(query).await.map_err(|e| StepFailure {
            command: query.to_string(),
            status: e.status(),
            message: e.to_string(),
        })?;

        let operands: Vec<String> = result.stdout_lines().map(str::to_string).collect();
        if !result.success() && !operands.is_empty() {
            return Err(StepFailure {
                command: query.to_string(),
                status: Some(result.status),
                message: failure_message(&result),
            });
        }
        Ok(operands)
    }

    async fn exec(&self, command: &CommandSpec) -> Result<CommandResult, ExecError> {
        match self.step_timeout {
            Some(timeout) => self.runner.run_with_timeout(command, timeout).await,
            None => self.runner.run(command).await,
        }
    }
}

fn log_output(result: &CommandResult) {
    for line in result.combined_output().lines().filter(|l| !l.trim().is_empty()) {
        debug!(target: "upkeep::output", "{line}");
    }
}

fn failure_message(result: &CommandResult) -> String {
    result
        .stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map_or_else(
            || format!("exited with status {}", result.status),
            |line| format!("exited with status {}: {}", result.status, line.trim()),
        )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use upkeep_pkg::commands_for;

    use super::*;

    /// Answers commands by program+first-arg prefix and records every call
    #[derive(Default)]
    struct ScriptedRunner {
        /// (command prefix, exit status, stdout)
        answers: Vec<(&'static str, i32, &'static str)>,
        calls: Mutex<Vec<String>>,
        timeouts: Mutex<Vec<Duration>>,
    }

    impl ScriptedRunner {
        fn with(answers: Vec<(&'static str, i32, &'static str)>) -> Self {
            Self {
                answers,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, cmd: &CommandSpec) -> Result<CommandResult, ExecError> {
            let line = cmd.to_string();
            self.calls.lock().unwrap().push(line.clone());
            let (status, stdout) = self
                .answers
                .iter()
                .find(|(prefix, _, _)| line.starts_with(prefix))
                .map_or((0, ""), |(_, status, stdout)| (*status, *stdout));
            Ok(CommandResult {
                status,
                stdout: stdout.to_string(),
                stderr: if status == 0 { String::new() } else { "boom".to_string() },
                duration: Duration::from_millis(1),
            })
        }

        async fn run_with_timeout(
            &self,
            cmd: &CommandSpec,
            timeout: Duration,
        ) -> Result<CommandResult, ExecError> {
            self.timeouts.lock().unwrap().push(timeout);
            if cmd.to_string().starts_with("apt upgrade") {
                return Err(ExecError::Timeout { timeout });
            }
            self.run(cmd).await
        }
    }

    fn debian() -> DistroInfo {
        DistroInfo::from_os_release("ID=debian\nVERSION_ID=12\n")
    }

    #[tokio::test]
    async fn test_success_runs_update_then_cleanup() {
        let runner = Arc::new(ScriptedRunner::default());
        let executor = UpdateExecutor::new(runner.clone());

        let result = executor.run(&commands_for(Backend::Apt), &debian()).await;

        assert!(result.success());
        assert_eq!(result.exit_code(), 0);
        assert_eq!(result.cleanup, StepOutcome::Succeeded);
        assert_eq!(result.distro, "debian 12");
        assert_eq!(
            runner.calls(),
            vec![
                "apt update",
                "apt upgrade -y",
                "apt autoremove -y",
                "apt autoclean"
            ]
        );
    }

    #[tokio::test]
    async fn test_update_failure_skips_cleanup() {
        let runner = Arc::new(ScriptedRunner::with(vec![("dnf upgrade", 1, "")]));
        let executor = UpdateExecutor::new(runner.clone());

        let result = executor.run(&commands_for(Backend::Dnf), &debian()).await;

        assert!(!result.success());
        assert_eq!(result.exit_code(), 1);
        assert_eq!(result.cleanup, StepOutcome::Skipped);
        assert!(runner.calls().iter().all(|c| !c.contains("autoremove")));
    }

    #[tokio::test]
    async fn test_update_failure_stops_remaining_update_steps() {
        let runner = Arc::new(ScriptedRunner::with(vec![("apt-get update", 100, "")]));
        let executor = UpdateExecutor::new(runner.clone());

        let result = executor.run(&commands_for(Backend::AptLegacy), &debian()).await;

        assert_eq!(result.exit_code(), 100);
        assert_eq!(runner.calls(), vec!["apt-get update"]);
        match result.update {
            StepOutcome::Failed {
                command, message, ..
            } => {
                assert_eq!(command, "apt-get update");
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cleanup_failure_is_not_fatal() {
        let runner = Arc::new(ScriptedRunner::with(vec![("zypper --non-interactive clean", 7, "")]));
        let executor = UpdateExecutor::new(runner.clone());

        let result = executor.run(&commands_for(Backend::Zypper), &debian()).await;

        assert!(result.success());
        assert_eq!(result.exit_code(), 0);
        assert!(matches!(result.cleanup, StepOutcome::Failed { status: Some(7), .. }));
    }

    #[tokio::test]
    async fn test_pacman_orphans_passed_as_arguments() {
        let runner = Arc::new(ScriptedRunner::with(vec![("pacman -Qdtq", 0, "libfoo\nlibbar\n")]));
        let executor = UpdateExecutor::new(runner.clone());

        let result = executor.run(&commands_for(Backend::Pacman), &debian()).await;

        assert!(result.success());
        assert!(
            runner
                .calls()
                .contains(&"pacman -Rns --noconfirm libfoo libbar".to_string())
        );
    }

    #[tokio::test]
    async fn test_pacman_without_orphans_skips_removal() {
        // pacman -Qdtq exits 1 when there is nothing to list
        let runner = Arc::new(ScriptedRunner::with(vec![("pacman -Qdtq", 1, "")]));
        let executor = UpdateExecutor::new(runner.clone());

        let result = executor.run(&commands_for(Backend::Pacman), &debian()).await;

        assert_eq!(result.cleanup, StepOutcome::Succeeded);
        assert!(runner.calls().iter().all(|c| !c.starts_with("pacman -Rns")));
        assert!(runner.calls().contains(&"pacman -Sc --noconfirm".to_string()));
    }

    #[tokio::test]
    async fn test_step_timeout_fails_update() {
        let runner = Arc::new(ScriptedRunner::default());
        let executor =
            UpdateExecutor::new(runner.clone()).with_step_timeout(Some(Duration::from_secs(5)));

        let result = executor.run(&commands_for(Backend::Apt), &debian()).await;

        assert!(!result.success());
        assert_eq!(result.exit_code(), 1);
        assert_eq!(result.cleanup, StepOutcome::Skipped);
        assert!(
            runner
                .timeouts
                .lock()
                .unwrap()
                .iter()
                .all(|t| *t == Duration::from_secs(5))
        );
    }

    #[test]
    fn test_failure_message_uses_last_stderr_line() {
        let result = CommandResult {
            status: 100,
            stdout: String::new(),
            stderr: "W: first\nE: Could not get lock /var/lib/dpkg/lock\n\n".to_string(),
            duration: Duration::ZERO,
        };
        assert_eq!(
            failure_message(&result),
            "exited with status 100: E: Could not get lock /var/lib/dpkg/lock"
        );
    }
}
