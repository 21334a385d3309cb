//! Orchestrator: detection, mapping, execution and schedule installation
//!
//! The detected backend is threaded explicitly through every stage; nothing
//! is cached between invocations.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, instrument, warn};
use upkeep_exec::CommandRunner;
use upkeep_pkg::{Backend, CommandSet, DistroInfo, commands_for, detect_in, prepare};

use crate::config::Config;
use crate::error::CoreError;
use crate::executor::{RunResult, UpdateExecutor};
use crate::lock::RunLock;
use crate::schedule::{Period, ScheduleArtifact, ScheduleSettings, SchedulerInstaller};

/// Supplies the schedule period during installation
pub trait PeriodSource {
    /// Produce a validated period
    ///
    /// # Errors
    /// Returns `CoreError::InvalidPeriod` for unrecognised input
    fn period(&mut self) -> Result<Period, CoreError>;
}

impl PeriodSource for Period {
    fn period(&mut self) -> Result<Period, CoreError> {
        Ok(*self)
    }
}

/// What an install did
#[derive(Debug, Clone)]
pub struct InstallSummary {
    pub backend: Backend,
    pub distro: DistroInfo,
    pub period: Period,
    pub artifact: ScheduleArtifact,
    /// Initial update cycle, `None` when the run lock was unavailable
    pub initial_run: Option<RunResult>,
}

impl fmt::Display for InstallSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Automatic updates installed")?;
        writeln!(f, "  distribution:    {}", self.distro.label())?;
        writeln!(f, "  package manager: {}", self.backend)?;
        writeln!(f, "  period:          {}", self.period)?;
        writeln!(f, "  trigger:         {}", self.artifact)?;
        match &self.initial_run {
            Some(run) if run.success() => write!(f, "  initial update:  ok"),
            Some(run) => write!(f, "  initial update:  {}", run.update),
            None => write!(f, "  initial update:  skipped (run lock unavailable)"),
        }
    }
}

/// Drives update runs and schedule installation on the local host
pub struct Orchestrator {
    config: Config,
    runner: Arc<dyn CommandRunner>,
}

impl Orchestrator {
    pub fn new(config: Config, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Detect the backend and build its prepared command set
    fn resolve(&self) -> Result<(CommandSet, DistroInfo), CoreError> {
        let root = &self.config.probe_root;
        let backend = detect_in(root)?;
        let commands = commands_for(backend);
        prepare(backend, root)?;
        Ok((commands, DistroInfo::detect_in(root)))
    }

    fn executor(&self) -> UpdateExecutor {
        UpdateExecutor::new(self.runner.clone()).with_step_timeout(self.config.step_timeout())
    }

    fn scheduler(&self) -> SchedulerInstaller {
        SchedulerInstaller::new(
            self.runner.clone(),
            ScheduleSettings {
                probe_root: self.config.probe_root.clone(),
                unit_dir: self.config.unit_dir.clone(),
                unit_name: self.config.unit_name.clone(),
                log_path: self.config.log_path.clone(),
            },
        )
    }

    /// Perform exactly one update cycle
    ///
    /// # Errors
    /// Returns `CoreError::AlreadyRunning` when another run holds the lock and
    /// `CoreError::NoSupportedBackend` when no package manager is installed.
    /// A failed update is reported through the returned `RunResult`.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<RunResult, CoreError> {
        let _lock = RunLock::acquire(&self.config.lock_path)?;
        let (commands, distro) = self.resolve()?;
        Ok(self.executor().run(&commands, &distro).await)
    }

    /// Run one update cycle, then install the recurring schedule
    ///
    /// A failing initial update, or a run lock that cannot be taken, is
    /// logged and does not stop installation.
    /// The period is requested after the initial run; an invalid period
    /// aborts before anything is installed.
    ///
    /// # Errors
    /// Returns `CoreError::NoSupportedBackend`, `CoreError::InvalidPeriod` or
    /// `CoreError::SchedulerInstallFailed`
    #[instrument(skip(self, periods), fields(executable = %executable.display()))]
    pub async fn install(
        &self,
        periods: &mut dyn PeriodSource,
        executable: &Path,
    ) -> Result<InstallSummary, CoreError> {
        let (commands, distro) = self.resolve()?;

        let initial_run = match RunLock::acquire(&self.config.lock_path) {
            Ok(_lock) => {
                let run = self.executor().run(&commands, &distro).await;
                if !run.success() {
                    error!(update = %run.update, "initial update failed, installing schedule anyway");
                }
                Some(run)
            }
            Err(CoreError::AlreadyRunning(path)) => {
                warn!(lock = %path.display(), "update already running, skipping initial update");
                None
            }
            Err(e) => {
                error!(error = %e, "cannot take run lock, skipping initial update");
                None
            }
        };

        let period = periods.period()?;
        info!(period = %period, "installing schedule");

        let artifact = self.scheduler().install(period, executable).await?;

        Ok(InstallSummary {
            backend: commands.backend,
            distro,
            period,
            artifact,
            initial_run,
        })
    }
}

/// Resolve the running executable for use in generated schedules
///
/// # Errors
/// Returns `CoreError::ConfigError` if the path cannot be determined
pub fn current_executable() -> Result<PathBuf, CoreError> {
    let exe = std::env::current_exe()
        .map_err(|e| CoreError::ConfigError(format!("cannot resolve executable: {e}")))?;
    Ok(exe.canonicalize().unwrap_or(exe))
}
