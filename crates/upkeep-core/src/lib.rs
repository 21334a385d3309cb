//! upkeep-core: Update orchestration logic
//!
//! Runs update cycles against the detected package manager, guards them with
//! a host-wide lock and installs the recurring trigger (systemd timer or cron).

pub mod config;
pub mod error;
pub mod executor;
pub mod lock;
pub mod orchestrator;
pub mod schedule;

pub use config::Config;
pub use error::CoreError;
pub use executor::{RunResult, StepOutcome, UpdateExecutor};
pub use lock::RunLock;
pub use orchestrator::{InstallSummary, Orchestrator, PeriodSource, current_executable};
pub use schedule::{
    Period, RUN_FLAG, ScheduleArtifact, ScheduleSettings, SchedulerInstaller, cron_line,
    render_service, render_timer,
};
