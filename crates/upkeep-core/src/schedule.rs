//! Scheduler installer: systemd timer or cron line
//!
//! The target is picked by probing for a running systemd. Installing twice
//! never produces a second trigger: timer units are rewritten in place and a
//! cron line referencing the executable is left untouched.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use upkeep_exec::{CommandRunner, CommandSpec};

use crate::error::CoreError;

/// Directory that exists only while systemd is PID 1
const SYSTEMD_MARKER: &str = "run/systemd/system";

/// Cron init scripts, probed in order
const CRON_INIT_SCRIPTS: [&str; 2] = ["etc/init.d/cron", "etc/init.d/crond"];

/// Flag making the scheduled invocation run one update cycle
pub const RUN_FLAG: &str = "--run";

/// Recurrence of scheduled updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    pub const ALL: [Period; 3] = [Period::Daily, Period::Weekly, Period::Monthly];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
        }
    }

    /// systemd `OnCalendar=` expression
    #[must_use]
    pub fn on_calendar(self) -> &'static str {
        match self {
            Period::Daily => "*-*-* 00:00:00",
            Period::Weekly => "Mon *-*-* 00:00:00",
            Period::Monthly => "*-*-01 00:00:00",
        }
    }

    /// Five-field cron expression
    #[must_use]
    pub fn cron_expression(self) -> &'static str {
        match self {
            Period::Daily => "0 0 * * *",
            Period::Weekly => "0 0 * * 0",
            Period::Monthly => "0 0 1 * *",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Period::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CoreError::InvalidPeriod(wanted.to_string()))
    }
}

/// The installed trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleArtifact {
    /// systemd service + timer pair
    Timer {
        service_path: PathBuf,
        timer_path: PathBuf,
        on_calendar: String,
    },
    /// crontab entry
    Cron {
        line: String,
        /// false when a matching entry already existed
        inserted: bool,
    },
}

impl fmt::Display for ScheduleArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleArtifact::Timer {
                timer_path,
                on_calendar,
                ..
            } => write!(f, "systemd timer {} (OnCalendar={on_calendar})", timer_path.display()),
            ScheduleArtifact::Cron { line, inserted } => {
                let state = if *inserted { "added" } else { "already present" };
                write!(f, "cron entry '{line}' ({state})")
            }
        }
    }
}

fn is_plain(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || "/._-+".contains(c))
}

/// Quote a path for the shell that runs a cron command
fn shell_quote(path: &Path) -> String {
    let s = path.display().to_string();
    if is_plain(&s) {
        s
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Escape `%` specifiers in a unit file value
fn escape_specifiers(path: &Path) -> String {
    path.display().to_string().replace('%', "%%")
}

/// Quote a path as the first word of a systemd command line
///
/// systemd splits on whitespace and understands double quotes with C-style
/// backslash escapes. `%` and `$` are expanded inside quotes as well.
fn systemd_quote(path: &Path) -> String {
    let s = escape_specifiers(path).replace('$', "$$");
    if is_plain(&s.replace("%%", "").replace("$$", "")) {
        return s;
    }
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Whether a crontab line invokes `executable`
///
/// Only whole command words count; a different program whose name merely
/// starts with ours does not.
fn invokes(line: &str, executable: &Path) -> bool {
    let line = line.trim();
    if line.starts_with('#') {
        return false;
    }
    let Some(name) = executable.file_name() else {
        return false;
    };
    line.split_whitespace()
        .map(|word| word.trim_matches(|c| c == '\'' || c == '"'))
        .any(|word| Path::new(word).file_name() == Some(name))
}

/// Render the one-shot service unit
#[must_use]
pub fn render_service(executable: &Path, log_path: &Path) -> String {
    let workdir = executable.parent().unwrap_or_else(|| Path::new("/"));
    format!(
        "[Unit]
Description=Automatic system update
After=network-online.target
Wants=network-online.target

[Service]
Type=oneshot
ExecStart={exe} {RUN_FLAG}
WorkingDirectory={workdir}
StandardOutput=append:{log}
StandardError=append:{log}
",
        exe = systemd_quote(executable),
        workdir = escape_specifiers(workdir),
        log = escape_specifiers(log_path),
    )
}

/// Render the timer unit triggering `unit_name.service`
#[must_use]
pub fn render_timer(period: Period, unit_name: &str) -> String {
    format!(
        "[Unit]
Description=Run automatic system update {period}

[Timer]
OnCalendar={calendar}
RandomizedDelaySec=1h
Persistent=true
Unit={unit_name}.service

[Install]
WantedBy=timers.target
",
        calendar = period.on_calendar(),
    )
}

/// Render the crontab line
#[must_use]
pub fn cron_line(period: Period, executable: &Path, log_path: &Path) -> String {
    format!(
        "{} {} {RUN_FLAG} >> {} 2>&1",
        period.cron_expression(),
        shell_quote(executable),
        shell_quote(log_path)
    )
}

/// Settings the installer needs from the configuration
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    /// Root for init-system probes
    pub probe_root: PathBuf,
    /// Where unit files are written
    pub unit_dir: PathBuf,
    /// Base name of the units
    pub unit_name: String,
    /// Log file the scheduled runs append to
    pub log_path: PathBuf,
}

/// Installs and enables the periodic trigger
pub struct SchedulerInstaller {
    runner: Arc<dyn CommandRunner>,
    settings: ScheduleSettings,
}

impl SchedulerInstaller {
    pub fn new(runner: Arc<dyn CommandRunner>, settings: ScheduleSettings) -> Self {
        Self { runner, settings }
    }

    /// Whether systemd is managing this host
    #[must_use]
    pub fn systemd_available(&self) -> bool {
        self.settings.probe_root.join(SYSTEMD_MARKER).is_dir()
    }

    /// Install the trigger for `period`, invoking `executable --run`
    ///
    /// # Errors
    /// Returns `CoreError::SchedulerInstallFailed` naming the step that failed
    #[instrument(skip(self), fields(executable = %executable.display()))]
    pub async fn install(
        &self,
        period: Period,
        executable: &Path,
    ) -> Result<ScheduleArtifact, CoreError> {
        let artifact = if self.systemd_available() {
            self.install_timer(period, executable).await?
        } else {
            self.install_cron(period, executable).await?
        };
        info!(artifact = %artifact, "schedule installed");
        Ok(artifact)
    }

    async fn install_timer(
        &self,
        period: Period,
        executable: &Path,
    ) -> Result<ScheduleArtifact, CoreError> {
        let ScheduleSettings {
            unit_dir,
            unit_name,
            log_path,
            ..
        } = &self.settings;

        let service_path = unit_dir.join(format!("{unit_name}.service"));
        let timer_path = unit_dir.join(format!("{unit_name}.timer"));

        tokio::fs::create_dir_all(unit_dir)
            .await
            .map_err(|e| CoreError::install("create unit directory", e))?;
        tokio::fs::write(&service_path, render_service(executable, log_path))
            .await
            .map_err(|e| CoreError::install("write service unit", e))?;
        tokio::fs::write(&timer_path, render_timer(period, unit_name))
            .await
            .map_err(|e| CoreError::install("write timer unit", e))?;
        debug!(service = %service_path.display(), timer = %timer_path.display(), "units written");

        self.systemctl("daemon-reload", &["daemon-reload"]).await?;
        let timer_unit = format!("{unit_name}.timer");
        self.systemctl("enable timer", &["enable", "--now", timer_unit.as_str()])
            .await?;

        Ok(ScheduleArtifact::Timer {
            service_path,
            timer_path,
            on_calendar: period.on_calendar().to_string(),
        })
    }

    async fn systemctl(&self, step: &str, args: &[&str]) -> Result<(), CoreError> {
        let cmd = CommandSpec::new("systemctl").args(args.iter().copied());
        let result = self
            .runner
            .run(&cmd)
            .await
            .map_err(|e| CoreError::install(step, e))?;
        result
            .into_checked()
            .map(|_| ())
            .map_err(|e| CoreError::install(step, e))
    }

    async fn install_cron(
        &self,
        period: Period,
        executable: &Path,
    ) -> Result<ScheduleArtifact, CoreError> {
        let line = cron_line(period, executable, &self.settings.log_path);
        if executable.file_name().is_none() {
            return Err(CoreError::install(
                "cron marker",
                "executable path has no file name",
            ));
        }

        let current = self.read_crontab().await?;
        let existing = current.lines().find(|l| invokes(l, executable));

        let inserted = if let Some(existing) = existing {
            info!(entry = %existing.trim(), "cron entry already present, leaving it unchanged");
            false
        } else {
            let mut updated = current;
            if !updated.is_empty() && !updated.ends_with('\n') {
                updated.push('\n');
            }
            updated.push_str(&line);
            updated.push('\n');
            self.write_crontab(updated).await?;
            true
        };

        self.ensure_cron_daemon().await;

        Ok(ScheduleArtifact::Cron { line, inserted })
    }

    async fn read_crontab(&self) -> Result<String, CoreError> {
        let result = self
            .runner
            .run(&CommandSpec::new("crontab").arg("-l"))
            .await
            .map_err(|e| CoreError::install("read crontab", e))?;
        if result.success() {
            Ok(result.stdout)
        } else if result.stderr.contains("no crontab for") {
            debug!(stderr = %result.stderr.trim(), "no existing crontab");
            Ok(String::new())
        } else {
            Err(CoreError::install(
                "read crontab",
                format!("exit status {}: {}", result.status, result.stderr.trim()),
            ))
        }
    }

    async fn write_crontab(&self, content: String) -> Result<(), CoreError> {
        let cmd = CommandSpec::new("crontab").arg("-").stdin(content);
        self.runner
            .run(&cmd)
            .await
            .map_err(|e| CoreError::install("write crontab", e))?
            .into_checked()
            .map(|_| ())
            .map_err(|e| CoreError::install("write crontab", e))
    }

    /// Start a cron daemon through its init script; never fails
    async fn ensure_cron_daemon(&self) {
        let Some(script) = CRON_INIT_SCRIPTS
            .iter()
            .map(|s| self.settings.probe_root.join(s))
            .find(|p| p.is_file())
        else {
            debug!("no cron init script found, assuming cron is managed elsewhere");
            return;
        };

        let cmd = CommandSpec::new(script.display().to_string()).arg("start");
        match self.runner.run(&cmd).await {
            Ok(result) if result.success() => {
                info!(script = %script.display(), "cron daemon started");
            }
            Ok(result) => {
                warn!(script = %script.display(), status = result.status, "cron daemon start returned non-zero");
            }
            Err(e) => warn!(script = %script.display(), error = %e, "failed to start cron daemon"),
        }
    }
}
