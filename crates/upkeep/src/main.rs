//! upkeep
//!
//! Keeps the local host updated through its package manager and installs a
//! recurring systemd timer or cron entry that repeats the update unattended.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use tracing::error;
use upkeep_core::{Config, Orchestrator, Period, current_executable};
use upkeep_exec::LocalExecutor;

mod logging;
mod privilege;
mod prompt;

use prompt::LinePrompt;

/// Automatic system updates
#[derive(Parser, Debug)]
#[command(name = "upkeep", version, about)]
struct Args {
    /// Run a single update cycle and exit with its status
    #[arg(long, conflicts_with = "period")]
    run: bool,

    /// Install non-interactively with this period (daily, weekly, monthly)
    #[arg(long)]
    period: Option<Period>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Per-step timeout in seconds for package manager commands
    #[arg(long)]
    timeout: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    let Startup { config, mut sink } =
        match startup(&args, privilege::require_root, logging::open_sink) {
            Ok(startup) => startup,
            Err(e) => {
                eprintln!("ERROR: {e}");
                std::process::exit(1);
            }
        };
    logging::init(&config.log_level, &mut sink)?;

    let orchestrator = Orchestrator::new(config, Arc::new(LocalExecutor::new()));

    let code = match run(&args, &orchestrator).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            1
        }
    };

    std::process::exit(code)
}

/// State prepared before logging starts
struct Startup {
    config: Config,
    sink: logging::LogSink,
}

/// Check privileges, load configuration, then open the log sink
///
/// Nothing is read or opened when `require_root` fails.
fn startup(
    args: &Args,
    require_root: impl FnOnce() -> Result<()>,
    open_sink: impl FnOnce(&Path) -> logging::LogSink,
) -> Result<Startup> {
    require_root()?;

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    if args.timeout.is_some() {
        config.step_timeout_secs = args.timeout;
    }
    if args.debug {
        config.log_level = "debug".to_string();
    }

    let sink = open_sink(&config.log_path);
    config.log_path = sink.path.clone();
    Ok(Startup { config, sink })
}

/// Dispatch on the invocation mode, returning the process exit status
async fn run(args: &Args, orchestrator: &Orchestrator) -> Result<i32> {
    if args.run {
        let result = orchestrator.run_once().await?;
        return Ok(result.exit_code());
    }

    let executable = current_executable()?;
    let summary = match args.period {
        Some(mut period) => orchestrator.install(&mut period, &executable).await?,
        None => {
            let mut prompt = LinePrompt::new(io::stdin().lock(), io::stdout());
            orchestrator.install(&mut prompt, &executable).await?
        }
    };

    println!("{summary}");
    Ok(0)
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use nix::unistd::Uid;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_unprivileged_startup_opens_nothing() {
        let args =
            Args::try_parse_from(["upkeep", "--run", "--config", "/nonexistent/upkeep.toml"])
                .unwrap();
        let opened = Cell::new(false);

        let result = startup(
            &args,
            || privilege::check(Uid::from_raw(1000)),
            |path| {
                opened.set(true);
                logging::open_sink(path)
            },
        );

        let err = result.err().unwrap();
        assert!(err.to_string().contains("root privileges required"));
        assert!(!opened.get());
    }

    #[test]
    fn test_privileged_startup_opens_configured_sink() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("log/upkeep.log");
        let config_path = dir.path().join("upkeep.toml");
        std::fs::write(&config_path, format!("log_path = {:?}\n", log_path.display().to_string()))
            .unwrap();
        let args = Args::try_parse_from([
            "upkeep",
            "--run",
            "--timeout",
            "30",
            "--config",
            config_path.to_str().unwrap(),
        ])
        .unwrap();
        let opened = RefCell::new(None);

        let started = startup(
            &args,
            || privilege::check(Uid::from_raw(0)),
            |path| {
                *opened.borrow_mut() = Some(path.to_path_buf());
                logging::open_sink(path)
            },
        )
        .unwrap();

        assert_eq!(opened.borrow().as_deref(), Some(log_path.as_path()));
        assert_eq!(started.config.log_path, log_path);
        assert_eq!(started.config.step_timeout_secs, Some(30));
        assert!(started.sink.file.is_some());
    }

    #[test]
    fn test_run_flag() {
        let args = Args::try_parse_from(["upkeep", "--run"]).unwrap();
        assert!(args.run);
        assert!(args.period.is_none());
    }

    #[test]
    fn test_period_flag_case_insensitive() {
        let args = Args::try_parse_from(["upkeep", "--period", "Weekly"]).unwrap();
        assert_eq!(args.period, Some(Period::Weekly));
    }

    #[test]
    fn test_invalid_period_rejected() {
        assert!(Args::try_parse_from(["upkeep", "--period", "fortnightly"]).is_err());
    }

    #[test]
    fn test_run_conflicts_with_period() {
        assert!(Args::try_parse_from(["upkeep", "--run", "--period", "daily"]).is_err());
    }
}
