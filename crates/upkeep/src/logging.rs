//! Log sink bootstrap and tracing setup
//!
//! Log lines go to stderr and to an append-only log file. When the configured
//! file cannot be opened, a per-user location is used instead.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Opened log file, plus what went wrong with the preferred location
#[derive(Debug)]
pub struct LogSink {
    pub file: Option<File>,
    pub path: PathBuf,
    /// Preferred path and the error that made us fall back
    pub fallback_from: Option<(PathBuf, String)>,
}

fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn fallback_paths() -> Vec<PathBuf> {
    [
        dirs::data_local_dir().map(|d| d.join("upkeep/upkeep.log")),
        dirs::home_dir().map(|d| d.join("upkeep.log")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Open `preferred`, falling back to per-user locations
#[must_use]
pub fn open_sink(preferred: &Path) -> LogSink {
    open_sink_with(preferred, &fallback_paths())
}

fn open_sink_with(preferred: &Path, fallbacks: &[PathBuf]) -> LogSink {
    let err = match open_append(preferred) {
        Ok(file) => {
            return LogSink {
                file: Some(file),
                path: preferred.to_path_buf(),
                fallback_from: None,
            };
        }
        Err(e) => e.to_string(),
    };

    for path in fallbacks {
        if let Ok(file) = open_append(path) {
            return LogSink {
                file: Some(file),
                path: path.clone(),
                fallback_from: Some((preferred.to_path_buf(), err)),
            };
        }
    }

    LogSink {
        file: None,
        path: preferred.to_path_buf(),
        fallback_from: Some((preferred.to_path_buf(), err)),
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over `level`.
///
/// # Errors
/// Returns error if a global subscriber is already set
pub fn init(level: &str, sink: &mut LogSink) -> eyre::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    let file_layer = sink.file.take().map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init()?;

    if let Some((preferred, err)) = &sink.fallback_from {
        if sink.path == *preferred {
            warn!(
                preferred = %preferred.display(),
                error = %err,
                "no writable log file, logging to stderr only"
            );
        } else {
            warn!(
                preferred = %preferred.display(),
                using = %sink.path.display(),
                error = %err,
                "log file unavailable, using fallback"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_preferred_path_used() {
        let dir = TempDir::new().unwrap();
        let preferred = dir.path().join("log/upkeep.log");

        let sink = open_sink_with(&preferred, &[]);

        assert!(sink.file.is_some());
        assert!(sink.fallback_from.is_none());
        assert_eq!(sink.path, preferred);
    }

    #[test]
    fn test_falls_back_when_preferred_unwritable() {
        let dir = TempDir::new().unwrap();
        // A regular file where a directory is expected
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let fallback = dir.path().join("user/upkeep.log");

        let sink = open_sink_with(&blocker.join("upkeep.log"), &[fallback.clone()]);

        assert!(sink.file.is_some());
        assert_eq!(sink.path, fallback);
        assert!(sink.fallback_from.is_some());
    }

    #[test]
    fn test_no_writable_location() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let sink = open_sink_with(&blocker.join("a.log"), &[blocker.join("b.log")]);

        assert!(sink.file.is_none());
        assert!(sink.fallback_from.is_some());
    }
}
