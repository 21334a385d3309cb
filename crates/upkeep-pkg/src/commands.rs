//! Backend to command mapping
//!
//! Each backend maps to an update action and a cleanup action. Actions are
//! ordered lists of structured steps, never shell strings.

use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;
use upkeep_exec::CommandSpec;

use crate::error::PackageError;
use crate::types::Backend;

/// apk refuses to manage its cache unless this directory exists
const APK_CACHE_DIR: &str = "/etc/apk/cache";

/// One executable step of an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Command to run
    pub command: CommandSpec,
    /// Optional query whose stdout lines are appended to `command` as
    /// arguments. An empty answer turns the step into a no-op.
    pub operands: Option<CommandSpec>,
}

impl Step {
    /// A step that runs `command` as-is
    #[must_use]
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            operands: None,
        }
    }

    /// A step whose trailing arguments come from the output of `query`
    #[must_use]
    pub fn with_operands(command: CommandSpec, query: CommandSpec) -> Self {
        Self {
            command,
            operands: Some(query),
        }
    }
}

/// An ordered, non-empty list of steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    steps: Vec<Step>,
}

impl Action {
    fn new(steps: Vec<Step>) -> Self {
        debug_assert!(!steps.is_empty(), "actions carry at least one step");
        Self { steps }
    }

    /// Steps in execution order
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// Update and cleanup actions for one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSet {
    /// Backend these commands belong to
    pub backend: Backend,
    /// Refresh metadata and upgrade packages; must fully succeed
    pub update: Action,
    /// Remove unneeded packages and caches; failure is tolerated
    pub cleanup: Action,
}

fn apt(tool: &str, args: &[&str]) -> Step {
    Step::new(
        CommandSpec::new(tool)
            .args(args.iter().copied())
            .env("DEBIAN_FRONTEND", "noninteractive"),
    )
}

fn cmd(program: &str, args: &[&str]) -> Step {
    Step::new(CommandSpec::new(program).args(args.iter().copied()))
}

/// Map a backend to its update and cleanup commands
#[must_use]
pub fn commands_for(backend: Backend) -> CommandSet {
    let (update, cleanup) = match backend {
        Backend::Apt | Backend::AptLegacy => {
            let tool = backend.id();
            (
                vec![apt(tool, &["update"]), apt(tool, &["upgrade", "-y"])],
                vec![apt(tool, &["autoremove", "-y"]), apt(tool, &["autoclean"])],
            )
        }
        Backend::Dnf => (
            vec![cmd("dnf", &["upgrade", "--refresh", "-y"])],
            vec![
                cmd("dnf", &["autoremove", "-y"]),
                cmd("dnf", &["clean", "packages"]),
            ],
        ),
        Backend::Yum => (
            vec![cmd("yum", &["update", "-y"])],
            vec![
                cmd("yum", &["autoremove", "-y"]),
                cmd("yum", &["clean", "packages"]),
            ],
        ),
        Backend::Pacman => (
            vec![cmd("pacman", &["-Syu", "--noconfirm"])],
            vec![
                // Orphans: packages installed as dependencies that nothing requires
                Step::with_operands(
                    CommandSpec::new("pacman").args(["-Rns", "--noconfirm"]),
                    CommandSpec::new("pacman").arg("-Qdtq"),
                ),
                cmd("pacman", &["-Sc", "--noconfirm"]),
            ],
        ),
        Backend::Zypper => (
            vec![
                cmd("zypper", &["--non-interactive", "refresh"]),
                cmd("zypper", &["--non-interactive", "update"]),
            ],
            vec![cmd("zypper", &["--non-interactive", "clean", "--all"])],
        ),
        Backend::Apk => (
            vec![cmd("apk", &["update"]), cmd("apk", &["upgrade"])],
            vec![cmd("apk", &["cache", "clean"])],
        ),
    };

    CommandSet {
        backend,
        update: Action::new(update),
        cleanup: Action::new(cleanup),
    }
}

/// Perform backend-specific setup below `root`
///
/// Idempotent. For apk this creates the cache directory, treating an existing
/// entry as success. Other backends need no setup.
///
/// # Errors
/// Returns `PackageError::Prepare` if the directory cannot be created
pub fn prepare(backend: Backend, root: &Path) -> Result<(), PackageError> {
    match backend {
        Backend::Apk => {
            let dir = root.join(APK_CACHE_DIR.trim_start_matches('/'));
            match std::fs::create_dir_all(&dir) {
                Ok(()) => {
                    debug!(path = %dir.display(), "apk cache directory ready");
                    Ok(())
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
                Err(e) => Err(PackageError::Prepare {
                    path: dir.display().to_string(),
                    message: e.to_string(),
                }),
            }
        }
        Backend::Apt
        | Backend::AptLegacy
        | Backend::Dnf
        | Backend::Yum
        | Backend::Pacman
        | Backend::Zypper => Ok(()),
    }
}
