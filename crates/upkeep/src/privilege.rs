//! Root privilege check

use nix::unistd::{Uid, geteuid};

/// Fail unless running with effective UID 0
///
/// # Errors
/// Returns an error naming the current effective UID
pub fn require_root() -> eyre::Result<()> {
    check(geteuid())
}

pub(crate) fn check(euid: Uid) -> eyre::Result<()> {
    if euid.is_root() {
        Ok(())
    } else {
        eyre::bail!("root privileges required (running as uid {euid}); re-run with sudo")
    }
}
