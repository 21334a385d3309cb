//! Backend registry and detection
//!
//! Probing order is fixed. Within a family the modern front-end wins over the
//! legacy one (`apt` before `apt-get`, `dnf` before `yum`), so a host carrying
//! both always resolves to the same backend.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::error::PackageError;
use crate::types::Backend;

/// Detection priority, highest first
pub const PRIORITY: [Backend; 7] = [
    Backend::Apt,
    Backend::AptLegacy,
    Backend::Dnf,
    Backend::Yum,
    Backend::Pacman,
    Backend::Zypper,
    Backend::Apk,
];

/// Detect the package manager installed on this host
///
/// # Errors
/// Returns `PackageError::NoSupportedBackend` if no probe path is executable
pub fn detect() -> Result<Backend, PackageError> {
    detect_in(Path::new("/"))
}

/// Detect the package manager installed below `root`
///
/// # Errors
/// Returns `PackageError::NoSupportedBackend` if no probe path is executable
#[instrument(level = "debug")]
pub fn detect_in(root: &Path) -> Result<Backend, PackageError> {
    for backend in PRIORITY {
        let path = probe_location(root, backend);
        if is_executable(&path) {
            info!(backend = %backend, path = %path.display(), "detected package manager");
            return Ok(backend);
        }
        debug!(backend = %backend, path = %path.display(), "probe missed");
    }

    Err(PackageError::NoSupportedBackend {
        probed: PRIORITY
            .iter()
            .map(|b| b.probe_path().to_string())
            .collect(),
    })
}

fn probe_location(root: &Path, backend: Backend) -> PathBuf {
    root.join(backend.probe_path().trim_start_matches('/'))
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn install_probe(root: &Path, backend: Backend, mode: u32) {
        let path = probe_location(root, backend);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn test_priority_covers_every_backend() {
        // Adding a variant without listing it here fails to compile
        for backend in PRIORITY {
            match backend {
                Backend::Apt
                | Backend::AptLegacy
                | Backend::Dnf
                | Backend::Yum
                | Backend::Pacman
                | Backend::Zypper
                | Backend::Apk => {}
            }
        }
        let mut ids: Vec<_> = PRIORITY.iter().map(|b| b.id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 7);
    }

    #[test]
    fn test_detect_none() {
        let root = TempDir::new().unwrap();
        let err = detect_in(root.path()).unwrap_err();
        match err {
            PackageError::NoSupportedBackend { probed } => assert_eq!(probed.len(), 7),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_detect_single() {
        let root = TempDir::new().unwrap();
        install_probe(root.path(), Backend::Apk, 0o755);
        assert_eq!(detect_in(root.path()).unwrap(), Backend::Apk);
    }

    #[test]
    fn test_modern_apt_preferred_over_legacy() {
        let root = TempDir::new().unwrap();
        install_probe(root.path(), Backend::AptLegacy, 0o755);
        install_probe(root.path(), Backend::Apt, 0o755);
        assert_eq!(detect_in(root.path()).unwrap(), Backend::Apt);
    }

    #[test]
    fn test_dnf_preferred_over_yum() {
        let root = TempDir::new().unwrap();
        install_probe(root.path(), Backend::Yum, 0o755);
        install_probe(root.path(), Backend::Dnf, 0o755);
        assert_eq!(detect_in(root.path()).unwrap(), Backend::Dnf);
    }

    #[test]
    fn test_non_executable_probe_ignored() {
        let root = TempDir::new().unwrap();
        install_probe(root.path(), Backend::Apt, 0o644);
        install_probe(root.path(), Backend::Pacman, 0o755);
        assert_eq!(detect_in(root.path()).unwrap(), Backend::Pacman);
    }

    #[test]
    fn test_directory_probe_ignored() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(probe_location(root.path(), Backend::Zypper)).unwrap();
        assert!(detect_in(root.path()).is_err());
    }
}
