//! Distribution identification from os-release

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

const OS_RELEASE_PATHS: [&str; 2] = ["etc/os-release", "usr/lib/os-release"];
const ALPINE_RELEASE: &str = "etc/alpine-release";

/// Detected distribution information
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistroInfo {
    /// Distribution ID (debian, fedora, alpine, ...)
    pub id: String,
    /// Version ID, empty for rolling releases
    pub version_id: String,
    /// Human readable name
    pub pretty_name: String,
}

impl DistroInfo {
    /// Identify the running distribution
    #[must_use]
    pub fn detect() -> Self {
        Self::detect_in(Path::new("/"))
    }

    /// Identify the distribution installed below `root`
    ///
    /// Missing files are not an error; the result is then labeled `unknown`.
    #[must_use]
    pub fn detect_in(root: &Path) -> Self {
        let Some(content) = OS_RELEASE_PATHS
            .iter()
            .find_map(|p| std::fs::read_to_string(root.join(p)).ok())
        else {
            debug!("no os-release file found");
            return Self::default();
        };

        let mut info = Self::from_os_release(&content);

        // Alpine's os-release often lags behind the point release
        if info.id == "alpine"
            && let Ok(version) = std::fs::read_to_string(root.join(ALPINE_RELEASE))
        {
            let version = version.trim();
            if !version.is_empty() {
                info.version_id = version.to_string();
            }
        }

        info
    }

    /// Build from the contents of an os-release file
    #[must_use]
    pub fn from_os_release(content: &str) -> Self {
        let mut vars = parse_os_release(content);
        Self {
            id: vars.remove("ID").unwrap_or_default(),
            version_id: vars.remove("VERSION_ID").unwrap_or_default(),
            pretty_name: vars.remove("PRETTY_NAME").unwrap_or_default(),
        }
    }

    /// Short label used in log markers, e.g. `debian 12`
    #[must_use]
    pub fn label(&self) -> String {
        match (self.id.is_empty(), self.version_id.is_empty()) {
            (true, _) => "unknown".to_string(),
            (false, true) => self.id.clone(),
            (false, false) => format!("{} {}", self.id, self.version_id),
        }
    }
}

/// Parse `KEY=value` lines, stripping optional quotes
fn parse_os_release(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}
