//! Type definitions for package management

use std::fmt;

/// Supported package manager backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// APT front-end (Debian/Ubuntu)
    Apt,
    /// Classic `apt-get` (older Debian/Ubuntu)
    AptLegacy,
    /// DNF (Fedora/RHEL 8+)
    Dnf,
    /// YUM (CentOS 7/RHEL 7)
    Yum,
    /// pacman (Arch)
    Pacman,
    /// zypper (openSUSE/SLES)
    Zypper,
    /// apk (Alpine)
    Apk,
}

impl Backend {
    /// Short identifier, matching the tool's command name
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Backend::Apt => "apt",
            Backend::AptLegacy => "apt-get",
            Backend::Dnf => "dnf",
            Backend::Yum => "yum",
            Backend::Pacman => "pacman",
            Backend::Zypper => "zypper",
            Backend::Apk => "apk",
        }
    }

    /// Absolute path whose executable presence confirms the backend
    #[must_use]
    pub fn probe_path(self) -> &'static str {
        match self {
            Backend::Apt => "/usr/bin/apt",
            Backend::AptLegacy => "/usr/bin/apt-get",
            Backend::Dnf => "/usr/bin/dnf",
            Backend::Yum => "/usr/bin/yum",
            Backend::Pacman => "/usr/bin/pacman",
            Backend::Zypper => "/usr/bin/zypper",
            Backend::Apk => "/sbin/apk",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
