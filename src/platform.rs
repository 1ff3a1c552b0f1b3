//! Host operating system and distribution detection.
use std::fmt;
use std::path::Path;

/// Location of the os-release file on Linux hosts.
pub const OS_RELEASE_PATH: &str = "/etc/os-release";

/// Detected operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    /// Any Linux distribution.
    Linux,
    /// macOS.
    MacOs,
    /// Windows.
    Windows,
    /// Other Unix-like systems (BSDs and friends).
    Other,
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linux => write!(f, "linux"),
            Self::MacOs => write!(f, "macos"),
            Self::Windows => write!(f, "windows"),
            Self::Other => write!(f, "{}", std::env::consts::OS),
        }
    }
}

/// Platform information for the current system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Operating system family.
    pub os: Os,
    /// Distribution ID from os-release (`ID=`), empty when unknown.
    pub distro: String,
    /// Parent distributions from os-release (`ID_LIKE=`).
    pub distro_like: Vec<String>,
    /// Version string (`VERSION_ID=` on Linux).
    pub version: String,
    /// CPU architecture as reported by the toolchain (`x86_64`, `aarch64`, ...).
    pub arch: String,
}

/// Fields of interest from an os-release file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OsRelease {
    /// `ID=`
    pub id: String,
    /// `ID_LIKE=`, split on whitespace.
    pub id_like: Vec<String>,
    /// `VERSION_ID=`
    pub version_id: String,
}

/// Parse the content of an os-release file.
///
/// Values may be bare or quoted; comments and unknown keys are ignored.
#[must_use]
pub fn parse_os_release(content: &str) -> OsRelease {
    let mut release = OsRelease::default();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        match key.trim() {
            "ID" => release.id = value.to_lowercase(),
            "ID_LIKE" => {
                release.id_like = value
                    .split_whitespace()
                    .map(str::to_lowercase)
                    .collect();
            }
            "VERSION_ID" => release.version_id = value.to_string(),
            _ => {}
        }
    }
    release
}

impl Platform {
    /// Detect the current platform.
    #[must_use]
    pub fn detect() -> Self {
        let os = detect_os();
        let release = if os == Os::Linux {
            Self::read_os_release(Path::new(OS_RELEASE_PATH))
        } else {
            OsRelease::default()
        };
        Self::from_release(os, release)
    }

    /// Build a platform from an OS family and parsed os-release fields.
    #[must_use]
    pub fn from_release(os: Os, release: OsRelease) -> Self {
        Self {
            os,
            distro: release.id,
            distro_like: release.id_like,
            version: release.version_id,
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    /// Create a platform with explicit values (for testing and overrides).
    #[must_use]
    pub fn new(os: Os, distro: &str, distro_like: &[&str]) -> Self {
        Self {
            os,
            distro: distro.to_string(),
            distro_like: distro_like.iter().map(|s| (*s).to_string()).collect(),
            version: String::new(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    /// Read and parse an os-release file, returning empty fields if it is unreadable.
    #[must_use]
    pub fn read_os_release(path: &Path) -> OsRelease {
        std::fs::read_to_string(path)
            .map(|content| parse_os_release(&content))
            .unwrap_or_default()
    }

    /// Whether this platform is Linux.
    #[must_use]
    pub fn is_linux(&self) -> bool {
        self.os == Os::Linux
    }

    /// Whether this platform is macOS.
    #[must_use]
    pub fn is_macos(&self) -> bool {
        self.os == Os::MacOs
    }

    /// Whether this platform is Windows.
    #[must_use]
    pub fn is_windows(&self) -> bool {
        self.os == Os::Windows
    }

    /// OS family name used in templates: the first `ID_LIKE` entry, the
    /// distro ID, or the OS name.
    #[must_use]
    pub fn family(&self) -> String {
        self.distro_like
            .first()
            .cloned()
            .filter(|s| !s.is_empty())
            .or_else(|| Some(self.distro.clone()).filter(|s| !s.is_empty()))
            .unwrap_or_else(|| self.os.to_string())
    }

    /// How specifically a provider's distribution list matches this host.
    ///
    /// Returns `3` for a distro ID match, `2` for an `ID_LIKE` match, `1` for
    /// an OS match and `None` when nothing matches. `darwin` is accepted as an
    /// alias for `macos`.
    #[must_use]
    pub fn match_rank(&self, distributions: &[String]) -> Option<u8> {
        let os = self.os.to_string();
        distributions
            .iter()
            .filter_map(|d| {
                let d = d.to_lowercase();
                if !self.distro.is_empty() && d == self.distro {
                    Some(3)
                } else if self.distro_like.iter().any(|like| *like == d) {
                    Some(2)
                } else if d == os || (self.os == Os::MacOs && d == "darwin") {
                    Some(1)
                } else {
                    None
                }
            })
            .max()
    }

    /// Whether a provider's distribution list matches this host at all.
    #[must_use]
    pub fn matches(&self, distributions: &[String]) -> bool {
        self.match_rank(distributions).is_some()
    }
}

fn detect_os() -> Os {
    match std::env::consts::OS {
        "linux" => Os::Linux,
        "macos" => Os::MacOs,
        "windows" => Os::Windows,
        _ => Os::Other,
    }
}
