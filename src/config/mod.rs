//! Init file discovery and decoding.
pub mod format;
pub mod profiles;
pub mod variables;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::blueprint::items::PackageManagerSpec;
use crate::error::ConfigError;
pub use format::Format;

/// Base name of the init file (`init.yaml`, `init.json`, ...).
pub const INIT_FILE_STEM: &str = "init";

/// Return the user's home directory from `HOME` (or `USERPROFILE`).
#[must_use]
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

/// Expand a leading `~` against `home`.
#[must_use]
pub fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    let home = || home.map(|h| h.to_string_lossy().into_owned());
    PathBuf::from(shellexpand::tilde_with_context(path, home).as_ref())
}

/// Clone target for git-sourced blueprints without a `location`:
/// `$XDG_DATA_HOME/rwr/blueprints`, else `~/.local/share/rwr/blueprints`.
#[must_use]
pub fn default_clone_dir(home: Option<&Path>) -> Option<PathBuf> {
    std::env::var_os("XDG_DATA_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| home.map(|h| h.join(".local").join("share")))
        .map(|base| base.join("rwr").join("blueprints"))
}

/// One entry of the blueprint run order.
///
/// Written either as a bare string (`packages`) or as a single-key map that
/// binds a processor to a path (`{services: system/services.yaml}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOrderEntry", into = "RawOrderEntry")]
pub struct OrderEntry {
    /// Processor name (or, for bare entries, a directory to classify).
    pub processor: String,
    /// Path bound by a map entry, relative to the blueprint directory.
    pub path: Option<String>,
}

impl OrderEntry {
    /// A bare-string entry.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            processor: name.to_string(),
            path: None,
        }
    }

    /// A map entry binding `path` to `processor`.
    #[must_use]
    pub fn bound(processor: &str, path: &str) -> Self {
        Self {
            processor: processor.to_string(),
            path: Some(path.to_string()),
        }
    }

    /// Path to look up under the blueprint directory.
    #[must_use]
    pub fn target(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.processor)
    }
}

impl fmt::Display for OrderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {path}", self.processor),
            None => f.write_str(&self.processor),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawOrderEntry {
    Name(String),
    Bound(BTreeMap<String, String>),
}

impl TryFrom<RawOrderEntry> for OrderEntry {
    type Error = String;

    fn try_from(raw: RawOrderEntry) -> Result<Self, Self::Error> {
        match raw {
            RawOrderEntry::Name(name) => Ok(Self::named(&name)),
            RawOrderEntry::Bound(map) => {
                let mut entries = map.into_iter();
                match (entries.next(), entries.next()) {
                    (Some((processor, path)), None) => Ok(Self::bound(&processor, &path)),
                    _ => Err("order map entries must have exactly one key".to_string()),
                }
            }
        }
    }
}

impl From<OrderEntry> for RawOrderEntry {
    fn from(entry: OrderEntry) -> Self {
        match entry.path {
            Some(path) => Self::Bound(BTreeMap::from([(entry.processor, path)])),
            None => Self::Name(entry.processor),
        }
    }
}

const fn default_true() -> bool {
    true
}

/// Git source for the blueprint directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSource {
    /// Remote URL.
    pub url: String,
    /// Branch to check out; the remote default when absent.
    #[serde(default)]
    pub branch: Option<String>,
    /// Pull the latest changes when the checkout already exists.
    #[serde(default = "default_true")]
    pub pull: bool,
}

/// `blueprints:` section of the init file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueprintSettings {
    /// Format of blueprint files.
    pub format: Format,
    /// Blueprint directory, relative to the init file's directory.
    pub location: Option<String>,
    /// Explicit run order; the default order is used when empty.
    pub order: Vec<OrderEntry>,
    /// Only run files reachable from `order`.
    #[serde(alias = "runOnlyListed")]
    pub run_only_listed: bool,
    /// Optional git source cloned into `location`.
    pub git: Option<GitSource>,
}

/// Decoded init file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitConfig {
    /// Blueprint location, format and ordering.
    #[serde(alias = "init")]
    pub blueprints: BlueprintSettings,
    /// Package managers to install or remove before blueprints run.
    #[serde(alias = "packageManagers")]
    pub package_managers: Vec<PackageManagerSpec>,
    /// Explicit default package manager.
    #[serde(alias = "defaultProvider")]
    pub default_provider: Option<String>,
    /// Free-form variables exposed as `UserDefined.*`.
    pub variables: BTreeMap<String, Value>,
    /// Path the config was loaded from.
    #[serde(skip)]
    pub path: PathBuf,
}

impl InitConfig {
    /// Read and decode an init file; the format follows the extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is unsupported, the file cannot be
    /// read, or its content does not match the init schema.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = Format::from_path(path)
            .ok_or_else(|| ConfigError::UnsupportedExtension(path.to_path_buf()))?;
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            format
                .decode_as(&text)
                .map_err(|message| ConfigError::Decode {
                    path: path.to_path_buf(),
                    format: format.to_string(),
                    message,
                })?
        };
        config.path = path.to_path_buf();
        Ok(config)
    }

    /// Directory containing the init file.
    #[must_use]
    pub fn root(&self) -> PathBuf {
        self.path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    }

    /// Resolved blueprint directory.
    ///
    /// Without a `location`, static blueprints live next to the init file
    /// and git-sourced ones in [`default_clone_dir`].
    #[must_use]
    pub fn blueprint_dir(&self, home: Option<&Path>) -> PathBuf {
        match self.blueprints.location.as_deref() {
            Some(location) if !location.trim().is_empty() => {
                let expanded = expand_home(location, home);
                if expanded.is_absolute() {
                    expanded
                } else {
                    self.root().join(expanded)
                }
            }
            _ if self.blueprints.git.is_some() => {
                default_clone_dir(home).unwrap_or_else(|| self.root().join("blueprints"))
            }
            _ => self.root(),
        }
    }

    /// Paths of the init file and its bootstrap sibling, excluded from the
    /// file walk.
    #[must_use]
    pub fn reserved_files(&self, blueprint_dir: &Path) -> Vec<PathBuf> {
        let mut reserved = vec![self.path.clone()];
        for ext in self.blueprints.format.extensions() {
            reserved.push(blueprint_dir.join(format!("{INIT_FILE_STEM}.{ext}")));
            reserved.push(blueprint_dir.join(format!("{}.{ext}", crate::engine::BOOTSTRAP_STEM)));
        }
        reserved
    }
}

/// Find `init.{yaml,yml,json,toml}` inside `dir`.
#[must_use]
pub fn init_file_in(dir: &Path) -> Option<PathBuf> {
    Format::ALL
        .iter()
        .flat_map(|f| f.extensions().iter())
        .map(|ext| dir.join(format!("{INIT_FILE_STEM}.{ext}")))
        .find(|p| p.is_file())
}

/// Locate the init file.
///
/// An explicit path wins; a directory is searched for an init file. Without
/// one, the current directory and then `~/.config/rwr` are searched.
///
/// # Errors
///
/// Returns [`ConfigError::InitNotFound`] if no init file exists.
pub fn discover_init(
    explicit: Option<&Path>,
    cwd: &Path,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        if path.is_dir() {
            return init_file_in(path).ok_or_else(|| ConfigError::InitNotFound {
                searched: path.display().to_string(),
            });
        }
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(ConfigError::InitNotFound {
            searched: path.display().to_string(),
        });
    }

    let mut candidates = vec![cwd.to_path_buf()];
    if let Some(home) = home {
        candidates.push(home.join(".config").join("rwr"));
    }
    candidates
        .iter()
        .find_map(|dir| init_file_in(dir))
        .ok_or_else(|| ConfigError::InitNotFound {
            searched: candidates
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
}
