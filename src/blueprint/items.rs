//! Typed blueprint items, one struct per processor kind.
//!
//! Every item carries a `profiles` tag list; missing fields take their
//! defaults so fragments can stay terse.
use serde::{Deserialize, Serialize};

use crate::config::profiles::Profiled;

/// Implement [`Profiled`] for item structs that store tags in `profiles`.
macro_rules! impl_profiled {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Profiled for $ty {
                fn profiles(&self) -> &[String] {
                    &self.profiles
                }
            }
        )+
    };
}

/// Install or remove a package, font or package manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageAction {
    /// Ensure present.
    #[default]
    Install,
    /// Ensure absent.
    #[serde(alias = "uninstall")]
    Remove,
}

/// Add or remove a package repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryAction {
    /// Register the repository.
    #[default]
    #[serde(alias = "install")]
    Add,
    /// Unregister the repository.
    Remove,
}

/// Service state change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    /// Enable at boot.
    #[default]
    Enable,
    /// Disable at boot.
    Disable,
    /// Start now.
    Start,
    /// Stop now.
    Stop,
    /// Restart now.
    Restart,
}

/// Filesystem operation for files and directories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    /// Create from inline content or an empty node.
    #[default]
    Create,
    /// Copy from `source`.
    Copy,
    /// Move from `source`.
    Move,
    /// Delete the target.
    Delete,
    /// Change permissions only.
    Chmod,
    /// Symlink to `source`.
    Symlink,
}

/// Account or key lifecycle operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    /// Create if absent.
    #[default]
    Create,
    /// Update in place.
    Modify,
    /// Delete if present.
    Delete,
}

/// Script execution mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptAction {
    /// Run the script.
    #[default]
    Run,
}

/// Git checkout operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitAction {
    /// Clone if absent.
    #[default]
    Clone,
    /// Pull an existing checkout.
    Pull,
}

/// Configuration key operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigAction {
    /// Set the key.
    #[default]
    Set,
    /// Remove the key.
    Unset,
}

/// A package (or group of packages) to install or remove.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Package {
    /// Single package name.
    pub name: Option<String>,
    /// Several package names handled together.
    pub names: Vec<String>,
    /// Install or remove.
    pub action: PackageAction,
    /// Package manager to use instead of the default provider.
    #[serde(alias = "packageManager")]
    pub package_manager: Option<String>,
    /// Force elevation even if the provider does not require it.
    pub elevated: bool,
    /// Extra arguments appended to the command.
    pub args: Vec<String>,
    /// Profile tags.
    pub profiles: Vec<String>,
}

impl Package {
    /// `name` followed by `names`, skipping blanks.
    #[must_use]
    pub fn all_names(&self) -> Vec<String> {
        self.name
            .iter()
            .chain(self.names.iter())
            .filter(|n| !n.trim().is_empty())
            .cloned()
            .collect()
    }
}

/// A third-party package repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Repository {
    /// Repository name.
    pub name: String,
    /// Add or remove.
    pub action: RepositoryAction,
    /// Package manager that owns the repository.
    #[serde(alias = "packageManager")]
    pub package_manager: Option<String>,
    /// Repository URL.
    pub url: String,
    /// Signing key URL.
    #[serde(alias = "keyUrl")]
    pub key_url: Option<String>,
    /// Distribution channel (e.g. `stable`).
    pub channel: Option<String>,
    /// Repository component (e.g. `main`).
    pub component: Option<String>,
    /// Architecture override.
    pub arch: Option<String>,
    /// Profile tags.
    pub profiles: Vec<String>,
}

/// A system service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Service {
    /// Unit or label name.
    pub name: String,
    /// Desired state change.
    pub action: ServiceAction,
    /// Manage a system-level service rather than a user service.
    pub elevated: bool,
    /// Profile tags.
    pub profiles: Vec<String>,
}

/// A file to create, copy or remove.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct File {
    /// File name.
    pub name: Option<String>,
    /// Several file names handled together.
    pub names: Vec<String>,
    /// Operation.
    pub action: FileAction,
    /// Source path or URL.
    pub source: Option<String>,
    /// Destination directory.
    pub target: Option<String>,
    /// Inline content for `create`.
    pub content: Option<String>,
    /// Owner user.
    pub owner: Option<String>,
    /// Owner group.
    pub group: Option<String>,
    /// Octal mode string (e.g. `0644`).
    pub mode: Option<String>,
    /// Use elevated privileges.
    pub elevated: bool,
    /// Profile tags.
    pub profiles: Vec<String>,
}

/// A directory to create, copy or remove.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Directory {
    /// Directory name.
    pub name: Option<String>,
    /// Several directory names handled together.
    pub names: Vec<String>,
    /// Operation.
    pub action: FileAction,
    /// Source path.
    pub source: Option<String>,
    /// Parent directory.
    pub target: Option<String>,
    /// Owner user.
    pub owner: Option<String>,
    /// Owner group.
    pub group: Option<String>,
    /// Octal mode string.
    pub mode: Option<String>,
    /// Use elevated privileges.
    pub elevated: bool,
    /// Profile tags.
    pub profiles: Vec<String>,
}

/// A shell script to run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Script {
    /// Display name.
    pub name: String,
    /// Run mode.
    pub action: ScriptAction,
    /// Inline command line.
    pub exec: Option<String>,
    /// Script file, relative to the blueprint directory.
    pub source: Option<String>,
    /// Arguments appended to the command.
    pub args: Vec<String>,
    /// Run through `sudo`.
    pub elevated: bool,
    /// Message logged before running.
    pub log: Option<String>,
    /// Profile tags.
    pub profiles: Vec<String>,
}

/// An SSH key pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshKey {
    /// Key file name.
    pub name: String,
    /// Create or delete.
    pub action: LifecycleAction,
    /// Key algorithm (`ed25519`, `rsa`, ...).
    #[serde(alias = "type")]
    pub key_type: Option<String>,
    /// Key comment.
    pub comment: Option<String>,
    /// Directory holding the key.
    pub path: Option<String>,
    /// Generate without a passphrase.
    #[serde(alias = "noPassphrase")]
    pub no_passphrase: bool,
    /// Profile tags.
    pub profiles: Vec<String>,
}

/// A font family to install.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Font {
    /// Font name.
    pub name: Option<String>,
    /// Several font names.
    pub names: Vec<String>,
    /// Install or remove.
    pub action: PackageAction,
    /// Download URL or provider hint.
    pub source: Option<String>,
    /// Profile tags.
    pub profiles: Vec<String>,
}

/// A configuration key for a tool (git config, dconf, defaults, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Display name.
    pub name: String,
    /// Tool owning the key.
    pub tool: Option<String>,
    /// Key path.
    pub key: Option<String>,
    /// Value to set.
    pub value: Option<serde_json::Value>,
    /// Set or unset.
    pub action: ConfigAction,
    /// Profile tags.
    pub profiles: Vec<String>,
}

/// A local user account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    /// Login name.
    pub name: String,
    /// Create, modify or delete.
    pub action: LifecycleAction,
    /// Supplementary groups.
    pub groups: Vec<String>,
    /// Login shell.
    pub shell: Option<String>,
    /// Home directory.
    pub home: Option<String>,
    /// Create the home directory.
    #[serde(alias = "createHome")]
    pub create_home: bool,
    /// Profile tags.
    pub profiles: Vec<String>,
}

/// A local group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    /// Group name.
    pub name: String,
    /// Create, modify or delete.
    pub action: LifecycleAction,
    /// Profile tags.
    pub profiles: Vec<String>,
}

/// A git checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitRepo {
    /// Checkout name.
    pub name: String,
    /// Clone or pull.
    pub action: GitAction,
    /// Remote URL.
    pub url: String,
    /// Parent directory.
    pub path: Option<String>,
    /// Branch to check out.
    pub branch: Option<String>,
    /// Profile tags.
    pub profiles: Vec<String>,
}

/// A package manager to provision before blueprints run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageManagerSpec {
    /// Provider name.
    pub name: String,
    /// Install or remove.
    pub action: PackageAction,
    /// Profile tags.
    pub profiles: Vec<String>,
}

impl_profiled!(
    Package,
    Repository,
    Service,
    File,
    Directory,
    Script,
    SshKey,
    Font,
    Configuration,
    User,
    Group,
    GitRepo,
    PackageManagerSpec,
);
