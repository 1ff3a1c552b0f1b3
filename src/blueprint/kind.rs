//! Processor kinds and the fixed orders they run in.
use std::fmt;
use std::str::FromStr;

/// A kind of blueprint processor; also the document key of its section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcessorKind {
    /// `packageManagers`
    PackageManagers,
    /// `repositories`
    Repositories,
    /// `packages`
    Packages,
    /// `ssh_keys`
    SshKeys,
    /// `files`
    Files,
    /// `directories`
    Directories,
    /// `fonts`
    Fonts,
    /// `services`
    Services,
    /// `git`
    Git,
    /// `scripts`
    Scripts,
    /// `configuration`
    Configuration,
    /// `users`
    Users,
    /// `groups`
    Groups,
}

impl ProcessorKind {
    /// Every processor kind.
    pub const ALL: [Self; 13] = [
        Self::PackageManagers,
        Self::Repositories,
        Self::Packages,
        Self::SshKeys,
        Self::Files,
        Self::Directories,
        Self::Fonts,
        Self::Services,
        Self::Git,
        Self::Scripts,
        Self::Configuration,
        Self::Users,
        Self::Groups,
    ];

    /// Run order used when the init file declares none.
    pub const DEFAULT_ORDER: [Self; 10] = [
        Self::PackageManagers,
        Self::Repositories,
        Self::Packages,
        Self::SshKeys,
        Self::Files,
        Self::Fonts,
        Self::Services,
        Self::Git,
        Self::Scripts,
        Self::Configuration,
    ];

    /// Sections of the bootstrap blueprint, in the order they are applied.
    pub const BOOTSTRAP_ORDER: [Self; 8] = [
        Self::Packages,
        Self::Directories,
        Self::Files,
        Self::SshKeys,
        Self::Git,
        Self::Services,
        Self::Users,
        Self::Groups,
    ];

    /// Canonical name, used in run orders and as the document key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PackageManagers => "packageManagers",
            Self::Repositories => "repositories",
            Self::Packages => "packages",
            Self::SshKeys => "ssh_keys",
            Self::Files => "files",
            Self::Directories => "directories",
            Self::Fonts => "fonts",
            Self::Services => "services",
            Self::Git => "git",
            Self::Scripts => "scripts",
            Self::Configuration => "configuration",
            Self::Users => "users",
            Self::Groups => "groups",
        }
    }

    /// Look up a kind by name, accepting the snake/camel spelling variants.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "package_managers" | "packagemanagers" => Some(Self::PackageManagers),
            "sshKeys" | "ssh-keys" | "sshkeys" => Some(Self::SshKeys),
            _ => Self::ALL.into_iter().find(|k| k.as_str() == name),
        }
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown processor '{s}'"))
    }
}
