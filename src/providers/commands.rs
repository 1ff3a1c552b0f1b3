//! Concrete command lines synthesized from provider templates.
//!
//! Templates and arguments come from trusted definition and blueprint files
//! and are joined verbatim; nothing is shell-escaped.
use std::fmt;
use std::path::Path;

use super::Provider;
use crate::error::ProviderError;
use crate::exec::Executor;
use crate::platform::Platform;

/// One of the command templates a provider may define.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// List installed packages.
    List,
    /// Search the index.
    Search,
    /// Install packages.
    Install,
    /// Remove packages.
    Remove,
    /// Refresh the index.
    Update,
    /// Clean caches.
    Clean,
}

impl CommandKind {
    /// Every command kind, in display order.
    pub const ALL: [Self; 6] = [
        Self::List,
        Self::Search,
        Self::Install,
        Self::Remove,
        Self::Update,
        Self::Clean,
    ];

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Search => "search",
            Self::Install => "install",
            Self::Remove => "remove",
            Self::Update => "update",
            Self::Clean => "clean",
        }
    }

    /// Read-only queries, which never run elevated.
    #[must_use]
    pub const fn is_query(self) -> bool {
        matches!(self, Self::List | Self::Search)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether commands that need root must be prefixed with `sudo`.
///
/// Never on Windows; elsewhere unless `id -u` reports root.
#[must_use]
pub fn elevation_required(platform: &Platform, executor: &dyn Executor) -> bool {
    if platform.is_windows() {
        return false;
    }
    !executor
        .run_unchecked("id", &["-u"])
        .is_ok_and(|r| r.success && r.stdout.trim() == "0")
}

/// The concrete commands of one detected provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSet {
    /// Provider name.
    pub provider: String,
    /// Full `list` command line.
    pub list: Option<String>,
    /// Full `search` command line.
    pub search: Option<String>,
    /// Full `install` command line.
    pub install: Option<String>,
    /// Full `remove` command line.
    pub remove: Option<String>,
    /// Full `update` command line.
    pub update: Option<String>,
    /// Full `clean` command line.
    pub clean: Option<String>,
    /// Environment passed to every command.
    pub environment: Vec<(String, String)>,
}

impl CommandSet {
    /// Join the binary path, or the program named in `binaries`, with each
    /// template.
    ///
    /// Elevated providers get a `sudo` prefix when `elevate` is set, except
    /// on queries. Blank templates yield no command.
    #[must_use]
    pub fn synthesize(provider: &Provider, bin_path: &Path, elevate: bool) -> Self {
        let commands = &provider.commands;
        let sudo = provider.elevated && elevate;
        let line = |kind: CommandKind, template: &Option<String>| {
            let template = template.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
            let program = commands
                .binaries
                .get(kind.as_str())
                .map_or_else(|| bin_path.display().to_string(), Clone::clone);
            let prefix = if sudo && !kind.is_query() { "sudo " } else { "" };
            Some(format!("{prefix}{program} {template}"))
        };
        Self {
            provider: provider.name.clone(),
            list: line(CommandKind::List, &commands.list),
            search: line(CommandKind::Search, &commands.search),
            install: line(CommandKind::Install, &commands.install),
            remove: line(CommandKind::Remove, &commands.remove),
            update: line(CommandKind::Update, &commands.update),
            clean: line(CommandKind::Clean, &commands.clean),
            environment: provider
                .environment
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// The command line for `kind`, if defined.
    #[must_use]
    pub fn get(&self, kind: CommandKind) -> Option<&str> {
        match kind {
            CommandKind::List => self.list.as_deref(),
            CommandKind::Search => self.search.as_deref(),
            CommandKind::Install => self.install.as_deref(),
            CommandKind::Remove => self.remove.as_deref(),
            CommandKind::Update => self.update.as_deref(),
            CommandKind::Clean => self.clean.as_deref(),
        }
    }

    /// The command line for `kind` followed by `args`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::MissingCommand`] if `kind` is not defined.
    pub fn with_args(&self, kind: CommandKind, args: &[String]) -> Result<String, ProviderError> {
        let base = self.get(kind).ok_or_else(|| ProviderError::MissingCommand {
            provider: self.provider.clone(),
            command: kind.as_str(),
        })?;
        let mut line = base.to_string();
        for arg in args.iter().filter(|a| !a.is_empty()) {
            line.push(' ');
            line.push_str(arg);
        }
        Ok(line)
    }
}
