//! Declarative package-manager definitions.
//!
//! A provider is pure data: how to detect the package manager, the command
//! templates it understands, and optional multi-step procedures for
//! installing it or registering repositories. Definitions are loaded into a
//! [`ProviderRegistry`] once per run; detection and command synthesis live in
//! [`detect`] and [`commands`].
pub mod commands;
pub mod detect;
pub mod steps;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::Format;
use crate::error::ProviderError;

/// System-wide provider directories, probed after the executable's own.
pub const SYSTEM_PROVIDER_DIRS: [&str; 2] =
    ["/usr/local/share/rwr/providers", "/usr/share/rwr/providers"];

/// Definitions compiled into the binary, used when no directory is found.
const BUILTIN: [(&str, &str); 11] = [
    ("apt", include_str!("../../providers/apt.toml")),
    ("dnf", include_str!("../../providers/dnf.toml")),
    ("pacman", include_str!("../../providers/pacman.toml")),
    ("zypper", include_str!("../../providers/zypper.toml")),
    ("apk", include_str!("../../providers/apk.toml")),
    ("brew", include_str!("../../providers/brew.toml")),
    ("winget", include_str!("../../providers/winget.toml")),
    ("scoop", include_str!("../../providers/scoop.toml")),
    ("chocolatey", include_str!("../../providers/chocolatey.toml")),
    ("flatpak", include_str!("../../providers/flatpak.toml")),
    ("snap", include_str!("../../providers/snap.toml")),
];

/// How a provider is recognised on a host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Detection {
    /// OS names, distro IDs or `ID_LIKE` families the provider serves.
    pub distributions: Vec<String>,
    /// Executable that must resolve on `PATH` (or exist, if absolute).
    pub binary: String,
    /// Files that must all exist; a leading `~` is the home directory.
    pub files: Vec<String>,
}

/// Command templates, appended to the resolved binary path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Commands {
    /// List installed packages.
    pub list: Option<String>,
    /// Search the package index.
    pub search: Option<String>,
    /// Install packages.
    pub install: Option<String>,
    /// Remove packages.
    pub remove: Option<String>,
    /// Refresh the package index.
    pub update: Option<String>,
    /// Clean caches and orphans.
    pub clean: Option<String>,
    /// Programs replacing the detection binary for single commands, keyed
    /// by command name (`list = "dpkg-query"`).
    pub binaries: BTreeMap<String, String>,
}

/// One unit of a multi-step procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ActionStep {
    /// Run a program.
    Command {
        /// Program to run.
        exec: String,
        /// Arguments.
        #[serde(default)]
        args: Vec<String>,
        /// Prefix with `sudo` when not already privileged.
        #[serde(default)]
        elevated: bool,
    },
    /// Fetch a URL to a file, optionally verifying its SHA-256.
    Download {
        /// URL to fetch.
        source: String,
        /// Destination file.
        dest: String,
        /// Expected lowercase hex digest.
        #[serde(default)]
        sha256: Option<String>,
        /// Place the file with `sudo`.
        #[serde(default)]
        elevated: bool,
    },
    /// Write literal content to a file.
    Write {
        /// Destination file.
        dest: String,
        /// Content to write.
        content: String,
        /// Place the file with `sudo`.
        #[serde(default)]
        elevated: bool,
    },
    /// Copy a local file.
    Copy {
        /// Source file.
        source: String,
        /// Destination file.
        dest: String,
        /// Place the file with `sudo`.
        #[serde(default)]
        elevated: bool,
    },
}

/// An ordered list of steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Procedure {
    /// Steps, run in order until one fails.
    pub steps: Vec<ActionStep>,
}

impl Procedure {
    /// Whether the procedure has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Repository registration procedures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryProcedures {
    /// Register a repository.
    pub add: Procedure,
    /// Unregister a repository.
    pub remove: Procedure,
}

/// A package-manager definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Provider {
    /// Unique name; defaults to the definition's file stem.
    pub name: String,
    /// Commands need root (prefixed with `sudo` when not root).
    pub elevated: bool,
    /// Tie-breaker for default selection; higher wins.
    pub priority: i32,
    /// Detection rules.
    pub detection: Detection,
    /// Command templates.
    pub commands: Commands,
    /// Extra environment for every command.
    pub environment: BTreeMap<String, String>,
    /// Portable package names mapped to this provider's package lists.
    #[serde(alias = "corePackages")]
    pub core_packages: BTreeMap<String, Vec<String>>,
    /// Procedure that installs the package manager itself.
    pub install: Procedure,
    /// Procedure that removes the package manager itself.
    pub remove: Procedure,
    /// Repository procedures.
    pub repository: RepositoryProcedures,
}

impl Provider {
    /// Decode a definition; an empty name is replaced by `fallback_name`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Malformed`] when the text does not decode.
    pub fn parse(text: &str, format: Format, fallback_name: &str) -> Result<Self, ProviderError> {
        let mut provider: Self =
            format
                .decode_as(text)
                .map_err(|message| ProviderError::Malformed {
                    path: fallback_name.to_string(),
                    message,
                })?;
        if provider.name.trim().is_empty() {
            provider.name = fallback_name.to_string();
        }
        Ok(provider)
    }

    /// Expand a portable package name through `core_packages`.
    ///
    /// Names without a mapping are returned unchanged.
    #[must_use]
    pub fn expand_package(&self, name: &str) -> Vec<String> {
        self.core_packages
            .get(name)
            .cloned()
            .unwrap_or_else(|| vec![name.to_string()])
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ProviderError {
    let path = path.to_path_buf();
    move |source| ProviderError::Io { path, source }
}

/// All known provider definitions, indexed by name.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Provider>,
    source: String,
}

impl ProviderRegistry {
    /// Build a registry from already-decoded definitions.
    #[must_use]
    pub fn from_providers(providers: impl IntoIterator<Item = Provider>, source: &str) -> Self {
        Self {
            providers: providers
                .into_iter()
                .map(|p| (p.name.clone(), p))
                .collect(),
            source: source.to_string(),
        }
    }

    /// Load every definition file in `dir`.
    ///
    /// Files whose extension is not a known format are ignored. A single
    /// malformed definition aborts the whole load.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Io`] if the directory or a file cannot be
    /// read, and [`ProviderError::Malformed`] for an undecodable file.
    pub fn load(dir: &Path) -> Result<Self, ProviderError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(io_err(dir))?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        let mut providers = Vec::new();
        for path in paths {
            let Some(format) = Format::from_path(&path) else {
                continue;
            };
            let text = std::fs::read_to_string(&path).map_err(io_err(&path))?;
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let provider = Provider::parse(&text, format, &stem).map_err(|e| match e {
                ProviderError::Malformed { message, .. } => ProviderError::Malformed {
                    path: path.display().to_string(),
                    message,
                },
                other => other,
            })?;
            providers.push(provider);
        }
        Ok(Self::from_providers(providers, &dir.display().to_string()))
    }

    /// The definitions embedded in the binary.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Malformed`] if an embedded definition does
    /// not decode.
    pub fn builtin() -> Result<Self, ProviderError> {
        let providers = BUILTIN
            .iter()
            .map(|(name, text)| Provider::parse(text, Format::Toml, name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_providers(providers, "built-in"))
    }

    /// Directories probed for definitions, in order.
    #[must_use]
    pub fn search_dirs(explicit: Option<&Path>, home: Option<&Path>) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if let Some(dir) = explicit {
            dirs.push(dir.to_path_buf());
        }
        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            dirs.push(exe_dir.join("providers"));
        }
        dirs.extend(SYSTEM_PROVIDER_DIRS.iter().map(PathBuf::from));
        if let Some(home) = home {
            dirs.push(home.join(".rwr").join("providers"));
        }
        dirs
    }

    /// Load from the first existing probe directory, falling back to the
    /// built-in definitions.
    ///
    /// An explicit directory must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the explicit directory is missing or the chosen
    /// directory cannot be loaded.
    pub fn probe(explicit: Option<&Path>, home: Option<&Path>) -> Result<Self, ProviderError> {
        if let Some(dir) = explicit
            && !dir.is_dir()
        {
            return Err(ProviderError::Io {
                path: dir.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "providers directory does not exist",
                ),
            });
        }
        match Self::search_dirs(explicit, home)
            .into_iter()
            .find(|d| d.is_dir())
        {
            Some(dir) => Self::load(&dir),
            None => Self::builtin(),
        }
    }

    /// Look up a definition by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Provider> {
        self.providers.get(name)
    }

    /// All definitions, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &Provider> {
        self.providers.values()
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Where the definitions came from (a directory or `built-in`).
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::providers::commands::CommandKind;
    use std::fs;

    const APT: &str = r#"
name = "apt"
elevated = true
priority = 10

[detection]
distributions = ["debian", "ubuntu"]
binary = "apt-get"

[commands]
install = "install -y"
remove = "remove -y"

[core_packages]
build-tools = ["build-essential", "pkg-config"]

[[repository.add.steps]]
action = "write"
dest = "/etc/apt/sources.list.d/{{ name }}.list"
content = "deb {{ url }} {{ channel }} {{ component }}"
elevated = true

[[repository.add.steps]]
action = "command"
exec = "apt-get"
args = ["update"]
elevated = true
"#;

    #[test]
    fn parse_full_definition() {
        let provider = Provider::parse(APT, Format::Toml, "fallback").unwrap();
        assert_eq!(provider.name, "apt");
        assert!(provider.elevated);
        assert_eq!(provider.detection.binary, "apt-get");
        assert_eq!(provider.commands.install.as_deref(), Some("install -y"));
        assert_eq!(provider.commands.clean, None);
        assert_eq!(provider.repository.add.steps.len(), 2);
        assert!(matches!(
            &provider.repository.add.steps[1],
            ActionStep::Command { exec, elevated: true, .. } if exec == "apt-get"
        ));
    }

    #[test]
    fn parse_uses_fallback_name() {
        let provider = Provider::parse("[detection]\nbinary = \"nix\"\n", Format::Toml, "nix").unwrap();
        assert_eq!(provider.name, "nix");
    }

    #[test]
    fn parse_yaml_definition_with_camel_case() {
        let yaml = "name: brew\ndetection:\n  distributions: [macos]\n  binary: brew\ncorePackages:\n  build-tools: [gcc]\n";
        let provider = Provider::parse(yaml, Format::Yaml, "x").unwrap();
        assert_eq!(provider.expand_package("build-tools"), vec!["gcc"]);
    }

    #[test]
    fn expand_package_passes_unknown_names_through() {
        let provider = Provider::parse(APT, Format::Toml, "apt").unwrap();
        assert_eq!(
            provider.expand_package("build-tools"),
            vec!["build-essential", "pkg-config"]
        );
        assert_eq!(provider.expand_package("vim"), vec!["vim"]);
    }

    #[test]
    fn unknown_step_action_is_malformed() {
        let text = "[[install.steps]]\naction = \"teleport\"\n";
        let err = Provider::parse(text, Format::Toml, "bad").unwrap_err();
        assert!(matches!(err, ProviderError::Malformed { .. }));
    }

    // ------------------------------------------------------------------
    // ProviderRegistry
    // ------------------------------------------------------------------

    #[test]
    fn load_directory_indexes_by_name() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("apt.toml"), APT).unwrap();
        fs::write(
            tmp.path().join("brew.yaml"),
            "detection:\n  distributions: [macos]\n  binary: brew\n",
        )
        .unwrap();
        fs::write(tmp.path().join("README.md"), "ignored").unwrap();

        let registry = ProviderRegistry::load(tmp.path()).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("apt").is_some());
        assert_eq!(registry.get("brew").unwrap().detection.binary, "brew");
        assert_eq!(
            registry.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["apt", "brew"]
        );
    }

    #[test]
    fn malformed_definition_aborts_load() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("apt.toml"), APT).unwrap();
        fs::write(tmp.path().join("broken.json"), "{ not json").unwrap();
        let err = ProviderRegistry::load(tmp.path()).unwrap_err();
        assert!(
            matches!(&err, ProviderError::Malformed { path, .. } if path.ends_with("broken.json"))
        );
    }

    #[test]
    fn builtin_definitions_decode() {
        let registry = ProviderRegistry::builtin().unwrap();
        assert_eq!(registry.len(), BUILTIN.len());
        for (name, _) in BUILTIN {
            let provider = registry.get(name).unwrap();
            assert!(!provider.detection.binary.is_empty(), "{name} has a binary");
            assert!(provider.commands.install.is_some(), "{name} can install");
            for kind in provider.commands.binaries.keys() {
                assert!(
                    CommandKind::ALL.iter().any(|k| k.as_str() == kind),
                    "{name}: unknown command '{kind}'"
                );
            }
        }
        assert_eq!(registry.source(), "built-in");
    }

    #[test]
    fn probe_prefers_explicit_directory() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("apt.toml"), APT).unwrap();
        let registry = ProviderRegistry::probe(Some(tmp.path()), None).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.source(), tmp.path().display().to_string());
    }

    #[test]
    fn probe_rejects_missing_explicit_directory() {
        let err = ProviderRegistry::probe(Some(Path::new("/nonexistent/providers")), None)
            .unwrap_err();
        assert!(matches!(err, ProviderError::Io { .. }));
    }

    #[test]
    fn search_dirs_end_with_home() {
        let dirs = ProviderRegistry::search_dirs(None, Some(Path::new("/home/alice")));
        assert_eq!(
            dirs.last().unwrap(),
            &PathBuf::from("/home/alice/.rwr/providers")
        );
        assert!(dirs.contains(&PathBuf::from("/usr/share/rwr/providers")));
    }
}
