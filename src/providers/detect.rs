//! Provider availability on the current host.
use std::path::{Path, PathBuf};

use super::commands::CommandSet;
use super::{Provider, ProviderRegistry};
use crate::config::expand_home;
use crate::error::ProviderError;
use crate::exec::Executor;
use crate::platform::Platform;

/// A provider found on this host, paired with its resolved binary.
///
/// The definition is copied out of the registry, so detection never
/// mutates shared state and can be repeated freely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedProvider {
    /// The provider definition.
    pub definition: Provider,
    /// Resolved binary path.
    pub bin_path: PathBuf,
    /// Distribution match specificity (see [`Platform::match_rank`]).
    pub rank: u8,
}

impl DetectedProvider {
    /// Provider name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Concrete commands for this provider.
    #[must_use]
    pub fn commands(&self, elevate: bool) -> CommandSet {
        CommandSet::synthesize(&self.definition, &self.bin_path, elevate)
    }
}

/// Resolve a binary: absolute paths must exist, anything else is looked up
/// on `PATH`.
fn resolve_binary(binary: &str, home: Option<&Path>, executor: &dyn Executor) -> Option<PathBuf> {
    let binary = binary.trim();
    if binary.is_empty() {
        return None;
    }
    let expanded = expand_home(binary, home);
    if expanded.is_absolute() {
        return expanded.is_file().then_some(expanded);
    }
    executor.which(binary)
}

/// Check one provider against the host.
///
/// Available means the distribution list matches, the binary resolves and
/// every required file exists.
#[must_use]
pub fn probe(
    provider: &Provider,
    platform: &Platform,
    home: Option<&Path>,
    executor: &dyn Executor,
) -> Option<DetectedProvider> {
    let rank = platform.match_rank(&provider.detection.distributions)?;
    let bin_path = resolve_binary(&provider.detection.binary, home, executor)?;
    let files_present = provider
        .detection
        .files
        .iter()
        .all(|f| expand_home(f, home).exists());
    if !files_present {
        return None;
    }
    Some(DetectedProvider {
        definition: provider.clone(),
        bin_path,
        rank,
    })
}

/// The providers available on this host for one run.
#[derive(Debug, Clone, Default)]
pub struct ProviderSet {
    providers: Vec<DetectedProvider>,
}

impl ProviderSet {
    /// Run detection over every definition in `registry`.
    #[must_use]
    pub fn detect(
        registry: &ProviderRegistry,
        platform: &Platform,
        home: Option<&Path>,
        executor: &dyn Executor,
    ) -> Self {
        Self {
            providers: registry
                .iter()
                .filter_map(|p| probe(p, platform, home, executor))
                .collect(),
        }
    }

    /// Build a set from already-detected providers.
    #[must_use]
    pub const fn from_detected(providers: Vec<DetectedProvider>) -> Self {
        Self { providers }
    }

    /// An available provider by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DetectedProvider> {
        self.providers.iter().find(|p| p.name() == name)
    }

    /// The first available provider that lists `distro` explicitly.
    #[must_use]
    pub fn for_distro(&self, distro: &str) -> Option<&DetectedProvider> {
        let distro = distro.to_lowercase();
        self.providers.iter().find(|p| {
            p.definition
                .detection
                .distributions
                .iter()
                .any(|d| d.to_lowercase() == distro)
        })
    }

    /// Pick the default provider.
    ///
    /// An explicit name must be available. Otherwise the most specific
    /// distribution match wins, then the higher priority, then the name.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NotAvailable`] for an unavailable explicit
    /// name and [`ProviderError::NoneAvailable`] when nothing was detected.
    pub fn default_provider(
        &self,
        explicit: Option<&str>,
    ) -> Result<&DetectedProvider, ProviderError> {
        if let Some(name) = explicit.filter(|n| !n.trim().is_empty()) {
            return self
                .get(name)
                .ok_or_else(|| ProviderError::NotAvailable(name.to_string()));
        }
        self.providers
            .iter()
            .min_by(|a, b| {
                b.rank
                    .cmp(&a.rank)
                    .then(b.definition.priority.cmp(&a.definition.priority))
                    .then_with(|| a.name().cmp(b.name()))
            })
            .ok_or(ProviderError::NoneAvailable)
    }

    /// Available providers, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &DetectedProvider> {
        self.providers.iter()
    }

    /// Names of the available providers.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Number of available providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether nothing was detected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
