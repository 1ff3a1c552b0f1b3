//! Built-in blueprint processors and the registry the engine dispatches
//! through.
pub mod package_managers;
pub mod packages;
pub mod repositories;
pub mod scripts;
pub mod services;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use anyhow::{Result, bail};
use serde_json::Value;

use crate::blueprint::{Blueprint, ProcessorKind};
use crate::config::InitConfig;
use crate::error::ProviderError;
use crate::exec::Executor;
use crate::logging::Log;
use crate::platform::Platform;
use crate::providers::ProviderRegistry;
use crate::providers::commands::elevation_required;
use crate::providers::detect::{DetectedProvider, ProviderSet};
use crate::providers::steps::{StepContext, StepRunner};
use services::ServiceManager;

/// Outcome of a processor run that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorResult {
    /// Changes were applied or nothing needed changing.
    Ok,
    /// Nothing was done, with the reason.
    Skipped(String),
    /// Changes were only logged.
    DryRun,
}

/// Counters for processors that handle many items.
///
/// # Examples
///
/// ```
/// use rwr::processors::ItemStats;
///
/// let stats = ItemStats { changed: 2, already_ok: 5, skipped: 1 };
/// assert_eq!(stats.summary(false), "2 changed, 5 already ok, 1 skipped");
/// assert_eq!(stats.summary(true), "2 would change, 5 already ok, 1 skipped");
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ItemStats {
    /// Items changed, or that would change in dry-run mode.
    pub changed: u32,
    /// Items already in the desired state.
    pub already_ok: u32,
    /// Items skipped because they failed or did not apply.
    pub skipped: u32,
}

impl ItemStats {
    /// Format the counters for the log.
    #[must_use]
    pub fn summary(&self, dry_run: bool) -> String {
        let verb = if dry_run { "would change" } else { "changed" };
        if self.skipped > 0 {
            format!(
                "{} {verb}, {} already ok, {} skipped",
                self.changed, self.already_ok, self.skipped
            )
        } else {
            format!("{} {verb}, {} already ok", self.changed, self.already_ok)
        }
    }

    /// Log the summary and convert to a result.
    #[must_use]
    pub fn finish(self, ctx: &Context) -> ProcessorResult {
        ctx.log.info(&self.summary(ctx.dry_run));
        if ctx.dry_run {
            ProcessorResult::DryRun
        } else {
            ProcessorResult::Ok
        }
    }
}

/// Applies one kind of blueprint section to the host.
pub trait Processor: Send + Sync {
    /// Section kind this processor handles.
    fn kind(&self) -> ProcessorKind;

    /// Apply `blueprint` to the host.
    ///
    /// Items arrive templated, import-expanded and profile-filtered, in file
    /// order.
    ///
    /// # Errors
    ///
    /// Returns an error when the stage cannot proceed. An error aborts the
    /// whole run, so per-item failures that leave the stage usable should be
    /// logged and counted instead.
    fn run(&self, ctx: &Context, blueprint: &Blueprint) -> Result<ProcessorResult>;
}

/// Processors keyed by the section kind they handle.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: BTreeMap<ProcessorKind, Box<dyn Processor>>,
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl ProcessorRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every processor shipped in this crate.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new()
            .with(package_managers::PackageManagersProcessor)
            .with(repositories::RepositoriesProcessor)
            .with(packages::PackagesProcessor)
            .with(services::ServicesProcessor)
            .with(scripts::ScriptsProcessor)
    }

    /// Register `processor`, replacing any processor of the same kind.
    pub fn register(&mut self, processor: Box<dyn Processor>) -> Option<Box<dyn Processor>> {
        self.processors.insert(processor.kind(), processor)
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, processor: impl Processor + 'static) -> Self {
        self.register(Box::new(processor));
        self
    }

    /// Processor for `kind`, if one is registered.
    #[must_use]
    pub fn get(&self, kind: ProcessorKind) -> Option<&dyn Processor> {
        self.processors.get(&kind).map(AsRef::as_ref)
    }

    /// Registered kinds, in canonical order.
    #[must_use]
    pub fn kinds(&self) -> Vec<ProcessorKind> {
        self.processors.keys().copied().collect()
    }
}

/// Shared state for one run, handed to every processor.
pub struct Context {
    /// Decoded init file.
    pub init: Arc<InitConfig>,
    /// Detected platform.
    pub platform: Arc<Platform>,
    /// Logger.
    pub log: Arc<dyn Log>,
    /// Command executor.
    pub executor: Arc<dyn Executor>,
    /// Provider definitions loaded for this run.
    pub registry: Arc<ProviderRegistry>,
    /// Providers available on the host.
    ///
    /// Replaced wholesale by [`Context::redetect`] after package managers
    /// change. Use [`Context::providers`] for read access.
    pub providers: Arc<RwLock<ProviderSet>>,
    /// Default provider named on the command line.
    pub provider_override: Option<String>,
    /// Log changes instead of applying them.
    pub dry_run: bool,
    /// Whether privileged commands need a `sudo` prefix.
    pub elevate: bool,
    /// Home directory.
    pub home: Option<PathBuf>,
    /// Directory the blueprints were read from.
    pub blueprint_dir: PathBuf,
    /// Template variables as a JSON value.
    pub variables: Arc<Value>,
    /// Set on Ctrl-C.
    pub cancel: Arc<AtomicBool>,
    /// Service manager for this platform, if any.
    pub services: Option<Arc<dyn ServiceManager>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("init", &self.init.path)
            .field("platform", &self.platform)
            .field("log", &"<dyn Log>")
            .field("executor", &self.executor)
            .field("registry", &self.registry.source())
            .field("providers", &self.providers().names())
            .field("provider_override", &self.provider_override)
            .field("dry_run", &self.dry_run)
            .field("elevate", &self.elevate)
            .field("home", &self.home)
            .field("blueprint_dir", &self.blueprint_dir)
            .field("cancel", &self.cancel)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Build a context and run provider detection once.
    #[must_use]
    pub fn new(
        init: InitConfig,
        platform: Platform,
        log: Arc<dyn Log>,
        executor: Arc<dyn Executor>,
        registry: ProviderRegistry,
        home: Option<PathBuf>,
    ) -> Self {
        let providers = ProviderSet::detect(&registry, &platform, home.as_deref(), &*executor);
        let elevate = elevation_required(&platform, &*executor);
        let services = services::for_platform(&platform);
        let blueprint_dir = init.root();
        Self {
            init: Arc::new(init),
            platform: Arc::new(platform),
            log,
            executor,
            registry: Arc::new(registry),
            providers: Arc::new(RwLock::new(providers)),
            provider_override: None,
            dry_run: false,
            elevate,
            home,
            blueprint_dir,
            variables: Arc::new(Value::Object(serde_json::Map::new())),
            cancel: Arc::new(AtomicBool::new(false)),
            services,
        }
    }

    /// Set dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Share an existing cancellation flag.
    #[must_use]
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Name the default provider explicitly.
    #[must_use]
    pub fn with_provider_override(mut self, name: Option<String>) -> Self {
        self.provider_override = name.filter(|n| !n.trim().is_empty());
        self
    }

    /// Set the template variables.
    #[must_use]
    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = Arc::new(variables);
        self
    }

    /// Set the blueprint directory.
    #[must_use]
    pub fn with_blueprint_dir(mut self, dir: PathBuf) -> Self {
        self.blueprint_dir = dir;
        self
    }

    /// Acquire a read lock on the available providers.
    ///
    /// Recovers from a poisoned lock by taking the inner value.
    pub fn providers(&self) -> RwLockReadGuard<'_, ProviderSet> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-run provider detection and replace the available set.
    pub fn redetect(&self) {
        let fresh = ProviderSet::detect(
            &self.registry,
            &self.platform,
            self.home.as_deref(),
            &*self.executor,
        );
        self.log
            .debug(&format!("available providers: {}", fresh.names().join(", ")));
        let mut guard = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = fresh;
    }

    /// The explicitly configured default provider: command line first, then
    /// the init file.
    #[must_use]
    pub fn explicit_provider(&self) -> Option<&str> {
        self.provider_override
            .as_deref()
            .or(self.init.default_provider.as_deref())
            .filter(|n| !n.trim().is_empty())
    }

    /// The default provider for this run.
    ///
    /// # Errors
    ///
    /// Returns an error if the explicit default is unavailable or nothing was
    /// detected.
    pub fn default_provider(&self) -> Result<DetectedProvider, ProviderError> {
        self.providers()
            .default_provider(self.explicit_provider())
            .cloned()
    }

    /// An available provider by name.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Unknown`] if no definition has that name and
    /// [`ProviderError::NotAvailable`] if it was not detected on this host.
    pub fn provider(&self, name: &str) -> Result<DetectedProvider, ProviderError> {
        if self.registry.get(name).is_none() {
            return Err(ProviderError::Unknown(name.to_string()));
        }
        self.providers()
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotAvailable(name.to_string()))
    }

    /// The named provider, or the default one when `name` is absent.
    ///
    /// # Errors
    ///
    /// See [`Context::provider`] and [`Context::default_provider`].
    pub fn provider_or_default(&self, name: Option<&str>) -> Result<DetectedProvider, ProviderError> {
        match name.filter(|n| !n.trim().is_empty()) {
            Some(name) => self.provider(name),
            None => self.default_provider(),
        }
    }

    /// A step runner bound to this context.
    #[must_use]
    pub fn steps(&self) -> StepRunner<'_> {
        StepRunner::new(
            &*self.executor,
            &*self.log,
            self.dry_run,
            self.elevate,
            &self.cancel,
        )
    }

    /// Step variables for this host.
    #[must_use]
    pub fn step_context(&self) -> StepContext {
        StepContext::for_host(&self.platform, self.home.as_deref())
    }

    /// Whether Ctrl-C was pressed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Fail with "interrupted" once Ctrl-C was pressed.
    ///
    /// # Errors
    ///
    /// Returns an error if the run was cancelled.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            bail!("interrupted");
        }
        Ok(())
    }

    /// Run a synthesized command line, or log it in dry-run mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub fn shell(&self, line: &str, env: &[(String, String)]) -> Result<()> {
        if self.dry_run {
            self.log.dry_run(line);
            return Ok(());
        }
        self.log.debug(&format!("running: {line}"));
        self.executor.run_shell(line, env)?;
        Ok(())
    }
}

/// Shared helpers for processor unit tests.
#[cfg(test)]
pub mod test_helpers {
    use std::path::Path;
    use std::sync::Arc;

    use super::{Context, ProcessorResult};
    use crate::blueprint::{Blueprint, Items};
    use crate::config::{Format, InitConfig};
    use crate::exec::test_helpers::MockExecutor;
    use crate::logging::CaptureLog;
    use crate::platform::{Os, Platform};
    use crate::providers::{Provider, ProviderRegistry};

    /// Parse a provider definition written in TOML.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn provider(toml: &str) -> Provider {
        Provider::parse(toml, Format::Toml, "test").expect("valid provider definition")
    }

    /// A minimal `apt` definition: elevated, with core packages and a
    /// repository procedure.
    #[must_use]
    pub fn apt() -> Provider {
        provider(
            r#"
name = "apt"
elevated = true
priority = 10
[detection]
distributions = ["ubuntu", "debian"]
binary = "apt-get"
[commands]
list = "list --installed"
install = "install -y"
remove = "remove -y"
clean = "autoremove -y"
[environment]
DEBIAN_FRONTEND = "noninteractive"
[core_packages]
python = ["python3", "python3-pip"]
[[repository.add.steps]]
action = "write"
dest = "{{ home }}/sources/{{ name }}.list"
content = "deb {{ url }} {{ channel }}"
[[repository.remove.steps]]
action = "command"
exec = "rm"
args = ["-f", "{{ home }}/sources/{{ name }}.list"]
"#,
        )
    }

    /// A minimal unelevated `brew` definition with install steps.
    #[must_use]
    pub fn brew() -> Provider {
        provider(
            r#"
name = "brew"
priority = 5
[detection]
distributions = ["linux", "macos"]
binary = "brew"
[commands]
install = "install"
remove = "uninstall"
[[install.steps]]
action = "command"
exec = "/bin/bash"
args = ["-c", "install-brew"]
"#,
        )
    }

    /// Context for an Ubuntu host with the given providers and executor.
    #[must_use]
    pub fn context(
        providers: Vec<Provider>,
        exec: &Arc<MockExecutor>,
        home: &Path,
    ) -> (Context, Arc<CaptureLog>) {
        let log = Arc::new(CaptureLog::default());
        let ctx = Context::new(
            InitConfig {
                path: home.join("init.yaml"),
                ..InitConfig::default()
            },
            Platform::new(Os::Linux, "ubuntu", &["debian"]),
            Arc::clone(&log) as Arc<dyn crate::logging::Log>,
            Arc::clone(exec) as Arc<dyn crate::exec::Executor>,
            ProviderRegistry::from_providers(providers, "test"),
            Some(home.to_path_buf()),
        )
        .with_blueprint_dir(home.to_path_buf());
        (ctx, log)
    }

    /// Wrap items in a blueprint read from `packages.yaml`.
    #[must_use]
    pub fn blueprint(items: Items) -> Blueprint {
        Blueprint {
            kind: items.kind(),
            source: Path::new("blueprints").join(format!("{}.yaml", items.kind())),
            format: Format::Yaml,
            items,
            declared_profiles: vec![],
        }
    }

    /// Whether a result reports success.
    #[must_use]
    pub fn is_ok(result: &ProcessorResult) -> bool {
        matches!(result, ProcessorResult::Ok)
    }
}
