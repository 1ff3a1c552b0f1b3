pub mod all;
pub mod profiles;
pub mod providers;
pub mod version;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde_json::Value;

use crate::blueprint::locator;
use crate::cli::GlobalOpts;
use crate::config::profiles::parse_active;
use crate::config::variables::{FlagVariables, SystemVariables, UserVariables, Variables};
use crate::config::{self, InitConfig};
use crate::exec::{Executor, SystemExecutor};
use crate::logging::{Log, Logger};
use crate::platform::Platform;
use crate::processors::Context;
use crate::providers::ProviderRegistry;

/// Shared state produced by the common command setup sequence.
///
/// Encapsulates platform detection, init file discovery and executor
/// construction so that each command does not have to repeat the
/// boilerplate.
#[derive(Debug)]
pub struct CommandSetup {
    pub init: InitConfig,
    pub platform: Platform,
    pub home: Option<PathBuf>,
    pub executor: Arc<SystemExecutor>,
    pub cancel: Arc<AtomicBool>,
}

impl CommandSetup {
    /// Detect the platform, find and decode the init file, and build the
    /// executor.
    ///
    /// # Errors
    ///
    /// Returns an error if no init file is found or it fails to decode.
    pub fn init(global: &GlobalOpts, log: &Logger, cancel: Arc<AtomicBool>) -> Result<Self> {
        let platform = Platform::detect();
        log.debug(&format!(
            "platform: {} {} {} ({})",
            platform.os, platform.distro, platform.version, platform.arch
        ));
        let home = config::home_dir();
        let cwd = std::env::current_dir().context("cannot determine current directory")?;

        log.stage("Loading configuration");
        let path = config::discover_init(global.init_file.as_deref(), &cwd, home.as_deref())?;
        let init = InitConfig::load(&path)?;
        log.info(&format!("init file: {}", path.display()));

        let executor = Arc::new(
            SystemExecutor::new()
                .with_timeout(global.timeout.map(Duration::from_secs))
                .with_cancel(Arc::clone(&cancel)),
        );
        Ok(Self {
            init,
            platform,
            home,
            executor,
            cancel,
        })
    }

    /// Resolve the blueprint directory, cloning or pulling a git source.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing or empty, or git
    /// sourcing fails.
    pub fn locate_blueprints(&self, log: &dyn Log) -> Result<PathBuf> {
        log.stage("Locating blueprints");
        let dir = locator::locate(&self.init, self.home.as_deref(), &*self.executor, log)?;
        log.info(&format!("blueprints: {}", dir.display()));
        Ok(dir)
    }

    /// Load provider definitions and build the processor context.
    ///
    /// # Errors
    ///
    /// Returns an error if a provider definition is malformed.
    pub fn context(self, global: &GlobalOpts, log: Arc<dyn Log>) -> Result<Context> {
        let registry =
            ProviderRegistry::probe(global.providers_dir.as_deref(), self.home.as_deref())?;
        log.debug(&format!(
            "{} provider definitions from {}",
            registry.len(),
            registry.source()
        ));
        let variables = template_variables(&self.init, &self.platform, global, &*self.executor);
        let blueprint_dir = self.init.root();
        Ok(Context::new(
            self.init,
            self.platform,
            log,
            self.executor,
            registry,
            self.home,
        )
        .with_dry_run(global.dry_run)
        .with_cancel(self.cancel)
        .with_provider_override(global.provider.clone())
        .with_variables(variables)
        .with_blueprint_dir(blueprint_dir))
    }
}

/// Build the template data set for a run.
pub fn template_variables(
    init: &InitConfig,
    platform: &Platform,
    global: &GlobalOpts,
    executor: &dyn Executor,
) -> Value {
    Variables {
        user: UserVariables::detect(executor),
        system: SystemVariables::from(platform),
        flags: FlagVariables {
            debug: global.debug,
            interactive: global.interactive,
            profiles: parse_active(&global.profiles),
            force_bootstrap: global.force_bootstrap,
            dry_run: global.dry_run,
        },
        user_defined: BTreeMap::new(),
    }
    .with_user_defined(&init.variables, std::env::vars())
    .to_value()
}
