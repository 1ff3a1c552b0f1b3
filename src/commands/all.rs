//! Command: apply every blueprint.
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::Result;

use super::CommandSetup;
use crate::cli::GlobalOpts;
use crate::config::profiles::parse_active;
use crate::engine::{self, RunOptions};
use crate::logging::{Log, Logger};
use crate::processors::ProcessorRegistry;

/// Run the `all` command.
///
/// The stage summary is printed whether or not the run succeeds.
///
/// # Errors
///
/// Returns an error if setup fails or the engine aborts.
pub fn run(global: &GlobalOpts, log: &Arc<Logger>, cancel: Arc<AtomicBool>) -> Result<()> {
    log.info(&format!("rwr {}", super::version::current()));

    let setup = CommandSetup::init(global, log, cancel)?;
    let blueprint_dir = setup.locate_blueprints(&**log)?;
    let ctx = setup
        .context(global, Arc::clone(log) as Arc<dyn Log>)?
        .with_blueprint_dir(blueprint_dir);

    let options = RunOptions {
        profiles: parse_active(&global.profiles),
        force_bootstrap: global.force_bootstrap,
        run_once_dir: global.run_once_dir.clone(),
    };
    if !options.profiles.is_empty() {
        log.info(&format!("profiles: {}", options.profiles.join(", ")));
    }
    if ctx.dry_run {
        log.info("dry run: nothing will be changed");
    }

    let result = engine::run(&ctx, &ProcessorRegistry::builtin(), &options);
    log.print_summary();
    let report = result?;
    log.info(&format!(
        "{} blueprint file(s) processed",
        report.processed.len()
    ));
    if let Some(path) = log.log_path() {
        log.debug(&format!("log file: {}", path.display()));
    }
    Ok(())
}
