//! Command: list detected package managers.
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::Result;

use super::CommandSetup;
use crate::cli::GlobalOpts;
use crate::logging::{Log, Logger};
use crate::processors::Context;
use crate::providers::commands::CommandKind;

/// Describe every available provider and its synthesized commands.
///
/// The default provider is marked; definitions that were not detected are
/// listed on a final line.
#[must_use]
pub fn report(ctx: &Context) -> Vec<String> {
    let default = ctx.default_provider().ok().map(|p| p.name().to_string());
    let providers = ctx.providers();
    let mut lines = Vec::new();
    for provider in providers.iter() {
        let marker = if default.as_deref() == Some(provider.name()) {
            " (default)"
        } else {
            ""
        };
        lines.push(format!(
            "{}{marker}: {}",
            provider.name(),
            provider.bin_path.display()
        ));
        let commands = provider.commands(ctx.elevate);
        for kind in CommandKind::ALL {
            if let Some(line) = commands.get(kind) {
                lines.push(format!("  {kind}: {line}"));
            }
        }
    }
    if providers.is_empty() {
        lines.push("no package manager available".to_string());
    }

    let unavailable: Vec<&str> = ctx
        .registry
        .iter()
        .map(|p| p.name.as_str())
        .filter(|name| providers.get(name).is_none())
        .collect();
    if !unavailable.is_empty() {
        lines.push(format!("not available: {}", unavailable.join(", ")));
    }
    lines
}

/// Run the `providers` command.
///
/// # Errors
///
/// Returns an error if setup fails or a provider definition is malformed.
pub fn run(global: &GlobalOpts, log: &Arc<Logger>, cancel: Arc<AtomicBool>) -> Result<()> {
    let setup = CommandSetup::init(global, log, cancel)?;
    let ctx = setup.context(global, Arc::clone(log) as Arc<dyn Log>)?;
    log.stage("Package managers");
    for line in report(&ctx) {
        log.info(&line);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::exec::test_helpers::MockExecutor;
    use crate::processors::test_helpers::{apt, brew, context};

    #[test]
    fn report_marks_default_and_lists_commands() {
        let tmp = tempfile::tempdir().unwrap();
        let exec = Arc::new(MockExecutor::default().with_path(&["apt-get"]));
        let (ctx, _) = context(vec![apt(), brew()], &exec, tmp.path());
        let lines = report(&ctx);
        assert_eq!(lines[0], "apt (default): /usr/bin/apt-get");
        assert!(lines.contains(&"  install: sudo /usr/bin/apt-get install -y".to_string()));
        assert!(lines.contains(&"  clean: sudo /usr/bin/apt-get autoremove -y".to_string()));
        assert_eq!(lines.last().unwrap(), "not available: brew");
    }

    #[test]
    fn report_without_providers() {
        let tmp = tempfile::tempdir().unwrap();
        let exec = Arc::new(MockExecutor::default());
        let (ctx, _) = context(vec![brew()], &exec, tmp.path());
        assert_eq!(
            report(&ctx),
            vec!["no package manager available", "not available: brew"]
        );
    }
}
