//! Installing and removing package managers themselves.
use anyhow::Result;

use super::{Context, ItemStats, Processor, ProcessorResult};
use crate::blueprint::items::{PackageAction, PackageManagerSpec};
use crate::blueprint::{Blueprint, Items, ProcessorKind};
use crate::error::ProviderError;
use crate::providers::Provider;
use crate::providers::commands::CommandKind;

/// Install or remove through the default provider, using the manager's
/// binary name as the package name.
fn via_default(ctx: &Context, definition: &Provider, kind: CommandKind) -> Result<()> {
    let fallback = ctx.default_provider()?;
    if fallback.name() == definition.name {
        anyhow::bail!("{} cannot {kind} itself", definition.name);
    }
    let commands = fallback.commands(ctx.elevate);
    let line = commands.with_args(kind, &[definition.detection.binary.clone()])?;
    ctx.shell(&line, &commands.environment)
}

fn apply(ctx: &Context, spec: &PackageManagerSpec) -> Result<bool> {
    let definition = ctx
        .registry
        .get(&spec.name)
        .ok_or_else(|| ProviderError::Unknown(spec.name.clone()))?;
    let detected = ctx.providers().get(&spec.name).cloned();

    match (spec.action, detected) {
        (PackageAction::Install, Some(_)) | (PackageAction::Remove, None) => Ok(false),
        (PackageAction::Install, None) => {
            if definition.install.is_empty() {
                via_default(ctx, definition, CommandKind::Install)?;
            } else {
                let vars = ctx.step_context().named(&spec.name);
                ctx.steps().run(&definition.install, &vars)?;
            }
            Ok(true)
        }
        (PackageAction::Remove, Some(detected)) => {
            if definition.remove.is_empty() {
                via_default(ctx, definition, CommandKind::Remove)?;
            } else {
                let vars = ctx
                    .step_context()
                    .named(&spec.name)
                    .with_bin_path(&detected.bin_path);
                ctx.steps().run(&definition.remove, &vars)?;
            }
            Ok(true)
        }
    }
}

/// Bring package managers to the requested state.
///
/// Managers already in that state are skipped. An unknown manager name
/// fails the stage; a failed install or removal is logged and the loop
/// continues. Providers are detected again once anything changed.
///
/// # Errors
///
/// Returns an error for an unknown manager name or on cancellation.
pub fn apply_all(ctx: &Context, specs: &[PackageManagerSpec]) -> Result<ProcessorResult> {
    if specs.is_empty() {
        return Ok(ProcessorResult::Skipped("no package managers".to_string()));
    }
    let mut stats = ItemStats::default();
    for spec in specs {
        ctx.check_cancelled()?;
        match apply(ctx, spec) {
            Ok(true) => stats.changed += 1,
            Ok(false) => {
                ctx.log.debug(&format!("{}: already ok", spec.name));
                stats.already_ok += 1;
            }
            Err(e) => {
                if let Some(ProviderError::Unknown(_)) = e.downcast_ref::<ProviderError>() {
                    return Err(e);
                }
                ctx.check_cancelled()?;
                ctx.log
                    .warn(&format!("package manager {}: {e:#}", spec.name));
                stats.skipped += 1;
            }
        }
    }
    if stats.changed > 0 && !ctx.dry_run {
        ctx.redetect();
    }
    Ok(stats.finish(ctx))
}

/// Applies `packageManagers` sections.
#[derive(Debug, Clone, Copy)]
pub struct PackageManagersProcessor;

impl Processor for PackageManagersProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::PackageManagers
    }

    fn run(&self, ctx: &Context, blueprint: &Blueprint) -> Result<ProcessorResult> {
        let Items::PackageManagers(specs) = &blueprint.items else {
            return Ok(ProcessorResult::Skipped("no package managers".to_string()));
        };
        apply_all(ctx, specs)
    }
}
