//! The orchestrator behind `rwr all`.
//!
//! One strictly sequential pass: run order, bootstrap, package managers,
//! file order, per-processor dispatch, cleanup. The first processor error
//! aborts the run; nothing is retried.
pub mod bootstrap;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::blueprint::order::{file_order, run_order_names};
use crate::blueprint::{self, Blueprint, ProcessorKind};
use crate::config::profiles::{filter_by_profiles, unique_profiles, validate_profiles};
use crate::error::StageError;
use crate::logging::StageStatus;
use crate::processors::{Context, ProcessorRegistry, ProcessorResult, package_managers};
use crate::providers::commands::CommandKind;

pub use bootstrap::BOOTSTRAP_STEM;

/// Per-run switches that are not part of the processor context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Active profiles.
    pub profiles: Vec<String>,
    /// Run the bootstrap even when the sentinel exists.
    pub force_bootstrap: bool,
    /// Directory holding the bootstrap sentinel.
    pub run_once_dir: Option<PathBuf>,
}

/// What a completed run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Whether the bootstrap blueprint ran.
    pub bootstrapped: bool,
    /// Files handed to a processor, in dispatch order.
    pub processed: Vec<(ProcessorKind, PathBuf)>,
    /// Run-order names that were skipped: unknown, or without a processor.
    pub skipped: Vec<String>,
    /// Profiles declared by the processed items, sorted.
    pub declared_profiles: Vec<String>,
    /// Active profiles that matched nothing.
    pub unmatched_profiles: Vec<String>,
}

/// Hands resolved blueprints to registered processors and records the
/// outcome of each.
#[derive(Debug)]
pub struct Dispatch<'a> {
    processors: &'a ProcessorRegistry,
}

impl<'a> Dispatch<'a> {
    /// Dispatch through `processors`.
    #[must_use]
    pub const fn new(processors: &'a ProcessorRegistry) -> Self {
        Self { processors }
    }

    /// Apply one blueprint, recording the stage as `stage`.
    ///
    /// A kind without a registered processor is skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`] naming the processor and file if the
    /// processor fails.
    pub fn apply(
        &self,
        ctx: &Context,
        kind: ProcessorKind,
        stage: &str,
        blueprint: &Blueprint,
    ) -> Result<(), StageError> {
        let Some(processor) = self.processors.get(kind) else {
            ctx.log
                .warn(&format!("no processor registered for '{kind}', skipping"));
            ctx.log
                .record_stage(stage, StageStatus::Skipped, Some("no processor"));
            return Ok(());
        };
        ctx.log.stage(stage);
        match processor.run(ctx, blueprint) {
            Ok(ProcessorResult::Ok) => {
                ctx.log.record_stage(stage, StageStatus::Ok, None);
                Ok(())
            }
            Ok(ProcessorResult::Skipped(reason)) => {
                ctx.log.info(&format!("skipped: {reason}"));
                ctx.log
                    .record_stage(stage, StageStatus::Skipped, Some(&reason));
                Ok(())
            }
            Ok(ProcessorResult::DryRun) => {
                ctx.log.record_stage(stage, StageStatus::DryRun, None);
                Ok(())
            }
            Err(cause) => {
                let message = format!("{cause:#}");
                ctx.log.error(&format!("{stage}: {message}"));
                ctx.log
                    .record_stage(stage, StageStatus::Failed, Some(&message));
                Err(StageError {
                    processor: kind.as_str().to_string(),
                    file: blueprint.source.clone(),
                    cause,
                })
            }
        }
    }
}

/// Display form of `file` relative to the blueprint directory.
fn relative(file: &Path, dir: &Path) -> String {
    file.strip_prefix(dir).unwrap_or(file).display().to_string()
}

/// Apply the package managers named in the init file.
fn init_package_managers(ctx: &Context, options: &RunOptions) -> Result<(), StageError> {
    let specs = filter_by_profiles(ctx.init.package_managers.clone(), &options.profiles);
    if specs.is_empty() {
        return Ok(());
    }
    let stage = ProcessorKind::PackageManagers.as_str();
    ctx.log.stage(stage);
    let status = match package_managers::apply_all(ctx, &specs) {
        Ok(ProcessorResult::DryRun) => StageStatus::DryRun,
        Ok(_) => StageStatus::Ok,
        Err(cause) => {
            ctx.log
                .record_stage(stage, StageStatus::Failed, Some(&format!("{cause:#}")));
            return Err(StageError {
                processor: stage.to_string(),
                file: ctx.init.path.clone(),
                cause,
            });
        }
    };
    ctx.log.record_stage(stage, status, None);
    Ok(())
}

/// Run every available provider's `clean` command; failures are only
/// logged.
fn cleanup(ctx: &Context) {
    let providers: Vec<_> = ctx.providers().iter().cloned().collect();
    if providers.is_empty() {
        return;
    }
    ctx.log.stage("Cleanup");
    let mut failures = 0_usize;
    for provider in providers {
        if ctx.is_cancelled() {
            break;
        }
        let commands = provider.commands(ctx.elevate);
        let Some(line) = commands.get(CommandKind::Clean) else {
            ctx.log
                .debug(&format!("{}: no clean command", provider.name()));
            continue;
        };
        if let Err(e) = ctx.shell(line, &commands.environment) {
            ctx.log
                .warn(&format!("{} clean failed: {e:#}", provider.name()));
            failures += 1;
        }
    }
    let (status, message) = if failures > 0 {
        (StageStatus::Skipped, Some(format!("{failures} clean command(s) failed")))
    } else if ctx.dry_run {
        (StageStatus::DryRun, None)
    } else {
        (StageStatus::Ok, None)
    };
    ctx.log.record_stage("cleanup", status, message.as_deref());
}

/// Merge the buckets of a run-order name, accepting alternate spellings.
fn files_for(order: &blueprint::order::FileOrder, name: &str, kind: ProcessorKind) -> Vec<PathBuf> {
    let mut seen = BTreeSet::new();
    [name, kind.as_str()]
        .into_iter()
        .filter_map(|key| order.get(key))
        .flatten()
        .filter(|p| seen.insert((*p).clone()))
        .cloned()
        .collect()
}

/// Run the whole engine against `ctx.blueprint_dir`.
///
/// # Errors
///
/// Returns an error if blueprint ordering fails, a processor fails (as a
/// [`StageError`]), or the run is interrupted.
pub fn run(ctx: &Context, processors: &ProcessorRegistry, options: &RunOptions) -> Result<RunReport> {
    let mut report = RunReport::default();
    let dispatch = Dispatch::new(processors);
    let settings = &ctx.init.blueprints;

    let names = run_order_names(&settings.order);
    ctx.log.debug(&format!("run order: {}", names.join(", ")));

    let mut declared: BTreeSet<String> = unique_profiles(&ctx.init.package_managers)
        .into_iter()
        .collect();
    report.bootstrapped = bootstrap::run_if_needed(ctx, &dispatch, options, &mut declared)?;
    ctx.check_cancelled()?;

    init_package_managers(ctx, options)?;
    ctx.check_cancelled()?;

    let reserved = ctx.init.reserved_files(&ctx.blueprint_dir);
    let order = file_order(
        &ctx.blueprint_dir,
        &settings.order,
        settings.run_only_listed,
        settings.format,
        &reserved,
        &*ctx.log,
    )?;

    for name in &names {
        let Some(kind) = ProcessorKind::from_name(name) else {
            ctx.log
                .warn(&format!("unknown processor '{name}' in run order, skipping"));
            ctx.log
                .record_stage(name, StageStatus::Skipped, Some("unknown processor"));
            report.skipped.push(name.clone());
            continue;
        };
        let files = files_for(&order, name, kind);
        if files.is_empty() {
            ctx.log.debug(&format!("{name}: no blueprint files"));
            continue;
        }
        if processors.get(kind).is_none() {
            ctx.log.warn(&format!(
                "no processor registered for '{kind}', skipping {} file(s)",
                files.len()
            ));
            ctx.log
                .record_stage(kind.as_str(), StageStatus::Skipped, Some("no processor"));
            report.skipped.push(name.clone());
            continue;
        }

        for file in files {
            ctx.check_cancelled()?;
            let stage = format!("{kind}: {}", relative(&file, &ctx.blueprint_dir));
            let blueprint = blueprint::load(
                &file,
                kind,
                settings.format,
                &ctx.variables,
                &options.profiles,
                &*ctx.log,
            )
            .map_err(|e| {
                ctx.log
                    .record_stage(&stage, StageStatus::Failed, Some(&e.to_string()));
                StageError {
                    processor: kind.as_str().to_string(),
                    file: file.clone(),
                    cause: e.into(),
                }
            })?;
            declared.extend(blueprint.declared_profiles.iter().cloned());
            dispatch.apply(ctx, kind, &stage, &blueprint)?;
            report.processed.push((kind, file));
        }
    }

    ctx.check_cancelled()?;
    cleanup(ctx);

    report.declared_profiles = declared.into_iter().collect();
    report.unmatched_profiles = validate_profiles(&options.profiles, &report.declared_profiles);
    for profile in &report.unmatched_profiles {
        ctx.log
            .warn(&format!("profile '{profile}' matches no blueprint item"));
    }
    Ok(report)
}
