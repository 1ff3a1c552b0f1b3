//! Package installation and removal through detected providers.
use std::collections::{HashMap, HashSet};

use anyhow::Result;

use super::{Context, ItemStats, Processor, ProcessorResult};
use crate::blueprint::items::{Package, PackageAction};
use crate::blueprint::{Blueprint, Items, ProcessorKind};
use crate::providers::commands::{CommandKind, CommandSet};
use crate::providers::detect::DetectedProvider;

/// Architecture suffixes appended to package names by `dnf`, `rpm` and
/// multi-arch `dpkg` listings.
const ARCH_SUFFIXES: &[&str] = &[
    "x86_64", "i386", "i586", "i686", "noarch", "aarch64", "armv7hl", "armhfp", "ppc64le",
    "s390x", "riscv64", "amd64", "arm64", "armhf", "all",
];

/// Names found in the output of a provider's `list` command.
///
/// The first column of each line is taken. An `apt`-style `/suite` suffix
/// is dropped, and a known architecture after `.` or `:` adds the bare name
/// as well.
fn installed_names(output: &str) -> HashSet<String> {
    let mut names = HashSet::new();
    for line in output.lines() {
        let Some(first) = line.split_whitespace().next() else {
            continue;
        };
        let bare = first.split('/').next().unwrap_or(first);
        names.insert(bare.to_string());
        if let Some((stem, arch)) = bare.rsplit_once(['.', ':'])
            && ARCH_SUFFIXES.contains(&arch)
        {
            names.insert(stem.to_string());
        }
    }
    names
}

/// Commands for `provider`, honouring a per-item elevation request.
fn commands_for(ctx: &Context, provider: &DetectedProvider, elevated: bool) -> CommandSet {
    if elevated && !provider.definition.elevated {
        let mut definition = provider.definition.clone();
        definition.elevated = true;
        CommandSet::synthesize(&definition, &provider.bin_path, ctx.elevate)
    } else {
        provider.commands(ctx.elevate)
    }
}

/// Packages sharing one command line: same provider, action, elevation
/// and extra arguments.
#[derive(Debug)]
struct Batch {
    provider: DetectedProvider,
    commands: CommandSet,
    action: PackageAction,
    elevated: bool,
    args: Vec<String>,
    names: Vec<String>,
}

impl Batch {
    fn accepts(&self, provider: &DetectedProvider, package: &Package) -> bool {
        self.provider.name() == provider.name()
            && self.action == package.action
            && self.elevated == package.elevated
            && self.args == package.args
    }

    fn add(&mut self, names: Vec<String>) {
        for name in names {
            if !self.names.contains(&name) {
                self.names.push(name);
            }
        }
    }
}

/// Group packages into batches, in order of first appearance.
///
/// # Errors
///
/// Fails when an item's package manager, or the default one, is not
/// available.
fn batches(ctx: &Context, packages: &[Package]) -> Result<Vec<Batch>> {
    let mut batches: Vec<Batch> = Vec::new();
    for package in packages {
        let provider = ctx.provider_or_default(package.package_manager.as_deref())?;
        let names: Vec<String> = package
            .all_names()
            .iter()
            .flat_map(|n| provider.definition.expand_package(n))
            .collect();
        if names.is_empty() {
            continue;
        }
        if let Some(batch) = batches.iter_mut().find(|b| b.accepts(&provider, package)) {
            batch.add(names);
            continue;
        }
        let mut batch = Batch {
            commands: commands_for(ctx, &provider, package.elevated),
            provider,
            action: package.action,
            elevated: package.elevated,
            args: package.args.clone(),
            names: Vec::new(),
        };
        batch.add(names);
        batches.push(batch);
    }
    Ok(batches)
}

/// Installs and removes packages.
///
/// Each item uses its own `package_manager` or the default provider. Names
/// go through the provider's `core_packages` map, and items that share a
/// provider, action and arguments run as one command. Packages the
/// provider already lists as installed are not reinstalled.
#[derive(Debug, Clone, Copy)]
pub struct PackagesProcessor;

impl PackagesProcessor {
    /// Query installed packages once per provider.
    fn installed<'c>(
        ctx: &Context,
        cache: &'c mut HashMap<String, HashSet<String>>,
        batch: &Batch,
    ) -> &'c HashSet<String> {
        let name = batch.provider.name();
        cache.entry(name.to_string()).or_insert_with(|| {
            let Some(list) = batch.commands.get(CommandKind::List) else {
                return HashSet::new();
            };
            match ctx.executor.run_shell(list, &batch.commands.environment) {
                Ok(result) => installed_names(&result.stdout),
                Err(e) => {
                    ctx.log.debug(&format!("{name}: cannot list packages: {e:#}"));
                    HashSet::new()
                }
            }
        })
    }

    fn apply(
        ctx: &Context,
        cache: &mut HashMap<String, HashSet<String>>,
        batch: &Batch,
        stats: &mut ItemStats,
    ) {
        let (kind, pending) = match batch.action {
            PackageAction::Install => {
                let installed = Self::installed(ctx, cache, batch);
                let pending: Vec<String> = batch
                    .names
                    .iter()
                    .filter(|n| !installed.contains(n.as_str()))
                    .cloned()
                    .collect();
                stats.already_ok +=
                    u32::try_from(batch.names.len() - pending.len()).unwrap_or(u32::MAX);
                (CommandKind::Install, pending)
            }
            PackageAction::Remove => (CommandKind::Remove, batch.names.clone()),
        };
        if pending.is_empty() {
            return;
        }

        let mut args = pending.clone();
        args.extend(batch.args.iter().cloned());
        let line = match batch.commands.with_args(kind, &args) {
            Ok(line) => line,
            Err(e) => {
                ctx.log.warn(&e.to_string());
                stats.skipped += 1;
                return;
            }
        };
        match ctx.shell(&line, &batch.commands.environment) {
            Ok(()) => {
                stats.changed += u32::try_from(pending.len()).unwrap_or(u32::MAX);
                if !ctx.dry_run
                    && kind == CommandKind::Install
                    && let Some(installed) = cache.get_mut(batch.provider.name())
                {
                    installed.extend(pending);
                }
            }
            Err(e) => {
                ctx.log
                    .warn(&format!("{kind} {} failed: {e:#}", pending.join(" ")));
                stats.skipped += 1;
            }
        }
    }
}

impl Processor for PackagesProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Packages
    }

    fn run(&self, ctx: &Context, blueprint: &Blueprint) -> Result<ProcessorResult> {
        let Items::Packages(packages) = &blueprint.items else {
            return Ok(ProcessorResult::Skipped("no packages".to_string()));
        };
        if packages.is_empty() {
            return Ok(ProcessorResult::Skipped("no packages".to_string()));
        }
        let batches = batches(ctx, packages)?;
        ctx.log.debug(&format!(
            "{} package entries in {} command(s)",
            packages.len(),
            batches.len()
        ));

        let mut cache = HashMap::new();
        let mut stats = ItemStats::default();
        for batch in &batches {
            ctx.check_cancelled()?;
            Self::apply(ctx, &mut cache, batch, &mut stats);
        }
        Ok(stats.finish(ctx))
    }
}
