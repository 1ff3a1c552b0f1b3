//! Package repositories through provider repository procedures.
use anyhow::Result;

use super::{Context, ItemStats, Processor, ProcessorResult};
use crate::blueprint::items::{Repository, RepositoryAction};
use crate::blueprint::{Blueprint, Items, ProcessorKind};
use crate::providers::steps::StepContext;

/// Adds and removes package repositories.
#[derive(Debug, Clone, Copy)]
pub struct RepositoriesProcessor;

fn step_context(ctx: &Context, repo: &Repository, bin_path: &std::path::Path) -> StepContext {
    let host = ctx.step_context();
    StepContext {
        url: repo.url.clone(),
        key_url: repo.key_url.clone().unwrap_or_default(),
        channel: repo.channel.clone().unwrap_or_default(),
        component: repo.component.clone().unwrap_or_default(),
        arch: repo.arch.clone().unwrap_or_else(|| host.arch.clone()),
        ..host
    }
    .named(&repo.name)
    .with_bin_path(bin_path)
}

impl Processor for RepositoriesProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Repositories
    }

    fn run(&self, ctx: &Context, blueprint: &Blueprint) -> Result<ProcessorResult> {
        let Items::Repositories(repositories) = &blueprint.items else {
            return Ok(ProcessorResult::Skipped("no repositories".to_string()));
        };
        if repositories.is_empty() {
            return Ok(ProcessorResult::Skipped("no repositories".to_string()));
        }

        let mut stats = ItemStats::default();
        for repo in repositories {
            ctx.check_cancelled()?;
            let provider = ctx.provider_or_default(repo.package_manager.as_deref())?;
            let procedure = match repo.action {
                RepositoryAction::Add => &provider.definition.repository.add,
                RepositoryAction::Remove => &provider.definition.repository.remove,
            };
            if procedure.is_empty() {
                ctx.log.warn(&format!(
                    "{} has no repository procedure for {}",
                    provider.name(),
                    repo.name
                ));
                stats.skipped += 1;
                continue;
            }
            ctx.log.debug(&format!(
                "repository {} via {}",
                repo.name,
                provider.name()
            ));
            let vars = step_context(ctx, repo, &provider.bin_path);
            match ctx.steps().run(procedure, &vars) {
                Ok(()) => stats.changed += 1,
                Err(e) => {
                    ctx.check_cancelled()?;
                    ctx.log.warn(&format!("repository {}: {e:#}", repo.name));
                    stats.skipped += 1;
                }
            }
        }
        Ok(stats.finish(ctx))
    }
}
