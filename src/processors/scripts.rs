//! Shell scripts, inline or from files next to the blueprints.
use anyhow::{Result, bail};

use super::{Context, Processor, ProcessorResult};
use crate::blueprint::items::Script;
use crate::blueprint::{Blueprint, Items, ProcessorKind};
use crate::config::expand_home;

/// Build the command line for one script.
fn command_line(ctx: &Context, script: &Script) -> Result<String> {
    let base = match (script.exec.as_deref(), script.source.as_deref()) {
        (Some(exec), _) if !exec.trim().is_empty() => exec.trim().to_string(),
        (_, Some(source)) if !source.trim().is_empty() => {
            let path = expand_home(source.trim(), ctx.home.as_deref());
            let path = if path.is_absolute() {
                path
            } else {
                ctx.blueprint_dir.join(path)
            };
            let shown = path.display();
            if ctx.platform.is_windows() {
                if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("ps1")) {
                    format!("powershell -NoProfile -ExecutionPolicy Bypass -File {shown}")
                } else {
                    shown.to_string()
                }
            } else {
                format!("sh {shown}")
            }
        }
        _ => bail!("script '{}' has neither exec nor source", script.name),
    };

    let mut line = if script.elevated && ctx.elevate {
        format!("sudo {base}")
    } else {
        base
    };
    for arg in script.args.iter().filter(|a| !a.is_empty()) {
        line.push(' ');
        line.push_str(arg);
    }
    Ok(line)
}

/// Runs `scripts` sections in order.
///
/// Scripts usually prepare the ground for later items, so the first failing
/// script fails the stage.
#[derive(Debug, Clone, Copy)]
pub struct ScriptsProcessor;

impl Processor for ScriptsProcessor {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Scripts
    }

    fn run(&self, ctx: &Context, blueprint: &Blueprint) -> Result<ProcessorResult> {
        let Items::Scripts(scripts) = &blueprint.items else {
            return Ok(ProcessorResult::Skipped("no scripts".to_string()));
        };
        if scripts.is_empty() {
            return Ok(ProcessorResult::Skipped("no scripts".to_string()));
        }

        for script in scripts {
            ctx.check_cancelled()?;
            if let Some(message) = script.log.as_deref().filter(|m| !m.trim().is_empty()) {
                ctx.log.info(message);
            }
            let line = command_line(ctx, script)?;
            ctx.shell(&line, &[])
                .map_err(|e| e.context(format!("script '{}' failed", script.name)))?;
        }
        ctx.log.info(&format!("{} scripts run", scripts.len()));
        Ok(if ctx.dry_run {
            ProcessorResult::DryRun
        } else {
            ProcessorResult::Ok
        })
    }
}
