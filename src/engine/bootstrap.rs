//! First-run bootstrap, guarded by a sentinel file.
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use super::{Dispatch, RunOptions};
use crate::blueprint::{Document, ProcessorKind};
use crate::config::Format;
use crate::error::StageError;
use crate::processors::Context;

/// Stem of the bootstrap blueprint inside the blueprint directory.
pub const BOOTSTRAP_STEM: &str = "bootstrap";

/// Sentinel file name inside the run-once directory.
pub const SENTINEL_NAME: &str = "bootstrap.done";

/// Default run-once directory: `$XDG_STATE_HOME/rwr`, else
/// `~/.local/state/rwr`.
#[must_use]
pub fn default_run_once_dir(home: Option<&Path>) -> PathBuf {
    std::env::var_os("XDG_STATE_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| home.map(|h| h.join(".local").join("state")))
        .unwrap_or_else(std::env::temp_dir)
        .join("rwr")
}

/// The bootstrap blueprint in `dir`, preferring the configured format.
#[must_use]
pub fn bootstrap_file(dir: &Path, preferred: Format) -> Option<PathBuf> {
    std::iter::once(preferred)
        .chain(Format::ALL.into_iter().filter(|f| *f != preferred))
        .flat_map(|f| f.extensions().iter())
        .map(|ext| dir.join(format!("{BOOTSTRAP_STEM}.{ext}")))
        .find(|p| p.is_file())
}

/// Run the bootstrap blueprint when it exists and has not run yet.
///
/// Sections are applied in [`ProcessorKind::BOOTSTRAP_ORDER`]. The sentinel
/// is written afterwards, except in dry-run mode.
///
/// Profiles the bootstrap sections declare are added to `declared`, also
/// when the sentinel skips the run.
///
/// Returns whether the bootstrap ran.
///
/// # Errors
///
/// Returns the [`StageError`] of the first failing section, or an error if
/// the sentinel cannot be written.
pub fn run_if_needed(
    ctx: &Context,
    dispatch: &Dispatch<'_>,
    options: &RunOptions,
    declared: &mut BTreeSet<String>,
) -> Result<bool> {
    let Some(file) = bootstrap_file(&ctx.blueprint_dir, ctx.init.blueprints.format) else {
        ctx.log.debug("no bootstrap blueprint");
        return Ok(false);
    };
    let run_once_dir = options
        .run_once_dir
        .clone()
        .unwrap_or_else(|| default_run_once_dir(ctx.home.as_deref()));
    let sentinel = run_once_dir.join(SENTINEL_NAME);
    if sentinel.exists() && !options.force_bootstrap {
        ctx.log.debug(&format!(
            "already bootstrapped ({} exists)",
            sentinel.display()
        ));
        match declared_in(ctx, &file) {
            Ok(profiles) => declared.extend(profiles),
            Err(e) => ctx.log.debug(&format!("bootstrap profiles unreadable: {e:#}")),
        }
        return Ok(false);
    }

    ctx.log.stage("Bootstrap");
    let stage_err = |kind: ProcessorKind, cause: anyhow::Error| StageError {
        processor: format!("{BOOTSTRAP_STEM}/{kind}"),
        file: file.clone(),
        cause,
    };
    let document = Document::read(&file, ctx.init.blueprints.format, &ctx.variables)
        .map_err(|e| stage_err(ProcessorKind::Packages, e.into()))?;

    for kind in ProcessorKind::BOOTSTRAP_ORDER {
        ctx.check_cancelled()?;
        if !document.has_section(kind) {
            continue;
        }
        let blueprint = document
            .section(kind, &ctx.variables, &options.profiles, &*ctx.log)
            .map_err(|e| stage_err(kind, e.into()))?;
        declared.extend(blueprint.declared_profiles.iter().cloned());
        dispatch.apply(ctx, kind, &format!("{BOOTSTRAP_STEM}/{kind}"), &blueprint)?;
    }

    if ctx.dry_run {
        ctx.log
            .dry_run(&format!("write bootstrap sentinel {}", sentinel.display()));
    } else {
        std::fs::create_dir_all(&run_once_dir)
            .with_context(|| format!("creating {}", run_once_dir.display()))?;
        std::fs::write(&sentinel, chrono::Local::now().to_rfc3339())
            .with_context(|| format!("writing {}", sentinel.display()))?;
    }
    Ok(true)
}

/// Profiles declared by the bootstrap sections, without applying them.
fn declared_in(ctx: &Context, file: &Path) -> Result<BTreeSet<String>> {
    let document = Document::read(file, ctx.init.blueprints.format, &ctx.variables)?;
    let mut declared = BTreeSet::new();
    for kind in ProcessorKind::BOOTSTRAP_ORDER {
        if document.has_section(kind) {
            let blueprint = document.section(kind, &ctx.variables, &[], &*ctx.log)?;
            declared.extend(blueprint.declared_profiles);
        }
    }
    Ok(declared)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn bootstrap_file_prefers_configured_format() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("bootstrap.json"), "{}").unwrap();
        fs::write(tmp.path().join("bootstrap.yaml"), "").unwrap();
        assert_eq!(
            bootstrap_file(tmp.path(), Format::Json).unwrap(),
            tmp.path().join("bootstrap.json")
        );
        assert_eq!(
            bootstrap_file(tmp.path(), Format::Yaml).unwrap(),
            tmp.path().join("bootstrap.yaml")
        );
    }

    #[test]
    fn bootstrap_file_falls_back_to_other_formats() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("bootstrap.toml"), "").unwrap();
        assert_eq!(
            bootstrap_file(tmp.path(), Format::Yaml).unwrap(),
            tmp.path().join("bootstrap.toml")
        );
        fs::remove_file(tmp.path().join("bootstrap.toml")).unwrap();
        assert!(bootstrap_file(tmp.path(), Format::Yaml).is_none());
    }

    #[test]
    fn default_run_once_dir_ends_with_rwr() {
        let dir = default_run_once_dir(Some(Path::new("/home/alice")));
        assert!(dir.ends_with("rwr"));
    }
}
