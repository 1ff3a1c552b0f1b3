//! Command: list profiles declared across the blueprints.
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::Result;

use super::CommandSetup;
use crate::blueprint::order::file_order;
use crate::blueprint::{Document, ProcessorKind};
use crate::cli::GlobalOpts;
use crate::config::profiles::unique_profiles;
use crate::engine::bootstrap::bootstrap_file;
use crate::logging::{Log, Logger};
use crate::processors::Context;

/// Profiles mapped to the files that declare them.
pub type ProfileIndex = BTreeMap<String, BTreeSet<PathBuf>>;

fn add_document(index: &mut ProfileIndex, ctx: &Context, file: &Path) -> Result<()> {
    let document = Document::read(file, ctx.init.blueprints.format, &ctx.variables)?;
    for kind in ProcessorKind::ALL {
        if !document.has_section(kind) {
            continue;
        }
        let blueprint = document.section(kind, &ctx.variables, &[], &*ctx.log)?;
        for profile in blueprint.declared_profiles {
            index.entry(profile).or_default().insert(file.to_path_buf());
        }
    }
    Ok(())
}

/// Collect every profile declared in the init file, the bootstrap
/// blueprint and the blueprint tree.
///
/// # Errors
///
/// Returns an error if a blueprint cannot be read or decoded.
pub fn collect(ctx: &Context) -> Result<ProfileIndex> {
    let mut index = ProfileIndex::new();
    for profile in unique_profiles(&ctx.init.package_managers) {
        index
            .entry(profile)
            .or_default()
            .insert(ctx.init.path.clone());
    }

    let settings = &ctx.init.blueprints;
    if let Some(file) = bootstrap_file(&ctx.blueprint_dir, settings.format) {
        add_document(&mut index, ctx, &file)?;
    }
    let order = file_order(
        &ctx.blueprint_dir,
        &settings.order,
        false,
        settings.format,
        &ctx.init.reserved_files(&ctx.blueprint_dir),
        &*ctx.log,
    )?;
    let files: BTreeSet<&PathBuf> = order.values().flatten().collect();
    for file in files {
        add_document(&mut index, ctx, file)?;
    }
    Ok(index)
}

/// Run the `profiles` command.
///
/// # Errors
///
/// Returns an error if setup fails or a blueprint cannot be read.
pub fn run(global: &GlobalOpts, log: &Arc<Logger>, cancel: Arc<AtomicBool>) -> Result<()> {
    let setup = CommandSetup::init(global, log, cancel)?;
    let blueprint_dir = setup.locate_blueprints(&**log)?;
    let ctx = setup
        .context(global, Arc::clone(log) as Arc<dyn Log>)?
        .with_blueprint_dir(blueprint_dir);

    log.stage("Profiles");
    let index = collect(&ctx)?;
    if index.is_empty() {
        log.info("no profiles declared");
    }
    for (profile, files) in &index {
        log.info(&format!("{profile} ({} file(s))", files.len()));
        for file in files {
            let shown = file.strip_prefix(&ctx.blueprint_dir).unwrap_or(file);
            log.debug(&format!("  {}", shown.display()));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::blueprint::items::PackageManagerSpec;
    use crate::exec::test_helpers::MockExecutor;
    use crate::processors::test_helpers::context;
    use std::fs;

    #[test]
    fn collects_profiles_from_every_source() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("packages.yaml"),
            "packages:\n  - name: docker\n    profiles: [work]\n  - name: steam\n    profiles: [gaming]\n",
        )
        .unwrap();
        fs::create_dir(tmp.path().join("system")).unwrap();
        fs::write(
            tmp.path().join("system/services.yaml"),
            "services:\n  - name: docker\n    profiles: [work]\n",
        )
        .unwrap();
        fs::write(
            tmp.path().join("bootstrap.yaml"),
            "packages:\n  - name: git\n    profiles: [base]\n",
        )
        .unwrap();
        let exec = Arc::new(MockExecutor::default());
        let (ctx, _) = context(vec![], &exec, tmp.path());
        let mut init = (*ctx.init).clone();
        init.package_managers = vec![PackageManagerSpec {
            name: "brew".to_string(),
            profiles: vec!["mac".to_string()],
            ..PackageManagerSpec::default()
        }];
        let ctx = Context {
            init: Arc::new(init),
            ..ctx
        };

        let index = collect(&ctx).unwrap();
        assert_eq!(
            index.keys().cloned().collect::<Vec<_>>(),
            vec!["base", "gaming", "mac", "work"]
        );
        assert_eq!(index["work"].len(), 2);
        assert_eq!(index["mac"], BTreeSet::from([tmp.path().join("init.yaml")]));
    }
}
