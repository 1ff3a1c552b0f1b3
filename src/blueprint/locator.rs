//! Blueprint directory resolution, including git-sourced blueprints.
use std::path::Path;
use std::path::PathBuf;

use crate::config::{GitSource, InitConfig};
use crate::error::{BlueprintError, GitError, RwrError};
use crate::exec::Executor;
use crate::logging::Log;

/// Normalise a remote URL for comparison: trailing slashes and a `.git`
/// suffix are ignored.
#[must_use]
pub fn canonical_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    url.strip_suffix(".git").unwrap_or(url).to_string()
}

/// Resolve the blueprint directory for `init`.
///
/// With a git source the directory is cloned or refreshed first. The
/// directory must exist and contain at least one entry.
///
/// # Errors
///
/// Returns a [`GitError`] if sourcing fails, or a [`BlueprintError`] if the
/// directory is missing or empty.
pub fn locate(
    init: &InitConfig,
    home: Option<&Path>,
    executor: &dyn Executor,
    log: &dyn Log,
) -> Result<PathBuf, RwrError> {
    let dir = init.blueprint_dir(home);
    if let Some(git) = &init.blueprints.git {
        if holds(&dir, &init.path) {
            return Err(GitError::Protected {
                path: dir,
                init: init.path.clone(),
            }
            .into());
        }
        ensure_checkout(git, &dir, executor, log)?;
    }
    if !dir.is_dir() {
        return Err(BlueprintError::MissingLocation(dir).into());
    }
    let mut entries = std::fs::read_dir(&dir).map_err(|source| BlueprintError::Io {
        path: dir.clone(),
        source,
    })?;
    if entries.next().is_none() {
        return Err(BlueprintError::EmptyLocation(dir).into());
    }
    log.debug(&format!("blueprints: {}", dir.display()));
    Ok(dir)
}

/// Whether `file` lies inside `dir`, comparing canonical paths when they
/// exist.
fn holds(dir: &Path, file: &Path) -> bool {
    let canonical = |p: &Path| dunce::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
    canonical(file).starts_with(canonical(dir))
}

/// Make `dir` a checkout of `git.url`.
///
/// A non-repository occupant is removed, an absent checkout is cloned, and
/// an existing one has its `origin` corrected and is optionally pulled.
///
/// # Errors
///
/// Returns a [`GitError`] describing the failed step.
pub fn ensure_checkout(
    git: &GitSource,
    dir: &Path,
    executor: &dyn Executor,
    log: &dyn Log,
) -> Result<(), GitError> {
    if dir.exists() && git2::Repository::open(dir).is_err() {
        log.warn(&format!(
            "{} is not a git repository, replacing it",
            dir.display()
        ));
        let removed = if dir.is_dir() {
            std::fs::remove_dir_all(dir)
        } else {
            std::fs::remove_file(dir)
        };
        removed.map_err(|source| GitError::Occupied {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    if !dir.exists() {
        return clone(git, dir, log);
    }

    let repo = git2::Repository::open(dir).map_err(|e| GitError::Repository {
        path: dir.to_path_buf(),
        message: e.message().to_string(),
    })?;
    sync_origin(&repo, git, dir, log)?;

    if git.pull {
        log.info(&format!("pulling blueprints in {}", dir.display()));
        let mut args = vec!["pull", "--ff-only"];
        if let Some(branch) = git.branch.as_deref() {
            args.extend(["origin", branch]);
        }
        executor
            .run_in(dir, "git", &args)
            .map_err(|e| GitError::Pull {
                path: dir.to_path_buf(),
                message: format!("{e:#}"),
            })?;
    }
    Ok(())
}

fn clone(git: &GitSource, dir: &Path, log: &dyn Log) -> Result<(), GitError> {
    log.info(&format!("cloning {} into {}", git.url, dir.display()));
    let clone_err = |message: String| GitError::Clone {
        url: git.url.clone(),
        path: dir.to_path_buf(),
        message,
    };
    if let Some(parent) = dir.parent() {
        std::fs::create_dir_all(parent).map_err(|e| clone_err(e.to_string()))?;
    }
    let mut builder = git2::build::RepoBuilder::new();
    if let Some(branch) = git.branch.as_deref() {
        builder.branch(branch);
    }
    builder
        .clone(&git.url, dir)
        .map_err(|e| clone_err(e.message().to_string()))?;
    Ok(())
}

fn sync_origin(
    repo: &git2::Repository,
    git: &GitSource,
    dir: &Path,
    log: &dyn Log,
) -> Result<(), GitError> {
    let repo_err = |e: git2::Error| GitError::Repository {
        path: dir.to_path_buf(),
        message: e.message().to_string(),
    };
    match repo.find_remote("origin") {
        Ok(remote) => {
            let actual = remote.url().unwrap_or_default();
            if canonical_url(actual) != canonical_url(&git.url) {
                log.warn(&format!(
                    "origin of {} is {actual}, updating to {}",
                    dir.display(),
                    git.url
                ));
                repo.remote_set_url("origin", &git.url).map_err(repo_err)?;
            }
        }
        Err(_) => {
            log.warn(&format!("{} has no origin, adding {}", dir.display(), git.url));
            repo.remote("origin", &git.url).map_err(repo_err)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::BlueprintSettings;
    use crate::exec::SystemExecutor;
    use crate::logging::CaptureLog;
    use std::fs;

    /// Create a repository with one committed blueprint file.
    fn source_repo(root: &Path) -> PathBuf {
        let path = root.join("source");
        let repo = git2::Repository::init(&path).unwrap();
        fs::write(path.join("packages.yaml"), "packages:\n  - name: git\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("packages.yaml")).unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
            .unwrap();
        path
    }

    fn file_url(path: &Path) -> String {
        format!("file://{}", path.display())
    }

    fn source(url: String) -> GitSource {
        GitSource {
            url,
            branch: None,
            pull: false,
        }
    }

    #[test]
    fn canonical_url_ignores_suffix_and_slash() {
        assert_eq!(
            canonical_url("https://example.com/bp.git"),
            canonical_url("https://example.com/bp/")
        );
        assert_ne!(
            canonical_url("https://example.com/a"),
            canonical_url("https://example.com/b")
        );
    }

    #[test]
    fn clones_when_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source_repo(tmp.path());
        let dest = tmp.path().join("nested/checkout");
        let log = CaptureLog::default();
        ensure_checkout(&source(file_url(&src)), &dest, &SystemExecutor::new(), &log).unwrap();
        assert!(dest.join("packages.yaml").is_file());
    }

    #[test]
    fn replaces_non_repository_occupant() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source_repo(tmp.path());
        let dest = tmp.path().join("checkout");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale.txt"), "junk").unwrap();
        let log = CaptureLog::default();
        ensure_checkout(&source(file_url(&src)), &dest, &SystemExecutor::new(), &log).unwrap();
        assert!(!dest.join("stale.txt").exists());
        assert!(dest.join("packages.yaml").is_file());
        assert_eq!(log.at("warn").len(), 1);
    }

    #[test]
    fn corrects_mismatched_origin() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source_repo(tmp.path());
        let dest = tmp.path().join("checkout");
        let log = CaptureLog::default();
        ensure_checkout(&source(file_url(&src)), &dest, &SystemExecutor::new(), &log).unwrap();

        let moved = "https://example.com/moved.git".to_string();
        ensure_checkout(&source(moved.clone()), &dest, &SystemExecutor::new(), &log).unwrap();
        let repo = git2::Repository::open(&dest).unwrap();
        assert_eq!(repo.find_remote("origin").unwrap().url(), Some(moved.as_str()));
    }

    #[test]
    fn clone_failure_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("checkout");
        let log = CaptureLog::default();
        let missing = file_url(&tmp.path().join("no-such-repo"));
        let err = ensure_checkout(&source(missing), &dest, &SystemExecutor::new(), &log)
            .unwrap_err();
        assert!(matches!(err, GitError::Clone { .. }));
    }

    #[test]
    fn locate_rejects_empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("empty")).unwrap();
        let init = InitConfig {
            blueprints: BlueprintSettings {
                location: Some("empty".to_string()),
                ..BlueprintSettings::default()
            },
            path: tmp.path().join("init.yaml"),
            ..InitConfig::default()
        };
        let log = CaptureLog::default();
        let err = locate(&init, None, &SystemExecutor::new(), &log).unwrap_err();
        assert!(matches!(
            err,
            RwrError::Blueprint(BlueprintError::EmptyLocation(_))
        ));
    }

    #[test]
    fn git_location_holding_the_init_file_is_left_alone() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("init.yaml"), "").unwrap();
        fs::write(tmp.path().join("notes.txt"), "keep me").unwrap();
        let init = InitConfig {
            blueprints: BlueprintSettings {
                location: Some(".".to_string()),
                git: Some(source(file_url(&tmp.path().join("no-such-repo")))),
                ..BlueprintSettings::default()
            },
            path: tmp.path().join("init.yaml"),
            ..InitConfig::default()
        };
        let log = CaptureLog::default();
        let err = locate(&init, None, &SystemExecutor::new(), &log).unwrap_err();
        assert!(matches!(err, RwrError::Git(GitError::Protected { .. })));
        assert!(tmp.path().join("init.yaml").is_file());
        assert!(tmp.path().join("notes.txt").is_file());
    }

    #[test]
    fn locate_static_directory() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("init.yaml"), "").unwrap();
        let init = InitConfig {
            path: tmp.path().join("init.yaml"),
            ..InitConfig::default()
        };
        let log = CaptureLog::default();
        assert_eq!(
            locate(&init, None, &SystemExecutor::new(), &log).unwrap(),
            tmp.path()
        );
    }
}
