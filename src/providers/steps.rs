//! Execution of multi-step provider procedures.
//!
//! Every string field of a step is rendered as a template against a
//! [`StepContext`] before it runs.
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context as _, Result, bail};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{ActionStep, Procedure};
use crate::blueprint::template;
use crate::config::expand_home;
use crate::exec::Executor;
use crate::logging::Log;
use crate::platform::Platform;

/// Upper bound on a downloaded file.
const MAX_DOWNLOAD_SIZE: u64 = 256 * 1024 * 1024;

/// Variables available to step templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepContext {
    /// Repository or package-manager name.
    pub name: String,
    /// Repository URL.
    pub url: String,
    /// Signing key URL.
    pub key_url: String,
    /// Distribution channel.
    pub channel: String,
    /// Repository component.
    pub component: String,
    /// CPU architecture.
    pub arch: String,
    /// Operating system.
    pub os: String,
    /// Home directory.
    pub home: String,
    /// Resolved binary of the provider, when detected.
    pub bin_path: String,
}

impl StepContext {
    /// Host facts with every other field empty.
    #[must_use]
    pub fn for_host(platform: &Platform, home: Option<&Path>) -> Self {
        Self {
            arch: debian_arch(&platform.arch).to_string(),
            os: platform.os.to_string(),
            home: home.map(|h| h.display().to_string()).unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Set the subject name.
    #[must_use]
    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set the provider binary.
    #[must_use]
    pub fn with_bin_path(mut self, bin_path: &Path) -> Self {
        self.bin_path = bin_path.display().to_string();
        self
    }
}

/// Map toolchain architecture names to the names package indexes use.
fn debian_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = String::with_capacity(64);
    for b in &digest {
        write!(hex, "{b:02x}").unwrap_or(());
    }
    hex
}

/// Check `bytes` against an expected hex digest (case-insensitive).
///
/// # Errors
///
/// Returns an error naming both digests on mismatch.
pub fn verify_sha256(bytes: &[u8], expected: &str) -> Result<()> {
    let actual = sha256_hex(bytes);
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        bail!("checksum mismatch: expected {}, got {actual}", expected.trim());
    }
    Ok(())
}

fn download(url: &str) -> Result<Vec<u8>> {
    let agent = ureq::Agent::new_with_defaults();
    let mut response = agent
        .get(url)
        .header("User-Agent", concat!("rwr/", env!("CARGO_PKG_VERSION")))
        .call()
        .with_context(|| format!("downloading {url}"))?;
    response
        .body_mut()
        .with_config()
        .limit(MAX_DOWNLOAD_SIZE)
        .read_to_vec()
        .with_context(|| format!("reading response body from {url}"))
}

/// Runs procedures one step at a time.
pub struct StepRunner<'a> {
    executor: &'a dyn Executor,
    log: &'a dyn Log,
    dry_run: bool,
    elevate: bool,
    cancel: &'a AtomicBool,
}

impl std::fmt::Debug for StepRunner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRunner")
            .field("dry_run", &self.dry_run)
            .field("elevate", &self.elevate)
            .finish_non_exhaustive()
    }
}

impl<'a> StepRunner<'a> {
    /// Create a runner.
    ///
    /// `elevate` says whether `elevated` steps need a `sudo` prefix.
    #[must_use]
    pub const fn new(
        executor: &'a dyn Executor,
        log: &'a dyn Log,
        dry_run: bool,
        elevate: bool,
        cancel: &'a AtomicBool,
    ) -> Self {
        Self {
            executor,
            log,
            dry_run,
            elevate,
            cancel,
        }
    }

    /// Run every step of `procedure` in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns an error if a template fails to render, a step fails, or the
    /// run is interrupted.
    pub fn run(&self, procedure: &Procedure, context: &StepContext) -> Result<()> {
        let vars = serde_json::to_value(context)?;
        for (index, step) in procedure.steps.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                bail!("interrupted");
            }
            self.run_step(step, &vars)
                .with_context(|| format!("step {} of {}", index + 1, procedure.steps.len()))?;
        }
        Ok(())
    }

    fn render(text: &str, vars: &Value) -> Result<String> {
        Ok(template::render(text, vars)?)
    }

    fn run_step(&self, step: &ActionStep, vars: &Value) -> Result<()> {
        match step {
            ActionStep::Command {
                exec,
                args,
                elevated,
            } => {
                let exec = Self::render(exec, vars)?;
                let args = args
                    .iter()
                    .map(|a| Self::render(a, vars))
                    .collect::<Result<Vec<_>>>()?;
                self.command(&exec, &args, *elevated)
            }
            ActionStep::Download {
                source,
                dest,
                sha256,
                elevated,
            } => {
                let source = Self::render(source, vars)?;
                let dest = self.dest(dest, vars)?;
                if self.dry_run {
                    self.log
                        .dry_run(&format!("download {source} to {}", dest.display()));
                    return Ok(());
                }
                self.log.debug(&format!("downloading {source}"));
                let bytes = download(&source)?;
                if let Some(expected) = sha256.as_deref().filter(|s| !s.trim().is_empty()) {
                    verify_sha256(&bytes, expected).with_context(|| source.clone())?;
                }
                self.place(&bytes, &dest, *elevated)
            }
            ActionStep::Write {
                dest,
                content,
                elevated,
            } => {
                let dest = self.dest(dest, vars)?;
                let content = Self::render(content, vars)?;
                if self.dry_run {
                    self.log.dry_run(&format!("write {}", dest.display()));
                    return Ok(());
                }
                self.place(content.as_bytes(), &dest, *elevated)
            }
            ActionStep::Copy {
                source,
                dest,
                elevated,
            } => {
                let source = self.dest(source, vars)?;
                let dest = self.dest(dest, vars)?;
                if self.dry_run {
                    self.log.dry_run(&format!(
                        "copy {} to {}",
                        source.display(),
                        dest.display()
                    ));
                    return Ok(());
                }
                let bytes = std::fs::read(&source)
                    .with_context(|| format!("reading {}", source.display()))?;
                self.place(&bytes, &dest, *elevated)
            }
        }
    }

    fn dest(&self, text: &str, vars: &Value) -> Result<PathBuf> {
        let rendered = Self::render(text, vars)?;
        let home = vars
            .get("home")
            .and_then(Value::as_str)
            .filter(|h| !h.is_empty())
            .map(PathBuf::from);
        Ok(expand_home(&rendered, home.as_deref()))
    }

    fn command(&self, exec: &str, args: &[String], elevated: bool) -> Result<()> {
        let sudo = elevated && self.elevate;
        let shown = std::iter::once(exec)
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        if self.dry_run {
            let prefix = if sudo { "sudo " } else { "" };
            self.log.dry_run(&format!("{prefix}{shown}"));
            return Ok(());
        }
        self.log.debug(&format!("running {shown}"));
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        if sudo {
            let mut full = vec![exec];
            full.extend(args);
            self.executor.run("sudo", &full)?;
        } else {
            self.executor.run(exec, &args)?;
        }
        Ok(())
    }

    /// Write bytes to `dest`, through `sudo install` when elevated.
    fn place(&self, bytes: &[u8], dest: &Path, elevated: bool) -> Result<()> {
        if elevated && self.elevate {
            // Created exclusively with owner-only permissions.
            let mut staged = tempfile::Builder::new()
                .prefix("rwr-")
                .tempfile()
                .context("creating staging file")?;
            staged
                .write_all(bytes)
                .and_then(|()| staged.flush())
                .with_context(|| format!("staging {}", staged.path().display()))?;
            let staged_str = staged.path().display().to_string();
            let dest_str = dest.display().to_string();
            self.executor.run(
                "sudo",
                &["install", "-D", "-m", "0644", &staged_str, &dest_str],
            )?;
            return Ok(());
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(dest, bytes).with_context(|| format!("writing {}", dest.display()))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::exec::test_helpers::MockExecutor;
    use crate::logging::CaptureLog;
    use crate::platform::Os;
    use std::fs;

    fn context(home: &Path) -> StepContext {
        StepContext {
            url: "https://example.com/repo".to_string(),
            channel: "stable".to_string(),
            ..StepContext::for_host(&Platform::new(Os::Linux, "ubuntu", &[]), Some(home))
        }
        .named("docker")
    }

    fn procedure(steps: Vec<ActionStep>) -> Procedure {
        Procedure { steps }
    }

    #[test]
    fn sha256_known_value() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn verify_sha256_is_case_insensitive() {
        let digest = sha256_hex(b"data").to_uppercase();
        assert!(verify_sha256(b"data", &digest).is_ok());
        assert!(verify_sha256(b"other", &digest).is_err());
    }

    #[test]
    fn write_step_renders_dest_and_content() {
        let tmp = tempfile::tempdir().unwrap();
        let exec = MockExecutor::default();
        let log = CaptureLog::default();
        let cancel = AtomicBool::new(false);
        let runner = StepRunner::new(&exec, &log, false, true, &cancel);
        let steps = procedure(vec![ActionStep::Write {
            dest: "~/sources/{{ name }}.list".to_string(),
            content: "deb {{ url }} {{ channel }}".to_string(),
            elevated: false,
        }]);
        runner.run(&steps, &context(tmp.path())).unwrap();
        let written = fs::read_to_string(tmp.path().join("sources/docker.list")).unwrap();
        assert_eq!(written, "deb https://example.com/repo stable");
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn elevated_command_uses_sudo_when_required() {
        let tmp = tempfile::tempdir().unwrap();
        let exec = MockExecutor::default();
        let log = CaptureLog::default();
        let cancel = AtomicBool::new(false);
        let steps = procedure(vec![ActionStep::Command {
            exec: "apt-get".to_string(),
            args: vec!["update".to_string()],
            elevated: true,
        }]);

        StepRunner::new(&exec, &log, false, true, &cancel)
            .run(&steps, &context(tmp.path()))
            .unwrap();
        StepRunner::new(&exec, &log, false, false, &cancel)
            .run(&steps, &context(tmp.path()))
            .unwrap();
        assert_eq!(exec.calls(), vec!["sudo apt-get update", "apt-get update"]);
    }

    #[test]
    fn elevated_write_goes_through_install() {
        let tmp = tempfile::tempdir().unwrap();
        let exec = MockExecutor::default();
        let log = CaptureLog::default();
        let cancel = AtomicBool::new(false);
        let steps = procedure(vec![ActionStep::Write {
            dest: "/etc/apt/sources.list.d/{{ name }}.list".to_string(),
            content: "deb".to_string(),
            elevated: true,
        }]);
        StepRunner::new(&exec, &log, false, true, &cancel)
            .run(&steps, &context(tmp.path()))
            .unwrap();
        let calls = exec.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("sudo install -D -m 0644 "));
        assert!(calls[0].ends_with(" /etc/apt/sources.list.d/docker.list"));
    }

    #[cfg(unix)]
    #[test]
    fn elevated_write_never_follows_planted_links() {
        let tmp = tempfile::tempdir().unwrap();
        let victim = tmp.path().join("victim");
        fs::write(&victim, "original").unwrap();
        let planted = std::env::temp_dir().join(format!("rwr-{}-docker.list", std::process::id()));
        fs::remove_file(&planted).ok();
        std::os::unix::fs::symlink(&victim, &planted).unwrap();

        let exec = MockExecutor::default();
        let log = CaptureLog::default();
        let cancel = AtomicBool::new(false);
        let steps = procedure(vec![ActionStep::Write {
            dest: "/etc/apt/sources.list.d/{{ name }}.list".to_string(),
            content: "deb".to_string(),
            elevated: true,
        }]);
        StepRunner::new(&exec, &log, false, true, &cancel)
            .run(&steps, &context(tmp.path()))
            .unwrap();
        fs::remove_file(&planted).ok();

        assert_eq!(fs::read_to_string(&victim).unwrap(), "original");
        let call = &exec.calls()[0];
        let staged = call.split_whitespace().nth(5).unwrap();
        assert_ne!(Path::new(staged), planted);
        assert!(!Path::new(staged).exists(), "staging file is removed");
    }

    #[test]
    fn dry_run_touches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let exec = MockExecutor::default();
        let log = CaptureLog::default();
        let cancel = AtomicBool::new(false);
        let steps = procedure(vec![
            ActionStep::Download {
                source: "https://example.invalid/{{ name }}.gpg".to_string(),
                dest: "~/keys/{{ name }}.gpg".to_string(),
                sha256: None,
                elevated: false,
            },
            ActionStep::Write {
                dest: "~/out.txt".to_string(),
                content: "x".to_string(),
                elevated: false,
            },
            ActionStep::Command {
                exec: "true".to_string(),
                args: vec![],
                elevated: true,
            },
        ]);
        StepRunner::new(&exec, &log, true, true, &cancel)
            .run(&steps, &context(tmp.path()))
            .unwrap();
        assert!(exec.calls().is_empty());
        assert!(!tmp.path().join("out.txt").exists());
        let planned = log.at("dry_run");
        assert_eq!(planned.len(), 3);
        assert!(planned[0].contains("https://example.invalid/docker.gpg"));
        assert_eq!(planned[2], "sudo true");
    }

    #[test]
    fn failing_step_stops_the_procedure() {
        let tmp = tempfile::tempdir().unwrap();
        let exec = MockExecutor::default().failing("first");
        let log = CaptureLog::default();
        let cancel = AtomicBool::new(false);
        let steps = procedure(vec![
            ActionStep::Command {
                exec: "first".to_string(),
                args: vec![],
                elevated: false,
            },
            ActionStep::Command {
                exec: "second".to_string(),
                args: vec![],
                elevated: false,
            },
        ]);
        let err = StepRunner::new(&exec, &log, false, false, &cancel)
            .run(&steps, &context(tmp.path()))
            .unwrap_err();
        assert!(format!("{err:#}").contains("step 1 of 2"));
        assert_eq!(exec.calls(), vec!["first"]);
    }

    #[test]
    fn copy_step_copies_local_file() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("src.txt"), "payload").unwrap();
        let exec = MockExecutor::default();
        let log = CaptureLog::default();
        let cancel = AtomicBool::new(false);
        let steps = procedure(vec![ActionStep::Copy {
            source: "~/src.txt".to_string(),
            dest: "~/nested/dst.txt".to_string(),
            elevated: false,
        }]);
        StepRunner::new(&exec, &log, false, false, &cancel)
            .run(&steps, &context(tmp.path()))
            .unwrap();
        assert_eq!(
            fs::read_to_string(tmp.path().join("nested/dst.txt")).unwrap(),
            "payload"
        );
    }

    #[test]
    fn cancelled_runner_stops_before_first_step() {
        let tmp = tempfile::tempdir().unwrap();
        let exec = MockExecutor::default();
        let log = CaptureLog::default();
        let cancel = AtomicBool::new(true);
        let steps = procedure(vec![ActionStep::Command {
            exec: "echo".to_string(),
            args: vec![],
            elevated: false,
        }]);
        let err = StepRunner::new(&exec, &log, false, false, &cancel)
            .run(&steps, &context(tmp.path()))
            .unwrap_err();
        assert!(err.to_string().contains("interrupted"));
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn arch_uses_package_index_names() {
        assert_eq!(debian_arch("x86_64"), "amd64");
        assert_eq!(debian_arch("aarch64"), "arm64");
        assert_eq!(debian_arch("riscv64"), "riscv64");
    }
}
