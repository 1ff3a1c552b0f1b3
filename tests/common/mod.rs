// Shared helpers for integration tests.
//
// Provides a temporary blueprint directory with a fluent builder, a
// recording executor so no real package manager is ever spawned, and a
// capturing logger, so each integration test can set up an isolated
// environment without repeating filesystem boilerplate.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use rwr::config::variables::Variables;
use rwr::config::{Format, InitConfig};
use rwr::exec::{ExecResult, Executor};
use rwr::logging::{Log, StageStatus};
use rwr::platform::{Os, Platform};
use rwr::processors::Context;
use rwr::providers::{Provider, ProviderRegistry};

/// An `apt`-like provider that needs `sudo` and knows the `python` core
/// package.
pub const APT: &str = r#"
name = "apt"
elevated = true
priority = 10
[detection]
distributions = ["ubuntu", "debian"]
binary = "apt-get"
[commands]
list = "list --installed"
install = "install -y"
remove = "remove -y"
clean = "autoremove -y"
[core_packages]
python = ["python3", "python3-pip"]
"#;

/// A `brew`-like provider installed through a shell script.
pub const BREW: &str = r#"
name = "brew"
priority = 5
[detection]
distributions = ["linux", "macos"]
binary = "brew"
[commands]
install = "install"
remove = "uninstall"
clean = "cleanup"
[[install.steps]]
action = "command"
exec = "/bin/bash"
args = ["-c", "install-brew"]
"#;

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Records every command line; calls succeed unless the line contains a
/// registered failure pattern.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<String>>,
    on_path: Mutex<HashSet<String>>,
    failures: Vec<String>,
    installers: Vec<(String, String)>,
}

impl RecordingExecutor {
    pub fn with_path(self, programs: &[&str]) -> Self {
        self.put_on_path(programs);
        self
    }

    pub fn failing(mut self, pattern: &str) -> Self {
        self.failures.push(pattern.to_string());
        self
    }

    /// Put `program` on the path once a call containing `pattern` succeeds.
    pub fn installing(mut self, pattern: &str, program: &str) -> Self {
        self.installers
            .push((pattern.to_string(), program.to_string()));
        self
    }

    /// Make `programs` resolvable from now on.
    pub fn put_on_path(&self, programs: &[&str]) {
        if let Ok(mut path) = self.on_path.lock() {
            path.extend(programs.iter().map(|p| (*p).to_string()));
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_matching(&self, pattern: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.contains(pattern))
            .collect()
    }

    fn record(&self, line: String) -> ExecResult {
        let success = !self.failures.iter().any(|f| line.contains(f.as_str()));
        let stdout = if line == "id -u" { "1000".to_string() } else { String::new() };
        if success {
            for (pattern, program) in &self.installers {
                if line.contains(pattern.as_str()) {
                    self.put_on_path(&[program.as_str()]);
                }
            }
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(line);
        }
        ExecResult {
            stdout,
            stderr: String::new(),
            success,
            code: Some(i32::from(!success)),
        }
    }

    fn checked(&self, line: String) -> Result<ExecResult> {
        let result = self.record(line.clone());
        if !result.success {
            anyhow::bail!("{line} failed");
        }
        Ok(result)
    }
}

fn join(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

impl Executor for RecordingExecutor {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        self.checked(join(program, args))
    }

    fn run_in(&self, _dir: &Path, program: &str, args: &[&str]) -> Result<ExecResult> {
        self.checked(join(program, args))
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        Ok(self.record(join(program, args)))
    }

    fn run_shell(&self, command: &str, _env: &[(String, String)]) -> Result<ExecResult> {
        self.checked(command.to_string())
    }

    fn which(&self, program: &str) -> Option<PathBuf> {
        let path = self.on_path.lock().ok()?;
        path.contains(program)
            .then(|| PathBuf::from("/usr/bin").join(program))
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

/// Captures log lines by level and recorded stages.
#[derive(Debug, Default)]
pub struct CaptureLog {
    lines: Mutex<Vec<(&'static str, String)>>,
    stages: Mutex<Vec<(String, StageStatus)>>,
}

impl CaptureLog {
    fn push(&self, level: &'static str, msg: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((level, msg.to_string()));
        }
    }

    pub fn at(&self, level: &str) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| {
                lines
                    .iter()
                    .filter(|(l, _)| *l == level)
                    .map(|(_, m)| m.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn stages(&self) -> Vec<(String, StageStatus)> {
        self.stages.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Log for CaptureLog {
    fn stage(&self, msg: &str) {
        self.push("stage", msg);
    }
    fn info(&self, msg: &str) {
        self.push("info", msg);
    }
    fn debug(&self, msg: &str) {
        self.push("debug", msg);
    }
    fn warn(&self, msg: &str) {
        self.push("warn", msg);
    }
    fn error(&self, msg: &str) {
        self.push("error", msg);
    }
    fn dry_run(&self, msg: &str) {
        self.push("dry_run", msg);
    }
    fn record_stage(&self, name: &str, status: StageStatus, _message: Option<&str>) {
        if let Ok(mut stages) = self.stages.lock() {
            stages.push((name.to_string(), status));
        }
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// An isolated blueprint directory backed by a [`tempfile::TempDir`].
///
/// The init file lives at the root; `.state/` holds the bootstrap sentinel.
pub struct Fixture {
    pub root: tempfile::TempDir,
    providers: Vec<String>,
}

impl Fixture {
    /// Create a fixture with an empty init file.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        std::fs::write(root.path().join("init.yaml"), "blueprints:\n  format: yaml\n")
            .expect("write init.yaml");
        Self {
            root,
            providers: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Directory holding the bootstrap sentinel.
    pub fn state_dir(&self) -> PathBuf {
        self.path().join(".state")
    }

    /// Replace the init file.
    pub fn init(self, yaml: &str) -> Self {
        self.write("init.yaml", yaml)
    }

    /// Write a file relative to the root, creating parent directories.
    pub fn write(self, relative: &str, contents: &str) -> Self {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::write(&path, contents).expect("write fixture file");
        self
    }

    /// Add a provider definition (TOML).
    pub fn provider(mut self, toml: &str) -> Self {
        self.providers.push(toml.to_string());
        self
    }

    pub fn registry(&self) -> ProviderRegistry {
        let providers = self
            .providers
            .iter()
            .map(|text| Provider::parse(text, Format::Toml, "fixture").expect("valid provider"));
        ProviderRegistry::from_providers(providers, "fixture")
    }

    /// Build a context for an Ubuntu host over this fixture.
    pub fn context(&self, exec: &Arc<RecordingExecutor>) -> (Context, Arc<CaptureLog>) {
        let init = InitConfig::load(&self.path().join("init.yaml")).expect("load init file");
        let dir = init.blueprint_dir(Some(self.path()));
        let variables = Variables::default()
            .with_user_defined(&init.variables, std::iter::empty())
            .to_value();
        let log = Arc::new(CaptureLog::default());
        let ctx = Context::new(
            init,
            Platform::new(Os::Linux, "ubuntu", &["debian"]),
            Arc::clone(&log) as Arc<dyn Log>,
            Arc::clone(exec) as Arc<dyn Executor>,
            self.registry(),
            Some(self.path().to_path_buf()),
        )
        .with_variables(variables)
        .with_blueprint_dir(dir);
        (ctx, log)
    }
}
