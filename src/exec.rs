//! Subprocess execution behind an injectable [`Executor`] trait.
use anyhow::{Context, Result, bail};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// How often a running child is polled for exit, deadline and cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Result of a command execution.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the process exited successfully.
    pub success: bool,
    /// Exit code, if the process was not killed by a signal.
    pub code: Option<i32>,
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

impl ExecResult {
    /// Combined stdout and stderr, trimmed, for error messages.
    #[must_use]
    pub fn combined_output(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

/// Abstraction over running external commands.
///
/// Production code uses [`SystemExecutor`]; tests substitute a mock so that
/// no real package manager or service manager is ever invoked.
pub trait Executor: Send + Sync + std::fmt::Debug {
    /// Run a program, failing if it exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned or exits non-zero.
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Run a program in a working directory, failing if it exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned or exits non-zero.
    fn run_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Run a program, returning its result even when it exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns an error only if the program cannot be spawned.
    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Run a synthesized command line through the platform shell with extra
    /// environment variables, failing if it exits non-zero.
    ///
    /// The command text is passed verbatim; no escaping is applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the shell cannot be spawned or the command fails.
    fn run_shell(&self, command: &str, env: &[(String, String)]) -> Result<ExecResult>;

    /// Resolve a program on `PATH`.
    fn which(&self, program: &str) -> Option<PathBuf>;
}

/// [`Executor`] that spawns real processes.
///
/// Every call honours the optional per-command `timeout` and the shared
/// `cancel` flag; the child is killed when either trips.
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor {
    timeout: Option<Duration>,
    cancel: Arc<AtomicBool>,
}

impl SystemExecutor {
    /// Create an executor with no deadline and a fresh cancellation flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill any command that runs longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share a cancellation flag (set by the Ctrl-C handler).
    #[must_use]
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    fn spawn_and_wait(&self, mut cmd: Command, label: &str) -> Result<ExecResult> {
        if self.cancel.load(Ordering::SeqCst) {
            bail!("interrupted before running: {label}");
        }
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to execute: {label}"))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let started = Instant::now();

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if self.cancel.load(Ordering::SeqCst) {
                kill(&mut child);
                bail!("interrupted: {label}");
            }
            if let Some(limit) = self.timeout
                && started.elapsed() >= limit
            {
                kill(&mut child);
                bail!("{label} timed out after {}s", limit.as_secs());
            }
            thread::sleep(POLL_INTERVAL);
        };

        Ok(ExecResult {
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
            success: status.success(),
            code: status.code(),
        })
    }

    fn checked(&self, cmd: Command, label: &str) -> Result<ExecResult> {
        let result = self.spawn_and_wait(cmd, label)?;
        if !result.success {
            bail!(
                "{label} failed (exit {}): {}",
                result.code.unwrap_or(-1),
                result.combined_output()
            );
        }
        Ok(result)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf).ok();
        }
        String::from_utf8_lossy(&buf).to_string()
    })
}

fn kill(child: &mut Child) {
    child.kill().ok();
    child.wait().ok();
}

/// Build the platform shell invocation for a command line.
fn shell_command(command: &str) -> Command {
    if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

impl Executor for SystemExecutor {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        self.checked(cmd, program)
    }

    fn run_in(&self, dir: &Path, program: &str, args: &[&str]) -> Result<ExecResult> {
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(dir);
        self.checked(cmd, &format!("{program} in {}", dir.display()))
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        self.spawn_and_wait(cmd, program)
    }

    fn run_shell(&self, command: &str, env: &[(String, String)]) -> Result<ExecResult> {
        let mut cmd = shell_command(command);
        for (k, v) in env {
            cmd.env(k, v);
        }
        self.checked(cmd, command)
    }

    fn which(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}
