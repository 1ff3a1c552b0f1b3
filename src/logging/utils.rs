//! Log file location, ANSI stripping and timestamps.
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

/// CSI escape sequences (colours, cursor movement).
#[allow(clippy::expect_used)]
static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[@-~]").expect("valid ANSI regex"));

/// Remove ANSI escape sequences so the log file stays plain text.
pub(super) fn strip_ansi(s: &str) -> String {
    ANSI_RE.replace_all(s, "").into_owned()
}

/// `$XDG_CACHE_HOME/rwr`, else `~/.cache/rwr`, created if missing.
pub(super) fn cache_dir() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CACHE_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| crate::config::home_dir().map(|h| h.join(".cache")))?;
    let dir = base.join("rwr");
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// Log file for `command` inside [`cache_dir`].
pub(super) fn log_file_path(command: &str) -> Option<PathBuf> {
    cache_dir().map(|dir| dir.join(format!("{command}.log")))
}

/// Local wall-clock timestamp with milliseconds, for log lines.
pub(super) fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

/// Local date and time with offset, for the run header.
pub(super) fn run_started() -> String {
    chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
}
