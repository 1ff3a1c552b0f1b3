//! Core logging types: stage entries, status, and the [`Log`] trait.

/// Result of one engine stage, kept for the run summary.
#[derive(Debug, Clone)]
pub struct StageEntry {
    /// Stage name (`packages: base.yaml`, `bootstrap/packages`, `cleanup`, ...).
    pub name: String,
    /// Final status of the stage.
    pub status: StageStatus,
    /// Skip reason or error description.
    pub message: Option<String>,
}

/// Status of a completed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StageStatus {
    /// Every item applied or was already in place.
    Ok,
    /// Nothing to do, no processor, or some items were skipped.
    Skipped,
    /// Only logged; nothing was changed.
    DryRun,
    /// The processor failed; the run aborted here.
    Failed,
}

impl StageStatus {
    /// Summary marker and its ANSI colour.
    #[must_use]
    pub const fn marker(self) -> (&'static str, &'static str) {
        match self {
            Self::Ok => ("✓", "\x1b[32m"),
            Self::Skipped => ("○", "\x1b[33m"),
            Self::DryRun => ("~", "\x1b[36m"),
            Self::Failed => ("✗", "\x1b[31m"),
        }
    }

    /// Lowercase label used in the summary totals.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Skipped => "skipped",
            Self::DryRun => "dry-run",
            Self::Failed => "failed",
        }
    }
}

/// Abstraction over logging backends.
///
/// The engine and the processors log only through this trait, so tests can
/// substitute a capturing implementation.
pub trait Log: Send + Sync {
    /// Log a stage header.
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (console only with `--debug`).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log an action that dry-run mode skipped.
    fn dry_run(&self, msg: &str);
    /// Record a stage result for the summary.
    fn record_stage(&self, name: &str, status: StageStatus, message: Option<&str>);
}
