//! [`Log`] implementation backed by `tracing`, with a stage summary.
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use super::subscriber::{DRY_RUN_TARGET, STAGE_TARGET};
use super::types::{Log, StageEntry, StageStatus};
use super::utils::log_file_path;

/// Logger used by the binary.
///
/// Messages are emitted as `tracing` events; stage results are kept in
/// memory for [`Logger::print_summary`].
#[derive(Debug)]
pub struct Logger {
    stages: Mutex<Vec<StageEntry>>,
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Logger for `command`; the run log itself is written by the subscriber.
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self::with_log_file(log_file_path(command))
    }

    pub(super) const fn with_log_file(log_file: Option<PathBuf>) -> Self {
        Self {
            stages: Mutex::new(Vec::new()),
            log_file,
        }
    }

    /// Path of the run log.
    #[must_use]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Stage results recorded so far.
    #[must_use]
    pub fn stage_entries(&self) -> Vec<StageEntry> {
        self.stages.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Number of failed stages.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.stage_entries()
            .iter()
            .filter(|e| e.status == StageStatus::Failed)
            .count()
    }

    /// Log one line per recorded stage, then the totals and the log path.
    pub fn print_summary(&self) {
        let entries = self.stage_entries();
        if entries.is_empty() {
            return;
        }
        Log::stage(self, "Summary");

        let mut totals: BTreeMap<StageStatus, usize> = BTreeMap::new();
        for entry in &entries {
            *totals.entry(entry.status).or_default() += 1;
            let (marker, colour) = entry.status.marker();
            let detail = entry
                .message
                .as_deref()
                .map(|m| format!(": {m}"))
                .unwrap_or_default();
            Log::info(self, &format!("{colour}{marker}\x1b[0m {}{detail}", entry.name));
        }

        let counts: Vec<String> = totals
            .iter()
            .map(|(status, n)| {
                let (_, colour) = status.marker();
                format!("{colour}{n} {}\x1b[0m", status.label())
            })
            .collect();
        Log::info(
            self,
            &format!("{} stage(s): {}", entries.len(), counts.join(", ")),
        );
        if let Some(path) = &self.log_file {
            Log::info(self, &format!("\x1b[2mfull log: {}\x1b[0m", path.display()));
        }
    }
}

impl Log for Logger {
    fn stage(&self, msg: &str) {
        tracing::info!(target: STAGE_TARGET, "{msg}");
    }

    fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    fn dry_run(&self, msg: &str) {
        tracing::info!(target: DRY_RUN_TARGET, "{msg}");
    }

    fn record_stage(&self, name: &str, status: StageStatus, message: Option<&str>) {
        if let Ok(mut stages) = self.stages.lock() {
            stages.push(StageEntry {
                name: name.to_string(),
                status,
                message: message.map(str::to_string),
            });
        }
    }
}
