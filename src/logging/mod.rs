//! Console and run-log output.
//!
//! Everything the engine reports goes through the [`Log`] trait. The binary
//! uses [`Logger`], which emits `tracing` events picked up by the subscriber
//! from [`init_subscriber`]; tests substitute an in-memory capture.

mod logger;
mod subscriber;
mod types;
mod utils;

pub use logger::Logger;
pub use subscriber::{LOG_ENV, init_subscriber};
pub use types::{Log, StageEntry, StageStatus};

/// Logger writing to a temporary run log through a thread-local subscriber.
///
/// Keep the guard alive for the duration of the test.
#[cfg(test)]
#[allow(clippy::expect_used)]
pub(crate) fn file_logger() -> (Logger, tempfile::TempDir, tracing::dispatcher::DefaultGuard) {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::{Layer as _, layer::SubscriberExt as _};

    let tmp = tempfile::tempdir().expect("temp dir");
    let path = tmp.path().join("test.log");
    let layer = subscriber::FileLayer::create(&path, "test").expect("run log");
    let dispatch =
        tracing::Dispatch::new(tracing_subscriber::registry().with(layer.with_filter(LevelFilter::DEBUG)));
    let guard = tracing::dispatcher::set_default(&dispatch);
    (Logger::with_log_file(Some(path)), tmp, guard)
}

/// In-memory [`Log`] for unit tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct CaptureLog {
    lines: std::sync::Mutex<Vec<(&'static str, String)>>,
    stages: std::sync::Mutex<Vec<StageEntry>>,
}

#[cfg(test)]
impl CaptureLog {
    fn push(&self, level: &'static str, msg: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((level, msg.to_string()));
        }
    }

    /// Messages logged at `level` (`stage`, `info`, `warn`, `dry_run`, ...).
    pub(crate) fn at(&self, level: &str) -> Vec<String> {
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

    /// Recorded stage results.
    pub(crate) fn stages(&self) -> Vec<StageEntry> {
        self.stages.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
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
