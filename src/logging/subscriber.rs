//! Tracing subscriber: console layer, run log file layer, and initialisation.
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{self, Write as _};
use std::path::Path;
use std::sync::Mutex;

use tracing::Level;
use tracing::field::{Field, Visit};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use super::utils::{log_file_path, run_started, strip_ansi, timestamp};

/// Target used for stage headers.
pub(super) const STAGE_TARGET: &str = "rwr::stage";
/// Target used for actions skipped by a dry run.
pub(super) const DRY_RUN_TARGET: &str = "rwr::dry_run";

/// Environment variable overriding console verbosity (`EnvFilter` syntax).
pub const LOG_ENV: &str = "RWR_LOG";

/// What a tracing event represents, independent of where it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line {
    Stage,
    DryRun,
    Info,
    Debug,
    Warn,
    Error,
}

impl Line {
    fn classify(level: Level, target: &str) -> Self {
        match level {
            Level::ERROR => Self::Error,
            Level::WARN => Self::Warn,
            Level::INFO if target == STAGE_TARGET => Self::Stage,
            Level::INFO if target == DRY_RUN_TARGET => Self::DryRun,
            Level::INFO => Self::Info,
            _ => Self::Debug,
        }
    }

    fn of(event: &tracing::Event<'_>) -> Self {
        let meta = event.metadata();
        Self::classify(*meta.level(), meta.target())
    }

    /// Fixed-width tag for the log file.
    const fn tag(self) -> &'static str {
        match self {
            Self::Stage => "STAGE",
            Self::DryRun => "DRY  ",
            Self::Info => "INFO ",
            Self::Debug => "DEBUG",
            Self::Warn => "WARN ",
            Self::Error => "ERROR",
        }
    }

    fn console(self, msg: &str) -> String {
        match self {
            Self::Stage => format!("\x1b[1;34m==>\x1b[0m \x1b[1m{msg}\x1b[0m"),
            Self::DryRun => format!("  \x1b[36m[dry run]\x1b[0m {msg}"),
            Self::Info => format!("  {msg}"),
            Self::Debug => format!("  \x1b[2m{msg}\x1b[0m"),
            Self::Warn => format!("\x1b[33mwarning:\x1b[0m {msg}"),
            Self::Error => format!("\x1b[31merror:\x1b[0m {msg}"),
        }
    }
}

/// Collects the `message` field of an event.
#[derive(Default)]
struct Message(String);

impl Visit for Message {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.0.push_str(value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.0, "{value:?}");
        }
    }
}

fn message(event: &tracing::Event<'_>) -> String {
    let mut visitor = Message::default();
    event.record(&mut visitor);
    visitor.0
}

/// Layer writing every event to the run log as plain text.
#[derive(Debug)]
pub(super) struct FileLayer {
    file: Mutex<File>,
}

impl FileLayer {
    /// Truncate `path` and start a run log for `command`.
    pub(super) fn create(path: &Path, command: &str) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        writeln!(
            file,
            "# rwr {} {command} started {} (pid {})",
            crate::commands::version::current(),
            run_started(),
            std::process::id()
        )?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Run log in the cache directory, if one can be opened.
    pub(super) fn for_command(command: &str) -> Option<Self> {
        Self::create(&log_file_path(command)?, command).ok()
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for FileLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _: tracing_subscriber::layer::Context<'_, S>) {
        let line = Line::of(event);
        let msg = strip_ansi(&message(event));
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{} {} {msg}", timestamp(), line.tag());
        }
    }
}

/// Console formatter sharing the [`Line`] classification with the file.
struct ConsoleFormat;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for ConsoleFormat
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        writeln!(writer, "{}", Line::of(event).console(&message(event)))
    }
}

/// Console filter: `RWR_LOG` when set, otherwise `info` (`debug` with
/// `--debug`).
fn console_filter(debug: bool) -> EnvFilter {
    let default = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    EnvFilter::builder()
        .with_default_directive(default.into())
        .with_env_var(LOG_ENV)
        .from_env_lossy()
}

/// Install the global subscriber for `command`.
///
/// Warnings and errors go to stderr, everything else to stdout. The run log
/// at `$XDG_CACHE_HOME/rwr/<command>.log` receives every event down to
/// `DEBUG` whatever the console filter says.
pub fn init_subscriber(debug: bool, command: &str) {
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;
    use tracing_subscriber::{Layer as _, fmt};

    let writer = io::stderr
        .with_max_level(Level::WARN)
        .and(io::stdout.with_min_level(Level::INFO));
    let console = fmt::layer()
        .event_format(ConsoleFormat)
        .with_writer(writer)
        .with_filter(console_filter(debug));
    let file = FileLayer::for_command(command).map(|layer| layer.with_filter(LevelFilter::DEBUG));

    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init();
}
