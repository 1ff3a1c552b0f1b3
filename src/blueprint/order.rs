//! Run order and per-processor file order.
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::ProcessorKind;
use crate::config::{Format, OrderEntry};
use crate::error::BlueprintError;
use crate::logging::Log;

/// Files to process, keyed by processor name, each list in walk order.
pub type FileOrder = BTreeMap<String, Vec<PathBuf>>;

/// The configured run order, or the default processor sequence when none
/// is configured.
#[must_use]
pub fn run_order(order: &[OrderEntry]) -> Vec<OrderEntry> {
    if order.is_empty() {
        ProcessorKind::DEFAULT_ORDER
            .iter()
            .map(|k| OrderEntry::named(k.as_str()))
            .collect()
    } else {
        order.to_vec()
    }
}

/// Processor names of the run order, deduplicated, in order.
#[must_use]
pub fn run_order_names(order: &[OrderEntry]) -> Vec<String> {
    let mut seen = HashSet::new();
    run_order(order)
        .into_iter()
        .map(|e| e.processor)
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Processor bucket for a file, given its path relative to the blueprint
/// directory.
///
/// The first path segment (directories, then the file stem) that names a
/// known processor wins; otherwise the containing directory's name is used.
#[must_use]
pub fn classify(relative: &Path, blueprint_dir: &Path) -> String {
    let mut segments: Vec<String> = relative
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if let Some(stem) = relative.file_stem() {
        segments.push(stem.to_string_lossy().into_owned());
    }
    if let Some(kind) = segments.iter().find_map(|s| ProcessorKind::from_name(s)) {
        return kind.as_str().to_string();
    }
    relative
        .parent()
        .and_then(Path::file_name)
        .or_else(|| blueprint_dir.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Files under `root` with one of `format`'s extensions, sorted by name.
fn walk(root: &Path, format: Format) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && format.matches(e.path()))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Resolve an order entry's target to existing files.
fn entry_files(dir: &Path, entry: &OrderEntry, format: Format) -> Vec<PathBuf> {
    let target = dir.join(entry.target());
    if target.is_dir() {
        return walk(&target, format);
    }
    if target.is_file() {
        return vec![target];
    }
    format
        .extensions()
        .iter()
        .map(|ext| dir.join(format!("{}.{ext}", entry.target())))
        .find(|p| p.is_file())
        .into_iter()
        .collect()
}

/// Collects files into buckets, skipping reserved and already-seen paths.
struct Collector<'a> {
    dir: &'a Path,
    reserved: HashSet<PathBuf>,
    seen: HashSet<PathBuf>,
    order: FileOrder,
}

impl Collector<'_> {
    fn canonical(path: &Path) -> PathBuf {
        dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }

    fn push(&mut self, path: PathBuf, processor: Option<&str>) {
        let canonical = Self::canonical(&path);
        if self.reserved.contains(&canonical) || !self.seen.insert(canonical) {
            return;
        }
        let bucket = processor.map_or_else(
            || classify(path.strip_prefix(self.dir).unwrap_or(&path), self.dir),
            String::from,
        );
        self.order.entry(bucket).or_default().push(path);
    }
}

/// Bucket the blueprint files under `dir` by processor.
///
/// Entries of `order` are visited first: a directory is walked, a file (with
/// or without its extension) is taken as is. A map entry binds its files to
/// the named processor; other files are classified with [`classify`]. Unless
/// `run_only_listed` is set, the rest of the tree is appended afterwards.
/// Files in `reserved` (the init and bootstrap files) are never bucketed.
///
/// # Errors
///
/// Returns [`BlueprintError::MissingLocation`] if `dir` does not exist.
pub fn file_order(
    dir: &Path,
    order: &[OrderEntry],
    run_only_listed: bool,
    format: Format,
    reserved: &[PathBuf],
    log: &dyn Log,
) -> Result<FileOrder, BlueprintError> {
    if !dir.is_dir() {
        return Err(BlueprintError::MissingLocation(dir.to_path_buf()));
    }
    let mut collector = Collector {
        dir,
        reserved: reserved.iter().map(|p| Collector::canonical(p)).collect(),
        seen: HashSet::new(),
        order: FileOrder::new(),
    };

    for entry in run_order(order) {
        let files = entry_files(dir, &entry, format);
        if files.is_empty() {
            log.debug(&format!("order entry '{entry}' matches no {format} files"));
        }
        let bound = entry.path.as_ref().map(|_| entry.processor.as_str());
        for file in files {
            collector.push(file, bound);
        }
    }

    if !run_only_listed {
        for file in walk(dir, format) {
            collector.push(file, None);
        }
    }

    Ok(collector.order)
}
