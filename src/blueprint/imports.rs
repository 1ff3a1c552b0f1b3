//! Expansion of `import:` entries inside blueprint sections.
//!
//! An entry of the form `{import: path}` is replaced, in place, by the
//! entries of the same section in the imported file. Paths are resolved
//! against the importing file's directory. Each file is expanded at most
//! once per top-level blueprint; repeats (including cycles) are skipped.
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::template;
use crate::config::Format;
use crate::error::ImportError;
use crate::logging::Log;

/// Key of an import directive.
pub const IMPORT_KEY: &str = "import";

/// An `import:` directive: the path and an optional explicit format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDirective {
    /// Path as written, relative to the importing file.
    pub path: String,
    /// Explicit format; inferred from the extension when absent.
    pub format: Option<Format>,
}

impl ImportDirective {
    /// Recognise an entry that consists only of `import` (and `format`).
    #[must_use]
    pub fn from_entry(entry: &Value) -> Option<Self> {
        let map = entry.as_object()?;
        let path = map.get(IMPORT_KEY)?.as_str()?;
        if map.keys().any(|k| k != IMPORT_KEY && k != "format") {
            return None;
        }
        let format = map
            .get("format")
            .and_then(Value::as_str)
            .and_then(|f| serde_json::from_value(Value::String(f.to_string())).ok());
        Some(Self {
            path: path.to_string(),
            format,
        })
    }
}

/// Extract the entries for `key` from a decoded document.
///
/// A document that is itself a list is taken as the section.
#[must_use]
pub fn section_entries(document: &Value, key: &str) -> Option<Vec<Value>> {
    match document {
        Value::Array(items) => Some(items.clone()),
        Value::Object(map) => match map.get(key)? {
            Value::Array(items) => Some(items.clone()),
            Value::Null => Some(Vec::new()),
            single => Some(vec![single.clone()]),
        },
        _ => None,
    }
}

/// Expands imports for one top-level blueprint file.
pub struct ImportResolver<'a> {
    variables: &'a Value,
    log: &'a dyn Log,
    visited: HashSet<PathBuf>,
}

impl std::fmt::Debug for ImportResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportResolver")
            .field("visited", &self.visited)
            .finish_non_exhaustive()
    }
}

impl<'a> ImportResolver<'a> {
    /// Start a resolver for `root`, which counts as already visited.
    #[must_use]
    pub fn new(root: &Path, variables: &'a Value, log: &'a dyn Log) -> Self {
        let mut visited = HashSet::new();
        visited.insert(dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf()));
        Self {
            variables,
            log,
            visited,
        }
    }

    /// Replace every import directive in `entries` with the entries of
    /// section `key` from the imported file, recursively.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Read`] for a missing or unreadable file,
    /// [`ImportError::Parse`] when it cannot be rendered or decoded, and
    /// [`ImportError::Malformed`] for an `import` entry with item keys.
    pub fn expand(
        &mut self,
        key: &str,
        entries: Vec<Value>,
        from: &Path,
    ) -> Result<Vec<Value>, ImportError> {
        let mut expanded = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(directive) = ImportDirective::from_entry(&entry) else {
                if entry.get(IMPORT_KEY).is_some() {
                    return Err(ImportError::Malformed {
                        from: from.to_path_buf(),
                        entry: entry.to_string(),
                    });
                }
                expanded.push(entry);
                continue;
            };
            if directive.path.trim().is_empty() {
                self.log
                    .debug(&format!("ignoring empty import in {}", from.display()));
                continue;
            }
            expanded.extend(self.import(key, &directive, from)?);
        }
        Ok(expanded)
    }

    fn import(
        &mut self,
        key: &str,
        directive: &ImportDirective,
        from: &Path,
    ) -> Result<Vec<Value>, ImportError> {
        let base = from.parent().unwrap_or_else(|| Path::new("."));
        let joined = base.join(&directive.path);
        let path = dunce::canonicalize(&joined).map_err(|source| ImportError::Read {
            path: joined.clone(),
            from: from.to_path_buf(),
            source,
        })?;

        if !self.visited.insert(path.clone()) {
            self.log.warn(&format!(
                "skipping repeated import of {} (from {})",
                path.display(),
                from.display()
            ));
            return Ok(Vec::new());
        }

        let format = directive
            .format
            .or_else(|| Format::from_path(&path))
            .ok_or_else(|| ImportError::Parse {
                path: path.clone(),
                message: "cannot infer format from extension".to_string(),
            })?;
        let text = std::fs::read_to_string(&path).map_err(|source| ImportError::Read {
            path: path.clone(),
            from: from.to_path_buf(),
            source,
        })?;
        let rendered = template::render(&text, self.variables).map_err(|e| ImportError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let document = format.decode(&rendered).map_err(|message| ImportError::Parse {
            path: path.clone(),
            message,
        })?;

        self.log.debug(&format!("importing {}", path.display()));
        let Some(entries) = section_entries(&document, key) else {
            self.log.debug(&format!(
                "{} declares no '{key}' section",
                path.display()
            ));
            return Ok(Vec::new());
        };
        self.expand(key, entries, &path)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::logging::CaptureLog;
    use serde_json::json;
    use std::fs;

    fn names(entries: &[Value]) -> Vec<String> {
        entries
            .iter()
            .map(|e| e["name"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn directive_requires_import_only_keys() {
        assert!(ImportDirective::from_entry(&json!({"import": "base.yaml"})).is_some());
        let with_format =
            ImportDirective::from_entry(&json!({"import": "x.conf", "format": "json"})).unwrap();
        assert_eq!(with_format.format, Some(Format::Json));
        assert!(ImportDirective::from_entry(&json!({"import": "a", "name": "vim"})).is_none());
        assert!(ImportDirective::from_entry(&json!({"name": "vim"})).is_none());
    }

    #[test]
    fn import_then_literal_preserves_order() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("base.yaml"), "packages:\n  - name: git\n").unwrap();
        let root = tmp.path().join("packages.yaml");
        fs::write(&root, "").unwrap();

        let log = CaptureLog::default();
        let vars = json!({});
        let mut resolver = ImportResolver::new(&root, &vars, &log);
        let entries = vec![json!({"import": "base.yaml"}), json!({"name": "curl"})];
        let merged = resolver.expand("packages", entries, &root).unwrap();
        assert_eq!(names(&merged), vec!["git", "curl"]);
    }

    #[test]
    fn cycle_terminates_with_each_item_once() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.yaml");
        let b = tmp.path().join("b.yaml");
        fs::write(&a, "packages:\n  - import: b.yaml\n  - name: a1\n").unwrap();
        fs::write(&b, "packages:\n  - import: a.yaml\n  - name: b1\n").unwrap();

        let log = CaptureLog::default();
        let vars = json!({});
        let mut resolver = ImportResolver::new(&a, &vars, &log);
        let entries = vec![json!({"import": "b.yaml"}), json!({"name": "a1"})];
        let merged = resolver.expand("packages", entries, &a).unwrap();
        assert_eq!(names(&merged), vec!["b1", "a1"]);
        assert_eq!(log.at("warn").len(), 1, "the repeat visit is warned about");
    }

    #[test]
    fn nested_imports_resolve_relative_to_importer() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("common/more")).unwrap();
        fs::write(
            tmp.path().join("common/base.yaml"),
            "packages:\n  - import: more/extra.json\n  - name: base\n",
        )
        .unwrap();
        fs::write(
            tmp.path().join("common/more/extra.json"),
            r#"{"packages": [{"name": "extra"}]}"#,
        )
        .unwrap();
        let root = tmp.path().join("packages.yaml");
        fs::write(&root, "").unwrap();

        let log = CaptureLog::default();
        let vars = json!({});
        let mut resolver = ImportResolver::new(&root, &vars, &log);
        let merged = resolver
            .expand("packages", vec![json!({"import": "common/base.yaml"})], &root)
            .unwrap();
        assert_eq!(names(&merged), vec!["extra", "base"]);
    }

    #[test]
    fn import_mixed_with_item_keys_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("base.yaml"), "packages:\n  - name: git\n").unwrap();
        let root = tmp.path().join("packages.yaml");
        fs::write(&root, "").unwrap();
        let log = CaptureLog::default();
        let vars = json!({});
        let mut resolver = ImportResolver::new(&root, &vars, &log);
        let err = resolver
            .expand(
                "packages",
                vec![json!({"import": "base.yaml", "name": "vim"}), json!({"name": "jq"})],
                &root,
            )
            .unwrap_err();
        assert!(matches!(err, ImportError::Malformed { .. }));
        assert!(err.to_string().contains("vim"));
    }

    #[test]
    fn missing_import_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("packages.yaml");
        fs::write(&root, "").unwrap();
        let log = CaptureLog::default();
        let vars = json!({});
        let mut resolver = ImportResolver::new(&root, &vars, &log);
        let err = resolver
            .expand("packages", vec![json!({"import": "nope.yaml"})], &root)
            .unwrap_err();
        assert!(matches!(err, ImportError::Read { .. }));
    }

    #[test]
    fn unparsable_import_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("bad.json"), "{ nope").unwrap();
        let root = tmp.path().join("packages.yaml");
        fs::write(&root, "").unwrap();
        let log = CaptureLog::default();
        let vars = json!({});
        let mut resolver = ImportResolver::new(&root, &vars, &log);
        let err = resolver
            .expand("packages", vec![json!({"import": "bad.json"})], &root)
            .unwrap_err();
        assert!(matches!(err, ImportError::Parse { .. }));
    }

    #[test]
    fn imported_files_are_templated() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("base.yaml"),
            "packages:\n  - name: {{.UserDefined.editor}}\n",
        )
        .unwrap();
        let root = tmp.path().join("packages.yaml");
        fs::write(&root, "").unwrap();
        let log = CaptureLog::default();
        let vars = json!({"UserDefined": {"editor": "helix"}});
        let mut resolver = ImportResolver::new(&root, &vars, &log);
        let merged = resolver
            .expand("packages", vec![json!({"import": "base.yaml"})], &root)
            .unwrap();
        assert_eq!(names(&merged), vec!["helix"]);
    }

    #[test]
    fn section_entries_accepts_bare_lists() {
        assert_eq!(
            section_entries(&json!([{"name": "a"}]), "packages").unwrap().len(),
            1
        );
        assert!(section_entries(&json!({"services": []}), "packages").is_none());
        assert!(section_entries(&json!({"packages": null}), "packages").unwrap().is_empty());
    }
}
