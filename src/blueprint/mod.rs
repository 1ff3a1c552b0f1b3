//! Blueprint documents: decoding, templating, import expansion and
//! profile filtering.
//!
//! A blueprint file is rendered as a template, decoded according to its
//! format, and the section named after the processor kind is expanded and
//! decoded into typed [`Items`]. Processors receive the result as a
//! [`Blueprint`].
pub mod imports;
pub mod items;
pub mod kind;
pub mod locator;
pub mod order;
pub mod template;

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::Format;
use crate::config::profiles::{filter_by_profiles, unique_profiles};
use crate::error::{BlueprintError, RwrError};
use crate::logging::Log;
use imports::{ImportResolver, section_entries};
use items::{
    Configuration, Directory, File, Font, GitRepo, Group, Package, PackageManagerSpec,
    Repository, Script, Service, SshKey, User,
};
pub use kind::ProcessorKind;

/// Generate [`Items`] with one variant per processor kind.
macro_rules! blueprint_items {
    ($($variant:ident($ty:ty)),+ $(,)?) => {
        /// Decoded items of one blueprint section.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Items {
            $(
                #[doc = concat!("Items for [`ProcessorKind::", stringify!($variant), "`].")]
                $variant(Vec<$ty>),
            )+
        }

        impl Items {
            /// Processor kind these items belong to.
            #[must_use]
            pub const fn kind(&self) -> ProcessorKind {
                match self {
                    $(Self::$variant(_) => ProcessorKind::$variant,)+
                }
            }

            /// Number of items.
            #[must_use]
            pub fn len(&self) -> usize {
                match self {
                    $(Self::$variant(v) => v.len(),)+
                }
            }

            /// Whether there are no items.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// Keep only items included for `active`.
            #[must_use]
            pub fn filter_by_profiles(self, active: &[String]) -> Self {
                match self {
                    $(Self::$variant(v) => Self::$variant(filter_by_profiles(v, active)),)+
                }
            }

            /// Distinct profile tags declared by the items, sorted.
            #[must_use]
            pub fn unique_profiles(&self) -> Vec<String> {
                match self {
                    $(Self::$variant(v) => unique_profiles(v),)+
                }
            }

            /// Decode raw entries into the typed items for `kind`.
            ///
            /// # Errors
            ///
            /// Returns the decoder error of the first entry that does not
            /// match the item schema.
            pub fn decode(kind: ProcessorKind, entries: Vec<Value>) -> serde_json::Result<Self> {
                match kind {
                    $(
                        ProcessorKind::$variant => entries
                            .into_iter()
                            .map(serde_json::from_value)
                            .collect::<serde_json::Result<Vec<$ty>>>()
                            .map(Self::$variant),
                    )+
                }
            }

            /// Items as a JSON array.
            #[must_use]
            pub fn to_value(&self) -> Value {
                match self {
                    $(Self::$variant(v) => serde_json::to_value(v).unwrap_or_default(),)+
                }
            }

            /// An empty item list for `kind`.
            #[must_use]
            pub const fn empty(kind: ProcessorKind) -> Self {
                match kind {
                    $(ProcessorKind::$variant => Self::$variant(Vec::new()),)+
                }
            }
        }
    };
}

blueprint_items!(
    PackageManagers(PackageManagerSpec),
    Repositories(Repository),
    Packages(Package),
    SshKeys(SshKey),
    Files(File),
    Directories(Directory),
    Fonts(Font),
    Services(Service),
    Git(GitRepo),
    Scripts(Script),
    Configuration(Configuration),
    Users(User),
    Groups(Group),
);

/// One resolved blueprint section, ready for its processor.
#[derive(Debug, Clone, PartialEq)]
pub struct Blueprint {
    /// Processor kind.
    pub kind: ProcessorKind,
    /// File the section was read from.
    pub source: PathBuf,
    /// Format of the source file.
    pub format: Format,
    /// Templated, import-expanded, profile-filtered items in file order.
    pub items: Items,
    /// Profiles declared by the items before filtering.
    pub declared_profiles: Vec<String>,
}

impl Blueprint {
    /// Re-encode the items as a document in the source format, keyed by the
    /// processor name.
    ///
    /// # Errors
    ///
    /// Returns an error if the items cannot be represented in the format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BlueprintError> {
        let mut document = serde_json::Map::new();
        document.insert(self.kind.as_str().to_string(), self.items.to_value());
        self.format
            .encode(&Value::Object(document))
            .map(String::into_bytes)
            .map_err(|message| BlueprintError::Decode {
                path: self.source.clone(),
                format: self.format.to_string(),
                message,
            })
    }
}

/// A blueprint file rendered and decoded once, from which several sections
/// can be loaded (the bootstrap file carries many).
#[derive(Debug, Clone)]
pub struct Document {
    /// Path of the file.
    pub path: PathBuf,
    /// Format used to decode it.
    pub format: Format,
    /// Decoded document tree.
    pub root: Value,
}

impl Document {
    /// Read, render and decode a blueprint file.
    ///
    /// The format follows the extension, falling back to `default_format`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the template does not
    /// parse, or the rendered text is not valid in its format.
    pub fn read(path: &Path, default_format: Format, variables: &Value) -> Result<Self, RwrError> {
        let format = Format::from_path(path).unwrap_or(default_format);
        let text = std::fs::read_to_string(path).map_err(|source| BlueprintError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let rendered = template::render(&text, variables)?;
        let root = format
            .decode(&rendered)
            .map_err(|message| BlueprintError::Decode {
                path: path.to_path_buf(),
                format: format.to_string(),
                message,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            format,
            root,
        })
    }

    /// Whether the document declares a section for `kind`.
    #[must_use]
    pub fn has_section(&self, kind: ProcessorKind) -> bool {
        self.root.get(kind.as_str()).is_some()
    }

    /// Expand, decode and filter the section for `kind`.
    ///
    /// A missing section yields an empty item list.
    ///
    /// # Errors
    ///
    /// Returns an error if an import fails or an entry does not match the
    /// item schema.
    pub fn section(
        &self,
        kind: ProcessorKind,
        variables: &Value,
        active_profiles: &[String],
        log: &dyn Log,
    ) -> Result<Blueprint, RwrError> {
        let key = kind.as_str();
        let entries = section_entries(&self.root, key).unwrap_or_default();
        let mut resolver = ImportResolver::new(&self.path, variables, log);
        let expanded = resolver.expand(key, entries, &self.path)?;
        let items = Items::decode(kind, expanded).map_err(|e| BlueprintError::Section {
            path: self.path.clone(),
            key: key.to_string(),
            message: e.to_string(),
        })?;
        let declared_profiles = items.unique_profiles();
        Ok(Blueprint {
            kind,
            source: self.path.clone(),
            format: self.format,
            items: items.filter_by_profiles(active_profiles),
            declared_profiles,
        })
    }
}

/// Load one processor's section from a blueprint file.
///
/// # Errors
///
/// See [`Document::read`] and [`Document::section`].
pub fn load(
    path: &Path,
    kind: ProcessorKind,
    default_format: Format,
    variables: &Value,
    active_profiles: &[String],
    log: &dyn Log,
) -> Result<Blueprint, RwrError> {
    Document::read(path, default_format, variables)?.section(kind, variables, active_profiles, log)
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::error::TemplateError;
    use crate::logging::CaptureLog;
    use serde_json::json;
    use std::fs;

    fn s(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn package_names(bp: &Blueprint) -> Vec<String> {
        match &bp.items {
            Items::Packages(p) => p.iter().flat_map(Package::all_names).collect(),
            other => panic!("unexpected items {other:?}"),
        }
    }

    #[test]
    fn load_filters_by_profile() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("packages.yaml");
        fs::write(
            &path,
            "packages:\n  - name: vim\n  - name: docker\n    profiles: [work]\n  - name: steam\n    profiles: [gaming]\n",
        )
        .unwrap();
        let log = CaptureLog::default();
        let bp = load(
            &path,
            ProcessorKind::Packages,
            Format::Yaml,
            &json!({}),
            &s(&["work"]),
            &log,
        )
        .unwrap();
        assert_eq!(package_names(&bp), s(&["vim", "docker"]));
        assert_eq!(bp.declared_profiles, s(&["gaming", "work"]));
    }

    #[test]
    fn load_expands_imports_before_filtering() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("base.yaml"),
            "packages:\n  - name: git\n  - name: steam\n    profiles: [gaming]\n",
        )
        .unwrap();
        let path = tmp.path().join("packages.yaml");
        fs::write(&path, "packages:\n  - import: base.yaml\n  - name: tmux\n").unwrap();
        let log = CaptureLog::default();
        let bp = load(
            &path,
            ProcessorKind::Packages,
            Format::Yaml,
            &json!({}),
            &s(&["work"]),
            &log,
        )
        .unwrap();
        assert_eq!(package_names(&bp), s(&["git", "tmux"]));
    }

    #[test]
    fn load_renders_templates() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("packages.json");
        fs::write(&path, r#"{"packages": [{"name": "{{.UserDefined.editor}}"}]}"#).unwrap();
        let log = CaptureLog::default();
        let vars = json!({"UserDefined": {"editor": "neovim"}});
        let bp = load(&path, ProcessorKind::Packages, Format::Yaml, &vars, &[], &log).unwrap();
        assert_eq!(bp.format, Format::Json);
        assert_eq!(package_names(&bp), s(&["neovim"]));
    }

    #[test]
    fn template_syntax_error_aborts_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("packages.yaml");
        fs::write(&path, "packages:\n  - name: {{ .User.username\n").unwrap();
        let log = CaptureLog::default();
        let err = load(&path, ProcessorKind::Packages, Format::Yaml, &json!({}), &[], &log)
            .unwrap_err();
        assert!(matches!(err, RwrError::Template(TemplateError::Parse(_))));
    }

    #[test]
    fn wrong_item_shape_names_the_section() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("services.yaml");
        fs::write(&path, "services:\n  - name: sshd\n    action: explode\n").unwrap();
        let log = CaptureLog::default();
        let err = load(&path, ProcessorKind::Services, Format::Yaml, &json!({}), &[], &log)
            .unwrap_err();
        assert!(err.to_string().contains("'services'"));
    }

    #[test]
    fn missing_section_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bootstrap.yaml");
        fs::write(&path, "packages:\n  - name: git\n").unwrap();
        let log = CaptureLog::default();
        let doc = Document::read(&path, Format::Yaml, &json!({})).unwrap();
        assert!(doc.has_section(ProcessorKind::Packages));
        assert!(!doc.has_section(ProcessorKind::Users));
        let users = doc
            .section(ProcessorKind::Users, &json!({}), &[], &log)
            .unwrap();
        assert!(users.items.is_empty());
        assert_eq!(users.items.kind(), ProcessorKind::Users);
    }

    #[test]
    fn to_bytes_reencodes_in_source_format() {
        let bp = Blueprint {
            kind: ProcessorKind::Services,
            source: PathBuf::from("services.toml"),
            format: Format::Toml,
            items: Items::Services(vec![items::Service {
                name: "sshd".to_string(),
                ..items::Service::default()
            }]),
            declared_profiles: vec![],
        };
        let text = String::from_utf8(bp.to_bytes().unwrap()).unwrap();
        let decoded = Format::Toml.decode(&text).unwrap();
        assert_eq!(decoded["services"][0]["name"], json!("sshd"));
        assert_eq!(decoded["services"][0]["action"], json!("enable"));
    }

    #[test]
    fn empty_items_match_kind() {
        for kind in ProcessorKind::ALL {
            assert_eq!(Items::empty(kind).kind(), kind);
        }
    }
}
