//! Document formats shared by init files, blueprints and provider definitions.
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serialization format of a configuration document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// YAML (`.yaml`, `.yml`).
    #[default]
    #[serde(alias = "yml")]
    Yaml,
    /// JSON (`.json`).
    Json,
    /// TOML (`.toml`).
    Toml,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Format {
    /// Every supported format, in discovery order.
    pub const ALL: [Self; 3] = [Self::Yaml, Self::Json, Self::Toml];

    /// Lowercase name of the format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Toml => "toml",
        }
    }

    /// File extensions recognised for this format.
    #[must_use]
    pub const fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Yaml => &["yaml", "yml"],
            Self::Json => &["json"],
            Self::Toml => &["toml"],
        }
    }

    /// Infer the format from a path's extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.extensions().contains(&ext.as_str()))
    }

    /// Whether `path` carries one of this format's extensions.
    #[must_use]
    pub fn matches(self, path: &Path) -> bool {
        Self::from_path(path) == Some(self)
    }

    /// Decode text into a generic document tree.
    ///
    /// # Errors
    ///
    /// Returns the decoder message if the text is not valid in this format.
    pub fn decode(self, text: &str) -> Result<Value, String> {
        match self {
            Self::Yaml => {
                if text.trim().is_empty() {
                    return Ok(Value::Null);
                }
                serde_yaml_ng::from_str(text).map_err(|e| e.to_string())
            }
            Self::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
            Self::Toml => toml::from_str(text).map_err(|e| e.to_string()),
        }
    }

    /// Decode text straight into a typed value.
    ///
    /// # Errors
    ///
    /// Returns the decoder message if the text does not match `T`.
    pub fn decode_as<T: serde::de::DeserializeOwned>(self, text: &str) -> Result<T, String> {
        match self {
            Self::Yaml => serde_yaml_ng::from_str(text).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
            Self::Toml => toml::from_str(text).map_err(|e| e.to_string()),
        }
    }

    /// Encode a document tree in this format.
    ///
    /// Null values are dropped first since TOML has no representation for them.
    ///
    /// # Errors
    ///
    /// Returns the encoder message if the value cannot be represented.
    pub fn encode(self, value: &Value) -> Result<String, String> {
        match self {
            Self::Yaml => serde_yaml_ng::to_string(value).map_err(|e| e.to_string()),
            Self::Json => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
            Self::Toml => toml::to_string(&strip_nulls(value.clone())).map_err(|e| e.to_string()),
        }
    }
}

fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(strip_nulls)
                .collect(),
        ),
        other => other,
    }
}
