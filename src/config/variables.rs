//! Template variables exposed to blueprint authors.
//!
//! Blueprints see four namespaces: `User`, `System`, `Flags` and
//! `UserDefined`. Keys inside the first three are camelCase
//! (`User.fullName`, `System.osFamily`, `Flags.dryRun`).
use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::exec::Executor;
use crate::platform::Platform;

/// Prefix of environment variables copied into `UserDefined`.
pub const ENV_PREFIX: &str = "RWR_";

/// Facts about the invoking user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserVariables {
    /// Login name.
    pub username: String,
    /// Home directory.
    pub home: String,
    /// Login shell (`$SHELL`, or `%COMSPEC%` on Windows).
    pub shell: String,
    /// Real name from the account database.
    pub full_name: String,
    /// First word of the real name.
    pub first_name: String,
    /// Remaining words of the real name.
    pub last_name: String,
    /// Primary group name.
    pub group_name: String,
}

impl UserVariables {
    /// Gather user facts from the account database and environment.
    ///
    /// The primary group comes from `id -gn`; it is left empty on Windows or
    /// when the lookup fails.
    #[must_use]
    pub fn detect(executor: &dyn Executor) -> Self {
        let full_name = whoami::realname();
        let (first_name, last_name) = split_name(&full_name);
        let shell = std::env::var("SHELL")
            .or_else(|_| std::env::var("COMSPEC"))
            .unwrap_or_default();
        let group_name = if cfg!(target_os = "windows") {
            String::new()
        } else {
            executor
                .run_unchecked("id", &["-gn"])
                .ok()
                .filter(|r| r.success)
                .map(|r| r.stdout.trim().to_string())
                .unwrap_or_default()
        };
        Self {
            username: whoami::username(),
            home: super::home_dir()
                .map(|h| h.display().to_string())
                .unwrap_or_default(),
            shell,
            full_name: full_name.clone(),
            first_name,
            last_name,
            group_name,
        }
    }
}

fn split_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

/// Facts about the host system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemVariables {
    /// Operating system (`linux`, `macos`, `windows`).
    pub os: String,
    /// Distribution family (`debian`, `arch`, ...), or the OS name.
    pub os_family: String,
    /// Distribution or OS version.
    pub os_version: String,
    /// CPU architecture.
    pub os_arch: String,
}

impl From<&Platform> for SystemVariables {
    fn from(platform: &Platform) -> Self {
        Self {
            os: platform.os.to_string(),
            os_family: platform.family(),
            os_version: platform.version.clone(),
            os_arch: platform.arch.clone(),
        }
    }
}

/// Command-line switches visible to templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagVariables {
    /// `--debug`
    pub debug: bool,
    /// `--interactive`
    pub interactive: bool,
    /// Active profiles.
    pub profiles: Vec<String>,
    /// `--force-bootstrap`
    pub force_bootstrap: bool,
    /// `--dry-run`
    pub dry_run: bool,
}

/// The complete template data set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Variables {
    /// `User.*`
    pub user: UserVariables,
    /// `System.*`
    pub system: SystemVariables,
    /// `Flags.*`
    pub flags: FlagVariables,
    /// `UserDefined.*`: init `variables:` merged with `RWR_*` environment.
    pub user_defined: BTreeMap<String, Value>,
}

impl Variables {
    /// Merge declared variables with `RWR_*` environment variables.
    ///
    /// The prefix is stripped from environment keys; environment values win
    /// over declared ones.
    #[must_use]
    pub fn with_user_defined<I>(mut self, declared: &BTreeMap<String, Value>, env: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.user_defined.extend(declared.clone());
        for (key, value) in env {
            if let Some(name) = key.strip_prefix(ENV_PREFIX)
                && !name.is_empty()
            {
                self.user_defined
                    .insert(name.to_string(), Value::String(value));
            }
        }
        self
    }

    /// Template context as a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
