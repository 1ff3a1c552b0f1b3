//! Domain-specific error types for the provisioning engine.
//!
//! Internal modules return typed errors (e.g. [`ProviderError`],
//! [`ImportError`]) while command handlers at the CLI boundary convert them
//! to [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! RwrError
//! ├── Config(ConfigError)      : init file discovery and decoding
//! ├── Provider(ProviderError)  : provider definitions and detection misses
//! ├── Blueprint(BlueprintError): blueprint decoding and location
//! ├── Import(ImportError)      : import expansion
//! ├── Template(TemplateError)  : template parse/render failures
//! ├── Git(GitError)            : blueprint git sourcing
//! └── Stage(StageError)        : a processor failed on a blueprint file
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the provisioning engine.
#[derive(Error, Debug)]
pub enum RwrError {
    /// Init file discovery or decoding error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Provider definition or detection error.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Blueprint decoding or location error.
    #[error("Blueprint error: {0}")]
    Blueprint(#[from] BlueprintError),

    /// Import expansion error.
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Template parse or render error.
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Git sourcing error.
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    /// A processor failed while applying a blueprint.
    #[error(transparent)]
    Stage(#[from] StageError),
}

/// Errors that arise while locating or decoding the init file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No init file was found in any searched location.
    #[error("no init file found (searched: {searched})")]
    InitNotFound {
        /// Human-readable list of the searched locations.
        searched: String,
    },

    /// The file extension does not map to a supported format.
    #[error("unsupported file extension for {0}")]
    UnsupportedExtension(PathBuf),

    /// The file could not be read.
    #[error("IO error reading {path}: {source}")]
    Io {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file content could not be decoded.
    #[error("invalid {format} in {path}: {message}")]
    Decode {
        /// Path of the malformed file.
        path: PathBuf,
        /// Format the file was decoded as.
        format: String,
        /// Decoder message.
        message: String,
    },
}

/// Errors that arise from provider definitions and provider detection.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// A definition file is malformed; the whole load is aborted.
    #[error("malformed provider definition {path}: {message}")]
    Malformed {
        /// Path (or embedded name) of the definition.
        path: String,
        /// Decoder message.
        message: String,
    },

    /// The providers directory could not be read.
    #[error("IO error reading providers from {path}: {source}")]
    Io {
        /// Directory or file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// No provider is available on this host.
    #[error("no package manager available on this system")]
    NoneAvailable,

    /// A named provider is not defined or not available.
    #[error("package manager '{0}' is not available")]
    NotAvailable(String),

    /// A named provider has no definition in the registry.
    #[error("package manager '{0}' has no provider definition")]
    Unknown(String),

    /// The provider does not define the requested command.
    #[error("package manager '{provider}' does not define a '{command}' command")]
    MissingCommand {
        /// Provider name.
        provider: String,
        /// Command name (install, remove, ...).
        command: &'static str,
    },
}

/// Errors that arise while locating, walking or decoding blueprints.
#[derive(Error, Debug)]
pub enum BlueprintError {
    /// The blueprint directory does not exist.
    #[error("blueprint location {0} does not exist")]
    MissingLocation(PathBuf),

    /// The blueprint directory exists but contains nothing.
    #[error("blueprint location {0} is empty")]
    EmptyLocation(PathBuf),

    /// A blueprint file could not be read.
    #[error("IO error reading {path}: {source}")]
    Io {
        /// Path to the blueprint.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A blueprint file could not be decoded.
    #[error("invalid {format} in {path}: {message}")]
    Decode {
        /// Path to the blueprint.
        path: PathBuf,
        /// Format the file was decoded as.
        format: String,
        /// Decoder message.
        message: String,
    },

    /// A blueprint section has the wrong shape for its processor.
    #[error("invalid '{key}' section in {path}: {message}")]
    Section {
        /// Path to the blueprint.
        path: PathBuf,
        /// Section key.
        key: String,
        /// Decoder message.
        message: String,
    },

    /// The file extension does not map to a supported format.
    #[error("unsupported blueprint extension: {0}")]
    UnsupportedExtension(PathBuf),
}

/// Errors that arise while expanding `import:` directives.
#[derive(Error, Debug)]
pub enum ImportError {
    /// The imported file does not exist or cannot be read.
    #[error("cannot read import {path} (from {from}): {source}")]
    Read {
        /// Resolved import path.
        path: PathBuf,
        /// File that declared the import.
        from: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The imported file could not be rendered or decoded.
    #[error("cannot parse import {path}: {message}")]
    Parse {
        /// Resolved import path.
        path: PathBuf,
        /// Decoder or template message.
        message: String,
    },

    /// An entry carries `import` next to item keys.
    #[error("malformed import in {from}: {entry} (only 'import' and 'format' are allowed)")]
    Malformed {
        /// File that declared the import.
        from: PathBuf,
        /// The offending entry.
        entry: String,
    },
}

/// Errors that arise from template resolution.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// The template text failed to parse; fatal for the blueprint.
    #[error("template syntax error: {0}")]
    Parse(String),

    /// Rendering failed for a reason other than a missing variable.
    #[error("template render error: {0}")]
    Render(String),
}

/// Errors that arise while sourcing blueprints from git.
#[derive(Error, Debug)]
pub enum GitError {
    /// Cloning the repository failed.
    #[error("failed to clone {url} into {path}: {message}")]
    Clone {
        /// Remote URL.
        url: String,
        /// Target directory.
        path: PathBuf,
        /// libgit2 message.
        message: String,
    },

    /// The existing checkout could not be opened or its remote updated.
    #[error("git repository at {path} is unusable: {message}")]
    Repository {
        /// Checkout directory.
        path: PathBuf,
        /// libgit2 message.
        message: String,
    },

    /// Pulling the latest changes failed.
    #[error("failed to pull {path}: {message}")]
    Pull {
        /// Checkout directory.
        path: PathBuf,
        /// Captured command output.
        message: String,
    },

    /// A non-repository occupant of the target path could not be removed.
    #[error("cannot replace non-repository directory {path}: {source}")]
    Occupied {
        /// Target directory.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The checkout target holds the init file and must not be replaced.
    #[error("refusing to replace {path}: it contains the init file {init}")]
    Protected {
        /// Target directory.
        path: PathBuf,
        /// Init file inside it.
        init: PathBuf,
    },
}

/// A processor failed on one blueprint file; aborts the whole run.
#[derive(Error, Debug)]
#[error("processor '{processor}' failed on {file}: {cause:#}")]
pub struct StageError {
    /// Processor name from the run order.
    pub processor: String,
    /// Blueprint file being processed.
    pub file: PathBuf,
    /// Underlying failure.
    pub cause: anyhow::Error,
}
