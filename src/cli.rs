use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI entry point for the provisioning engine.
#[derive(Parser, Debug)]
#[command(
    name = "rwr",
    about = "Declarative system provisioning from blueprint files",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Init file, or a directory containing one
    #[arg(long, global = true)]
    pub init_file: Option<PathBuf>,

    /// Active profiles (comma-separated, repeatable)
    #[arg(short, long = "profile", value_delimiter = ',', global = true)]
    pub profiles: Vec<String>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Allow processors to prompt
    #[arg(long, global = true)]
    pub interactive: bool,

    /// Run the bootstrap blueprint even if it already ran
    #[arg(long, global = true)]
    pub force_bootstrap: bool,

    /// Preview changes without applying
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Directory of provider definitions
    #[arg(long, global = true)]
    pub providers_dir: Option<PathBuf>,

    /// Default package manager
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Directory holding the bootstrap sentinel
    #[arg(long, global = true)]
    pub run_once_dir: Option<PathBuf>,

    /// Kill external commands running longer than this many seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply every blueprint in run order
    All,
    /// List detected package managers and their commands
    Providers,
    /// List profiles declared across the blueprints
    Profiles,
    /// Print version information
    Version,
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

impl Command {
    /// Name used for the log file.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Providers => "providers",
            Self::Profiles => "profiles",
            Self::Version => "version",
            Self::Completions { .. } => "completions",
        }
    }
}
