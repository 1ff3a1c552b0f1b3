use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::{CommandFactory as _, Parser as _};

use rwr::logging::Log as _;
use rwr::{cli, commands, logging};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();

    match args.command {
        cli::Command::Version => {
            commands::version::run();
            return Ok(());
        }
        cli::Command::Completions { shell } => {
            clap_complete::generate(shell, &mut cli::Cli::command(), "rwr", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    logging::init_subscriber(args.global.debug, args.command.name());
    let log = Arc::new(logging::Logger::new(args.command.name()));

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        log.warn(&format!("cannot install Ctrl-C handler: {e}"));
    }

    match args.command {
        cli::Command::All => commands::all::run(&args.global, &log, cancel),
        cli::Command::Providers => commands::providers::run(&args.global, &log, cancel),
        cli::Command::Profiles => commands::profiles::run(&args.global, &log, cancel),
        cli::Command::Version | cli::Command::Completions { .. } => Ok(()),
    }
}
