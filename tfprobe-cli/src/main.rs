//! tfprobe CLI entry point.

mod cli;
mod commands;
mod error;
mod logging;
mod metrics_file;
mod output;

use std::process::ExitCode;

use clap::Parser;

use tfprobe_core::config::{GeneralConfig, ProbeConfig};

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // `config validate` reports load errors itself; the other commands
    // still get logging configured from defaults.
    let loaded = ProbeConfig::load(&cli.config).await;

    let mut general = loaded
        .as_ref()
        .map(|c| c.general.clone())
        .unwrap_or_else(|_| GeneralConfig::default());
    if let Some(level) = &cli.log_level {
        general.log_level = level.clone();
    }

    if let Err(e) = logging::init_tracing(&general) {
        eprintln!("error: {e}");
        return ExitCode::from(2);
    }

    let writer = OutputWriter::new(cli.output);

    let result: Result<(), CliError> = match cli.command {
        Commands::Run(args) => match loaded {
            Ok(config) => commands::run::execute(args, config, &cli.config, &writer).await,
            Err(e) => Err(e.into()),
        },
        Commands::Id(args) => commands::id::execute(args, loaded.as_ref().ok(), &writer),
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "tfprobe failed");
            eprintln!("error: {e}");
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}
