//! CLI argument parsing using clap derive API
//!
//! Purely declarative; no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// tfprobe -- provision, verify and tear down infrastructure modules.
///
/// Use `tfprobe <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "tfprobe", version, about, long_about = None)]
pub struct Cli {
    /// Path to the tfprobe.toml suite file.
    #[arg(short, long, global = true, default_value = "tfprobe.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run test cases from the suite file.
    Run(RunArgs),

    /// Generate run identities.
    Id(IdArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- run ----

/// Run the configured cases: init, apply, verify, destroy.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run only the named case (repeatable). Runs every case by default.
    #[arg(long = "case", value_name = "NAME")]
    pub cases: Vec<String>,

    /// Reuse a fixed run identity (e.g. to reproduce a failed run).
    #[arg(long)]
    pub run_id: Option<String>,

    /// Write Prometheus text-format metrics to this file after the run.
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,
}

// ---- id ----

/// Print freshly generated run identities.
#[derive(Args, Debug)]
pub struct IdArgs {
    /// Number of identities to generate.
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: usize,

    /// Identity length (4..=32). Defaults to `identity.length` from the suite file.
    #[arg(long)]
    pub length: Option<usize>,
}

// ---- config ----

/// Manage tfprobe configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the suite file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, engine, bootstrap, identity, case).
        #[arg(long)]
        section: Option<String>,
    },
}
