#![deny(unsafe_code)]

mod commands;
mod exit_code;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use spoolcrypt_core::{ConfigError, FactoryConfig, ItemError};

use crate::commands::{probe, spool};

/// Spool uploads through an encrypted, threshold-spilling buffer
#[derive(Parser)]
#[command(name = "spoolcrypt")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Spool a file and report where it ended up
    spoolcrypt spool ./photo.jpg --threshold 4096

    # Spool stdin and write the decrypted copy back out
    cat report.pdf | spoolcrypt spool - --file-name report.pdf --output /tmp/report.pdf

    # Show which key size items will use
    spoolcrypt probe
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Factory configuration file (TOML)
    #[arg(long, value_name = "FILE", env = "SPOOLCRYPT_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a file (or stdin) into an encrypted item
    Spool(spool::Args),

    /// Show the key size selected by the cipher probe
    Probe(probe::Args),
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(categorize_error(&e))
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => FactoryConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => FactoryConfig::default(),
    };

    match cli.command {
        Commands::Spool(args) => spool::execute(config, &args),
        Commands::Probe(args) => probe::execute(&config, &args),
    }
}

fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Map an error chain onto an exit code by downcasting to the typed errors
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if cause.downcast_ref::<ConfigError>().is_some() {
            return exit_code::CONFIG_ERROR;
        }

        if let Some(item_err) = cause.downcast_ref::<ItemError>() {
            if item_err.is_corruption() {
                return exit_code::CORRUPTED;
            }
            return match item_err {
                ItemError::KeyUnavailable { .. } | ItemError::CipherInit { .. } => {
                    exit_code::CRYPTO_UNAVAILABLE
                }
                ItemError::StorageIo { .. } | ItemError::WriteOut { .. } => exit_code::STORAGE_ERROR,
                ItemError::InvalidFileName { .. } => exit_code::GENERAL_ERROR,
                ItemError::ShortRead { .. } => exit_code::CORRUPTED,
            };
        }

        if cause.downcast_ref::<io::Error>().is_some() {
            return exit_code::STORAGE_ERROR;
        }
    }
    exit_code::GENERAL_ERROR
}
