use anyhow::Result;
use clap::Args as ClapArgs;
use serde::Serialize;
use tracing::instrument;

use spoolcrypt_core::{FactoryConfig, KeySize};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ProbeReport {
    key_size: KeySize,
    key_bits: usize,
    /// `true` when the size comes from configuration rather than the probe
    configured: bool,
}

#[instrument(level = "info", name = "cmd::probe", skip_all)]
pub fn execute(config: &FactoryConfig, args: &Args) -> Result<()> {
    let key_size = config.key_size.unwrap_or_else(KeySize::probe);
    let report = ProbeReport {
        key_size,
        key_bits: key_size.bits(),
        configured: config.key_size.is_some(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.configured {
        println!("{key_size} (configured)");
    } else {
        println!("{key_size}");
    }
    Ok(())
}
