//! Spool command - stream one input into an encrypted item.
//!
//! Stands in for a multipart decoder handing a single part to the item
//! factory: the input is copied through the item's output stream, then the
//! item state is reported and optionally written back out in plaintext.
//!
//! # Examples
//!
//! ```bash
//! # Spool a file with a small threshold so it lands on disk
//! spoolcrypt spool ./photo.jpg --threshold 1024
//!
//! # Spool stdin, write the decrypted copy, report as JSON
//! echo hello | spoolcrypt spool - --output /tmp/hello.txt --json
//! ```

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use serde::Serialize;
use tracing::{info, instrument};

use spoolcrypt_core::{EncryptedItemFactory, FactoryConfig};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// File to spool, or `-` for stdin
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Plaintext bytes kept in memory before spilling to disk
    #[arg(long, value_name = "BYTES")]
    pub threshold: Option<usize>,

    /// Directory for spool files
    #[arg(long, value_name = "DIR")]
    pub repository: Option<PathBuf>,

    /// Form field name recorded on the item
    #[arg(long, default_value = "file")]
    pub field_name: String,

    /// Content type recorded on the item
    #[arg(long)]
    pub content_type: Option<String>,

    /// Client file name (defaults to the input's file name)
    #[arg(long)]
    pub file_name: Option<String>,

    /// Write the decrypted contents here after spooling
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// JSON output format for spool command
#[derive(Serialize)]
struct SpoolReport {
    field_name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    size: u64,
    in_memory: bool,
    charset: String,
    key_size: String,
    output: Option<String>,
}

#[instrument(level = "info", name = "cmd::spool", skip_all, fields(input = %args.input.display()))]
pub fn execute(mut config: FactoryConfig, args: &Args) -> Result<()> {
    if let Some(threshold) = args.threshold {
        config.size_threshold = threshold;
    }
    if let Some(ref repository) = args.repository {
        config.repository = Some(repository.clone());
    }
    let factory = EncryptedItemFactory::with_config(config);

    let from_stdin = args.input.as_os_str() == "-";
    let file_name = args.file_name.clone().or_else(|| {
        if from_stdin {
            None
        } else {
            args.input
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        }
    });

    let mut item = factory
        .create_item(
            &args.field_name,
            args.content_type.as_deref(),
            false,
            file_name.as_deref(),
        )
        .context("Failed to create item")?;

    let mut input = open_input(&args.input, from_stdin)?;
    let mut writer = item.output_stream().context("Failed to open item for writing")?;
    io::copy(&mut input, &mut writer).context("Failed to spool input")?;
    let written = writer.close().context("Failed to finish spooling")?;
    info!(bytes = written, in_memory = item.is_in_memory(), "Input spooled");

    if let Some(ref output) = args.output {
        item.write_to(output)
            .with_context(|| format!("Failed to write decrypted copy to {}", output.display()))?;
    }

    let report = SpoolReport {
        field_name: item.field_name().to_string(),
        file_name: item.file_name()?.map(str::to_string),
        content_type: item.content_type().map(str::to_string),
        size: item.size(),
        in_memory: item.is_in_memory(),
        charset: item.default_charset().to_string(),
        key_size: factory.key_size().to_string(),
        output: args.output.as_ref().map(|p| p.display().to_string()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("field:     {}", report.field_name);
        if let Some(ref name) = report.file_name {
            println!("file:      {name}");
        }
        if let Some(ref content_type) = report.content_type {
            println!("type:      {content_type}");
        }
        println!("size:      {} bytes", report.size);
        println!("storage:   {}", if report.in_memory { "memory" } else { "disk" });
        println!("charset:   {}", report.charset);
        println!("cipher:    {}", report.key_size);
        if let Some(ref output) = report.output {
            println!("output:    {output}");
        }
    }

    item.delete();
    Ok(())
}

fn open_input(path: &Path, from_stdin: bool) -> Result<Box<dyn Read>> {
    if from_stdin {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}
