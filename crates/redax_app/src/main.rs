//! Redax - PE redaction for raw disk images
//!
//! Overwrites the code and data of every PE binary inside a `.dd` image in
//! place. No byte moves, so the image's file-system metadata stays valid.

mod engine;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use dialoguer::{Confirm, theme::ColorfulTheme};
use redax_core::{DEFAULT_CHUNK_SIZE, RedactMode, RedactOptions};
use redax_io::StoreBackend;
use std::path::{Path, PathBuf};
use tracing::Level;

const IMAGE_EXTENSION: &str = "dd";

#[derive(Parser, Debug)]
#[command(name = "redax")]
#[command(author, version, about, long_about = None)]
#[command(
    after_help = "The image is modified in place. A run that is killed leaves it partially redacted."
)]
struct Args {
    /// Raw disk image to redact (.dd)
    image: PathBuf,

    /// Overwrite with a single filler byte instead of the decorative pattern
    #[arg(long, default_value_t = false)]
    fast: bool,

    /// ASCII character written in --fast mode
    #[arg(long, default_value = "?", value_parser = parse_filler)]
    filler: u8,

    #[arg(long, value_enum, default_value_t = Backend::Auto)]
    backend: Backend,

    /// Scan window in KiB
    #[arg(long = "chunk-size", default_value_t = DEFAULT_CHUNK_SIZE / 1024)]
    chunk_size_kib: usize,

    /// Do not ask for confirmation before modifying the image
    #[arg(short = 'y', long, default_value_t = false)]
    yes: bool,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    Auto,
    Mmap,
    File,
}

impl From<Backend> for StoreBackend {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Auto => StoreBackend::Auto,
            Backend::Mmap => StoreBackend::Mmap,
            Backend::File => StoreBackend::File,
        }
    }
}

impl Args {
    fn redact_options(&self) -> RedactOptions {
        RedactOptions {
            mode: if self.fast {
                RedactMode::Fast
            } else {
                RedactMode::Patterned
            },
            fast_filler: self.filler,
            chunk_size: self.chunk_size_kib.saturating_mul(1024),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    validate_image_path(&args.image)?;

    if !args.yes && !confirm(&args.image)? {
        println!("\nOperation cancelled.");
        return Ok(());
    }

    let options = args.redact_options();
    engine::run_redaction(&args.image, args.backend.into(), &options)?;

    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn validate_image_path(path: &Path) -> Result<()> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(IMAGE_EXTENSION) => Ok(()),
        _ => bail!(
            "You need to use this on a raw disk image (.{} file): {}",
            IMAGE_EXTENSION,
            path.display()
        ),
    }
}

fn parse_filler(value: &str) -> std::result::Result<u8, String> {
    match value.as_bytes() {
        [byte] if byte.is_ascii() => Ok(*byte),
        _ => Err(format!("filler must be a single ASCII character, got {:?}", value)),
    }
}

fn confirm(image: &Path) -> Result<bool> {
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "Overwrite the sections of every PE file in {}? This cannot be undone",
            image.display()
        ))
        .default(false)
        .interact()
        .context("Failed to confirm")
}
