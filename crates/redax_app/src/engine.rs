use anyhow::Context;
use chrono::Local;
use humansize::{BINARY, format_size};
use indicatif::{ProgressBar, ProgressStyle};
use redax_core::{ByteStore, RedactOptions, Redactor, ScanProgress, ScanReport};
use redax_io::{StoreBackend, open_store};
use std::cell::RefCell;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::info;

const MILESTONES: [u8; 3] = [25, 50, 75];
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub type EngineResult<T> = anyhow::Result<T>;

/// Tracks which progress milestones have already been announced.
#[derive(Debug, Default)]
struct Milestones {
    next: usize,
}

impl Milestones {
    /// Returns every milestone newly passed by `fraction`, lowest first.
    fn crossed(&mut self, fraction: f64) -> Vec<u8> {
        let percent = fraction * 100.0;
        let mut passed = Vec::new();
        while let Some(&milestone) = MILESTONES.get(self.next) {
            if percent <= f64::from(milestone) {
                break;
            }
            passed.push(milestone);
            self.next += 1;
        }
        passed
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

pub fn run_redaction(
    image: &Path,
    backend: StoreBackend,
    options: &RedactOptions,
) -> EngineResult<ScanReport> {
    let mut store = open_store(image, backend)
        .with_context(|| format!("Failed to open image: {}", image.display()))?;
    let image_size = store.len();

    println!(
        "Redacting all PE files in: {} ({})",
        image.display(),
        format_size(image_size, BINARY)
    );
    println!(
        "Mode: {:?} | Backend: {}",
        options.mode,
        if store.is_mmap() { "mmap" } else { "file I/O" }
    );
    println!("Started: {}", Local::now().format(TIMESTAMP_FORMAT));
    println!();

    let start_time = Instant::now();

    let pb = ProgressBar::new(image_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:50.cyan/blue}] {bytes}/{total_bytes} {msg} ({eta})")
            .context("invalid progress bar template")?
            .progress_chars("##-"),
    );

    let milestones = RefCell::new(Milestones::default());
    let on_progress = |progress: &ScanProgress| {
        pb.set_position(progress.position);
        pb.set_message(format!("{} PE files", progress.pe_files));

        for percent in milestones.borrow_mut().crossed(progress.fraction()) {
            let elapsed = format_elapsed(start_time.elapsed());
            pb.suspend(|| info!(percent, %elapsed, "{}% done", percent));
        }
    };

    let report = Redactor::new(options)
        .with_progress(&on_progress)
        .run(&mut store)
        .with_context(|| format!("Redaction of {} aborted", image.display()))?;

    pb.finish_and_clear();

    let elapsed = start_time.elapsed();

    println!("Finished: {}", Local::now().format(TIMESTAMP_FORMAT));
    println!("\n╔════════════════════════════════════════╗");
    println!("║       === Redaction Finished ===       ║");
    println!("╠════════════════════════════════════════╣");
    println!("║ Elapsed Time:       {:>18} ║", format_elapsed(elapsed));
    println!(
        "║ Image Size:         {:>18} ║",
        format_size(image_size, BINARY)
    );
    println!("║ MZ Signatures:      {:>18} ║", report.mz_hits);
    println!("║ PE Files Redacted:  {:>18} ║", report.redacted);
    println!("║ Corrupt PE Files:   {:>18} ║", report.corrupt);
    println!("║ Malformed Headers:  {:>18} ║", report.malformed);
    println!(
        "║ Bytes Overwritten:  {:>18} ║",
        format_size(report.bytes_redacted, BINARY)
    );
    println!("╚════════════════════════════════════════╝");

    if report.corrupt > 0 {
        println!("\nCorrupt PE files carry the DOS stub message but no \"PE\" signature.");
    }

    Ok(report)
}
