//! Single-pass scan that redacts every embedded PE image in place.
//!
//! The cursor walks the store one offset at a time looking for `MZ`. Each
//! candidate is probed (see [`layout::probe`](crate::layout::probe)); a
//! redactable image has its code and initialized data overwritten and the
//! cursor jumps to the first byte after the overwritten range. Every other
//! outcome resumes one byte past the match.

use std::io;

use memchr::memmem::Finder;
use tracing::{debug, info, trace, warn};

use crate::error::{CoreError, Result};
use crate::filler::{DEFAULT_FAST_FILLER, Filler, RedactMode};
use crate::layout::{MZ_SIGNATURE, Probe, probe};
use crate::traits::ByteStore;

pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;
const MIN_CHUNK_SIZE: usize = MZ_SIGNATURE.len();

#[derive(Debug, Clone)]
pub struct RedactOptions {
    pub mode: RedactMode,
    /// Byte written in [`RedactMode::Fast`].
    pub fast_filler: u8,
    /// Size of the read window used while searching for `MZ`.
    pub chunk_size: usize,
}

impl Default for RedactOptions {
    fn default() -> Self {
        Self {
            mode: RedactMode::default(),
            fast_filler: DEFAULT_FAST_FILLER,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Counters produced by one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// `MZ` signatures seen by the cursor.
    pub mz_hits: u64,
    /// Candidates with a DOS stub and a valid `PE` signature.
    pub pe_files: u64,
    /// Candidates with a DOS stub but no `PE` signature behind `e_lfanew`.
    pub corrupt: u64,
    /// PE files left untouched because their geometry was unusable.
    pub malformed: u64,
    /// PE files whose section data was overwritten.
    pub redacted: u64,
    pub bytes_redacted: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    pub total_bytes: u64,
    pub position: u64,
    pub mz_hits: u64,
    pub pe_files: u64,
}

impl ScanProgress {
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.position as f64 / self.total_bytes as f64
        }
    }
}

pub type ProgressCallback<'a> = &'a dyn Fn(&ScanProgress);

/// Bytes of the store currently held for the `MZ` search.
struct ScanWindow {
    start: u64,
    data: Vec<u8>,
    capacity: usize,
}

impl ScanWindow {
    fn new(capacity: usize) -> Self {
        Self {
            start: 0,
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    fn end(&self) -> u64 {
        self.start + self.data.len() as u64
    }

    #[inline]
    fn covers(&self, offset: u64, len: u64) -> bool {
        offset >= self.start && offset + len <= self.end()
    }

    fn load<S: ByteStore + ?Sized>(&mut self, store: &mut S, offset: u64) -> Result<()> {
        let remaining = store.len().saturating_sub(offset);
        let len = remaining.min(self.capacity as u64) as usize;
        self.data.resize(len, 0);
        if !store.read_exact_at(offset, &mut self.data)? {
            self.invalidate();
            return Err(CoreError::Read {
                offset,
                source: io::Error::from(io::ErrorKind::UnexpectedEof),
            });
        }
        self.start = offset;
        Ok(())
    }

    fn invalidate(&mut self) {
        self.start = 0;
        self.data.clear();
    }
}

/// Scans a byte store and overwrites the section data of every PE image.
pub struct Redactor<'a> {
    chunk_size: usize,
    filler: Filler,
    finder: Finder<'static>,
    progress: Option<ProgressCallback<'a>>,
}

impl<'a> Redactor<'a> {
    #[must_use]
    pub fn new(options: &RedactOptions) -> Self {
        Self {
            chunk_size: options.chunk_size.max(MIN_CHUNK_SIZE),
            filler: Filler::new(options.mode, options.fast_filler),
            finder: Finder::new(MZ_SIGNATURE),
            progress: None,
        }
    }

    /// Reports progress once per scan window and after every redaction.
    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback<'a>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Runs the scan to the end of `store`.
    ///
    /// Any read, write or flush failure aborts the scan; the counters
    /// gathered up to that point are dropped and the error carries the
    /// failing offset where one is known.
    pub fn run<S: ByteStore + ?Sized>(&mut self, store: &mut S) -> Result<ScanReport> {
        let size = store.len();
        let mut report = ScanReport::default();
        let mut window = ScanWindow::new(self.chunk_size);
        let mut cursor = 0u64;

        info!(size, mode = ?self.filler.mode(), "starting PE redaction scan");

        while cursor < size {
            let Some(hit) = self.next_signature(store, &mut window, cursor, &report)? else {
                break;
            };
            report.mz_hits += 1;

            cursor = match probe(store, hit)? {
                Probe::NoStub => {
                    trace!(offset = hit, "MZ without DOS stub");
                    hit + 1
                }
                Probe::Corrupt => {
                    report.corrupt += 1;
                    debug!(offset = hit, "DOS stub without PE signature");
                    hit + 1
                }
                Probe::Malformed(reason) => {
                    report.pe_files += 1;
                    report.malformed += 1;
                    warn!(offset = hit, %reason, "skipping PE file with malformed header");
                    hit + 1
                }
                Probe::Redactable { header, range } => {
                    report.pe_files += 1;
                    let len = range.end - range.start;
                    debug!(
                        offset = hit,
                        pe_header = header.offset,
                        start = range.start,
                        len,
                        "redacting PE sections"
                    );
                    self.filler.fill(store, range.start, len)?;
                    report.redacted += 1;
                    report.bytes_redacted += len;
                    window.invalidate();
                    self.notify(size, range.end, &report);
                    range.end
                }
            };
        }

        store.flush()?;
        self.notify(size, size, &report);

        info!(
            mz_hits = report.mz_hits,
            pe_files = report.pe_files,
            corrupt = report.corrupt,
            malformed = report.malformed,
            bytes_redacted = report.bytes_redacted,
            "PE redaction scan finished"
        );

        Ok(report)
    }

    /// Returns the offset of the next `MZ` at or after `from`.
    fn next_signature<S: ByteStore + ?Sized>(
        &self,
        store: &mut S,
        window: &mut ScanWindow,
        mut from: u64,
        report: &ScanReport,
    ) -> Result<Option<u64>> {
        let size = store.len();
        let needle = MZ_SIGNATURE.len() as u64;

        loop {
            if from.saturating_add(needle) > size {
                return Ok(None);
            }

            if !window.covers(from, needle) {
                window.load(store, from)?;
                self.notify(size, from, report);
            }

            let rel = (from - window.start) as usize;
            if let Some(pos) = self.finder.find(&window.data[rel..]) {
                return Ok(Some(from + pos as u64));
            }

            // The last byte may be the `M` of a signature split across windows.
            from = window.end() - 1;
            if window.end() >= size {
                return Ok(None);
            }
        }
    }

    fn notify(&self, total_bytes: u64, position: u64, report: &ScanReport) {
        if let Some(callback) = self.progress {
            callback(&ScanProgress {
                total_bytes,
                position,
                mz_hits: report.mz_hits,
                pe_files: report.pe_files,
            });
        }
    }
}

/// Scans `store` with `options` and redacts every PE image found.
pub fn scan_and_redact<S: ByteStore + ?Sized>(
    store: &mut S,
    options: &RedactOptions,
) -> Result<ScanReport> {
    Redactor::new(options).run(store)
}
