mod error;
pub mod filler;
pub mod layout;
mod memory;
pub mod scanner;
mod traits;

pub use error::{CoreError, Result};
pub use filler::{Filler, RedactMode};
pub use layout::{Malformed, PeHeader, Probe};
pub use memory::MemoryStore;
pub use scanner::{
    DEFAULT_CHUNK_SIZE, RedactOptions, Redactor, ScanProgress, ScanReport, scan_and_redact,
};
pub use traits::{ByteStore, check_bounds};
