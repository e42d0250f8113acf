use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Image is empty: {0}")]
    EmptyStore(String),

    #[error("Read error at offset {offset}: {source}")]
    Read {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("Write error at offset {offset}: {source}")]
    Write {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("Range {offset}+{len} is out of bounds (size: {size})")]
    OutOfBounds { offset: u64, len: u64, size: u64 },
}

impl CoreError {
    /// Maps an open failure to the matching variant so callers can tell a
    /// missing image apart from other I/O failures.
    pub fn from_open(path: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_string()),
            _ => Self::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
