mod file_store;
mod mmap_store;

pub use file_store::FileStore;
pub use mmap_store::MmapStore;

use redax_core::{ByteStore, CoreError, Result};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// Memory-map the image, falling back to file I/O when mapping fails.
    #[default]
    Auto,
    Mmap,
    File,
}

#[derive(Debug)]
pub enum Store {
    Mmap(MmapStore),
    File(FileStore),
}

impl Store {
    #[inline]
    pub fn is_mmap(&self) -> bool {
        matches!(self, Store::Mmap(_))
    }
}

impl ByteStore for Store {
    fn len(&self) -> u64 {
        match self {
            Store::Mmap(s) => s.len(),
            Store::File(s) => s.len(),
        }
    }

    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        match self {
            Store::Mmap(s) => s.read_at(offset, buffer),
            Store::File(s) => s.read_at(offset, buffer),
        }
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        match self {
            Store::Mmap(s) => s.write_at(offset, data),
            Store::File(s) => s.write_at(offset, data),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self {
            Store::Mmap(s) => s.flush(),
            Store::File(s) => s.flush(),
        }
    }
}

/// Opens an image with the requested backend.
///
/// `Auto` falls back to file I/O only when the mapping itself fails; a
/// missing, unreadable or empty image is reported as is.
pub fn open_store(path: impl AsRef<Path>, backend: StoreBackend) -> Result<Store> {
    let path_ref = path.as_ref();
    match backend {
        StoreBackend::Mmap => Ok(Store::Mmap(MmapStore::open(path_ref)?)),
        StoreBackend::File => Ok(Store::File(FileStore::open(path_ref)?)),
        StoreBackend::Auto => match MmapStore::open(path_ref) {
            Ok(s) => Ok(Store::Mmap(s)),
            Err(
                e @ (CoreError::NotFound(_)
                | CoreError::PermissionDenied(_)
                | CoreError::EmptyStore(_)),
            ) => Err(e),
            Err(e) => {
                debug!(error = %e, "memory mapping failed, using file I/O");
                Ok(Store::File(FileStore::open(path_ref)?))
            }
        },
    }
}
