//! The byte store port the redactor runs against.
//!
//! The scanner never sees files or devices, only a fixed-length sequence of
//! bytes with random-access reads and in-place writes. Adapters for real
//! images live in `redax_io`; [`MemoryStore`](crate::MemoryStore) covers
//! tests and small inputs.

use crate::error::Result;

/// A fixed-length, randomly addressable byte sequence (typically a raw disk
/// image) that can be overwritten in place.
///
/// Implementations must never change the length of the underlying store.
///
/// # Example
///
/// ```ignore
/// struct ImageFile { /* ... */ }
///
/// impl ByteStore for ImageFile {
///     fn len(&self) -> u64 { /* total size in bytes */ }
///     fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> { /* ... */ }
///     fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> { /* ... */ }
///     fn flush(&mut self) -> Result<()> { Ok(()) }
/// }
/// ```
pub trait ByteStore {
    /// Returns the total size of the store in bytes.
    fn len(&self) -> u64;

    /// Returns `true` when the store holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads bytes starting at `offset` into `buffer`.
    ///
    /// # Returns
    ///
    /// The number of bytes actually read, which is less than `buffer.len()`
    /// when the end of the store is reached and `0` when `offset >= len()`.
    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize>;

    /// Overwrites `data.len()` bytes starting at `offset`.
    ///
    /// The whole range must lie inside `0..len()`; otherwise
    /// [`CoreError::OutOfBounds`](crate::CoreError::OutOfBounds) is returned
    /// and nothing is written.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Pushes pending writes down to the backing storage.
    fn flush(&mut self) -> Result<()>;

    /// Fills `buffer` completely or reports `false` when the store ends first.
    fn read_exact_at(&mut self, offset: u64, buffer: &mut [u8]) -> Result<bool> {
        let mut filled = 0;
        while filled < buffer.len() {
            let n = self.read_at(offset + filled as u64, &mut buffer[filled..])?;
            if n == 0 {
                return Ok(false);
            }
            filled += n;
        }
        Ok(true)
    }
}

impl<S: ByteStore + ?Sized> ByteStore for &mut S {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        (**self).read_at(offset, buffer)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        (**self).write_at(offset, data)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

impl<S: ByteStore + ?Sized> ByteStore for Box<S> {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        (**self).read_at(offset, buffer)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        (**self).write_at(offset, data)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Checks that `offset..offset + len` lies inside a store of `size` bytes.
pub fn check_bounds(offset: u64, len: usize, size: u64) -> Result<()> {
    let len = len as u64;
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(crate::CoreError::OutOfBounds { offset, len, size }),
    }
}
