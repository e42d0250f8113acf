//! Byte store for image files accessed through positioned reads and writes.

use redax_core::{ByteStore, CoreError, Result, check_bounds};
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A read-write byte store backed by a regular file handle.
///
/// Used when the image cannot be memory-mapped (for example when it does
/// not fit in the address space). Writes go straight to the file and never
/// extend it.
///
/// # Example
///
/// ```ignore
/// use redax_io::FileStore;
/// use redax_core::ByteStore;
///
/// let mut store = FileStore::open("evidence.dd")?;
/// let mut sector = vec![0u8; 512];
/// let bytes_read = store.read_at(0, &mut sector)?;
/// ```
#[derive(Debug)]
pub struct FileStore {
    file: File,
    size: u64,
}

impl FileStore {
    /// Opens `path` for reading and in-place writing.
    ///
    /// # Returns
    ///
    /// An error if:
    /// - The file does not exist ([`CoreError::NotFound`])
    /// - Permission is denied ([`CoreError::PermissionDenied`])
    /// - The file is empty ([`CoreError::EmptyStore`])
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let display = path_ref.display().to_string();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path_ref)
            .map_err(|e| CoreError::from_open(&display, e))?;

        #[cfg(target_os = "linux")]
        {
            use rustix::fs::{Advice, fadvise};

            let _ = fadvise(&file, 0, None, Advice::Sequential);
        }

        let size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        if size == 0 {
            return Err(CoreError::EmptyStore(display));
        }

        Ok(Self { file, size })
    }
}

impl ByteStore for FileStore {
    fn len(&self) -> u64 {
        self.size
    }

    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        if offset >= self.size {
            return Ok(0);
        }
        let file = &mut self.file;
        retry_interrupted(|| {
            file.seek(SeekFrom::Start(offset))?;
            file.read(buffer)
        })
        .map_err(|source| CoreError::Read { offset, source })
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        check_bounds(offset, data.len(), self.size)?;
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.write_all(data))
            .map_err(|source| CoreError::Write { offset, source })
    }

    fn flush(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}

/// Repeats `op` for as long as it fails with [`ErrorKind::Interrupted`].
fn retry_interrupted<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match op() {
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_file_store_basic() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let test_data = b"Hello, World! This is test data for FileStore.";
        temp_file.write_all(test_data).unwrap();
        temp_file.flush().unwrap();
        let mut store = FileStore::open(temp_file.path()).unwrap();

        assert_eq!(store.len(), test_data.len() as u64);

        let mut buffer = vec![0u8; 13];
        let bytes_read = store.read_at(0, &mut buffer).unwrap();
        assert_eq!(bytes_read, 13);
        assert_eq!(&buffer, b"Hello, World!");

        let mut buffer = vec![0u8; 4];
        let bytes_read = store.read_at(7, &mut buffer).unwrap();
        assert_eq!(bytes_read, 4);
        assert_eq!(&buffer, b"Worl");
    }

    #[test]
    fn test_file_store_read_beyond_end() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"Short").unwrap();
        temp_file.flush().unwrap();

        let mut store = FileStore::open(temp_file.path()).unwrap();

        let mut buffer = vec![0u8; 100];
        assert_eq!(store.read_at(0, &mut buffer).unwrap(), 5);
        assert_eq!(store.read_at(5, &mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_file_store_write_keeps_length() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(&[0u8; 64]).unwrap();
        temp_file.flush().unwrap();

        let mut store = FileStore::open(temp_file.path()).unwrap();
        store.write_at(60, b"abcd").unwrap();
        assert!(store.write_at(62, b"abcd").is_err());
        store.flush().unwrap();

        let data = std::fs::read(temp_file.path()).unwrap();
        assert_eq!(data.len(), 64);
        assert_eq!(&data[60..], b"abcd");
    }

    #[test]
    fn test_interrupted_read_is_retried() {
        let mut attempts = 0;
        let result = retry_interrupted(|| {
            attempts += 1;
            if attempts < 3 {
                Err(io::Error::from(ErrorKind::Interrupted))
            } else {
                Ok(attempts)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_other_errors_are_not_retried() {
        let mut attempts = 0;
        let result: io::Result<()> = retry_interrupted(|| {
            attempts += 1;
            Err(io::Error::from(ErrorKind::UnexpectedEof))
        });
        assert_eq!(result.unwrap_err().kind(), ErrorKind::UnexpectedEof);
        assert_eq!(attempts, 1);
    }

    #[test]
    fn test_file_store_missing_file() {
        let result = FileStore::open("/nonexistent/image.dd");
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }
}
