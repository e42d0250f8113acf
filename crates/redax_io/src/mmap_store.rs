use memmap2::MmapMut;
use redax_core::{ByteStore, CoreError, Result, check_bounds};
use std::fs::OpenOptions;
use std::path::Path;

/// A writable memory mapping over a whole image file.
#[derive(Debug)]
pub struct MmapStore {
    mmap: MmapMut,
    size: u64,
}

impl MmapStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let display = path_ref.display().to_string();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path_ref)
            .map_err(|e| CoreError::from_open(&display, e))?;

        let size = file.metadata()?.len();
        if size == 0 {
            return Err(CoreError::EmptyStore(display));
        }

        let mmap = unsafe { MmapMut::map_mut(&file) }?;

        if mmap.is_empty() {
            return Err(CoreError::EmptyStore(display));
        }

        #[cfg(target_os = "linux")]
        {
            use memmap2::Advice;
            let _ = mmap.advise(Advice::Sequential);
        }

        Ok(Self { mmap, size })
    }

    #[inline]
    pub fn slice(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(offset).ok()?;
        if start >= self.mmap.len() {
            return None;
        }
        let end = start.saturating_add(len).min(self.mmap.len());
        Some(&self.mmap[start..end])
    }
}

impl ByteStore for MmapStore {
    fn len(&self) -> u64 {
        self.size
    }

    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        if let Some(slice) = self.slice(offset, buffer.len()) {
            let len = slice.len();
            buffer[..len].copy_from_slice(slice);
            Ok(len)
        } else {
            Ok(0)
        }
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        check_bounds(offset, data.len(), self.size)?;
        let start = offset as usize;
        self.mmap[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }
}
