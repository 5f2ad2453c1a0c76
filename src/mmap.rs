//! Memory-mapped file I/O for the hot read/write paths of the pipeline.
//!
//! `memmap2` gives us the safe-ish wrapper the ecosystem reaches for instead
//! of hand-rolling `mmap`/`CreateFileMappingA` calls per platform. Zero-size
//! files and mapping failures are reported as "not open" rather than errors:
//! the caller falls back to streaming I/O in that case, matching the
//! behavior of a hand-rolled mmap wrapper that can't represent a `0`-length
//! mapping at all.

use memmap2::{Advice, Mmap, MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::Result;

/// Read-only mapping of an existing file.
pub struct MappedInput {
    mmap: Mmap,
}

impl MappedInput {
    /// Returns `Ok(None)` for a zero-length file or a failed mapping --
    /// neither is an error, both mean "go read this file the normal way".
    pub fn open(path: &Path) -> Result<Option<Self>> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            log::debug!("{}: zero-length file, skipping mmap", path.display());
            return Ok(None);
        }

        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(m) => m,
            Err(e) => {
                log::debug!("{}: mmap failed ({e}), falling back to streaming read", path.display());
                return Ok(None);
            }
        };

        if let Err(e) = mmap.advise(Advice::Sequential) {
            log::debug!("{}: madvise(SEQUENTIAL) failed ({e}), continuing anyway", path.display());
        }

        Ok(Some(Self { mmap }))
    }

    pub fn data(&self) -> &[u8] {
        &self.mmap
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

/// Writable mapping of a newly created file, reserved to `size` bytes.
/// `finish` truncates the file down to the number of bytes actually used.
pub struct MappedOutput {
    file: File,
    mmap: MmapMut,
    reserved: u64,
}

impl MappedOutput {
    /// Returns `Ok(None)` if the reservation or mapping fails (e.g. the
    /// filesystem can't grow the file to `size`); the caller falls back to
    /// a streaming writer in that case.
    pub fn create(path: &Path, size: u64) -> Result<Option<Self>> {
        if size == 0 {
            return Ok(None);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        if file.set_len(size).is_err() {
            return Ok(None);
        }

        let mmap = match unsafe { MmapOptions::new().len(size as usize).map_mut(&file) } {
            Ok(m) => m,
            Err(e) => {
                log::debug!("{}: writable mmap failed ({e})", path.display());
                let _ = std::fs::remove_file(path);
                return Ok(None);
            }
        };

        Ok(Some(Self {
            file,
            mmap,
            reserved: size,
        }))
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    pub fn reserved(&self) -> u64 {
        self.reserved
    }

    /// Flush the mapping and truncate the backing file down to
    /// `actual_size` bytes. Consumes `self` so the mapping is dropped
    /// before the truncate, matching the original's close-then-resize
    /// ordering.
    pub fn finish(self, actual_size: u64) -> Result<()> {
        self.mmap.flush()?;
        drop(self.mmap);
        if actual_size < self.reserved {
            self.file.set_len(actual_size)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_missing_is_err_not_panic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope.bin");
        assert!(MappedInput::open(&path).is_err());
    }

    #[test]
    fn zero_length_file_reports_not_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, []).unwrap();
        let mapped = MappedInput::open(&path).unwrap();
        assert!(mapped.is_none());
    }

    #[test]
    fn roundtrip_read_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let mut out = MappedOutput::create(&path, 64).unwrap().unwrap();
        out.data_mut()[..5].copy_from_slice(b"hello");
        out.finish(5).unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 5);

        let input = MappedInput::open(&path).unwrap().unwrap();
        assert_eq!(input.data(), b"hello");
    }
}
