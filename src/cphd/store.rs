//! Random-access byte stores over a CPHD file.
//!
//! Two strategies address the same bytes:
//! - [`MappedStore`] / [`MappedMutStore`] map the file once with `memmap2`
//! - [`FileStore`] seeks and reads (or writes) each span through a shared handle
//!
//! The strategy is chosen with [`AccessPolicy`]; both produce identical bytes.

use std::fmt::Debug;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use log::trace;
use memmap2::{Mmap, MmapMut};

use crate::cphd::types::error::{CphdError, Result};
use crate::cphd::types::models::AccessPolicy;

/// Read access to a fixed-length run of bytes.
pub trait ByteStore: Debug + Send + Sync {
    /// Total length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fills `buf` with the bytes starting at `offset`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;
}

/// Write access to a fixed-length run of bytes.
pub trait WritableStore: Debug + Send {
    fn len(&self) -> u64;

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Pushes pending writes to the file.
    fn flush(&mut self) -> Result<()>;
}

fn check_span(offset: u64, len: usize, total: u64) -> Result<()> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= total => Ok(()),
        _ => Err(CphdError::Format(format!(
            "Access of {} bytes at offset {} exceeds store length {}",
            len, offset, total
        ))),
    }
}

fn span(offset: u64, len: usize) -> Result<std::ops::Range<usize>> {
    let start = usize::try_from(offset)
        .map_err(|_| CphdError::Format(format!("Offset {} is not addressable", offset)))?;
    Ok(start..start + len)
}

/// Read-only memory mapping of a whole file.
#[derive(Debug)]
pub struct MappedStore {
    mmap: Mmap,
}

impl MappedStore {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the file is opened read-only and is not truncated while a reader holds it.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap })
    }
}

impl ByteStore for MappedStore {
    fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_span(offset, buf.len(), self.len())?;
        buf.copy_from_slice(&self.mmap[span(offset, buf.len())?]);
        Ok(())
    }
}

/// Writable memory mapping of a whole, already sized, file.
#[derive(Debug)]
pub struct MappedMutStore {
    mmap: MmapMut,
}

impl MappedMutStore {
    pub fn new(file: &File) -> Result<Self> {
        // SAFETY: the writer owns the file it created and does not resize it after mapping.
        let mmap = unsafe { MmapMut::map_mut(file)? };
        Ok(Self { mmap })
    }
}

impl WritableStore for MappedMutStore {
    fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        check_span(offset, data.len(), self.len())?;
        self.mmap[span(offset, data.len())?].copy_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.mmap.flush()?)
    }
}

/// Seek-and-read (or write) access through one file handle.
#[derive(Debug)]
pub struct FileStore {
    file: Mutex<File>,
    len: u64,
}

impl FileStore {
    pub fn open(path: &Path) -> Result<Self> {
        Self::new(File::open(path)?)
    }

    pub fn new(file: File) -> Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self { file: Mutex::new(file), len })
    }
}

impl ByteStore for FileStore {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_span(offset, buf.len(), self.len)?;
        let mut file = self.file.lock().map_err(|_| CphdError::LockPoisoned)?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }
}

impl WritableStore for FileStore {
    fn len(&self) -> u64 {
        self.len
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        check_span(offset, data.len(), self.len)?;
        let file = self.file.get_mut().map_err(|_| CphdError::LockPoisoned)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let file = self.file.get_mut().map_err(|_| CphdError::LockPoisoned)?;
        Ok(file.flush()?)
    }
}

/// Opens a read store over the whole file at `path`.
pub fn open_store(path: &Path, policy: AccessPolicy) -> Result<Arc<dyn ByteStore>> {
    trace!("Opening {:?} store over {}", policy, path.display());
    Ok(match policy {
        AccessPolicy::Mapped => Arc::new(MappedStore::open(path)?),
        AccessPolicy::Buffered => Arc::new(FileStore::open(path)?),
    })
}

/// Wraps a file that is already extended to its final size in a write store.
pub fn open_writable_store(file: File, policy: AccessPolicy) -> Result<Box<dyn WritableStore>> {
    Ok(match policy {
        AccessPolicy::Mapped => Box::new(MappedMutStore::new(&file)?),
        AccessPolicy::Buffered => Box::new(FileStore::new(file)?),
    })
}

/// A bounded window of a [`ByteStore`], such as one channel's signal array.
#[derive(Debug, Clone)]
pub struct Region {
    store: Arc<dyn ByteStore>,
    offset: u64,
    size: u64,
}

impl Region {
    /// Fails if the window does not lie within the store.
    pub fn new(store: Arc<dyn ByteStore>, offset: u64, size: u64) -> Result<Self> {
        match offset.checked_add(size) {
            Some(end) if end <= store.len() => Ok(Self { store, offset, size }),
            _ => Err(CphdError::Format(format!(
                "Region [{}, +{}) exceeds file length {}",
                offset,
                size,
                store.len()
            ))),
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Fills `buf` from `offset` bytes into the region.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_span(offset, buf.len(), self.size)?;
        trace!("Reading {} bytes at {}", buf.len(), self.offset + offset);
        self.store.read_at(self.offset + offset, buf)
    }

    pub fn read_vec(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read(offset, &mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scratch(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn both_policies_read_the_same_bytes() {
        let bytes: Vec<u8> = (0..=255u8).collect();
        let file = scratch(&bytes);
        for policy in [AccessPolicy::Mapped, AccessPolicy::Buffered] {
            let store = open_store(file.path(), policy).unwrap();
            assert_eq!(store.len(), 256);
            let region = Region::new(store, 16, 32).unwrap();
            assert_eq!(region.read_vec(4, 3).unwrap(), vec![20, 21, 22]);
            assert!(region.read_vec(30, 4).is_err());
        }
    }

    #[test]
    fn region_must_fit_in_store() {
        let file = scratch(&[0u8; 8]);
        let store = open_store(file.path(), AccessPolicy::Buffered).unwrap();
        assert!(matches!(Region::new(store, 4, 8), Err(CphdError::Format(_))));
    }

    #[test]
    fn both_policies_write_in_place() {
        for policy in [AccessPolicy::Mapped, AccessPolicy::Buffered] {
            let file = scratch(&[0u8; 16]);
            let handle = std::fs::OpenOptions::new().read(true).write(true).open(file.path()).unwrap();
            let mut store = open_writable_store(handle, policy).unwrap();
            store.write_at(10, &[7, 8, 9]).unwrap();
            assert!(store.write_at(15, &[1, 2]).is_err());
            store.flush().unwrap();
            drop(store);
            let written = std::fs::read(file.path()).unwrap();
            assert_eq!(&written[9..14], &[0, 7, 8, 9, 0]);
        }
    }
}
