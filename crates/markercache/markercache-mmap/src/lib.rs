//! Thin ownership wrapper around a memory-mapped file used as the marker
//! cache's shared-memory arena.
//!
//! A mapped region has no notion of "the creating process"; ownership here
//! just means "this struct's `Drop` unmaps the region and closes the file
//! handle". Removing the backing file on shutdown is the caller's job
//! (`markercache-core` does it for the owning producer only).

use memmap2::{Mmap, MmapMut};
use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
};

/// A read-write mapping, used by the single producer that owns the arena.
#[derive(Debug)]
pub struct ArenaMut {
    /// File handle kept alive to maintain the memory map validity.
    _file: File,
    mmap: MmapMut,
}

/// A read-only mapping, used by consumers.
#[derive(Debug)]
pub struct Arena {
    /// File handle kept alive to maintain the memory map validity.
    _file: File,
    mmap: Mmap,
}

impl ArenaMut {
    /// Creates a new backing file of exactly `size_bytes` and maps it
    /// read-write. Fails with `ErrorKind::AlreadyExists` if the path already
    /// exists; callers that want "create or recreate" semantics must remove
    /// a stale path themselves first, via [`remove_stale`].
    pub fn create_exclusive<P: AsRef<Path>>(path: P, size_bytes: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)?;
        file.set_len(size_bytes)?;

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { _file: file, mmap })
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl Arena {
    /// Opens an existing file and maps it read-only. Fails with
    /// `ErrorKind::NotFound` if the arena does not exist.
    pub fn open_ro<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { _file: file, mmap })
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

/// Removes a stale arena file if present. No-op if it does not exist, so a
/// producer can unconditionally clear out whatever its last run left behind
/// before creating a fresh arena.
pub fn remove_stale<P: AsRef<Path>>(path: P) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn tmp_path(tag: &str) -> String {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("/tmp/markercache_mmap_test_{tag}_{ts}")
    }

    #[test]
    fn roundtrip_bytes() {
        let path = tmp_path("roundtrip");
        {
            let mut mm = ArenaMut::create_exclusive(&path, 4096).unwrap();
            unsafe {
                let p = mm.as_mut_ptr();
                *p.add(0) = 0xAB;
                *p.add(1) = 0xCD;
            }
        }
        {
            let mm = Arena::open_ro(&path).unwrap();
            unsafe {
                let p = mm.as_ptr();
                assert_eq!(*p.add(0), 0xAB);
                assert_eq!(*p.add(1), 0xCD);
            }
        }
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn create_exclusive_rejects_existing() {
        let path = tmp_path("exclusive");
        let _first = ArenaMut::create_exclusive(&path, 64).unwrap();
        let second = ArenaMut::create_exclusive(&path, 64);
        assert_eq!(second.unwrap_err().kind(), io::ErrorKind::AlreadyExists);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn open_ro_missing_fails() {
        let path = tmp_path("missing");
        let err = Arena::open_ro(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn remove_stale_is_idempotent() {
        let path = tmp_path("stale");
        remove_stale(&path).unwrap();
        let _mm = ArenaMut::create_exclusive(&path, 64).unwrap();
        drop(_mm);
        remove_stale(&path).unwrap();
        assert!(!Path::new(&path).exists());
    }
}
