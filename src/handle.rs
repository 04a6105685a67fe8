//! File handle / open-file layer.
//!
//! [`FileHandle`] is one open reference to an inode: a byte cursor plus,
//! for regular files, an opt-in write-deny lease a caller may take for as
//! long as the handle is open (directories are never write-denied). Taking
//! the lease is not automatic on open: it exists for a process loader to
//! call once on a running executable's backing file, not for every
//! reader/writer of an ordinary file. [`Session`] is the thin per-caller
//! layer above it: a file-descriptor table plus the current working
//! directory, without pulling in any actual process or scheduler concept.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::bio::BufferCache;
use crate::device::BlockDevice;
use crate::dir::DirName;
use crate::error::{FsError, Result};
use crate::freemap::FreeMap;
use crate::fs::FileSystem;
use crate::inode::Inode;

pub struct FileHandle {
    inode: Arc<Inode>,
    cursor: Mutex<u64>,
    deny_write_taken: AtomicBool,
}

impl FileHandle {
    pub(crate) fn open(inode: Arc<Inode>) -> Self {
        Self {
            inode,
            cursor: Mutex::new(0),
            deny_write_taken: AtomicBool::new(false),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.inode.is_dir()
    }

    /// Takes a deny-write lease on this handle's inode, blocking until no
    /// writer is active. Used by a process loader to protect its own
    /// backing executable while it runs; a no-op
    /// (returns `Ok(())`) on a directory handle, since directories are never
    /// write-denied. Idempotent per handle: calling it twice on the same
    /// handle only takes one lease.
    pub fn deny_write(&self) -> Result<()> {
        if self.inode.is_dir() {
            return Err(FsError::IsADirectory);
        }
        if !self.deny_write_taken.swap(true, Ordering::AcqRel) {
            self.inode.deny_write();
        }
        Ok(())
    }

    /// Releases a lease taken by [`Self::deny_write`]. No-op if this handle
    /// never took one.
    pub fn allow_write(&self) {
        if self.deny_write_taken.swap(false, Ordering::AcqRel) {
            self.inode.allow_write();
        }
    }

    pub fn inumber(&self) -> u32 {
        self.inode.sector()
    }

    pub fn tell(&self) -> u64 {
        *self.cursor.lock().unwrap()
    }

    pub fn seek(&self, pos: u64) {
        *self.cursor.lock().unwrap() = pos;
    }

    pub fn filesize<D: BlockDevice>(&self, cache: &BufferCache<D>) -> Result<u64> {
        self.inode.length(cache)
    }

    pub fn read<D: BlockDevice>(&self, cache: &BufferCache<D>, dst: &mut [u8]) -> Result<usize> {
        if self.inode.is_dir() {
            return Err(FsError::IsADirectory);
        }
        let mut cursor = self.cursor.lock().unwrap();
        let n = self.inode.read(cache, dst, *cursor, dst.len())?;
        *cursor += n as u64;
        Ok(n)
    }

    pub fn write<D: BlockDevice, F: FreeMap>(&self, cache: &BufferCache<D>, freemap: &F, src: &[u8]) -> Result<usize> {
        if self.inode.is_dir() {
            return Err(FsError::IsADirectory);
        }
        let mut cursor = self.cursor.lock().unwrap();
        let n = self.inode.write(cache, freemap, src, *cursor)?;
        *cursor += n as u64;
        Ok(n)
    }

    /// Returns the next visible entry (skipping `.`/`..`), advancing this
    /// handle's cursor as the read position: one name per call.
    pub fn readdir<D: BlockDevice>(&self, cache: &BufferCache<D>) -> Result<Option<DirName>> {
        if !self.inode.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let mut cursor = self.cursor.lock().unwrap();
        match crate::dir::nth_visible(cache, &self.inode, *cursor as usize)? {
            Some(name) => {
                *cursor += 1;
                Ok(Some(name))
            }
            None => Ok(None),
        }
    }

    fn close<D: BlockDevice, F: FreeMap>(
        self,
        cache: &BufferCache<D>,
        freemap: &F,
        itable: &crate::inode::InodeTable,
    ) -> Result<()> {
        if self.deny_write_taken.load(Ordering::Acquire) {
            self.inode.allow_write();
        }
        itable.close(cache, freemap, self.inode)
    }
}

/// One caller's view of an open [`FileSystem`]: its own current directory
/// and file-descriptor table. Cheap to create; a real embedder would keep
/// one per simulated process or connection.
pub struct Session<'a, D, F> {
    fs: &'a FileSystem<D, F>,
    cwd: Mutex<Option<Arc<Inode>>>,
    files: Mutex<HashMap<u32, FileHandle>>,
    next_fd: AtomicU32,
}

impl<'a, D: BlockDevice, F: FreeMap> Session<'a, D, F> {
    pub fn new(fs: &'a FileSystem<D, F>) -> Self {
        Self {
            fs,
            cwd: Mutex::new(None),
            files: Mutex::new(HashMap::new()),
            next_fd: AtomicU32::new(1),
        }
    }

    pub(crate) fn cwd_snapshot(&self) -> Option<Arc<Inode>> {
        self.cwd.lock().unwrap().clone()
    }

    pub fn create(&self, path: &str, initial_size: u64) -> Result<()> {
        self.fs.create(self.cwd_snapshot().as_ref(), path, initial_size)
    }

    pub fn mkdir(&self, path: &str) -> Result<()> {
        self.fs.mkdir(self.cwd_snapshot().as_ref(), path)
    }

    pub fn remove(&self, path: &str) -> Result<()> {
        self.fs.remove(self.cwd_snapshot().as_ref(), path)
    }

    pub fn open(&self, path: &str) -> Result<u32> {
        let handle = self.fs.open(self.cwd_snapshot().as_ref(), path)?;
        let fd = self.next_fd.fetch_add(1, Ordering::Relaxed);
        self.files.lock().unwrap().insert(fd, handle);
        Ok(fd)
    }

    pub fn close(&self, fd: u32) -> Result<()> {
        let handle = self
            .files
            .lock()
            .unwrap()
            .remove(&fd)
            .ok_or(FsError::NoSuchFile)?;
        handle.close(self.fs.cache(), self.fs.freemap(), self.fs.itable())
    }

    pub fn read(&self, fd: u32, dst: &mut [u8]) -> Result<usize> {
        self.with_handle(fd, |h| h.read(self.fs.cache(), dst))
    }

    pub fn write(&self, fd: u32, src: &[u8]) -> Result<usize> {
        self.with_handle(fd, |h| h.write(self.fs.cache(), self.fs.freemap(), src))
    }

    pub fn seek(&self, fd: u32, pos: u64) -> Result<()> {
        self.with_handle(fd, |h| {
            h.seek(pos);
            Ok(())
        })
    }

    pub fn tell(&self, fd: u32) -> Result<u64> {
        self.with_handle(fd, |h| Ok(h.tell()))
    }

    pub fn filesize(&self, fd: u32) -> Result<u64> {
        self.with_handle(fd, |h| h.filesize(self.fs.cache()))
    }

    pub fn isdir(&self, fd: u32) -> Result<bool> {
        self.with_handle(fd, |h| Ok(h.is_dir()))
    }

    pub fn inumber(&self, fd: u32) -> Result<u32> {
        self.with_handle(fd, |h| Ok(h.inumber()))
    }

    /// Takes a deny-write lease on `fd`'s inode (the process-loader hook),
    /// blocking until any in-flight writer finishes.
    pub fn deny_write(&self, fd: u32) -> Result<()> {
        self.with_handle(fd, |h| h.deny_write())
    }

    pub fn allow_write(&self, fd: u32) -> Result<()> {
        self.with_handle(fd, |h| {
            h.allow_write();
            Ok(())
        })
    }

    pub fn readdir(&self, fd: u32) -> Result<Option<DirName>> {
        self.with_handle(fd, |h| h.readdir(self.fs.cache()))
    }

    pub fn chdir(&self, path: &str) -> Result<()> {
        let new_cwd = self.fs.resolve_dir(self.cwd_snapshot().as_ref(), path)?;
        let old = self.cwd.lock().unwrap().replace(new_cwd);
        if let Some(old) = old {
            self.fs.close_inode(old)?;
        }
        Ok(())
    }

    fn with_handle<T>(&self, fd: u32, f: impl FnOnce(&FileHandle) -> Result<T>) -> Result<T> {
        let files = self.files.lock().unwrap();
        let handle = files.get(&fd).ok_or(FsError::NoSuchFile)?;
        f(handle)
    }
}

impl<D: BlockDevice, F: FreeMap> Drop for Session<'_, D, F> {
    fn drop(&mut self) {
        // Best-effort: a well-behaved caller closes every fd and chdir's
        // back to `None` before dropping its session, but don't leak open
        // references into the registry if it doesn't.
        for (_, handle) in self.files.get_mut().unwrap().drain() {
            if let Err(e) = handle.close(self.fs.cache(), self.fs.freemap(), self.fs.itable()) {
                log::warn!("session: error closing fd on drop: {e}");
            }
        }
        if let Some(cwd) = self.cwd.get_mut().unwrap().take() {
            if let Err(e) = self.fs.close_inode(cwd) {
                log::warn!("session: error closing cwd on drop: {e}");
            }
        }
    }
}
