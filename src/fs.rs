//! Top-level filesystem lifecycle and syscall-level operations.
//!
//! [`FileSystem`] wires the buffer cache, free map, and open-inode registry
//! together and owns the one thing none of those modules can hold for
//! themselves: the root directory's `Arc<Inode>`, which every path
//! resolution needs as a fallback start point. Everything here is a thin
//! orchestration layer over `path`, `dir`, and `inode` — no module-private
//! invariant is re-implemented.

use std::sync::Arc;

use crate::bio::BufferCache;
use crate::device::BlockDevice;
use crate::dir;
use crate::error::{FsError, Result};
use crate::freemap::FreeMap;
use crate::handle::FileHandle;
use crate::inode::{Inode, InodeTable};
use crate::param::ROOT_DIR_SECTOR;
use crate::path;

pub struct FileSystem<D, F> {
    cache: BufferCache<D>,
    freemap: F,
    itable: InodeTable,
    root: Arc<Inode>,
}

impl<D: BlockDevice, F: FreeMap> FileSystem<D, F> {
    /// Formats a fresh device: resets the free map, creates the root
    /// directory inode at `ROOT_DIR_SECTOR` with `.` and `..` both pointing
    /// at itself. Leaves the filesystem mounted.
    pub fn format(device: D, freemap: F) -> Result<Self> {
        freemap.create();
        let cache = BufferCache::new(device);
        let itable = InodeTable::new();
        itable.create(&cache, ROOT_DIR_SECTOR, true)?;
        let root = itable.open(&cache, ROOT_DIR_SECTOR, ROOT_DIR_SECTOR)?;
        dir::create(&cache, &freemap, &root, ROOT_DIR_SECTOR, ROOT_DIR_SECTOR)?;
        Ok(Self {
            cache,
            freemap,
            itable,
            root,
        })
    }

    /// Mounts an already-formatted device: loads the free map's persisted
    /// state and opens the root directory.
    pub fn mount(device: D, freemap: F) -> Result<Self> {
        freemap.open();
        let cache = BufferCache::new(device);
        let itable = InodeTable::new();
        let root = itable.open(&cache, ROOT_DIR_SECTOR, ROOT_DIR_SECTOR)?;
        Ok(Self {
            cache,
            freemap,
            itable,
            root,
        })
    }

    /// The one allowed "flush point" on clean shutdown: writes back
    /// every dirty cache frame and persists the free map. Does not close the
    /// root inode or otherwise tear down in-memory state, since a process
    /// still holding open handles is responsible for closing them first.
    pub fn shutdown(&self) -> Result<()> {
        self.cache.flush()?;
        self.freemap.close();
        Ok(())
    }

    pub fn cache(&self) -> &BufferCache<D> {
        &self.cache
    }

    pub fn freemap(&self) -> &F {
        &self.freemap
    }

    pub fn itable(&self) -> &InodeTable {
        &self.itable
    }

    pub fn root(&self) -> &Arc<Inode> {
        &self.root
    }

    fn alloc_inode_sector(&self) -> Result<u32> {
        self.freemap
            .alloc(1)
            .map(|sectors| sectors[0])
            .ok_or(FsError::NoSpace)
    }

    /// Closes `inode` and logs (rather than propagates) a failure, for the
    /// many "close this along whatever path we take out of here" spots below.
    pub fn close_inode(&self, inode: Arc<Inode>) -> Result<()> {
        self.itable.close(&self.cache, &self.freemap, inode)
    }

    fn close_logged(&self, inode: Arc<Inode>) {
        if let Err(e) = self.close_inode(inode) {
            log::warn!("fs: failed to close inode: {e}");
        }
    }

    /// Target-mode resolution: returns the inode `path` names.
    pub fn resolve(&self, cwd: Option<&Arc<Inode>>, path_str: &str) -> Result<Arc<Inode>> {
        path::resolve(&self.cache, &self.freemap, &self.itable, &self.root, cwd, path_str)
    }

    /// Like [`Self::resolve`], but errors with `NotADirectory` if the target
    /// isn't one. Used by `chdir`.
    pub fn resolve_dir(&self, cwd: Option<&Arc<Inode>>, path_str: &str) -> Result<Arc<Inode>> {
        let inode = self.resolve(cwd, path_str)?;
        if !inode.is_dir() {
            self.close_logged(inode);
            return Err(FsError::NotADirectory);
        }
        Ok(inode)
    }

    /// Parent-mode resolution: returns the open parent directory plus the
    /// final path component's name. Used internally by create/mkdir/remove,
    /// and exposed directly since it's a well-defined operation in its own
    /// right.
    pub fn resolve_parent(
        &self,
        cwd: Option<&Arc<Inode>>,
        path_str: &str,
    ) -> Result<(Arc<Inode>, crate::dir::DirName)> {
        path::resolve_parent(&self.cache, &self.freemap, &self.itable, &self.root, cwd, path_str)
    }

    /// Creates a regular file at `path` with `initial_size` zero bytes
    /// already written.
    pub fn create(&self, cwd: Option<&Arc<Inode>>, path_str: &str, initial_size: u64) -> Result<()> {
        let (parent, name) = self.resolve_parent(cwd, path_str)?;
        let result = self.create_inner(&parent, name.as_str(), initial_size);
        self.close_logged(parent);
        result
    }

    /// Allocates the new inode's sector first, then tries to wire it up, and
    /// releases it back to the free map if anything along the way fails
    /// (including `dir::add`'s own `Exists` check, which only runs at the
    /// very end) rather than pre-checking existence before allocating.
    ///
    /// The zero-fill for `initial_size > 0` can itself allocate data and
    /// indirect-block sectors before failing partway (free-map exhaustion)
    /// or before a later `dir::add` rejects the name; on any failure after
    /// the inode's on-disk record exists, the whole pointer tree rooted at
    /// it — not just its own sector — must be released, so the cleanup
    /// reopens the inode, marks it removed, and closes it rather than
    /// freeing a bare sector.
    fn create_inner(&self, parent: &Arc<Inode>, name: &str, initial_size: u64) -> Result<()> {
        let sector = self.alloc_inode_sector()?;
        if let Err(e) = self.itable.create(&self.cache, sector, false) {
            self.cache.free_frame(sector);
            self.freemap.release(sector, 1);
            return Err(e);
        }
        let result = self.create_inner_on(sector, parent, name, initial_size);
        if result.is_err() {
            self.release_failed_create(sector, parent.sector());
        }
        result
    }

    fn create_inner_on(&self, sector: u32, parent: &Arc<Inode>, name: &str, initial_size: u64) -> Result<()> {
        if initial_size > 0 {
            let inode = self.itable.open(&self.cache, sector, parent.sector())?;
            let write_result = inode.write(&self.cache, &self.freemap, &vec![0u8; initial_size as usize], 0);
            self.close_logged(inode);
            match write_result? {
                n if (n as u64) < initial_size => return Err(FsError::NoSpace),
                _ => {}
            }
        }
        dir::add(&self.cache, &self.freemap, parent, name, sector)
    }

    /// Releases a newly allocated inode (and every sector its pointer tree
    /// already reaches) after a failed `create`/`mkdir`. The on-disk inode
    /// record is known to exist at this point (`itable.create` succeeded);
    /// reopening and removing it drives the same whole-tree release path
    /// `InodeTable::close` uses for any other removed inode. Falls back to
    /// releasing the bare sector only if even reopening it fails.
    fn release_failed_create(&self, sector: u32, parent_sector: u32) {
        match self.itable.open(&self.cache, sector, parent_sector) {
            Ok(inode) => {
                inode.remove();
                self.close_logged(inode);
            }
            Err(e) => {
                log::warn!("fs: failed to reopen inode {sector} for cleanup: {e}");
                self.cache.free_frame(sector);
                self.freemap.release(sector, 1);
            }
        }
    }

    /// Creates a directory at `path`, pre-populated with `.`/`..`.
    pub fn mkdir(&self, cwd: Option<&Arc<Inode>>, path_str: &str) -> Result<()> {
        let (parent, name) = self.resolve_parent(cwd, path_str)?;
        let result = self.mkdir_inner(&parent, name.as_str());
        self.close_logged(parent);
        result
    }

    /// Same shape as `create_inner`: `dir::create`'s `.`/`..` write can
    /// allocate a directory-content sector before `dir::add` rejects an
    /// existing name, so cleanup after `itable.create` succeeds must release
    /// the whole pointer tree, not just the inode's own sector.
    fn mkdir_inner(&self, parent: &Arc<Inode>, name: &str) -> Result<()> {
        let sector = self.alloc_inode_sector()?;
        if let Err(e) = self.itable.create(&self.cache, sector, true) {
            self.cache.free_frame(sector);
            self.freemap.release(sector, 1);
            return Err(e);
        }
        let result = self.mkdir_inner_on(sector, parent, name);
        if result.is_err() {
            self.release_failed_create(sector, parent.sector());
        }
        result
    }

    fn mkdir_inner_on(&self, sector: u32, parent: &Arc<Inode>, name: &str) -> Result<()> {
        let child = self.itable.open(&self.cache, sector, parent.sector())?;
        let result = dir::create(&self.cache, &self.freemap, &child, sector, parent.sector())
            .and_then(|()| dir::add(&self.cache, &self.freemap, parent, name, sector));
        self.close_logged(child);
        result
    }

    /// Removes the entry at `path`: fails on `.`/`..`, on a non-empty
    /// directory, or on a directory that's any process's CWD (approximated
    /// as `open_count() > 1`, since this crate has no process table to ask
    /// directly).
    pub fn remove(&self, cwd: Option<&Arc<Inode>>, path_str: &str) -> Result<()> {
        let (parent, name) = self.resolve_parent(cwd, path_str)?;
        let result = self.remove_inner(&parent, name.as_str());
        self.close_logged(parent);
        result
    }

    fn remove_inner(&self, parent: &Arc<Inode>, name: &str) -> Result<()> {
        let sector = dir::lookup(&self.cache, parent, name)?.ok_or(FsError::NoSuchFile)?;
        let target = self.itable.open(&self.cache, sector, parent.sector())?;
        let result = (|| {
            if target.is_dir() {
                if !dir::is_empty(&self.cache, &target)? {
                    return Err(FsError::NotEmpty);
                }
                if target.open_count() > 1 {
                    return Err(FsError::NotEmpty);
                }
            }
            dir::remove(&self.cache, &self.freemap, parent, name)?;
            target.remove();
            Ok(())
        })();
        self.close_logged(target);
        result
    }

    /// Opens `path` for reading/writing, resolving via the path resolver and
    /// wrapping the result in a [`FileHandle`].
    pub fn open(&self, cwd: Option<&Arc<Inode>>, path_str: &str) -> Result<FileHandle> {
        let inode = self.resolve(cwd, path_str)?;
        Ok(FileHandle::open(inode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::InMemoryDevice;
    use crate::freemap::BitmapFreeMap;
    use crate::handle::Session;

    fn format(sector_count: u32) -> FileSystem<InMemoryDevice, BitmapFreeMap> {
        let device = InMemoryDevice::new(sector_count);
        let freemap = BitmapFreeMap::new(sector_count);
        FileSystem::format(device, freemap).unwrap()
    }

    #[test]
    fn create_write_close_reopen_read_roundtrip() {
        let fs = format(64);
        let session = Session::new(&fs);
        session.create("x", 0).unwrap();
        let fd = session.open("x").unwrap();
        session.write(fd, b"hello").unwrap();
        session.close(fd).unwrap();

        let fd = session.open("x").unwrap();
        let mut buf = [0u8; 5];
        session.seek(fd, 0).unwrap();
        let n = session.read(fd, &mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(session.filesize(fd).unwrap(), 5);
    }

    #[test]
    fn sparse_write_reads_as_hole() {
        let fs = format(4096);
        let session = Session::new(&fs);
        session.create("sparse", 0).unwrap();
        let fd = session.open("sparse").unwrap();
        session.seek(fd, 65536).unwrap();
        session.write(fd, b"end").unwrap();
        session.close(fd).unwrap();

        let fd = session.open("sparse").unwrap();
        let mut buf = [0xffu8; 4];
        session.seek(fd, 0).unwrap();
        assert_eq!(session.read(fd, &mut buf).unwrap(), 4);
        assert_eq!(buf, [0, 0, 0, 0]);
        session.seek(fd, 65536).unwrap();
        let mut tail = [0u8; 3];
        assert_eq!(session.read(fd, &mut tail).unwrap(), 3);
        assert_eq!(&tail, b"end");
        assert_eq!(session.filesize(fd).unwrap(), 65539);
    }

    #[test]
    fn remove_then_reopen_is_no_such_file() {
        let fs = format(64);
        let session = Session::new(&fs);
        session.create("p", 0).unwrap();
        let fd = session.open("p").unwrap();
        session.close(fd).unwrap();
        session.remove("p").unwrap();
        assert!(matches!(session.open("p"), Err(FsError::NoSuchFile)));
    }

    #[test]
    fn mkdir_chdir_dotdot_resolves_to_parent() {
        let fs = format(64);
        let session = Session::new(&fs);
        session.mkdir("/a").unwrap();
        session.mkdir("/a/b").unwrap();
        session.chdir("/a/b").unwrap();

        let a = fs.resolve(None, "/a").unwrap();
        let via_dotdot = fs.resolve(session.cwd_snapshot().as_ref(), "..").unwrap();
        assert_eq!(a.sector(), via_dotdot.sector());
        fs.close_inode(a).unwrap();
        fs.close_inode(via_dotdot).unwrap();
    }

    #[test]
    fn remove_non_empty_directory_fails() {
        let fs = format(64);
        let session = Session::new(&fs);
        session.mkdir("/a").unwrap();
        session.mkdir("/a/b").unwrap();
        session.create("/a/b/c", 0).unwrap();
        assert!(matches!(session.remove("/a/b"), Err(FsError::NotEmpty)));
    }

    #[test]
    fn deny_write_blocks_other_handle_until_released() {
        // Open "f", deny_write, attempt a write from another handle -> 0;
        // allow_write; same write succeeds.
        let fs = format(64);
        let session = Session::new(&fs);
        session.create("f", 0).unwrap();

        let fd1 = session.open("f").unwrap();
        let fd2 = session.open("f").unwrap();
        session.deny_write(fd1).unwrap();

        assert_eq!(session.write(fd2, b"data").unwrap(), 0);
        session.allow_write(fd1).unwrap();
        assert_eq!(session.write(fd2, b"data").unwrap(), 4);

        session.close(fd1).unwrap();
        session.close(fd2).unwrap();
    }
}
