//! Inode store: multi-level indexed files, and the deny-write/writer-count
//! coordination around them.
//!
//! An [`Inode`] is the in-memory half of a file or directory: the sector
//! holding its on-disk record, plus the mutable bits (`removed`,
//! `deny_write_cnt`, `writer_count`, `open_cnt`). [`InodeTable`] is the
//! process-wide registry that makes repeated `open`s of the same sector
//! observe the same `Inode` — the identity the deny-write/writer-count
//! protocol depends on.
//!
//! Sector addressing (`resolve_sector_ro`/`resolve_sector_rw`) and the
//! multi-level pointer walk are kept as free functions taking
//! `&BufferCache<D>`/`&F` rather than storing the device and free map inside
//! `Inode` itself, so `Inode` stays a plain, non-generic type the registry
//! can hold without parameterizing the whole module on `D`/`F` — the same
//! shape the file-handle layer expects to hold onto.

pub mod layout;

use std::collections::HashMap;
use std::sync::Arc;

use crate::bio::BufferCache;
use crate::device::BlockDevice;
use crate::error::{FsError, Result};
use crate::freemap::FreeMap;
use crate::lock::{Sleepablelock, Spinlock};
use crate::param::{DIRECT, MAX_FILE_BYTES, PTRS_PER_BLOCK, SECTOR_SIZE};
use zerocopy::{AsBytes, FromBytes};

use layout::{InodeDisk, PointerBlock, DOUBLE_INDIRECT_IDX, INDIRECT_IDX};

/// Mutable, lock-protected inode state. `open_cnt` is the number of live
/// handles onto this `Inode` (tracked explicitly rather than via `Arc`'s own
/// strong count, so the registry removal decision reads the same invariant
/// the deny-write protocol checks: `deny_write_cnt <= open_cnt`).
struct InodeState {
    open_cnt: u32,
    removed: bool,
    deny_write_cnt: u32,
    writer_count: u32,
}

pub struct Inode {
    sector: u32,
    is_dir: bool,
    /// Cached parent directory sector, meaningful only when `is_dir`. A
    /// directory's `..` is fixed at creation time (no rename support), so
    /// this is read once in `InodeTable::open` and never mutated.
    parent: u32,
    state: Sleepablelock<InodeState>,
}

impl Inode {
    pub fn sector(&self) -> u32 {
        self.sector
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn parent_sector(&self) -> u32 {
        self.parent
    }

    pub fn is_removed(&self) -> bool {
        self.state.lock().removed
    }

    /// Number of live handles onto this inode. The "is this directory the
    /// CWD of any open process" check a caller must make before removing it
    /// is approximated as `open_count() > 1` (the handle doing the removing
    /// plus at least one other opener), since this crate has no process
    /// table to ask directly.
    pub fn open_count(&self) -> u32 {
        self.state.lock().open_cnt
    }

    pub fn length<D: BlockDevice>(&self, cache: &BufferCache<D>) -> Result<u64> {
        Ok(read_inode_disk(cache, self.sector)?.length as u64)
    }

    /// Blocks until no writer is active, then increments `deny_write_cnt`.
    /// Pairs with [`Inode::allow_write`].
    pub fn deny_write(&self) {
        let mut state = self.state.lock();
        while state.writer_count > 0 {
            state.sleep();
        }
        state.deny_write_cnt += 1;
    }

    pub fn allow_write(&self) {
        let mut state = self.state.lock();
        assert!(state.deny_write_cnt > 0, "allow_write: not denied");
        state.deny_write_cnt -= 1;
    }

    /// Marks the inode for deletion; the backing sectors are released when
    /// the last handle closes (`InodeTable::close`).
    pub fn remove(&self) {
        self.state.lock().removed = true;
    }

    /// Reads up to `len` bytes starting at `offset` into `dst`, zero-filling
    /// any hole (an unallocated slot in the pointer tree) and stopping at
    /// EOF.
    pub fn read<D: BlockDevice>(
        &self,
        cache: &BufferCache<D>,
        dst: &mut [u8],
        offset: u64,
        len: usize,
    ) -> Result<usize> {
        let file_len = self.length(cache)?;
        if offset >= file_len {
            return Ok(0);
        }
        let len = len.min((file_len - offset) as usize);
        let mut done = 0usize;
        while done < len {
            let pos = offset + done as usize as u64;
            let sector_ofs = (pos % SECTOR_SIZE as u64) as usize;
            let chunk = (SECTOR_SIZE - sector_ofs).min(len - done);
            match resolve_sector_ro(cache, self, pos)? {
                Some(sector) => {
                    cache.read(sector, &mut dst[done..done + chunk], sector_ofs, chunk)?;
                }
                None => {
                    dst[done..done + chunk].fill(0);
                }
            }
            done += chunk;
        }
        Ok(done)
    }

    /// Writes `src` at `offset`, growing the file (and filling any gap with
    /// holes) as needed. Returns `0` without touching anything if a writer
    /// is currently denied, or if the write would exceed `MAX_FILE_BYTES`.
    pub fn write<D: BlockDevice, F: FreeMap>(
        &self,
        cache: &BufferCache<D>,
        freemap: &F,
        src: &[u8],
        offset: u64,
    ) -> Result<usize> {
        if offset >= MAX_FILE_BYTES {
            return Ok(0);
        }
        let len = src.len().min((MAX_FILE_BYTES - offset) as usize);
        if len == 0 {
            return Ok(0);
        }

        {
            let mut state = self.state.lock();
            if state.deny_write_cnt > 0 {
                return Ok(0);
            }
            state.writer_count += 1;
        }
        let result = self.write_inner(cache, freemap, src, offset, len);
        {
            let mut state = self.state.lock();
            state.writer_count -= 1;
            if state.writer_count == 0 {
                state.wakeup();
            }
        }
        result
    }

    /// Writes as much of `src[..len]` as it can starting at `offset`.
    /// `NoSpace`/`OutOfMemory` encountered mid-write stop the loop and are
    /// reported as a partial byte count rather than an error; any other
    /// failure (`BadDevice`) is fatal and surfaced, but `length` is still
    /// advanced to cover whatever was successfully written before the
    /// failure.
    fn write_inner<D: BlockDevice, F: FreeMap>(
        &self,
        cache: &BufferCache<D>,
        freemap: &F,
        src: &[u8],
        offset: u64,
        len: usize,
    ) -> Result<usize> {
        let mut done = 0usize;
        let mut fatal = None;
        while done < len {
            let pos = offset + done as u64;
            let sector_ofs = (pos % SECTOR_SIZE as u64) as usize;
            let chunk = (SECTOR_SIZE - sector_ofs).min(len - done);
            let sector = match resolve_sector_rw(cache, freemap, self, pos) {
                Ok(Some(s)) => s,
                Ok(None) => unreachable!("resolve_sector_rw(create=true) always allocates"),
                Err(FsError::NoSpace) | Err(FsError::OutOfMemory) => break,
                Err(e) => {
                    fatal = Some(e);
                    break;
                }
            };
            match cache.write(sector, &src[done..done + chunk], sector_ofs, chunk) {
                Ok(()) => done += chunk,
                Err(e) => {
                    fatal = Some(e);
                    break;
                }
            }
        }
        let new_len = offset + done as u64;
        let mut disk = read_inode_disk(cache, self.sector)?;
        if new_len as i64 > disk.length as i64 {
            disk.length = new_len as i32;
            write_inode_disk(cache, self.sector, &disk)?;
        }
        match fatal {
            Some(e) => Err(e),
            None => Ok(done),
        }
    }
}

pub fn read_inode_disk<D: BlockDevice>(cache: &BufferCache<D>, sector: u32) -> Result<InodeDisk> {
    let mut buf = [0u8; SECTOR_SIZE];
    cache.read(sector, &mut buf, 0, SECTOR_SIZE)?;
    Ok(InodeDisk::read_from(&buf[..]).expect("InodeDisk is exactly one sector"))
}

pub fn write_inode_disk<D: BlockDevice>(
    cache: &BufferCache<D>,
    sector: u32,
    disk: &InodeDisk,
) -> Result<()> {
    cache.write(sector, disk.as_bytes(), 0, SECTOR_SIZE)
}

fn read_pointer_block<D: BlockDevice>(cache: &BufferCache<D>, sector: u32) -> Result<PointerBlock> {
    let mut buf = [0u8; SECTOR_SIZE];
    cache.read(sector, &mut buf, 0, SECTOR_SIZE)?;
    Ok(PointerBlock::read_from(&buf[..]).expect("PointerBlock is exactly one sector"))
}

fn write_pointer_block<D: BlockDevice>(
    cache: &BufferCache<D>,
    sector: u32,
    block: &PointerBlock,
) -> Result<()> {
    cache.write(sector, block.as_bytes(), 0, SECTOR_SIZE)
}

fn zero_fill_sector<D: BlockDevice>(cache: &BufferCache<D>, sector: u32) -> Result<()> {
    cache.write(sector, &[0u8; SECTOR_SIZE], 0, SECTOR_SIZE)
}

/// Allocates one sector from `freemap` and zero-fills it on the device.
fn alloc_sector<D: BlockDevice, F: FreeMap>(cache: &BufferCache<D>, freemap: &F) -> Result<u32> {
    let sector = freemap.alloc(1).ok_or(FsError::NoSpace)?[0];
    zero_fill_sector(cache, sector)?;
    Ok(sector)
}

/// Splits a byte offset into (direct index | None, indirect index within its
/// block | None, (outer, inner) double-indirect indices | None) — exactly
/// one of the three is `Some`. Shared by the read-only and allocating walks
/// below so the direct/indirect/double-indirect boundary math lives in one
/// place.
enum SectorPath {
    Direct(usize),
    Indirect(usize),
    DoubleIndirect(usize, usize),
}

fn classify_offset(offset: u64) -> Result<SectorPath> {
    let index = (offset / SECTOR_SIZE as u64) as usize;
    if index < DIRECT {
        return Ok(SectorPath::Direct(index));
    }
    let index = index - DIRECT;
    if index < PTRS_PER_BLOCK {
        return Ok(SectorPath::Indirect(index));
    }
    let index = index - PTRS_PER_BLOCK;
    if index >= PTRS_PER_BLOCK * PTRS_PER_BLOCK {
        return Err(FsError::NoSpace);
    }
    Ok(SectorPath::DoubleIndirect(
        index / PTRS_PER_BLOCK,
        index % PTRS_PER_BLOCK,
    ))
}

/// Resolves the device sector backing byte `offset` of `inode` without
/// allocating: an unallocated slot anywhere on the path reads as a hole
/// (`Ok(None)`).
fn resolve_sector_ro<D: BlockDevice>(cache: &BufferCache<D>, inode: &Inode, offset: u64) -> Result<Option<u32>> {
    let disk = read_inode_disk(cache, inode.sector)?;
    match classify_offset(offset)? {
        SectorPath::Direct(i) => Ok(nonzero(disk.sectors[i])),
        SectorPath::Indirect(i) => match nonzero(disk.sectors[INDIRECT_IDX]) {
            None => Ok(None),
            Some(indirect) => Ok(nonzero(read_pointer_block(cache, indirect)?.ptrs[i])),
        },
        SectorPath::DoubleIndirect(outer, inner) => match nonzero(disk.sectors[DOUBLE_INDIRECT_IDX]) {
            None => Ok(None),
            Some(dbl) => match nonzero(read_pointer_block(cache, dbl)?.ptrs[outer]) {
                None => Ok(None),
                Some(indirect) => Ok(nonzero(read_pointer_block(cache, indirect)?.ptrs[inner])),
            },
        },
    }
}

/// Resolves the device sector backing byte `offset` of `inode`, allocating
/// any unallocated slot on the path (implicit growth).
///
/// Allocation mutates a pointer-bearing sector (the inode itself, or an
/// indirect block) via read-modify-write; holding the inode's own mutex for
/// the whole call serializes concurrent allocating writers so two of them
/// can never race to fill the same zero slot.
fn resolve_sector_rw<D: BlockDevice, F: FreeMap>(
    cache: &BufferCache<D>,
    freemap: &F,
    inode: &Inode,
    offset: u64,
) -> Result<Option<u32>> {
    let _serialize = inode.state.lock();
    let mut disk = read_inode_disk(cache, inode.sector)?;

    match classify_offset(offset)? {
        SectorPath::Direct(i) => {
            let sector = ensure_slot(cache, freemap, &mut disk.sectors, i)?;
            write_inode_disk(cache, inode.sector, &disk)?;
            Ok(Some(sector))
        }
        SectorPath::Indirect(i) => {
            let indirect = ensure_slot(cache, freemap, &mut disk.sectors, INDIRECT_IDX)?;
            write_inode_disk(cache, inode.sector, &disk)?;
            let mut block = read_pointer_block(cache, indirect)?;
            let sector = ensure_slot(cache, freemap, &mut block.ptrs, i)?;
            write_pointer_block(cache, indirect, &block)?;
            Ok(Some(sector))
        }
        SectorPath::DoubleIndirect(outer, inner) => {
            let dbl = ensure_slot(cache, freemap, &mut disk.sectors, DOUBLE_INDIRECT_IDX)?;
            write_inode_disk(cache, inode.sector, &disk)?;
            let mut dbl_block = read_pointer_block(cache, dbl)?;
            let indirect = ensure_slot(cache, freemap, &mut dbl_block.ptrs, outer)?;
            write_pointer_block(cache, dbl, &dbl_block)?;
            let mut block = read_pointer_block(cache, indirect)?;
            let sector = ensure_slot(cache, freemap, &mut block.ptrs, inner)?;
            write_pointer_block(cache, indirect, &block)?;
            Ok(Some(sector))
        }
    }
}

fn nonzero(sector: u32) -> Option<u32> {
    if sector == 0 {
        None
    } else {
        Some(sector)
    }
}

/// Returns `slots[idx]`, allocating a fresh sector into it first if it is
/// still the unallocated sentinel (`0`).
fn ensure_slot<D: BlockDevice, F: FreeMap>(cache: &BufferCache<D>, freemap: &F, slots: &mut [u32], idx: usize) -> Result<u32> {
    if slots[idx] == 0 {
        slots[idx] = alloc_sector(cache, freemap)?;
    }
    Ok(slots[idx])
}

/// Releases every sector this inode's pointer tree reaches, including
/// indirect and double-indirect blocks themselves. Called once, from
/// `InodeTable::close`, when a removed inode's last handle goes away.
fn release_all_sectors<D: BlockDevice, F: FreeMap>(
    cache: &BufferCache<D>,
    freemap: &F,
    disk: &InodeDisk,
) -> Result<()> {
    for &s in &disk.sectors[..DIRECT] {
        if s != 0 {
            cache.free_frame(s);
            freemap.release(s, 1);
        }
    }
    if disk.sectors[INDIRECT_IDX] != 0 {
        release_pointer_block(cache, freemap, disk.sectors[INDIRECT_IDX])?;
    }
    if disk.sectors[DOUBLE_INDIRECT_IDX] != 0 {
        let dbl = disk.sectors[DOUBLE_INDIRECT_IDX];
        let dbl_block = read_pointer_block(cache, dbl)?;
        for &indirect in &dbl_block.ptrs {
            if indirect != 0 {
                release_pointer_block(cache, freemap, indirect)?;
            }
        }
        cache.free_frame(dbl);
        freemap.release(dbl, 1);
    }
    Ok(())
}

fn release_pointer_block<D: BlockDevice, F: FreeMap>(
    cache: &BufferCache<D>,
    freemap: &F,
    sector: u32,
) -> Result<()> {
    let block = read_pointer_block(cache, sector)?;
    for &s in &block.ptrs {
        if s != 0 {
            cache.free_frame(s);
            freemap.release(s, 1);
        }
    }
    cache.free_frame(sector);
    freemap.release(sector, 1);
    Ok(())
}

/// The process-wide open-inode registry. Guarantees that concurrent opens
/// of the same sector observe the same `Inode`, which is what makes
/// `deny_write_cnt`/`writer_count` a meaningful cross-handle protocol
/// rather than a per-handle counter.
pub struct InodeTable {
    registry: Spinlock<HashMap<u32, Arc<Inode>>>,
}

impl InodeTable {
    pub fn new() -> Self {
        Self {
            registry: Spinlock::new("inode-table", HashMap::new()),
        }
    }

    /// Formats a fresh, empty inode of the given kind onto `sector`. Callers
    /// (directory creation, file creation) are responsible for calling this
    /// before the first `open` of a newly allocated sector.
    pub fn create<D: BlockDevice>(&self, cache: &BufferCache<D>, sector: u32, is_dir: bool) -> Result<()> {
        let disk = InodeDisk::zeroed(if is_dir { 1 } else { 0 });
        write_inode_disk(cache, sector, &disk)
    }

    /// Opens `sector`, returning the shared `Inode` for it (creating the
    /// in-memory record on first open). `parent_sector` is needed only the
    /// first time a directory inode is opened, to seed its cached `..`; a
    /// later call with a mismatched value is ignored, since a directory's
    /// parent never changes after creation.
    pub fn open<D: BlockDevice>(
        &self,
        cache: &BufferCache<D>,
        sector: u32,
        parent_sector: u32,
    ) -> Result<Arc<Inode>> {
        {
            let reg = self.registry.lock();
            if let Some(existing) = reg.get(&sector) {
                existing.state.lock().open_cnt += 1;
                return Ok(existing.clone());
            }
        }

        let disk = read_inode_disk(cache, sector)?;
        if disk.magic != crate::param::INODE_MAGIC {
            return Err(FsError::BadDevice);
        }
        let inode = Arc::new(Inode {
            sector,
            is_dir: disk.is_dir(),
            parent: parent_sector,
            state: Sleepablelock::new(
                "inode",
                InodeState {
                    open_cnt: 1,
                    removed: false,
                    deny_write_cnt: 0,
                    writer_count: 0,
                },
            ),
        });

        let mut reg = self.registry.lock();
        if let Some(existing) = reg.get(&sector) {
            existing.state.lock().open_cnt += 1;
            return Ok(existing.clone());
        }
        reg.insert(sector, inode.clone());
        Ok(inode)
    }

    /// Bumps `open_cnt` on an already-held `Inode` (used by `.`/`..`
    /// traversal, which re-opens a directory it already has a handle to).
    pub fn reopen(&self, inode: &Arc<Inode>) -> Arc<Inode> {
        inode.state.lock().open_cnt += 1;
        inode.clone()
    }

    /// Drops one reference to `inode`. When `open_cnt` reaches zero, removes
    /// it from the registry and, if it was marked removed, releases its
    /// backing sectors back to `freemap`.
    pub fn close<D: BlockDevice, F: FreeMap>(
        &self,
        cache: &BufferCache<D>,
        freemap: &F,
        inode: Arc<Inode>,
    ) -> Result<()> {
        let mut reg = self.registry.lock();
        let (last_close, should_release) = {
            let mut state = inode.state.lock();
            state.open_cnt -= 1;
            (state.open_cnt == 0, state.open_cnt == 0 && state.removed)
        };
        if last_close {
            reg.remove(&inode.sector);
        }
        drop(reg);

        if should_release {
            let disk = read_inode_disk(cache, inode.sector)?;
            release_all_sectors(cache, freemap, &disk)?;
            cache.free_frame(inode.sector);
            freemap.release(inode.sector, 1);
        }
        Ok(())
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
