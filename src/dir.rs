//! Directory layer.
//!
//! A directory is a regular file whose bytes are a flat array of fixed-size
//! entries; this module only knows how to read and write that array through
//! an already-open `Inode`. It never touches the open-inode registry or the
//! free map beyond what's needed to grow the directory file itself, that's
//! `fs.rs`'s job.

use arrayvec::ArrayString;
use zerocopy::{AsBytes, FromBytes};

use crate::bio::BufferCache;
use crate::device::BlockDevice;
use crate::error::{FsError, Result};
use crate::freemap::FreeMap;
use crate::inode::Inode;
use crate::param::NAME_MAX;

pub type DirName = ArrayString<NAME_MAX>;

#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
struct DirEntryDisk {
    in_use: u32,
    name: [u8; NAME_MAX + 1],
    _pad: u8,
    sector: u32,
}

const DIRENT_SIZE: usize = core::mem::size_of::<DirEntryDisk>();
static_assertions::const_assert_eq!(DIRENT_SIZE, 24);

impl DirEntryDisk {
    fn empty() -> Self {
        Self {
            in_use: 0,
            name: [0; NAME_MAX + 1],
            _pad: 0,
            sector: 0,
        }
    }

    fn occupied(name: &str, sector: u32) -> Self {
        let mut buf = [0u8; NAME_MAX + 1];
        buf[..name.len()].copy_from_slice(name.as_bytes());
        Self {
            in_use: 1,
            name: buf,
            _pad: 0,
            sector,
        }
    }

    fn name(&self) -> DirName {
        let nul = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        DirName::from(core::str::from_utf8(&self.name[..nul]).unwrap_or("")).unwrap_or_default()
    }
}

fn entry_count<D: BlockDevice>(cache: &BufferCache<D>, dir: &Inode) -> Result<usize> {
    Ok(dir.length(cache)? as usize / DIRENT_SIZE)
}

fn read_entry<D: BlockDevice>(cache: &BufferCache<D>, dir: &Inode, index: usize) -> Result<DirEntryDisk> {
    let mut buf = [0u8; DIRENT_SIZE];
    let n = dir.read(cache, &mut buf, (index * DIRENT_SIZE) as u64, DIRENT_SIZE)?;
    if n < DIRENT_SIZE {
        return Ok(DirEntryDisk::empty());
    }
    Ok(DirEntryDisk::read_from(&buf[..]).expect("DirEntryDisk is fixed size"))
}

fn write_entry<D: BlockDevice, F: FreeMap>(
    cache: &BufferCache<D>,
    freemap: &F,
    dir: &Inode,
    index: usize,
    entry: &DirEntryDisk,
) -> Result<()> {
    let n = dir.write(cache, freemap, entry.as_bytes(), (index * DIRENT_SIZE) as u64)?;
    if n < DIRENT_SIZE {
        return Err(FsError::NoSpace);
    }
    Ok(())
}

/// Writes the two fixed entries every directory starts with: `.` pointing
/// at itself, `..` pointing at `parent_sector`. `self_sector` and
/// `parent_sector` may be equal (the root directory is its own parent).
pub fn create<D: BlockDevice, F: FreeMap>(
    cache: &BufferCache<D>,
    freemap: &F,
    dir: &Inode,
    self_sector: u32,
    parent_sector: u32,
) -> Result<()> {
    write_entry(cache, freemap, dir, 0, &DirEntryDisk::occupied(".", self_sector))?;
    write_entry(cache, freemap, dir, 1, &DirEntryDisk::occupied("..", parent_sector))?;
    Ok(())
}

/// Looks up `name` in `dir`, returning its sector if present.
pub fn lookup<D: BlockDevice>(cache: &BufferCache<D>, dir: &Inode, name: &str) -> Result<Option<u32>> {
    for i in 0..entry_count(cache, dir)? {
        let entry = read_entry(cache, dir, i)?;
        if entry.in_use != 0 && entry.name().as_str() == name {
            return Ok(Some(entry.sector));
        }
    }
    Ok(None)
}

/// Adds a `name -> sector` entry to `dir`, reusing the first free slot if
/// one exists, else appending. Fails with `Exists` if `name` is already
/// present, `NameTooLong` if it doesn't fit a directory entry.
pub fn add<D: BlockDevice, F: FreeMap>(
    cache: &BufferCache<D>,
    freemap: &F,
    dir: &Inode,
    name: &str,
    sector: u32,
) -> Result<()> {
    if DirName::from(name).is_err() {
        return Err(FsError::NameTooLong);
    }
    if lookup(cache, dir, name)?.is_some() {
        return Err(FsError::Exists);
    }

    let count = entry_count(cache, dir)?;
    for i in 0..count {
        let entry = read_entry(cache, dir, i)?;
        if entry.in_use == 0 {
            return write_entry(cache, freemap, dir, i, &DirEntryDisk::occupied(name, sector));
        }
    }
    write_entry(cache, freemap, dir, count, &DirEntryDisk::occupied(name, sector))
}

/// Removes `name` from `dir` by zeroing its slot. Rejects `.`/`..` by name;
/// rejects removing a non-empty directory is the caller's job (`fs.rs`),
/// since that check needs the target inode, not just this directory's
/// bytes.
pub fn remove<D: BlockDevice, F: FreeMap>(
    cache: &BufferCache<D>,
    freemap: &F,
    dir: &Inode,
    name: &str,
) -> Result<u32> {
    if name == "." || name == ".." {
        return Err(FsError::InvalidPath);
    }
    let count = entry_count(cache, dir)?;
    for i in 0..count {
        let entry = read_entry(cache, dir, i)?;
        if entry.in_use != 0 && entry.name().as_str() == name {
            let sector = entry.sector;
            write_entry(cache, freemap, dir, i, &DirEntryDisk::empty())?;
            return Ok(sector);
        }
    }
    Err(FsError::NoSuchFile)
}

/// `true` if `dir` contains no entries besides `.` and `..`.
pub fn is_empty<D: BlockDevice>(cache: &BufferCache<D>, dir: &Inode) -> Result<bool> {
    for i in 0..entry_count(cache, dir)? {
        let entry = read_entry(cache, dir, i)?;
        if entry.in_use != 0 {
            let name = entry.name();
            if name.as_str() != "." && name.as_str() != ".." {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Returns the `index`-th in-use entry besides `.`/`..`, or `None` past the
/// end. One-name-per-call, with the position cursor kept by the caller (a
/// `FileHandle`) instead of the directory itself.
pub fn nth_visible<D: BlockDevice>(cache: &BufferCache<D>, dir: &Inode, index: usize) -> Result<Option<DirName>> {
    let mut seen = 0usize;
    for i in 0..entry_count(cache, dir)? {
        let entry = read_entry(cache, dir, i)?;
        if entry.in_use == 0 {
            continue;
        }
        let name = entry.name();
        if name.as_str() == "." || name.as_str() == ".." {
            continue;
        }
        if seen == index {
            return Ok(Some(name));
        }
        seen += 1;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::BufferCache;
    use crate::device::InMemoryDevice;
    use crate::freemap::BitmapFreeMap;
    use crate::inode::InodeTable;

    fn setup() -> (BufferCache<InMemoryDevice>, BitmapFreeMap, InodeTable) {
        let cache = BufferCache::new(InMemoryDevice::new(64));
        let freemap = BitmapFreeMap::new(64);
        (cache, freemap, InodeTable::new())
    }

    #[test]
    fn create_lookup_add_remove_roundtrip() {
        let (cache, freemap, itable) = setup();
        itable.create(&cache, 2, true).unwrap();
        let dir = itable.open(&cache, 2, 2).unwrap();
        create(&cache, &freemap, &dir, 2, 2).unwrap();

        assert_eq!(lookup(&cache, &dir, ".").unwrap(), Some(2));
        assert_eq!(lookup(&cache, &dir, "..").unwrap(), Some(2));
        assert_eq!(lookup(&cache, &dir, "foo").unwrap(), None);

        add(&cache, &freemap, &dir, "foo", 5).unwrap();
        assert_eq!(lookup(&cache, &dir, "foo").unwrap(), Some(5));
        assert!(matches!(
            add(&cache, &freemap, &dir, "foo", 6),
            Err(FsError::Exists)
        ));
        assert!(!is_empty(&cache, &dir).unwrap());

        assert_eq!(nth_visible(&cache, &dir, 0).unwrap().unwrap().as_str(), "foo");
        assert_eq!(nth_visible(&cache, &dir, 1).unwrap(), None);

        let removed_sector = remove(&cache, &freemap, &dir, "foo").unwrap();
        assert_eq!(removed_sector, 5);
        assert_eq!(lookup(&cache, &dir, "foo").unwrap(), None);
        assert!(is_empty(&cache, &dir).unwrap());
    }

    #[test]
    fn rejects_dot_and_dotdot_removal() {
        let (cache, freemap, itable) = setup();
        itable.create(&cache, 2, true).unwrap();
        let dir = itable.open(&cache, 2, 2).unwrap();
        create(&cache, &freemap, &dir, 2, 2).unwrap();
        assert!(matches!(remove(&cache, &freemap, &dir, "."), Err(FsError::InvalidPath)));
        assert!(matches!(remove(&cache, &freemap, &dir, ".."), Err(FsError::InvalidPath)));
    }

    #[test]
    fn name_too_long_is_rejected() {
        let (cache, freemap, itable) = setup();
        itable.create(&cache, 2, true).unwrap();
        let dir = itable.open(&cache, 2, 2).unwrap();
        create(&cache, &freemap, &dir, 2, 2).unwrap();
        let long = "x".repeat(NAME_MAX + 1);
        assert!(matches!(
            add(&cache, &freemap, &dir, &long, 9),
            Err(FsError::NameTooLong)
        ));
    }
}
