//! Path resolver.
//!
//! Tokenizes a path on `/` and walks it component by component through the
//! open-inode registry, in one of two modes:
//! * [`resolve`] ("target mode") walks every component and returns the
//!   inode the whole path names.
//! * [`resolve_parent`] ("parent mode") walks every component but the last
//!   and returns `(parent_directory, last_component_name)` — what
//!   `create`/`remove`/`mkdir` need, since they must still hold the parent
//!   locked/open when they add or remove the final name.
//!
//! Every inode opened while walking is guaranteed to be closed again,
//! whether the walk succeeds or bails out partway through; each step wraps
//! the previous component in a `scopeguard` that closes it unless the step
//! defuses it right before handing ownership to the next iteration.
//!
//! ## Climbing `..`
//!
//! A directory's `Inode::parent_sector` is set once, correctly, at the
//! moment it is *first* opened: either by `fs.rs` at mount time (the root
//! is its own parent) or here, in the `name` arm below, where the caller
//! doing the looking-up always already knows its own sector and passes it
//! as the new child's parent. Since the only way to ever reach a directory
//! is by walking down into it from an already-resident ancestor (or by
//! starting from the root or a previously resolved `cwd`, both seeded
//! correctly), every resident `Inode`'s cached parent is correct by
//! induction — so `..` can simply reopen `current.parent_sector()` and
//! trust it, rather than re-deriving it from the directory's own `..` entry
//! on every traversal.

use std::sync::Arc;

use crate::bio::BufferCache;
use crate::device::BlockDevice;
use crate::dir;
use crate::dir::DirName;
use crate::error::{FsError, Result};
use crate::freemap::FreeMap;
use crate::inode::{Inode, InodeTable};

fn close_logged<D: BlockDevice, F: FreeMap>(
    cache: &BufferCache<D>,
    freemap: &F,
    itable: &InodeTable,
    inode: Arc<Inode>,
) {
    if let Err(e) = itable.close(cache, freemap, inode) {
        log::warn!("path: failed to close intermediate inode: {e}");
    }
}

/// Resolves `path` to the inode it names. `cwd` is the starting point for a
/// relative path; a leading `/`, or a missing `cwd`, starts from `root`
/// instead.
pub fn resolve<D: BlockDevice, F: FreeMap>(
    cache: &BufferCache<D>,
    freemap: &F,
    itable: &InodeTable,
    root: &Arc<Inode>,
    cwd: Option<&Arc<Inode>>,
    path: &str,
) -> Result<Arc<Inode>> {
    let (inode, last) = walk(cache, freemap, itable, root, cwd, path, false)?;
    debug_assert!(last.is_none());
    Ok(inode)
}

/// Resolves every component of `path` but the last, returning the open
/// parent directory and the final component's name. Errors with
/// `InvalidPath` if `path` names the root itself (it has no parent
/// component to split off).
pub fn resolve_parent<D: BlockDevice, F: FreeMap>(
    cache: &BufferCache<D>,
    freemap: &F,
    itable: &InodeTable,
    root: &Arc<Inode>,
    cwd: Option<&Arc<Inode>>,
    path: &str,
) -> Result<(Arc<Inode>, DirName)> {
    let (parent, last) = walk(cache, freemap, itable, root, cwd, path, true)?;
    let last = match last {
        Some(l) => l,
        None => {
            close_logged(cache, freemap, itable, parent);
            return Err(FsError::InvalidPath);
        }
    };
    match DirName::from(last.as_str()) {
        Ok(name) => Ok((parent, name)),
        Err(_) => {
            close_logged(cache, freemap, itable, parent);
            Err(FsError::NameTooLong)
        }
    }
}

fn walk<D: BlockDevice, F: FreeMap>(
    cache: &BufferCache<D>,
    freemap: &F,
    itable: &InodeTable,
    root: &Arc<Inode>,
    cwd: Option<&Arc<Inode>>,
    path: &str,
    stop_before_last: bool,
) -> Result<(Arc<Inode>, Option<String>)> {
    if path.is_empty() {
        return Err(FsError::InvalidPath);
    }
    let tokens: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let absolute = path.starts_with('/') || cwd.is_none();
    let start = || {
        if absolute {
            itable.reopen(root)
        } else {
            itable.reopen(cwd.expect("absolute checked above"))
        }
    };

    if tokens.is_empty() {
        return if stop_before_last {
            Err(FsError::InvalidPath)
        } else {
            Ok((start(), None))
        };
    }

    let walk_count = if stop_before_last { tokens.len() - 1 } else { tokens.len() };
    let mut current = start();

    for tok in &tokens[..walk_count] {
        if !current.is_dir() {
            close_logged(cache, freemap, itable, current);
            return Err(FsError::NotADirectory);
        }

        let mut guard = scopeguard::guard(current, |c| close_logged(cache, freemap, itable, c));
        let next = match *tok {
            "." => itable.reopen(&guard),
            ".." => {
                let parent_sector = guard.parent_sector();
                itable.open(cache, parent_sector, parent_sector)?
            }
            name => match dir::lookup(cache, &guard, name)? {
                Some(sector) => itable.open(cache, sector, guard.sector())?,
                None => return Err(FsError::NoSuchFile),
            },
        };
        let current_owned = scopeguard::ScopeGuard::into_inner(guard);
        close_logged(cache, freemap, itable, current_owned);
        current = next;
    }

    if stop_before_last {
        Ok((current, Some(tokens[walk_count].to_string())))
    } else {
        Ok((current, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::BufferCache;
    use crate::device::InMemoryDevice;
    use crate::freemap::BitmapFreeMap;
    use crate::inode::InodeTable;
    use crate::param::ROOT_DIR_SECTOR;

    fn mount() -> (BufferCache<InMemoryDevice>, BitmapFreeMap, InodeTable, Arc<Inode>) {
        let cache = BufferCache::new(InMemoryDevice::new(64));
        let freemap = BitmapFreeMap::new(64);
        let itable = InodeTable::new();
        itable.create(&cache, ROOT_DIR_SECTOR, true).unwrap();
        let root = itable.open(&cache, ROOT_DIR_SECTOR, ROOT_DIR_SECTOR).unwrap();
        dir::create(&cache, &freemap, &root, ROOT_DIR_SECTOR, ROOT_DIR_SECTOR).unwrap();
        (cache, freemap, itable, root)
    }

    fn mkdir(cache: &BufferCache<InMemoryDevice>, freemap: &BitmapFreeMap, itable: &InodeTable, parent: &Arc<Inode>, name: &str, sector: u32) {
        itable.create(cache, sector, true).unwrap();
        let child = itable.open(cache, sector, parent.sector()).unwrap();
        dir::create(cache, freemap, &child, sector, parent.sector()).unwrap();
        dir::add(cache, freemap, parent, name, sector).unwrap();
        itable.close(cache, freemap, child).unwrap();
    }

    #[test]
    fn resolves_absolute_and_dot_dotdot() {
        let (cache, freemap, itable, root) = mount();
        mkdir(&cache, &freemap, &itable, &root, "a", 2);

        let a = resolve(&cache, &freemap, &itable, &root, None, "/a").unwrap();
        assert_eq!(a.sector(), 2);

        let back_to_root = resolve(&cache, &freemap, &itable, &root, Some(&a), "..").unwrap();
        assert_eq!(back_to_root.sector(), ROOT_DIR_SECTOR);

        let still_a = resolve(&cache, &freemap, &itable, &root, Some(&a), ".").unwrap();
        assert_eq!(still_a.sector(), 2);
    }

    #[test]
    fn resolve_parent_splits_off_last_component() {
        let (cache, freemap, itable, root) = mount();
        mkdir(&cache, &freemap, &itable, &root, "a", 2);

        let (parent, name) = resolve_parent(&cache, &freemap, &itable, &root, None, "/a/newfile").unwrap();
        assert_eq!(parent.sector(), 2);
        assert_eq!(name.as_str(), "newfile");
    }

    #[test]
    fn missing_component_is_no_such_file() {
        let (cache, freemap, itable, root) = mount();
        assert!(matches!(
            resolve(&cache, &freemap, &itable, &root, None, "/nope"),
            Err(FsError::NoSuchFile)
        ));
    }

    #[test]
    fn empty_path_is_invalid_but_root_resolves() {
        let (cache, freemap, itable, root) = mount();
        assert!(matches!(
            resolve(&cache, &freemap, &itable, &root, None, ""),
            Err(FsError::InvalidPath)
        ));
        assert!(matches!(
            resolve_parent(&cache, &freemap, &itable, &root, None, ""),
            Err(FsError::InvalidPath)
        ));

        let r = resolve(&cache, &freemap, &itable, &root, None, "/").unwrap();
        assert_eq!(r.sector(), ROOT_DIR_SECTOR);
        itable.close(&cache, &freemap, r).unwrap();
    }
}
