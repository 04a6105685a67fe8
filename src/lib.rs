//! Core storage stack for a block-oriented educational filesystem: a
//! write-back buffer cache, a multi-level indexed inode layer, fixed-slot
//! directories, and a path resolver, wired together by [`fs::FileSystem`].
//!
//! The block device, free-sector bitmap allocator, and thread primitives
//! are consumed through the [`device::BlockDevice`] / [`freemap::FreeMap`]
//! traits rather than owned by this crate.

pub mod bio;
pub mod device;
pub mod dir;
pub mod error;
pub mod freemap;
pub mod fs;
pub mod handle;
pub mod inode;
pub mod lock;
pub mod param;
pub mod path;

pub use device::{BlockDevice, InMemoryDevice};
pub use dir::DirName;
pub use error::{FsError, Result};
pub use freemap::{BitmapFreeMap, FreeMap};
pub use fs::FileSystem;
pub use handle::{FileHandle, Session};
pub use inode::{Inode, InodeTable};
