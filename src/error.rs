//! Error kinds.
//!
//! Structural errors are returned to the caller as-is. `NoSpace` and
//! `OutOfMemory` are the two "resource" kinds: callers on a write path treat
//! them as a reason to stop and return the partial byte count instead of
//! propagating the error (see `inode::Inode::write`). `DenyWriteActive` is
//! similarly swallowed by `Inode::write`, which returns `Ok(0)` instead of
//! surfacing it; the variant still exists so `deny_write`-adjacent code has
//! something to name.

use thiserror::Error;

pub type Result<T> = core::result::Result<T, FsError>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("no such file or directory")]
    NoSuchFile,
    #[error("name already exists")]
    Exists,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("name too long")]
    NameTooLong,
    #[error("free map exhausted")]
    NoSpace,
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid path")]
    InvalidPath,
    #[error("write denied while inode is deny-write locked")]
    DenyWriteActive,
    #[error("block device I/O failure")]
    BadDevice,
}
