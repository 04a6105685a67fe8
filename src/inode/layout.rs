//! On-disk structures.
//!
//! The on-disk inode layout and the generic "block of pointers" layout are
//! kept as two distinct record types even though both are exactly one
//! sector wide; `InodeDisk` and `PointerBlock` are those two types.
//! Bit-exact, fixed layout, using `zerocopy` for the byte-level view.
//!
//! `InodeDisk::sectors` holds 125 entries (123 direct + 1 indirect + 1
//! double-indirect): 125 × 4 bytes = 500, and 500 + length(4) + magic(4) +
//! inode_type(4) = 512 = `SECTOR_SIZE`, filling the sector exactly.

use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes};

use crate::param::{DIRECT, INODE_MAGIC, PTRS_PER_BLOCK, SECTOR_SIZE};

/// Total pointer slots in an inode: direct + one indirect + one
/// double-indirect.
pub const TOTAL_POINTERS: usize = DIRECT + 2;
/// Index of the single-indirect pointer within `InodeDisk::sectors`.
pub const INDIRECT_IDX: usize = DIRECT;
/// Index of the double-indirect pointer within `InodeDisk::sectors`.
pub const DOUBLE_INDIRECT_IDX: usize = DIRECT + 1;

#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct InodeDisk {
    pub sectors: [u32; TOTAL_POINTERS],
    pub length: i32,
    pub magic: u32,
    pub inode_type: u32,
}

const_assert_eq!(core::mem::size_of::<InodeDisk>(), SECTOR_SIZE);

impl InodeDisk {
    pub fn zeroed(inode_type: u32) -> Self {
        Self {
            sectors: [0; TOTAL_POINTERS],
            length: 0,
            magic: INODE_MAGIC,
            inode_type,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.inode_type == 1
    }
}

/// An indirect or double-indirect block: 128 raw 4-byte sector ids, zero
/// meaning unallocated.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct PointerBlock {
    pub ptrs: [u32; PTRS_PER_BLOCK],
}

const_assert_eq!(core::mem::size_of::<PointerBlock>(), SECTOR_SIZE);

impl PointerBlock {
    pub const fn zeroed() -> Self {
        Self {
            ptrs: [0; PTRS_PER_BLOCK],
        }
    }
}
