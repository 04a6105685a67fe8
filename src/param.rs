//! Tunable constants shared across the crate.

/// Size in bytes of a single device sector / cache frame / on-disk inode.
pub const SECTOR_SIZE: usize = 512;

/// Number of frames held by the buffer cache.
pub const N_CACHE: usize = 64;

/// Number of direct sector pointers stored inline in an inode.
pub const DIRECT: usize = 123;

/// Number of 4-byte sector pointers that fit in one indirect/double-indirect
/// block (`SECTOR_SIZE / size_of::<u32>()`).
pub const PTRS_PER_BLOCK: usize = 128;

/// Maximum file size in bytes: direct + indirect + double-indirect reach.
pub const MAX_FILE_SECTORS: usize = DIRECT + PTRS_PER_BLOCK + PTRS_PER_BLOCK * PTRS_PER_BLOCK;
pub const MAX_FILE_BYTES: u64 = (MAX_FILE_SECTORS as u64) * (SECTOR_SIZE as u64);

/// Fixed constant stamped into every on-disk inode for sanity checking.
pub const INODE_MAGIC: u32 = 0x494E_4F44;

/// Longest file name storable in a directory entry, not counting the NUL.
pub const NAME_MAX: usize = 14;

/// Sector reserved for the free-map's own bookkeeping (external collaborator;
/// this crate never reads or writes it, the constant only documents why
/// allocation starts at sector 2 in the demo binary's bitmap free-map).
pub const FREE_MAP_SECTOR: u32 = 0;

/// Sector fixed by convention to hold the root directory's inode.
pub const ROOT_DIR_SECTOR: u32 = 1;

/// Sentinel sector id meaning "this cache frame holds no sector". Unused in
/// practice since cache frames represent emptiness with `Option<u32>`
/// instead, but kept for code that wants an in-band sentinel value.
pub const NO_SECTOR: u32 = u32::MAX;
