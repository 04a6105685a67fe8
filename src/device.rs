//! The block device collaborator: this module only names the interface the
//! buffer cache consumes, plus a trivial in-memory implementation used by
//! the demo binary and the test suite. The real device driver lives
//! elsewhere and is consumed only through this trait.

use std::sync::Mutex;

use crate::error::{FsError, Result};
use crate::param::SECTOR_SIZE;

/// Narrow interface to a fixed-size-sector block device.
///
/// Implementations must be safe to call from multiple threads concurrently;
/// the buffer cache never serializes access to the device itself beyond
/// what's implied by its own per-frame locks.
pub trait BlockDevice: Send + Sync {
    fn sector_count(&self) -> u32;
    fn read_sector(&self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) -> Result<()>;
    fn write_sector(&self, sector: u32, buf: &[u8; SECTOR_SIZE]) -> Result<()>;
}

/// An in-memory stand-in for a real block device, for tests and the demo
/// binary. Every sector is zeroed on creation.
pub struct InMemoryDevice {
    sectors: Mutex<Vec<[u8; SECTOR_SIZE]>>,
}

impl InMemoryDevice {
    pub fn new(sector_count: u32) -> Self {
        Self {
            sectors: Mutex::new(vec![[0u8; SECTOR_SIZE]; sector_count as usize]),
        }
    }
}

impl BlockDevice for InMemoryDevice {
    fn sector_count(&self) -> u32 {
        self.sectors.lock().unwrap().len() as u32
    }

    fn read_sector(&self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) -> Result<()> {
        let sectors = self.sectors.lock().unwrap();
        let src = sectors.get(sector as usize).ok_or(FsError::BadDevice)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write_sector(&self, sector: u32, buf: &[u8; SECTOR_SIZE]) -> Result<()> {
        let mut sectors = self.sectors.lock().unwrap();
        let dst = sectors.get_mut(sector as usize).ok_or(FsError::BadDevice)?;
        dst.copy_from_slice(buf);
        Ok(())
    }
}
