//! Property tests for the buffer cache's invariants: at most one frame per
//! sector at any quiescent point, and no dirty frame survives `flush()`.
//! Driven with randomized read/write sequences across more distinct sectors
//! than there are cache frames, to force eviction churn.

use std::collections::HashSet;

use blockfs_core::bio::BufferCache;
use blockfs_core::InMemoryDevice;
use proptest::prelude::*;

const N_FILES: u32 = 100; // > N_CACHE (64), forces eviction

#[derive(Debug, Clone)]
enum Op {
    Read(u32),
    Write(u32, u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..N_FILES).prop_map(Op::Read),
        (0..N_FILES, any::<u8>()).prop_map(|(s, b)| Op::Write(s, b)),
    ]
}

proptest! {
    #[test]
    fn at_most_one_frame_per_sector_under_random_traffic(ops in proptest::collection::vec(op_strategy(), 1..300)) {
        let cache = BufferCache::new(InMemoryDevice::new(N_FILES + 1));
        for op in &ops {
            match *op {
                Op::Read(sector) => {
                    let mut buf = [0u8; 1];
                    cache.read(sector, &mut buf, 0, 1).unwrap();
                }
                Op::Write(sector, byte) => {
                    cache.write(sector, &[byte], 0, 1).unwrap();
                }
            }
            let resident = cache.resident_sectors();
            let unique: HashSet<u32> = resident.iter().copied().collect();
            prop_assert_eq!(resident.len(), unique.len(), "duplicate sector resident in more than one frame");
        }
    }

    #[test]
    fn flush_leaves_no_dirty_frame(ops in proptest::collection::vec(op_strategy(), 1..300)) {
        let cache = BufferCache::new(InMemoryDevice::new(N_FILES + 1));
        for op in &ops {
            match *op {
                Op::Read(sector) => {
                    let mut buf = [0u8; 1];
                    cache.read(sector, &mut buf, 0, 1).unwrap();
                }
                Op::Write(sector, byte) => {
                    cache.write(sector, &[byte], 0, 1).unwrap();
                }
            }
        }
        cache.flush().unwrap();
        prop_assert!(!cache.any_dirty());
    }

    #[test]
    fn last_write_wins_per_sector(writes in proptest::collection::vec((0..8u32, any::<u8>()), 1..200)) {
        let cache = BufferCache::new(InMemoryDevice::new(8));
        let mut expected = [0u8; 8];
        for &(sector, byte) in &writes {
            cache.write(sector, &[byte], 0, 1).unwrap();
            expected[sector as usize] = byte;
        }
        for sector in 0..8u32 {
            let mut buf = [0u8; 1];
            cache.read(sector, &mut buf, 0, 1).unwrap();
            prop_assert_eq!(buf[0], expected[sector as usize]);
        }
    }
}
