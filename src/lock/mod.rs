//! Named lock types: every lock flavor gets its own type instead of reaching
//! for a single generic mutex everywhere. Two flavors are used by this
//! crate:
//!
//! - [`Spinlock`]: short, no-I/O-under-it critical sections (the open-inode
//!   registry, the cache's recency list, the free map).
//! - [`Sleeplock`] / [`Sleepablelock`]: held across device I/O, or protecting
//!   state a thread may need to block on (a cache frame; an inode's
//!   `writer_count`).
//!
//! Each flavor is a thin, concrete wrapper around a `std`/`spin` primitive
//! rather than a generic trait object, since this crate runs on real OS
//! threads rather than a bespoke scheduler.

mod sleeplock;
mod spinlock;

pub use sleeplock::{Sleepablelock, SleepablelockGuard, Sleeplock, SleeplockGuard};
pub use spinlock::{Spinlock, SpinlockGuard};
