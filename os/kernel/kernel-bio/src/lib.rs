//! # Buffer cache
//!
//! Caches disk blocks in a fixed pool of [`BSIZE`](kernel_info::param::BSIZE)
//! buffers and serializes access to each block.
//!
//! ```text
//!   read(dev, block)            bucket = block % buckets
//!        │
//!        ▼
//!   ┌─────────┐  hit   ┌──────────────────────────┐
//!   │ bucket  │──────▶ │ refcnt += 1, unlock       │──▶ sleep-lock buffer
//!   │  lock   │        └──────────────────────────┘
//!   └─────────┘  miss  ┌──────────────────────────┐
//!        └────────────▶│ pop free list, link into │──▶ sleep-lock buffer,
//!                      │ bucket, refcnt = 1       │    read from disk
//!                      └──────────────────────────┘
//! ```
//!
//! The returned [`BufGuard`] holds the buffer's data lock. Dropping it (or
//! passing it to [`BufferCache::release`]) unlocks the buffer and drops its
//! reference; the last reference moves the buffer back to the free list.
//! [`BufferCache::pin`] keeps a block resident without holding its lock.
//!
//! ## Fatal conditions
//! * Every buffer referenced and the block not cached: `bget: no buffers`.
//! * Writing or releasing a buffer from a task that does not hold its lock.
//! * A corrupted bucket list.
//!
//! ## Example
//! ```
//! use kernel_bio::{BufferCache, BufferCacheConfig, RamDisk};
//! use kernel_sync::ThreadPark;
//!
//! let cache: BufferCache<RamDisk, ThreadPark> =
//!     BufferCache::new(BufferCacheConfig::default(), RamDisk::new()).unwrap();
//!
//! let mut buf = cache.read(1, 33);
//! buf[0] = 0xAB;
//! cache.write(&mut buf);
//! cache.release(buf);
//!
//! assert_eq!(cache.disk().block(1, 33)[0], 0xAB);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod buf;
mod bucket;
mod cache;
mod config;
mod disk;
mod stats;

pub use buf::{BufGuard, BufId, BufPin};
pub use cache::{BufInfo, BufferCache};
pub use config::{BufferCacheConfig, ConfigError};
pub use disk::{BlockDevice, DiskOp, RamDisk};
pub use stats::CacheStats;
