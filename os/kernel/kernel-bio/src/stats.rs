use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use kernel_sync::LockStatsSnapshot;

/// Running counters, bumped with `Relaxed` ordering.
#[derive(Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    disk_reads: AtomicU64,
    disk_writes: AtomicU64,
    evictions: AtomicU64,
    pins: AtomicU64,
    unpins: AtomicU64,
}

#[derive(Debug, Copy, Clone)]
pub enum Counter {
    Hit,
    Miss,
    DiskRead,
    DiskWrite,
    Eviction,
    Pin,
    Unpin,
}

impl CacheCounters {
    #[inline]
    pub fn bump(&self, counter: Counter) {
        let c = match counter {
            Counter::Hit => &self.hits,
            Counter::Miss => &self.misses,
            Counter::DiskRead => &self.disk_reads,
            Counter::DiskWrite => &self.disk_writes,
            Counter::Eviction => &self.evictions,
            Counter::Pin => &self.pins,
            Counter::Unpin => &self.unpins,
        };
        c.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, bucket_locks: LockStatsSnapshot, free_lock: LockStatsSnapshot) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            disk_reads: self.disk_reads.load(Ordering::Relaxed),
            disk_writes: self.disk_writes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            pins: self.pins.load(Ordering::Relaxed),
            unpins: self.unpins.load(Ordering::Relaxed),
            bucket_locks,
            free_lock,
        }
    }
}

/// Point-in-time view of the buffer cache counters.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found the block resident.
    pub hits: u64,
    /// Lookups that had to take a slot from the free list.
    pub misses: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
    /// Buffers returned to the free list after their last reference.
    pub evictions: u64,
    pub pins: u64,
    pub unpins: u64,
    /// Summed over all bucket locks.
    pub bucket_locks: LockStatsSnapshot,
    pub free_lock: LockStatsSnapshot,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "bcache: hits {} misses {} reads {} writes {} evictions {}",
            self.hits, self.misses, self.disk_reads, self.disk_writes, self.evictions
        )?;
        writeln!(f, "bcache.bucket: {}", self.bucket_locks)?;
        write!(f, "bcache.free: {}", self.free_lock)
    }
}
