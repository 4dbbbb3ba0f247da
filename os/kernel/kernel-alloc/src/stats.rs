use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use kernel_sync::LockStatsSnapshot;

#[derive(Default)]
pub struct AllocCounters {
    pub allocs: AtomicU64,
    pub frees: AtomicU64,
    pub released: AtomicU64,
    pub steals: AtomicU64,
    pub cow_copies: AtomicU64,
    pub cow_in_place: AtomicU64,
    pub oom: AtomicU64,
}

#[inline]
pub fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl AllocCounters {
    pub fn snapshot(&self, cpu_locks: LockStatsSnapshot, refs_lock: LockStatsSnapshot) -> AllocStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        AllocStats {
            allocs: load(&self.allocs),
            frees: load(&self.frees),
            released: load(&self.released),
            steals: load(&self.steals),
            cow_copies: load(&self.cow_copies),
            cow_in_place: load(&self.cow_in_place),
            oom: load(&self.oom),
            cpu_locks,
            refs_lock,
        }
    }
}

/// Point-in-time view of the page allocator counters.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct AllocStats {
    /// Pages handed out, including copy-on-write copies.
    pub allocs: u64,
    /// Calls to `free`, whether or not the page was released.
    pub frees: u64,
    /// Pages that lost their last owner and went back to a free list.
    pub released: u64,
    /// Allocations served from another CPU's free list.
    pub steals: u64,
    pub cow_copies: u64,
    /// Copy-on-write faults resolved without copying (sole owner).
    pub cow_in_place: u64,
    /// Requests that found the pool empty.
    pub oom: u64,
    /// Summed over all per-CPU free list locks.
    pub cpu_locks: LockStatsSnapshot,
    pub refs_lock: LockStatsSnapshot,
}

impl fmt::Display for AllocStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "kmem: allocs {} frees {} released {} steals {} cow {}/{} oom {}",
            self.allocs,
            self.frees,
            self.released,
            self.steals,
            self.cow_copies,
            self.cow_in_place,
            self.oom
        )?;
        writeln!(f, "kmem: {}", self.cpu_locks)?;
        write!(f, "kmem.ref: {}", self.refs_lock)
    }
}
