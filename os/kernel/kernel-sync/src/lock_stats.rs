use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// Per-lock contention counters.
///
/// Every successful acquisition bumps `acquired`; every failed first attempt
/// (the caller had to spin or sleep) bumps `contended`. The counters are
/// advisory and use `Relaxed` ordering.
pub struct LockStats {
    acquired: AtomicU64,
    contended: AtomicU64,
}

impl Default for LockStats {
    fn default() -> Self {
        Self::new()
    }
}

impl LockStats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            acquired: AtomicU64::new(0),
            contended: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_acquire(&self) {
        self.acquired.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_contention(&self) {
        self.contended.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> LockStatsSnapshot {
        LockStatsSnapshot {
            acquired: self.acquired.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`LockStats`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct LockStatsSnapshot {
    /// Number of successful acquisitions.
    pub acquired: u64,
    /// Number of acquisitions that found the lock taken.
    pub contended: u64,
}

impl core::ops::Add for LockStatsSnapshot {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            acquired: self.acquired + rhs.acquired,
            contended: self.contended + rhs.contended,
        }
    }
}

impl fmt::Display for LockStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#acquire {} #contended {}", self.acquired, self.contended)
    }
}
