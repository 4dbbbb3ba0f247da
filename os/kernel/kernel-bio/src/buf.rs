use crate::cache::BufferCache;
use core::fmt;
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use kernel_info::param::BSIZE;
use kernel_sync::{Park, SleepLock, SleepLockGuard};

/// Index of a slot in the buffer pool.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufId(pub(crate) u32);

impl BufId {
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BufId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf#{}", self.0)
    }
}

/// One buffer of the pool.
///
/// Identity, `valid` and `refcnt` are changed under the lock of the bucket the
/// slot belongs to. `valid` is additionally set to `true` by the reader that
/// filled the payload, under the data lock.
pub(crate) struct BufSlot<P> {
    dev: AtomicU32,
    block_no: AtomicU32,
    refcnt: AtomicU32,
    valid: AtomicBool,
    pub(crate) data: SleepLock<[u8; BSIZE], P>,
}

impl<P> BufSlot<P> {
    pub(crate) const fn new(park: P) -> Self {
        Self {
            dev: AtomicU32::new(0),
            block_no: AtomicU32::new(0),
            refcnt: AtomicU32::new(0),
            valid: AtomicBool::new(false),
            data: SleepLock::new("buffer", park, [0; BSIZE]),
        }
    }

    #[inline]
    pub(crate) fn dev(&self) -> u32 {
        self.dev.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn block_no(&self) -> u32 {
        self.block_no.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn holds(&self, dev: u32, block_no: u32) -> bool {
        self.dev() == dev && self.block_no() == block_no
    }

    #[inline]
    pub(crate) fn refs(&self) -> u32 {
        self.refcnt.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_refs(&self, refs: u32) {
        self.refcnt.store(refs, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_valid(&self) {
        self.valid.store(true, Ordering::Release);
    }

    /// Take over a free slot for a new block: one reference, stale payload.
    pub(crate) fn assign(&self, dev: u32, block_no: u32) {
        self.dev.store(dev, Ordering::Relaxed);
        self.block_no.store(block_no, Ordering::Relaxed);
        self.valid.store(false, Ordering::Release);
        self.set_refs(1);
    }
}

/// A locked buffer returned by [`BufferCache::read`].
///
/// The guard holds the buffer's data lock and one reference. Dropping it
/// releases both, in that order. It cannot be sent to another thread: the
/// data lock belongs to the task that took it.
///
/// Because releasing consumes the guard, using a buffer after releasing it
/// does not compile:
///
/// ```compile_fail
/// # use kernel_bio::{BufferCache, BufferCacheConfig, RamDisk};
/// # use kernel_sync::ThreadPark;
/// let cache: BufferCache<RamDisk, ThreadPark> =
///     BufferCache::new(BufferCacheConfig::default(), RamDisk::new()).unwrap();
/// let mut buf = cache.read(1, 7);
/// cache.release(buf);
/// cache.write(&mut buf);
/// ```
///
/// and neither does releasing it twice:
///
/// ```compile_fail
/// # use kernel_bio::{BufferCache, BufferCacheConfig, RamDisk};
/// # use kernel_sync::ThreadPark;
/// let cache: BufferCache<RamDisk, ThreadPark> =
///     BufferCache::new(BufferCacheConfig::default(), RamDisk::new()).unwrap();
/// let buf = cache.read(1, 7);
/// cache.release(buf);
/// cache.release(buf);
/// ```
pub struct BufGuard<'a, D, P: Park> {
    pub(crate) cache: &'a BufferCache<D, P>,
    pub(crate) id: BufId,
    pub(crate) data: ManuallyDrop<SleepLockGuard<'a, [u8; BSIZE], P>>,
}

impl<D, P: Park> BufGuard<'_, D, P> {
    #[inline]
    #[must_use]
    pub const fn id(&self) -> BufId {
        self.id
    }

    #[must_use]
    pub fn dev(&self) -> u32 {
        self.slot().dev()
    }

    #[must_use]
    pub fn block_no(&self) -> u32 {
        self.slot().block_no()
    }

    /// Whether the payload has been read from disk.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.slot().is_valid()
    }

    pub(crate) fn slot(&self) -> &BufSlot<P> {
        self.cache.slot(self.id)
    }

    pub(crate) fn is_held_by_current(&self) -> bool {
        self.data.lock().is_held_by_current()
    }
}

impl<D, P: Park> Deref for BufGuard<'_, D, P> {
    type Target = [u8; BSIZE];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<D, P: Park> DerefMut for BufGuard<'_, D, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl<D, P: Park> fmt::Debug for BufGuard<'_, D, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufGuard")
            .field("id", &self.id)
            .field("dev", &self.dev())
            .field("block_no", &self.block_no())
            .finish_non_exhaustive()
    }
}

impl<D, P: Park> Drop for BufGuard<'_, D, P> {
    fn drop(&mut self) {
        // Data lock first; the bucket lock is never held while touching it.
        // Safety: `data` is not used again.
        unsafe { ManuallyDrop::drop(&mut self.data) };
        self.cache.release_ref(self.id, "brelse");
    }
}

/// An extra reference keeping a buffer resident, e.g. while a log transaction
/// still has to write it back. Obtained from [`BufferCache::pin`] and handed
/// back through [`BufferCache::unpin`].
#[must_use = "a pinned buffer stays resident until unpinned"]
#[derive(Debug, PartialEq, Eq)]
pub struct BufPin {
    /// Address of the cache that took the pin.
    pub(crate) cache: usize,
    pub(crate) id: BufId,
    pub(crate) dev: u32,
    pub(crate) block_no: u32,
}

impl BufPin {
    #[must_use]
    pub const fn id(&self) -> BufId {
        self.id
    }

    #[must_use]
    pub const fn dev(&self) -> u32 {
        self.dev
    }

    #[must_use]
    pub const fn block_no(&self) -> u32 {
        self.block_no
    }
}
