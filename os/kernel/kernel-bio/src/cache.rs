use crate::bucket::{Bucket, FreeBufs, Link};
use crate::buf::{BufGuard, BufId, BufPin, BufSlot};
use crate::config::{BufferCacheConfig, ConfigError};
use crate::disk::{BlockDevice, DiskOp};
use crate::stats::{CacheCounters, CacheStats, Counter};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::mem::ManuallyDrop;
use core::ptr;
use kernel_sync::{LockStatsSnapshot, Park, SpinLock, SpinLockGuard};
use log::{info, trace};

/// A resident buffer as seen by [`BufferCache::snapshot`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BufInfo {
    pub id: BufId,
    pub dev: u32,
    pub block_no: u32,
    pub refs: u32,
    pub valid: bool,
}

/// The disk block cache.
///
/// A fixed pool of buffers, each either resident in the hash bucket of the
/// block it holds or waiting on the free list. A lookup locks only the bucket
/// of the requested block; only misses and evictions touch the shared free
/// list. A buffer goes back to the free list as soon as its last reference is
/// dropped.
///
/// Lock order: bucket, then free list. The data lock of a buffer is only
/// taken after the bucket lock has been dropped.
pub struct BufferCache<D, P> {
    config: BufferCacheConfig,
    disk: D,
    slots: Box<[BufSlot<P>]>,
    links: Box<[Link]>,
    buckets: Box<[SpinLock<Bucket>]>,
    free: SpinLock<FreeBufs>,
    counters: CacheCounters,
}

impl<D, P: Park + Default> BufferCache<D, P> {
    /// Build the pool with every buffer on the free list.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the geometry is unusable.
    pub fn new(config: BufferCacheConfig, disk: D) -> Result<Self, ConfigError> {
        config.validate()?;

        let slots: Box<[BufSlot<P>]> = (0..config.buffers)
            .map(|_| BufSlot::new(P::default()))
            .collect();
        let links: Box<[Link]> = (0..config.buffers).map(|_| Link::new()).collect();
        let buckets: Box<[SpinLock<Bucket>]> = (0..config.buckets)
            .map(|_| SpinLock::named("bcache.bucket", Bucket::new()))
            .collect();

        let mut free = FreeBufs::new();
        // Push in reverse so that slot 0 is handed out first.
        for id in (0..config.buffers).rev() {
            #[allow(clippy::cast_possible_truncation)]
            free.push(&links, id as u32);
        }

        info!(
            "bcache: {} buffers of {} bytes in {} buckets",
            config.buffers,
            kernel_info::param::BSIZE,
            config.buckets
        );

        Ok(Self {
            config,
            disk,
            slots,
            links,
            buckets,
            free: SpinLock::named("bcache.free", free),
            counters: CacheCounters::default(),
        })
    }
}

impl<D, P> BufferCache<D, P> {
    #[must_use]
    pub const fn config(&self) -> &BufferCacheConfig {
        &self.config
    }

    #[must_use]
    pub const fn disk(&self) -> &D {
        &self.disk
    }

    pub(crate) fn slot(&self, id: BufId) -> &BufSlot<P> {
        &self.slots[id.index()]
    }

    fn bucket(&self, block_no: u32) -> SpinLockGuard<'_, Bucket> {
        self.buckets[self.config.bucket_of(block_no)].lock()
    }

    fn lookup(&self, bucket: &Bucket, dev: u32, block_no: u32) -> Option<BufId> {
        bucket
            .find(&self.links, |id| self.slots[id as usize].holds(dev, block_no))
            .map(BufId)
    }

    /// Drop one reference. The caller holds the lock of the slot's bucket.
    /// The last reference sends the slot back to the free list.
    fn unref_locked(&self, bucket: &mut Bucket, id: BufId, op: &str) {
        let slot = self.slot(id);
        let refs = slot.refs();
        assert!(refs > 0, "{op}: {id} has no references");
        slot.set_refs(refs - 1);

        if refs == 1 {
            bucket.unlink(&self.links, id.0);
            self.free.lock().push(&self.links, id.0);
            self.counters.bump(Counter::Eviction);
            trace!(
                "bcache: evict {id} (dev {} block {})",
                slot.dev(),
                slot.block_no()
            );
        }
    }

    pub(crate) fn release_ref(&self, id: BufId, op: &str) {
        // The identity cannot change while we hold a reference.
        let mut bucket = self.bucket(self.slot(id).block_no());
        self.unref_locked(&mut bucket, id, op);
    }

    /// Counters plus the accumulated lock statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let bucket_locks = self
            .buckets
            .iter()
            .map(|b| b.stats())
            .fold(LockStatsSnapshot::default(), |acc, s| acc + s);
        self.counters.snapshot(bucket_locks, self.free.stats())
    }

    /// Number of buffers currently linked into a bucket.
    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.buckets.iter().map(|b| b.lock().len()).sum()
    }

    /// Number of buffers on the free list.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }

    #[must_use]
    pub fn is_resident(&self, dev: u32, block_no: u32) -> bool {
        self.ref_count(dev, block_no).is_some()
    }

    /// References held on a resident block, or `None` if it is not cached.
    #[must_use]
    pub fn ref_count(&self, dev: u32, block_no: u32) -> Option<u32> {
        let bucket = self.bucket(block_no);
        self.lookup(&bucket, dev, block_no)
            .map(|id| self.slot(id).refs())
    }

    /// All resident buffers, one bucket at a time.
    ///
    /// Buckets are locked one after another, so the result is only
    /// consistent per bucket.
    #[must_use]
    pub fn snapshot(&self) -> Vec<BufInfo> {
        let mut out = Vec::with_capacity(self.config.buffers);
        for bucket in &*self.buckets {
            let bucket = bucket.lock();
            out.extend(bucket.ids(&self.links).map(|id| {
                let slot = &self.slots[id as usize];
                BufInfo {
                    id: BufId(id),
                    dev: slot.dev(),
                    block_no: slot.block_no(),
                    refs: slot.refs(),
                    valid: slot.is_valid(),
                }
            }));
        }
        out
    }
}

impl<D: BlockDevice, P: Park> BufferCache<D, P> {
    /// Find or claim the buffer for a block and lock it.
    ///
    /// # Panics
    /// If the block is not cached and every buffer is referenced.
    fn get(&self, dev: u32, block_no: u32) -> BufGuard<'_, D, P> {
        let id = {
            let mut bucket = self.bucket(block_no);
            if let Some(id) = self.lookup(&bucket, dev, block_no) {
                let slot = self.slot(id);
                slot.set_refs(slot.refs() + 1);
                self.counters.bump(Counter::Hit);
                id
            } else {
                let Some(id) = self.free.lock().pop(&self.links).map(BufId) else {
                    panic!("bget: no buffers");
                };
                self.slot(id).assign(dev, block_no);
                bucket.push_back(&self.links, id.0);
                self.counters.bump(Counter::Miss);
                trace!("bcache: miss dev {dev} block {block_no} -> {id}");
                id
            }
        };

        let data = self.slot(id).data.lock();
        BufGuard {
            cache: self,
            id,
            data: ManuallyDrop::new(data),
        }
    }

    /// Return a locked buffer holding the current content of the block.
    ///
    /// Blocks until no other task holds the buffer. Concurrent readers of the
    /// same uncached block share one disk read.
    ///
    /// # Panics
    /// If the block is not cached and every buffer is referenced.
    pub fn read(&self, dev: u32, block_no: u32) -> BufGuard<'_, D, P> {
        let mut buf = self.get(dev, block_no);
        if !buf.is_valid() {
            self.disk.read_write(dev, block_no, &mut buf.data, DiskOp::Read);
            buf.slot().set_valid();
            self.counters.bump(Counter::DiskRead);
        }
        buf
    }

    /// Write the buffer's content through to disk.
    ///
    /// # Panics
    /// If the buffer belongs to another cache or the calling task does not
    /// hold its data lock.
    pub fn write(&self, buf: &mut BufGuard<'_, D, P>) {
        if let Err(reason) = self.ownership(buf) {
            panic!("bwrite: {reason}");
        }
        let (dev, block_no) = (buf.dev(), buf.block_no());
        self.disk.read_write(dev, block_no, &mut buf.data, DiskOp::Write);
        self.counters.bump(Counter::DiskWrite);
    }

    /// Release a locked buffer. Equivalent to dropping the guard, with the
    /// ownership checks of [`write`](Self::write).
    ///
    /// # Panics
    /// If the buffer belongs to another cache or the calling task does not
    /// hold its data lock.
    pub fn release(&self, buf: BufGuard<'_, D, P>) {
        if let Err(reason) = self.ownership(&buf) {
            // The buffer stays locked; unlocking it here would panic a second time.
            core::mem::forget(buf);
            panic!("brelse: {reason}");
        }
        drop(buf);
    }

    /// Take an extra reference so the block stays resident after `buf` is
    /// released.
    ///
    /// # Panics
    /// If the buffer belongs to another cache.
    pub fn pin(&self, buf: &BufGuard<'_, D, P>) -> BufPin {
        assert!(
            ptr::eq(buf.cache, self),
            "bpin: buffer belongs to another cache"
        );
        let slot = buf.slot();
        let _bucket = self.bucket(slot.block_no());
        slot.set_refs(slot.refs() + 1);
        self.counters.bump(Counter::Pin);
        BufPin {
            cache: self.addr(),
            id: buf.id,
            dev: slot.dev(),
            block_no: slot.block_no(),
        }
    }

    /// Drop the reference taken by [`pin`](Self::pin).
    ///
    /// # Panics
    /// If the pin was taken in another cache, or the pinned buffer no longer
    /// holds the pinned block.
    pub fn unpin(&self, pin: BufPin) {
        assert!(
            pin.cache == self.addr(),
            "bunpin: {} pinned in another cache",
            pin.id
        );
        let mut bucket = self.bucket(pin.block_no);
        let slot = self
            .slots
            .get(pin.id.index())
            .unwrap_or_else(|| panic!("bunpin: stale pin {}", pin.id));
        assert!(
            slot.holds(pin.dev, pin.block_no) && slot.refs() > 0,
            "bunpin: stale pin {}",
            pin.id
        );
        self.unref_locked(&mut bucket, pin.id, "bunpin");
        self.counters.bump(Counter::Unpin);
    }

    fn addr(&self) -> usize {
        ptr::from_ref(self).addr()
    }

    fn ownership(&self, buf: &BufGuard<'_, D, P>) -> Result<(), &'static str> {
        if !ptr::eq(buf.cache, self) {
            return Err("buffer belongs to another cache");
        }
        if !buf.is_held_by_current() {
            return Err("not holding buffer lock");
        }
        Ok(())
    }
}
