//! # Block device interface
//!
//! The buffer cache talks to storage through a single synchronous primitive,
//! [`BlockDevice::read_write`]. When it returns, a read has fully populated the
//! payload and a write is durable. Devices are assumed reliable.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};
use kernel_info::param::BSIZE;
use kernel_sync::SpinLock;

/// Direction of a block transfer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DiskOp {
    /// Disk to buffer.
    Read,
    /// Buffer to disk.
    Write,
}

/// Synchronous block storage.
pub trait BlockDevice {
    /// Transfer one `BSIZE` block between `data` and block `block_no` of `dev`.
    ///
    /// May sleep; callers hold the buffer's sleep lock but no spin locks.
    fn read_write(&self, dev: u32, block_no: u32, data: &mut [u8; BSIZE], op: DiskOp);
}

impl<D: BlockDevice + ?Sized> BlockDevice for &D {
    fn read_write(&self, dev: u32, block_no: u32, data: &mut [u8; BSIZE], op: DiskOp) {
        (**self).read_write(dev, block_no, data, op);
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for Arc<D> {
    fn read_write(&self, dev: u32, block_no: u32, data: &mut [u8; BSIZE], op: DiskOp) {
        (**self).read_write(dev, block_no, data, op);
    }
}

/// Memory-backed block device.
///
/// Blocks that were never written read back as zeros. Counts every transfer,
/// which makes it useful for checking how often the cache really hits the
/// disk.
pub struct RamDisk {
    blocks: SpinLock<BTreeMap<(u32, u32), Box<[u8; BSIZE]>>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl Default for RamDisk {
    fn default() -> Self {
        Self::new()
    }
}

impl RamDisk {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            blocks: SpinLock::named("ramdisk", BTreeMap::new()),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Number of completed [`DiskOp::Read`] transfers.
    #[must_use]
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of completed [`DiskOp::Write`] transfers.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Current on-disk content of a block, bypassing any cache.
    #[must_use]
    pub fn block(&self, dev: u32, block_no: u32) -> [u8; BSIZE] {
        self.blocks
            .lock()
            .get(&(dev, block_no))
            .map_or([0; BSIZE], |b| **b)
    }

    /// Overwrite a block directly, e.g. to prepare a disk image.
    pub fn put_block(&self, dev: u32, block_no: u32, data: &[u8; BSIZE]) {
        self.blocks.lock().insert((dev, block_no), Box::new(*data));
    }
}

impl BlockDevice for RamDisk {
    fn read_write(&self, dev: u32, block_no: u32, data: &mut [u8; BSIZE], op: DiskOp) {
        match op {
            DiskOp::Read => {
                *data = self.block(dev, block_no);
                self.reads.fetch_add(1, Ordering::Relaxed);
            }
            DiskOp::Write => {
                self.put_block(dev, block_no, data);
                self.writes.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
