//! # Kernel memory context
//!
//! The resource pools shared by every CPU: the disk block cache and the
//! physical page allocator. Both are built once during early boot into a
//! [`KernelMemory`] value that the rest of the kernel receives by reference
//! (or through an `Arc`); there are no global singletons.
//!
//! ```text
//!   file system ──▶ KernelMemory::bcache() ──▶ BlockDevice
//!   fork / faults ─▶ KernelMemory::pages()  ──▶ PhysMapper, CpuAffinity
//! ```
//!
//! Neither pool depends on the other, so they share no locks.
//!
//! ## Example
//! ```rust
//! use kernel::{KernelConfig, KernelMemory};
//! use kernel_alloc::SingleCpu;
//! use kernel_alloc::phys_mapper::IdentityPhysMapper;
//! use kernel_bio::{BufferCacheConfig, RamDisk};
//! use kernel_alloc::PagePoolConfig;
//! use kernel_memory_addresses::PhysicalAddress;
//! use kernel_sync::ThreadPark;
//!
//! #[repr(align(4096))]
//! struct Frame([u8; 4096]);
//! let ram: Vec<Frame> = (0..8).map(|_| Frame([0; 4096])).collect();
//! let start = PhysicalAddress::from_ptr(ram.as_ptr());
//!
//! let config = KernelConfig {
//!     bcache: BufferCacheConfig::default(),
//!     pages: PagePoolConfig::new(1, start, start + 8 * 4096),
//! };
//! let kmem: KernelMemory<RamDisk, ThreadPark, _, _> =
//!     KernelMemory::new(config, RamDisk::new(), IdentityPhysMapper, SingleCpu).unwrap();
//!
//! let page = kmem.pages().allocate().unwrap();
//! let buf = kmem.bcache().read(1, 1);
//! kmem.bcache().release(buf);
//! kmem.pages().free(page);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

use core::fmt;
use kernel_alloc::phys_mapper::PhysMapper;
use kernel_alloc::{AllocStats, CpuAffinity, PageAllocator, PagePoolConfig};
use kernel_bio::{BufferCache, BufferCacheConfig, CacheStats};
use kernel_memory_addresses::PhysicalAddress;
use kernel_sync::Park;
use log::info;

/// Geometry of both pools.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    pub bcache: BufferCacheConfig,
    pub pages: PagePoolConfig,
}

impl KernelConfig {
    /// The default buffer cache and all RAM above the kernel image.
    #[must_use]
    pub fn above_kernel(kernel_end: PhysicalAddress) -> Self {
        Self {
            bcache: BufferCacheConfig::default(),
            pages: PagePoolConfig::above_kernel(kernel_end),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelInitError {
    #[error("invalid buffer cache configuration: {0}")]
    BufferCache(#[from] kernel_bio::ConfigError),
    #[error("invalid page pool configuration: {0}")]
    PagePool(#[from] kernel_alloc::ConfigError),
}

/// The kernel's shared memory resources.
pub struct KernelMemory<D, P, M, C> {
    bcache: BufferCache<D, P>,
    pages: PageAllocator<M, C>,
}

impl<D, P, M, C> KernelMemory<D, P, M, C>
where
    P: Park + Default,
    M: PhysMapper,
    C: CpuAffinity,
{
    /// Build both pools.
    ///
    /// # Errors
    /// Returns a [`KernelInitError`] if either configuration is unusable;
    /// nothing is allocated in that case.
    pub fn new(
        config: KernelConfig,
        disk: D,
        mapper: M,
        cpus: C,
    ) -> Result<Self, KernelInitError> {
        // Validate both up front so a bad page pool does not leave a cache behind.
        config.bcache.validate()?;
        config.pages.pages()?;

        info!("Initializing buffer cache ...");
        let bcache = BufferCache::new(config.bcache, disk)?;
        info!("Initializing physical page allocator ...");
        let pages = PageAllocator::new(config.pages, mapper, cpus)?;

        Ok(Self { bcache, pages })
    }
}

impl<D, P, M, C> KernelMemory<D, P, M, C> {
    #[inline]
    #[must_use]
    pub const fn bcache(&self) -> &BufferCache<D, P> {
        &self.bcache
    }

    #[inline]
    #[must_use]
    pub const fn pages(&self) -> &PageAllocator<M, C> {
        &self.pages
    }

    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            bcache: self.bcache.stats(),
            pages: self.pages.stats(),
            free_pages: self.pages.free_pages(),
            free_buffers: self.bcache.free_count(),
        }
    }
}

/// Combined statistics, e.g. for a `kstat`-style dump on the console.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryStats {
    pub bcache: CacheStats,
    pub pages: AllocStats,
    pub free_pages: usize,
    pub free_buffers: usize,
}

impl fmt::Display for MemoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.bcache)?;
        writeln!(f, "{}", self.pages)?;
        write!(
            f,
            "free: {} pages, {} buffers",
            self.free_pages, self.free_buffers
        )
    }
}
