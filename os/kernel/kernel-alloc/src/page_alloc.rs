//! # Per-CPU page allocator with copy-on-write sharing
//!
//! ```text
//!   CPU 0 list ─┐   CPU 1 list ─┐         CPU n-1 list ─┐     SpinMutex each
//!   [slice 0]   │   [slice 1]   │   ...   [slice n-1]   │
//!               ▼               ▼                       ▼
//!           ┌─────────────────────────────────────────────────┐
//!           │ refcount table (one entry per page)             │  TicketMutex
//!           └─────────────────────────────────────────────────┘
//! ```
//!
//! Allocation pops from the current CPU's list and only falls back to the
//! other CPUs (round robin, starting at the next one) when it is empty. A
//! freed page goes to the freeing CPU's list, so pages drift between CPUs
//! over time.
//!
//! Sharing crosses CPUs, so all reference counts live in one table under one
//! lock. Lock order: table, then a CPU list (only taken that way while
//! resolving a copy-on-write fault).

use crate::config::{ConfigError, PagePoolConfig};
use crate::cpu::{CpuAffinity, CpuPin};
use crate::error::PageAllocError;
use crate::free_list::{CpuFreeList, NIL};
use crate::phys_mapper::PhysMapper;
use crate::refcount::RefCountTable;
use crate::stats::{AllocCounters, AllocStats, bump};
use alloc::boxed::Box;
use core::ptr;
use core::sync::atomic::AtomicU32;
use kernel_info::memory::PGSIZE;
use kernel_info::param::{ALLOC_FILL, FREE_FILL};
use kernel_memory_addresses::{Page, PageSize, PhysicalAddress, Size4K};
use kernel_sync::{LockStatsSnapshot, MutexGuard, RawTicket, SpinMutex, TicketMutex};
use log::{debug, info, warn};

/// Physical page allocator.
///
/// Pages are identified by their [`Page`] base address. The allocator never
/// touches page memory except to fill and copy it, through `M`.
pub struct PageAllocator<M, C> {
    config: PagePoolConfig,
    first: Page,
    pages: u32,
    mapper: M,
    cpus: C,
    lists: Box<[SpinMutex<CpuFreeList>]>,
    links: Box<[AtomicU32]>,
    refs: TicketMutex<RefCountTable>,
    counters: AllocCounters,
}

impl<M: PhysMapper, C: CpuAffinity> PageAllocator<M, C> {
    /// Take over the configured range and split it into one contiguous slice
    /// per CPU. Every page starts out free.
    ///
    /// The range must be ordinary RAM, owned by nobody else, and mapped by
    /// `mapper` for as long as the allocator lives.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the range or CPU count is unusable.
    pub fn new(config: PagePoolConfig, mapper: M, cpus: C) -> Result<Self, ConfigError> {
        let (first, pages) = config.pages()?;

        let links: Box<[AtomicU32]> = (0..pages).map(|_| AtomicU32::new(NIL)).collect();
        let mut refs = RefCountTable::new(pages as usize);
        let mut lists: Box<[SpinMutex<CpuFreeList>]> = (0..config.cpus)
            .map(|_| SpinMutex::named("kmem", CpuFreeList::new()))
            .collect();

        for (cpu, list) in lists.iter_mut().enumerate() {
            let list = list.get_mut();
            for page in config.slice_of(cpu, pages).rev() {
                refs.release(page);
                list.push(&links, page);
            }
        }

        info!(
            "kmem: {pages} pages at {} over {} CPUs",
            first.base(),
            config.cpus
        );

        Ok(Self {
            config,
            first,
            pages,
            mapper,
            cpus,
            lists,
            links,
            refs: TicketMutex::named("kmem.ref", refs),
            counters: AllocCounters::default(),
        })
    }

    /// Allocate one page, filled with [`ALLOC_FILL`], owned once.
    ///
    /// Returns `None` once every CPU's list is empty.
    pub fn allocate(&self) -> Option<Page> {
        let Some(index) = self.take_free() else {
            bump(&self.counters.oom);
            warn!("kalloc: out of memory");
            return None;
        };

        // The page is on no list and has no owner: it is ours alone.
        self.fill(index, ALLOC_FILL);
        self.refs.lock().claim(index);
        bump(&self.counters.allocs);
        Some(self.page_at(index))
    }

    /// Allocate while the caller already holds the table lock, as proven by
    /// its guard. The page content is left as is.
    fn allocate_locked(
        &self,
        table: &mut MutexGuard<'_, RefCountTable, RawTicket>,
    ) -> Option<u32> {
        let index = self.take_free()?;
        table.claim(index);
        bump(&self.counters.allocs);
        Some(index)
    }

    /// Pop a free page, preferring the current CPU.
    fn take_free(&self) -> Option<u32> {
        let pin = CpuPin::new(&self.cpus);
        let n = self.lists.len();
        let home = pin.cpu() % n;

        for i in 0..n {
            let cpu = (home + i) % n;
            if let Some(index) = self.lists[cpu].lock().pop(&self.links) {
                if i > 0 {
                    bump(&self.counters.steals);
                    debug!("kalloc: cpu {home} took a page from cpu {cpu}");
                }
                return Some(index);
            }
        }
        None
    }

    /// Drop one owner of `page`. The last owner returns it to the current
    /// CPU's free list, filled with [`FREE_FILL`].
    ///
    /// # Panics
    /// If `page` is outside the pool or has no owner (double free).
    pub fn free(&self, page: Page) {
        let index = self.index_of(page, "kfree");
        let remaining = self.refs.lock().release(index);
        let Some(remaining) = remaining else {
            panic!("kfree: page {page} is not allocated");
        };
        bump(&self.counters.frees);
        if remaining > 0 {
            return;
        }

        self.fill(index, FREE_FILL);
        let pin = CpuPin::new(&self.cpus);
        self.lists[pin.cpu() % self.lists.len()]
            .lock()
            .push(&self.links, index);
        bump(&self.counters.released);
    }

    /// [`free`](Self::free) by address.
    ///
    /// # Panics
    /// If `pa` is not page aligned, or as [`free`](Self::free).
    pub fn free_addr(&self, pa: PhysicalAddress) {
        let Some(page) = Page::from_aligned(pa) else {
            panic!("kfree: {pa} is not page aligned");
        };
        self.free(page);
    }

    /// Record one more owner of an allocated page, e.g. a child process
    /// mapping its parent's page read-only instead of copying it.
    ///
    /// # Panics
    /// If `page` is outside the pool or free.
    pub fn increment_share(&self, page: Page) {
        let index = self.index_of(page, "kshare");
        if self.refs.lock().share(index).is_none() {
            panic!("kshare: page {page} is not allocated");
        }
    }

    /// Resolve a copy-on-write fault on `page` for one of its owners.
    ///
    /// A sole owner gets `page` back and may write it in place. Otherwise the
    /// caller gets a fresh private copy and gives up its share of `page`.
    ///
    /// # Errors
    /// [`PageAllocError::OutOfMemory`] if a copy is needed and the pool is
    /// empty; `page` and its count are left untouched.
    ///
    /// # Panics
    /// If `page` is outside the pool or free.
    pub fn make_writable(&self, page: Page) -> Result<Page, PageAllocError> {
        let index = self.index_of(page, "cow");
        let mut table = self.refs.lock();

        match table.get(index) {
            0 => panic!("cow: page {page} is not allocated"),
            1 => {
                bump(&self.counters.cow_in_place);
                Ok(page)
            }
            _ => {
                let Some(copy) = self.allocate_locked(&mut table) else {
                    bump(&self.counters.oom);
                    warn!("cow: out of memory copying {page}");
                    return Err(PageAllocError::OutOfMemory);
                };
                table.release(index);
                // SAFETY: both pages are in the pool and distinct; `copy` has no
                // other owner and nobody writes `page` while it is shared.
                unsafe {
                    ptr::copy_nonoverlapping(
                        self.page_ptr(index).cast_const(),
                        self.page_ptr(copy),
                        PGSIZE,
                    );
                }
                drop(table);

                bump(&self.counters.cow_copies);
                let copy = self.page_at(copy);
                debug!("cow: copied {page} to {copy}");
                Ok(copy)
            }
        }
    }

    /// Read the content of an allocated page.
    ///
    /// # Safety
    /// The caller must be an owner of `page`, and no owner may write it for
    /// the duration of `f`.
    ///
    /// # Panics
    /// If `page` is outside the pool.
    pub unsafe fn with_page<R>(&self, page: Page, f: impl FnOnce(&[u8; PGSIZE]) -> R) -> R {
        let index = self.index_of(page, "with_page");
        // SAFETY: upheld by the caller.
        f(unsafe { &*self.page_ptr(index).cast::<[u8; PGSIZE]>() })
    }

    /// Write the content of a page the caller owns exclusively.
    ///
    /// # Safety
    /// The caller must be the sole owner of `page` and must not access it
    /// through any other path for the duration of `f`.
    ///
    /// # Panics
    /// If `page` is outside the pool or shared; shared pages are resolved
    /// with [`make_writable`](Self::make_writable) first.
    pub unsafe fn with_page_mut<R>(
        &self,
        page: Page,
        f: impl FnOnce(&mut [u8; PGSIZE]) -> R,
    ) -> R {
        let index = self.index_of(page, "with_page_mut");
        let owners = self.refs.lock().get(index);
        assert_eq!(owners, 1, "with_page_mut: page {page} has {owners} owners");
        // SAFETY: upheld by the caller.
        f(unsafe { &mut *self.page_ptr(index).cast::<[u8; PGSIZE]>() })
    }

    fn fill(&self, index: u32, byte: u8) {
        // SAFETY: pool pages are mapped and writable; callers only fill pages
        // that are on no list and have no owner besides themselves.
        unsafe { ptr::write_bytes(self.page_ptr(index), byte, PGSIZE) };
    }

    fn page_ptr(&self, index: u32) -> *mut u8 {
        self.mapper.phys_to_ptr(self.page_at(index).base())
    }
}

impl<M, C> PageAllocator<M, C> {
    #[must_use]
    pub const fn config(&self) -> &PagePoolConfig {
        &self.config
    }

    /// Number of pages managed, free or not.
    #[must_use]
    pub const fn page_count(&self) -> usize {
        self.pages as usize
    }

    #[must_use]
    pub fn contains(&self, page: Page) -> bool {
        self.try_index_of(page).is_some()
    }

    /// Current number of owners; 0 for a free page.
    ///
    /// # Panics
    /// If `page` is outside the pool.
    #[must_use]
    pub fn ref_count(&self, page: Page) -> u32 {
        let index = self.index_of(page, "ref_count");
        self.refs.lock().get(index)
    }

    /// Free pages over all CPUs.
    #[must_use]
    pub fn free_pages(&self) -> usize {
        self.lists.iter().map(|l| l.lock().len()).sum()
    }

    /// Free pages on one CPU's list.
    ///
    /// # Panics
    /// If `cpu` is not a configured CPU.
    #[must_use]
    pub fn free_pages_on(&self, cpu: usize) -> usize {
        self.lists[cpu].lock().len()
    }

    #[must_use]
    pub fn stats(&self) -> AllocStats {
        let cpu_locks = self
            .lists
            .iter()
            .map(|l| l.stats())
            .fold(LockStatsSnapshot::default(), |acc, s| acc + s);
        self.counters.snapshot(cpu_locks, self.refs.stats())
    }

    fn page_at(&self, index: u32) -> Page {
        Page::from_addr(self.first.base() + (u64::from(index) << Size4K::SHIFT))
    }

    fn try_index_of(&self, page: Page) -> Option<u32> {
        let index = self.first.pages_until(page);
        if page < self.first || index >= u64::from(self.pages) {
            return None;
        }
        u32::try_from(index).ok()
    }

    fn index_of(&self, page: Page, op: &str) -> u32 {
        self.try_index_of(page)
            .unwrap_or_else(|| panic!("{op}: page {page} out of range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::ThreadCpus;
    use crate::phys_mapper::IdentityPhysMapper;

    #[repr(align(4096))]
    struct Frame(#[allow(dead_code)] [u8; PGSIZE]);

    fn pool(cpus: usize, pages: usize) -> (Vec<Frame>, PageAllocator<IdentityPhysMapper, ThreadCpus>) {
        let arena: Vec<Frame> = (0..pages).map(|_| Frame([0; PGSIZE])).collect();
        let start = PhysicalAddress::from_ptr(arena.as_ptr());
        let config = PagePoolConfig::new(cpus, start, start + (pages * PGSIZE) as u64);
        let alloc = PageAllocator::new(config, IdentityPhysMapper, ThreadCpus).unwrap();
        (arena, alloc)
    }

    #[test]
    fn indices_cover_exactly_the_pool() {
        let (_arena, pages) = pool(1, 3);
        let first = pages.page_at(0);
        assert_eq!(pages.try_index_of(first), Some(0));
        assert_eq!(pages.try_index_of(pages.page_at(2)), Some(2));
        assert_eq!(pages.try_index_of(pages.page_at(3)), None);
        assert_eq!(
            pages.try_index_of(Page::from_addr(PhysicalAddress::new(
                first.base().as_u64() - 4096
            ))),
            None
        );
    }

    #[test]
    fn locked_allocation_claims_the_page() {
        let (_arena, pages) = pool(2, 4);
        let mut table = pages.refs.lock();
        let index = pages.allocate_locked(&mut table).unwrap();
        assert_eq!(table.get(index), 1);
        drop(table);
        assert_eq!(pages.free_pages(), 3);
        assert_eq!(ThreadCpus::pin_depth(), 0);
    }

    #[test]
    fn pins_are_balanced() {
        ThreadCpus::set_current(1);
        let (_arena, pages) = pool(2, 4);
        let p = pages.allocate().unwrap();
        pages.free(p);
        assert!(pages.allocate().is_some());
        assert_eq!(ThreadCpus::pin_depth(), 0);
    }
}
