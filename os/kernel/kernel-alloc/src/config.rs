use core::ops::Range;
use kernel_info::memory::PHYSTOP;
use kernel_info::param::NCPU;
use kernel_memory_addresses::{Page, PhysicalAddress, Size4K};

/// Physical range managed by the page allocator and the CPUs sharing it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PagePoolConfig {
    /// Number of per-CPU free lists.
    pub cpus: usize,
    /// First byte of the pool; rounded up to a page boundary.
    pub start: PhysicalAddress,
    /// One past the last byte; rounded down to a page boundary.
    pub end: PhysicalAddress,
}

impl PagePoolConfig {
    #[must_use]
    pub const fn new(cpus: usize, start: PhysicalAddress, end: PhysicalAddress) -> Self {
        Self { cpus, start, end }
    }

    /// All RAM between the end of the kernel image and [`PHYSTOP`], split
    /// across [`NCPU`] CPUs.
    #[must_use]
    pub const fn above_kernel(kernel_end: PhysicalAddress) -> Self {
        Self::new(NCPU, kernel_end, PHYSTOP)
    }

    /// First managed page and the number of pages.
    ///
    /// # Errors
    /// See [`ConfigError`].
    pub fn pages(&self) -> Result<(Page, u32), ConfigError> {
        if self.cpus == 0 {
            return Err(ConfigError::NoCpus);
        }
        let first = self.start.align_up::<Size4K>().page::<Size4K>();
        let last = self.end.align_down::<Size4K>().page::<Size4K>();
        let pages = first.pages_until(last);
        if pages == 0 {
            return Err(ConfigError::EmptyRange {
                start: self.start,
                end: self.end,
            });
        }
        // Free-list links are u32 page indices with u32::MAX as terminator.
        let pages = u32::try_from(pages)
            .ok()
            .filter(|&p| p < u32::MAX)
            .ok_or(ConfigError::TooManyPages(pages))?;
        Ok((first, pages))
    }

    /// Page indices seeded into the free list of `cpu`.
    ///
    /// Every CPU gets an equally sized contiguous slice; the last one also
    /// takes the remainder.
    #[must_use]
    pub fn slice_of(&self, cpu: usize, pages: u32) -> Range<u32> {
        #[allow(clippy::cast_possible_truncation)]
        let cpus = self.cpus as u32;
        #[allow(clippy::cast_possible_truncation)]
        let cpu = cpu as u32;
        let step = pages / cpus;
        let start = cpu * step;
        let end = if cpu + 1 == cpus { pages } else { start + step };
        start..end
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("page pool needs at least one CPU")]
    NoCpus,
    #[error("page pool {start}..{end} holds no whole page")]
    EmptyRange {
        start: PhysicalAddress,
        end: PhysicalAddress,
    },
    #[error("{0} pages exceed the page index space")]
    TooManyPages(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::memory::KERNBASE;

    #[test]
    fn rounds_inward() {
        let c = PagePoolConfig::new(
            2,
            PhysicalAddress::new(0x1_0010),
            PhysicalAddress::new(0x1_5FFF),
        );
        let (first, pages) = c.pages().unwrap();
        assert_eq!(first.base().as_u64(), 0x1_1000);
        assert_eq!(pages, 4);
    }

    #[test]
    fn rejects_degenerate_pools() {
        let a = PhysicalAddress::new(0x1000);
        assert_eq!(
            PagePoolConfig::new(0, a, a + 0x4000).pages(),
            Err(ConfigError::NoCpus)
        );
        assert_eq!(
            PagePoolConfig::new(1, a + 1, a + 0x1FFF).pages(),
            Err(ConfigError::EmptyRange {
                start: a + 1,
                end: a + 0x1FFF
            })
        );
        assert!(matches!(
            PagePoolConfig::new(1, PhysicalAddress::zero(), PhysicalAddress::new(1 << 46)).pages(),
            Err(ConfigError::TooManyPages(_))
        ));
    }

    #[test]
    fn last_cpu_takes_the_remainder() {
        let c = PagePoolConfig::new(3, PhysicalAddress::zero(), PhysicalAddress::zero());
        assert_eq!(c.slice_of(0, 10), 0..3);
        assert_eq!(c.slice_of(1, 10), 3..6);
        assert_eq!(c.slice_of(2, 10), 6..10);

        // More CPUs than pages: everything lands on the last CPU.
        let c = PagePoolConfig::new(4, PhysicalAddress::zero(), PhysicalAddress::zero());
        assert!(c.slice_of(0, 2).is_empty());
        assert_eq!(c.slice_of(3, 2), 0..2);
    }

    #[test]
    fn kernel_pool_ends_at_phystop() {
        let c = PagePoolConfig::above_kernel(KERNBASE + 0x20_0123);
        let (first, pages) = c.pages().unwrap();
        assert_eq!(first.base().as_u64(), KERNBASE.as_u64() + 0x20_1000);
        assert_eq!(
            u64::from(pages) * 4096,
            PHYSTOP.as_u64() - first.base().as_u64()
        );
    }
}
