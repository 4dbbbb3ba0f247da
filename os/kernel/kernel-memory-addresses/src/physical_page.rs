use crate::{PageSize, PhysicalAddress};
use core::fmt;
use core::marker::PhantomData;

/// Physical memory page base for size `S`.
///
/// ### Invariants
/// - The low `S::SHIFT` bits of the base are always zero (page aligned).
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pp = PhysicalPage::<Size4K>::from_addr(PhysicalAddress::new(0x8000_1234));
/// assert_eq!(pp.base().as_u64(), 0x8000_1000);
/// assert_eq!(pp.next().unwrap().base().as_u64(), 0x8000_2000);
/// assert!(PhysicalPage::<Size4K>::from_aligned(PhysicalAddress::new(0x8000_1234)).is_none());
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage<S: PageSize> {
    base: u64,
    _size: PhantomData<S>,
}

impl<S: PageSize> PhysicalPage<S> {
    /// Page containing `pa` (aligns down).
    #[inline]
    #[must_use]
    pub const fn from_addr(pa: PhysicalAddress) -> Self {
        Self {
            base: pa.align_down::<S>().as_u64(),
            _size: PhantomData,
        }
    }

    /// Page starting exactly at `pa`, or `None` if `pa` is not aligned.
    #[inline]
    #[must_use]
    pub const fn from_aligned(pa: PhysicalAddress) -> Option<Self> {
        if pa.is_aligned::<S>() {
            Some(Self::from_addr(pa))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.base)
    }

    /// The following page, `None` on address-space overflow.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        self.checked_add_pages(1)
    }

    /// The page `n` pages above this one.
    #[inline]
    #[must_use]
    pub const fn checked_add_pages(self, n: u64) -> Option<Self> {
        let Some(delta) = n.checked_mul(S::SIZE) else {
            return None;
        };
        match self.base.checked_add(delta) {
            Some(base) => Some(Self {
                base,
                _size: PhantomData,
            }),
            None => None,
        }
    }

    /// Number of whole pages from `self` up to (excluding) `end`; zero if `end <= self`.
    #[inline]
    #[must_use]
    pub const fn pages_until(self, end: Self) -> u64 {
        if end.base <= self.base {
            0
        } else {
            (end.base - self.base) >> S::SHIFT
        }
    }
}

impl<S: PageSize> fmt::Display for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}/{}", self.base, S::as_str())
    }
}

impl<S: PageSize> fmt::Debug for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage<{}>({:#018X})", S::as_str(), self.base)
    }
}

impl<S: PageSize> From<PhysicalPage<S>> for PhysicalAddress {
    #[inline]
    fn from(p: PhysicalPage<S>) -> Self {
        p.base()
    }
}
