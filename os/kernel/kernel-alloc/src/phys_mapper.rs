//! # Physical memory mappers
//!
//! The page allocator hands out *physical* pages but has to write fill
//! patterns into them and copy them for copy-on-write. Code can only
//! dereference virtual addresses, so the allocator goes through a
//! [`PhysMapper`] that turns a physical address into a pointer in the current
//! address space.
//!
//! - [`HhdmPhysMapper`]: the kernel's higher-half direct map, every physical
//!   address is visible at `HHDM_BASE + pa`.
//! - [`IdentityPhysMapper`]: physical equals virtual. Early boot before the
//!   HHDM exists, and host tests that back the "physical" range with an
//!   ordinary heap allocation.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::phys_mapper::{IdentityPhysMapper, PhysMapper};
//! use kernel_memory_addresses::PhysicalAddress;
//!
//! let mut word = 0u64;
//! let pa = PhysicalAddress::from_ptr(&raw const word);
//! unsafe { *IdentityPhysMapper.phys_to_mut::<u64>(pa) = 7 };
//! assert_eq!(word, 7);
//! ```

use kernel_info::memory::HHDM_BASE;
use kernel_memory_addresses::PhysicalAddress;

/// Converts physical addresses into pointers the CPU can dereference.
pub trait PhysMapper {
    /// Pointer through which `pa` is visible. Computing it is always safe;
    /// dereferencing it is not.
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T;

    /// Borrow the `T` located at `pa`.
    ///
    /// # Safety
    /// - `pa` must be mapped, writable and suitably aligned for `T`.
    /// - No other reference to the same memory may be live for `'a`.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        // SAFETY: upheld by the caller.
        unsafe { &mut *self.phys_to_ptr::<T>(pa) }
    }
}

/// [`PhysMapper`] for kernels with a higher-half direct map (HHDM).
///
/// # Safety
/// The HHDM must be present and cover every physical address handed to it.
#[derive(Debug, Default, Copy, Clone)]
pub struct HhdmPhysMapper;

impl PhysMapper for HhdmPhysMapper {
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T {
        HHDM_BASE.wrapping_add(pa.as_u64()) as *mut T
    }
}

/// [`PhysMapper`] for 1:1 mapped memory.
#[derive(Debug, Default, Copy, Clone)]
pub struct IdentityPhysMapper;

impl PhysMapper for IdentityPhysMapper {
    fn phys_to_ptr<T>(&self, pa: PhysicalAddress) -> *mut T {
        pa.as_u64() as *mut T
    }
}
