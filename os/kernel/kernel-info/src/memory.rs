//! # Memory Layout

use kernel_memory_addresses::{PageSize, PhysicalAddress, Size4K};

/// Physical address where RAM starts and the kernel image is loaded.
pub const KERNBASE: PhysicalAddress = PhysicalAddress::new(0x8000_0000);

/// Amount of RAM the kernel manages.
pub const RAM_SIZE: u64 = 128 * 1024 * 1024; // 128 MiB

/// First physical address past usable RAM ("configured top").
///
/// The page allocator manages `[end of kernel image, PHYSTOP)`.
pub const PHYSTOP: PhysicalAddress = PhysicalAddress::new(KERNBASE.as_u64() + RAM_SIZE);

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything you map at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Size of one physical page in bytes.
pub const PGSIZE: usize = Size4K::BYTES;

const _: () = {
    assert!(KERNBASE.is_aligned::<Size4K>());
    assert!(PHYSTOP.is_aligned::<Size4K>());
    assert!(PHYSTOP.as_u64() > KERNBASE.as_u64());
    assert!(HHDM_BASE.checked_add(PHYSTOP.as_u64()).is_some());
};
