//! # Physical Memory Address Types
//!
//! Strongly typed wrappers for physical addresses and page bases used by the
//! physical page allocator.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | A raw 64-bit physical address. |
//! | [`PhysicalPage<S>`] | A page-aligned base of a page of size [`S: PageSize`](PageSize). |
//!
//! Only [`Size4K`] is provided; it is the unit the page pool hands out.
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x8000_0042);
//! let page = pa.page::<Size4K>();
//! assert_eq!(page.base().as_u64(), 0x8000_0000);
//! assert_eq!(page.pages_until(PhysicalPage::from_addr(PhysicalAddress::new(0x8000_3000))), 3);
//! ```
//!
//! The types are `#[repr(transparent)]` and implement `Copy`, `Eq`, `Ord` and
//! `Hash`. All alignment helpers are `const fn`.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod page_size;
mod physical_address;
mod physical_page;

pub use page_size::{PageSize, Size4K};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;

/// A 4 KiB physical page, the unit of the page allocator.
pub type Page = PhysicalPage<Size4K>;
