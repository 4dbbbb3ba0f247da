//! # Physical Page Allocation
//!
//! Hands out 4 KiB physical pages to the rest of the kernel (page tables,
//! process memory, kernel stacks, pipe buffers) and tracks how many owners
//! each page has, so that a forked process can share its parent's pages
//! until one of them writes.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Page Allocator ([`PageAllocator`])     │
//! │    • Per-CPU free lists, cross-CPU stealing         │
//! │    • Reference counts for copy-on-write sharing     │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              Physical Mapper ([`phys_mapper`])      │
//! │    • HHDM in the kernel, identity on the host       │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              CPU Affinity ([`cpu`])                 │
//! │    • Pins the caller to its CPU while it allocates  │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Page lifecycle
//!
//! | Operation | Count before | Count after |
//! |-----------|--------------|-------------|
//! | [`allocate`](PageAllocator::allocate) | 0 (free) | 1 |
//! | [`increment_share`](PageAllocator::increment_share) | n ≥ 1 | n + 1 |
//! | [`free`](PageAllocator::free) | n ≥ 1 | n − 1; at 0 the page is free again |
//! | [`make_writable`](PageAllocator::make_writable) | 1 | 1, same page |
//! | [`make_writable`](PageAllocator::make_writable) | n > 1 | n − 1, caller gets a copy with count 1 |
//!
//! Running out of pages is not fatal: [`allocate`](PageAllocator::allocate)
//! returns `None` and [`make_writable`](PageAllocator::make_writable) returns
//! [`PageAllocError::OutOfMemory`]. Freeing a page that is not allocated,
//! lies outside the pool or is misaligned is a kernel bug and panics.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::{PageAllocator, PagePoolConfig, SingleCpu};
//! use kernel_alloc::phys_mapper::IdentityPhysMapper;
//! use kernel_memory_addresses::PhysicalAddress;
//!
//! #[repr(align(4096))]
//! struct Frame([u8; 4096]);
//!
//! let arena: Vec<Frame> = (0..4).map(|_| Frame([0; 4096])).collect();
//! let start = PhysicalAddress::from_ptr(arena.as_ptr());
//! let config = PagePoolConfig::new(1, start, start + 4 * 4096);
//! let pages = PageAllocator::new(config, IdentityPhysMapper, SingleCpu).unwrap();
//!
//! let page = pages.allocate().unwrap();
//! pages.increment_share(page);
//! let private = pages.make_writable(page).unwrap();
//! assert_ne!(private, page);
//! assert_eq!(pages.ref_count(page), 1);
//! pages.free(page);
//! pages.free(private);
//! assert_eq!(pages.free_pages(), 4);
//! ```

#![cfg_attr(not(any(test, doctest, feature = "std")), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod config;
pub mod cpu;
mod error;
mod free_list;
mod page_alloc;
pub mod phys_mapper;
mod refcount;
mod stats;

pub use config::{ConfigError, PagePoolConfig};
#[cfg(any(test, feature = "std"))]
pub use cpu::ThreadCpus;
pub use cpu::{CpuAffinity, CpuPin, SingleCpu};
pub use error::PageAllocError;
pub use kernel_memory_addresses::Page;
pub use page_alloc::PageAllocator;
pub use stats::AllocStats;
