//! # Kernel Configuration
//!
//! Compile-time parameters and the physical memory layout shared by the
//! kernel's memory subsystems.
//!
//! * [`param`]: pool capacities (`NCPU`, `NBUF`, `NBUCKET`, `BSIZE`) and the
//!   page fill patterns.
//! * [`memory`]: physical layout (`KERNBASE`, `PHYSTOP`) and the higher-half
//!   direct map base.
//!
//! ## Physical Memory Layout
//!
//! ```text
//! KERNBASE    ┌─────────────────────────────────┐ 0x8000_0000
//!             │       Kernel Image              │
//!             │   (Text, Data, BSS)             │
//! end         ├─────────────────────────────────┤
//!             │    Available RAM                │
//!             │  (managed by the page pool,     │
//!             │   split into NCPU slices)       │
//! PHYSTOP     └─────────────────────────────────┘ KERNBASE + 128 MiB
//! ```
//!
//! Every constant is checked by `const` assertions, so an inconsistent
//! configuration fails the build instead of the boot.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
pub mod param;
