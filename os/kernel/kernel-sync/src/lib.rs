//! # Kernel synchronization primitives
//!
//! Two families of locks with different rules:
//!
//! | Lock | Waiting | May be held while blocking? |
//! |------|---------|-----------------------------|
//! | [`SpinLock`], [`SpinMutex`], [`TicketMutex`] | busy-wait | no |
//! | [`SleepLock`] | sleeps via [`Park`] | yes |
//!
//! Spin locks protect short metadata sections (list membership, counters).
//! Sleep locks protect data whose holder may block, such as a disk block
//! payload during I/O. A task must release every spin lock before it acquires
//! a sleep lock.
//!
//! All locks keep [`LockStats`] so contention on hot locks can be measured.

#![cfg_attr(not(any(test, doctest, feature = "std")), no_std)]
#![allow(unsafe_code)]

mod lock_stats;
mod mutex;
pub mod park;
mod raw_spin;
mod raw_ticket;
mod sleep_lock;
mod spin_lock;

pub use lock_stats::{LockStats, LockStatsSnapshot};
pub use mutex::{Mutex, MutexGuard};
#[cfg(any(test, feature = "std"))]
pub use park::ThreadPark;
pub use park::{Park, TaskId};
pub use raw_spin::RawSpin;
pub use raw_ticket::RawTicket;
pub use sleep_lock::{SleepLock, SleepLockGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};

pub type SpinMutex<T> = Mutex<T, RawSpin>;
pub type TicketMutex<T> = Mutex<T, RawTicket>;

impl<T> SpinMutex<T> {
    pub const fn new(value: T) -> Self {
        Self::from_raw(RawSpin::new(), value)
    }

    pub const fn named(name: &'static str, value: T) -> Self {
        Self::from_raw_named(name, RawSpin::new(), value)
    }
}

impl<T> TicketMutex<T> {
    pub const fn new(value: T) -> Self {
        Self::from_raw(RawTicket::new(), value)
    }

    pub const fn named(name: &'static str, value: T) -> Self {
        Self::from_raw_named(name, RawTicket::new(), value)
    }
}

pub trait RawLock {
    fn raw_lock(&self);
    fn raw_try_lock(&self) -> bool;
}

pub trait RawUnlock {
    /// # Safety
    /// The caller must hold the lock.
    unsafe fn raw_unlock(&self);
}
