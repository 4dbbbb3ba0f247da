//! # CPU affinity
//!
//! The allocator prefers the free list of the CPU it runs on. That only makes
//! sense if the caller cannot migrate to another CPU halfway through, so every
//! allocation and free runs inside a [`CpuPin`]: on the kernel this disables
//! interrupts (nestable, `push_off`/`pop_off` style) and reads the CPU id.

/// Scheduler-side collaborator that pins the caller to its current CPU.
pub trait CpuAffinity {
    /// Stop the caller from migrating and return the id of its CPU.
    /// Calls nest; every call must be paired with [`unpin_current`](Self::unpin_current).
    fn pin_current(&self) -> usize;

    /// Undo one [`pin_current`](Self::pin_current).
    fn unpin_current(&self);
}

/// Any `Fn() -> usize` reports the current CPU and never migrates, which is
/// all a single-threaded caller or a test needs.
impl<F: Fn() -> usize> CpuAffinity for F {
    fn pin_current(&self) -> usize {
        self()
    }

    fn unpin_current(&self) {}
}

/// A machine with exactly one CPU.
#[derive(Debug, Default, Copy, Clone)]
pub struct SingleCpu;

impl CpuAffinity for SingleCpu {
    fn pin_current(&self) -> usize {
        0
    }

    fn unpin_current(&self) {}
}

/// RAII pin on the current CPU.
pub struct CpuPin<'a, C: CpuAffinity + ?Sized> {
    affinity: &'a C,
    cpu: usize,
}

impl<'a, C: CpuAffinity + ?Sized> CpuPin<'a, C> {
    pub fn new(affinity: &'a C) -> Self {
        let cpu = affinity.pin_current();
        Self { affinity, cpu }
    }

    #[inline]
    #[must_use]
    pub const fn cpu(&self) -> usize {
        self.cpu
    }
}

impl<C: CpuAffinity + ?Sized> Drop for CpuPin<'_, C> {
    fn drop(&mut self) {
        self.affinity.unpin_current();
    }
}

#[cfg(any(test, feature = "std"))]
pub use thread::ThreadCpus;

#[cfg(any(test, feature = "std"))]
mod thread {
    use super::CpuAffinity;
    use std::cell::Cell;

    std::thread_local! {
        static CPU: Cell<usize> = const { Cell::new(0) };
        static DEPTH: Cell<usize> = const { Cell::new(0) };
    }

    /// Host implementation of [`CpuAffinity`]: each thread claims to run on
    /// the CPU it last passed to [`ThreadCpus::set_current`] (CPU 0 by
    /// default). Pins are counted per thread.
    #[derive(Debug, Default, Copy, Clone)]
    pub struct ThreadCpus;

    impl ThreadCpus {
        /// Move the calling thread to `cpu`.
        ///
        /// # Panics
        /// If the thread is currently pinned.
        pub fn set_current(cpu: usize) {
            assert_eq!(Self::pin_depth(), 0, "cannot migrate while pinned");
            CPU.with(|c| c.set(cpu));
        }

        /// Nesting depth of the calling thread's pins.
        #[must_use]
        pub fn pin_depth() -> usize {
            DEPTH.with(Cell::get)
        }
    }

    impl CpuAffinity for ThreadCpus {
        fn pin_current(&self) -> usize {
            DEPTH.with(|d| d.set(d.get() + 1));
            CPU.with(Cell::get)
        }

        fn unpin_current(&self) {
            DEPTH.with(|d| {
                let depth = d.get();
                assert!(depth > 0, "pop_off: not pinned");
                d.set(depth - 1);
            });
        }
    }
}
