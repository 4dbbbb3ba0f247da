//! # Scheduler hook for blocking locks
//!
//! A [`SleepLock`](crate::SleepLock) must give up the CPU while it waits, which
//! only the scheduler can do. The scheduler therefore hands each sleep lock a
//! [`Park`] implementation: a wait channel that can put the calling task to
//! sleep until a condition clears and wake every sleeper again.
//!
//! The contract mirrors classic `sleep`/`wakeup` on a channel:
//!
//! - [`Park::park_while`] evaluates `cond` under the channel's own lock and
//!   sleeps for as long as it returns `true`. A wakeup that races with the
//!   evaluation must not be lost.
//! - [`Park::unpark_all`] wakes every task parked on the channel. Callers make
//!   the condition false *before* unparking.

/// Identity of a schedulable task (process or kernel thread).
pub type TaskId = usize;

/// A wait channel provided by the scheduler.
pub trait Park {
    /// The task executing the caller.
    fn current_task(&self) -> TaskId;

    /// Sleep while `cond()` holds.
    fn park_while(&self, cond: &mut dyn FnMut() -> bool);

    /// Wake all tasks sleeping in [`park_while`](Self::park_while).
    fn unpark_all(&self);
}

#[cfg(any(test, feature = "std"))]
pub use thread::ThreadPark;

#[cfg(any(test, feature = "std"))]
mod thread {
    use super::{Park, TaskId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Condvar, Mutex, PoisonError};

    static NEXT_TASK: AtomicUsize = AtomicUsize::new(1);

    std::thread_local! {
        static TASK: TaskId = NEXT_TASK.fetch_add(1, Ordering::Relaxed);
    }

    /// Host implementation of [`Park`]: every OS thread is a task, parking
    /// waits on a condition variable.
    #[derive(Default)]
    pub struct ThreadPark {
        gate: Mutex<()>,
        wakeup: Condvar,
    }

    impl ThreadPark {
        #[must_use]
        pub const fn new() -> Self {
            Self {
                gate: Mutex::new(()),
                wakeup: Condvar::new(),
            }
        }
    }

    impl Park for ThreadPark {
        fn current_task(&self) -> TaskId {
            TASK.with(|id| *id)
        }

        fn park_while(&self, cond: &mut dyn FnMut() -> bool) {
            let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
            while cond() {
                gate = self
                    .wakeup
                    .wait(gate)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }

        fn unpark_all(&self) {
            // Taking the gate orders us after any sleeper that already checked its condition.
            drop(self.gate.lock().unwrap_or_else(PoisonError::into_inner));
            self.wakeup.notify_all();
        }
    }
}
