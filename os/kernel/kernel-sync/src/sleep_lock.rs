use crate::park::{Park, TaskId};
use crate::{LockStats, LockStatsSnapshot};
use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const NO_HOLDER: TaskId = TaskId::MAX;

/// Exclusive lock whose waiters sleep instead of spinning.
///
/// Used where the holder may block for a long time, e.g. across disk I/O.
/// The lock remembers which task holds it so that ownership can be checked
/// ([`is_held_by_current`](Self::is_held_by_current)); releasing from any
/// other task is a fatal error.
///
/// Never acquire a `SleepLock` while holding a [`SpinLock`](crate::SpinLock).
pub struct SleepLock<T, P> {
    name: &'static str,
    locked: AtomicBool,
    holder: AtomicUsize,
    park: P,
    stats: LockStats,
    cell: UnsafeCell<T>,
}

unsafe impl<T: Send, P: Sync> Sync for SleepLock<T, P> {}
unsafe impl<T: Send, P: Send> Send for SleepLock<T, P> {}

impl<T, P> SleepLock<T, P> {
    pub const fn new(name: &'static str, park: P, value: T) -> Self {
        Self {
            name,
            locked: AtomicBool::new(false),
            holder: AtomicUsize::new(NO_HOLDER),
            park,
            stats: LockStats::new(),
            cell: UnsafeCell::new(value),
        }
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> LockStatsSnapshot {
        self.stats.snapshot()
    }

    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.cell.get_mut()
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }
}

impl<T, P: Park> SleepLock<T, P> {
    /// Acquire the lock, sleeping until it is free.
    pub fn lock(&self) -> SleepLockGuard<'_, T, P> {
        if !self.try_acquire() {
            self.stats.record_contention();
            loop {
                self.park
                    .park_while(&mut || self.locked.load(Ordering::Acquire));
                if self.try_acquire() {
                    break;
                }
            }
        }
        self.holder
            .store(self.park.current_task(), Ordering::Relaxed);
        self.stats.record_acquire();
        SleepLockGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    pub fn try_lock(&self) -> Option<SleepLockGuard<'_, T, P>> {
        if !self.try_acquire() {
            return None;
        }
        self.holder
            .store(self.park.current_task(), Ordering::Relaxed);
        self.stats.record_acquire();
        Some(SleepLockGuard {
            lock: self,
            _not_send: PhantomData,
        })
    }

    /// Whether the calling task holds this lock.
    #[must_use]
    pub fn is_held_by_current(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
            && self.holder.load(Ordering::Relaxed) == self.park.current_task()
    }

    fn unlock(&self) {
        assert!(
            self.is_held_by_current(),
            "{}: release by a task that does not hold the lock",
            self.name
        );
        self.holder.store(NO_HOLDER, Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
        self.park.unpark_all();
    }
}

/// Proof that the current task holds a [`SleepLock`]. Releases on drop.
///
/// The guard is neither `Send` nor `Sync`: the lock belongs to the task that
/// acquired it.
pub struct SleepLockGuard<'a, T, P: Park> {
    lock: &'a SleepLock<T, P>,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T, P: Park> SleepLockGuard<'a, T, P> {
    /// The lock this guard holds.
    #[inline]
    #[must_use]
    pub const fn lock(&self) -> &'a SleepLock<T, P> {
        self.lock
    }
}

impl<T, P: Park> Deref for SleepLockGuard<'_, T, P> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.cell.get() }
    }
}

impl<T, P: Park> DerefMut for SleepLockGuard<'_, T, P> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.cell.get() }
    }
}

impl<T, P: Park> Drop for SleepLockGuard<'_, T, P> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ThreadPark;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    /// A park whose "current task" is set by the test.
    struct FakePark {
        task: AtomicUsize,
    }

    impl Park for FakePark {
        fn current_task(&self) -> TaskId {
            self.task.load(Ordering::Relaxed)
        }

        fn park_while(&self, cond: &mut dyn FnMut() -> bool) {
            assert!(!cond(), "FakePark cannot sleep");
        }

        fn unpark_all(&self) {}
    }

    #[test]
    fn holder_is_tracked() {
        let l = SleepLock::new("test", ThreadPark::new(), 7u32);
        assert!(!l.is_held_by_current());
        {
            let g = l.lock();
            assert_eq!(*g, 7);
            assert!(l.is_held_by_current());
            assert!(l.try_lock().is_none());
        }
        assert!(!l.is_locked());
        assert!(!l.is_held_by_current());
    }

    #[test]
    fn other_thread_does_not_hold() {
        let l = Arc::new(SleepLock::new("test", ThreadPark::new(), ()));
        let _g = l.lock();
        let l2 = Arc::clone(&l);
        let held_elsewhere = thread::spawn(move || l2.is_held_by_current())
            .join()
            .unwrap();
        assert!(!held_elsewhere);
        assert!(l.is_held_by_current());
    }

    #[test]
    #[should_panic(expected = "does not hold the lock")]
    fn release_by_non_holder_is_fatal() {
        let l = SleepLock::new(
            "buffer",
            FakePark {
                task: AtomicUsize::new(1),
            },
            0u8,
        );
        let g = l.lock();
        l.park.task.store(2, Ordering::Relaxed);
        drop(g);
    }

    #[test]
    fn waiters_sleep_until_release() {
        let threads = 4;
        let iters = 200;
        let l = Arc::new(SleepLock::new("test", ThreadPark::new(), 0usize));
        let start = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let l = Arc::clone(&l);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    for _ in 0..iters {
                        let mut g = l.lock();
                        let seen = *g;
                        // Widen the window so that waiters actually park.
                        thread::yield_now();
                        *g = seen + 1;
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*l.lock(), threads * iters);
    }

    #[test]
    fn long_holder_blocks_others() {
        let l = Arc::new(SleepLock::new("disk", ThreadPark::new(), Vec::new()));
        let g = l.lock();

        let l2 = Arc::clone(&l);
        let waiter = thread::spawn(move || {
            l2.lock().push(2);
        });

        thread::sleep(Duration::from_millis(20));
        let mut g = g;
        g.push(1);
        drop(g);

        waiter.join().unwrap();
        assert_eq!(*l.lock(), vec![1, 2]);
    }
}
