//! Writing or releasing a buffer from a task that does not hold its lock.
//!
//! The park below reports a per-thread task id that a test can switch, so a
//! single thread can impersonate a second task.

use kernel_bio::{BufferCache, BufferCacheConfig, RamDisk};
use kernel_sync::{Park, TaskId};
use std::cell::Cell;
use std::mem::ManuallyDrop;

std::thread_local! {
    static CURRENT_TASK: Cell<TaskId> = const { Cell::new(1) };
}

fn switch_to(task: TaskId) {
    CURRENT_TASK.with(|t| t.set(task));
}

#[derive(Default)]
struct SwitchPark;

impl Park for SwitchPark {
    fn current_task(&self) -> TaskId {
        CURRENT_TASK.with(Cell::get)
    }

    fn park_while(&self, cond: &mut dyn FnMut() -> bool) {
        assert!(!cond(), "SwitchPark cannot sleep");
    }

    fn unpark_all(&self) {}
}

fn cache() -> BufferCache<RamDisk, SwitchPark> {
    BufferCache::new(BufferCacheConfig::default(), RamDisk::new()).unwrap()
}

#[test]
#[should_panic(expected = "brelse: not holding buffer lock")]
fn release_by_other_task_is_fatal() {
    let cache = cache();
    let buf = cache.read(1, 2);
    switch_to(2);
    cache.release(buf);
}

#[test]
#[should_panic(expected = "bwrite: not holding buffer lock")]
fn write_by_other_task_is_fatal() {
    let cache = cache();
    // Unlocking as task 2 while unwinding would abort the test.
    let mut buf = ManuallyDrop::new(cache.read(1, 2));
    buf[0] = 0xAB;
    switch_to(2);
    cache.write(&mut buf);
}

#[test]
fn write_by_holder_reaches_disk() {
    let cache = cache();
    let mut buf = cache.read(1, 3);
    buf[0] = 0xCD;
    cache.write(&mut buf);
    cache.release(buf);
    assert_eq!(cache.disk().block(1, 3)[0], 0xCD);
}
