use kernel_alloc::phys_mapper::IdentityPhysMapper;
use kernel_alloc::{Page, PageAllocError, PageAllocator, PagePoolConfig};
use kernel_info::memory::PGSIZE;
use kernel_info::param::{ALLOC_FILL, FREE_FILL};
use kernel_memory_addresses::PhysicalAddress;
use std::cell::Cell;
use std::collections::HashSet;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

std::thread_local! {
    static CPU: Cell<usize> = const { Cell::new(0) };
}

fn on_cpu(cpu: usize) {
    CPU.with(|c| c.set(cpu));
}

fn current_cpu() -> usize {
    CPU.with(Cell::get)
}

type Pages = PageAllocator<IdentityPhysMapper, fn() -> usize>;

/// Page-aligned host memory standing in for physical RAM.
#[repr(align(4096))]
struct Frame([u8; PGSIZE]);

fn pool(cpus: usize, pages: usize) -> (Vec<Frame>, Pages) {
    let arena: Vec<Frame> = (0..pages).map(|_| Frame([0; PGSIZE])).collect();
    let start = PhysicalAddress::from_ptr(arena.as_ptr());
    let end = start + (pages * PGSIZE) as u64;
    let alloc = PageAllocator::new(
        PagePoolConfig::new(cpus, start, end),
        IdentityPhysMapper,
        current_cpu as fn() -> usize,
    )
    .unwrap();
    (arena, alloc)
}

fn frame_of(arena: &[Frame], page: Page) -> &[u8; PGSIZE] {
    let base = PhysicalAddress::from_ptr(arena.as_ptr()).as_u64();
    let index = (page.base().as_u64() - base) as usize / PGSIZE;
    &arena[index].0
}

fn write_pattern(pages: &Pages, page: Page, seed: u8) {
    unsafe {
        pages.with_page_mut(page, |data| {
            for (i, b) in data.iter_mut().enumerate() {
                *b = seed.wrapping_add(i as u8);
            }
        });
    }
}

fn content(pages: &Pages, page: Page) -> Vec<u8> {
    unsafe { pages.with_page(page, |data| data.to_vec()) }
}

#[test]
fn allocate_then_free_restores_pool() {
    let (_arena, pages) = pool(2, 8);
    assert_eq!(pages.page_count(), 8);
    let before = pages.free_pages();
    assert_eq!(before, 8);

    let p = pages.allocate().unwrap();
    assert!(pages.contains(p));
    assert_eq!(pages.ref_count(p), 1);
    assert_eq!(pages.free_pages(), before - 1);

    pages.free(p);
    assert_eq!(pages.ref_count(p), 0);
    assert_eq!(pages.free_pages(), before);

    let s = pages.stats();
    assert_eq!((s.allocs, s.frees, s.released), (1, 1, 1));
}

#[test]
fn pages_are_filled_on_allocate_and_free() {
    let (arena, pages) = pool(1, 2);
    let p = pages.allocate().unwrap();
    assert!(frame_of(&arena, p).iter().all(|&b| b == ALLOC_FILL));

    write_pattern(&pages, p, 9);
    pages.free(p);
    assert!(frame_of(&arena, p).iter().all(|&b| b == FREE_FILL));
}

#[test]
fn sole_owner_writes_in_place() {
    let (_arena, pages) = pool(1, 4);
    let p = pages.allocate().unwrap();
    write_pattern(&pages, p, 3);
    let free_before = pages.free_pages();

    assert_eq!(pages.make_writable(p), Ok(p));
    assert_eq!(pages.ref_count(p), 1);
    assert_eq!(pages.free_pages(), free_before);
    assert_eq!(content(&pages, p)[..4], [3, 4, 5, 6]);

    let s = pages.stats();
    assert_eq!((s.cow_in_place, s.cow_copies), (1, 0));
}

#[test]
fn shared_page_is_copied() {
    let (_arena, pages) = pool(1, 4);
    let p = pages.allocate().unwrap();
    write_pattern(&pages, p, 42);
    pages.increment_share(p);
    assert_eq!(pages.ref_count(p), 2);

    let q = pages.make_writable(p).unwrap();
    assert_ne!(q, p);
    assert_eq!(pages.ref_count(p), 1);
    assert_eq!(pages.ref_count(q), 1);
    assert_eq!(content(&pages, q), content(&pages, p));
    assert_eq!(pages.free_pages(), 2);

    // The copy is private: writing it leaves the original alone.
    write_pattern(&pages, q, 0);
    assert_eq!(content(&pages, p)[0], 42);
    assert_eq!(pages.stats().cow_copies, 1);
}

#[test]
fn exhaustion_is_reported_and_recoverable() {
    let (_arena, pages) = pool(3, 7);
    let mut held = Vec::new();
    while let Some(p) = pages.allocate() {
        held.push(p);
    }
    assert_eq!(held.len(), 7);
    assert_eq!(held.iter().collect::<HashSet<_>>().len(), 7);
    assert!(pages.allocate().is_none());
    assert_eq!(pages.free_pages(), 0);

    let back = held.pop().unwrap();
    pages.free(back);
    assert!(pages.allocate().is_some());
    assert!(pages.allocate().is_none());
    // The drain's final attempt counts too.
    assert_eq!(pages.stats().oom, 3);
}

#[test]
fn freeing_a_shared_page_keeps_it_for_the_other_owner() {
    let (arena, pages) = pool(1, 4);
    let p = pages.allocate().unwrap();
    write_pattern(&pages, p, 7);
    pages.increment_share(p);
    let free_before = pages.free_pages();

    pages.free(p);
    assert_eq!(pages.ref_count(p), 1);
    assert_eq!(pages.free_pages(), free_before);
    assert_eq!(frame_of(&arena, p)[..3], [7, 8, 9]);

    // The remaining owner is now the sole owner.
    assert_eq!(pages.make_writable(p), Ok(p));
    write_pattern(&pages, p, 1);
    assert_eq!(content(&pages, p)[0], 1);
}

#[test]
fn copy_without_memory_leaves_page_shared() {
    let (_arena, pages) = pool(1, 2);
    let p = pages.allocate().unwrap();
    let other = pages.allocate().unwrap();
    pages.increment_share(p);

    assert_eq!(pages.make_writable(p), Err(PageAllocError::OutOfMemory));
    assert_eq!(pages.ref_count(p), 2);

    pages.free(other);
    let q = pages.make_writable(p).unwrap();
    assert_eq!(q, other);
    assert_eq!(pages.ref_count(p), 1);
}

#[test]
fn cpus_prefer_their_own_list_and_steal_round_robin() {
    let (_arena, pages) = pool(4, 16);
    for cpu in 0..4 {
        assert_eq!(pages.free_pages_on(cpu), 4);
    }

    on_cpu(2);
    let mine: Vec<_> = (0..4).map(|_| pages.allocate().unwrap()).collect();
    assert_eq!(pages.free_pages_on(2), 0);
    assert_eq!(pages.stats().steals, 0);

    let stolen = pages.allocate().unwrap();
    assert_eq!(pages.free_pages_on(3), 3);
    assert_eq!(pages.stats().steals, 1);

    // Freed pages go to the freeing CPU.
    on_cpu(0);
    pages.free(stolen);
    for p in mine {
        pages.free(p);
    }
    assert_eq!(pages.free_pages_on(0), 9);
    assert_eq!(pages.free_pages_on(2), 0);
    assert_eq!(pages.free_pages(), 16);
}

#[test]
#[should_panic(expected = "is not allocated")]
fn double_free_is_fatal() {
    let (_arena, pages) = pool(1, 2);
    let p = pages.allocate().unwrap();
    pages.free(p);
    pages.free(p);
}

#[test]
fn double_free_is_not_counted() {
    let (_arena, pages) = pool(1, 2);
    let p = pages.allocate().unwrap();
    pages.free(p);
    let err = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| pages.free(p)));
    assert!(err.is_err());
    let s = pages.stats();
    assert_eq!((s.frees, s.released), (1, 1));
    assert_eq!(pages.free_pages(), 2);
}

#[test]
#[should_panic(expected = "out of range")]
fn freeing_a_foreign_page_is_fatal() {
    let (_arena, pages) = pool(1, 2);
    pages.free(Page::from_addr(PhysicalAddress::new(0x1000)));
}

#[test]
#[should_panic(expected = "not page aligned")]
fn freeing_a_misaligned_address_is_fatal() {
    let (_arena, pages) = pool(1, 2);
    let p = pages.allocate().unwrap();
    pages.free_addr(p.base() + 8);
}

#[test]
#[should_panic(expected = "kshare")]
fn sharing_a_free_page_is_fatal() {
    let (_arena, pages) = pool(1, 2);
    let p = pages.allocate().unwrap();
    pages.free(p);
    pages.increment_share(p);
}

#[test]
#[should_panic(expected = "cow: ")]
fn resolving_a_free_page_is_fatal() {
    let (_arena, pages) = pool(1, 2);
    let p = pages.allocate().unwrap();
    pages.free(p);
    let _ = pages.make_writable(p);
}

#[test]
#[should_panic(expected = "has 2 owners")]
fn shared_pages_cannot_be_written_in_place() {
    let (_arena, pages) = pool(1, 2);
    let p = pages.allocate().unwrap();
    pages.increment_share(p);
    write_pattern(&pages, p, 0);
}

#[test]
fn concurrent_allocations_never_hand_out_a_page_twice() {
    const THREADS: usize = 4;
    const ROUNDS: usize = 500;

    let (_arena, pages) = pool(THREADS, 32);
    let pages = Arc::new(pages);
    let outstanding = Arc::new(Mutex::new(HashSet::new()));
    let start = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let pages = Arc::clone(&pages);
            let outstanding = Arc::clone(&outstanding);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                on_cpu(t);
                start.wait();
                let mut mine = Vec::new();
                for round in 0..ROUNDS {
                    if let Some(p) = pages.allocate() {
                        assert!(outstanding.lock().unwrap().insert(p), "{p} handed out twice");
                        write_pattern(&pages, p, t as u8);
                        mine.push(p);
                    }
                    if round % 3 == 0 || mine.len() > 6 {
                        if let Some(p) = mine.pop() {
                            assert_eq!(content(&pages, p)[0], t as u8);
                            assert!(outstanding.lock().unwrap().remove(&p));
                            pages.free(p);
                        }
                    }
                }
                for p in mine {
                    assert!(outstanding.lock().unwrap().remove(&p));
                    pages.free(p);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(pages.free_pages(), 32);
    let s = pages.stats();
    assert_eq!(s.allocs, s.released);
}

#[test]
fn concurrent_cow_faults_leave_one_owner_in_place() {
    const OWNERS: usize = 6;

    let (_arena, pages) = pool(2, 16);
    let pages = Arc::new(pages);
    let p = pages.allocate().unwrap();
    write_pattern(&pages, p, 11);
    for _ in 1..OWNERS {
        pages.increment_share(p);
    }
    let original = content(&pages, p);

    let start = Arc::new(Barrier::new(OWNERS));
    let handles: Vec<_> = (0..OWNERS)
        .map(|t| {
            let pages = Arc::clone(&pages);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                on_cpu(t % 2);
                start.wait();
                pages.make_writable(p).unwrap()
            })
        })
        .collect();

    let results: Vec<Page> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|&&r| r == p).count(), 1);
    assert_eq!(results.iter().collect::<HashSet<_>>().len(), OWNERS);
    for &r in &results {
        assert_eq!(pages.ref_count(r), 1);
        assert_eq!(content(&pages, r), original);
    }

    for r in results {
        pages.free(r);
    }
    assert_eq!(pages.free_pages(), 16);
}
