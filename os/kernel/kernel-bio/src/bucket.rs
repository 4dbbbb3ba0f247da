//! Index-linked lists threading through the buffer pool.
//!
//! Every buffer slot owns one [`Link`]. A slot is either resident in exactly
//! one [`Bucket`] (doubly linked, so it can be unlinked in O(1)) or parked on
//! the [`FreeBufs`] list (singly linked through `next`). The link words of a
//! slot are only touched by whoever holds the lock of the list the slot is
//! currently on; that lock orders the `Relaxed` accesses.

use core::sync::atomic::{AtomicU32, Ordering};

/// List terminator.
pub const NIL: u32 = u32::MAX;

pub struct Link {
    prev: AtomicU32,
    next: AtomicU32,
}

impl Default for Link {
    fn default() -> Self {
        Self::new()
    }
}

impl Link {
    pub const fn new() -> Self {
        Self {
            prev: AtomicU32::new(NIL),
            next: AtomicU32::new(NIL),
        }
    }

    #[inline]
    fn prev(&self) -> u32 {
        self.prev.load(Ordering::Relaxed)
    }

    #[inline]
    fn next(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }

    #[inline]
    fn set_prev(&self, id: u32) {
        self.prev.store(id, Ordering::Relaxed);
    }

    #[inline]
    fn set_next(&self, id: u32) {
        self.next.store(id, Ordering::Relaxed);
    }

    #[inline]
    fn clear(&self) {
        self.set_prev(NIL);
        self.set_next(NIL);
    }
}

#[inline]
fn link(links: &[Link], id: u32) -> &Link {
    links.get(id as usize).unwrap_or_else(|| {
        panic!("bcache: bucket list corrupted (slot {id} out of range)")
    })
}

/// Resident buffers that hash to one bucket.
pub struct Bucket {
    head: u32,
    tail: u32,
    len: u32,
}

impl Default for Bucket {
    fn default() -> Self {
        Self::new()
    }
}

impl Bucket {
    pub const fn new() -> Self {
        Self {
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// Walk the list, verifying the back links and the recorded length.
    pub fn ids<'a>(&self, links: &'a [Link]) -> Ids<'a> {
        Ids {
            links,
            prev: NIL,
            cur: self.head,
            tail: self.tail,
            remaining: self.len,
        }
    }

    /// First resident slot accepted by `matches`.
    pub fn find(&self, links: &[Link], mut matches: impl FnMut(u32) -> bool) -> Option<u32> {
        self.ids(links).find(|&id| matches(id))
    }

    pub fn push_back(&mut self, links: &[Link], id: u32) {
        let node = link(links, id);
        node.set_prev(self.tail);
        node.set_next(NIL);
        if self.tail == NIL {
            self.head = id;
        } else {
            link(links, self.tail).set_next(id);
        }
        self.tail = id;
        self.len += 1;
    }

    pub fn unlink(&mut self, links: &[Link], id: u32) {
        let node = link(links, id);
        let (prev, next) = (node.prev(), node.next());

        if prev == NIL {
            assert_eq!(self.head, id, "bcache: bucket list corrupted (bad head)");
            self.head = next;
        } else {
            let p = link(links, prev);
            assert_eq!(p.next(), id, "bcache: bucket list corrupted (bad next link)");
            p.set_next(next);
        }

        if next == NIL {
            assert_eq!(self.tail, id, "bcache: bucket list corrupted (bad tail)");
            self.tail = prev;
        } else {
            let n = link(links, next);
            assert_eq!(n.prev(), id, "bcache: bucket list corrupted (bad prev link)");
            n.set_prev(prev);
        }

        node.clear();
        self.len -= 1;
    }
}

/// Checked iterator over a [`Bucket`].
pub struct Ids<'a> {
    links: &'a [Link],
    prev: u32,
    cur: u32,
    tail: u32,
    remaining: u32,
}

impl Iterator for Ids<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.cur == NIL {
            assert!(
                self.remaining == 0 && self.prev == self.tail,
                "bcache: bucket list corrupted (list ends early)"
            );
            return None;
        }
        assert!(
            self.remaining > 0,
            "bcache: bucket list corrupted (list longer than its length)"
        );

        let id = self.cur;
        let node = link(self.links, id);
        assert_eq!(
            node.prev(),
            self.prev,
            "bcache: bucket list corrupted (bad prev link)"
        );

        self.prev = id;
        self.cur = node.next();
        self.remaining -= 1;
        Some(id)
    }
}

/// Slots not resident in any bucket. Order is irrelevant.
pub struct FreeBufs {
    head: u32,
    len: u32,
}

impl Default for FreeBufs {
    fn default() -> Self {
        Self::new()
    }
}

impl FreeBufs {
    pub const fn new() -> Self {
        Self { head: NIL, len: 0 }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    pub fn push(&mut self, links: &[Link], id: u32) {
        let node = link(links, id);
        node.set_prev(NIL);
        node.set_next(self.head);
        self.head = id;
        self.len += 1;
    }

    pub fn pop(&mut self, links: &[Link]) -> Option<u32> {
        if self.head == NIL {
            return None;
        }
        let id = self.head;
        let node = link(links, id);
        self.head = node.next();
        node.clear();
        self.len -= 1;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(n: usize) -> Vec<Link> {
        (0..n).map(|_| Link::new()).collect()
    }

    #[test]
    fn push_and_unlink_keep_order() {
        let l = links(4);
        let mut b = Bucket::new();
        for id in [2, 0, 3] {
            b.push_back(&l, id);
        }
        assert_eq!(b.ids(&l).collect::<Vec<_>>(), vec![2, 0, 3]);

        b.unlink(&l, 0);
        assert_eq!(b.ids(&l).collect::<Vec<_>>(), vec![2, 3]);

        b.unlink(&l, 2);
        b.unlink(&l, 3);
        assert_eq!(b.len(), 0);
        assert_eq!(b.ids(&l).count(), 0);

        b.push_back(&l, 1);
        assert_eq!(b.find(&l, |id| id == 1), Some(1));
        assert_eq!(b.find(&l, |id| id == 2), None);
    }

    #[test]
    fn free_list_is_lifo() {
        let l = links(3);
        let mut f = FreeBufs::new();
        f.push(&l, 0);
        f.push(&l, 1);
        assert_eq!(f.len(), 2);
        assert_eq!(f.pop(&l), Some(1));
        assert_eq!(f.pop(&l), Some(0));
        assert_eq!(f.pop(&l), None);
        assert_eq!(f.len(), 0);
    }

    #[test]
    #[should_panic(expected = "bucket list corrupted")]
    fn broken_back_link_is_detected() {
        let l = links(3);
        let mut b = Bucket::new();
        b.push_back(&l, 0);
        b.push_back(&l, 1);
        l[1].set_prev(2);
        let _ = b.ids(&l).count();
    }

    #[test]
    #[should_panic(expected = "bucket list corrupted")]
    fn cycle_is_detected() {
        let l = links(2);
        let mut b = Bucket::new();
        b.push_back(&l, 0);
        b.push_back(&l, 1);
        l[1].set_next(0);
        let _ = b.ids(&l).count();
    }
}
