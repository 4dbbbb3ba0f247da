use alloc::boxed::Box;
use alloc::vec;

/// Number of owners per page, indexed by page number within the pool.
///
/// Allocated pages have a count of at least 1. Free pages have a count of 0.
/// Only reachable through the allocator's table lock, so holding a
/// `&mut RefCountTable` proves the lock is held.
pub struct RefCountTable {
    counts: Box<[u32]>,
}

impl RefCountTable {
    /// Every page starts out owned once; seeding the free lists releases
    /// that ownership.
    pub fn new(pages: usize) -> Self {
        Self {
            counts: vec![1; pages].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn get(&self, page: u32) -> u32 {
        self.counts[page as usize]
    }

    /// Hand a free page to its first owner.
    pub fn claim(&mut self, page: u32) {
        let count = &mut self.counts[page as usize];
        assert_eq!(*count, 0, "kalloc: free page {page} has owners");
        *count = 1;
    }

    /// Add an owner to an allocated page. Returns the new count.
    pub fn share(&mut self, page: u32) -> Option<u32> {
        let count = &mut self.counts[page as usize];
        if *count == 0 {
            return None;
        }
        *count += 1;
        Some(*count)
    }

    /// Drop an owner. Returns the remaining count, `None` if the page had no
    /// owner to begin with.
    pub fn release(&mut self, page: u32) -> Option<u32> {
        let count = &mut self.counts[page as usize];
        if *count == 0 {
            return None;
        }
        *count -= 1;
        Some(*count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let mut t = RefCountTable::new(2);
        assert_eq!(t.get(1), 1);
        assert_eq!(t.release(1), Some(0));
        assert_eq!(t.release(1), None);
        assert_eq!(t.share(1), None);

        t.claim(1);
        assert_eq!(t.share(1), Some(2));
        assert_eq!(t.release(1), Some(1));
        assert_eq!(t.get(0), 1);
    }

    #[test]
    #[should_panic(expected = "has owners")]
    fn claiming_an_owned_page_is_fatal() {
        let mut t = RefCountTable::new(1);
        t.claim(0);
    }
}
