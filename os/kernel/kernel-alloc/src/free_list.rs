use core::sync::atomic::{AtomicU32, Ordering};

/// List terminator.
pub const NIL: u32 = u32::MAX;

/// One CPU's free pages, singly linked through a side table of page indices.
///
/// The link word of a page belongs to the list the page is on; it is read and
/// written only under that list's lock, so `Relaxed` accesses suffice. Free
/// pages are never linked through their own memory, which keeps the fill
/// pattern intact.
pub struct CpuFreeList {
    head: u32,
    len: u32,
}

impl Default for CpuFreeList {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuFreeList {
    pub const fn new() -> Self {
        Self { head: NIL, len: 0 }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.head == NIL
    }

    pub fn push(&mut self, links: &[AtomicU32], page: u32) {
        links[page as usize].store(self.head, Ordering::Relaxed);
        self.head = page;
        self.len += 1;
    }

    pub fn pop(&mut self, links: &[AtomicU32]) -> Option<u32> {
        if self.is_empty() {
            return None;
        }
        let page = self.head;
        self.head = links[page as usize].swap(NIL, Ordering::Relaxed);
        self.len -= 1;
        Some(page)
    }
}
