/// Recoverable page allocator failures.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageAllocError {
    /// Every CPU's free list is empty.
    #[error("out of physical memory")]
    OutOfMemory,
}
