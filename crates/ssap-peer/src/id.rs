use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out request ids: strictly increasing, starting at 1.
///
/// Each connection owns its own allocator.
#[derive(Debug)]
pub struct IdAllocator {
    last: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
