//! Common traits implemented across the allocator families

use crate::stats::AllocatorStats;

/// Memory usage reporting
pub trait MemoryUsage {
    /// Bytes currently handed out to callers
    fn used_memory(&self) -> usize;

    /// Bytes still available, if the allocator can tell
    fn available_memory(&self) -> Option<usize>;

    /// Total capacity, if bounded
    fn total_memory(&self) -> Option<usize> {
        match (self.used_memory(), self.available_memory()) {
            (used, Some(avail)) => Some(used + avail),
            _ => None,
        }
    }
}

/// Bulk reset support
pub trait Resettable {
    /// Returns the allocator to its freshly initialized state.
    ///
    /// # Safety
    ///
    /// Caller must ensure:
    /// - No outstanding references to allocated memory exist
    /// - No concurrent operations are in flight on this allocator
    unsafe fn reset(&self);

    /// Whether this allocator supports reset at all
    fn can_reset(&self) -> bool {
        true
    }
}

/// Access to optional runtime statistics
pub trait StatisticsProvider {
    /// Snapshot of the counters; `None` when tracking is disabled
    fn statistics(&self) -> Option<AllocatorStats>;

    /// Reset the counters (no-op when tracking is disabled)
    fn reset_statistics(&self);
}
