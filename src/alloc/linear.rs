//! Single-owner linear (bump) allocator

use core::alloc::Layout;
use core::cell::Cell;
use core::ptr::NonNull;

use crate::error::MemoryResult;
use crate::region::{DEFAULT_ALIGNMENT, MemoryRegion};
use crate::stats::OptionalStats;
use crate::traits::{MemoryUsage, Resettable, StatisticsProvider};
use crate::utils::align_up;

/// Configuration for linear allocators
#[derive(Debug, Clone)]
pub struct LinearConfig {
    /// Enable statistics tracking
    pub track_stats: bool,

    /// Fill pattern byte for newly allocated ranges (for debugging)
    pub alloc_pattern: Option<u8>,

    /// Use exponential backoff for CAS retries (concurrent variant only)
    pub use_backoff: bool,

    /// Maximum contended CAS retries before an allocate attempt gives up
    /// (concurrent variant only)
    pub max_retries: usize,
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self {
            track_stats: cfg!(debug_assertions),
            alloc_pattern: if cfg!(debug_assertions) {
                Some(0xBB)
            } else {
                None
            },
            use_backoff: true,
            max_retries: 1000,
        }
    }
}

impl LinearConfig {
    /// Production configuration - optimized for performance
    #[must_use]
    pub fn production() -> Self {
        Self {
            track_stats: false,
            alloc_pattern: None,
            use_backoff: true,
            max_retries: 10000,
        }
    }

    /// Debug configuration - optimized for debugging
    #[must_use]
    pub fn debug() -> Self {
        Self {
            track_stats: true,
            alloc_pattern: Some(0xBB),
            use_backoff: false,
            max_retries: 100,
        }
    }
}

/// Bump allocator over a contiguous region
///
/// Allocation aligns the cursor, checks against the region end and
/// advances. Individual frees do not exist; the whole allocation set is
/// discarded at once with [`reset`](Resettable::reset). The classic use is
/// per-frame scratch memory: allocate all frame, reset at frame end.
///
/// A failed allocation leaves the cursor untouched, so a too-large request
/// never poisons the remaining space.
///
/// Single-owner: the cursor is a [`Cell`], so the type is `!Sync`. For
/// cross-thread bumping see
/// [`ConcurrentLinearAllocator`](crate::alloc::ConcurrentLinearAllocator).
pub struct LinearAllocator {
    region: MemoryRegion,
    cursor: Cell<usize>,
    config: LinearConfig,
    stats: OptionalStats,
}

impl LinearAllocator {
    /// Creates an allocator over a freshly allocated owned region
    ///
    /// # Errors
    /// Returns an error if `capacity` is zero or the backing allocation
    /// fails.
    pub fn new(capacity: usize) -> MemoryResult<Self> {
        Self::with_config(capacity, LinearConfig::default())
    }

    /// Creates an allocator over an owned region with explicit
    /// configuration
    ///
    /// # Errors
    /// Returns an error if `capacity` is zero or the backing allocation
    /// fails.
    pub fn with_config(capacity: usize, config: LinearConfig) -> MemoryResult<Self> {
        let region = MemoryRegion::alloc(capacity, DEFAULT_ALIGNMENT)?;
        Ok(Self::with_region(region, config))
    }

    /// Creates an allocator over a caller-supplied region
    #[must_use]
    pub fn with_region(region: MemoryRegion, config: LinearConfig) -> Self {
        let stats = if config.track_stats {
            OptionalStats::enabled()
        } else {
            OptionalStats::disabled()
        };
        let cursor = Cell::new(region.base_addr());
        Self {
            region,
            cursor,
            config,
            stats,
        }
    }

    /// Allocates `size` bytes aligned to `align`
    ///
    /// Returns `None` when the request does not fit in the remaining
    /// space, when `size` is zero, or when `align` is not a power of two.
    /// The cursor is unchanged on failure.
    #[inline]
    pub fn allocate(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        if size == 0 || !align.is_power_of_two() {
            return None;
        }

        let current = self.cursor.get();
        let aligned = align_up(current, align);
        let end = aligned.checked_add(size)?;
        if end > self.region.end_addr() {
            self.stats.record_allocation_failure();
            return None;
        }

        self.cursor.set(end);

        if let Some(pattern) = self.config.alloc_pattern {
            // SAFETY: [aligned, end) is inside the region and now owned by
            // the caller.
            unsafe {
                (aligned as *mut u8).write_bytes(pattern, size);
            }
        }

        self.stats.record_allocation(end - current);
        self.stats.record_usage(self.used_memory());
        // SAFETY: aligned >= base > 0.
        Some(unsafe { NonNull::new_unchecked(aligned as *mut u8) })
    }

    /// Allocates according to a [`Layout`]
    #[inline]
    pub fn allocate_layout(&self, layout: Layout) -> Option<NonNull<u8>> {
        self.allocate(layout.size(), layout.align())
    }

    /// Whether `ptr` points into the currently allocated prefix
    #[inline]
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        addr >= self.region.base_addr() && addr < self.cursor.get()
    }

    /// Total capacity in bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// Bytes remaining
    #[inline]
    pub fn remaining(&self) -> usize {
        self.region.end_addr() - self.cursor.get()
    }
}

impl MemoryUsage for LinearAllocator {
    fn used_memory(&self) -> usize {
        self.cursor.get() - self.region.base_addr()
    }

    fn available_memory(&self) -> Option<usize> {
        Some(self.remaining())
    }
}

impl Resettable for LinearAllocator {
    unsafe fn reset(&self) {
        self.cursor.set(self.region.base_addr());
    }
}

impl StatisticsProvider for LinearAllocator {
    fn statistics(&self) -> Option<crate::stats::AllocatorStats> {
        self.stats.snapshot()
    }

    fn reset_statistics(&self) {
        self.stats.reset();
    }
}

impl core::fmt::Debug for LinearAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LinearAllocator")
            .field("capacity", &self.capacity())
            .field("used", &self.used_memory())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_allocations_are_disjoint() {
        let arena = LinearAllocator::new(1024).unwrap();
        let a = arena.allocate(100, 8).unwrap();
        let b = arena.allocate(100, 8).unwrap();
        assert!(b.as_ptr() as usize >= a.as_ptr() as usize + 100);
        assert!(arena.used_memory() >= 200);
    }

    #[test]
    fn test_alignment_honored() {
        let arena = LinearAllocator::new(4096).unwrap();
        arena.allocate(3, 1).unwrap();
        let aligned = arena.allocate(64, 64).unwrap();
        assert_eq!(aligned.as_ptr() as usize % 64, 0);
    }

    #[test]
    fn test_failed_allocation_keeps_cursor() {
        let arena = LinearAllocator::new(256).unwrap();
        arena.allocate(200, 8).unwrap();
        let used = arena.used_memory();
        assert!(arena.allocate(128, 8).is_none());
        assert_eq!(arena.used_memory(), used);
        // A smaller request still fits.
        assert!(arena.allocate(32, 8).is_some());
    }

    #[test]
    fn test_zero_size_and_bad_align_rejected() {
        let arena = LinearAllocator::new(256).unwrap();
        assert!(arena.allocate(0, 8).is_none());
        assert!(arena.allocate(8, 3).is_none());
    }

    #[test]
    fn test_reset_reclaims_everything() {
        let arena = LinearAllocator::new(512).unwrap();
        arena.allocate(400, 8).unwrap();
        assert!(arena.allocate(400, 8).is_none());
        // SAFETY: no pointers from before the reset are used afterwards.
        unsafe { arena.reset() };
        assert_eq!(arena.used_memory(), 0);
        assert!(arena.allocate(400, 8).is_some());
    }

    #[test]
    fn test_contains_tracks_cursor() {
        let arena = LinearAllocator::new(256).unwrap();
        let p = arena.allocate(64, 8).unwrap();
        assert!(arena.contains(p.as_ptr()));
        // Past the cursor is not an allocation.
        let beyond = (p.as_ptr() as usize + 128) as *const u8;
        assert!(!arena.contains(beyond));
    }

    #[test]
    fn test_allocate_layout() {
        let arena = LinearAllocator::new(256).unwrap();
        let layout = Layout::new::<[u64; 4]>();
        let p = arena.allocate_layout(layout).unwrap();
        assert_eq!(p.as_ptr() as usize % layout.align(), 0);
    }

    #[test]
    fn test_stats() {
        let arena = LinearAllocator::with_config(256, LinearConfig::debug()).unwrap();
        arena.allocate(64, 8).unwrap();
        arena.allocate(1024, 8);
        let stats = arena.statistics().unwrap();
        assert_eq!(stats.allocation_count, 1);
        assert_eq!(stats.failed_allocations, 1);
    }
}
