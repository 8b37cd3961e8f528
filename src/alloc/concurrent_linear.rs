//! Lock-free linear (bump) allocator

use core::alloc::Layout;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::alloc::LinearConfig;
use crate::error::MemoryResult;
use crate::region::{DEFAULT_ALIGNMENT, MemoryRegion};
use crate::stats::OptionalStats;
use crate::traits::{MemoryUsage, Resettable, StatisticsProvider};
use crate::utils::{Backoff, align_up};

/// Bump allocator whose cursor is advanced by compare-and-swap
///
/// Same contract as [`LinearAllocator`](crate::alloc::LinearAllocator)
/// but safe to call from many threads: each allocation claims its range
/// with a single CAS on the cursor, so concurrent allocations never
/// overlap. Reset remains a bulk, externally synchronized operation.
///
/// `allocate` gives up after [`LinearConfig::max_retries`] lost races and
/// returns `None`; with a bounded number of threads the loop is in
/// practice a handful of iterations.
pub struct ConcurrentLinearAllocator {
    region: MemoryRegion,
    cursor: AtomicUsize,
    config: LinearConfig,
    stats: OptionalStats,
}

impl ConcurrentLinearAllocator {
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
        let cursor = AtomicUsize::new(region.base_addr());
        Self {
            region,
            cursor,
            config,
            stats,
        }
    }

    /// Allocates `size` bytes aligned to `align`
    ///
    /// Returns `None` when the request does not fit, when `size` is zero
    /// or `align` is not a power of two, or when the CAS loop lost
    /// [`LinearConfig::max_retries`] races in a row. The cursor only
    /// moves for successful allocations.
    pub fn allocate(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        if size == 0 || !align.is_power_of_two() {
            return None;
        }

        let mut backoff = Backoff::new();
        let mut attempts = 0;

        loop {
            let current = self.cursor.load(Ordering::Acquire);
            let aligned = align_up(current, align);
            let end = aligned.checked_add(size)?;
            if end > self.region.end_addr() {
                self.stats.record_allocation_failure();
                return None;
            }

            match self.cursor.compare_exchange_weak(
                current,
                end,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if let Some(pattern) = self.config.alloc_pattern {
                        // SAFETY: the CAS claimed [aligned, end) for this
                        // thread; the range is inside the region.
                        unsafe {
                            (aligned as *mut u8).write_bytes(pattern, size);
                        }
                    }

                    self.stats.record_allocation(end - current);
                    self.stats.record_usage(end - self.region.base_addr());
                    // SAFETY: aligned >= base > 0.
                    return Some(unsafe { NonNull::new_unchecked(aligned as *mut u8) });
                }
                Err(_) => {
                    attempts += 1;
                    if attempts >= self.config.max_retries {
                        self.stats.record_allocation_failure();
                        return None;
                    }
                    if self.config.use_backoff {
                        backoff.spin_or_yield();
                    }
                }
            }
        }
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
        addr >= self.region.base_addr() && addr < self.cursor.load(Ordering::Acquire)
    }

    /// Total capacity in bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// Bytes remaining
    #[inline]
    pub fn remaining(&self) -> usize {
        self.region.end_addr() - self.cursor.load(Ordering::Acquire)
    }
}

impl MemoryUsage for ConcurrentLinearAllocator {
    fn used_memory(&self) -> usize {
        self.cursor.load(Ordering::Acquire) - self.region.base_addr()
    }

    fn available_memory(&self) -> Option<usize> {
        Some(self.remaining())
    }
}

impl Resettable for ConcurrentLinearAllocator {
    unsafe fn reset(&self) {
        self.cursor.store(self.region.base_addr(), Ordering::Release);
    }
}

impl StatisticsProvider for ConcurrentLinearAllocator {
    fn statistics(&self) -> Option<crate::stats::AllocatorStats> {
        self.stats.snapshot()
    }

    fn reset_statistics(&self) {
        self.stats.reset();
    }
}

impl core::fmt::Debug for ConcurrentLinearAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConcurrentLinearAllocator")
            .field("capacity", &self.capacity())
            .field("used", &self.used_memory())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_single_thread_bump() {
        let arena = ConcurrentLinearAllocator::new(1024).unwrap();
        let a = arena.allocate(100, 8).unwrap();
        let b = arena.allocate(100, 8).unwrap();
        assert!(b.as_ptr() as usize >= a.as_ptr() as usize + 100);
        assert!(arena.allocate(0, 8).is_none());
    }

    #[test]
    fn test_failed_allocation_keeps_cursor() {
        let arena = ConcurrentLinearAllocator::new(256).unwrap();
        arena.allocate(200, 8).unwrap();
        let used = arena.used_memory();
        assert!(arena.allocate(128, 8).is_none());
        assert_eq!(arena.used_memory(), used);
    }

    #[test]
    fn test_concurrent_allocations_are_disjoint() {
        let arena = Arc::new(
            ConcurrentLinearAllocator::with_config(
                1 << 20,
                LinearConfig::production(),
            )
            .unwrap(),
        );

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let arena = Arc::clone(&arena);
                std::thread::spawn(move || {
                    let mut ranges = Vec::new();
                    for _ in 0..1000 {
                        if let Some(p) = arena.allocate(64, 8) {
                            ranges.push(p.as_ptr() as usize);
                        }
                    }
                    ranges
                })
            })
            .collect();

        let mut all: Vec<usize> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        for pair in all.windows(2) {
            assert!(pair[1] >= pair[0] + 64, "overlapping allocations");
        }
    }

    #[test]
    fn test_reset() {
        let arena = ConcurrentLinearAllocator::new(512).unwrap();
        arena.allocate(500, 8).unwrap();
        // SAFETY: no pointers from before the reset are used afterwards.
        unsafe { arena.reset() };
        assert_eq!(arena.used_memory(), 0);
        assert!(arena.allocate(500, 8).is_some());
    }
}
