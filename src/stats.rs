//! Allocator statistics tracking
//!
//! Provides a snapshot type plus a runtime-gated atomic recorder. Tracking
//! is controlled by each allocator's config (`track_stats`), so production
//! builds can run with zero bookkeeping on the hot path.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::utils::atomic_max;

/// Statistics snapshot for memory allocators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Total number of successful allocations
    pub allocation_count: usize,
    /// Total number of deallocations
    pub deallocation_count: usize,
    /// Number of failed allocations (exhaustion or contention give-up)
    pub failed_allocations: usize,
    /// Peak bytes allocated at any one time
    pub peak_allocated_bytes: usize,
    /// Total bytes ever allocated (cumulative)
    pub total_bytes_allocated: usize,
    /// Total bytes ever deallocated (cumulative)
    pub total_bytes_deallocated: usize,
}

impl AllocatorStats {
    /// Creates a new empty stats object
    pub const fn new() -> Self {
        Self {
            allocation_count: 0,
            deallocation_count: 0,
            failed_allocations: 0,
            peak_allocated_bytes: 0,
            total_bytes_allocated: 0,
            total_bytes_deallocated: 0,
        }
    }

    /// Number of allocations that have not been matched by a deallocation
    pub fn allocation_balance(&self) -> isize {
        self.allocation_count as isize - self.deallocation_count as isize
    }

    /// Fraction of allocation attempts that succeeded (0.0 to 1.0)
    pub fn allocation_efficiency(&self) -> f64 {
        let attempts = self.allocation_count + self.failed_allocations;
        if attempts > 0 {
            self.allocation_count as f64 / attempts as f64
        } else {
            1.0
        }
    }
}

impl core::fmt::Display for AllocatorStats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "Allocator statistics:")?;
        writeln!(f, "  Allocations: {}", self.allocation_count)?;
        writeln!(f, "  Deallocations: {}", self.deallocation_count)?;
        writeln!(f, "  Failed allocations: {}", self.failed_allocations)?;
        writeln!(f, "  Peak allocated: {} bytes", self.peak_allocated_bytes)?;
        writeln!(
            f,
            "  Efficiency: {:.2}%",
            self.allocation_efficiency() * 100.0
        )
    }
}

/// Atomic statistics recorder that can be disabled at construction
///
/// When disabled, every record call is a branch on a bool and nothing else.
#[derive(Debug)]
pub struct OptionalStats {
    enabled: bool,
    allocation_count: AtomicUsize,
    deallocation_count: AtomicUsize,
    failed_allocations: AtomicUsize,
    peak_allocated_bytes: AtomicUsize,
    total_bytes_allocated: AtomicUsize,
    total_bytes_deallocated: AtomicUsize,
}

impl OptionalStats {
    /// Creates an enabled recorder
    pub const fn enabled() -> Self {
        Self::with_enabled(true)
    }

    /// Creates a disabled recorder (all record calls are no-ops)
    pub const fn disabled() -> Self {
        Self::with_enabled(false)
    }

    const fn with_enabled(enabled: bool) -> Self {
        Self {
            enabled,
            allocation_count: AtomicUsize::new(0),
            deallocation_count: AtomicUsize::new(0),
            failed_allocations: AtomicUsize::new(0),
            peak_allocated_bytes: AtomicUsize::new(0),
            total_bytes_allocated: AtomicUsize::new(0),
            total_bytes_deallocated: AtomicUsize::new(0),
        }
    }

    /// Whether recording is enabled
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a successful allocation of `bytes`
    #[inline]
    pub fn record_allocation(&self, bytes: usize) {
        if self.enabled {
            self.allocation_count.fetch_add(1, Ordering::Relaxed);
            self.total_bytes_allocated.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    /// Record a deallocation of `bytes`
    #[inline]
    pub fn record_deallocation(&self, bytes: usize) {
        if self.enabled {
            self.deallocation_count.fetch_add(1, Ordering::Relaxed);
            self.total_bytes_deallocated
                .fetch_add(bytes, Ordering::Relaxed);
        }
    }

    /// Record a failed allocation attempt
    #[inline]
    pub fn record_allocation_failure(&self) {
        if self.enabled {
            self.failed_allocations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record the current usage level for peak tracking
    #[inline]
    pub fn record_usage(&self, current_bytes: usize) {
        if self.enabled {
            atomic_max(&self.peak_allocated_bytes, current_bytes);
        }
    }

    /// Snapshot the counters; `None` when recording is disabled
    pub fn snapshot(&self) -> Option<AllocatorStats> {
        if !self.enabled {
            return None;
        }
        Some(AllocatorStats {
            allocation_count: self.allocation_count.load(Ordering::Relaxed),
            deallocation_count: self.deallocation_count.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
            peak_allocated_bytes: self.peak_allocated_bytes.load(Ordering::Relaxed),
            total_bytes_allocated: self.total_bytes_allocated.load(Ordering::Relaxed),
            total_bytes_deallocated: self.total_bytes_deallocated.load(Ordering::Relaxed),
        })
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        self.allocation_count.store(0, Ordering::Relaxed);
        self.deallocation_count.store(0, Ordering::Relaxed);
        self.failed_allocations.store(0, Ordering::Relaxed);
        self.peak_allocated_bytes.store(0, Ordering::Relaxed);
        self.total_bytes_allocated.store(0, Ordering::Relaxed);
        self.total_bytes_deallocated.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_recording() {
        let stats = OptionalStats::enabled();
        stats.record_allocation(64);
        stats.record_allocation(64);
        stats.record_usage(128);
        stats.record_deallocation(64);
        stats.record_allocation_failure();

        let snap = stats.snapshot().unwrap();
        assert_eq!(snap.allocation_count, 2);
        assert_eq!(snap.deallocation_count, 1);
        assert_eq!(snap.failed_allocations, 1);
        assert_eq!(snap.peak_allocated_bytes, 128);
        assert_eq!(snap.total_bytes_allocated, 128);
        assert_eq!(snap.allocation_balance(), 1);
    }

    #[test]
    fn test_disabled_recording() {
        let stats = OptionalStats::disabled();
        stats.record_allocation(64);
        assert!(stats.snapshot().is_none());
    }
}
