//! Utility functions and helpers for vortex-memory
//!
//! This module provides common utilities used throughout the crate:
//! - Memory alignment helpers
//! - Atomic maximum updates for peak tracking
//! - Exponential backoff for CAS retry loops

use core::sync::atomic::{AtomicUsize, Ordering};

/// Aligns a value up to the nearest multiple of alignment
///
/// # Examples
/// ```
/// use vortex_memory::utils::align_up;
///
/// assert_eq!(align_up(7, 8), 8);
/// assert_eq!(align_up(8, 8), 8);
/// assert_eq!(align_up(9, 8), 16);
/// ```
#[inline(always)]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Aligns a value down to the nearest multiple of alignment
#[inline(always)]
pub const fn align_down(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    value & !(alignment - 1)
}

/// Checks if a value is aligned to the given alignment
///
/// # Examples
/// ```
/// use vortex_memory::utils::is_aligned;
///
/// assert!(is_aligned(16, 8));
/// assert!(!is_aligned(17, 8));
/// ```
#[inline(always)]
pub const fn is_aligned(value: usize, alignment: usize) -> bool {
    debug_assert!(alignment.is_power_of_two());
    value & (alignment - 1) == 0
}

/// Calculates padding needed to align a value
#[inline(always)]
pub const fn padding_needed(value: usize, alignment: usize) -> usize {
    align_up(value, alignment) - value
}

/// Atomically update maximum value
#[inline]
pub fn atomic_max(current: &AtomicUsize, value: usize) {
    let mut max = current.load(Ordering::Relaxed);
    loop {
        if value <= max {
            break;
        }
        match current.compare_exchange_weak(max, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(x) => max = x,
        }
    }
}

/// Exponential backoff for CAS retry loops
///
/// Reduces cache-line contention when several threads hammer the same
/// atomic word. Each call to [`spin`](Backoff::spin) busy-waits twice as
/// long as the previous one, up to a cap;
/// [`spin_or_yield`](Backoff::spin_or_yield) switches to yielding the OS
/// thread once the spin budget is exhausted. Call
/// [`reset`](Backoff::reset) after a successful CAS so contention backoff
/// does not persist across unrelated operations.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: u32,
    max: u32,
}

impl Backoff {
    /// Spin count at which `spin_or_yield` starts yielding instead
    const YIELD_THRESHOLD: u32 = 8;

    /// Create new backoff with default parameters
    #[inline]
    pub fn new() -> Self {
        Self { current: 1, max: 64 }
    }

    /// Create backoff with custom maximum spin count
    #[inline]
    pub fn with_max(max: u32) -> Self {
        Self { current: 1, max }
    }

    /// Perform one backoff step, doubling the spin duration up to the cap
    #[inline]
    pub fn spin(&mut self) {
        for _ in 0..self.current {
            core::hint::spin_loop();
        }
        if self.current < self.max {
            self.current *= 2;
        }
    }

    /// Spin while the budget lasts, then yield to the OS scheduler
    #[inline]
    pub fn spin_or_yield(&mut self) {
        if self.current < Self::YIELD_THRESHOLD {
            self.spin();
        } else {
            std::thread::yield_now();
        }
    }

    /// Spin if the budget allows; returns `false` once it is exhausted,
    /// letting the caller pick its own fallback (give up, park, ...)
    #[inline]
    pub fn try_spin(&mut self) -> bool {
        if self.current >= self.max {
            return false;
        }
        self.spin();
        true
    }

    /// Whether the spin budget has been exhausted
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.current >= self.max
    }

    /// Reset backoff to its initial state
    #[inline]
    pub fn reset(&mut self) {
        self.current = 1;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
