//! Lock-free fixed-block index pool

use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::{MemoryError, MemoryResult};
use crate::pool::{BlockIndex, IndexPool, NIL, PoolConfig};
use crate::region::MemoryRegion;
use crate::stats::OptionalStats;
use crate::tagged::{AtomicTaggedIndex, TaggedIndex};
use crate::traits::{MemoryUsage, Resettable, StatisticsProvider};
use crate::utils::Backoff;

/// Lock-free fixed-block pool sharing [`IndexPool`]'s geometry
///
/// The free-list head lives in an [`AtomicTaggedIndex`]: the `u32` head
/// index pairs with a `u32` generation that every successful CAS bumps.
/// A thread that observed an old head loses its CAS even if the same
/// index has meanwhile been popped and pushed back, which closes the ABA
/// window a bare index CAS would have.
///
/// Free blocks still carry their next-link in their first four bytes, but
/// link words are read and written through [`AtomicU32`] views so racing
/// accesses stay defined. A link read can observe a torn-off block whose
/// new owner is already writing user data into it; the tagged CAS then
/// fails and the stale value is discarded without being dereferenced.
///
/// `allocate` gives up after [`PoolConfig::max_retries`] contended CAS
/// failures and returns `None`; callers that must not drop an allocation
/// under contention should retry at their level.
pub struct ConcurrentIndexPool {
    region: MemoryRegion,
    block_size: usize,
    stride: usize,
    capacity: u32,
    head: AtomicTaggedIndex,
    free_count: AtomicU32,
    config: PoolConfig,
    stats: OptionalStats,
}

impl ConcurrentIndexPool {
    /// Backing bytes needed for a pool with the given geometry
    ///
    /// # Errors
    /// Same geometry rules as [`IndexPool::required_bytes`].
    pub fn required_bytes(
        block_size: usize,
        block_align: usize,
        capacity: u32,
    ) -> MemoryResult<usize> {
        IndexPool::required_bytes(block_size, block_align, capacity)
    }

    /// Creates a pool over a freshly allocated owned region
    ///
    /// # Errors
    /// Returns an error if the geometry is invalid or the backing
    /// allocation fails.
    pub fn new(block_size: usize, block_align: usize, capacity: u32) -> MemoryResult<Self> {
        Self::with_config(block_size, block_align, capacity, PoolConfig::default())
    }

    /// Creates a pool over an owned region with explicit configuration
    ///
    /// # Errors
    /// Returns an error if the geometry is invalid or the backing
    /// allocation fails.
    pub fn with_config(
        block_size: usize,
        block_align: usize,
        capacity: u32,
        config: PoolConfig,
    ) -> MemoryResult<Self> {
        // Geometry validation is shared with the single-owner pool.
        let (stride, align) = IndexPool::layout_of(block_size, block_align, capacity)?;
        let total = stride
            .checked_mul(capacity as usize)
            .ok_or_else(|| MemoryError::size_overflow("pool backing size"))?;
        let region = MemoryRegion::alloc(total, align)?;
        Ok(Self::build(region, block_size, stride, capacity, config))
    }

    /// Creates a pool over a caller-supplied region
    ///
    /// # Errors
    /// Returns an error if the geometry is invalid, the region is too
    /// small, or its base is misaligned.
    pub fn with_region(
        region: MemoryRegion,
        block_size: usize,
        block_align: usize,
        capacity: u32,
        config: PoolConfig,
    ) -> MemoryResult<Self> {
        let (stride, align) = IndexPool::layout_of(block_size, block_align, capacity)?;
        let required = stride
            .checked_mul(capacity as usize)
            .ok_or_else(|| MemoryError::size_overflow("pool backing size"))?;
        if region.len() < required {
            return Err(MemoryError::region_too_small(required, region.len()));
        }
        if region.base_addr() % align != 0 {
            return Err(MemoryError::region_misaligned(region.base_addr(), align));
        }
        Ok(Self::build(region, block_size, stride, capacity, config))
    }

    fn build(
        region: MemoryRegion,
        block_size: usize,
        stride: usize,
        capacity: u32,
        config: PoolConfig,
    ) -> Self {
        let stats = if config.track_stats {
            OptionalStats::enabled()
        } else {
            OptionalStats::disabled()
        };
        let pool = Self {
            region,
            block_size,
            stride,
            capacity,
            head: AtomicTaggedIndex::new(TaggedIndex::new(NIL, 0)),
            free_count: AtomicU32::new(0),
            config,
            stats,
        };
        pool.thread_free_list();
        pool
    }

    /// Threads the free list 0 -> 1 -> ... -> NIL.
    ///
    /// Only called while no other thread can touch the pool (construction
    /// and `reset`).
    fn thread_free_list(&self) {
        for index in 0..self.capacity {
            let next = if index + 1 < self.capacity {
                index + 1
            } else {
                NIL
            };
            self.link_at(index).store(next, Ordering::Relaxed);
        }
        self.head.store(TaggedIndex::new(0, 0), Ordering::Release);
        self.free_count.store(self.capacity, Ordering::Release);
    }

    /// Atomic view of the link word stored in block `index`.
    #[inline]
    fn link_at(&self, index: BlockIndex) -> &AtomicU32 {
        debug_assert!(index < self.capacity);
        let addr = self.region.base_addr() + index as usize * self.stride;
        // SAFETY: addr is in-bounds and 4-aligned (stride and base are).
        // AtomicU32 has the same layout as u32, and all concurrent access
        // to link words in this pool goes through atomics.
        unsafe { &*(addr as *const AtomicU32) }
    }

    /// Allocates a block, returning its index
    ///
    /// Returns `None` when the pool is exhausted, or when the CAS loop
    /// lost [`PoolConfig::max_retries`] races in a row.
    pub fn allocate(&self) -> Option<BlockIndex> {
        let mut backoff = Backoff::new();
        let mut attempts = 0;

        loop {
            let head = self.head.load(Ordering::Acquire);
            if head.index() == NIL {
                self.stats.record_allocation_failure();
                return None;
            }

            // The observed head may already belong to another thread; the
            // value read here is only trusted if the CAS below succeeds.
            let next = self.link_at(head.index()).load(Ordering::Acquire);

            match self.head.compare_exchange_weak(
                head,
                head.successor(next),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.free_count.fetch_sub(1, Ordering::Relaxed);

                    if let Some(pattern) = self.config.alloc_pattern {
                        // SAFETY: the CAS transferred the block to this
                        // thread; stride bytes are in-bounds.
                        unsafe {
                            self.block_ptr(head.index())
                                .as_ptr()
                                .write_bytes(pattern, self.stride);
                        }
                    }

                    self.stats.record_allocation(self.stride);
                    self.stats.record_usage(self.used_memory());
                    return Some(head.index());
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

    /// Returns a block to the pool
    ///
    /// Loops until the push wins its CAS; unlike [`allocate`](Self::allocate)
    /// it never gives up, since dropping a free would leak the block.
    ///
    /// # Errors
    /// Returns an error if `index` is out of range.
    pub fn deallocate(&self, index: BlockIndex) -> MemoryResult<()> {
        if index >= self.capacity {
            return Err(MemoryError::invalid_index(index, self.capacity));
        }

        if let Some(pattern) = self.config.dealloc_pattern {
            // SAFETY: the caller owns the block until the CAS below
            // publishes it; stride bytes are in-bounds.
            unsafe {
                self.block_ptr(index)
                    .as_ptr()
                    .write_bytes(pattern, self.stride);
            }
        }

        let mut backoff = Backoff::new();
        loop {
            let head = self.head.load(Ordering::Acquire);
            // Publish the link before the head swap makes it reachable.
            self.link_at(index).store(head.index(), Ordering::Release);

            match self.head.compare_exchange_weak(
                head,
                head.successor(index),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.free_count.fetch_add(1, Ordering::Relaxed);
                    self.stats.record_deallocation(self.stride);
                    return Ok(());
                }
                Err(_) => {
                    if self.config.use_backoff {
                        backoff.spin_or_yield();
                    }
                }
            }
        }
    }

    /// Pointer to block `index`
    ///
    /// # Panics
    /// Panics if `index >= capacity`.
    #[inline]
    #[must_use]
    pub fn block_ptr(&self, index: BlockIndex) -> NonNull<u8> {
        assert!(index < self.capacity, "block index out of range");
        let addr = self.region.base_addr() + index as usize * self.stride;
        // SAFETY: addr is inside the region, hence non-null.
        unsafe { NonNull::new_unchecked(addr as *mut u8) }
    }

    /// Recovers the block index from a pointer into the pool
    #[inline]
    #[must_use]
    pub fn index_of(&self, ptr: *const u8) -> Option<BlockIndex> {
        if !self.contains(ptr) {
            return None;
        }
        let offset = ptr as usize - self.region.base_addr();
        if offset % self.stride != 0 {
            return None;
        }
        Some((offset / self.stride) as BlockIndex)
    }

    /// Whether `ptr` points into this pool's block range
    #[inline]
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        addr >= self.region.base_addr()
            && addr < self.region.base_addr() + self.capacity as usize * self.stride
    }

    /// Requested block size in bytes
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Actual spacing between consecutive blocks in bytes
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Total number of blocks
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of free blocks (approximate under contention)
    #[inline]
    pub fn free_blocks(&self) -> u32 {
        self.free_count.load(Ordering::Relaxed)
    }

    /// Number of allocated blocks (approximate under contention)
    #[inline]
    pub fn allocated_blocks(&self) -> u32 {
        self.capacity - self.free_blocks()
    }
}

impl MemoryUsage for ConcurrentIndexPool {
    fn used_memory(&self) -> usize {
        self.allocated_blocks() as usize * self.stride
    }

    fn available_memory(&self) -> Option<usize> {
        Some(self.free_blocks() as usize * self.stride)
    }
}

impl Resettable for ConcurrentIndexPool {
    unsafe fn reset(&self) {
        self.thread_free_list();
        self.stats.reset();
    }
}

impl StatisticsProvider for ConcurrentIndexPool {
    fn statistics(&self) -> Option<crate::stats::AllocatorStats> {
        self.stats.snapshot()
    }

    fn reset_statistics(&self) {
        self.stats.reset();
    }
}

impl core::fmt::Debug for ConcurrentIndexPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConcurrentIndexPool")
            .field("block_size", &self.block_size)
            .field("stride", &self.stride)
            .field("capacity", &self.capacity)
            .field("free_blocks", &self.free_blocks())
            .finish()
    }
}

// SAFETY: all shared mutable state is the atomic head, the atomic link
// words and the atomic counters; block payloads are only touched by the
// thread the head CAS handed them to.
unsafe impl Send for ConcurrentIndexPool {}
unsafe impl Sync for ConcurrentIndexPool {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_thread_semantics_match_index_pool() {
        let pool = ConcurrentIndexPool::new(64, 8, 8).unwrap();
        for expected in 0..8 {
            assert_eq!(pool.allocate(), Some(expected));
        }
        assert_eq!(pool.allocate(), None);
        pool.deallocate(5).unwrap();
        pool.deallocate(2).unwrap();
        assert_eq!(pool.allocate(), Some(2));
        assert_eq!(pool.allocate(), Some(5));
    }

    #[test]
    fn test_deallocate_rejects_out_of_range() {
        let pool = ConcurrentIndexPool::new(32, 8, 4).unwrap();
        assert!(pool.deallocate(4).is_err());
        assert!(pool.deallocate(NIL).is_err());
    }

    #[test]
    fn test_generation_advances_on_reuse() {
        let pool = ConcurrentIndexPool::new(32, 8, 2).unwrap();
        let before = pool.head.load(Ordering::Acquire).generation();
        let index = pool.allocate().unwrap();
        pool.deallocate(index).unwrap();
        let after = pool.head.load(Ordering::Acquire).generation();
        assert!(after.wrapping_sub(before) >= 2);
    }

    #[test]
    fn test_concurrent_allocate_yields_distinct_blocks() {
        use std::sync::Arc;

        let pool = Arc::new(ConcurrentIndexPool::new(64, 8, 1024).unwrap());
        let threads = 8;
        let per_thread = 1024 / threads;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    let mut got = Vec::with_capacity(per_thread);
                    while got.len() < per_thread {
                        if let Some(index) = pool.allocate() {
                            got.push(index);
                        }
                    }
                    got
                })
            })
            .collect();

        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1024);
        assert_eq!(pool.free_blocks(), 0);
        assert_eq!(pool.allocate(), None);
    }

    #[test]
    fn test_concurrent_churn_preserves_block_count() {
        use std::sync::Arc;

        let pool = Arc::new(ConcurrentIndexPool::with_config(
            32,
            8,
            64,
            PoolConfig::production(),
        ).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        if let Some(index) = pool.allocate() {
                            pool.deallocate(index).unwrap();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(pool.free_blocks(), 64);
    }
}
