//! Single-owner fixed-block index pool

use core::cell::Cell;
use core::ptr::NonNull;

use crate::error::{MemoryError, MemoryResult};
use crate::pool::{BlockIndex, NIL, PoolConfig};
use crate::region::MemoryRegion;
use crate::stats::OptionalStats;
use crate::traits::{MemoryUsage, Resettable, StatisticsProvider};
use crate::utils::align_up;

/// Free-list links are `u32`s written into the blocks themselves, so every
/// block must be at least this large and this aligned.
const MIN_BLOCK_SIZE: usize = 4;
const MIN_BLOCK_ALIGN: usize = 4;

/// Fixed-block pool handing out `u32` block indices
///
/// Blocks live in a backing [`MemoryRegion`] at `base + index * stride`.
/// Free blocks form an intrusive singly linked list threaded through their
/// first four bytes; allocation pops the head and deallocation pushes, so
/// a freshly constructed pool yields `0, 1, 2, ...` and reuse is LIFO.
///
/// Allocation never fails with an error: an exhausted pool returns `None`
/// and the caller decides whether that is fatal.
///
/// Single-owner: interior mutability via [`Cell`] keeps the mutating API
/// on `&self` but makes the type `!Sync`. For cross-thread use see
/// [`ConcurrentIndexPool`](crate::pool::ConcurrentIndexPool).
pub struct IndexPool {
    region: MemoryRegion,
    block_size: usize,
    stride: usize,
    capacity: u32,
    free_head: Cell<BlockIndex>,
    free_count: Cell<u32>,
    config: PoolConfig,
    stats: OptionalStats,
}

impl IndexPool {
    /// Backing bytes needed for a pool with the given geometry
    ///
    /// Useful for sizing a caller-owned region before
    /// [`with_region`](Self::with_region).
    ///
    /// # Errors
    /// Returns an error for a zero block size, a non-power-of-two
    /// alignment, a zero or `NIL`-colliding capacity, or a geometry whose
    /// total size overflows `usize`.
    pub fn required_bytes(
        block_size: usize,
        block_align: usize,
        capacity: u32,
    ) -> MemoryResult<usize> {
        let (stride, _) = Self::layout_of(block_size, block_align, capacity)?;
        stride
            .checked_mul(capacity as usize)
            .ok_or_else(|| MemoryError::size_overflow("pool backing size"))
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
        let (stride, align) = Self::layout_of(block_size, block_align, capacity)?;
        let total = stride
            .checked_mul(capacity as usize)
            .ok_or_else(|| MemoryError::size_overflow("pool backing size"))?;
        let region = MemoryRegion::alloc(total, align)?;
        Ok(Self::build(region, block_size, stride, capacity, config))
    }

    /// Creates a pool over a caller-supplied region
    ///
    /// The region may be borrowed (see
    /// [`MemoryRegion::from_raw_parts`]); the pool only ever touches
    /// `[base, base + stride * capacity)`.
    ///
    /// # Errors
    /// Returns an error if the geometry is invalid, the region is too
    /// small, or its base is not aligned for the blocks.
    pub fn with_region(
        region: MemoryRegion,
        block_size: usize,
        block_align: usize,
        capacity: u32,
        config: PoolConfig,
    ) -> MemoryResult<Self> {
        let (stride, align) = Self::layout_of(block_size, block_align, capacity)?;
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

    /// Validates geometry and returns `(stride, effective_align)`.
    pub(super) fn layout_of(
        block_size: usize,
        block_align: usize,
        capacity: u32,
    ) -> MemoryResult<(usize, usize)> {
        if block_size == 0 {
            return Err(MemoryError::invalid_block_size(0, "must be non-zero"));
        }
        if !block_align.is_power_of_two() {
            return Err(MemoryError::invalid_alignment(block_align));
        }
        if capacity == 0 {
            return Err(MemoryError::invalid_capacity(0, "pool cannot be empty"));
        }
        if capacity == NIL {
            return Err(MemoryError::invalid_capacity(
                capacity as usize,
                "u32::MAX is reserved as the free-list sentinel",
            ));
        }
        let align = block_align.max(MIN_BLOCK_ALIGN);
        let stride = align_up(block_size.max(MIN_BLOCK_SIZE), align);
        Ok((stride, align))
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
            free_head: Cell::new(NIL),
            free_count: Cell::new(0),
            config,
            stats,
        };
        pool.thread_free_list();
        pool
    }

    /// Threads the free list in ascending index order: 0 -> 1 -> ... -> NIL.
    fn thread_free_list(&self) {
        for index in 0..self.capacity {
            let next = if index + 1 < self.capacity {
                index + 1
            } else {
                NIL
            };
            // SAFETY: index < capacity, so the link word lies inside the
            // region and is 4-aligned (stride and base are).
            unsafe {
                self.link_ptr(index).write(next);
            }
        }
        self.free_head.set(0);
        self.free_count.set(self.capacity);
    }

    /// Pointer to the free-list link word stored in block `index`.
    ///
    /// Caller must pass `index < capacity`.
    #[inline]
    fn link_ptr(&self, index: BlockIndex) -> *mut u32 {
        debug_assert!(index < self.capacity);
        let addr = self.region.base_addr() + index as usize * self.stride;
        addr as *mut u32
    }

    /// Allocates a block, returning its index
    ///
    /// Returns `None` when the pool is exhausted.
    #[inline]
    pub fn allocate(&self) -> Option<BlockIndex> {
        let head = self.free_head.get();
        if head == NIL {
            self.stats.record_allocation_failure();
            return None;
        }

        // SAFETY: head came off the free list, so head < capacity and the
        // block's link word is readable.
        let next = unsafe { self.link_ptr(head).read() };
        self.free_head.set(next);
        self.free_count.set(self.free_count.get() - 1);

        if let Some(pattern) = self.config.alloc_pattern {
            // SAFETY: the block is now owned by the caller; filling all
            // stride bytes stays inside the region.
            unsafe {
                self.block_ptr(head)
                    .as_ptr()
                    .write_bytes(pattern, self.stride);
            }
        }

        self.stats.record_allocation(self.stride);
        self.stats.record_usage(self.used_memory());
        Some(head)
    }

    /// Returns a block to the pool
    ///
    /// The block becomes the new free-list head, so it is the first index
    /// the next [`allocate`](Self::allocate) hands out.
    ///
    /// # Errors
    /// Returns an error if `index` is out of range. Double-free of an
    /// in-range index is not detected and corrupts the free list; debug
    /// fill patterns ([`PoolConfig::dealloc_pattern`]) help catch it.
    #[inline]
    pub fn deallocate(&self, index: BlockIndex) -> MemoryResult<()> {
        if index >= self.capacity {
            self.stats.record_allocation_failure();
            return Err(MemoryError::invalid_index(index, self.capacity));
        }

        if let Some(pattern) = self.config.dealloc_pattern {
            // SAFETY: index < capacity; the whole block lies in the region.
            unsafe {
                self.block_ptr(index)
                    .as_ptr()
                    .write_bytes(pattern, self.stride);
            }
        }

        // SAFETY: index < capacity; the link word overwrites the first four
        // bytes of the (now free) block.
        unsafe {
            self.link_ptr(index).write(self.free_head.get());
        }
        self.free_head.set(index);
        self.free_count.set(self.free_count.get() + 1);

        self.stats.record_deallocation(self.stride);
        Ok(())
    }

    /// Pointer to block `index`
    ///
    /// Pure arithmetic over the pool geometry; works for allocated and
    /// free blocks alike.
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
    ///
    /// Returns `None` if the pointer is outside the pool's range or does
    /// not sit on a block boundary.
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

    /// Number of free blocks
    #[inline]
    pub fn free_blocks(&self) -> u32 {
        self.free_count.get()
    }

    /// Number of allocated blocks
    #[inline]
    pub fn allocated_blocks(&self) -> u32 {
        self.capacity - self.free_count.get()
    }

    /// Whether every block is allocated
    #[inline]
    pub fn is_full(&self) -> bool {
        self.free_count.get() == 0
    }

    /// Whether every block is free
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.free_count.get() == self.capacity
    }
}

impl MemoryUsage for IndexPool {
    fn used_memory(&self) -> usize {
        self.allocated_blocks() as usize * self.stride
    }

    fn available_memory(&self) -> Option<usize> {
        Some(self.free_blocks() as usize * self.stride)
    }
}

impl Resettable for IndexPool {
    unsafe fn reset(&self) {
        self.thread_free_list();
        self.stats.reset();
    }
}

impl StatisticsProvider for IndexPool {
    fn statistics(&self) -> Option<crate::stats::AllocatorStats> {
        self.stats.snapshot()
    }

    fn reset_statistics(&self) {
        self.stats.reset();
    }
}

impl core::fmt::Debug for IndexPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IndexPool")
            .field("block_size", &self.block_size)
            .field("stride", &self.stride)
            .field("capacity", &self.capacity)
            .field("free_blocks", &self.free_count.get())
            .finish()
    }
}
