//! Segregated small-block allocator with recyclable chunks

use core::cell::Cell;
use core::ptr::NonNull;

use crate::error::{MemoryError, MemoryResult};
use crate::region::{DEFAULT_ALIGNMENT, MemoryRegion};
use crate::stats::OptionalStats;
use crate::traits::{MemoryUsage, Resettable, StatisticsProvider};
use crate::utils::align_up;

/// Chunk granularity: the region is carved into chunks of this size and a
/// chunk serves exactly one size class at a time.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Maximum number of registered size classes
pub const MAX_SIZE_CLASSES: usize = 16;

/// Sentinel for chunk and block links
const NIL: u32 = u32::MAX;

/// Chunk not currently assigned to any size class
const UNASSIGNED: u8 = u8::MAX;

/// Configuration for the small-block allocator
#[derive(Debug, Clone)]
pub struct SmallBlockConfig {
    /// Enable statistics tracking
    pub track_stats: bool,

    /// Fill pattern byte for newly allocated blocks (for debugging)
    pub alloc_pattern: Option<u8>,
    /// Fill pattern byte for deallocated blocks (for debugging)
    pub dealloc_pattern: Option<u8>,
}

impl Default for SmallBlockConfig {
    fn default() -> Self {
        Self {
            track_stats: cfg!(debug_assertions),
            alloc_pattern: if cfg!(debug_assertions) {
                Some(0xBB)
            } else {
                None
            },
            dealloc_pattern: if cfg!(debug_assertions) {
                Some(0xDD)
            } else {
                None
            },
        }
    }
}

impl SmallBlockConfig {
    /// Production configuration - optimized for performance
    #[must_use]
    pub fn production() -> Self {
        Self {
            track_stats: false,
            alloc_pattern: None,
            dealloc_pattern: None,
        }
    }

    /// Debug configuration - optimized for debugging
    #[must_use]
    pub fn debug() -> Self {
        Self {
            track_stats: true,
            alloc_pattern: Some(0xBB),
            dealloc_pattern: Some(0xDD),
        }
    }
}

/// One registered block size
struct SizeClass {
    block_size: usize,
    stride: usize,
    blocks_per_chunk: u32,
    /// Head of the doubly linked list of chunks with at least one free
    /// block
    partial_head: Cell<u32>,
}

/// Out-of-band bookkeeping for one chunk
///
/// Kept outside the chunk memory so releasing a chunk back to the free
/// list never races with stale pointers into its payload.
struct ChunkMeta {
    /// Index into `classes`, or `UNASSIGNED`
    class: Cell<u8>,
    /// Partial-list links (free-chunk list reuses `next`)
    prev: Cell<u32>,
    next: Cell<u32>,
    /// Head of the intrusive free-block list inside the chunk
    free_head: Cell<u32>,
    free_count: Cell<u32>,
}

impl ChunkMeta {
    fn unassigned() -> Self {
        Self {
            class: Cell::new(UNASSIGNED),
            prev: Cell::new(NIL),
            next: Cell::new(NIL),
            free_head: Cell::new(NIL),
            free_count: Cell::new(0),
        }
    }
}

/// Size-class allocator carving recyclable chunks out of one region
///
/// The region is split into [`CHUNK_SIZE`] chunks. Each registered block
/// size owns a list of *partial* chunks (at least one free block); fully
/// allocated chunks are tracked implicitly and fully freed chunks go back
/// to a shared free-chunk list where any class can claim them. A burst of
/// 16-byte allocations followed by a burst of 64-byte ones reuses the
/// same physical chunks instead of growing the footprint.
///
/// Only exact registered sizes are served: `allocate(32)` on an
/// allocator registered for `{16, 64}` returns `None` rather than
/// rounding up. The caller's size-class table is authoritative.
///
/// Single-owner, like [`LinearAllocator`](crate::alloc::LinearAllocator).
pub struct SmallBlockAllocator {
    region: MemoryRegion,
    classes: Vec<SizeClass>,
    chunks: Vec<ChunkMeta>,
    free_chunk_head: Cell<u32>,
    free_chunk_count: Cell<u32>,
    used_bytes: Cell<usize>,
    config: SmallBlockConfig,
    stats: OptionalStats,
}

impl SmallBlockAllocator {
    /// Creates an allocator over an owned region of `total_bytes`
    ///
    /// # Errors
    /// Returns an error if `total_bytes` is not a positive multiple of
    /// [`CHUNK_SIZE`], the size list is invalid, or the backing
    /// allocation fails.
    pub fn new(total_bytes: usize, block_sizes: &[usize]) -> MemoryResult<Self> {
        Self::with_config(total_bytes, block_sizes, SmallBlockConfig::default())
    }

    /// Creates an allocator over an owned region with explicit
    /// configuration
    ///
    /// # Errors
    /// Same rules as [`new`](Self::new).
    pub fn with_config(
        total_bytes: usize,
        block_sizes: &[usize],
        config: SmallBlockConfig,
    ) -> MemoryResult<Self> {
        Self::validate_total(total_bytes)?;
        let classes = Self::build_classes(block_sizes)?;
        let region = MemoryRegion::alloc(total_bytes, DEFAULT_ALIGNMENT)?;
        Ok(Self::build(region, classes, config))
    }

    /// Creates an allocator over a caller-supplied region
    ///
    /// # Errors
    /// Returns an error if the region length is not a positive multiple
    /// of [`CHUNK_SIZE`], its base is not 16-byte aligned, or the size
    /// list is invalid.
    pub fn with_region(
        region: MemoryRegion,
        block_sizes: &[usize],
        config: SmallBlockConfig,
    ) -> MemoryResult<Self> {
        Self::validate_total(region.len())?;
        if region.base_addr() % DEFAULT_ALIGNMENT != 0 {
            return Err(MemoryError::region_misaligned(
                region.base_addr(),
                DEFAULT_ALIGNMENT,
            ));
        }
        let classes = Self::build_classes(block_sizes)?;
        Ok(Self::build(region, classes, config))
    }

    fn validate_total(total_bytes: usize) -> MemoryResult<()> {
        if total_bytes == 0 || total_bytes % CHUNK_SIZE != 0 {
            return Err(MemoryError::invalid_capacity(
                total_bytes,
                "must be a positive multiple of the chunk size",
            ));
        }
        Ok(())
    }

    fn build_classes(block_sizes: &[usize]) -> MemoryResult<Vec<SizeClass>> {
        if block_sizes.is_empty() {
            return Err(MemoryError::invalid_config("no size classes registered"));
        }
        if block_sizes.len() > MAX_SIZE_CLASSES {
            return Err(MemoryError::invalid_config("too many size classes"));
        }

        let mut classes = Vec::with_capacity(block_sizes.len());
        for &size in block_sizes {
            if size == 0 {
                return Err(MemoryError::invalid_block_size(0, "must be non-zero"));
            }
            if classes.iter().any(|c: &SizeClass| c.block_size == size) {
                return Err(MemoryError::invalid_config("duplicate size class"));
            }
            // Blocks are aligned to their size rounded up to a power of
            // two, capped at 16 and floored at 4 (room for the link word).
            let align = size
                .next_power_of_two()
                .clamp(4, DEFAULT_ALIGNMENT);
            let stride = align_up(size.max(4), align);
            if stride > CHUNK_SIZE {
                return Err(MemoryError::invalid_block_size(
                    size,
                    "does not fit in one chunk",
                ));
            }
            classes.push(SizeClass {
                block_size: size,
                stride,
                blocks_per_chunk: (CHUNK_SIZE / stride) as u32,
                partial_head: Cell::new(NIL),
            });
        }
        Ok(classes)
    }

    fn build(region: MemoryRegion, classes: Vec<SizeClass>, config: SmallBlockConfig) -> Self {
        let stats = if config.track_stats {
            OptionalStats::enabled()
        } else {
            OptionalStats::disabled()
        };
        let chunk_count = region.len() / CHUNK_SIZE;
        let allocator = Self {
            region,
            classes,
            chunks: (0..chunk_count).map(|_| ChunkMeta::unassigned()).collect(),
            free_chunk_head: Cell::new(NIL),
            free_chunk_count: Cell::new(0),
            used_bytes: Cell::new(0),
            config,
            stats,
        };
        allocator.thread_free_chunks();
        allocator
    }

    /// Puts every chunk on the free-chunk list, 0 -> 1 -> ... -> NIL.
    fn thread_free_chunks(&self) {
        let count = self.chunks.len() as u32;
        for (i, chunk) in self.chunks.iter().enumerate() {
            let i = i as u32;
            chunk.class.set(UNASSIGNED);
            chunk.prev.set(NIL);
            chunk.next.set(if i + 1 < count { i + 1 } else { NIL });
            chunk.free_head.set(NIL);
            chunk.free_count.set(0);
        }
        self.free_chunk_head.set(if count > 0 { 0 } else { NIL });
        self.free_chunk_count.set(count);
    }

    #[inline]
    fn chunk_base(&self, chunk: u32) -> usize {
        self.region.base_addr() + chunk as usize * CHUNK_SIZE
    }

    /// Pointer to the free-list link word of `block` in `chunk`.
    #[inline]
    fn block_link_ptr(&self, chunk: u32, stride: usize, block: u32) -> *mut u32 {
        (self.chunk_base(chunk) + block as usize * stride) as *mut u32
    }

    /// Allocates one block of exactly `size` bytes
    ///
    /// Returns `None` for an unregistered size or when every chunk is
    /// full.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let class_index = self
            .classes
            .iter()
            .position(|c| c.block_size == size)?;
        let class = &self.classes[class_index];

        let mut chunk = class.partial_head.get();
        if chunk == NIL {
            let Some(claimed) = self.claim_chunk(class_index) else {
                self.stats.record_allocation_failure();
                return None;
            };
            chunk = claimed;
        }

        let meta = &self.chunks[chunk as usize];
        let block = meta.free_head.get();
        debug_assert!(block != NIL, "partial chunk must have a free block");

        // SAFETY: block came off the chunk's free list, so the link word is
        // in-bounds and 4-aligned.
        let next = unsafe { self.block_link_ptr(chunk, class.stride, block).read() };
        meta.free_head.set(next);
        meta.free_count.set(meta.free_count.get() - 1);

        if meta.free_count.get() == 0 {
            // Chunk is now full; it leaves the partial list until a free
            // brings it back.
            self.unlink_partial(class_index, chunk);
        }

        let addr = self.chunk_base(chunk) + block as usize * class.stride;
        if let Some(pattern) = self.config.alloc_pattern {
            // SAFETY: the block now belongs to the caller; stride bytes are
            // in-bounds.
            unsafe {
                (addr as *mut u8).write_bytes(pattern, class.stride);
            }
        }

        self.used_bytes.set(self.used_bytes.get() + class.stride);
        self.stats.record_allocation(class.stride);
        self.stats.record_usage(self.used_bytes.get());
        // SAFETY: addr is inside the region, hence non-null.
        Some(unsafe { NonNull::new_unchecked(addr as *mut u8) })
    }

    /// Returns a block to its chunk
    ///
    /// A chunk whose last block is freed is detached from its size class
    /// and returned to the shared free-chunk list, where any class may
    /// claim it next.
    ///
    /// # Errors
    /// Returns an error if `ptr` is outside the region, inside an
    /// unassigned chunk, or not on a block boundary of the chunk's class.
    pub fn deallocate(&self, ptr: NonNull<u8>) -> MemoryResult<()> {
        let addr = ptr.as_ptr() as usize;
        if !self.region.contains_addr(addr) {
            return Err(MemoryError::foreign_pointer(addr));
        }

        let offset = addr - self.region.base_addr();
        let chunk = (offset / CHUNK_SIZE) as u32;
        let meta = &self.chunks[chunk as usize];
        if meta.class.get() == UNASSIGNED {
            return Err(MemoryError::foreign_pointer(addr));
        }
        let class_index = meta.class.get() as usize;
        let class = &self.classes[class_index];

        let in_chunk = offset % CHUNK_SIZE;
        if in_chunk % class.stride != 0 {
            return Err(MemoryError::misaligned_pointer(addr));
        }
        let block = (in_chunk / class.stride) as u32;
        if block >= class.blocks_per_chunk {
            // Tail slack past the last whole block.
            return Err(MemoryError::misaligned_pointer(addr));
        }

        if let Some(pattern) = self.config.dealloc_pattern {
            // SAFETY: the block is being returned by its owner; stride
            // bytes are in-bounds.
            unsafe {
                (addr as *mut u8).write_bytes(pattern, class.stride);
            }
        }

        let was_full = meta.free_count.get() == 0;
        // SAFETY: block < blocks_per_chunk; the link word overwrites the
        // first four bytes of the freed block.
        unsafe {
            self.block_link_ptr(chunk, class.stride, block)
                .write(meta.free_head.get());
        }
        meta.free_head.set(block);
        meta.free_count.set(meta.free_count.get() + 1);

        if was_full {
            self.link_partial(class_index, chunk);
        }
        if meta.free_count.get() == class.blocks_per_chunk {
            self.unlink_partial(class_index, chunk);
            self.release_chunk(chunk);
        }

        self.used_bytes.set(self.used_bytes.get() - class.stride);
        self.stats.record_deallocation(class.stride);
        Ok(())
    }

    /// Pops a chunk off the free list and threads it for `class_index`.
    fn claim_chunk(&self, class_index: usize) -> Option<u32> {
        let chunk = self.free_chunk_head.get();
        if chunk == NIL {
            return None;
        }
        let meta = &self.chunks[chunk as usize];
        self.free_chunk_head.set(meta.next.get());
        self.free_chunk_count.set(self.free_chunk_count.get() - 1);

        let class = &self.classes[class_index];
        for block in 0..class.blocks_per_chunk {
            let next = if block + 1 < class.blocks_per_chunk {
                block + 1
            } else {
                NIL
            };
            // SAFETY: block < blocks_per_chunk, so the link word is inside
            // the chunk.
            unsafe {
                self.block_link_ptr(chunk, class.stride, block).write(next);
            }
        }

        meta.class.set(class_index as u8);
        meta.free_head.set(0);
        meta.free_count.set(class.blocks_per_chunk);
        meta.prev.set(NIL);
        meta.next.set(NIL);
        self.link_partial(class_index, chunk);

        #[cfg(feature = "logging")]
        tracing::trace!(
            chunk,
            block_size = class.block_size,
            blocks = class.blocks_per_chunk,
            "chunk claimed"
        );
        Some(chunk)
    }

    /// Detaches a fully free chunk from its class and returns it to the
    /// free-chunk list.
    fn release_chunk(&self, chunk: u32) {
        let meta = &self.chunks[chunk as usize];

        #[cfg(feature = "logging")]
        tracing::trace!(
            chunk,
            block_size = self.classes[meta.class.get() as usize].block_size,
            "chunk released"
        );

        meta.class.set(UNASSIGNED);
        meta.free_head.set(NIL);
        meta.free_count.set(0);
        meta.prev.set(NIL);
        meta.next.set(self.free_chunk_head.get());
        self.free_chunk_head.set(chunk);
        self.free_chunk_count.set(self.free_chunk_count.get() + 1);
    }

    /// Pushes `chunk` onto the class's partial list.
    fn link_partial(&self, class_index: usize, chunk: u32) {
        let class = &self.classes[class_index];
        let meta = &self.chunks[chunk as usize];
        let old_head = class.partial_head.get();
        meta.prev.set(NIL);
        meta.next.set(old_head);
        if old_head != NIL {
            self.chunks[old_head as usize].prev.set(chunk);
        }
        class.partial_head.set(chunk);
    }

    /// Removes `chunk` from the class's partial list.
    fn unlink_partial(&self, class_index: usize, chunk: u32) {
        let class = &self.classes[class_index];
        let meta = &self.chunks[chunk as usize];
        let prev = meta.prev.get();
        let next = meta.next.get();
        if prev != NIL {
            self.chunks[prev as usize].next.set(next);
        } else {
            class.partial_head.set(next);
        }
        if next != NIL {
            self.chunks[next as usize].prev.set(prev);
        }
        meta.prev.set(NIL);
        meta.next.set(NIL);
    }

    /// Whether `ptr` points into this allocator's region
    ///
    /// For routing frees in composite allocators; `true` does not imply
    /// the pointer is a live block.
    #[inline]
    pub fn owns(&self, ptr: *const u8) -> bool {
        self.region.contains(ptr)
    }

    /// Registered block sizes, in registration order
    pub fn block_sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.classes.iter().map(|c| c.block_size)
    }

    /// Total number of chunks in the region
    #[inline]
    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Number of chunks on the shared free list
    #[inline]
    pub fn free_chunks(&self) -> u32 {
        self.free_chunk_count.get()
    }
}

impl MemoryUsage for SmallBlockAllocator {
    fn used_memory(&self) -> usize {
        self.used_bytes.get()
    }

    fn available_memory(&self) -> Option<usize> {
        // Free chunks plus free blocks in partial chunks; tail slack in
        // claimed chunks is not counted.
        let mut available = self.free_chunk_count.get() as usize * CHUNK_SIZE;
        for (class_index, class) in self.classes.iter().enumerate() {
            let mut chunk = class.partial_head.get();
            while chunk != NIL {
                let meta = &self.chunks[chunk as usize];
                debug_assert_eq!(meta.class.get() as usize, class_index);
                available += meta.free_count.get() as usize * class.stride;
                chunk = meta.next.get();
            }
        }
        Some(available)
    }
}

impl Resettable for SmallBlockAllocator {
    unsafe fn reset(&self) {
        for class in &self.classes {
            class.partial_head.set(NIL);
        }
        self.thread_free_chunks();
        self.used_bytes.set(0);
        self.stats.reset();
    }
}

impl StatisticsProvider for SmallBlockAllocator {
    fn statistics(&self) -> Option<crate::stats::AllocatorStats> {
        self.stats.snapshot()
    }

    fn reset_statistics(&self) {
        self.stats.reset();
    }
}

impl core::fmt::Debug for SmallBlockAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SmallBlockAllocator")
            .field("total_chunks", &self.total_chunks())
            .field("free_chunks", &self.free_chunks())
            .field("used_bytes", &self.used_bytes.get())
            .field("classes", &self.classes.len())
            .finish()
    }
}
