//! Fixed-block index pools
//!
//! Pools hand out blocks of a single, fixed size from a backing
//! [`MemoryRegion`](crate::region::MemoryRegion) and identify them by
//! `u32` index rather than by pointer. Indices survive arena relocation
//! (the mapping `offset = index * stride` is position-based), cost half a
//! pointer on 64-bit targets, and pair naturally with a generation tag for
//! lock-free reuse.
//!
//! - [`IndexPool`] — single-owner pool, `Cell`-based free list head
//! - [`ConcurrentIndexPool`] — lock-free pool, generation-tagged atomic
//!   head
//! - [`ObjectPool`] — typed construct/destroy layer over [`IndexPool`]
//!
//! Free blocks store the index of the next free block in their first four
//! bytes (intrusive free list), so the pools carry no per-block metadata.

mod concurrent;
mod index_pool;
mod object_pool;

pub use concurrent::ConcurrentIndexPool;
pub use index_pool::IndexPool;
pub use object_pool::ObjectPool;

/// Index of a block within a pool
pub type BlockIndex = u32;

/// Sentinel index marking the end of a free list / "no block"
///
/// Reserved: a pool's capacity is bounded by `NIL`, so a valid block never
/// carries this index.
pub const NIL: BlockIndex = BlockIndex::MAX;

/// Configuration for index pools
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Enable statistics tracking
    pub track_stats: bool,

    /// Fill pattern byte for newly allocated blocks (for debugging)
    pub alloc_pattern: Option<u8>,
    /// Fill pattern byte for deallocated blocks (for debugging)
    pub dealloc_pattern: Option<u8>,

    /// Use exponential backoff for CAS retries (concurrent pool only)
    pub use_backoff: bool,

    /// Maximum contended CAS retries before an allocate attempt gives up
    /// (concurrent pool only)
    pub max_retries: usize,
}

impl Default for PoolConfig {
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
            use_backoff: true,
            max_retries: 1000,
        }
    }
}

impl PoolConfig {
    /// Production configuration - optimized for performance
    #[must_use]
    pub fn production() -> Self {
        Self {
            track_stats: false,
            alloc_pattern: None,
            dealloc_pattern: None,
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
            dealloc_pattern: Some(0xDD),
            use_backoff: false,
            max_retries: 100,
        }
    }
}
