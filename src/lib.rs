//! # vortex-memory
//!
//! Low-level concurrent memory management for the Vortex engine.
//!
//! This crate provides the allocator core shared by the renderer, the task
//! graph and the resource system:
//! - Fixed-block index pools with intrusive free lists ([`pool::IndexPool`],
//!   [`pool::ConcurrentIndexPool`])
//! - Bump allocators with O(1) bulk reset ([`alloc::LinearAllocator`],
//!   [`alloc::ConcurrentLinearAllocator`])
//! - A segregated small-block allocator with recyclable chunks
//!   ([`alloc::SmallBlockAllocator`])
//! - ABA-resistant tagged values for lock-free structures ([`tagged`])
//!
//! All allocators manage but never own their backing memory semantics: a
//! [`region::MemoryRegion`] either borrows a caller-supplied arena or holds
//! an owned, properly aligned buffer for convenience. Handles returned by
//! the index pools are `u32` block indices rather than pointers, so they
//! stay valid across arena relocation.
//!
//! ## Quick start
//!
//! ```rust
//! use vortex_memory::pool::IndexPool;
//!
//! let pool = IndexPool::new(64, 8, 128)?;
//! let block = pool.allocate().expect("fresh pool has free blocks");
//! let ptr = pool.block_ptr(block);
//! // ... use the block ...
//! pool.deallocate(block)?;
//! # vortex_memory::MemoryResult::Ok(())
//! ```
//!
//! ## Features
//!
//! - `logging` (default): structured logging of exhaustion and chunk
//!   lifecycle events via `tracing`
//!
//! ## Error model
//!
//! Exhaustion is an expected condition and is reported as `None` on the hot
//! path, never as an error value. [`error::MemoryError`] is reserved for
//! construction-time validation and for misuse that can be detected cheaply
//! off the hot path (for example deallocating an index a pool does not own).

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(clippy::all)]
#![warn(clippy::perf)]
#![warn(rust_2018_idioms)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
// inline(always) on small alignment helpers is intentional for hot paths
#![allow(clippy::inline_always)]
// Cast truncation in index/offset arithmetic is reviewed per-site
#![allow(clippy::cast_possible_truncation)]
// Struct bool fields are configuration — splitting is over-engineering
#![allow(clippy::struct_excessive_bools)]

// Error types
pub mod error;

// Core modules
pub mod alloc;
pub mod pool;
pub mod region;
pub mod stats;
pub mod tagged;
pub mod traits;
pub mod utils;

// Re-export common types for convenience
pub use crate::error::{MemoryError, MemoryResult};
pub use crate::region::MemoryRegion;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::alloc::{
        ConcurrentLinearAllocator, LinearAllocator, LinearConfig, SmallBlockAllocator,
        SmallBlockConfig,
    };
    pub use crate::error::{MemoryError, MemoryResult};
    pub use crate::pool::{
        BlockIndex, ConcurrentIndexPool, IndexPool, ObjectPool, PoolConfig,
    };
    pub use crate::region::MemoryRegion;
    pub use crate::stats::AllocatorStats;
    pub use crate::tagged::{AtomicTaggedIndex, AtomicTaggedPtr, TaggedIndex, TaggedPtr};
    pub use crate::traits::{MemoryUsage, Resettable, StatisticsProvider};
    pub use crate::utils::Backoff;
}
