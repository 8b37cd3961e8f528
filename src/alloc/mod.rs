//! Linear (bump) and segregated small-block allocators
//!
//! - [`LinearAllocator`] — single-owner bump allocator with O(1) bulk reset
//! - [`ConcurrentLinearAllocator`] — the same contract over an atomic
//!   cursor, safe to bump from many threads
//! - [`SmallBlockAllocator`] — size-class allocator carving recyclable
//!   32 KiB chunks out of one region
//!
//! All three allocate from a [`MemoryRegion`](crate::region::MemoryRegion)
//! and return `None` on exhaustion instead of erroring; the caller decides
//! whether running out is fatal.

mod concurrent_linear;
mod linear;
mod small_block;

pub use concurrent_linear::ConcurrentLinearAllocator;
pub use linear::{LinearAllocator, LinearConfig};
pub use small_block::{SmallBlockAllocator, SmallBlockConfig, CHUNK_SIZE, MAX_SIZE_CLASSES};
