//! Standalone error types for vortex-memory
//!
//! Uses thiserror for clean, idiomatic Rust error definitions.
//!
//! Errors are reserved for construction-time validation and detectable
//! misuse. Ordinary exhaustion (a pool with no free block, a full bump
//! region) is reported as `None` by the allocators themselves and never
//! surfaces here.

use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::warn;

/// Memory management errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    // --- Configuration Errors ---
    #[error("Invalid alignment: {alignment} (must be a power of two)")]
    InvalidAlignment { alignment: usize },

    #[error("Invalid capacity {capacity}: {reason}")]
    InvalidCapacity { capacity: usize, reason: String },

    #[error("Invalid block size {size}: {reason}")]
    InvalidBlockSize { size: usize, reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Size overflow during operation: {operation}")]
    SizeOverflow { operation: String },

    // --- Region Errors ---
    #[error("Backing region too small: {actual} bytes supplied, {required} required")]
    RegionTooSmall { required: usize, actual: usize },

    #[error("Backing region misaligned: address {addr:#x} is not aligned to {required}")]
    RegionMisaligned { addr: usize, required: usize },

    // --- Misuse Errors ---
    #[error("Invalid block index {index} (capacity: {capacity})")]
    InvalidIndex { index: u32, capacity: u32 },

    #[error("Foreign pointer: {addr:#x} is not managed by this allocator")]
    ForeignPointer { addr: usize },

    #[error("Misaligned pointer: {addr:#x} is not on a block boundary")]
    MisalignedPointer { addr: usize },

    // --- System Errors ---
    #[error("Memory allocation failed: {size} bytes with {align} byte alignment")]
    AllocationFailed { size: usize, align: usize },
}

impl MemoryError {
    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AllocationFailed { .. })
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAlignment { .. } => "MEM:CONFIG:ALIGN",
            Self::InvalidCapacity { .. } => "MEM:CONFIG:CAPACITY",
            Self::InvalidBlockSize { .. } => "MEM:CONFIG:BLOCK_SIZE",
            Self::InvalidConfig { .. } => "MEM:CONFIG:INVALID",
            Self::SizeOverflow { .. } => "MEM:CONFIG:OVERFLOW",
            Self::RegionTooSmall { .. } => "MEM:REGION:SIZE",
            Self::RegionMisaligned { .. } => "MEM:REGION:ALIGN",
            Self::InvalidIndex { .. } => "MEM:MISUSE:INDEX",
            Self::ForeignPointer { .. } => "MEM:MISUSE:FOREIGN",
            Self::MisalignedPointer { .. } => "MEM:MISUSE:ALIGN",
            Self::AllocationFailed { .. } => "MEM:ALLOC:FAILED",
        }
    }

    // ------------------------------------------------------------------
    // Convenience constructors
    // ------------------------------------------------------------------

    /// Create invalid alignment error
    #[must_use]
    pub fn invalid_alignment(alignment: usize) -> Self {
        Self::InvalidAlignment { alignment }
    }

    /// Create invalid capacity error
    pub fn invalid_capacity(capacity: usize, reason: &str) -> Self {
        Self::InvalidCapacity {
            capacity,
            reason: reason.to_string(),
        }
    }

    /// Create invalid block size error
    pub fn invalid_block_size(size: usize, reason: &str) -> Self {
        Self::InvalidBlockSize {
            size,
            reason: reason.to_string(),
        }
    }

    /// Create invalid config error
    pub fn invalid_config(reason: &str) -> Self {
        Self::InvalidConfig {
            reason: reason.to_string(),
        }
    }

    /// Create size overflow error
    pub fn size_overflow(operation: &str) -> Self {
        Self::SizeOverflow {
            operation: operation.to_string(),
        }
    }

    /// Create region too small error
    #[must_use]
    pub fn region_too_small(required: usize, actual: usize) -> Self {
        Self::RegionTooSmall { required, actual }
    }

    /// Create region misaligned error
    #[must_use]
    pub fn region_misaligned(addr: usize, required: usize) -> Self {
        Self::RegionMisaligned { addr, required }
    }

    /// Create invalid index error
    #[must_use]
    pub fn invalid_index(index: u32, capacity: u32) -> Self {
        #[cfg(feature = "logging")]
        warn!(index, capacity, "deallocate called with out-of-range index");

        Self::InvalidIndex { index, capacity }
    }

    /// Create foreign pointer error
    #[must_use]
    pub fn foreign_pointer(addr: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(addr, "deallocate called with pointer outside managed region");

        Self::ForeignPointer { addr }
    }

    /// Create misaligned pointer error
    #[must_use]
    pub fn misaligned_pointer(addr: usize) -> Self {
        Self::MisalignedPointer { addr }
    }

    /// Create allocation failed error
    #[must_use]
    pub fn allocation_failed(size: usize, align: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(size, align, "backing memory allocation failed");

        Self::AllocationFailed { size, align }
    }
}

/// Result type for memory operations
pub type MemoryResult<T> = core::result::Result<T, MemoryError>;
