//! Backing memory regions for allocators
//!
//! Every allocator in this crate works over a [`MemoryRegion`]: a
//! contiguous byte range the allocator manages but conceptually does not
//! own. A region is either
//!
//! - **owned**: allocated here via `std::alloc` with an explicit alignment
//!   and freed when the region is dropped (the convenience path used by
//!   the allocators' `new` constructors), or
//! - **borrowed**: wrapped around caller-supplied memory via
//!   [`MemoryRegion::from_raw_parts`], in which case the caller keeps
//!   ownership and must guarantee the memory outlives the region and is
//!   not mutated by anything else.
//!
//! Allocators never access memory outside `[base, base + len)`.

use core::alloc::Layout;
use core::ptr::NonNull;
use std::alloc::{alloc_zeroed, dealloc};

use crate::error::{MemoryError, MemoryResult};

/// Default allocation alignment (bytes)
///
/// Matches the strictest alignment of the common SIMD-friendly engine
/// types; per-call overrides are available where the allocator exposes an
/// alignment parameter.
pub const DEFAULT_ALIGNMENT: usize = 16;

/// A contiguous byte range managed (but not necessarily owned) by an
/// allocator
pub struct MemoryRegion {
    ptr: NonNull<u8>,
    len: usize,
    /// `Some` if this region allocated its own buffer and must free it
    owned: Option<Layout>,
}

impl MemoryRegion {
    /// Allocates an owned, zeroed region of `len` bytes aligned to `align`
    ///
    /// # Errors
    /// Returns an error if `len` is zero, `align` is not a power of two,
    /// or the underlying allocation fails.
    pub fn alloc(len: usize, align: usize) -> MemoryResult<Self> {
        if len == 0 {
            return Err(MemoryError::invalid_capacity(0, "region cannot be empty"));
        }
        if !align.is_power_of_two() {
            return Err(MemoryError::invalid_alignment(align));
        }

        let layout = Layout::from_size_align(len, align)
            .map_err(|_| MemoryError::size_overflow("region layout"))?;

        // SAFETY: layout has non-zero size (len > 0 checked above).
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr =
            NonNull::new(raw).ok_or_else(|| MemoryError::allocation_failed(len, align))?;

        Ok(Self {
            ptr,
            len,
            owned: Some(layout),
        })
    }

    /// Wraps caller-supplied memory without taking ownership
    ///
    /// # Safety
    ///
    /// Caller must ensure:
    /// - `ptr` is valid for reads and writes of `len` bytes
    /// - the memory outlives the region (and every allocator built on it)
    /// - no other code reads or writes the range while the region exists
    #[must_use]
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        Self {
            ptr,
            len,
            owned: None,
        }
    }

    /// Base pointer of the region
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Base address of the region
    #[inline]
    pub fn base_addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Length of the region in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is empty (never true for a constructed region)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One-past-the-end address of the region
    #[inline]
    pub fn end_addr(&self) -> usize {
        self.base_addr() + self.len
    }

    /// Whether this region owns (and will free) its buffer
    #[inline]
    pub fn is_owned(&self) -> bool {
        self.owned.is_some()
    }

    /// Range check: does `addr` fall inside `[base, base + len)`?
    #[inline]
    pub fn contains_addr(&self, addr: usize) -> bool {
        addr >= self.base_addr() && addr < self.end_addr()
    }

    /// Range check for a raw pointer
    #[inline]
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.contains_addr(ptr as usize)
    }
}

impl Drop for MemoryRegion {
    fn drop(&mut self) {
        if let Some(layout) = self.owned {
            // SAFETY: ptr was returned by alloc_zeroed with this exact
            // layout and has not been freed (owned is cleared only here).
            unsafe {
                dealloc(self.ptr.as_ptr(), layout);
            }
        }
    }
}

// SAFETY: MemoryRegion is a pointer + length pair; the bytes it covers are
// only mutated through the allocator built on top of it, which provides its
// own synchronization (atomics for the concurrent allocators, !Sync for the
// single-threaded ones). Transferring the region between threads moves the
// whole allocator with it.
unsafe impl Send for MemoryRegion {}

// SAFETY: Sharing a &MemoryRegion only exposes the address range; all
// mutable access goes through the owning allocator's synchronization.
unsafe impl Sync for MemoryRegion {}

impl core::fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryRegion")
            .field("base", &format_args!("{:#x}", self.base_addr()))
            .field("len", &self.len)
            .field("owned", &self.is_owned())
            .finish()
    }
}
