//! ABA-resistant tagged values for lock-free structures
//!
//! A compare-and-swap on a bare pointer or index is vulnerable to the ABA
//! hazard: the value can be popped, reused and pushed back between another
//! thread's read and its CAS, letting the CAS succeed against logically
//! different state. Both types here pair the value with a tag that changes
//! on every reuse, and CAS the combined word as one unit.
//!
//! - [`TaggedIndex`] packs `{generation: u32, index: u32}` into a `u64`.
//!   The 32-bit generation is wide enough that wrapping around inside one
//!   thread's read-to-CAS window is not a realistic hazard; this is the
//!   primary strategy used by the pools in this crate.
//! - [`TaggedPtr`] packs a small tag into the low alignment bits of a
//!   pointer. Its tag width is `align_of::<T>().trailing_zeros()` bits
//!   (3 bits for an 8-byte-aligned node), so under sustained contention
//!   the tag can wrap quickly; prefer [`TaggedIndex`] unless the consumer
//!   is constrained to a single pointer-sized word.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

// ============================================================================
// Tagged index
// ============================================================================

/// A `{generation, index}` pair packed into one `u64`
///
/// The index occupies the low 32 bits and the generation the high 32 bits,
/// so the pair can be compare-and-swapped atomically on any 64-bit-atomics
/// platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedIndex {
    raw: u64,
}

impl TaggedIndex {
    /// Creates a tagged index from its parts
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self {
            raw: ((generation as u64) << 32) | index as u64,
        }
    }

    /// Reconstructs a tagged index from its raw word
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self { raw }
    }

    /// The raw combined word
    #[inline]
    pub const fn into_raw(self) -> u64 {
        self.raw
    }

    /// The index part
    #[inline]
    pub const fn index(self) -> u32 {
        self.raw as u32
    }

    /// The generation part
    #[inline]
    pub const fn generation(self) -> u32 {
        (self.raw >> 32) as u32
    }

    /// A new pair carrying `index` with this pair's generation + 1
    ///
    /// Used by CAS loops: the successor of an observed head always bumps
    /// the generation, so a stale head value can never win a CAS.
    #[inline]
    #[must_use]
    pub const fn successor(self, index: u32) -> Self {
        Self::new(index, self.generation().wrapping_add(1))
    }
}

/// Atomic cell holding a [`TaggedIndex`]
#[derive(Debug)]
pub struct AtomicTaggedIndex(AtomicU64);

impl AtomicTaggedIndex {
    /// Creates a cell holding `value`
    #[inline]
    #[must_use]
    pub const fn new(value: TaggedIndex) -> Self {
        Self(AtomicU64::new(value.into_raw()))
    }

    /// Atomic load
    #[inline]
    pub fn load(&self, ordering: Ordering) -> TaggedIndex {
        TaggedIndex::from_raw(self.0.load(ordering))
    }

    /// Atomic store
    #[inline]
    pub fn store(&self, value: TaggedIndex, ordering: Ordering) {
        self.0.store(value.into_raw(), ordering);
    }

    /// Atomic compare-and-swap of the combined word
    #[inline]
    pub fn compare_exchange_weak(
        &self,
        current: TaggedIndex,
        new: TaggedIndex,
        success: Ordering,
        failure: Ordering,
    ) -> Result<TaggedIndex, TaggedIndex> {
        self.0
            .compare_exchange_weak(current.into_raw(), new.into_raw(), success, failure)
            .map(TaggedIndex::from_raw)
            .map_err(TaggedIndex::from_raw)
    }
}

// ============================================================================
// Tagged pointer
// ============================================================================

/// A pointer with a small tag packed into its low alignment bits
///
/// Construction requires the pointer to be aligned to at least
/// `2^TAG_BITS`; the tag lives in the bits alignment guarantees are zero.
/// Value semantics throughout — the only synchronization primitive is
/// [`AtomicTaggedPtr::compare_exchange`].
pub struct TaggedPtr<T> {
    raw: usize,
    _marker: PhantomData<*mut T>,
}

impl<T> TaggedPtr<T> {
    /// Number of tag bits available, derived from `T`'s alignment
    pub const TAG_BITS: u32 = core::mem::align_of::<T>().trailing_zeros();

    /// Mask covering the tag bits
    pub const TAG_MASK: usize = core::mem::align_of::<T>() - 1;

    /// Creates a tagged pointer from its parts
    ///
    /// # Panics
    /// Panics if `ptr`'s low [`TAG_BITS`](Self::TAG_BITS) are not zero
    /// (i.e. the pointer is under-aligned) or `tag` does not fit.
    #[inline]
    #[must_use]
    pub fn new(ptr: *mut T, tag: usize) -> Self {
        assert_eq!(
            ptr as usize & Self::TAG_MASK,
            0,
            "pointer must be aligned to 2^TAG_BITS"
        );
        assert!(tag <= Self::TAG_MASK, "tag does not fit in the tag bits");
        Self {
            raw: ptr as usize | tag,
            _marker: PhantomData,
        }
    }

    /// A null pointer with tag zero
    #[inline]
    #[must_use]
    pub const fn null() -> Self {
        Self {
            raw: 0,
            _marker: PhantomData,
        }
    }

    /// Reconstructs a tagged pointer from its raw word
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: usize) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// The raw combined word
    #[inline]
    pub const fn into_raw(self) -> usize {
        self.raw
    }

    /// The pointer part, tag bits cleared
    #[inline]
    pub const fn ptr(self) -> *mut T {
        (self.raw & !Self::TAG_MASK) as *mut T
    }

    /// The tag part
    #[inline]
    pub const fn tag(self) -> usize {
        self.raw & Self::TAG_MASK
    }

    /// Whether the pointer part is null
    #[inline]
    pub const fn is_null(self) -> bool {
        self.ptr().is_null()
    }

    /// This pointer with its tag incremented (wrapping within the tag bits)
    #[inline]
    #[must_use]
    pub fn bump_tag(self) -> Self {
        let tag = (self.tag() + 1) & Self::TAG_MASK;
        Self {
            raw: (self.raw & !Self::TAG_MASK) | tag,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for TaggedPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TaggedPtr<T> {}

impl<T> PartialEq for TaggedPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for TaggedPtr<T> {}

impl<T> core::fmt::Debug for TaggedPtr<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaggedPtr")
            .field("ptr", &self.ptr())
            .field("tag", &self.tag())
            .finish()
    }
}

/// Atomic cell holding a [`TaggedPtr`]
pub struct AtomicTaggedPtr<T> {
    raw: AtomicUsize,
    _marker: PhantomData<*mut T>,
}

impl<T> AtomicTaggedPtr<T> {
    /// Creates a cell holding `value`
    #[inline]
    #[must_use]
    pub const fn new(value: TaggedPtr<T>) -> Self {
        Self {
            raw: AtomicUsize::new(value.into_raw()),
            _marker: PhantomData,
        }
    }

    /// Atomic load
    #[inline]
    pub fn load(&self, ordering: Ordering) -> TaggedPtr<T> {
        TaggedPtr::from_raw(self.raw.load(ordering))
    }

    /// Atomic store
    #[inline]
    pub fn store(&self, value: TaggedPtr<T>, ordering: Ordering) {
        self.raw.store(value.into_raw(), ordering);
    }

    /// Atomic compare-and-swap of the combined word
    #[inline]
    pub fn compare_exchange(
        &self,
        current: TaggedPtr<T>,
        new: TaggedPtr<T>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<TaggedPtr<T>, TaggedPtr<T>> {
        self.raw
            .compare_exchange(current.into_raw(), new.into_raw(), success, failure)
            .map(TaggedPtr::from_raw)
            .map_err(TaggedPtr::from_raw)
    }

    /// Weak variant for use inside retry loops
    #[inline]
    pub fn compare_exchange_weak(
        &self,
        current: TaggedPtr<T>,
        new: TaggedPtr<T>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<TaggedPtr<T>, TaggedPtr<T>> {
        self.raw
            .compare_exchange_weak(current.into_raw(), new.into_raw(), success, failure)
            .map(TaggedPtr::from_raw)
            .map_err(TaggedPtr::from_raw)
    }
}

// SAFETY: the cell only holds a word; whether the pointee may be touched
// from several threads is the consumer's contract, same as AtomicPtr.
unsafe impl<T> Send for AtomicTaggedPtr<T> {}
unsafe impl<T> Sync for AtomicTaggedPtr<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_index_roundtrip() {
        let t = TaggedIndex::new(42, 7);
        assert_eq!(t.index(), 42);
        assert_eq!(t.generation(), 7);
        assert_eq!(TaggedIndex::from_raw(t.into_raw()), t);
    }

    #[test]
    fn test_tagged_index_successor_bumps_generation() {
        let t = TaggedIndex::new(3, u32::MAX);
        let s = t.successor(9);
        assert_eq!(s.index(), 9);
        assert_eq!(s.generation(), 0); // wraps
        assert_ne!(s, t);
    }

    #[test]
    fn test_atomic_tagged_index_cas() {
        let cell = AtomicTaggedIndex::new(TaggedIndex::new(1, 0));
        let current = cell.load(Ordering::Acquire);
        let new = current.successor(2);
        assert!(
            cell.compare_exchange_weak(current, new, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        );
        // Stale value must lose even though the index matches again.
        let stale = TaggedIndex::new(2, 0);
        assert!(
            cell.compare_exchange_weak(
                stale,
                stale.successor(1),
                Ordering::AcqRel,
                Ordering::Acquire
            )
            .is_err()
        );
    }

    #[test]
    fn test_tagged_ptr_pack_unpack() {
        let mut value = 0u64;
        let ptr: *mut u64 = &mut value;
        let tagged = TaggedPtr::new(ptr, 3);
        assert_eq!(tagged.ptr(), ptr);
        assert_eq!(tagged.tag(), 3);
        assert!(!tagged.is_null());
        assert_eq!(TaggedPtr::<u64>::TAG_BITS, 3);
    }

    #[test]
    fn test_tagged_ptr_bump_wraps() {
        let mut value = 0u64;
        let ptr: *mut u64 = &mut value;
        let mut tagged = TaggedPtr::new(ptr, TaggedPtr::<u64>::TAG_MASK);
        tagged = tagged.bump_tag();
        assert_eq!(tagged.tag(), 0);
        assert_eq!(tagged.ptr(), ptr);
    }

    #[test]
    #[should_panic(expected = "aligned")]
    fn test_tagged_ptr_rejects_unaligned() {
        let mut words = [0u64; 2];
        // One byte past an 8-aligned base is never 8-aligned.
        let unaligned = (words.as_mut_ptr() as usize + 1) as *mut u64;
        let _ = TaggedPtr::new(unaligned, 0);
    }
}
