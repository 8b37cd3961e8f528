//! Typed construct/destroy layer over [`IndexPool`]

use core::marker::PhantomData;
use core::mem::{align_of, size_of};
use core::ptr;

use crate::error::MemoryResult;
use crate::pool::{BlockIndex, IndexPool, PoolConfig};
use crate::traits::{MemoryUsage, StatisticsProvider};

/// Pool of `T` values addressed by block index
///
/// A thin layer over [`IndexPool`] with the block geometry derived from
/// `T`: [`create`](Self::create) placement-writes a value into a fresh
/// block and [`destroy`](Self::destroy) drops it in place before the
/// block returns to the free list. The pool itself carries no extra
/// per-object state.
///
/// Dropping the pool releases the backing memory without running any
/// remaining objects' destructors; destroy everything you created if `T`
/// owns resources.
pub struct ObjectPool<T> {
    pool: IndexPool,
    _marker: PhantomData<T>,
}

impl<T> ObjectPool<T> {
    /// Creates a pool with room for `capacity` objects
    ///
    /// # Errors
    /// Returns an error if the capacity is invalid or the backing
    /// allocation fails.
    pub fn new(capacity: u32) -> MemoryResult<Self> {
        Self::with_config(capacity, PoolConfig::default())
    }

    /// Creates a pool with explicit configuration
    ///
    /// # Errors
    /// Returns an error if the capacity is invalid or the backing
    /// allocation fails.
    pub fn with_config(capacity: u32, config: PoolConfig) -> MemoryResult<Self> {
        // Zero-sized types still consume a link word per slot.
        let block_size = size_of::<T>().max(1);
        let pool = IndexPool::with_config(block_size, align_of::<T>(), capacity, config)?;
        Ok(Self {
            pool,
            _marker: PhantomData,
        })
    }

    /// Moves `value` into a fresh block, returning its index
    ///
    /// Returns `None` (and drops `value`) when the pool is exhausted.
    pub fn create(&self, value: T) -> Option<BlockIndex> {
        let index = self.pool.allocate()?;
        // SAFETY: the block is freshly allocated, properly sized and
        // aligned for T, and not aliased.
        unsafe {
            ptr::write(self.pool.block_ptr(index).cast::<T>().as_ptr(), value);
        }
        Some(index)
    }

    /// Drops the object at `index` and frees its block
    ///
    /// # Safety
    ///
    /// `index` must have come from [`create`](Self::create) and not been
    /// destroyed since; anything else drops a non-live value.
    ///
    /// # Errors
    /// Returns an error if `index` is out of range (nothing is dropped in
    /// that case).
    pub unsafe fn destroy(&self, index: BlockIndex) -> MemoryResult<()> {
        if index >= self.pool.capacity() {
            return self.pool.deallocate(index); // reports the range error
        }
        // SAFETY: per contract the block holds a live T.
        unsafe {
            ptr::drop_in_place(self.pool.block_ptr(index).cast::<T>().as_ptr());
        }
        self.pool.deallocate(index)
    }

    /// Shared reference to the object at `index`
    ///
    /// # Safety
    ///
    /// `index` must refer to a live object, and the reference must not
    /// outlive a `destroy` of that index.
    #[inline]
    #[must_use]
    pub unsafe fn get(&self, index: BlockIndex) -> &T {
        // SAFETY: per contract the block holds a live T.
        unsafe { self.pool.block_ptr(index).cast::<T>().as_ref() }
    }

    /// Exclusive reference to the object at `index`
    ///
    /// # Safety
    ///
    /// Same liveness rules as [`get`](Self::get), plus no other reference
    /// to this object may exist for the returned borrow's lifetime.
    #[inline]
    #[must_use]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, index: BlockIndex) -> &mut T {
        // SAFETY: per contract the block holds a live, unaliased T.
        unsafe { self.pool.block_ptr(index).cast::<T>().as_mut() }
    }

    /// Total number of object slots
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.pool.capacity()
    }

    /// Number of free slots
    #[inline]
    pub fn free_slots(&self) -> u32 {
        self.pool.free_blocks()
    }

    /// Number of live objects
    #[inline]
    pub fn live_objects(&self) -> u32 {
        self.pool.allocated_blocks()
    }

    /// Whether every slot is occupied
    #[inline]
    pub fn is_full(&self) -> bool {
        self.pool.is_full()
    }
}

impl<T> MemoryUsage for ObjectPool<T> {
    fn used_memory(&self) -> usize {
        self.pool.used_memory()
    }

    fn available_memory(&self) -> Option<usize> {
        self.pool.available_memory()
    }
}

impl<T> StatisticsProvider for ObjectPool<T> {
    fn statistics(&self) -> Option<crate::stats::AllocatorStats> {
        self.pool.statistics()
    }

    fn reset_statistics(&self) {
        self.pool.reset_statistics();
    }
}

impl<T> core::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("capacity", &self.capacity())
            .field("live_objects", &self.live_objects())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[derive(Debug, PartialEq)]
    struct Particle {
        position: [f32; 3],
        velocity: [f32; 3],
        ttl: u32,
    }

    #[test]
    fn test_create_and_access() {
        let pool: ObjectPool<Particle> = ObjectPool::new(16).unwrap();
        let index = pool
            .create(Particle {
                position: [1.0, 2.0, 3.0],
                velocity: [0.0; 3],
                ttl: 60,
            })
            .unwrap();

        // SAFETY: index is live.
        let p = unsafe { pool.get(index) };
        assert_eq!(p.position, [1.0, 2.0, 3.0]);
        assert_eq!(p.ttl, 60);

        // SAFETY: index is live and no other reference exists.
        unsafe { pool.get_mut(index) }.ttl = 30;
        // SAFETY: index is live.
        assert_eq!(unsafe { pool.get(index) }.ttl, 30);

        // SAFETY: index is live.
        unsafe { pool.destroy(index) }.unwrap();
        assert_eq!(pool.live_objects(), 0);
    }

    #[test]
    fn test_exhaustion_returns_none() {
        let pool: ObjectPool<u64> = ObjectPool::new(2).unwrap();
        assert!(pool.create(1).is_some());
        assert!(pool.create(2).is_some());
        assert!(pool.create(3).is_none());
        assert!(pool.is_full());
    }

    #[test]
    fn test_destroy_runs_drop() {
        let witness = Rc::new(());
        let pool: ObjectPool<Rc<()>> = ObjectPool::new(4).unwrap();
        let index = pool.create(Rc::clone(&witness)).unwrap();
        assert_eq!(Rc::strong_count(&witness), 2);
        // SAFETY: index is live.
        unsafe { pool.destroy(index) }.unwrap();
        assert_eq!(Rc::strong_count(&witness), 1);
    }

    #[test]
    fn test_pool_drop_skips_destructors() {
        let witness = Rc::new(());
        {
            let pool: ObjectPool<Rc<()>> = ObjectPool::new(4).unwrap();
            pool.create(Rc::clone(&witness)).unwrap();
            assert_eq!(Rc::strong_count(&witness), 2);
        }
        // The clone inside the pool was leaked, not dropped.
        assert_eq!(Rc::strong_count(&witness), 2);
    }

    #[test]
    fn test_zero_sized_type() {
        let pool: ObjectPool<()> = ObjectPool::new(8).unwrap();
        let index = pool.create(()).unwrap();
        // SAFETY: index is live.
        unsafe { pool.destroy(index) }.unwrap();
    }
}
