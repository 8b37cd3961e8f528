//! Cross-thread stress tests for the lock-free index pool

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use vortex_memory::prelude::*;

/// Every thread churns allocate/write/read/free cycles while a shared
/// in-use table asserts no block is ever owned by two threads at once.
#[test]
fn no_block_is_owned_by_two_threads() {
    const CAPACITY: u32 = 128;
    const THREADS: usize = 8;
    const CYCLES: usize = 20_000;

    let pool = Arc::new(
        ConcurrentIndexPool::with_config(64, 8, CAPACITY, PoolConfig::production()).unwrap(),
    );
    let in_use: Arc<Vec<AtomicBool>> =
        Arc::new((0..CAPACITY).map(|_| AtomicBool::new(false)).collect());

    let handles: Vec<_> = (0..THREADS)
        .map(|thread_id| {
            let pool = Arc::clone(&pool);
            let in_use = Arc::clone(&in_use);
            std::thread::spawn(move || {
                for cycle in 0..CYCLES {
                    let Some(index) = pool.allocate() else {
                        continue; // exhausted or lost the CAS race
                    };
                    let marker = &in_use[index as usize];
                    assert!(
                        !marker.swap(true, Ordering::AcqRel),
                        "block {index} handed to two threads"
                    );

                    let stamp = (thread_id * CYCLES + cycle) as u64;
                    let ptr = pool.block_ptr(index).as_ptr().cast::<u64>();
                    // SAFETY: this thread owns the block until deallocate.
                    unsafe {
                        ptr.write(stamp);
                        assert_eq!(ptr.read(), stamp, "block {index} was overwritten");
                    }

                    marker.store(false, Ordering::Release);
                    pool.deallocate(index).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(pool.free_blocks(), CAPACITY);
}

/// Producers allocate and hand indices to consumers over a channel;
/// consumers free them. Checks the free path is safe from a thread other
/// than the allocating one.
#[test]
fn blocks_can_be_freed_by_another_thread() {
    const CAPACITY: u32 = 256;

    let pool = Arc::new(ConcurrentIndexPool::new(32, 8, CAPACITY).unwrap());
    let (tx, rx) = std::sync::mpsc::channel::<u32>();

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let tx = tx.clone();
            std::thread::spawn(move || {
                let mut sent = 0;
                while sent < 5_000 {
                    if let Some(index) = pool.allocate() {
                        tx.send(index).unwrap();
                        sent += 1;
                    }
                }
            })
        })
        .collect();
    drop(tx);

    let consumer = {
        let pool = Arc::clone(&pool);
        std::thread::spawn(move || {
            let mut freed = 0usize;
            while let Ok(index) = rx.recv() {
                pool.deallocate(index).unwrap();
                freed += 1;
            }
            freed
        })
    };

    for producer in producers {
        producer.join().unwrap();
    }
    assert_eq!(consumer.join().unwrap(), 20_000);
    assert_eq!(pool.free_blocks(), CAPACITY);
}

/// Rapid reuse of a tiny pool is the classic ABA trigger; the tagged head
/// must keep the free list intact through it.
#[test]
fn rapid_reuse_does_not_corrupt_the_free_list() {
    const CAPACITY: u32 = 4;

    let pool = Arc::new(
        ConcurrentIndexPool::with_config(16, 4, CAPACITY, PoolConfig::production()).unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                for _ in 0..50_000 {
                    if let Some(index) = pool.allocate() {
                        pool.deallocate(index).unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // The free list must still contain exactly the full block set.
    let mut drained = Vec::new();
    while let Some(index) = pool.allocate() {
        drained.push(index);
    }
    drained.sort_unstable();
    assert_eq!(drained, vec![0, 1, 2, 3]);
}
