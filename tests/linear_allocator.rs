//! Integration tests for the linear allocators

use std::sync::Arc;

use rand::Rng;
use vortex_memory::prelude::*;

#[test]
fn frame_scratch_pattern() {
    // Allocate a frame's worth of scratch, reset, repeat. Usage must
    // return to zero every frame and no frame may fail.
    let arena = LinearAllocator::new(64 * 1024).unwrap();
    let mut rng = rand::thread_rng();

    for _frame in 0..100 {
        let mut frame_bytes = 0;
        while frame_bytes < 32 * 1024 {
            // Minimum size 16 bounds alignment padding so a frame can
            // never overflow the arena.
            let size = rng.gen_range(16..=512);
            let align = 1usize << rng.gen_range(0..5);
            let ptr = arena.allocate(size, align).unwrap();
            assert_eq!(ptr.as_ptr() as usize % align, 0);
            frame_bytes += size;
        }
        // SAFETY: all frame pointers are dropped before the reset.
        unsafe { arena.reset() };
        assert_eq!(arena.used_memory(), 0);
    }
}

#[test]
fn accounting_is_exact_for_aligned_requests() {
    let arena = LinearAllocator::with_config(4096, LinearConfig::production()).unwrap();
    arena.allocate(1024, 16).unwrap();
    arena.allocate(1024, 16).unwrap();
    assert_eq!(arena.used_memory(), 2048);
    assert_eq!(arena.available_memory(), Some(2048));
    assert_eq!(arena.total_memory(), Some(4096));
}

#[test]
fn oversized_request_leaves_space_usable() {
    let arena = LinearAllocator::new(1024).unwrap();
    arena.allocate(1000, 8).unwrap();
    assert!(arena.allocate(512, 8).is_none());
    assert!(arena.allocate(16, 8).is_some());
}

#[test]
fn concurrent_writers_never_overlap() {
    let arena = Arc::new(
        ConcurrentLinearAllocator::with_config(1 << 22, LinearConfig::production()).unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|thread_id| {
            let arena = Arc::clone(&arena);
            std::thread::spawn(move || {
                let stamp = thread_id as u8 + 1;
                let mut blocks = Vec::new();
                for _ in 0..2_000 {
                    if let Some(ptr) = arena.allocate(128, 16) {
                        // SAFETY: the CAS claimed these 128 bytes for us.
                        unsafe {
                            ptr.as_ptr().write_bytes(stamp, 128);
                        }
                        blocks.push(ptr);
                    }
                }
                // Every byte must still carry our stamp.
                for ptr in blocks {
                    for offset in 0..128 {
                        // SAFETY: block was claimed by this thread.
                        let byte = unsafe { ptr.as_ptr().add(offset).read() };
                        assert_eq!(byte, stamp, "block content clobbered");
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn concurrent_reset_round() {
    let arena = Arc::new(ConcurrentLinearAllocator::new(1 << 16).unwrap());
    for _round in 0..20 {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let arena = Arc::clone(&arena);
                std::thread::spawn(move || {
                    let mut allocated = 0;
                    loop {
                        if arena.allocate(256, 16).is_some() {
                            allocated += 1;
                        } else if arena.remaining() < 256 {
                            break; // truly exhausted, not a lost race
                        }
                    }
                    allocated
                })
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, (1 << 16) / 256);
        // SAFETY: all worker threads have joined; no pointers survive.
        unsafe { arena.reset() };
    }
}
