//! Integration tests for the small-block allocator

use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;
use vortex_memory::alloc::CHUNK_SIZE;
use vortex_memory::prelude::*;

#[test]
fn allocations_are_disjoint_within_and_across_classes() {
    let sba = SmallBlockAllocator::new(4 * CHUNK_SIZE, &[16, 64, 256]).unwrap();
    let mut addresses = HashSet::new();
    let mut held = Vec::new();

    for &size in &[16usize, 64, 256] {
        for _ in 0..50 {
            let ptr = sba.allocate(size).unwrap();
            let addr = ptr.as_ptr() as usize;
            for offset in 0..size {
                assert!(addresses.insert(addr + offset), "overlap at {size}-byte class");
            }
            held.push(ptr);
        }
    }
    for ptr in held {
        sba.deallocate(ptr).unwrap();
    }
    assert_eq!(sba.used_memory(), 0);
}

#[test]
fn workload_shift_reuses_chunks() {
    // Two chunks total. Phase 1 fills both with 16-byte blocks, phase 2
    // needs them for 512-byte blocks; without recycling it would starve.
    let sba = SmallBlockAllocator::new(2 * CHUNK_SIZE, &[16, 512]).unwrap();

    let mut phase1 = Vec::new();
    while let Some(ptr) = sba.allocate(16) {
        phase1.push(ptr);
    }
    assert_eq!(sba.free_chunks(), 0);
    assert!(sba.allocate(512).is_none());

    for ptr in phase1 {
        sba.deallocate(ptr).unwrap();
    }
    assert_eq!(sba.free_chunks(), 2);

    let mut phase2 = Vec::new();
    while let Some(ptr) = sba.allocate(512) {
        phase2.push(ptr);
    }
    assert_eq!(phase2.len(), 2 * CHUNK_SIZE / 512);
}

#[test]
fn mixed_churn_with_shadow_tracking() {
    let sba = SmallBlockAllocator::new(8 * CHUNK_SIZE, &[32, 128]).unwrap();
    let mut rng = rand::thread_rng();
    let mut live: Vec<(std::ptr::NonNull<u8>, usize)> = Vec::new();

    for _ in 0..20_000 {
        if live.is_empty() || rng.gen_bool(0.55) {
            let size = if rng.gen_bool(0.5) { 32 } else { 128 };
            if let Some(ptr) = sba.allocate(size) {
                // SAFETY: fresh block, size bytes in-bounds.
                unsafe {
                    ptr.as_ptr().write_bytes((size % 251) as u8, size);
                }
                live.push((ptr, size));
            }
        } else {
            let victim = rng.gen_range(0..live.len());
            let (ptr, size) = live.swap_remove(victim);
            // SAFETY: block is live and carries its fill byte.
            let byte = unsafe { ptr.as_ptr().read() };
            assert_eq!(byte, (size % 251) as u8);
            sba.deallocate(ptr).unwrap();
        }
    }

    live.shuffle(&mut rng);
    for (ptr, _) in live {
        sba.deallocate(ptr).unwrap();
    }
    assert_eq!(sba.used_memory(), 0);
    assert_eq!(sba.free_chunks() as usize, sba.total_chunks());
}

#[test]
fn unregistered_sizes_never_round_up() {
    let sba = SmallBlockAllocator::new(CHUNK_SIZE, &[16, 64]).unwrap();
    for size in [1usize, 15, 17, 32, 63, 65, 4096] {
        assert!(sba.allocate(size).is_none(), "size {size} should be refused");
    }
    // Registered sizes still work afterwards.
    assert!(sba.allocate(16).is_some());
    assert!(sba.allocate(64).is_some());
}
