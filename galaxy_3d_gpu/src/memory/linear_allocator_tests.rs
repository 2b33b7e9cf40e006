//! Unit tests for linear_allocator.rs

use crate::memory::{FrameAllocator, LinearAllocator, MAX_ALIGNMENT, MIN_ALIGNMENT};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// ALIGNMENT
// ============================================================================

#[test]
fn test_allocate_respects_every_alignment() {
    let arena = LinearAllocator::new(64 * 1024);
    let sizes = [0usize, 1, 3, 7, 16, 33, 100, 255];
    let mut alignment = 1;
    while alignment <= MAX_ALIGNMENT {
        for &size in &sizes {
            let ptr = arena.allocate(size, alignment);
            assert_eq!(ptr.as_ptr() as usize % alignment, 0, "size {} align {}", size, alignment);
            assert_eq!(arena.used() % MIN_ALIGNMENT, 0, "cursor off after size {} align {}", size, alignment);
        }
        alignment *= 2;
    }
}

#[test]
fn test_allocations_do_not_overlap() {
    let arena = LinearAllocator::new(4096);
    let a = arena.allocate(10, 4).as_ptr() as usize;
    let b = arena.allocate(10, 64).as_ptr() as usize;
    let c = arena.allocate(1, 1).as_ptr() as usize;
    assert!(b >= a + 10);
    assert!(c >= b + 10);
}

#[test]
fn test_capacity_rounded_to_min_alignment() {
    let arena = LinearAllocator::new(17);
    assert_eq!(arena.capacity() % MIN_ALIGNMENT, 0);
    assert!(arena.capacity() >= 17);
}

#[test]
#[should_panic(expected = "exhausted")]
fn test_exhaustion_is_fatal() {
    let arena = LinearAllocator::new(64);
    arena.allocate(48, 8);
    arena.allocate(48, 8);
}

#[test]
#[should_panic(expected = "exhausted")]
fn test_exhaustion_is_fatal_with_large_alignment() {
    let arena = LinearAllocator::new(256);
    arena.allocate(8, 8);
    arena.allocate(250, 128);
}

#[test]
#[should_panic(expected = "exhausted")]
fn test_near_max_size_is_exhaustion_not_overflow() {
    let arena = LinearAllocator::new(64);
    arena.allocate(usize::MAX - 2, 8);
}

#[test]
#[should_panic(expected = "exhausted")]
fn test_near_max_size_with_large_alignment_is_exhaustion() {
    let arena = LinearAllocator::new(256);
    arena.allocate(8, 8);
    arena.allocate(usize::MAX - 2, 128);
}

// ============================================================================
// TYPED HELPERS
// ============================================================================

#[test]
fn test_alloc_copy_and_slices() {
    let arena = LinearAllocator::new(1024);
    let value = arena.alloc_copy(0x1234_5678u32);
    *value += 1;
    assert_eq!(*value, 0x1234_5679);

    let slice = arena.alloc_slice_copy(&[1u64, 2, 3]);
    assert_eq!(slice, &[1, 2, 3]);

    let squares = arena.alloc_slice_from_iter((0..5u32).map(|i| i * i));
    assert_eq!(squares, &[0, 1, 4, 9, 16]);

    let empty: &mut [u32] = arena.alloc_slice_copy(&[]);
    assert!(empty.is_empty());
}

// ============================================================================
// NEW / DELETE / RESET
// ============================================================================

struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_matched_new_delete_then_reset_succeeds() {
    let drops = Arc::new(AtomicUsize::new(0));
    let mut arena = LinearAllocator::new(1024);
    {
        let a = arena.new_object(DropCounter(drops.clone()));
        let b = arena.new_object(DropCounter(drops.clone()));
        assert_eq!(arena.outstanding(), if cfg!(debug_assertions) { 2 } else { 0 });
        arena.delete(a);
        drop(b);
    }
    assert_eq!(drops.load(Ordering::SeqCst), 2);
    assert_eq!(arena.outstanding(), 0);
    arena.reset();
    assert_eq!(arena.used(), 0);
}

#[test]
fn test_arena_box_deref_mut() {
    let arena = LinearAllocator::new(1024);
    let mut names = arena.new_object(vec!["a".to_string()]);
    names.push("b".to_string());
    assert_eq!(names.len(), 2);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "live arena objects")]
fn test_reset_with_outstanding_object_asserts() {
    let mut arena = LinearAllocator::new(1024);
    let leaked = arena.new_object(String::from("never deleted"));
    std::mem::forget(leaked);
    arena.reset();
}

#[test]
fn test_reset_rewinds_cursor() {
    let mut arena = LinearAllocator::new(1024);
    arena.allocate(100, 16);
    assert!(arena.used() >= 100);
    arena.reset();
    assert_eq!(arena.used(), 0);
    assert_eq!(arena.remaining(), arena.capacity());
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[test]
fn test_concurrent_allocations_are_disjoint() {
    let arena = LinearAllocator::new(1024 * 1024);
    let mut addresses: Vec<usize> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let arena = &arena;
                scope.spawn(move || {
                    (0..256)
                        .map(|i| {
                            let alignment = if (i + t) % 3 == 0 { 64 } else { 8 };
                            arena.allocate(24, alignment).as_ptr() as usize
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });
    addresses.sort_unstable();
    for pair in addresses.windows(2) {
        assert!(pair[1] - pair[0] >= 24, "overlapping allocations");
    }
}

// ============================================================================
// FRAME ALLOCATOR
// ============================================================================

#[test]
fn test_frame_allocator_keeps_other_slots_alive() {
    let mut frames = FrameAllocator::new(2, 1024);
    assert_eq!(frames.frames_in_flight(), 2);

    frames.begin_frame(0);
    frames.allocate(64, 16);
    let used_slot0 = frames.used();

    frames.begin_frame(1);
    assert_eq!(frames.frame_index(), 1);
    assert_eq!(frames.used(), 0);
    frames.allocate(16, 16);

    // coming back to slot 0 wipes it
    frames.begin_frame(0);
    assert!(used_slot0 >= 64);
    assert_eq!(frames.used(), 0);
}
