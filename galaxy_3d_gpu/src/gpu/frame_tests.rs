//! Unit tests for frame.rs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::gpu::driver::{NativeObject, RawBuffer, RawFence, RawImage, RawSemaphore};
use crate::gpu::frame::*;

fn native_of(item: &Deferred) -> Option<NativeObject> {
    match item {
        Deferred::Native(object) => Some(*object),
        Deferred::Callback(_) => None,
    }
}

// ============================================================================
// DeferredQueue
// ============================================================================

#[test]
fn test_take_completed_respects_frame_tags() {
    let queue = DeferredQueue::new();
    queue.push(3, Deferred::Native(NativeObject::Buffer(RawBuffer(1))));
    queue.push(4, Deferred::Native(NativeObject::Buffer(RawBuffer(2))));
    queue.push(5, Deferred::Native(NativeObject::Buffer(RawBuffer(3))));

    let ready = queue.take_completed(4);
    let objects: Vec<_> = ready.iter().filter_map(native_of).collect();
    assert_eq!(objects, vec![NativeObject::Buffer(RawBuffer(1)), NativeObject::Buffer(RawBuffer(2))]);
    assert_eq!(queue.len(), 1);

    assert!(queue.take_completed(4).is_empty());
    assert_eq!(queue.take_completed(5).len(), 1);
    assert!(queue.is_empty());
}

#[test]
fn test_release_order_within_a_frame_is_preserved() {
    let queue = DeferredQueue::new();
    for i in 0..32u64 {
        queue.push(7, Deferred::Native(NativeObject::Image(RawImage(i + 1))));
    }
    let order: Vec<u64> = queue
        .take_all()
        .iter()
        .filter_map(native_of)
        .map(|o| match o {
            NativeObject::Image(raw) => raw.0,
            _ => 0,
        })
        .collect();
    assert_eq!(order, (1..=32).collect::<Vec<_>>());
}

#[test]
fn test_older_frames_run_first() {
    let queue = DeferredQueue::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    for frame in [9u64, 2, 5] {
        let log = Arc::clone(&log);
        queue.push(frame, Deferred::Callback(Box::new(move || log.lock().unwrap().push(frame))));
    }
    for item in queue.take_all() {
        if let Deferred::Callback(callback) = item {
            callback();
        }
    }
    assert_eq!(*log.lock().unwrap(), vec![2, 5, 9]);
}

#[test]
fn test_cancel_uses_generational_keys() {
    let queue = DeferredQueue::new();
    let key = queue.push(1, Deferred::Native(NativeObject::Buffer(RawBuffer(10))));
    assert_eq!(queue.frame_of(key), Some(1));

    assert!(queue.cancel(key).is_some());
    // Slot reused by a new entry; the stale key must not reach it
    let fresh = queue.push(2, Deferred::Native(NativeObject::Buffer(RawBuffer(11))));
    assert!(queue.cancel(key).is_none());
    assert_eq!(queue.frame_of(fresh), Some(2));
}

#[test]
fn test_concurrent_push_from_destructors() {
    let queue = DeferredQueue::new();
    let ran = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..100 {
                    queue.push(1, Deferred::Callback(Box::new(|| {})));
                }
            });
        }
    });

    for item in queue.take_completed(1) {
        if let Deferred::Callback(callback) = item {
            callback();
            ran.fetch_add(1, Ordering::Relaxed);
        }
    }
    assert_eq!(ran.load(Ordering::Relaxed), 400);
}

// ============================================================================
// FrameSync
// ============================================================================

#[test]
fn test_first_slot_starts_at_frame_zero() {
    let sync = FrameSync::new(3);
    assert_eq!(sync.slots.len(), 3);
    assert_eq!(sync.slots[0].frame_number, Some(0));
    assert_eq!(sync.slots[1].frame_number, None);
}

#[test]
fn test_fences_are_recycled_not_recreated() {
    let mut sync = FrameSync::new(2);
    let mut created = 0u64;
    let mut create = || -> Result<RawFence, ()> {
        created += 1;
        Ok(RawFence(created))
    };

    let a = sync.acquire_fence(0, &mut create).unwrap();
    assert_eq!(sync.slots[0].fences, vec![a]);
    sync.recycle(0);
    assert!(sync.slots[0].fences.is_empty());

    let b = sync.acquire_fence(1, &mut create).unwrap();
    assert_eq!(a, b);
    assert_eq!(created, 1);
}

#[test]
fn test_semaphore_recycle_and_drain() {
    let mut sync = FrameSync::new(2);
    let mut next = 0u64;
    let mut create = || -> Result<RawSemaphore, ()> {
        next += 1;
        Ok(RawSemaphore(next))
    };
    sync.acquire_semaphore(0, &mut create).unwrap();
    sync.acquire_semaphore(1, &mut create).unwrap();
    sync.recycle(0);

    let (fences, semaphores) = sync.drain_all();
    assert!(fences.is_empty());
    assert_eq!(semaphores.len(), 2);
    assert!(sync.free_semaphores.is_empty());
}
