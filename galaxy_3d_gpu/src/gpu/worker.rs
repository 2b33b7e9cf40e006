/// Worker slots and completion counters for parallel command recording
///
/// Every thread that records command lists does so under a registered
/// `WorkerSlot`. The slot index selects that worker's command pools, so two
/// threads never allocate from the same native pool. Slot 0 belongs to the
/// thread that created the device.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::gpu::sync;

/// Handle to a registered recording slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerSlot(u32);

impl WorkerSlot {
    /// The device's own thread
    pub const MAIN: WorkerSlot = WorkerSlot(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

struct SlotState {
    free_list: Vec<u32>,
    next_id: u32,
}

/// Allocates and recycles worker slot indices in `1..capacity`
pub(crate) struct WorkerRegistry {
    state: Mutex<SlotState>,
    capacity: u32,
}

impl WorkerRegistry {
    /// `capacity` counts the main slot
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(SlotState { free_list: Vec::new(), next_id: 1 }),
            capacity: capacity as u32,
        }
    }

    pub fn register(&self) -> Result<WorkerSlot> {
        let mut state = sync::lock(&self.state);
        if let Some(id) = state.free_list.pop() {
            return Ok(WorkerSlot(id));
        }
        if state.next_id >= self.capacity {
            return Err(Error::InvalidResource(format!(
                "all {} worker slots are registered",
                self.capacity
            )));
        }
        let id = state.next_id;
        state.next_id += 1;
        Ok(WorkerSlot(id))
    }

    pub fn unregister(&self, slot: WorkerSlot) {
        debug_assert!(slot != WorkerSlot::MAIN, "the main worker slot cannot be unregistered");
        let mut state = sync::lock(&self.state);
        debug_assert!(slot.0 < state.next_id, "unregistering an unknown worker slot: {}", slot.0);
        debug_assert!(!state.free_list.contains(&slot.0), "worker slot {} unregistered twice", slot.0);
        state.free_list.push(slot.0);
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Registered slots, the main slot included
    pub fn len(&self) -> usize {
        let state = sync::lock(&self.state);
        (state.next_id as usize) - state.free_list.len()
    }
}

/// Completion counter workers bump when their recording is done
///
/// The main thread spins on it before merging children.
#[derive(Debug, Default)]
pub struct WorkCounter(AtomicU32);

impl WorkCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark one unit of work as finished
    pub fn signal(&self) {
        self.0.fetch_add(1, Ordering::Release);
    }

    pub fn value(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// Busy-wait until `count` units have been signalled
    pub fn wait_for(&self, count: u32) {
        let mut spins = 0u32;
        while self.0.load(Ordering::Acquire) < count {
            if spins < 64 {
                std::hint::spin_loop();
                spins += 1;
            } else {
                std::thread::yield_now();
            }
        }
    }

    pub fn reset(&mut self) {
        *self.0.get_mut() = 0;
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
