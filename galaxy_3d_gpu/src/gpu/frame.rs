/// Per-frame bookkeeping: frame slots and the deferred destruction queue
///
/// Work released during frame `f` is tagged with `f`. When the frame slot
/// that recorded frame `f` comes round again, `end_frame` has already
/// waited on that slot's fences, so every entry tagged `<= f` is safe to
/// destroy.

use std::sync::Mutex;

use slotmap::{new_key_type, SlotMap};

use crate::gpu::driver::{Driver, NativeObject, RawFence, RawSemaphore};
use crate::gpu::sync;

new_key_type! {
    /// Generational handle to a pending deferred entry
    pub struct DeferredKey;
}

/// Something to run once the GPU is done with a frame
pub enum Deferred {
    /// Native object to destroy
    Native(NativeObject),
    /// Caller-supplied frame-complete callback
    Callback(Box<dyn FnOnce() + Send>),
}

impl Deferred {
    pub(crate) fn run(self, driver: &dyn Driver) {
        match self {
            Deferred::Native(object) => object.destroy(driver),
            Deferred::Callback(callback) => callback(),
        }
    }
}

impl std::fmt::Debug for Deferred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Deferred::Native(object) => f.debug_tuple("Native").field(object).finish(),
            Deferred::Callback(_) => f.write_str("Callback"),
        }
    }
}

struct DeferredEntry {
    frame: u64,
    seq: u64,
    item: Deferred,
}

#[derive(Default)]
struct DeferredState {
    entries: SlotMap<DeferredKey, DeferredEntry>,
    next_seq: u64,
}

/// Arena of work waiting for a frame to complete on the GPU
#[derive(Default)]
pub(crate) struct DeferredQueue {
    state: Mutex<DeferredState>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `item` behind the GPU work of `frame`
    pub fn push(&self, frame: u64, item: Deferred) -> DeferredKey {
        let mut state = sync::lock(&self.state);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(DeferredEntry { frame, seq, item })
    }

    /// Take back an entry that has not run yet
    pub fn cancel(&self, key: DeferredKey) -> Option<Deferred> {
        sync::lock(&self.state).entries.remove(key).map(|entry| entry.item)
    }

    /// Remove every entry tagged with a frame `<= completed`, in release order
    pub fn take_completed(&self, completed: u64) -> Vec<Deferred> {
        let mut state = sync::lock(&self.state);
        let keys: Vec<DeferredKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.frame <= completed)
            .map(|(key, _)| key)
            .collect();
        let mut ready: Vec<DeferredEntry> = keys.into_iter().filter_map(|key| state.entries.remove(key)).collect();
        drop(state);

        ready.sort_by_key(|entry| (entry.frame, entry.seq));
        ready.into_iter().map(|entry| entry.item).collect()
    }

    /// Remove everything, in release order (device teardown after wait_idle)
    pub fn take_all(&self) -> Vec<Deferred> {
        self.take_completed(u64::MAX)
    }

    pub fn len(&self) -> usize {
        sync::lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frame tag of a pending entry
    pub fn frame_of(&self, key: DeferredKey) -> Option<u64> {
        sync::lock(&self.state).entries.get(key).map(|entry| entry.frame)
    }
}

/// Fences and semaphores used while a frame slot was current
#[derive(Debug, Default)]
pub(crate) struct FrameSlot {
    /// Frame number last recorded in this slot (None before first use)
    pub frame_number: Option<u64>,
    pub fences: Vec<RawFence>,
    pub semaphores: Vec<RawSemaphore>,
}

/// Frame slots plus the recycled sync objects they draw from
#[derive(Debug)]
pub(crate) struct FrameSync {
    pub slots: Vec<FrameSlot>,
    pub free_fences: Vec<RawFence>,
    pub free_semaphores: Vec<RawSemaphore>,
}

impl FrameSync {
    pub fn new(frames_in_flight: usize) -> Self {
        let mut slots: Vec<FrameSlot> = (0..frames_in_flight).map(|_| FrameSlot::default()).collect();
        if let Some(first) = slots.first_mut() {
            first.frame_number = Some(0);
        }
        Self {
            slots,
            free_fences: Vec::new(),
            free_semaphores: Vec::new(),
        }
    }

    /// Reuse a free fence or ask `create` for a new one, and record it in `slot`
    pub fn acquire_fence<E>(&mut self, slot: usize, create: impl FnOnce() -> Result<RawFence, E>) -> Result<RawFence, E> {
        let fence = match self.free_fences.pop() {
            Some(fence) => fence,
            None => create()?,
        };
        self.slots[slot].fences.push(fence);
        Ok(fence)
    }

    pub fn acquire_semaphore<E>(
        &mut self,
        slot: usize,
        create: impl FnOnce() -> Result<RawSemaphore, E>,
    ) -> Result<RawSemaphore, E> {
        let semaphore = match self.free_semaphores.pop() {
            Some(semaphore) => semaphore,
            None => create()?,
        };
        self.slots[slot].semaphores.push(semaphore);
        Ok(semaphore)
    }

    /// Return a slot's fences and semaphores to the free lists
    ///
    /// Only valid once the fences have been waited on and reset.
    pub fn recycle(&mut self, slot: usize) {
        let slot = &mut self.slots[slot];
        self.free_fences.append(&mut slot.fences);
        self.free_semaphores.append(&mut slot.semaphores);
    }

    /// Every fence and semaphore known to the frame system
    pub fn drain_all(&mut self) -> (Vec<RawFence>, Vec<RawSemaphore>) {
        let mut fences = std::mem::take(&mut self.free_fences);
        let mut semaphores = std::mem::take(&mut self.free_semaphores);
        for slot in &mut self.slots {
            fences.append(&mut slot.fences);
            semaphores.append(&mut slot.semaphores);
        }
        (fences, semaphores)
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
