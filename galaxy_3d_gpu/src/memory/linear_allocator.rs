/// Lock-free bump allocators
///
/// `LinearAllocator` hands out memory from a fixed arena with a single
/// atomic cursor. `FrameAllocator` keeps one arena per in-flight frame and
/// wipes the arena of a slot when that slot is reused.
///
/// Plain `Copy` data needs no matching free. Values with destructors go
/// through [`LinearAllocator::new_object`], which returns an [`ArenaBox`];
/// debug builds count live boxes and `reset` asserts none are left.

use std::alloc::{self, Layout};
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Every allocation is padded to this, so the cursor always sits on it
pub const MIN_ALIGNMENT: usize = 16;

/// Largest alignment `allocate` accepts (also the arena base alignment)
pub const MAX_ALIGNMENT: usize = 256;

/// `None` when rounding up overflows
#[inline]
fn align_up(value: usize, alignment: usize) -> Option<usize> {
    Some(value.checked_add(alignment - 1)? & !(alignment - 1))
}

pub struct LinearAllocator {
    base: NonNull<u8>,
    capacity: usize,
    offset: AtomicUsize,
    /// Live `ArenaBox`es (debug builds only)
    #[cfg(debug_assertions)]
    outstanding: AtomicUsize,
}

// The arena is only reached through the atomic cursor, each caller gets a
// disjoint range.
unsafe impl Send for LinearAllocator {}
unsafe impl Sync for LinearAllocator {}

impl LinearAllocator {
    /// Reserve an arena of `capacity` bytes (rounded up to `MIN_ALIGNMENT`)
    pub fn new(capacity: usize) -> Self {
        let capacity = align_up(capacity.max(MIN_ALIGNMENT), MIN_ALIGNMENT).unwrap_or(usize::MAX);
        let layout = Self::layout(capacity);
        // SAFETY: layout has a non-zero size
        let raw = unsafe { alloc::alloc(layout) };
        let base = match NonNull::new(raw) {
            Some(base) => base,
            None => alloc::handle_alloc_error(layout),
        };
        Self {
            base,
            capacity,
            offset: AtomicUsize::new(0),
            #[cfg(debug_assertions)]
            outstanding: AtomicUsize::new(0),
        }
    }

    fn layout(capacity: usize) -> Layout {
        match Layout::from_size_align(capacity, MAX_ALIGNMENT) {
            Ok(layout) => layout,
            Err(_) => crate::engine_fatal!(
                "galaxy3d::memory",
                "LinearAllocator: invalid arena size {}",
                capacity
            ),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes consumed so far, padding included
    pub fn used(&self) -> usize {
        self.offset.load(Ordering::Relaxed).min(self.capacity)
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.used()
    }

    /// Live `ArenaBox` count (always 0 in release builds)
    pub fn outstanding(&self) -> usize {
        #[cfg(debug_assertions)]
        {
            self.outstanding.load(Ordering::Relaxed)
        }
        #[cfg(not(debug_assertions))]
        {
            0
        }
    }

    /// Allocate `size` bytes aligned to `alignment`
    ///
    /// `alignment` must be a power of two no larger than `MAX_ALIGNMENT`.
    /// Running out of arena is fatal.
    pub fn allocate(&self, size: usize, alignment: usize) -> NonNull<u8> {
        debug_assert!(alignment.is_power_of_two(), "alignment {} is not a power of two", alignment);
        debug_assert!(alignment <= MAX_ALIGNMENT, "alignment {} exceeds {}", alignment, MAX_ALIGNMENT);

        let padded = match align_up(size, MIN_ALIGNMENT) {
            Some(padded) if padded <= self.capacity => padded,
            _ => self.exhausted(size, alignment),
        };

        let start = if alignment <= MIN_ALIGNMENT {
            let start = self.offset.fetch_add(padded, Ordering::Relaxed);
            if start.checked_add(padded).map_or(true, |end| end > self.capacity) {
                self.exhausted(size, alignment);
            }
            start
        } else {
            let mut current = self.offset.load(Ordering::Relaxed);
            loop {
                let end = align_up(current, alignment).and_then(|start| Some((start, start.checked_add(padded)?)));
                let Some((start, end)) = end.filter(|&(_, end)| end <= self.capacity) else {
                    self.exhausted(size, alignment);
                };
                match self.offset.compare_exchange_weak(current, end, Ordering::Relaxed, Ordering::Relaxed) {
                    Ok(_) => break start,
                    Err(actual) => current = actual,
                }
            }
        };

        // SAFETY: start + padded <= capacity, so the pointer stays inside the arena
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(start)) }
    }

    fn exhausted(&self, size: usize, alignment: usize) -> ! {
        crate::engine_fatal!(
            "galaxy3d::memory",
            "LinearAllocator exhausted: {} bytes (align {}) requested, arena is {} bytes",
            size,
            alignment,
            self.capacity
        )
    }

    /// Copy a trivially destructible value into the arena
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_copy<T: Copy>(&self, value: T) -> &mut T {
        let ptr = self.allocate(mem::size_of::<T>(), mem::align_of::<T>()).cast::<T>();
        // SAFETY: fresh, aligned, exclusively owned memory
        unsafe {
            ptr.as_ptr().write(value);
            &mut *ptr.as_ptr()
        }
    }

    /// Copy a slice of trivially destructible values into the arena
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice_copy<T: Copy>(&self, values: &[T]) -> &mut [T] {
        let ptr = self
            .allocate(mem::size_of_val(values), mem::align_of::<T>())
            .cast::<T>();
        // SAFETY: fresh, aligned memory large enough for values.len() elements
        unsafe {
            ptr::copy_nonoverlapping(values.as_ptr(), ptr.as_ptr(), values.len());
            std::slice::from_raw_parts_mut(ptr.as_ptr(), values.len())
        }
    }

    /// Collect an exact-size iterator of trivially destructible values
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice_from_iter<T: Copy, I>(&self, iter: I) -> &mut [T]
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let iter = iter.into_iter();
        let len = iter.len();
        let ptr = self
            .allocate(len * mem::size_of::<T>(), mem::align_of::<T>())
            .cast::<T>();
        let mut written = 0;
        for value in iter.take(len) {
            // SAFETY: written < len, inside the allocation
            unsafe { ptr.as_ptr().add(written).write(value) };
            written += 1;
        }
        // SAFETY: the first `written` elements are initialized
        unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), written) }
    }

    /// Move a value with a destructor into the arena
    ///
    /// The box must be dropped (or passed to `delete`) before `reset`.
    pub fn new_object<T>(&self, value: T) -> ArenaBox<'_, T> {
        debug_assert!(mem::align_of::<T>() <= MAX_ALIGNMENT);
        let ptr = self.allocate(mem::size_of::<T>(), mem::align_of::<T>()).cast::<T>();
        // SAFETY: fresh, aligned memory
        unsafe { ptr.as_ptr().write(value) };
        #[cfg(debug_assertions)]
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        ArenaBox {
            ptr,
            allocator: self,
            _marker: PhantomData,
        }
    }

    /// Destroy a value created by `new_object`
    pub fn delete<T>(&self, object: ArenaBox<'_, T>) {
        debug_assert!(ptr::eq(object.allocator, self), "ArenaBox deleted through a foreign allocator");
        drop(object);
    }

    /// Rewind the cursor to the arena start
    ///
    /// Every `new_object` must have been matched by a drop/`delete`.
    pub fn reset(&mut self) {
        #[cfg(debug_assertions)]
        {
            let outstanding = *self.outstanding.get_mut();
            debug_assert!(
                outstanding == 0,
                "LinearAllocator reset with {} live arena objects",
                outstanding
            );
        }
        *self.offset.get_mut() = 0;
    }
}

impl Drop for LinearAllocator {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with the same layout
        unsafe { alloc::dealloc(self.base.as_ptr(), Self::layout(self.capacity)) };
    }
}

/// Owning pointer to a value living in a `LinearAllocator`
pub struct ArenaBox<'a, T> {
    ptr: NonNull<T>,
    allocator: &'a LinearAllocator,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for ArenaBox<'_, T> {}
unsafe impl<T: Sync> Sync for ArenaBox<'_, T> {}

impl<T> Deref for ArenaBox<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: initialized in new_object, alive until drop
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for ArenaBox<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the box is the unique owner
        unsafe { self.ptr.as_mut() }
    }
}

impl<T> Drop for ArenaBox<'_, T> {
    fn drop(&mut self) {
        // SAFETY: the value is initialized and dropped exactly once
        unsafe { ptr::drop_in_place(self.ptr.as_ptr()) };
        #[cfg(debug_assertions)]
        self.allocator.outstanding.fetch_sub(1, Ordering::Relaxed);
    }
}

/// One `LinearAllocator` per in-flight frame
///
/// Data allocated during frame `i` stays valid until slot `i mod N` comes
/// around again, after the device has waited for that slot's fences.
pub struct FrameAllocator {
    arenas: Vec<LinearAllocator>,
    current: usize,
}

impl FrameAllocator {
    pub fn new(frames_in_flight: usize, size_per_frame: usize) -> Self {
        debug_assert!(frames_in_flight > 0);
        Self {
            arenas: (0..frames_in_flight).map(|_| LinearAllocator::new(size_per_frame)).collect(),
            current: 0,
        }
    }

    pub fn frame_index(&self) -> usize {
        self.current
    }

    pub fn frames_in_flight(&self) -> usize {
        self.arenas.len()
    }

    /// Switch to `frame_index` and wipe its arena
    pub fn begin_frame(&mut self, frame_index: usize) {
        debug_assert!(frame_index < self.arenas.len());
        self.current = frame_index;
        self.arenas[frame_index].reset();
    }
}

impl Deref for FrameAllocator {
    type Target = LinearAllocator;

    fn deref(&self) -> &LinearAllocator {
        &self.arenas[self.current]
    }
}

#[cfg(test)]
#[path = "linear_allocator_tests.rs"]
mod tests;
