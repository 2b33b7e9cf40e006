/// Transient GPU memory: per-frame ring pools and one-shot staging buffers
///
/// `TransientPool` owns one persistently mapped upload buffer split into
/// one section per in-flight frame. Allocation is a relaxed fetch-add on
/// the current section's cursor; running past the section end is a fatal
/// sizing error. `begin_frame` moves to the next section, which the device
/// only does after that section's previous GPU use has completed.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::engine_fatal;
use crate::error::{Error, Result};
use crate::gpu::device::DeviceShared;
use crate::gpu::driver::{MappedPtr, NativeBufferDesc, NativeObject, RawBuffer};
use crate::gpu::types::{BufferUsage, CpuAccess};

#[inline]
fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Per-frame sectioned upload buffer (constant pool, geometry pool)
pub struct TransientPool {
    shared: Arc<DeviceShared>,
    name: &'static str,
    buffer: RawBuffer,
    mapped: MappedPtr,
    section_size: u64,
    sections: usize,
    alignment: u64,
    current: usize,
    cursor: AtomicU64,
}

impl TransientPool {
    pub(crate) fn new(
        shared: Arc<DeviceShared>,
        name: &'static str,
        usage: BufferUsage,
        section_size: u64,
        sections: usize,
        alignment: u64,
    ) -> Result<Self> {
        debug_assert!(alignment.is_power_of_two());
        let section_size = align_up(section_size.max(alignment), alignment);
        let total = section_size.saturating_mul(sections as u64);
        // Constant arguments are bound with 32-bit dynamic offsets
        if usage.contains(BufferUsage::CONSTANT) && total > u32::MAX as u64 {
            return Err(Error::InitializationFailed(format!(
                "{} of {} bytes exceeds 32-bit dynamic offsets",
                name, total
            )));
        }
        let native = shared.driver().create_buffer(&NativeBufferDesc {
            size: total,
            usage,
            cpu_access: CpuAccess::Upload,
        })?;
        let Some(mapped) = native.mapped else {
            shared.driver().destroy_buffer(native.raw);
            return Err(Error::InitializationFailed(format!("{} buffer is not host visible", name)));
        };
        Ok(Self {
            shared,
            name,
            buffer: native.raw,
            mapped,
            section_size,
            sections,
            alignment,
            current: 0,
            cursor: AtomicU64::new(0),
        })
    }

    /// Bump-allocate `size` bytes from the current frame's section
    pub fn allocate(&self, size: u64) -> TransientAllocation<'_> {
        let size = align_up(size.max(1), self.alignment);
        let offset = self.cursor.fetch_add(size, Ordering::Relaxed);
        if offset + size > self.section_size {
            engine_fatal!(
                "galaxy3d::gpu::TransientPool",
                "{} exhausted: {} + {} bytes exceeds the {} byte frame section",
                self.name,
                offset,
                size,
                self.section_size
            );
        }
        let absolute = self.current as u64 * self.section_size + offset;
        TransientAllocation {
            buffer: self.buffer,
            offset: absolute,
            size,
            // SAFETY: absolute + size lies inside the mapped buffer
            ptr: unsafe { self.mapped.add(absolute as usize) },
            _frame: PhantomData,
        }
    }

    /// Allocate and fill with `data`
    pub fn push_bytes(&self, data: &[u8]) -> TransientAllocation<'_> {
        let allocation = self.allocate(data.len() as u64);
        allocation.write(data);
        allocation
    }

    pub fn push_slice<T: bytemuck::Pod>(&self, values: &[T]) -> TransientAllocation<'_> {
        self.push_bytes(bytemuck::cast_slice(values))
    }

    /// Switch to the section of `frame_index` and rewind it
    pub(crate) fn begin_frame(&mut self, frame_index: usize) {
        debug_assert!(frame_index < self.sections);
        self.current = frame_index;
        *self.cursor.get_mut() = 0;
    }

    pub fn buffer(&self) -> RawBuffer {
        self.buffer
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    pub fn section_size(&self) -> u64 {
        self.section_size
    }

    /// Bytes used in the current section
    pub fn used(&self) -> u64 {
        self.cursor.load(Ordering::Relaxed).min(self.section_size)
    }

    pub fn current_section(&self) -> usize {
        self.current
    }
}

impl Drop for TransientPool {
    fn drop(&mut self) {
        self.shared.release(NativeObject::Buffer(self.buffer));
    }
}

/// Slice of a transient pool, valid until the pool's next `begin_frame`
#[derive(Debug, Clone, Copy)]
pub struct TransientAllocation<'a> {
    buffer: RawBuffer,
    offset: u64,
    size: u64,
    ptr: MappedPtr,
    _frame: PhantomData<&'a TransientPool>,
}

impl TransientAllocation<'_> {
    pub fn buffer(&self) -> RawBuffer {
        self.buffer
    }

    /// Offset from the start of the pool buffer
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size after rounding to the pool alignment
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn write(&self, data: &[u8]) {
        debug_assert!(data.len() as u64 <= self.size, "transient write larger than the allocation");
        // SAFETY: the range is owned by this allocation for the current frame
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.as_ptr(), data.len());
        }
    }

    pub fn write_pod<T: bytemuck::Pod>(&self, value: &T) {
        self.write(bytemuck::bytes_of(value));
    }
}

// ============================================================================
// Staging
// ============================================================================

/// One-shot mapped buffers for uploads and readbacks
pub struct StagingPool {
    shared: Arc<DeviceShared>,
    live: Arc<AtomicUsize>,
    live_bytes: Arc<AtomicU64>,
}

impl StagingPool {
    pub(crate) fn new(shared: Arc<DeviceShared>) -> Self {
        Self {
            shared,
            live: Arc::new(AtomicUsize::new(0)),
            live_bytes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a fresh mapped buffer of `size` bytes
    pub fn allocate(&self, access: CpuAccess, size: u64) -> Result<StagingAllocation> {
        let usage = match access {
            CpuAccess::Upload => BufferUsage::TRANSFER_SRC,
            CpuAccess::Readback => BufferUsage::TRANSFER_DST,
            CpuAccess::None => {
                return Err(Error::InvalidResource("staging memory must be CPU visible".to_string()));
            }
        };
        if size == 0 {
            return Err(Error::InvalidResource("staging allocation of zero bytes".to_string()));
        }
        let native = self.shared.driver().create_buffer(&NativeBufferDesc { size, usage, cpu_access: access })?;
        let Some(mapped) = native.mapped else {
            self.shared.driver().destroy_buffer(native.raw);
            return Err(Error::BackendError("staging buffer came back unmapped".to_string()));
        };
        self.live.fetch_add(1, Ordering::Relaxed);
        self.live_bytes.fetch_add(size, Ordering::Relaxed);
        Ok(StagingAllocation {
            shared: Arc::clone(&self.shared),
            live: Arc::clone(&self.live),
            live_bytes: Arc::clone(&self.live_bytes),
            buffer: native.raw,
            size,
            access,
            mapped,
        })
    }

    /// Release an allocation; the buffer is destroyed once the frame completes
    pub fn free(&self, allocation: StagingAllocation) {
        drop(allocation);
    }

    /// Allocations not yet freed
    pub fn live_allocations(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    pub fn live_bytes(&self) -> u64 {
        self.live_bytes.load(Ordering::Relaxed)
    }
}

/// Mapped staging buffer; dropping it defers the native free
pub struct StagingAllocation {
    shared: Arc<DeviceShared>,
    live: Arc<AtomicUsize>,
    live_bytes: Arc<AtomicU64>,
    buffer: RawBuffer,
    size: u64,
    access: CpuAccess,
    mapped: MappedPtr,
}

impl StagingAllocation {
    pub fn buffer(&self) -> RawBuffer {
        self.buffer
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn access(&self) -> CpuAccess {
        self.access
    }

    pub fn write(&self, offset: u64, data: &[u8]) {
        debug_assert_eq!(self.access, CpuAccess::Upload);
        debug_assert!(offset + data.len() as u64 <= self.size, "staging write out of bounds");
        // SAFETY: bounds checked above
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.mapped.as_ptr().add(offset as usize), data.len());
        }
    }

    pub fn read(&self, offset: u64, out: &mut [u8]) {
        debug_assert!(offset + out.len() as u64 <= self.size, "staging read out of bounds");
        // SAFETY: bounds checked above
        unsafe {
            std::ptr::copy_nonoverlapping(self.mapped.as_ptr().add(offset as usize), out.as_mut_ptr(), out.len());
        }
    }
}

impl Drop for StagingAllocation {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
        self.live_bytes.fetch_sub(self.size, Ordering::Relaxed);
        self.shared.release(NativeObject::Buffer(self.buffer));
    }
}
