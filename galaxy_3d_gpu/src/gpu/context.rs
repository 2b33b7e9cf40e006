/// Transfer, compute and graphics contexts
///
/// A context owns one queue's primary command buffer for the current frame
/// and one command pool per (worker slot, frame slot). The primary buffer is
/// begun lazily by the first command and submitted by `submit`, by a
/// cross-context `wait_for`, by `end_present`, or by `Device::end_frame`.
///
/// The handles returned by the device borrow it and layer by capability:
/// `GraphicsContext` derefs to `ComputeContext`, which derefs to
/// `TransferContext`.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::gpu::barrier::{build_barrier_batch, BarrierTarget, ResourceBarrier};
use crate::gpu::command_list::{ComputeCommandList, GraphicsCommandList, RenderPassInfo};
use crate::gpu::device::{Device, DeviceShared};
use crate::gpu::driver::{
    BlitFilter, BufferCopy, BufferTextureCopy, CommandBufferLevel, Driver, ImageAspects, NativeRenderPassBegin,
    NativeSubmit, PipelineStages, RawCommandBuffer, RawCommandPool, RawSemaphore, SwapchainStatus, TextureBlit,
};
use crate::gpu::render_pass::{native_render_pass_desc, FramebufferKey, RenderPassDesc, RenderPassKey};
use crate::gpu::resource::{Buffer, QueryPool, Texture};
use crate::gpu::swapchain::Swapchain;
use crate::gpu::sync;
use crate::gpu::types::{ClearValue, CpuAccess, QueueType, ResourceState, SubresourceRange};
use crate::gpu::worker::WorkerSlot;
use crate::{engine_fatal, engine_warn};

const SOURCE: &str = "galaxy3d::gpu::Context";

// ============================================================================
// Context internals
// ============================================================================

/// Command pool of one worker for one frame slot, with its recycled buffers
#[derive(Default)]
struct CommandPoolSlot {
    pool: RawCommandPool,
    primaries: Vec<RawCommandBuffer>,
    next_primary: usize,
    secondaries: Vec<RawCommandBuffer>,
    next_secondary: usize,
}

impl CommandPoolSlot {
    fn take(&mut self, driver: &dyn Driver, queue: QueueType, level: CommandBufferLevel) -> Result<RawCommandBuffer> {
        if self.pool.is_null() {
            self.pool = driver.create_command_pool(queue)?;
        }
        let (buffers, next) = match level {
            CommandBufferLevel::Primary => (&mut self.primaries, &mut self.next_primary),
            CommandBufferLevel::Secondary => (&mut self.secondaries, &mut self.next_secondary),
        };
        if *next == buffers.len() {
            buffers.push(driver.allocate_command_buffer(self.pool, level)?);
        }
        let cmd = buffers[*next];
        *next += 1;
        Ok(cmd)
    }
}

#[derive(Default)]
struct ContextState {
    primary: Option<RawCommandBuffer>,
    waits: Vec<(RawSemaphore, PipelineStages)>,
    /// Swapchain image acquired by `begin_present` and not yet presented
    presenting: Option<u32>,
}

pub(crate) struct ContextCore {
    queue: QueueType,
    name: &'static str,
    workers: usize,
    frames_in_flight: usize,
    pools: Vec<Mutex<CommandPoolSlot>>,
    state: Mutex<ContextState>,
    open_passes: AtomicUsize,
}

impl ContextCore {
    pub fn new(queue: QueueType, name: &'static str, workers: usize, frames_in_flight: usize) -> Self {
        Self {
            queue,
            name,
            workers,
            frames_in_flight,
            pools: (0..workers * frames_in_flight).map(|_| Mutex::default()).collect(),
            state: Mutex::default(),
            open_passes: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn queue(&self) -> QueueType {
        self.queue
    }

    pub fn open_passes(&self) -> usize {
        self.open_passes.load(Ordering::Acquire)
    }

    pub fn pass_opened(&self) {
        self.open_passes.fetch_add(1, Ordering::AcqRel);
    }

    pub fn pass_closed(&self) {
        self.open_passes.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn is_presenting(&self) -> bool {
        sync::lock(&self.state).presenting.is_some()
    }

    /// Command buffer from `worker`'s pool for the current frame
    pub fn command_buffer(&self, shared: &DeviceShared, worker: WorkerSlot, level: CommandBufferLevel) -> RawCommandBuffer {
        debug_assert!(worker.index() < self.workers, "worker slot {} out of range", worker.index());
        let index = worker.index() * self.frames_in_flight + shared.frame_index();
        let result = sync::lock(&self.pools[index]).take(shared.driver(), self.queue, level);
        match result {
            Ok(cmd) => cmd,
            Err(err) => engine_fatal!(SOURCE, "{}: command buffer allocation failed: {}", self.name, err),
        }
    }

    /// The frame's primary command buffer, begun on first use
    pub fn primary(&self, shared: &DeviceShared) -> RawCommandBuffer {
        let mut state = sync::lock(&self.state);
        if let Some(cmd) = state.primary {
            return cmd;
        }
        let cmd = self.command_buffer(shared, WorkerSlot::MAIN, CommandBufferLevel::Primary);
        if let Err(err) = shared.driver().begin_command_buffer(cmd, None) {
            engine_fatal!(SOURCE, "{}: begin_command_buffer failed: {}", self.name, err);
        }
        state.primary = Some(cmd);
        cmd
    }

    pub fn add_wait(&self, semaphore: RawSemaphore, stages: PipelineStages) {
        sync::lock(&self.state).waits.push((semaphore, stages));
    }

    pub fn presenting(&self) -> Option<u32> {
        sync::lock(&self.state).presenting
    }

    fn set_presenting(&self, image: Option<u32>) {
        sync::lock(&self.state).presenting = image;
    }

    /// End and queue the primary buffer, consuming pending waits
    ///
    /// Nothing is submitted when there is no recorded work, no wait to
    /// consume and nothing to signal.
    pub fn submit(&self, shared: &DeviceShared, signals: &[RawSemaphore]) {
        let (primary, waits) = {
            let mut state = sync::lock(&self.state);
            if state.primary.is_none() && state.waits.is_empty() && signals.is_empty() {
                return;
            }
            (state.primary.take(), std::mem::take(&mut state.waits))
        };
        let driver = shared.driver();
        if let Some(cmd) = primary {
            if let Err(err) = driver.end_command_buffer(cmd) {
                engine_fatal!(SOURCE, "{}: end_command_buffer failed: {}", self.name, err);
            }
        }
        let command_buffers: Vec<RawCommandBuffer> = primary.into_iter().collect();
        let fence = shared.acquire_fence();
        let submit = NativeSubmit {
            wait_semaphores: &waits,
            command_buffers: &command_buffers,
            signal_semaphores: signals,
            fence,
        };
        if let Err(err) = driver.queue_submit(self.queue, &submit) {
            engine_fatal!(SOURCE, "{}: queue_submit failed: {}", self.name, err);
        }
    }

    pub fn flush(&self, shared: &DeviceShared) {
        self.submit(shared, &[]);
    }

    /// Reset every worker's pool for `frame_index`
    ///
    /// The device has already waited on the fences of that slot's previous
    /// frame.
    pub fn begin_frame(&self, driver: &dyn Driver, frame_index: usize) {
        debug_assert!(sync::lock(&self.state).primary.is_none(), "{}: primary still recording", self.name);
        for worker in 0..self.workers {
            let mut slot = sync::lock(&self.pools[worker * self.frames_in_flight + frame_index]);
            if slot.pool.is_null() {
                continue;
            }
            if let Err(err) = driver.reset_command_pool(slot.pool) {
                engine_fatal!(SOURCE, "{}: reset_command_pool failed: {}", self.name, err);
            }
            slot.next_primary = 0;
            slot.next_secondary = 0;
        }
    }

    /// Destroy all command pools; the queue must be idle
    pub fn destroy(&self, driver: &dyn Driver) {
        for slot in &self.pools {
            let mut slot = sync::lock(slot);
            if !slot.pool.is_null() {
                driver.destroy_command_pool(slot.pool);
            }
            *slot = CommandPoolSlot::default();
        }
    }
}

// ============================================================================
// Transfer context
// ============================================================================

/// Copies, clears, blits, barriers and queue-level synchronization
#[derive(Clone, Copy)]
pub struct TransferContext<'a> {
    device: &'a Device,
    core: &'a ContextCore,
}

impl<'a> TransferContext<'a> {
    pub(crate) fn new(device: &'a Device, core: &'a ContextCore) -> Self {
        Self { device, core }
    }

    pub(crate) fn shared(&self) -> &'a DeviceShared {
        self.device.shared()
    }

    pub(crate) fn core(&self) -> &'a ContextCore {
        self.core
    }

    pub(crate) fn device(&self) -> &'a Device {
        self.device
    }

    fn validate(&self) {
        debug_assert!(self.shared().is_main_thread(), "{} context used off the main thread", self.core.name());
    }

    fn cmd(&self) -> RawCommandBuffer {
        self.validate();
        self.core.primary(self.shared())
    }

    pub fn queue(&self) -> QueueType {
        self.core.queue()
    }

    /// Record state transitions as one merged native barrier
    ///
    /// Transitions that change nothing record nothing.
    pub fn resource_barrier(&self, barriers: &[ResourceBarrier<'_>]) {
        self.validate();
        let targets: Vec<BarrierTarget> = barriers.iter().map(ResourceBarrier::target).collect();
        let batch = build_barrier_batch(&targets);
        if batch.is_empty() {
            return;
        }
        self.shared().driver().cmd_pipeline_barrier(self.cmd(), &batch);
    }

    /// Copy `data` into `dst` at `offset` through a staging buffer
    ///
    /// `dst` must be in `TransferWrite`.
    pub fn upload_buffer(&self, dst: &Buffer, offset: u64, data: &[u8]) -> Result<()> {
        debug_assert_eq!(dst.state(), ResourceState::TransferWrite, "upload_buffer destination must be in TransferWrite");
        debug_assert!(offset + data.len() as u64 <= dst.size(), "upload_buffer out of bounds");
        if data.is_empty() {
            return Ok(());
        }
        let staging_pool = self.device.staging_pool();
        let staging = staging_pool.allocate(CpuAccess::Upload, data.len() as u64)?;
        staging.write(0, data);
        self.shared().driver().cmd_copy_buffer(
            self.cmd(),
            staging.buffer(),
            dst.raw(),
            &[BufferCopy { src_offset: 0, dst_offset: offset, size: data.len() as u64 }],
        );
        staging_pool.free(staging);
        Ok(())
    }

    /// Upload one tightly packed mip level of one layer
    ///
    /// `dst` must be in `TransferWrite`.
    pub fn upload_texture(&self, dst: &Texture, mip: u32, layer: u32, data: &[u8]) -> Result<()> {
        let desc = dst.desc();
        debug_assert_eq!(dst.state(), ResourceState::TransferWrite, "upload_texture destination must be in TransferWrite");
        debug_assert!(mip < desc.mip_levels && layer < desc.array_layers, "upload_texture subresource out of range");
        let [width, height, depth] = desc.mip_extent(mip);
        debug_assert_eq!(
            data.len() as u64,
            desc.format.surface_size(width, height) * depth as u64,
            "upload_texture data size does not match the mip level"
        );
        let staging_pool = self.device.staging_pool();
        let staging = staging_pool.allocate(CpuAccess::Upload, data.len() as u64)?;
        staging.write(0, data);
        self.shared().driver().cmd_copy_buffer_to_image(
            self.cmd(),
            staging.buffer(),
            dst.raw(),
            &[BufferTextureCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                aspects: ImageAspects::from_format(desc.format),
                mip,
                base_layer: layer,
                layer_count: 1,
                offset: [0; 3],
                extent: [width, height, depth],
            }],
        );
        staging_pool.free(staging);
        Ok(())
    }

    /// `src` must be in `TransferRead`, `dst` in `TransferWrite`
    pub fn copy_buffer(&self, src: &Buffer, src_offset: u64, dst: &Buffer, dst_offset: u64, size: u64) {
        debug_assert_eq!(src.state(), ResourceState::TransferRead, "copy_buffer source must be in TransferRead");
        debug_assert_eq!(dst.state(), ResourceState::TransferWrite, "copy_buffer destination must be in TransferWrite");
        debug_assert!(src_offset + size <= src.size() && dst_offset + size <= dst.size(), "copy_buffer out of bounds");
        self.shared().driver().cmd_copy_buffer(
            self.cmd(),
            src.raw(),
            dst.raw(),
            &[BufferCopy { src_offset, dst_offset, size }],
        );
    }

    /// Copy one mip level of one layer into a buffer, tightly packed
    pub fn copy_texture_to_buffer(&self, src: &Texture, mip: u32, layer: u32, dst: &Buffer, dst_offset: u64) {
        let desc = src.desc();
        debug_assert_eq!(src.state(), ResourceState::TransferRead, "copy_texture_to_buffer source must be in TransferRead");
        debug_assert_eq!(dst.state(), ResourceState::TransferWrite, "copy_texture_to_buffer destination must be in TransferWrite");
        let [width, height, depth] = desc.mip_extent(mip);
        debug_assert!(
            dst_offset + desc.format.surface_size(width, height) * depth as u64 <= dst.size(),
            "copy_texture_to_buffer destination too small"
        );
        self.shared().driver().cmd_copy_image_to_buffer(
            self.cmd(),
            src.raw(),
            dst.raw(),
            &[BufferTextureCopy {
                buffer_offset: dst_offset,
                buffer_row_length: 0,
                aspects: ImageAspects::from_format(desc.format),
                mip,
                base_layer: layer,
                layer_count: 1,
                offset: [0; 3],
                extent: [width, height, depth],
            }],
        );
    }

    /// Clear a texture range outside a render pass
    ///
    /// `texture` must be in `TransferWrite`.
    pub fn clear_texture(&self, texture: &Texture, value: ClearValue, range: SubresourceRange) {
        debug_assert_eq!(texture.state(), ResourceState::TransferWrite, "clear_texture target must be in TransferWrite");
        let desc = texture.desc();
        let range = range.resolve(desc.mip_levels, desc.array_layers);
        let driver = self.shared().driver();
        match value {
            ClearValue::Color(color) => {
                debug_assert!(!desc.format.is_depth(), "color clear of a depth texture");
                driver.cmd_clear_color_image(self.cmd(), texture.raw(), color, &range);
            }
            ClearValue::DepthStencil { depth, stencil } => {
                debug_assert!(desc.format.is_depth(), "depth clear of a color texture");
                driver.cmd_clear_depth_stencil_image(
                    self.cmd(),
                    texture.raw(),
                    ImageAspects::from_format(desc.format),
                    depth,
                    stencil,
                    &range,
                );
            }
        }
    }

    /// Scaled copy of a whole mip level of one layer
    ///
    /// `src` must be in `TransferRead`, `dst` in `TransferWrite`.
    #[allow(clippy::too_many_arguments)]
    pub fn blit_texture(
        &self,
        src: &Texture,
        src_mip: u32,
        src_layer: u32,
        dst: &Texture,
        dst_mip: u32,
        dst_layer: u32,
        filter: BlitFilter,
    ) {
        debug_assert_eq!(src.state(), ResourceState::TransferRead, "blit_texture source must be in TransferRead");
        debug_assert_eq!(dst.state(), ResourceState::TransferWrite, "blit_texture destination must be in TransferWrite");
        let bounds = |extent: [u32; 3]| [[0, 0, 0], [extent[0] as i32, extent[1] as i32, extent[2] as i32]];
        let blit = TextureBlit {
            aspects: ImageAspects::from_format(src.format()),
            src_mip,
            src_layer,
            src_bounds: bounds(src.desc().mip_extent(src_mip)),
            dst_mip,
            dst_layer,
            dst_bounds: bounds(dst.desc().mip_extent(dst_mip)),
        };
        self.shared().driver().cmd_blit_image(self.cmd(), src.raw(), dst.raw(), &blit, filter);
    }

    pub fn reset_query_pool(&self, pool: &QueryPool, first: u32, count: u32) {
        debug_assert!(first + count <= pool.count(), "query reset out of range");
        self.shared().driver().cmd_reset_query_pool(self.cmd(), pool.raw(), first, count);
    }

    /// Make this context's next submission wait for everything `other` has
    /// recorded so far
    ///
    /// `other` is submitted immediately, signalling a semaphore.
    pub fn wait_for(&self, other: &TransferContext<'_>) {
        self.validate();
        debug_assert!(!std::ptr::eq(self.core, other.core), "a context cannot wait for itself");
        let shared = self.shared();
        let semaphore = shared.acquire_semaphore();
        other.core.submit(shared, &[semaphore]);
        self.core.add_wait(semaphore, PipelineStages::ALL_COMMANDS);
    }

    /// Submit recorded work now instead of at `end_frame`
    pub fn submit(&self) {
        self.validate();
        self.core.flush(self.shared());
    }
}

// ============================================================================
// Compute context
// ============================================================================

/// Transfer operations plus compute passes
#[derive(Clone, Copy)]
pub struct ComputeContext<'a> {
    transfer: TransferContext<'a>,
}

impl<'a> Deref for ComputeContext<'a> {
    type Target = TransferContext<'a>;

    fn deref(&self) -> &TransferContext<'a> {
        &self.transfer
    }
}

impl<'a> ComputeContext<'a> {
    pub(crate) fn new(device: &'a Device, core: &'a ContextCore) -> Self {
        Self { transfer: TransferContext::new(device, core) }
    }

    /// Start recording a compute pass
    pub fn create_compute_pass(&self) -> ComputeCommandList<'a> {
        self.validate();
        self.core().pass_opened();
        ComputeCommandList::new_root(self.shared(), self.core())
    }

    /// Append a finished compute pass to the primary command buffer
    pub fn submit_compute_pass(&self, mut list: ComputeCommandList<'a>) {
        debug_assert!(!list.is_child(), "only root command lists can be submitted");
        debug_assert!(list.is_ended(), "command list must be ended before submission");
        debug_assert!(std::ptr::eq(list.context(), self.core()), "command list belongs to another context");
        let segments = list.take_segments();
        if !segments.is_empty() {
            self.shared().driver().cmd_execute_commands(self.cmd(), &segments);
        }
        self.core().pass_closed();
    }
}

// ============================================================================
// Graphics context
// ============================================================================

/// Compute and transfer operations plus render passes and presentation
#[derive(Clone, Copy)]
pub struct GraphicsContext<'a> {
    compute: ComputeContext<'a>,
}

impl<'a> Deref for GraphicsContext<'a> {
    type Target = ComputeContext<'a>;

    fn deref(&self) -> &ComputeContext<'a> {
        &self.compute
    }
}

impl<'a> GraphicsContext<'a> {
    pub(crate) fn new(device: &'a Device, core: &'a ContextCore) -> Self {
        Self { compute: ComputeContext::new(device, core) }
    }

    /// Start recording a render pass into `desc`'s attachments
    ///
    /// The attachments' tracked states move to their `final_state`.
    pub fn create_render_pass(&self, desc: &RenderPassDesc<'_>) -> Result<GraphicsCommandList<'a>> {
        self.validate();
        debug_assert!(desc.validate(), "render pass attachments are missing, mismatched or not texture views");
        for color in &desc.colors {
            debug_assert!(
                color.load != crate::gpu::types::LoadOp::Load
                    || color.view.texture_state().map_or(true, |s| s == color.initial_state),
                "loaded color attachment is not in its declared initial state"
            );
        }

        let shared = self.shared();
        let driver = shared.driver();
        let render_pass = shared.render_targets.get_render_pass(driver, &RenderPassKey::from_desc(desc), || {
            native_render_pass_desc(desc)
        })?;
        let views = desc.attachment_views();
        let framebuffer = shared
            .render_targets
            .get_framebuffer(driver, &FramebufferKey::new(render_pass, &views, desc.extent()))?;

        for color in &desc.colors {
            color.view.set_texture_state(color.final_state);
        }
        if let Some(depth) = &desc.depth {
            depth.view.set_texture_state(depth.final_state);
        }

        let info = RenderPassInfo {
            render_pass,
            framebuffer,
            area: desc.render_area(),
            clear_values: desc.clear_values(),
            targets: desc.target_formats(),
        };
        self.core().pass_opened();
        Ok(GraphicsCommandList::new_root(
            shared,
            self.core(),
            Arc::new(info),
            self.device().dummy_vertex_buffer().raw(),
        ))
    }

    /// Wrap a finished render pass in begin/end and append it to the
    /// primary command buffer
    pub fn submit_render_pass(&self, mut list: GraphicsCommandList<'a>) {
        debug_assert!(!list.is_child(), "only root command lists can be submitted");
        debug_assert!(list.is_ended(), "command list must be ended before submission");
        debug_assert!(std::ptr::eq(list.context(), self.core()), "command list belongs to another context");
        let pass = Arc::clone(list.pass());
        let segments = list.take_segments();
        let driver = self.shared().driver();
        let cmd = self.cmd();
        driver.cmd_begin_render_pass(
            cmd,
            &NativeRenderPassBegin {
                render_pass: pass.render_pass,
                framebuffer: pass.framebuffer,
                area: pass.area,
                clear_values: &pass.clear_values,
            },
        );
        if !segments.is_empty() {
            driver.cmd_execute_commands(cmd, &segments);
        }
        driver.cmd_end_render_pass(cmd);
        self.core().pass_closed();
    }

    /// Acquire the next swapchain image and make later work wait for it
    ///
    /// Out-of-date and suboptimal results are logged and returned; the
    /// caller decides when to `resize` the swapchain.
    pub fn begin_present(&self, swapchain: &Swapchain) -> SwapchainStatus {
        self.validate();
        debug_assert!(!self.core().is_presenting(), "an image is already acquired on this context");
        let shared = self.shared();
        let semaphore = shared.acquire_semaphore();
        let acquired = match shared.driver().acquire_next_image(swapchain.raw(), semaphore) {
            Ok(acquired) => acquired,
            Err(err) => engine_fatal!(SOURCE, "acquire_next_image failed: {}", err),
        };
        match acquired.status {
            SwapchainStatus::Optimal => {}
            SwapchainStatus::Suboptimal => {
                engine_warn!(SOURCE, "Swapchain is suboptimal on acquire, presenting anyway");
            }
            SwapchainStatus::OutOfDate => {
                engine_warn!(SOURCE, "Swapchain is out of date on acquire, nothing will be presented");
                return acquired.status;
            }
        }
        swapchain.set_current_image(acquired.index);
        self.core().add_wait(semaphore, PipelineStages::COLOR_ATTACHMENT_OUTPUT | PipelineStages::TRANSFER);
        self.core().set_presenting(Some(acquired.index));
        acquired.status
    }

    /// Submit outstanding work and present the acquired image
    ///
    /// The back buffer must have been transitioned to `Present`.
    pub fn end_present(&self, swapchain: &Swapchain) -> SwapchainStatus {
        self.validate();
        let Some(image_index) = self.core().presenting() else {
            engine_warn!(SOURCE, "end_present without an acquired image, skipping present");
            return SwapchainStatus::OutOfDate;
        };
        debug_assert_eq!(
            swapchain.back_buffer().state(),
            ResourceState::Present,
            "back buffer must be in Present before end_present"
        );
        let shared = self.shared();
        let semaphore = shared.acquire_semaphore();
        self.core().submit(shared, &[semaphore]);
        let status = match shared.driver().queue_present(self.queue(), swapchain.raw(), image_index, semaphore) {
            Ok(status) => status,
            Err(err) => engine_fatal!(SOURCE, "queue_present failed: {}", err),
        };
        if status != SwapchainStatus::Optimal {
            engine_warn!(SOURCE, "Swapchain reported {:?} on present", status);
        }
        self.core().set_presenting(None);
        status
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
