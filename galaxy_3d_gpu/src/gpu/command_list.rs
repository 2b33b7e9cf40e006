/// Secondary command lists for compute and graphics passes
///
/// A root list is created by its context and submitted back to it. Child
/// lists split a pass across worker threads: `create_child` closes the
/// parent's current segment, each child records on its own worker slot, and
/// `submit_children` appends the children's segments in the order given.
/// Execution order is parent segments recorded before the split, then the
/// children. Once a list has children it no longer records directly.
///
/// Bind calls only update tracked state; the native binds are issued right
/// before the next draw or dispatch, and only for what changed.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::engine_fatal;
use crate::gpu::argument_set::{ArgumentSet, MAX_ARGUMENT_SETS};
use crate::gpu::context::ContextCore;
use crate::gpu::device::DeviceShared;
use crate::gpu::driver::{
    CommandBufferLevel, Driver, NativeInheritance, PipelineBindPoint, PipelineStages, QueryKind, RawBuffer,
    RawCommandBuffer, RawDescriptorSet, RawFramebuffer, RawPipelineLayout, RawRenderPass,
};
use crate::gpu::pipeline::{ComputePipeline, Pipeline, PipelineHandle, RenderTargetFormats, DUMMY_VERTEX_BINDING, MAX_VERTEX_BUFFERS};
use crate::gpu::resource::{Buffer, QueryPool};
use crate::gpu::transient_pool::TransientAllocation;
use crate::gpu::types::{ClearValue, IndexType, Rect2D, ResourceState, Viewport};
use crate::gpu::worker::WorkerSlot;

const SOURCE: &str = "galaxy3d::gpu::CommandList";

// ============================================================================
// Base command list
// ============================================================================

/// Recording state shared by compute and graphics lists
pub struct CommandList<'a> {
    shared: &'a DeviceShared,
    core: &'a ContextCore,
    worker: WorkerSlot,
    inheritance: Option<NativeInheritance>,
    /// Segment currently recording, begun on first use
    cmd: Option<RawCommandBuffer>,
    /// Closed segments, in execution order
    segments: Vec<RawCommandBuffer>,
    ended: bool,
    is_child: bool,
    has_children: bool,
}

impl<'a> CommandList<'a> {
    fn new(
        shared: &'a DeviceShared,
        core: &'a ContextCore,
        worker: WorkerSlot,
        inheritance: Option<NativeInheritance>,
        is_child: bool,
    ) -> Self {
        Self {
            shared,
            core,
            worker,
            inheritance,
            cmd: None,
            segments: Vec::new(),
            ended: false,
            is_child,
            has_children: false,
        }
    }

    fn driver(&self) -> &'a dyn Driver {
        self.shared.driver()
    }

    /// Current segment, begun from this worker's pool on first use
    fn cmd(&mut self) -> RawCommandBuffer {
        debug_assert!(!self.ended, "recording into an ended command list");
        debug_assert!(!self.has_children, "recording directly into a command list that has children");
        if let Some(cmd) = self.cmd {
            return cmd;
        }
        let cmd = self.core.command_buffer(self.shared, self.worker, CommandBufferLevel::Secondary);
        if let Err(err) = self.driver().begin_command_buffer(cmd, self.inheritance.as_ref()) {
            engine_fatal!(SOURCE, "begin_command_buffer failed: {}", err);
        }
        self.cmd = Some(cmd);
        cmd
    }

    fn close_segment(&mut self) {
        if let Some(cmd) = self.cmd.take() {
            if let Err(err) = self.driver().end_command_buffer(cmd) {
                engine_fatal!(SOURCE, "end_command_buffer failed: {}", err);
            }
            self.segments.push(cmd);
        }
    }

    fn spawn_child(&mut self, worker: WorkerSlot) -> CommandList<'a> {
        debug_assert!(!self.ended, "cannot create a child of an ended command list");
        self.close_segment();
        self.has_children = true;
        CommandList::new(self.shared, self.core, worker, self.inheritance, true)
    }

    fn absorb_child(&mut self, child: CommandList<'a>) {
        debug_assert!(child.is_child, "only child lists can be merged into a parent");
        debug_assert!(child.ended, "child command list must be ended before submission");
        debug_assert!(std::ptr::eq(child.core, self.core), "child belongs to another context");
        self.segments.extend(child.segments);
    }

    /// Finish recording; required before submission
    pub fn end(&mut self) {
        self.close_segment();
        self.ended = true;
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn is_child(&self) -> bool {
        self.is_child
    }

    pub fn has_children(&self) -> bool {
        self.has_children
    }

    pub fn worker(&self) -> WorkerSlot {
        self.worker
    }

    pub(crate) fn context(&self) -> &'a ContextCore {
        self.core
    }

    pub(crate) fn take_segments(&mut self) -> Vec<RawCommandBuffer> {
        std::mem::take(&mut self.segments)
    }

    pub fn write_timestamp(&mut self, pool: &QueryPool, index: u32) {
        debug_assert_eq!(pool.kind(), QueryKind::Timestamp, "write_timestamp on a non-timestamp pool");
        debug_assert!(index < pool.count(), "query index out of range");
        let cmd = self.cmd();
        self.driver().cmd_write_timestamp(cmd, PipelineStages::BOTTOM_OF_PIPE, pool.raw(), index);
    }

    pub fn begin_query(&mut self, pool: &QueryPool, index: u32) {
        debug_assert_eq!(pool.kind(), QueryKind::Occlusion, "begin_query on a non-occlusion pool");
        debug_assert!(index < pool.count(), "query index out of range");
        let cmd = self.cmd();
        self.driver().cmd_begin_query(cmd, pool.raw(), index);
    }

    pub fn end_query(&mut self, pool: &QueryPool, index: u32) {
        let cmd = self.cmd();
        self.driver().cmd_end_query(cmd, pool.raw(), index);
    }
}

// ============================================================================
// Argument set bindings
// ============================================================================

#[derive(Default)]
struct ArgumentBindings {
    layout: RawPipelineLayout,
    sets: [RawDescriptorSet; MAX_ARGUMENT_SETS],
    offsets: [Vec<u32>; MAX_ARGUMENT_SETS],
    dirty: u8,
}

impl ArgumentBindings {
    fn set(&mut self, index: usize, set: &ArgumentSet) {
        debug_assert!(index < MAX_ARGUMENT_SETS, "argument set index {} out of range", index);
        let offsets = set.dynamic_offsets();
        if self.sets[index] == set.raw() && self.offsets[index] == offsets {
            return;
        }
        self.sets[index] = set.raw();
        self.offsets[index].clear();
        self.offsets[index].extend_from_slice(offsets);
        self.dirty |= 1 << index;
    }

    /// A new pipeline layout invalidates every native binding
    fn pipeline_changed(&mut self, layout: RawPipelineLayout) {
        if self.layout != layout {
            self.layout = layout;
            self.dirty = (1 << MAX_ARGUMENT_SETS) - 1;
        }
    }

    /// Bind dirty sets used by `handle`, one native call per contiguous run
    fn flush(&mut self, driver: &dyn Driver, cmd: RawCommandBuffer, handle: &PipelineHandle) {
        let count = handle.argument_set_count as usize;
        debug_assert!(
            self.sets[..count].iter().all(|set| !set.is_null()),
            "pipeline uses an argument set that is not bound"
        );
        let mut index = 0;
        while index < count {
            if self.dirty & (1 << index) == 0 {
                index += 1;
                continue;
            }
            let first = index;
            let mut dynamic_offsets = Vec::new();
            while index < count && self.dirty & (1 << index) != 0 {
                debug_assert_eq!(
                    self.offsets[index].len() as u32,
                    handle.dynamic_offset_counts[index],
                    "argument set {} does not match the pipeline layout",
                    index
                );
                dynamic_offsets.extend_from_slice(&self.offsets[index]);
                index += 1;
            }
            driver.cmd_bind_descriptor_sets(
                cmd,
                handle.bind_point,
                handle.layout,
                first as u32,
                &self.sets[first..index],
                &dynamic_offsets,
            );
        }
        self.dirty &= !(((1u32 << count) - 1) as u8);
    }
}

// ============================================================================
// Compute command list
// ============================================================================

/// Records dispatches for one compute pass
pub struct ComputeCommandList<'a> {
    list: CommandList<'a>,
    pipeline: Option<Arc<ComputePipeline>>,
    pipeline_dirty: bool,
    arguments: ArgumentBindings,
}

impl<'a> Deref for ComputeCommandList<'a> {
    type Target = CommandList<'a>;

    fn deref(&self) -> &CommandList<'a> {
        &self.list
    }
}

impl<'a> DerefMut for ComputeCommandList<'a> {
    fn deref_mut(&mut self) -> &mut CommandList<'a> {
        &mut self.list
    }
}

impl<'a> ComputeCommandList<'a> {
    pub(crate) fn new_root(shared: &'a DeviceShared, core: &'a ContextCore) -> Self {
        Self::from_list(CommandList::new(shared, core, WorkerSlot::MAIN, None, false))
    }

    fn from_list(list: CommandList<'a>) -> Self {
        Self {
            list,
            pipeline: None,
            pipeline_dirty: false,
            arguments: ArgumentBindings::default(),
        }
    }

    pub fn set_pipeline(&mut self, pipeline: &Arc<ComputePipeline>) {
        if self.pipeline.as_ref().is_some_and(|p| Arc::ptr_eq(p, pipeline)) {
            return;
        }
        self.arguments.pipeline_changed(pipeline.handle.layout);
        self.pipeline = Some(Arc::clone(pipeline));
        self.pipeline_dirty = true;
    }

    pub fn set_argument_set(&mut self, index: usize, set: &ArgumentSet) {
        self.arguments.set(index, set);
    }

    fn pre_dispatch(&mut self) -> Option<RawCommandBuffer> {
        debug_assert!(self.pipeline.is_some(), "dispatch without a compute pipeline");
        let pipeline = self.pipeline.as_ref()?;
        let cmd = self.list.cmd();
        let driver = self.list.driver();
        if self.pipeline_dirty {
            driver.cmd_bind_pipeline(cmd, PipelineBindPoint::Compute, pipeline.handle.raw);
            self.pipeline_dirty = false;
        }
        self.arguments.flush(driver, cmd, &pipeline.handle);
        Some(cmd)
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        if let Some(cmd) = self.pre_dispatch() {
            self.list.driver().cmd_dispatch(cmd, x, y, z);
        }
    }

    /// `buffer` must be in `IndirectArgument`
    pub fn dispatch_indirect(&mut self, buffer: &Buffer, offset: u64) {
        debug_assert_eq!(buffer.state(), ResourceState::IndirectArgument, "indirect buffer must be in IndirectArgument");
        if let Some(cmd) = self.pre_dispatch() {
            self.list.driver().cmd_dispatch_indirect(cmd, buffer.raw(), offset);
        }
    }

    /// Child list recording on `worker`, with no bound state
    pub fn create_child(&mut self, worker: WorkerSlot) -> ComputeCommandList<'a> {
        ComputeCommandList::from_list(self.list.spawn_child(worker))
    }

    /// Append ended children, in order, after this list's segments
    pub fn submit_children(&mut self, children: Vec<ComputeCommandList<'a>>) {
        for child in children {
            self.list.absorb_child(child.list);
        }
    }
}

// ============================================================================
// Graphics command list
// ============================================================================

/// Native render pass state a graphics list and its children record into
#[derive(Debug)]
pub(crate) struct RenderPassInfo {
    pub render_pass: RawRenderPass,
    pub framebuffer: RawFramebuffer,
    pub area: Rect2D,
    pub clear_values: Vec<ClearValue>,
    pub targets: RenderTargetFormats,
}

/// Records draws for one render pass
pub struct GraphicsCommandList<'a> {
    list: CommandList<'a>,
    pass: Arc<RenderPassInfo>,
    dummy_vertex_buffer: RawBuffer,
    pipeline: Option<Arc<Pipeline>>,
    pipeline_dirty: bool,
    dummy_bound: bool,
    viewport: Viewport,
    viewport_dirty: bool,
    scissor: Rect2D,
    scissor_dirty: bool,
    vertex_buffers: [(RawBuffer, u64); MAX_VERTEX_BUFFERS],
    vertex_dirty: u32,
    index_buffer: Option<(RawBuffer, u64, IndexType)>,
    index_dirty: bool,
    arguments: ArgumentBindings,
}

impl<'a> Deref for GraphicsCommandList<'a> {
    type Target = CommandList<'a>;

    fn deref(&self) -> &CommandList<'a> {
        &self.list
    }
}

impl<'a> DerefMut for GraphicsCommandList<'a> {
    fn deref_mut(&mut self) -> &mut CommandList<'a> {
        &mut self.list
    }
}

impl<'a> GraphicsCommandList<'a> {
    pub(crate) fn new_root(
        shared: &'a DeviceShared,
        core: &'a ContextCore,
        pass: Arc<RenderPassInfo>,
        dummy_vertex_buffer: RawBuffer,
    ) -> Self {
        let inheritance = NativeInheritance { render_pass: pass.render_pass, framebuffer: pass.framebuffer };
        Self::from_list(CommandList::new(shared, core, WorkerSlot::MAIN, Some(inheritance), false), pass, dummy_vertex_buffer)
    }

    fn from_list(list: CommandList<'a>, pass: Arc<RenderPassInfo>, dummy_vertex_buffer: RawBuffer) -> Self {
        let area = pass.area;
        Self {
            list,
            pass,
            dummy_vertex_buffer,
            pipeline: None,
            pipeline_dirty: false,
            dummy_bound: false,
            viewport: Viewport::from_extent(area.width, area.height),
            viewport_dirty: true,
            scissor: area,
            scissor_dirty: true,
            vertex_buffers: [(RawBuffer::NULL, 0); MAX_VERTEX_BUFFERS],
            vertex_dirty: 0,
            index_buffer: None,
            index_dirty: false,
            arguments: ArgumentBindings::default(),
        }
    }

    pub(crate) fn pass(&self) -> &Arc<RenderPassInfo> {
        &self.pass
    }

    pub fn render_area(&self) -> Rect2D {
        self.pass.area
    }

    pub fn target_formats(&self) -> &RenderTargetFormats {
        &self.pass.targets
    }

    /// The pipeline must have been built for this pass's target formats
    pub fn set_pipeline(&mut self, pipeline: &Arc<Pipeline>) {
        debug_assert_eq!(pipeline.targets, self.pass.targets, "pipeline target formats do not match the render pass");
        if self.pipeline.as_ref().is_some_and(|p| Arc::ptr_eq(p, pipeline)) {
            return;
        }
        self.arguments.pipeline_changed(pipeline.handle.layout);
        self.pipeline = Some(Arc::clone(pipeline));
        self.pipeline_dirty = true;
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        if self.viewport != viewport {
            self.viewport = viewport;
            self.viewport_dirty = true;
        }
    }

    pub fn set_scissor(&mut self, scissor: Rect2D) {
        if self.scissor != scissor {
            self.scissor = scissor;
            self.scissor_dirty = true;
        }
    }

    fn bind_vertex_slot(&mut self, slot: usize, buffer: RawBuffer, offset: u64) {
        debug_assert!(slot < MAX_VERTEX_BUFFERS, "vertex buffer slot {} out of range", slot);
        if self.vertex_buffers[slot] != (buffer, offset) {
            self.vertex_buffers[slot] = (buffer, offset);
            self.vertex_dirty |= 1 << slot;
        }
    }

    /// `buffer` must be in `VertexBuffer`
    pub fn set_vertex_buffer(&mut self, slot: usize, buffer: &Buffer, offset: u64) {
        debug_assert_eq!(buffer.state(), ResourceState::VertexBuffer, "vertex buffer must be in VertexBuffer");
        self.bind_vertex_slot(slot, buffer.raw(), offset);
    }

    /// Bind geometry pool data written this frame
    pub fn set_transient_vertex_buffer(&mut self, slot: usize, allocation: &TransientAllocation<'_>) {
        self.bind_vertex_slot(slot, allocation.buffer(), allocation.offset());
    }

    /// `buffer` must be in `IndexBuffer`
    pub fn set_index_buffer(&mut self, buffer: &Buffer, offset: u64, index_type: IndexType) {
        debug_assert_eq!(buffer.state(), ResourceState::IndexBuffer, "index buffer must be in IndexBuffer");
        self.bind_index(buffer.raw(), offset, index_type);
    }

    pub fn set_transient_index_buffer(&mut self, allocation: &TransientAllocation<'_>, index_type: IndexType) {
        self.bind_index(allocation.buffer(), allocation.offset(), index_type);
    }

    fn bind_index(&mut self, buffer: RawBuffer, offset: u64, index_type: IndexType) {
        let binding = Some((buffer, offset, index_type));
        if self.index_buffer != binding {
            self.index_buffer = binding;
            self.index_dirty = true;
        }
    }

    pub fn set_argument_set(&mut self, index: usize, set: &ArgumentSet) {
        self.arguments.set(index, set);
    }

    /// Issue the native binds for whatever changed since the last draw
    fn pre_draw(&mut self) -> Option<RawCommandBuffer> {
        debug_assert!(self.pipeline.is_some(), "draw without a graphics pipeline");
        let pipeline = self.pipeline.as_ref()?;
        let cmd = self.list.cmd();
        let driver = self.list.driver();

        if self.pipeline_dirty {
            driver.cmd_bind_pipeline(cmd, PipelineBindPoint::Graphics, pipeline.handle.raw);
            if pipeline.uses_dummy_vertex_binding && !self.dummy_bound {
                driver.cmd_bind_vertex_buffers(cmd, DUMMY_VERTEX_BINDING, &[self.dummy_vertex_buffer], &[0]);
                self.dummy_bound = true;
            }
            self.pipeline_dirty = false;
        }
        if self.viewport_dirty {
            driver.cmd_set_viewport(cmd, &self.viewport);
            self.viewport_dirty = false;
        }
        if self.scissor_dirty {
            driver.cmd_set_scissor(cmd, &self.scissor);
            self.scissor_dirty = false;
        }

        let mut slot = 0;
        while self.vertex_dirty != 0 && slot < MAX_VERTEX_BUFFERS {
            if self.vertex_dirty & (1 << slot) == 0 {
                slot += 1;
                continue;
            }
            let first = slot;
            while slot < MAX_VERTEX_BUFFERS && self.vertex_dirty & (1 << slot) != 0 {
                slot += 1;
            }
            let (buffers, offsets): (Vec<RawBuffer>, Vec<u64>) = self.vertex_buffers[first..slot].iter().copied().unzip();
            driver.cmd_bind_vertex_buffers(cmd, first as u32, &buffers, &offsets);
        }
        self.vertex_dirty = 0;

        if self.index_dirty {
            if let Some((buffer, offset, index_type)) = self.index_buffer {
                driver.cmd_bind_index_buffer(cmd, buffer, offset, index_type);
            }
            self.index_dirty = false;
        }

        self.arguments.flush(driver, cmd, &pipeline.handle);
        Some(cmd)
    }

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        if let Some(cmd) = self.pre_draw() {
            self.list.driver().cmd_draw(cmd, vertex_count, instance_count, first_vertex, first_instance);
        }
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        debug_assert!(self.index_buffer.is_some(), "draw_indexed without an index buffer");
        if let Some(cmd) = self.pre_draw() {
            self.list
                .driver()
                .cmd_draw_indexed(cmd, index_count, instance_count, first_index, vertex_offset, first_instance);
        }
    }

    /// `buffer` must be in `IndirectArgument`
    pub fn draw_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32) {
        debug_assert_eq!(buffer.state(), ResourceState::IndirectArgument, "indirect buffer must be in IndirectArgument");
        if let Some(cmd) = self.pre_draw() {
            self.list.driver().cmd_draw_indirect(cmd, buffer.raw(), offset, draw_count, stride);
        }
    }

    /// Child list continuing this render pass on `worker`
    ///
    /// The child starts with no bound state and the pass's default viewport
    /// and scissor.
    pub fn create_child(&mut self, worker: WorkerSlot) -> GraphicsCommandList<'a> {
        let list = self.list.spawn_child(worker);
        GraphicsCommandList::from_list(list, Arc::clone(&self.pass), self.dummy_vertex_buffer)
    }

    /// Append ended children, in order, after this list's segments
    pub fn submit_children(&mut self, children: Vec<GraphicsCommandList<'a>>) {
        for child in children {
            debug_assert!(Arc::ptr_eq(&child.pass, &self.pass), "child belongs to another render pass");
            self.list.absorb_child(child.list);
        }
    }
}

#[cfg(test)]
#[path = "command_list_tests.rs"]
mod tests;
