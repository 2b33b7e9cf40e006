//! Recording driver for tests
//!
//! Hands out sequential handles, keeps a command stream per command buffer,
//! and logs every submission, fence wait and destruction in one ordered
//! event list. Fences become signaled when they are waited on, which
//! stands in for the GPU finishing the work.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::error::{Error, Result};
use crate::gpu::driver::*;
use crate::gpu::resource::SamplerDesc;
use crate::gpu::types::{IndexType, QueueType, Rect2D, ShaderStage, SubresourceRange, Viewport};

/// One recorded command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Barrier(NativeBarrierBatch),
    BeginRenderPass { render_pass: RawRenderPass, framebuffer: RawFramebuffer, clear_count: usize },
    EndRenderPass,
    ExecuteCommands(Vec<RawCommandBuffer>),
    BindPipeline(PipelineBindPoint, RawPipeline),
    BindDescriptorSets { first_set: u32, sets: Vec<RawDescriptorSet>, dynamic_offsets: Vec<u32> },
    BindVertexBuffers { first_binding: u32, buffers: Vec<RawBuffer>, offsets: Vec<u64> },
    BindIndexBuffer { buffer: RawBuffer, offset: u64, index_type: IndexType },
    SetViewport(Viewport),
    SetScissor(Rect2D),
    Draw { vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32 },
    DrawIndexed { index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32 },
    DrawIndirect { buffer: RawBuffer, offset: u64, draw_count: u32 },
    Dispatch(u32, u32, u32),
    DispatchIndirect { buffer: RawBuffer, offset: u64 },
    CopyBuffer { src: RawBuffer, dst: RawBuffer, regions: Vec<BufferCopy> },
    CopyBufferToImage { src: RawBuffer, dst: RawImage, regions: Vec<BufferTextureCopy> },
    CopyImageToBuffer { src: RawImage, dst: RawBuffer },
    Blit { src: RawImage, dst: RawImage, blit: TextureBlit },
    ClearColor { image: RawImage, color: [f32; 4] },
    ClearDepthStencil { image: RawImage, depth: f32 },
    ResetQueryPool { pool: RawQueryPool, first: u32, count: u32 },
    WriteTimestamp { pool: RawQueryPool, index: u32 },
    BeginQuery { pool: RawQueryPool, index: u32 },
    EndQuery { pool: RawQueryPool, index: u32 },
}

/// Device-level event, in call order
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Submit {
        queue: QueueType,
        command_buffers: Vec<RawCommandBuffer>,
        waits: Vec<RawSemaphore>,
        signals: Vec<RawSemaphore>,
        fence: RawFence,
    },
    WaitFences(Vec<RawFence>),
    ResetFences(Vec<RawFence>),
    ResetCommandPool(RawCommandPool),
    Destroy(NativeObject),
    Acquire { swapchain: RawSwapchain, signal: RawSemaphore },
    Present { swapchain: RawSwapchain, image_index: u32, wait: RawSemaphore },
    WaitIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Unsignaled,
    Pending,
    Signaled,
}

#[derive(Default)]
pub struct MockState {
    next_handle: u64,
    pub commands: HashMap<RawCommandBuffer, Vec<Command>>,
    pub levels: HashMap<RawCommandBuffer, CommandBufferLevel>,
    pub inheritance: HashMap<RawCommandBuffer, NativeInheritance>,
    recording: HashSet<RawCommandBuffer>,
    pool_buffers: HashMap<RawCommandPool, Vec<RawCommandBuffer>>,
    fences: HashMap<RawFence, FenceState>,
    pub events: Vec<Event>,
    memory: HashMap<RawBuffer, Box<[u8]>>,
    pub descriptor_sets_allocated: usize,
    pub descriptor_writes: Vec<(RawDescriptorSet, Vec<DescriptorWrite>)>,
    pub pipelines_created: usize,
    pub pipeline_layouts_created: usize,
    pub render_passes_created: usize,
    pub framebuffers_created: usize,
    pub samplers_created: usize,
    pub graphics_pipeline_inputs: Vec<(Vec<NativeVertexBinding>, Vec<NativeVertexAttribute>)>,
    pub reflected_inputs: Vec<crate::gpu::resource::ShaderVertexInput>,
    pub swapchain_images: Vec<RawImage>,
    next_image: u32,
    pub fail_next_create: bool,
}

impl MockState {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn record(&mut self, cmd: RawCommandBuffer, command: Command) {
        assert!(self.recording.contains(&cmd), "recording into {:?} outside begin/end", cmd);
        self.commands.entry(cmd).or_default().push(command);
    }

    fn creation(&mut self) -> Result<u64> {
        if std::mem::take(&mut self.fail_next_create) {
            return Err(Error::BackendError("mock creation failure".to_string()));
        }
        Ok(self.handle())
    }

    fn destroyed(&mut self, object: NativeObject) {
        self.events.push(Event::Destroy(object));
    }
}

pub struct MockDriver {
    properties: DriverProperties,
    state: Mutex<MockState>,
}

impl MockDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            properties: DriverProperties {
                backend: "mock",
                adapter_name: "Mock Adapter".to_string(),
                min_constant_buffer_offset_alignment: 256,
                min_storage_buffer_offset_alignment: 64,
                max_constant_buffer_range: 65536,
                max_bound_argument_sets: 4,
                max_vertex_input_bindings: 16,
                timestamp_period: 1.0,
                dedicated_compute_queue: false,
                dedicated_transfer_queue: false,
            },
            state: Mutex::new(MockState::default()),
        })
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Commands of `cmd` with executed secondaries expanded in place
    pub fn flatten(&self, cmd: RawCommandBuffer) -> Vec<Command> {
        let state = self.state();
        let mut out = Vec::new();
        flatten_into(&state, cmd, &mut out);
        out
    }

    /// Primaries submitted so far, in submission order
    pub fn submitted(&self) -> Vec<RawCommandBuffer> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Submit { command_buffers, .. } => Some(command_buffers.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Every barrier batch recorded across all submitted primaries
    pub fn submitted_barriers(&self) -> Vec<NativeBarrierBatch> {
        self.submitted()
            .into_iter()
            .flat_map(|cmd| self.flatten(cmd))
            .filter_map(|c| match c {
                Command::Barrier(batch) => Some(batch),
                _ => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    pub fn destroyed(&self) -> Vec<NativeObject> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Destroy(object) => Some(*object),
                _ => None,
            })
            .collect()
    }

    pub fn event_index(&self, predicate: impl Fn(&Event) -> bool) -> Option<usize> {
        self.state().events.iter().position(predicate)
    }
}

fn flatten_into(state: &MockState, cmd: RawCommandBuffer, out: &mut Vec<Command>) {
    for command in state.commands.get(&cmd).map(Vec::as_slice).unwrap_or_default() {
        match command {
            Command::ExecuteCommands(secondaries) => {
                for secondary in secondaries {
                    flatten_into(state, *secondary, out);
                }
            }
            other => out.push(other.clone()),
        }
    }
}

impl Driver for MockDriver {
    fn properties(&self) -> &DriverProperties {
        &self.properties
    }

    fn create_buffer(&self, desc: &NativeBufferDesc) -> Result<NativeBuffer> {
        let mut state = self.state();
        let raw = RawBuffer(state.creation()?);
        let mapped = if desc.cpu_access != crate::gpu::types::CpuAccess::None {
            let mut memory = vec![0u8; desc.size as usize].into_boxed_slice();
            let ptr = MappedPtr::new(memory.as_mut_ptr());
            state.memory.insert(raw, memory);
            ptr
        } else {
            None
        };
        Ok(NativeBuffer { raw, mapped })
    }

    fn destroy_buffer(&self, buffer: RawBuffer) {
        let mut state = self.state();
        state.memory.remove(&buffer);
        state.destroyed(NativeObject::Buffer(buffer));
    }

    fn create_image(&self, _desc: &NativeImageDesc) -> Result<RawImage> {
        Ok(RawImage(self.state().creation()?))
    }

    fn destroy_image(&self, image: RawImage) {
        self.state().destroyed(NativeObject::Image(image));
    }

    fn create_image_view(&self, _desc: &NativeImageViewDesc) -> Result<RawImageView> {
        Ok(RawImageView(self.state().creation()?))
    }

    fn destroy_image_view(&self, view: RawImageView) {
        self.state().destroyed(NativeObject::ImageView(view));
    }

    fn create_sampler(&self, _desc: &SamplerDesc) -> Result<RawSampler> {
        let mut state = self.state();
        state.samplers_created += 1;
        Ok(RawSampler(state.creation()?))
    }

    fn destroy_sampler(&self, sampler: RawSampler) {
        self.state().destroyed(NativeObject::Sampler(sampler));
    }

    fn create_shader_module(&self, _stage: ShaderStage, _bytecode: &[u8]) -> Result<NativeShader> {
        let mut state = self.state();
        let module = RawShaderModule(state.creation()?);
        Ok(NativeShader { module, reflected_inputs: state.reflected_inputs.clone() })
    }

    fn destroy_shader_module(&self, module: RawShaderModule) {
        self.state().destroyed(NativeObject::ShaderModule(module));
    }

    fn create_descriptor_set_layout(&self, _bindings: &[NativeBindingDesc]) -> Result<RawDescriptorSetLayout> {
        Ok(RawDescriptorSetLayout(self.state().creation()?))
    }

    fn destroy_descriptor_set_layout(&self, layout: RawDescriptorSetLayout) {
        self.state().destroyed(NativeObject::DescriptorSetLayout(layout));
    }

    fn allocate_descriptor_set(&self, _layout: RawDescriptorSetLayout) -> Result<RawDescriptorSet> {
        let mut state = self.state();
        state.descriptor_sets_allocated += 1;
        Ok(RawDescriptorSet(state.creation()?))
    }

    fn free_descriptor_set(&self, set: RawDescriptorSet) {
        self.state().destroyed(NativeObject::DescriptorSet(set));
    }

    fn write_descriptor_set(&self, set: RawDescriptorSet, writes: &[DescriptorWrite]) {
        self.state().descriptor_writes.push((set, writes.to_vec()));
    }

    fn create_pipeline_layout(&self, _set_layouts: &[RawDescriptorSetLayout]) -> Result<RawPipelineLayout> {
        let mut state = self.state();
        state.pipeline_layouts_created += 1;
        Ok(RawPipelineLayout(state.creation()?))
    }

    fn destroy_pipeline_layout(&self, layout: RawPipelineLayout) {
        self.state().destroyed(NativeObject::PipelineLayout(layout));
    }

    fn create_graphics_pipeline(&self, desc: &NativeGraphicsPipelineDesc<'_>) -> Result<RawPipeline> {
        let mut state = self.state();
        let raw = RawPipeline(state.creation()?);
        state.pipelines_created += 1;
        state
            .graphics_pipeline_inputs
            .push((desc.vertex_bindings.to_vec(), desc.vertex_attributes.to_vec()));
        Ok(raw)
    }

    fn create_compute_pipeline(&self, _desc: &NativeComputePipelineDesc<'_>) -> Result<RawPipeline> {
        let mut state = self.state();
        let raw = RawPipeline(state.creation()?);
        state.pipelines_created += 1;
        Ok(raw)
    }

    fn destroy_pipeline(&self, pipeline: RawPipeline) {
        self.state().destroyed(NativeObject::Pipeline(pipeline));
    }

    fn create_render_pass(&self, _desc: &NativeRenderPassDesc) -> Result<RawRenderPass> {
        let mut state = self.state();
        state.render_passes_created += 1;
        Ok(RawRenderPass(state.creation()?))
    }

    fn destroy_render_pass(&self, render_pass: RawRenderPass) {
        self.state().destroyed(NativeObject::RenderPass(render_pass));
    }

    fn create_framebuffer(&self, _desc: &NativeFramebufferDesc<'_>) -> Result<RawFramebuffer> {
        let mut state = self.state();
        state.framebuffers_created += 1;
        Ok(RawFramebuffer(state.creation()?))
    }

    fn destroy_framebuffer(&self, framebuffer: RawFramebuffer) {
        self.state().destroyed(NativeObject::Framebuffer(framebuffer));
    }

    fn create_query_pool(&self, _kind: QueryKind, _count: u32) -> Result<RawQueryPool> {
        Ok(RawQueryPool(self.state().creation()?))
    }

    fn destroy_query_pool(&self, pool: RawQueryPool) {
        self.state().destroyed(NativeObject::QueryPool(pool));
    }

    fn query_results(&self, _pool: RawQueryPool, first: u32, results: &mut [u64]) -> Result<bool> {
        for (i, result) in results.iter_mut().enumerate() {
            *result = (first as u64 + i as u64) * 1000;
        }
        Ok(true)
    }

    fn create_command_pool(&self, _queue: QueueType) -> Result<RawCommandPool> {
        Ok(RawCommandPool(self.state().creation()?))
    }

    fn reset_command_pool(&self, pool: RawCommandPool) -> Result<()> {
        let mut state = self.state();
        state.events.push(Event::ResetCommandPool(pool));
        let buffers = state.pool_buffers.get(&pool).cloned().unwrap_or_default();
        for cmd in buffers {
            state.commands.remove(&cmd);
            state.recording.remove(&cmd);
        }
        Ok(())
    }

    fn destroy_command_pool(&self, pool: RawCommandPool) {
        self.state().pool_buffers.remove(&pool);
    }

    fn allocate_command_buffer(&self, pool: RawCommandPool, level: CommandBufferLevel) -> Result<RawCommandBuffer> {
        let mut state = self.state();
        let cmd = RawCommandBuffer(state.creation()?);
        state.pool_buffers.entry(pool).or_default().push(cmd);
        state.levels.insert(cmd, level);
        Ok(cmd)
    }

    fn begin_command_buffer(&self, cmd: RawCommandBuffer, inheritance: Option<&NativeInheritance>) -> Result<()> {
        let mut state = self.state();
        assert!(state.recording.insert(cmd), "{:?} begun twice", cmd);
        state.commands.insert(cmd, Vec::new());
        if let Some(inheritance) = inheritance {
            state.inheritance.insert(cmd, *inheritance);
        }
        Ok(())
    }

    fn end_command_buffer(&self, cmd: RawCommandBuffer) -> Result<()> {
        assert!(self.state().recording.remove(&cmd), "{:?} ended without begin", cmd);
        Ok(())
    }

    fn cmd_pipeline_barrier(&self, cmd: RawCommandBuffer, batch: &NativeBarrierBatch) {
        self.state().record(cmd, Command::Barrier(batch.clone()));
    }

    fn cmd_begin_render_pass(&self, cmd: RawCommandBuffer, begin: &NativeRenderPassBegin<'_>) {
        self.state().record(
            cmd,
            Command::BeginRenderPass {
                render_pass: begin.render_pass,
                framebuffer: begin.framebuffer,
                clear_count: begin.clear_values.len(),
            },
        );
    }

    fn cmd_end_render_pass(&self, cmd: RawCommandBuffer) {
        self.state().record(cmd, Command::EndRenderPass);
    }

    fn cmd_execute_commands(&self, cmd: RawCommandBuffer, secondaries: &[RawCommandBuffer]) {
        self.state().record(cmd, Command::ExecuteCommands(secondaries.to_vec()));
    }

    fn cmd_bind_pipeline(&self, cmd: RawCommandBuffer, bind_point: PipelineBindPoint, pipeline: RawPipeline) {
        self.state().record(cmd, Command::BindPipeline(bind_point, pipeline));
    }

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: RawCommandBuffer,
        _bind_point: PipelineBindPoint,
        _layout: RawPipelineLayout,
        first_set: u32,
        sets: &[RawDescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        self.state().record(
            cmd,
            Command::BindDescriptorSets { first_set, sets: sets.to_vec(), dynamic_offsets: dynamic_offsets.to_vec() },
        );
    }

    fn cmd_bind_vertex_buffers(&self, cmd: RawCommandBuffer, first_binding: u32, buffers: &[RawBuffer], offsets: &[u64]) {
        self.state().record(
            cmd,
            Command::BindVertexBuffers { first_binding, buffers: buffers.to_vec(), offsets: offsets.to_vec() },
        );
    }

    fn cmd_bind_index_buffer(&self, cmd: RawCommandBuffer, buffer: RawBuffer, offset: u64, index_type: IndexType) {
        self.state().record(cmd, Command::BindIndexBuffer { buffer, offset, index_type });
    }

    fn cmd_set_viewport(&self, cmd: RawCommandBuffer, viewport: &Viewport) {
        self.state().record(cmd, Command::SetViewport(*viewport));
    }

    fn cmd_set_scissor(&self, cmd: RawCommandBuffer, scissor: &Rect2D) {
        self.state().record(cmd, Command::SetScissor(*scissor));
    }

    fn cmd_draw(&self, cmd: RawCommandBuffer, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.state().record(cmd, Command::Draw { vertex_count, instance_count, first_vertex, first_instance });
    }

    fn cmd_draw_indexed(
        &self,
        cmd: RawCommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.state().record(
            cmd,
            Command::DrawIndexed { index_count, instance_count, first_index, vertex_offset, first_instance },
        );
    }

    fn cmd_draw_indirect(&self, cmd: RawCommandBuffer, buffer: RawBuffer, offset: u64, draw_count: u32, _stride: u32) {
        self.state().record(cmd, Command::DrawIndirect { buffer, offset, draw_count });
    }

    fn cmd_dispatch(&self, cmd: RawCommandBuffer, x: u32, y: u32, z: u32) {
        self.state().record(cmd, Command::Dispatch(x, y, z));
    }

    fn cmd_dispatch_indirect(&self, cmd: RawCommandBuffer, buffer: RawBuffer, offset: u64) {
        self.state().record(cmd, Command::DispatchIndirect { buffer, offset });
    }

    fn cmd_copy_buffer(&self, cmd: RawCommandBuffer, src: RawBuffer, dst: RawBuffer, regions: &[BufferCopy]) {
        self.state().record(cmd, Command::CopyBuffer { src, dst, regions: regions.to_vec() });
    }

    fn cmd_copy_buffer_to_image(&self, cmd: RawCommandBuffer, src: RawBuffer, dst: RawImage, regions: &[BufferTextureCopy]) {
        self.state().record(cmd, Command::CopyBufferToImage { src, dst, regions: regions.to_vec() });
    }

    fn cmd_copy_image_to_buffer(&self, cmd: RawCommandBuffer, src: RawImage, dst: RawBuffer, _regions: &[BufferTextureCopy]) {
        self.state().record(cmd, Command::CopyImageToBuffer { src, dst });
    }

    fn cmd_blit_image(&self, cmd: RawCommandBuffer, src: RawImage, dst: RawImage, blit: &TextureBlit, _filter: BlitFilter) {
        self.state().record(cmd, Command::Blit { src, dst, blit: *blit });
    }

    fn cmd_clear_color_image(&self, cmd: RawCommandBuffer, image: RawImage, color: [f32; 4], _range: &SubresourceRange) {
        self.state().record(cmd, Command::ClearColor { image, color });
    }

    fn cmd_clear_depth_stencil_image(
        &self,
        cmd: RawCommandBuffer,
        image: RawImage,
        _aspects: ImageAspects,
        depth: f32,
        _stencil: u32,
        _range: &SubresourceRange,
    ) {
        self.state().record(cmd, Command::ClearDepthStencil { image, depth });
    }

    fn cmd_reset_query_pool(&self, cmd: RawCommandBuffer, pool: RawQueryPool, first: u32, count: u32) {
        self.state().record(cmd, Command::ResetQueryPool { pool, first, count });
    }

    fn cmd_write_timestamp(&self, cmd: RawCommandBuffer, _stage: PipelineStages, pool: RawQueryPool, index: u32) {
        self.state().record(cmd, Command::WriteTimestamp { pool, index });
    }

    fn cmd_begin_query(&self, cmd: RawCommandBuffer, pool: RawQueryPool, index: u32) {
        self.state().record(cmd, Command::BeginQuery { pool, index });
    }

    fn cmd_end_query(&self, cmd: RawCommandBuffer, pool: RawQueryPool, index: u32) {
        self.state().record(cmd, Command::EndQuery { pool, index });
    }

    fn create_fence(&self, signaled: bool) -> Result<RawFence> {
        let mut state = self.state();
        let fence = RawFence(state.creation()?);
        let initial = if signaled { FenceState::Signaled } else { FenceState::Unsignaled };
        state.fences.insert(fence, initial);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: RawFence) {
        self.state().fences.remove(&fence);
    }

    fn wait_for_fences(&self, fences: &[RawFence], _timeout_ns: u64) -> Result<()> {
        let mut state = self.state();
        for fence in fences {
            let slot = state.fences.get_mut(fence).expect("waiting on an unknown fence");
            assert_ne!(*slot, FenceState::Unsignaled, "waiting on a fence that was never submitted");
            *slot = FenceState::Signaled;
        }
        state.events.push(Event::WaitFences(fences.to_vec()));
        Ok(())
    }

    fn reset_fences(&self, fences: &[RawFence]) -> Result<()> {
        let mut state = self.state();
        for fence in fences {
            let slot = state.fences.get_mut(fence).expect("resetting an unknown fence");
            assert_eq!(*slot, FenceState::Signaled, "resetting a fence the GPU has not signaled");
            *slot = FenceState::Unsignaled;
        }
        state.events.push(Event::ResetFences(fences.to_vec()));
        Ok(())
    }

    fn fence_signaled(&self, fence: RawFence) -> Result<bool> {
        Ok(self.state().fences.get(&fence) == Some(&FenceState::Signaled))
    }

    fn create_semaphore(&self) -> Result<RawSemaphore> {
        Ok(RawSemaphore(self.state().creation()?))
    }

    fn destroy_semaphore(&self, _semaphore: RawSemaphore) {}

    fn queue_submit(&self, queue: QueueType, submit: &NativeSubmit<'_>) -> Result<()> {
        let mut state = self.state();
        for cmd in submit.command_buffers {
            assert!(!state.recording.contains(cmd), "submitting {:?} while it is still recording", cmd);
        }
        if !submit.fence.is_null() {
            let slot = state.fences.get_mut(&submit.fence).expect("submitting with an unknown fence");
            assert_eq!(*slot, FenceState::Unsignaled, "submitting with a fence still in use");
            *slot = FenceState::Pending;
        }
        state.events.push(Event::Submit {
            queue,
            command_buffers: submit.command_buffers.to_vec(),
            waits: submit.wait_semaphores.iter().map(|(s, _)| *s).collect(),
            signals: submit.signal_semaphores.to_vec(),
            fence: submit.fence,
        });
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        let mut state = self.state();
        for fence in state.fences.values_mut() {
            if *fence == FenceState::Pending {
                *fence = FenceState::Signaled;
            }
        }
        state.events.push(Event::WaitIdle);
        Ok(())
    }

    fn create_surface(&self, _display: RawDisplayHandle, _window: RawWindowHandle) -> Result<RawSurface> {
        Ok(RawSurface(self.state().creation()?))
    }

    fn destroy_surface(&self, surface: RawSurface) {
        self.state().destroyed(NativeObject::Surface(surface));
    }

    fn supports_present(&self, _queue: QueueType, _surface: RawSurface) -> Result<bool> {
        Ok(true)
    }

    fn create_swapchain(&self, desc: &NativeSwapchainDesc) -> Result<NativeSwapchain> {
        let mut state = self.state();
        let raw = RawSwapchain(state.creation()?);
        let count = desc.min_image_count.max(2);
        let images: Vec<RawImage> = (0..count).map(|_| RawImage(state.handle())).collect();
        state.swapchain_images = images.clone();
        state.next_image = 0;
        Ok(NativeSwapchain {
            raw,
            images,
            format: crate::gpu::types::Format::B8G8R8A8_SRGB,
            width: desc.width,
            height: desc.height,
        })
    }

    fn destroy_swapchain(&self, swapchain: RawSwapchain) {
        self.state().destroyed(NativeObject::Swapchain(swapchain));
    }

    fn acquire_next_image(&self, swapchain: RawSwapchain, signal: RawSemaphore) -> Result<AcquiredImage> {
        let mut state = self.state();
        let count = state.swapchain_images.len().max(1) as u32;
        let index = state.next_image % count;
        state.next_image += 1;
        state.events.push(Event::Acquire { swapchain, signal });
        Ok(AcquiredImage { index, status: SwapchainStatus::Optimal })
    }

    fn queue_present(
        &self,
        _queue: QueueType,
        swapchain: RawSwapchain,
        image_index: u32,
        wait: RawSemaphore,
    ) -> Result<SwapchainStatus> {
        self.state().events.push(Event::Present { swapchain, image_index, wait });
        Ok(SwapchainStatus::Optimal)
    }
}

// ============================================================================
// Test fixtures
// ============================================================================

/// Small configuration for mock devices
pub fn test_config() -> crate::config::Config {
    crate::config::Config {
        frames_in_flight: 2,
        max_workers: 4,
        frame_allocator_size: 64 * 1024,
        constant_pool_size: 64 * 1024,
        geometry_pool_size: 64 * 1024,
        dummy_vertex_buffer_size: 256,
        ..crate::config::Config::default()
    }
}

/// Device over a fresh mock driver; callers must hold `#[serial]`
pub fn mock_device() -> (Arc<MockDriver>, crate::gpu::Device) {
    mock_device_with(test_config())
}

pub fn mock_device_with(config: crate::config::Config) -> (Arc<MockDriver>, crate::gpu::Device) {
    let driver = MockDriver::new();
    let device = crate::gpu::Device::new(driver.clone(), config).expect("mock device creation");
    (driver, device)
}

pub fn shader(device: &crate::gpu::Device, stage: ShaderStage) -> crate::gpu::Shader {
    device
        .create_shader(&crate::gpu::ShaderDesc {
            stage,
            bytecode: &[0x03, 0x02, 0x23, 0x07],
            entry_point: "main",
            vertex_inputs: Some(Vec::new()),
        })
        .expect("mock shader creation")
}

/// Single RGBA8 color target, no depth
pub fn color_targets() -> crate::gpu::RenderTargetFormats {
    crate::gpu::RenderTargetFormats {
        colors: vec![crate::gpu::Format::R8G8B8A8_UNORM],
        depth: crate::gpu::Format::UNDEFINED,
        samples: crate::gpu::SampleCount::S1,
    }
}

pub fn pipeline_desc<'a>(
    vertex: &'a crate::gpu::Shader,
    pixel: &'a crate::gpu::Shader,
) -> crate::gpu::PipelineDesc<'a> {
    crate::gpu::PipelineDesc {
        vertex_shader: vertex,
        pixel_shader: Some(pixel),
        vertex_input: crate::gpu::VertexInputState::default(),
        topology: crate::gpu::PrimitiveTopology::TriangleList,
        rasterization: crate::gpu::RasterizationState::default(),
        depth_stencil: crate::gpu::DepthStencilState::default(),
        color_blend: crate::gpu::ColorBlendState::default(),
        multisample: crate::gpu::MultisampleState::default(),
        targets: color_targets(),
        argument_layouts: Vec::new(),
    }
}

/// 64x64 RGBA8 render target texture and a view over it
pub fn render_target(device: &crate::gpu::Device) -> (crate::gpu::Texture, crate::gpu::ResourceView) {
    use crate::gpu::{Format, ResourceViewDesc, TextureDesc, TextureUsage, ViewSource};
    let texture = device
        .create_texture(&TextureDesc::texture_2d(
            64,
            64,
            Format::R8G8B8A8_UNORM,
            TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED,
        ))
        .expect("mock texture creation");
    let view = device
        .create_resource_view(ViewSource::Texture(&texture), &ResourceViewDesc::default())
        .expect("mock view creation");
    (texture, view)
}
