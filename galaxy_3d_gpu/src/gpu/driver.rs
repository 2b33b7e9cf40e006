/// Native seam between the backend-agnostic GPU layer and a graphics API
///
/// Everything above this trait (caches, pools, frame slots, contexts,
/// command lists, barrier translation) is shared by all backends. A backend
/// implements [`Driver`] and hands native objects back as typed 64-bit raw
/// handles. A handle value of 0 is the null handle.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ptr::NonNull;

use crate::error::Result;
use crate::gpu::pipeline::{
    ColorBlendState, DepthStencilState, MultisampleState, PrimitiveTopology, RasterizationState,
    VertexInputRate,
};
use crate::gpu::resource::{SamplerDesc, ShaderVertexInput};
use crate::gpu::types::{
    BufferUsage, ClearValue, CpuAccess, Format, IndexType, LoadOp, QueueType, Rect2D, SampleCount,
    ShaderStage, ShaderStages, StoreOp, SubresourceRange, TextureUsage, Viewport,
};

// ===== RAW HANDLES =====

macro_rules! raw_handle {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[repr(transparent)]
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Pod, Zeroable)]
            pub struct $name(pub u64);

            impl $name {
                pub const NULL: Self = Self(0);

                pub fn is_null(self) -> bool {
                    self.0 == 0
                }
            }
        )*
    };
}

raw_handle! {
    RawBuffer;
    RawImage;
    RawImageView;
    RawSampler;
    RawShaderModule;
    RawDescriptorSetLayout;
    RawDescriptorSet;
    RawPipelineLayout;
    RawPipeline;
    RawRenderPass;
    RawFramebuffer;
    RawCommandPool;
    RawCommandBuffer;
    RawFence;
    RawSemaphore;
    RawQueryPool;
    RawSurface;
    RawSwapchain;
}

/// Persistently mapped pointer of a host-visible buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedPtr(NonNull<u8>);

// The mapping stays valid for the buffer's lifetime; writers only touch
// disjoint ranges handed out by the transient pools.
unsafe impl Send for MappedPtr {}
unsafe impl Sync for MappedPtr {}

impl MappedPtr {
    pub fn new(ptr: *mut u8) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr()
    }

    /// Pointer `offset` bytes past the mapping start
    ///
    /// # Safety
    /// `offset` must stay inside the mapped buffer.
    pub unsafe fn add(self, offset: usize) -> MappedPtr {
        MappedPtr(NonNull::new_unchecked(self.0.as_ptr().add(offset)))
    }
}

// ===== SYNCHRONIZATION VOCABULARY =====

bitflags! {
    /// Native pipeline stages (Vulkan stage bits)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineStages: u32 {
        const TOP_OF_PIPE = 0x0000_0001;
        const DRAW_INDIRECT = 0x0000_0002;
        const VERTEX_INPUT = 0x0000_0004;
        const VERTEX_SHADER = 0x0000_0008;
        const FRAGMENT_SHADER = 0x0000_0080;
        const EARLY_FRAGMENT_TESTS = 0x0000_0100;
        const LATE_FRAGMENT_TESTS = 0x0000_0200;
        const COLOR_ATTACHMENT_OUTPUT = 0x0000_0400;
        const COMPUTE_SHADER = 0x0000_0800;
        const TRANSFER = 0x0000_1000;
        const BOTTOM_OF_PIPE = 0x0000_2000;
        const HOST = 0x0000_4000;
        const ALL_GRAPHICS = 0x0000_8000;
        const ALL_COMMANDS = 0x0001_0000;
    }
}

bitflags! {
    /// Native memory access flags (Vulkan access bits)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessFlags: u32 {
        const INDIRECT_COMMAND_READ = 0x0000_0001;
        const INDEX_READ = 0x0000_0002;
        const VERTEX_ATTRIBUTE_READ = 0x0000_0004;
        const UNIFORM_READ = 0x0000_0008;
        const INPUT_ATTACHMENT_READ = 0x0000_0010;
        const SHADER_READ = 0x0000_0020;
        const SHADER_WRITE = 0x0000_0040;
        const COLOR_ATTACHMENT_READ = 0x0000_0080;
        const COLOR_ATTACHMENT_WRITE = 0x0000_0100;
        const DEPTH_STENCIL_ATTACHMENT_READ = 0x0000_0200;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 0x0000_0400;
        const TRANSFER_READ = 0x0000_0800;
        const TRANSFER_WRITE = 0x0000_1000;
        const HOST_READ = 0x0000_2000;
        const HOST_WRITE = 0x0000_4000;
        const MEMORY_READ = 0x0000_8000;
        const MEMORY_WRITE = 0x0001_0000;

        const ALL_WRITES = Self::SHADER_WRITE.bits()
            | Self::COLOR_ATTACHMENT_WRITE.bits()
            | Self::DEPTH_STENCIL_ATTACHMENT_WRITE.bits()
            | Self::TRANSFER_WRITE.bits()
            | Self::HOST_WRITE.bits()
            | Self::MEMORY_WRITE.bits();
    }
}

bitflags! {
    /// Image aspects touched by a view, barrier or copy
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageAspects: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

impl ImageAspects {
    pub fn from_format(format: Format) -> ImageAspects {
        if format.has_stencil() {
            ImageAspects::DEPTH | ImageAspects::STENCIL
        } else if format.is_depth() {
            ImageAspects::DEPTH
        } else {
            ImageAspects::COLOR
        }
    }
}

/// Native image layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ImageLayout {
    #[default]
    Undefined,
    General,
    ColorAttachment,
    DepthStencilAttachment,
    DepthStencilReadOnly,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    PresentSrc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeMemoryBarrier {
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeBufferBarrier {
    pub buffer: RawBuffer,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeImageBarrier {
    pub image: RawImage,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub aspects: ImageAspects,
    pub range: SubresourceRange,
}

/// One merged native barrier call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeBarrierBatch {
    pub src_stages: PipelineStages,
    pub dst_stages: PipelineStages,
    pub memory: Vec<NativeMemoryBarrier>,
    pub buffers: Vec<NativeBufferBarrier>,
    pub images: Vec<NativeImageBarrier>,
}

impl NativeBarrierBatch {
    /// Number of memory/buffer/image barriers carried by the batch
    pub fn barrier_count(&self) -> usize {
        self.memory.len() + self.buffers.len() + self.images.len()
    }

    /// Nothing to synchronize at all
    pub fn is_empty(&self) -> bool {
        self.barrier_count() == 0 && (self.src_stages.is_empty() || self.dst_stages.is_empty())
    }
}

// ===== NATIVE OBJECT DESCRIPTIONS =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeBufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
    pub cpu_access: CpuAccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeBuffer {
    pub raw: RawBuffer,
    /// Set for `CpuAccess::Upload` / `Readback` buffers
    pub mapped: Option<MappedPtr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    D1,
    D2,
    D3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeImageDesc {
    pub kind: ImageKind,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub format: Format,
    pub samples: SampleCount,
    pub usage: TextureUsage,
    /// Allow cube views over groups of six layers
    pub cube_compatible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    D1,
    D1Array,
    D2,
    D2Array,
    D3,
    Cube,
    CubeArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeImageViewDesc {
    pub image: RawImage,
    pub kind: ViewKind,
    pub format: Format,
    pub aspects: ImageAspects,
    pub range: SubresourceRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeShader {
    pub module: RawShaderModule,
    /// Vertex inputs reflected from the bytecode (vertex shaders only)
    pub reflected_inputs: Vec<ShaderVertexInput>,
}

/// Descriptor types the argument layer maps onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    /// Constant buffer addressed with a dynamic offset
    DynamicConstantBuffer,
    ReadOnlyBuffer,
    ReadWriteBuffer,
    SampledTexture,
    StorageTexture,
    Sampler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeBindingDesc {
    pub binding: u32,
    pub kind: DescriptorKind,
    pub stages: ShaderStages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorWrite {
    Buffer {
        binding: u32,
        kind: DescriptorKind,
        buffer: RawBuffer,
        offset: u64,
        range: u64,
    },
    Image {
        binding: u32,
        kind: DescriptorKind,
        view: RawImageView,
        layout: ImageLayout,
    },
    Sampler {
        binding: u32,
        sampler: RawSampler,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeVertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeVertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: Format,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct NativeShaderStage<'a> {
    pub module: RawShaderModule,
    pub entry_point: &'a str,
    pub stage: ShaderStage,
}

#[derive(Debug, Clone)]
pub struct NativeGraphicsPipelineDesc<'a> {
    pub stages: &'a [NativeShaderStage<'a>],
    pub vertex_bindings: &'a [NativeVertexBinding],
    pub vertex_attributes: &'a [NativeVertexAttribute],
    pub topology: PrimitiveTopology,
    pub rasterization: &'a RasterizationState,
    pub depth_stencil: &'a DepthStencilState,
    /// One entry per color attachment
    pub color_blend: &'a [ColorBlendState],
    pub multisample: &'a MultisampleState,
    pub layout: RawPipelineLayout,
    pub render_pass: RawRenderPass,
}

#[derive(Debug, Clone, Copy)]
pub struct NativeComputePipelineDesc<'a> {
    pub stage: NativeShaderStage<'a>,
    pub layout: RawPipelineLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeAttachmentDesc {
    pub format: Format,
    pub samples: SampleCount,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub initial_layout: ImageLayout,
    pub final_layout: ImageLayout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeRenderPassDesc {
    pub colors: Vec<NativeAttachmentDesc>,
    pub depth: Option<NativeAttachmentDesc>,
}

#[derive(Debug, Clone)]
pub struct NativeFramebufferDesc<'a> {
    pub render_pass: RawRenderPass,
    pub attachments: &'a [RawImageView],
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

// ===== COMMAND RECORDING =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferLevel {
    Primary,
    Secondary,
}

/// Render pass a secondary command buffer continues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeInheritance {
    pub render_pass: RawRenderPass,
    pub framebuffer: RawFramebuffer,
}

#[derive(Debug, Clone)]
pub struct NativeRenderPassBegin<'a> {
    pub render_pass: RawRenderPass,
    pub framebuffer: RawFramebuffer,
    pub area: Rect2D,
    pub clear_values: &'a [ClearValue],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineBindPoint {
    Graphics,
    Compute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCopy {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTextureCopy {
    pub buffer_offset: u64,
    /// Row length in texels, 0 for tightly packed
    pub buffer_row_length: u32,
    pub aspects: ImageAspects,
    pub mip: u32,
    pub base_layer: u32,
    pub layer_count: u32,
    pub offset: [i32; 3],
    pub extent: [u32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBlit {
    pub aspects: ImageAspects,
    pub src_mip: u32,
    pub src_layer: u32,
    pub src_bounds: [[i32; 3]; 2],
    pub dst_mip: u32,
    pub dst_layer: u32,
    pub dst_bounds: [[i32; 3]; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlitFilter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Timestamp,
    Occlusion,
}

#[derive(Debug, Clone)]
pub struct NativeSubmit<'a> {
    pub wait_semaphores: &'a [(RawSemaphore, PipelineStages)],
    pub command_buffers: &'a [RawCommandBuffer],
    pub signal_semaphores: &'a [RawSemaphore],
    /// `RawFence::NULL` for no fence
    pub fence: RawFence,
}

// ===== PRESENTATION =====

/// Outcome of acquire/present that still produced a usable result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainStatus {
    Optimal,
    /// Surface properties changed; presentation still works
    Suboptimal,
    /// Surface changed incompatibly; recreation needed
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    pub index: u32,
    pub status: SwapchainStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeSwapchainDesc {
    pub surface: RawSurface,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub min_image_count: u32,
    pub old_swapchain: RawSwapchain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSwapchain {
    pub raw: RawSwapchain,
    pub images: Vec<RawImage>,
    pub format: Format,
    pub width: u32,
    pub height: u32,
}

// ===== DEVICE PROPERTIES =====

#[derive(Debug, Clone, PartialEq)]
pub struct DriverProperties {
    pub backend: &'static str,
    pub adapter_name: String,
    pub min_constant_buffer_offset_alignment: u64,
    pub min_storage_buffer_offset_alignment: u64,
    pub max_constant_buffer_range: u64,
    pub max_bound_argument_sets: u32,
    pub max_vertex_input_bindings: u32,
    /// Nanoseconds per timestamp tick
    pub timestamp_period: f32,
    pub dedicated_compute_queue: bool,
    pub dedicated_transfer_queue: bool,
}

// ===== DRIVER TRAIT =====

/// The native graphics API, as seen by the GPU layer
///
/// Creation calls return `Result`. Recording calls cannot fail. Submission
/// and synchronization calls return `Result` and the caller treats an
/// error as fatal.
pub trait Driver: Send + Sync {
    fn properties(&self) -> &DriverProperties;

    // ----- memory objects -----
    fn create_buffer(&self, desc: &NativeBufferDesc) -> Result<NativeBuffer>;
    fn destroy_buffer(&self, buffer: RawBuffer);
    fn create_image(&self, desc: &NativeImageDesc) -> Result<RawImage>;
    fn destroy_image(&self, image: RawImage);
    fn create_image_view(&self, desc: &NativeImageViewDesc) -> Result<RawImageView>;
    fn destroy_image_view(&self, view: RawImageView);
    fn create_sampler(&self, desc: &SamplerDesc) -> Result<RawSampler>;
    fn destroy_sampler(&self, sampler: RawSampler);

    // ----- shaders and pipelines -----
    fn create_shader_module(&self, stage: ShaderStage, bytecode: &[u8]) -> Result<NativeShader>;
    fn destroy_shader_module(&self, module: RawShaderModule);
    fn create_descriptor_set_layout(&self, bindings: &[NativeBindingDesc]) -> Result<RawDescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: RawDescriptorSetLayout);
    fn allocate_descriptor_set(&self, layout: RawDescriptorSetLayout) -> Result<RawDescriptorSet>;
    fn free_descriptor_set(&self, set: RawDescriptorSet);
    fn write_descriptor_set(&self, set: RawDescriptorSet, writes: &[DescriptorWrite]);
    fn create_pipeline_layout(&self, set_layouts: &[RawDescriptorSetLayout]) -> Result<RawPipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: RawPipelineLayout);
    fn create_graphics_pipeline(&self, desc: &NativeGraphicsPipelineDesc<'_>) -> Result<RawPipeline>;
    fn create_compute_pipeline(&self, desc: &NativeComputePipelineDesc<'_>) -> Result<RawPipeline>;
    fn destroy_pipeline(&self, pipeline: RawPipeline);
    fn create_render_pass(&self, desc: &NativeRenderPassDesc) -> Result<RawRenderPass>;
    fn destroy_render_pass(&self, render_pass: RawRenderPass);
    fn create_framebuffer(&self, desc: &NativeFramebufferDesc<'_>) -> Result<RawFramebuffer>;
    fn destroy_framebuffer(&self, framebuffer: RawFramebuffer);
    fn create_query_pool(&self, kind: QueryKind, count: u32) -> Result<RawQueryPool>;
    fn destroy_query_pool(&self, pool: RawQueryPool);
    /// Copy available results; returns false when some are not ready yet
    fn query_results(&self, pool: RawQueryPool, first: u32, results: &mut [u64]) -> Result<bool>;

    // ----- command buffers -----
    fn create_command_pool(&self, queue: QueueType) -> Result<RawCommandPool>;
    fn reset_command_pool(&self, pool: RawCommandPool) -> Result<()>;
    fn destroy_command_pool(&self, pool: RawCommandPool);
    fn allocate_command_buffer(&self, pool: RawCommandPool, level: CommandBufferLevel) -> Result<RawCommandBuffer>;
    fn begin_command_buffer(&self, cmd: RawCommandBuffer, inheritance: Option<&NativeInheritance>) -> Result<()>;
    fn end_command_buffer(&self, cmd: RawCommandBuffer) -> Result<()>;

    // ----- recording -----
    fn cmd_pipeline_barrier(&self, cmd: RawCommandBuffer, batch: &NativeBarrierBatch);
    fn cmd_begin_render_pass(&self, cmd: RawCommandBuffer, begin: &NativeRenderPassBegin<'_>);
    fn cmd_end_render_pass(&self, cmd: RawCommandBuffer);
    fn cmd_execute_commands(&self, cmd: RawCommandBuffer, secondaries: &[RawCommandBuffer]);
    fn cmd_bind_pipeline(&self, cmd: RawCommandBuffer, bind_point: PipelineBindPoint, pipeline: RawPipeline);
    fn cmd_bind_descriptor_sets(
        &self,
        cmd: RawCommandBuffer,
        bind_point: PipelineBindPoint,
        layout: RawPipelineLayout,
        first_set: u32,
        sets: &[RawDescriptorSet],
        dynamic_offsets: &[u32],
    );
    fn cmd_bind_vertex_buffers(&self, cmd: RawCommandBuffer, first_binding: u32, buffers: &[RawBuffer], offsets: &[u64]);
    fn cmd_bind_index_buffer(&self, cmd: RawCommandBuffer, buffer: RawBuffer, offset: u64, index_type: IndexType);
    fn cmd_set_viewport(&self, cmd: RawCommandBuffer, viewport: &Viewport);
    fn cmd_set_scissor(&self, cmd: RawCommandBuffer, scissor: &Rect2D);
    fn cmd_draw(&self, cmd: RawCommandBuffer, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn cmd_draw_indexed(
        &self,
        cmd: RawCommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn cmd_draw_indirect(&self, cmd: RawCommandBuffer, buffer: RawBuffer, offset: u64, draw_count: u32, stride: u32);
    fn cmd_dispatch(&self, cmd: RawCommandBuffer, x: u32, y: u32, z: u32);
    fn cmd_dispatch_indirect(&self, cmd: RawCommandBuffer, buffer: RawBuffer, offset: u64);
    fn cmd_copy_buffer(&self, cmd: RawCommandBuffer, src: RawBuffer, dst: RawBuffer, regions: &[BufferCopy]);
    fn cmd_copy_buffer_to_image(&self, cmd: RawCommandBuffer, src: RawBuffer, dst: RawImage, regions: &[BufferTextureCopy]);
    fn cmd_copy_image_to_buffer(&self, cmd: RawCommandBuffer, src: RawImage, dst: RawBuffer, regions: &[BufferTextureCopy]);
    fn cmd_blit_image(&self, cmd: RawCommandBuffer, src: RawImage, dst: RawImage, blit: &TextureBlit, filter: BlitFilter);
    fn cmd_clear_color_image(&self, cmd: RawCommandBuffer, image: RawImage, color: [f32; 4], range: &SubresourceRange);
    fn cmd_clear_depth_stencil_image(
        &self,
        cmd: RawCommandBuffer,
        image: RawImage,
        aspects: ImageAspects,
        depth: f32,
        stencil: u32,
        range: &SubresourceRange,
    );
    fn cmd_reset_query_pool(&self, cmd: RawCommandBuffer, pool: RawQueryPool, first: u32, count: u32);
    fn cmd_write_timestamp(&self, cmd: RawCommandBuffer, stage: PipelineStages, pool: RawQueryPool, index: u32);
    fn cmd_begin_query(&self, cmd: RawCommandBuffer, pool: RawQueryPool, index: u32);
    fn cmd_end_query(&self, cmd: RawCommandBuffer, pool: RawQueryPool, index: u32);

    // ----- synchronization and submission -----
    fn create_fence(&self, signaled: bool) -> Result<RawFence>;
    fn destroy_fence(&self, fence: RawFence);
    fn wait_for_fences(&self, fences: &[RawFence], timeout_ns: u64) -> Result<()>;
    fn reset_fences(&self, fences: &[RawFence]) -> Result<()>;
    fn fence_signaled(&self, fence: RawFence) -> Result<bool>;
    fn create_semaphore(&self) -> Result<RawSemaphore>;
    fn destroy_semaphore(&self, semaphore: RawSemaphore);
    fn queue_submit(&self, queue: QueueType, submit: &NativeSubmit<'_>) -> Result<()>;
    fn wait_idle(&self) -> Result<()>;

    // ----- presentation -----
    fn create_surface(&self, display: RawDisplayHandle, window: RawWindowHandle) -> Result<RawSurface>;
    fn destroy_surface(&self, surface: RawSurface);
    fn supports_present(&self, queue: QueueType, surface: RawSurface) -> Result<bool>;
    fn create_swapchain(&self, desc: &NativeSwapchainDesc) -> Result<NativeSwapchain>;
    fn destroy_swapchain(&self, swapchain: RawSwapchain);
    fn acquire_next_image(&self, swapchain: RawSwapchain, signal: RawSemaphore) -> Result<AcquiredImage>;
    fn queue_present(
        &self,
        queue: QueueType,
        swapchain: RawSwapchain,
        image_index: u32,
        wait: RawSemaphore,
    ) -> Result<SwapchainStatus>;
}

// ===== DEFERRED DESTRUCTION =====

/// A native object waiting for the GPU to stop using it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeObject {
    Buffer(RawBuffer),
    Image(RawImage),
    ImageView(RawImageView),
    Sampler(RawSampler),
    ShaderModule(RawShaderModule),
    DescriptorSetLayout(RawDescriptorSetLayout),
    DescriptorSet(RawDescriptorSet),
    PipelineLayout(RawPipelineLayout),
    Pipeline(RawPipeline),
    RenderPass(RawRenderPass),
    Framebuffer(RawFramebuffer),
    QueryPool(RawQueryPool),
    Swapchain(RawSwapchain),
    Surface(RawSurface),
}

impl NativeObject {
    pub fn destroy(self, driver: &dyn Driver) {
        match self {
            NativeObject::Buffer(raw) => driver.destroy_buffer(raw),
            NativeObject::Image(raw) => driver.destroy_image(raw),
            NativeObject::ImageView(raw) => driver.destroy_image_view(raw),
            NativeObject::Sampler(raw) => driver.destroy_sampler(raw),
            NativeObject::ShaderModule(raw) => driver.destroy_shader_module(raw),
            NativeObject::DescriptorSetLayout(raw) => driver.destroy_descriptor_set_layout(raw),
            NativeObject::DescriptorSet(raw) => driver.free_descriptor_set(raw),
            NativeObject::PipelineLayout(raw) => driver.destroy_pipeline_layout(raw),
            NativeObject::Pipeline(raw) => driver.destroy_pipeline(raw),
            NativeObject::RenderPass(raw) => driver.destroy_render_pass(raw),
            NativeObject::Framebuffer(raw) => driver.destroy_framebuffer(raw),
            NativeObject::QueryPool(raw) => driver.destroy_query_pool(raw),
            NativeObject::Swapchain(raw) => driver.destroy_swapchain(raw),
            NativeObject::Surface(raw) => driver.destroy_surface(raw),
        }
    }
}
