//! GPU abstraction layer
//!
//! `Device` owns the backend `Driver` and everything that has to outlive a
//! single frame: caches, transient pools, frame synchronization and the
//! deferred destruction queue. Work is recorded through the transfer,
//! compute and graphics contexts and the command lists they hand out.
//!
//! Backends implement [`driver::Driver`]; nothing above that trait touches
//! a native API.

pub mod driver;

mod argument_set;
mod barrier;
mod cache;
mod command_list;
mod context;
mod device;
mod frame;
mod pipeline;
mod render_pass;
mod resource;
mod swapchain;
mod sync;
mod transient_pool;
mod types;
mod worker;

#[cfg(test)]
pub(crate) mod mock_driver;

pub use argument_set::{
    Argument, ArgumentDesc, ArgumentKind, ArgumentSet, ArgumentSetLayout, ArgumentSetLayoutDesc,
    MAX_ARGUMENTS_PER_SET, MAX_ARGUMENT_SETS,
};
pub use barrier::{state_info, BarrierResource, ResourceBarrier, StateInfo};
pub use command_list::{CommandList, ComputeCommandList, GraphicsCommandList};
pub use context::{ComputeContext, GraphicsContext, TransferContext};
pub use device::{CacheStats, Device};
pub use driver::{BlitFilter, DriverProperties, QueryKind, SwapchainStatus};
pub use pipeline::{
    BlendFactor, BlendOp, ColorBlendState, ColorWriteMask, CompareOp, ComputePipeline, ComputePipelineDesc,
    CullMode, DepthBias, DepthStencilState, FrontFace, MultisampleState, Pipeline, PipelineDesc, PipelineHandle,
    PolygonMode, PrimitiveTopology, RasterizationState, RenderTargetFormats, StencilOp, StencilOpState,
    VertexAttribute, VertexBinding, VertexInputRate, VertexInputState, DUMMY_VERTEX_BINDING, MAX_RENDER_TARGETS,
    MAX_VERTEX_BUFFERS,
};
pub use render_pass::{ColorTarget, DepthTarget, RenderPassDesc};
pub use resource::{
    AddressMode, BorderColor, Buffer, BufferDesc, Filter, QueryPool, ResourceView, ResourceViewDesc, Sampler,
    SamplerDesc, Shader, ShaderDesc, ShaderId, ShaderVertexInput, Texture, TextureDesc, TextureDimension,
    VertexSemantic, ViewSource,
};
pub use swapchain::{Swapchain, SwapchainDesc};
pub use transient_pool::{StagingAllocation, StagingPool, TransientAllocation, TransientPool};
pub use types::{
    BufferUsage, ClearValue, CpuAccess, Format, IndexType, LoadOp, QueueType, Rect2D, ResourceState, SampleCount,
    ShaderStage, ShaderStages, StoreOp, SubresourceRange, TextureUsage, Viewport,
};
pub use worker::{WorkCounter, WorkerSlot};
