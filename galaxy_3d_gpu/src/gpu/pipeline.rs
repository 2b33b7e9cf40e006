/// Pipeline descriptors, fixed-function state and cached pipeline objects

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::gpu::argument_set::ArgumentSetLayout;
use crate::gpu::driver::{
    NativeVertexAttribute, NativeVertexBinding, PipelineBindPoint, RawDescriptorSetLayout, RawPipeline,
    RawPipelineLayout,
};
use crate::gpu::resource::{Shader, ShaderId, ShaderVertexInput, VertexSemantic};
use crate::gpu::types::{Format, SampleCount};

/// Vertex buffer slots available to callers
pub const MAX_VERTEX_BUFFERS: usize = 15;

/// Binding slot that receives the zero-filled dummy vertex buffer
pub const DUMMY_VERTEX_BINDING: u32 = MAX_VERTEX_BUFFERS as u32;

/// Simultaneous color attachments
pub const MAX_RENDER_TARGETS: usize = 8;

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
    LineList,
    LineStrip,
    PointList,
}

/// Vertex input rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexInputRate {
    /// Data is per-vertex
    Vertex,
    /// Data is per-instance
    Instance,
}

// ===== VERTEX INPUT STATE =====

/// One attribute inside a bound vertex buffer, matched to shader inputs by semantic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub semantic: VertexSemantic,
    pub semantic_index: u32,
    pub binding: u32,
    pub format: Format,
    /// Offset in bytes from the start of the element
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub binding: u32,
    /// Stride in bytes between consecutive elements
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

/// Vertex buffer layout a pipeline consumes
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexInputState {
    pub bindings: Vec<VertexBinding>,
    pub attributes: Vec<VertexAttribute>,
}

/// Native vertex input after matching against a vertex shader
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedVertexInput {
    pub bindings: Vec<NativeVertexBinding>,
    pub attributes: Vec<NativeVertexAttribute>,
    /// Shader inputs no attribute provides, fed from the dummy buffer
    pub missing: Vec<ShaderVertexInput>,
}

impl ResolvedVertexInput {
    pub fn uses_dummy_binding(&self) -> bool {
        !self.missing.is_empty()
    }
}

/// Match shader inputs (location/semantic/index) against a vertex input state
///
/// Attributes the shader does not read are dropped. Shader inputs with no
/// matching attribute are pointed at `DUMMY_VERTEX_BINDING` with a zero
/// stride.
pub fn resolve_vertex_input(state: &VertexInputState, inputs: &[ShaderVertexInput]) -> ResolvedVertexInput {
    let mut resolved = ResolvedVertexInput::default();

    for input in inputs {
        let attribute = state
            .attributes
            .iter()
            .find(|a| a.semantic == input.semantic && a.semantic_index == input.semantic_index);
        match attribute {
            Some(attribute) => resolved.attributes.push(NativeVertexAttribute {
                location: input.location,
                binding: attribute.binding,
                format: attribute.format,
                offset: attribute.offset,
            }),
            None => {
                resolved.attributes.push(NativeVertexAttribute {
                    location: input.location,
                    binding: DUMMY_VERTEX_BINDING,
                    format: input.format,
                    offset: 0,
                });
                resolved.missing.push(*input);
            }
        }
    }

    for binding in &state.bindings {
        if resolved.attributes.iter().any(|a| a.binding == binding.binding) {
            resolved.bindings.push(NativeVertexBinding {
                binding: binding.binding,
                stride: binding.stride,
                input_rate: binding.input_rate,
            });
        }
    }
    if resolved.uses_dummy_binding() {
        resolved.bindings.push(NativeVertexBinding {
            binding: DUMMY_VERTEX_BINDING,
            stride: 0,
            input_rate: VertexInputRate::Vertex,
        });
    }
    resolved
}

// ===== RASTERIZATION =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    Fill,
    Line,
    Point,
}

/// Depth bias parameters (compared and hashed bitwise)
#[derive(Debug, Clone, Copy)]
pub struct DepthBias {
    pub constant_factor: f32,
    pub slope_factor: f32,
    pub clamp: f32,
}

impl DepthBias {
    fn bits(&self) -> [u32; 3] {
        [self.constant_factor.to_bits(), self.slope_factor.to_bits(), self.clamp.to_bits()]
    }
}

impl PartialEq for DepthBias {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for DepthBias {}

impl Hash for DepthBias {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizationState {
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub polygon_mode: PolygonMode,
    /// None = disabled
    pub depth_bias: Option<DepthBias>,
    pub depth_clamp: bool,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            polygon_mode: PolygonMode::Fill,
            depth_bias: None,
            depth_clamp: false,
        }
    }
}

// ===== DEPTH / STENCIL =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementAndClamp,
    DecrementAndClamp,
    Invert,
    IncrementAndWrap,
    DecrementAndWrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilOpState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

impl Default for StencilOpState {
    fn default() -> Self {
        Self {
            fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            compare_op: CompareOp::Always,
            compare_mask: 0xFF,
            write_mask: 0xFF,
            reference: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: CompareOp,
    pub stencil_test_enable: bool,
    pub front: StencilOpState,
    pub back: StencilOpState,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: CompareOp::Less,
            stencil_test_enable: false,
            front: StencilOpState::default(),
            back: StencilOpState::default(),
        }
    }
}

impl DepthStencilState {
    /// Depth and stencil both off
    pub fn disabled() -> Self {
        Self {
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare_op: CompareOp::Always,
            ..Self::default()
        }
    }
}

// ===== COLOR BLEND =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    SrcAlphaSaturate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorWriteMask {
    pub r: bool,
    pub g: bool,
    pub b: bool,
    pub a: bool,
}

impl ColorWriteMask {
    pub const ALL: Self = Self { r: true, g: true, b: true, a: true };
    pub const NONE: Self = Self { r: false, g: false, b: false, a: false };
}

impl Default for ColorWriteMask {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorBlendState {
    pub blend_enable: bool,
    pub src_color_factor: BlendFactor,
    pub dst_color_factor: BlendFactor,
    pub color_blend_op: BlendOp,
    pub src_alpha_factor: BlendFactor,
    pub dst_alpha_factor: BlendFactor,
    pub alpha_blend_op: BlendOp,
    pub color_write_mask: ColorWriteMask,
}

impl Default for ColorBlendState {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color_factor: BlendFactor::One,
            dst_color_factor: BlendFactor::Zero,
            color_blend_op: BlendOp::Add,
            src_alpha_factor: BlendFactor::One,
            dst_alpha_factor: BlendFactor::Zero,
            alpha_blend_op: BlendOp::Add,
            color_write_mask: ColorWriteMask::ALL,
        }
    }
}

impl ColorBlendState {
    /// Standard "over" alpha blending
    pub fn alpha_blend() -> Self {
        Self {
            blend_enable: true,
            src_color_factor: BlendFactor::SrcAlpha,
            dst_color_factor: BlendFactor::OneMinusSrcAlpha,
            src_alpha_factor: BlendFactor::One,
            dst_alpha_factor: BlendFactor::OneMinusSrcAlpha,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MultisampleState {
    pub sample_count: SampleCount,
    pub alpha_to_coverage: bool,
}

// ===== RENDER TARGET FORMATS =====

/// Attachment formats a pipeline renders into
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RenderTargetFormats {
    pub colors: Vec<Format>,
    /// `Format::UNDEFINED` for no depth attachment
    pub depth: Format,
    pub samples: SampleCount,
}

// ===== PIPELINE DESCRIPTORS =====

/// Everything that defines a graphics pipeline
#[derive(Clone)]
pub struct PipelineDesc<'a> {
    pub vertex_shader: &'a Shader,
    pub pixel_shader: Option<&'a Shader>,
    pub vertex_input: VertexInputState,
    pub topology: PrimitiveTopology,
    pub rasterization: RasterizationState,
    pub depth_stencil: DepthStencilState,
    /// Applied to every color attachment
    pub color_blend: ColorBlendState,
    pub multisample: MultisampleState,
    pub targets: RenderTargetFormats,
    /// Argument set layouts, indexed by set number
    pub argument_layouts: Vec<Arc<ArgumentSetLayout>>,
}

/// Everything that defines a compute pipeline
#[derive(Clone)]
pub struct ComputePipelineDesc<'a> {
    pub shader: &'a Shader,
    pub argument_layouts: Vec<Arc<ArgumentSetLayout>>,
}

/// Structural cache key of a graphics pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub vertex_shader: ShaderId,
    pub pixel_shader: Option<ShaderId>,
    pub vertex_input: VertexInputState,
    pub topology: PrimitiveTopology,
    pub rasterization: RasterizationState,
    pub depth_stencil: DepthStencilState,
    pub color_blend: ColorBlendState,
    pub multisample: MultisampleState,
    pub targets: RenderTargetFormats,
    pub argument_layouts: Vec<RawDescriptorSetLayout>,
}

impl PipelineKey {
    pub fn from_desc(desc: &PipelineDesc<'_>) -> Self {
        Self {
            vertex_shader: desc.vertex_shader.id(),
            pixel_shader: desc.pixel_shader.map(Shader::id),
            vertex_input: desc.vertex_input.clone(),
            topology: desc.topology,
            rasterization: desc.rasterization,
            depth_stencil: desc.depth_stencil,
            color_blend: desc.color_blend,
            multisample: desc.multisample,
            targets: desc.targets.clone(),
            argument_layouts: desc.argument_layouts.iter().map(|l| l.raw()).collect(),
        }
    }

    pub fn shaders(&self) -> Vec<ShaderId> {
        std::iter::once(self.vertex_shader).chain(self.pixel_shader).collect()
    }
}

/// Structural cache key of a compute pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComputePipelineKey {
    pub shader: ShaderId,
    pub argument_layouts: Vec<RawDescriptorSetLayout>,
}

impl ComputePipelineKey {
    pub fn from_desc(desc: &ComputePipelineDesc<'_>) -> Self {
        Self {
            shader: desc.shader.id(),
            argument_layouts: desc.argument_layouts.iter().map(|l| l.raw()).collect(),
        }
    }
}

// ===== PIPELINE OBJECTS =====

/// Native pipeline plus what command lists need to bind it
#[derive(Debug)]
pub struct PipelineHandle {
    pub(crate) raw: RawPipeline,
    pub(crate) layout: RawPipelineLayout,
    pub(crate) bind_point: PipelineBindPoint,
    pub(crate) argument_set_count: u32,
    /// Dynamic offsets expected per argument set
    pub(crate) dynamic_offset_counts: Vec<u32>,
}

impl PipelineHandle {
    pub fn raw(&self) -> RawPipeline {
        self.raw
    }

    pub fn layout(&self) -> RawPipelineLayout {
        self.layout
    }

    pub fn argument_set_count(&self) -> u32 {
        self.argument_set_count
    }
}

/// Cached graphics pipeline
///
/// Shared through `Arc`. The native pipeline is destroyed once every shader
/// it was built from has been destroyed.
#[derive(Debug)]
pub struct Pipeline {
    pub(crate) handle: PipelineHandle,
    pub(crate) targets: RenderTargetFormats,
    pub(crate) uses_dummy_vertex_binding: bool,
    pub(crate) topology: PrimitiveTopology,
}

impl Pipeline {
    pub fn handle(&self) -> &PipelineHandle {
        &self.handle
    }

    pub fn targets(&self) -> &RenderTargetFormats {
        &self.targets
    }

    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    /// Some shader input is fed from the zero-filled dummy buffer
    pub fn uses_dummy_vertex_binding(&self) -> bool {
        self.uses_dummy_vertex_binding
    }
}

/// Cached compute pipeline
#[derive(Debug)]
pub struct ComputePipeline {
    pub(crate) handle: PipelineHandle,
}

impl ComputePipeline {
    pub fn handle(&self) -> &PipelineHandle {
        &self.handle
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
