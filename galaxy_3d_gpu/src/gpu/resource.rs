/// Resource objects: buffers, textures, views, samplers, shaders, query pools
///
/// Every resource keeps an `Arc` to the device internals. Dropping a
/// resource never frees native memory directly: the native handle is queued
/// with the current frame number and destroyed once that frame's GPU work
/// has completed.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use crate::error::{Error, Result};
use crate::gpu::device::DeviceShared;
use crate::gpu::driver::{
    ImageAspects, ImageKind, MappedPtr, NativeImageDesc, NativeImageViewDesc, NativeObject, QueryKind,
    RawBuffer, RawImage, RawImageView, RawQueryPool, RawSampler, RawShaderModule, ViewKind,
};
use crate::gpu::pipeline::CompareOp;
use crate::gpu::types::{
    BufferUsage, CpuAccess, Format, ResourceState, SampleCount, ShaderStage, SubresourceRange, TextureUsage,
};

// ============================================================================
// State tracking
// ============================================================================

/// Last state a resource was transitioned to through `resource_barrier`
///
/// Only used for debug assertions; the caller stays responsible for
/// passing correct before/after states.
#[derive(Debug, Default)]
pub(crate) struct StateTracker(AtomicU8);

impl StateTracker {
    pub fn new(state: ResourceState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> ResourceState {
        ResourceState::from_u8(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, state: ResourceState) {
        self.0.store(state as u8, Ordering::Relaxed);
    }
}

// ============================================================================
// Buffer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: u64,
    pub usage: BufferUsage,
    pub cpu_access: CpuAccess,
}

/// GPU buffer
pub struct Buffer {
    shared: Arc<DeviceShared>,
    raw: RawBuffer,
    desc: BufferDesc,
    mapped: Option<MappedPtr>,
    state: StateTracker,
}

impl Buffer {
    pub(crate) fn new(shared: Arc<DeviceShared>, desc: BufferDesc) -> Result<Self> {
        if desc.size == 0 {
            return Err(Error::InvalidResource("buffer size must be non-zero".to_string()));
        }
        let native = shared.driver().create_buffer(&crate::gpu::driver::NativeBufferDesc {
            size: desc.size,
            usage: desc.usage,
            cpu_access: desc.cpu_access,
        })?;
        if desc.cpu_access != CpuAccess::None && native.mapped.is_none() {
            shared.driver().destroy_buffer(native.raw);
            return Err(Error::BackendError("host-visible buffer came back unmapped".to_string()));
        }
        Ok(Self {
            shared,
            raw: native.raw,
            desc,
            mapped: native.mapped,
            state: StateTracker::new(ResourceState::Undefined),
        })
    }

    pub fn raw(&self) -> RawBuffer {
        self.raw
    }

    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    pub fn size(&self) -> u64 {
        self.desc.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.desc.usage
    }

    /// Last state set through a barrier
    pub fn state(&self) -> ResourceState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: ResourceState) {
        self.state.set(state);
    }

    /// Write into a `CpuAccess::Upload` buffer
    pub fn write(&self, offset: u64, data: &[u8]) {
        debug_assert_eq!(self.desc.cpu_access, CpuAccess::Upload, "write on a buffer without upload access");
        debug_assert!(offset + data.len() as u64 <= self.desc.size, "buffer write out of bounds");
        if let Some(mapped) = self.mapped {
            // SAFETY: bounds checked above, the mapping lives as long as the buffer
            unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.as_ptr().add(offset as usize), data.len());
            }
        }
    }

    /// Read from a `CpuAccess::Readback` buffer
    pub fn read(&self, offset: u64, out: &mut [u8]) {
        debug_assert_eq!(self.desc.cpu_access, CpuAccess::Readback, "read on a buffer without readback access");
        debug_assert!(offset + out.len() as u64 <= self.desc.size, "buffer read out of bounds");
        if let Some(mapped) = self.mapped {
            // SAFETY: bounds checked above
            unsafe {
                std::ptr::copy_nonoverlapping(mapped.as_ptr().add(offset as usize), out.as_mut_ptr(), out.len());
            }
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.shared.release(NativeObject::Buffer(self.raw));
    }
}

// ============================================================================
// Texture
// ============================================================================

/// Texture dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D1,
    D2,
    D3,
    /// Six layers per cube; `array_layers` counts layers, not cubes
    Cube,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub dimension: TextureDimension,
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, 1 otherwise
    pub depth: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub format: Format,
    pub samples: SampleCount,
    pub usage: TextureUsage,
}

impl TextureDesc {
    pub fn texture_1d(width: u32, format: Format, usage: TextureUsage) -> Self {
        Self {
            dimension: TextureDimension::D1,
            width,
            height: 1,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            format,
            samples: SampleCount::S1,
            usage,
        }
    }

    pub fn texture_2d(width: u32, height: u32, format: Format, usage: TextureUsage) -> Self {
        Self {
            dimension: TextureDimension::D2,
            height,
            ..Self::texture_1d(width, format, usage)
        }
    }

    pub fn texture_3d(width: u32, height: u32, depth: u32, format: Format, usage: TextureUsage) -> Self {
        Self {
            dimension: TextureDimension::D3,
            height,
            depth,
            ..Self::texture_1d(width, format, usage)
        }
    }

    pub fn cube(size: u32, format: Format, usage: TextureUsage) -> Self {
        Self {
            dimension: TextureDimension::Cube,
            height: size,
            array_layers: 6,
            ..Self::texture_1d(size, format, usage)
        }
    }

    pub fn with_mips(self, mip_levels: u32) -> Self {
        Self { mip_levels, ..self }
    }

    /// Full mip chain length for the largest dimension
    pub fn full_mip_count(&self) -> u32 {
        let largest = self.width.max(self.height).max(self.depth).max(1);
        32 - largest.leading_zeros()
    }

    /// Extent of `mip`, never below 1
    pub fn mip_extent(&self, mip: u32) -> [u32; 3] {
        [
            (self.width >> mip).max(1),
            (self.height >> mip).max(1),
            (self.depth >> mip).max(1),
        ]
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidResource(msg.to_string()));
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return invalid("texture extent must be non-zero");
        }
        if self.format == Format::UNDEFINED {
            return invalid("texture format is undefined");
        }
        if self.mip_levels == 0 || self.mip_levels > self.full_mip_count() {
            return invalid("mip level count out of range");
        }
        if self.array_layers == 0 {
            return invalid("texture needs at least one layer");
        }
        match self.dimension {
            TextureDimension::D1 if self.height != 1 || self.depth != 1 => invalid("1D texture with height/depth"),
            TextureDimension::D2 if self.depth != 1 => invalid("2D texture with depth"),
            TextureDimension::D3 if self.array_layers != 1 => invalid("3D textures cannot be arrays"),
            TextureDimension::Cube if self.width != self.height || self.array_layers % 6 != 0 => {
                invalid("cube textures need square faces and a multiple of 6 layers")
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextureKind {
    /// Owns its native image
    Owned,
    /// Presentation image; the handle changes on every acquire
    Swapchain,
}

pub(crate) struct TextureShared {
    shared: Arc<DeviceShared>,
    raw: AtomicU64,
    desc: TextureDesc,
    kind: TextureKind,
    state: StateTracker,
    /// Set on acquire: the next transition out of Present discards content
    discard_pending: AtomicBool,
}

impl Drop for TextureShared {
    fn drop(&mut self) {
        if self.kind == TextureKind::Owned {
            self.shared.release(NativeObject::Image(RawImage(*self.raw.get_mut())));
        }
    }
}

/// GPU texture (1D, 2D, 3D or cube, optionally arrayed and mipmapped)
pub struct Texture {
    inner: Arc<TextureShared>,
}

impl Texture {
    pub(crate) fn new(shared: Arc<DeviceShared>, desc: TextureDesc) -> Result<Self> {
        desc.validate()?;
        let kind = match desc.dimension {
            TextureDimension::D1 => ImageKind::D1,
            TextureDimension::D2 | TextureDimension::Cube => ImageKind::D2,
            TextureDimension::D3 => ImageKind::D3,
        };
        let raw = shared.driver().create_image(&NativeImageDesc {
            kind,
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
            mip_levels: desc.mip_levels,
            array_layers: desc.array_layers,
            format: desc.format,
            samples: desc.samples,
            usage: desc.usage,
            cube_compatible: desc.dimension == TextureDimension::Cube,
        })?;
        Ok(Self::wrap(shared, raw, desc, TextureKind::Owned))
    }

    pub(crate) fn swapchain(shared: Arc<DeviceShared>, format: Format, width: u32, height: u32) -> Self {
        let desc = TextureDesc::texture_2d(width, height, format, TextureUsage::RENDER_TARGET | TextureUsage::TRANSFER_DST);
        Self::wrap(shared, RawImage::NULL, desc, TextureKind::Swapchain)
    }

    fn wrap(shared: Arc<DeviceShared>, raw: RawImage, desc: TextureDesc, kind: TextureKind) -> Self {
        Self {
            inner: Arc::new(TextureShared {
                shared,
                raw: AtomicU64::new(raw.0),
                desc,
                kind,
                state: StateTracker::new(ResourceState::Undefined),
                discard_pending: AtomicBool::new(false),
            }),
        }
    }

    /// Current native image (changes per acquire for swapchain textures)
    pub fn raw(&self) -> RawImage {
        RawImage(self.inner.raw.load(Ordering::Acquire))
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.inner.desc
    }

    pub fn format(&self) -> Format {
        self.inner.desc.format
    }

    pub fn is_swapchain(&self) -> bool {
        self.inner.kind == TextureKind::Swapchain
    }

    pub fn state(&self) -> ResourceState {
        self.inner.state.get()
    }

    pub(crate) fn set_state(&self, state: ResourceState) {
        self.inner.state.set(state);
    }

    pub(crate) fn downgrade(&self) -> Weak<TextureShared> {
        Arc::downgrade(&self.inner)
    }

    /// Point a swapchain texture at the freshly acquired image
    pub(crate) fn swap_image(&self, image: RawImage) {
        debug_assert!(self.is_swapchain());
        self.inner.raw.store(image.0, Ordering::Release);
        self.inner.state.set(ResourceState::Present);
        self.inner.discard_pending.store(true, Ordering::Release);
    }

    /// Consume the one-time discard armed by the last acquire
    pub(crate) fn take_discard(&self) -> bool {
        self.inner.discard_pending.swap(false, Ordering::AcqRel)
    }
}

// ============================================================================
// Resource views
// ============================================================================

/// What a view looks at
#[derive(Clone, Copy)]
pub enum ViewSource<'a> {
    Texture(&'a Texture),
    Buffer(&'a Buffer),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceViewDesc {
    /// Reinterpret texels with another format (None = texture format)
    pub format: Option<Format>,
    /// Override the view type (None = derived from the texture)
    pub kind: Option<ViewKind>,
    pub range: SubresourceRange,
    /// Byte offset for buffer views
    pub buffer_offset: u64,
    /// Byte size for buffer views (0 = rest of the buffer)
    pub buffer_size: u64,
}

impl Default for ResourceViewDesc {
    fn default() -> Self {
        Self {
            format: None,
            kind: None,
            range: SubresourceRange::ALL,
            buffer_offset: 0,
            buffer_size: 0,
        }
    }
}

pub(crate) enum ViewTarget {
    Texture {
        texture: Weak<TextureShared>,
        format: Format,
        aspects: ImageAspects,
        range: SubresourceRange,
        extent: [u32; 2],
        samples: SampleCount,
    },
    Buffer {
        buffer: RawBuffer,
        offset: u64,
        size: u64,
    },
}

/// Typed/ranged window onto a texture or buffer
///
/// Holds only a weak link to its resource, and must be dropped before it.
pub struct ResourceView {
    shared: Arc<DeviceShared>,
    raw: RawImageView,
    target: ViewTarget,
}

fn default_view_kind(desc: &TextureDesc, layer_count: u32) -> ViewKind {
    match (desc.dimension, layer_count > 1) {
        (TextureDimension::D1, false) => ViewKind::D1,
        (TextureDimension::D1, true) => ViewKind::D1Array,
        (TextureDimension::D2, false) => ViewKind::D2,
        (TextureDimension::D2, true) => ViewKind::D2Array,
        (TextureDimension::D3, _) => ViewKind::D3,
        (TextureDimension::Cube, _) if layer_count > 6 => ViewKind::CubeArray,
        (TextureDimension::Cube, _) => ViewKind::Cube,
    }
}

impl ResourceView {
    pub(crate) fn new(shared: Arc<DeviceShared>, source: ViewSource<'_>, desc: &ResourceViewDesc) -> Result<Self> {
        match source {
            ViewSource::Buffer(buffer) => {
                let size = if desc.buffer_size == 0 {
                    buffer.size().saturating_sub(desc.buffer_offset)
                } else {
                    desc.buffer_size
                };
                if desc.buffer_offset + size > buffer.size() || size == 0 {
                    return Err(Error::InvalidResource("buffer view out of bounds".to_string()));
                }
                Ok(Self {
                    shared,
                    raw: RawImageView::NULL,
                    target: ViewTarget::Buffer { buffer: buffer.raw(), offset: desc.buffer_offset, size },
                })
            }
            ViewSource::Texture(texture) => {
                let tex_desc = texture.desc();
                let range = desc.range.resolve(tex_desc.mip_levels, tex_desc.array_layers);
                if range.mip_count == 0
                    || range.layer_count == 0
                    || range.base_mip + range.mip_count > tex_desc.mip_levels
                    || range.base_layer + range.layer_count > tex_desc.array_layers
                {
                    return Err(Error::InvalidResource("texture view range out of bounds".to_string()));
                }
                let format = desc.format.unwrap_or(tex_desc.format);
                let aspects = ImageAspects::from_format(format);
                let kind = desc.kind.unwrap_or_else(|| default_view_kind(tex_desc, range.layer_count));
                let raw = shared.driver().create_image_view(&NativeImageViewDesc {
                    image: texture.raw(),
                    kind,
                    format,
                    aspects,
                    range,
                })?;
                let extent = tex_desc.mip_extent(range.base_mip);
                Ok(Self {
                    shared,
                    raw,
                    target: ViewTarget::Texture {
                        texture: texture.downgrade(),
                        format,
                        aspects,
                        range,
                        extent: [extent[0], extent[1]],
                        samples: tex_desc.samples,
                    },
                })
            }
        }
    }

    /// View over one swapchain image
    pub(crate) fn for_swapchain_image(shared: Arc<DeviceShared>, texture: &Texture, image: RawImage) -> Result<Self> {
        let desc = texture.desc();
        let range = SubresourceRange::single(0, 0);
        let raw = shared.driver().create_image_view(&NativeImageViewDesc {
            image,
            kind: ViewKind::D2,
            format: desc.format,
            aspects: ImageAspects::COLOR,
            range,
        })?;
        Ok(Self {
            shared,
            raw,
            target: ViewTarget::Texture {
                texture: texture.downgrade(),
                format: desc.format,
                aspects: ImageAspects::COLOR,
                range,
                extent: [desc.width, desc.height],
                samples: SampleCount::S1,
            },
        })
    }

    /// Native image view (null for buffer views)
    pub fn raw(&self) -> RawImageView {
        self.raw
    }

    pub fn is_texture_view(&self) -> bool {
        matches!(self.target, ViewTarget::Texture { .. })
    }

    /// Viewed format (`UNDEFINED` for buffer views)
    pub fn format(&self) -> Format {
        match &self.target {
            ViewTarget::Texture { format, .. } => *format,
            ViewTarget::Buffer { .. } => Format::UNDEFINED,
        }
    }

    pub fn samples(&self) -> SampleCount {
        match &self.target {
            ViewTarget::Texture { samples, .. } => *samples,
            ViewTarget::Buffer { .. } => SampleCount::S1,
        }
    }

    /// Width/height of the first viewed mip
    pub fn extent(&self) -> [u32; 2] {
        match &self.target {
            ViewTarget::Texture { extent, .. } => *extent,
            ViewTarget::Buffer { .. } => [0, 0],
        }
    }

    pub fn range(&self) -> SubresourceRange {
        match &self.target {
            ViewTarget::Texture { range, .. } => *range,
            ViewTarget::Buffer { .. } => SubresourceRange::single(0, 0),
        }
    }

    pub(crate) fn aspects(&self) -> ImageAspects {
        match &self.target {
            ViewTarget::Texture { aspects, .. } => *aspects,
            ViewTarget::Buffer { .. } => ImageAspects::empty(),
        }
    }

    /// Buffer, offset and size of a buffer view
    pub fn buffer_range(&self) -> Option<(RawBuffer, u64, u64)> {
        match &self.target {
            ViewTarget::Buffer { buffer, offset, size } => Some((*buffer, *offset, *size)),
            ViewTarget::Texture { .. } => None,
        }
    }

    /// Tracked state of the viewed texture
    pub(crate) fn texture_state(&self) -> Option<ResourceState> {
        match &self.target {
            ViewTarget::Texture { texture, .. } => texture.upgrade().map(|t| t.state.get()),
            ViewTarget::Buffer { .. } => None,
        }
    }

    pub(crate) fn set_texture_state(&self, state: ResourceState) {
        if let ViewTarget::Texture { texture, .. } = &self.target {
            if let Some(texture) = texture.upgrade() {
                texture.state.set(state);
            }
        }
    }

    /// Whether the viewed texture is still alive (buffer views always are)
    pub fn is_resource_alive(&self) -> bool {
        match &self.target {
            ViewTarget::Texture { texture, .. } => texture.strong_count() > 0,
            ViewTarget::Buffer { .. } => true,
        }
    }
}

impl Drop for ResourceView {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            self.shared.invalidate_framebuffers(self.raw);
            self.shared.release(NativeObject::ImageView(self.raw));
        }
    }
}

// ============================================================================
// Sampler
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BorderColor {
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
}

/// Sampler description, compared and hashed with float fields bitwise
#[derive(Debug, Clone, Copy)]
pub struct SamplerDesc {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mip_filter: Filter,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub mip_lod_bias: f32,
    /// None = anisotropic filtering off
    pub max_anisotropy: Option<f32>,
    /// Some = comparison sampler (shadow maps)
    pub compare: Option<CompareOp>,
    pub min_lod: f32,
    pub max_lod: f32,
    pub border_color: BorderColor,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            mip_filter: Filter::Linear,
            address_u: AddressMode::Repeat,
            address_v: AddressMode::Repeat,
            address_w: AddressMode::Repeat,
            mip_lod_bias: 0.0,
            max_anisotropy: None,
            compare: None,
            min_lod: 0.0,
            max_lod: 1000.0,
            border_color: BorderColor::OpaqueBlack,
        }
    }
}

impl SamplerDesc {
    pub fn nearest_clamp() -> Self {
        Self {
            min_filter: Filter::Nearest,
            mag_filter: Filter::Nearest,
            mip_filter: Filter::Nearest,
            address_u: AddressMode::ClampToEdge,
            address_v: AddressMode::ClampToEdge,
            address_w: AddressMode::ClampToEdge,
            ..Self::default()
        }
    }

    pub fn shadow() -> Self {
        Self {
            address_u: AddressMode::ClampToBorder,
            address_v: AddressMode::ClampToBorder,
            address_w: AddressMode::ClampToBorder,
            compare: Some(CompareOp::LessOrEqual),
            border_color: BorderColor::OpaqueWhite,
            ..Self::default()
        }
    }

    fn float_bits(&self) -> [u32; 4] {
        [
            self.mip_lod_bias.to_bits(),
            self.max_anisotropy.map_or(0, f32::to_bits),
            self.min_lod.to_bits(),
            self.max_lod.to_bits(),
        ]
    }

    fn discrete(&self) -> impl PartialEq + std::hash::Hash {
        (
            self.min_filter,
            self.mag_filter,
            self.mip_filter,
            self.address_u,
            self.address_v,
            self.address_w,
            self.max_anisotropy.is_some(),
            self.compare,
            self.border_color,
        )
    }
}

impl PartialEq for SamplerDesc {
    fn eq(&self, other: &Self) -> bool {
        self.float_bits() == other.float_bits() && self.discrete() == other.discrete()
    }
}

impl Eq for SamplerDesc {}

impl std::hash::Hash for SamplerDesc {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.float_bits().hash(state);
        self.discrete().hash(state);
    }
}

/// Cached sampler; lives as long as the device
#[derive(Debug)]
pub struct Sampler {
    raw: RawSampler,
    desc: SamplerDesc,
}

impl Sampler {
    pub(crate) fn new(raw: RawSampler, desc: SamplerDesc) -> Self {
        Self { raw, desc }
    }

    pub fn raw(&self) -> RawSampler {
        self.raw
    }

    pub fn desc(&self) -> &SamplerDesc {
        &self.desc
    }
}

// ============================================================================
// Shader
// ============================================================================

/// Vertex input semantic, as emitted by the shader compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexSemantic {
    Position,
    Normal,
    Tangent,
    Binormal,
    Color,
    TexCoord,
    BlendIndices,
    BlendWeights,
    InstanceData,
}

impl VertexSemantic {
    /// Parse `"TEXCOORD1"` style names into semantic and index
    ///
    /// Accepts the `in.var.` prefix DXC puts on SPIR-V input names.
    pub fn parse(name: &str) -> Option<(VertexSemantic, u32)> {
        let name = name.strip_prefix("in.var.").unwrap_or(name);
        let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        let (base, index) = name.split_at(name.len() - digits);
        let index = if index.is_empty() { 0 } else { index.parse().ok()? };
        let semantic = match base.to_ascii_uppercase().as_str() {
            "POSITION" | "POS" => VertexSemantic::Position,
            "NORMAL" => VertexSemantic::Normal,
            "TANGENT" => VertexSemantic::Tangent,
            "BINORMAL" | "BITANGENT" => VertexSemantic::Binormal,
            "COLOR" => VertexSemantic::Color,
            "TEXCOORD" | "UV" => VertexSemantic::TexCoord,
            "BLENDINDICES" => VertexSemantic::BlendIndices,
            "BLENDWEIGHT" | "BLENDWEIGHTS" => VertexSemantic::BlendWeights,
            "INSTANCEDATA" => VertexSemantic::InstanceData,
            _ => return None,
        };
        Some((semantic, index))
    }
}

/// A vertex shader input: location plus the semantic it was declared with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderVertexInput {
    pub location: u32,
    pub semantic: VertexSemantic,
    pub semantic_index: u32,
    /// Declared type, used when the input falls back to the dummy buffer
    pub format: Format,
}

/// Process-unique shader identity, used in pipeline keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub u64);

#[derive(Debug, Clone)]
pub struct ShaderDesc<'a> {
    pub stage: ShaderStage,
    /// Compiled intermediate bytecode
    pub bytecode: &'a [u8],
    pub entry_point: &'a str,
    /// Reflected vertex inputs from the compiler; None lets the backend reflect
    pub vertex_inputs: Option<Vec<ShaderVertexInput>>,
}

/// Compiled shader module
///
/// Pipelines built from this shader are evicted from the cache once all
/// of their shaders are dropped.
pub struct Shader {
    shared: Arc<DeviceShared>,
    id: ShaderId,
    module: RawShaderModule,
    stage: ShaderStage,
    entry_point: String,
    vertex_inputs: Vec<ShaderVertexInput>,
}

impl Shader {
    pub(crate) fn new(shared: Arc<DeviceShared>, desc: &ShaderDesc<'_>) -> Result<Self> {
        if desc.bytecode.is_empty() {
            return Err(Error::InvalidResource("empty shader bytecode".to_string()));
        }
        if desc.entry_point.is_empty() {
            return Err(Error::InvalidResource("shader entry point is empty".to_string()));
        }
        let native = shared.driver().create_shader_module(desc.stage, desc.bytecode)?;
        let vertex_inputs = match (&desc.vertex_inputs, desc.stage) {
            (Some(inputs), ShaderStage::Vertex) => inputs.clone(),
            (None, ShaderStage::Vertex) => native.reflected_inputs,
            _ => Vec::new(),
        };
        Ok(Self {
            id: shared.next_shader_id(),
            shared,
            module: native.module,
            stage: desc.stage,
            entry_point: desc.entry_point.to_string(),
            vertex_inputs,
        })
    }

    pub fn id(&self) -> ShaderId {
        self.id
    }

    pub fn module(&self) -> RawShaderModule {
        self.module
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn vertex_inputs(&self) -> &[ShaderVertexInput] {
        &self.vertex_inputs
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        self.shared.shader_destroyed(self.id);
        self.shared.release(NativeObject::ShaderModule(self.module));
    }
}

// ============================================================================
// Query pool
// ============================================================================

/// Timestamp or occlusion query pool
pub struct QueryPool {
    shared: Arc<DeviceShared>,
    raw: RawQueryPool,
    kind: QueryKind,
    count: u32,
}

impl QueryPool {
    pub(crate) fn new(shared: Arc<DeviceShared>, kind: QueryKind, count: u32) -> Result<Self> {
        if count == 0 {
            return Err(Error::InvalidResource("query pool needs at least one query".to_string()));
        }
        let raw = shared.driver().create_query_pool(kind, count)?;
        Ok(Self { shared, raw, kind, count })
    }

    pub fn raw(&self) -> RawQueryPool {
        self.raw
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Read back results starting at `first`; false when some are not ready
    pub fn results(&self, first: u32, out: &mut [u64]) -> Result<bool> {
        debug_assert!(first as usize + out.len() <= self.count as usize, "query range out of bounds");
        self.shared.driver().query_results(self.raw, first, out)
    }

    /// Convert two timestamp results into milliseconds
    pub fn elapsed_ms(&self, begin: u64, end: u64) -> f64 {
        debug_assert_eq!(self.kind, QueryKind::Timestamp);
        let period = self.shared.driver().properties().timestamp_period as f64;
        end.saturating_sub(begin) as f64 * period / 1_000_000.0
    }
}

impl Drop for QueryPool {
    fn drop(&mut self) {
        self.shared.release(NativeObject::QueryPool(self.raw));
    }
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;
