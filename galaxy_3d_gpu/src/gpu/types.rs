/// Backend-agnostic enums, flags and small value types shared by the GPU layer

use bitflags::bitflags;

// ===== FORMATS =====

/// Texel and vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[allow(non_camel_case_types)]
#[repr(u32)]
pub enum Format {
    #[default]
    UNDEFINED = 0,

    // Color formats
    R8_UNORM,
    R8G8_UNORM,
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    A2B10G10R10_UNORM,
    B10G11R11_UFLOAT,
    R16G16_SFLOAT,
    R16G16B16A16_SFLOAT,

    // 32-bit formats (also vertex attributes)
    R32_UINT,
    R32_SFLOAT,
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32B32A32_SFLOAT,
    R32G32B32A32_UINT,

    // Depth/stencil formats
    D16_UNORM,
    D32_SFLOAT,
    D24_UNORM_S8_UINT,
    D32_SFLOAT_S8_UINT,

    // Block-compressed formats
    BC1_RGBA_UNORM,
    BC3_UNORM,
    BC5_UNORM,
    BC7_UNORM,
}

impl Format {
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Format::D16_UNORM | Format::D32_SFLOAT | Format::D24_UNORM_S8_UINT | Format::D32_SFLOAT_S8_UINT
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Format::D24_UNORM_S8_UINT | Format::D32_SFLOAT_S8_UINT)
    }

    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            Format::BC1_RGBA_UNORM | Format::BC3_UNORM | Format::BC5_UNORM | Format::BC7_UNORM
        )
    }

    /// Texel block edge length (4 for BC formats, 1 otherwise)
    pub fn block_extent(self) -> u32 {
        if self.is_compressed() { 4 } else { 1 }
    }

    /// Bytes per texel block (one texel for uncompressed formats)
    pub fn block_size(self) -> u32 {
        match self {
            Format::UNDEFINED => 0,
            Format::R8_UNORM => 1,
            Format::R8G8_UNORM | Format::D16_UNORM => 2,
            Format::R8G8B8A8_UNORM
            | Format::R8G8B8A8_SRGB
            | Format::B8G8R8A8_UNORM
            | Format::B8G8R8A8_SRGB
            | Format::A2B10G10R10_UNORM
            | Format::B10G11R11_UFLOAT
            | Format::R16G16_SFLOAT
            | Format::R32_UINT
            | Format::R32_SFLOAT
            | Format::D32_SFLOAT
            | Format::D24_UNORM_S8_UINT => 4,
            Format::R16G16B16A16_SFLOAT | Format::R32G32_SFLOAT | Format::D32_SFLOAT_S8_UINT => 8,
            Format::R32G32B32_SFLOAT => 12,
            Format::R32G32B32A32_SFLOAT | Format::R32G32B32A32_UINT => 16,
            Format::BC1_RGBA_UNORM => 8,
            Format::BC3_UNORM | Format::BC5_UNORM | Format::BC7_UNORM => 16,
        }
    }

    /// Tightly packed size of a `width` x `height` region
    pub fn surface_size(self, width: u32, height: u32) -> u64 {
        let block = self.block_extent();
        let blocks_x = width.div_ceil(block) as u64;
        let blocks_y = height.div_ceil(block) as u64;
        blocks_x * blocks_y * self.block_size() as u64
    }
}

// ===== USAGE FLAGS =====

bitflags! {
    /// How a buffer may be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const CONSTANT = 1 << 2;
        /// Structured/raw buffer readable from shaders
        const SHADER_READ = 1 << 3;
        /// Structured/raw buffer writable from shaders
        const SHADER_WRITE = 1 << 4;
        const INDIRECT = 1 << 5;
        const TRANSFER_SRC = 1 << 6;
        const TRANSFER_DST = 1 << 7;
    }
}

bitflags! {
    /// How a texture may be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const SAMPLED = 1 << 0;
        const STORAGE = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const DEPTH_STENCIL = 1 << 3;
        const TRANSFER_SRC = 1 << 4;
        const TRANSFER_DST = 1 << 5;
    }
}

bitflags! {
    /// Shader stage visibility
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const PIXEL = 1 << 1;
        const COMPUTE = 1 << 2;
        const GRAPHICS = Self::VERTEX.bits() | Self::PIXEL.bits();
    }
}

/// A single shader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
    Compute,
}

impl From<ShaderStage> for ShaderStages {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => ShaderStages::VERTEX,
            ShaderStage::Pixel => ShaderStages::PIXEL,
            ShaderStage::Compute => ShaderStages::COMPUTE,
        }
    }
}

/// CPU visibility of a buffer's memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CpuAccess {
    /// Device-local, not mapped
    #[default]
    None,
    /// Persistently mapped, CPU writes / GPU reads
    Upload,
    /// Persistently mapped, GPU writes / CPU reads
    Readback,
}

/// Queue a context submits to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    Graphics,
    Compute,
    Transfer,
}

// ===== RESOURCE STATES =====

/// Usage state of a buffer or texture, the unit of `ResourceBarrier`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ResourceState {
    /// Content undefined (fresh resource or discarded)
    #[default]
    Undefined = 0,
    /// Generic state usable by any stage
    Common,
    VertexBuffer,
    IndexBuffer,
    ConstantBuffer,
    IndirectArgument,
    /// Read from any shader stage
    ShaderRead,
    /// Read and written from shaders (storage buffers/images)
    ShaderReadWrite,
    RenderTarget,
    DepthWrite,
    DepthRead,
    TransferRead,
    TransferWrite,
    /// Owned by the presentation engine
    Present,
}

impl ResourceState {
    pub const ALL: [ResourceState; 14] = [
        ResourceState::Undefined,
        ResourceState::Common,
        ResourceState::VertexBuffer,
        ResourceState::IndexBuffer,
        ResourceState::ConstantBuffer,
        ResourceState::IndirectArgument,
        ResourceState::ShaderRead,
        ResourceState::ShaderReadWrite,
        ResourceState::RenderTarget,
        ResourceState::DepthWrite,
        ResourceState::DepthRead,
        ResourceState::TransferRead,
        ResourceState::TransferWrite,
        ResourceState::Present,
    ];

    pub fn from_u8(value: u8) -> ResourceState {
        Self::ALL.get(value as usize).copied().unwrap_or(ResourceState::Undefined)
    }

    /// Whether the state implies GPU writes
    pub fn is_write(self) -> bool {
        matches!(
            self,
            ResourceState::Common
                | ResourceState::ShaderReadWrite
                | ResourceState::RenderTarget
                | ResourceState::DepthWrite
                | ResourceState::TransferWrite
        )
    }
}

// ===== PASS / DRAW PARAMETERS =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StoreOp {
    Store,
    DontCare,
}

/// Clear value of one attachment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

/// Multisample count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleCount {
    #[default]
    S1,
    S2,
    S4,
    S8,
}

impl SampleCount {
    pub fn count(self) -> u32 {
        match self {
            SampleCount::S1 => 1,
            SampleCount::S2 => 2,
            SampleCount::S4 => 4,
            SampleCount::S8 => 8,
        }
    }

    pub fn from_count(count: u32) -> Option<SampleCount> {
        match count {
            1 => Some(SampleCount::S1),
            2 => Some(SampleCount::S2),
            4 => Some(SampleCount::S4),
            8 => Some(SampleCount::S8),
            _ => None,
        }
    }
}

/// Index buffer element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    /// Size in bytes of one index element
    pub fn size_bytes(self) -> u32 {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-target viewport with the [0, 1] depth range
    pub fn from_extent(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2D {
    pub fn from_extent(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }
}

/// Mip/layer window onto a texture
///
/// `mip_count`/`layer_count` of `REMAINING` extend to the end of the texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubresourceRange {
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl SubresourceRange {
    pub const REMAINING: u32 = u32::MAX;

    pub const ALL: SubresourceRange = SubresourceRange {
        base_mip: 0,
        mip_count: Self::REMAINING,
        base_layer: 0,
        layer_count: Self::REMAINING,
    };

    pub fn single(mip: u32, layer: u32) -> Self {
        Self { base_mip: mip, mip_count: 1, base_layer: layer, layer_count: 1 }
    }

    /// Clamp `REMAINING` counts against a texture's mip and layer totals
    pub fn resolve(self, mip_levels: u32, array_layers: u32) -> Self {
        let mip_count = if self.mip_count == Self::REMAINING {
            mip_levels.saturating_sub(self.base_mip)
        } else {
            self.mip_count
        };
        let layer_count = if self.layer_count == Self::REMAINING {
            array_layers.saturating_sub(self.base_layer)
        } else {
            self.layer_count
        };
        Self { mip_count, layer_count, ..self }
    }
}

impl Default for SubresourceRange {
    fn default() -> Self {
        Self::ALL
    }
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
