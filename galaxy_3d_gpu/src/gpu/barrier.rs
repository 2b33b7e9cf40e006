/// Translation of resource state transitions into native barriers
///
/// Every transition of one `resource_barrier` call ends up in a single
/// `NativeBarrierBatch`. Transitions that neither publish writes nor change
/// an image layout only contribute pipeline stages (an execution
/// dependency) and no memory barrier. A transition to the same state emits
/// no memory barrier; for writable states it still adds an execution
/// dependency so back-to-back writers stay ordered.

use crate::gpu::driver::{
    AccessFlags, ImageAspects, ImageLayout, NativeBarrierBatch, NativeBufferBarrier, NativeImageBarrier, PipelineStages,
    RawBuffer, RawImage,
};
use crate::gpu::resource::{Buffer, Texture};
use crate::gpu::types::{ResourceState, SubresourceRange};

/// Native synchronization scope of a resource state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateInfo {
    pub stages: PipelineStages,
    pub access: AccessFlags,
    /// Layout images must be in (ignored for buffers)
    pub layout: ImageLayout,
}

/// Map a resource state to the stages, accesses and layout it implies
pub fn state_info(state: ResourceState) -> StateInfo {
    let (stages, access, layout) = match state {
        ResourceState::Undefined => (PipelineStages::TOP_OF_PIPE, AccessFlags::empty(), ImageLayout::Undefined),
        ResourceState::Common => (
            PipelineStages::ALL_COMMANDS,
            AccessFlags::MEMORY_READ | AccessFlags::MEMORY_WRITE,
            ImageLayout::General,
        ),
        ResourceState::VertexBuffer => (
            PipelineStages::VERTEX_INPUT,
            AccessFlags::VERTEX_ATTRIBUTE_READ,
            ImageLayout::Undefined,
        ),
        ResourceState::IndexBuffer => (PipelineStages::VERTEX_INPUT, AccessFlags::INDEX_READ, ImageLayout::Undefined),
        ResourceState::ConstantBuffer => (
            PipelineStages::VERTEX_SHADER | PipelineStages::FRAGMENT_SHADER | PipelineStages::COMPUTE_SHADER,
            AccessFlags::UNIFORM_READ,
            ImageLayout::Undefined,
        ),
        ResourceState::IndirectArgument => (
            PipelineStages::DRAW_INDIRECT,
            AccessFlags::INDIRECT_COMMAND_READ,
            ImageLayout::Undefined,
        ),
        ResourceState::ShaderRead => (
            PipelineStages::VERTEX_SHADER | PipelineStages::FRAGMENT_SHADER | PipelineStages::COMPUTE_SHADER,
            AccessFlags::SHADER_READ,
            ImageLayout::ShaderReadOnly,
        ),
        ResourceState::ShaderReadWrite => (
            PipelineStages::VERTEX_SHADER | PipelineStages::FRAGMENT_SHADER | PipelineStages::COMPUTE_SHADER,
            AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE,
            ImageLayout::General,
        ),
        ResourceState::RenderTarget => (
            PipelineStages::COLOR_ATTACHMENT_OUTPUT,
            AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::COLOR_ATTACHMENT_WRITE,
            ImageLayout::ColorAttachment,
        ),
        ResourceState::DepthWrite => (
            PipelineStages::EARLY_FRAGMENT_TESTS | PipelineStages::LATE_FRAGMENT_TESTS,
            AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ImageLayout::DepthStencilAttachment,
        ),
        ResourceState::DepthRead => (
            PipelineStages::EARLY_FRAGMENT_TESTS
                | PipelineStages::LATE_FRAGMENT_TESTS
                | PipelineStages::FRAGMENT_SHADER
                | PipelineStages::COMPUTE_SHADER,
            AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | AccessFlags::SHADER_READ,
            ImageLayout::DepthStencilReadOnly,
        ),
        ResourceState::TransferRead => (PipelineStages::TRANSFER, AccessFlags::TRANSFER_READ, ImageLayout::TransferSrc),
        ResourceState::TransferWrite => (PipelineStages::TRANSFER, AccessFlags::TRANSFER_WRITE, ImageLayout::TransferDst),
        ResourceState::Present => (PipelineStages::BOTTOM_OF_PIPE, AccessFlags::empty(), ImageLayout::PresentSrc),
    };
    StateInfo { stages, access, layout }
}

/// Resource a barrier applies to
#[derive(Clone, Copy)]
pub enum BarrierResource<'a> {
    Buffer(&'a Buffer),
    Texture { texture: &'a Texture, range: SubresourceRange },
}

/// One state transition
#[derive(Clone, Copy)]
pub struct ResourceBarrier<'a> {
    pub resource: BarrierResource<'a>,
    pub before: ResourceState,
    pub after: ResourceState,
    /// Previous content may be thrown away (old layout becomes undefined)
    pub discard: bool,
}

impl<'a> ResourceBarrier<'a> {
    pub fn buffer(buffer: &'a Buffer, before: ResourceState, after: ResourceState) -> Self {
        Self { resource: BarrierResource::Buffer(buffer), before, after, discard: false }
    }

    /// Transition every mip and layer of a texture
    pub fn texture(texture: &'a Texture, before: ResourceState, after: ResourceState) -> Self {
        Self::texture_range(texture, SubresourceRange::ALL, before, after)
    }

    pub fn texture_range(texture: &'a Texture, range: SubresourceRange, before: ResourceState, after: ResourceState) -> Self {
        Self {
            resource: BarrierResource::Texture { texture, range },
            before,
            after,
            discard: false,
        }
    }

    pub fn with_discard(self) -> Self {
        Self { discard: true, ..self }
    }

    /// Resolve against the live resource, updating its tracked state
    pub(crate) fn target(&self) -> BarrierTarget {
        match self.resource {
            BarrierResource::Buffer(buffer) => {
                debug_assert!(
                    self.before == ResourceState::Undefined || buffer.state() == self.before,
                    "buffer barrier from {:?} but buffer was last moved to {:?}",
                    self.before,
                    buffer.state()
                );
                buffer.set_state(self.after);
                BarrierTarget {
                    kind: TargetKind::Buffer { buffer: buffer.raw(), size: buffer.size() },
                    before: self.before,
                    after: self.after,
                    discard: self.discard,
                }
            }
            BarrierResource::Texture { texture, range } => {
                debug_assert!(
                    self.before == ResourceState::Undefined || texture.state() == self.before,
                    "texture barrier from {:?} but texture was last moved to {:?}",
                    self.before,
                    texture.state()
                );
                // First transition out of Present after an acquire discards
                let discard = self.discard
                    || (texture.is_swapchain() && self.before == ResourceState::Present && texture.take_discard());
                texture.set_state(self.after);
                let desc = texture.desc();
                BarrierTarget {
                    kind: TargetKind::Image {
                        image: texture.raw(),
                        aspects: ImageAspects::from_format(desc.format),
                        range: range.resolve(desc.mip_levels, desc.array_layers),
                    },
                    before: self.before,
                    after: self.after,
                    discard,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TargetKind {
    Buffer { buffer: RawBuffer, size: u64 },
    Image { image: RawImage, aspects: ImageAspects, range: SubresourceRange },
}

/// Barrier resolved to native handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BarrierTarget {
    pub kind: TargetKind,
    pub before: ResourceState,
    pub after: ResourceState,
    pub discard: bool,
}

/// Merge transitions into one native barrier batch
pub(crate) fn build_barrier_batch(targets: &[BarrierTarget]) -> NativeBarrierBatch {
    let mut batch = NativeBarrierBatch::default();

    for target in targets {
        let src = state_info(target.before);
        let dst = state_info(target.after);
        // Same state, same layout: no memory barrier, but writable states
        // still order the writes on either side
        if target.before == target.after && !target.discard {
            if src.access.intersects(AccessFlags::ALL_WRITES) {
                batch.src_stages |= src.stages;
                batch.dst_stages |= dst.stages;
            }
            continue;
        }
        batch.src_stages |= src.stages;
        batch.dst_stages |= dst.stages;

        let src_access = src.access & AccessFlags::ALL_WRITES;

        match target.kind {
            TargetKind::Buffer { buffer, size } => {
                if src_access.is_empty() {
                    continue;
                }
                batch.buffers.push(NativeBufferBarrier {
                    buffer,
                    src_access,
                    dst_access: dst.access,
                    offset: 0,
                    size,
                });
            }
            TargetKind::Image { image, aspects, range } => {
                let old_layout = if target.discard { ImageLayout::Undefined } else { src.layout };
                let new_layout = dst.layout;
                if src_access.is_empty() && old_layout == new_layout {
                    continue;
                }
                batch.images.push(NativeImageBarrier {
                    image,
                    src_access,
                    dst_access: dst.access,
                    old_layout,
                    new_layout,
                    aspects,
                    range,
                });
            }
        }
    }

    if batch.src_stages.is_empty() && batch.dst_stages.is_empty() {
        return batch;
    }
    if batch.src_stages.is_empty() {
        batch.src_stages = PipelineStages::TOP_OF_PIPE;
    }
    if batch.dst_stages.is_empty() {
        batch.dst_stages = PipelineStages::BOTTOM_OF_PIPE;
    }
    batch
}

#[cfg(test)]
#[path = "barrier_tests.rs"]
mod tests;
