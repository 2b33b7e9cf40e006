/// Argument set layouts and argument sets (descriptor set layouts and sets)
///
/// A layout is a fixed array of binding slots; the slot index is the
/// binding number. Constant arguments are bound as dynamic constant
/// buffers over the device constant pool: their data is copied into the
/// pool when the set is created and addressed through a dynamic offset.
///
/// A layout whose slots are all constants owns one native set, written
/// once against the pool buffer and shared by every argument set built
/// from it. Other layouts allocate a native set per argument set.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::gpu::device::DeviceShared;
use crate::gpu::driver::{
    DescriptorKind, DescriptorWrite, Driver, ImageLayout, NativeBindingDesc, NativeObject, RawBuffer,
    RawDescriptorSet, RawDescriptorSetLayout,
};
use crate::gpu::resource::{Buffer, ResourceView, Sampler};
use crate::gpu::transient_pool::TransientPool;
use crate::gpu::types::ShaderStages;

/// Binding slots per argument set
pub const MAX_ARGUMENTS_PER_SET: usize = 16;

/// Argument sets bound at once
pub const MAX_ARGUMENT_SETS: usize = 4;

/// Type of one binding slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentKind {
    /// Inline constant data of at most `size` bytes
    Constants { size: u32 },
    /// Read-only structured/byte buffer
    Buffer,
    /// Read-write buffer
    RwBuffer,
    /// Sampled texture view
    Texture,
    /// Storage texture view
    RwTexture,
    Sampler,
}

impl ArgumentKind {
    fn descriptor_kind(self) -> DescriptorKind {
        match self {
            ArgumentKind::Constants { .. } => DescriptorKind::DynamicConstantBuffer,
            ArgumentKind::Buffer => DescriptorKind::ReadOnlyBuffer,
            ArgumentKind::RwBuffer => DescriptorKind::ReadWriteBuffer,
            ArgumentKind::Texture => DescriptorKind::SampledTexture,
            ArgumentKind::RwTexture => DescriptorKind::StorageTexture,
            ArgumentKind::Sampler => DescriptorKind::Sampler,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgumentDesc {
    pub kind: ArgumentKind,
    pub stages: ShaderStages,
}

impl ArgumentDesc {
    pub fn new(kind: ArgumentKind, stages: ShaderStages) -> Self {
        Self { kind, stages }
    }

    pub fn constants(size: u32, stages: ShaderStages) -> Self {
        Self::new(ArgumentKind::Constants { size }, stages)
    }
}

/// Structural description of a layout; also its cache key
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ArgumentSetLayoutDesc {
    pub arguments: Vec<ArgumentDesc>,
}

impl ArgumentSetLayoutDesc {
    pub fn new(arguments: Vec<ArgumentDesc>) -> Self {
        Self { arguments }
    }

    pub fn is_constant_only(&self) -> bool {
        !self.arguments.is_empty()
            && self.arguments.iter().all(|a| matches!(a.kind, ArgumentKind::Constants { .. }))
    }

    pub fn dynamic_offset_count(&self) -> u32 {
        self.arguments
            .iter()
            .filter(|a| matches!(a.kind, ArgumentKind::Constants { .. }))
            .count() as u32
    }

    fn validate(&self, max_constant_range: u64) -> Result<()> {
        if self.arguments.is_empty() || self.arguments.len() > MAX_ARGUMENTS_PER_SET {
            return Err(Error::InvalidResource(format!(
                "argument set layouts need 1..={} arguments, got {}",
                MAX_ARGUMENTS_PER_SET,
                self.arguments.len()
            )));
        }
        for (slot, argument) in self.arguments.iter().enumerate() {
            if argument.stages.is_empty() {
                return Err(Error::InvalidResource(format!("argument {} is visible to no stage", slot)));
            }
            if let ArgumentKind::Constants { size } = argument.kind {
                if size == 0 || size as u64 > max_constant_range {
                    return Err(Error::InvalidResource(format!(
                        "constant argument {} has size {} (limit {})",
                        slot, size, max_constant_range
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Cached argument set layout; lives as long as the device
#[derive(Debug)]
pub struct ArgumentSetLayout {
    raw: RawDescriptorSetLayout,
    desc: ArgumentSetLayoutDesc,
    /// Native set shared by all argument sets of a constant-only layout
    shared_set: Option<RawDescriptorSet>,
}

impl ArgumentSetLayout {
    pub(crate) fn new(driver: &dyn Driver, desc: &ArgumentSetLayoutDesc, constant_buffer: RawBuffer) -> Result<Self> {
        desc.validate(driver.properties().max_constant_buffer_range)?;

        let bindings: Vec<NativeBindingDesc> = desc
            .arguments
            .iter()
            .enumerate()
            .map(|(slot, argument)| NativeBindingDesc {
                binding: slot as u32,
                kind: argument.kind.descriptor_kind(),
                stages: argument.stages,
            })
            .collect();
        let raw = driver.create_descriptor_set_layout(&bindings)?;

        let shared_set = if desc.is_constant_only() {
            let set = match driver.allocate_descriptor_set(raw) {
                Ok(set) => set,
                Err(err) => {
                    driver.destroy_descriptor_set_layout(raw);
                    return Err(err);
                }
            };
            driver.write_descriptor_set(set, &constant_writes(desc, constant_buffer));
            Some(set)
        } else {
            None
        };

        Ok(Self { raw, desc: desc.clone(), shared_set })
    }

    pub fn raw(&self) -> RawDescriptorSetLayout {
        self.raw
    }

    pub fn desc(&self) -> &ArgumentSetLayoutDesc {
        &self.desc
    }

    pub fn is_constant_only(&self) -> bool {
        self.shared_set.is_some()
    }

    pub fn argument_count(&self) -> usize {
        self.desc.arguments.len()
    }

    pub fn dynamic_offset_count(&self) -> u32 {
        self.desc.dynamic_offset_count()
    }

    pub(crate) fn shared_set(&self) -> Option<RawDescriptorSet> {
        self.shared_set
    }

    /// Immediate destruction; the layout must not be in use
    pub(crate) fn destroy(&self, driver: &dyn Driver) {
        if let Some(set) = self.shared_set {
            driver.free_descriptor_set(set);
        }
        driver.destroy_descriptor_set_layout(self.raw);
    }
}

fn constant_writes(desc: &ArgumentSetLayoutDesc, constant_buffer: RawBuffer) -> Vec<DescriptorWrite> {
    desc.arguments
        .iter()
        .enumerate()
        .filter_map(|(slot, argument)| match argument.kind {
            ArgumentKind::Constants { size } => Some(DescriptorWrite::Buffer {
                binding: slot as u32,
                kind: DescriptorKind::DynamicConstantBuffer,
                buffer: constant_buffer,
                offset: 0,
                range: size as u64,
            }),
            _ => None,
        })
        .collect()
}

/// Value for one binding slot
#[derive(Clone, Copy)]
pub enum Argument<'a> {
    /// Copied into the constant pool at set creation
    Constants(&'a [u8]),
    Buffer(&'a Buffer),
    RwBuffer(&'a Buffer),
    Texture(&'a ResourceView),
    RwTexture(&'a ResourceView),
    Sampler(&'a Sampler),
}

impl<'a> Argument<'a> {
    pub fn constants<T: bytemuck::Pod>(value: &'a T) -> Self {
        Argument::Constants(bytemuck::bytes_of(value))
    }

    fn matches(&self, kind: ArgumentKind) -> bool {
        matches!(
            (self, kind),
            (Argument::Constants(_), ArgumentKind::Constants { .. })
                | (Argument::Buffer(_), ArgumentKind::Buffer)
                | (Argument::RwBuffer(_), ArgumentKind::RwBuffer)
                | (Argument::Texture(_), ArgumentKind::Texture)
                | (Argument::RwTexture(_), ArgumentKind::RwTexture)
                | (Argument::Sampler(_), ArgumentKind::Sampler)
        )
    }
}

/// Bound arguments for one draw or dispatch
///
/// Constant data lives in the current frame's constant pool section, so an
/// argument set is only valid for the frame it was created in.
pub struct ArgumentSet {
    shared: Arc<DeviceShared>,
    layout: Arc<ArgumentSetLayout>,
    raw: RawDescriptorSet,
    owns_set: bool,
    dynamic_offsets: Vec<u32>,
}

impl ArgumentSet {
    pub(crate) fn new(
        shared: Arc<DeviceShared>,
        constant_pool: &TransientPool,
        layout: &Arc<ArgumentSetLayout>,
        arguments: &[Argument<'_>],
    ) -> Result<Self> {
        debug_assert_eq!(arguments.len(), layout.argument_count(), "argument count does not match the layout");
        debug_assert!(
            arguments.iter().zip(&layout.desc.arguments).all(|(arg, desc)| arg.matches(desc.kind)),
            "argument kinds do not match the layout"
        );

        let mut dynamic_offsets = Vec::with_capacity(layout.dynamic_offset_count() as usize);
        for (argument, desc) in arguments.iter().zip(&layout.desc.arguments) {
            if let (Argument::Constants(data), ArgumentKind::Constants { size }) = (argument, desc.kind) {
                debug_assert!(data.len() <= size as usize, "constant data larger than its slot");
                let allocation = constant_pool.allocate(size as u64);
                allocation.write(data);
                // Constant pools never exceed u32::MAX bytes
                dynamic_offsets.push(allocation.offset() as u32);
            }
        }

        if let Some(set) = layout.shared_set() {
            return Ok(Self {
                shared,
                layout: Arc::clone(layout),
                raw: set,
                owns_set: false,
                dynamic_offsets,
            });
        }

        let driver = shared.driver();
        let raw = driver.allocate_descriptor_set(layout.raw())?;
        let writes: Vec<DescriptorWrite> = arguments
            .iter()
            .zip(&layout.desc.arguments)
            .enumerate()
            .filter_map(|(slot, (argument, desc))| {
                let binding = slot as u32;
                match (argument, desc.kind) {
                    (Argument::Constants(_), ArgumentKind::Constants { size }) => Some(DescriptorWrite::Buffer {
                        binding,
                        kind: DescriptorKind::DynamicConstantBuffer,
                        buffer: constant_pool.buffer(),
                        offset: 0,
                        range: size as u64,
                    }),
                    (Argument::Buffer(buffer), _) => Some(DescriptorWrite::Buffer {
                        binding,
                        kind: DescriptorKind::ReadOnlyBuffer,
                        buffer: buffer.raw(),
                        offset: 0,
                        range: buffer.size(),
                    }),
                    (Argument::RwBuffer(buffer), _) => Some(DescriptorWrite::Buffer {
                        binding,
                        kind: DescriptorKind::ReadWriteBuffer,
                        buffer: buffer.raw(),
                        offset: 0,
                        range: buffer.size(),
                    }),
                    (Argument::Texture(view), _) => Some(DescriptorWrite::Image {
                        binding,
                        kind: DescriptorKind::SampledTexture,
                        view: view.raw(),
                        layout: if view.format().is_depth() {
                            ImageLayout::DepthStencilReadOnly
                        } else {
                            ImageLayout::ShaderReadOnly
                        },
                    }),
                    (Argument::RwTexture(view), _) => Some(DescriptorWrite::Image {
                        binding,
                        kind: DescriptorKind::StorageTexture,
                        view: view.raw(),
                        layout: ImageLayout::General,
                    }),
                    (Argument::Sampler(sampler), _) => Some(DescriptorWrite::Sampler { binding, sampler: sampler.raw() }),
                    _ => None,
                }
            })
            .collect();
        driver.write_descriptor_set(raw, &writes);

        Ok(Self {
            shared,
            layout: Arc::clone(layout),
            raw,
            owns_set: true,
            dynamic_offsets,
        })
    }

    pub fn raw(&self) -> RawDescriptorSet {
        self.raw
    }

    pub fn layout(&self) -> &Arc<ArgumentSetLayout> {
        &self.layout
    }

    /// One offset per constant argument, in slot order
    pub fn dynamic_offsets(&self) -> &[u32] {
        &self.dynamic_offsets
    }

    /// Whether this set uses the layout's shared native set
    pub fn uses_shared_set(&self) -> bool {
        !self.owns_set
    }
}

impl Drop for ArgumentSet {
    fn drop(&mut self) {
        if self.owns_set {
            self.shared.release(NativeObject::DescriptorSet(self.raw));
        }
    }
}
