/// Descriptor set layouts, pools and writes
///
/// Sets come from a growing list of pools. When the newest pool is
/// exhausted a fresh one is appended, so allocation never fails for
/// capacity reasons. Each set remembers its pool so it can be freed back.

use ash::vk;
use ash::vk::Handle;
use galaxy_3d_gpu::galaxy3d::gpu::driver::{DescriptorWrite, NativeBindingDesc, RawDescriptorSet, RawDescriptorSetLayout};
use galaxy_3d_gpu::galaxy3d::{Error, Result};
use galaxy_3d_gpu::{engine_err, engine_error, engine_info, engine_warn};
use rustc_hash::FxHashMap;
use std::slice;

use crate::vulkan::{vk_error, VulkanDriver};
use crate::vulkan_format::{descriptor_type_to_vk, image_layout_to_vk, shader_stages_to_vk};

const SETS_PER_POOL: u32 = 1024;

pub(crate) struct DescriptorPools {
    pools: Vec<vk::DescriptorPool>,
    /// Pool each live set was allocated from
    owners: FxHashMap<u64, vk::DescriptorPool>,
}

impl DescriptorPools {
    pub fn new(device: &ash::Device) -> Result<Self> {
        let pool = create_descriptor_pool(device).map_err(|e| {
            engine_error!("galaxy3d::vulkan", "Failed to create descriptor pool: {:?}", e);
            Error::InitializationFailed(format!("Failed to create descriptor pool: {:?}", e))
        })?;
        Ok(Self { pools: vec![pool], owners: FxHashMap::default() })
    }

    pub fn allocate(&mut self, device: &ash::Device, layout: vk::DescriptorSetLayout) -> Result<RawDescriptorSet> {
        let layouts = [layout];
        let current_pool = self.current_pool(device)?;
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(current_pool)
            .set_layouts(&layouts);

        let (set, pool) = match unsafe { device.allocate_descriptor_sets(&allocate_info) } {
            Ok(sets) => (sets[0], current_pool),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
                let new_pool = create_descriptor_pool(device)
                    .map_err(|e| vk_error("Failed to create descriptor pool", e))?;
                self.pools.push(new_pool);
                engine_info!(
                    "galaxy3d::vulkan",
                    "Descriptor pool exhausted, created new pool (total: {})",
                    self.pools.len()
                );
                let retry_info = vk::DescriptorSetAllocateInfo::default()
                    .descriptor_pool(new_pool)
                    .set_layouts(&layouts);
                let sets = unsafe { device.allocate_descriptor_sets(&retry_info) }.map_err(|e| {
                    engine_err!("galaxy3d::vulkan", "Failed to allocate descriptor set after pool growth: {:?}", e)
                })?;
                (sets[0], new_pool)
            }
            Err(e) => return Err(vk_error("Failed to allocate descriptor set", e)),
        };

        self.owners.insert(set.as_raw(), pool);
        Ok(RawDescriptorSet(set.as_raw()))
    }

    pub fn free(&mut self, device: &ash::Device, set: RawDescriptorSet) {
        let Some(pool) = self.owners.remove(&set.0) else {
            engine_warn!("galaxy3d::vulkan", "Freeing unknown descriptor set {:#x}", set.0);
            return;
        };
        if let Err(e) = unsafe { device.free_descriptor_sets(pool, &[vk::DescriptorSet::from_raw(set.0)]) } {
            engine_warn!("galaxy3d::vulkan", "Failed to free descriptor set: {:?}", e);
        }
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        self.owners.clear();
        for pool in self.pools.drain(..) {
            unsafe { device.destroy_descriptor_pool(pool, None) };
        }
    }

    fn current_pool(&mut self, device: &ash::Device) -> Result<vk::DescriptorPool> {
        if let Some(pool) = self.pools.last() {
            return Ok(*pool);
        }
        let pool = create_descriptor_pool(device).map_err(|e| vk_error("Failed to create descriptor pool", e))?;
        self.pools.push(pool);
        Ok(pool)
    }
}

/// Fixed-capacity pool covering every descriptor type the argument layer uses
fn create_descriptor_pool(device: &ash::Device) -> std::result::Result<vk::DescriptorPool, vk::Result> {
    let pool_sizes = [
        vk::DescriptorPoolSize { ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, descriptor_count: 1024 },
        vk::DescriptorPoolSize { ty: vk::DescriptorType::STORAGE_BUFFER, descriptor_count: 2048 },
        vk::DescriptorPoolSize { ty: vk::DescriptorType::SAMPLED_IMAGE, descriptor_count: 4096 },
        vk::DescriptorPoolSize { ty: vk::DescriptorType::STORAGE_IMAGE, descriptor_count: 1024 },
        vk::DescriptorPoolSize { ty: vk::DescriptorType::SAMPLER, descriptor_count: 1024 },
    ];
    let info = vk::DescriptorPoolCreateInfo::default()
        .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        .pool_sizes(&pool_sizes)
        .max_sets(SETS_PER_POOL);
    unsafe { device.create_descriptor_pool(&info, None) }
}

enum WriteInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

impl VulkanDriver {
    pub(crate) fn build_descriptor_set_layout(&self, bindings: &[NativeBindingDesc]) -> Result<RawDescriptorSetLayout> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(descriptor_type_to_vk(binding.kind))
                    .descriptor_count(1)
                    .stage_flags(shader_stages_to_vk(binding.stages))
            })
            .collect();
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let layout = unsafe { self.device.create_descriptor_set_layout(&info, None) }
            .map_err(|e| vk_error("Failed to create descriptor set layout", e))?;
        Ok(RawDescriptorSetLayout(layout.as_raw()))
    }

    pub(crate) fn update_descriptor_set(&self, set: RawDescriptorSet, writes: &[DescriptorWrite]) {
        let set = vk::DescriptorSet::from_raw(set.0);

        // Infos must stay at fixed addresses while the writes point at them
        let infos: Vec<(u32, vk::DescriptorType, WriteInfo)> = writes
            .iter()
            .map(|write| match *write {
                DescriptorWrite::Buffer { binding, kind, buffer, offset, range } => (
                    binding,
                    descriptor_type_to_vk(kind),
                    WriteInfo::Buffer(vk::DescriptorBufferInfo {
                        buffer: vk::Buffer::from_raw(buffer.0),
                        offset,
                        range,
                    }),
                ),
                DescriptorWrite::Image { binding, kind, view, layout } => (
                    binding,
                    descriptor_type_to_vk(kind),
                    WriteInfo::Image(vk::DescriptorImageInfo {
                        sampler: vk::Sampler::null(),
                        image_view: vk::ImageView::from_raw(view.0),
                        image_layout: image_layout_to_vk(layout),
                    }),
                ),
                DescriptorWrite::Sampler { binding, sampler } => (
                    binding,
                    vk::DescriptorType::SAMPLER,
                    WriteInfo::Image(vk::DescriptorImageInfo {
                        sampler: vk::Sampler::from_raw(sampler.0),
                        image_view: vk::ImageView::null(),
                        image_layout: vk::ImageLayout::UNDEFINED,
                    }),
                ),
            })
            .collect();

        let vk_writes: Vec<vk::WriteDescriptorSet> = infos
            .iter()
            .map(|(binding, ty, info)| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .descriptor_type(*ty);
                match info {
                    WriteInfo::Buffer(buffer_info) => write.buffer_info(slice::from_ref(buffer_info)),
                    WriteInfo::Image(image_info) => write.image_info(slice::from_ref(image_info)),
                }
            })
            .collect();

        unsafe { self.device.update_descriptor_sets(&vk_writes, &[]) }
    }
}
