/// Buffers, images and samplers backed by gpu-allocator

use ash::vk;
use ash::vk::Handle;
use galaxy_3d_gpu::galaxy3d::gpu::driver::{MappedPtr, NativeBuffer, NativeBufferDesc, NativeImageDesc, RawBuffer, RawImage, RawSampler};
use galaxy_3d_gpu::galaxy3d::gpu::{CpuAccess, SamplerDesc};
use galaxy_3d_gpu::galaxy3d::{Error, Result};
use galaxy_3d_gpu::{engine_error, engine_warn};
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::{AllocationError, MemoryLocation};

use crate::vulkan::{lock, vk_error, VulkanDriver};
use crate::vulkan_format::*;

pub(crate) fn memory_location(cpu_access: CpuAccess) -> MemoryLocation {
    match cpu_access {
        CpuAccess::None => MemoryLocation::GpuOnly,
        CpuAccess::Upload => MemoryLocation::CpuToGpu,
        CpuAccess::Readback => MemoryLocation::GpuToCpu,
    }
}

fn allocation_error(what: &str, size: u64, error: AllocationError) -> Error {
    let size_mb = size as f64 / (1024.0 * 1024.0);
    match error {
        AllocationError::OutOfMemory => {
            engine_error!("galaxy3d::vulkan", "Out of GPU memory for {} ({:.2} MB)", what, size_mb);
            Error::OutOfMemory
        }
        e => {
            engine_error!("galaxy3d::vulkan", "Failed to allocate memory for {} ({:.2} MB): {:?}", what, size_mb, e);
            Error::BackendError(format!("Failed to allocate memory for {}: {:?}", what, e))
        }
    }
}

impl VulkanDriver {
    pub(crate) fn allocate_buffer(&self, desc: &NativeBufferDesc) -> Result<NativeBuffer> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(buffer_usage_to_vk(desc.usage))
            .sharing_mode(self.sharing_mode())
            .queue_family_indices(&self.concurrent_families);

        unsafe {
            let buffer = self
                .device
                .create_buffer(&buffer_info, None)
                .map_err(|e| vk_error("Failed to create buffer", e))?;
            let requirements = self.device.get_buffer_memory_requirements(buffer);

            let allocation = lock(&self.allocator).allocate(&AllocationCreateDesc {
                name: "buffer",
                requirements,
                location: memory_location(desc.cpu_access),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.device.destroy_buffer(buffer, None);
                    return Err(allocation_error("buffer", requirements.size, e));
                }
            };

            if let Err(e) = self.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                self.device.destroy_buffer(buffer, None);
                lock(&self.allocator).free(allocation).ok();
                return Err(vk_error("Failed to bind buffer memory", e));
            }

            let mapped = match desc.cpu_access {
                CpuAccess::None => None,
                _ => allocation.mapped_ptr().and_then(|ptr| MappedPtr::new(ptr.as_ptr().cast())),
            };

            lock(&self.buffer_memory).insert(buffer.as_raw(), allocation);
            Ok(NativeBuffer { raw: RawBuffer(buffer.as_raw()), mapped })
        }
    }

    pub(crate) fn release_buffer(&self, buffer: RawBuffer) {
        let allocation = lock(&self.buffer_memory).remove(&buffer.0);
        unsafe { self.device.destroy_buffer(vk::Buffer::from_raw(buffer.0), None) };
        free_allocation(self, allocation);
    }

    pub(crate) fn allocate_image(&self, desc: &NativeImageDesc) -> Result<RawImage> {
        let flags = if desc.cube_compatible {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };
        let image_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(image_type_to_vk(desc.kind))
            .format(format_to_vk(desc.format))
            .extent(vk::Extent3D { width: desc.width, height: desc.height, depth: desc.depth })
            .mip_levels(desc.mip_levels)
            .array_layers(desc.array_layers)
            .samples(sample_count_to_vk(desc.samples))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(texture_usage_to_vk(desc.usage))
            .sharing_mode(self.sharing_mode())
            .queue_family_indices(&self.concurrent_families)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        unsafe {
            let image = self
                .device
                .create_image(&image_info, None)
                .map_err(|e| vk_error("Failed to create image", e))?;
            let requirements = self.device.get_image_memory_requirements(image);

            let allocation = lock(&self.allocator).allocate(&AllocationCreateDesc {
                name: "texture",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.device.destroy_image(image, None);
                    engine_error!(
                        "galaxy3d::vulkan",
                        "Texture allocation failed (size: {}x{}, layers: {})",
                        desc.width,
                        desc.height,
                        desc.array_layers
                    );
                    return Err(allocation_error("texture", requirements.size, e));
                }
            };

            if let Err(e) = self.device.bind_image_memory(image, allocation.memory(), allocation.offset()) {
                self.device.destroy_image(image, None);
                lock(&self.allocator).free(allocation).ok();
                return Err(vk_error("Failed to bind image memory", e));
            }

            lock(&self.image_memory).insert(image.as_raw(), allocation);
            Ok(RawImage(image.as_raw()))
        }
    }

    /// Swapchain images have no allocation here and are left to the swapchain
    pub(crate) fn release_image(&self, image: RawImage) {
        let Some(allocation) = lock(&self.image_memory).remove(&image.0) else {
            return;
        };
        unsafe { self.device.destroy_image(vk::Image::from_raw(image.0), None) };
        free_allocation(self, Some(allocation));
    }

    pub(crate) fn build_sampler(&self, desc: &SamplerDesc) -> Result<RawSampler> {
        let anisotropy = match (desc.max_anisotropy, self.max_sampler_anisotropy) {
            (Some(requested), Some(limit)) => Some(requested.clamp(1.0, limit)),
            (Some(_), None) => {
                engine_warn!("galaxy3d::vulkan", "Anisotropic filtering not supported, sampler created without it");
                None
            }
            (None, _) => None,
        };

        let mut info = vk::SamplerCreateInfo::default()
            .mag_filter(filter_to_vk(desc.mag_filter))
            .min_filter(filter_to_vk(desc.min_filter))
            .mipmap_mode(mipmap_mode_to_vk(desc.mip_filter))
            .address_mode_u(address_mode_to_vk(desc.address_u))
            .address_mode_v(address_mode_to_vk(desc.address_v))
            .address_mode_w(address_mode_to_vk(desc.address_w))
            .mip_lod_bias(desc.mip_lod_bias)
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .min_lod(desc.min_lod)
            .max_lod(desc.max_lod)
            .border_color(border_color_to_vk(desc.border_color))
            .unnormalized_coordinates(false);
        if let Some(compare) = desc.compare {
            info = info.compare_enable(true).compare_op(compare_op_to_vk(compare));
        }

        let sampler = unsafe { self.device.create_sampler(&info, None) }
            .map_err(|e| vk_error("Failed to create sampler", e))?;
        Ok(RawSampler(sampler.as_raw()))
    }
}

fn free_allocation(driver: &VulkanDriver, allocation: Option<Allocation>) {
    if let Some(allocation) = allocation {
        if let Err(e) = lock(&driver.allocator).free(allocation) {
            engine_warn!("galaxy3d::vulkan", "Failed to free GPU allocation: {:?}", e);
        }
    }
}
