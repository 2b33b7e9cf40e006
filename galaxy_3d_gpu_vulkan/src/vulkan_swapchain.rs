/// Surfaces, swapchains, image acquisition and presentation

use ash::vk;
use ash::vk::Handle;
use galaxy_3d_gpu::galaxy3d::gpu::driver::{
    AcquiredImage, NativeSwapchain, NativeSwapchainDesc, RawImage, RawSemaphore, RawSurface, RawSwapchain,
    SwapchainStatus,
};
use galaxy_3d_gpu::galaxy3d::gpu::{Format, QueueType};
use galaxy_3d_gpu::galaxy3d::{Error, Result};
use galaxy_3d_gpu::{engine_bail, engine_debug, engine_err, engine_error};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::vulkan::{lock, vk_error, VulkanDriver};
use crate::vulkan_format::format_from_vk;

/// Surface format the swapchain renders into
///
/// B8G8R8A8 sRGB first, then its UNORM variant, then the first format the
/// GPU layer can name.
pub(crate) fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<(vk::SurfaceFormatKHR, Format)> {
    let preferred = [vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_UNORM];
    preferred
        .iter()
        .find_map(|wanted| {
            formats
                .iter()
                .find(|f| f.format == *wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        })
        .or_else(|| formats.iter().find(|f| format_from_vk(f.format).is_some()))
        .and_then(|f| format_from_vk(f.format).map(|format| (*f, format)))
}

/// FIFO is always available; without vsync take the lowest-latency mode offered
pub(crate) fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface dictates the extent unless it reports the 0xFFFFFFFF wildcard
pub(crate) fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// `max_image_count` of 0 means no upper bound
pub(crate) fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let count = requested.max(caps.min_image_count);
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

pub(crate) fn choose_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|mode| supported.contains(*mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

pub(crate) fn swapchain_status(suboptimal: bool) -> SwapchainStatus {
    if suboptimal {
        SwapchainStatus::Suboptimal
    } else {
        SwapchainStatus::Optimal
    }
}

impl VulkanDriver {
    fn surface_loader(&self) -> Result<&ash::khr::surface::Instance> {
        self.surface_loader.as_ref().ok_or_else(|| {
            engine_error!("galaxy3d::vulkan", "Presentation requires a driver created with a display handle");
            Error::InitializationFailed("Driver was created without presentation support".to_string())
        })
    }

    fn swapchain_loader(&self) -> Result<&ash::khr::swapchain::Device> {
        self.swapchain_loader.as_ref().ok_or_else(|| {
            engine_error!("galaxy3d::vulkan", "Presentation requires a driver created with a display handle");
            Error::InitializationFailed("Driver was created without presentation support".to_string())
        })
    }

    pub(crate) fn build_surface(&self, display: RawDisplayHandle, window: RawWindowHandle) -> Result<RawSurface> {
        self.surface_loader()?;
        let surface = unsafe { ash_window::create_surface(&self.entry, &self.instance, display, window, None) }
            .map_err(|e| {
                engine_error!("galaxy3d::vulkan", "Failed to create surface: {:?}", e);
                Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
            })?;
        Ok(RawSurface(surface.as_raw()))
    }

    pub(crate) fn surface_supports_present(&self, queue: QueueType, surface: RawSurface) -> Result<bool> {
        let family = self.queues.families().family(queue);
        unsafe {
            self.surface_loader()?.get_physical_device_surface_support(
                self.physical_device,
                family,
                vk::SurfaceKHR::from_raw(surface.0),
            )
        }
        .map_err(|e| vk_error("Failed to query surface support", e))
    }

    pub(crate) fn build_swapchain(&self, desc: &NativeSwapchainDesc) -> Result<NativeSwapchain> {
        let surface_loader = self.surface_loader()?;
        let swapchain_loader = self.swapchain_loader()?;
        let surface = vk::SurfaceKHR::from_raw(desc.surface.0);

        let (caps, formats, modes) = unsafe {
            let caps = surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, surface)
                .map_err(|e| vk_error("Failed to get surface capabilities", e))?;
            let formats = surface_loader
                .get_physical_device_surface_formats(self.physical_device, surface)
                .map_err(|e| vk_error("Failed to get surface formats", e))?;
            let modes = surface_loader
                .get_physical_device_surface_present_modes(self.physical_device, surface)
                .map_err(|e| vk_error("Failed to get present modes", e))?;
            (caps, formats, modes)
        };

        let extent = choose_extent(&caps, desc.width, desc.height);
        if extent.width == 0 || extent.height == 0 {
            engine_bail!("galaxy3d::vulkan", "Cannot create a swapchain for a {}x{} surface", extent.width, extent.height);
        }

        let Some((surface_format, format)) = choose_surface_format(&formats) else {
            return Err(engine_err!("galaxy3d::vulkan", "Surface offers no supported color format"));
        };
        let present_mode = choose_present_mode(&modes, desc.vsync);
        let image_count = choose_image_count(&caps, desc.min_image_count);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(choose_composite_alpha(caps.supported_composite_alpha))
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::from_raw(desc.old_swapchain.0));

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| vk_error("Failed to create swapchain", e))?;
        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(vk_error("Failed to get swapchain images", e));
            }
        };

        engine_debug!(
            "galaxy3d::vulkan",
            "Swapchain created: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            images.len(),
            surface_format.format,
            present_mode
        );

        Ok(NativeSwapchain {
            raw: RawSwapchain(swapchain.as_raw()),
            images: images.into_iter().map(|image| RawImage(image.as_raw())).collect(),
            format,
            width: extent.width,
            height: extent.height,
        })
    }

    pub(crate) fn acquire_swapchain_image(&self, swapchain: RawSwapchain, signal: RawSemaphore) -> Result<AcquiredImage> {
        let result = unsafe {
            self.swapchain_loader()?.acquire_next_image(
                vk::SwapchainKHR::from_raw(swapchain.0),
                u64::MAX,
                vk::Semaphore::from_raw(signal.0),
                vk::Fence::null(),
            )
        };
        match result {
            Ok((index, suboptimal)) => Ok(AcquiredImage { index, status: swapchain_status(suboptimal) }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquiredImage { index: 0, status: SwapchainStatus::OutOfDate }),
            Err(e) => Err(vk_error("Failed to acquire swapchain image", e)),
        }
    }

    pub(crate) fn present_swapchain_image(
        &self,
        queue: QueueType,
        swapchain: RawSwapchain,
        image_index: u32,
        wait: RawSemaphore,
    ) -> Result<SwapchainStatus> {
        let swapchain_loader = self.swapchain_loader()?;
        let wait_semaphores: Vec<vk::Semaphore> =
            (!wait.is_null()).then(|| vk::Semaphore::from_raw(wait.0)).into_iter().collect();
        let swapchains = [vk::SwapchainKHR::from_raw(swapchain.0)];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let vk_queue = lock(self.queues.get(queue));
        match unsafe { swapchain_loader.queue_present(*vk_queue, &present_info) } {
            Ok(suboptimal) => Ok(swapchain_status(suboptimal)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainStatus::OutOfDate),
            Err(e) => Err(vk_error("Failed to present", e)),
        }
    }
}

#[cfg(test)]
#[path = "vulkan_swapchain_tests.rs"]
mod tests;
