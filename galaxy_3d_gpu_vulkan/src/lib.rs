/*!
# Galaxy 3D GPU - Vulkan Driver

Vulkan implementation of the `Driver` trait of `galaxy_3d_gpu`.

Built on ash for the Vulkan bindings, gpu-allocator for memory, spirq for
vertex input reflection and ash-window for surfaces.

```no_run
use galaxy_3d_gpu::galaxy3d::Config;
use raw_window_handle::HasDisplayHandle;

# fn run(window: &winit::window::Window) -> galaxy_3d_gpu::galaxy3d::Result<()> {
let display = window.display_handle().ok().map(|handle| handle.as_raw());
let device = galaxy_3d_gpu_vulkan::create_device(display, Config::default())?;
# Ok(())
# }
```

Validation layers are compiled in with the `vulkan-validation` feature and
enabled at runtime through `DebugConfig::enable_validation`.
*/

mod debug;
mod vulkan;
mod vulkan_command_list;
mod vulkan_descriptor_set;
mod vulkan_format;
mod vulkan_pipeline;
mod vulkan_queue;
mod vulkan_reflect;
mod vulkan_resource;
mod vulkan_swapchain;

use galaxy_3d_gpu::galaxy3d::{Config, Device, Result};
use raw_window_handle::RawDisplayHandle;
use std::sync::Arc;

pub use vulkan::VulkanDriver;

// Re-export debug utilities
pub use debug::{get_validation_stats, print_validation_stats_report};

/// Create a `Device` running on Vulkan
///
/// Pass the display handle of the window system to enable presentation;
/// `None` creates a headless device.
pub fn create_device(display: Option<RawDisplayHandle>, config: Config) -> Result<Device> {
    let driver = VulkanDriver::new(&config, display)?;
    Device::new(Arc::new(driver), config)
}
