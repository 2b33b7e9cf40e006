/// Window surface and presentation images
///
/// The swapchain exposes one back-buffer `Texture` whose native image is
/// re-pointed at every acquire, plus one render target view per image.
/// Resizing is explicit: when `begin_present` or `end_present` report
/// `OutOfDate` or `Suboptimal`, the caller calls `resize`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::engine_info;
use crate::error::{Error, Result};
use crate::gpu::device::DeviceShared;
use crate::gpu::driver::{NativeObject, NativeSwapchain, NativeSwapchainDesc, RawImage, RawSurface, RawSwapchain};
use crate::gpu::resource::{ResourceView, Texture};
use crate::gpu::types::{Format, QueueType};

const SOURCE: &str = "galaxy3d::gpu::Swapchain";

/// Window and presentation parameters
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub display: RawDisplayHandle,
    pub window: RawWindowHandle,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    /// Requested image count; the driver may return more
    pub image_count: u32,
}

pub struct Swapchain {
    shared: Arc<DeviceShared>,
    surface: RawSurface,
    raw: RawSwapchain,
    images: Vec<RawImage>,
    views: Vec<ResourceView>,
    back_buffer: Texture,
    current: AtomicU32,
    vsync: bool,
    image_count: u32,
}

impl Swapchain {
    pub(crate) fn new(shared: Arc<DeviceShared>, desc: &SwapchainDesc) -> Result<Self> {
        let driver = shared.driver();
        let surface = driver.create_surface(desc.display, desc.window)?;
        match driver.supports_present(QueueType::Graphics, surface) {
            Ok(true) => {}
            Ok(false) => {
                driver.destroy_surface(surface);
                return Err(Error::InitializationFailed(
                    "graphics queue cannot present to this surface".to_string(),
                ));
            }
            Err(err) => {
                driver.destroy_surface(surface);
                return Err(err);
            }
        }
        let native = match create_native(&shared, surface, desc.width, desc.height, desc.vsync, desc.image_count, RawSwapchain::NULL) {
            Ok(native) => native,
            Err(err) => {
                shared.driver().destroy_surface(surface);
                return Err(err);
            }
        };
        let mut swapchain = Self {
            back_buffer: Texture::swapchain(Arc::clone(&shared), native.format, native.width, native.height),
            shared,
            surface,
            raw: RawSwapchain::NULL,
            images: Vec::new(),
            views: Vec::new(),
            current: AtomicU32::new(0),
            vsync: desc.vsync,
            image_count: desc.image_count,
        };
        swapchain.adopt(native)?;
        Ok(swapchain)
    }

    /// Take ownership of freshly created native images
    fn adopt(&mut self, native: NativeSwapchain) -> Result<()> {
        self.raw = native.raw;
        self.back_buffer = Texture::swapchain(Arc::clone(&self.shared), native.format, native.width, native.height);
        self.views = native
            .images
            .iter()
            .map(|&image| ResourceView::for_swapchain_image(Arc::clone(&self.shared), &self.back_buffer, image))
            .collect::<Result<Vec<_>>>()?;
        self.images = native.images;
        self.current.store(0, Ordering::Release);
        engine_info!(
            SOURCE,
            "Swapchain ready: {}x{} {:?}, {} images",
            native.width,
            native.height,
            native.format,
            self.images.len()
        );
        Ok(())
    }

    /// Recreate the presentation images at a new size
    ///
    /// Must not be called between `begin_present` and `end_present`. The
    /// old images are destroyed once in-flight frames complete.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let native = create_native(&self.shared, self.surface, width, height, self.vsync, self.image_count, self.raw)?;
        self.views.clear();
        self.shared.release(NativeObject::Swapchain(self.raw));
        self.adopt(native)
    }

    pub fn raw(&self) -> RawSwapchain {
        self.raw
    }

    pub fn format(&self) -> Format {
        self.back_buffer.format()
    }

    pub fn extent(&self) -> [u32; 2] {
        let desc = self.back_buffer.desc();
        [desc.width, desc.height]
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Index of the image acquired by the last `begin_present`
    pub fn current_image(&self) -> u32 {
        self.current.load(Ordering::Acquire)
    }

    /// Texture standing for the acquired image
    pub fn back_buffer(&self) -> &Texture {
        &self.back_buffer
    }

    /// Render target view of the acquired image
    pub fn back_buffer_view(&self) -> &ResourceView {
        &self.views[self.current_image() as usize]
    }

    pub(crate) fn set_current_image(&self, index: u32) {
        self.current.store(index, Ordering::Release);
        self.back_buffer.swap_image(self.images[index as usize]);
    }
}

fn create_native(
    shared: &DeviceShared,
    surface: RawSurface,
    width: u32,
    height: u32,
    vsync: bool,
    image_count: u32,
    old_swapchain: RawSwapchain,
) -> Result<NativeSwapchain> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidResource("swapchain extent must be non-zero".to_string()));
    }
    let native = shared.driver().create_swapchain(&NativeSwapchainDesc {
        surface,
        width,
        height,
        vsync,
        min_image_count: image_count.max(2),
        old_swapchain,
    })?;
    if native.images.is_empty() {
        shared.driver().destroy_swapchain(native.raw);
        return Err(Error::BackendError("swapchain returned no images".to_string()));
    }
    Ok(native)
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.views.clear();
        self.shared.release(NativeObject::Swapchain(self.raw));
        self.shared.release(NativeObject::Surface(self.surface));
    }
}
