/// VulkanDriver - Vulkan implementation of the GPU layer's `Driver` trait
///
/// Native objects cross the trait as raw 64-bit handles; `vk::Handle`
/// converts them back. Memory for buffers and images comes from
/// gpu-allocator and is tracked here by handle.

use ash::vk;
use ash::vk::Handle;
use galaxy_3d_gpu::galaxy3d::gpu::driver::{
    AcquiredImage, BlitFilter, BufferCopy, BufferTextureCopy, CommandBufferLevel, DescriptorWrite,
    Driver, DriverProperties, ImageAspects, NativeBarrierBatch, NativeBindingDesc, NativeBuffer, NativeBufferDesc,
    NativeComputePipelineDesc, NativeFramebufferDesc, NativeGraphicsPipelineDesc, NativeImageDesc,
    NativeImageViewDesc, NativeInheritance, NativeRenderPassBegin, NativeRenderPassDesc, NativeShader,
    NativeSubmit, NativeSwapchain, NativeSwapchainDesc, PipelineBindPoint, PipelineStages, QueryKind, RawBuffer,
    RawCommandBuffer, RawCommandPool, RawDescriptorSet, RawDescriptorSetLayout, RawFence, RawFramebuffer,
    RawImage, RawImageView, RawPipeline, RawPipelineLayout, RawQueryPool, RawRenderPass, RawSampler,
    RawSemaphore, RawShaderModule, RawSurface, RawSwapchain, SwapchainStatus, TextureBlit,
};
use galaxy_3d_gpu::galaxy3d::gpu::{IndexType, QueueType, Rect2D, SamplerDesc, ShaderStage, SubresourceRange, Viewport};
use galaxy_3d_gpu::galaxy3d::{Config, Error, Result};
use galaxy_3d_gpu::{engine_debug, engine_err, engine_error, engine_info, engine_warn};
use gpu_allocator::vulkan::{Allocation, Allocator, AllocatorCreateDesc};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use rustc_hash::FxHashMap;
use std::ffi::{c_char, CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::vulkan_descriptor_set::DescriptorPools;
use crate::vulkan_format::*;
use crate::vulkan_queue::{device_type_score, QueueFamilies, Queues};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Lock a mutex, ignoring poisoning (the data stays consistent per call)
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Map a failed Vulkan call to an engine error, logging it
pub(crate) fn vk_error(what: &str, result: vk::Result) -> Error {
    match result {
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            engine_error!("galaxy3d::vulkan", "{}: out of memory ({:?})", what, result);
            Error::OutOfMemory
        }
        _ => engine_err!("galaxy3d::vulkan", "{}: {:?}", what, result),
    }
}

/// Vulkan device implementation
///
/// One instance, one logical device, one queue per distinct queue family.
/// All methods take `&self`; the mutable pieces (queues, allocator, memory
/// table, descriptor pools) sit behind their own mutexes.
pub struct VulkanDriver {
    /// Keeps the Vulkan library loaded
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: ash::Device,

    /// Present only when the driver was created with a display
    pub(crate) surface_loader: Option<ash::khr::surface::Instance>,
    pub(crate) swapchain_loader: Option<ash::khr::swapchain::Device>,

    pub(crate) queues: Queues,

    /// Dropped before the device is destroyed
    pub(crate) allocator: ManuallyDrop<Mutex<Allocator>>,
    pub(crate) buffer_memory: Mutex<FxHashMap<u64, Allocation>>,
    pub(crate) image_memory: Mutex<FxHashMap<u64, Allocation>>,
    pub(crate) descriptor_pools: Mutex<DescriptorPools>,

    /// Sharing for buffers and images used across queue families
    pub(crate) concurrent_families: Vec<u32>,
    /// None when the device lacks anisotropic filtering
    pub(crate) max_sampler_anisotropy: Option<f32>,
    properties: DriverProperties,
}

impl VulkanDriver {
    /// Create the Vulkan driver
    ///
    /// With a `display`, the surface extensions it needs are loaded and the
    /// device enables `VK_KHR_swapchain`. `None` creates a headless driver
    /// that cannot create surfaces.
    pub fn new(config: &Config, display: Option<RawDisplayHandle>) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| {
                engine_error!("galaxy3d::vulkan", "Failed to load Vulkan library: {:?}", e);
                Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
            })?;

            let app_name = CString::new(config.app_name.as_str()).unwrap_or_default();
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"Galaxy3D")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_2);

            let mut extension_names: Vec<*const c_char> = match display {
                Some(display) => ash_window::enumerate_required_extensions(display)
                    .map_err(|e| {
                        engine_error!("galaxy3d::vulkan", "Failed to get required extensions: {}", e);
                        Error::InitializationFailed(format!("Failed to get required extensions: {}", e))
                    })?
                    .to_vec(),
                None => Vec::new(),
            };

            let validation = Self::validation_enabled(&entry, config);
            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }
            let layer_names = if validation { vec![VALIDATION_LAYER.as_ptr()] } else { vec![] };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry.create_instance(&create_info, None).map_err(|e| {
                engine_error!("galaxy3d::vulkan", "Failed to create Vulkan instance: {:?}", e);
                Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
            })?;

            let debug_messenger = if validation {
                Some(Self::create_debug_messenger(&entry, &instance, config)?)
            } else {
                None
            };

            // Pick the best adapter that has a graphics + compute family
            let physical_devices = instance.enumerate_physical_devices().map_err(|e| {
                engine_error!("galaxy3d::vulkan", "Failed to enumerate physical devices: {:?}", e);
                Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
            })?;
            let (physical_device, families) = physical_devices
                .into_iter()
                .filter_map(|physical_device| {
                    let families = instance.get_physical_device_queue_family_properties(physical_device);
                    QueueFamilies::select(&families, config.prefer_dedicated_queues)
                        .map(|selected| (physical_device, selected))
                })
                .max_by_key(|(physical_device, _)| {
                    device_type_score(instance.get_physical_device_properties(*physical_device).device_type)
                })
                .ok_or_else(|| {
                    engine_error!("galaxy3d::vulkan", "No Vulkan-capable GPU found");
                    Error::InitializationFailed("No Vulkan-capable GPU found".to_string())
                })?;

            let queue_priorities = [1.0];
            let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = families
                .unique()
                .into_iter()
                .map(|family| {
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(family)
                        .queue_priorities(&queue_priorities)
                })
                .collect();

            let presentation = display.is_some();
            let device_extension_names =
                if presentation { vec![ash::khr::swapchain::NAME.as_ptr()] } else { vec![] };

            let supported = instance.get_physical_device_features(physical_device);
            let device_features = vk::PhysicalDeviceFeatures::default()
                .sampler_anisotropy(supported.sampler_anisotropy == vk::TRUE)
                .fill_mode_non_solid(supported.fill_mode_non_solid == vk::TRUE)
                .depth_clamp(supported.depth_clamp == vk::TRUE)
                .depth_bias_clamp(supported.depth_bias_clamp == vk::TRUE)
                .independent_blend(supported.independent_blend == vk::TRUE);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .enabled_features(&device_features);

            let device = instance.create_device(physical_device, &device_create_info, None).map_err(|e| {
                engine_error!("galaxy3d::vulkan", "Failed to create logical device: {:?}", e);
                Error::InitializationFailed(format!("Failed to create device: {:?}", e))
            })?;

            let queues = Queues::new(&device, families);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                engine_error!("galaxy3d::vulkan", "Failed to create GPU allocator: {:?}", e);
                Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
            })?;

            let descriptor_pools = DescriptorPools::new(&device)?;

            let surface_loader = presentation.then(|| ash::khr::surface::Instance::new(&entry, &instance));
            let swapchain_loader = presentation.then(|| ash::khr::swapchain::Device::new(&instance, &device));

            let device_properties = instance.get_physical_device_properties(physical_device);
            let limits = &device_properties.limits;
            let adapter_name = device_properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            let properties = DriverProperties {
                backend: "vulkan",
                adapter_name,
                min_constant_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
                min_storage_buffer_offset_alignment: limits.min_storage_buffer_offset_alignment,
                max_constant_buffer_range: limits.max_uniform_buffer_range as u64,
                max_bound_argument_sets: limits.max_bound_descriptor_sets,
                max_vertex_input_bindings: limits.max_vertex_input_bindings,
                timestamp_period: limits.timestamp_period,
                dedicated_compute_queue: families.dedicated_compute(),
                dedicated_transfer_queue: families.dedicated_transfer(),
            };

            engine_info!(
                "galaxy3d::vulkan",
                "Vulkan device created on '{}' (queue families: graphics {}, compute {}, transfer {})",
                properties.adapter_name,
                families.graphics,
                families.compute,
                families.transfer
            );

            let concurrent_families = families.unique();
            let max_sampler_anisotropy =
                (supported.sampler_anisotropy == vk::TRUE).then_some(limits.max_sampler_anisotropy);

            Ok(Self {
                entry,
                instance,
                debug_messenger,
                physical_device,
                device,
                surface_loader,
                swapchain_loader,
                queues,
                allocator: ManuallyDrop::new(Mutex::new(allocator)),
                buffer_memory: Mutex::new(FxHashMap::default()),
                image_memory: Mutex::new(FxHashMap::default()),
                descriptor_pools: Mutex::new(descriptor_pools),
                concurrent_families,
                max_sampler_anisotropy,
                properties,
            })
        }
    }

    /// Validation needs the config flag, the cargo feature and an installed layer
    fn validation_enabled(entry: &ash::Entry, config: &Config) -> bool {
        if !config.debug.enable_validation {
            return false;
        }
        if !cfg!(feature = "vulkan-validation") {
            engine_warn!(
                "galaxy3d::vulkan",
                "Validation requested but the 'vulkan-validation' feature is disabled"
            );
            return false;
        }
        // SAFETY: plain enumeration on a loaded entry
        let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        let available = layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER));
        if !available {
            engine_warn!("galaxy3d::vulkan", "Validation layer not installed, continuing without validation");
        }
        available
    }

    unsafe fn create_debug_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
        config: &Config,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);
        crate::debug::init_debug_config(&config.debug);

        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(crate::debug::severity_flags(config.debug.severity))
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

        let messenger = debug_utils.create_debug_utils_messenger(&debug_info, None).map_err(|e| {
            engine_error!("galaxy3d::vulkan", "Failed to create debug messenger: {:?}", e);
            Error::InitializationFailed(format!("Failed to create debug messenger: {:?}", e))
        })?;
        engine_debug!("galaxy3d::vulkan", "Validation layer enabled");
        Ok((debug_utils, messenger))
    }

    /// Sharing mode for resources that may be touched by several queues
    pub(crate) fn sharing_mode(&self) -> vk::SharingMode {
        if self.concurrent_families.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        }
    }
}

impl Driver for VulkanDriver {
    fn properties(&self) -> &DriverProperties {
        &self.properties
    }

    // ----- resources -----

    fn create_buffer(&self, desc: &NativeBufferDesc) -> Result<NativeBuffer> {
        self.allocate_buffer(desc)
    }

    fn destroy_buffer(&self, buffer: RawBuffer) {
        self.release_buffer(buffer)
    }

    fn create_image(&self, desc: &NativeImageDesc) -> Result<RawImage> {
        self.allocate_image(desc)
    }

    fn destroy_image(&self, image: RawImage) {
        self.release_image(image)
    }

    fn create_image_view(&self, desc: &NativeImageViewDesc) -> Result<RawImageView> {
        let info = vk::ImageViewCreateInfo::default()
            .image(vk::Image::from_raw(desc.image.0))
            .view_type(view_type_to_vk(desc.kind))
            .format(format_to_vk(desc.format))
            .subresource_range(subresource_range_to_vk(desc.aspects, &desc.range));
        let view = unsafe { self.device.create_image_view(&info, None) }
            .map_err(|e| vk_error("Failed to create image view", e))?;
        Ok(RawImageView(view.as_raw()))
    }

    fn destroy_image_view(&self, view: RawImageView) {
        unsafe { self.device.destroy_image_view(vk::ImageView::from_raw(view.0), None) }
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<RawSampler> {
        self.build_sampler(desc)
    }

    fn destroy_sampler(&self, sampler: RawSampler) {
        unsafe { self.device.destroy_sampler(vk::Sampler::from_raw(sampler.0), None) }
    }

    // ----- shaders, layouts, pipelines -----

    fn create_shader_module(&self, stage: ShaderStage, bytecode: &[u8]) -> Result<NativeShader> {
        self.build_shader_module(stage, bytecode)
    }

    fn destroy_shader_module(&self, module: RawShaderModule) {
        unsafe { self.device.destroy_shader_module(vk::ShaderModule::from_raw(module.0), None) }
    }

    fn create_descriptor_set_layout(&self, bindings: &[NativeBindingDesc]) -> Result<RawDescriptorSetLayout> {
        self.build_descriptor_set_layout(bindings)
    }

    fn destroy_descriptor_set_layout(&self, layout: RawDescriptorSetLayout) {
        unsafe {
            self.device
                .destroy_descriptor_set_layout(vk::DescriptorSetLayout::from_raw(layout.0), None)
        }
    }

    fn allocate_descriptor_set(&self, layout: RawDescriptorSetLayout) -> Result<RawDescriptorSet> {
        lock(&self.descriptor_pools).allocate(&self.device, vk::DescriptorSetLayout::from_raw(layout.0))
    }

    fn free_descriptor_set(&self, set: RawDescriptorSet) {
        lock(&self.descriptor_pools).free(&self.device, set)
    }

    fn write_descriptor_set(&self, set: RawDescriptorSet, writes: &[DescriptorWrite]) {
        self.update_descriptor_set(set, writes)
    }

    fn create_pipeline_layout(&self, set_layouts: &[RawDescriptorSetLayout]) -> Result<RawPipelineLayout> {
        let set_layouts: Vec<vk::DescriptorSetLayout> =
            set_layouts.iter().map(|layout| vk::DescriptorSetLayout::from_raw(layout.0)).collect();
        let info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        let layout = unsafe { self.device.create_pipeline_layout(&info, None) }
            .map_err(|e| vk_error("Failed to create pipeline layout", e))?;
        Ok(RawPipelineLayout(layout.as_raw()))
    }

    fn destroy_pipeline_layout(&self, layout: RawPipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(vk::PipelineLayout::from_raw(layout.0), None) }
    }

    fn create_graphics_pipeline(&self, desc: &NativeGraphicsPipelineDesc<'_>) -> Result<RawPipeline> {
        self.build_graphics_pipeline(desc)
    }

    fn create_compute_pipeline(&self, desc: &NativeComputePipelineDesc<'_>) -> Result<RawPipeline> {
        self.build_compute_pipeline(desc)
    }

    fn destroy_pipeline(&self, pipeline: RawPipeline) {
        unsafe { self.device.destroy_pipeline(vk::Pipeline::from_raw(pipeline.0), None) }
    }

    fn create_render_pass(&self, desc: &NativeRenderPassDesc) -> Result<RawRenderPass> {
        self.build_render_pass(desc)
    }

    fn destroy_render_pass(&self, render_pass: RawRenderPass) {
        unsafe { self.device.destroy_render_pass(vk::RenderPass::from_raw(render_pass.0), None) }
    }

    fn create_framebuffer(&self, desc: &NativeFramebufferDesc<'_>) -> Result<RawFramebuffer> {
        let attachments: Vec<vk::ImageView> =
            desc.attachments.iter().map(|view| vk::ImageView::from_raw(view.0)).collect();
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(vk::RenderPass::from_raw(desc.render_pass.0))
            .attachments(&attachments)
            .width(desc.width)
            .height(desc.height)
            .layers(desc.layers);
        let framebuffer = unsafe { self.device.create_framebuffer(&info, None) }
            .map_err(|e| vk_error("Failed to create framebuffer", e))?;
        Ok(RawFramebuffer(framebuffer.as_raw()))
    }

    fn destroy_framebuffer(&self, framebuffer: RawFramebuffer) {
        unsafe { self.device.destroy_framebuffer(vk::Framebuffer::from_raw(framebuffer.0), None) }
    }

    fn create_query_pool(&self, kind: QueryKind, count: u32) -> Result<RawQueryPool> {
        let info = vk::QueryPoolCreateInfo::default().query_type(query_type_to_vk(kind)).query_count(count);
        let pool = unsafe { self.device.create_query_pool(&info, None) }
            .map_err(|e| vk_error("Failed to create query pool", e))?;
        Ok(RawQueryPool(pool.as_raw()))
    }

    fn destroy_query_pool(&self, pool: RawQueryPool) {
        unsafe { self.device.destroy_query_pool(vk::QueryPool::from_raw(pool.0), None) }
    }

    fn query_results(&self, pool: RawQueryPool, first: u32, results: &mut [u64]) -> Result<bool> {
        let result = unsafe {
            self.device.get_query_pool_results(
                vk::QueryPool::from_raw(pool.0),
                first,
                results,
                vk::QueryResultFlags::TYPE_64,
            )
        };
        match result {
            Ok(()) => Ok(true),
            Err(vk::Result::NOT_READY) => Ok(false),
            Err(e) => Err(vk_error("Failed to read query results", e)),
        }
    }

    // ----- command pools and buffers -----

    fn create_command_pool(&self, queue: QueueType) -> Result<RawCommandPool> {
        let info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(self.queues.families().family(queue));
        let pool = unsafe { self.device.create_command_pool(&info, None) }
            .map_err(|e| vk_error("Failed to create command pool", e))?;
        Ok(RawCommandPool(pool.as_raw()))
    }

    fn reset_command_pool(&self, pool: RawCommandPool) -> Result<()> {
        unsafe {
            self.device
                .reset_command_pool(vk::CommandPool::from_raw(pool.0), vk::CommandPoolResetFlags::empty())
        }
        .map_err(|e| vk_error("Failed to reset command pool", e))
    }

    fn destroy_command_pool(&self, pool: RawCommandPool) {
        unsafe { self.device.destroy_command_pool(vk::CommandPool::from_raw(pool.0), None) }
    }

    fn allocate_command_buffer(&self, pool: RawCommandPool, level: CommandBufferLevel) -> Result<RawCommandBuffer> {
        self.allocate_command_buffer_from(pool, level)
    }

    fn begin_command_buffer(&self, cmd: RawCommandBuffer, inheritance: Option<&NativeInheritance>) -> Result<()> {
        self.begin_recording(cmd, inheritance)
    }

    fn end_command_buffer(&self, cmd: RawCommandBuffer) -> Result<()> {
        unsafe { self.device.end_command_buffer(vk::CommandBuffer::from_raw(cmd.0)) }
            .map_err(|e| vk_error("Failed to end command buffer", e))
    }

    // ----- recording -----

    fn cmd_pipeline_barrier(&self, cmd: RawCommandBuffer, batch: &NativeBarrierBatch) {
        self.record_barriers(cmd, batch)
    }

    fn cmd_begin_render_pass(&self, cmd: RawCommandBuffer, begin: &NativeRenderPassBegin<'_>) {
        self.record_begin_render_pass(cmd, begin)
    }

    fn cmd_end_render_pass(&self, cmd: RawCommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(vk::CommandBuffer::from_raw(cmd.0)) }
    }

    fn cmd_execute_commands(&self, cmd: RawCommandBuffer, secondaries: &[RawCommandBuffer]) {
        let secondaries: Vec<vk::CommandBuffer> =
            secondaries.iter().map(|secondary| vk::CommandBuffer::from_raw(secondary.0)).collect();
        unsafe {
            self.device
                .cmd_execute_commands(vk::CommandBuffer::from_raw(cmd.0), &secondaries)
        }
    }

    fn cmd_bind_pipeline(&self, cmd: RawCommandBuffer, bind_point: PipelineBindPoint, pipeline: RawPipeline) {
        unsafe {
            self.device.cmd_bind_pipeline(
                vk::CommandBuffer::from_raw(cmd.0),
                bind_point_to_vk(bind_point),
                vk::Pipeline::from_raw(pipeline.0),
            )
        }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: RawCommandBuffer,
        bind_point: PipelineBindPoint,
        layout: RawPipelineLayout,
        first_set: u32,
        sets: &[RawDescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        let sets: Vec<vk::DescriptorSet> = sets.iter().map(|set| vk::DescriptorSet::from_raw(set.0)).collect();
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                vk::CommandBuffer::from_raw(cmd.0),
                bind_point_to_vk(bind_point),
                vk::PipelineLayout::from_raw(layout.0),
                first_set,
                &sets,
                dynamic_offsets,
            )
        }
    }

    fn cmd_bind_vertex_buffers(&self, cmd: RawCommandBuffer, first_binding: u32, buffers: &[RawBuffer], offsets: &[u64]) {
        let buffers: Vec<vk::Buffer> = buffers.iter().map(|buffer| vk::Buffer::from_raw(buffer.0)).collect();
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(vk::CommandBuffer::from_raw(cmd.0), first_binding, &buffers, offsets)
        }
    }

    fn cmd_bind_index_buffer(&self, cmd: RawCommandBuffer, buffer: RawBuffer, offset: u64, index_type: IndexType) {
        unsafe {
            self.device.cmd_bind_index_buffer(
                vk::CommandBuffer::from_raw(cmd.0),
                vk::Buffer::from_raw(buffer.0),
                offset,
                index_type_to_vk(index_type),
            )
        }
    }

    fn cmd_set_viewport(&self, cmd: RawCommandBuffer, viewport: &Viewport) {
        let viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        unsafe { self.device.cmd_set_viewport(vk::CommandBuffer::from_raw(cmd.0), 0, &[viewport]) }
    }

    fn cmd_set_scissor(&self, cmd: RawCommandBuffer, scissor: &Rect2D) {
        unsafe { self.device.cmd_set_scissor(vk::CommandBuffer::from_raw(cmd.0), 0, &[rect_to_vk(scissor)]) }
    }

    fn cmd_draw(&self, cmd: RawCommandBuffer, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device.cmd_draw(
                vk::CommandBuffer::from_raw(cmd.0),
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            )
        }
    }

    fn cmd_draw_indexed(
        &self,
        cmd: RawCommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                vk::CommandBuffer::from_raw(cmd.0),
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        }
    }

    fn cmd_draw_indirect(&self, cmd: RawCommandBuffer, buffer: RawBuffer, offset: u64, draw_count: u32, stride: u32) {
        unsafe {
            self.device.cmd_draw_indirect(
                vk::CommandBuffer::from_raw(cmd.0),
                vk::Buffer::from_raw(buffer.0),
                offset,
                draw_count,
                stride,
            )
        }
    }

    fn cmd_dispatch(&self, cmd: RawCommandBuffer, x: u32, y: u32, z: u32) {
        unsafe { self.device.cmd_dispatch(vk::CommandBuffer::from_raw(cmd.0), x, y, z) }
    }

    fn cmd_dispatch_indirect(&self, cmd: RawCommandBuffer, buffer: RawBuffer, offset: u64) {
        unsafe {
            self.device
                .cmd_dispatch_indirect(vk::CommandBuffer::from_raw(cmd.0), vk::Buffer::from_raw(buffer.0), offset)
        }
    }

    fn cmd_copy_buffer(&self, cmd: RawCommandBuffer, src: RawBuffer, dst: RawBuffer, regions: &[BufferCopy]) {
        let regions: Vec<vk::BufferCopy> = regions
            .iter()
            .map(|region| vk::BufferCopy {
                src_offset: region.src_offset,
                dst_offset: region.dst_offset,
                size: region.size,
            })
            .collect();
        unsafe {
            self.device.cmd_copy_buffer(
                vk::CommandBuffer::from_raw(cmd.0),
                vk::Buffer::from_raw(src.0),
                vk::Buffer::from_raw(dst.0),
                &regions,
            )
        }
    }

    fn cmd_copy_buffer_to_image(&self, cmd: RawCommandBuffer, src: RawBuffer, dst: RawImage, regions: &[BufferTextureCopy]) {
        let regions: Vec<vk::BufferImageCopy> = regions.iter().map(buffer_image_copy_to_vk).collect();
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                vk::CommandBuffer::from_raw(cmd.0),
                vk::Buffer::from_raw(src.0),
                vk::Image::from_raw(dst.0),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &regions,
            )
        }
    }

    fn cmd_copy_image_to_buffer(&self, cmd: RawCommandBuffer, src: RawImage, dst: RawBuffer, regions: &[BufferTextureCopy]) {
        let regions: Vec<vk::BufferImageCopy> = regions.iter().map(buffer_image_copy_to_vk).collect();
        unsafe {
            self.device.cmd_copy_image_to_buffer(
                vk::CommandBuffer::from_raw(cmd.0),
                vk::Image::from_raw(src.0),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::Buffer::from_raw(dst.0),
                &regions,
            )
        }
    }

    fn cmd_blit_image(&self, cmd: RawCommandBuffer, src: RawImage, dst: RawImage, blit: &TextureBlit, filter: BlitFilter) {
        self.record_blit(cmd, src, dst, blit, filter)
    }

    fn cmd_clear_color_image(&self, cmd: RawCommandBuffer, image: RawImage, color: [f32; 4], range: &SubresourceRange) {
        unsafe {
            self.device.cmd_clear_color_image(
                vk::CommandBuffer::from_raw(cmd.0),
                vk::Image::from_raw(image.0),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &vk::ClearColorValue { float32: color },
                &[subresource_range_to_vk(ImageAspects::COLOR, range)],
            )
        }
    }

    fn cmd_clear_depth_stencil_image(
        &self,
        cmd: RawCommandBuffer,
        image: RawImage,
        aspects: ImageAspects,
        depth: f32,
        stencil: u32,
        range: &SubresourceRange,
    ) {
        unsafe {
            self.device.cmd_clear_depth_stencil_image(
                vk::CommandBuffer::from_raw(cmd.0),
                vk::Image::from_raw(image.0),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &vk::ClearDepthStencilValue { depth, stencil },
                &[subresource_range_to_vk(aspects, range)],
            )
        }
    }

    fn cmd_reset_query_pool(&self, cmd: RawCommandBuffer, pool: RawQueryPool, first: u32, count: u32) {
        unsafe {
            self.device.cmd_reset_query_pool(
                vk::CommandBuffer::from_raw(cmd.0),
                vk::QueryPool::from_raw(pool.0),
                first,
                count,
            )
        }
    }

    fn cmd_write_timestamp(&self, cmd: RawCommandBuffer, stage: PipelineStages, pool: RawQueryPool, index: u32) {
        unsafe {
            self.device.cmd_write_timestamp(
                vk::CommandBuffer::from_raw(cmd.0),
                dst_stages_to_vk(stage),
                vk::QueryPool::from_raw(pool.0),
                index,
            )
        }
    }

    fn cmd_begin_query(&self, cmd: RawCommandBuffer, pool: RawQueryPool, index: u32) {
        unsafe {
            self.device.cmd_begin_query(
                vk::CommandBuffer::from_raw(cmd.0),
                vk::QueryPool::from_raw(pool.0),
                index,
                vk::QueryControlFlags::empty(),
            )
        }
    }

    fn cmd_end_query(&self, cmd: RawCommandBuffer, pool: RawQueryPool, index: u32) {
        unsafe {
            self.device
                .cmd_end_query(vk::CommandBuffer::from_raw(cmd.0), vk::QueryPool::from_raw(pool.0), index)
        }
    }

    // ----- synchronization and submission -----

    fn create_fence(&self, signaled: bool) -> Result<RawFence> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe { self.device.create_fence(&vk::FenceCreateInfo::default().flags(flags), None) }
            .map_err(|e| vk_error("Failed to create fence", e))?;
        Ok(RawFence(fence.as_raw()))
    }

    fn destroy_fence(&self, fence: RawFence) {
        unsafe { self.device.destroy_fence(vk::Fence::from_raw(fence.0), None) }
    }

    fn wait_for_fences(&self, fences: &[RawFence], timeout_ns: u64) -> Result<()> {
        let fences: Vec<vk::Fence> = fences.iter().map(|fence| vk::Fence::from_raw(fence.0)).collect();
        unsafe { self.device.wait_for_fences(&fences, true, timeout_ns) }
            .map_err(|e| vk_error("Failed to wait for fences", e))
    }

    fn reset_fences(&self, fences: &[RawFence]) -> Result<()> {
        let fences: Vec<vk::Fence> = fences.iter().map(|fence| vk::Fence::from_raw(fence.0)).collect();
        unsafe { self.device.reset_fences(&fences) }.map_err(|e| vk_error("Failed to reset fences", e))
    }

    fn fence_signaled(&self, fence: RawFence) -> Result<bool> {
        unsafe { self.device.get_fence_status(vk::Fence::from_raw(fence.0)) }
            .map_err(|e| vk_error("Failed to query fence status", e))
    }

    fn create_semaphore(&self) -> Result<RawSemaphore> {
        let semaphore = unsafe { self.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .map_err(|e| vk_error("Failed to create semaphore", e))?;
        Ok(RawSemaphore(semaphore.as_raw()))
    }

    fn destroy_semaphore(&self, semaphore: RawSemaphore) {
        unsafe { self.device.destroy_semaphore(vk::Semaphore::from_raw(semaphore.0), None) }
    }

    fn queue_submit(&self, queue: QueueType, submit: &NativeSubmit<'_>) -> Result<()> {
        let wait_semaphores: Vec<vk::Semaphore> =
            submit.wait_semaphores.iter().map(|(semaphore, _)| vk::Semaphore::from_raw(semaphore.0)).collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = submit
            .wait_semaphores
            .iter()
            .map(|(_, stages)| {
                if stages.is_empty() {
                    vk::PipelineStageFlags::ALL_COMMANDS
                } else {
                    vk::PipelineStageFlags::from_raw(stages.bits())
                }
            })
            .collect();
        let command_buffers: Vec<vk::CommandBuffer> =
            submit.command_buffers.iter().map(|cmd| vk::CommandBuffer::from_raw(cmd.0)).collect();
        let signal_semaphores: Vec<vk::Semaphore> =
            submit.signal_semaphores.iter().map(|semaphore| vk::Semaphore::from_raw(semaphore.0)).collect();

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let vk_queue = lock(self.queues.get(queue));
        unsafe {
            self.device
                .queue_submit(*vk_queue, &[submit_info], vk::Fence::from_raw(submit.fence.0))
        }
        .map_err(|e| vk_error(&format!("Failed to submit to the {:?} queue", queue), e))
    }

    fn wait_idle(&self) -> Result<()> {
        let _queues = self.queues.lock_all();
        unsafe { self.device.device_wait_idle() }.map_err(|e| vk_error("Failed to wait idle", e))
    }

    // ----- presentation -----

    fn create_surface(&self, display: RawDisplayHandle, window: RawWindowHandle) -> Result<RawSurface> {
        self.build_surface(display, window)
    }

    fn destroy_surface(&self, surface: RawSurface) {
        if let Some(loader) = &self.surface_loader {
            unsafe { loader.destroy_surface(vk::SurfaceKHR::from_raw(surface.0), None) }
        }
    }

    fn supports_present(&self, queue: QueueType, surface: RawSurface) -> Result<bool> {
        self.surface_supports_present(queue, surface)
    }

    fn create_swapchain(&self, desc: &NativeSwapchainDesc) -> Result<NativeSwapchain> {
        self.build_swapchain(desc)
    }

    fn destroy_swapchain(&self, swapchain: RawSwapchain) {
        if let Some(loader) = &self.swapchain_loader {
            unsafe { loader.destroy_swapchain(vk::SwapchainKHR::from_raw(swapchain.0), None) }
        }
    }

    fn acquire_next_image(&self, swapchain: RawSwapchain, signal: RawSemaphore) -> Result<AcquiredImage> {
        self.acquire_swapchain_image(swapchain, signal)
    }

    fn queue_present(
        &self,
        queue: QueueType,
        swapchain: RawSwapchain,
        image_index: u32,
        wait: RawSemaphore,
    ) -> Result<SwapchainStatus> {
        self.present_swapchain_image(queue, swapchain, image_index, wait)
    }
}

fn bind_point_to_vk(bind_point: PipelineBindPoint) -> vk::PipelineBindPoint {
    match bind_point {
        PipelineBindPoint::Graphics => vk::PipelineBindPoint::GRAPHICS,
        PipelineBindPoint::Compute => vk::PipelineBindPoint::COMPUTE,
    }
}

pub(crate) fn rect_to_vk(rect: &Rect2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: rect.x, y: rect.y },
        extent: vk::Extent2D { width: rect.width, height: rect.height },
    }
}

fn buffer_image_copy_to_vk(region: &BufferTextureCopy) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: region.buffer_offset,
        buffer_row_length: region.buffer_row_length,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: aspects_to_vk(region.aspects),
            mip_level: region.mip,
            base_array_layer: region.base_layer,
            layer_count: region.layer_count,
        },
        image_offset: vk::Offset3D { x: region.offset[0], y: region.offset[1], z: region.offset[2] },
        image_extent: vk::Extent3D { width: region.extent[0], height: region.extent[1], depth: region.extent[2] },
    }
}

impl Drop for VulkanDriver {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            // 1. Objects the GPU layer never released
            let buffers = std::mem::take(self.buffer_memory.get_mut().unwrap_or_else(PoisonError::into_inner));
            let images = std::mem::take(self.image_memory.get_mut().unwrap_or_else(PoisonError::into_inner));
            if !buffers.is_empty() || !images.is_empty() {
                engine_warn!(
                    "galaxy3d::vulkan",
                    "{} buffer(s) and {} image(s) still alive at shutdown",
                    buffers.len(),
                    images.len()
                );
            }
            {
                let allocator = self.allocator.get_mut().unwrap_or_else(PoisonError::into_inner);
                for (raw, allocation) in buffers {
                    self.device.destroy_buffer(vk::Buffer::from_raw(raw), None);
                    allocator.free(allocation).ok();
                }
                for (raw, allocation) in images {
                    self.device.destroy_image(vk::Image::from_raw(raw), None);
                    allocator.free(allocation).ok();
                }
            }

            // 2. Descriptor pools free every set still allocated from them
            self.descriptor_pools
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .destroy(&self.device);

            // 3. Allocator frees its memory blocks before the device goes away
            ManuallyDrop::drop(&mut self.allocator);

            // 4. No callbacks during teardown
            crate::debug::cleanup_debug_config();
            if let Some((debug_utils, messenger)) = self.debug_messenger.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            // 5. Device and instance
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
