/// GPU device: resource creation, object caches, transient pools, contexts
/// and the end-of-frame protocol
///
/// `Device` is an explicit object passed by reference; nothing here is a
/// process global except the one-device claim held by [`Engine`]. Resources
/// keep the device internals (`DeviceShared`) alive through an `Arc`, so a
/// resource dropped after the `Device` still has its native handle freed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

use rustc_hash::FxHashMap;

use crate::config::Config;
use crate::engine::{DeviceClaim, Engine};
use crate::error::Result;
use crate::gpu::argument_set::{Argument, ArgumentSet, ArgumentSetLayout, ArgumentSetLayoutDesc, MAX_ARGUMENT_SETS};
use crate::gpu::cache::{hash_key, ObjectCache};
use crate::gpu::context::{ComputeContext, ContextCore, GraphicsContext, TransferContext};
use crate::gpu::driver::{
    Driver, DriverProperties, NativeComputePipelineDesc, NativeGraphicsPipelineDesc, NativeObject,
    NativeShaderStage, PipelineBindPoint, QueryKind, RawFence, RawImageView, RawSemaphore,
};
use crate::gpu::frame::{Deferred, DeferredQueue, FrameSync};
use crate::gpu::pipeline::{
    resolve_vertex_input, ComputePipeline, ComputePipelineDesc, ComputePipelineKey, Pipeline, PipelineDesc,
    PipelineHandle, PipelineKey,
};
use crate::gpu::render_pass::{native_compatible_desc, RenderPassKey, RenderTargetCache};
use crate::gpu::resource::{
    Buffer, BufferDesc, QueryPool, ResourceView, ResourceViewDesc, Sampler, SamplerDesc, Shader, ShaderDesc,
    ShaderId, Texture, TextureDesc, ViewSource,
};
use crate::gpu::swapchain::{Swapchain, SwapchainDesc};
use crate::gpu::sync;
use crate::gpu::transient_pool::{StagingPool, TransientPool};
use crate::gpu::types::{BufferUsage, CpuAccess, QueueType, ShaderStage};
use crate::gpu::worker::{WorkerRegistry, WorkerSlot};
use crate::memory::FrameAllocator;
use crate::{engine_debug, engine_error, engine_fatal, engine_info, engine_trace, engine_warn};

const SOURCE: &str = "galaxy3d::gpu::Device";

// ============================================================================
// Pipeline eviction bookkeeping
// ============================================================================

/// Cache keys that name the shaders they were built from
pub(crate) trait ShaderKeyed {
    fn shader_ids(&self) -> Vec<ShaderId>;
}

impl ShaderKeyed for PipelineKey {
    fn shader_ids(&self) -> Vec<ShaderId> {
        self.shaders()
    }
}

impl ShaderKeyed for ComputePipelineKey {
    fn shader_ids(&self) -> Vec<ShaderId> {
        vec![self.shader]
    }
}

/// Reverse references from live shaders to the pipelines using them
///
/// Lives inside the pipeline cache lock so that eviction and the reverse
/// sets change together.
pub(crate) struct ShaderUsers<K> {
    users: FxHashMap<ShaderId, Vec<(u64, K)>>,
}

impl<K> Default for ShaderUsers<K> {
    fn default() -> Self {
        Self { users: FxHashMap::default() }
    }
}

impl<K: Clone + ShaderKeyed> ShaderUsers<K> {
    fn register(&mut self, hash: u64, key: &K) {
        for id in key.shader_ids() {
            self.users.entry(id).or_default().push((hash, key.clone()));
        }
    }
}

/// Remove `shader` from the reverse sets and evict every pipeline none of
/// whose shaders is still alive
fn evict_shader_users<K, V>(cache: &ObjectCache<K, Arc<V>, ShaderUsers<K>>, shader: ShaderId) -> Vec<Arc<V>>
where
    K: Eq + Clone + ShaderKeyed,
{
    let mut guard = cache.write();
    let entries = &mut *guard;
    let Some(users) = entries.extra.users.remove(&shader) else {
        return Vec::new();
    };
    let mut evicted = Vec::new();
    for (hash, key) in users {
        let still_used = key
            .shader_ids()
            .iter()
            .any(|id| *id != shader && entries.extra.users.contains_key(id));
        if still_used {
            continue;
        }
        if let Some(pipeline) = entries.remove(hash, &key) {
            evicted.push(pipeline);
        }
    }
    evicted
}

// ============================================================================
// Shared device internals
// ============================================================================

/// State shared by the device and every resource it created
pub(crate) struct DeviceShared {
    driver: Arc<dyn Driver>,
    frames_in_flight: usize,
    /// Frame currently being recorded, starting at 0
    frame_number: AtomicU64,
    main_thread: ThreadId,
    deferred: DeferredQueue,
    frame_sync: Mutex<FrameSync>,
    pub(crate) render_targets: RenderTargetCache,
    samplers: ObjectCache<SamplerDesc, Arc<Sampler>>,
    layouts: ObjectCache<ArgumentSetLayoutDesc, Arc<ArgumentSetLayout>>,
    pipelines: ObjectCache<PipelineKey, Arc<Pipeline>, ShaderUsers<PipelineKey>>,
    compute_pipelines: ObjectCache<ComputePipelineKey, Arc<ComputePipeline>, ShaderUsers<ComputePipelineKey>>,
    next_shader_id: AtomicU64,
    _claim: DeviceClaim,
}

impl DeviceShared {
    pub fn driver(&self) -> &dyn Driver {
        &*self.driver
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number.load(Ordering::Acquire)
    }

    /// Frame slot of the frame being recorded
    pub fn frame_index(&self) -> usize {
        (self.frame_number() % self.frames_in_flight as u64) as usize
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    pub fn is_main_thread(&self) -> bool {
        std::thread::current().id() == self.main_thread
    }

    /// Destroy `object` once the GPU has finished the current frame
    pub fn release(&self, object: NativeObject) {
        self.deferred.push(self.frame_number(), Deferred::Native(object));
    }

    pub fn add_frame_complete_callback(&self, callback: Box<dyn FnOnce() + Send>) {
        self.deferred.push(self.frame_number(), Deferred::Callback(callback));
    }

    /// Evict cached framebuffers built on `view` before it is destroyed
    pub fn invalidate_framebuffers(&self, view: RawImageView) {
        for framebuffer in self.render_targets.invalidate_framebuffers(view) {
            self.release(NativeObject::Framebuffer(framebuffer));
        }
    }

    pub fn next_shader_id(&self) -> ShaderId {
        ShaderId(self.next_shader_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Tear down the pipelines whose last shader just went away
    pub fn shader_destroyed(&self, shader: ShaderId) {
        let graphics = evict_shader_users(&self.pipelines, shader);
        let compute = evict_shader_users(&self.compute_pipelines, shader);
        if graphics.is_empty() && compute.is_empty() {
            return;
        }
        engine_debug!(
            SOURCE,
            "Shader {} destroyed, evicting {} graphics and {} compute pipelines",
            shader.0,
            graphics.len(),
            compute.len()
        );
        for pipeline in graphics {
            self.release(NativeObject::Pipeline(pipeline.handle.raw));
        }
        for pipeline in compute {
            self.release(NativeObject::Pipeline(pipeline.handle.raw));
        }
    }

    /// Fence for one submission of the current frame
    pub fn acquire_fence(&self) -> RawFence {
        let slot = self.frame_index();
        let result = sync::lock(&self.frame_sync).acquire_fence(slot, || self.driver.create_fence(false));
        match result {
            Ok(fence) => fence,
            Err(err) => engine_fatal!(SOURCE, "create_fence failed: {}", err),
        }
    }

    /// Semaphore recycled once the current frame completes
    pub fn acquire_semaphore(&self) -> RawSemaphore {
        let slot = self.frame_index();
        let result = sync::lock(&self.frame_sync).acquire_semaphore(slot, || self.driver.create_semaphore());
        match result {
            Ok(semaphore) => semaphore,
            Err(err) => engine_fatal!(SOURCE, "create_semaphore failed: {}", err),
        }
    }

    /// Advance to the next frame and reclaim the slot it lands on
    ///
    /// Waits on the fences the slot's previous occupant submitted, then runs
    /// everything released during or before that frame.
    fn advance_frame(&self) -> usize {
        let frame_number = self.frame_number.fetch_add(1, Ordering::AcqRel) + 1;
        let slot = (frame_number % self.frames_in_flight as u64) as usize;

        let (fences, previous) = {
            let mut frame_sync = sync::lock(&self.frame_sync);
            let slot = &mut frame_sync.slots[slot];
            (slot.fences.clone(), slot.frame_number.replace(frame_number))
        };
        if !fences.is_empty() {
            if let Err(err) = self.driver.wait_for_fences(&fences, u64::MAX) {
                engine_fatal!(SOURCE, "wait_for_fences failed for frame slot {}: {}", slot, err);
            }
            if let Err(err) = self.driver.reset_fences(&fences) {
                engine_fatal!(SOURCE, "reset_fences failed for frame slot {}: {}", slot, err);
            }
        }
        sync::lock(&self.frame_sync).recycle(slot);

        if let Some(completed) = previous {
            let ready = self.deferred.take_completed(completed);
            if !ready.is_empty() {
                engine_trace!(SOURCE, "Frame {} complete, running {} deferred entries", completed, ready.len());
            }
            for item in ready {
                item.run(self.driver());
            }
        }
        slot
    }
}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        let driver = &*self.driver;
        if let Err(err) = driver.wait_idle() {
            engine_error!(SOURCE, "wait_idle failed during teardown: {}", err);
        }
        for item in self.deferred.take_all() {
            item.run(driver);
        }
        for pipeline in self.pipelines.write().drain() {
            driver.destroy_pipeline(pipeline.handle.raw);
        }
        for pipeline in self.compute_pipelines.write().drain() {
            driver.destroy_pipeline(pipeline.handle.raw);
        }
        self.render_targets.destroy_all(driver);
        for layout in self.layouts.write().drain() {
            layout.destroy(driver);
        }
        for sampler in self.samplers.write().drain() {
            driver.destroy_sampler(sampler.raw());
        }
        let (fences, semaphores) = sync::lock(&self.frame_sync).drain_all();
        for fence in fences {
            driver.destroy_fence(fence);
        }
        for semaphore in semaphores {
            driver.destroy_semaphore(semaphore);
        }
    }
}

// ============================================================================
// Device
// ============================================================================

/// Number of live objects in each device cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub pipelines: usize,
    pub compute_pipelines: usize,
    pub argument_set_layouts: usize,
    pub samplers: usize,
    pub render_passes: usize,
    pub framebuffers: usize,
    pub pipeline_layouts: usize,
}

/// The GPU device
///
/// Only one may exist at a time. The public context API is used from the
/// thread that created the device; command lists may be recorded on
/// registered worker threads.
pub struct Device {
    shared: Arc<DeviceShared>,
    config: Config,
    transfer: ContextCore,
    compute: ContextCore,
    graphics: ContextCore,
    constant_pool: TransientPool,
    geometry_pool: TransientPool,
    staging_pool: StagingPool,
    frame_allocator: FrameAllocator,
    dummy_vertex_buffer: Buffer,
    workers: WorkerRegistry,
}

impl Device {
    /// Create the device on top of a backend driver
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, if another device is alive,
    /// or if the initial pool buffers cannot be created.
    pub fn new(driver: Arc<dyn Driver>, config: Config) -> Result<Device> {
        config.validate()?;
        let claim = Engine::claim_device()?;
        let properties = driver.properties().clone();
        let frames = config.frames_in_flight;

        let shared = Arc::new(DeviceShared {
            driver,
            frames_in_flight: frames,
            frame_number: AtomicU64::new(0),
            main_thread: std::thread::current().id(),
            deferred: DeferredQueue::new(),
            frame_sync: Mutex::new(FrameSync::new(frames)),
            render_targets: RenderTargetCache::new(),
            samplers: ObjectCache::new(),
            layouts: ObjectCache::new(),
            pipelines: ObjectCache::new(),
            compute_pipelines: ObjectCache::new(),
            next_shader_id: AtomicU64::new(1),
            _claim: claim,
        });

        let constant_alignment = properties.min_constant_buffer_offset_alignment.max(16).next_power_of_two();
        let geometry_alignment = properties.min_storage_buffer_offset_alignment.max(16).next_power_of_two();
        let constant_pool = TransientPool::new(
            Arc::clone(&shared),
            "constant pool",
            BufferUsage::CONSTANT,
            config.constant_pool_size,
            frames,
            constant_alignment,
        )?;
        let geometry_pool = TransientPool::new(
            Arc::clone(&shared),
            "geometry pool",
            BufferUsage::VERTEX | BufferUsage::INDEX | BufferUsage::SHADER_READ | BufferUsage::INDIRECT,
            config.geometry_pool_size,
            frames,
            geometry_alignment,
        )?;

        let dummy_vertex_buffer = Buffer::new(
            Arc::clone(&shared),
            BufferDesc {
                size: config.dummy_vertex_buffer_size,
                usage: BufferUsage::VERTEX,
                cpu_access: CpuAccess::Upload,
            },
        )?;
        dummy_vertex_buffer.write(0, &vec![0u8; config.dummy_vertex_buffer_size as usize]);

        let device = Device {
            transfer: ContextCore::new(QueueType::Transfer, "Transfer", config.max_workers, frames),
            compute: ContextCore::new(QueueType::Compute, "Compute", config.max_workers, frames),
            graphics: ContextCore::new(QueueType::Graphics, "Graphics", config.max_workers, frames),
            staging_pool: StagingPool::new(Arc::clone(&shared)),
            frame_allocator: FrameAllocator::new(frames, config.frame_allocator_size),
            workers: WorkerRegistry::new(config.max_workers),
            shared,
            config,
            constant_pool,
            geometry_pool,
            dummy_vertex_buffer,
        };

        engine_info!(
            SOURCE,
            "Device created on {} ({}), {} frames in flight, {} worker slots",
            properties.adapter_name,
            properties.backend,
            frames,
            device.config.max_workers
        );
        Ok(device)
    }

    pub(crate) fn shared(&self) -> &Arc<DeviceShared> {
        &self.shared
    }

    pub fn properties(&self) -> &DriverProperties {
        self.shared.driver().properties()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Frame currently being recorded, counting from 0
    pub fn frame_number(&self) -> u64 {
        self.shared.frame_number()
    }

    /// Frame slot of the frame being recorded
    pub fn frame_index(&self) -> usize {
        self.shared.frame_index()
    }

    pub fn frames_in_flight(&self) -> usize {
        self.shared.frames_in_flight()
    }

    // ===== RESOURCES =====

    pub fn create_buffer(&self, desc: &BufferDesc) -> Result<Buffer> {
        Buffer::new(Arc::clone(&self.shared), *desc)
    }

    pub fn create_texture(&self, desc: &TextureDesc) -> Result<Texture> {
        Texture::new(Arc::clone(&self.shared), *desc)
    }

    pub fn create_resource_view(&self, source: ViewSource<'_>, desc: &ResourceViewDesc) -> Result<ResourceView> {
        ResourceView::new(Arc::clone(&self.shared), source, desc)
    }

    pub fn create_shader(&self, desc: &ShaderDesc<'_>) -> Result<Shader> {
        Shader::new(Arc::clone(&self.shared), desc)
    }

    pub fn create_query_pool(&self, kind: QueryKind, count: u32) -> Result<QueryPool> {
        QueryPool::new(Arc::clone(&self.shared), kind, count)
    }

    pub fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<Swapchain> {
        Swapchain::new(Arc::clone(&self.shared), desc)
    }

    // ===== CACHED OBJECTS =====

    /// Shared sampler for `desc`, created on first request
    pub fn get_sampler(&self, desc: &SamplerDesc) -> Result<Arc<Sampler>> {
        let driver = self.shared.driver();
        let lookup = self.shared.samplers.get_or_insert_with(
            hash_key(desc),
            desc,
            || Ok(Arc::new(Sampler::new(driver.create_sampler(desc)?, *desc))),
            |_, _| {},
        )?;
        let (sampler, discarded) = lookup.into_parts();
        if let Some(discarded) = discarded {
            driver.destroy_sampler(discarded.raw());
        }
        Ok(sampler)
    }

    /// Shared argument set layout for `desc`, created on first request
    pub fn get_argument_set_layout(&self, desc: &ArgumentSetLayoutDesc) -> Result<Arc<ArgumentSetLayout>> {
        let driver = self.shared.driver();
        let constant_buffer = self.constant_pool.buffer();
        let lookup = self.shared.layouts.get_or_insert_with(
            hash_key(desc),
            desc,
            || Ok(Arc::new(ArgumentSetLayout::new(driver, desc, constant_buffer)?)),
            |_, _| {},
        )?;
        let (layout, discarded) = lookup.into_parts();
        if let Some(discarded) = discarded {
            discarded.destroy(driver);
        }
        Ok(layout)
    }

    /// Bind `arguments` to a new argument set, valid for the current frame
    pub fn create_argument_set(
        &self,
        layout: &Arc<ArgumentSetLayout>,
        arguments: &[Argument<'_>],
    ) -> Result<ArgumentSet> {
        ArgumentSet::new(Arc::clone(&self.shared), &self.constant_pool, layout, arguments)
    }

    /// Cached graphics pipeline for `desc`
    ///
    /// A miss builds the pipeline without holding the cache lock. If another
    /// thread inserted an equal pipeline meanwhile, the new one is destroyed
    /// and the cached one returned.
    pub fn get_pipeline(&self, desc: &PipelineDesc<'_>) -> Result<Arc<Pipeline>> {
        let key = PipelineKey::from_desc(desc);
        let hash = hash_key(&key);
        self.get_pipeline_with_hash(desc, key, hash)
    }

    pub(crate) fn get_pipeline_with_hash(&self, desc: &PipelineDesc<'_>, key: PipelineKey, hash: u64) -> Result<Arc<Pipeline>> {
        let lookup = self.shared.pipelines.get_or_insert_with(
            hash,
            &key,
            || self.build_pipeline(desc),
            |users, _| users.register(hash, &key),
        )?;
        let (pipeline, discarded) = lookup.into_parts();
        if let Some(discarded) = discarded {
            engine_trace!(SOURCE, "Lost pipeline insertion race, destroying duplicate");
            self.shared.driver().destroy_pipeline(discarded.handle.raw);
        }
        Ok(pipeline)
    }

    fn build_pipeline(&self, desc: &PipelineDesc<'_>) -> Result<Arc<Pipeline>> {
        debug_assert_eq!(desc.vertex_shader.stage(), ShaderStage::Vertex, "vertex_shader is not a vertex shader");
        debug_assert!(
            desc.pixel_shader.map_or(true, |s| s.stage() == ShaderStage::Pixel),
            "pixel_shader is not a pixel shader"
        );
        debug_assert!(desc.argument_layouts.len() <= MAX_ARGUMENT_SETS, "too many argument sets");

        let shared = &self.shared;
        let driver = shared.driver();

        let resolved = resolve_vertex_input(&desc.vertex_input, desc.vertex_shader.vertex_inputs());
        for input in &resolved.missing {
            engine_warn!(
                SOURCE,
                "Vertex input {:?}{} at location {} is not provided, reading zeros from the dummy vertex buffer",
                input.semantic,
                input.semantic_index,
                input.location
            );
        }

        let set_layouts: Vec<_> = desc.argument_layouts.iter().map(|l| l.raw()).collect();
        let layout = shared.render_targets.get_pipeline_layout(driver, &set_layouts)?;
        let render_pass = shared.render_targets.get_render_pass(
            driver,
            &RenderPassKey::for_formats(&desc.targets),
            || native_compatible_desc(&desc.targets),
        )?;

        let mut stages = vec![NativeShaderStage {
            module: desc.vertex_shader.module(),
            entry_point: desc.vertex_shader.entry_point(),
            stage: ShaderStage::Vertex,
        }];
        if let Some(pixel) = desc.pixel_shader {
            stages.push(NativeShaderStage {
                module: pixel.module(),
                entry_point: pixel.entry_point(),
                stage: ShaderStage::Pixel,
            });
        }
        let color_blend = vec![desc.color_blend; desc.targets.colors.len()];

        let raw = driver.create_graphics_pipeline(&NativeGraphicsPipelineDesc {
            stages: &stages,
            vertex_bindings: &resolved.bindings,
            vertex_attributes: &resolved.attributes,
            topology: desc.topology,
            rasterization: &desc.rasterization,
            depth_stencil: &desc.depth_stencil,
            color_blend: &color_blend,
            multisample: &desc.multisample,
            layout,
            render_pass,
        })?;
        engine_debug!(SOURCE, "Created graphics pipeline {:?}", raw);

        Ok(Arc::new(Pipeline {
            handle: PipelineHandle {
                raw,
                layout,
                bind_point: PipelineBindPoint::Graphics,
                argument_set_count: desc.argument_layouts.len() as u32,
                dynamic_offset_counts: desc.argument_layouts.iter().map(|l| l.dynamic_offset_count()).collect(),
            },
            targets: desc.targets.clone(),
            uses_dummy_vertex_binding: resolved.uses_dummy_binding(),
            topology: desc.topology,
        }))
    }

    /// Cached compute pipeline for `desc`
    pub fn get_compute_pipeline(&self, desc: &ComputePipelineDesc<'_>) -> Result<Arc<ComputePipeline>> {
        debug_assert_eq!(desc.shader.stage(), ShaderStage::Compute, "compute pipeline needs a compute shader");
        debug_assert!(desc.argument_layouts.len() <= MAX_ARGUMENT_SETS, "too many argument sets");

        let key = ComputePipelineKey::from_desc(desc);
        let hash = hash_key(&key);
        let shared = &self.shared;
        let driver = shared.driver();

        let build = || -> Result<Arc<ComputePipeline>> {
            let set_layouts: Vec<_> = desc.argument_layouts.iter().map(|l| l.raw()).collect();
            let layout = shared.render_targets.get_pipeline_layout(driver, &set_layouts)?;
            let raw = driver.create_compute_pipeline(&NativeComputePipelineDesc {
                stage: NativeShaderStage {
                    module: desc.shader.module(),
                    entry_point: desc.shader.entry_point(),
                    stage: ShaderStage::Compute,
                },
                layout,
            })?;
            engine_debug!(SOURCE, "Created compute pipeline {:?}", raw);
            Ok(Arc::new(ComputePipeline {
                handle: PipelineHandle {
                    raw,
                    layout,
                    bind_point: PipelineBindPoint::Compute,
                    argument_set_count: desc.argument_layouts.len() as u32,
                    dynamic_offset_counts: desc.argument_layouts.iter().map(|l| l.dynamic_offset_count()).collect(),
                },
            }))
        };

        let lookup = shared
            .compute_pipelines
            .get_or_insert_with(hash, &key, build, |users, _| users.register(hash, &key))?;
        let (pipeline, discarded) = lookup.into_parts();
        if let Some(discarded) = discarded {
            driver.destroy_pipeline(discarded.handle.raw);
        }
        Ok(pipeline)
    }

    pub fn cache_stats(&self) -> CacheStats {
        let (render_passes, framebuffers, pipeline_layouts) = self.shared.render_targets.counts();
        CacheStats {
            pipelines: self.shared.pipelines.len(),
            compute_pipelines: self.shared.compute_pipelines.len(),
            argument_set_layouts: self.shared.layouts.len(),
            samplers: self.shared.samplers.len(),
            render_passes,
            framebuffers,
            pipeline_layouts,
        }
    }

    // ===== CONTEXTS =====

    pub fn transfer_context(&self) -> TransferContext<'_> {
        TransferContext::new(self, &self.transfer)
    }

    pub fn compute_context(&self) -> ComputeContext<'_> {
        ComputeContext::new(self, &self.compute)
    }

    pub fn graphics_context(&self) -> GraphicsContext<'_> {
        GraphicsContext::new(self, &self.graphics)
    }

    // ===== TRANSIENT MEMORY =====

    /// Per-frame constant memory backing argument set constants
    pub fn constant_pool(&self) -> &TransientPool {
        &self.constant_pool
    }

    /// Per-frame scratch memory for vertices, indices and indirect arguments
    pub fn geometry_pool(&self) -> &TransientPool {
        &self.geometry_pool
    }

    pub fn staging_pool(&self) -> &StagingPool {
        &self.staging_pool
    }

    /// CPU scratch arena of the current frame
    pub fn frame_allocator(&self) -> &FrameAllocator {
        &self.frame_allocator
    }

    pub(crate) fn dummy_vertex_buffer(&self) -> &Buffer {
        &self.dummy_vertex_buffer
    }

    // ===== WORKERS =====

    /// Claim a worker slot for recording command lists on another thread
    pub fn register_worker(&self) -> Result<WorkerSlot> {
        self.workers.register()
    }

    pub fn unregister_worker(&self, slot: WorkerSlot) {
        self.workers.unregister(slot);
    }

    // ===== FRAME PROTOCOL =====

    /// Run `callback` once the GPU has finished all work of the current frame
    pub fn add_frame_complete_callback(&self, callback: impl FnOnce() + Send + 'static) {
        self.shared.add_frame_complete_callback(Box::new(callback));
    }

    /// Entries waiting for a frame to complete (native objects and callbacks)
    pub fn pending_deferred(&self) -> usize {
        self.shared.deferred.len()
    }

    /// Submit outstanding work and move to the next frame
    ///
    /// Blocks until the GPU has finished the frame that last used the new
    /// frame slot, then recycles that slot's fences, semaphores, command
    /// pools, transient sections and deferred destructions.
    pub fn end_frame(&mut self) {
        debug_assert!(self.shared.is_main_thread(), "end_frame called off the main thread");
        for core in [&self.transfer, &self.compute, &self.graphics] {
            debug_assert_eq!(core.open_passes(), 0, "{} context has an unsubmitted pass at end_frame", core.name());
            debug_assert!(!core.is_presenting(), "{} context has an acquired image at end_frame", core.name());
            core.flush(&self.shared);
        }

        let slot = self.shared.advance_frame();

        let driver = self.shared.driver();
        for core in [&self.transfer, &self.compute, &self.graphics] {
            core.begin_frame(driver, slot);
        }
        self.constant_pool.begin_frame(slot);
        self.geometry_pool.begin_frame(slot);
        self.frame_allocator.begin_frame(slot);

        engine_trace!(SOURCE, "Frame {} begins in slot {}", self.shared.frame_number(), slot);
    }

    /// Block until the GPU is idle and free everything released in earlier frames
    pub fn wait_idle(&self) -> Result<()> {
        self.shared.driver().wait_idle()?;
        if let Some(completed) = self.shared.frame_number().checked_sub(1) {
            for item in self.shared.deferred.take_completed(completed) {
                item.run(self.shared.driver());
            }
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        let driver = self.shared.driver();
        if let Err(err) = driver.wait_idle() {
            engine_error!(SOURCE, "wait_idle failed while destroying the device: {}", err);
        }
        for core in [&self.transfer, &self.compute, &self.graphics] {
            core.destroy(driver);
        }
        engine_info!(SOURCE, "Device destroyed after {} frames", self.shared.frame_number());
    }
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
