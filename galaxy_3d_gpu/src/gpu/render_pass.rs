/// Render pass descriptions and the render-pass / framebuffer /
/// pipeline-layout caches
///
/// The three caches share one device-wide lock and are keyed by
/// plain-old-data structs hashed by their bytes. Misses are built while
/// holding the write lock.

use std::sync::RwLock;

use bytemuck::{Pod, Zeroable};
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::gpu::barrier::state_info;
use crate::gpu::cache::hash_pod;
use crate::gpu::driver::{
    Driver, ImageLayout, NativeAttachmentDesc, NativeFramebufferDesc, NativeRenderPassDesc, RawDescriptorSetLayout,
    RawFramebuffer, RawImageView, RawPipelineLayout, RawRenderPass,
};
use crate::gpu::argument_set::MAX_ARGUMENT_SETS;
use crate::gpu::pipeline::{RenderTargetFormats, MAX_RENDER_TARGETS};
use crate::gpu::resource::ResourceView;
use crate::gpu::sync;
use crate::gpu::types::{ClearValue, Format, LoadOp, Rect2D, ResourceState, SampleCount, StoreOp};

// ============================================================================
// Public description
// ============================================================================

/// Color attachment of a render pass
#[derive(Clone, Copy)]
pub struct ColorTarget<'a> {
    pub view: &'a ResourceView,
    pub load: LoadOp,
    pub store: StoreOp,
    pub clear: [f32; 4],
    /// State the texture is in when the pass starts
    pub initial_state: ResourceState,
    /// State the pass leaves the texture in
    pub final_state: ResourceState,
}

impl<'a> ColorTarget<'a> {
    /// Clear, render, keep as a render target
    pub fn clear(view: &'a ResourceView, color: [f32; 4]) -> Self {
        Self {
            view,
            load: LoadOp::Clear,
            store: StoreOp::Store,
            clear: color,
            initial_state: ResourceState::RenderTarget,
            final_state: ResourceState::RenderTarget,
        }
    }

    /// Keep existing content
    pub fn load(view: &'a ResourceView) -> Self {
        Self { load: LoadOp::Load, ..Self::clear(view, [0.0; 4]) }
    }
}

/// Depth/stencil attachment of a render pass
#[derive(Clone, Copy)]
pub struct DepthTarget<'a> {
    pub view: &'a ResourceView,
    pub load: LoadOp,
    pub store: StoreOp,
    pub clear_depth: f32,
    pub clear_stencil: u32,
    pub initial_state: ResourceState,
    pub final_state: ResourceState,
}

impl<'a> DepthTarget<'a> {
    pub fn clear(view: &'a ResourceView, depth: f32) -> Self {
        Self {
            view,
            load: LoadOp::Clear,
            store: StoreOp::DontCare,
            clear_depth: depth,
            clear_stencil: 0,
            initial_state: ResourceState::DepthWrite,
            final_state: ResourceState::DepthWrite,
        }
    }
}

/// Attachments a graphics pass renders into
#[derive(Clone, Default)]
pub struct RenderPassDesc<'a> {
    pub colors: Vec<ColorTarget<'a>>,
    pub depth: Option<DepthTarget<'a>>,
}

impl<'a> RenderPassDesc<'a> {
    pub fn extent(&self) -> [u32; 2] {
        self.colors
            .first()
            .map(|c| c.view.extent())
            .or_else(|| self.depth.map(|d| d.view.extent()))
            .unwrap_or([0, 0])
    }

    pub fn render_area(&self) -> Rect2D {
        let [width, height] = self.extent();
        Rect2D::from_extent(width, height)
    }

    /// Formats pipelines drawn in this pass must be built for
    pub fn target_formats(&self) -> RenderTargetFormats {
        RenderTargetFormats {
            colors: self.colors.iter().map(|c| c.view.format()).collect(),
            depth: self.depth.map_or(Format::UNDEFINED, |d| d.view.format()),
            samples: self
                .colors
                .first()
                .map(|c| c.view.samples())
                .or_else(|| self.depth.map(|d| d.view.samples()))
                .unwrap_or_default(),
        }
    }

    /// One clear value per attachment, colors first
    pub fn clear_values(&self) -> Vec<ClearValue> {
        self.colors
            .iter()
            .map(|c| ClearValue::Color(c.clear))
            .chain(self.depth.iter().map(|d| ClearValue::DepthStencil { depth: d.clear_depth, stencil: d.clear_stencil }))
            .collect()
    }

    pub(crate) fn attachment_views(&self) -> Vec<RawImageView> {
        self.colors.iter().map(|c| c.view.raw()).chain(self.depth.iter().map(|d| d.view.raw())).collect()
    }

    pub(crate) fn validate(&self) -> bool {
        let extent = self.extent();
        !(self.colors.is_empty() && self.depth.is_none())
            && self.colors.len() <= MAX_RENDER_TARGETS
            && self.colors.iter().all(|c| c.view.is_texture_view() && c.view.extent() == extent)
            && self.depth.map_or(true, |d| d.view.format().is_depth() && d.view.extent() == extent)
    }
}

// ============================================================================
// POD keys
// ============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub(crate) struct AttachmentKey {
    format: u32,
    samples: u32,
    load: u8,
    store: u8,
    initial_state: u8,
    final_state: u8,
}

impl AttachmentKey {
    fn new(
        format: Format,
        samples: SampleCount,
        load: LoadOp,
        store: StoreOp,
        initial_state: ResourceState,
        final_state: ResourceState,
    ) -> Self {
        Self {
            format: format as u32,
            samples: samples.count(),
            load: load as u8,
            store: store as u8,
            initial_state: initial_state as u8,
            final_state: final_state as u8,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub(crate) struct RenderPassKey {
    colors: [AttachmentKey; MAX_RENDER_TARGETS],
    color_count: u32,
    depth: AttachmentKey,
    has_depth: u32,
}

impl RenderPassKey {
    pub fn from_desc(desc: &RenderPassDesc<'_>) -> Self {
        let mut key = Self::zeroed();
        for (slot, color) in key.colors.iter_mut().zip(&desc.colors) {
            *slot = AttachmentKey::new(
                color.view.format(),
                color.view.samples(),
                color.load,
                color.store,
                color.initial_state,
                color.final_state,
            );
        }
        key.color_count = desc.colors.len().min(MAX_RENDER_TARGETS) as u32;
        if let Some(depth) = &desc.depth {
            key.depth = AttachmentKey::new(
                depth.view.format(),
                depth.view.samples(),
                depth.load,
                depth.store,
                depth.initial_state,
                depth.final_state,
            );
            key.has_depth = 1;
        }
        key
    }

    /// Render pass compatible with any pass rendering into `formats`
    pub fn for_formats(formats: &RenderTargetFormats) -> Self {
        let mut key = Self::zeroed();
        for (slot, format) in key.colors.iter_mut().zip(&formats.colors) {
            *slot = AttachmentKey::new(
                *format,
                formats.samples,
                LoadOp::DontCare,
                StoreOp::Store,
                ResourceState::RenderTarget,
                ResourceState::RenderTarget,
            );
        }
        key.color_count = formats.colors.len().min(MAX_RENDER_TARGETS) as u32;
        if formats.depth != Format::UNDEFINED {
            key.depth = AttachmentKey::new(
                formats.depth,
                formats.samples,
                LoadOp::DontCare,
                StoreOp::Store,
                ResourceState::DepthWrite,
                ResourceState::DepthWrite,
            );
            key.has_depth = 1;
        }
        key
    }
}

/// Native render pass description of a pass description
pub(crate) fn native_render_pass_desc(desc: &RenderPassDesc<'_>) -> NativeRenderPassDesc {
    let attachment = |format: Format,
                      samples: SampleCount,
                      load: LoadOp,
                      store: StoreOp,
                      initial: ResourceState,
                      final_state: ResourceState| NativeAttachmentDesc {
        format,
        samples,
        load_op: load,
        store_op: store,
        // Cleared or don't-care attachments need no prior content
        initial_layout: if load == LoadOp::Load { state_info(initial).layout } else { ImageLayout::Undefined },
        final_layout: state_info(final_state).layout,
    };
    NativeRenderPassDesc {
        colors: desc
            .colors
            .iter()
            .map(|c| attachment(c.view.format(), c.view.samples(), c.load, c.store, c.initial_state, c.final_state))
            .collect(),
        depth: desc
            .depth
            .map(|d| attachment(d.view.format(), d.view.samples(), d.load, d.store, d.initial_state, d.final_state)),
    }
}

/// Native render pass description used only for pipeline compatibility
pub(crate) fn native_compatible_desc(formats: &RenderTargetFormats) -> NativeRenderPassDesc {
    let attachment = |format: Format, state: ResourceState| NativeAttachmentDesc {
        format,
        samples: formats.samples,
        load_op: LoadOp::DontCare,
        store_op: StoreOp::Store,
        initial_layout: state_info(state).layout,
        final_layout: state_info(state).layout,
    };
    NativeRenderPassDesc {
        colors: formats.colors.iter().map(|f| attachment(*f, ResourceState::RenderTarget)).collect(),
        depth: (formats.depth != Format::UNDEFINED).then(|| attachment(formats.depth, ResourceState::DepthWrite)),
    }
}

/// Framebuffer identity: render pass plus attachment views
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub(crate) struct FramebufferKey {
    render_pass: RawRenderPass,
    views: [RawImageView; MAX_RENDER_TARGETS + 1],
    count: u32,
    width: u32,
    height: u32,
    layers: u32,
}

impl FramebufferKey {
    pub fn new(render_pass: RawRenderPass, views: &[RawImageView], extent: [u32; 2]) -> Self {
        let mut key = Self::zeroed();
        key.render_pass = render_pass;
        for (slot, view) in key.views.iter_mut().zip(views) {
            *slot = *view;
        }
        key.count = views.len().min(MAX_RENDER_TARGETS + 1) as u32;
        key.width = extent[0];
        key.height = extent[1];
        key.layers = 1;
        key
    }

    fn views(&self) -> &[RawImageView] {
        &self.views[..self.count as usize]
    }

    fn references(&self, view: RawImageView) -> bool {
        self.views().contains(&view)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub(crate) struct PipelineLayoutKey {
    set_layouts: [RawDescriptorSetLayout; MAX_ARGUMENT_SETS],
    count: u32,
    pad: u32,
}

impl PipelineLayoutKey {
    pub fn new(set_layouts: &[RawDescriptorSetLayout]) -> Self {
        let mut key = Self::zeroed();
        for (slot, layout) in key.set_layouts.iter_mut().zip(set_layouts) {
            *slot = *layout;
        }
        key.count = set_layouts.len().min(MAX_ARGUMENT_SETS) as u32;
        key
    }

    fn set_layouts(&self) -> &[RawDescriptorSetLayout] {
        &self.set_layouts[..self.count as usize]
    }
}

// ============================================================================
// Cache
// ============================================================================

type PodMap<K, V> = FxHashMap<u64, Vec<(K, V)>>;

fn find<K: PartialEq, V: Copy>(map: &PodMap<K, V>, hash: u64, key: &K) -> Option<V> {
    map.get(&hash)?.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
}

#[derive(Default)]
struct RenderTargetMaps {
    render_passes: PodMap<RenderPassKey, RawRenderPass>,
    framebuffers: PodMap<FramebufferKey, RawFramebuffer>,
    pipeline_layouts: PodMap<PipelineLayoutKey, RawPipelineLayout>,
}

/// Render passes, framebuffers and pipeline layouts behind one lock
#[derive(Default)]
pub(crate) struct RenderTargetCache {
    maps: RwLock<RenderTargetMaps>,
}

impl RenderTargetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_render_pass(
        &self,
        driver: &dyn Driver,
        key: &RenderPassKey,
        native: impl FnOnce() -> NativeRenderPassDesc,
    ) -> Result<RawRenderPass> {
        let hash = hash_pod(key);
        if let Some(render_pass) = find(&sync::read(&self.maps).render_passes, hash, key) {
            return Ok(render_pass);
        }
        let mut maps = sync::write(&self.maps);
        if let Some(render_pass) = find(&maps.render_passes, hash, key) {
            return Ok(render_pass);
        }
        let render_pass = driver.create_render_pass(&native())?;
        maps.render_passes.entry(hash).or_default().push((*key, render_pass));
        Ok(render_pass)
    }

    pub fn get_framebuffer(&self, driver: &dyn Driver, key: &FramebufferKey) -> Result<RawFramebuffer> {
        let hash = hash_pod(key);
        if let Some(framebuffer) = find(&sync::read(&self.maps).framebuffers, hash, key) {
            return Ok(framebuffer);
        }
        let mut maps = sync::write(&self.maps);
        if let Some(framebuffer) = find(&maps.framebuffers, hash, key) {
            return Ok(framebuffer);
        }
        let framebuffer = driver.create_framebuffer(&NativeFramebufferDesc {
            render_pass: key.render_pass,
            attachments: key.views(),
            width: key.width,
            height: key.height,
            layers: key.layers,
        })?;
        maps.framebuffers.entry(hash).or_default().push((*key, framebuffer));
        Ok(framebuffer)
    }

    pub fn get_pipeline_layout(&self, driver: &dyn Driver, set_layouts: &[RawDescriptorSetLayout]) -> Result<RawPipelineLayout> {
        let key = PipelineLayoutKey::new(set_layouts);
        let hash = hash_pod(&key);
        if let Some(layout) = find(&sync::read(&self.maps).pipeline_layouts, hash, &key) {
            return Ok(layout);
        }
        let mut maps = sync::write(&self.maps);
        if let Some(layout) = find(&maps.pipeline_layouts, hash, &key) {
            return Ok(layout);
        }
        let layout = driver.create_pipeline_layout(key.set_layouts())?;
        maps.pipeline_layouts.entry(hash).or_default().push((key, layout));
        Ok(layout)
    }

    /// Evict every framebuffer that references `view`, returning them for
    /// deferred destruction
    pub fn invalidate_framebuffers(&self, view: RawImageView) -> Vec<RawFramebuffer> {
        let mut maps = sync::write(&self.maps);
        let mut evicted = Vec::new();
        maps.framebuffers.retain(|_, bucket| {
            bucket.retain(|(key, framebuffer)| {
                let keep = !key.references(view);
                if !keep {
                    evicted.push(*framebuffer);
                }
                keep
            });
            !bucket.is_empty()
        });
        evicted
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        let maps = sync::read(&self.maps);
        (
            maps.render_passes.values().map(Vec::len).sum(),
            maps.framebuffers.values().map(Vec::len).sum(),
            maps.pipeline_layouts.values().map(Vec::len).sum(),
        )
    }

    /// Destroy everything; the GPU must be idle
    pub fn destroy_all(&self, driver: &dyn Driver) {
        let mut maps = sync::write(&self.maps);
        for (_, framebuffer) in maps.framebuffers.drain().flat_map(|(_, b)| b) {
            driver.destroy_framebuffer(framebuffer);
        }
        for (_, render_pass) in maps.render_passes.drain().flat_map(|(_, b)| b) {
            driver.destroy_render_pass(render_pass);
        }
        for (_, layout) in maps.pipeline_layouts.drain().flat_map(|(_, b)| b) {
            driver.destroy_pipeline_layout(layout);
        }
    }
}

#[cfg(test)]
#[path = "render_pass_tests.rs"]
mod tests;
