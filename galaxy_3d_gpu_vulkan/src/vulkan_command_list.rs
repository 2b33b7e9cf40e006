/// Command buffer allocation and the recording calls with non-trivial translation

use ash::vk;
use ash::vk::Handle;
use galaxy_3d_gpu::galaxy3d::gpu::driver::{
    BlitFilter, CommandBufferLevel, NativeBarrierBatch, NativeInheritance, NativeRenderPassBegin, RawCommandBuffer,
    RawCommandPool, RawImage, TextureBlit,
};
use galaxy_3d_gpu::galaxy3d::Result;

use crate::vulkan::{rect_to_vk, vk_error, VulkanDriver};
use crate::vulkan_format::*;

fn offset_to_vk(offset: [i32; 3]) -> vk::Offset3D {
    vk::Offset3D { x: offset[0], y: offset[1], z: offset[2] }
}

impl VulkanDriver {
    pub(crate) fn allocate_command_buffer_from(
        &self,
        pool: RawCommandPool,
        level: CommandBufferLevel,
    ) -> Result<RawCommandBuffer> {
        let level = match level {
            CommandBufferLevel::Primary => vk::CommandBufferLevel::PRIMARY,
            CommandBufferLevel::Secondary => vk::CommandBufferLevel::SECONDARY,
        };
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(vk::CommandPool::from_raw(pool.0))
            .level(level)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&info) }
            .map_err(|e| vk_error("Failed to allocate command buffer", e))?;
        Ok(RawCommandBuffer(buffers[0].as_raw()))
    }

    /// Secondaries recorded for a render pass continue it through `inheritance`
    pub(crate) fn begin_recording(&self, cmd: RawCommandBuffer, inheritance: Option<&NativeInheritance>) -> Result<()> {
        let inheritance_info = inheritance.map(|inheritance| {
            vk::CommandBufferInheritanceInfo::default()
                .render_pass(vk::RenderPass::from_raw(inheritance.render_pass.0))
                .subpass(0)
                .framebuffer(vk::Framebuffer::from_raw(inheritance.framebuffer.0))
        });

        let mut begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        if let Some(inheritance_info) = inheritance_info.as_ref() {
            begin_info = begin_info
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT | vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE)
                .inheritance_info(inheritance_info);
        }

        unsafe { self.device.begin_command_buffer(vk::CommandBuffer::from_raw(cmd.0), &begin_info) }
            .map_err(|e| vk_error("Failed to begin command buffer", e))
    }

    pub(crate) fn record_barriers(&self, cmd: RawCommandBuffer, batch: &NativeBarrierBatch) {
        if batch.is_empty() {
            return;
        }

        let memory: Vec<vk::MemoryBarrier> = batch
            .memory
            .iter()
            .map(|barrier| {
                vk::MemoryBarrier::default()
                    .src_access_mask(access_to_vk(barrier.src_access))
                    .dst_access_mask(access_to_vk(barrier.dst_access))
            })
            .collect();

        let buffers: Vec<vk::BufferMemoryBarrier> = batch
            .buffers
            .iter()
            .map(|barrier| {
                vk::BufferMemoryBarrier::default()
                    .src_access_mask(access_to_vk(barrier.src_access))
                    .dst_access_mask(access_to_vk(barrier.dst_access))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(vk::Buffer::from_raw(barrier.buffer.0))
                    .offset(barrier.offset)
                    .size(barrier.size)
            })
            .collect();

        let images: Vec<vk::ImageMemoryBarrier> = batch
            .images
            .iter()
            .map(|barrier| {
                vk::ImageMemoryBarrier::default()
                    .src_access_mask(access_to_vk(barrier.src_access))
                    .dst_access_mask(access_to_vk(barrier.dst_access))
                    .old_layout(image_layout_to_vk(barrier.old_layout))
                    .new_layout(image_layout_to_vk(barrier.new_layout))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(vk::Image::from_raw(barrier.image.0))
                    .subresource_range(subresource_range_to_vk(barrier.aspects, &barrier.range))
            })
            .collect();

        unsafe {
            self.device.cmd_pipeline_barrier(
                vk::CommandBuffer::from_raw(cmd.0),
                src_stages_to_vk(batch.src_stages),
                dst_stages_to_vk(batch.dst_stages),
                vk::DependencyFlags::empty(),
                &memory,
                &buffers,
                &images,
            )
        }
    }

    /// Pass contents always come from secondary command buffers
    pub(crate) fn record_begin_render_pass(&self, cmd: RawCommandBuffer, begin: &NativeRenderPassBegin<'_>) {
        let clear_values: Vec<vk::ClearValue> = begin.clear_values.iter().map(clear_value_to_vk).collect();
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(vk::RenderPass::from_raw(begin.render_pass.0))
            .framebuffer(vk::Framebuffer::from_raw(begin.framebuffer.0))
            .render_area(rect_to_vk(&begin.area))
            .clear_values(&clear_values);
        unsafe {
            self.device.cmd_begin_render_pass(
                vk::CommandBuffer::from_raw(cmd.0),
                &info,
                vk::SubpassContents::SECONDARY_COMMAND_BUFFERS,
            )
        }
    }

    pub(crate) fn record_blit(
        &self,
        cmd: RawCommandBuffer,
        src: RawImage,
        dst: RawImage,
        blit: &TextureBlit,
        filter: BlitFilter,
    ) {
        let aspect_mask = aspects_to_vk(blit.aspects);
        let region = vk::ImageBlit {
            src_subresource: vk::ImageSubresourceLayers {
                aspect_mask,
                mip_level: blit.src_mip,
                base_array_layer: blit.src_layer,
                layer_count: 1,
            },
            src_offsets: [offset_to_vk(blit.src_bounds[0]), offset_to_vk(blit.src_bounds[1])],
            dst_subresource: vk::ImageSubresourceLayers {
                aspect_mask,
                mip_level: blit.dst_mip,
                base_array_layer: blit.dst_layer,
                layer_count: 1,
            },
            dst_offsets: [offset_to_vk(blit.dst_bounds[0]), offset_to_vk(blit.dst_bounds[1])],
        };
        unsafe {
            self.device.cmd_blit_image(
                vk::CommandBuffer::from_raw(cmd.0),
                vk::Image::from_raw(src.0),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::Image::from_raw(dst.0),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
                blit_filter_to_vk(filter),
            )
        }
    }
}
