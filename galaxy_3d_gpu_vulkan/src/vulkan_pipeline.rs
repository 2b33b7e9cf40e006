/// Shader modules, pipelines and render passes

use ash::vk;
use ash::vk::Handle;
use galaxy_3d_gpu::galaxy3d::gpu::driver::{
    NativeAttachmentDesc, NativeComputePipelineDesc, NativeGraphicsPipelineDesc, NativeRenderPassDesc, NativeShader,
    NativeShaderStage, RawPipeline, RawRenderPass, RawShaderModule,
};
use galaxy_3d_gpu::galaxy3d::gpu::ShaderStage;
use galaxy_3d_gpu::galaxy3d::{Error, Result};
use galaxy_3d_gpu::{engine_error, engine_warn};
use std::ffi::CString;
use std::io::Cursor;

use crate::vulkan::{vk_error, VulkanDriver};
use crate::vulkan_format::*;
use crate::vulkan_reflect::reflect_vertex_inputs;

/// Entry point names kept alive while a pipeline is created
fn entry_names(stages: &[&NativeShaderStage<'_>]) -> Result<Vec<CString>> {
    stages
        .iter()
        .map(|stage| {
            CString::new(stage.entry_point).map_err(|_| {
                engine_error!("galaxy3d::vulkan", "Invalid shader entry point '{}'", stage.entry_point);
                Error::InvalidResource(format!("Invalid shader entry point '{}'", stage.entry_point))
            })
        })
        .collect()
}

impl VulkanDriver {
    pub(crate) fn build_shader_module(&self, stage: ShaderStage, bytecode: &[u8]) -> Result<NativeShader> {
        let code = ash::util::read_spv(&mut Cursor::new(bytecode)).map_err(|e| {
            engine_error!("galaxy3d::vulkan", "Invalid SPIR-V bytecode ({} bytes): {}", bytecode.len(), e);
            Error::InvalidResource(format!("Invalid SPIR-V bytecode: {}", e))
        })?;

        let info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { self.device.create_shader_module(&info, None) }
            .map_err(|e| vk_error("Failed to create shader module", e))?;

        let reflected_inputs = match stage {
            ShaderStage::Vertex => reflect_vertex_inputs(&code).unwrap_or_else(|e| {
                engine_warn!("galaxy3d::vulkan", "Vertex input reflection unavailable: {}", e);
                Vec::new()
            }),
            _ => Vec::new(),
        };

        Ok(NativeShader { module: RawShaderModule(module.as_raw()), reflected_inputs })
    }

    pub(crate) fn build_graphics_pipeline(&self, desc: &NativeGraphicsPipelineDesc<'_>) -> Result<RawPipeline> {
        let stage_refs: Vec<&NativeShaderStage<'_>> = desc.stages.iter().collect();
        let names = entry_names(&stage_refs)?;
        let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = desc
            .stages
            .iter()
            .zip(&names)
            .map(|(stage, name)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(shader_stage_to_vk(stage.stage))
                    .module(vk::ShaderModule::from_raw(stage.module.0))
                    .name(name)
            })
            .collect();

        let bindings: Vec<vk::VertexInputBindingDescription> = desc
            .vertex_bindings
            .iter()
            .map(|binding| vk::VertexInputBindingDescription {
                binding: binding.binding,
                stride: binding.stride,
                input_rate: input_rate_to_vk(binding.input_rate),
            })
            .collect();
        let attributes: Vec<vk::VertexInputAttributeDescription> = desc
            .vertex_attributes
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                location: attribute.location,
                binding: attribute.binding,
                format: format_to_vk(attribute.format),
                offset: attribute.offset,
            })
            .collect();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(topology_to_vk(desc.topology))
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let raster = desc.rasterization;
        let mut rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(raster.depth_clamp)
            .rasterizer_discard_enable(false)
            .polygon_mode(polygon_mode_to_vk(raster.polygon_mode))
            .line_width(1.0)
            .cull_mode(cull_mode_to_vk(raster.cull_mode))
            .front_face(front_face_to_vk(raster.front_face));
        if let Some(bias) = raster.depth_bias {
            rasterization_state = rasterization_state
                .depth_bias_enable(true)
                .depth_bias_constant_factor(bias.constant_factor)
                .depth_bias_slope_factor(bias.slope_factor)
                .depth_bias_clamp(bias.clamp);
        }

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(sample_count_to_vk(desc.multisample.sample_count))
            .alpha_to_coverage_enable(desc.multisample.alpha_to_coverage)
            .sample_shading_enable(false);

        let ds = desc.depth_stencil;
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(ds.depth_test_enable)
            .depth_write_enable(ds.depth_write_enable)
            .depth_compare_op(compare_op_to_vk(ds.depth_compare_op))
            .depth_bounds_test_enable(false)
            .stencil_test_enable(ds.stencil_test_enable)
            .front(stencil_state_to_vk(&ds.front))
            .back(stencil_state_to_vk(&ds.back));

        let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = desc
            .color_blend
            .iter()
            .map(|blend| vk::PipelineColorBlendAttachmentState {
                blend_enable: blend.blend_enable.into(),
                src_color_blend_factor: blend_factor_to_vk(blend.src_color_factor),
                dst_color_blend_factor: blend_factor_to_vk(blend.dst_color_factor),
                color_blend_op: blend_op_to_vk(blend.color_blend_op),
                src_alpha_blend_factor: blend_factor_to_vk(blend.src_alpha_factor),
                dst_alpha_blend_factor: blend_factor_to_vk(blend.dst_alpha_factor),
                alpha_blend_op: blend_op_to_vk(blend.alpha_blend_op),
                color_write_mask: color_write_mask_to_vk(blend.color_write_mask),
            })
            .collect();
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .depth_stencil_state(&depth_stencil_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(vk::PipelineLayout::from_raw(desc.layout.0))
            .render_pass(vk::RenderPass::from_raw(desc.render_pass.0))
            .subpass(0);

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        self.first_pipeline(pipelines, "graphics")
    }

    pub(crate) fn build_compute_pipeline(&self, desc: &NativeComputePipelineDesc<'_>) -> Result<RawPipeline> {
        let names = entry_names(&[&desc.stage])?;
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(vk::ShaderModule::from_raw(desc.stage.module.0))
            .name(&names[0]);
        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage)
            .layout(vk::PipelineLayout::from_raw(desc.layout.0));

        let pipelines = unsafe {
            self.device
                .create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        self.first_pipeline(pipelines, "compute")
    }

    /// A failed batch may still return created pipelines, destroy them
    fn first_pipeline(
        &self,
        result: std::result::Result<Vec<vk::Pipeline>, (Vec<vk::Pipeline>, vk::Result)>,
        kind: &str,
    ) -> Result<RawPipeline> {
        match result {
            Ok(pipelines) => Ok(RawPipeline(pipelines[0].as_raw())),
            Err((pipelines, e)) => {
                for pipeline in pipelines.into_iter().filter(|pipeline| *pipeline != vk::Pipeline::null()) {
                    unsafe { self.device.destroy_pipeline(pipeline, None) };
                }
                Err(vk_error(&format!("Failed to create {} pipeline", kind), e))
            }
        }
    }

    pub(crate) fn build_render_pass(&self, desc: &NativeRenderPassDesc) -> Result<RawRenderPass> {
        let mut attachments: Vec<vk::AttachmentDescription> = desc.colors.iter().map(attachment_to_vk).collect();

        let color_refs: Vec<vk::AttachmentReference> = (0..desc.colors.len() as u32)
            .map(|attachment| vk::AttachmentReference {
                attachment,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect();

        let depth_ref = desc.depth.as_ref().map(|depth| {
            attachments.push(attachment_to_vk(depth));
            vk::AttachmentReference {
                attachment: desc.colors.len() as u32,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            }
        });

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }

        let attachment_stages =
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(attachment_stages)
            .dst_stage_mask(attachment_stages)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );

        let subpasses = [subpass];
        let dependencies = [dependency];
        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { self.device.create_render_pass(&info, None) }
            .map_err(|e| vk_error("Failed to create render pass", e))?;
        Ok(RawRenderPass(render_pass.as_raw()))
    }
}

fn attachment_to_vk(attachment: &NativeAttachmentDesc) -> vk::AttachmentDescription {
    let (stencil_load_op, stencil_store_op) = if attachment.format.has_stencil() {
        (load_op_to_vk(attachment.load_op), store_op_to_vk(attachment.store_op))
    } else {
        (vk::AttachmentLoadOp::DONT_CARE, vk::AttachmentStoreOp::DONT_CARE)
    };
    vk::AttachmentDescription::default()
        .format(format_to_vk(attachment.format))
        .samples(sample_count_to_vk(attachment.samples))
        .load_op(load_op_to_vk(attachment.load_op))
        .store_op(store_op_to_vk(attachment.store_op))
        .stencil_load_op(stencil_load_op)
        .stencil_store_op(stencil_store_op)
        .initial_layout(image_layout_to_vk(attachment.initial_layout))
        .final_layout(image_layout_to_vk(attachment.final_layout))
}
