//! Unit tests for compute and graphics command lists
//!
//! Lists are recorded through the graphics and compute contexts of a mock
//! device; assertions run on the flattened command stream of the submitted
//! primaries.

use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;

use crate::gpu::argument_set::{Argument, ArgumentDesc, ArgumentSetLayout, ArgumentSetLayoutDesc};
use crate::gpu::barrier::ResourceBarrier;
use crate::gpu::command_list::GraphicsCommandList;
use crate::gpu::driver::{PipelineBindPoint, QueryKind};
use crate::gpu::mock_driver::*;
use crate::gpu::pipeline::{ComputePipelineDesc, Pipeline, PrimitiveTopology, DUMMY_VERTEX_BINDING};
use crate::gpu::render_pass::{ColorTarget, RenderPassDesc};
use crate::gpu::resource::{Buffer, BufferDesc, ResourceView, ShaderVertexInput, VertexSemantic};
use crate::gpu::types::{
    BufferUsage, CpuAccess, Format, IndexType, Rect2D, ResourceState, ShaderStage, ShaderStages, Viewport,
};
use crate::gpu::{Device, Shader, ShaderDesc};

fn buffer(device: &Device, usage: BufferUsage) -> Buffer {
    device
        .create_buffer(&BufferDesc { size: 1024, usage, cpu_access: CpuAccess::None })
        .unwrap()
}

fn constant_layout(device: &Device, size: u32, stages: ShaderStages) -> Arc<ArgumentSetLayout> {
    device
        .get_argument_set_layout(&ArgumentSetLayoutDesc::new(vec![ArgumentDesc::constants(size, stages)]))
        .unwrap()
}

fn clear_pass(view: &ResourceView) -> RenderPassDesc<'_> {
    RenderPassDesc { colors: vec![ColorTarget::clear(view, [0.0; 4])], depth: None }
}

fn draw_pipeline(device: &Device) -> (Shader, Shader, Arc<Pipeline>) {
    let vs = shader(device, ShaderStage::Vertex);
    let ps = shader(device, ShaderStage::Pixel);
    let pipeline = device.get_pipeline(&pipeline_desc(&vs, &ps)).unwrap();
    (vs, ps, pipeline)
}

/// Commands recorded inside the render passes of every submitted primary
fn pass_commands(driver: &MockDriver) -> Vec<Command> {
    let mut inside = false;
    let mut out = Vec::new();
    for command in driver.submitted().into_iter().flat_map(|cmd| driver.flatten(cmd)) {
        match command {
            Command::BeginRenderPass { .. } => inside = true,
            Command::EndRenderPass => inside = false,
            command if inside => out.push(command),
            _ => {}
        }
    }
    out
}

fn draw(vertex_count: u32) -> Command {
    Command::Draw { vertex_count, instance_count: 1, first_vertex: 0, first_instance: 0 }
}

fn vertex_counts(commands: &[Command]) -> Vec<u32> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::Draw { vertex_count, .. } => Some(*vertex_count),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Redundant state elimination
// ============================================================================

#[test]
#[serial]
fn test_repeated_binds_are_not_reissued() {
    let (driver, device) = mock_device();
    let (_texture, view) = render_target(&device);
    let (_vs, _ps, pipeline) = draw_pipeline(&device);
    let gfx = device.graphics_context();

    let mut list = gfx.create_render_pass(&clear_pass(&view)).unwrap();
    list.set_pipeline(&pipeline);
    list.draw(3, 1, 0, 0);
    list.set_pipeline(&pipeline);
    list.set_viewport(Viewport::from_extent(64, 64));
    list.set_scissor(Rect2D { x: 0, y: 0, width: 64, height: 64 });
    list.draw(6, 1, 0, 0);
    list.end();
    gfx.submit_render_pass(list);
    gfx.submit();

    assert_eq!(
        pass_commands(&driver),
        vec![
            Command::BindPipeline(PipelineBindPoint::Graphics, pipeline.handle().raw()),
            Command::SetViewport(Viewport::from_extent(64, 64)),
            Command::SetScissor(Rect2D { x: 0, y: 0, width: 64, height: 64 }),
            draw(3),
            draw(6),
        ]
    );
}

#[test]
#[serial]
fn test_changed_viewport_is_reissued_once() {
    let (driver, device) = mock_device();
    let (_texture, view) = render_target(&device);
    let (_vs, _ps, pipeline) = draw_pipeline(&device);
    let gfx = device.graphics_context();

    let mut list = gfx.create_render_pass(&clear_pass(&view)).unwrap();
    list.set_pipeline(&pipeline);
    list.draw(3, 1, 0, 0);
    list.set_viewport(Viewport::from_extent(32, 32));
    list.draw(3, 1, 0, 0);
    list.set_viewport(Viewport::from_extent(32, 32));
    list.draw(3, 1, 0, 0);
    list.end();
    gfx.submit_render_pass(list);
    gfx.submit();

    let viewports: Vec<_> = pass_commands(&driver)
        .into_iter()
        .filter_map(|c| match c {
            Command::SetViewport(viewport) => Some(viewport),
            _ => None,
        })
        .collect();
    assert_eq!(viewports, vec![Viewport::from_extent(64, 64), Viewport::from_extent(32, 32)]);
}

#[test]
#[serial]
fn test_vertex_buffers_bind_in_contiguous_runs() {
    let (driver, device) = mock_device();
    let (_texture, view) = render_target(&device);
    let (_vs, _ps, pipeline) = draw_pipeline(&device);
    let buffers: Vec<Buffer> = (0..3).map(|_| buffer(&device, BufferUsage::VERTEX)).collect();
    let gfx = device.graphics_context();
    let barriers: Vec<_> = buffers
        .iter()
        .map(|b| ResourceBarrier::buffer(b, ResourceState::Undefined, ResourceState::VertexBuffer))
        .collect();
    gfx.resource_barrier(&barriers);

    let mut list = gfx.create_render_pass(&clear_pass(&view)).unwrap();
    list.set_pipeline(&pipeline);
    list.set_vertex_buffer(0, &buffers[0], 0);
    list.set_vertex_buffer(1, &buffers[1], 0);
    list.set_vertex_buffer(3, &buffers[2], 0);
    list.draw(3, 1, 0, 0);
    list.set_vertex_buffer(1, &buffers[1], 64);
    list.set_vertex_buffer(0, &buffers[0], 0);
    list.draw(3, 1, 0, 0);
    list.set_vertex_buffer(1, &buffers[1], 64);
    list.draw(3, 1, 0, 0);
    list.end();
    gfx.submit_render_pass(list);
    gfx.submit();

    let binds: Vec<_> = pass_commands(&driver)
        .into_iter()
        .filter(|c| matches!(c, Command::BindVertexBuffers { .. }))
        .collect();
    assert_eq!(
        binds,
        vec![
            Command::BindVertexBuffers {
                first_binding: 0,
                buffers: vec![buffers[0].raw(), buffers[1].raw()],
                offsets: vec![0, 0],
            },
            Command::BindVertexBuffers { first_binding: 3, buffers: vec![buffers[2].raw()], offsets: vec![0] },
            Command::BindVertexBuffers { first_binding: 1, buffers: vec![buffers[1].raw()], offsets: vec![64] },
        ]
    );
}

#[test]
#[serial]
fn test_transient_geometry_binds_at_its_offset() {
    let (driver, device) = mock_device();
    let (_texture, view) = render_target(&device);
    let (_vs, _ps, pipeline) = draw_pipeline(&device);
    let gfx = device.graphics_context();

    device.geometry_pool().push_slice(&[1u8; 3]);
    let vertices = device.geometry_pool().push_slice(&[0.0f32; 9]);
    let indices = device.geometry_pool().push_slice(&[0u16, 1, 2]);
    assert_ne!(vertices.offset(), 0);

    let mut list = gfx.create_render_pass(&clear_pass(&view)).unwrap();
    list.set_pipeline(&pipeline);
    list.set_transient_vertex_buffer(0, &vertices);
    list.set_transient_index_buffer(&indices, IndexType::U16);
    list.draw_indexed(3, 1, 0, 0, 0);
    list.end();
    gfx.submit_render_pass(list);
    gfx.submit();

    let commands = pass_commands(&driver);
    assert!(commands.contains(&Command::BindVertexBuffers {
        first_binding: 0,
        buffers: vec![vertices.buffer()],
        offsets: vec![vertices.offset()],
    }));
    assert!(commands.contains(&Command::BindIndexBuffer {
        buffer: indices.buffer(),
        offset: indices.offset(),
        index_type: IndexType::U16,
    }));
}

#[test]
#[serial]
fn test_index_buffer_is_bound_once() {
    let (driver, device) = mock_device();
    let (_texture, view) = render_target(&device);
    let (_vs, _ps, pipeline) = draw_pipeline(&device);
    let indices = buffer(&device, BufferUsage::INDEX);
    let gfx = device.graphics_context();
    gfx.resource_barrier(&[ResourceBarrier::buffer(&indices, ResourceState::Undefined, ResourceState::IndexBuffer)]);

    let mut list = gfx.create_render_pass(&clear_pass(&view)).unwrap();
    list.set_pipeline(&pipeline);
    list.set_index_buffer(&indices, 0, IndexType::U32);
    list.draw_indexed(6, 1, 0, 0, 0);
    list.set_index_buffer(&indices, 0, IndexType::U32);
    list.draw_indexed(6, 1, 6, 0, 0);
    list.end();
    gfx.submit_render_pass(list);
    gfx.submit();

    let commands = pass_commands(&driver);
    let binds = commands.iter().filter(|c| matches!(c, Command::BindIndexBuffer { .. })).count();
    let draws = commands.iter().filter(|c| matches!(c, Command::DrawIndexed { .. })).count();
    assert_eq!(binds, 1);
    assert_eq!(draws, 2);
}

#[test]
#[serial]
fn test_indirect_draw_uses_the_argument_buffer() {
    let (driver, device) = mock_device();
    let (_texture, view) = render_target(&device);
    let (_vs, _ps, pipeline) = draw_pipeline(&device);
    let args = buffer(&device, BufferUsage::INDIRECT);
    let gfx = device.graphics_context();
    gfx.resource_barrier(&[ResourceBarrier::buffer(&args, ResourceState::Undefined, ResourceState::IndirectArgument)]);

    let mut list = gfx.create_render_pass(&clear_pass(&view)).unwrap();
    list.set_pipeline(&pipeline);
    list.draw_indirect(&args, 16, 4, 16);
    list.end();
    gfx.submit_render_pass(list);
    gfx.submit();

    assert!(pass_commands(&driver).contains(&Command::DrawIndirect { buffer: args.raw(), offset: 16, draw_count: 4 }));
}

// ============================================================================
// Dummy vertex binding
// ============================================================================

#[test]
#[serial]
fn test_dummy_binding_is_bound_once_per_list() {
    let (driver, device) = mock_device();
    let (_texture, view) = render_target(&device);
    let vs = device
        .create_shader(&ShaderDesc {
            stage: ShaderStage::Vertex,
            bytecode: &[1, 2, 3, 4],
            entry_point: "main",
            vertex_inputs: Some(vec![ShaderVertexInput {
                location: 0,
                semantic: VertexSemantic::Normal,
                semantic_index: 0,
                format: Format::R32G32B32_SFLOAT,
            }]),
        })
        .unwrap();
    let ps = shader(&device, ShaderStage::Pixel);
    let triangles = device.get_pipeline(&pipeline_desc(&vs, &ps)).unwrap();
    let lines = device
        .get_pipeline(&crate::gpu::PipelineDesc { topology: PrimitiveTopology::LineList, ..pipeline_desc(&vs, &ps) })
        .unwrap();
    assert!(triangles.uses_dummy_vertex_binding() && lines.uses_dummy_vertex_binding());
    let dummy = device.dummy_vertex_buffer().raw();
    let gfx = device.graphics_context();

    let mut list = gfx.create_render_pass(&clear_pass(&view)).unwrap();
    list.set_pipeline(&triangles);
    list.draw(3, 1, 0, 0);
    list.set_pipeline(&lines);
    list.draw(2, 1, 0, 0);
    list.end();
    gfx.submit_render_pass(list);
    gfx.submit();

    let commands = pass_commands(&driver);
    let dummy_binds: Vec<_> = commands
        .iter()
        .filter(|c| matches!(c, Command::BindVertexBuffers { first_binding, .. } if *first_binding == DUMMY_VERTEX_BINDING))
        .collect();
    assert_eq!(
        dummy_binds,
        vec![&Command::BindVertexBuffers { first_binding: DUMMY_VERTEX_BINDING, buffers: vec![dummy], offsets: vec![0] }]
    );
    let pipeline_binds = commands.iter().filter(|c| matches!(c, Command::BindPipeline(..))).count();
    assert_eq!(pipeline_binds, 2);
}

#[test]
#[serial]
fn test_complete_vertex_input_skips_the_dummy_binding() {
    let (driver, device) = mock_device();
    let (_texture, view) = render_target(&device);
    let (_vs, _ps, pipeline) = draw_pipeline(&device);
    assert!(!pipeline.uses_dummy_vertex_binding());
    let gfx = device.graphics_context();

    let mut list = gfx.create_render_pass(&clear_pass(&view)).unwrap();
    list.set_pipeline(&pipeline);
    list.draw(3, 1, 0, 0);
    list.end();
    gfx.submit_render_pass(list);
    gfx.submit();

    assert!(pass_commands(&driver).iter().all(|c| !matches!(c, Command::BindVertexBuffers { .. })));
}

// ============================================================================
// Argument sets
// ============================================================================

#[test]
#[serial]
fn test_argument_sets_bind_as_one_run_with_concatenated_offsets() {
    let (driver, device) = mock_device();
    let (_texture, view) = render_target(&device);
    let vs = shader(&device, ShaderStage::Vertex);
    let ps = shader(&device, ShaderStage::Pixel);
    let layouts: Vec<_> = [16, 32, 48].iter().map(|&size| constant_layout(&device, size, ShaderStages::GRAPHICS)).collect();
    let pipeline = device
        .get_pipeline(&crate::gpu::PipelineDesc { argument_layouts: layouts.clone(), ..pipeline_desc(&vs, &ps) })
        .unwrap();

    let value = [1.0f32; 4];
    let sets: Vec<_> = layouts
        .iter()
        .map(|layout| device.create_argument_set(layout, &[Argument::constants(&value)]).unwrap())
        .collect();
    let replacement = device.create_argument_set(&layouts[1], &[Argument::constants(&value)]).unwrap();
    assert_eq!(replacement.raw(), sets[1].raw());
    assert_ne!(replacement.dynamic_offsets(), sets[1].dynamic_offsets());

    let gfx = device.graphics_context();
    let mut list = gfx.create_render_pass(&clear_pass(&view)).unwrap();
    list.set_pipeline(&pipeline);
    for (index, set) in sets.iter().enumerate() {
        list.set_argument_set(index, set);
    }
    list.draw(3, 1, 0, 0);
    list.set_argument_set(1, &replacement);
    list.draw(3, 1, 0, 0);
    list.set_argument_set(1, &replacement);
    list.set_argument_set(0, &sets[0]);
    list.draw(3, 1, 0, 0);
    list.end();
    gfx.submit_render_pass(list);
    gfx.submit();

    let binds: Vec<_> = pass_commands(&driver)
        .into_iter()
        .filter(|c| matches!(c, Command::BindDescriptorSets { .. }))
        .collect();
    assert_eq!(
        binds,
        vec![
            Command::BindDescriptorSets {
                first_set: 0,
                sets: sets.iter().map(|s| s.raw()).collect(),
                dynamic_offsets: sets.iter().flat_map(|s| s.dynamic_offsets().to_vec()).collect(),
            },
            Command::BindDescriptorSets {
                first_set: 1,
                sets: vec![replacement.raw()],
                dynamic_offsets: replacement.dynamic_offsets().to_vec(),
            },
        ]
    );
}

#[test]
#[serial]
fn test_new_pipeline_layout_rebinds_every_set() {
    let (driver, device) = mock_device();
    let cs = shader(&device, ShaderStage::Compute);
    let first = constant_layout(&device, 16, ShaderStages::COMPUTE);
    let second = constant_layout(&device, 32, ShaderStages::COMPUTE);
    let single = device
        .get_compute_pipeline(&ComputePipelineDesc { shader: &cs, argument_layouts: vec![first.clone()] })
        .unwrap();
    let double = device
        .get_compute_pipeline(&ComputePipelineDesc { shader: &cs, argument_layouts: vec![first.clone(), second.clone()] })
        .unwrap();
    let value = 7u32;
    let a = device.create_argument_set(&first, &[Argument::constants(&value)]).unwrap();
    let b = device.create_argument_set(&second, &[Argument::constants(&value)]).unwrap();

    let compute = device.compute_context();
    let mut pass = compute.create_compute_pass();
    pass.set_pipeline(&single);
    pass.set_argument_set(0, &a);
    pass.dispatch(1, 1, 1);
    pass.dispatch(2, 1, 1);
    pass.set_pipeline(&double);
    pass.set_argument_set(1, &b);
    pass.dispatch(3, 1, 1);
    pass.end();
    compute.submit_compute_pass(pass);
    compute.submit();

    let commands: Vec<_> = driver.submitted().into_iter().flat_map(|cmd| driver.flatten(cmd)).collect();
    assert_eq!(
        commands,
        vec![
            Command::BindPipeline(PipelineBindPoint::Compute, single.handle().raw()),
            Command::BindDescriptorSets {
                first_set: 0,
                sets: vec![a.raw()],
                dynamic_offsets: a.dynamic_offsets().to_vec(),
            },
            Command::Dispatch(1, 1, 1),
            Command::Dispatch(2, 1, 1),
            Command::BindPipeline(PipelineBindPoint::Compute, double.handle().raw()),
            Command::BindDescriptorSets {
                first_set: 0,
                sets: vec![a.raw(), b.raw()],
                dynamic_offsets: [a.dynamic_offsets(), b.dynamic_offsets()].concat(),
            },
            Command::Dispatch(3, 1, 1),
        ]
    );
}

#[test]
#[serial]
fn test_indirect_dispatch() {
    let (driver, device) = mock_device();
    let cs = shader(&device, ShaderStage::Compute);
    let pipeline = device
        .get_compute_pipeline(&ComputePipelineDesc { shader: &cs, argument_layouts: Vec::new() })
        .unwrap();
    let args = buffer(&device, BufferUsage::INDIRECT | BufferUsage::SHADER_WRITE);
    let compute = device.compute_context();
    compute.resource_barrier(&[ResourceBarrier::buffer(&args, ResourceState::Undefined, ResourceState::IndirectArgument)]);

    let mut pass = compute.create_compute_pass();
    pass.set_pipeline(&pipeline);
    pass.dispatch_indirect(&args, 12);
    pass.end();
    compute.submit_compute_pass(pass);
    compute.submit();

    let commands: Vec<_> = driver.submitted().into_iter().flat_map(|cmd| driver.flatten(cmd)).collect();
    assert_eq!(commands.last(), Some(&Command::DispatchIndirect { buffer: args.raw(), offset: 12 }));
}

// ============================================================================
// Queries
// ============================================================================

#[test]
#[serial]
fn test_queries_are_recorded_in_place() {
    let (driver, device) = mock_device();
    let (_texture, view) = render_target(&device);
    let (_vs, _ps, pipeline) = draw_pipeline(&device);
    let timestamps = device.create_query_pool(QueryKind::Timestamp, 4).unwrap();
    let occlusion = device.create_query_pool(QueryKind::Occlusion, 4).unwrap();
    let gfx = device.graphics_context();

    let mut list = gfx.create_render_pass(&clear_pass(&view)).unwrap();
    list.write_timestamp(&timestamps, 0);
    list.set_pipeline(&pipeline);
    list.begin_query(&occlusion, 2);
    list.draw(3, 1, 0, 0);
    list.end_query(&occlusion, 2);
    list.write_timestamp(&timestamps, 1);
    list.end();
    gfx.submit_render_pass(list);
    gfx.submit();

    let commands = pass_commands(&driver);
    let position = |target: &Command| commands.iter().position(|c| c == target).unwrap();
    let begin = position(&Command::BeginQuery { pool: occlusion.raw(), index: 2 });
    let end = position(&Command::EndQuery { pool: occlusion.raw(), index: 2 });
    let drawn = position(&draw(3));
    assert!(position(&Command::WriteTimestamp { pool: timestamps.raw(), index: 0 }) < begin);
    assert!(begin < drawn && drawn < end);
    assert!(end < position(&Command::WriteTimestamp { pool: timestamps.raw(), index: 1 }));
}

// ============================================================================
// Child lists
// ============================================================================

#[test]
#[serial]
fn test_children_execute_in_submission_order() {
    let (driver, device) = mock_device();
    let (_texture, view) = render_target(&device);
    let (_vs, _ps, pipeline) = draw_pipeline(&device);
    let workers: Vec<_> = (0..3).map(|_| device.register_worker().unwrap()).collect();
    let gfx = device.graphics_context();

    let mut root = gfx.create_render_pass(&clear_pass(&view)).unwrap();
    root.set_pipeline(&pipeline);
    root.draw(100, 1, 0, 0);
    let children: Vec<_> = workers.iter().map(|&worker| root.create_child(worker)).collect();
    assert!(root.has_children());

    let recorded: Vec<GraphicsCommandList> = std::thread::scope(|scope| {
        let handles: Vec<_> = children
            .into_iter()
            .enumerate()
            .map(|(i, mut child)| {
                let pipeline = &pipeline;
                scope.spawn(move || {
                    // Later children finish first
                    std::thread::sleep(Duration::from_millis(10 * (3 - i as u64)));
                    child.set_pipeline(pipeline);
                    child.draw(i as u32 + 1, 1, 0, 0);
                    child.end();
                    child
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    root.submit_children(recorded);
    root.end();
    gfx.submit_render_pass(root);
    gfx.submit();

    assert_eq!(vertex_counts(&pass_commands(&driver)), vec![100, 1, 2, 3]);
}

#[test]
#[serial]
fn test_child_starts_without_bound_state() {
    let (driver, device) = mock_device();
    let (_texture, view) = render_target(&device);
    let (_vs, _ps, pipeline) = draw_pipeline(&device);
    let worker = device.register_worker().unwrap();
    let gfx = device.graphics_context();

    let mut root = gfx.create_render_pass(&clear_pass(&view)).unwrap();
    root.set_pipeline(&pipeline);
    root.set_viewport(Viewport::from_extent(16, 16));
    root.draw(1, 1, 0, 0);
    let mut child = root.create_child(worker);
    assert!(child.is_child());
    assert_eq!(child.worker(), worker);
    assert_eq!(child.render_area(), root.render_area());
    child.set_pipeline(&pipeline);
    child.draw(2, 1, 0, 0);
    child.end();
    root.submit_children(vec![child]);
    root.end();
    gfx.submit_render_pass(root);
    gfx.submit();

    let commands = pass_commands(&driver);
    let child_start = commands.iter().position(|c| *c == draw(1)).unwrap() + 1;
    assert_eq!(
        commands[child_start..],
        [
            Command::BindPipeline(PipelineBindPoint::Graphics, pipeline.handle().raw()),
            Command::SetViewport(Viewport::from_extent(64, 64)),
            Command::SetScissor(Rect2D { x: 0, y: 0, width: 64, height: 64 }),
            draw(2),
        ]
    );
}

#[test]
#[serial]
fn test_children_record_on_their_worker_pools() {
    let (driver, device) = mock_device();
    let (_texture, view) = render_target(&device);
    let (_vs, _ps, pipeline) = draw_pipeline(&device);
    let worker = device.register_worker().unwrap();
    let gfx = device.graphics_context();

    let mut root = gfx.create_render_pass(&clear_pass(&view)).unwrap();
    root.set_pipeline(&pipeline);
    root.draw(1, 1, 0, 0);
    let mut child = root.create_child(worker);
    child.set_pipeline(&pipeline);
    child.draw(2, 1, 0, 0);
    child.end();
    root.submit_children(vec![child]);
    root.end();
    gfx.submit_render_pass(root);
    gfx.submit();

    // Root segment, child segment, plus the primary
    let state = driver.state();
    let secondaries = state
        .levels
        .values()
        .filter(|level| **level == crate::gpu::driver::CommandBufferLevel::Secondary)
        .count();
    assert_eq!(secondaries, 2);
    let inherited: Vec<_> = state.inheritance.values().collect();
    assert_eq!(inherited.len(), 2);
    assert_eq!(inherited[0], inherited[1]);
}

#[test]
#[serial]
fn test_compute_children_follow_parent_segments() {
    let (driver, device) = mock_device();
    let cs = shader(&device, ShaderStage::Compute);
    let pipeline = device
        .get_compute_pipeline(&ComputePipelineDesc { shader: &cs, argument_layouts: Vec::new() })
        .unwrap();
    let workers: Vec<_> = (0..2).map(|_| device.register_worker().unwrap()).collect();
    let compute = device.compute_context();

    let mut pass = compute.create_compute_pass();
    pass.set_pipeline(&pipeline);
    pass.dispatch(1, 1, 1);
    let mut children: Vec<_> = workers.iter().map(|&w| pass.create_child(w)).collect();
    for (i, child) in children.iter_mut().enumerate().rev() {
        child.set_pipeline(&pipeline);
        child.dispatch(10 + i as u32, 1, 1);
        child.end();
    }
    pass.submit_children(children);
    pass.end();
    compute.submit_compute_pass(pass);
    compute.submit();

    let dispatches: Vec<u32> = driver
        .submitted()
        .into_iter()
        .flat_map(|cmd| driver.flatten(cmd))
        .filter_map(|c| match c {
            Command::Dispatch(x, _, _) => Some(x),
            _ => None,
        })
        .collect();
    assert_eq!(dispatches, vec![1, 10, 11]);
}

#[test]
#[cfg(debug_assertions)]
#[serial]
#[should_panic(expected = "has children")]
fn test_parent_with_children_cannot_record() {
    let (_driver, device) = mock_device();
    let (_texture, view) = render_target(&device);
    let (_vs, _ps, pipeline) = draw_pipeline(&device);
    let worker = device.register_worker().unwrap();
    let gfx = device.graphics_context();

    let mut root = gfx.create_render_pass(&clear_pass(&view)).unwrap();
    let _child = root.create_child(worker);
    root.set_pipeline(&pipeline);
    root.draw(3, 1, 0, 0);
}

#[test]
#[cfg(debug_assertions)]
#[serial]
#[should_panic(expected = "child command list must be ended before submission")]
fn test_unended_graphics_child_cannot_be_merged() {
    let (_driver, device) = mock_device();
    let (_texture, view) = render_target(&device);
    let (_vs, _ps, pipeline) = draw_pipeline(&device);
    let worker = device.register_worker().unwrap();
    let gfx = device.graphics_context();

    let mut root = gfx.create_render_pass(&clear_pass(&view)).unwrap();
    let mut child = root.create_child(worker);
    child.set_pipeline(&pipeline);
    child.draw(3, 1, 0, 0);
    root.submit_children(vec![child]);
}

#[test]
#[cfg(debug_assertions)]
#[serial]
#[should_panic(expected = "child command list must be ended before submission")]
fn test_unended_compute_child_cannot_be_merged() {
    let (_driver, device) = mock_device();
    let cs = shader(&device, ShaderStage::Compute);
    let pipeline = device
        .get_compute_pipeline(&ComputePipelineDesc { shader: &cs, argument_layouts: Vec::new() })
        .unwrap();
    let worker = device.register_worker().unwrap();
    let compute = device.compute_context();

    let mut pass = compute.create_compute_pass();
    let mut child = pass.create_child(worker);
    child.set_pipeline(&pipeline);
    child.dispatch(1, 1, 1);
    pass.submit_children(vec![child]);
}

#[test]
#[cfg(debug_assertions)]
#[serial]
#[should_panic(expected = "child belongs to another render pass")]
fn test_child_cannot_move_to_another_render_pass() {
    let (_driver, device) = mock_device();
    let (_texture, view) = render_target(&device);
    let (_other_texture, other_view) = render_target(&device);
    let worker = device.register_worker().unwrap();
    let gfx = device.graphics_context();

    let mut first = gfx.create_render_pass(&clear_pass(&view)).unwrap();
    let mut second = gfx.create_render_pass(&clear_pass(&other_view)).unwrap();
    let mut child = first.create_child(worker);
    child.end();
    second.submit_children(vec![child]);
}
