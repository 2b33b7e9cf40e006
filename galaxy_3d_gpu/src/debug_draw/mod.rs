/// Debug line drawing
///
/// Primitives are expanded on the CPU into a line list and uploaded into
/// the geometry pool once per frame. Draw the result with a
/// `PrimitiveTopology::LineList` pipeline built from
/// [`DebugDrawList::vertex_input`].

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::gpu::{
    Format, TransientAllocation, TransientPool, VertexAttribute, VertexBinding, VertexInputRate, VertexInputState,
    VertexSemantic,
};

/// Segments per great circle of a debug sphere
pub const SPHERE_SEGMENTS: usize = 16;

/// Line-list vertex: position then RGBA color
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DebugVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl DebugVertex {
    pub fn new(position: Vec3, color: Vec4) -> Self {
        Self { position: position.to_array(), color: color.to_array() }
    }
}

/// Shape to draw as lines
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DebugPrimitive {
    Line { from: Vec3, to: Vec3 },
    /// Axis-aligned box
    Aabb { min: Vec3, max: Vec3 },
    /// Three great circles around the axes
    Sphere { center: Vec3, radius: f32 },
    /// Three axis-aligned segments of length `size` through `center`
    Cross { center: Vec3, size: f32 },
    /// Near plane corners then far plane corners, each in
    /// bottom-left, bottom-right, top-right, top-left order
    FrustumCorners([Vec3; 8]),
}

impl DebugPrimitive {
    /// Frustum of a view-projection matrix with a 0..1 depth range
    pub fn frustum(view_projection: Mat4) -> Self {
        let inverse = view_projection.inverse();
        let mut corners = [Vec3::ZERO; 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            let z = if i < 4 { 0.0 } else { 1.0 };
            let (x, y) = match i % 4 {
                0 => (-1.0, -1.0),
                1 => (1.0, -1.0),
                2 => (1.0, 1.0),
                _ => (-1.0, 1.0),
            };
            *corner = inverse.project_point3(Vec3::new(x, y, z));
        }
        DebugPrimitive::FrustumCorners(corners)
    }

    /// Number of line segments this primitive expands to
    pub fn line_count(&self) -> usize {
        match self {
            DebugPrimitive::Line { .. } => 1,
            DebugPrimitive::Aabb { .. } | DebugPrimitive::FrustumCorners(_) => 12,
            DebugPrimitive::Sphere { .. } => 3 * SPHERE_SEGMENTS,
            DebugPrimitive::Cross { .. } => 3,
        }
    }

    fn emit(&self, color: Vec4, out: &mut Vec<DebugVertex>) {
        let mut line = |a: Vec3, b: Vec3| {
            out.push(DebugVertex::new(a, color));
            out.push(DebugVertex::new(b, color));
        };
        match *self {
            DebugPrimitive::Line { from, to } => line(from, to),
            DebugPrimitive::Aabb { min, max } => {
                let corners = [
                    Vec3::new(min.x, min.y, min.z),
                    Vec3::new(max.x, min.y, min.z),
                    Vec3::new(max.x, max.y, min.z),
                    Vec3::new(min.x, max.y, min.z),
                    Vec3::new(min.x, min.y, max.z),
                    Vec3::new(max.x, min.y, max.z),
                    Vec3::new(max.x, max.y, max.z),
                    Vec3::new(min.x, max.y, max.z),
                ];
                box_edges(&corners, line);
            }
            DebugPrimitive::FrustumCorners(corners) => box_edges(&corners, line),
            DebugPrimitive::Sphere { center, radius } => {
                let axes = [(Vec3::X, Vec3::Y), (Vec3::Y, Vec3::Z), (Vec3::Z, Vec3::X)];
                for (u, v) in axes {
                    let point = |i: usize| {
                        let angle = i as f32 / SPHERE_SEGMENTS as f32 * std::f32::consts::TAU;
                        center + (u * angle.cos() + v * angle.sin()) * radius
                    };
                    for i in 0..SPHERE_SEGMENTS {
                        line(point(i), point(i + 1));
                    }
                }
            }
            DebugPrimitive::Cross { center, size } => {
                let half = size * 0.5;
                for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
                    line(center - axis * half, center + axis * half);
                }
            }
        }
    }
}

/// 12 edges of a hexahedron given as two faces of four corners
fn box_edges(corners: &[Vec3; 8], mut line: impl FnMut(Vec3, Vec3)) {
    for i in 0..4 {
        let j = (i + 1) % 4;
        line(corners[i], corners[j]);
        line(corners[i + 4], corners[j + 4]);
        line(corners[i], corners[i + 4]);
    }
}

/// Primitives accumulated for one frame
#[derive(Debug, Default)]
pub struct DebugDrawList {
    vertices: Vec<DebugVertex>,
}

impl DebugDrawList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, primitive: DebugPrimitive, color: Vec4) {
        self.vertices.reserve(primitive.line_count() * 2);
        primitive.emit(color, &mut self.vertices);
    }

    pub fn line(&mut self, from: Vec3, to: Vec3, color: Vec4) {
        self.add(DebugPrimitive::Line { from, to }, color);
    }

    pub fn vertices(&self) -> &[DebugVertex] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
    }

    /// Copy the vertices into `pool` for this frame; None when empty
    pub fn upload<'a>(&self, pool: &'a TransientPool) -> Option<TransientAllocation<'a>> {
        if self.vertices.is_empty() {
            return None;
        }
        Some(pool.push_slice(&self.vertices))
    }

    /// Vertex layout of `DebugVertex` at binding 0
    pub fn vertex_input() -> VertexInputState {
        VertexInputState {
            bindings: vec![VertexBinding {
                binding: 0,
                stride: std::mem::size_of::<DebugVertex>() as u32,
                input_rate: VertexInputRate::Vertex,
            }],
            attributes: vec![
                VertexAttribute {
                    semantic: VertexSemantic::Position,
                    semantic_index: 0,
                    binding: 0,
                    format: Format::R32G32B32_SFLOAT,
                    offset: 0,
                },
                VertexAttribute {
                    semantic: VertexSemantic::Color,
                    semantic_index: 0,
                    binding: 0,
                    format: Format::R32G32B32A32_SFLOAT,
                    offset: 12,
                },
            ],
        }
    }
}

#[cfg(test)]
#[path = "debug_draw_tests.rs"]
mod tests;
