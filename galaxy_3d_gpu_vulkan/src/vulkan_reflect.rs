/// SPIR-V vertex input reflection with spirq

use galaxy_3d_gpu::galaxy3d::gpu::{Format, ShaderVertexInput, VertexSemantic};
use galaxy_3d_gpu::galaxy3d::{Error, Result};
use galaxy_3d_gpu::engine_warn;
use spirq::ty::{ScalarType, Type};
use spirq::var::Variable;

/// Reflect the located inputs of every entry point in `code`
///
/// Inputs whose names carry no known semantic, or whose type has no vertex
/// format, are skipped with a warning.
pub(crate) fn reflect_vertex_inputs(code: &[u32]) -> Result<Vec<ShaderVertexInput>> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(code)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| Error::InvalidResource(format!("SPIR-V reflection failed: {:?}", e)))?;

    let mut inputs: Vec<ShaderVertexInput> = Vec::new();
    for entry_point in &entry_points {
        for var in entry_point.vars.iter() {
            let Variable::Input { name, location, ty } = var else {
                continue;
            };
            let location = location.loc();
            if inputs.iter().any(|input| input.location == location) {
                continue;
            }
            let name = name.as_deref().unwrap_or_default();
            let Some((semantic, semantic_index)) = semantic_from_name(name) else {
                engine_warn!("galaxy3d::vulkan", "Vertex input '{}' (location {}) has no known semantic", name, location);
                continue;
            };
            let Some(format) = vertex_format(ty) else {
                engine_warn!("galaxy3d::vulkan", "Vertex input '{}' has unsupported type {:?}", name, ty);
                continue;
            };
            inputs.push(ShaderVertexInput { location, semantic, semantic_index, format });
        }
    }
    inputs.sort_by_key(|input| input.location);
    Ok(inputs)
}

/// Semantic of an input variable name, tolerating the usual GLSL prefixes
fn semantic_from_name(name: &str) -> Option<(VertexSemantic, u32)> {
    VertexSemantic::parse(name).or_else(|| {
        ["in_", "a_", "in"]
            .iter()
            .find_map(|prefix| name.strip_prefix(prefix))
            .and_then(VertexSemantic::parse)
    })
}

fn vertex_format(ty: &Type) -> Option<Format> {
    match ty {
        Type::Scalar(ScalarType::Float { bits: 32 }) => Some(Format::R32_SFLOAT),
        Type::Scalar(ScalarType::Integer { bits: 32, is_signed: false }) => Some(Format::R32_UINT),
        Type::Vector(v) => match (&v.scalar_ty, v.nscalar) {
            (ScalarType::Float { bits: 32 }, 2) => Some(Format::R32G32_SFLOAT),
            (ScalarType::Float { bits: 32 }, 3) => Some(Format::R32G32B32_SFLOAT),
            (ScalarType::Float { bits: 32 }, 4) => Some(Format::R32G32B32A32_SFLOAT),
            (ScalarType::Integer { bits: 32, is_signed: false }, 4) => Some(Format::R32G32B32A32_UINT),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
#[path = "vulkan_reflect_tests.rs"]
mod tests;
