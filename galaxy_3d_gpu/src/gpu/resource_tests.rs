//! Unit tests for resource.rs (descriptor logic only; live resources are
//! covered by the device tests)

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::gpu::pipeline::CompareOp;
use crate::gpu::resource::*;
use crate::gpu::types::{Format, TextureUsage};

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

// ============================================================================
// VertexSemantic
// ============================================================================

#[test]
fn test_parse_plain_semantics() {
    assert_eq!(VertexSemantic::parse("POSITION"), Some((VertexSemantic::Position, 0)));
    assert_eq!(VertexSemantic::parse("NORMAL"), Some((VertexSemantic::Normal, 0)));
    assert_eq!(VertexSemantic::parse("COLOR0"), Some((VertexSemantic::Color, 0)));
}

#[test]
fn test_parse_trailing_index() {
    assert_eq!(VertexSemantic::parse("TEXCOORD1"), Some((VertexSemantic::TexCoord, 1)));
    assert_eq!(VertexSemantic::parse("TEXCOORD12"), Some((VertexSemantic::TexCoord, 12)));
}

#[test]
fn test_parse_strips_compiler_prefix() {
    assert_eq!(VertexSemantic::parse("in.var.TEXCOORD1"), Some((VertexSemantic::TexCoord, 1)));
    assert_eq!(VertexSemantic::parse("in.var.POSITION"), Some((VertexSemantic::Position, 0)));
}

#[test]
fn test_parse_is_case_insensitive() {
    assert_eq!(VertexSemantic::parse("texcoord2"), Some((VertexSemantic::TexCoord, 2)));
    assert_eq!(VertexSemantic::parse("BlendWeights"), Some((VertexSemantic::BlendWeights, 0)));
}

#[test]
fn test_parse_unknown() {
    assert_eq!(VertexSemantic::parse("SV_VertexID"), None);
    assert_eq!(VertexSemantic::parse(""), None);
    assert_eq!(VertexSemantic::parse("42"), None);
}

// ============================================================================
// SamplerDesc
// ============================================================================

#[test]
fn test_sampler_desc_equal_descs_hash_equal() {
    let a = SamplerDesc::default();
    let b = SamplerDesc::default();
    assert_eq!(a, b);
    assert_eq!(hash_of(&a), hash_of(&b));
}

#[test]
fn test_sampler_desc_float_fields_participate() {
    let a = SamplerDesc::default();
    let b = SamplerDesc { mip_lod_bias: 0.5, ..a };
    let c = SamplerDesc { max_anisotropy: Some(16.0), ..a };
    assert_ne!(a, b);
    assert_ne!(a, c);
    assert_ne!(b, c);
}

#[test]
fn test_sampler_presets() {
    let shadow = SamplerDesc::shadow();
    assert_eq!(shadow.compare, Some(CompareOp::LessOrEqual));
    assert_eq!(shadow.address_u, AddressMode::ClampToBorder);

    let nearest = SamplerDesc::nearest_clamp();
    assert_eq!(nearest.min_filter, Filter::Nearest);
    assert_ne!(nearest, SamplerDesc::default());
}

// ============================================================================
// TextureDesc
// ============================================================================

#[test]
fn test_texture_constructors() {
    let t = TextureDesc::texture_2d(256, 128, Format::R8G8B8A8_UNORM, TextureUsage::SAMPLED);
    assert_eq!(t.dimension, TextureDimension::D2);
    assert_eq!((t.width, t.height, t.depth), (256, 128, 1));
    assert_eq!(t.array_layers, 1);

    let cube = TextureDesc::cube(64, Format::R8G8B8A8_UNORM, TextureUsage::SAMPLED);
    assert_eq!(cube.array_layers, 6);
    assert_eq!(cube.width, cube.height);

    let volume = TextureDesc::texture_3d(32, 32, 16, Format::R8G8B8A8_UNORM, TextureUsage::STORAGE);
    assert_eq!(volume.depth, 16);
}

#[test]
fn test_full_mip_count() {
    let t = TextureDesc::texture_2d(256, 128, Format::R8G8B8A8_UNORM, TextureUsage::SAMPLED);
    assert_eq!(t.full_mip_count(), 9);
    let one = TextureDesc::texture_2d(1, 1, Format::R8G8B8A8_UNORM, TextureUsage::SAMPLED);
    assert_eq!(one.full_mip_count(), 1);
}

#[test]
fn test_mip_extent_clamps_to_one() {
    let t = TextureDesc::texture_2d(256, 4, Format::R8G8B8A8_UNORM, TextureUsage::SAMPLED).with_mips(9);
    assert_eq!(t.mip_extent(0), [256, 4, 1]);
    assert_eq!(t.mip_extent(3), [32, 1, 1]);
    assert_eq!(t.mip_extent(8), [1, 1, 1]);
}
