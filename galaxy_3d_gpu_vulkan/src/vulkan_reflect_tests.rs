use super::*;
use spirq::ty::VectorType;

fn vector(scalar_ty: ScalarType, nscalar: u32) -> Type {
    Type::Vector(VectorType { scalar_ty, nscalar })
}

#[test]
fn test_semantics_from_hlsl_and_glsl_names() {
    assert_eq!(semantic_from_name("in.var.POSITION"), Some((VertexSemantic::Position, 0)));
    assert_eq!(semantic_from_name("in.var.TEXCOORD1"), Some((VertexSemantic::TexCoord, 1)));
    assert_eq!(semantic_from_name("in_normal"), Some((VertexSemantic::Normal, 0)));
    assert_eq!(semantic_from_name("a_color"), Some((VertexSemantic::Color, 0)));
    assert_eq!(semantic_from_name("inTexCoord2"), Some((VertexSemantic::TexCoord, 2)));
    assert_eq!(semantic_from_name("vertexIndexHack"), None);
}

#[test]
fn test_float_inputs_map_to_vertex_formats() {
    let float = ScalarType::Float { bits: 32 };
    assert_eq!(vertex_format(&Type::Scalar(float.clone())), Some(Format::R32_SFLOAT));
    assert_eq!(vertex_format(&vector(float.clone(), 2)), Some(Format::R32G32_SFLOAT));
    assert_eq!(vertex_format(&vector(float.clone(), 3)), Some(Format::R32G32B32_SFLOAT));
    assert_eq!(vertex_format(&vector(float, 4)), Some(Format::R32G32B32A32_SFLOAT));
}

#[test]
fn test_integer_inputs_map_to_vertex_formats() {
    let uint = ScalarType::Integer { bits: 32, is_signed: false };
    assert_eq!(vertex_format(&Type::Scalar(uint.clone())), Some(Format::R32_UINT));
    assert_eq!(vertex_format(&vector(uint, 4)), Some(Format::R32G32B32A32_UINT));

    let double = ScalarType::Float { bits: 64 };
    assert_eq!(vertex_format(&vector(double, 3)), None);
}

#[test]
fn test_invalid_bytecode_is_rejected() {
    assert!(reflect_vertex_inputs(&[0xDEAD_BEEF, 0, 0]).is_err());
}
