mod common;

use common::*;
use dxbc_glsl::sm4::opcode::Opcode;
use dxbc_glsl::sm4::ShaderStage;
use dxbc_glsl::sm4_ir::{
    BaseType, CbVariable, ConstantBufferDesc, InstKind, Instruction, OperandType, TestBoolean,
    VariableType,
};
use dxbc_glsl::{
    decode_program, translate_program, translate_tokens, DecodeErrorKind, DialectRules,
    GlslVersion, RuleFlags, TranslateError, TranslateOptions,
};
use pretty_assertions::assert_eq;

const XYZW: u8 = 0xf;
const IDENTITY: [u8; 4] = [0, 1, 2, 3];

fn options(version: GlslVersion) -> TranslateOptions {
    TranslateOptions::for_version(version)
}

fn main_body(text: &str) -> Vec<&str> {
    block_body(text, "void main()")
}

#[test]
fn constant_color_pixel_shader() {
    let toks = program_tokens(
        ShaderStage::Pixel,
        &[
            inst(Opcode::DclOutput, &[reg_dst(OperandType::Output, 0, XYZW)]),
            inst(
                Opcode::Mov,
                &[reg_dst(OperandType::Output, 0, XYZW), float4([1.0, 0.0, 0.0, 1.0])],
            ),
            inst(Opcode::Ret, &[]),
        ],
    );
    let out = translate_tokens(&toks, &options(GlslVersion::Gl33)).unwrap();
    let glsl = out.glsl();

    assert!(glsl.starts_with("#version 330"));
    assert!(glsl.contains("layout(location = 0) out vec4 out_Target0;"));
    assert_eq!(glsl.lines().filter(|l| l.contains("out_Target0 =")).count(), 1);

    let body = main_body(glsl);
    assert!(body.iter().any(|l| l.contains("vec4(1.0, 0.0, 0.0, 1.0)")), "{glsl}");
    for line in &body {
        for kw in ["if", "while", "switch", "for", "return"] {
            assert!(!line.starts_with(kw), "unexpected `{line}` in\n{glsl}");
        }
    }
    assert_eq!(out.reflection.frag_outputs.len(), 1);
    assert_eq!(out.reflection.frag_outputs[0].name, "out_Target0");
    assert_eq!(out.reflection.frag_outputs[0].location, 0);
}

#[test]
fn conditional_copy_targets_es2() {
    let toks = program_tokens(
        ShaderStage::Vertex,
        &[
            inst(Opcode::DclInput, &[reg_dst(OperandType::Input, 0, XYZW)]),
            inst(
                Opcode::DclOutputSiv,
                &[reg_dst(OperandType::Output, 0, XYZW), vec![NAME_POSITION]],
            ),
            inst(Opcode::DclOutput, &[reg_dst(OperandType::Output, 1, XYZW)]),
            inst(
                Opcode::Mov,
                &[reg_dst(OperandType::Output, 0, XYZW), reg_src(OperandType::Input, 0, IDENTITY)],
            ),
            inst_nz(Opcode::If, &[reg_scalar(OperandType::Input, 0, 0)]),
            inst(
                Opcode::Mov,
                &[reg_dst(OperandType::Output, 1, XYZW), reg_src(OperandType::Input, 0, IDENTITY)],
            ),
            inst(Opcode::EndIf, &[]),
            inst(Opcode::Ret, &[]),
        ],
    );
    let out = translate_tokens(&toks, &options(GlslVersion::Es20)).unwrap();
    let glsl = out.glsl();

    assert!(glsl.starts_with("#version 100"));
    assert!(glsl.contains("attribute vec4 a_TEXCOORD0;"), "{glsl}");
    assert!(glsl.contains("gl_Position"));
    assert_eq!(block_body(glsl, "if ("), vec!["o[1] = v[0];"]);
    assert_eq!(out.reflection.attributes.len(), 1);
    assert_eq!(out.reflection.attributes[0].name, "a_TEXCOORD0");
}

fn two_cbuffer_program() -> dxbc_glsl::Program {
    let toks = program_tokens(
        ShaderStage::Pixel,
        &[
            inst(
                Opcode::DclConstantBuffer,
                &[vec![operand_token(OperandType::ConstantBuffer, 4, 1, 0xe4, 2), 0, 2]],
            ),
            inst(
                Opcode::DclConstantBuffer,
                &[vec![operand_token(OperandType::ConstantBuffer, 4, 1, 0xe4, 2), 1, 1]],
            ),
            inst(Opcode::DclOutput, &[reg_dst(OperandType::Output, 0, XYZW)]),
            inst(
                Opcode::Add,
                &[reg_dst(OperandType::Output, 0, XYZW), cb_src(0, 0), cb_src(1, 0)],
            ),
            inst(Opcode::Ret, &[]),
        ],
    );
    let material = ConstantBufferDesc {
        name: "Material".to_owned(),
        bind_point: 0,
        size: 32,
        variables: vec![
            CbVariable {
                name: "tint".to_owned(),
                offset: 0,
                size: 16,
                ty: VariableType::vector(BaseType::Float, 4),
            },
            CbVariable {
                name: "scale".to_owned(),
                offset: 16,
                size: 4,
                ty: VariableType::scalar(BaseType::Float),
            },
        ],
    };
    let lighting = ConstantBufferDesc {
        name: "Lighting".to_owned(),
        bind_point: 1,
        size: 16,
        variables: vec![CbVariable {
            name: "ambient".to_owned(),
            offset: 0,
            size: 16,
            ty: VariableType::vector(BaseType::Float, 4),
        }],
    };
    let mut program = decode_program(&toks)
        .unwrap()
        .with_constant_buffers(vec![material, lighting]);
    program.link().unwrap();
    program
}

#[test]
fn constant_buffers_as_loose_uniforms() {
    let program = two_cbuffer_program();
    let opts = TranslateOptions {
        rules: Some(DialectRules::for_version(GlslVersion::Gl42).without(RuleFlags::UNIFORM_BLOCKS)),
        ..options(GlslVersion::Gl42)
    };
    let out = translate_program(&program, &opts).unwrap();
    let glsl = out.glsl();

    assert!(glsl.contains("uniform vec4 tint;"), "{glsl}");
    assert!(glsl.contains("uniform float scale;"));
    assert!(glsl.contains("uniform vec4 ambient;"));
    assert!(!glsl.contains("uniform Material"));
    assert!(out.reflection.uniform_blocks.is_empty());

    let uniforms: Vec<_> = out
        .reflection
        .uniforms
        .iter()
        .map(|u| (u.name.as_str(), u.cbuffer_slot, u.offset))
        .collect();
    assert_eq!(uniforms, vec![("tint", 0, 0), ("scale", 0, 16), ("ambient", 1, 0)]);
}

#[test]
fn constant_buffers_as_uniform_blocks() {
    let program = two_cbuffer_program();
    let out = translate_program(&program, &options(GlslVersion::Gl42)).unwrap();
    let glsl = out.glsl();

    assert!(glsl.contains("layout(std140, binding = 0) uniform Material {"), "{glsl}");
    assert!(glsl.contains("layout(std140, binding = 1) uniform Lighting {"));
    for member in ["tint", "scale", "ambient"] {
        assert!(glsl.contains(member), "missing {member}");
    }
    assert!(out.reflection.uniforms.is_empty());

    let blocks: Vec<_> = out
        .reflection
        .uniform_blocks
        .iter()
        .map(|b| (b.name.as_str(), b.binding))
        .collect();
    assert_eq!(blocks, vec![("Material", 0), ("Lighting", 1)]);
}

#[test]
fn translation_is_deterministic() {
    let program = two_cbuffer_program();
    let opts = options(GlslVersion::Gl42);
    let a = translate_program(&program, &opts).unwrap();
    let b = translate_program(&program, &opts).unwrap();
    assert_eq!(a, b);
}

fn hull_tokens() -> Vec<u32> {
    program_tokens(
        ShaderStage::Hull,
        &[
            inst(Opcode::HsDecls, &[]),
            decl_field(Opcode::DclInputControlPointCount, 3, &[]),
            decl_field(Opcode::DclOutputControlPointCount, 3, &[]),
            decl_field(Opcode::DclTessDomain, 2, &[]),
            inst(Opcode::HsControlPointPhase, &[]),
            inst(Opcode::DclOutput, &[reg_dst(OperandType::Output, 0, XYZW)]),
            inst(
                Opcode::Mov,
                &[reg_dst(OperandType::Output, 0, XYZW), imm32_scalar(0.25f32.to_bits())],
            ),
            inst(Opcode::Ret, &[]),
            inst(Opcode::HsForkPhase, &[]),
            inst(
                Opcode::DclOutputSiv,
                &[reg_dst(OperandType::Output, 0, 0x1), vec![NAME_FINAL_TRI_EDGE_0]],
            ),
            inst(
                Opcode::Mov,
                &[reg_dst(OperandType::Output, 0, 0x1), imm32_scalar(3.0f32.to_bits())],
            ),
            inst(Opcode::Ret, &[]),
            inst(Opcode::HsForkPhase, &[]),
            inst(
                Opcode::DclOutputSiv,
                &[reg_dst(OperandType::Output, 1, 0x1), vec![NAME_FINAL_TRI_INSIDE]],
            ),
            inst(
                Opcode::Mov,
                &[reg_dst(OperandType::Output, 1, 0x1), imm32_scalar(5.0f32.to_bits())],
            ),
            inst(Opcode::Ret, &[]),
        ],
    )
}

#[test]
fn hull_phases_are_split_into_blocks() {
    for version in [GlslVersion::Gl40, GlslVersion::Gl43] {
        let out = translate_tokens(&hull_tokens(), &options(version)).unwrap();
        let cp = out.hs_control_point_phase().unwrap();
        let forks = out.hs_fork_phases().unwrap();
        let joins = out.hs_join_phases().unwrap();
        assert!(!cp.is_empty() && !forks.is_empty() && !joins.is_empty());

        for literal in ["0.25", "3.0", "5.0"] {
            let hits = [cp, forks, joins].iter().filter(|t| t.contains(literal)).count();
            assert_eq!(hits, 1, "{literal} should appear in exactly one phase block");
        }
        assert!(cp.contains("0.25"));
        assert!(forks.contains("3.0") && forks.contains("5.0"));
        assert!(joins.contains("gl_TessLevelOuter[0]"), "{joins}");
        assert!(joins.contains("gl_TessLevelInner[0]"));

        let glsl = out.glsl();
        assert!(glsl.contains("layout(vertices = 3) out;"), "{glsl}");
        assert!(glsl.contains("barrier();"));
        assert!(glsl.contains(cp) && glsl.contains(forks) && glsl.contains(joins));
    }
}

#[test]
fn non_hull_stages_have_no_phase_blocks() {
    let toks = program_tokens(ShaderStage::Pixel, &[inst(Opcode::Ret, &[])]);
    let out = translate_tokens(&toks, &options(GlslVersion::Gl33)).unwrap();
    assert_eq!(out.hs_control_point_phase(), None);
    assert_eq!(out.hs_fork_phases(), None);
    assert_eq!(out.hs_join_phases(), None);
}

#[test]
fn truncated_stream_is_malformed() {
    let mov = inst(
        Opcode::Mov,
        &[reg_dst(OperandType::Output, 0, XYZW), float4([1.0, 0.0, 0.0, 1.0])],
    );
    let mut toks = program_tokens(ShaderStage::Pixel, &[mov]);
    toks.pop();
    // Keep the header consistent with what is left.
    toks[1] = toks.len() as u32;

    let err = translate_tokens(&toks, &options(GlslVersion::Gl33)).unwrap_err();
    match err {
        TranslateError::MalformedBytecode(e) => {
            assert!(
                matches!(e.kind, DecodeErrorKind::InstructionLengthMismatch { .. }),
                "{e:?}"
            );
            assert_eq!(e.at_dword, 2);
        }
        other => panic!("expected malformed bytecode, got {other:?}"),
    }
}

fn expect_malformed_operand(err: TranslateError) {
    match err {
        TranslateError::MalformedBytecode(e) => {
            assert!(matches!(e.kind, DecodeErrorKind::MalformedOperand(_)), "{e:?}");
        }
        other => panic!("expected malformed bytecode, got {other:?}"),
    }
}

#[test]
fn instructions_missing_operands_are_malformed() {
    let bodies = [
        vec![inst(Opcode::Mov, &[]), inst(Opcode::Ret, &[])],
        vec![inst_nz(Opcode::If, &[]), inst(Opcode::EndIf, &[]), inst(Opcode::Ret, &[])],
        vec![
            dcl_temps(1),
            inst(Opcode::Add, &[reg_dst(OperandType::Temp, 0, XYZW)]),
            inst(Opcode::Ret, &[]),
        ],
    ];
    for body in &bodies {
        let toks = program_tokens(ShaderStage::Pixel, body);
        let err = translate_tokens(&toks, &options(GlslVersion::Gl33)).unwrap_err();
        expect_malformed_operand(err);
    }
}

#[test]
fn surplus_operands_are_malformed() {
    let toks = program_tokens(
        ShaderStage::Pixel,
        &[
            inst(Opcode::EndIf, &[imm32_scalar(1)]),
            inst(Opcode::Ret, &[]),
        ],
    );
    let err = translate_tokens(&toks, &options(GlslVersion::Gl33)).unwrap_err();
    expect_malformed_operand(err);
}

#[test]
fn hand_built_instruction_without_operands_is_malformed() {
    let toks = program_tokens(
        ShaderStage::Pixel,
        &[
            inst_nz(Opcode::If, &[imm32_scalar(1)]),
            inst(Opcode::EndIf, &[]),
            inst(Opcode::Ret, &[]),
        ],
    );
    let mut program = decode_program(&toks).unwrap();
    let at = program.instructions[0].at_dword;
    program.instructions[0] = Instruction::new(
        Opcode::If,
        InstKind::Conditional {
            test: TestBoolean::NonZero,
        },
        at,
    );
    let err = translate_program(&program, &options(GlslVersion::Gl33)).unwrap_err();
    expect_malformed_operand(err);
}

#[test]
fn stages_are_gated_by_dialect() {
    let toks = program_tokens(ShaderStage::Geometry, &[inst(Opcode::Ret, &[])]);
    let err = translate_tokens(&toks, &options(GlslVersion::Es20)).unwrap_err();
    assert!(
        matches!(
            err,
            TranslateError::UnsupportedDialectFeature {
                version: GlslVersion::Es20,
                ..
            }
        ),
        "{err:?}"
    );

    let toks = program_tokens(ShaderStage::Hull, &[inst(Opcode::Ret, &[])]);
    let err = translate_tokens(&toks, &options(GlslVersion::Gl33)).unwrap_err();
    assert!(matches!(err, TranslateError::UnsupportedDialectFeature { .. }));
}
