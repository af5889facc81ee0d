//! Golden GLSL lines for each instruction family, across the ES 2.0,
//! GL 3.3 and GL 4.3 tiers.
mod common;

use common::*;
use dxbc_glsl::sm4::opcode::Opcode;
use dxbc_glsl::sm4::ShaderStage;
use dxbc_glsl::sm4_ir::OperandType;
use dxbc_glsl::{translate_tokens, GlslVersion, TranslateError, TranslateOptions};
use pretty_assertions::assert_eq;

const XYZW: u8 = 0xf;
const IDENTITY: [u8; 4] = [0, 1, 2, 3];
const RESOURCE_DIM_TEXTURE2D: u32 = 3;
const RETURN_TYPE_FLOAT4: u32 = 0x5555;
const SAMPLER_MODE_COMPARISON: u32 = 1;

fn translate(toks: &[u32], version: GlslVersion) -> Result<String, TranslateError> {
    translate_tokens(toks, &TranslateOptions::for_version(version)).map(|out| out.glsl().to_owned())
}

fn main_body(text: &str) -> Vec<&str> {
    block_body(text, "void main()")
}

/// Asserts that `expected` appears in `lines` in order, other lines allowed
/// in between.
fn assert_in_order(lines: &[&str], expected: &[&str]) {
    let mut rest = lines.iter();
    for want in expected {
        assert!(rest.any(|l| l == want), "missing `{want}` in {lines:#?}");
    }
}

fn dcl_texture2d(slot: u32) -> Vec<u32> {
    decl_field(
        Opcode::DclResource,
        RESOURCE_DIM_TEXTURE2D,
        &[vec![operand_token(OperandType::Resource, 0, 0, 0, 1), slot], vec![RETURN_TYPE_FLOAT4]],
    )
}

fn dcl_sampler(slot: u32, mode: u32) -> Vec<u32> {
    decl_field(Opcode::DclSampler, mode, &[sampler(slot)])
}

fn sampler(slot: u32) -> Vec<u32> {
    vec![operand_token(OperandType::Sampler, 0, 0, 0, 1), slot]
}

fn texture(slot: u32) -> Vec<u32> {
    reg_src(OperandType::Resource, slot, IDENTITY)
}

fn uav(slot: u32) -> Vec<u32> {
    vec![operand_token(OperandType::UnorderedAccessView, 0, 0, 0, 1), slot]
}

fn label(id: u32) -> Vec<u32> {
    vec![operand_token(OperandType::Label, 0, 0, 0, 1), id]
}

/// `v0.xyxx`, the usual 2D texture coordinate.
fn uv() -> Vec<u32> {
    reg_src(OperandType::Input, 0, [0, 1, 0, 0])
}

/// Pixel shader with `t0`, a default `s0`, a comparison `s1` and a linear
/// `v0.xyz`, running `body` and writing `r0` to `o0`.
fn sampling_shader(body: Vec<Vec<u32>>) -> Vec<u32> {
    let mut parts = vec![
        dcl_texture2d(0),
        dcl_sampler(0, 0),
        dcl_sampler(1, SAMPLER_MODE_COMPARISON),
        decl_field(Opcode::DclInputPs, 2, &[reg_dst(OperandType::Input, 0, 0x7)]),
        inst(Opcode::DclOutput, &[reg_dst(OperandType::Output, 0, XYZW)]),
        dcl_temps(1),
    ];
    parts.extend(body);
    parts.push(inst(
        Opcode::Mov,
        &[reg_dst(OperandType::Output, 0, XYZW), reg_src(OperandType::Temp, 0, IDENTITY)],
    ));
    parts.push(inst(Opcode::Ret, &[]));
    program_tokens(ShaderStage::Pixel, &parts)
}

/// Pixel shader reading texture `t1` without any sampler.
fn fetch_shader(body: Vec<Vec<u32>>) -> Vec<u32> {
    let mut parts = vec![dcl_texture2d(1), dcl_temps(1)];
    parts.extend(body);
    parts.push(inst(Opcode::Ret, &[]));
    program_tokens(ShaderStage::Pixel, &parts)
}

fn sample_t0() -> Vec<u32> {
    inst(
        Opcode::Sample,
        &[reg_dst(OperandType::Temp, 0, XYZW), uv(), texture(0), sampler(0)],
    )
}

fn sample_l_t0(lod: f32) -> Vec<u32> {
    inst(
        Opcode::SampleL,
        &[
            reg_dst(OperandType::Temp, 0, XYZW),
            uv(),
            texture(0),
            sampler(0),
            imm32_scalar(lod.to_bits()),
        ],
    )
}

#[test]
fn sample_per_tier() {
    let toks = sampling_shader(vec![sample_t0()]);

    let es2 = translate(&toks, GlslVersion::Es20).unwrap();
    assert!(main_body(&es2).contains(&"r0 = texture2D(t0_s0, v[0].xy);"), "{es2}");

    let gl33 = translate(&toks, GlslVersion::Gl33).unwrap();
    assert!(main_body(&gl33).contains(&"r0 = texture(t0_s0, v[0].xy);"), "{gl33}");
    assert!(gl33.lines().any(|l| l == "uniform sampler2D t0_s0;"), "{gl33}");

    let gl43 = translate(&toks, GlslVersion::Gl43).unwrap();
    assert!(gl43.lines().any(|l| l == "layout(binding = 0) uniform sampler2D t0_s0;"), "{gl43}");
}

#[test]
fn es2_samplers_carry_no_precision_qualifier() {
    let toks = sampling_shader(vec![sample_t0()]);

    let es2 = translate(&toks, GlslVersion::Es20).unwrap();
    assert!(es2.lines().any(|l| l == "uniform sampler2D t0_s0;"), "{es2}");
    assert!(!es2.contains("highp sampler"), "{es2}");

    let es3 = translate(&toks, GlslVersion::Es30).unwrap();
    assert!(es3.lines().any(|l| l == "uniform highp sampler2D t0_s0;"), "{es3}");
}

#[test]
fn explicit_lod_sampling_per_tier() {
    let toks = sampling_shader(vec![sample_l_t0(2.0)]);

    let es2 = translate(&toks, GlslVersion::Es20).unwrap();
    assert!(
        es2.lines().any(|l| l == "#extension GL_EXT_shader_texture_lod : enable"),
        "{es2}"
    );
    assert!(main_body(&es2).contains(&"r0 = texture2DLodEXT(t0_s0, v[0].xy, 2.0);"), "{es2}");

    let gl33 = translate(&toks, GlslVersion::Gl33).unwrap();
    assert!(main_body(&gl33).contains(&"r0 = textureLod(t0_s0, v[0].xy, 2.0);"), "{gl33}");
    assert!(!gl33.contains("#extension"), "{gl33}");
}

#[test]
fn comparison_sampling_builds_a_shadow_coordinate() {
    let toks = sampling_shader(vec![inst(
        Opcode::SampleC,
        &[
            reg_dst(OperandType::Temp, 0, 0x1),
            uv(),
            texture(0),
            sampler(1),
            reg_scalar(OperandType::Input, 0, 2),
        ],
    )]);

    let gl33 = translate(&toks, GlslVersion::Gl33).unwrap();
    assert!(gl33.lines().any(|l| l == "uniform sampler2DShadow t0_s1_cmp;"), "{gl33}");
    assert!(
        main_body(&gl33).contains(&"r0.x = texture(t0_s1_cmp, vec3(v[0].xy, v[0].z));"),
        "{gl33}"
    );
}

#[test]
fn gather_needs_gl4() {
    // gather4 r0, v0.xyxx, t0, s0.y
    let toks = sampling_shader(vec![inst(
        Opcode::Gather4,
        &[
            reg_dst(OperandType::Temp, 0, XYZW),
            uv(),
            texture(0),
            vec![operand_token(OperandType::Sampler, 4, 2, 1, 1), 0],
        ],
    )]);

    let gl43 = translate(&toks, GlslVersion::Gl43).unwrap();
    assert!(main_body(&gl43).contains(&"r0 = textureGather(t0_s0, v[0].xy, 1);"), "{gl43}");

    let err = translate(&toks, GlslVersion::Gl33).unwrap_err();
    assert!(
        matches!(
            err,
            TranslateError::UnsupportedDialectFeature {
                feature: "textureGather",
                version: GlslVersion::Gl33,
                ..
            }
        ),
        "{err:?}"
    );
}

#[test]
fn texel_fetch_uses_an_integer_coordinate() {
    // ld r0, l(1, 2, 0, 0), t1
    let toks = fetch_shader(vec![inst(
        Opcode::Ld,
        &[reg_dst(OperandType::Temp, 0, XYZW), imm32_vec4([1, 2, 0, 0]), texture(1)],
    )]);

    let gl33 = translate(&toks, GlslVersion::Gl33).unwrap();
    assert!(gl33.lines().any(|l| l == "uniform sampler2D t1;"), "{gl33}");
    assert!(main_body(&gl33).contains(&"r0 = texelFetch(t1, ivec2(1, 2), 0);"), "{gl33}");

    let err = translate(&toks, GlslVersion::Es20).unwrap_err();
    assert!(
        matches!(err, TranslateError::UnsupportedDialectFeature { feature: "texelFetch", .. }),
        "{err:?}"
    );
}

#[test]
fn resinfo_pads_the_size_vector() {
    // resinfo_uint r0.xy, l(0), t1.xyzw
    let toks = fetch_shader(vec![inst_bits(
        Opcode::ResInfo,
        2 << 11,
        &[reg_dst(OperandType::Temp, 0, 0x3), imm32_scalar(0), texture(1)],
    )]);
    let gl33 = translate(&toks, GlslVersion::Gl33).unwrap();
    assert!(
        main_body(&gl33).contains(&"r0.xy = uvec4(ivec4(textureSize(t1, 0), 0, 0)).xy;"),
        "{gl33}"
    );
}

#[test]
fn resinfo_level_count_needs_gl43() {
    // resinfo r0.xyzw, l(0), t1.xyzw
    let toks = fetch_shader(vec![inst(
        Opcode::ResInfo,
        &[reg_dst(OperandType::Temp, 0, XYZW), imm32_scalar(0), texture(1)],
    )]);

    let gl43 = translate(&toks, GlslVersion::Gl43).unwrap();
    assert!(
        main_body(&gl43)
            .contains(&"r0 = vec4(ivec4(textureSize(t1, 0), 0, textureQueryLevels(t1)));"),
        "{gl43}"
    );

    let err = translate(&toks, GlslVersion::Gl33).unwrap_err();
    assert!(
        matches!(
            err,
            TranslateError::UnsupportedDialectFeature { feature: "textureQueryLevels", .. }
        ),
        "{err:?}"
    );
}

#[test]
fn loop_with_conditional_break() {
    let toks = program_tokens(
        ShaderStage::Vertex,
        &[
            dcl_temps(1),
            inst(Opcode::Mov, &[reg_dst(OperandType::Temp, 0, 0x1), imm32_scalar(3)]),
            inst(Opcode::Loop, &[]),
            inst(Opcode::Breakc, &[reg_scalar(OperandType::Temp, 0, 0)]),
            inst(
                Opcode::Iadd,
                &[
                    reg_dst(OperandType::Temp, 0, 0x1),
                    reg_scalar(OperandType::Temp, 0, 0),
                    imm32_scalar(u32::MAX),
                ],
            ),
            inst(Opcode::EndLoop, &[]),
            inst(Opcode::Ret, &[]),
        ],
    );
    for version in [GlslVersion::Es20, GlslVersion::Gl33, GlslVersion::Gl43] {
        let glsl = translate(&toks, version).unwrap();
        assert!(glsl.lines().any(|l| l.trim() == "ivec4 r0;"), "{version}: {glsl}");
        assert_eq!(
            block_body(&glsl, "while (true) {"),
            vec!["if (r0.x == 0) break;", "r0.x = (r0.x + -1);"],
            "{version}"
        );
    }
}

#[test]
fn switch_cases_fall_through() {
    let toks = program_tokens(
        ShaderStage::Vertex,
        &[
            dcl_temps(2),
            inst(Opcode::Mov, &[reg_dst(OperandType::Temp, 0, 0x1), imm32_scalar(2)]),
            inst(Opcode::Switch, &[reg_scalar(OperandType::Temp, 0, 0)]),
            inst(Opcode::Case, &[imm32_scalar(1)]),
            inst(Opcode::Case, &[imm32_scalar(2)]),
            inst(Opcode::Mov, &[reg_dst(OperandType::Temp, 1, 0x1), imm32_scalar(5)]),
            inst(Opcode::Break, &[]),
            inst(Opcode::Default, &[]),
            inst(Opcode::Break, &[]),
            inst(Opcode::EndSwitch, &[]),
            inst(Opcode::Ret, &[]),
        ],
    );

    let gl33 = translate(&toks, GlslVersion::Gl33).unwrap();
    assert_eq!(
        block_body(&gl33, "switch (r0.x) {"),
        vec!["case 1:", "case 2:", "r1.x = 5;", "break;", "default:", "break;"]
    );

    let err = translate(&toks, GlslVersion::Es20).unwrap_err();
    assert!(
        matches!(
            err,
            TranslateError::UnsupportedDialectFeature { feature: "switch statements", .. }
        ),
        "{err:?}"
    );
}

#[test]
fn call_becomes_a_subroutine() {
    let toks = program_tokens(
        ShaderStage::Vertex,
        &[
            dcl_temps(1),
            inst(Opcode::Call, &[label(7)]),
            inst(Opcode::Ret, &[]),
            inst(Opcode::Label, &[label(7)]),
            inst(Opcode::Mov, &[reg_dst(OperandType::Temp, 0, 0x1), imm32_scalar(1)]),
            inst(Opcode::Ret, &[]),
        ],
    );
    for version in [GlslVersion::Es20, GlslVersion::Gl33] {
        let glsl = translate(&toks, version).unwrap();
        assert!(glsl.lines().any(|l| l == "void sub_l7();"), "{glsl}");
        assert!(main_body(&glsl).contains(&"sub_l7();"), "{glsl}");
        assert_eq!(block_body(&glsl, "void sub_l7() {"), vec!["r0.x = 1;"]);
    }
}

#[test]
fn geometry_emit_and_cut() {
    let toks = program_tokens(
        ShaderStage::Geometry,
        &[
            decl_field(Opcode::DclGsInputPrimitive, 3, &[]),
            decl_field(Opcode::DclGsOutputPrimitiveTopology, 5, &[]),
            inst(Opcode::DclMaxOutputVertexCount, &[vec![3]]),
            inst(
                Opcode::DclOutputSiv,
                &[reg_dst(OperandType::Output, 0, XYZW), vec![NAME_POSITION]],
            ),
            inst(
                Opcode::Mov,
                &[reg_dst(OperandType::Output, 0, XYZW), float4([0.0, 0.0, 0.0, 1.0])],
            ),
            inst(Opcode::Emit, &[]),
            inst(
                Opcode::Mov,
                &[reg_dst(OperandType::Output, 0, XYZW), float4([1.0, 0.0, 0.0, 1.0])],
            ),
            inst(Opcode::Emit, &[]),
            inst(Opcode::Cut, &[]),
            inst(Opcode::Ret, &[]),
        ],
    );
    let gl33 = translate(&toks, GlslVersion::Gl33).unwrap();
    assert!(gl33.lines().any(|l| l == "layout(triangles) in;"), "{gl33}");
    assert!(
        gl33.lines().any(|l| l == "layout(triangle_strip, max_vertices = 3) out;"),
        "{gl33}"
    );
    assert_in_order(
        &main_body(&gl33),
        &[
            "o[0] = vec4(0.0, 0.0, 0.0, 1.0);",
            "store_outputs();",
            "EmitVertex();",
            "o[0] = vec4(1.0, 0.0, 0.0, 1.0);",
            "store_outputs();",
            "EmitVertex();",
            "EndPrimitive();",
        ],
    );
}

fn compute_tokens() -> Vec<u32> {
    let tgsm = |mask| reg_dst(OperandType::ThreadGroupSharedMemory, 0, mask);
    program_tokens(
        ShaderStage::Compute,
        &[
            inst(Opcode::DclThreadGroup, &[vec![8, 1, 1]]),
            inst(Opcode::DclUavRaw, &[uav(0)]),
            inst(
                Opcode::DclTgsmRaw,
                &[vec![operand_token(OperandType::ThreadGroupSharedMemory, 0, 0, 0, 1), 0], vec![16]],
            ),
            dcl_temps(1),
            // ld_raw r0.x, l(0), u0.xxxx
            inst(
                Opcode::LdRaw,
                &[
                    reg_dst(OperandType::Temp, 0, 0x1),
                    imm32_scalar(0),
                    reg_src(OperandType::UnorderedAccessView, 0, [0; 4]),
                ],
            ),
            // store_raw u0.x, l(4), r0.x
            inst(
                Opcode::StoreRaw,
                &[
                    reg_dst(OperandType::UnorderedAccessView, 0, 0x1),
                    imm32_scalar(4),
                    reg_scalar(OperandType::Temp, 0, 0),
                ],
            ),
            // atomic_iadd u0.x, l(0), l(1)
            inst(
                Opcode::AtomicIadd,
                &[reg_dst(OperandType::UnorderedAccessView, 0, 0x1), imm32_scalar(0), imm32_scalar(1)],
            ),
            // imm_atomic_iadd r0.x, u0, l(8), l(1)
            inst(
                Opcode::ImmAtomicIadd,
                &[reg_dst(OperandType::Temp, 0, 0x1), uav(0), imm32_scalar(8), imm32_scalar(1)],
            ),
            // store_raw g0.x, l(0), l(7)
            inst(Opcode::StoreRaw, &[tgsm(0x1), imm32_scalar(0), imm32_scalar(7)]),
            // sync_g_t
            inst_bits(Opcode::Sync, 0b11 << 11, &[]),
            inst(Opcode::Ret, &[]),
        ],
    )
}

#[test]
fn compute_memory_access() {
    let toks = compute_tokens();
    let gl43 = translate(&toks, GlslVersion::Gl43).unwrap();
    assert!(
        gl43.lines()
            .any(|l| l == "layout(local_size_x = 8, local_size_y = 1, local_size_z = 1) in;"),
        "{gl43}"
    );
    assert!(gl43.contains("buffer u0_buffer { uint u0_data[]; };"), "{gl43}");
    assert!(gl43.lines().any(|l| l == "shared uint g0[4];"), "{gl43}");
    assert_in_order(
        &main_body(&gl43),
        &[
            "r0.x = u0_data[(0u >> 2u)];",
            "u0_data[(4u >> 2u)] = r0.x;",
            "atomicAdd(u0_data[(0u >> 2u)], 1u);",
            "r0.x = atomicAdd(u0_data[(8u >> 2u)], 1u);",
            "g0[(0u >> 2u)] = 7u;",
            "memoryBarrierShared();",
            "barrier();",
        ],
    );

    for version in [GlslVersion::Es20, GlslVersion::Gl33] {
        let err = translate(&toks, version).unwrap_err();
        assert!(
            matches!(err, TranslateError::UnsupportedDialectFeature { .. }),
            "{version}: {err:?}"
        );
    }
}

#[test]
fn msad_has_no_translation() {
    let toks = program_tokens(
        ShaderStage::Pixel,
        &[
            dcl_temps(4),
            inst(
                Opcode::Msad,
                &[
                    reg_dst(OperandType::Temp, 0, 0x1),
                    reg_scalar(OperandType::Temp, 1, 0),
                    reg_scalar(OperandType::Temp, 2, 0),
                    reg_scalar(OperandType::Temp, 3, 0),
                ],
            ),
            inst(Opcode::Ret, &[]),
        ],
    );
    match translate(&toks, GlslVersion::Gl43).unwrap_err() {
        TranslateError::UnsupportedInstruction { inst_index, opcode, .. } => {
            assert_eq!(inst_index, 0);
            assert_eq!(opcode, Opcode::Msad);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn interface_call_is_rejected() {
    // fcall fp0[0][0], function index 0
    let toks = program_tokens(
        ShaderStage::Pixel,
        &[
            inst(
                Opcode::InterfaceCall,
                &[vec![0], vec![operand_token(OperandType::Interface, 0, 0, 0, 2), 0, 0]],
            ),
            inst(Opcode::Ret, &[]),
        ],
    );
    match translate(&toks, GlslVersion::Gl43).unwrap_err() {
        TranslateError::UnsupportedInstruction { opcode, reason, .. } => {
            assert_eq!(opcode, Opcode::InterfaceCall);
            assert!(reason.contains("class linkage"), "{reason}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn sampling_an_undeclared_texture() {
    let toks = program_tokens(
        ShaderStage::Pixel,
        &[
            dcl_sampler(0, 0),
            dcl_temps(1),
            inst(
                Opcode::Sample,
                &[
                    reg_dst(OperandType::Temp, 0, XYZW),
                    float4([0.5, 0.5, 0.0, 0.0]),
                    texture(3),
                    sampler(0),
                ],
            ),
            inst(Opcode::Ret, &[]),
        ],
    );
    match translate(&toks, GlslVersion::Gl33).unwrap_err() {
        TranslateError::UnresolvedBinding { inst_index, what } => {
            assert_eq!(inst_index, 0);
            assert_eq!(what, "t3 has no dcl_resource");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn wide_register_index_needs_int64() {
    // mov o[imm64 0].xyzw, l(1.0, 1.0, 1.0, 1.0)
    let wide_output = vec![operand_token(OperandType::Output, 4, 0, u32::from(XYZW), 1) | (1 << 22), 0, 0];
    let toks = program_tokens(
        ShaderStage::Pixel,
        &[
            inst(Opcode::DclOutput, &[reg_dst(OperandType::Output, 0, XYZW)]),
            inst(Opcode::Mov, &[wide_output, float4([1.0; 4])]),
            inst(Opcode::Ret, &[]),
        ],
    );
    let err = translate(&toks, GlslVersion::Gl43).unwrap_err();
    assert!(
        matches!(
            err,
            TranslateError::UnsupportedDialectFeature {
                feature: "64-bit register indices",
                version: GlslVersion::Gl43,
                inst_index: Some(0),
            }
        ),
        "{err:?}"
    );
}
