#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
#[path = "../tests/common/mod.rs"]
mod common;

#[cfg(not(target_arch = "wasm32"))]
use common::*;
#[cfg(not(target_arch = "wasm32"))]
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
#[cfg(not(target_arch = "wasm32"))]
use dxbc_glsl::sm4::opcode::Opcode;
#[cfg(not(target_arch = "wasm32"))]
use dxbc_glsl::sm4::ShaderStage;
#[cfg(not(target_arch = "wasm32"))]
use dxbc_glsl::sm4_ir::OperandType;
#[cfg(not(target_arch = "wasm32"))]
use dxbc_glsl::{
    decode_program, link_control_flow, translate_dxbc, translate_program, DxbcContainer,
    GlslVersion, TranslateOptions,
};

/// Vertex shader: copy position, then a counted loop accumulating into o1.
#[cfg(not(target_arch = "wasm32"))]
fn vs_loop_tokens() -> Vec<u32> {
    let xyzw = 0xf;
    let id = [0, 1, 2, 3];
    let mut body = vec![
        dcl_temps(2),
        inst(Opcode::DclInput, &[reg_dst(OperandType::Input, 0, xyzw)]),
        inst(
            Opcode::DclOutputSiv,
            &[reg_dst(OperandType::Output, 0, xyzw), vec![NAME_POSITION]],
        ),
        inst(Opcode::DclOutput, &[reg_dst(OperandType::Output, 1, xyzw)]),
        inst(
            Opcode::Mov,
            &[reg_dst(OperandType::Output, 0, xyzw), reg_src(OperandType::Input, 0, id)],
        ),
        inst(Opcode::Mov, &[reg_dst(OperandType::Temp, 0, xyzw), float4([0.0; 4])]),
        inst(Opcode::Mov, &[reg_dst(OperandType::Temp, 1, 0x1), imm32_scalar(0)]),
        inst(Opcode::Loop, &[]),
        inst(
            Opcode::Ige,
            &[
                reg_dst(OperandType::Temp, 1, 0x2),
                reg_scalar(OperandType::Temp, 1, 0),
                imm32_scalar(8),
            ],
        ),
        inst_nz(Opcode::Breakc, &[reg_scalar(OperandType::Temp, 1, 1)]),
    ];
    for _ in 0..16 {
        body.push(inst(
            Opcode::Mad,
            &[
                reg_dst(OperandType::Temp, 0, xyzw),
                reg_src(OperandType::Input, 0, [3, 2, 1, 0]),
                float4([0.5, 0.25, 0.125, 1.0]),
                reg_src(OperandType::Temp, 0, id),
            ],
        ));
    }
    body.extend([
        inst(
            Opcode::Iadd,
            &[
                reg_dst(OperandType::Temp, 1, 0x1),
                reg_scalar(OperandType::Temp, 1, 0),
                imm32_scalar(1),
            ],
        ),
        inst(Opcode::EndLoop, &[]),
        inst(
            Opcode::Mov,
            &[reg_dst(OperandType::Output, 1, xyzw), reg_src(OperandType::Temp, 0, id)],
        ),
        inst(Opcode::Ret, &[]),
    ]);
    program_tokens(ShaderStage::Vertex, &body)
}

/// Pixel shader: a chain of arithmetic on two constant-buffer registers.
#[cfg(not(target_arch = "wasm32"))]
fn ps_math_tokens() -> Vec<u32> {
    let xyzw = 0xf;
    let id = [0, 1, 2, 3];
    let mut body = vec![
        dcl_temps(1),
        inst(
            Opcode::DclConstantBuffer,
            &[vec![operand_token(OperandType::ConstantBuffer, 4, 1, 0xe4, 2), 0, 2]],
        ),
        inst(Opcode::DclOutput, &[reg_dst(OperandType::Output, 0, xyzw)]),
        inst(Opcode::Add, &[reg_dst(OperandType::Temp, 0, xyzw), cb_src(0, 0), cb_src(0, 1)]),
    ];
    for op in [Opcode::Mul, Opcode::Add, Opcode::Max, Opcode::Min].iter().cycle().take(32) {
        body.push(inst(
            *op,
            &[
                reg_dst(OperandType::Temp, 0, xyzw),
                reg_src(OperandType::Temp, 0, [1, 2, 3, 0]),
                cb_src(0, 1),
            ],
        ));
    }
    body.extend([
        inst(
            Opcode::Mov,
            &[reg_dst(OperandType::Output, 0, xyzw), reg_src(OperandType::Temp, 0, id)],
        ),
        inst(Opcode::Ret, &[]),
    ]);
    program_tokens(ShaderStage::Pixel, &body)
}

/// Wraps a token stream in a single-chunk `DXBC` container.
#[cfg(not(target_arch = "wasm32"))]
fn container(tokens: &[u32]) -> Vec<u8> {
    let payload: Vec<u8> = tokens.iter().flat_map(|t| t.to_le_bytes()).collect();
    let total = 32 + 4 + 8 + payload.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"DXBC");
    out.extend_from_slice(&[0; 16]);
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&36u32.to_le_bytes());
    out.extend_from_slice(b"SHEX");
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    out
}

#[cfg(not(target_arch = "wasm32"))]
fn bench_translation_stages(c: &mut Criterion) {
    let shaders = [("vs_loop", vs_loop_tokens()), ("ps_math", ps_math_tokens())];
    let options = TranslateOptions::for_version(GlslVersion::Gl33);

    let mut group = c.benchmark_group("dxbc_glsl_translation");

    for (name, tokens) in &shaders {
        let bytes = container(tokens);
        group.bench_with_input(BenchmarkId::new("parse", name), &bytes, |b, bytes| {
            b.iter(|| {
                let c = DxbcContainer::parse(black_box(bytes)).unwrap();
                black_box(c.shader_tokens().unwrap().len());
            })
        });
    }

    for (name, tokens) in &shaders {
        group.bench_with_input(BenchmarkId::new("decode", name), tokens, |b, tokens| {
            b.iter(|| {
                let program = decode_program(black_box(tokens)).unwrap();
                black_box(program.instructions.len());
            })
        });
    }

    for (name, tokens) in &shaders {
        let program = decode_program(tokens).expect("bench shader should decode");
        group.bench_function(BenchmarkId::new("link", name), |b| {
            b.iter(|| {
                let linked =
                    link_control_flow(black_box(&program.instructions), &program.operands).unwrap();
                black_box(linked.main_end);
            })
        });
    }

    for (name, tokens) in &shaders {
        let mut program = decode_program(tokens).expect("bench shader should decode");
        program.link().expect("bench shader should link");
        for version in [GlslVersion::Es30, GlslVersion::Gl33, GlslVersion::Gl45] {
            let options = TranslateOptions::for_version(version);
            group.bench_function(BenchmarkId::new(format!("GLSL/{version}"), name), |b| {
                b.iter(|| {
                    let out = translate_program(black_box(&program), &options).unwrap();
                    black_box(out.glsl().len());
                })
            });
        }
    }

    for (name, tokens) in &shaders {
        let bytes = container(tokens);
        group.bench_with_input(BenchmarkId::new("end_to_end", name), &bytes, |b, bytes| {
            b.iter(|| {
                let out = translate_dxbc(black_box(bytes), &options).unwrap();
                black_box(out.glsl().len());
            })
        });
    }

    group.finish();
}

#[cfg(not(target_arch = "wasm32"))]
criterion_group!(benches, bench_translation_stages);
#[cfg(not(target_arch = "wasm32"))]
criterion_main!(benches);
