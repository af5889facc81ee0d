//! Token-stream builders shared by the integration tests.
#![allow(dead_code)]

use dxbc_glsl::sm4::opcode::{Opcode, OPCODE_LEN_SHIFT, OPCODE_TEST_NONZERO_BIT};
use dxbc_glsl::sm4::{encode_version_token, ShaderModel, ShaderStage};
use dxbc_glsl::sm4_ir::OperandType;

/// `D3D10_SB_NAME` values used by the tests.
pub const NAME_POSITION: u32 = 1;
pub const NAME_FINAL_TRI_EDGE_0: u32 = 17;
pub const NAME_FINAL_TRI_INSIDE: u32 = 20;

pub fn opcode_token(op: Opcode, len: u32) -> u32 {
    op.raw() | (len << OPCODE_LEN_SHIFT)
}

/// `num_components` field: 0, 1 or 4 components.
fn component_field(n: u32) -> u32 {
    match n {
        0 => 0,
        1 => 1,
        _ => 2,
    }
}

/// An operand token. `selection` is the raw 8-bit selection field (mask,
/// swizzle or select-1 component).
pub fn operand_token(ty: OperandType, components: u32, mode: u32, selection: u32, index_dim: u32) -> u32 {
    component_field(components) | (mode << 2) | (selection << 4) | ((ty as u32) << 12) | (index_dim << 20)
}

/// `r#.mask`-style destination with one immediate index.
pub fn reg_dst(ty: OperandType, reg: u32, mask: u8) -> Vec<u32> {
    vec![operand_token(ty, 4, 0, u32::from(mask), 1), reg]
}

/// Swizzled source with one immediate index.
pub fn reg_src(ty: OperandType, reg: u32, swizzle: [u8; 4]) -> Vec<u32> {
    let sel = swizzle
        .iter()
        .enumerate()
        .fold(0, |acc, (i, &c)| acc | (u32::from(c & 3) << (2 * i)));
    vec![operand_token(ty, 4, 1, sel, 1), reg]
}

/// Single-component source (`r1.y`).
pub fn reg_scalar(ty: OperandType, reg: u32, comp: u8) -> Vec<u32> {
    vec![operand_token(ty, 4, 2, u32::from(comp), 1), reg]
}

/// `cb<slot>[<reg>].xyzw`.
pub fn cb_src(slot: u32, reg: u32) -> Vec<u32> {
    vec![operand_token(OperandType::ConstantBuffer, 4, 1, 0xe4, 2), slot, reg]
}

pub fn imm32_vec4(values: [u32; 4]) -> Vec<u32> {
    let mut out = vec![operand_token(OperandType::Immediate32, 4, 0, 0, 0)];
    out.extend_from_slice(&values);
    out
}

pub fn imm32_scalar(value: u32) -> Vec<u32> {
    vec![operand_token(OperandType::Immediate32, 1, 0, 0, 0), value]
}

pub fn float4(values: [f32; 4]) -> Vec<u32> {
    imm32_vec4(values.map(f32::to_bits))
}

/// One instruction: opcode token with `bits` or-ed in, then the operands.
pub fn inst_bits(op: Opcode, bits: u32, operands: &[Vec<u32>]) -> Vec<u32> {
    let len = 1 + operands.iter().map(Vec::len).sum::<usize>() as u32;
    let mut out = vec![opcode_token(op, len) | bits];
    for o in operands {
        out.extend_from_slice(o);
    }
    out
}

pub fn inst(op: Opcode, operands: &[Vec<u32>]) -> Vec<u32> {
    inst_bits(op, 0, operands)
}

/// A conditional instruction testing for non-zero.
pub fn inst_nz(op: Opcode, operands: &[Vec<u32>]) -> Vec<u32> {
    inst_bits(op, OPCODE_TEST_NONZERO_BIT, operands)
}

/// Declaration with a payload field in bits 11.. of the opcode token.
pub fn decl_field(op: Opcode, field: u32, operands: &[Vec<u32>]) -> Vec<u32> {
    inst_bits(op, field << 11, operands)
}

pub fn dcl_temps(n: u32) -> Vec<u32> {
    inst(Opcode::DclTemps, &[vec![n]])
}

/// Version token, length token, then `body`.
pub fn program_tokens(stage: ShaderStage, body: &[Vec<u32>]) -> Vec<u32> {
    let mut toks = vec![encode_version_token(stage, ShaderModel { major: 5, minor: 0 }), 0];
    for part in body {
        toks.extend_from_slice(part);
    }
    toks[1] = toks.len() as u32;
    toks
}

/// Lines of `text` between `open` (a line ending in `{`) and its closing
/// brace, trimmed.
pub fn block_body<'a>(text: &'a str, open: &str) -> Vec<&'a str> {
    let mut lines = text.lines().skip_while(|l| !l.trim_start().starts_with(open));
    let Some(first) = lines.next() else {
        return Vec::new();
    };
    let indent = first.len() - first.trim_start().len();
    lines
        .take_while(|l| !(l.trim() == "}" && l.len() - l.trim_start().len() == indent))
        .map(str::trim)
        .collect()
}
