mod common;

use common::*;
use dxbc_glsl::sm4::opcode::Opcode;
use dxbc_glsl::sm4::{decode_program, ShaderModel, ShaderStage};
use dxbc_glsl::sm4_ir::{
    ComponentSelection, DeclKind, Immediate, OperandType, Swizzle, WriteMask,
};
use dxbc_glsl::DecodeErrorKind;
use pretty_assertions::assert_eq;

#[test]
fn header_gives_stage_and_model() {
    let toks = program_tokens(ShaderStage::Domain, &[inst(Opcode::Ret, &[])]);
    let program = decode_program(&toks).unwrap();
    assert_eq!(program.stage, ShaderStage::Domain);
    assert_eq!(program.model, ShaderModel { major: 5, minor: 0 });
    assert_eq!(program.instructions.len(), 1);
    assert_eq!(program.instructions[0].opcode, Opcode::Ret);
}

#[test]
fn declarations_are_decoded_in_order() {
    let toks = program_tokens(
        ShaderStage::Pixel,
        &[
            inst(
                Opcode::DclConstantBuffer,
                &[vec![operand_token(OperandType::ConstantBuffer, 4, 1, 0xe4, 2), 3, 12]],
            ),
            dcl_temps(5),
            inst(Opcode::DclOutput, &[reg_dst(OperandType::Output, 0, 0xf)]),
            inst(Opcode::Ret, &[]),
        ],
    );
    let program = decode_program(&toks).unwrap();
    let kinds: Vec<_> = program.declarations.iter().map(|d| &d.kind).collect();
    assert_eq!(kinds.len(), 3);
    assert_eq!(
        *kinds[0],
        DeclKind::ConstantBuffer {
            slot: 3,
            size_vec4: 12,
            dynamic: false,
        }
    );
    assert_eq!(*kinds[1], DeclKind::Temps(5));
    assert!(matches!(
        kinds[2],
        DeclKind::Output {
            system_value: None,
            ..
        }
    ));
    assert_eq!(program.declarations[0].at_dword, 2);
}

#[test]
fn source_selection_modes() {
    let toks = program_tokens(
        ShaderStage::Vertex,
        &[
            inst(
                Opcode::Add,
                &[
                    reg_dst(OperandType::Temp, 0, 0b0101),
                    reg_src(OperandType::Temp, 1, [3, 2, 1, 0]),
                    reg_scalar(OperandType::Temp, 2, 1),
                ],
            ),
            inst(Opcode::Ret, &[]),
        ],
    );
    let program = decode_program(&toks).unwrap();
    let add = &program.instructions[0];
    let ops: Vec<_> = add.operands().iter().map(|&id| &program.operands[id]).collect();

    assert_eq!(ops[0].selection, ComponentSelection::Mask(WriteMask(0b0101)));
    assert_eq!(ops[0].register(), Some(0));
    assert_eq!(ops[1].selection, ComponentSelection::Swizzle(Swizzle([3, 2, 1, 0])));
    assert_eq!(ops[1].component(0), 3);
    assert_eq!(ops[2].selection, ComponentSelection::Select1(1));
    assert_eq!(ops[2].ty, OperandType::Temp);
}

#[test]
fn immediates_keep_their_bits() {
    let toks = program_tokens(
        ShaderStage::Pixel,
        &[
            inst(
                Opcode::Mov,
                &[reg_dst(OperandType::Temp, 0, 0xf), imm32_vec4([1, 2, 0xffff_ffff, 0x3f80_0000])],
            ),
            inst(Opcode::Ret, &[]),
        ],
    );
    let program = decode_program(&toks).unwrap();
    let src = &program.operands[program.instructions[0].operands()[1]];
    assert_eq!(src.ty, OperandType::Immediate32);
    assert_eq!(
        src.immediate,
        Some(Immediate::U32 {
            values: [1, 2, 0xffff_ffff, 0x3f80_0000],
            count: 4,
        })
    );
}

#[test]
fn unknown_opcode_is_reported_at_its_dword() {
    let toks = program_tokens(ShaderStage::Pixel, &[vec![0x7ff | (1 << 24)]]);
    let err = decode_program(&toks).unwrap_err();
    assert_eq!(err.at_dword, 2);
    assert_eq!(err.kind, DecodeErrorKind::UnknownOpcode(0x7ff));
}

#[test]
fn zero_length_instruction_is_rejected() {
    let toks = program_tokens(ShaderStage::Pixel, &[vec![Opcode::Ret.raw()]]);
    let err = decode_program(&toks).unwrap_err();
    assert!(matches!(
        err.kind,
        DecodeErrorKind::InstructionLengthMismatch { declared: 0, .. }
    ));
}

#[test]
fn header_length_beyond_the_stream_is_rejected() {
    let mut toks = program_tokens(ShaderStage::Pixel, &[inst(Opcode::Ret, &[])]);
    toks[1] += 4;
    let err = decode_program(&toks).unwrap_err();
    assert_eq!(err.at_dword, 1);
    assert!(matches!(err.kind, DecodeErrorKind::InstructionLengthMismatch { .. }));

    let err = decode_program(&toks[..1]).unwrap_err();
    assert!(matches!(err.kind, DecodeErrorKind::InvalidProgramHeader(_)));
}

#[test]
fn hull_declarations_record_their_phase_position() {
    let toks = program_tokens(
        ShaderStage::Hull,
        &[
            inst(Opcode::HsDecls, &[]),
            decl_field(Opcode::DclInputControlPointCount, 4, &[]),
            inst(Opcode::HsForkPhase, &[]),
            inst(Opcode::DclHsForkPhaseInstanceCount, &[vec![2]]),
            inst(Opcode::Ret, &[]),
        ],
    );
    let program = decode_program(&toks).unwrap();
    let counts: Vec<_> = program
        .declarations
        .iter()
        .filter_map(|d| match d.kind {
            DeclKind::InputControlPointCount(n) => Some(("cp", n, d.inst_pos)),
            DeclKind::HsForkPhaseInstanceCount(n) => Some(("fork", n, d.inst_pos)),
            _ => None,
        })
        .collect();
    assert_eq!(counts, vec![("cp", 4, 0), ("fork", 2, 1)]);
}
