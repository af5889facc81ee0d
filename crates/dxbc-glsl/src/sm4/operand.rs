//! Operand token decoding.

use super::opcode::*;
use super::reader::{peek_bitfield, TokenReader};
use crate::error::{DecodeError, DecodeErrorKind};
use crate::sm4_ir::{
    ComponentCount, ComponentSelection, Immediate, IndexChain, Operand, OperandArena, OperandId,
    OperandIndex, OperandModifier, OperandType, Swizzle, WriteMask,
};

/// Decodes one operand (and any relative-index operands nested inside it)
/// into `arena`, returning the id of the outer operand.
///
/// Nesting is bounded by the enclosing instruction length, so recursion depth
/// is bounded by the bytecode, not by the input size as a whole.
pub fn decode_operand(
    r: &mut TokenReader<'_>,
    arena: &mut OperandArena,
) -> Result<OperandId, DecodeError> {
    let at = r.at();
    let token = r.read_u32()?;
    let malformed = |msg: String| DecodeError::new(at, DecodeErrorKind::MalformedOperand(msg));

    let num_components = match token & OPERAND_NUM_COMPONENTS_MASK {
        0 => ComponentCount::Zero,
        1 => ComponentCount::One,
        2 => ComponentCount::Four,
        _ => return Err(malformed("N-component operands are not supported".into())),
    };

    let selection = match num_components {
        ComponentCount::Four => {
            let mode = peek_bitfield(token, OPERAND_SELECTION_MODE_SHIFT, 2);
            match mode {
                OPERAND_SEL_MASK => ComponentSelection::Mask(WriteMask(
                    peek_bitfield(token, OPERAND_COMPONENT_SELECT_SHIFT, 4) as u8,
                )),
                OPERAND_SEL_SWIZZLE => {
                    let bits = peek_bitfield(token, OPERAND_COMPONENT_SELECT_SHIFT, 8);
                    ComponentSelection::Swizzle(Swizzle([
                        (bits & 3) as u8,
                        ((bits >> 2) & 3) as u8,
                        ((bits >> 4) & 3) as u8,
                        ((bits >> 6) & 3) as u8,
                    ]))
                }
                OPERAND_SEL_SELECT1 => ComponentSelection::Select1(peek_bitfield(
                    token,
                    OPERAND_COMPONENT_SELECT_SHIFT,
                    2,
                ) as u8),
                other => return Err(malformed(format!("unknown selection mode {other}"))),
            }
        }
        ComponentCount::Zero | ComponentCount::One => ComponentSelection::None,
    };

    let raw_ty = peek_bitfield(token, OPERAND_TYPE_SHIFT, 8);
    let ty = OperandType::from_u32(raw_ty)
        .ok_or_else(|| malformed(format!("unknown register type {raw_ty}")))?;

    let index_dim = peek_bitfield(token, OPERAND_INDEX_DIMENSION_SHIFT, 2) as usize;
    if index_dim > 3 {
        return Err(malformed(format!("index dimension {index_dim}")));
    }

    let mut modifier = OperandModifier::None;
    let mut non_uniform = false;
    let mut min_precision = 0;
    let mut extended = token & OPERAND_EXTENDED_BIT != 0;
    while extended {
        let ext = r.read_u32()?;
        extended = ext & OPERAND_EXTENDED_BIT != 0;
        match ext & EXT_OPERAND_TYPE_MASK {
            0 => {}
            EXT_OPERAND_MODIFIER => {
                modifier = match peek_bitfield(ext, EXT_OPERAND_MODIFIER_SHIFT, 8) {
                    0 => OperandModifier::None,
                    1 => OperandModifier::Neg,
                    2 => OperandModifier::Abs,
                    3 => OperandModifier::AbsNeg,
                    other => return Err(malformed(format!("unknown operand modifier {other}"))),
                };
                min_precision = peek_bitfield(ext, EXT_OPERAND_MIN_PRECISION_SHIFT, 3) as u8;
                non_uniform = ext & EXT_OPERAND_NON_UNIFORM_BIT != 0;
            }
            other => return Err(malformed(format!("unknown extended operand type {other}"))),
        }
    }

    let mut indices = IndexChain::default();
    for shift in OPERAND_INDEX_REP_SHIFTS.iter().take(index_dim) {
        let index = match peek_bitfield(token, *shift, 3) {
            0 => OperandIndex::Imm32(r.read_u32()?),
            1 => OperandIndex::Imm64(r.read_u64_hi_lo()?),
            2 => OperandIndex::Relative(decode_operand(r, arena)?),
            3 => {
                let imm = r.read_u32()?;
                OperandIndex::Imm32PlusRelative(imm, decode_operand(r, arena)?)
            }
            4 => {
                let imm = r.read_u64_hi_lo()?;
                OperandIndex::Imm64PlusRelative(imm, decode_operand(r, arena)?)
            }
            other => return Err(malformed(format!("unknown index representation {other}"))),
        };
        // Cannot overflow: `take(index_dim)` with index_dim <= 3.
        indices.push(index);
    }

    let immediate = match ty {
        OperandType::Immediate32 => {
            let count = num_components.count();
            if count == 0 {
                return Err(malformed("immediate without components".into()));
            }
            let mut values = [0u32; 4];
            for v in values.iter_mut().take(count) {
                *v = r.read_u32()?;
            }
            Some(Immediate::U32 {
                values,
                count: count as u8,
            })
        }
        OperandType::Immediate64 => {
            // Scalar: one double. Vector: two doubles in four DWORDs. Low word first.
            let count = match num_components {
                ComponentCount::One => 1,
                ComponentCount::Four => 2,
                ComponentCount::Zero => {
                    return Err(malformed("immediate without components".into()))
                }
            };
            let mut values = [0u64; 2];
            for v in values.iter_mut().take(count) {
                let lo = r.read_u32()?;
                let hi = r.read_u32()?;
                *v = (u64::from(hi) << 32) | u64::from(lo);
            }
            Some(Immediate::U64 {
                values,
                count: count as u8,
            })
        }
        _ => None,
    };

    Ok(arena.push(Operand {
        ty,
        num_components,
        selection,
        indices,
        modifier,
        non_uniform,
        min_precision,
        immediate,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(toks: &[u32]) -> Result<(OperandArena, OperandId, usize), DecodeError> {
        let mut arena = OperandArena::default();
        let mut r = TokenReader::new(toks, 0);
        let id = decode_operand(&mut r, &mut arena)?;
        Ok((arena, id, r.consumed()))
    }

    #[test]
    fn temp_destination_with_mask() {
        // r3.xz
        let (arena, id, used) = decode(&[0x0010_0052, 3]).unwrap();
        let op = &arena[id];
        assert_eq!(used, 2);
        assert_eq!(op.ty, OperandType::Temp);
        assert_eq!(op.selection, ComponentSelection::Mask(WriteMask(0b0101)));
        assert_eq!(op.register(), Some(3));
    }

    #[test]
    fn constant_buffer_with_relative_index() {
        // cb0[r1.x + 4].yzwx
        let cb = 0x0020_0002 | (8 << 12) | (1 << 2) | (0b00_11_10_01 << 4) | (3 << 25);
        let rel = 0x0010_0002 | (2 << 2); // r1.x (select1)
        let (arena, id, used) = decode(&[cb, 0, 4, rel, 1]).unwrap();
        let op = &arena[id];
        assert_eq!(used, 5);
        assert_eq!(op.ty, OperandType::ConstantBuffer);
        assert_eq!(op.selection, ComponentSelection::Swizzle(Swizzle([1, 2, 3, 0])));
        let OperandIndex::Imm32PlusRelative(4, rel_id) = op.indices.as_slice()[1] else {
            panic!("expected relative index, got {:?}", op.indices);
        };
        assert_eq!(arena[rel_id].ty, OperandType::Temp);
        assert_eq!(arena[rel_id].selection, ComponentSelection::Select1(0));
        assert!(!op.indices.as_slice()[1].is_simple());
    }

    #[test]
    fn extended_modifier_sets_neg_abs() {
        let tok = 0x0010_0002 | (1 << 2) | (0xe4 << 4) | OPERAND_EXTENDED_BIT;
        let ext = EXT_OPERAND_MODIFIER | (3 << 6) | EXT_OPERAND_NON_UNIFORM_BIT;
        let (arena, id, _) = decode(&[tok, ext, 0]).unwrap();
        assert_eq!(arena[id].modifier, OperandModifier::AbsNeg);
        assert!(arena[id].non_uniform);
    }

    #[test]
    fn unknown_register_type_is_malformed() {
        let tok = 0x0010_0002 | (0xfe << 12);
        let err = decode(&[tok, 0]).unwrap_err();
        assert!(matches!(err.kind, DecodeErrorKind::MalformedOperand(_)), "{err}");
    }

    #[test]
    fn truncated_immediate_is_end_of_stream() {
        let tok = 0x0000_0042 | (4 << 12); // l(a, b, c, d) with one value missing
        let err = decode(&[tok, 1, 2, 3]).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::UnexpectedEndOfStream);
    }
}
