//! Operand reads and destination writes.
//!
//! Every register file has a fixed arithmetic class (temps take the type of
//! their first write, shadow IO arrays are `vec4`). Reads convert from that
//! class to the one the consuming instruction wants; writes convert back.

use super::emitter::{Emitter, Scope};
use super::resources::{named_lane, CbLayout};
use super::types::{apply_modifier, cast, component_selector, literal, ValueType};
use crate::dialect::RuleFlags;
use crate::error::TranslateError;
use crate::sm4::ShaderStage;
use crate::sm4_ir::{ComponentSelection, Immediate, Operand, OperandId, OperandIndex, OperandType};

/// A resolved destination operand.
#[derive(Debug, Clone)]
pub(crate) struct Dst {
    /// Writable lvalue without a component selector.
    pub target: String,
    pub native: ValueType,
    /// Written components in ascending order.
    pub comps: Vec<u8>,
    /// The target is a scalar builtin; no selector is ever appended.
    pub scalar: bool,
}

const IDENTITY: [u8; 4] = [0, 1, 2, 3];

impl Emitter<'_> {
    /// `float`/`ivec3`/... for `n` lanes of `ty` in the current dialect.
    pub(crate) fn vec(&self, ty: ValueType, n: usize) -> String {
        ty.vec_name(n, &self.rules)
    }

    /// Reads operand `id` as `want`, one lane per entry of `lanes` (the
    /// destination components being computed). Source modifiers apply.
    pub(crate) fn src(&self, id: OperandId, want: ValueType, lanes: &[u8]) -> Result<String, TranslateError> {
        let expr = self.src_raw(id, want, lanes)?;
        let op = self.program.operand(id);
        Ok(apply_modifier(expr, op.modifier, want))
    }

    /// Like [`Emitter::src`] without the source modifier.
    pub(crate) fn src_raw(&self, id: OperandId, want: ValueType, lanes: &[u8]) -> Result<String, TranslateError> {
        let op = self.program.operand(id);
        let comps: Vec<u8> = lanes
            .iter()
            .map(|&lane| match op.selection {
                ComponentSelection::Mask(_) => lane & 3,
                sel => sel.component(usize::from(lane)),
            })
            .collect();
        let n = comps.len().max(1);

        match op.ty {
            OperandType::Immediate32 | OperandType::Immediate64 => {
                let lanes: Vec<String> = comps
                    .iter()
                    .map(|&c| self.immediate_bits(op, c).map(|bits| literal(bits, want, &self.rules)))
                    .collect::<Result<_, _>>()?;
                return Ok(self.construct(want, lanes));
            }
            OperandType::ConstantBuffer => {
                if let Some(expr) = self.named_cbuffer(op, &comps, want)? {
                    return Ok(expr);
                }
            }
            _ => {}
        }

        let (base, native) = self.base(op)?;
        let swizzled = if comps[..] == IDENTITY {
            base
        } else {
            format!("{base}{}", component_selector(&comps))
        };
        Ok(cast(&swizzled, native, want, n, &self.rules))
    }

    /// `vecN(a, b, ...)`, collapsing to a splat or a bare scalar.
    pub(crate) fn construct(&self, ty: ValueType, lanes: Vec<String>) -> String {
        match lanes.len() {
            0 => ty.zero(&self.rules).to_owned(),
            1 => lanes.into_iter().next().unwrap_or_default(),
            n if lanes.iter().all(|l| *l == lanes[0]) => format!("{}({})", self.vec(ty, n), lanes[0]),
            n => format!("{}({})", self.vec(ty, n), lanes.join(", ")),
        }
    }

    fn immediate_bits(&self, op: &Operand, comp: u8) -> Result<u32, TranslateError> {
        match op.immediate {
            Some(Immediate::U32 { values, count }) => Ok(if count >= 4 {
                values[usize::from(comp & 3)]
            } else {
                values[0]
            }),
            Some(Immediate::U64 { values, .. }) => {
                self.require(RuleFlags::DOUBLES, "64-bit immediates")?;
                // Dwords of the pair: lo0, hi0, lo1, hi1.
                let v = values[usize::from((comp >> 1) & 1)];
                Ok(if comp & 1 == 0 { v as u32 } else { (v >> 32) as u32 })
            }
            None => Err(self.unsupported("immediate operand without a value")),
        }
    }

    /// Per-lane reads of a constant buffer that has named members.
    /// `None` when the buffer is accessed as raw registers.
    fn named_cbuffer(&self, op: &Operand, comps: &[u8], want: ValueType) -> Result<Option<String>, TranslateError> {
        let cb = self.cbuffer(op)?;
        let CbLayout::Named(members) = &cb.layout else {
            return Ok(None);
        };
        let index = op.indices.get(1).copied().unwrap_or(OperandIndex::Imm32(0));
        let Some(reg) = index.as_imm32() else {
            return Err(self.unresolved(format!("dynamic index into cb{}", cb.slot)));
        };
        let mut lanes = Vec::with_capacity(comps.len());
        for &c in comps {
            match named_lane(members, reg, c, &self.rules) {
                None => {
                    return Err(self.unresolved(format!(
                        "cb{}[{reg}] is not covered by any variable",
                        cb.slot
                    )))
                }
                Some(None) => lanes.push(want.zero(&self.rules).to_owned()),
                Some(Some((expr, ty))) => lanes.push(cast(&expr, ty, want, 1, &self.rules)),
            }
        }
        Ok(Some(self.construct(want, lanes)))
    }

    fn cbuffer(&self, op: &Operand) -> Result<&super::resources::CbBuffer, TranslateError> {
        let slot = op
            .register()
            .ok_or_else(|| self.unresolved("constant buffer selected dynamically"))?;
        self.res
            .cbuffers
            .get(&slot)
            .ok_or_else(|| self.unresolved(format!("cb{slot} has no dcl_constantbuffer")))
    }

    /// Subscript for one index dimension.
    pub(crate) fn index_expr(&self, index: &OperandIndex) -> Result<String, TranslateError> {
        match *index {
            OperandIndex::Imm32(n) => Ok(n.to_string()),
            OperandIndex::Relative(id) => self.src(id, ValueType::Int, &[0]),
            OperandIndex::Imm32PlusRelative(n, id) => {
                Ok(format!("({} + {n})", self.src(id, ValueType::Int, &[0])?))
            }
            OperandIndex::Imm64(n) => {
                self.require(RuleFlags::INT64, "64-bit register indices")?;
                Ok(format!("int({n}l)"))
            }
            OperandIndex::Imm64PlusRelative(n, id) => {
                self.require(RuleFlags::INT64, "64-bit register indices")?;
                Ok(format!("({} + int({n}l))", self.src(id, ValueType::Int, &[0])?))
            }
        }
    }

    /// `outer * stride + inner`, folded when both are static.
    fn flat_index(&self, outer: &OperandIndex, stride: u32, inner: &OperandIndex) -> Result<String, TranslateError> {
        if let (Some(o), Some(i)) = (outer.as_imm32(), inner.as_imm32()) {
            return Ok((o * stride + i).to_string());
        }
        Ok(format!(
            "{} * {stride} + {}",
            self.index_expr(outer)?,
            self.index_expr(inner)?
        ))
    }

    fn nth_index<'o>(&self, op: &'o Operand, i: usize) -> Result<&'o OperandIndex, TranslateError> {
        op.indices
            .get(i)
            .ok_or_else(|| self.unsupported(format!("`{:?}` operand is missing index {i}", op.ty)))
    }

    /// The full four-component register an operand names, with its native
    /// class.
    fn base(&self, op: &Operand) -> Result<(String, ValueType), TranslateError> {
        use OperandType::*;
        let stage = self.program.stage;
        let two_d = op.indices.len() >= 2;
        let int4 = |e: &str| (format!("{}({e})", self.vec(ValueType::Int, 4)), ValueType::Int);
        let uint4 = |e: &str| (format!("{}({e})", self.vec(ValueType::Uint, 4)), ValueType::Uint);
        Ok(match op.ty {
            Temp => {
                let reg = op
                    .register()
                    .ok_or_else(|| self.unsupported("dynamically indexed temp"))?;
                let ty = self.temps.get(&reg).copied().unwrap_or(ValueType::Float);
                (format!("r{reg}"), ty)
            }
            IndexableTemp => {
                let array = self
                    .nth_index(op, 0)?
                    .as_imm32()
                    .ok_or_else(|| self.unsupported("dynamically selected indexable temp"))?;
                let i = self.index_expr(self.nth_index(op, 1)?)?;
                (format!("x{array}[{i}]"), ValueType::Float)
            }
            Input if two_d && stage == ShaderStage::Geometry => {
                let i = self.flat_index(self.nth_index(op, 0)?, self.io.input_regs, self.nth_index(op, 1)?)?;
                (format!("v[{i}]"), ValueType::Float)
            }
            Input | InputControlPoint if two_d && matches!(stage, ShaderStage::Hull | ShaderStage::Domain) => {
                let i = self.flat_index(self.nth_index(op, 0)?, self.io.input_regs, self.nth_index(op, 1)?)?;
                (format!("vicp[{i}]"), ValueType::Float)
            }
            Input if matches!(stage, ShaderStage::Hull | ShaderStage::Domain) => {
                (format!("vicp[{}]", self.index_expr(self.nth_index(op, 0)?)?), ValueType::Float)
            }
            Input => (format!("v[{}]", self.index_expr(self.nth_index(op, 0)?)?), ValueType::Float),
            OutputControlPoint if stage == ShaderStage::Hull => {
                let i = if two_d {
                    self.flat_index(self.nth_index(op, 0)?, self.io.output_regs, self.nth_index(op, 1)?)?
                } else {
                    self.index_expr(self.nth_index(op, 0)?)?
                };
                (format!("vocp[{i}]"), ValueType::Float)
            }
            InputPatchConstant if stage == ShaderStage::Hull => {
                (format!("opc[{}]", self.index_expr(self.nth_index(op, 0)?)?), ValueType::Float)
            }
            InputPatchConstant if stage == ShaderStage::Domain => {
                (format!("vpc[{}]", self.index_expr(self.nth_index(op, 0)?)?), ValueType::Float)
            }
            Output => {
                let i = self.index_expr(self.nth_index(op, 0)?)?;
                if matches!(self.scope, Scope::Fork | Scope::Join) {
                    (format!("opc[{i}]"), ValueType::Float)
                } else {
                    (format!("o[{i}]"), ValueType::Float)
                }
            }
            ConstantBuffer => {
                let cb = self.cbuffer(op)?;
                let i = self.index_expr(self.nth_index(op, 1)?)?;
                (format!("{}[{i}]", cb.raw_name()), ValueType::Float)
            }
            ImmediateConstantBuffer => {
                if self.res.icb.is_none() {
                    return Err(self.unresolved("icb read without dcl_immediateConstantBuffer"));
                }
                let i = self.index_expr(self.nth_index(op, 0)?)?;
                let ty = if super::resources::Resources::icb_is_uint(&self.rules) {
                    ValueType::Uint
                } else {
                    ValueType::Float
                };
                (format!("icb[{i}]"), ty)
            }
            InputPrimitiveId if stage == ShaderStage::Geometry => int4("gl_PrimitiveIDIn"),
            InputPrimitiveId => int4("gl_PrimitiveID"),
            InputGsInstanceId | OutputControlPointId => int4("gl_InvocationID"),
            InputForkInstanceId | InputJoinInstanceId => int4("phase_instance"),
            InputCoverageMask => {
                self.require(RuleFlags::SAMPLE_INTERPOLATION, "gl_SampleMaskIn")?;
                int4("gl_SampleMaskIn[0]")
            }
            InputThreadId => uint4(&format!("gl_GlobalInvocationID, {}", ValueType::Uint.zero(&self.rules))),
            InputThreadGroupId => uint4(&format!("gl_WorkGroupID, {}", ValueType::Uint.zero(&self.rules))),
            InputThreadIdInGroup => {
                uint4(&format!("gl_LocalInvocationID, {}", ValueType::Uint.zero(&self.rules)))
            }
            InputThreadIdInGroupFlattened => uint4("gl_LocalInvocationIndex"),
            InputDomainPoint => ("vec4(gl_TessCoord, 0.0)".to_owned(), ValueType::Float),
            other => return Err(self.unsupported(format!("`{other:?}` operand used as a value"))),
        })
    }

    /// Resolves a destination operand. `None` for `null` and empty masks.
    pub(crate) fn dst(&self, id: OperandId) -> Result<Option<Dst>, TranslateError> {
        let op = self.program.operand(id);
        let mask = op.write_mask();
        if op.ty == OperandType::Null || mask.is_empty() {
            return Ok(None);
        }
        let comps: Vec<u8> = mask.components().collect();
        let (target, native, scalar) = match op.ty {
            OperandType::OutputDepth
            | OperandType::OutputDepthGreaterEqual
            | OperandType::OutputDepthLessEqual => {
                self.require(RuleFlags::FRAG_DEPTH, "gl_FragDepth")?;
                ("gl_FragDepth".to_owned(), ValueType::Float, true)
            }
            OperandType::OutputCoverageMask => {
                self.require(RuleFlags::SAMPLE_INTERPOLATION, "gl_SampleMask")?;
                ("gl_SampleMask[0]".to_owned(), ValueType::Int, true)
            }
            OperandType::Temp | OperandType::IndexableTemp | OperandType::Output => {
                let (target, native) = self.base(op)?;
                (target, native, false)
            }
            other => return Err(self.unsupported(format!("`{other:?}` operand used as a destination"))),
        };
        Ok(Some(Dst {
            target,
            native,
            comps: if scalar { vec![0] } else { comps },
            scalar,
        }))
    }

    /// Emits `dst = value;` where `value` holds one lane of `ty` per written
    /// component. Applies the instruction's saturate bit.
    pub(crate) fn store(&mut self, dst: &Dst, value: &str, ty: ValueType) {
        let n = dst.comps.len();
        let value = if self.saturate && ty == ValueType::Float {
            format!("clamp({value}, 0.0, 1.0)")
        } else {
            value.to_owned()
        };
        let value = cast(&value, ty, dst.native, n, &self.rules);
        let selector = if dst.scalar || dst.comps[..] == IDENTITY {
            String::new()
        } else {
            component_selector(&dst.comps)
        };
        self.line(format!("{}{selector} = {value};", dst.target));
    }
}
