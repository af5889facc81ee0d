//! Arithmetic, bit manipulation, conversion and double-precision opcodes.

use super::emitter::Emitter;
use super::operands::Dst;
use super::types::{alu_types, apply_modifier, cast, literal, single_component_selector, AluTypes, ValueType};
use crate::dialect::RuleFlags;
use crate::error::TranslateError;
use crate::sm4::opcode::Opcode;
use crate::sm4::ShaderStage;
use crate::sm4_ir::{Instruction, OperandId, OperandType};

/// One result of a multi-destination instruction, computed before any of the
/// destinations is written.
struct Pending {
    dst: Dst,
    ty: ValueType,
    /// Statements that must run before `value` is valid.
    setup: Vec<String>,
    value: String,
}

impl Emitter<'_> {
    pub(crate) fn instruction(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        use Opcode::*;
        match inst.opcode {
            Sample | SampleB | SampleL | SampleD | SampleC | SampleCLz | Gather4 | Gather4C
            | Gather4Po | Gather4PoC => self.sample(inst),
            Ld | LdMs => self.load_texel(inst),
            Lod => self.query_lod(inst),
            ResInfo => self.resinfo(inst),
            BufInfo => self.bufinfo(inst),
            LdRaw | LdStructured => self.load_buffer(inst),
            StoreRaw | StoreStructured => self.store_buffer(inst),
            LdUavTyped => self.load_image(inst),
            StoreUavTyped => self.store_image(inst),
            AtomicAnd | AtomicOr | AtomicXor | AtomicCmpStore | AtomicIadd | AtomicImax
            | AtomicImin | AtomicUmax | AtomicUmin | ImmAtomicAlloc | ImmAtomicConsume
            | ImmAtomicIadd | ImmAtomicAnd | ImmAtomicOr | ImmAtomicXor | ImmAtomicExch
            | ImmAtomicCmpExch | ImmAtomicImax | ImmAtomicImin | ImmAtomicUmax | ImmAtomicUmin => {
                self.atomic(inst)
            }
            Mov => self.mov(inst),
            Movc => self.movc(inst),
            Swapc => self.swapc(inst),
            SinCos | Udiv | Imul | Umul | Uaddc | Usubb => self.two_results(inst),
            Dp2 => self.dot(inst, 2),
            Dp3 => self.dot(inst, 3),
            Dp4 => self.dot(inst, 4),
            Eq | Ieq => self.compare(inst, "equal", "=="),
            Ne | Ine => self.compare(inst, "notEqual", "!="),
            Lt | Ilt | Ult => self.compare(inst, "lessThan", "<"),
            Ge | Ige | Uge => self.compare(inst, "greaterThanEqual", ">="),
            FirstBitHi | FirstBitShi | Ubfe | Ibfe | Bfi | F32ToF16 | F16ToF32 => self.per_lane(inst),
            Dadd | Dmax | Dmin | Dmul | Dmov | Dmovc | Ddiv | Dfma | Drcp | Ftod | Itod | Utod => {
                self.double_result(inst)
            }
            Deq | Dge | Dlt | Dne | Dtof | Dtoi | Dtou => self.from_double(inst),
            EvalSnapped | EvalSampleIndex | EvalCentroid => self.eval(inst),
            Msad | SampleInfo | SamplePos => Err(self.unsupported("no GLSL equivalent")),
            InterfaceCall => Err(self.unsupported("class linkage")),
            _ => self.elementwise(inst),
        }
    }

    fn mov(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let ops = inst.operands();
        let Some(dst) = self.dst(ops[0])? else {
            return Ok(());
        };
        let ty = if self.saturate {
            ValueType::Float
        } else {
            self.natural_type(ops[1])
        };
        let value = self.src(ops[1], ty, &dst.comps)?;
        self.store(&dst, &value, ty);
        Ok(())
    }

    /// `(c != 0 ? a : b)` for every lane of `lanes`.
    fn select(&self, cond: OperandId, a: OperandId, b: OperandId, ty: ValueType, lanes: &[u8]) -> Result<String, TranslateError> {
        let mut out = Vec::with_capacity(lanes.len());
        for &lane in lanes {
            let c = self.src(cond, ValueType::Int, &[lane])?;
            let a = self.src(a, ty, &[lane])?;
            let b = self.src(b, ty, &[lane])?;
            out.push(format!("({c} != 0 ? {a} : {b})"));
        }
        Ok(self.construct(ty, out))
    }

    fn movc(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let ops = inst.operands();
        let Some(dst) = self.dst(ops[0])? else {
            return Ok(());
        };
        let ty = if self.saturate {
            ValueType::Float
        } else {
            self.natural_type(ops[2])
        };
        let value = self.select(ops[1], ops[2], ops[3], ty, &dst.comps)?;
        self.store(&dst, &value, ty);
        Ok(())
    }

    fn swapc(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let ops = inst.operands();
        let ty = self.natural_type(ops[3]);
        let mut pending = Vec::new();
        if let Some(dst) = self.dst(ops[0])? {
            let value = self.select(ops[2], ops[4], ops[3], ty, &dst.comps)?;
            pending.push(Pending { dst, ty, setup: Vec::new(), value });
        }
        if let Some(dst) = self.dst(ops[1])? {
            let value = self.select(ops[2], ops[3], ops[4], ty, &dst.comps)?;
            pending.push(Pending { dst, ty, setup: Vec::new(), value });
        }
        self.commit(pending);
        Ok(())
    }

    /// `sincos`, `udiv`, `imul`, `umul`, `uaddc` and `usubb`: two
    /// destinations, each computed over its own write mask.
    fn two_results(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let ops = inst.operands();
        let Some(types) = alu_types(inst.opcode) else {
            return Err(self.unsupported("untyped two-result opcode"));
        };
        let mut pending = Vec::new();
        for which in 0..2 {
            let Some(dst) = self.dst(ops[which])? else {
                continue;
            };
            let n = dst.comps.len();
            let a = self.src(ops[2], types.src, &dst.comps)?;
            let b = match ops.get(3) {
                Some(&id) => self.src(id, types.src, &dst.comps)?,
                None => String::new(),
            };
            let ty = types.dst;
            let vty = self.vec(ty, n);
            let mut setup = Vec::new();
            let value = match (inst.opcode, which) {
                (Opcode::SinCos, 0) => format!("sin({a})"),
                (Opcode::SinCos, _) => format!("cos({a})"),
                (Opcode::Udiv, 0) => format!("({a} / {b})"),
                (Opcode::Udiv, _) => {
                    self.require(RuleFlags::BITWISE_OPS, "integer modulus")?;
                    format!("({a} % {b})")
                }
                (Opcode::Imul | Opcode::Umul, 0) => {
                    self.require(RuleFlags::BITFIELD_FUNCTIONS, "extended multiplication")?;
                    let func = if inst.opcode == Opcode::Imul {
                        "imulExtended"
                    } else {
                        "umulExtended"
                    };
                    let (hi, lo) = (self.fresh(), self.fresh());
                    setup.push(format!("{vty} {hi}, {lo};"));
                    setup.push(format!("{func}({a}, {b}, {hi}, {lo});"));
                    hi
                }
                (Opcode::Imul | Opcode::Umul, _) => format!("({a} * {b})"),
                (Opcode::Uaddc, 0) => format!("({a} + {b})"),
                (Opcode::Usubb, 0) => format!("({a} - {b})"),
                (Opcode::Uaddc | Opcode::Usubb, _) => {
                    self.require(RuleFlags::BITFIELD_FUNCTIONS, "carry and borrow")?;
                    let func = if inst.opcode == Opcode::Uaddc {
                        "uaddCarry"
                    } else {
                        "usubBorrow"
                    };
                    let flag = self.fresh();
                    setup.push(format!("{vty} {flag};"));
                    setup.push(format!("{func}({a}, {b}, {flag});"));
                    flag
                }
                _ => return Err(self.unsupported("unexpected two-result opcode")),
            };
            pending.push(Pending { dst, ty, setup, value });
        }
        self.commit(pending);
        Ok(())
    }

    /// Writes the results of a multi-destination instruction. With more than
    /// one destination every value lands in a block-local first, so a
    /// destination aliasing a source does not corrupt the second result.
    fn commit(&mut self, pending: Vec<Pending>) {
        if let [only] = &pending[..] {
            if only.setup.is_empty() {
                self.store(&only.dst, &only.value, only.ty);
                return;
            }
        }
        if pending.is_empty() {
            return;
        }
        self.line("{");
        self.out.indent();
        let mut names = Vec::with_capacity(pending.len());
        for p in &pending {
            for s in &p.setup {
                self.line(s);
            }
            let name = self.fresh();
            let ty = self.vec(p.ty, p.dst.comps.len());
            self.line(format!("{ty} {name} = {};", p.value));
            names.push(name);
        }
        for (p, name) in pending.iter().zip(&names) {
            self.store(&p.dst, name, p.ty);
        }
        self.out.dedent();
        self.line("}");
    }

    fn dot(&mut self, inst: &Instruction, k: u8) -> Result<(), TranslateError> {
        let ops = inst.operands();
        let Some(dst) = self.dst(ops[0])? else {
            return Ok(());
        };
        let lanes: Vec<u8> = (0..k).collect();
        let a = self.src(ops[1], ValueType::Float, &lanes)?;
        let b = self.src(ops[2], ValueType::Float, &lanes)?;
        let d = format!("dot({a}, {b})");
        let n = dst.comps.len();
        let value = if n == 1 {
            d
        } else {
            format!("{}({d})", self.vec(ValueType::Float, n))
        };
        self.store(&dst, &value, ValueType::Float);
        Ok(())
    }

    /// Comparisons produce `0xffffffff` for true, `0` for false.
    fn compare(&mut self, inst: &Instruction, func: &str, infix: &str) -> Result<(), TranslateError> {
        let ops = inst.operands();
        let Some(types) = alu_types(inst.opcode) else {
            return Err(self.unsupported("untyped comparison"));
        };
        let Some(dst) = self.dst(ops[0])? else {
            return Ok(());
        };
        let a = self.src(ops[1], types.src, &dst.comps)?;
        let b = self.src(ops[2], types.src, &dst.comps)?;
        let n = dst.comps.len();
        let value = if n == 1 {
            format!("-int({a} {infix} {b})")
        } else {
            format!("-{}({func}({a}, {b}))", self.vec(ValueType::Int, n))
        };
        self.store(&dst, &value, ValueType::Int);
        Ok(())
    }

    fn elementwise(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let ops = inst.operands();
        let Some(types) = alu_types(inst.opcode) else {
            return Err(self.unsupported("no GLSL translation"));
        };
        let Some(dst) = self.dst(ops[0])? else {
            return Ok(());
        };
        let a = ops[1..]
            .iter()
            .map(|&id| self.src(id, types.src, &dst.comps))
            .collect::<Result<Vec<_>, _>>()?;
        let value = self.elementwise_expr(inst.opcode, &a, dst.comps.len(), types)?;
        self.store(&dst, &value, types.dst);
        Ok(())
    }

    fn elementwise_expr(&mut self, op: Opcode, a: &[String], n: usize, types: AluTypes) -> Result<String, TranslateError> {
        use Opcode::*;
        let arg = |i: usize| a.get(i).map_or("", String::as_str);
        let call = |f: &str| format!("{f}({})", arg(0));
        let shift_mask = literal(31, types.src, &self.rules);
        Ok(match op {
            Add | Iadd => format!("({} + {})", arg(0), arg(1)),
            Mul => format!("({} * {})", arg(0), arg(1)),
            Div => format!("({} / {})", arg(0), arg(1)),
            Mad | Imad | Umad => format!("({} * {} + {})", arg(0), arg(1), arg(2)),
            Min | Imin | Umin => format!("min({}, {})", arg(0), arg(1)),
            Max | Imax | Umax => format!("max({}, {})", arg(0), arg(1)),
            Frc => call("fract"),
            Exp => call("exp2"),
            Log => call("log2"),
            Sqrt => call("sqrt"),
            Rsq => call("inversesqrt"),
            Rcp => format!("(1.0 / {})", arg(0)),
            RoundNe => {
                self.require(RuleFlags::ROUND_EVEN_TRUNC, "roundEven")?;
                call("roundEven")
            }
            RoundNi => call("floor"),
            RoundPi => call("ceil"),
            RoundZ if self.rules.has(RuleFlags::ROUND_EVEN_TRUNC) => call("trunc"),
            RoundZ => format!("(sign({0}) * floor(abs({0})))", arg(0)),
            DerivRtx | DerivRty | DerivRtxCoarse | DerivRtxFine | DerivRtyCoarse | DerivRtyFine => {
                self.derivative(op, arg(0))?
            }
            Ineg => format!("-({})", arg(0)),
            Ishl | Ishr | Ushr | And | Or | Xor | Not => {
                self.require(RuleFlags::BITWISE_OPS, "bitwise operators")?;
                match op {
                    Ishl => format!("({} << ({} & {shift_mask}))", arg(0), arg(1)),
                    Ishr | Ushr => format!("({} >> ({} & {shift_mask}))", arg(0), arg(1)),
                    And => format!("({} & {})", arg(0), arg(1)),
                    Or => format!("({} | {})", arg(0), arg(1)),
                    Xor => format!("({} ^ {})", arg(0), arg(1)),
                    _ => format!("(~{})", arg(0)),
                }
            }
            CountBits | FirstBitLo | Bfrev => {
                self.require(RuleFlags::BITFIELD_FUNCTIONS, "bit-field functions")?;
                match op {
                    CountBits => call("bitCount"),
                    FirstBitLo => call("findLSB"),
                    _ => call("bitfieldReverse"),
                }
            }
            Itof | Utof => format!("{}({})", self.vec(ValueType::Float, n), arg(0)),
            Ftoi => format!("{}({})", self.vec(ValueType::Int, n), arg(0)),
            Ftou => format!("{}({})", self.vec(ValueType::Uint, n), arg(0)),
            _ => return Err(self.unsupported("no GLSL translation")),
        })
    }

    fn derivative(&mut self, op: Opcode, a: &str) -> Result<String, TranslateError> {
        if self.program.stage != ShaderStage::Pixel {
            return Err(self.unsupported("derivatives outside a pixel shader"));
        }
        if !self.rules.has(RuleFlags::DERIVATIVES) {
            if self.rules.has(RuleFlags::DERIVATIVES_EXT) {
                self.extensions.insert("GL_OES_standard_derivatives");
            } else {
                self.require(RuleFlags::DERIVATIVES, "derivatives")?;
            }
        }
        let axis = match op {
            Opcode::DerivRtx | Opcode::DerivRtxCoarse | Opcode::DerivRtxFine => 'x',
            _ => 'y',
        };
        let suffix = match op {
            _ if !self.rules.has(RuleFlags::FINE_DERIVATIVES) => "",
            Opcode::DerivRtxCoarse | Opcode::DerivRtyCoarse => "Coarse",
            Opcode::DerivRtxFine | Opcode::DerivRtyFine => "Fine",
            _ => "",
        };
        Ok(format!("dFd{axis}{suffix}({a})"))
    }

    /// Opcodes whose GLSL form takes scalar arguments or needs a per-lane
    /// conditional.
    fn per_lane(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        use Opcode::*;
        let ops = inst.operands();
        let Some(types) = alu_types(inst.opcode) else {
            return Err(self.unsupported("untyped opcode"));
        };
        match inst.opcode {
            F32ToF16 | F16ToF32 => self.require(RuleFlags::PACK_HALF, "half-float packing")?,
            _ => self.require(RuleFlags::BITFIELD_FUNCTIONS, "bit-field functions")?,
        }
        let Some(dst) = self.dst(ops[0])? else {
            return Ok(());
        };
        let mut lanes = Vec::with_capacity(dst.comps.len());
        for &lane in &dst.comps {
            let read = |i: usize, ty: ValueType| self.src(ops[i], ty, &[lane]);
            // Offset and width use their low five bits only.
            let field = |w: &str, o: &str| (format!("{o} & 31"), format!("min({w} & 31, 32 - ({o} & 31))"));
            lanes.push(match inst.opcode {
                FirstBitHi | FirstBitShi => {
                    let msb = format!("findMSB({})", read(1, types.src)?);
                    format!("({msb} < 0 ? -1 : 31 - {msb})")
                }
                Ubfe | Ibfe => {
                    let (o, w) = field(&read(1, ValueType::Int)?, &read(2, ValueType::Int)?);
                    format!("bitfieldExtract({}, {o}, {w})", read(3, types.src)?)
                }
                Bfi => {
                    let (o, w) = field(&read(1, ValueType::Int)?, &read(2, ValueType::Int)?);
                    format!(
                        "bitfieldInsert({}, {}, {o}, {w})",
                        read(4, ValueType::Uint)?,
                        read(3, ValueType::Uint)?
                    )
                }
                F32ToF16 => format!("packHalf2x16(vec2({}, 0.0))", read(1, ValueType::Float)?),
                _ => format!("unpackHalf2x16({}).x", read(1, ValueType::Uint)?),
            });
        }
        let value = self.construct(types.dst, lanes);
        self.store(&dst, &value, types.dst);
        Ok(())
    }

    /// The double in dwords `(2 * pair, 2 * pair + 1)` of a source.
    fn double_src(&self, id: OperandId, pair: u8) -> Result<String, TranslateError> {
        let bits = self.src_raw(id, ValueType::Uint, &[2 * pair, 2 * pair + 1])?;
        let modifier = self.program.operand(id).modifier;
        Ok(apply_modifier(format!("packDouble2x32({bits})"), modifier, ValueType::Float))
    }

    /// Double pairs covered by a destination: 0 for `xy`, 1 for `zw`.
    fn double_pairs(dst: &Dst) -> Vec<u8> {
        let mut pairs: Vec<u8> = dst.comps.iter().map(|c| c / 2).collect();
        pairs.dedup();
        pairs
    }

    fn double_result(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        use Opcode::*;
        self.require(RuleFlags::DOUBLES, "double precision")?;
        let ops = inst.operands();
        let Some(mut dst) = self.dst(ops[0])? else {
            return Ok(());
        };
        let pairs = Self::double_pairs(&dst);
        let mut values = Vec::with_capacity(pairs.len());
        for (k, &p) in pairs.iter().enumerate() {
            let d = |i: usize| self.double_src(ops[i], p);
            let e = match inst.opcode {
                Dadd => format!("({} + {})", d(1)?, d(2)?),
                Dmul => format!("({} * {})", d(1)?, d(2)?),
                Ddiv => format!("({} / {})", d(1)?, d(2)?),
                Dmax => format!("max({}, {})", d(1)?, d(2)?),
                Dmin => format!("min({}, {})", d(1)?, d(2)?),
                Dfma => format!("fma({}, {}, {})", d(1)?, d(2)?, d(3)?),
                Drcp => format!("(1.0 / {})", d(1)?),
                Dmov => d(1)?,
                Dmovc => {
                    let c = self.src(ops[1], ValueType::Int, &[2 * p])?;
                    format!("({c} != 0 ? {} : {})", d(2)?, d(3)?)
                }
                Ftod => format!("double({})", self.src(ops[1], ValueType::Float, &[k as u8])?),
                Itod => format!("double({})", self.src(ops[1], ValueType::Int, &[k as u8])?),
                _ => format!("double({})", self.src(ops[1], ValueType::Uint, &[k as u8])?),
            };
            values.push(format!("unpackDouble2x32({e})"));
        }
        dst.comps = pairs.iter().flat_map(|&p| [2 * p, 2 * p + 1]).collect();
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            format!("{}({})", self.vec(ValueType::Uint, 4), values.join(", "))
        };
        self.store(&dst, &value, ValueType::Uint);
        Ok(())
    }

    /// Double comparisons and conversions to 32-bit: the k-th written
    /// component takes the k-th double of the sources.
    fn from_double(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        use Opcode::*;
        self.require(RuleFlags::DOUBLES, "double precision")?;
        let ops = inst.operands();
        let Some(types) = alu_types(inst.opcode) else {
            return Err(self.unsupported("untyped double opcode"));
        };
        let Some(dst) = self.dst(ops[0])? else {
            return Ok(());
        };
        let mut lanes = Vec::with_capacity(dst.comps.len());
        for k in 0..dst.comps.len() as u8 {
            let a = self.double_src(ops[1], k & 1)?;
            lanes.push(match inst.opcode {
                Dtof => format!("float({a})"),
                Dtoi => format!("int({a})"),
                Dtou => format!("uint({a})"),
                _ => {
                    let b = self.double_src(ops[2], k & 1)?;
                    let infix = match inst.opcode {
                        Deq => "==",
                        Dne => "!=",
                        Dlt => "<",
                        _ => ">=",
                    };
                    format!("-int({a} {infix} {b})")
                }
            });
        }
        let value = self.construct(types.dst, lanes);
        self.store(&dst, &value, types.dst);
        Ok(())
    }

    /// `eval_*`: re-interpolates a pixel-shader input at another location.
    fn eval(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        if self.program.stage != ShaderStage::Pixel {
            return Err(self.unsupported("attribute evaluation outside a pixel shader"));
        }
        self.require(RuleFlags::SAMPLE_INTERPOLATION, "interpolateAt functions")?;
        let ops = inst.operands();
        let Some(dst) = self.dst(ops[0])? else {
            return Ok(());
        };
        let input = self.program.operand(ops[1]);
        let reg = match (input.ty, input.register()) {
            (OperandType::Input, Some(reg)) => reg,
            _ => return Err(self.unsupported("evaluated operand is not a static input")),
        };
        let extra = match inst.opcode {
            Opcode::EvalSampleIndex => format!(", {}", self.src(ops[2], ValueType::Int, &[0])?),
            Opcode::EvalSnapped => {
                let offset = self.src(ops[2], ValueType::Int, &[0, 1])?;
                format!(", vec2({offset}) / 16.0")
            }
            _ => String::new(),
        };
        let func = match inst.opcode {
            Opcode::EvalCentroid => "interpolateAtCentroid",
            Opcode::EvalSampleIndex => "interpolateAtSample",
            _ => "interpolateAtOffset",
        };
        let mut lanes = Vec::with_capacity(dst.comps.len());
        for &lane in &dst.comps {
            let comp = input.component(usize::from(lane));
            let varying = self
                .io
                .varying(reg, comp)
                .ok_or_else(|| self.unresolved(format!("v{reg} is not an interpolated input")))?;
            let expr = format!(
                "{func}({}{extra}){}",
                varying.name,
                single_component_selector(comp)
            );
            let expr = cast(&expr, varying.ty, ValueType::Float, 1, &self.rules);
            lanes.push(apply_modifier(expr, input.modifier, ValueType::Float));
        }
        let value = self.construct(ValueType::Float, lanes);
        self.store(&dst, &value, ValueType::Float);
        Ok(())
    }
}
