//! Per-program translation state and the statement walker.

use std::collections::{BTreeMap, BTreeSet};
use core::ops::Range;

use tracing::trace;

use super::interface::{stage_layout_lines, IoLayout};
use super::resources::Resources;
use super::types::{alu_types, guess_immediate_type, int_literal, ValueType};
use super::writer::GlslWriter;
use super::{Reflection, TranslateOptions};
use crate::control_flow::LinkedControlFlow;
use crate::dialect::{DialectRules, RuleFlags};
use crate::error::{DecodeError, DecodeErrorKind, TranslateError};
use crate::hull::HullPhases;
use crate::sm4::opcode::Opcode;
use crate::sm4::ShaderStage;
use crate::sm4_ir::{
    DeclKind, Immediate, InstKind, Instruction, OperandId, OperandModifier, OperandType, Program,
    ResInfoReturnType, SyncFlags, TestBoolean,
};

/// Which function the walker is currently filling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    Main,
    Subroutine,
    ControlPoint,
    Fork,
    Join,
}

pub(crate) struct Emitter<'a> {
    pub program: &'a Program,
    pub rules: DialectRules,
    pub options: &'a TranslateOptions,
    pub flow: &'a LinkedControlFlow,
    pub io: IoLayout,
    pub res: Resources,
    /// Arithmetic class of each `r#`, fixed by its first write.
    pub temps: BTreeMap<u32, ValueType>,
    /// `x#` arrays and their lengths.
    pub indexable: BTreeMap<u32, u32>,
    pub extensions: BTreeSet<&'static str>,
    pub reflection: Reflection,
    pub scope: Scope,
    pub inst_index: usize,
    /// Saturate bit of the instruction being emitted.
    pub saturate: bool,
    pub out: GlslWriter,
    next_tmp: u32,
    /// Per open `switch`: whether a `case` body is indented.
    cases: Vec<bool>,
}

impl<'a> Emitter<'a> {
    pub fn new(
        program: &'a Program,
        rules: DialectRules,
        options: &'a TranslateOptions,
        flow: &'a LinkedControlFlow,
        phases: Option<&HullPhases>,
    ) -> Result<Self, TranslateError> {
        let io = IoLayout::build(program, &rules, options, phases)?;
        let res = Resources::collect(program, &rules)?;
        let mut emitter = Self {
            program,
            rules,
            options,
            flow,
            io,
            res,
            temps: BTreeMap::new(),
            indexable: BTreeMap::new(),
            extensions: BTreeSet::new(),
            reflection: Reflection::default(),
            scope: Scope::Main,
            inst_index: 0,
            saturate: false,
            out: GlslWriter::new(),
            next_tmp: 0,
            cases: Vec::new(),
        };
        emitter.infer_temp_types();
        Ok(emitter)
    }

    /// Gives every temp the type of its first write. Temps that are only
    /// read stay float.
    fn infer_temp_types(&mut self) {
        let program = self.program;
        let mut declared = 0;
        for decl in &program.declarations {
            match decl.kind {
                DeclKind::Temps(n) => declared = declared.max(n),
                DeclKind::IndexableTemp { index, count, .. } => {
                    let len = self.indexable.entry(index).or_insert(0);
                    *len = (*len).max(count);
                }
                _ => {}
            }
        }
        for inst in &program.instructions {
            let Some(ty) = self.result_type(inst) else {
                continue;
            };
            for &pos in dst_positions(inst.opcode) {
                let Some(&id) = inst.operands().get(pos) else {
                    continue;
                };
                let op = program.operand(id);
                if op.ty == OperandType::Temp {
                    if let Some(reg) = op.register() {
                        let ty = if pos == 1 { self.second_result_type(inst).unwrap_or(ty) } else { ty };
                        self.temps.entry(reg).or_insert(ty);
                        declared = declared.max(reg + 1);
                    }
                }
            }
        }
        for reg in 0..declared {
            self.temps.entry(reg).or_insert(ValueType::Float);
        }
        // Temps read but never declared or written still need a declaration.
        for inst in &program.instructions {
            for &id in inst.operands() {
                let op = program.operand(id);
                if op.ty == OperandType::Temp {
                    if let Some(reg) = op.register() {
                        self.temps.entry(reg).or_insert(ValueType::Float);
                    }
                }
                for index in op.indices.as_slice() {
                    if let Some(rel) = index.relative() {
                        let rel = program.operand(rel);
                        if let (OperandType::Temp, Some(reg)) = (rel.ty, rel.register()) {
                            self.temps.entry(reg).or_insert(ValueType::Float);
                        }
                    }
                }
            }
        }
    }

    /// Type of the value written to the first destination of `inst`.
    pub(crate) fn result_type(&self, inst: &Instruction) -> Option<ValueType> {
        use Opcode::*;
        let ops = inst.operands();
        if let Some(t) = alu_types(inst.opcode) {
            return Some(t.dst);
        }
        let operand = |i: usize| ops.get(i).copied();
        Some(match inst.opcode {
            Mov => self.natural_type(operand(1)?),
            Movc => self.natural_type(operand(2)?),
            Swapc => self.natural_type(operand(3)?),
            Sample | SampleB | SampleL | SampleD | Gather4 | Gather4Po | Ld | LdMs => {
                let slot = if inst.opcode == Gather4Po { 3 } else { 2 };
                let tex = self.program.operand(operand(slot)?).register()?;
                if self.res.srv_buffers.contains_key(&tex) {
                    ValueType::Uint
                } else {
                    self.res.textures.get(&tex)?.value_type(&self.rules)
                }
            }
            SampleC | SampleCLz | Gather4C | Gather4PoC | Lod => ValueType::Float,
            ResInfo => match inst.kind {
                InstKind::ResInfo {
                    return_type: ResInfoReturnType::Uint,
                    ..
                } => ValueType::Uint,
                _ => ValueType::Float,
            },
            BufInfo | LdRaw | LdStructured => ValueType::Uint,
            LdUavTyped => {
                let slot = self.program.operand(operand(2)?).register()?;
                self.res.uavs.get(&slot).map_or(ValueType::Float, |u| u.image_type())
            }
            ImmAtomicImax | ImmAtomicImin => ValueType::Int,
            ImmAtomicAlloc | ImmAtomicConsume | ImmAtomicIadd | ImmAtomicAnd | ImmAtomicOr
            | ImmAtomicXor | ImmAtomicExch | ImmAtomicCmpExch | ImmAtomicUmax | ImmAtomicUmin => {
                ValueType::Uint
            }
            _ => return None,
        })
    }

    /// Type of the second destination where it differs from the first.
    fn second_result_type(&self, inst: &Instruction) -> Option<ValueType> {
        match inst.opcode {
            Opcode::Swapc => Some(self.natural_type(*inst.operands().get(4)?)),
            _ => None,
        }
    }

    /// The type an operand's bits most plausibly hold, for typeless moves.
    pub(crate) fn natural_type(&self, id: OperandId) -> ValueType {
        let op = self.program.operand(id);
        if op.modifier != OperandModifier::None {
            return ValueType::Float;
        }
        match op.ty {
            OperandType::Temp => op
                .register()
                .and_then(|r| self.temps.get(&r).copied())
                .unwrap_or(ValueType::Float),
            OperandType::Immediate32 => match op.immediate {
                Some(Immediate::U32 { values, count }) => {
                    guess_immediate_type(&values[..usize::from(count.clamp(1, 4))])
                }
                _ => ValueType::Float,
            },
            OperandType::Immediate64 => ValueType::Uint,
            OperandType::ImmediateConstantBuffer if Resources::icb_is_uint(&self.rules) => {
                ValueType::Uint
            }
            OperandType::InputPrimitiveId
            | OperandType::InputGsInstanceId
            | OperandType::OutputControlPointId
            | OperandType::InputForkInstanceId
            | OperandType::InputJoinInstanceId
            | OperandType::InputCoverageMask => ValueType::Int,
            OperandType::InputThreadId
            | OperandType::InputThreadGroupId
            | OperandType::InputThreadIdInGroup
            | OperandType::InputThreadIdInGroupFlattened => ValueType::Uint,
            _ => ValueType::Float,
        }
    }

    pub(crate) fn line(&mut self, s: impl AsRef<str>) {
        self.out.line(s.as_ref());
    }

    /// A fresh block-local name.
    pub(crate) fn fresh(&mut self) -> String {
        let n = self.next_tmp;
        self.next_tmp += 1;
        format!("tmp{n}")
    }

    pub(crate) fn opcode(&self) -> Opcode {
        self.program
            .instructions
            .get(self.inst_index)
            .map_or(Opcode::Nop, |i| i.opcode)
    }

    pub(crate) fn unsupported(&self, reason: impl Into<String>) -> TranslateError {
        TranslateError::UnsupportedInstruction {
            inst_index: self.inst_index,
            opcode: self.opcode(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unresolved(&self, what: impl Into<String>) -> TranslateError {
        TranslateError::UnresolvedBinding {
            inst_index: self.inst_index,
            what: what.into(),
        }
    }

    /// Operand `n` of `inst`. Programs assembled in memory skip the decoder's
    /// operand-count check, so a short list surfaces as malformed bytecode.
    fn operand_at(&self, inst: &Instruction, n: usize) -> Result<OperandId, TranslateError> {
        inst.operands().get(n).copied().ok_or_else(|| {
            malformed(inst, format!("`{}` is missing operand {n}", inst.opcode))
        })
    }

    pub(crate) fn require(&self, flags: RuleFlags, feature: &'static str) -> Result<(), TranslateError> {
        self.rules.require(flags, feature, Some(self.inst_index))
    }

    /// `x != 0` / `x == 0` for the test bit of a conditional instruction.
    pub(crate) fn condition(&mut self, inst: &Instruction, id: OperandId) -> Result<String, TranslateError> {
        let x = self.src(id, ValueType::Int, &[0])?;
        Ok(match inst.kind.test() {
            Some(TestBoolean::Zero) => format!("{x} == 0"),
            _ => format!("{x} != 0"),
        })
    }

    /// Whether `return` from main must flush the output registers first.
    fn returns_store(&self) -> bool {
        self.scope == Scope::Main
            && matches!(
                self.program.stage,
                ShaderStage::Vertex | ShaderStage::Pixel | ShaderStage::Domain
            )
    }

    fn return_statement(&self) -> &'static str {
        if self.returns_store() {
            "{ store_outputs(); return; }"
        } else {
            "return;"
        }
    }

    /// Emits the instructions of `range`. A trailing top-level `ret` is the
    /// natural end of the function and produces nothing.
    pub(crate) fn emit_range(&mut self, range: Range<usize>) -> Result<(), TranslateError> {
        let program = self.program;
        let mut depth = 0usize;
        let end = range.end;
        for pos in range {
            let inst = &program.instructions[pos];
            self.inst_index = pos;
            self.saturate = inst.kind.saturate();
            trace!(pos, opcode = %inst.opcode, "emit");
            if let Some(expected) = inst.opcode.operand_count() {
                if inst.num_ops() != expected {
                    return Err(malformed(
                        inst,
                        format!("`{}` takes {expected} operands, found {}", inst.opcode, inst.num_ops()),
                    ));
                }
            }
            match inst.opcode {
                Opcode::Nop | Opcode::CustomData => {}
                Opcode::HsControlPointPhase | Opcode::HsForkPhase | Opcode::HsJoinPhase | Opcode::HsDecls => {}
                Opcode::If => {
                    let c = self.condition(inst, self.operand_at(inst, 0)?)?;
                    self.line(format!("if ({c}) {{"));
                    self.out.indent();
                    depth += 1;
                }
                Opcode::Else => {
                    self.out.dedent();
                    self.line("} else {");
                    self.out.indent();
                }
                Opcode::EndIf | Opcode::EndLoop => {
                    self.out.dedent();
                    self.line("}");
                    depth = depth.saturating_sub(1);
                }
                Opcode::Loop => {
                    self.line("while (true) {");
                    self.out.indent();
                    depth += 1;
                }
                Opcode::Switch => {
                    self.require(RuleFlags::SWITCH_STATEMENTS, "switch statements")?;
                    let x = self.src(self.operand_at(inst, 0)?, ValueType::Int, &[0])?;
                    self.line(format!("switch ({x}) {{"));
                    self.out.indent();
                    self.cases.push(false);
                    depth += 1;
                }
                Opcode::Case | Opcode::Default => {
                    if self.cases.last().copied().unwrap_or(false) {
                        self.out.dedent();
                    }
                    let label = if inst.opcode == Opcode::Case {
                        let v = self.immediate_scalar(self.operand_at(inst, 0)?)?;
                        format!("case {}:", int_literal(v as i32))
                    } else {
                        "default:".to_owned()
                    };
                    self.line(label);
                    self.out.indent();
                    if let Some(open) = self.cases.last_mut() {
                        *open = true;
                    }
                }
                Opcode::EndSwitch => {
                    let prev = pos.checked_sub(1).map(|p| program.instructions[p].opcode);
                    if matches!(prev, Some(Opcode::Case | Opcode::Default)) {
                        self.line("break;");
                    }
                    if self.cases.pop().unwrap_or(false) {
                        self.out.dedent();
                    }
                    self.out.dedent();
                    self.line("}");
                    depth = depth.saturating_sub(1);
                }
                Opcode::Break => self.line("break;"),
                Opcode::Continue => self.line("continue;"),
                Opcode::Breakc => {
                    let c = self.condition(inst, self.operand_at(inst, 0)?)?;
                    self.line(format!("if ({c}) break;"));
                }
                Opcode::Continuec => {
                    let c = self.condition(inst, self.operand_at(inst, 0)?)?;
                    self.line(format!("if ({c}) continue;"));
                }
                Opcode::Ret => {
                    if !(depth == 0 && pos + 1 == end) {
                        let stmt = self.return_statement();
                        self.line(stmt);
                    }
                }
                Opcode::Retc => {
                    let c = self.condition(inst, self.operand_at(inst, 0)?)?;
                    let stmt = self.return_statement();
                    self.line(format!("if ({c}) {stmt}"));
                }
                Opcode::Discard => {
                    if program.stage != ShaderStage::Pixel {
                        return Err(self.unsupported("discard outside a pixel shader"));
                    }
                    let c = self.condition(inst, self.operand_at(inst, 0)?)?;
                    self.line(format!("if ({c}) discard;"));
                }
                Opcode::Call | Opcode::Callc => {
                    if program.stage == ShaderStage::Hull {
                        return Err(self.unsupported("subroutines in a hull shader"));
                    }
                    let label_op = self.operand_at(inst, usize::from(inst.opcode == Opcode::Callc))?;
                    let id = program
                        .operand(label_op)
                        .register()
                        .ok_or_else(|| self.unresolved("call with a dynamic label"))?;
                    if self.flow.labels.get(id).is_none() {
                        return Err(self.unresolved(format!("label l{id}")));
                    }
                    if inst.opcode == Opcode::Call {
                        self.line(format!("sub_l{id}();"));
                    } else {
                        let c = self.condition(inst, self.operand_at(inst, 0)?)?;
                        self.line(format!("if ({c}) sub_l{id}();"));
                    }
                }
                Opcode::Label => {
                    return Err(self.unsupported("label inside a function body"));
                }
                Opcode::Emit | Opcode::EmitThenCut | Opcode::Cut | Opcode::EmitStream
                | Opcode::CutStream | Opcode::EmitThenCutStream => self.emit_vertex(inst)?,
                Opcode::Sync => self.sync(inst)?,
                Opcode::Abort | Opcode::DebugBreak => {
                    return Err(self.unsupported("no GLSL equivalent"));
                }
                _ => self.instruction(inst)?,
            }
        }
        Ok(())
    }

    fn immediate_scalar(&self, id: OperandId) -> Result<u32, TranslateError> {
        match self.program.operand(id).immediate {
            Some(Immediate::U32 { values, .. }) => Ok(values[0]),
            _ => Err(self.unsupported("case label is not an immediate")),
        }
    }

    fn emit_vertex(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        if self.program.stage != ShaderStage::Geometry {
            return Err(self.unsupported("vertex emission outside a geometry shader"));
        }
        let stream = match inst.opcode {
            Opcode::EmitStream | Opcode::CutStream | Opcode::EmitThenCutStream => inst
                .operands()
                .first()
                .and_then(|&id| self.program.operand(id).register())
                .unwrap_or(0),
            _ => 0,
        };
        if stream != 0 {
            self.require(RuleFlags::MULTI_STREAM_GS, "multiple geometry-shader streams")?;
        }
        let (emit, cut) = match inst.opcode {
            Opcode::Emit | Opcode::EmitStream => (true, false),
            Opcode::Cut | Opcode::CutStream => (false, true),
            _ => (true, true),
        };
        if emit {
            self.line("store_outputs();");
            if stream == 0 {
                self.line("EmitVertex();");
            } else {
                self.line(format!("EmitStreamVertex({stream});"));
            }
        }
        if cut {
            if stream == 0 {
                self.line("EndPrimitive();");
            } else {
                self.line(format!("EndStreamPrimitive({stream});"));
            }
        }
        Ok(())
    }

    fn sync(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let InstKind::Sync(flags) = inst.kind else {
            return Err(self.unsupported("sync without flags"));
        };
        if flags.contains(SyncFlags::UAV_GLOBAL) {
            self.require(RuleFlags::IMAGE_LOAD_STORE, "memory barriers")?;
            self.line("memoryBarrier();");
        } else if flags.contains(SyncFlags::UAV_GROUP) {
            self.require(RuleFlags::COMPUTE_SHADERS, "group memory barriers")?;
            self.line("groupMemoryBarrier();");
        }
        if flags.contains(SyncFlags::SHARED_MEMORY) {
            self.require(RuleFlags::COMPUTE_SHADERS, "shared memory barriers")?;
            self.line("memoryBarrierShared();");
        }
        if flags.contains(SyncFlags::THREADS_IN_GROUP) {
            if !matches!(self.program.stage, ShaderStage::Compute | ShaderStage::Hull) {
                return Err(self.unsupported("thread-group sync outside compute and hull shaders"));
            }
            self.line("barrier();");
        }
        Ok(())
    }

    /// Emits a subroutine body for every label.
    pub(crate) fn emit_subroutines(&mut self) -> Result<Vec<String>, TranslateError> {
        let mut bodies = Vec::new();
        let labels: Vec<_> = self.flow.labels.iter().copied().collect();
        let saved = std::mem::take(&mut self.out);
        self.scope = Scope::Subroutine;
        for label in labels {
            self.out = GlslWriter::new();
            self.line(format!("void sub_l{}() {{", label.id));
            self.out.indent();
            self.emit_range(label.body())?;
            self.out.dedent();
            self.line("}");
            bodies.push(std::mem::take(&mut self.out).finish());
        }
        self.out = saved;
        self.scope = Scope::Main;
        Ok(bodies)
    }

    /// `#version`, extensions and default precision.
    pub(crate) fn write_preamble(&self, w: &mut GlslWriter) {
        w.line(&self.rules.version().version_directive());
        for ext in &self.extensions {
            w.line(&format!("#extension {ext} : enable"));
        }
        if self.rules.has(RuleFlags::PRECISION_QUALIFIERS) {
            let guarded = self.program.stage == ShaderStage::Pixel
                && !self.rules.has(RuleFlags::IN_OUT_KEYWORDS);
            if guarded {
                w.line("#ifdef GL_FRAGMENT_PRECISION_HIGH");
                w.line("precision highp float;");
                w.line("precision highp int;");
                w.line("#else");
                w.line("precision mediump float;");
                w.line("precision mediump int;");
                w.line("#endif");
            } else {
                w.line("precision highp float;");
                w.line("precision highp int;");
            }
        }
    }

    /// Stage layouts, resources, interface and globals: everything between
    /// the preamble and the functions.
    pub(crate) fn write_declarations(&mut self, w: &mut GlslWriter) -> Result<(), TranslateError> {
        for l in stage_layout_lines(self.program, &self.rules, self.options)? {
            w.line(&l);
        }
        self.write_depth_layout(w);
        let mut reflection = std::mem::take(&mut self.reflection);
        self.res.write_declarations(w, &self.rules, &mut reflection)?;
        reflection.attributes = self.io.attributes.clone();
        reflection.frag_outputs = self.io.frag_outputs.clone();
        self.reflection = reflection;
        self.io.write_declarations(w);
        self.res.write_icb(w, &self.rules);
        for (reg, ty) in &self.temps {
            w.line(&format!("{} r{reg};", ty.vec_name(4, &self.rules)));
        }
        for (index, count) in &self.indexable {
            w.line(&format!("vec4 x{index}[{}];", (*count).max(1)));
        }
        self.io.write_shadows(w, self.program.stage);
        Ok(())
    }

    fn write_depth_layout(&self, w: &mut GlslWriter) {
        if self.program.stage != ShaderStage::Pixel || !self.rules.has(RuleFlags::CONSERVATIVE_DEPTH) {
            return;
        }
        let program = self.program;
        let uses = |ty: OperandType| {
            program
                .instructions
                .iter()
                .any(|inst| program.inst_operands(inst).any(|op| op.ty == ty))
        };
        if uses(OperandType::OutputDepthGreaterEqual) {
            w.line("layout(depth_greater) out float gl_FragDepth;");
        } else if uses(OperandType::OutputDepthLessEqual) {
            w.line("layout(depth_less) out float gl_FragDepth;");
        }
    }

    /// `void store_outputs()` for stages that flush output registers.
    pub(crate) fn write_store_function(&self, w: &mut GlslWriter) {
        w.line("void store_outputs() {");
        w.indent();
        for l in self.io.store_lines() {
            w.line(l);
        }
        w.dedent();
        w.line("}");
    }

    /// Translates a non-hull program into one complete shader.
    pub(crate) fn translate(mut self) -> Result<(String, Reflection), TranslateError> {
        let program = self.program;
        let stage = program.stage;
        let subs = self.emit_subroutines()?;

        self.out = GlslWriter::new();
        self.out.line("void main() {");
        self.out.indent();
        for l in self.io.load_lines().to_vec() {
            self.line(l);
        }
        let mut init = GlslWriter::new();
        self.res.write_icb_init(&mut init, &self.rules);
        self.out.block(&init.finish());
        self.scope = Scope::Main;
        self.emit_range(0..self.flow.main_end)?;
        if matches!(stage, ShaderStage::Vertex | ShaderStage::Pixel | ShaderStage::Domain) {
            self.line("store_outputs();");
        }
        self.out.dedent();
        self.out.line("}");
        let main = std::mem::take(&mut self.out).finish();

        let mut w = GlslWriter::new();
        let mut decls = GlslWriter::new();
        self.write_declarations(&mut decls)?;
        self.write_preamble(&mut w);
        w.blank();
        w.block(&decls.finish());
        if stage != ShaderStage::Compute {
            w.blank();
            self.write_store_function(&mut w);
        }
        if !self.flow.labels.is_empty() {
            w.blank();
            for label in self.flow.labels.iter() {
                w.line(&format!("void sub_l{}();", label.id));
            }
        }
        w.blank();
        w.block(&main);
        for sub in &subs {
            w.blank();
            w.block(sub);
        }
        Ok((w.finish(), self.reflection))
    }
}

fn malformed(inst: &Instruction, msg: String) -> TranslateError {
    DecodeError::new(inst.at_dword, DecodeErrorKind::MalformedOperand(msg)).into()
}

/// Operand positions that receive a value (as opposed to memory targets).
pub(crate) fn dst_positions(op: Opcode) -> &'static [usize] {
    use Opcode::*;
    match op {
        SinCos | Udiv | Imul | Umul | Uaddc | Usubb | Swapc => &[0, 1],
        If | Else | EndIf | Loop | EndLoop | Switch | Case | Default | EndSwitch | Break
        | Breakc | Continue | Continuec | Ret | Retc | Discard | Call | Callc | Label | Nop
        | CustomData | Emit | Cut | EmitThenCut | EmitStream | CutStream | EmitThenCutStream
        | Sync | StoreRaw | StoreStructured | StoreUavTyped | AtomicAnd | AtomicOr | AtomicXor
        | AtomicCmpStore | AtomicIadd | AtomicImax | AtomicImin | AtomicUmax | AtomicUmin
        | HsDecls | HsControlPointPhase | HsForkPhase | HsJoinPhase | Abort | DebugBreak
        | InterfaceCall => &[],
        _ => &[0],
    }
}
