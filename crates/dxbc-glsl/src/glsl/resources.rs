//! Constant buffers, textures, samplers, storage buffers, images, shared
//! memory and the immediate constant buffer.
//!
//! Everything here is collected before the body is emitted, so the names the
//! body uses and the declarations printed in the header always agree.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::types::{glsl_identifier, literal, guess_immediate_type, ValueType};
use super::writer::GlslWriter;
use super::{NamedBinding, Reflection, SamplerBinding, UniformBinding};
use crate::dialect::{DialectRules, RuleFlags};
use crate::error::TranslateError;
use crate::sm4::opcode::Opcode;
use crate::sm4_ir::{
    BaseType, CbVariable, ConstantBufferDesc, DeclKind, Declaration, OperandType, Program,
    ResourceDimension, ReturnType, SamplerMode, VariableClass,
};

/// Where the texture and sampler operands of a sampling instruction sit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SampleSlots {
    pub texture: usize,
    pub sampler: Option<usize>,
    pub shadow: bool,
}

pub(crate) fn sample_slots(op: Opcode) -> Option<SampleSlots> {
    use Opcode::*;
    let s = |texture, sampler, shadow| {
        Some(SampleSlots {
            texture,
            sampler,
            shadow,
        })
    };
    match op {
        Sample | SampleB | SampleL | SampleD | Gather4 | Lod => s(2, Some(3), false),
        SampleC | SampleCLz | Gather4C => s(2, Some(3), true),
        Gather4Po => s(3, Some(4), false),
        Gather4PoC => s(3, Some(4), true),
        Ld | LdMs | ResInfo => s(2, None, false),
        BufInfo => s(1, None, false),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct PairKey {
    pub texture: u32,
    pub sampler: Option<u32>,
    pub shadow: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TextureDecl {
    pub dim: ResourceDimension,
    pub return_type: ReturnType,
}

impl TextureDecl {
    pub fn value_type(&self, rules: &DialectRules) -> ValueType {
        if rules.has(RuleFlags::UNSIGNED_INTEGERS) {
            ValueType::from_return_type(self.return_type)
        } else {
            ValueType::Float
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BufferKind {
    Raw,
    Structured { stride: u32 },
}

#[derive(Debug, Clone)]
pub(crate) struct BufferDecl {
    pub kind: BufferKind,
    pub binding: u32,
}

#[derive(Debug, Clone)]
pub(crate) enum UavKind {
    Typed {
        dim: ResourceDimension,
        return_type: ReturnType,
    },
    Buffer(BufferKind),
}

#[derive(Debug, Clone)]
pub(crate) struct UavDecl {
    pub kind: UavKind,
    pub coherent: bool,
    pub has_counter: bool,
    pub binding: u32,
    pub counter_binding: u32,
    pub read: bool,
    pub written: bool,
    pub atomic: bool,
}

impl UavDecl {
    pub fn image_type(&self) -> ValueType {
        match self.kind {
            UavKind::Typed { return_type, .. } => ValueType::from_return_type(return_type),
            UavKind::Buffer(_) => ValueType::Uint,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TgsmDecl {
    pub kind: BufferKind,
    pub dwords: u32,
}

/// One member of a named uniform block, with the byte offset it has in the
/// source constant buffer.
#[derive(Debug, Clone)]
pub(crate) struct CbMember {
    pub name: String,
    pub offset: u32,
    pub base: BaseType,
    /// Registers per element; 1 for scalars and vectors.
    pub regs: u32,
    /// Components per register.
    pub comps: u32,
    /// Array length, 0 for non-arrays.
    pub elements: u32,
    pub matrix: bool,
}

impl CbMember {
    fn is_register_array(&self) -> bool {
        self.elements > 0 || self.regs > 1
    }

    /// Bytes covered in the source layout.
    fn extent(&self) -> u32 {
        let count = self.elements.max(1) * self.regs;
        if count > 1 {
            (count - 1) * 16 + self.comps * 4
        } else {
            self.comps * 4
        }
    }

    fn value_type(&self) -> ValueType {
        match self.base {
            BaseType::Float | BaseType::Double => ValueType::Float,
            BaseType::Int => ValueType::Int,
            BaseType::Uint | BaseType::Bool => ValueType::Uint,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum CbLayout {
    /// `vec4 cbN[size]`.
    Raw,
    Named(Vec<CbMember>),
}

#[derive(Debug, Clone)]
pub(crate) struct CbBuffer {
    pub slot: u32,
    pub size_vec4: u32,
    pub block_name: String,
    pub is_block: bool,
    pub layout: CbLayout,
}

impl CbBuffer {
    pub fn raw_name(&self) -> String {
        format!("cb{}", self.slot)
    }
}

/// A lane of a named constant buffer: the expression reading it and its type,
/// or `None` for padding.
pub(crate) type CbLane = Option<(String, ValueType)>;

#[derive(Debug, Default)]
pub(crate) struct Resources {
    pub cbuffers: BTreeMap<u32, CbBuffer>,
    pub textures: BTreeMap<u32, TextureDecl>,
    pub samplers: BTreeMap<u32, SamplerMode>,
    pub srv_buffers: BTreeMap<u32, BufferDecl>,
    pub uavs: BTreeMap<u32, UavDecl>,
    pub tgsm: BTreeMap<u32, TgsmDecl>,
    pub icb: Option<Vec<u32>>,
    pub pairs: BTreeMap<PairKey, String>,
}

impl Resources {
    pub fn collect(program: &Program, rules: &DialectRules) -> Result<Self, TranslateError> {
        let mut res = Self::default();
        for decl in &program.declarations {
            res.add_declaration(program, decl, rules)?;
        }

        let mut ssbo = 0;
        for buf in res.srv_buffers.values_mut() {
            buf.binding = ssbo;
            ssbo += 1;
        }
        let mut image = 0;
        for uav in res.uavs.values_mut() {
            match uav.kind {
                UavKind::Typed { .. } => {
                    uav.binding = image;
                    image += 1;
                }
                UavKind::Buffer(_) => {
                    uav.binding = ssbo;
                    ssbo += 1;
                }
            }
        }
        for uav in res.uavs.values_mut().filter(|u| u.has_counter) {
            uav.counter_binding = ssbo;
            ssbo += 1;
        }

        res.scan_usage(program)?;
        debug!(
            cbuffers = res.cbuffers.len(),
            textures = res.textures.len(),
            samplers = res.pairs.len(),
            uavs = res.uavs.len(),
            "collected shader resources"
        );
        Ok(res)
    }

    fn add_declaration(
        &mut self,
        program: &Program,
        decl: &Declaration,
        rules: &DialectRules,
    ) -> Result<(), TranslateError> {
        match &decl.kind {
            DeclKind::ConstantBuffer {
                slot,
                size_vec4,
                dynamic,
            } => {
                let desc = program.constant_buffers.iter().find(|d| d.bind_point == *slot);
                let cb = build_cbuffer(*slot, *size_vec4, *dynamic, desc, rules);
                self.cbuffers.insert(*slot, cb);
            }
            DeclKind::Resource {
                slot,
                dim,
                return_type,
                ..
            } => {
                self.textures.insert(
                    *slot,
                    TextureDecl {
                        dim: *dim,
                        return_type: return_type[0],
                    },
                );
            }
            DeclKind::Sampler { slot, mode } => {
                self.samplers.insert(*slot, *mode);
            }
            DeclKind::ResourceRaw { slot } => {
                self.srv_buffers.insert(
                    *slot,
                    BufferDecl {
                        kind: BufferKind::Raw,
                        binding: 0,
                    },
                );
            }
            DeclKind::ResourceStructured { slot, stride } => {
                self.srv_buffers.insert(
                    *slot,
                    BufferDecl {
                        kind: BufferKind::Structured { stride: *stride },
                        binding: 0,
                    },
                );
            }
            DeclKind::UavTyped {
                slot,
                dim,
                return_type,
                globally_coherent,
            } => {
                self.uavs.insert(
                    *slot,
                    uav(
                        UavKind::Typed {
                            dim: *dim,
                            return_type: return_type[0],
                        },
                        *globally_coherent,
                        false,
                    ),
                );
            }
            DeclKind::UavRaw {
                slot,
                globally_coherent,
            } => {
                self.uavs.insert(
                    *slot,
                    uav(UavKind::Buffer(BufferKind::Raw), *globally_coherent, false),
                );
            }
            DeclKind::UavStructured {
                slot,
                stride,
                has_counter,
                globally_coherent,
            } => {
                self.uavs.insert(
                    *slot,
                    uav(
                        UavKind::Buffer(BufferKind::Structured { stride: *stride }),
                        *globally_coherent,
                        *has_counter,
                    ),
                );
            }
            DeclKind::TgsmRaw { slot, byte_count } => {
                self.tgsm.insert(
                    *slot,
                    TgsmDecl {
                        kind: BufferKind::Raw,
                        dwords: byte_count.div_ceil(4),
                    },
                );
            }
            DeclKind::TgsmStructured {
                slot,
                stride,
                count,
            } => {
                self.tgsm.insert(
                    *slot,
                    TgsmDecl {
                        kind: BufferKind::Structured { stride: *stride },
                        dwords: (stride * count).div_ceil(4),
                    },
                );
            }
            DeclKind::ImmediateConstantBuffer(bytes) => {
                let words = bytes
                    .chunks_exact(4)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                self.icb = Some(words);
            }
            _ => {}
        }
        Ok(())
    }

    /// Records which texture/sampler pairs the program samples and how each
    /// UAV is accessed.
    fn scan_usage(&mut self, program: &Program) -> Result<(), TranslateError> {
        let mut fetch_only = BTreeSet::new();
        for (pos, inst) in program.instructions.iter().enumerate() {
            let ops = inst.operands();
            let slot_of = |i: usize, ty: OperandType| {
                ops.get(i)
                    .map(|&id| program.operand(id))
                    .filter(|op| op.ty == ty)
                    .and_then(|op| op.register())
            };

            if let Some(slots) = sample_slots(inst.opcode) {
                // Raw and structured SRVs are read through storage buffers.
                let texture = slot_of(slots.texture, OperandType::Resource)
                    .filter(|t| !self.srv_buffers.contains_key(t));
                if let Some(texture) = texture {
                    if !self.textures.contains_key(&texture) {
                        return Err(TranslateError::UnresolvedBinding {
                            inst_index: pos,
                            what: format!("t{texture} has no dcl_resource"),
                        });
                    }
                    match slots.sampler {
                        Some(s) => {
                            let Some(sampler) = slot_of(s, OperandType::Sampler)
                                .filter(|s| self.samplers.contains_key(s))
                            else {
                                return Err(TranslateError::UnresolvedBinding {
                                    inst_index: pos,
                                    what: format!("sampler operand of `{}`", inst.opcode),
                                });
                            };
                            let name = if slots.shadow {
                                format!("t{texture}_s{sampler}_cmp")
                            } else {
                                format!("t{texture}_s{sampler}")
                            };
                            let key = PairKey {
                                texture,
                                sampler: Some(sampler),
                                shadow: slots.shadow,
                            };
                            self.pairs.insert(key, name);
                        }
                        None => {
                            fetch_only.insert(texture);
                        }
                    }
                }
            }

            let uav = |i: usize| slot_of(i, OperandType::UnorderedAccessView);
            let (slot, read, written, atomic) = {
                use Opcode::*;
                match inst.opcode {
                    LdUavTyped | LdRaw => (uav(2), true, false, false),
                    LdStructured => (uav(3), true, false, false),
                    StoreUavTyped | StoreRaw | StoreStructured => (uav(0), false, true, false),
                    AtomicAnd | AtomicOr | AtomicXor | AtomicCmpStore | AtomicIadd | AtomicImax
                    | AtomicImin | AtomicUmax | AtomicUmin => (uav(0), true, true, true),
                    ImmAtomicIadd | ImmAtomicAnd | ImmAtomicOr | ImmAtomicXor | ImmAtomicExch
                    | ImmAtomicCmpExch | ImmAtomicImax | ImmAtomicImin | ImmAtomicUmax
                    | ImmAtomicUmin => (uav(1), true, true, true),
                    _ => (None, false, false, false),
                }
            };
            if let Some(u) = slot.and_then(|s| self.uavs.get_mut(&s)) {
                u.read |= read;
                u.written |= written;
                u.atomic |= atomic;
            }
        }

        for texture in fetch_only {
            if !self.pairs.keys().any(|k| k.texture == texture) {
                let key = PairKey {
                    texture,
                    sampler: None,
                    shadow: false,
                };
                self.pairs.insert(key, format!("t{texture}"));
            }
        }
        Ok(())
    }

    /// Sampler used by `ld`, `resinfo` and `bufinfo`, which name only the
    /// texture: the first non-comparison pair of that texture.
    pub fn fetch_sampler(&self, texture: u32) -> Option<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k.texture == texture)
            .min_by_key(|(k, _)| k.shadow)
            .map(|(_, name)| name.as_str())
    }

    pub fn pair(&self, texture: u32, sampler: u32, shadow: bool) -> Option<&str> {
        self.pairs
            .get(&PairKey {
                texture,
                sampler: Some(sampler),
                shadow,
            })
            .map(String::as_str)
    }

    pub fn write_declarations(
        &self,
        w: &mut GlslWriter,
        rules: &DialectRules,
        reflection: &mut Reflection,
    ) -> Result<(), TranslateError> {
        let binding = |n: u32| {
            if rules.has(RuleFlags::EXPLICIT_BINDING) {
                format!(", binding = {n}")
            } else {
                String::new()
            }
        };
        let precision = if rules.has(RuleFlags::PRECISION_QUALIFIERS) {
            "highp "
        } else {
            ""
        };
        // ES 1.00 fragment shaders may lack highp; samplers keep their lowp default.
        let sampler_precision = if rules.has(RuleFlags::IN_OUT_KEYWORDS) {
            precision
        } else {
            ""
        };

        for cb in self.cbuffers.values() {
            write_cbuffer(w, cb, rules, &binding(cb.slot), reflection);
        }

        for (unit, (key, name)) in self.pairs.iter().enumerate() {
            let unit = unit as u32;
            let tex = &self.textures[&key.texture];
            let ty = sampler_type(tex, key.shadow, rules)?;
            let layout = if rules.has(RuleFlags::EXPLICIT_BINDING) {
                format!("layout(binding = {unit}) ")
            } else {
                String::new()
            };
            w.line(&format!("{layout}uniform {sampler_precision}{ty} {name};"));
            reflection.samplers.push(SamplerBinding {
                name: name.clone(),
                texture_slot: key.texture,
                sampler_slot: key.sampler,
                unit,
            });
        }

        for (slot, buf) in &self.srv_buffers {
            rules.require(RuleFlags::STORAGE_BUFFERS, "storage buffers", None)?;
            let name = format!("t{slot}_buffer");
            w.line(&format!(
                "layout(std430{}) readonly buffer {name} {{ uint t{slot}_data[]; }};",
                binding(buf.binding)
            ));
            reflection.storage_buffers.push(NamedBinding {
                name,
                binding: buf.binding,
            });
        }

        for (slot, uav) in &self.uavs {
            let coherent = if uav.coherent { "coherent " } else { "" };
            match &uav.kind {
                UavKind::Typed { dim, .. } => {
                    rules.require(RuleFlags::IMAGE_LOAD_STORE, "image load/store", None)?;
                    let ty = uav.image_type();
                    let read_write = uav.atomic || (uav.read && uav.written);
                    let format = match (ty, read_write) {
                        (ValueType::Float, false) => "rgba32f",
                        (ValueType::Int, false) => "rgba32i",
                        (ValueType::Uint, false) => "rgba32ui",
                        (ValueType::Float, true) => "r32f",
                        (ValueType::Int, true) => "r32i",
                        (ValueType::Uint, true) => "r32ui",
                    };
                    let access = match (uav.read, uav.written || uav.atomic) {
                        (true, false) => "readonly ",
                        (false, true) if !uav.atomic => "writeonly ",
                        _ => "",
                    };
                    let prefix = match ty {
                        ValueType::Float => "",
                        ValueType::Int => "i",
                        ValueType::Uint => "u",
                    };
                    let kind = image_kind(*dim).ok_or_else(|| TranslateError::UnresolvedBinding {
                        inst_index: 0,
                        what: format!("u{slot} has no image dimension"),
                    })?;
                    w.line(&format!(
                        "layout({format}{}) uniform {coherent}{access}{precision}{prefix}image{kind} u{slot};",
                        binding(uav.binding)
                    ));
                    reflection.images.push(NamedBinding {
                        name: format!("u{slot}"),
                        binding: uav.binding,
                    });
                }
                UavKind::Buffer(_) => {
                    rules.require(RuleFlags::STORAGE_BUFFERS, "storage buffers", None)?;
                    let name = format!("u{slot}_buffer");
                    w.line(&format!(
                        "layout(std430{}) {coherent}buffer {name} {{ uint u{slot}_data[]; }};",
                        binding(uav.binding)
                    ));
                    reflection.storage_buffers.push(NamedBinding {
                        name,
                        binding: uav.binding,
                    });
                }
            }
            if uav.has_counter {
                let name = format!("u{slot}_counter_buffer");
                w.line(&format!(
                    "layout(std430{}) buffer {name} {{ uint u{slot}_counter; }};",
                    binding(uav.counter_binding)
                ));
                reflection.storage_buffers.push(NamedBinding {
                    name,
                    binding: uav.counter_binding,
                });
            }
        }

        for (slot, g) in &self.tgsm {
            w.line(&format!("shared uint g{slot}[{}];", g.dwords.max(1)));
        }
        Ok(())
    }

    /// Whether `icb` is declared as a `const uvec4` array.
    pub fn icb_is_uint(rules: &DialectRules) -> bool {
        rules.has(RuleFlags::ARRAY_CONSTRUCTORS | RuleFlags::UNSIGNED_INTEGERS)
    }

    /// Declares `icb`. Dialects without array constructors get a plain
    /// global array, filled by [`Resources::write_icb_init`].
    pub fn write_icb(&self, w: &mut GlslWriter, rules: &DialectRules) {
        let Some(words) = &self.icb else {
            return;
        };
        let n = words.len().div_ceil(4).max(1);
        if Self::icb_is_uint(rules) {
            let items: Vec<String> = words
                .chunks(4)
                .map(|c| {
                    let lanes: Vec<String> =
                        (0..4).map(|i| format!("{:#x}u", c.get(i).copied().unwrap_or(0))).collect();
                    format!("uvec4({})", lanes.join(", "))
                })
                .collect();
            w.line(&format!("const uvec4 icb[{n}] = uvec4[{n}]("));
            w.indent();
            for (i, item) in items.iter().enumerate() {
                let sep = if i + 1 == items.len() { "" } else { "," };
                w.line(&format!("{item}{sep}"));
            }
            w.dedent();
            w.line(");");
        } else if rules.has(RuleFlags::ARRAY_CONSTRUCTORS) {
            let items: Vec<String> = words.chunks(4).map(|c| icb_float_row(c, rules)).collect();
            w.line(&format!("const vec4 icb[{n}] = vec4[{n}]("));
            w.indent();
            for (i, item) in items.iter().enumerate() {
                let sep = if i + 1 == items.len() { "" } else { "," };
                w.line(&format!("{item}{sep}"));
            }
            w.dedent();
            w.line(");");
        } else {
            w.line(&format!("vec4 icb[{n}];"));
        }
    }

    pub fn write_icb_init(&self, w: &mut GlslWriter, rules: &DialectRules) {
        if rules.has(RuleFlags::ARRAY_CONSTRUCTORS) {
            return;
        }
        if let Some(words) = &self.icb {
            for (i, c) in words.chunks(4).enumerate() {
                w.line(&format!("icb[{i}] = {};", icb_float_row(c, rules)));
            }
        }
    }
}

/// Expression reading register `reg`, component `comp` of a named constant
/// buffer. `None` when no member covers the register at all.
pub(crate) fn named_lane(
    members: &[CbMember],
    reg: u32,
    comp: u8,
    rules: &DialectRules,
) -> Option<CbLane> {
    let byte = reg * 16 + u32::from(comp) * 4;
    let Some(m) = members
        .iter()
        .find(|m| m.offset <= byte && byte < m.offset + m.extent())
    else {
        // Lanes of a register some member occupies read as padding.
        let used = members
            .iter()
            .any(|m| m.offset / 16 <= reg && reg <= (m.offset + m.extent() - 1) / 16);
        return used.then_some(None);
    };
    let rel = byte - m.offset;
    let (reg_in, lane) = if m.is_register_array() {
        (rel / 16, (rel % 16) / 4)
    } else {
        (0, rel / 4)
    };
    if lane >= m.comps {
        return Some(None);
    }
    let mut expr = m.name.clone();
    if m.matrix {
        if m.elements > 0 {
            expr.push_str(&format!("[{}]", reg_in / m.regs));
        }
        expr.push_str(&format!("[{}]", reg_in % m.regs));
    } else if m.is_register_array() {
        expr.push_str(&format!("[{reg_in}]"));
    }
    if m.comps > 1 {
        expr.push_str(&super::types::single_component_selector(lane as u8));
    }
    if m.base == BaseType::Bool {
        expr = format!("{}({expr})", ValueType::Uint.scalar_name(rules));
    }
    Some(Some((expr, m.value_type())))
}

fn uav(kind: UavKind, coherent: bool, has_counter: bool) -> UavDecl {
    UavDecl {
        kind,
        coherent,
        has_counter,
        binding: 0,
        counter_binding: 0,
        read: false,
        written: false,
        atomic: false,
    }
}

/// One `vec4` row of a float-typed `icb`; integer-looking lanes keep their
/// numeric value.
fn icb_float_row(chunk: &[u32], rules: &DialectRules) -> String {
    let lanes: Vec<String> = (0..4)
        .map(|i| {
            let bits = chunk.get(i).copied().unwrap_or(0);
            match guess_immediate_type(&[bits]) {
                ValueType::Float => literal(bits, ValueType::Float, rules),
                _ => literal((bits as i32 as f32).to_bits(), ValueType::Float, rules),
            }
        })
        .collect();
    format!("vec4({})", lanes.join(", "))
}

fn image_kind(dim: ResourceDimension) -> Option<&'static str> {
    use ResourceDimension::*;
    Some(match dim {
        Buffer => "Buffer",
        Texture1D => "1D",
        Texture1DArray => "1DArray",
        Texture2D => "2D",
        Texture2DArray => "2DArray",
        Texture3D => "3D",
        _ => return None,
    })
}

/// Number of integer coordinates `imageLoad`/`imageStore` take.
pub(crate) fn image_coord_count(dim: ResourceDimension) -> usize {
    use ResourceDimension::*;
    match dim {
        Buffer | Texture1D => 1,
        Texture1DArray | Texture2D => 2,
        _ => 3,
    }
}

/// GLSL sampler type for a texture declaration.
pub(crate) fn sampler_type(
    tex: &TextureDecl,
    shadow: bool,
    rules: &DialectRules,
) -> Result<String, TranslateError> {
    use ResourceDimension::*;
    let (base, need, feature): (&str, RuleFlags, &'static str) = match tex.dim {
        Texture1D => ("1D", RuleFlags::TEXTURE_1D, "1D textures"),
        Texture2D => ("2D", RuleFlags::empty(), ""),
        Texture2DMs => ("2DMS", RuleFlags::MULTISAMPLE_TEXTURES, "multisample textures"),
        Texture3D => ("3D", RuleFlags::TEXTURE_3D, "3D textures"),
        TextureCube => ("Cube", RuleFlags::empty(), ""),
        Texture1DArray => (
            "1DArray",
            RuleFlags::TEXTURE_1D | RuleFlags::TEXTURE_ARRAYS,
            "1D texture arrays",
        ),
        Texture2DArray => ("2DArray", RuleFlags::TEXTURE_ARRAYS, "texture arrays"),
        Texture2DMsArray => (
            "2DMSArray",
            RuleFlags::MULTISAMPLE_TEXTURES | RuleFlags::TEXTURE_ARRAYS,
            "multisample texture arrays",
        ),
        TextureCubeArray => ("CubeArray", RuleFlags::TEXTURE_CUBE_ARRAYS, "cube map arrays"),
        Buffer => ("Buffer", RuleFlags::TEXTURE_BUFFERS, "buffer textures"),
        Unknown | RawBuffer | StructuredBuffer => {
            return Err(TranslateError::UnresolvedBinding {
                inst_index: 0,
                what: format!("texture of dimension {:?}", tex.dim),
            })
        }
    };
    rules.require(need, feature, None)?;
    if shadow {
        rules.require(RuleFlags::SHADOW_SAMPLERS, "shadow samplers", None)?;
        if matches!(tex.dim, Texture2DMs | Texture2DMsArray | Texture3D | Buffer) {
            return Err(TranslateError::UnsupportedDialectFeature {
                feature: "comparison sampling of this texture dimension",
                version: rules.version(),
                inst_index: None,
            });
        }
        return Ok(format!("sampler{base}Shadow"));
    }
    let prefix = match tex.value_type(rules) {
        ValueType::Float => "",
        ValueType::Int => "i",
        ValueType::Uint => "u",
    };
    Ok(format!("{prefix}sampler{base}"))
}

fn build_cbuffer(
    slot: u32,
    size_vec4: u32,
    dynamic: bool,
    desc: Option<&ConstantBufferDesc>,
    rules: &DialectRules,
) -> CbBuffer {
    let is_globals = desc.is_some_and(|d| d.name == "$Globals");
    let is_block = rules.has(RuleFlags::UNIFORM_BLOCKS)
        && (!is_globals || rules.has(RuleFlags::GLOBALS_IN_UNIFORM_BLOCK));
    let block_name = desc.map_or_else(|| format!("cb{slot}_block"), |d| glsl_identifier(&d.name));
    let layout = match desc {
        Some(desc) if !dynamic => match named_members(desc, rules) {
            Some(members) if !is_block || fits_std140(&members) => CbLayout::Named(members),
            _ => CbLayout::Raw,
        },
        _ => CbLayout::Raw,
    };
    CbBuffer {
        slot,
        size_vec4,
        block_name,
        is_block,
        layout,
    }
}

fn named_members(desc: &ConstantBufferDesc, rules: &DialectRules) -> Option<Vec<CbMember>> {
    let mut members = Vec::with_capacity(desc.variables.len());
    for var in &desc.variables {
        members.push(member(var, rules)?);
    }
    members.sort_by_key(|m| m.offset);
    Some(members)
}

fn member(var: &CbVariable, rules: &DialectRules) -> Option<CbMember> {
    let ty = &var.ty;
    if matches!(ty.base, BaseType::Double) || var.offset % 4 != 0 {
        return None;
    }
    let (regs, comps, matrix) = match ty.class {
        VariableClass::Scalar => (1, 1, false),
        VariableClass::Vector => (1, ty.columns, false),
        // One register per column.
        VariableClass::MatrixColumns => (ty.columns, ty.rows, true),
        // One register per row.
        VariableClass::MatrixRows => (ty.rows, ty.columns, true),
        VariableClass::Other => return None,
    };
    if !(1..=4).contains(&comps) || !(1..=4).contains(&regs) {
        return None;
    }
    let matrix = matrix
        && regs > 1
        && comps > 1
        && ty.base == BaseType::Float
        && (regs == comps || rules.has(RuleFlags::NON_SQUARE_MATRICES));
    Some(CbMember {
        name: glsl_identifier(&var.name),
        offset: var.offset,
        base: ty.base,
        regs,
        comps,
        elements: ty.elements,
        matrix,
    })
}

fn std140_align(m: &CbMember) -> u32 {
    if m.is_register_array() {
        16
    } else {
        match m.comps {
            1 => 4,
            2 => 8,
            _ => 16,
        }
    }
}

fn std140_size(m: &CbMember) -> u32 {
    if m.is_register_array() {
        m.elements.max(1) * m.regs * 16
    } else {
        m.comps * 4
    }
}

/// True when every member lands on its source offset under std140 rules
/// (with padding members filling the gaps).
fn fits_std140(members: &[CbMember]) -> bool {
    let mut cursor = 0;
    for m in members {
        if m.offset % std140_align(m) != 0 || m.offset < cursor {
            return false;
        }
        cursor = m.offset + std140_size(m);
    }
    true
}

fn member_type(m: &CbMember, rules: &DialectRules) -> String {
    if m.matrix {
        if m.regs == m.comps {
            format!("mat{}", m.regs)
        } else {
            format!("mat{}x{}", m.regs, m.comps)
        }
    } else {
        let n = m.comps as usize;
        match m.base {
            BaseType::Bool if n == 1 => "bool".to_owned(),
            BaseType::Bool => format!("bvec{n}"),
            BaseType::Int => ValueType::Int.vec_name(n, rules),
            BaseType::Uint => ValueType::Uint.vec_name(n, rules),
            BaseType::Float | BaseType::Double => ValueType::Float.vec_name(n, rules),
        }
    }
}

/// `type name[dims]` for one member.
fn member_declaration(m: &CbMember, rules: &DialectRules) -> String {
    let mut decl = format!("{} {}", member_type(m, rules), m.name);
    if m.matrix {
        if m.elements > 0 {
            decl.push_str(&format!("[{}]", m.elements));
        }
    } else if m.is_register_array() {
        // Non-matrix registers flatten into one array.
        decl.push_str(&format!("[{}]", m.elements.max(1) * m.regs));
    }
    decl
}

fn write_cbuffer(
    w: &mut GlslWriter,
    cb: &CbBuffer,
    rules: &DialectRules,
    binding: &str,
    reflection: &mut Reflection,
) {
    let raw = format!("vec4 {}[{}]", cb.raw_name(), cb.size_vec4.max(1));
    match (&cb.layout, cb.is_block) {
        (CbLayout::Raw, true) => {
            w.line(&format!("layout(std140{binding}) uniform {} {{", cb.block_name));
            w.indent();
            w.line(&format!("{raw};"));
            w.dedent();
            w.line("};");
            reflection.uniform_blocks.push(NamedBinding {
                name: cb.block_name.clone(),
                binding: cb.slot,
            });
        }
        (CbLayout::Raw, false) => {
            w.line(&format!("uniform {raw};"));
            reflection.uniforms.push(UniformBinding {
                name: cb.raw_name(),
                cbuffer_slot: cb.slot,
                offset: 0,
            });
        }
        (CbLayout::Named(members), true) => {
            w.line(&format!("layout(std140{binding}) uniform {} {{", cb.block_name));
            w.indent();
            let mut cursor = 0;
            for m in members {
                if rules.has(RuleFlags::MEMBER_OFFSETS) {
                    w.line(&format!(
                        "layout(offset = {}) {};",
                        m.offset,
                        member_declaration(m, rules)
                    ));
                } else {
                    while cursor < m.offset {
                        w.line(&format!("float _pad{}_{};", cb.slot, cursor / 4));
                        cursor += 4;
                    }
                    w.line(&format!("{};", member_declaration(m, rules)));
                }
                cursor = m.offset + std140_size(m);
            }
            w.dedent();
            w.line("};");
            reflection.uniform_blocks.push(NamedBinding {
                name: cb.block_name.clone(),
                binding: cb.slot,
            });
        }
        (CbLayout::Named(members), false) => {
            for m in members {
                w.line(&format!("uniform {};", member_declaration(m, rules)));
                reflection.uniforms.push(UniformBinding {
                    name: m.name.clone(),
                    cbuffer_slot: cb.slot,
                    offset: m.offset,
                });
            }
        }
    }
}
