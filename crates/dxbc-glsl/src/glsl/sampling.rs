//! Texture sampling, texel fetches, resource queries, raw/structured memory,
//! typed UAVs and atomics.

use super::emitter::Emitter;
use super::operands::Dst;
use super::resources::{image_coord_count, sample_slots, BufferKind, TextureDecl, UavKind};
use super::types::{component_selector, literal, ValueType};
use crate::dialect::RuleFlags;
use crate::error::TranslateError;
use crate::sm4::opcode::Opcode;
use crate::sm4::ShaderStage;
use crate::sm4_ir::{
    InstKind, Instruction, Operand, OperandId, OperandType, ResInfoReturnType, ResourceDimension,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    Plain,
    Lod,
    Grad,
}

/// A memory operand of a load, store or atomic.
enum Memory {
    /// `uint` array: storage buffer data or shared memory.
    Words { array: String, kind: BufferKind },
    Image {
        name: String,
        dim: ResourceDimension,
        ty: ValueType,
    },
}

fn lanes(n: usize) -> Vec<u8> {
    (0..n as u8).collect()
}

/// Components of `textureSize` for a dimension.
fn size_count(dim: ResourceDimension) -> usize {
    match dim {
        ResourceDimension::TextureCube => 2,
        ResourceDimension::TextureCubeArray => 3,
        d => d.coord_count(),
    }
}

impl Emitter<'_> {
    fn texture_operand(&self, id: OperandId) -> Result<(u32, TextureDecl), TranslateError> {
        let op = self.program.operand(id);
        let slot = op
            .register()
            .ok_or_else(|| self.unresolved("dynamically indexed texture"))?;
        let tex = self
            .res
            .textures
            .get(&slot)
            .copied()
            .ok_or_else(|| self.unresolved(format!("t{slot} has no dcl_resource")))?;
        Ok((slot, tex))
    }

    /// Selector mapping destination components through the resource swizzle.
    fn resource_selector(&self, id: OperandId, comps: &[u8]) -> String {
        let op = self.program.operand(id);
        let mapped: Vec<u8> = comps.iter().map(|&c| op.component(usize::from(c))).collect();
        if mapped[..] == [0, 1, 2, 3] {
            String::new()
        } else {
            component_selector(&mapped)
        }
    }

    /// Name of the texture function for the current dialect.
    fn lookup_function(&mut self, dim: ResourceDimension, shadow: bool, lookup: Lookup, offset: bool) -> Result<String, TranslateError> {
        if self.rules.has(RuleFlags::TEXTURE_OVERLOADS) {
            let base = match lookup {
                Lookup::Plain => "texture",
                Lookup::Lod => "textureLod",
                Lookup::Grad => "textureGrad",
            };
            return Ok(if offset { format!("{base}Offset") } else { base.to_owned() });
        }
        if offset {
            self.require(RuleFlags::TEXTURE_OVERLOADS, "texel offsets")?;
        }
        let stem = match (dim, shadow) {
            (ResourceDimension::Texture1D, false) => "texture1D",
            (ResourceDimension::Texture2D, false) => "texture2D",
            (ResourceDimension::Texture3D, false) => "texture3D",
            (ResourceDimension::TextureCube, false) => "textureCube",
            (ResourceDimension::Texture1D, true) => "shadow1D",
            (ResourceDimension::Texture2D, true) => "shadow2D",
            _ => {
                self.require(RuleFlags::TEXTURE_OVERLOADS, "sampling this texture dimension")?;
                "texture"
            }
        };
        let es = self.rules.has(RuleFlags::ES_PROFILE);
        Ok(match lookup {
            Lookup::Plain => stem.to_owned(),
            Lookup::Lod if self.program.stage != ShaderStage::Pixel => format!("{stem}Lod"),
            Lookup::Lod | Lookup::Grad => {
                let feature = if lookup == Lookup::Lod {
                    "explicit-LOD sampling in a fragment shader"
                } else {
                    "gradient sampling"
                };
                self.require(RuleFlags::TEXTURE_LOD_EXT, feature)?;
                let (ext, suffix) = match (es, lookup) {
                    (true, Lookup::Lod) => ("GL_EXT_shader_texture_lod", "LodEXT"),
                    (true, _) => ("GL_EXT_shader_texture_lod", "GradEXT"),
                    (false, Lookup::Lod) => ("GL_ARB_shader_texture_lod", "Lod"),
                    (false, _) => ("GL_ARB_shader_texture_lod", "GradARB"),
                };
                self.extensions.insert(ext);
                format!("{stem}{suffix}")
            }
        })
    }

    /// Immediate `_aoffimmi` offsets, when any are non-zero.
    fn immediate_offset(&self, inst: &Instruction, dim: ResourceDimension) -> Option<String> {
        let InstKind::Sample(controls) = inst.kind else {
            return None;
        };
        let offsets = controls.offsets.filter(|o| o.iter().any(|&v| v != 0))?;
        let n = dim.offset_count();
        let parts: Vec<String> = offsets[..n].iter().map(|&v| v.to_string()).collect();
        Some(if n == 1 {
            parts.join("")
        } else {
            format!("{}({})", self.vec(ValueType::Int, n), parts.join(", "))
        })
    }

    /// `texture(s, vec3(uv, ref))`-style coordinate for comparison sampling.
    /// Cube arrays take the reference as a separate argument.
    fn compare_coord(&self, dim: ResourceDimension, coord: &str, reference: &str) -> Result<(String, Option<String>), TranslateError> {
        use ResourceDimension::*;
        Ok(match dim {
            Texture1D => (format!("vec3({coord}, 0.0, {reference})"), None),
            Texture2D | Texture1DArray => (format!("vec3({coord}, {reference})"), None),
            Texture2DArray | TextureCube => (format!("vec4({coord}, {reference})"), None),
            TextureCubeArray => (coord.to_owned(), Some(reference.to_owned())),
            _ => return Err(self.unsupported("comparison sampling of this dimension")),
        })
    }

    pub(crate) fn sample(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        use Opcode::*;
        let ops = inst.operands();
        let slots = sample_slots(inst.opcode).ok_or_else(|| self.unsupported("not a sampling opcode"))?;
        let (tex_slot, tex) = self.texture_operand(ops[slots.texture])?;
        let sampler_id = slots
            .sampler
            .and_then(|i| ops.get(i).copied())
            .ok_or_else(|| self.unresolved("missing sampler operand"))?;
        let sampler = self.program.operand(sampler_id);
        let gather_comp = sampler.component(0);
        let sampler_slot = sampler
            .register()
            .ok_or_else(|| self.unresolved("dynamically indexed sampler"))?;
        let name = self
            .res
            .pair(tex_slot, sampler_slot, slots.shadow)
            .ok_or_else(|| self.unresolved(format!("t{tex_slot} with s{sampler_slot}")))?
            .to_owned();
        let Some(dst) = self.dst(ops[0])? else {
            return Ok(());
        };
        let dim = tex.dim;
        let coord = self.src(ops[1], ValueType::Float, &lanes(dim.coord_count()))?;
        let offset = match inst.opcode {
            Gather4Po | Gather4PoC => Some(self.src(ops[2], ValueType::Int, &lanes(dim.offset_count()))?),
            _ => self.immediate_offset(inst, dim),
        };
        let off = offset.as_ref().map(|o| format!(", {o}")).unwrap_or_default();
        let legacy_shadow = slots.shadow && !self.rules.has(RuleFlags::TEXTURE_OVERLOADS);

        let (call, ty, splat) = match inst.opcode {
            Sample => {
                let f = self.lookup_function(dim, false, Lookup::Plain, offset.is_some())?;
                (format!("{f}({name}, {coord}{off})"), tex.value_type(&self.rules), false)
            }
            SampleB => {
                let bias = self.src(ops[4], ValueType::Float, &[0])?;
                let f = self.lookup_function(dim, false, Lookup::Plain, offset.is_some())?;
                (format!("{f}({name}, {coord}{off}, {bias})"), tex.value_type(&self.rules), false)
            }
            SampleL => {
                let lod = self.src(ops[4], ValueType::Float, &[0])?;
                let f = self.lookup_function(dim, false, Lookup::Lod, offset.is_some())?;
                (format!("{f}({name}, {coord}, {lod}{off})"), tex.value_type(&self.rules), false)
            }
            SampleD => {
                let n = dim.offset_count();
                let ddx = self.src(ops[4], ValueType::Float, &lanes(n))?;
                let ddy = self.src(ops[5], ValueType::Float, &lanes(n))?;
                let f = self.lookup_function(dim, false, Lookup::Grad, offset.is_some())?;
                (format!("{f}({name}, {coord}, {ddx}, {ddy}{off})"), tex.value_type(&self.rules), false)
            }
            SampleC => {
                let (c, extra) = self.compare_coord(dim, &coord, &self.src(ops[4], ValueType::Float, &[0])?)?;
                let extra = extra.map(|r| format!(", {r}")).unwrap_or_default();
                let f = self.lookup_function(dim, true, Lookup::Plain, offset.is_some())?;
                let suffix = if legacy_shadow { ".x" } else { "" };
                (format!("{f}({name}, {c}{extra}{off}){suffix}"), ValueType::Float, true)
            }
            SampleCLz => {
                let (c, _) = match dim {
                    ResourceDimension::TextureCubeArray => {
                        return Err(self.unsupported("level-zero comparison of a cube map array"))
                    }
                    _ => self.compare_coord(dim, &coord, &self.src(ops[4], ValueType::Float, &[0])?)?,
                };
                let call = match dim {
                    ResourceDimension::Texture2DArray | ResourceDimension::TextureCube => {
                        let zero = format!("{}(0.0)", self.vec(ValueType::Float, dim.offset_count()));
                        let f = self.lookup_function(dim, true, Lookup::Grad, offset.is_some())?;
                        format!("{f}({name}, {c}, {zero}, {zero}{off})")
                    }
                    _ => {
                        let f = self.lookup_function(dim, true, Lookup::Lod, offset.is_some())?;
                        let suffix = if legacy_shadow { ".x" } else { "" };
                        format!("{f}({name}, {c}, 0.0{off}){suffix}")
                    }
                };
                (call, ValueType::Float, true)
            }
            Gather4 | Gather4Po => {
                self.require(RuleFlags::TEXTURE_GATHER, "textureGather")?;
                let f = if offset.is_some() { "textureGatherOffset" } else { "textureGather" };
                let comp = match gather_comp {
                    0 => String::new(),
                    c => format!(", {c}"),
                };
                (format!("{f}({name}, {coord}{off}{comp})"), tex.value_type(&self.rules), false)
            }
            Gather4C | Gather4PoC => {
                self.require(RuleFlags::TEXTURE_GATHER, "textureGather")?;
                let at = if inst.opcode == Gather4C { 4 } else { 5 };
                let reference = self.src(ops[at], ValueType::Float, &[0])?;
                let f = if offset.is_some() { "textureGatherOffset" } else { "textureGather" };
                (format!("{f}({name}, {coord}, {reference}{off})"), ValueType::Float, false)
            }
            _ => return Err(self.unsupported("not a sampling opcode")),
        };

        let value = if splat {
            match dst.comps.len() {
                1 => call,
                n => format!("{}({call})", self.vec(ValueType::Float, n)),
            }
        } else {
            format!("{call}{}", self.resource_selector(ops[slots.texture], &dst.comps))
        };
        self.store(&dst, &value, ty);
        Ok(())
    }

    /// Texture a sampler-less instruction reads from.
    fn fetch_name(&self, slot: u32) -> Result<String, TranslateError> {
        self.res
            .fetch_sampler(slot)
            .map(str::to_owned)
            .ok_or_else(|| self.unresolved(format!("t{slot} is never declared as a sampler")))
    }

    /// `ld` and `ld_ms`.
    pub(crate) fn load_texel(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        self.require(RuleFlags::TEXEL_FETCH, "texelFetch")?;
        let ops = inst.operands();
        let (slot, tex) = self.texture_operand(ops[2])?;
        let name = self.fetch_name(slot)?;
        let Some(dst) = self.dst(ops[0])? else {
            return Ok(());
        };
        let dim = tex.dim;
        let coord = self.src(ops[1], ValueType::Int, &lanes(dim.coord_count()))?;
        let offset = self.immediate_offset(inst, dim);
        let call = match dim {
            ResourceDimension::Buffer => format!("texelFetch({name}, {coord})"),
            d if d.is_multisampled() => {
                let sample = self.src(ops[3], ValueType::Int, &[0])?;
                format!("texelFetch({name}, {coord}, {sample})")
            }
            _ => {
                let lod = self.src(ops[1], ValueType::Int, &[3])?;
                match offset {
                    Some(o) => format!("texelFetchOffset({name}, {coord}, {lod}, {o})"),
                    None => format!("texelFetch({name}, {coord}, {lod})"),
                }
            }
        };
        let value = format!("{call}{}", self.resource_selector(ops[2], &dst.comps));
        self.store(&dst, &value, tex.value_type(&self.rules));
        Ok(())
    }

    pub(crate) fn query_lod(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        if self.program.stage != ShaderStage::Pixel {
            return Err(self.unsupported("LOD query outside a pixel shader"));
        }
        self.require(RuleFlags::TEXTURE_QUERY_LOD, "textureQueryLod")?;
        let ops = inst.operands();
        let (tex_slot, tex) = self.texture_operand(ops[2])?;
        let sampler_slot = self
            .program
            .operand(ops[3])
            .register()
            .ok_or_else(|| self.unresolved("dynamically indexed sampler"))?;
        let name = self
            .res
            .pair(tex_slot, sampler_slot, false)
            .ok_or_else(|| self.unresolved(format!("t{tex_slot} with s{sampler_slot}")))?
            .to_owned();
        let Some(dst) = self.dst(ops[0])? else {
            return Ok(());
        };
        let coord = self.src(ops[1], ValueType::Float, &lanes(tex.dim.offset_count()))?;
        let value = format!(
            "vec4(textureQueryLod({name}, {coord}), 0.0, 0.0){}",
            self.resource_selector(ops[2], &dst.comps)
        );
        self.store(&dst, &value, ValueType::Float);
        Ok(())
    }

    pub(crate) fn resinfo(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        self.require(RuleFlags::TEXTURE_SIZE, "textureSize")?;
        let ops = inst.operands();
        let (slot, tex) = self.texture_operand(ops[2])?;
        let name = self.fetch_name(slot)?;
        let Some(dst) = self.dst(ops[0])? else {
            return Ok(());
        };
        let dim = tex.dim;
        let mip = self.src(ops[1], ValueType::Int, &[0])?;
        let size = match dim {
            ResourceDimension::Buffer => format!("textureSize({name})"),
            d if d.is_multisampled() => format!("textureSize({name})"),
            _ => format!("textureSize({name}, {mip})"),
        };
        let mapped: Vec<u8> = dst
            .comps
            .iter()
            .map(|&c| self.program.operand(ops[2]).component(usize::from(c)))
            .collect();
        let levels = if !mapped.contains(&3) {
            "0".to_owned()
        } else if dim == ResourceDimension::Buffer || dim.is_multisampled() {
            "1".to_owned()
        } else {
            self.require(RuleFlags::TEXTURE_QUERY_LEVELS, "textureQueryLevels")?;
            format!("textureQueryLevels({name})")
        };
        let pad = 3 - size_count(dim);
        let zeros = vec!["0"; pad].join(", ");
        let ivec4 = self.vec(ValueType::Int, 4);
        let size4 = if pad == 0 {
            format!("{ivec4}({size}, {levels})")
        } else {
            format!("{ivec4}({size}, {zeros}, {levels})")
        };
        let return_type = match inst.kind {
            InstKind::ResInfo { return_type, .. } => return_type,
            _ => ResInfoReturnType::Float,
        };
        let (vector, ty) = match return_type {
            ResInfoReturnType::Uint => (format!("{}({size4})", self.vec(ValueType::Uint, 4)), ValueType::Uint),
            ResInfoReturnType::Float => (format!("vec4({size4})"), ValueType::Float),
            ResInfoReturnType::RcpFloat => (
                format!("vec4(1.0 / vec3({size4}.xyz), float({size4}.w))"),
                ValueType::Float,
            ),
        };
        let selector = self.resource_selector(ops[2], &dst.comps);
        self.store(&dst, &format!("{vector}{selector}"), ty);
        Ok(())
    }

    /// Element count of a buffer: bytes for raw buffers, structures for
    /// structured ones, texels for typed ones.
    pub(crate) fn bufinfo(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let ops = inst.operands();
        let Some(dst) = self.dst(ops[0])? else {
            return Ok(());
        };
        let op = self.program.operand(ops[1]);
        let uint = ValueType::Uint.scalar_name(&self.rules);
        let count = match (op.ty, self.memory(ops[1])) {
            (_, Ok(Memory::Words { array, kind })) => {
                let words = format!("{uint}({array}.length())");
                match kind {
                    BufferKind::Raw => format!("({words} * {})", literal(4, ValueType::Uint, &self.rules)),
                    BufferKind::Structured { stride } => {
                        format!("({words} / {})", literal((stride / 4).max(1), ValueType::Uint, &self.rules))
                    }
                }
            }
            (_, Ok(Memory::Image { name, .. })) => format!("{uint}(imageSize({name}))"),
            (OperandType::Resource, Err(_)) => {
                let (slot, tex) = self.texture_operand(ops[1])?;
                if tex.dim != ResourceDimension::Buffer {
                    return Err(self.unsupported("bufinfo on a texture"));
                }
                self.require(RuleFlags::TEXTURE_SIZE, "textureSize")?;
                format!("{uint}(textureSize({}))", self.fetch_name(slot)?)
            }
            (_, Err(e)) => return Err(e),
        };
        let value = match dst.comps.len() {
            1 => count,
            n => format!("{}({count})", self.vec(ValueType::Uint, n)),
        };
        self.store(&dst, &value, ValueType::Uint);
        Ok(())
    }

    /// Resolves `t#`, `u#` or `g#` as a memory operand.
    fn memory(&self, id: OperandId) -> Result<Memory, TranslateError> {
        let op = self.program.operand(id);
        let slot = op
            .register()
            .ok_or_else(|| self.unresolved("dynamically indexed memory operand"))?;
        match op.ty {
            OperandType::Resource => self
                .res
                .srv_buffers
                .get(&slot)
                .map(|b| Memory::Words {
                    array: format!("t{slot}_data"),
                    kind: b.kind,
                })
                .ok_or_else(|| self.unresolved(format!("t{slot} is not a raw or structured buffer"))),
            OperandType::UnorderedAccessView => {
                let uav = self
                    .res
                    .uavs
                    .get(&slot)
                    .ok_or_else(|| self.unresolved(format!("u{slot} has no declaration")))?;
                Ok(match uav.kind {
                    UavKind::Buffer(kind) => Memory::Words {
                        array: format!("u{slot}_data"),
                        kind,
                    },
                    UavKind::Typed { dim, .. } => Memory::Image {
                        name: format!("u{slot}"),
                        dim,
                        ty: uav.image_type(),
                    },
                })
            }
            OperandType::ThreadGroupSharedMemory => {
                self.require(RuleFlags::COMPUTE_SHADERS, "shared memory")?;
                self.res
                    .tgsm
                    .get(&slot)
                    .map(|g| Memory::Words {
                        array: format!("g{slot}"),
                        kind: g.kind,
                    })
                    .ok_or_else(|| self.unresolved(format!("g{slot} has no declaration")))
            }
            _ => Err(self.unsupported("operand is not a memory resource")),
        }
    }

    fn u(&self, v: u32) -> String {
        literal(v, ValueType::Uint, &self.rules)
    }

    /// First word of a raw access at byte address `byte`.
    fn raw_word(&self, byte: &str) -> String {
        format!("({byte} >> {})", self.u(2))
    }

    /// First word of `offset` bytes into structure `index`.
    fn structured_word(&self, stride: u32, index: &str, offset: &str) -> String {
        format!("({index} * {} + ({offset} >> {}))", self.u(stride / 4), self.u(2))
    }

    fn word(&self, array: &str, base: &str, k: u8) -> String {
        if k == 0 {
            format!("{array}[{base}]")
        } else {
            format!("{array}[{base} + {}]", self.u(u32::from(k)))
        }
    }

    /// Word address of a load or store; `first` is the address operand.
    fn word_address(&self, kind: BufferKind, ops: &[OperandId], first: usize) -> Result<String, TranslateError> {
        Ok(match kind {
            BufferKind::Raw => self.raw_word(&self.src(ops[first], ValueType::Uint, &[0])?),
            BufferKind::Structured { stride } => self.structured_word(
                stride,
                &self.src(ops[first], ValueType::Uint, &[0])?,
                &self.src(ops[first + 1], ValueType::Uint, &[0])?,
            ),
        })
    }

    /// `ld_raw` and `ld_structured`.
    pub(crate) fn load_buffer(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let ops = inst.operands();
        let res_index = if inst.opcode == Opcode::LdRaw { 2 } else { 3 };
        let Memory::Words { array, kind } = self.memory(ops[res_index])? else {
            return Err(self.unsupported("typed UAV read through ld_raw/ld_structured"));
        };
        let Some(dst) = self.dst(ops[0])? else {
            return Ok(());
        };
        let base = self.word_address(kind, ops, 1)?;
        let resource = self.program.operand(ops[res_index]);
        let words: Vec<String> = dst
            .comps
            .iter()
            .map(|&c| self.word(&array, &base, resource.component(usize::from(c))))
            .collect();
        let value = self.construct(ValueType::Uint, words);
        self.store(&dst, &value, ValueType::Uint);
        Ok(())
    }

    /// `store_raw` and `store_structured`.
    pub(crate) fn store_buffer(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let ops = inst.operands();
        let Memory::Words { array, kind } = self.memory(ops[0])? else {
            return Err(self.unsupported("typed UAV written through store_raw/store_structured"));
        };
        let written: Vec<u8> = self.program.operand(ops[0]).selection.mask().components().collect();
        let base = self.word_address(kind, ops, 1)?;
        let value_index = if inst.opcode == Opcode::StoreRaw { 2 } else { 3 };
        for c in written {
            let v = self.src(ops[value_index], ValueType::Uint, &[c])?;
            let slot = self.word(&array, &base, c);
            self.line(format!("{slot} = {v};"));
        }
        Ok(())
    }

    fn image_coord(&self, id: OperandId, dim: ResourceDimension) -> Result<String, TranslateError> {
        self.src(id, ValueType::Int, &lanes(image_coord_count(dim)))
    }

    pub(crate) fn load_image(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let ops = inst.operands();
        let Memory::Image { name, dim, ty } = self.memory(ops[2])? else {
            return Err(self.unsupported("ld_uav_typed on an untyped UAV"));
        };
        let Some(dst) = self.dst(ops[0])? else {
            return Ok(());
        };
        let coord = self.image_coord(ops[1], dim)?;
        let value = format!(
            "imageLoad({name}, {coord}){}",
            self.resource_selector(ops[2], &dst.comps)
        );
        self.store(&dst, &value, ty);
        Ok(())
    }

    pub(crate) fn store_image(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let ops = inst.operands();
        let Memory::Image { name, dim, ty } = self.memory(ops[0])? else {
            return Err(self.unsupported("store_uav_typed on an untyped UAV"));
        };
        let coord = self.image_coord(ops[1], dim)?;
        let value = self.src(ops[2], ty, &lanes(4))?;
        self.line(format!("imageStore({name}, {coord}, {value});"));
        Ok(())
    }

    /// `atomic_*` and `imm_atomic_*`.
    pub(crate) fn atomic(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        use Opcode::*;
        let ops = inst.operands();
        if matches!(inst.opcode, ImmAtomicAlloc | ImmAtomicConsume) {
            return self.counter(inst);
        }
        let returns = inst.opcode.name().starts_with("imm_");
        let (target, first) = if returns { (ops[1], 2) } else { (ops[0], 1) };
        let (func, signed) = match inst.opcode {
            AtomicAnd | ImmAtomicAnd => ("And", false),
            AtomicOr | ImmAtomicOr => ("Or", false),
            AtomicXor | ImmAtomicXor => ("Xor", false),
            AtomicIadd | ImmAtomicIadd => ("Add", false),
            AtomicUmax | ImmAtomicUmax => ("Max", false),
            AtomicUmin | ImmAtomicUmin => ("Min", false),
            AtomicImax | ImmAtomicImax => ("Max", true),
            AtomicImin | ImmAtomicImin => ("Min", true),
            ImmAtomicExch => ("Exchange", false),
            _ => ("CompSwap", false),
        };
        let compare = matches!(inst.opcode, AtomicCmpStore | ImmAtomicCmpExch);
        let (call, ty) = match self.memory(target)? {
            Memory::Words { array, kind } => {
                if signed {
                    return Err(self.unsupported("signed atomic min/max on untyped memory"));
                }
                let addr = match kind {
                    BufferKind::Raw => self.raw_word(&self.src(ops[first], ValueType::Uint, &[0])?),
                    BufferKind::Structured { stride } => self.structured_word(
                        stride,
                        &self.src(ops[first], ValueType::Uint, &[0])?,
                        &self.src(ops[first], ValueType::Uint, &[1])?,
                    ),
                };
                let args = self.atomic_args(ops, first + 1, compare, ValueType::Uint)?;
                (format!("atomic{func}({array}[{addr}], {args})"), ValueType::Uint)
            }
            Memory::Image { name, dim, ty } => {
                self.require(RuleFlags::IMAGE_LOAD_STORE, "image atomics")?;
                let coord = self.image_coord(ops[first], dim)?;
                let args = self.atomic_args(ops, first + 1, compare, ty)?;
                (format!("imageAtomic{func}({name}, {coord}, {args})"), ty)
            }
        };
        if returns {
            match self.dst(ops[0])? {
                Some(dst) => {
                    let dst = Dst {
                        comps: dst.comps[..1].to_vec(),
                        ..dst
                    };
                    self.store(&dst, &call, ty);
                }
                None => self.line(format!("{call};")),
            }
        } else {
            self.line(format!("{call};"));
        }
        Ok(())
    }

    fn atomic_args(&self, ops: &[OperandId], at: usize, compare: bool, ty: ValueType) -> Result<String, TranslateError> {
        let value = self.src(ops[at], ty, &[0])?;
        if compare {
            Ok(format!("{value}, {}", self.src(ops[at + 1], ty, &[0])?))
        } else {
            Ok(value)
        }
    }

    /// `imm_atomic_alloc` / `imm_atomic_consume` on a UAV's hidden counter.
    fn counter(&mut self, inst: &Instruction) -> Result<(), TranslateError> {
        let ops = inst.operands();
        let op: &Operand = self.program.operand(ops[1]);
        let slot = op
            .register()
            .filter(|s| self.res.uavs.get(s).is_some_and(|u| u.has_counter))
            .ok_or_else(|| self.unresolved("UAV without a hidden counter"))?;
        let call = if inst.opcode == Opcode::ImmAtomicAlloc {
            format!("atomicAdd(u{slot}_counter, {})", self.u(1))
        } else {
            format!("(atomicAdd(u{slot}_counter, {}) - {})", self.u(u32::MAX), self.u(1))
        };
        match self.dst(ops[0])? {
            Some(dst) => {
                let dst = Dst {
                    comps: dst.comps[..1].to_vec(),
                    ..dst
                };
                self.store(&dst, &call, ValueType::Uint);
            }
            None => self.line(format!("{call};")),
        }
        Ok(())
    }
}
