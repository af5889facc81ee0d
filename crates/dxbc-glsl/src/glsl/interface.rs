//! Stage inputs and outputs.
//!
//! Instructions address inputs and outputs as registers. Those live in float
//! `vec4` shadow arrays: `main` fills the input shadows from the GLSL
//! interface before the body runs, and `store_outputs()` copies the output
//! shadows back out. Varyings carry no locations; consecutive stages match
//! them by name, built from the semantic and a per-stage prefix.

use std::collections::BTreeMap;

use tracing::warn;

use super::types::{cast, component_selector, glsl_identifier, ValueType};
use super::writer::GlslWriter;
use super::{LocationBinding, TranslateOptions};
use crate::dialect::{DialectRules, RuleFlags};
use crate::error::TranslateError;
use crate::hull::HullPhases;
use crate::sm4::ShaderStage;
use crate::sm4_ir::{
    ComponentType, DeclKind, InputPrimitive, InterpolationMode, OperandIndex, OperandType,
    PrimitiveTopology, Program, SignatureEntry, SystemValue, TessDomain, TessOutputPrimitive,
    TessPartitioning, WriteMask,
};

/// `dcl_globalFlags` bit for `[earlydepthstencil]`, as stored in
/// [`crate::sm4_ir::StageInfo::global_flags`].
const GLOBAL_FLAG_EARLY_DEPTH_STENCIL: u32 = 1 << 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IoClass {
    Input,
    Output,
    Patch,
}

/// Shadow register files and the copy code around them.
#[derive(Debug, Default)]
pub(crate) struct IoLayout {
    pub input_regs: u32,
    pub output_regs: u32,
    pub patch_regs: u32,
    /// Vertices per input primitive (GS) or input control points (HS, DS).
    pub input_vertices: u32,
    /// Output control points of a hull shader.
    pub output_vertices: u32,
    declarations: Vec<String>,
    load: Vec<String>,
    store: Vec<String>,
    /// Hull shader: fills `vocp` from the control-point outputs.
    cp_output_load: Vec<String>,
    /// Hull shader: copies `opc` to the patch constants and tess levels.
    patch_store: Vec<String>,
    pub attributes: Vec<LocationBinding>,
    pub frag_outputs: Vec<LocationBinding>,
    /// Pixel-shader user inputs, for `interpolateAt*`.
    pub varyings: Vec<Varying>,
}

/// A pixel-shader input variable and the register lanes it feeds.
#[derive(Debug, Clone)]
pub(crate) struct Varying {
    pub register: u32,
    pub mask: WriteMask,
    pub name: String,
    pub ty: ValueType,
}

impl IoLayout {
    pub fn build(
        program: &Program,
        rules: &DialectRules,
        options: &TranslateOptions,
        phases: Option<&HullPhases>,
    ) -> Result<Self, TranslateError> {
        let inputs = signature(program, phases, IoClass::Input);
        let outputs = signature(program, phases, IoClass::Output);
        let patch = signature(program, phases, IoClass::Patch);

        let mut io = IoLayout {
            input_regs: extent(program, &inputs, &[OperandType::Input, OperandType::InputControlPoint]),
            output_regs: extent(program, &outputs, &[OperandType::Output, OperandType::OutputControlPoint]),
            patch_regs: match program.stage {
                ShaderStage::Hull => extent(program, &patch, &[OperandType::Output, OperandType::InputPatchConstant]),
                ShaderStage::Domain => extent(program, &patch, &[OperandType::InputPatchConstant]),
                _ => 0,
            },
            ..Self::default()
        };
        let info = &program.stage_info;
        match program.stage {
            ShaderStage::Geometry => {
                io.input_vertices = info.gs_input_primitive.map_or(1, InputPrimitive::vertex_count)
            }
            ShaderStage::Hull | ShaderStage::Domain => {
                io.input_vertices = info.input_control_points.unwrap_or(1).max(1);
                io.output_vertices = info.output_control_points.unwrap_or(1).max(1);
            }
            _ => {}
        }

        let mut b = Builder {
            io,
            rules,
            stage: program.stage,
            options,
            clip_in: 0,
            clip_out: 0,
        };
        for e in &inputs {
            b.input(e)?;
        }
        for e in &outputs {
            b.output(e)?;
        }
        for e in &patch {
            b.patch(e)?;
        }
        Ok(b.io)
    }

    pub fn write_declarations(&self, w: &mut GlslWriter) {
        for d in &self.declarations {
            w.line(d);
        }
    }

    /// Declares the shadow register arrays of `stage`.
    pub fn write_shadows(&self, w: &mut GlslWriter, stage: ShaderStage) {
        let mut array = |name: &str, n: u32| {
            if n > 0 {
                w.line(&format!("vec4 {name}[{n}];"));
            }
        };
        match stage {
            ShaderStage::Vertex | ShaderStage::Pixel => {
                array("v", self.input_regs);
                array("o", self.output_regs);
            }
            ShaderStage::Geometry => {
                array("v", self.input_vertices * self.input_regs);
                array("o", self.output_regs);
            }
            ShaderStage::Hull => {
                array("vicp", self.input_vertices * self.input_regs);
                array("vocp", self.output_vertices * self.output_regs);
                array("o", self.output_regs);
                array("opc", self.patch_regs);
            }
            ShaderStage::Domain => {
                array("vicp", self.input_vertices * self.input_regs);
                array("vpc", self.patch_regs);
                array("o", self.output_regs);
            }
            ShaderStage::Compute => {}
        }
    }

    pub fn load_lines(&self) -> &[String] {
        &self.load
    }

    /// Body of `store_outputs()`; for hull shaders, the control-point store.
    pub fn store_lines(&self) -> &[String] {
        &self.store
    }

    pub fn cp_output_load_lines(&self) -> &[String] {
        &self.cp_output_load
    }

    pub fn patch_store_lines(&self) -> &[String] {
        &self.patch_store
    }

    /// The pixel-shader input covering `register.comp`.
    pub fn varying(&self, register: u32, comp: u8) -> Option<&Varying> {
        self.varyings
            .iter()
            .find(|v| v.register == register && v.mask.contains(comp))
    }
}

struct Builder<'a> {
    io: IoLayout,
    rules: &'a DialectRules,
    stage: ShaderStage,
    options: &'a TranslateOptions,
    clip_in: u32,
    clip_out: u32,
}

impl Builder<'_> {
    fn require(&self, flag: RuleFlags, feature: &'static str) -> Result<(), TranslateError> {
        self.rules.require(flag, feature, None)
    }

    fn in_keyword(&self) -> &'static str {
        match (self.rules.has(RuleFlags::IN_OUT_KEYWORDS), self.stage) {
            (true, _) => "in",
            (false, ShaderStage::Vertex) => "attribute",
            (false, _) => "varying",
        }
    }

    fn out_keyword(&self) -> &'static str {
        if self.rules.has(RuleFlags::IN_OUT_KEYWORDS) {
            "out"
        } else {
            "varying"
        }
    }

    /// Type of a user varying. Dialects without `in`/`out` only have float
    /// varyings.
    fn varying_type(&self, e: &SignatureEntry) -> ValueType {
        if self.rules.has(RuleFlags::IN_OUT_KEYWORDS) {
            ValueType::from_component_type(e.component_type).lower(self.rules)
        } else {
            ValueType::Float
        }
    }

    /// Whether user varyings written by this stage have no consumer.
    fn skip_varyings(&self) -> bool {
        let last_pre_raster = match self.stage {
            ShaderStage::Vertex | ShaderStage::Domain => !self.options.has_gs,
            ShaderStage::Geometry => true,
            _ => false,
        };
        last_pre_raster && !self.options.has_ps
    }

    fn vec4(&self, ty: ValueType) -> String {
        ty.vec_name(4, self.rules)
    }

    fn input(&mut self, e: &SignatureEntry) -> Result<(), TranslateError> {
        if skipped_system_value(e) {
            return Ok(());
        }
        let r = e.register;
        let mask = e.mask;
        match self.stage {
            ShaderStage::Vertex => match e.system_value {
                SystemValue::VertexId | SystemValue::InstanceId => {
                    self.require(RuleFlags::SYSTEM_VALUE_IDS, "gl_VertexID and gl_InstanceID")?;
                    let expr = if e.system_value == SystemValue::VertexId {
                        "gl_VertexID"
                    } else {
                        "gl_InstanceID"
                    };
                    let line = self.scalar_load(&format!("v[{r}]"), mask, expr, ValueType::Int);
                    self.io.load.push(line);
                }
                _ => {
                    let name = format!("a_{}", semantic(e));
                    let ty = self.varying_type(e);
                    let location = if self.rules.has(RuleFlags::EXPLICIT_INPUT_LOCATION) {
                        format!("layout(location = {r}) ")
                    } else {
                        String::new()
                    };
                    self.io.declarations.push(format!(
                        "{location}{} {} {name};",
                        self.in_keyword(),
                        self.vec4(ty)
                    ));
                    self.io.attributes.push(LocationBinding {
                        name: name.clone(),
                        location: r,
                    });
                    let line = self.vector_load(&format!("v[{r}]"), mask, &name, ty);
                    self.io.load.push(line);
                }
            },
            ShaderStage::Pixel => {
                let dst = format!("v[{r}]");
                match e.system_value {
                    SystemValue::Position => {
                        let line = self.vector_load(
                            &dst,
                            mask,
                            "vec4(gl_FragCoord.xyz, 1.0 / gl_FragCoord.w)",
                            ValueType::Float,
                        );
                        self.io.load.push(line);
                    }
                    SystemValue::IsFrontFace => {
                        let line = self.scalar_load(&dst, mask, "(gl_FrontFacing ? -1 : 0)", ValueType::Int);
                        self.io.load.push(line);
                    }
                    SystemValue::SampleIndex => {
                        self.require(RuleFlags::SAMPLE_INTERPOLATION, "gl_SampleID")?;
                        let line = self.scalar_load(&dst, mask, "gl_SampleID", ValueType::Int);
                        self.io.load.push(line);
                    }
                    SystemValue::PrimitiveId => {
                        self.require(RuleFlags::GEOMETRY_SHADERS, "gl_PrimitiveID in a fragment shader")?;
                        let line = self.scalar_load(&dst, mask, "gl_PrimitiveID", ValueType::Int);
                        self.io.load.push(line);
                    }
                    SystemValue::RenderTargetArrayIndex | SystemValue::ViewportArrayIndex => {
                        self.require(RuleFlags::GEOMETRY_SHADERS, "gl_Layer in a fragment shader")?;
                        let expr = if e.system_value == SystemValue::RenderTargetArrayIndex {
                            "gl_Layer"
                        } else {
                            "gl_ViewportIndex"
                        };
                        let line = self.scalar_load(&dst, mask, expr, ValueType::Int);
                        self.io.load.push(line);
                    }
                    SystemValue::ClipDistance => {
                        self.require(RuleFlags::CLIP_DISTANCE, "gl_ClipDistance")?;
                        for c in mask.components() {
                            let k = self.clip_in;
                            self.clip_in += 1;
                            self.io.load.push(format!("{dst}.{} = gl_ClipDistance[{k}];", lane(c)));
                        }
                    }
                    SystemValue::CullDistance => {
                        return Err(self.unsupported("cull distances"));
                    }
                    _ => {
                        let prefix = if self.options.has_gs { "g_" } else { "v_" };
                        let name = format!("{prefix}{}", semantic(e));
                        let ty = self.varying_type(e);
                        let qualifier = self.interpolation(e, ty)?;
                        self.io.declarations.push(format!(
                            "{qualifier}{} {} {name};",
                            self.in_keyword(),
                            self.vec4(ty)
                        ));
                        let line = self.vector_load(&dst, mask, &name, ty);
                        self.io.load.push(line);
                        self.io.varyings.push(Varying {
                            register: r,
                            mask,
                            name,
                            ty,
                        });
                    }
                }
            }
            ShaderStage::Geometry | ShaderStage::Hull | ShaderStage::Domain => {
                let (shadow, prefix) = match self.stage {
                    ShaderStage::Geometry => ("v", "v_"),
                    ShaderStage::Hull => ("vicp", "v_"),
                    _ => ("vicp", "tc_"),
                };
                let stride = self.io.input_regs;
                let count = self.io.input_vertices;
                let dst = format!("{shadow}[i * {stride} + {r}]");
                let line = match e.system_value {
                    SystemValue::Position => {
                        self.vector_load(&dst, mask, "gl_in[i].gl_Position", ValueType::Float)
                    }
                    SystemValue::ClipDistance if self.stage == ShaderStage::Geometry => {
                        self.require(RuleFlags::CLIP_DISTANCE, "gl_ClipDistance")?;
                        let mut parts = Vec::new();
                        for c in mask.components() {
                            let k = self.clip_in;
                            self.clip_in += 1;
                            parts.push(format!("{dst}.{} = gl_in[i].gl_ClipDistance[{k}];", lane(c)));
                        }
                        parts.join(" ")
                    }
                    SystemValue::CullDistance => return Err(self.unsupported("cull distances")),
                    _ => {
                        let name = format!("{prefix}{}", semantic(e));
                        let ty = self.varying_type(e);
                        let flat = if self.stage == ShaderStage::Geometry && ty != ValueType::Float {
                            "flat "
                        } else {
                            ""
                        };
                        self.io
                            .declarations
                            .push(format!("{flat}in {} {name}[];", self.vec4(ty)));
                        self.vector_load(&dst, mask, &format!("{name}[i]"), ty)
                    }
                };
                self.io.load.extend(vertex_loop(count, line));
            }
            ShaderStage::Compute => {}
        }
        Ok(())
    }

    fn output(&mut self, e: &SignatureEntry) -> Result<(), TranslateError> {
        if skipped_system_value(e) {
            return Ok(());
        }
        let r = e.register;
        let mask = e.mask;
        let src = format!("o[{r}]");
        match self.stage {
            ShaderStage::Pixel => {
                let n = e.semantic_index;
                let ty = ValueType::from_component_type(e.component_type).lower(self.rules);
                if self.rules.has(RuleFlags::FRAG_DATA_OUTPUTS) {
                    let name = format!("out_Target{n}");
                    let location = if self.rules.has(RuleFlags::EXPLICIT_OUTPUT_LOCATION) {
                        format!("layout(location = {n}) ")
                    } else {
                        String::new()
                    };
                    self.io
                        .declarations
                        .push(format!("{location}out {} {name};", self.vec4(ty)));
                    self.io.frag_outputs.push(LocationBinding {
                        name: name.clone(),
                        location: n,
                    });
                    let line = self.vector_store(&name, mask, &src, ty);
                    self.io.store.push(line);
                } else {
                    let line = self.vector_store(&format!("gl_FragData[{n}]"), mask, &src, ValueType::Float);
                    self.io.store.push(line);
                }
            }
            ShaderStage::Hull => match e.system_value {
                SystemValue::Position => {
                    let line = self.vector_store("gl_out[gl_InvocationID].gl_Position", mask, &src, ValueType::Float);
                    self.io.store.push(line);
                    let load = self.vector_load(
                        &format!("vocp[i * {} + {r}]", self.io.output_regs),
                        mask,
                        "gl_out[i].gl_Position",
                        ValueType::Float,
                    );
                    self.io.cp_output_load.extend(vertex_loop(self.io.output_vertices, load));
                }
                SystemValue::ClipDistance | SystemValue::CullDistance => {
                    return Err(self.unsupported("clip and cull distances in a hull shader"));
                }
                _ => {
                    let name = format!("tc_{}", semantic(e));
                    let ty = self.varying_type(e);
                    self.io
                        .declarations
                        .push(format!("out {} {name}[];", self.vec4(ty)));
                    let line = self.vector_store(&format!("{name}[gl_InvocationID]"), mask, &src, ty);
                    self.io.store.push(line);
                    let load = self.vector_load(
                        &format!("vocp[i * {} + {r}]", self.io.output_regs),
                        mask,
                        &format!("{name}[i]"),
                        ty,
                    );
                    self.io.cp_output_load.extend(vertex_loop(self.io.output_vertices, load));
                }
            },
            ShaderStage::Vertex | ShaderStage::Domain | ShaderStage::Geometry => {
                let gs = self.stage == ShaderStage::Geometry;
                match e.system_value {
                    SystemValue::Position => {
                        let line = self.vector_store("gl_Position", mask, &src, ValueType::Float);
                        self.io.store.push(line);
                    }
                    SystemValue::ClipDistance => {
                        self.require(RuleFlags::CLIP_DISTANCE, "gl_ClipDistance")?;
                        for c in mask.components() {
                            let k = self.clip_out;
                            self.clip_out += 1;
                            self.io
                                .store
                                .push(format!("gl_ClipDistance[{k}] = {src}.{};", lane(c)));
                        }
                    }
                    SystemValue::CullDistance => return Err(self.unsupported("cull distances")),
                    SystemValue::RenderTargetArrayIndex | SystemValue::ViewportArrayIndex | SystemValue::PrimitiveId
                        if gs =>
                    {
                        let target = match e.system_value {
                            SystemValue::RenderTargetArrayIndex => "gl_Layer",
                            SystemValue::ViewportArrayIndex => "gl_ViewportIndex",
                            _ => "gl_PrimitiveID",
                        };
                        let line = self.scalar_store(target, mask, &src, ValueType::Int);
                        self.io.store.push(line);
                    }
                    SystemValue::RenderTargetArrayIndex | SystemValue::ViewportArrayIndex => {
                        return Err(self.unsupported("layer or viewport output outside a geometry shader"));
                    }
                    _ if self.skip_varyings() => {}
                    _ => {
                        let prefix = if gs { "g_" } else { "v_" };
                        let name = format!("{prefix}{}", semantic(e));
                        let ty = self.varying_type(e);
                        let flat = if ty != ValueType::Float { "flat " } else { "" };
                        let stream = if gs && e.stream != 0 {
                            self.require(RuleFlags::MULTI_STREAM_GS, "multiple geometry-shader streams")?;
                            format!("layout(stream = {}) ", e.stream)
                        } else {
                            String::new()
                        };
                        self.io.declarations.push(format!(
                            "{stream}{flat}{} {} {name};",
                            self.out_keyword(),
                            self.vec4(ty)
                        ));
                        let line = self.vector_store(&name, mask, &src, ty);
                        self.io.store.push(line);
                    }
                }
            }
            ShaderStage::Compute => {}
        }
        Ok(())
    }

    /// Patch constants: hull-shader outputs or domain-shader inputs.
    fn patch(&mut self, e: &SignatureEntry) -> Result<(), TranslateError> {
        let r = e.register;
        let hull = self.stage == ShaderStage::Hull;
        let shadow = if hull { "opc" } else { "vpc" };
        let sv = e.system_value;
        if sv.is_edge_tess_factor() || sv.is_inside_tess_factor() {
            for (i, c) in e.mask.components().enumerate() {
                let level = tess_level(sv, e.semantic_index + i as u32);
                if hull {
                    self.io
                        .patch_store
                        .push(format!("{level} = {shadow}[{r}].{};", lane(c)));
                } else {
                    self.io
                        .load
                        .push(format!("{shadow}[{r}].{} = {level};", lane(c)));
                }
            }
            return Ok(());
        }
        if skipped_system_value(e) {
            return Ok(());
        }
        let name = format!("pc_{}", semantic(e));
        let ty = self.varying_type(e);
        let keyword = if hull { "out" } else { "in" };
        self.io
            .declarations
            .push(format!("patch {keyword} {} {name};", self.vec4(ty)));
        if hull {
            let line = self.vector_store(&name, e.mask, &format!("opc[{r}]"), ty);
            self.io.patch_store.push(line);
        } else {
            let line = self.vector_load(&format!("vpc[{r}]"), e.mask, &name, ty);
            self.io.load.push(line);
        }
        Ok(())
    }

    fn interpolation(&self, e: &SignatureEntry, ty: ValueType) -> Result<&'static str, TranslateError> {
        if ty != ValueType::Float {
            return Ok("flat ");
        }
        let in_out = self.rules.has(RuleFlags::IN_OUT_KEYWORDS);
        Ok(match e.interpolation {
            Some(InterpolationMode::Constant) => {
                self.require(RuleFlags::IN_OUT_KEYWORDS, "flat interpolation")?;
                "flat "
            }
            Some(InterpolationMode::LinearCentroid) if in_out => "centroid ",
            Some(InterpolationMode::LinearNoPerspective) => {
                self.require(RuleFlags::NOPERSPECTIVE, "noperspective interpolation")?;
                "noperspective "
            }
            Some(InterpolationMode::LinearNoPerspectiveCentroid) => {
                self.require(RuleFlags::NOPERSPECTIVE, "noperspective interpolation")?;
                "noperspective centroid "
            }
            Some(InterpolationMode::LinearSample) => {
                self.require(RuleFlags::SAMPLE_INTERPOLATION, "per-sample interpolation")?;
                "sample "
            }
            Some(InterpolationMode::LinearNoPerspectiveSample) => {
                self.require(
                    RuleFlags::SAMPLE_INTERPOLATION | RuleFlags::NOPERSPECTIVE,
                    "per-sample interpolation",
                )?;
                "noperspective sample "
            }
            _ => "",
        })
    }

    fn unsupported(&self, feature: &'static str) -> TranslateError {
        TranslateError::UnsupportedDialectFeature {
            feature,
            version: self.rules.version(),
            inst_index: None,
        }
    }

    /// `dst.mask = src.mask`, reinterpreting `ty` lanes as float.
    fn vector_load(&self, dst: &str, mask: WriteMask, src: &str, ty: ValueType) -> String {
        let sel = mask_selector(mask);
        let value = cast(&format!("{src}{sel}"), ty, ValueType::Float, mask.count(), self.rules);
        format!("{dst}{sel} = {value};")
    }

    fn vector_store(&self, dst: &str, mask: WriteMask, src: &str, ty: ValueType) -> String {
        let sel = mask_selector(mask);
        let value = cast(&format!("{src}{sel}"), ValueType::Float, ty, mask.count(), self.rules);
        format!("{dst}{sel} = {value};")
    }

    /// Loads a scalar built-in into the first lane of `mask`.
    fn scalar_load(&self, dst: &str, mask: WriteMask, expr: &str, ty: ValueType) -> String {
        let c = mask.components().next().unwrap_or(0);
        let value = cast(expr, ty, ValueType::Float, 1, self.rules);
        format!("{dst}.{} = {value};", lane(c))
    }

    fn scalar_store(&self, dst: &str, mask: WriteMask, src: &str, ty: ValueType) -> String {
        let c = mask.components().next().unwrap_or(0);
        let value = cast(&format!("{src}.{}", lane(c)), ValueType::Float, ty, 1, self.rules);
        format!("{dst} = {value};")
    }
}

fn lane(c: u8) -> char {
    super::types::COMPONENTS[usize::from(c & 3)]
}

fn mask_selector(mask: WriteMask) -> String {
    if mask == WriteMask::XYZW || mask.is_empty() {
        String::new()
    } else {
        component_selector(&mask.components().collect::<Vec<_>>())
    }
}

fn vertex_loop(count: u32, body: String) -> [String; 3] {
    [
        format!("for (int i = 0; i < {count}; i++) {{"),
        format!("    {body}"),
        "}".to_owned(),
    ]
}

/// `SEMANTIC` + index as an identifier fragment. Semantics are
/// case-insensitive, so they are upper-cased for cross-stage matching.
fn semantic(e: &SignatureEntry) -> String {
    format!(
        "{}{}",
        glsl_identifier(&e.semantic_name.to_ascii_uppercase()),
        e.semantic_index
    )
}

/// Values instructions reach through dedicated operand types rather than
/// `v#`/`o#`.
fn skipped_system_value(e: &SignatureEntry) -> bool {
    e.register == u32::MAX
        || matches!(
            e.system_value,
            SystemValue::Depth
                | SystemValue::DepthGreaterEqual
                | SystemValue::DepthLessEqual
                | SystemValue::Coverage
                | SystemValue::StencilRef
                | SystemValue::InnerCoverage
        )
}

fn tess_level(sv: SystemValue, index: u32) -> String {
    match sv {
        SystemValue::FinalLineDetailTessFactor => "gl_TessLevelOuter[1]".to_owned(),
        SystemValue::FinalLineDensityTessFactor => "gl_TessLevelOuter[0]".to_owned(),
        sv if sv.is_inside_tess_factor() => format!("gl_TessLevelInner[{index}]"),
        _ => format!("gl_TessLevelOuter[{index}]"),
    }
}

/// The container's signature for `class`, or one rebuilt from the
/// declarations when the container carried none.
fn signature(program: &Program, phases: Option<&HullPhases>, class: IoClass) -> Vec<SignatureEntry> {
    let given = match class {
        IoClass::Input => &program.input_signature,
        IoClass::Output => &program.output_signature,
        IoClass::Patch => &program.patch_constant_signature,
    };
    if !given.is_empty() {
        let declared = declared_entries(program, phases, class);
        for e in unreferenced(given, &declared) {
            warn!(
                semantic = %e.semantic_name,
                index = e.semantic_index,
                register = e.register,
                "signature entry without a matching declaration"
            );
        }
        return given.clone();
    }
    if class == IoClass::Patch && !matches!(program.stage, ShaderStage::Hull | ShaderStage::Domain) {
        return Vec::new();
    }
    declared_entries(program, phases, class)
}

/// Entries of `given` whose register no declaration touches. Registerless
/// system values are never reported.
fn unreferenced<'a>(given: &'a [SignatureEntry], declared: &[SignatureEntry]) -> Vec<&'a SignatureEntry> {
    given
        .iter()
        .filter(|e| e.register != u32::MAX && !declared.iter().any(|d| d.register == e.register))
        .collect()
}

fn declared_entries(program: &Program, phases: Option<&HullPhases>, class: IoClass) -> Vec<SignatureEntry> {
    let patch_decls: Vec<usize> = phases
        .map(|p| {
            p.forks
                .iter()
                .chain(p.joins.iter())
                .flat_map(|phase| phase.declarations.iter().copied())
                .collect()
        })
        .unwrap_or_default();

    let mut merged: BTreeMap<(u32, Option<SystemValue>), SignatureEntry> = BTreeMap::new();
    for (i, decl) in program.declarations.iter().enumerate() {
        let (operand, sv, sv_index, interpolation, decl_class) = match decl.kind {
            DeclKind::Input {
                operand,
                system_value,
                sv_index,
                interpolation,
            } => {
                let c = match program.operand(operand).ty {
                    OperandType::Input | OperandType::InputControlPoint => IoClass::Input,
                    OperandType::InputPatchConstant if program.stage == ShaderStage::Domain => {
                        IoClass::Patch
                    }
                    _ => continue,
                };
                (operand, system_value, sv_index, interpolation, c)
            }
            DeclKind::Output {
                operand,
                system_value,
                sv_index,
            } => {
                if program.operand(operand).ty != OperandType::Output {
                    continue;
                }
                let c = if patch_decls.contains(&i) {
                    IoClass::Patch
                } else {
                    IoClass::Output
                };
                (operand, system_value, sv_index, None, c)
            }
            _ => continue,
        };
        if decl_class != class {
            continue;
        }
        let op = program.operand(operand);
        let Some(reg) = op.indices.as_slice().last().and_then(OperandIndex::as_imm32) else {
            warn!(at_dword = decl.at_dword, "io declaration with a dynamic register index");
            continue;
        };
        let sv = sv.filter(|&sv| sv != SystemValue::Undefined);
        let mask = op.write_mask();
        let entry = merged.entry((reg, sv)).or_insert_with(|| match sv {
            Some(sv) => SignatureEntry::new(sv_semantic(sv), sv_index, reg, 0)
                .with_system_value(sv)
                .with_component_type(sv_component_type(sv)),
            None if program.stage == ShaderStage::Pixel && class == IoClass::Output => {
                SignatureEntry::new("SV_Target", reg, reg, 0).with_system_value(SystemValue::Target)
            }
            None => SignatureEntry::new("TEXCOORD", reg, reg, 0),
        });
        entry.mask.0 |= mask.0;
        entry.read_write_mask.0 |= mask.0;
        if interpolation.is_some() {
            entry.interpolation = interpolation;
        }
    }
    merged.into_values().collect()
}

fn sv_semantic(sv: SystemValue) -> &'static str {
    use SystemValue::*;
    match sv {
        Position => "SV_Position",
        ClipDistance => "SV_ClipDistance",
        CullDistance => "SV_CullDistance",
        RenderTargetArrayIndex => "SV_RenderTargetArrayIndex",
        ViewportArrayIndex => "SV_ViewportArrayIndex",
        VertexId => "SV_VertexID",
        PrimitiveId => "SV_PrimitiveID",
        InstanceId => "SV_InstanceID",
        IsFrontFace => "SV_IsFrontFace",
        SampleIndex => "SV_SampleIndex",
        FinalQuadEdgeTessFactor | FinalTriEdgeTessFactor | FinalLineDetailTessFactor
        | FinalLineDensityTessFactor => "SV_TessFactor",
        FinalQuadInsideTessFactor | FinalTriInsideTessFactor => "SV_InsideTessFactor",
        Target => "SV_Target",
        Depth => "SV_Depth",
        Coverage => "SV_Coverage",
        DepthGreaterEqual => "SV_DepthGreaterEqual",
        DepthLessEqual => "SV_DepthLessEqual",
        StencilRef => "SV_StencilRef",
        InnerCoverage => "SV_InnerCoverage",
        Undefined => "TEXCOORD",
    }
}

fn sv_component_type(sv: SystemValue) -> ComponentType {
    use SystemValue::*;
    match sv {
        VertexId | InstanceId | PrimitiveId | IsFrontFace | SampleIndex
        | RenderTargetArrayIndex | ViewportArrayIndex | Coverage | StencilRef => ComponentType::Uint32,
        _ => ComponentType::Float32,
    }
}

/// Number of registers of `types` the program touches, covering the
/// signature, declarations, index ranges and static instruction operands.
fn extent(program: &Program, entries: &[SignatureEntry], types: &[OperandType]) -> u32 {
    let mut n = entries
        .iter()
        .filter(|e| e.register != u32::MAX)
        .map(|e| e.register + 1)
        .max()
        .unwrap_or(0);
    let last_index = |id| {
        let op = program.operand(id);
        if !types.contains(&op.ty) {
            return None;
        }
        op.indices.as_slice().last().and_then(OperandIndex::as_imm32)
    };
    for decl in &program.declarations {
        let end = match decl.kind {
            DeclKind::Input { operand, .. } | DeclKind::Output { operand, .. } => {
                last_index(operand).map(|r| r + 1)
            }
            DeclKind::IndexRange { operand, count } => last_index(operand).map(|r| r + count),
            _ => None,
        };
        n = n.max(end.unwrap_or(0));
    }
    for inst in &program.instructions {
        for &id in inst.operands() {
            n = n.max(last_index(id).map_or(0, |r| r + 1));
        }
    }
    n
}

/// `layout(...)` qualifiers that describe the stage itself.
pub(crate) fn stage_layout_lines(
    program: &Program,
    rules: &DialectRules,
    options: &TranslateOptions,
) -> Result<Vec<String>, TranslateError> {
    let info = &program.stage_info;
    let mut lines = Vec::new();
    match program.stage {
        ShaderStage::Geometry => {
            let prim = info.gs_input_primitive.ok_or_else(|| TranslateError::UnresolvedBinding {
                inst_index: 0,
                what: "geometry shader without an input primitive".into(),
            })?;
            let input = match prim {
                InputPrimitive::Point => "points",
                InputPrimitive::Line => "lines",
                InputPrimitive::Triangle => "triangles",
                InputPrimitive::LineAdj => "lines_adjacency",
                InputPrimitive::TriangleAdj => "triangles_adjacency",
                InputPrimitive::Patch(_) => {
                    return Err(TranslateError::UnsupportedDialectFeature {
                        feature: "patch input to a geometry shader",
                        version: rules.version(),
                        inst_index: None,
                    })
                }
            };
            let output = match info.gs_output_topology.unwrap_or(PrimitiveTopology::PointList) {
                PrimitiveTopology::PointList => "points",
                PrimitiveTopology::LineStrip => "line_strip",
                PrimitiveTopology::TriangleStrip => "triangle_strip",
            };
            lines.push(format!("layout({input}) in;"));
            lines.push(format!(
                "layout({output}, max_vertices = {}) out;",
                info.gs_max_output_vertices.unwrap_or(1)
            ));
            if let Some(n) = info.gs_instance_count.filter(|&n| n > 1) {
                rules.require(RuleFlags::GS_INSTANCING, "geometry-shader instancing", None)?;
                lines.push(format!("layout(invocations = {n}) in;"));
            }
        }
        ShaderStage::Hull => {
            lines.push(format!(
                "layout(vertices = {}) out;",
                info.output_control_points.unwrap_or(1).max(1)
            ));
        }
        ShaderStage::Domain => {
            let domain = match info.tess_domain.unwrap_or(TessDomain::Triangle) {
                TessDomain::Isoline => "isolines",
                TessDomain::Triangle => "triangles",
                TessDomain::Quad => "quads",
            };
            let spacing = match options
                .tess_partitioning
                .or(info.tess_partitioning)
                .unwrap_or_default()
            {
                TessPartitioning::Integer | TessPartitioning::Pow2 => "equal_spacing",
                TessPartitioning::FractionalOdd => "fractional_odd_spacing",
                TessPartitioning::FractionalEven => "fractional_even_spacing",
            };
            let mut parts = vec![domain, spacing];
            match options.tess_output_primitive.or(info.tess_output_primitive) {
                Some(TessOutputPrimitive::Point) => parts.push("point_mode"),
                Some(TessOutputPrimitive::TriangleCw) => parts.push("cw"),
                Some(TessOutputPrimitive::TriangleCcw) => parts.push("ccw"),
                Some(TessOutputPrimitive::Line) | None => {}
            }
            lines.push(format!("layout({}) in;", parts.join(", ")));
        }
        ShaderStage::Compute => {
            let [x, y, z] = info.thread_group.unwrap_or([1, 1, 1]);
            lines.push(format!(
                "layout(local_size_x = {x}, local_size_y = {y}, local_size_z = {z}) in;"
            ));
        }
        ShaderStage::Pixel => {
            if info.global_flags & GLOBAL_FLAG_EARLY_DEPTH_STENCIL != 0 {
                rules.require(RuleFlags::EARLY_FRAGMENT_TESTS, "early fragment tests", None)?;
                lines.push("layout(early_fragment_tests) in;".to_owned());
            }
        }
        ShaderStage::Vertex => {}
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::GlslVersion;
    use crate::sm4::ShaderModel;
    use crate::sm4_ir::{OperandArena, StageInfo};

    fn program(stage: ShaderStage) -> Program {
        Program {
            stage,
            model: ShaderModel { major: 5, minor: 0 },
            declarations: Vec::new(),
            instructions: Vec::new(),
            operands: OperandArena::default(),
            input_signature: Vec::new(),
            output_signature: Vec::new(),
            patch_constant_signature: Vec::new(),
            constant_buffers: Vec::new(),
            resource_bindings: Vec::new(),
            stage_info: StageInfo::default(),
            control_flow: None,
        }
    }

    fn build(p: &Program, version: GlslVersion, options: &TranslateOptions) -> IoLayout {
        IoLayout::build(p, &DialectRules::for_version(version), options, None).unwrap()
    }

    #[test]
    fn vertex_attributes_get_locations_and_varyings_match_by_name() {
        let mut vs = program(ShaderStage::Vertex);
        vs.input_signature = vec![SignatureEntry::new("POSITION", 0, 0, 0xf)];
        vs.output_signature = vec![
            SignatureEntry::new("SV_Position", 0, 0, 0xf).with_system_value(SystemValue::Position),
            SignatureEntry::new("texcoord", 0, 1, 0x3),
        ];
        let io = build(&vs, GlslVersion::Gl33, &TranslateOptions::default());
        assert_eq!(
            io.declarations,
            vec![
                "layout(location = 0) in vec4 a_POSITION0;".to_owned(),
                "out vec4 v_TEXCOORD0;".to_owned(),
            ]
        );
        assert_eq!(io.load, vec!["v[0] = a_POSITION0;".to_owned()]);
        assert_eq!(
            io.store,
            vec!["gl_Position = o[0];".to_owned(), "v_TEXCOORD0.xy = o[1].xy;".to_owned()]
        );
        assert_eq!(io.attributes[0].location, 0);
    }

    #[test]
    fn signature_entries_without_declarations_are_reported() {
        let given = vec![
            SignatureEntry::new("POSITION", 0, 0, 0xf),
            SignatureEntry::new("TEXCOORD", 0, 1, 0x3),
            SignatureEntry::new("SV_Depth", 0, u32::MAX, 0x1),
        ];
        let declared = vec![SignatureEntry::new("TEXCOORD", 0, 0, 0xf)];
        let missing: Vec<&str> = unreferenced(&given, &declared)
            .into_iter()
            .map(|e| e.semantic_name.as_str())
            .collect();
        assert_eq!(missing, vec!["TEXCOORD"]);
    }

    #[test]
    fn es2_uses_attribute_and_varying() {
        let mut vs = program(ShaderStage::Vertex);
        vs.input_signature = vec![SignatureEntry::new("POSITION", 0, 0, 0xf)];
        vs.output_signature = vec![SignatureEntry::new("COLOR", 0, 0, 0xf)];
        let io = build(&vs, GlslVersion::Es20, &TranslateOptions::default());
        assert_eq!(
            io.declarations,
            vec!["attribute vec4 a_POSITION0;".to_owned(), "varying vec4 v_COLOR0;".to_owned()]
        );
    }

    #[test]
    fn integer_varyings_are_flat_and_bit_cast() {
        let mut ps = program(ShaderStage::Pixel);
        ps.input_signature = vec![
            SignatureEntry::new("INDEX", 0, 0, 0x1).with_component_type(ComponentType::Uint32)
        ];
        ps.output_signature =
            vec![SignatureEntry::new("SV_Target", 0, 0, 0xf).with_system_value(SystemValue::Target)];
        let io = build(&ps, GlslVersion::Gl33, &TranslateOptions::default());
        assert_eq!(io.declarations[0], "flat in uvec4 v_INDEX0;");
        assert_eq!(io.load, vec!["v[0].x = uintBitsToFloat(v_INDEX0.x);".to_owned()]);
        assert_eq!(io.declarations[1], "layout(location = 0) out vec4 out_Target0;");
        assert_eq!(io.store, vec!["out_Target0 = o[0];".to_owned()]);
    }

    #[test]
    fn pixel_inputs_follow_the_geometry_stage_when_present() {
        let mut ps = program(ShaderStage::Pixel);
        ps.input_signature = vec![SignatureEntry::new("COLOR", 0, 0, 0xf)];
        let options = TranslateOptions {
            has_gs: true,
            ..TranslateOptions::default()
        };
        let io = build(&ps, GlslVersion::Gl33, &options);
        assert_eq!(io.declarations, vec!["in vec4 g_COLOR0;".to_owned()]);
    }

    #[test]
    fn varyings_without_a_consumer_are_dropped() {
        let mut vs = program(ShaderStage::Vertex);
        vs.output_signature = vec![
            SignatureEntry::new("SV_Position", 0, 0, 0xf).with_system_value(SystemValue::Position),
            SignatureEntry::new("COLOR", 0, 1, 0xf),
        ];
        let options = TranslateOptions {
            has_ps: false,
            ..TranslateOptions::default()
        };
        let io = build(&vs, GlslVersion::Gl33, &options);
        assert!(io.declarations.is_empty());
        assert_eq!(io.store, vec!["gl_Position = o[0];".to_owned()]);
    }

    #[test]
    fn noperspective_needs_a_desktop_dialect() {
        let mut ps = program(ShaderStage::Pixel);
        let mut e = SignatureEntry::new("COLOR", 0, 0, 0xf);
        e.interpolation = Some(InterpolationMode::LinearNoPerspective);
        ps.input_signature = vec![e];
        let err = IoLayout::build(
            &ps,
            &DialectRules::for_version(GlslVersion::Es30),
            &TranslateOptions::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedDialectFeature { .. }));
        let io = build(&ps, GlslVersion::Gl33, &TranslateOptions::default());
        assert_eq!(io.declarations, vec!["noperspective in vec4 v_COLOR0;".to_owned()]);
    }

    #[test]
    fn tess_factors_map_to_tess_levels() {
        let mut hs = program(ShaderStage::Hull);
        hs.patch_constant_signature = vec![
            SignatureEntry::new("SV_TessFactor", 0, 0, 0x1)
                .with_system_value(SystemValue::FinalTriEdgeTessFactor),
            SignatureEntry::new("SV_TessFactor", 1, 1, 0x1)
                .with_system_value(SystemValue::FinalTriEdgeTessFactor),
            SignatureEntry::new("SV_InsideTessFactor", 0, 2, 0x1)
                .with_system_value(SystemValue::FinalTriInsideTessFactor),
        ];
        let io = build(&hs, GlslVersion::Gl40, &TranslateOptions::default());
        assert_eq!(
            io.patch_store,
            vec![
                "gl_TessLevelOuter[0] = opc[0].x;".to_owned(),
                "gl_TessLevelOuter[1] = opc[1].x;".to_owned(),
                "gl_TessLevelInner[0] = opc[2].x;".to_owned(),
            ]
        );
        assert_eq!(io.patch_regs, 3);
    }

    #[test]
    fn geometry_layout_lines() {
        let mut gs = program(ShaderStage::Geometry);
        gs.stage_info.gs_input_primitive = Some(InputPrimitive::Triangle);
        gs.stage_info.gs_output_topology = Some(PrimitiveTopology::TriangleStrip);
        gs.stage_info.gs_max_output_vertices = Some(3);
        let rules = DialectRules::for_version(GlslVersion::Gl33);
        let lines = stage_layout_lines(&gs, &rules, &TranslateOptions::default()).unwrap();
        assert_eq!(
            lines,
            vec![
                "layout(triangles) in;".to_owned(),
                "layout(triangle_strip, max_vertices = 3) out;".to_owned(),
            ]
        );
    }
}
