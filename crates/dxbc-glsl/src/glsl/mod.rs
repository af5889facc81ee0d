//! GLSL code generation from a decoded [`Program`].
//!
//! The generator models D3D registers directly: `r#` temps become global
//! `vec4`/`ivec4`/`uvec4` variables typed by their first write, and the
//! input/output register files become shadow arrays (`v`, `o`, ...) that
//! `main` fills from, and flushes to, the GLSL interface variables. Every
//! instruction then reads and writes registers with the component selection
//! and type conversions the bytecode spells out.

pub mod types;

mod emitter;
mod hull;
mod instructions;
mod interface;
mod operands;
mod resources;
mod sampling;
mod writer;

use tracing::debug;

use crate::control_flow::link_control_flow;
use crate::dialect::{DialectRules, GlslVersion, RuleFlags};
use crate::error::TranslateError;
use crate::hull::split_hull_phases;
use crate::sm4::ShaderStage;
use crate::sm4_ir::{Program, TessOutputPrimitive, TessPartitioning};

use emitter::Emitter;

#[derive(Debug, Clone)]
pub struct TranslateOptions {
    pub version: GlslVersion,
    /// Capability override. `None` uses the default rules of `version`.
    pub rules: Option<DialectRules>,
    /// A geometry shader sits between the vertex/domain stage and the pixel
    /// shader, so pixel inputs are named after its outputs (`g_*`).
    pub has_gs: bool,
    /// Whether a pixel shader consumes the pre-raster stage's varyings.
    /// Without one, user outputs of the last pre-raster stage are dropped.
    pub has_ps: bool,
    /// Tessellator partitioning for domain shaders. D3D declares it on the
    /// hull shader; GLSL wants it on the evaluation stage.
    pub tess_partitioning: Option<TessPartitioning>,
    /// Tessellator output primitive for domain shaders.
    pub tess_output_primitive: Option<TessOutputPrimitive>,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            version: GlslVersion::default(),
            rules: None,
            has_gs: false,
            has_ps: true,
            tess_partitioning: None,
            tess_output_primitive: None,
        }
    }
}

impl TranslateOptions {
    pub fn for_version(version: GlslVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// The rules generation runs under.
    pub fn resolved_rules(&self) -> DialectRules {
        self.rules
            .unwrap_or_else(|| DialectRules::for_version(self.version))
    }
}

/// A GLSL name bound to a slot or binding point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBinding {
    pub name: String,
    pub binding: u32,
}

/// A loose uniform standing in for (part of) a constant buffer when the
/// dialect has no uniform blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBinding {
    pub name: String,
    pub cbuffer_slot: u32,
    /// Byte offset of the uniform inside the constant buffer.
    pub offset: u32,
}

/// A combined texture/sampler uniform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerBinding {
    pub name: String,
    pub texture_slot: u32,
    /// `None` for the fetch-only uniform of a texture never sampled.
    pub sampler_slot: Option<u32>,
    /// Texture unit the host should bind the pair to.
    pub unit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationBinding {
    pub name: String,
    pub location: u32,
}

/// Everything the host must bind for the generated text to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reflection {
    pub uniform_blocks: Vec<NamedBinding>,
    pub uniforms: Vec<UniformBinding>,
    pub samplers: Vec<SamplerBinding>,
    pub storage_buffers: Vec<NamedBinding>,
    pub images: Vec<NamedBinding>,
    /// Vertex-shader inputs.
    pub attributes: Vec<LocationBinding>,
    /// Pixel-shader outputs.
    pub frag_outputs: Vec<LocationBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Output {
    Single(String),
    Hull {
        glsl: String,
        control_point: String,
        forks: String,
        joins: String,
    },
}

/// Result of one translation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlslTranslation {
    pub stage: ShaderStage,
    pub version: GlslVersion,
    pub reflection: Reflection,
    output: Output,
}

impl GlslTranslation {
    /// The complete shader text. For hull shaders this is the stitched
    /// tessellation-control program built from the three phase blocks.
    pub fn glsl(&self) -> &str {
        match &self.output {
            Output::Single(text) => text,
            Output::Hull { glsl, .. } => glsl,
        }
    }

    /// Control-point phase block (`hs_control_point_phase()`). `None` for
    /// every stage but hull.
    pub fn hs_control_point_phase(&self) -> Option<&str> {
        match &self.output {
            Output::Hull { control_point, .. } => Some(control_point),
            Output::Single(_) => None,
        }
    }

    /// Fork phase functions plus the `hs_fork_phases()` driver.
    pub fn hs_fork_phases(&self) -> Option<&str> {
        match &self.output {
            Output::Hull { forks, .. } => Some(forks),
            Output::Single(_) => None,
        }
    }

    /// Join phase functions plus the `hs_join_phases()` driver, which also
    /// writes the tessellation levels and patch outputs.
    pub fn hs_join_phases(&self) -> Option<&str> {
        match &self.output {
            Output::Hull { joins, .. } => Some(joins),
            Output::Single(_) => None,
        }
    }

    pub fn into_glsl(self) -> String {
        match self.output {
            Output::Single(text) => text,
            Output::Hull { glsl, .. } => glsl,
        }
    }
}

fn stage_gate(stage: ShaderStage, rules: &DialectRules) -> Result<(), TranslateError> {
    let (flags, feature) = match stage {
        ShaderStage::Geometry => (RuleFlags::GEOMETRY_SHADERS, "geometry shaders"),
        ShaderStage::Hull => (RuleFlags::TESSELLATION, "hull shaders"),
        ShaderStage::Domain => (RuleFlags::TESSELLATION, "domain shaders"),
        ShaderStage::Compute => (RuleFlags::COMPUTE_SHADERS, "compute shaders"),
        ShaderStage::Vertex | ShaderStage::Pixel => return Ok(()),
    };
    rules.require(flags, feature, None)
}

/// Generates GLSL for `program` under `options`.
///
/// The program's linked control flow is used when [`Program::link`] has
/// already run; otherwise the instruction stream is linked here. The same
/// program and options always produce byte-identical text.
pub fn translate_program(
    program: &Program,
    options: &TranslateOptions,
) -> Result<GlslTranslation, TranslateError> {
    let rules = options.resolved_rules();
    debug!(
        stage = program.stage.prefix(),
        version = %rules.version(),
        flags = ?rules.flags(),
        "resolved dialect rules"
    );
    stage_gate(program.stage, &rules)?;

    let linked;
    let flow = match &program.control_flow {
        Some(flow) => flow,
        None => {
            linked = link_control_flow(&program.instructions, &program.operands)?;
            &linked
        }
    };

    let (output, reflection) = if program.stage == ShaderStage::Hull {
        let phases = split_hull_phases(program)?;
        let emitter = Emitter::new(program, rules, options, flow, Some(&phases))?;
        let (text, reflection) = emitter.translate_hull(&phases)?;
        let output = Output::Hull {
            glsl: text.glsl,
            control_point: text.control_point,
            forks: text.forks,
            joins: text.joins,
        };
        (output, reflection)
    } else {
        let emitter = Emitter::new(program, rules, options, flow, None)?;
        let (text, reflection) = emitter.translate()?;
        (Output::Single(text), reflection)
    };

    let translation = GlslTranslation {
        stage: program.stage,
        version: rules.version(),
        reflection,
        output,
    };
    debug!(
        stage = program.stage.prefix(),
        len = translation.glsl().len(),
        "generated glsl"
    );
    Ok(translation)
}
