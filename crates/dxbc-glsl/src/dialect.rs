//! Target GLSL dialects and the capability rules derived from them.
//!
//! Code generation never branches on a [`GlslVersion`] directly: it asks the
//! [`DialectRules`] of the request whether a capability bit is set. Adding a
//! target dialect means adding a version and one column in [`RULE_TABLE`].

use core::fmt;

use bitflags::bitflags;

use crate::error::TranslateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum GlslVersion {
    Gl20,
    Gl21,
    Gl30,
    Gl31,
    Gl32,
    #[default]
    Gl33,
    Gl40,
    Gl41,
    Gl42,
    Gl43,
    Gl44,
    Gl45,
    Gl46,
    Es20,
    Es30,
    Es31,
    Es32,
}

impl GlslVersion {
    const ALL: [GlslVersion; 17] = [
        Self::Gl20,
        Self::Gl21,
        Self::Gl30,
        Self::Gl31,
        Self::Gl32,
        Self::Gl33,
        Self::Gl40,
        Self::Gl41,
        Self::Gl42,
        Self::Gl43,
        Self::Gl44,
        Self::Gl45,
        Self::Gl46,
        Self::Es20,
        Self::Es30,
        Self::Es31,
        Self::Es32,
    ];

    pub fn all() -> &'static [GlslVersion] {
        &Self::ALL
    }

    /// The number printed after `#version`.
    pub fn number(self) -> u32 {
        match self {
            Self::Gl20 => 110,
            Self::Gl21 => 120,
            Self::Gl30 => 130,
            Self::Gl31 => 140,
            Self::Gl32 => 150,
            Self::Gl33 => 330,
            Self::Gl40 => 400,
            Self::Gl41 => 410,
            Self::Gl42 => 420,
            Self::Gl43 => 430,
            Self::Gl44 => 440,
            Self::Gl45 => 450,
            Self::Gl46 => 460,
            Self::Es20 => 100,
            Self::Es30 => 300,
            Self::Es31 => 310,
            Self::Es32 => 320,
        }
    }

    /// Parses a `#version` number (`330`, `300` with `es`) or a dotted API
    /// version (`3.3`, `3.0` with `es`).
    pub fn parse(text: &str, es: bool) -> Option<Self> {
        let number = match text.split_once('.') {
            Some((major, minor)) => {
                let major: u32 = major.parse().ok()?;
                let minor: u32 = minor.parse().ok()?;
                match (es, major, minor) {
                    (false, 2, 0) => 110,
                    (false, 2, 1) => 120,
                    (false, 3, 0) => 130,
                    (false, 3, 1) => 140,
                    (false, 3, 2) => 150,
                    (true, 2, 0) => 100,
                    _ => major * 100 + minor * 10,
                }
            }
            None => text.parse().ok()?,
        };
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.is_es() == es && v.number() == number)
    }

    /// Family membership. Emission decisions use [`RuleFlags::ES_PROFILE`]
    /// instead; this exists for callers comparing versions.
    pub fn is_es(self) -> bool {
        matches!(self, Self::Es20 | Self::Es30 | Self::Es31 | Self::Es32)
    }

    pub fn version_directive(self) -> String {
        match self {
            Self::Es20 => "#version 100".to_owned(),
            v if v.is_es() => format!("#version {} es", v.number()),
            v if v >= Self::Gl32 => format!("#version {} core", v.number()),
            v => format!("#version {}", v.number()),
        }
    }
}

impl fmt::Display for GlslVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_es() {
            write!(f, "GLSL ES {}", self.number())
        } else {
            write!(f, "GLSL {}", self.number())
        }
    }
}

bitflags! {
    /// Capability bits. Each bit gates exactly one family of emission
    /// decisions in the generator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RuleFlags: u64 {
        const ES_PROFILE = 1 << 0;
        const PRECISION_QUALIFIERS = 1 << 1;
        /// `in`/`out` instead of `attribute`/`varying`.
        const IN_OUT_KEYWORDS = 1 << 2;
        /// User-declared fragment outputs instead of `gl_FragColor`/`gl_FragData`.
        const FRAG_DATA_OUTPUTS = 1 << 3;
        const EXPLICIT_INPUT_LOCATION = 1 << 4;
        const EXPLICIT_OUTPUT_LOCATION = 1 << 5;
        const UNIFORM_BLOCKS = 1 << 7;
        /// The `$Globals` constant buffer becomes a uniform block as well.
        const GLOBALS_IN_UNIFORM_BLOCK = 1 << 8;
        /// `layout(binding = N)` on blocks, samplers and images.
        const EXPLICIT_BINDING = 1 << 9;
        /// `layout(offset = N)` on uniform-block members.
        const MEMBER_OFFSETS = 1 << 10;
        const UNSIGNED_INTEGERS = 1 << 11;
        const BITWISE_OPS = 1 << 12;
        /// `floatBitsToUint` and friends.
        const BIT_CASTS = 1 << 13;
        /// Overloaded `texture()` instead of `texture2D()` and friends.
        const TEXTURE_OVERLOADS = 1 << 14;
        const TEXEL_FETCH = 1 << 15;
        const TEXTURE_SIZE = 1 << 16;
        const SWITCH_STATEMENTS = 1 << 17;
        const ROUND_EVEN_TRUNC = 1 << 18;
        /// Array constructors, hence `const` arrays.
        const ARRAY_CONSTRUCTORS = 1 << 19;
        const NON_SQUARE_MATRICES = 1 << 20;
        /// Explicit-LOD and gradient sampling through
        /// `GL_ARB_shader_texture_lod` / `GL_EXT_shader_texture_lod`.
        const TEXTURE_LOD_EXT = 1 << 21;
        /// Explicit-LOD and gradient sampling in core.
        const TEXTURE_LOD = 1 << 22;
        /// Derivatives through `GL_OES_standard_derivatives`.
        const DERIVATIVES_EXT = 1 << 23;
        const DERIVATIVES = 1 << 24;
        const FINE_DERIVATIVES = 1 << 25;
        const TEXTURE_ARRAYS = 1 << 26;
        const TEXTURE_CUBE_ARRAYS = 1 << 27;
        const TEXTURE_3D = 1 << 28;
        const TEXTURE_1D = 1 << 29;
        const SHADOW_SAMPLERS = 1 << 30;
        const MULTISAMPLE_TEXTURES = 1 << 31;
        const TEXTURE_BUFFERS = 1 << 32;
        const TEXTURE_GATHER = 1 << 33;
        const TEXTURE_QUERY_LOD = 1 << 34;
        const TEXTURE_QUERY_LEVELS = 1 << 35;
        /// `gl_VertexID` / `gl_InstanceID`.
        const SYSTEM_VALUE_IDS = 1 << 36;
        const FRAG_DEPTH = 1 << 37;
        const INTERFACE_BLOCKS = 1 << 38;
        const GEOMETRY_SHADERS = 1 << 39;
        const MULTI_STREAM_GS = 1 << 40;
        const GS_INSTANCING = 1 << 41;
        const TESSELLATION = 1 << 42;
        const COMPUTE_SHADERS = 1 << 43;
        const STORAGE_BUFFERS = 1 << 44;
        const IMAGE_LOAD_STORE = 1 << 45;
        const DOUBLES = 1 << 46;
        const INT64 = 1 << 47;
        const BITFIELD_FUNCTIONS = 1 << 48;
        const PACK_HALF = 1 << 49;
        /// `interpolateAt*`, `sample` qualifier and `gl_SampleID`.
        const SAMPLE_INTERPOLATION = 1 << 50;
        const NOPERSPECTIVE = 1 << 51;
        const CLIP_DISTANCE = 1 << 52;
        const CONSERVATIVE_DEPTH = 1 << 53;
        const EARLY_FRAGMENT_TESTS = 1 << 54;
    }
}

use GlslVersion::*;

/// `(flag, first desktop version, first ES version)`.
const RULE_TABLE: &[(RuleFlags, Option<GlslVersion>, Option<GlslVersion>)] = &[
    (RuleFlags::ES_PROFILE, None, Some(Es20)),
    (RuleFlags::PRECISION_QUALIFIERS, None, Some(Es20)),
    (RuleFlags::IN_OUT_KEYWORDS, Some(Gl30), Some(Es30)),
    (RuleFlags::FRAG_DATA_OUTPUTS, Some(Gl30), Some(Es30)),
    (RuleFlags::EXPLICIT_INPUT_LOCATION, Some(Gl33), Some(Es30)),
    (RuleFlags::EXPLICIT_OUTPUT_LOCATION, Some(Gl33), Some(Es30)),
    (RuleFlags::UNIFORM_BLOCKS, Some(Gl31), Some(Es30)),
    (RuleFlags::GLOBALS_IN_UNIFORM_BLOCK, Some(Gl31), Some(Es30)),
    (RuleFlags::EXPLICIT_BINDING, Some(Gl42), Some(Es31)),
    (RuleFlags::MEMBER_OFFSETS, Some(Gl44), None),
    (RuleFlags::UNSIGNED_INTEGERS, Some(Gl30), Some(Es30)),
    (RuleFlags::BITWISE_OPS, Some(Gl30), Some(Es30)),
    (RuleFlags::BIT_CASTS, Some(Gl33), Some(Es30)),
    (RuleFlags::TEXTURE_OVERLOADS, Some(Gl30), Some(Es30)),
    (RuleFlags::TEXEL_FETCH, Some(Gl30), Some(Es30)),
    (RuleFlags::TEXTURE_SIZE, Some(Gl30), Some(Es30)),
    (RuleFlags::SWITCH_STATEMENTS, Some(Gl30), Some(Es30)),
    (RuleFlags::ROUND_EVEN_TRUNC, Some(Gl30), Some(Es30)),
    (RuleFlags::ARRAY_CONSTRUCTORS, Some(Gl21), Some(Es30)),
    (RuleFlags::NON_SQUARE_MATRICES, Some(Gl21), Some(Es30)),
    (RuleFlags::TEXTURE_LOD_EXT, Some(Gl20), Some(Es20)),
    (RuleFlags::TEXTURE_LOD, Some(Gl30), Some(Es30)),
    (RuleFlags::DERIVATIVES_EXT, Some(Gl20), Some(Es20)),
    (RuleFlags::DERIVATIVES, Some(Gl20), Some(Es30)),
    (RuleFlags::FINE_DERIVATIVES, Some(Gl45), None),
    (RuleFlags::TEXTURE_ARRAYS, Some(Gl30), Some(Es30)),
    (RuleFlags::TEXTURE_CUBE_ARRAYS, Some(Gl40), Some(Es32)),
    (RuleFlags::TEXTURE_3D, Some(Gl20), Some(Es30)),
    (RuleFlags::TEXTURE_1D, Some(Gl20), None),
    (RuleFlags::SHADOW_SAMPLERS, Some(Gl20), Some(Es30)),
    (RuleFlags::MULTISAMPLE_TEXTURES, Some(Gl32), Some(Es31)),
    (RuleFlags::TEXTURE_BUFFERS, Some(Gl31), Some(Es32)),
    (RuleFlags::TEXTURE_GATHER, Some(Gl40), Some(Es31)),
    (RuleFlags::TEXTURE_QUERY_LOD, Some(Gl40), None),
    (RuleFlags::TEXTURE_QUERY_LEVELS, Some(Gl43), None),
    (RuleFlags::SYSTEM_VALUE_IDS, Some(Gl31), Some(Es30)),
    (RuleFlags::FRAG_DEPTH, Some(Gl20), Some(Es30)),
    (RuleFlags::INTERFACE_BLOCKS, Some(Gl32), Some(Es32)),
    (RuleFlags::GEOMETRY_SHADERS, Some(Gl32), Some(Es32)),
    (RuleFlags::MULTI_STREAM_GS, Some(Gl40), None),
    (RuleFlags::GS_INSTANCING, Some(Gl40), Some(Es32)),
    (RuleFlags::TESSELLATION, Some(Gl40), Some(Es32)),
    (RuleFlags::COMPUTE_SHADERS, Some(Gl43), Some(Es31)),
    (RuleFlags::STORAGE_BUFFERS, Some(Gl43), Some(Es31)),
    (RuleFlags::IMAGE_LOAD_STORE, Some(Gl42), Some(Es31)),
    (RuleFlags::DOUBLES, Some(Gl40), None),
    (RuleFlags::INT64, None, None),
    (RuleFlags::BITFIELD_FUNCTIONS, Some(Gl40), Some(Es31)),
    (RuleFlags::PACK_HALF, Some(Gl42), Some(Es30)),
    (RuleFlags::SAMPLE_INTERPOLATION, Some(Gl40), Some(Es32)),
    (RuleFlags::NOPERSPECTIVE, Some(Gl30), None),
    (RuleFlags::CLIP_DISTANCE, Some(Gl30), None),
    (RuleFlags::CONSERVATIVE_DEPTH, Some(Gl42), None),
    (RuleFlags::EARLY_FRAGMENT_TESTS, Some(Gl42), Some(Es31)),
];

/// The default capability bitmask of `version`.
pub fn rules_for(version: GlslVersion) -> RuleFlags {
    let mut flags = RuleFlags::empty();
    for &(flag, desktop, es) in RULE_TABLE {
        let first = if version.is_es() { es } else { desktop };
        if first.is_some_and(|first| version >= first) {
            flags |= flag;
        }
    }
    flags
}

/// Capability bitmask plus the version it was resolved for. Immutable once
/// built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DialectRules {
    version: GlslVersion,
    flags: RuleFlags,
}

impl DialectRules {
    pub fn for_version(version: GlslVersion) -> Self {
        Self {
            version,
            flags: rules_for(version),
        }
    }

    /// A caller-supplied bitmask for `version`, used verbatim.
    pub fn with_flags(version: GlslVersion, flags: RuleFlags) -> Self {
        Self { version, flags }
    }

    pub fn version(&self) -> GlslVersion {
        self.version
    }

    pub fn flags(&self) -> RuleFlags {
        self.flags
    }

    pub fn has(&self, flag: RuleFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn with(mut self, flags: RuleFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn without(mut self, flags: RuleFlags) -> Self {
        self.flags -= flags;
        self
    }

    /// Errors with `UnsupportedDialectFeature` unless every bit of `flags` is
    /// set.
    pub fn require(
        &self,
        flags: RuleFlags,
        feature: &'static str,
        inst_index: Option<usize>,
    ) -> Result<(), TranslateError> {
        if self.flags.contains(flags) {
            Ok(())
        } else {
            Err(TranslateError::UnsupportedDialectFeature {
                feature,
                version: self.version,
                inst_index,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_directives() {
        assert_eq!(GlslVersion::Gl20.version_directive(), "#version 110");
        assert_eq!(GlslVersion::Gl33.version_directive(), "#version 330 core");
        assert_eq!(GlslVersion::Es20.version_directive(), "#version 100");
        assert_eq!(GlslVersion::Es31.version_directive(), "#version 310 es");
    }

    #[test]
    fn parse_accepts_numbers_and_dotted_versions() {
        assert_eq!(GlslVersion::parse("330", false), Some(GlslVersion::Gl33));
        assert_eq!(GlslVersion::parse("3.3", false), Some(GlslVersion::Gl33));
        assert_eq!(GlslVersion::parse("2.1", false), Some(GlslVersion::Gl21));
        assert_eq!(GlslVersion::parse("300", true), Some(GlslVersion::Es30));
        assert_eq!(GlslVersion::parse("2.0", true), Some(GlslVersion::Es20));
        assert_eq!(GlslVersion::parse("300", false), None);
    }

    #[test]
    fn es2_lacks_integer_and_block_features() {
        let rules = DialectRules::for_version(GlslVersion::Es20);
        assert!(rules.has(RuleFlags::ES_PROFILE | RuleFlags::PRECISION_QUALIFIERS));
        assert!(!rules.has(RuleFlags::UNSIGNED_INTEGERS));
        assert!(!rules.has(RuleFlags::UNIFORM_BLOCKS));
        assert!(!rules.has(RuleFlags::IN_OUT_KEYWORDS));
    }

    #[test]
    fn int64_is_never_a_default() {
        for &v in GlslVersion::all() {
            assert!(!rules_for(v).contains(RuleFlags::INT64), "{v}");
        }
    }

    #[test]
    fn require_reports_the_version() {
        let rules = DialectRules::for_version(GlslVersion::Gl33);
        let err = rules
            .require(RuleFlags::COMPUTE_SHADERS, "compute shaders", None)
            .unwrap_err();
        assert_eq!(
            err,
            TranslateError::UnsupportedDialectFeature {
                feature: "compute shaders",
                version: GlslVersion::Gl33,
                inst_index: None,
            }
        );
    }
}
