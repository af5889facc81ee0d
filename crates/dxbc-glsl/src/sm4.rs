//! SM4/SM5 token-stream decoding.

pub mod decode;
pub mod opcode;
pub mod operand;
pub mod reader;

use core::fmt;

pub use decode::decode_program;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Pixel,
    Vertex,
    Geometry,
    Hull,
    Domain,
    Compute,
}

impl ShaderStage {
    /// Short prefix used by the D3D disassembler (`ps`, `vs`, ...).
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Pixel => "ps",
            Self::Vertex => "vs",
            Self::Geometry => "gs",
            Self::Hull => "hs",
            Self::Domain => "ds",
            Self::Compute => "cs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ShaderModel {
    pub major: u8,
    pub minor: u8,
}

impl fmt::Display for ShaderModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.major, self.minor)
    }
}

/// Splits the version token: minor in bits 0..4, major in bits 4..8, program
/// type in bits 16..32.
pub fn decode_version_token(version: u32) -> Option<(ShaderStage, ShaderModel)> {
    let minor = (version & 0xf) as u8;
    let major = ((version >> 4) & 0xf) as u8;
    let stage = match version >> 16 {
        0 => ShaderStage::Pixel,
        1 => ShaderStage::Vertex,
        2 => ShaderStage::Geometry,
        3 => ShaderStage::Hull,
        4 => ShaderStage::Domain,
        5 => ShaderStage::Compute,
        _ => return None,
    };
    Some((stage, ShaderModel { major, minor }))
}

/// Inverse of [`decode_version_token`].
pub fn encode_version_token(stage: ShaderStage, model: ShaderModel) -> u32 {
    let ty = match stage {
        ShaderStage::Pixel => 0,
        ShaderStage::Vertex => 1,
        ShaderStage::Geometry => 2,
        ShaderStage::Hull => 3,
        ShaderStage::Domain => 4,
        ShaderStage::Compute => 5,
    };
    (ty << 16) | (u32::from(model.major & 0xf) << 4) | u32::from(model.minor & 0xf)
}
