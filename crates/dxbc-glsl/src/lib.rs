//! Translation of Direct3D 10/11 shader bytecode (SM4/SM5 `DXBC`) into GLSL.
//!
//! The pipeline is:
//!
//! 1. [`container`]: pull the token stream, signatures and reflection out of a
//!    `DXBC` blob (optional; programs can also be decoded from raw tokens);
//! 2. [`sm4`]: decode the token stream into a [`Program`];
//! 3. [`control_flow`]: pair structured flow-control instructions and find
//!    subroutine labels;
//! 4. [`glsl`]: emit GLSL for a [`GlslVersion`], gated by [`DialectRules`].
//!
//! Hull shaders are split into their control-point, fork and join phases
//! first ([`hull`]); each phase becomes its own block of GLSL.
//!
//! The library logs through `tracing` and never installs a subscriber.

#![forbid(unsafe_code)]

pub mod container;
pub mod control_flow;
pub mod dialect;
pub mod error;
pub mod glsl;
pub mod hull;
pub mod sm4;
pub mod sm4_ir;

pub use crate::container::{load_program, translate_dxbc, DxbcContainer};
pub use crate::control_flow::{link_control_flow, LinkedControlFlow};
pub use crate::dialect::{DialectRules, GlslVersion, RuleFlags};
pub use crate::error::{
    ControlFlowError, ControlFlowErrorKind, DecodeError, DecodeErrorKind, TranslateError,
};
pub use crate::glsl::{translate_program, GlslTranslation, Reflection, TranslateOptions};
pub use crate::sm4::{decode_program, ShaderModel, ShaderStage};
pub use crate::sm4_ir::Program;

/// Decodes, links and translates a bare SM4/SM5 token stream (no container).
pub fn translate_tokens(tokens: &[u32], options: &TranslateOptions) -> Result<GlslTranslation, TranslateError> {
    let mut program = decode_program(tokens)?;
    program.link()?;
    translate_program(&program, options)
}
