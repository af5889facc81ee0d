use thiserror::Error;

use crate::dialect::GlslVersion;
use crate::sm4::opcode::Opcode;

/// Failure while decoding the token stream (or the container around it).
///
/// `at_dword` is the absolute DWORD offset into the program token stream (or
/// the byte offset into the container for [`DecodeErrorKind::MalformedContainer`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("at dword {at_dword}: {kind}")]
pub struct DecodeError {
    pub at_dword: usize,
    pub kind: DecodeErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeErrorKind {
    #[error("unexpected end of token stream")]
    UnexpectedEndOfStream,
    #[error("invalid program header: {0}")]
    InvalidProgramHeader(&'static str),
    #[error("unknown opcode {0:#x}")]
    UnknownOpcode(u32),
    #[error("malformed operand: {0}")]
    MalformedOperand(String),
    #[error("instruction declares {declared} dwords but {consumed} are available or consumed")]
    InstructionLengthMismatch { declared: usize, consumed: usize },
    #[error("instruction has more than {max} operands")]
    TooManyOperands { max: usize },
    #[error("malformed declaration: {0}")]
    MalformedDeclaration(String),
    #[error("malformed container: {0}")]
    MalformedContainer(String),
}

impl DecodeError {
    pub(crate) fn new(at_dword: usize, kind: DecodeErrorKind) -> Self {
        Self { at_dword, kind }
    }

    pub(crate) fn container(at_byte: usize, msg: impl Into<String>) -> Self {
        Self::new(at_byte, DecodeErrorKind::MalformedContainer(msg.into()))
    }
}

/// Failure while pairing structured flow-control instructions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("instruction {inst_index}: {kind}")]
pub struct ControlFlowError {
    pub inst_index: usize,
    pub kind: ControlFlowErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlFlowErrorKind {
    #[error("`{0}` has no matching opener")]
    UnmatchedClose(Opcode),
    #[error("`{0}` is never closed")]
    Unterminated(Opcode),
    #[error("`{0}` outside of a loop or switch")]
    MisplacedBranch(Opcode),
    #[error("call to undefined label l{0}")]
    UnknownLabel(u32),
    #[error("label l{0} is defined twice")]
    DuplicateLabel(u32),
    #[error("label inside an open flow-control block")]
    LabelInsideBlock,
}

/// Top-level failure of one translation call. Every variant is fatal: no text
/// is produced for a program that fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("malformed bytecode: {0}")]
    MalformedBytecode(#[from] DecodeError),
    #[error("unbalanced control flow: {0}")]
    UnbalancedControlFlow(#[from] ControlFlowError),
    #[error("unsupported instruction `{opcode}` at index {inst_index}: {reason}")]
    UnsupportedInstruction {
        inst_index: usize,
        opcode: Opcode,
        reason: String,
    },
    #[error("unresolved binding at index {inst_index}: {what}")]
    UnresolvedBinding { inst_index: usize, what: String },
    #[error("{feature} is not available when targeting {version}")]
    UnsupportedDialectFeature {
        feature: &'static str,
        version: GlslVersion,
        inst_index: Option<usize>,
    },
}
