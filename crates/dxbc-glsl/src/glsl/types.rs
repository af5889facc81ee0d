//! GLSL value types, reinterpretation casts and literal formatting.

use crate::dialect::{DialectRules, RuleFlags};
use crate::sm4::opcode::Opcode;
use crate::sm4_ir::{ComponentType, OperandModifier, ReturnType};

/// Arithmetic class of a 32-bit register lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueType {
    Float,
    Int,
    Uint,
}

impl ValueType {
    /// Collapses `Uint` onto `Int` for dialects without unsigned integers.
    pub fn lower(self, rules: &DialectRules) -> Self {
        match self {
            Self::Uint if !rules.has(RuleFlags::UNSIGNED_INTEGERS) => Self::Int,
            other => other,
        }
    }

    pub fn scalar_name(self, rules: &DialectRules) -> &'static str {
        match self.lower(rules) {
            Self::Float => "float",
            Self::Int => "int",
            Self::Uint => "uint",
        }
    }

    /// `float`, `vec2`, `ivec3`, `uvec4`, ...
    pub fn vec_name(self, n: usize, rules: &DialectRules) -> String {
        if n <= 1 {
            return self.scalar_name(rules).to_owned();
        }
        let prefix = match self.lower(rules) {
            Self::Float => "",
            Self::Int => "i",
            Self::Uint => "u",
        };
        format!("{prefix}vec{n}")
    }

    pub fn zero(self, rules: &DialectRules) -> &'static str {
        match self.lower(rules) {
            Self::Float => "0.0",
            Self::Int => "0",
            Self::Uint => "0u",
        }
    }

    pub fn from_component_type(ty: ComponentType) -> Self {
        match ty {
            ComponentType::Float32 => Self::Float,
            ComponentType::Uint32 => Self::Uint,
            ComponentType::Sint32 => Self::Int,
        }
    }

    pub fn from_return_type(ty: ReturnType) -> Self {
        match ty {
            ReturnType::Sint => Self::Int,
            ReturnType::Uint => Self::Uint,
            _ => Self::Float,
        }
    }
}

pub const COMPONENTS: [char; 4] = ['x', 'y', 'z', 'w'];

/// `.xyz`-style selector for `comps`.
pub fn component_selector(comps: &[u8]) -> String {
    let mut s = String::with_capacity(comps.len() + 1);
    s.push('.');
    for &c in comps {
        s.push(COMPONENTS[usize::from(c & 3)]);
    }
    s
}

/// `.x`-style selector for one component.
pub fn single_component_selector(comp: u8) -> String {
    format!(".{}", COMPONENTS[usize::from(comp & 3)])
}

/// Reinterprets `expr` (an `n`-wide value of type `from`) as `to`.
///
/// Dialects with bit casts preserve the bit pattern; older ones fall back to
/// numeric conversion, which is the only reinterpretation they offer.
pub fn cast(expr: &str, from: ValueType, to: ValueType, n: usize, rules: &DialectRules) -> String {
    let from = from.lower(rules);
    let to = to.lower(rules);
    if from == to {
        return expr.to_owned();
    }
    if rules.has(RuleFlags::BIT_CASTS) {
        let func = match (from, to) {
            (ValueType::Float, ValueType::Int) => Some("floatBitsToInt"),
            (ValueType::Float, ValueType::Uint) => Some("floatBitsToUint"),
            (ValueType::Int, ValueType::Float) => Some("intBitsToFloat"),
            (ValueType::Uint, ValueType::Float) => Some("uintBitsToFloat"),
            _ => None,
        };
        if let Some(func) = func {
            return format!("{func}({expr})");
        }
    }
    format!("{}({expr})", to.vec_name(n, rules))
}

/// Formats the 32-bit pattern `bits` as a literal of type `ty`.
pub fn literal(bits: u32, ty: ValueType, rules: &DialectRules) -> String {
    match ty.lower(rules) {
        ValueType::Float => float_literal(bits, rules),
        ValueType::Int => int_literal(bits as i32),
        ValueType::Uint => format!("{bits}u"),
    }
}

pub fn int_literal(v: i32) -> String {
    if v == i32::MIN {
        "(-2147483647 - 1)".to_owned()
    } else {
        v.to_string()
    }
}

fn float_literal(bits: u32, rules: &DialectRules) -> String {
    let v = f32::from_bits(bits);
    if v.is_finite() && (v == 0.0 || v.is_normal()) {
        let mut s = format!("{v:?}");
        if !s.contains(['.', 'e', 'E']) {
            s.push_str(".0");
        }
        return s;
    }
    if rules.has(RuleFlags::BIT_CASTS) {
        return format!("uintBitsToFloat({bits:#010x}u)");
    }
    if v.is_nan() {
        "(0.0 / 0.0)".to_owned()
    } else if v.is_infinite() {
        if v > 0.0 {
            "(1.0 / 0.0)".to_owned()
        } else {
            "(-1.0 / 0.0)".to_owned()
        }
    } else {
        // Denormals flush to zero on every GL target.
        "0.0".to_owned()
    }
}

/// Guesses how an untyped immediate is meant to be read: values that look
/// like ordinary floats are floats, everything else is an integer.
pub fn guess_immediate_type(values: &[u32]) -> ValueType {
    let looks_float = |v: u32| {
        let exp = (v >> 23) & 0xff;
        v & 0x7fff_ffff == 0 || (exp != 0 && exp != 0xff && (100..=154).contains(&exp))
    };
    if values.iter().all(|&v| looks_float(v)) {
        ValueType::Float
    } else {
        ValueType::Int
    }
}

pub fn apply_modifier(expr: String, modifier: OperandModifier, ty: ValueType) -> String {
    match (modifier, ty) {
        (OperandModifier::None, _) => expr,
        (OperandModifier::Neg, _) => format!("-({expr})"),
        (OperandModifier::Abs, ValueType::Uint) => expr,
        (OperandModifier::Abs, _) => format!("abs({expr})"),
        (OperandModifier::AbsNeg, ValueType::Uint) => format!("-({expr})"),
        (OperandModifier::AbsNeg, _) => format!("-abs({expr})"),
    }
}

const RESERVED: &[&str] = &[
    "active", "attribute", "buffer", "centroid", "coherent", "common", "const", "filter",
    "flat", "in", "inout", "input", "invariant", "layout", "out", "output", "patch", "precise",
    "precision", "readonly", "restrict", "sample", "shared", "smooth", "subroutine", "texture",
    "uniform", "varying", "volatile", "writeonly", "main", "bool", "int", "uint", "float",
    "double", "void", "true", "false",
];

/// Turns a reflected HLSL name into a legal GLSL identifier.
pub fn glsl_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    while out.contains("__") {
        out = out.replace("__", "_");
    }
    if out.starts_with("gl_") {
        out.insert(0, '_');
    } else if RESERVED.contains(&out.as_str()) {
        out.push_str("_0");
    }
    out
}

/// Source and result types of an element-wise ALU opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluTypes {
    pub src: ValueType,
    pub dst: ValueType,
}

/// Operand typing of the opcodes that have a fixed arithmetic class. Typeless
/// moves, sampling and memory operations return `None`.
pub fn alu_types(op: Opcode) -> Option<AluTypes> {
    use Opcode::*;
    use ValueType::*;
    let t = |src, dst| Some(AluTypes { src, dst });
    match op {
        Add | Mul | Mad | Div | Min | Max | Frc | Exp | Log | Sqrt | Rsq | Rcp | RoundNe
        | RoundNi | RoundPi | RoundZ | DerivRtx | DerivRty | DerivRtxCoarse | DerivRtxFine
        | DerivRtyCoarse | DerivRtyFine | Dp2 | Dp3 | Dp4 | SinCos => t(Float, Float),
        Eq | Ne | Lt | Ge => t(Float, Int),
        Iadd | Imad | Imax | Imin | Ineg | Ishl | Ishr | Imul | Ibfe => t(Int, Int),
        Ieq | Ine | Ilt | Ige => t(Int, Int),
        Ult | Uge => t(Uint, Int),
        Umul | Umad | Umax | Umin | Ushr | Udiv | Ubfe | Bfi | Bfrev | And | Or | Xor | Not
        | Uaddc | Usubb => t(Uint, Uint),
        CountBits | FirstBitHi | FirstBitLo => t(Uint, Int),
        FirstBitShi => t(Int, Int),
        Itof => t(Int, Float),
        Utof => t(Uint, Float),
        Ftoi => t(Float, Int),
        Ftou => t(Float, Uint),
        F32ToF16 => t(Float, Uint),
        F16ToF32 => t(Uint, Float),
        EvalSnapped | EvalSampleIndex | EvalCentroid => t(Float, Float),
        Deq | Dge | Dlt | Dne | Dtoi => t(Uint, Int),
        Dtou => t(Uint, Uint),
        Dtof => t(Uint, Float),
        Dadd | Dmax | Dmin | Dmul | Dmov | Dmovc | Ddiv | Dfma | Drcp | Ftod | Itod | Utod => {
            t(Uint, Uint)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::GlslVersion;

    #[test]
    fn casts_use_bit_reinterpretation_when_available() {
        let gl33 = DialectRules::for_version(GlslVersion::Gl33);
        assert_eq!(
            cast("r0.xy", ValueType::Float, ValueType::Int, 2, &gl33),
            "floatBitsToInt(r0.xy)"
        );
        assert_eq!(cast("r1", ValueType::Int, ValueType::Uint, 4, &gl33), "uvec4(r1)");

        let es2 = DialectRules::for_version(GlslVersion::Es20);
        assert_eq!(cast("r0.x", ValueType::Float, ValueType::Int, 1, &es2), "int(r0.x)");
        // No unsigned type: uint collapses onto int.
        assert_eq!(cast("r2", ValueType::Int, ValueType::Uint, 4, &es2), "r2");
    }

    #[test]
    fn float_literals_keep_a_decimal_point() {
        let rules = DialectRules::for_version(GlslVersion::Gl33);
        assert_eq!(literal(1.0f32.to_bits(), ValueType::Float, &rules), "1.0");
        assert_eq!(literal((-0.5f32).to_bits(), ValueType::Float, &rules), "-0.5");
        assert_eq!(
            literal(f32::INFINITY.to_bits(), ValueType::Float, &rules),
            "uintBitsToFloat(0x7f800000u)"
        );
        assert_eq!(literal(u32::MAX, ValueType::Int, &rules), "-1");
        assert_eq!(literal(7, ValueType::Uint, &rules), "7u");
    }

    #[test]
    fn immediate_type_guess() {
        assert_eq!(guess_immediate_type(&[0x3f80_0000, 0, 0, 0x3f80_0000]), ValueType::Float);
        assert_eq!(guess_immediate_type(&[1, 2, 3, 4]), ValueType::Int);
        assert_eq!(guess_immediate_type(&[u32::MAX]), ValueType::Int);
    }

    #[test]
    fn reflected_names_become_identifiers() {
        assert_eq!(glsl_identifier("$Globals"), "_Globals");
        assert_eq!(glsl_identifier("texture"), "texture_0");
        assert_eq!(glsl_identifier("gl_Foo"), "_gl_Foo");
        assert_eq!(glsl_identifier("a__b"), "a_b");
        assert_eq!(glsl_identifier("World"), "World");
    }

    #[test]
    fn selectors() {
        assert_eq!(component_selector(&[0, 2, 3]), ".xzw");
        assert_eq!(single_component_selector(1), ".y");
    }
}
