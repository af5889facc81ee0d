//! SM4/SM5 opcode numbering and token bit layout.
//!
//! Numbering follows `D3D10_SB_OPCODE_TYPE` / `D3D11_SB_OPCODE_TYPE`.

use core::fmt;

macro_rules! opcode_table {
    ($($variant:ident = $value:literal => $text:literal,)*) => {
        /// Every opcode the SM4/SM5 token format defines.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Opcode {
            $($variant,)*
        }

        impl Opcode {
            pub fn from_u32(raw: u32) -> Option<Self> {
                match raw {
                    $($value => Some(Self::$variant),)*
                    _ => None,
                }
            }

            pub fn raw(self) -> u32 {
                match self {
                    $(Self::$variant => $value,)*
                }
            }

            /// Assembly mnemonic as printed by the D3D disassembler.
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)*
                }
            }
        }
    };
}

opcode_table! {
    Add = 0 => "add",
    And = 1 => "and",
    Break = 2 => "break",
    Breakc = 3 => "breakc",
    Call = 4 => "call",
    Callc = 5 => "callc",
    Case = 6 => "case",
    Continue = 7 => "continue",
    Continuec = 8 => "continuec",
    Cut = 9 => "cut",
    Default = 10 => "default",
    DerivRtx = 11 => "deriv_rtx",
    DerivRty = 12 => "deriv_rty",
    Discard = 13 => "discard",
    Div = 14 => "div",
    Dp2 = 15 => "dp2",
    Dp3 = 16 => "dp3",
    Dp4 = 17 => "dp4",
    Else = 18 => "else",
    Emit = 19 => "emit",
    EmitThenCut = 20 => "emit_then_cut",
    EndIf = 21 => "endif",
    EndLoop = 22 => "endloop",
    EndSwitch = 23 => "endswitch",
    Eq = 24 => "eq",
    Exp = 25 => "exp",
    Frc = 26 => "frc",
    Ftoi = 27 => "ftoi",
    Ftou = 28 => "ftou",
    Ge = 29 => "ge",
    Iadd = 30 => "iadd",
    If = 31 => "if",
    Ieq = 32 => "ieq",
    Ige = 33 => "ige",
    Ilt = 34 => "ilt",
    Imad = 35 => "imad",
    Imax = 36 => "imax",
    Imin = 37 => "imin",
    Imul = 38 => "imul",
    Ine = 39 => "ine",
    Ineg = 40 => "ineg",
    Ishl = 41 => "ishl",
    Ishr = 42 => "ishr",
    Itof = 43 => "itof",
    Label = 44 => "label",
    Ld = 45 => "ld",
    LdMs = 46 => "ld_ms",
    Log = 47 => "log",
    Loop = 48 => "loop",
    Lt = 49 => "lt",
    Mad = 50 => "mad",
    Min = 51 => "min",
    Max = 52 => "max",
    CustomData = 53 => "customdata",
    Mov = 54 => "mov",
    Movc = 55 => "movc",
    Mul = 56 => "mul",
    Ne = 57 => "ne",
    Nop = 58 => "nop",
    Not = 59 => "not",
    Or = 60 => "or",
    ResInfo = 61 => "resinfo",
    Ret = 62 => "ret",
    Retc = 63 => "retc",
    RoundNe = 64 => "round_ne",
    RoundNi = 65 => "round_ni",
    RoundPi = 66 => "round_pi",
    RoundZ = 67 => "round_z",
    Rsq = 68 => "rsq",
    Sample = 69 => "sample",
    SampleC = 70 => "sample_c",
    SampleCLz = 71 => "sample_c_lz",
    SampleL = 72 => "sample_l",
    SampleD = 73 => "sample_d",
    SampleB = 74 => "sample_b",
    Sqrt = 75 => "sqrt",
    Switch = 76 => "switch",
    SinCos = 77 => "sincos",
    Udiv = 78 => "udiv",
    Ult = 79 => "ult",
    Uge = 80 => "uge",
    Umul = 81 => "umul",
    Umad = 82 => "umad",
    Umax = 83 => "umax",
    Umin = 84 => "umin",
    Ushr = 85 => "ushr",
    Utof = 86 => "utof",
    Xor = 87 => "xor",
    DclResource = 88 => "dcl_resource",
    DclConstantBuffer = 89 => "dcl_constantbuffer",
    DclSampler = 90 => "dcl_sampler",
    DclIndexRange = 91 => "dcl_indexrange",
    DclGsOutputPrimitiveTopology = 92 => "dcl_outputtopology",
    DclGsInputPrimitive = 93 => "dcl_inputprimitive",
    DclMaxOutputVertexCount = 94 => "dcl_maxout",
    DclInput = 95 => "dcl_input",
    DclInputSgv = 96 => "dcl_input_sgv",
    DclInputSiv = 97 => "dcl_input_siv",
    DclInputPs = 98 => "dcl_input_ps",
    DclInputPsSgv = 99 => "dcl_input_ps_sgv",
    DclInputPsSiv = 100 => "dcl_input_ps_siv",
    DclOutput = 101 => "dcl_output",
    DclOutputSgv = 102 => "dcl_output_sgv",
    DclOutputSiv = 103 => "dcl_output_siv",
    DclTemps = 104 => "dcl_temps",
    DclIndexableTemp = 105 => "dcl_indexabletemp",
    DclGlobalFlags = 106 => "dcl_globalflags",
    Lod = 108 => "lod",
    Gather4 = 109 => "gather4",
    SamplePos = 110 => "samplepos",
    SampleInfo = 111 => "sampleinfo",
    HsDecls = 113 => "hs_decls",
    HsControlPointPhase = 114 => "hs_control_point_phase",
    HsForkPhase = 115 => "hs_fork_phase",
    HsJoinPhase = 116 => "hs_join_phase",
    EmitStream = 117 => "emit_stream",
    CutStream = 118 => "cut_stream",
    EmitThenCutStream = 119 => "emit_then_cut_stream",
    InterfaceCall = 120 => "fcall",
    BufInfo = 121 => "bufinfo",
    DerivRtxCoarse = 122 => "deriv_rtx_coarse",
    DerivRtxFine = 123 => "deriv_rtx_fine",
    DerivRtyCoarse = 124 => "deriv_rty_coarse",
    DerivRtyFine = 125 => "deriv_rty_fine",
    Gather4C = 126 => "gather4_c",
    Gather4Po = 127 => "gather4_po",
    Gather4PoC = 128 => "gather4_po_c",
    Rcp = 129 => "rcp",
    F32ToF16 = 130 => "f32tof16",
    F16ToF32 = 131 => "f16tof32",
    Uaddc = 132 => "uaddc",
    Usubb = 133 => "usubb",
    CountBits = 134 => "countbits",
    FirstBitHi = 135 => "firstbit_hi",
    FirstBitLo = 136 => "firstbit_lo",
    FirstBitShi = 137 => "firstbit_shi",
    Ubfe = 138 => "ubfe",
    Ibfe = 139 => "ibfe",
    Bfi = 140 => "bfi",
    Bfrev = 141 => "bfrev",
    Swapc = 142 => "swapc",
    DclStream = 143 => "dcl_stream",
    DclFunctionBody = 144 => "dcl_function_body",
    DclFunctionTable = 145 => "dcl_function_table",
    DclInterface = 146 => "dcl_interface",
    DclInputControlPointCount = 147 => "dcl_input_control_point_count",
    DclOutputControlPointCount = 148 => "dcl_output_control_point_count",
    DclTessDomain = 149 => "dcl_tessellator_domain",
    DclTessPartitioning = 150 => "dcl_tessellator_partitioning",
    DclTessOutputPrimitive = 151 => "dcl_tessellator_output_primitive",
    DclHsMaxTessFactor = 152 => "dcl_hs_max_tessfactor",
    DclHsForkPhaseInstanceCount = 153 => "dcl_hs_fork_phase_instance_count",
    DclHsJoinPhaseInstanceCount = 154 => "dcl_hs_join_phase_instance_count",
    DclThreadGroup = 155 => "dcl_thread_group",
    DclUavTyped = 156 => "dcl_uav_typed",
    DclUavRaw = 157 => "dcl_uav_raw",
    DclUavStructured = 158 => "dcl_uav_structured",
    DclTgsmRaw = 159 => "dcl_tgsm_raw",
    DclTgsmStructured = 160 => "dcl_tgsm_structured",
    DclResourceRaw = 161 => "dcl_resource_raw",
    DclResourceStructured = 162 => "dcl_resource_structured",
    LdUavTyped = 163 => "ld_uav_typed",
    StoreUavTyped = 164 => "store_uav_typed",
    LdRaw = 165 => "ld_raw",
    StoreRaw = 166 => "store_raw",
    LdStructured = 167 => "ld_structured",
    StoreStructured = 168 => "store_structured",
    AtomicAnd = 169 => "atomic_and",
    AtomicOr = 170 => "atomic_or",
    AtomicXor = 171 => "atomic_xor",
    AtomicCmpStore = 172 => "atomic_cmp_store",
    AtomicIadd = 173 => "atomic_iadd",
    AtomicImax = 174 => "atomic_imax",
    AtomicImin = 175 => "atomic_imin",
    AtomicUmax = 176 => "atomic_umax",
    AtomicUmin = 177 => "atomic_umin",
    ImmAtomicAlloc = 178 => "imm_atomic_alloc",
    ImmAtomicConsume = 179 => "imm_atomic_consume",
    ImmAtomicIadd = 180 => "imm_atomic_iadd",
    ImmAtomicAnd = 181 => "imm_atomic_and",
    ImmAtomicOr = 182 => "imm_atomic_or",
    ImmAtomicXor = 183 => "imm_atomic_xor",
    ImmAtomicExch = 184 => "imm_atomic_exch",
    ImmAtomicCmpExch = 185 => "imm_atomic_cmp_exch",
    ImmAtomicImax = 186 => "imm_atomic_imax",
    ImmAtomicImin = 187 => "imm_atomic_imin",
    ImmAtomicUmax = 188 => "imm_atomic_umax",
    ImmAtomicUmin = 189 => "imm_atomic_umin",
    Sync = 190 => "sync",
    Dadd = 191 => "dadd",
    Dmax = 192 => "dmax",
    Dmin = 193 => "dmin",
    Dmul = 194 => "dmul",
    Deq = 195 => "deq",
    Dge = 196 => "dge",
    Dlt = 197 => "dlt",
    Dne = 198 => "dne",
    Dmov = 199 => "dmov",
    Dmovc = 200 => "dmovc",
    Dtof = 201 => "dtof",
    Ftod = 202 => "ftod",
    EvalSnapped = 203 => "eval_snapped",
    EvalSampleIndex = 204 => "eval_sample_index",
    EvalCentroid = 205 => "eval_centroid",
    DclGsInstanceCount = 206 => "dcl_gsinstances",
    Abort = 207 => "abort",
    DebugBreak = 208 => "debug_break",
    Ddiv = 210 => "ddiv",
    Dfma = 211 => "dfma",
    Drcp = 212 => "drcp",
    Msad = 213 => "msad",
    Dtoi = 214 => "dtoi",
    Dtou = 215 => "dtou",
    Itod = 216 => "itod",
    Utod = 217 => "utod",
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the decoder interprets the opcode-specific bits and trailing DWORDs of
/// an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeClass {
    /// `dcl_*` tokens, `hs_decls` and `customdata`.
    Declaration,
    /// Ordinary operand-only instruction; honours the saturate/precise bits.
    Alu,
    /// Instruction with a zero/non-zero test bit (`if`, `breakc`, `discard`, ...).
    Conditional,
    /// Texture sampling/fetch/gather that may carry texel offsets and
    /// resource-dimension/return-type extended tokens.
    Sample,
    ResInfo,
    SampleInfo,
    Sync,
    /// `fcall`: a function-table index DWORD precedes the operand.
    InterfaceCall,
    /// Structured markers without opcode-specific fields.
    Flow,
    /// Hull-shader phase boundary.
    PhaseMarker,
}

impl Opcode {
    pub fn class(self) -> OpcodeClass {
        use Opcode::*;
        match self {
            CustomData | HsDecls | DclResource | DclConstantBuffer | DclSampler | DclIndexRange
            | DclGsOutputPrimitiveTopology | DclGsInputPrimitive | DclMaxOutputVertexCount
            | DclInput | DclInputSgv | DclInputSiv | DclInputPs | DclInputPsSgv | DclInputPsSiv
            | DclOutput | DclOutputSgv | DclOutputSiv | DclTemps | DclIndexableTemp
            | DclGlobalFlags | DclStream | DclFunctionBody | DclFunctionTable | DclInterface
            | DclInputControlPointCount | DclOutputControlPointCount | DclTessDomain
            | DclTessPartitioning | DclTessOutputPrimitive | DclHsMaxTessFactor
            | DclHsForkPhaseInstanceCount | DclHsJoinPhaseInstanceCount | DclThreadGroup
            | DclUavTyped | DclUavRaw | DclUavStructured | DclTgsmRaw | DclTgsmStructured
            | DclResourceRaw | DclResourceStructured | DclGsInstanceCount => {
                OpcodeClass::Declaration
            }

            If | Breakc | Continuec | Retc | Discard | Callc => OpcodeClass::Conditional,

            Sample | SampleC | SampleCLz | SampleL | SampleD | SampleB | Ld | LdMs | Gather4
            | Gather4C | Gather4Po | Gather4PoC | Lod | LdUavTyped | LdRaw | LdStructured => {
                OpcodeClass::Sample
            }

            ResInfo => OpcodeClass::ResInfo,
            SampleInfo | SamplePos => OpcodeClass::SampleInfo,
            Sync => OpcodeClass::Sync,
            InterfaceCall => OpcodeClass::InterfaceCall,

            Else | EndIf | Loop | EndLoop | Switch | Case | Default | EndSwitch | Break
            | Continue | Ret | Call | Label | Nop | Emit | Cut | EmitThenCut | EmitStream
            | CutStream | EmitThenCutStream | Abort | DebugBreak => OpcodeClass::Flow,

            HsControlPointPhase | HsForkPhase | HsJoinPhase => OpcodeClass::PhaseMarker,

            Add | And | CountBits | DerivRtx | DerivRty | DerivRtxCoarse | DerivRtxFine
            | DerivRtyCoarse | DerivRtyFine | Div | Dp2 | Dp3 | Dp4 | Eq | Exp | Frc | Ftoi
            | Ftou | Ge | Iadd | Ieq | Ige | Ilt | Imad | Imax | Imin | Imul | Ine | Ineg | Ishl
            | Ishr | Itof | Log | Lt | Mad | Min | Max | Mov | Movc | Mul | Ne | Not | Or
            | RoundNe | RoundNi | RoundPi | RoundZ | Rsq | Sqrt | SinCos | Udiv | Ult | Uge
            | Umul | Umad | Umax | Umin | Ushr | Utof | Xor | BufInfo | Rcp | F32ToF16
            | F16ToF32 | Uaddc | Usubb | FirstBitHi | FirstBitLo | FirstBitShi | Ubfe | Ibfe
            | Bfi | Bfrev | Swapc | StoreUavTyped | StoreRaw | StoreStructured | AtomicAnd
            | AtomicOr | AtomicXor | AtomicCmpStore | AtomicIadd | AtomicImax | AtomicImin
            | AtomicUmax | AtomicUmin | ImmAtomicAlloc | ImmAtomicConsume | ImmAtomicIadd
            | ImmAtomicAnd | ImmAtomicOr | ImmAtomicXor | ImmAtomicExch | ImmAtomicCmpExch
            | ImmAtomicImax | ImmAtomicImin | ImmAtomicUmax | ImmAtomicUmin | Dadd | Dmax
            | Dmin | Dmul | Deq | Dge | Dlt | Dne | Dmov | Dmovc | Dtof | Ftod | EvalSnapped
            | EvalSampleIndex | EvalCentroid | Ddiv | Dfma | Drcp | Msad | Dtoi | Dtou | Itod
            | Utod => OpcodeClass::Alu,
        }
    }

    pub fn is_declaration(self) -> bool {
        self.class() == OpcodeClass::Declaration
    }

    /// Number of operands an instruction with this opcode carries, destinations
    /// included. `None` for declarations, whose payload is not operand-shaped.
    pub fn operand_count(self) -> Option<usize> {
        use Opcode::*;
        let n = match self {
            Else | EndIf | Loop | EndLoop | Default | EndSwitch | Break | Continue | Ret | Nop
            | Emit | Cut | EmitThenCut | Abort | DebugBreak | Sync | HsControlPointPhase
            | HsForkPhase | HsJoinPhase => 0,

            If | Breakc | Continuec | Retc | Discard | Switch | Case | Call | Label | EmitStream
            | CutStream | EmitThenCutStream | InterfaceCall => 1,

            Callc | Mov | Not | Ineg | Exp | Log | Frc | Rsq | Sqrt | Rcp | RoundNe | RoundNi | RoundPi
            | RoundZ | Ftoi | Ftou | Itof | Utof | DerivRtx | DerivRty | DerivRtxCoarse
            | DerivRtxFine | DerivRtyCoarse | DerivRtyFine | CountBits | FirstBitHi | FirstBitLo
            | FirstBitShi | Bfrev | F32ToF16 | F16ToF32 | BufInfo | SampleInfo | EvalCentroid
            | ImmAtomicAlloc | ImmAtomicConsume | Dmov | Drcp | Dtof | Ftod | Dtoi | Dtou | Itod
            | Utod => 2,

            Add | And | Or | Xor | Mul | Div | Min | Max | Dp2 | Dp3 | Dp4 | Eq | Ne | Lt | Ge
            | Iadd | Ieq | Ine | Ilt | Ige | Ult | Uge | Imax | Imin | Umax | Umin | Ishl | Ishr
            | Ushr | SinCos | SamplePos | EvalSampleIndex | EvalSnapped | Dadd | Dmax | Dmin
            | Dmul | Ddiv | Deq | Dge | Dlt | Dne | Ld | ResInfo | LdUavTyped | LdRaw
            | StoreUavTyped | StoreRaw | AtomicAnd | AtomicOr | AtomicXor | AtomicIadd
            | AtomicImax | AtomicImin | AtomicUmax | AtomicUmin => 3,

            Mad | Imad | Umad | Movc | Dmovc | Dfma | Msad | Ubfe | Ibfe | Udiv | Imul | Umul
            | Uaddc | Usubb | Sample | Gather4 | Lod | LdMs | LdStructured | StoreStructured
            | AtomicCmpStore | ImmAtomicIadd | ImmAtomicAnd | ImmAtomicOr | ImmAtomicXor
            | ImmAtomicExch | ImmAtomicImax | ImmAtomicImin | ImmAtomicUmax | ImmAtomicUmin => 4,

            Bfi | Swapc | SampleC | SampleCLz | SampleL | SampleB | Gather4C | Gather4Po
            | ImmAtomicCmpExch => 5,

            SampleD | Gather4PoC => 6,

            CustomData | HsDecls | DclResource | DclConstantBuffer | DclSampler | DclIndexRange
            | DclGsOutputPrimitiveTopology | DclGsInputPrimitive | DclMaxOutputVertexCount
            | DclInput | DclInputSgv | DclInputSiv | DclInputPs | DclInputPsSgv | DclInputPsSiv
            | DclOutput | DclOutputSgv | DclOutputSiv | DclTemps | DclIndexableTemp
            | DclGlobalFlags | DclStream | DclFunctionBody | DclFunctionTable | DclInterface
            | DclInputControlPointCount | DclOutputControlPointCount | DclTessDomain
            | DclTessPartitioning | DclTessOutputPrimitive | DclHsMaxTessFactor
            | DclHsForkPhaseInstanceCount | DclHsJoinPhaseInstanceCount | DclThreadGroup
            | DclUavTyped | DclUavRaw | DclUavStructured | DclTgsmRaw | DclTgsmStructured
            | DclResourceRaw | DclResourceStructured | DclGsInstanceCount => return None,
        };
        Some(n)
    }
}

// Opcode token.
pub const OPCODE_TYPE_MASK: u32 = 0x7ff;
pub const OPCODE_LEN_SHIFT: u32 = 24;
pub const OPCODE_LEN_MASK: u32 = 0x7f;
pub const OPCODE_EXTENDED_BIT: u32 = 0x8000_0000;

pub const OPCODE_SATURATE_BIT: u32 = 1 << 13;
pub const OPCODE_TEST_NONZERO_BIT: u32 = 1 << 18;
pub const OPCODE_PRECISE_SHIFT: u32 = 19;
pub const OPCODE_PRECISE_MASK: u32 = 0xf;
pub const OPCODE_RESINFO_RETURN_SHIFT: u32 = 11;
pub const OPCODE_RESINFO_RETURN_MASK: u32 = 0x3;
pub const OPCODE_SAMPLEINFO_UINT_BIT: u32 = 1 << 11;
pub const OPCODE_SYNC_FLAGS_SHIFT: u32 = 11;
pub const OPCODE_SYNC_FLAGS_MASK: u32 = 0xf;

// Opcode-specific declaration fields.
pub const DCL_FIELD_SHIFT: u32 = 11;
pub const DCL_RESOURCE_DIM_MASK: u32 = 0x1f;
pub const DCL_RESOURCE_SAMPLE_COUNT_SHIFT: u32 = 16;
pub const DCL_RESOURCE_SAMPLE_COUNT_MASK: u32 = 0x7f;
pub const DCL_CB_DYNAMIC_BIT: u32 = 1 << 11;
pub const DCL_SAMPLER_MODE_MASK: u32 = 0xf;
pub const DCL_INTERPOLATION_MASK: u32 = 0xf;
pub const DCL_PRIMITIVE_MASK: u32 = 0x3f;
pub const DCL_TOPOLOGY_MASK: u32 = 0x7f;
pub const DCL_CONTROL_POINT_COUNT_MASK: u32 = 0x3f;
pub const DCL_TESS_FIELD_MASK: u32 = 0x7;
pub const DCL_GLOBAL_FLAGS_MASK: u32 = 0x1fff;
pub const DCL_UAV_GLOBALLY_COHERENT_BIT: u32 = 1 << 16;
pub const DCL_UAV_HAS_COUNTER_BIT: u32 = 1 << 23;
pub const CUSTOMDATA_CLASS_SHIFT: u32 = 11;
pub const CUSTOMDATA_CLASS_ICB: u32 = 3;

// Extended opcode token.
pub const EXT_OPCODE_TYPE_MASK: u32 = 0x3f;
pub const EXT_OPCODE_SAMPLE_CONTROLS: u32 = 1;
pub const EXT_OPCODE_RESOURCE_DIM: u32 = 2;
pub const EXT_OPCODE_RESOURCE_RETURN_TYPE: u32 = 3;

// Operand token.
pub const OPERAND_NUM_COMPONENTS_MASK: u32 = 0x3;
pub const OPERAND_SELECTION_MODE_SHIFT: u32 = 2;
pub const OPERAND_SELECTION_MODE_MASK: u32 = 0x3;
pub const OPERAND_COMPONENT_SELECT_SHIFT: u32 = 4;
pub const OPERAND_TYPE_SHIFT: u32 = 12;
pub const OPERAND_TYPE_MASK: u32 = 0xff;
pub const OPERAND_INDEX_DIMENSION_SHIFT: u32 = 20;
pub const OPERAND_INDEX_DIMENSION_MASK: u32 = 0x3;
pub const OPERAND_INDEX_REP_SHIFTS: [u32; 3] = [22, 25, 28];
pub const OPERAND_INDEX_REP_MASK: u32 = 0x7;
pub const OPERAND_EXTENDED_BIT: u32 = 0x8000_0000;

pub const OPERAND_SEL_MASK: u32 = 0;
pub const OPERAND_SEL_SWIZZLE: u32 = 1;
pub const OPERAND_SEL_SELECT1: u32 = 2;

// Extended operand token.
pub const EXT_OPERAND_TYPE_MASK: u32 = 0x3f;
pub const EXT_OPERAND_MODIFIER: u32 = 1;
pub const EXT_OPERAND_MODIFIER_SHIFT: u32 = 6;
pub const EXT_OPERAND_MODIFIER_MASK: u32 = 0xff;
pub const EXT_OPERAND_MIN_PRECISION_SHIFT: u32 = 14;
pub const EXT_OPERAND_MIN_PRECISION_MASK: u32 = 0x7;
pub const EXT_OPERAND_NON_UNIFORM_BIT: u32 = 1 << 17;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_round_trip_through_the_table() {
        for raw in 0..0x100 {
            if let Some(op) = Opcode::from_u32(raw) {
                assert_eq!(op.raw(), raw, "{op}");
            }
        }
        assert_eq!(Opcode::from_u32(107), None);
        assert_eq!(Opcode::from_u32(209), None);
    }

    #[test]
    fn well_known_numbering() {
        assert_eq!(Opcode::Mov.raw(), 0x36);
        assert_eq!(Opcode::Ret.raw(), 0x3e);
        assert_eq!(Opcode::Sample.raw(), 0x45);
        assert_eq!(Opcode::DclThreadGroup.raw(), 0x9b);
        assert!(Opcode::DclTemps.is_declaration());
        assert!(!Opcode::HsForkPhase.is_declaration());
        assert_eq!(Opcode::If.class(), OpcodeClass::Conditional);
    }

    #[test]
    fn operand_counts_cover_every_instruction() {
        for raw in 0..0x100 {
            let Some(op) = Opcode::from_u32(raw) else { continue };
            assert_eq!(op.operand_count().is_none(), op.is_declaration(), "{op}");
        }
        assert_eq!(Opcode::Mov.operand_count(), Some(2));
        assert_eq!(Opcode::Mad.operand_count(), Some(4));
        assert_eq!(Opcode::EndIf.operand_count(), Some(0));
        assert_eq!(Opcode::SampleD.operand_count(), Some(6));
        assert_eq!(Opcode::ImmAtomicCmpExch.operand_count(), Some(5));
    }
}
