//! Decoded representation of an SM4/SM5 program.
//!
//! Operands live in an [`OperandArena`] owned by the [`Program`]; instructions,
//! declarations and relative indices refer to them through [`OperandId`]s, so
//! dynamic indexing chains stay flat and acyclic.

use core::ops::Index;

use bitflags::bitflags;

use crate::control_flow::LinkedControlFlow;
use crate::sm4::opcode::Opcode;
use crate::sm4::{ShaderModel, ShaderStage};

/// Upper bound on operands per instruction (`sample_d` uses all six).
pub const MAX_OPERANDS: usize = 6;
pub const MAX_INDEX_DIMENSION: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperandType {
    Temp,
    Input,
    Output,
    IndexableTemp,
    Immediate32,
    Immediate64,
    Sampler,
    Resource,
    ConstantBuffer,
    ImmediateConstantBuffer,
    Label,
    InputPrimitiveId,
    OutputDepth,
    Null,
    Rasterizer,
    OutputCoverageMask,
    Stream,
    FunctionBody,
    FunctionTable,
    Interface,
    FunctionInput,
    FunctionOutput,
    OutputControlPointId,
    InputForkInstanceId,
    InputJoinInstanceId,
    InputControlPoint,
    OutputControlPoint,
    InputPatchConstant,
    InputDomainPoint,
    ThisPointer,
    UnorderedAccessView,
    ThreadGroupSharedMemory,
    InputThreadId,
    InputThreadGroupId,
    InputThreadIdInGroup,
    InputCoverageMask,
    InputThreadIdInGroupFlattened,
    InputGsInstanceId,
    OutputDepthGreaterEqual,
    OutputDepthLessEqual,
    CycleCounter,
    OutputStencilRef,
    InnerCoverage,
}

impl OperandType {
    pub fn from_u32(raw: u32) -> Option<Self> {
        use OperandType::*;
        const TABLE: [OperandType; 43] = [
            Temp,
            Input,
            Output,
            IndexableTemp,
            Immediate32,
            Immediate64,
            Sampler,
            Resource,
            ConstantBuffer,
            ImmediateConstantBuffer,
            Label,
            InputPrimitiveId,
            OutputDepth,
            Null,
            Rasterizer,
            OutputCoverageMask,
            Stream,
            FunctionBody,
            FunctionTable,
            Interface,
            FunctionInput,
            FunctionOutput,
            OutputControlPointId,
            InputForkInstanceId,
            InputJoinInstanceId,
            InputControlPoint,
            OutputControlPoint,
            InputPatchConstant,
            InputDomainPoint,
            ThisPointer,
            UnorderedAccessView,
            ThreadGroupSharedMemory,
            InputThreadId,
            InputThreadGroupId,
            InputThreadIdInGroup,
            InputCoverageMask,
            InputThreadIdInGroupFlattened,
            InputGsInstanceId,
            OutputDepthGreaterEqual,
            OutputDepthLessEqual,
            CycleCounter,
            OutputStencilRef,
            InnerCoverage,
        ];
        TABLE.get(raw as usize).copied()
    }

    pub fn is_immediate(self) -> bool {
        matches!(self, Self::Immediate32 | Self::Immediate64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentCount {
    Zero,
    One,
    Four,
}

impl ComponentCount {
    pub fn count(self) -> usize {
        match self {
            Self::Zero => 0,
            Self::One => 1,
            Self::Four => 4,
        }
    }
}

/// Bit `i` selects component `i` (x=0 .. w=3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WriteMask(pub u8);

impl WriteMask {
    pub const XYZW: Self = Self(0xf);
    pub const X: Self = Self(0x1);

    pub fn contains(self, component: u8) -> bool {
        component < 4 && (self.0 >> component) & 1 != 0
    }

    pub fn count(self) -> usize {
        (self.0 & 0xf).count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 & 0xf == 0
    }

    /// Selected components in ascending order.
    pub fn components(self) -> impl Iterator<Item = u8> {
        (0..4u8).filter(move |&c| self.contains(c))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Swizzle(pub [u8; 4]);

impl Swizzle {
    pub const XYZW: Self = Self([0, 1, 2, 3]);
    pub const XXXX: Self = Self([0, 0, 0, 0]);
}

/// How a four-component operand picks its components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentSelection {
    /// Zero- or one-component operands.
    None,
    Mask(WriteMask),
    Swizzle(Swizzle),
    Select1(u8),
}

impl ComponentSelection {
    /// The component read for lane `i` of the operand.
    ///
    /// For a mask this is the `i`-th selected component (in ascending order),
    /// so `Mask(m).component(i)` for `i in 0..m.count()` lists exactly the
    /// masked components.
    pub fn component(self, i: usize) -> u8 {
        match self {
            Self::None => 0,
            Self::Swizzle(s) => s.0[i & 3],
            Self::Select1(c) => c,
            Self::Mask(m) => m.components().nth(i).unwrap_or(i as u8 & 3),
        }
    }

    /// Write mask implied by the selection (destination operands).
    pub fn mask(self) -> WriteMask {
        match self {
            Self::Mask(m) => m,
            Self::Select1(c) => WriteMask(1 << c),
            Self::Swizzle(_) | Self::None => WriteMask::XYZW,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperandModifier {
    #[default]
    None,
    Neg,
    Abs,
    AbsNeg,
}

/// Position of an operand inside the program's [`OperandArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct OperandId(u32);

impl OperandId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandIndex {
    Imm32(u32),
    Imm64(u64),
    Relative(OperandId),
    Imm32PlusRelative(u32, OperandId),
    Imm64PlusRelative(u64, OperandId),
}

impl Default for OperandIndex {
    fn default() -> Self {
        Self::Imm32(0)
    }
}

impl OperandIndex {
    /// True for a small, non-negative, non-dynamic displacement that can be
    /// emitted as a plain array subscript.
    pub fn is_simple(&self) -> bool {
        matches!(*self, Self::Imm32(v) if v <= i32::MAX as u32)
    }

    pub fn as_imm32(&self) -> Option<u32> {
        match *self {
            Self::Imm32(v) => Some(v),
            _ => None,
        }
    }

    pub fn relative(&self) -> Option<OperandId> {
        match *self {
            Self::Relative(id) | Self::Imm32PlusRelative(_, id) | Self::Imm64PlusRelative(_, id) => {
                Some(id)
            }
            Self::Imm32(_) | Self::Imm64(_) => None,
        }
    }

    pub fn is_64bit(&self) -> bool {
        matches!(self, Self::Imm64(_) | Self::Imm64PlusRelative(..))
    }
}

/// Up to three index expressions, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexChain {
    slots: [OperandIndex; MAX_INDEX_DIMENSION],
    len: u8,
}

impl IndexChain {
    pub fn push(&mut self, index: OperandIndex) -> bool {
        if usize::from(self.len) >= MAX_INDEX_DIMENSION {
            return false;
        }
        self.slots[usize::from(self.len)] = index;
        self.len += 1;
        true
    }

    pub fn as_slice(&self) -> &[OperandIndex] {
        &self.slots[..usize::from(self.len)]
    }

    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, i: usize) -> Option<&OperandIndex> {
        self.as_slice().get(i)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Immediate {
    /// One or four 32-bit lanes; unused lanes are zero.
    U32 { values: [u32; 4], count: u8 },
    /// One or two 64-bit lanes (a 4-component 64-bit immediate fills xy/zw).
    U64 { values: [u64; 2], count: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    pub ty: OperandType,
    pub num_components: ComponentCount,
    pub selection: ComponentSelection,
    pub indices: IndexChain,
    pub modifier: OperandModifier,
    pub non_uniform: bool,
    pub min_precision: u8,
    pub immediate: Option<Immediate>,
}

impl Operand {
    /// `GetComponentSelector`: the component read by lane `i`.
    pub fn component(&self, i: usize) -> u8 {
        self.selection.component(i)
    }

    /// First index as a plain register number, when it is static.
    pub fn register(&self) -> Option<u32> {
        self.indices.get(0).and_then(OperandIndex::as_imm32)
    }

    pub fn write_mask(&self) -> WriteMask {
        match self.num_components {
            ComponentCount::Zero => WriteMask(0),
            ComponentCount::One => WriteMask::X,
            ComponentCount::Four => self.selection.mask(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OperandArena {
    operands: Vec<Operand>,
}

impl OperandArena {
    pub fn push(&mut self, operand: Operand) -> OperandId {
        let id = OperandId(self.operands.len() as u32);
        self.operands.push(operand);
        id
    }

    pub fn get(&self, id: OperandId) -> Option<&Operand> {
        self.operands.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.operands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operands.is_empty()
    }
}

impl Index<OperandId> for OperandArena {
    type Output = Operand;

    fn index(&self, id: OperandId) -> &Operand {
        &self.operands[id.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestBoolean {
    Zero,
    NonZero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResInfoReturnType {
    Float,
    RcpFloat,
    Uint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceDimension {
    Unknown,
    Buffer,
    Texture1D,
    Texture2D,
    Texture2DMs,
    Texture3D,
    TextureCube,
    Texture1DArray,
    Texture2DArray,
    Texture2DMsArray,
    TextureCubeArray,
    RawBuffer,
    StructuredBuffer,
}

impl ResourceDimension {
    pub fn from_u32(raw: u32) -> Option<Self> {
        use ResourceDimension::*;
        Some(match raw {
            0 => Unknown,
            1 => Buffer,
            2 => Texture1D,
            3 => Texture2D,
            4 => Texture2DMs,
            5 => Texture3D,
            6 => TextureCube,
            7 => Texture1DArray,
            8 => Texture2DArray,
            9 => Texture2DMsArray,
            10 => TextureCubeArray,
            11 => RawBuffer,
            12 => StructuredBuffer,
            _ => return None,
        })
    }

    /// Number of coordinate components a sample needs (array slice included).
    pub fn coord_count(self) -> usize {
        use ResourceDimension::*;
        match self {
            Buffer | Texture1D | RawBuffer | StructuredBuffer | Unknown => 1,
            Texture2D | Texture2DMs | Texture1DArray => 2,
            Texture3D | TextureCube | Texture2DArray | Texture2DMsArray => 3,
            TextureCubeArray => 4,
        }
    }

    /// Number of texel-offset / integer-size components (array slice excluded).
    pub fn offset_count(self) -> usize {
        use ResourceDimension::*;
        match self {
            Buffer | Texture1D | Texture1DArray | RawBuffer | StructuredBuffer | Unknown => 1,
            Texture2D | Texture2DMs | Texture2DArray | Texture2DMsArray => 2,
            Texture3D | TextureCube | TextureCubeArray => 3,
        }
    }

    pub fn is_array(self) -> bool {
        use ResourceDimension::*;
        matches!(
            self,
            Texture1DArray | Texture2DArray | Texture2DMsArray | TextureCubeArray
        )
    }

    pub fn is_multisampled(self) -> bool {
        matches!(self, Self::Texture2DMs | Self::Texture2DMsArray)
    }
}

/// `D3D10_SB_RESOURCE_RETURN_TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReturnType {
    Unorm,
    Snorm,
    Sint,
    Uint,
    Float,
    Mixed,
    Double,
    Continued,
    Unused,
}

impl ReturnType {
    pub fn from_u32(raw: u32) -> Option<Self> {
        use ReturnType::*;
        Some(match raw {
            1 => Unorm,
            2 => Snorm,
            3 => Sint,
            4 => Uint,
            5 => Float,
            6 => Mixed,
            7 => Double,
            8 => Continued,
            9 => Unused,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerMode {
    Default,
    Comparison,
    Mono,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterpolationMode {
    Undefined,
    Constant,
    Linear,
    LinearCentroid,
    LinearNoPerspective,
    LinearNoPerspectiveCentroid,
    LinearSample,
    LinearNoPerspectiveSample,
}

impl InterpolationMode {
    pub fn from_u32(raw: u32) -> Option<Self> {
        use InterpolationMode::*;
        Some(match raw {
            0 => Undefined,
            1 => Constant,
            2 => Linear,
            3 => LinearCentroid,
            4 => LinearNoPerspective,
            5 => LinearNoPerspectiveCentroid,
            6 => LinearSample,
            7 => LinearNoPerspectiveSample,
            _ => return None,
        })
    }
}

/// System-value names shared by `dcl_*_siv` tokens (`D3D10_SB_NAME`) and
/// signature entries (`D3D_NAME`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SystemValue {
    Undefined,
    Position,
    ClipDistance,
    CullDistance,
    RenderTargetArrayIndex,
    ViewportArrayIndex,
    VertexId,
    PrimitiveId,
    InstanceId,
    IsFrontFace,
    SampleIndex,
    FinalQuadEdgeTessFactor,
    FinalQuadInsideTessFactor,
    FinalTriEdgeTessFactor,
    FinalTriInsideTessFactor,
    FinalLineDetailTessFactor,
    FinalLineDensityTessFactor,
    Target,
    Depth,
    Coverage,
    DepthGreaterEqual,
    DepthLessEqual,
    StencilRef,
    InnerCoverage,
}

impl SystemValue {
    pub fn from_u32(raw: u32) -> Option<Self> {
        use SystemValue::*;
        Some(match raw {
            0 => Undefined,
            1 => Position,
            2 => ClipDistance,
            3 => CullDistance,
            4 => RenderTargetArrayIndex,
            5 => ViewportArrayIndex,
            6 => VertexId,
            7 => PrimitiveId,
            8 => InstanceId,
            9 => IsFrontFace,
            10 => SampleIndex,
            11 => FinalQuadEdgeTessFactor,
            12 => FinalQuadInsideTessFactor,
            13 => FinalTriEdgeTessFactor,
            14 => FinalTriInsideTessFactor,
            15 => FinalLineDetailTessFactor,
            16 => FinalLineDensityTessFactor,
            64 => Target,
            65 => Depth,
            66 => Coverage,
            67 => DepthGreaterEqual,
            68 => DepthLessEqual,
            69 => StencilRef,
            70 => InnerCoverage,
            _ => return None,
        })
    }

    /// Decodes the declaration-token encoding, which spells every tess
    /// factor out per edge. Returns the value and its edge/inside index.
    pub fn from_decl_name(raw: u32) -> Option<(Self, u32)> {
        use SystemValue::*;
        Some(match raw {
            11..=14 => (FinalQuadEdgeTessFactor, raw - 11),
            15 | 16 => (FinalQuadInsideTessFactor, raw - 15),
            17..=19 => (FinalTriEdgeTessFactor, raw - 17),
            20 => (FinalTriInsideTessFactor, 0),
            21 => (FinalLineDetailTessFactor, 0),
            22 => (FinalLineDensityTessFactor, 0),
            23..=63 => return None,
            other => (Self::from_u32(other)?, 0),
        })
    }

    pub fn is_edge_tess_factor(self) -> bool {
        matches!(
            self,
            Self::FinalQuadEdgeTessFactor
                | Self::FinalTriEdgeTessFactor
                | Self::FinalLineDetailTessFactor
                | Self::FinalLineDensityTessFactor
        )
    }

    pub fn is_inside_tess_factor(self) -> bool {
        matches!(
            self,
            Self::FinalQuadInsideTessFactor | Self::FinalTriInsideTessFactor
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputPrimitive {
    Point,
    Line,
    Triangle,
    LineAdj,
    TriangleAdj,
    Patch(u32),
}

impl InputPrimitive {
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            1 => Self::Point,
            2 => Self::Line,
            3 => Self::Triangle,
            6 => Self::LineAdj,
            7 => Self::TriangleAdj,
            8..=39 => Self::Patch(raw - 7),
            _ => return None,
        })
    }

    pub fn vertex_count(self) -> u32 {
        match self {
            Self::Point => 1,
            Self::Line => 2,
            Self::Triangle => 3,
            Self::LineAdj => 4,
            Self::TriangleAdj => 6,
            Self::Patch(n) => n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    PointList,
    LineStrip,
    TriangleStrip,
}

impl PrimitiveTopology {
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            1 => Self::PointList,
            2 | 3 => Self::LineStrip,
            4 | 5 => Self::TriangleStrip,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TessDomain {
    Isoline,
    Triangle,
    Quad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TessPartitioning {
    #[default]
    Integer,
    Pow2,
    FractionalOdd,
    FractionalEven,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TessOutputPrimitive {
    Point,
    Line,
    TriangleCw,
    #[default]
    TriangleCcw,
}

bitflags! {
    /// `sync` flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SyncFlags: u32 {
        const THREADS_IN_GROUP = 1 << 0;
        const SHARED_MEMORY = 1 << 1;
        const UAV_GROUP = 1 << 2;
        const UAV_GLOBAL = 1 << 3;
    }
}

/// Decoded `_aoffimmi` / extended-token record of a sampling instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleControls {
    pub saturate: bool,
    /// Immediate texel offsets (u, v, w).
    pub offsets: Option<[i8; 3]>,
    pub resource_dim: Option<ResourceDimension>,
    pub structure_stride: Option<u32>,
    /// Per-component return type, used to pick `int`/`uint`/`float` overloads.
    pub return_type: Option<[ReturnType; 4]>,
}

/// Category-specific fields of an instruction. The decoder picks the variant
/// from [`crate::sm4::opcode::OpcodeClass`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstKind {
    Alu { saturate: bool, precise_mask: u8 },
    Conditional { test: TestBoolean },
    Sample(SampleControls),
    ResInfo { return_type: ResInfoReturnType, saturate: bool },
    SampleInfo { uint_result: bool, saturate: bool },
    Sync(SyncFlags),
    InterfaceCall { function_index: u32 },
    Flow,
    PhaseMarker,
}

impl InstKind {
    pub fn saturate(&self) -> bool {
        match *self {
            Self::Alu { saturate, .. }
            | Self::ResInfo { saturate, .. }
            | Self::SampleInfo { saturate, .. } => saturate,
            Self::Sample(controls) => controls.saturate,
            _ => false,
        }
    }

    pub fn test(&self) -> Option<TestBoolean> {
        match *self {
            Self::Conditional { test } => Some(test),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub kind: InstKind,
    operands: [OperandId; MAX_OPERANDS],
    num_ops: u8,
    /// Absolute DWORD offset of the opcode token.
    pub at_dword: usize,
}

impl Instruction {
    pub fn new(opcode: Opcode, kind: InstKind, at_dword: usize) -> Self {
        Self {
            opcode,
            kind,
            operands: [OperandId::default(); MAX_OPERANDS],
            num_ops: 0,
            at_dword,
        }
    }

    /// Returns false once the instruction already holds [`MAX_OPERANDS`].
    pub fn push_operand(&mut self, id: OperandId) -> bool {
        if usize::from(self.num_ops) >= MAX_OPERANDS {
            return false;
        }
        self.operands[usize::from(self.num_ops)] = id;
        self.num_ops += 1;
        true
    }

    pub fn operands(&self) -> &[OperandId] {
        &self.operands[..usize::from(self.num_ops)]
    }

    pub fn num_ops(&self) -> usize {
        usize::from(self.num_ops)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclKind {
    Resource {
        slot: u32,
        dim: ResourceDimension,
        sample_count: u32,
        return_type: [ReturnType; 4],
    },
    ConstantBuffer {
        slot: u32,
        size_vec4: u32,
        dynamic: bool,
    },
    Sampler {
        slot: u32,
        mode: SamplerMode,
    },
    IndexRange {
        operand: OperandId,
        count: u32,
    },
    GsOutputTopology(PrimitiveTopology),
    GsInputPrimitive(InputPrimitive),
    MaxOutputVertexCount(u32),
    Input {
        operand: OperandId,
        system_value: Option<SystemValue>,
        /// Edge or inside index of a tessellation-factor system value.
        sv_index: u32,
        interpolation: Option<InterpolationMode>,
    },
    Output {
        operand: OperandId,
        system_value: Option<SystemValue>,
        sv_index: u32,
    },
    Temps(u32),
    IndexableTemp {
        index: u32,
        count: u32,
        components: u32,
    },
    GlobalFlags(u32),
    Stream(u32),
    FunctionBody(u32),
    FunctionTable {
        index: u32,
        bodies: Vec<u32>,
    },
    Interface {
        index: u32,
        array_len: u32,
        tables: Vec<u32>,
    },
    InputControlPointCount(u32),
    OutputControlPointCount(u32),
    TessDomain(TessDomain),
    TessPartitioning(TessPartitioning),
    TessOutputPrimitive(TessOutputPrimitive),
    HsMaxTessFactor(f32),
    HsForkPhaseInstanceCount(u32),
    HsJoinPhaseInstanceCount(u32),
    ThreadGroup([u32; 3]),
    UavTyped {
        slot: u32,
        dim: ResourceDimension,
        return_type: [ReturnType; 4],
        globally_coherent: bool,
    },
    UavRaw {
        slot: u32,
        globally_coherent: bool,
    },
    UavStructured {
        slot: u32,
        stride: u32,
        has_counter: bool,
        globally_coherent: bool,
    },
    TgsmRaw {
        slot: u32,
        byte_count: u32,
    },
    TgsmStructured {
        slot: u32,
        stride: u32,
        count: u32,
    },
    ResourceRaw {
        slot: u32,
    },
    ResourceStructured {
        slot: u32,
        stride: u32,
    },
    GsInstanceCount(u32),
    HsDecls,
    /// Raw little-endian payload of an immediate constant buffer.
    ImmediateConstantBuffer(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub kind: DeclKind,
    pub at_dword: usize,
    /// Number of instructions decoded before this declaration. Hull-shader
    /// phases interleave declarations with instructions; this places each
    /// declaration in its phase.
    pub inst_pos: usize,
}

/// `D3D_REGISTER_COMPONENT_TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ComponentType {
    #[default]
    Float32,
    Uint32,
    Sint32,
}

impl ComponentType {
    pub fn from_u32(raw: u32) -> Self {
        match raw {
            1 => Self::Uint32,
            2 => Self::Sint32,
            _ => Self::Float32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureEntry {
    pub semantic_name: String,
    pub semantic_index: u32,
    pub register: u32,
    pub system_value: SystemValue,
    pub component_type: ComponentType,
    pub mask: WriteMask,
    pub read_write_mask: WriteMask,
    pub stream: u32,
    /// Filled from `dcl_input_ps*` when the signature is attached.
    pub interpolation: Option<InterpolationMode>,
}

impl SignatureEntry {
    pub fn new(semantic_name: &str, semantic_index: u32, register: u32, mask: u8) -> Self {
        Self {
            semantic_name: semantic_name.to_owned(),
            semantic_index,
            register,
            system_value: SystemValue::Undefined,
            component_type: ComponentType::Float32,
            mask: WriteMask(mask),
            read_write_mask: WriteMask(mask),
            stream: 0,
            interpolation: None,
        }
    }

    pub fn with_system_value(mut self, system_value: SystemValue) -> Self {
        self.system_value = system_value;
        self
    }

    pub fn with_component_type(mut self, component_type: ComponentType) -> Self {
        self.component_type = component_type;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableClass {
    Scalar,
    Vector,
    MatrixRows,
    MatrixColumns,
    /// Structs and anything else accessed through raw registers.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Bool,
    Int,
    Uint,
    Float,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableType {
    pub class: VariableClass,
    pub base: BaseType,
    pub rows: u32,
    pub columns: u32,
    /// Array length, 0 for non-arrays.
    pub elements: u32,
}

impl VariableType {
    pub fn scalar(base: BaseType) -> Self {
        Self {
            class: VariableClass::Scalar,
            base,
            rows: 1,
            columns: 1,
            elements: 0,
        }
    }

    pub fn vector(base: BaseType, columns: u32) -> Self {
        Self {
            class: VariableClass::Vector,
            columns,
            ..Self::scalar(base)
        }
    }

    pub fn matrix(base: BaseType, rows: u32, columns: u32, row_major: bool) -> Self {
        Self {
            class: if row_major {
                VariableClass::MatrixRows
            } else {
                VariableClass::MatrixColumns
            },
            base,
            rows,
            columns,
            elements: 0,
        }
    }

    pub fn array(mut self, elements: u32) -> Self {
        self.elements = elements;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CbVariable {
    pub name: String,
    /// Byte offset inside the constant buffer.
    pub offset: u32,
    pub size: u32,
    pub ty: VariableType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantBufferDesc {
    pub name: String,
    pub bind_point: u32,
    pub size: u32,
    pub variables: Vec<CbVariable>,
}

/// `D3D_SHADER_INPUT_TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    ConstantBuffer,
    TextureBuffer,
    Texture,
    Sampler,
    UavTyped,
    Structured,
    UavStructured,
    ByteAddress,
    UavByteAddress,
    UavAppendStructured,
    UavConsumeStructured,
    UavStructuredWithCounter,
}

impl BindingKind {
    pub fn from_u32(raw: u32) -> Option<Self> {
        use BindingKind::*;
        Some(match raw {
            0 => ConstantBuffer,
            1 => TextureBuffer,
            2 => Texture,
            3 => Sampler,
            4 => UavTyped,
            5 => Structured,
            6 => UavStructured,
            7 => ByteAddress,
            8 => UavByteAddress,
            9 => UavAppendStructured,
            10 => UavConsumeStructured,
            11 => UavStructuredWithCounter,
            _ => return None,
        })
    }

    pub fn is_uav(self) -> bool {
        use BindingKind::*;
        matches!(
            self,
            UavTyped
                | UavStructured
                | UavByteAddress
                | UavAppendStructured
                | UavConsumeStructured
                | UavStructuredWithCounter
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBinding {
    pub name: String,
    pub kind: BindingKind,
    pub bind_point: u32,
    pub bind_count: u32,
    /// Raw `D3D_SRV_DIMENSION` as reported by reflection.
    pub dimension: u32,
}

/// Stage-wide metadata gathered from declarations.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StageInfo {
    pub gs_input_primitive: Option<InputPrimitive>,
    pub gs_output_topology: Option<PrimitiveTopology>,
    pub gs_max_output_vertices: Option<u32>,
    pub gs_instance_count: Option<u32>,
    pub tess_domain: Option<TessDomain>,
    pub tess_partitioning: Option<TessPartitioning>,
    pub tess_output_primitive: Option<TessOutputPrimitive>,
    pub input_control_points: Option<u32>,
    pub output_control_points: Option<u32>,
    pub max_tess_factor: Option<f32>,
    pub thread_group: Option<[u32; 3]>,
    pub global_flags: u32,
}

/// A fully decoded shader program plus the tables the code generator
/// resolves bindings against.
#[derive(Debug, Clone)]
pub struct Program {
    pub stage: ShaderStage,
    pub model: ShaderModel,
    pub declarations: Vec<Declaration>,
    pub instructions: Vec<Instruction>,
    pub operands: OperandArena,
    pub input_signature: Vec<SignatureEntry>,
    pub output_signature: Vec<SignatureEntry>,
    pub patch_constant_signature: Vec<SignatureEntry>,
    pub constant_buffers: Vec<ConstantBufferDesc>,
    pub resource_bindings: Vec<ResourceBinding>,
    pub stage_info: StageInfo,
    /// Set by [`Program::link`].
    pub control_flow: Option<LinkedControlFlow>,
}

impl Program {
    pub fn operand(&self, id: OperandId) -> &Operand {
        &self.operands[id]
    }

    /// Operands of instruction `inst`, resolved through the arena.
    pub fn inst_operands<'a>(&'a self, inst: &'a Instruction) -> impl Iterator<Item = &'a Operand> + 'a {
        inst.operands().iter().map(move |&id| &self.operands[id])
    }

    /// Attaches input/output/patch-constant signatures. Input entries pick
    /// up the interpolation mode of the `dcl_input_ps*` covering their
    /// register.
    pub fn with_signatures(
        mut self,
        inputs: Vec<SignatureEntry>,
        outputs: Vec<SignatureEntry>,
        patch_constants: Vec<SignatureEntry>,
    ) -> Self {
        let mut inputs = inputs;
        for entry in &mut inputs {
            if entry.interpolation.is_none() {
                entry.interpolation = self.input_interpolation(entry.register);
            }
        }
        self.input_signature = inputs;
        self.output_signature = outputs;
        self.patch_constant_signature = patch_constants;
        self
    }

    pub fn with_constant_buffers(mut self, cbuffers: Vec<ConstantBufferDesc>) -> Self {
        self.constant_buffers = cbuffers;
        self
    }

    pub fn with_resource_bindings(mut self, bindings: Vec<ResourceBinding>) -> Self {
        self.resource_bindings = bindings;
        self
    }

    fn input_interpolation(&self, register: u32) -> Option<InterpolationMode> {
        self.declarations.iter().find_map(|decl| match decl.kind {
            DeclKind::Input {
                operand,
                interpolation: Some(mode),
                ..
            } => {
                let op = &self.operands[operand];
                let reg = op.indices.as_slice().last().and_then(OperandIndex::as_imm32);
                (reg == Some(register)).then_some(mode)
            }
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_selection_lists_components_in_order() {
        let sel = ComponentSelection::Mask(WriteMask(0b1010));
        assert_eq!(sel.component(0), 1);
        assert_eq!(sel.component(1), 3);
        assert_eq!(sel.mask().count(), 2);
    }

    #[test]
    fn only_small_immediates_are_simple() {
        assert!(OperandIndex::Imm32(7).is_simple());
        assert!(!OperandIndex::Imm32(u32::MAX).is_simple());
        assert!(!OperandIndex::Imm64(1).is_simple());
        assert!(!OperandIndex::Relative(OperandId::default()).is_simple());
    }

    #[test]
    fn instruction_operand_capacity_is_bounded() {
        let mut inst = Instruction::new(Opcode::SampleD, InstKind::Flow, 0);
        for _ in 0..MAX_OPERANDS {
            assert!(inst.push_operand(OperandId::default()));
        }
        assert!(!inst.push_operand(OperandId::default()));
        assert_eq!(inst.num_ops(), MAX_OPERANDS);
    }
}
