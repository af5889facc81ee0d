//! Instruction and declaration decoding.

use tracing::{debug, trace, warn};

use super::opcode::*;
use super::operand::decode_operand;
use super::reader::{peek_bitfield, TokenReader};
use super::{decode_version_token, ShaderStage};
use crate::error::{DecodeError, DecodeErrorKind};
use crate::sm4_ir::{
    DeclKind, Declaration, InputPrimitive, InstKind, Instruction, InterpolationMode, OperandArena,
    OperandId, PrimitiveTopology, Program, ResInfoReturnType, ResourceDimension, ReturnType,
    SampleControls, SamplerMode, StageInfo, SyncFlags, SystemValue, TessDomain,
    TessOutputPrimitive, TessPartitioning, TestBoolean,
};

/// Decodes a complete SM4/SM5 token stream (version token, length token,
/// then declarations and instructions) into a [`Program`].
///
/// Signatures, constant-buffer descriptions and resource bindings are left
/// empty; attach them with [`Program::with_signatures`] and friends.
pub fn decode_program(tokens: &[u32]) -> Result<Program, DecodeError> {
    let header = |msg| DecodeError::new(0, DecodeErrorKind::InvalidProgramHeader(msg));
    if tokens.len() < 2 {
        return Err(header("missing version/length tokens"));
    }
    let (stage, model) =
        decode_version_token(tokens[0]).ok_or_else(|| header("unknown program type"))?;

    let declared_len = tokens[1] as usize;
    if declared_len < 2 {
        return Err(DecodeError::new(1, DecodeErrorKind::InvalidProgramHeader("declared length below 2")));
    }
    if declared_len > tokens.len() {
        return Err(DecodeError::new(
            1,
            DecodeErrorKind::InstructionLengthMismatch {
                declared: declared_len,
                consumed: tokens.len(),
            },
        ));
    }
    let toks = &tokens[..declared_len];

    let mut decoder = Decoder {
        stage,
        operands: OperandArena::default(),
        declarations: Vec::new(),
        instructions: Vec::new(),
        stage_info: StageInfo::default(),
    };

    let mut pos = 2usize;
    while pos < toks.len() {
        pos += decoder.decode_one(toks, pos)?;
    }

    debug!(
        stage = stage.prefix(),
        model = %model,
        declarations = decoder.declarations.len(),
        instructions = decoder.instructions.len(),
        "decoded shader program"
    );

    Ok(Program {
        stage,
        model,
        declarations: decoder.declarations,
        instructions: decoder.instructions,
        operands: decoder.operands,
        input_signature: Vec::new(),
        output_signature: Vec::new(),
        patch_constant_signature: Vec::new(),
        constant_buffers: Vec::new(),
        resource_bindings: Vec::new(),
        stage_info: decoder.stage_info,
        control_flow: None,
    })
}

struct Decoder {
    stage: ShaderStage,
    operands: OperandArena,
    declarations: Vec<Declaration>,
    instructions: Vec<Instruction>,
    stage_info: StageInfo,
}

impl Decoder {
    /// Decodes the token at `pos` and returns how many DWORDs it spans.
    fn decode_one(&mut self, toks: &[u32], pos: usize) -> Result<usize, DecodeError> {
        let token = toks[pos];
        let raw = token & OPCODE_TYPE_MASK;
        let opcode = Opcode::from_u32(raw)
            .ok_or_else(|| DecodeError::new(pos, DecodeErrorKind::UnknownOpcode(raw)))?;

        if opcode == Opcode::CustomData {
            return self.decode_custom_data(toks, pos, token);
        }

        let len = ((token >> OPCODE_LEN_SHIFT) & OPCODE_LEN_MASK) as usize;
        let available = toks.len() - pos;
        if len == 0 || len > available {
            return Err(DecodeError::new(
                pos,
                DecodeErrorKind::InstructionLengthMismatch {
                    declared: len,
                    consumed: available.min(len.max(1)),
                },
            ));
        }

        let mut r = TokenReader::new(&toks[pos..pos + len], pos);
        r.read_u32()?;
        let result = if opcode.is_declaration() {
            self.decode_declaration(&mut r, opcode, token)
        } else {
            self.decode_instruction(&mut r, opcode, token)
        };
        // Running out of words inside the declared window means the declared
        // length is too short for the operands it announces.
        result.map_err(|err| match err.kind {
            DecodeErrorKind::UnexpectedEndOfStream => DecodeError::new(
                pos,
                DecodeErrorKind::InstructionLengthMismatch {
                    declared: len,
                    consumed: len + 1,
                },
            ),
            _ => err,
        })?;
        r.expect_eof()?;
        Ok(len)
    }

    fn decode_custom_data(&mut self, toks: &[u32], pos: usize, token: u32) -> Result<usize, DecodeError> {
        let len = toks.get(pos + 1).copied().ok_or_else(|| {
            DecodeError::new(pos + 1, DecodeErrorKind::UnexpectedEndOfStream)
        })? as usize;
        let available = toks.len() - pos;
        if len < 2 || len > available {
            return Err(DecodeError::new(
                pos,
                DecodeErrorKind::InstructionLengthMismatch {
                    declared: len,
                    consumed: available,
                },
            ));
        }
        let class = token >> CUSTOMDATA_CLASS_SHIFT;
        if class == CUSTOMDATA_CLASS_ICB {
            let payload = &toks[pos + 2..pos + len];
            let mut bytes = Vec::with_capacity(payload.len() * 4);
            for word in payload {
                bytes.extend_from_slice(&word.to_le_bytes());
            }
            self.push_decl(DeclKind::ImmediateConstantBuffer(bytes), pos);
        } else {
            warn!(class, len, "skipping customdata block of unknown class");
        }
        Ok(len)
    }

    fn push_decl(&mut self, kind: DeclKind, at_dword: usize) {
        self.declarations.push(Declaration {
            kind,
            at_dword,
            inst_pos: self.instructions.len(),
        });
    }

    fn decode_instruction(
        &mut self,
        r: &mut TokenReader<'_>,
        opcode: Opcode,
        token: u32,
    ) -> Result<(), DecodeError> {
        let at = r.at() - 1;
        let controls = decode_extended_opcode(r, token)?;
        let saturate = token & OPCODE_SATURATE_BIT != 0;

        let kind = match opcode.class() {
            OpcodeClass::Alu => InstKind::Alu {
                saturate,
                precise_mask: peek_bitfield(token, OPCODE_PRECISE_SHIFT, 4) as u8,
            },
            OpcodeClass::Conditional => InstKind::Conditional {
                test: if token & OPCODE_TEST_NONZERO_BIT != 0 {
                    TestBoolean::NonZero
                } else {
                    TestBoolean::Zero
                },
            },
            OpcodeClass::Sample => InstKind::Sample(SampleControls {
                saturate,
                ..controls
            }),
            OpcodeClass::ResInfo => InstKind::ResInfo {
                return_type: match peek_bitfield(token, OPCODE_RESINFO_RETURN_SHIFT, 2) {
                    0 => ResInfoReturnType::Float,
                    1 => ResInfoReturnType::RcpFloat,
                    2 => ResInfoReturnType::Uint,
                    other => {
                        return Err(DecodeError::new(
                            at,
                            DecodeErrorKind::MalformedOperand(format!(
                                "resinfo return type {other}"
                            )),
                        ))
                    }
                },
                saturate,
            },
            OpcodeClass::SampleInfo => InstKind::SampleInfo {
                uint_result: token & OPCODE_SAMPLEINFO_UINT_BIT != 0,
                saturate,
            },
            OpcodeClass::Sync => InstKind::Sync(SyncFlags::from_bits_truncate(peek_bitfield(
                token,
                OPCODE_SYNC_FLAGS_SHIFT,
                4,
            ))),
            OpcodeClass::InterfaceCall => InstKind::InterfaceCall {
                function_index: r.read_u32()?,
            },
            OpcodeClass::Flow => InstKind::Flow,
            OpcodeClass::PhaseMarker => InstKind::PhaseMarker,
            OpcodeClass::Declaration => {
                return Err(DecodeError::new(
                    at,
                    DecodeErrorKind::MalformedDeclaration(format!("`{opcode}` decoded as an instruction")),
                ))
            }
        };

        let mut inst = Instruction::new(opcode, kind, at);
        while !r.is_eof() {
            let id = decode_operand(r, &mut self.operands)?;
            if !inst.push_operand(id) {
                return Err(DecodeError::new(
                    at,
                    DecodeErrorKind::TooManyOperands {
                        max: crate::sm4_ir::MAX_OPERANDS,
                    },
                ));
            }
        }
        if let Some(expected) = opcode.operand_count() {
            if inst.num_ops() != expected {
                return Err(DecodeError::new(
                    at,
                    DecodeErrorKind::MalformedOperand(format!(
                        "`{opcode}` takes {expected} operands, found {}",
                        inst.num_ops()
                    )),
                ));
            }
        }
        trace!(opcode = %opcode, at, operands = inst.num_ops(), "decoded instruction");
        self.instructions.push(inst);
        Ok(())
    }

    fn decode_declaration(
        &mut self,
        r: &mut TokenReader<'_>,
        opcode: Opcode,
        token: u32,
    ) -> Result<(), DecodeError> {
        let at = r.at() - 1;
        // Declarations never carry meaningful extended tokens; skip them.
        decode_extended_opcode(r, token)?;
        let field = |width| peek_bitfield(token, DCL_FIELD_SHIFT, width);
        let bad = |msg: String| DecodeError::new(at, DecodeErrorKind::MalformedDeclaration(msg));

        let kind = match opcode {
            Opcode::DclResource => {
                let slot = self.operand_slot(r)?;
                let dim = resource_dim(field(5)).ok_or_else(|| bad(format!("resource dimension {}", field(5))))?;
                let sample_count = peek_bitfield(token, DCL_RESOURCE_SAMPLE_COUNT_SHIFT, 7);
                let return_type = decode_return_type(r.read_u32()?).ok_or_else(|| bad("resource return type".into()))?;
                DeclKind::Resource {
                    slot,
                    dim,
                    sample_count,
                    return_type,
                }
            }
            Opcode::DclConstantBuffer => {
                let id = decode_operand(r, &mut self.operands)?;
                let op = &self.operands[id];
                let (Some(slot), Some(size_vec4)) = (
                    op.indices.get(0).and_then(|i| i.as_imm32()),
                    op.indices.get(1).and_then(|i| i.as_imm32()),
                ) else {
                    return Err(bad("constant buffer needs a static slot and size".into()));
                };
                DeclKind::ConstantBuffer {
                    slot,
                    size_vec4,
                    dynamic: token & DCL_CB_DYNAMIC_BIT != 0,
                }
            }
            Opcode::DclSampler => {
                let slot = self.operand_slot(r)?;
                let mode = match field(4) {
                    0 => SamplerMode::Default,
                    1 => SamplerMode::Comparison,
                    2 => SamplerMode::Mono,
                    other => return Err(bad(format!("sampler mode {other}"))),
                };
                DeclKind::Sampler { slot, mode }
            }
            Opcode::DclIndexRange => {
                let operand = decode_operand(r, &mut self.operands)?;
                DeclKind::IndexRange {
                    operand,
                    count: r.read_u32()?,
                }
            }
            Opcode::DclGsOutputPrimitiveTopology => {
                let topo = PrimitiveTopology::from_u32(field(7))
                    .ok_or_else(|| bad(format!("output topology {}", field(7))))?;
                self.stage_info.gs_output_topology = Some(topo);
                DeclKind::GsOutputTopology(topo)
            }
            Opcode::DclGsInputPrimitive => {
                let prim = InputPrimitive::from_u32(field(6))
                    .ok_or_else(|| bad(format!("input primitive {}", field(6))))?;
                self.stage_info.gs_input_primitive = Some(prim);
                DeclKind::GsInputPrimitive(prim)
            }
            Opcode::DclMaxOutputVertexCount => {
                let count = r.read_u32()?;
                self.stage_info.gs_max_output_vertices = Some(count);
                DeclKind::MaxOutputVertexCount(count)
            }
            Opcode::DclInput | Opcode::DclInputSgv | Opcode::DclInputSiv => {
                let operand = decode_operand(r, &mut self.operands)?;
                let system_value = match opcode {
                    Opcode::DclInput => None,
                    _ => Some(self.read_system_value(r, at)?),
                };
                DeclKind::Input {
                    operand,
                    system_value: system_value.map(|(sv, _)| sv),
                    sv_index: system_value.map_or(0, |(_, i)| i),
                    interpolation: None,
                }
            }
            Opcode::DclInputPs | Opcode::DclInputPsSgv | Opcode::DclInputPsSiv => {
                let interpolation = InterpolationMode::from_u32(field(4))
                    .ok_or_else(|| bad(format!("interpolation mode {}", field(4))))?;
                let operand = decode_operand(r, &mut self.operands)?;
                let system_value = match opcode {
                    Opcode::DclInputPs => None,
                    _ => Some(self.read_system_value(r, at)?),
                };
                DeclKind::Input {
                    operand,
                    system_value: system_value.map(|(sv, _)| sv),
                    sv_index: system_value.map_or(0, |(_, i)| i),
                    interpolation: Some(interpolation),
                }
            }
            Opcode::DclOutput | Opcode::DclOutputSgv | Opcode::DclOutputSiv => {
                let operand = decode_operand(r, &mut self.operands)?;
                let system_value = match opcode {
                    Opcode::DclOutput => None,
                    _ => Some(self.read_system_value(r, at)?),
                };
                DeclKind::Output {
                    operand,
                    system_value: system_value.map(|(sv, _)| sv),
                    sv_index: system_value.map_or(0, |(_, i)| i),
                }
            }
            Opcode::DclTemps => DeclKind::Temps(r.read_u32()?),
            Opcode::DclIndexableTemp => DeclKind::IndexableTemp {
                index: r.read_u32()?,
                count: r.read_u32()?,
                components: r.read_u32()?,
            },
            Opcode::DclGlobalFlags => {
                let flags = field(13);
                self.stage_info.global_flags = flags;
                DeclKind::GlobalFlags(flags)
            }
            Opcode::DclStream => DeclKind::Stream(self.operand_slot(r)?),
            Opcode::DclFunctionBody => DeclKind::FunctionBody(r.read_u32()?),
            Opcode::DclFunctionTable => {
                let index = r.read_u32()?;
                let count = r.read_u32()? as usize;
                let bodies = r.read_slice(count)?.to_vec();
                DeclKind::FunctionTable { index, bodies }
            }
            Opcode::DclInterface => {
                let index = r.read_u32()?;
                let _body_count = r.read_u32()?;
                let packed = r.read_u32()?;
                let table_count = (packed & 0xffff) as usize;
                let tables = r.read_slice(table_count)?.to_vec();
                DeclKind::Interface {
                    index,
                    array_len: packed >> 16,
                    tables,
                }
            }
            Opcode::DclInputControlPointCount => {
                let count = field(6);
                self.stage_info.input_control_points = Some(count);
                DeclKind::InputControlPointCount(count)
            }
            Opcode::DclOutputControlPointCount => {
                let count = field(6);
                self.stage_info.output_control_points = Some(count);
                DeclKind::OutputControlPointCount(count)
            }
            Opcode::DclTessDomain => {
                let domain = match field(2) {
                    1 => TessDomain::Isoline,
                    2 => TessDomain::Triangle,
                    3 => TessDomain::Quad,
                    other => return Err(bad(format!("tessellator domain {other}"))),
                };
                self.stage_info.tess_domain = Some(domain);
                DeclKind::TessDomain(domain)
            }
            Opcode::DclTessPartitioning => {
                let partitioning = match field(3) {
                    1 => TessPartitioning::Integer,
                    2 => TessPartitioning::Pow2,
                    3 => TessPartitioning::FractionalOdd,
                    4 => TessPartitioning::FractionalEven,
                    other => return Err(bad(format!("tessellator partitioning {other}"))),
                };
                self.stage_info.tess_partitioning = Some(partitioning);
                DeclKind::TessPartitioning(partitioning)
            }
            Opcode::DclTessOutputPrimitive => {
                let prim = match field(3) {
                    1 => TessOutputPrimitive::Point,
                    2 => TessOutputPrimitive::Line,
                    3 => TessOutputPrimitive::TriangleCw,
                    4 => TessOutputPrimitive::TriangleCcw,
                    other => return Err(bad(format!("tessellator output primitive {other}"))),
                };
                self.stage_info.tess_output_primitive = Some(prim);
                DeclKind::TessOutputPrimitive(prim)
            }
            Opcode::DclHsMaxTessFactor => {
                let factor = f32::from_bits(r.read_u32()?);
                self.stage_info.max_tess_factor = Some(factor);
                DeclKind::HsMaxTessFactor(factor)
            }
            Opcode::DclHsForkPhaseInstanceCount => DeclKind::HsForkPhaseInstanceCount(r.read_u32()?),
            Opcode::DclHsJoinPhaseInstanceCount => DeclKind::HsJoinPhaseInstanceCount(r.read_u32()?),
            Opcode::DclThreadGroup => {
                let size = [r.read_u32()?, r.read_u32()?, r.read_u32()?];
                self.stage_info.thread_group = Some(size);
                DeclKind::ThreadGroup(size)
            }
            Opcode::DclUavTyped => {
                let slot = self.operand_slot(r)?;
                let dim = resource_dim(field(5)).ok_or_else(|| bad(format!("uav dimension {}", field(5))))?;
                let return_type = decode_return_type(r.read_u32()?).ok_or_else(|| bad("uav return type".into()))?;
                DeclKind::UavTyped {
                    slot,
                    dim,
                    return_type,
                    globally_coherent: token & DCL_UAV_GLOBALLY_COHERENT_BIT != 0,
                }
            }
            Opcode::DclUavRaw => DeclKind::UavRaw {
                slot: self.operand_slot(r)?,
                globally_coherent: token & DCL_UAV_GLOBALLY_COHERENT_BIT != 0,
            },
            Opcode::DclUavStructured => DeclKind::UavStructured {
                slot: self.operand_slot(r)?,
                stride: r.read_u32()?,
                has_counter: token & DCL_UAV_HAS_COUNTER_BIT != 0,
                globally_coherent: token & DCL_UAV_GLOBALLY_COHERENT_BIT != 0,
            },
            Opcode::DclTgsmRaw => DeclKind::TgsmRaw {
                slot: self.operand_slot(r)?,
                byte_count: r.read_u32()?,
            },
            Opcode::DclTgsmStructured => DeclKind::TgsmStructured {
                slot: self.operand_slot(r)?,
                stride: r.read_u32()?,
                count: r.read_u32()?,
            },
            Opcode::DclResourceRaw => DeclKind::ResourceRaw {
                slot: self.operand_slot(r)?,
            },
            Opcode::DclResourceStructured => DeclKind::ResourceStructured {
                slot: self.operand_slot(r)?,
                stride: r.read_u32()?,
            },
            Opcode::DclGsInstanceCount => {
                let count = r.read_u32()?;
                self.stage_info.gs_instance_count = Some(count);
                DeclKind::GsInstanceCount(count)
            }
            Opcode::HsDecls => DeclKind::HsDecls,
            other => {
                warn!(opcode = %other, "declaration routed to the wrong decoder");
                return Err(bad(format!("`{other}` is not a declaration")));
            }
        };

        if self.stage != ShaderStage::Hull
            && matches!(
                kind,
                DeclKind::HsDecls
                    | DeclKind::HsForkPhaseInstanceCount(_)
                    | DeclKind::HsJoinPhaseInstanceCount(_)
            )
        {
            return Err(bad(format!("`{opcode}` outside of a hull shader")));
        }

        self.push_decl(kind, at);
        Ok(())
    }

    /// Decodes an operand and returns its first (static) index.
    fn operand_slot(&mut self, r: &mut TokenReader<'_>) -> Result<u32, DecodeError> {
        let at = r.at();
        let id: OperandId = decode_operand(r, &mut self.operands)?;
        self.operands[id].register().ok_or_else(|| {
            DecodeError::new(
                at,
                DecodeErrorKind::MalformedDeclaration("declaration operand needs a static register".into()),
            )
        })
    }

    /// Reads a `D3D10_SB_NAME` token: the system value plus the edge or
    /// inside index encoded by the tessellation-factor names.
    fn read_system_value(
        &mut self,
        r: &mut TokenReader<'_>,
        at: usize,
    ) -> Result<(SystemValue, u32), DecodeError> {
        let raw = r.read_u32()?;
        SystemValue::from_decl_name(raw).ok_or_else(|| {
            DecodeError::new(at, DecodeErrorKind::MalformedDeclaration(format!("system value {raw}")))
        })
    }
}

fn resource_dim(raw: u32) -> Option<ResourceDimension> {
    ResourceDimension::from_u32(raw)
}

/// Four 4-bit `D3D10_SB_RESOURCE_RETURN_TYPE` fields, x in the low bits.
fn decode_return_type(word: u32) -> Option<[ReturnType; 4]> {
    let mut out = [ReturnType::Float; 4];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = ReturnType::from_u32(peek_bitfield(word, i as u32 * 4, 4))?;
    }
    Some(out)
}

/// Consumes the extended opcode tokens that follow `token` and returns the
/// sampling controls they carry.
fn decode_extended_opcode(r: &mut TokenReader<'_>, token: u32) -> Result<SampleControls, DecodeError> {
    let mut controls = SampleControls::default();
    let mut extended = token & OPCODE_EXTENDED_BIT != 0;
    while extended {
        let ext = r.read_u32()?;
        extended = ext & OPCODE_EXTENDED_BIT != 0;
        match ext & EXT_OPCODE_TYPE_MASK {
            EXT_OPCODE_SAMPLE_CONTROLS => {
                let offset = |shift| ((peek_bitfield(ext, shift, 4) as i8) << 4) >> 4;
                controls.offsets = Some([offset(9), offset(13), offset(17)]);
            }
            EXT_OPCODE_RESOURCE_DIM => {
                controls.resource_dim = resource_dim(peek_bitfield(ext, 6, 5));
                let stride = peek_bitfield(ext, 11, 12);
                controls.structure_stride = (stride != 0).then_some(stride);
            }
            EXT_OPCODE_RESOURCE_RETURN_TYPE => {
                let mut rt = [ReturnType::Float; 4];
                for (i, slot) in rt.iter_mut().enumerate() {
                    *slot = ReturnType::from_u32(peek_bitfield(ext, 6 + i as u32 * 4, 4))
                        .unwrap_or(ReturnType::Float);
                }
                controls.return_type = Some(rt);
            }
            _ => {}
        }
    }
    Ok(controls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sm4_ir::{ComponentSelection, OperandType, WriteMask};

    const PS_5_0: u32 = 0x0000_0050;

    fn op(opcode: Opcode, len: u32) -> u32 {
        opcode.raw() | (len << OPCODE_LEN_SHIFT)
    }

    fn program(body: &[u32]) -> Vec<u32> {
        let mut toks = vec![PS_5_0, 0];
        toks.extend_from_slice(body);
        toks[1] = toks.len() as u32;
        toks
    }

    #[test]
    fn sample_offsets_and_return_type_come_from_extended_tokens() {
        // sample_aoffimmi(-1,2,0)_indexable(texture2d)(float,float,float,float) r0.xyzw, v0.xy, t0, s0
        let ext_offsets = EXT_OPCODE_SAMPLE_CONTROLS | OPCODE_EXTENDED_BIT | (0xf << 9) | (2 << 13);
        let ext_dim = EXT_OPCODE_RESOURCE_DIM | OPCODE_EXTENDED_BIT | (3 << 6);
        let ext_ret = EXT_OPCODE_RESOURCE_RETURN_TYPE | (0x5555 << 6);
        let body = [
            op(Opcode::Sample, 12) | OPCODE_EXTENDED_BIT,
            ext_offsets,
            ext_dim,
            ext_ret,
            0x0010_00f2,
            0,
            0x0010_1002 | (1 << 2) | (0xe4 << 4),
            0,
            0x0010_7002 | (1 << 2) | (0xe4 << 4),
            0,
            0x0010_6000,
            0,
        ];
        let program = decode_program(&program(&body)).unwrap();
        let inst = &program.instructions[0];
        let InstKind::Sample(controls) = inst.kind else {
            panic!("expected sample controls, got {:?}", inst.kind);
        };
        assert_eq!(controls.offsets, Some([-1, 2, 0]));
        assert_eq!(controls.resource_dim, Some(ResourceDimension::Texture2D));
        assert_eq!(controls.return_type, Some([ReturnType::Float; 4]));
        assert_eq!(inst.num_ops(), 4);
        assert_eq!(program.operand(inst.operands()[3]).ty, OperandType::Sampler);
    }

    #[test]
    fn declarations_record_their_position_among_instructions() {
        let body = [
            op(Opcode::DclTemps, 2),
            1,
            op(Opcode::Ret, 1),
            op(Opcode::DclTemps, 2),
            4,
        ];
        let program = decode_program(&program(&body)).unwrap();
        assert_eq!(program.declarations[0].inst_pos, 0);
        assert_eq!(program.declarations[1].inst_pos, 1);
        assert_eq!(program.declarations[1].kind, DeclKind::Temps(4));
    }

    #[test]
    fn immediate_constant_buffer_payload_is_kept_as_bytes() {
        let body = [
            Opcode::CustomData.raw() | (CUSTOMDATA_CLASS_ICB << CUSTOMDATA_CLASS_SHIFT),
            6,
            0x3f80_0000,
            0,
            0,
            0x3f80_0000,
        ];
        let program = decode_program(&program(&body)).unwrap();
        let DeclKind::ImmediateConstantBuffer(bytes) = &program.declarations[0].kind else {
            panic!("expected icb, got {:?}", program.declarations[0].kind);
        };
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..4], &0x3f80_0000u32.to_le_bytes());
    }

    #[test]
    fn input_ps_carries_interpolation_mode() {
        let body = [op(Opcode::DclInputPs, 3) | (3 << 11), 0x0010_1032, 2];
        let program = decode_program(&program(&body)).unwrap();
        let DeclKind::Input {
            operand,
            interpolation,
            system_value,
            ..
        } = program.declarations[0].kind
        else {
            panic!("expected input decl");
        };
        assert_eq!(interpolation, Some(InterpolationMode::LinearCentroid));
        assert_eq!(system_value, None);
        assert_eq!(
            program.operand(operand).selection,
            ComponentSelection::Mask(WriteMask(0b0011))
        );
    }

    #[test]
    fn operands_overrunning_the_declared_length_are_a_length_mismatch() {
        // mov r0.xyzw, l(1, 2, 3, 4) declared one word too short.
        let body = [
            op(Opcode::Mov, 7),
            0x0010_00f2,
            0,
            0x0000_4002,
            1,
            2,
            3,
            4,
        ];
        let err = decode_program(&program(&body)).unwrap_err();
        assert!(
            matches!(err.kind, DecodeErrorKind::InstructionLengthMismatch { declared: 7, .. }),
            "{err}"
        );
    }

    #[test]
    fn operand_count_must_match_the_opcode() {
        // add r0.xyzw with both sources missing.
        let body = [op(Opcode::Add, 3), 0x0010_00f2, 0, op(Opcode::Ret, 1)];
        let err = decode_program(&program(&body)).unwrap_err();
        assert_eq!(err.at_dword, 2);
        let DecodeErrorKind::MalformedOperand(msg) = err.kind else {
            panic!("expected malformed operand, got {:?}", err.kind);
        };
        assert!(msg.contains("`add` takes 3 operands, found 1"), "{msg}");
    }

    #[test]
    fn unknown_customdata_class_is_skipped() {
        let body = [Opcode::CustomData.raw() | (1 << CUSTOMDATA_CLASS_SHIFT), 3, 0xdead_beef, op(Opcode::Ret, 1)];
        let program = decode_program(&program(&body)).unwrap();
        assert!(program.declarations.is_empty());
        assert_eq!(program.instructions.len(), 1);
    }

    #[test]
    fn hs_only_declarations_are_rejected_elsewhere() {
        let body = [op(Opcode::DclHsForkPhaseInstanceCount, 2), 2];
        let err = decode_program(&program(&body)).unwrap_err();
        assert!(matches!(err.kind, DecodeErrorKind::MalformedDeclaration(_)));
    }
}
