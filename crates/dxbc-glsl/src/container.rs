//! `DXBC` container front end.
//!
//! A container is a 32-byte header (`DXBC` magic, MD5 checksum, a reserved
//! dword, total size, chunk count) followed by a table of chunk offsets. Each
//! chunk is a fourcc, a byte length and the payload. The translator needs:
//!
//! - `SHDR`/`SHEX`: the SM4/SM5 token stream;
//! - `ISGN`/`ISG1`, `OSGN`/`OSG5`/`OSG1`, `PCSG`/`PSG1`: signatures;
//! - `RDEF`: constant-buffer layouts and resource bindings.
//!
//! The input is untrusted: every offset is bounds-checked and failures are
//! [`DecodeError`]s carrying the byte offset into the container. The
//! checksum is not verified.

use core::fmt;

use tracing::{debug, warn};

use crate::error::{DecodeError, TranslateError};
use crate::glsl::{translate_program, GlslTranslation, TranslateOptions};
use crate::sm4::decode_program;
use crate::sm4_ir::{
    BaseType, BindingKind, CbVariable, ComponentType, ConstantBufferDesc, Program,
    ResourceBinding, SignatureEntry, SystemValue, VariableClass, VariableType, WriteMask,
};

const HEADER_LEN: usize = 32;
const MAX_CHUNKS: usize = 4096;
/// Nesting limit for RDEF struct types.
const MAX_TYPE_DEPTH: u32 = 32;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const DXBC: Self = Self(*b"DXBC");
    pub const SHDR: Self = Self(*b"SHDR");
    pub const SHEX: Self = Self(*b"SHEX");
    pub const RDEF: Self = Self(*b"RDEF");
    pub const ISGN: Self = Self(*b"ISGN");
    pub const ISG1: Self = Self(*b"ISG1");
    pub const OSGN: Self = Self(*b"OSGN");
    pub const OSG5: Self = Self(*b"OSG5");
    pub const OSG1: Self = Self(*b"OSG1");
    pub const PCSG: Self = Self(*b"PCSG");
    pub const PSG1: Self = Self(*b"PSG1");
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

/// One chunk. `offset` is the payload's byte offset in the container.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub fourcc: FourCc,
    pub offset: usize,
    pub data: &'a [u8],
}

#[derive(Debug, Clone)]
pub struct DxbcContainer<'a> {
    pub checksum: [u8; 16],
    pub chunks: Vec<Chunk<'a>>,
}

/// Bounds-checked little-endian reads over a chunk payload. `base` turns
/// payload offsets into container offsets for error reporting.
#[derive(Clone, Copy)]
struct Bytes<'a> {
    data: &'a [u8],
    base: usize,
}

impl<'a> Bytes<'a> {
    fn err(&self, at: usize, msg: impl Into<String>) -> DecodeError {
        DecodeError::container(self.base.saturating_add(at), msg)
    }

    fn u32_at(&self, at: usize, what: &str) -> Result<u32, DecodeError> {
        let slice = at
            .checked_add(4)
            .and_then(|end| self.data.get(at..end))
            .ok_or_else(|| self.err(at, format!("{what} is past the end of the chunk")))?;
        Ok(u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]))
    }

    fn u16_at(&self, at: usize, what: &str) -> Result<u16, DecodeError> {
        let slice = at
            .checked_add(2)
            .and_then(|end| self.data.get(at..end))
            .ok_or_else(|| self.err(at, format!("{what} is past the end of the chunk")))?;
        Ok(u16::from_le_bytes([slice[0], slice[1]]))
    }

    fn u8_at(&self, at: usize, what: &str) -> Result<u8, DecodeError> {
        self.data
            .get(at)
            .copied()
            .ok_or_else(|| self.err(at, format!("{what} is past the end of the chunk")))
    }

    fn cstr_at(&self, at: usize, what: &str) -> Result<&'a str, DecodeError> {
        let tail = self
            .data
            .get(at..)
            .ok_or_else(|| self.err(at, format!("{what} offset is outside the chunk")))?;
        let nul = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| self.err(at, format!("{what} is not null-terminated")))?;
        core::str::from_utf8(&tail[..nul]).map_err(|_| self.err(at, format!("{what} is not UTF-8")))
    }

    /// Checks that `count` records of `size` bytes fit at `at`.
    fn table(&self, at: usize, count: usize, size: usize, what: &str) -> Result<(), DecodeError> {
        let end = count
            .checked_mul(size)
            .and_then(|len| at.checked_add(len))
            .ok_or_else(|| self.err(at, format!("{what} table size overflows")))?;
        if end > self.data.len() {
            return Err(self.err(at, format!("{what} table ends past the chunk ({end} > {})", self.data.len())));
        }
        Ok(())
    }
}

impl<'a> DxbcContainer<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        let file = Bytes { data: bytes, base: 0 };
        if bytes.len() < HEADER_LEN {
            return Err(file.err(0, format!("need {HEADER_LEN} header bytes, got {}", bytes.len())));
        }
        if bytes[..4] != FourCc::DXBC.0 {
            return Err(file.err(0, "bad magic"));
        }
        let mut checksum = [0u8; 16];
        checksum.copy_from_slice(&bytes[4..20]);
        let total = file.u32_at(24, "total size")? as usize;
        if total < HEADER_LEN || total > bytes.len() {
            return Err(file.err(24, format!("total size {total} does not fit the {} input bytes", bytes.len())));
        }
        let file = Bytes {
            data: &bytes[..total],
            base: 0,
        };
        let count = file.u32_at(28, "chunk count")? as usize;
        if count > MAX_CHUNKS {
            return Err(file.err(28, format!("{count} chunks exceeds the limit of {MAX_CHUNKS}")));
        }
        file.table(HEADER_LEN, count, 4, "chunk offset")?;
        let table_end = HEADER_LEN + count * 4;

        let mut chunks = Vec::with_capacity(count);
        for i in 0..count {
            let at = HEADER_LEN + i * 4;
            let offset = file.u32_at(at, "chunk offset")? as usize;
            if offset < table_end {
                return Err(file.err(at, format!("chunk {i} offset {offset} points into the header")));
            }
            let mut fourcc = [0u8; 4];
            for (k, b) in fourcc.iter_mut().enumerate() {
                *b = file.u8_at(offset + k, "chunk fourcc")?;
            }
            let len = file.u32_at(offset + 4, "chunk size")? as usize;
            let start = offset + 8;
            let data = start
                .checked_add(len)
                .and_then(|end| file.data.get(start..end))
                .ok_or_else(|| file.err(offset, format!("chunk {i} payload of {len} bytes overruns the container")))?;
            chunks.push(Chunk {
                fourcc: FourCc(fourcc),
                offset: start,
                data,
            });
        }
        debug!(
            size = total,
            chunks = ?chunks.iter().map(|c| c.fourcc).collect::<Vec<_>>(),
            "parsed dxbc container"
        );
        Ok(Self { checksum, chunks })
    }

    /// First chunk whose fourcc is any of `ids`, preferring earlier ids.
    pub fn chunk(&self, ids: &[FourCc]) -> Option<Chunk<'a>> {
        ids.iter()
            .find_map(|id| self.chunks.iter().find(|c| c.fourcc == *id).copied())
    }

    /// The `SHEX`/`SHDR` payload as tokens.
    pub fn shader_tokens(&self) -> Result<Vec<u32>, DecodeError> {
        let chunk = self
            .chunk(&[FourCc::SHEX, FourCc::SHDR])
            .ok_or_else(|| DecodeError::container(0, "no SHDR or SHEX chunk"))?;
        if chunk.data.len() % 4 != 0 {
            return Err(DecodeError::container(
                chunk.offset,
                format!("{} payload is {} bytes, not a whole number of dwords", chunk.fourcc, chunk.data.len()),
            ));
        }
        Ok(chunk
            .data
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect())
    }

    fn signature(&self, ids: &[FourCc]) -> Result<Vec<SignatureEntry>, DecodeError> {
        match self.chunk(ids) {
            Some(chunk) => parse_signature(chunk),
            None => Ok(Vec::new()),
        }
    }

    /// Decodes the shader chunk and attaches signatures and reflection data.
    pub fn program(&self) -> Result<Program, DecodeError> {
        let tokens = self.shader_tokens()?;
        let program = decode_program(&tokens)?;
        let inputs = self.signature(&[FourCc::ISG1, FourCc::ISGN])?;
        let outputs = self.signature(&[FourCc::OSG1, FourCc::OSG5, FourCc::OSGN])?;
        let patch = self.signature(&[FourCc::PSG1, FourCc::PCSG])?;
        let (cbuffers, bindings) = match self.chunk(&[FourCc::RDEF]) {
            Some(chunk) => parse_rdef(chunk)?,
            None => (Vec::new(), Vec::new()),
        };
        Ok(program
            .with_signatures(inputs, outputs, patch)
            .with_constant_buffers(cbuffers)
            .with_resource_bindings(bindings))
    }
}

/// Parses a signature chunk. Entry layouts:
///
/// - `ISGN`/`OSGN`/`PCSG`: 24 bytes (name offset, semantic index, system
///   value, component type, register, mask, read/write mask, padding);
/// - `OSG5`: a stream dword, then the 24-byte layout;
/// - `ISG1`/`OSG1`/`PSG1`: as `OSG5` plus a trailing min-precision dword.
pub fn parse_signature(chunk: Chunk<'_>) -> Result<Vec<SignatureEntry>, DecodeError> {
    let b = Bytes {
        data: chunk.data,
        base: chunk.offset,
    };
    let (size, has_stream) = match &chunk.fourcc.0 {
        b"OSG5" => (28, true),
        [_, _, _, b'1'] => (32, true),
        _ => (24, false),
    };
    let count = b.u32_at(0, "signature element count")? as usize;
    let table = b.u32_at(4, "signature table offset")? as usize;
    b.table(table, count, size, "signature")?;

    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let mut at = table + i * size;
        let stream = if has_stream {
            at += 4;
            b.u32_at(at - 4, "stream")?
        } else {
            0
        };
        let name = b.cstr_at(b.u32_at(at, "semantic name offset")? as usize, "semantic name")?;
        let semantic_index = b.u32_at(at + 4, "semantic index")?;
        let raw_sv = b.u32_at(at + 8, "system value")?;
        let system_value = SystemValue::from_u32(raw_sv).unwrap_or_else(|| {
            warn!(semantic = name, raw_sv, "unknown system value in signature");
            SystemValue::Undefined
        });
        let component_type = ComponentType::from_u32(b.u32_at(at + 12, "component type")?);
        let register = b.u32_at(at + 16, "register")?;
        let mask = b.u8_at(at + 20, "mask")? & 0xf;
        let rw_mask = b.u8_at(at + 21, "read/write mask")? & 0xf;
        let mut entry = SignatureEntry::new(name, semantic_index, register, mask)
            .with_system_value(system_value)
            .with_component_type(component_type);
        entry.read_write_mask = WriteMask(rw_mask);
        entry.stream = stream;
        entries.push(entry);
    }
    debug!(fourcc = %chunk.fourcc, entries = entries.len(), "parsed signature");
    Ok(entries)
}

/// `D3D_CBUFFER_TYPE` of ordinary constant buffers.
const CBUFFER_TYPE_CBUFFER: u32 = 0;

/// Parses an `RDEF` chunk into constant-buffer layouts and resource
/// bindings. Constant buffers take the bind point of the same-named
/// constant-buffer binding.
pub fn parse_rdef(chunk: Chunk<'_>) -> Result<(Vec<ConstantBufferDesc>, Vec<ResourceBinding>), DecodeError> {
    let b = Bytes {
        data: chunk.data,
        base: chunk.offset,
    };
    let cb_count = b.u32_at(0, "constant buffer count")? as usize;
    let cb_offset = b.u32_at(4, "constant buffer offset")? as usize;
    let rb_count = b.u32_at(8, "binding count")? as usize;
    let rb_offset = b.u32_at(12, "binding offset")? as usize;
    let target = b.u32_at(16, "target")?;
    // SM5 reflection appends texture and sampler ranges to each variable.
    let var_size = if (target >> 8) & 0xff >= 5 { 40 } else { 24 };

    b.table(rb_offset, rb_count, 32, "resource binding")?;
    let mut bindings = Vec::with_capacity(rb_count);
    for i in 0..rb_count {
        let at = rb_offset + i * 32;
        let name = b.cstr_at(b.u32_at(at, "binding name offset")? as usize, "binding name")?;
        let raw_kind = b.u32_at(at + 4, "input type")?;
        let Some(kind) = BindingKind::from_u32(raw_kind) else {
            warn!(name, raw_kind, "skipping binding of unknown input type");
            continue;
        };
        bindings.push(ResourceBinding {
            name: name.to_owned(),
            kind,
            dimension: b.u32_at(at + 12, "dimension")?,
            bind_point: b.u32_at(at + 20, "bind point")?,
            bind_count: b.u32_at(at + 24, "bind count")?,
        });
    }

    b.table(cb_offset, cb_count, 24, "constant buffer")?;
    let mut cbuffers = Vec::with_capacity(cb_count);
    for i in 0..cb_count {
        let at = cb_offset + i * 24;
        let name = b.cstr_at(b.u32_at(at, "cbuffer name offset")? as usize, "cbuffer name")?;
        let var_count = b.u32_at(at + 4, "variable count")? as usize;
        let var_offset = b.u32_at(at + 8, "variable offset")? as usize;
        let size = b.u32_at(at + 12, "cbuffer size")?;
        if b.u32_at(at + 20, "cbuffer type")? != CBUFFER_TYPE_CBUFFER {
            continue;
        }
        b.table(var_offset, var_count, var_size, "variable")?;
        let mut variables = Vec::with_capacity(var_count);
        for v in 0..var_count {
            let vat = var_offset + v * var_size;
            let var_name = b.cstr_at(b.u32_at(vat, "variable name offset")? as usize, "variable name")?;
            let type_offset = b.u32_at(vat + 16, "variable type offset")? as usize;
            variables.push(CbVariable {
                name: var_name.to_owned(),
                offset: b.u32_at(vat + 4, "variable offset")?,
                size: b.u32_at(vat + 8, "variable size")?,
                ty: parse_type(&b, type_offset, 0)?,
            });
        }
        let bind_point = bindings
            .iter()
            .find(|r| r.kind == BindingKind::ConstantBuffer && r.name == name)
            .map_or(i as u32, |r| r.bind_point);
        cbuffers.push(ConstantBufferDesc {
            name: name.to_owned(),
            bind_point,
            size,
            variables,
        });
    }
    debug!(
        cbuffers = cbuffers.len(),
        bindings = bindings.len(),
        "parsed resource definitions"
    );
    Ok((cbuffers, bindings))
}

fn parse_type(b: &Bytes<'_>, at: usize, depth: u32) -> Result<VariableType, DecodeError> {
    if depth > MAX_TYPE_DEPTH {
        return Err(b.err(at, "type nesting too deep"));
    }
    let class = match b.u16_at(at, "type class")? {
        0 => VariableClass::Scalar,
        1 => VariableClass::Vector,
        2 => VariableClass::MatrixRows,
        3 => VariableClass::MatrixColumns,
        _ => VariableClass::Other,
    };
    let base = match b.u16_at(at + 2, "base type")? {
        1 => BaseType::Bool,
        2 => BaseType::Int,
        19 => BaseType::Uint,
        39 => BaseType::Double,
        _ => BaseType::Float,
    };
    Ok(VariableType {
        class,
        base,
        rows: u32::from(b.u16_at(at + 4, "type rows")?),
        columns: u32::from(b.u16_at(at + 6, "type columns")?),
        elements: u32::from(b.u16_at(at + 8, "type elements")?),
    })
}

/// Reads a container, decodes its shader and attaches signatures and
/// reflection data.
pub fn load_program(bytes: &[u8]) -> Result<Program, TranslateError> {
    Ok(DxbcContainer::parse(bytes)?.program()?)
}

/// Container, decode, link and generate in one call.
pub fn translate_dxbc(bytes: &[u8], options: &TranslateOptions) -> Result<GlslTranslation, TranslateError> {
    let mut program = load_program(bytes)?;
    program.link()?;
    translate_program(&program, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Assembles a container around `chunks`.
    fn container(chunks: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
        let table_end = HEADER_LEN + chunks.len() * 4;
        let mut body = Vec::new();
        let mut offsets = Vec::new();
        for (id, data) in chunks {
            offsets.push((table_end + body.len()) as u32);
            body.extend_from_slice(*id);
            body.extend_from_slice(&(data.len() as u32).to_le_bytes());
            body.extend_from_slice(data);
        }
        let total = (table_end + body.len()) as u32;
        let mut out = b"DXBC".to_vec();
        out.extend_from_slice(&[0; 16]);
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&total.to_le_bytes());
        out.extend_from_slice(&(chunks.len() as u32).to_le_bytes());
        for o in offsets {
            out.extend_from_slice(&o.to_le_bytes());
        }
        out.extend_from_slice(&body);
        out
    }

    fn dwords(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    /// `ISGN` with one entry per `(name, register, mask)`.
    fn isgn(entries: &[(&str, u32, u8)]) -> Vec<u8> {
        let table = 8;
        let strings = table + entries.len() * 24;
        let mut out = dwords(&[entries.len() as u32, table as u32]);
        let mut names = Vec::new();
        for &(name, reg, mask) in entries {
            let name_offset = (strings + names.len()) as u32;
            out.extend(dwords(&[name_offset, 0, 0, 0, reg]));
            out.extend_from_slice(&[mask, mask, 0, 0]);
            names.extend_from_slice(name.as_bytes());
            names.push(0);
        }
        out.extend(names);
        out
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        let mut bytes = container(&[]);
        bytes[0] = b'X';
        assert!(DxbcContainer::parse(&bytes).is_err());
        assert!(DxbcContainer::parse(&bytes[..10]).is_err());
    }

    #[test]
    fn rejects_chunks_running_past_total_size() {
        let mut bytes = container(&[(b"SHDR", dwords(&[0x10040, 2]))]);
        let len_at = HEADER_LEN + 4 + 4;
        bytes[len_at..len_at + 4].copy_from_slice(&1000u32.to_le_bytes());
        let err = DxbcContainer::parse(&bytes).unwrap_err();
        assert!(err.to_string().contains("overruns"));
    }

    #[test]
    fn finds_shader_tokens() {
        let bytes = container(&[(b"SHEX", dwords(&[0x10050, 2]))]);
        let dxbc = DxbcContainer::parse(&bytes).unwrap();
        assert_eq!(dxbc.shader_tokens().unwrap(), vec![0x10050, 2]);
    }

    #[test]
    fn missing_shader_chunk_is_malformed() {
        let bytes = container(&[(b"RDEF", vec![0; 28])]);
        let err = load_program(&bytes).unwrap_err();
        assert!(matches!(err, TranslateError::MalformedBytecode(_)));
    }

    #[test]
    fn parses_signature_entries() {
        let data = isgn(&[("POSITION", 0, 0xf), ("TEXCOORD", 1, 0x3)]);
        let chunk = Chunk {
            fourcc: FourCc::ISGN,
            offset: 0,
            data: &data,
        };
        let entries = parse_signature(chunk).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].semantic_name, "POSITION");
        assert_eq!(entries[1].register, 1);
        assert_eq!(entries[1].mask, WriteMask(0x3));
    }

    #[test]
    fn signature_table_out_of_bounds_is_an_error() {
        let data = dwords(&[4, 8]);
        let chunk = Chunk {
            fourcc: FourCc::OSGN,
            offset: 100,
            data: &data,
        };
        let err = parse_signature(chunk).unwrap_err();
        assert_eq!(err.at_dword, 108);
    }

    #[test]
    fn program_picks_up_signatures() {
        let tokens = dwords(&[0x10040, 2]);
        let bytes = container(&[
            (b"ISGN", isgn(&[("POSITION", 0, 0xf)])),
            (b"OSGN", isgn(&[("SV_Position", 0, 0xf)])),
            (b"SHDR", tokens),
        ]);
        let program = load_program(&bytes).unwrap();
        assert_eq!(program.input_signature.len(), 1);
        assert_eq!(program.output_signature[0].semantic_name, "SV_Position");
    }

    #[test]
    fn rdef_constant_buffers_take_their_binding_slot() {
        // Header: one cbuffer at 60, one binding at 28, SM4 target.
        let mut data = dwords(&[1, 60, 1, 28, 0x0400, 0, 0]);
        // Binding at 28: name@108, cbuffer, return 0, dim 0, samples 0, slot 3, count 1, flags 0.
        data.extend(dwords(&[108, 0, 0, 0, 0, 3, 1, 0]));
        // Cbuffer at 60: name@108, 1 var @84, 16 bytes, flags 0, type cbuffer.
        data.extend(dwords(&[108, 1, 84, 16, 0, 0]));
        // Variable at 84: name@116, offset 0, size 16, flags 0, type@124, default 0.
        data.extend(dwords(&[116, 0, 16, 0, 124, 0]));
        assert_eq!(data.len(), 108);
        data.extend_from_slice(b"Globals\0");
        data.extend_from_slice(b"tint\0\0\0\0");
        // Type at 124: vector, float, 1 row, 4 columns, no elements, no members.
        data.extend_from_slice(&[1, 0, 3, 0, 1, 0, 4, 0, 0, 0, 0, 0]);
        data.extend(dwords(&[0]));
        let chunk = Chunk {
            fourcc: FourCc::RDEF,
            offset: 0,
            data: &data,
        };
        let (cbuffers, bindings) = parse_rdef(chunk).unwrap();
        assert_eq!(bindings[0].name, "Globals");
        assert_eq!(bindings[0].kind, BindingKind::ConstantBuffer);
        assert_eq!(cbuffers[0].bind_point, 3);
        assert_eq!(cbuffers[0].variables[0].name, "tint");
        assert_eq!(cbuffers[0].variables[0].ty, VariableType::vector(BaseType::Float, 4));
    }
}
