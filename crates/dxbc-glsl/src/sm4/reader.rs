//! DWORD cursor over a slice of the program token stream.

use crate::error::{DecodeError, DecodeErrorKind};

/// Pure bit-field extraction: `width` bits of `word` starting at bit `offset`.
#[inline]
pub fn peek_bitfield(word: u32, offset: u32, width: u32) -> u32 {
    debug_assert!(offset < 32 && width > 0 && offset + width <= 32);
    if width == 32 {
        word
    } else {
        (word >> offset) & ((1u32 << width) - 1)
    }
}

/// Reads DWORDs from a bounded window of the token stream.
///
/// `base_at` is the absolute position of `toks[0]` so errors can point into
/// the original stream.
#[derive(Debug, Clone)]
pub struct TokenReader<'a> {
    toks: &'a [u32],
    pos: usize,
    base_at: usize,
}

impl<'a> TokenReader<'a> {
    pub fn new(toks: &'a [u32], base_at: usize) -> Self {
        Self {
            toks,
            pos: 0,
            base_at,
        }
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let v = self
            .toks
            .get(self.pos)
            .copied()
            .ok_or_else(|| DecodeError::new(self.at(), DecodeErrorKind::UnexpectedEndOfStream))?;
        self.pos += 1;
        Ok(v)
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        self.read_u32().map(|v| v as i32)
    }

    /// Reads two DWORDs as one 64-bit value, high word first.
    pub fn read_u64_hi_lo(&mut self) -> Result<u64, DecodeError> {
        let hi = self.read_u32()?;
        let lo = self.read_u32()?;
        Ok((u64::from(hi) << 32) | u64::from(lo))
    }

    pub fn read_slice(&mut self, count: usize) -> Result<&'a [u32], DecodeError> {
        let end = self
            .pos
            .checked_add(count)
            .filter(|&end| end <= self.toks.len())
            .ok_or_else(|| DecodeError::new(self.at(), DecodeErrorKind::UnexpectedEndOfStream))?;
        let out = &self.toks[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn remaining(&self) -> usize {
        self.toks.len().saturating_sub(self.pos)
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.toks.len()
    }

    pub fn consumed(&self) -> usize {
        self.pos
    }

    /// Absolute position of the next DWORD.
    pub fn at(&self) -> usize {
        self.base_at + self.pos
    }

    /// Errors unless the window has been consumed exactly.
    pub fn expect_eof(&self) -> Result<(), DecodeError> {
        if self.is_eof() {
            Ok(())
        } else {
            Err(DecodeError::new(
                self.at(),
                DecodeErrorKind::InstructionLengthMismatch {
                    declared: self.toks.len(),
                    consumed: self.pos,
                },
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_past_end_reports_absolute_position() {
        let toks = [1u32, 2];
        let mut r = TokenReader::new(&toks, 10);
        assert_eq!(r.read_u32().unwrap(), 1);
        assert_eq!(r.read_u32().unwrap(), 2);
        let err = r.read_u32().unwrap_err();
        assert_eq!(err.at_dword, 12);
        assert_eq!(err.kind, DecodeErrorKind::UnexpectedEndOfStream);
    }

    #[test]
    fn bitfield_extraction() {
        assert_eq!(peek_bitfield(0xdead_beef, 0, 32), 0xdead_beef);
        assert_eq!(peek_bitfield(0xdead_beef, 0, 4), 0xf);
        assert_eq!(peek_bitfield(0xdead_beef, 28, 4), 0xd);
        assert_eq!(peek_bitfield(0x7f00_0000, 24, 7), 0x7f);
    }

    #[test]
    fn expect_eof_flags_leftover_words() {
        let toks = [1u32, 2, 3];
        let mut r = TokenReader::new(&toks, 0);
        r.read_u32().unwrap();
        assert!(matches!(
            r.expect_eof().unwrap_err().kind,
            DecodeErrorKind::InstructionLengthMismatch {
                declared: 3,
                consumed: 1
            }
        ));
    }
}
