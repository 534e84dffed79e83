//! Variable-length integer (vint) codec for RAR5.
//!
//! RAR5 uses variable-length integers where each byte contributes 7 bits
//! of data, and the high bit indicates if more bytes follow.
//!
//! Format:
//! - Bits 0-6: Data bits (least significant group first)
//! - Bit 7: Continuation flag (1 = more bytes follow)
//!
//! A `u64` needs at most 10 bytes; the 10th byte may only carry one bit.

use thiserror::Error;

/// Longest valid encoding of a `u64`.
pub const MAX_VINT_LEN: usize = 10;

/// Failure modes of [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VintError {
    /// The value does not fit in 64 bits.
    #[error("vint exceeds 64 bits")]
    Overflow,
    /// The buffer ended before a terminating byte.
    ///
    /// More bytes may still arrive from the stream; this is not corruption.
    #[error("vint incomplete")]
    Incomplete,
}

/// Decode a vint starting at `offset`.
/// Returns the value and the number of bytes consumed.
#[inline]
pub fn decode(data: &[u8], offset: usize) -> Result<(u64, usize), VintError> {
    let mut result = 0u64;
    let mut shift = 0u32;

    for (i, &byte) in data.get(offset..).unwrap_or_default().iter().enumerate() {
        let bits = u64::from(byte & 0x7F);
        if shift >= 64 || (shift == 63 && bits > 1) {
            return Err(VintError::Overflow);
        }

        result |= bits << shift;

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }

        shift += 7;
    }

    Err(VintError::Incomplete)
}

/// Read a vint from the start of a byte slice.
#[inline]
pub fn read_vint(data: &[u8]) -> Option<(u64, usize)> {
    decode(data, 0).ok()
}

/// Number of bytes [`encode`] produces for `value`.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Append the vint encoding of `value` to `out`.
pub fn encode_into(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Encode `value` as a vint.
pub fn encode(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(value));
    encode_into(value, &mut out);
    out
}

/// Helper for reading multiple fields from a buffer.
pub struct VintReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> VintReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Read the next vint, distinguishing overflow from running out of data.
    #[inline]
    pub fn try_read(&mut self) -> Result<u64, VintError> {
        let (value, consumed) = decode(self.data, self.offset)?;
        self.offset += consumed;
        Ok(value)
    }

    /// Read the next vint from the buffer.
    #[inline]
    pub fn read(&mut self) -> Option<u64> {
        self.try_read().ok()
    }

    /// Read a fixed number of bytes.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(count)?;
        let slice = self.data.get(self.offset..end)?;
        self.offset = end;
        Some(slice)
    }

    /// Read a fixed-size array.
    #[inline]
    pub fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.read_bytes(N)?.try_into().ok()
    }

    /// Read a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Option<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    /// Read a u32 in little-endian format.
    #[inline]
    pub fn read_u32_le(&mut self) -> Option<u32> {
        self.read_array::<4>().map(u32::from_le_bytes)
    }

    /// Look at the byte `ahead` positions past the cursor without consuming it.
    #[inline]
    pub fn peek(&self, ahead: usize) -> Option<u8> {
        self.data.get(self.offset + ahead).copied()
    }

    /// Current position in the buffer.
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Remaining bytes in the buffer.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }

    /// Skip ahead by a number of bytes.
    pub fn skip(&mut self, count: usize) -> bool {
        match self.offset.checked_add(count) {
            Some(end) if end <= self.data.len() => {
                self.offset = end;
                true
            }
            _ => false,
        }
    }
}
