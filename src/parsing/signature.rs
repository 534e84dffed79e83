//! Archive signature check.
//!
//! RAR4: 0x52 0x61 0x72 0x21 0x1A 0x07 0x00
//! RAR5: 0x52 0x61 0x72 0x21 0x1A 0x07 0x01 0x00
//!
//! Only RAR5 is framed; any other `Rar!\x1a\x07` variant is recognised and
//! reported as an unsupported version.

use crate::error::{RarError, Result};

/// RAR4 magic signature.
pub const RAR4_SIGNATURE: [u8; 7] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00];

/// RAR5 magic signature.
pub const RAR5_SIGNATURE: [u8; 8] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x01, 0x00];

/// Common prefix of every RAR generation.
const RAR_FAMILY_PREFIX: [u8; 6] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07];

/// Validate the signature and return the offset of the first block.
pub fn check_signature(buffer: &[u8]) -> Result<usize> {
    if buffer.starts_with(&RAR5_SIGNATURE) {
        return Ok(RAR5_SIGNATURE.len());
    }
    if buffer.starts_with(&RAR4_SIGNATURE) {
        return Err(RarError::UnsupportedFormatVersion);
    }
    if buffer.len() > RAR_FAMILY_PREFIX.len() && buffer.starts_with(&RAR_FAMILY_PREFIX) {
        return Err(RarError::UnsupportedFormatVersion);
    }
    Err(RarError::InvalidSignature)
}
