//! AES-256-CBC sample decryption.
//!
//! Used by the slow path only: the first block(s) of an encrypted entry are
//! decrypted under a candidate key and handed to the result classifier.

use super::kdf::KEY_LEN;
use crate::error::{RarError, Result};
use aes::Aes256;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};

type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block size.
pub const CRYPT_BLOCK_SIZE: usize = 16;
/// IV length.
pub const SIZE_INITV: usize = 16;

/// Decrypt `data` in place. `data` must be a whole number of blocks.
pub fn decrypt_in_place(key: &[u8; KEY_LEN], iv: &[u8; SIZE_INITV], data: &mut [u8]) -> Result<()> {
    if data.len() % CRYPT_BLOCK_SIZE != 0 {
        return Err(RarError::DecryptionFailed("sample is not block aligned"));
    }

    Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|_| RarError::DecryptionFailed("invalid key or iv length"))?
        .decrypt_padded_mut::<NoPadding>(data)
        .map_err(|_| RarError::DecryptionFailed("cbc decryption failed"))?;

    Ok(())
}

/// Decrypt data to a new buffer.
pub fn decrypt_to_vec(key: &[u8; KEY_LEN], iv: &[u8; SIZE_INITV], data: &[u8]) -> Result<Vec<u8>> {
    let mut output = data.to_vec();
    decrypt_in_place(key, iv, &mut output)?;
    Ok(output)
}
