//! Key derivation and password-check computation.
//!
//! RAR5 derives keys with PBKDF2-HMAC-SHA256 over a 16-byte salt. The
//! archive stores an 8-byte value derived from the key so that a candidate
//! can be rejected without touching any ciphertext.

use super::profile::CryptoProfile;
use crate::error::Result;
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Salt length.
pub const SIZE_SALT: usize = 16;
/// Password check length.
pub const SIZE_PSWCHECK: usize = 8;
/// AES-256 key length.
pub const KEY_LEN: usize = 32;
/// Extra PBKDF2 rounds for the native check value, on top of the key rounds.
pub const CHECK_EXTRA_ROUNDS: u32 = 32;

/// Derive `out.len()` bytes of key material with PBKDF2-HMAC-SHA256.
#[inline]
pub fn derive_key(password: &[u8], salt: &[u8], rounds: u32, out: &mut [u8]) {
    pbkdf2_hmac::<Sha256>(password, salt, rounds, out);
}

/// How the 8-byte check value is obtained from the derived key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckDerivation {
    /// First 8 bytes of `SHA-256(key)`.
    #[default]
    Sha256Prefix,
    /// The 32-byte key XOR-folded into 8 bytes.
    ///
    /// This is what RAR5 itself stores. The folded value comes from a
    /// separate derivation run for `2^lg2 + 32` rounds, not from the key.
    XorFold,
}

impl CheckDerivation {
    /// PBKDF2 rounds the check value for `profile` is computed with.
    pub fn rounds_for(self, profile: &CryptoProfile) -> u32 {
        match self {
            Self::Sha256Prefix => profile.kdf_rounds,
            Self::XorFold => profile.key_rounds().saturating_add(CHECK_EXTRA_ROUNDS),
        }
    }

    /// Compute the check value for `password`.
    pub fn compute(self, password: &[u8], salt: &[u8; SIZE_SALT], rounds: u32) -> [u8; SIZE_PSWCHECK] {
        let mut key = [0u8; KEY_LEN];
        derive_key(password, salt, rounds, &mut key);
        self.reduce(&key)
    }

    fn reduce(self, key: &[u8; KEY_LEN]) -> [u8; SIZE_PSWCHECK] {
        let mut check = [0u8; SIZE_PSWCHECK];
        match self {
            Self::Sha256Prefix => {
                let digest = Sha256::digest(key);
                check.copy_from_slice(&digest[..SIZE_PSWCHECK]);
            }
            Self::XorFold => {
                for (i, &byte) in key.iter().enumerate() {
                    check[i % SIZE_PSWCHECK] ^= byte;
                }
            }
        }
        check
    }
}

/// Fast-path verifier: PBKDF2 plus an 8-byte comparison, no ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordCheck {
    salt: [u8; SIZE_SALT],
    expected: [u8; SIZE_PSWCHECK],
    rounds: u32,
    derivation: CheckDerivation,
}

impl PasswordCheck {
    pub fn new(
        salt: [u8; SIZE_SALT],
        expected: [u8; SIZE_PSWCHECK],
        rounds: u32,
        derivation: CheckDerivation,
    ) -> Self {
        Self {
            salt,
            expected,
            rounds,
            derivation,
        }
    }

    /// Build from a profile carrying both salt and check value.
    pub fn from_profile(profile: &CryptoProfile, derivation: CheckDerivation) -> Result<Self> {
        let (salt, expected) = profile.fast_check()?;
        Ok(Self::new(salt, expected, derivation.rounds_for(profile), derivation))
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// True if `password` reproduces the stored check value.
    pub fn matches(&self, password: &[u8]) -> bool {
        self.derivation.compute(password, &self.salt, self.rounds) == self.expected
    }
}
