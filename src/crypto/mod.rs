//! Crypto parameters and primitives for RAR5 encrypted archives.
//!
//! RAR5 uses AES-256-CBC with PBKDF2-HMAC-SHA256 key derivation. The
//! parameters come from the archive encryption block or from a file's
//! encryption extra record and are normalized into a [`CryptoProfile`].

mod cipher;
mod kdf;
mod profile;

pub use cipher::{decrypt_in_place, decrypt_to_vec, CRYPT_BLOCK_SIZE, SIZE_INITV};
pub use kdf::{
    derive_key, CheckDerivation, PasswordCheck, CHECK_EXTRA_ROUNDS, KEY_LEN, SIZE_PSWCHECK,
    SIZE_SALT,
};
pub use profile::{
    CipherAlgorithm, CryptoProfile, KdfAlgorithm, DEFAULT_KDF_ROUNDS, DEFAULT_KDF_ROUND_LOG,
    MAX_KDF_ROUND_LOG, RECORD_FLAG_IV, RECORD_FLAG_SALT,
};
