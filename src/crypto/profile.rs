//! Normalized crypto parameters for an archive or a single entry.
//!
//! Two places in a RAR5 archive carry them:
//!
//! - the archive encryption block (type 4), used when headers are encrypted:
//!   `[flags: vint][salt: 16][password check: 8]`
//! - the encryption extra record (type 0x01) of a file or service block:
//!   `[kdf version: vint][flags: vint][kdf round log: 1][salt: 16, bit 0]`
//!   `[iv: 16, bit 1][password check: 8, if present]`

use super::cipher::SIZE_INITV;
use super::kdf::{SIZE_PSWCHECK, SIZE_SALT};
use crate::error::{RarError, Result};
use crate::parsing::extra::ExtraRecord;
use crate::parsing::vint::VintReader;
use std::fmt;
use tracing::{debug, warn};

/// PBKDF2 rounds assumed when the source carries no round count: 2^15 + 32.
pub const DEFAULT_KDF_ROUNDS: u32 = 32768 + 32;
/// Round exponent assumed when the source carries none.
pub const DEFAULT_KDF_ROUND_LOG: u8 = 15;
/// Largest round exponent accepted.
pub const MAX_KDF_ROUND_LOG: u8 = 24;

/// Encryption record flag: salt present.
pub const RECORD_FLAG_SALT: u64 = 0x01;
/// Encryption record flag: IV present.
pub const RECORD_FLAG_IV: u64 = 0x02;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CipherAlgorithm {
    #[default]
    Aes256Cbc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum KdfAlgorithm {
    #[default]
    Pbkdf2HmacSha256,
}

impl fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aes256Cbc => write!(f, "AES-256-CBC"),
        }
    }
}

impl fmt::Display for KdfAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pbkdf2HmacSha256 => write!(f, "PBKDF2-HMAC-SHA256"),
        }
    }
}

/// Crypto parameters of an archive or entry.
///
/// A password check is only ever stored together with its salt; see
/// [`CryptoProfile::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoProfile {
    pub cipher: CipherAlgorithm,
    pub kdf: KdfAlgorithm,
    /// PBKDF2 rounds for the SHA-256 prefix check; see [`rounds_for`](crate::crypto::CheckDerivation::rounds_for)
    pub kdf_rounds: u32,
    /// Round exponent as stored on disk, kept for re-encoding
    pub kdf_round_log: u8,
    /// Produced by the archive encryption block
    pub header_encrypted: bool,
    salt: Option<[u8; SIZE_SALT]>,
    iv: Option<[u8; SIZE_INITV]>,
    password_check: Option<[u8; SIZE_PSWCHECK]>,
}

impl Default for CryptoProfile {
    fn default() -> Self {
        Self {
            cipher: CipherAlgorithm::default(),
            kdf: KdfAlgorithm::default(),
            kdf_rounds: DEFAULT_KDF_ROUNDS,
            kdf_round_log: DEFAULT_KDF_ROUND_LOG,
            header_encrypted: false,
            salt: None,
            iv: None,
            password_check: None,
        }
    }
}

impl CryptoProfile {
    /// Build a profile with default algorithms and rounds.
    ///
    /// A check value without a salt cannot be verified; it is discarded.
    pub fn new(salt: Option<[u8; SIZE_SALT]>, password_check: Option<[u8; SIZE_PSWCHECK]>) -> Self {
        let password_check = match (salt, password_check) {
            (None, Some(_)) => {
                warn!("password check without salt, discarding it");
                None
            }
            (_, check) => check,
        };
        Self {
            salt,
            password_check,
            ..Self::default()
        }
    }

    pub fn with_iv(mut self, iv: Option<[u8; SIZE_INITV]>) -> Self {
        self.iv = iv;
        self
    }

    /// Set the round exponent; rounds become `1 << round_log`.
    pub fn with_round_log(mut self, round_log: u8) -> Self {
        self.kdf_round_log = round_log;
        self.kdf_rounds = 1u32 << round_log;
        self
    }

    pub fn salt(&self) -> Option<&[u8; SIZE_SALT]> {
        self.salt.as_ref()
    }

    /// IV, if the source carried one. Absent is not the same as zeroed.
    pub fn iv(&self) -> Option<&[u8; SIZE_INITV]> {
        self.iv.as_ref()
    }

    pub fn password_check(&self) -> Option<&[u8; SIZE_PSWCHECK]> {
        self.password_check.as_ref()
    }

    /// Rounds used to derive the AES key itself.
    pub fn key_rounds(&self) -> u32 {
        1u32 << self.kdf_round_log
    }

    /// The salt / check pair needed for the fast path.
    pub fn fast_check(&self) -> Result<([u8; SIZE_SALT], [u8; SIZE_PSWCHECK])> {
        match (self.salt, self.password_check) {
            (Some(salt), Some(check)) => Ok((salt, check)),
            _ => Err(RarError::IncompleteCryptoProfile),
        }
    }

    pub fn has_fast_check(&self) -> bool {
        self.fast_check().is_ok()
    }

    /// Parse the body of an archive encryption block (type 4).
    ///
    /// Salt and check value are mandatory here; a short body is malformed.
    /// `offset` is the block's absolute offset, for error reports.
    pub fn from_encryption_block(body: &[u8], offset: u64) -> Result<Self> {
        let malformed = |reason| RarError::MalformedBlock { offset, reason };
        let mut reader = VintReader::new(body);

        let _flags = reader
            .try_read()
            .map_err(|_| malformed("encryption block flags unreadable"))?;
        let salt = reader
            .read_array::<SIZE_SALT>()
            .ok_or_else(|| malformed("encryption block salt truncated"))?;
        let check = reader
            .read_array::<SIZE_PSWCHECK>()
            .ok_or_else(|| malformed("encryption block password check truncated"))?;

        Ok(Self {
            header_encrypted: true,
            ..Self::new(Some(salt), Some(check))
        })
    }

    /// Parse an encryption extra record (type 0x01).
    ///
    /// The flag bits decide which of salt and IV follow; a check value is
    /// taken if eight more bytes remain.
    pub fn from_encryption_record(record: &ExtraRecord<'_>) -> Result<Self> {
        let offset = record.offset;
        let malformed = |reason| RarError::MalformedBlock { offset, reason };
        let mut reader = VintReader::new(record.payload);

        let kdf_version = reader
            .try_read()
            .map_err(|_| malformed("encryption record version unreadable"))?;
        if kdf_version != 0 {
            return Err(malformed("unsupported encryption record version"));
        }

        if looks_like_reserved_byte(reader.peek(0), reader.peek(1)) {
            debug!(offset, "skipping reserved byte before encryption flags");
            reader.skip(1);
        }

        let flags = reader
            .try_read()
            .map_err(|_| malformed("encryption record flags unreadable"))?;

        let round_log = reader
            .read_u8()
            .ok_or_else(|| malformed("encryption record round count missing"))?;
        if round_log > MAX_KDF_ROUND_LOG {
            return Err(malformed("kdf round count too large"));
        }

        let salt = if flags & RECORD_FLAG_SALT != 0 {
            Some(
                reader
                    .read_array::<SIZE_SALT>()
                    .ok_or_else(|| malformed("encryption record salt truncated"))?,
            )
        } else {
            None
        };

        let iv = if flags & RECORD_FLAG_IV != 0 {
            Some(
                reader
                    .read_array::<SIZE_INITV>()
                    .ok_or_else(|| malformed("encryption record iv truncated"))?,
            )
        } else {
            None
        };

        let check = reader.read_array::<SIZE_PSWCHECK>();

        Ok(Self::new(salt, check).with_iv(iv).with_round_log(round_log))
    }
}

/// Some producers write a zero byte between the kdf version and the flags.
///
/// Best-effort: a zero followed by a flag value using only the defined bits
/// (1..=3) is taken as that reserved byte. A record with flags 0 and a round
/// exponent of 1..=3 is indistinguishable and gets misread.
fn looks_like_reserved_byte(first: Option<u8>, second: Option<u8>) -> bool {
    matches!((first, second), (Some(0), Some(1..=3)))
}

impl fmt::Display for CryptoProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let salt = self
            .salt
            .map(|s| format!("{}...", hex::encode(&s[..4])))
            .unwrap_or_else(|| "none".to_string());
        write!(
            f,
            "[{}] KDF={} (rounds={}) salt={} iv={} check={}",
            self.cipher,
            self.kdf,
            self.kdf_rounds,
            salt,
            if self.iv.is_some() { "yes" } else { "no" },
            if self.password_check.is_some() { "yes" } else { "no" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::extra::EXTRA_ENCRYPTION;

    fn record(payload: &[u8]) -> ExtraRecord<'_> {
        ExtraRecord {
            record_type: EXTRA_ENCRYPTION,
            payload,
            offset: 0,
        }
    }

    #[test]
    fn test_encryption_block_with_zero_fields() {
        let mut body = vec![0x00]; // flags
        body.extend_from_slice(&[0u8; 16]);
        body.extend_from_slice(&[0u8; 8]);

        let profile = CryptoProfile::from_encryption_block(&body, 8).unwrap();
        assert_eq!(profile.salt(), Some(&[0u8; 16]));
        assert_eq!(profile.password_check(), Some(&[0u8; 8]));
        assert_eq!(profile.kdf_rounds, DEFAULT_KDF_ROUNDS);
        assert_eq!(profile.kdf_rounds, 32800);
        assert!(profile.iv().is_none());
        assert!(profile.header_encrypted);
        assert!(profile.has_fast_check());
    }

    #[test]
    fn test_encryption_block_truncated_check_is_discarded() {
        let mut body = vec![0x00];
        body.extend_from_slice(&[0xAB; 16]);
        body.extend_from_slice(&[0xCD; 5]);

        assert!(matches!(
            CryptoProfile::from_encryption_block(&body, 40),
            Err(RarError::MalformedBlock { offset: 40, .. })
        ));
    }

    #[test]
    fn test_record_with_salt_iv_and_check() {
        let mut payload = vec![0x00, 0x03, 0x0F];
        payload.extend_from_slice(&[0x11; 16]);
        payload.extend_from_slice(&[0x22; 16]);
        payload.extend_from_slice(&[0x33; 8]);
        payload.extend_from_slice(&[0x44; 4]); // check sum, ignored

        let profile = CryptoProfile::from_encryption_record(&record(&payload)).unwrap();
        assert_eq!(profile.salt(), Some(&[0x11; 16]));
        assert_eq!(profile.iv(), Some(&[0x22; 16]));
        assert_eq!(profile.password_check(), Some(&[0x33; 8]));
        assert_eq!(profile.kdf_round_log, 15);
        assert_eq!(profile.kdf_rounds, 32768);
        assert!(!profile.header_encrypted);
    }

    #[test]
    fn test_record_without_check_falls_back() {
        let mut payload = vec![0x00, 0x01, 0x0F];
        payload.extend_from_slice(&[0x11; 16]);

        let profile = CryptoProfile::from_encryption_record(&record(&payload)).unwrap();
        assert!(profile.salt().is_some());
        assert!(profile.password_check().is_none());
        assert!(matches!(
            profile.fast_check(),
            Err(RarError::IncompleteCryptoProfile)
        ));
    }

    #[test]
    fn test_record_check_without_salt_is_discarded() {
        // flags = IV only, then 8 trailing bytes that would be a check value
        let mut payload = vec![0x00, 0x02, 0x0F];
        payload.extend_from_slice(&[0x22; 16]);
        payload.extend_from_slice(&[0x33; 8]);

        let profile = CryptoProfile::from_encryption_record(&record(&payload)).unwrap();
        assert!(profile.salt().is_none());
        assert!(profile.password_check().is_none());
        assert_eq!(profile.iv(), Some(&[0x22; 16]));
    }

    #[test]
    fn test_record_presence_bits_are_authoritative() {
        // No salt, no IV: the 16 bytes that follow are not a salt
        let mut payload = vec![0x00, 0x00, 0x0F];
        payload.extend_from_slice(&[0x11; 16]);

        let profile = CryptoProfile::from_encryption_record(&record(&payload)).unwrap();
        assert!(profile.salt().is_none());
        assert!(profile.iv().is_none());
    }

    #[test]
    fn test_record_reserved_byte_heuristic() {
        // Best-effort: [version][reserved 0x00][flags=3][log]...
        let mut payload = vec![0x00, 0x00, 0x03, 0x0F];
        payload.extend_from_slice(&[0x11; 16]);
        payload.extend_from_slice(&[0x22; 16]);
        payload.extend_from_slice(&[0x33; 8]);

        let profile = CryptoProfile::from_encryption_record(&record(&payload)).unwrap();
        assert_eq!(profile.salt(), Some(&[0x11; 16]));
        assert_eq!(profile.iv(), Some(&[0x22; 16]));
        assert_eq!(profile.password_check(), Some(&[0x33; 8]));
        assert_eq!(profile.kdf_round_log, 15);
    }

    #[test]
    fn test_record_reserved_byte_heuristic_ambiguity() {
        // flags = 0 with a round exponent of 2 looks exactly like a reserved
        // byte followed by flags = 2; the heuristic picks the latter.
        let payload = [0x00, 0x00, 0x02, 0x05];
        let result = CryptoProfile::from_encryption_record(&record(&payload));
        // Read as flags=2 (IV) which then cannot be satisfied
        assert!(matches!(result, Err(RarError::MalformedBlock { .. })));
    }

    #[test]
    fn test_record_rejects_huge_round_count() {
        let payload = [0x00, 0x00, 0x30];
        assert!(matches!(
            CryptoProfile::from_encryption_record(&record(&payload)),
            Err(RarError::MalformedBlock { .. })
        ));
    }

    #[test]
    fn test_record_rejects_unknown_version() {
        // Version 1 followed by what would otherwise pass as a reserved byte
        let mut payload = vec![0x01, 0x00, 0x01, 0x0F];
        payload.extend_from_slice(&[0xAA; 16]);
        match CryptoProfile::from_encryption_record(&record(&payload)) {
            Err(RarError::MalformedBlock { reason, .. }) => {
                assert_eq!(reason, "unsupported encryption record version");
            }
            other => panic!("expected malformed block, got {other:?}"),
        }
    }

    #[test]
    fn test_record_missing_salt_bytes() {
        let payload = [0x00, 0x01, 0x0F, 0xAA, 0xBB];
        assert!(matches!(
            CryptoProfile::from_encryption_record(&record(&payload)),
            Err(RarError::MalformedBlock { .. })
        ));
    }

    #[test]
    fn test_display_redacts_salt() {
        let profile = CryptoProfile::new(Some([0xAB; 16]), None);
        let text = profile.to_string();
        assert!(text.contains("salt=abababab..."));
        assert!(text.contains("check=no"));
    }
}
