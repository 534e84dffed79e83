//! Slow-path verification: try a candidate against the archive itself.

use crate::classify::ResultClassifier;
use crate::crypto::{
    decrypt_to_vec, derive_key, CryptoProfile, CRYPT_BLOCK_SIZE, KEY_LEN, SIZE_INITV, SIZE_SALT,
};
use crate::error::{RarError, Result};
use crate::parsing::EncryptedEntry;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, trace};

/// Something that can tell whether a candidate opens the archive.
///
/// Called concurrently from every worker. An `Err` ends the whole search.
pub trait ArchiveOpener: Send + Sync {
    fn try_open(&self, candidate: &str) -> Result<bool>;
}

impl<F> ArchiveOpener for F
where
    F: Fn(&str) -> Result<bool> + Send + Sync,
{
    fn try_open(&self, candidate: &str) -> Result<bool> {
        self(candidate)
    }
}

/// Bytes of ciphertext kept for trial decryption.
pub const SAMPLE_LEN: usize = CRYPT_BLOCK_SIZE;

/// Decrypts the first block of an entry and classifies the output.
///
/// The sample is read once, through its own file handle, when the opener is
/// built; candidates never touch the file.
#[derive(Debug, Clone)]
pub struct SampleDecryptOpener {
    salt: [u8; SIZE_SALT],
    iv: [u8; SIZE_INITV],
    rounds: u32,
    sample: Vec<u8>,
    classifier: ResultClassifier,
}

impl SampleDecryptOpener {
    /// Build from a profile and the leading ciphertext of its entry.
    ///
    /// Needs a salt and an IV; `sample` is cut to whole AES blocks.
    pub fn from_sample(profile: &CryptoProfile, sample: &[u8]) -> Result<Self> {
        let salt = *profile.salt().ok_or(RarError::IncompleteCryptoProfile)?;
        let iv = *profile.iv().ok_or(RarError::IncompleteCryptoProfile)?;

        let len = sample.len().min(SAMPLE_LEN) / CRYPT_BLOCK_SIZE * CRYPT_BLOCK_SIZE;
        if len == 0 {
            return Err(RarError::DecryptionFailed("sample shorter than one block"));
        }

        Ok(Self {
            salt,
            iv,
            rounds: profile.key_rounds(),
            sample: sample[..len].to_vec(),
            classifier: ResultClassifier::default(),
        })
    }

    /// Read the sample for `entry` from the archive at `path`.
    pub fn from_archive(path: impl AsRef<Path>, entry: &EncryptedEntry) -> Result<Self> {
        let profile = entry
            .profile
            .as_ref()
            .ok_or(RarError::IncompleteCryptoProfile)?;

        let len = entry.data_size.min(SAMPLE_LEN as u64) as usize;
        let mut sample = vec![0u8; len];

        let mut file = File::open(path.as_ref()).map_err(RarError::SlowPathIo)?;
        file.seek(SeekFrom::Start(entry.data_offset))
            .map_err(RarError::SlowPathIo)?;
        file.read_exact(&mut sample).map_err(RarError::SlowPathIo)?;

        debug!(label = %entry.label, offset = entry.data_offset, len, "read ciphertext sample");

        let mut opener = Self::from_sample(profile, &sample)?;
        // Entry salt falls back to the archive salt
        if let Some(salt) = entry.salt {
            opener.salt = salt;
        }
        Ok(opener)
    }

    pub fn with_classifier(mut self, classifier: ResultClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }
}

impl ArchiveOpener for SampleDecryptOpener {
    fn try_open(&self, candidate: &str) -> Result<bool> {
        let mut key = [0u8; KEY_LEN];
        derive_key(candidate.as_bytes(), &self.salt, self.rounds, &mut key);

        let plain = decrypt_to_vec(&key, &self.iv, &self.sample)?;
        let verdict = self.classifier.classify(&plain);
        trace!(?verdict, "trial decryption");
        Ok(verdict.is_valid())
    }
}
