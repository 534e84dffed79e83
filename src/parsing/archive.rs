//! Archive scan: frame every block and collect the crypto parameters.
//!
//! A scan keeps whatever it found before a framing error; the error itself
//! is stored in [`ArchiveScan::stop_reason`]. Only a missing or non-RAR5
//! signature fails the scan outright.

use super::block::{Block, BlockFlags, BlockFramer, BlockType};
use super::vint::VintReader;
use crate::crypto::{CryptoProfile, SIZE_INITV, SIZE_SALT};
use crate::error::{RarError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

/// File flag: modification time present.
const FILE_FLAG_MTIME: u64 = 0x0002;
/// File flag: data CRC32 present.
const FILE_FLAG_CRC32: u64 = 0x0004;

/// A file entry with a data area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEntry {
    /// Absolute offset of the data area
    pub data_offset: u64,
    pub data_size: u64,
    /// Entry carries an encryption record or headers are encrypted
    pub encrypted: bool,
    /// Entry salt, or the archive salt when the entry has none
    pub salt: Option<[u8; SIZE_SALT]>,
    pub iv: Option<[u8; SIZE_INITV]>,
    pub profile: Option<CryptoProfile>,
    /// Stored file name, or `file@<offset>`
    pub label: String,
}

/// Framing facts about one block, kept after the image is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSummary {
    pub offset: u64,
    pub block_type: BlockType,
    pub flags: BlockFlags,
    pub declared_size: u64,
    pub data_size: u64,
}

impl From<&Block<'_>> for BlockSummary {
    fn from(block: &Block<'_>) -> Self {
        Self {
            offset: block.offset,
            block_type: block.block_type,
            flags: block.flags,
            declared_size: block.declared_size,
            data_size: block.data_size,
        }
    }
}

/// Result of scanning an archive image.
#[derive(Debug, Default)]
pub struct ArchiveScan {
    /// From the archive encryption block
    pub archive_profile: Option<CryptoProfile>,
    pub entries: Vec<EncryptedEntry>,
    pub blocks: Vec<BlockSummary>,
    pub headers_encrypted: bool,
    /// Why framing stopped early, if it did
    pub stop_reason: Option<RarError>,
}

impl ArchiveScan {
    /// Scan an in-memory archive image.
    pub fn scan(data: &[u8]) -> Result<Self> {
        let framer = BlockFramer::from_archive(data)?;
        let mut scan = Self::default();

        for item in framer {
            let block = match item {
                Ok(block) => block,
                Err(err) => {
                    warn!(error = %err, blocks = scan.blocks.len(), "framing stopped early");
                    scan.stop_reason = Some(err);
                    break;
                }
            };
            scan.blocks.push(BlockSummary::from(&block));

            match block.block_type {
                BlockType::Encryption => {
                    match CryptoProfile::from_encryption_block(block.body(), block.offset) {
                        Ok(profile) => {
                            info!(offset = block.offset, %profile, "archive headers are encrypted");
                            scan.archive_profile = Some(profile);
                            scan.headers_encrypted = true;
                        }
                        Err(err) => {
                            warn!(error = %err, "unreadable encryption block");
                            scan.stop_reason = Some(err);
                        }
                    }
                    // Every following header is ciphertext
                    break;
                }
                BlockType::File if block.flags.has_data_area() => {
                    match scan.entry_from_block(&block) {
                        Ok(entry) => scan.entries.push(entry),
                        Err(err) => {
                            warn!(offset = block.offset, error = %err, "unreadable file block");
                            scan.stop_reason = Some(err);
                            break;
                        }
                    }
                }
                _ => {}
            }
        }

        info!(
            blocks = scan.blocks.len(),
            entries = scan.entries.len(),
            headers_encrypted = scan.headers_encrypted,
            complete = scan.stop_reason.is_none(),
            "archive scanned"
        );
        Ok(scan)
    }

    /// Memory-map and scan an archive on disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        // SAFETY: the map is read-only and dropped before returning; nothing
        // borrowed from it outlives this call.
        let map = unsafe { Mmap::map(&file)? };
        debug!(path = %path.as_ref().display(), len = map.len(), "mapped archive");
        Self::scan(&map)
    }

    fn entry_from_block(&self, block: &Block<'_>) -> Result<EncryptedEntry> {
        let mut profile = None;
        for record in block.extra_records() {
            let record = record?;
            if record.is_encryption() {
                profile = Some(CryptoProfile::from_encryption_record(&record)?);
            }
        }

        let encrypted = profile.is_some() || self.headers_encrypted;
        let profile = profile.or_else(|| self.archive_profile.clone());
        let archive_salt = self.archive_profile.as_ref().and_then(|p| p.salt().copied());
        let salt = profile
            .as_ref()
            .and_then(|p| p.salt().copied())
            .or(archive_salt);
        let iv = profile.as_ref().and_then(|p| p.iv().copied());

        let data_offset = block.data_range().start;
        let label = file_name(block.body()).unwrap_or_else(|| format!("file@{data_offset}"));

        debug!(%label, data_offset, data_size = block.data_size, encrypted, "file entry");

        Ok(EncryptedEntry {
            data_offset,
            data_size: block.data_size,
            encrypted,
            salt,
            iv,
            profile,
            label,
        })
    }

    /// Profile to search against.
    ///
    /// The archive profile wins; otherwise the first entry offering a fast
    /// check, otherwise the first entry profile at all.
    pub fn search_profile(&self) -> Option<&CryptoProfile> {
        self.archive_profile.as_ref().or_else(|| {
            let mut profiles = self.entries.iter().filter_map(|e| e.profile.as_ref());
            let first = profiles.clone().next();
            profiles.find(|p| p.has_fast_check()).or(first)
        })
    }

    pub fn first_encrypted_entry(&self) -> Option<&EncryptedEntry> {
        self.entries.iter().find(|e| e.encrypted)
    }

    pub fn is_encrypted(&self) -> bool {
        self.headers_encrypted || self.entries.iter().any(|e| e.encrypted)
    }
}

/// Read the stored name from file header fields.
fn file_name(body: &[u8]) -> Option<String> {
    let mut reader = VintReader::new(body);
    let file_flags = reader.read()?;
    let _unpacked_size = reader.read()?;
    let _attributes = reader.read()?;
    if file_flags & FILE_FLAG_MTIME != 0 {
        reader.read_u32_le()?;
    }
    if file_flags & FILE_FLAG_CRC32 != 0 {
        reader.read_u32_le()?;
    }
    let _compression = reader.read()?;
    let _host_os = reader.read()?;
    let name_len = usize::try_from(reader.read()?).ok()?;
    let name = reader.read_bytes(name_len)?;
    Some(String::from_utf8_lossy(name).into_owned())
}
