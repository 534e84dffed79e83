//! Error types for archive parsing and password search.
//!
//! This module provides the [`RarError`] type which covers everything that can
//! go wrong while framing a RAR5 archive, extracting its crypto parameters, or
//! running a password search.
//!
//! ## Error Categories
//!
//! | Category | Errors | Description |
//! |----------|--------|-------------|
//! | Format | [`InvalidSignature`], [`UnsupportedFormatVersion`] | Not a RAR5 archive |
//! | Framing | [`MalformedVarint`], [`TruncatedBlock`], [`MalformedBlock`] | Corrupt or short block data |
//! | Crypto | [`IncompleteCryptoProfile`], [`InvalidHash`] | Missing fast-check parameters |
//! | Search | [`SlowPathIo`], [`InvalidConfig`], keyspace errors | Run-level failures |
//! | I/O | [`Io`] | Read errors |
//!
//! Framing errors are local: the scanner keeps every block and entry found
//! before the failure. Search errors are terminal for the run.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rar_recover::{ArchiveScan, RarError};
//!
//! match ArchiveScan::open("secret.rar") {
//!     Ok(scan) => println!("Found {} entries", scan.entries.len()),
//!     Err(RarError::InvalidSignature) => eprintln!("Not a RAR file"),
//!     Err(RarError::UnsupportedFormatVersion) => eprintln!("RAR4 is not supported"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```
//!
//! [`InvalidSignature`]: RarError::InvalidSignature
//! [`UnsupportedFormatVersion`]: RarError::UnsupportedFormatVersion
//! [`MalformedVarint`]: RarError::MalformedVarint
//! [`TruncatedBlock`]: RarError::TruncatedBlock
//! [`MalformedBlock`]: RarError::MalformedBlock
//! [`IncompleteCryptoProfile`]: RarError::IncompleteCryptoProfile
//! [`InvalidHash`]: RarError::InvalidHash
//! [`SlowPathIo`]: RarError::SlowPathIo
//! [`InvalidConfig`]: RarError::InvalidConfig
//! [`Io`]: RarError::Io

use std::io;
use thiserror::Error;

/// Error type for parsing and search operations.
#[derive(Debug, Error)]
pub enum RarError {
    /// The input does not start with a RAR signature.
    ///
    /// RAR5 archives must start with `Rar!\x1a\x07\x01\x00` (8 bytes).
    #[error("Invalid RAR signature")]
    InvalidSignature,

    /// The input is a RAR archive, but not version 5.
    ///
    /// RAR4 archives (`Rar!\x1a\x07\x00`) are recognised and rejected here.
    #[error("Unsupported RAR format version")]
    UnsupportedFormatVersion,

    /// A variable-length integer needs more than 64 bits.
    ///
    /// Either the archive is corrupt or it was crafted to drive unbounded reads.
    #[error("Malformed vint at offset {offset}")]
    MalformedVarint {
        /// Absolute offset of the vint's first byte.
        offset: u64,
    },

    /// A block declares more bytes than the input holds.
    #[error("Truncated block at offset {offset}: need {needed} bytes, have {available}")]
    TruncatedBlock {
        /// Absolute offset of the block.
        offset: u64,
        /// Bytes the block claims.
        needed: u64,
        /// Bytes actually available from `offset`.
        available: u64,
    },

    /// A block's fields are internally inconsistent.
    #[error("Malformed block at offset {offset}: {reason}")]
    MalformedBlock {
        /// Absolute offset of the block (or of the record, for extra records).
        offset: u64,
        /// What was wrong.
        reason: &'static str,
    },

    /// Only part of the salt / password-check pair is available.
    ///
    /// This is not fatal: the search falls back to the slow path.
    #[error("Crypto profile has no usable salt/password-check pair")]
    IncompleteCryptoProfile,

    /// A `$rar5$` hash line could not be decoded.
    #[error("Invalid hash line: {0}")]
    InvalidHash(&'static str),

    /// A ciphertext sample could not be decrypted.
    #[error("Decryption failed: {0}")]
    DecryptionFailed(&'static str),

    /// The slow-path archive opener failed (missing file, missing tool, ...).
    #[error("Slow-path opener failed: {0}")]
    SlowPathIo(#[source] io::Error),

    /// The alphabet is empty, contains duplicates, or non-ASCII symbols.
    #[error("Invalid alphabet: {0}")]
    InvalidAlphabet(&'static str),

    /// A candidate string does not belong to the keyspace.
    #[error("Invalid candidate: {0}")]
    InvalidCandidate(&'static str),

    /// An index is not below `B^length`.
    #[error("Index {index} out of range for length {length}")]
    IndexOutOfRange {
        /// The requested index.
        index: u64,
        /// The candidate length.
        length: usize,
    },

    /// `B^length` does not fit in 64 bits.
    #[error("Keyspace of base {base} and length {length} overflows u64")]
    KeyspaceOverflow {
        /// Alphabet size.
        base: usize,
        /// Candidate length.
        length: usize,
    },

    /// A search configuration value is out of range.
    #[error("Invalid search configuration: {0}")]
    InvalidConfig(&'static str),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RarError {
    /// True for errors raised while framing blocks.
    ///
    /// These stop parsing but keep everything discovered before them.
    pub fn is_framing_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedVarint { .. } | Self::TruncatedBlock { .. } | Self::MalformedBlock { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RarError>;
