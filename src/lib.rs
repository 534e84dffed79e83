//! RAR5 password recovery core.
//!
//! Parses the RAR5 block container far enough to pull out the encryption
//! parameters, then searches a brute-force keyspace for the password.
//!
//! ## Pipeline
//!
//! ```text
//! bytes ─► BlockFramer ─► CryptoProfile ─┬─► encode_hash ─► external cracker
//!                                        └─► SearchEngine ◄── Keyspace
//! ```
//!
//! - [`parsing`] frames blocks and extra records; [`ArchiveScan`] collects
//!   every encrypted entry and the archive-level profile.
//! - [`crypto`] holds the normalized [`CryptoProfile`], PBKDF2 key
//!   derivation and AES-256-CBC sample decryption.
//! - [`hash`] writes profiles as `$rar5$` lines.
//! - [`keyspace`] maps indices to candidates and cuts the space into tasks.
//! - [`search`] runs worker threads over those tasks, using the stored
//!   password check when there is one and an [`ArchiveOpener`] otherwise.
//! - [`classify`] judges decrypted samples for the slow path.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rar_recover::{
//!     Alphabet, ArchiveScan, Keyspace, SearchConfig, SearchEngine, SearchOutcome, Verifier,
//! };
//!
//! let scan = ArchiveScan::open("secret.rar")?;
//! let profile = scan.search_profile().ok_or(rar_recover::RarError::IncompleteCryptoProfile)?;
//! let config = SearchConfig::default();
//! let verifier = Verifier::for_profile(profile, config.derivation, None)?;
//!
//! let keyspace = Keyspace::new(Alphabet::alphanumeric(), 1, 4)?;
//! match SearchEngine::new(config, verifier)?.run(&keyspace) {
//!     SearchOutcome::Found(password) => println!("password: {password}"),
//!     other => println!("{other}"),
//! }
//! ```
//!
//! Logging goes through `tracing`; install a subscriber to see it.

pub mod classify;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod keyspace;
pub mod parsing;
pub mod search;

#[cfg(test)]
mod test_support;

pub use classify::{Classification, ResultClassifier};
pub use crypto::{CheckDerivation, CryptoProfile, PasswordCheck};
pub use error::{RarError, Result};
pub use hash::{decode_hash, encode_hash, HashEncoding, HashLine};
pub use keyspace::{Alphabet, Keyspace, Odometer, SearchTask};
pub use parsing::{ArchiveScan, BlockFramer, EncryptedEntry};
pub use search::{
    ArchiveOpener, Deadline, ProgressSink, ProgressUpdate, SampleDecryptOpener, SearchConfig,
    SearchEngine, SearchOutcome, SearchStats, StopHandle, Verifier,
};
