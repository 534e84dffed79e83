//! RAR5 container parsing: vints, blocks, extra records and archive scans.

pub mod archive;
pub mod block;
pub mod extra;
pub mod signature;
pub mod vint;

pub use archive::{ArchiveScan, BlockSummary, EncryptedEntry};
pub use block::{Block, BlockFlags, BlockFramer, BlockType};
pub use extra::{ExtraRecord, ExtraRecords};
pub use signature::{check_signature, RAR4_SIGNATURE, RAR5_SIGNATURE};
