//! RAR5 block framing.
//!
//! Every RAR5 block starts with the same common fields:
//!
//! ```text
//! [CRC32: 4][size: vint][type: vint][flags: vint]
//! [extra area size: vint, if EXTRA_AREA][data size: vint, if DATA_AREA]
//! [type-specific fields...][extra area: last `extra area size` bytes]
//! [data area: `data size` bytes, outside the header]
//! ```
//!
//! `size` counts everything from the type field to the end of the header,
//! so a header occupies `4 + len(size vint) + size` bytes on disk.

use super::extra::ExtraRecords;
use super::signature::check_signature;
use super::vint::{VintError, VintReader};
use crate::error::{RarError, Result};
use std::ops::Range;
use tracing::{debug, warn};

/// RAR5 block type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    /// Main archive header
    Main,
    /// File header
    File,
    /// Service header (e.g., NTFS streams, ACL, comments)
    Service,
    /// Archive encryption header; everything after it is encrypted
    Encryption,
    /// End of archive header
    EndOfArchive,
    /// Any other code, skipped by size
    Unknown(u64),
}

impl From<u64> for BlockType {
    fn from(value: u64) -> Self {
        match value {
            1 => Self::Main,
            2 => Self::File,
            3 => Self::Service,
            4 => Self::Encryption,
            5 => Self::EndOfArchive,
            other => Self::Unknown(other),
        }
    }
}

impl BlockType {
    /// The on-disk type code.
    pub fn code(self) -> u64 {
        match self {
            Self::Main => 1,
            Self::File => 2,
            Self::Service => 3,
            Self::Encryption => 4,
            Self::EndOfArchive => 5,
            Self::Unknown(code) => code,
        }
    }
}

/// RAR5 common header flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BlockFlags(u64);

impl BlockFlags {
    /// Extra area is present at the end of the header
    pub const EXTRA_AREA: u64 = 0x0001;
    /// Data area follows the header
    pub const DATA_AREA: u64 = 0x0002;
    /// Skip header if unknown type
    pub const SKIP_IF_UNKNOWN: u64 = 0x0004;
    /// Data continues from previous volume
    pub const SPLIT_BEFORE: u64 = 0x0008;
    /// Data continues in next volume
    pub const SPLIT_AFTER: u64 = 0x0010;
    /// Block depends on the preceding file block
    pub const CHILD: u64 = 0x0020;
    /// Preserve a child block if the host is modified
    pub const INHERITED: u64 = 0x0040;

    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, flag: u64) -> bool {
        self.0 & flag == flag
    }

    pub const fn has_extra_area(self) -> bool {
        self.contains(Self::EXTRA_AREA)
    }

    pub const fn has_data_area(self) -> bool {
        self.contains(Self::DATA_AREA)
    }

    pub const fn is_split_before(self) -> bool {
        self.contains(Self::SPLIT_BEFORE)
    }

    pub const fn is_split_after(self) -> bool {
        self.contains(Self::SPLIT_AFTER)
    }

    pub const fn is_child(self) -> bool {
        self.contains(Self::CHILD)
    }

    pub const fn is_inherited(self) -> bool {
        self.contains(Self::INHERITED)
    }
}

impl From<u64> for BlockFlags {
    fn from(bits: u64) -> Self {
        Self(bits)
    }
}

/// One framed block, borrowing its header bytes from the archive image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block<'a> {
    /// Header CRC32 (not verified)
    pub crc32: u32,
    /// Bytes from the type field to the end of the header
    pub declared_size: u64,
    pub block_type: BlockType,
    pub flags: BlockFlags,
    /// Absolute offset of the CRC field
    pub offset: u64,
    /// Total header length: CRC + size vint + declared size
    pub header_len: usize,
    /// Length of the trailing extra area (0 if absent)
    pub extra_area_len: usize,
    /// Length of the data area following the header (0 if absent)
    pub data_size: u64,
    fields_end: usize,
    raw: &'a [u8],
}

impl<'a> Block<'a> {
    /// Absolute range of the header on the stream.
    pub fn byte_range(&self) -> Range<u64> {
        self.offset..self.offset + self.header_len as u64
    }

    /// Absolute range of the data area (empty if there is none).
    pub fn data_range(&self) -> Range<u64> {
        let start = self.byte_range().end;
        start..start.saturating_add(self.data_size)
    }

    /// Offset of the block that follows this one.
    pub fn next_offset(&self) -> u64 {
        self.data_range().end
    }

    /// The whole header, CRC included.
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// Type-specific fields: everything between the common fields and the
    /// extra area.
    pub fn body(&self) -> &'a [u8] {
        &self.raw[self.fields_end..self.header_len - self.extra_area_len]
    }

    /// The extra area, taken from the end of the header.
    ///
    /// Variable-length fields such as the file name sit between the common
    /// fields and the extra area, so it is located from the block end.
    pub fn extra_area(&self) -> Option<&'a [u8]> {
        if self.extra_area_len == 0 {
            return None;
        }
        Some(&self.raw[self.header_len - self.extra_area_len..])
    }

    /// Iterate over the records in the extra area.
    pub fn extra_records(&self) -> ExtraRecords<'a> {
        let start = self.header_len - self.extra_area_len;
        ExtraRecords::new(&self.raw[start..], self.offset + start as u64)
    }
}

/// Iterator over the blocks of an in-memory RAR5 image.
///
/// Yields at most one error, after which iteration ends. Blocks yielded
/// before the error remain valid.
pub struct BlockFramer<'a> {
    data: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> BlockFramer<'a> {
    /// Frame `data` starting at `start` (normally just past the signature).
    pub fn new(data: &'a [u8], start: usize) -> Self {
        Self {
            data,
            pos: start,
            done: false,
        }
    }

    /// Check the RAR5 signature and frame the blocks after it.
    pub fn from_archive(data: &'a [u8]) -> Result<Self> {
        let start = check_signature(data)?;
        Ok(Self::new(data, start))
    }

    /// Offset of the next block to be framed.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Stop after the current block.
    pub fn finish(&mut self) {
        self.done = true;
    }

    fn frame_at(&self, pos: usize) -> Result<Block<'a>> {
        let offset = pos as u64;
        let available = (self.data.len() - pos) as u64;
        let truncated = |needed: u64| RarError::TruncatedBlock {
            offset,
            needed,
            available,
        };

        let mut reader = VintReader::new(&self.data[pos..]);

        // CRC32 (4 bytes, not vint)
        let crc32 = reader.read_u32_le().ok_or_else(|| truncated(4))?;

        // Header size (vint) - size of header content AFTER this vint
        let declared_size = match reader.try_read() {
            Ok(size) => size,
            // At least one more byte is needed to finish the size field
            Err(VintError::Incomplete) => return Err(truncated(available + 1)),
            Err(VintError::Overflow) => return Err(RarError::MalformedVarint { offset: offset + 4 }),
        };
        let content_start = reader.position();

        let header_len = (content_start as u64)
            .checked_add(declared_size)
            .ok_or(RarError::MalformedBlock {
                offset,
                reason: "declared size overflows",
            })?;
        if header_len > available {
            return Err(truncated(header_len));
        }
        let header_len = header_len as usize;
        let raw = &self.data[pos..pos + header_len];

        // Remaining common fields must fit inside the declared header
        let mut reader = VintReader::new(raw);
        reader.skip(content_start);

        let block_type = BlockType::from(read_field(&mut reader, offset)?);
        let flags = BlockFlags::from(read_field(&mut reader, offset)?);

        let extra_area_len = if flags.has_extra_area() {
            read_field(&mut reader, offset)?
        } else {
            0
        };

        let data_size = if flags.has_data_area() {
            read_field(&mut reader, offset)?
        } else {
            0
        };

        let fields_end = reader.position();
        let extra_area_len = usize::try_from(extra_area_len)
            .ok()
            .filter(|&len| len <= header_len - fields_end)
            .ok_or(RarError::MalformedBlock {
                offset,
                reason: "extra area larger than header",
            })?;

        Ok(Block {
            crc32,
            declared_size,
            block_type,
            flags,
            offset,
            header_len,
            extra_area_len,
            data_size,
            fields_end,
            raw,
        })
    }
}

fn read_field(reader: &mut VintReader<'_>, block_offset: u64) -> Result<u64> {
    let at = block_offset + reader.position() as u64;
    reader.try_read().map_err(|err| match err {
        VintError::Overflow => RarError::MalformedVarint { offset: at },
        VintError::Incomplete => RarError::MalformedBlock {
            offset: block_offset,
            reason: "header fields overrun declared size",
        },
    })
}

impl<'a> Iterator for BlockFramer<'a> {
    type Item = Result<Block<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.data.len() {
            return None;
        }

        let block = match self.frame_at(self.pos) {
            Ok(block) => block,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };

        debug!(
            offset = block.offset,
            block_type = ?block.block_type,
            flags = block.flags.bits(),
            declared_size = block.declared_size,
            data_size = block.data_size,
            "framed block"
        );

        if block.block_type == BlockType::EndOfArchive {
            self.done = true;
        }

        match usize::try_from(block.next_offset()) {
            Ok(next) if next <= self.data.len() => self.pos = next,
            _ => {
                warn!(
                    offset = block.offset,
                    data_size = block.data_size,
                    "data area runs past end of input, stopping"
                );
                self.done = true;
            }
        }

        Some(Ok(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::signature::RAR5_SIGNATURE;
    use crate::test_support::{ArchiveBuilder, BlockBuilder};

    #[test]
    fn test_main_then_end() {
        let archive = ArchiveBuilder::new()
            .block(BlockBuilder::new(BlockType::Main).body(&[0x00]))
            .end()
            .build();

        let blocks: Vec<_> = BlockFramer::from_archive(&archive)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].block_type, BlockType::Main);
        assert_eq!(blocks[0].offset, 8);
        assert_eq!(blocks[1].block_type, BlockType::EndOfArchive);
        assert_eq!(blocks[1].byte_range().end, archive.len() as u64);
    }

    #[test]
    fn test_real_main_header_arithmetic() {
        // Main header from a real RAR5 archive (after the signature)
        let mut data = RAR5_SIGNATURE.to_vec();
        data.extend_from_slice(&[
            0x33, 0x92, 0xb5, 0xe5, // CRC32
            0x0a, // header_size = 10
            0x01, // type = 1 (main)
            0x05, // flags = EXTRA_AREA | SKIP_IF_UNKNOWN
            0x06, // extra_area_size = 6
            0x00, // archive_flags = 0
            0x05, 0x01, 0x01, 0x80, 0x80, 0x00, // extra area (6 bytes)
        ]);

        let block = BlockFramer::from_archive(&data).unwrap().next().unwrap().unwrap();
        assert_eq!(block.crc32, 0xe5b59233);
        assert_eq!(block.declared_size, 10);
        assert_eq!(block.header_len, 15);
        assert!(block.flags.has_extra_area());
        assert!(block.flags.contains(BlockFlags::SKIP_IF_UNKNOWN));
        assert_eq!(block.body(), &[0x00]);
        assert_eq!(block.extra_area(), Some(&[0x05, 0x01, 0x01, 0x80, 0x80, 0x00][..]));
    }

    #[test]
    fn test_data_area_is_skipped() {
        let archive = ArchiveBuilder::new()
            .block(BlockBuilder::new(BlockType::File).body(&[0x00; 6]).data(&[0xEE; 40]))
            .end()
            .build();

        let blocks: Vec<_> = BlockFramer::from_archive(&archive)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].data_size, 40);
        assert_eq!(blocks[0].next_offset(), blocks[1].offset);
        assert_eq!(blocks[1].block_type, BlockType::EndOfArchive);
    }

    #[test]
    fn test_extra_area_is_taken_from_block_end() {
        // Body bytes between the size fields and the extra area must not be
        // mistaken for extra records.
        let archive = ArchiveBuilder::new()
            .block(
                BlockBuilder::new(BlockType::File)
                    .body(b"\x00\x05\x00\x00\x01\x07name.tx")
                    .extra(&[0x03, 0x07, 0xAA, 0xBB]),
            )
            .build();

        let block = BlockFramer::from_archive(&archive).unwrap().next().unwrap().unwrap();
        assert_eq!(block.extra_area(), Some(&[0x03, 0x07, 0xAA, 0xBB][..]));
        assert!(block.body().ends_with(b"name.tx"));

        let records: Vec<_> = block.extra_records().collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_type, 7);
        assert_eq!(records[0].payload, &[0xAA, 0xBB]);
    }

    #[test]
    fn test_unknown_block_type_is_skipped() {
        let archive = ArchiveBuilder::new()
            .block(BlockBuilder::new(BlockType::Unknown(42)).body(&[1, 2, 3]).data(&[9; 5]))
            .end()
            .build();

        let types: Vec<_> = BlockFramer::from_archive(&archive)
            .unwrap()
            .map(|b| b.unwrap().block_type)
            .collect();
        assert_eq!(types, vec![BlockType::Unknown(42), BlockType::EndOfArchive]);
    }

    #[test]
    fn test_stops_at_end_of_archive() {
        let mut archive = ArchiveBuilder::new().end().build();
        archive.extend_from_slice(&[0xFF; 32]);

        let blocks: Vec<_> = BlockFramer::from_archive(&archive).unwrap().collect();
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn test_truncated_block_keeps_earlier_blocks() {
        let mut archive = ArchiveBuilder::new()
            .block(BlockBuilder::new(BlockType::Main).body(&[0x00]))
            .end()
            .build();
        archive.truncate(archive.len() - 1);

        let items: Vec<_> = BlockFramer::from_archive(&archive).unwrap().collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(RarError::TruncatedBlock { .. })));
    }

    #[test]
    fn test_stray_tail_bytes_are_truncation() {
        let mut archive = ArchiveBuilder::new()
            .block(BlockBuilder::new(BlockType::Main).body(&[0x00]))
            .build();
        archive.extend_from_slice(&[0x01, 0x02]);

        let items: Vec<_> = BlockFramer::from_archive(&archive).unwrap().collect();
        assert!(matches!(
            items.last(),
            Some(Err(RarError::TruncatedBlock { needed: 4, available: 2, .. }))
        ));
    }

    #[test]
    fn test_overflowing_size_vint() {
        let mut archive = RAR5_SIGNATURE.to_vec();
        archive.extend_from_slice(&[0, 0, 0, 0]);
        archive.extend_from_slice(&[0xFF; 12]);

        let items: Vec<_> = BlockFramer::from_archive(&archive).unwrap().collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(RarError::MalformedVarint { offset: 12 })));
    }

    #[test]
    fn test_extra_area_larger_than_header() {
        // Hand-built: flags say extra area of 100 bytes inside a 3-byte header
        let mut archive = RAR5_SIGNATURE.to_vec();
        archive.extend_from_slice(&[0, 0, 0, 0, 0x03, 0x02, 0x01, 0x64]);

        let items: Vec<_> = BlockFramer::from_archive(&archive).unwrap().collect();
        assert!(matches!(items[0], Err(RarError::MalformedBlock { .. })));
    }

    #[test]
    fn test_data_area_past_end_stops_framing() {
        let mut archive = ArchiveBuilder::new()
            .block(BlockBuilder::new(BlockType::File).body(&[0x00]).data(&[0xEE; 64]))
            .build();
        archive.truncate(archive.len() - 10);

        let items: Vec<_> = BlockFramer::from_archive(&archive).unwrap().collect();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_ok());
    }

    #[test]
    fn test_block_type_codes() {
        for code in 1..=6 {
            assert_eq!(BlockType::from(code).code(), code);
        }
        assert_eq!(BlockType::from(9), BlockType::Unknown(9));
    }

    #[test]
    fn test_flags() {
        let flags = BlockFlags::from(0x7F);
        assert!(flags.has_extra_area());
        assert!(flags.has_data_area());
        assert!(flags.is_split_before());
        assert!(flags.is_split_after());
        assert!(flags.is_child());
        assert!(flags.is_inherited());
        assert!(!BlockFlags::default().has_data_area());
    }
}
