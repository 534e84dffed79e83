//! Extra-area records.
//!
//! The extra area of a block is a packed list of records:
//!
//! ```text
//! [size: vint][type: vint][payload: size - len(type vint) bytes]
//! ```
//!
//! `size` covers the type field and payload, not its own encoding.

use super::vint::{VintError, VintReader};
use crate::error::{RarError, Result};
use tracing::trace;

/// File/service extra record: encryption parameters.
pub const EXTRA_ENCRYPTION: u64 = 0x01;
/// File/service extra record: file hash.
pub const EXTRA_HASH: u64 = 0x02;
/// File/service extra record: high precision times.
pub const EXTRA_TIME: u64 = 0x03;

/// One record of an extra area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtraRecord<'a> {
    pub record_type: u64,
    pub payload: &'a [u8],
    /// Absolute offset of the record's size field
    pub offset: u64,
}

impl ExtraRecord<'_> {
    pub fn is_encryption(&self) -> bool {
        self.record_type == EXTRA_ENCRYPTION
    }
}

/// Iterator over the records of an extra area.
///
/// Stops at the end of the area or at a zero-size record; a malformed
/// record yields one error and ends iteration.
pub struct ExtraRecords<'a> {
    area: &'a [u8],
    base: u64,
    pos: usize,
    done: bool,
}

impl<'a> ExtraRecords<'a> {
    /// `base` is the absolute offset of `area[0]`, used in error reports.
    pub fn new(area: &'a [u8], base: u64) -> Self {
        Self {
            area,
            base,
            pos: 0,
            done: false,
        }
    }

    fn record_at(&self, pos: usize) -> Result<Option<(ExtraRecord<'a>, usize)>> {
        let offset = self.base + pos as u64;
        let malformed = |reason| RarError::MalformedBlock { offset, reason };

        let mut reader = VintReader::new(&self.area[pos..]);
        let size = match reader.try_read() {
            Ok(0) => return Ok(None),
            Ok(size) => size,
            Err(VintError::Overflow) => return Err(RarError::MalformedVarint { offset }),
            Err(VintError::Incomplete) => return Err(malformed("extra record size runs past area")),
        };
        let size_len = reader.position();

        let end = usize::try_from(size)
            .ok()
            .and_then(|size| size.checked_add(size_len))
            .filter(|&end| end <= self.area.len() - pos)
            .ok_or_else(|| malformed("extra record overruns extra area"))?;

        let record = &self.area[pos + size_len..pos + end];
        let mut reader = VintReader::new(record);
        let record_type = reader.try_read().map_err(|err| match err {
            VintError::Overflow => RarError::MalformedVarint {
                offset: offset + size_len as u64,
            },
            VintError::Incomplete => malformed("extra record type runs past record"),
        })?;

        let record = ExtraRecord {
            record_type,
            payload: &record[reader.position()..],
            offset,
        };
        Ok(Some((record, end)))
    }
}

impl<'a> Iterator for ExtraRecords<'a> {
    type Item = Result<ExtraRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.area.len() {
            return None;
        }

        match self.record_at(self.pos) {
            Ok(Some((record, consumed))) => {
                trace!(
                    offset = record.offset,
                    record_type = record.record_type,
                    len = record.payload.len(),
                    "extra record"
                );
                self.pos += consumed;
                Some(Ok(record))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
