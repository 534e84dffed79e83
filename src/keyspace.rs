//! Brute-force keyspace: an ordered alphabet and a length range.
//!
//! Candidates of one length are numbered `0..B^length`, where `B` is the
//! alphabet size. Index `i` maps to the base-`B` digits of `i`, most
//! significant first, left-padded with the first symbol. So with the
//! alphanumeric alphabet `0` is `"000"` and `62` is `"010"`.
//!
//! Each length is cut into [`SearchTask`]s of at most `chunk_size`
//! indices. The order tasks come out in is not part of the contract; only
//! that they cover every index exactly once.

use crate::error::{RarError, Result};
use std::fmt;

const ASCII_LIMIT: usize = 128;

/// An ordered set of distinct ASCII symbols.
#[derive(Clone, PartialEq, Eq)]
pub struct Alphabet {
    symbols: Vec<u8>,
    positions: [Option<u8>; ASCII_LIMIT],
}

impl Alphabet {
    pub fn new(symbols: &str) -> Result<Self> {
        if symbols.is_empty() {
            return Err(RarError::InvalidAlphabet("empty alphabet"));
        }
        if !symbols.is_ascii() {
            return Err(RarError::InvalidAlphabet("non-ASCII symbol"));
        }

        let mut seen = [false; ASCII_LIMIT];
        for byte in symbols.bytes() {
            if std::mem::replace(&mut seen[byte as usize], true) {
                return Err(RarError::InvalidAlphabet("duplicate symbol"));
            }
        }

        Ok(Self::from_distinct(symbols.as_bytes().to_vec()))
    }

    /// Digits, then uppercase, then lowercase (B = 62).
    pub fn alphanumeric() -> Self {
        let symbols = (b'0'..=b'9').chain(b'A'..=b'Z').chain(b'a'..=b'z').collect();
        Self::from_distinct(symbols)
    }

    fn from_distinct(symbols: Vec<u8>) -> Self {
        let mut positions = [None; ASCII_LIMIT];
        for (i, &byte) in symbols.iter().enumerate() {
            positions[byte as usize] = Some(i as u8);
        }
        Self { symbols, positions }
    }

    /// Alphabet size `B`.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn symbols(&self) -> &[u8] {
        &self.symbols
    }

    fn symbol(&self, digit: u8) -> char {
        char::from(self.symbols[digit as usize])
    }

    fn digit_of(&self, c: u8) -> Option<u8> {
        self.positions.get(c as usize).copied().flatten()
    }

    /// `B^length`, or `KeyspaceOverflow` past `u64`.
    pub fn size_for(&self, length: usize) -> Result<u64> {
        let overflow = || RarError::KeyspaceOverflow {
            base: self.len(),
            length,
        };
        u32::try_from(length)
            .ok()
            .and_then(|exp| (self.len() as u64).checked_pow(exp))
            .ok_or_else(overflow)
    }

    /// The `index`-th candidate of `length` symbols.
    pub fn index_to_string(&self, index: u64, length: usize) -> Result<String> {
        let digits = self.digits_of(index, length)?;
        Ok(digits.iter().map(|&d| self.symbol(d)).collect())
    }

    /// Inverse of [`index_to_string`](Self::index_to_string).
    pub fn string_to_index(&self, candidate: &str, length: usize) -> Result<u64> {
        if candidate.len() != length {
            return Err(RarError::InvalidCandidate("wrong length"));
        }
        // Bounds the accumulator below
        self.size_for(length)?;

        let base = self.len() as u64;
        candidate.bytes().try_fold(0u64, |acc, c| {
            let digit = self
                .digit_of(c)
                .ok_or(RarError::InvalidCandidate("symbol not in alphabet"))?;
            Ok(acc * base + u64::from(digit))
        })
    }

    fn digits_of(&self, mut index: u64, length: usize) -> Result<Vec<u8>> {
        let size = self.size_for(length)?;
        if index >= size {
            return Err(RarError::IndexOutOfRange { index, length });
        }

        let base = self.len() as u64;
        let mut digits = vec![0u8; length];
        for digit in digits.iter_mut().rev() {
            *digit = (index % base) as u8;
            index /= base;
        }
        Ok(digits)
    }
}

impl fmt::Debug for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Alphabet")
            .field(&String::from_utf8_lossy(&self.symbols))
            .finish()
    }
}

impl Default for Alphabet {
    fn default() -> Self {
        Self::alphanumeric()
    }
}

/// Half-open index range `[start, end)` of one candidate length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SearchTask {
    pub start: u64,
    pub end: u64,
    pub length: usize,
}

impl SearchTask {
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An alphabet with an inclusive length range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    alphabet: Alphabet,
    min_len: usize,
    max_len: usize,
    total: u64,
}

impl Keyspace {
    /// Fails if the range is inverted or the total count overflows `u64`.
    pub fn new(alphabet: Alphabet, min_len: usize, max_len: usize) -> Result<Self> {
        if min_len > max_len {
            return Err(RarError::InvalidConfig("min_len exceeds max_len"));
        }

        let mut total = 0u64;
        for length in min_len..=max_len {
            total = total
                .checked_add(alphabet.size_for(length)?)
                .ok_or(RarError::KeyspaceOverflow {
                    base: alphabet.len(),
                    length,
                })?;
        }

        Ok(Self {
            alphabet,
            min_len,
            max_len,
            total,
        })
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn min_len(&self) -> usize {
        self.min_len
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Candidates across every length.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn size_for(&self, length: usize) -> Result<u64> {
        self.alphabet.size_for(length)
    }

    /// Lazily cut the keyspace into tasks of at most `chunk_size` indices.
    ///
    /// Lengths ascend; within a length, tasks run from the top of the index
    /// range down. A `chunk_size` of 0 is treated as 1.
    pub fn tasks(&self, chunk_size: u64) -> Tasks<'_> {
        Tasks {
            keyspace: self,
            chunk_size: chunk_size.max(1),
            length: self.min_len,
            end: self.alphabet.size_for(self.min_len).unwrap_or(0),
        }
    }
}

/// Iterator returned by [`Keyspace::tasks`].
#[derive(Debug, Clone)]
pub struct Tasks<'a> {
    keyspace: &'a Keyspace,
    chunk_size: u64,
    length: usize,
    /// Exclusive upper bound of what is left of the current length
    end: u64,
}

impl Iterator for Tasks<'_> {
    type Item = SearchTask;

    fn next(&mut self) -> Option<SearchTask> {
        while self.end == 0 {
            if self.length >= self.keyspace.max_len {
                return None;
            }
            self.length += 1;
            // Sizes were checked when the keyspace was built
            self.end = self.keyspace.size_for(self.length).ok()?;
        }

        let start = self.end.saturating_sub(self.chunk_size);
        let task = SearchTask {
            start,
            end: self.end,
            length: self.length,
        };
        self.end = start;
        Some(task)
    }
}

/// Walks the candidates of one task in index order.
///
/// Only the symbols that change are rewritten between candidates.
#[derive(Debug, Clone)]
pub struct Odometer<'a> {
    alphabet: &'a Alphabet,
    digits: Vec<u8>,
    candidate: String,
    index: u64,
    remaining: u64,
    started: bool,
}

impl<'a> Odometer<'a> {
    pub fn new(alphabet: &'a Alphabet, task: &SearchTask) -> Result<Self> {
        let remaining = task.len();
        let (digits, candidate) = if remaining == 0 {
            (Vec::new(), String::new())
        } else {
            let digits = alphabet.digits_of(task.start, task.length)?;
            // The last index must exist too
            alphabet.digits_of(task.end - 1, task.length)?;
            let candidate = digits.iter().map(|&d| alphabet.symbol(d)).collect();
            (digits, candidate)
        };

        Ok(Self {
            alphabet,
            digits,
            candidate,
            index: task.start,
            remaining,
            started: false,
        })
    }

    /// Index of the candidate last returned by [`advance`](Self::advance).
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Move to the next candidate.
    pub fn advance(&mut self) -> Option<&str> {
        if self.remaining == 0 {
            return None;
        }
        if self.started {
            self.increment();
            self.index += 1;
        } else {
            self.started = true;
        }
        self.remaining -= 1;
        Some(&self.candidate)
    }

    fn increment(&mut self) {
        let base = self.alphabet.len();
        for pos in (0..self.digits.len()).rev() {
            let next = self.digits[pos] as usize + 1;
            let (digit, carry) = if next < base { (next as u8, false) } else { (0, true) };
            self.digits[pos] = digit;

            let mut buf = [0u8; 4];
            let symbol = self.alphabet.symbol(digit).encode_utf8(&mut buf);
            self.candidate.replace_range(pos..=pos, symbol);

            if !carry {
                return;
            }
        }
    }
}
