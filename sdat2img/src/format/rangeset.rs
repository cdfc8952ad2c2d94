// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{fmt, num::ParseIntError, ops::Range, slice, str::FromStr};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid integer: {0:?}")]
    InvalidInteger(String, #[source] ParseIntError),
    #[error("Expected {expected} integers after the count, but have {actual}")]
    CountMismatch { expected: u64, actual: usize },
    #[error("Odd number of range bounds: {0}")]
    OddCount(usize),
    #[error("Range #{index}: End block {end} is not after start block {start}")]
    EmptyRange { index: usize, start: u64, end: u64 },
}

type Result<T> = std::result::Result<T, Error>;

/// Half-open range of blocks.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    /// Starting block (inclusive).
    pub start: u64,
    /// Ending block (exclusive).
    pub end: u64,
}

impl fmt::Debug for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl IntoIterator for BlockRange {
    type Item = u64;

    type IntoIter = Range<u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.start..self.end
    }
}

impl BlockRange {
    /// Length in blocks.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }
}

/// An ordered list of block ranges, as encoded in a single transfer list
/// token. The ranges are kept exactly as they appear in the token. They are
/// not sorted or merged, and may overlap.
///
/// The text form is `<count>,<start0>,<end0>,<start1>,<end1>,...`, where
/// `<count>` is the number of integers that follow it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RangeSet(Vec<BlockRange>);

impl fmt::Debug for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();

        for range in &self.0 {
            // No alternate mode for no inner newlines.
            list.entry(&format_args!("{range:?}"));
        }

        list.finish()
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.len() * 2)?;

        for range in &self.0 {
            write!(f, ",{},{}", range.start, range.end)?;
        }

        Ok(())
    }
}

impl FromStr for RangeSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let nums = s
            .split(',')
            .map(|n| {
                n.trim()
                    .parse::<u64>()
                    .map_err(|e| Error::InvalidInteger(n.to_owned(), e))
            })
            .collect::<Result<Vec<_>>>()?;

        let Some((&count, bounds)) = nums.split_first() else {
            // split() always yields at least one item.
            unreachable!()
        };

        if bounds.len() as u64 != count {
            return Err(Error::CountMismatch {
                expected: count,
                actual: bounds.len(),
            });
        } else if bounds.len() % 2 != 0 {
            return Err(Error::OddCount(bounds.len()));
        }

        let ranges = bounds
            .chunks_exact(2)
            .enumerate()
            .map(|(index, pair)| {
                let (start, end) = (pair[0], pair[1]);
                if end <= start {
                    return Err(Error::EmptyRange { index, start, end });
                }

                Ok(BlockRange { start, end })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self(ranges))
    }
}

impl<'a> IntoIterator for &'a RangeSet {
    type Item = &'a BlockRange;

    type IntoIter = slice::Iter<'a, BlockRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Vec<BlockRange>> for RangeSet {
    fn from(ranges: Vec<BlockRange>) -> Self {
        Self(ranges)
    }
}

impl RangeSet {
    pub fn iter(&self) -> slice::Iter<'_, BlockRange> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[BlockRange] {
        &self.0
    }

    /// Number of ranges.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of blocks across all ranges. Overlapping blocks are
    /// counted once per range that contains them.
    pub fn num_blocks(&self) -> u64 {
        self.0.iter().map(|r| r.len()).sum()
    }

    /// Highest ending block, or [`None`] if there are no ranges.
    pub fn max_end(&self) -> Option<u64> {
        self.0.iter().map(|r| r.end).max()
    }
}
