// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs::File,
    io::{self, BufRead, BufReader, Lines, Read},
    num::ParseIntError,
    path::{Path, PathBuf},
    str::FromStr,
};

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::{
    format::rangeset::{self, BlockRange, RangeSet},
    stream::FromReader,
};

/// Size of a block in bytes. This is fixed for block-based OTAs.
pub const BLOCK_SIZE: u64 = 4096;

/// Versions starting from this one have the stash entry and stash block
/// counts in the header.
const STASH_HEADER_VERSION: u32 = 2;

const COMMAND_NEW: &str = "new";
const COMMAND_ERASE: &str = "erase";
const COMMAND_ZERO: &str = "zero";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Transfer list not found: {0:?}")]
    ListNotFound(PathBuf),
    #[error("Missing header field: {0}")]
    MissingHeader(&'static str),
    #[error("Line {line}: Invalid {field}: {value:?}")]
    InvalidHeader {
        line: usize,
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("Line {line}: Invalid range set for {command:?} command: {token:?}")]
    RangeFormat {
        line: usize,
        command: &'static str,
        token: String,
        #[source]
        source: rangeset::Error,
    },
    #[error("Line {line}: Unknown command: {command:?}")]
    UnknownCommand { line: usize, command: String },
    #[error("Failed to read transfer list: {0}")]
    DataRead(&'static str, #[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// A single transfer list command. Only [`Command::New`] consumes data from
/// the new data stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Copy the next blocks from the new data stream into these ranges.
    New(RangeSet),
    /// Discard these ranges.
    Erase(RangeSet),
    /// Fill these ranges with zeros.
    Zero(RangeSet),
}

impl Command {
    /// Keyword used for this command in the transfer list.
    pub fn name(&self) -> &'static str {
        match self {
            Self::New(_) => COMMAND_NEW,
            Self::Erase(_) => COMMAND_ERASE,
            Self::Zero(_) => COMMAND_ZERO,
        }
    }

    pub fn ranges(&self) -> &RangeSet {
        match self {
            Self::New(r) | Self::Erase(r) | Self::Zero(r) => r,
        }
    }
}

/// Parsed transfer list from a block-based OTA.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferList {
    pub version: u32,
    /// Number of blocks the new data stream is expected to contain. This is
    /// informational only.
    pub new_blocks: u64,
    pub commands: Vec<Command>,
}

impl TransferList {
    /// Iterate through every range of every command, in order.
    pub fn ranges(&self) -> impl Iterator<Item = &BlockRange> + '_ {
        self.commands.iter().flat_map(|c| c.ranges())
    }

    /// Highest ending block across all commands, or [`None`] if there are no
    /// ranges at all.
    pub fn max_end(&self) -> Option<u64> {
        self.ranges().map(|r| r.end).max()
    }

    /// Total number of blocks written by [`Command::New`] commands.
    pub fn num_new_blocks(&self) -> u64 {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::New(_)))
            .map(|c| c.ranges().num_blocks())
            .sum()
    }
}

/// Line iterator that keeps track of the current line number.
struct LineReader<B> {
    lines: Lines<B>,
    line: usize,
}

impl<B: BufRead> LineReader<B> {
    fn new(reader: B) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        let Some(line) = self.lines.next() else {
            return Ok(None);
        };

        self.line += 1;

        line.map(Some).map_err(|e| Error::DataRead("line", e))
    }

    fn header<T: FromStr<Err = ParseIntError>>(&mut self, field: &'static str) -> Result<T> {
        let value = self.next_line()?.ok_or(Error::MissingHeader(field))?;

        value.trim().parse().map_err(|e| Error::InvalidHeader {
            line: self.line,
            field,
            value,
            source: e,
        })
    }
}

impl<R: Read> FromReader<R> for TransferList {
    type Error = Error;

    fn from_reader(reader: R) -> Result<Self> {
        let mut reader = LineReader::new(BufReader::new(reader));

        let version: u32 = reader.header("version")?;
        let new_blocks: u64 = reader.header("new block count")?;

        if version >= STASH_HEADER_VERSION {
            // Stash entry count and stash block count. Stashing is only used
            // by incremental OTAs.
            reader.next_line()?;
            reader.next_line()?;
        }

        debug!("Transfer list version {version} with {new_blocks} new blocks");

        let mut commands = vec![];

        while let Some(line) = reader.next_line()? {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }

            let (keyword, token) = line.split_once(' ').unwrap_or((line, ""));

            let (command, constructor): (_, fn(RangeSet) -> Command) = match keyword {
                COMMAND_NEW => (COMMAND_NEW, Command::New),
                COMMAND_ERASE => (COMMAND_ERASE, Command::Erase),
                COMMAND_ZERO => (COMMAND_ZERO, Command::Zero),
                // Some variants of the format have lines that start with a
                // bare number. These carry nothing needed for the image.
                k if k.starts_with(|c: char| c.is_ascii_digit()) => {
                    trace!("Line {}: Skipping numeric line: {line:?}", reader.line);
                    continue;
                }
                k => {
                    return Err(Error::UnknownCommand {
                        line: reader.line,
                        command: k.to_owned(),
                    });
                }
            };

            let token = token.trim();
            let ranges = token.parse::<RangeSet>().map_err(|e| Error::RangeFormat {
                line: reader.line,
                command,
                token: token.to_owned(),
                source: e,
            })?;

            commands.push(constructor(ranges));
        }

        let transfer_list = Self {
            version,
            new_blocks,
            commands,
        };

        let actual_new_blocks = transfer_list.num_new_blocks();
        if actual_new_blocks != new_blocks {
            warn!(
                "Header declares {new_blocks} new blocks, but commands write {actual_new_blocks}"
            );
        }

        Ok(transfer_list)
    }
}

impl FromStr for TransferList {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_reader(s.as_bytes())
    }
}

/// Read and parse a transfer list from a file.
pub fn read_file(path: &Path) -> Result<TransferList> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            Error::ListNotFound(path.to_owned())
        } else {
            Error::DataRead("open", e)
        }
    })?;

    TransferList::from_reader(file)
}
