// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Reconstruction of a raw image from a transfer list and its new data stream.
//!
//! The new data stream only contains the blocks written by `new` commands, in
//! the order they appear in the transfer list. Each range of a `new` command
//! receives the next unread blocks from the stream, regardless of where the
//! range is located in the image. `erase` and `zero` commands never touch the
//! stream or the output. They only contribute to the final image size.

use std::{
    ffi::OsStr,
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, debug_span, trace};

use crate::{
    format::{
        rangeset::BlockRange,
        transfer_list::{BLOCK_SIZE, Command, TransferList},
    },
    stream::{self, CountingReader, ReadFillExt, SetLen},
    util::{self, NumBytes},
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Transfer list contains no block ranges")]
    NoOperations,
    #[error("Byte offset of block {0} overflows")]
    OffsetOverflow(u64),
    #[error("New data ended early for range {range:?}: expected {expected} bytes, but have {actual}")]
    TruncatedSource {
        range: BlockRange,
        expected: u64,
        actual: u64,
    },
    #[error("New data file not found: {0:?}")]
    SourceNotFound(PathBuf),
    #[error("Output file already exists: {0:?}")]
    SinkConflict(PathBuf),
    #[error("Failed to read new data: {0}")]
    DataRead(&'static str, #[source] io::Error),
    #[error("Failed to write image: {0}")]
    DataWrite(&'static str, #[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Statistics for a successful reconstruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Summary {
    /// Number of blocks copied from the new data stream.
    pub new_blocks: u64,
    /// Number of bytes consumed from the new data stream.
    pub bytes_read: u64,
    /// Final size of the image in bytes.
    pub image_size: u64,
}

fn block_offset(block: u64) -> Result<u64> {
    block
        .checked_mul(BLOCK_SIZE)
        .ok_or(Error::OffsetOverflow(block))
}

/// Copy the next blocks from `source` into `range` of `sink`. The source is
/// read one block at a time.
fn copy_range(
    source: &mut impl Read,
    sink: &mut (impl Write + Seek),
    range: BlockRange,
    buf: &mut [u8],
    cancel_signal: &AtomicBool,
) -> Result<()> {
    // This cannot overflow because the end of the furthest range was checked.
    let offset = range.start * BLOCK_SIZE;

    trace!("Copying {range:?} to offset {offset}");

    sink.seek(SeekFrom::Start(offset))
        .map_err(|e| Error::DataWrite("seek", e))?;

    for block in range {
        stream::check_cancel(cancel_signal).map_err(|e| Error::DataRead("new_data", e))?;

        let n = source
            .read_fill(buf)
            .map_err(|e| Error::DataRead("new_data", e))?;

        if n != buf.len() {
            return Err(Error::TruncatedSource {
                range,
                expected: range.len() * BLOCK_SIZE,
                actual: (block - range.start) * BLOCK_SIZE + n as u64,
            });
        }

        sink.write_all(buf)
            .map_err(|e| Error::DataWrite("new_data", e))?;
    }

    Ok(())
}

/// Reconstruct a raw image from `transfer_list` and the decompressed new data
/// stream in `source`. The sink is sized to cover the furthest block of any
/// command. Regions not written by `new` commands are left untouched, so they
/// read back as zeros for a newly created sink.
///
/// On error, the contents of `sink` are unspecified and should be discarded.
pub fn reconstruct_image(
    transfer_list: TransferList,
    source: impl Read,
    mut sink: impl Write + Seek + SetLen,
    cancel_signal: &AtomicBool,
) -> Result<Summary> {
    let max_end = transfer_list.max_end().ok_or(Error::NoOperations)?;
    let image_size = block_offset(max_end)?;

    debug!(
        "Applying {} commands to image of size {:?}",
        transfer_list.commands.len(),
        NumBytes(image_size),
    );

    let mut source = CountingReader::new(source);
    let mut buf = vec![0u8; BLOCK_SIZE as usize];
    let mut new_blocks = 0;

    for (index, command) in transfer_list.commands.into_iter().enumerate() {
        let _span = debug_span!("command", index, name = command.name()).entered();

        match command {
            Command::New(ranges) => {
                debug!("Writing {} blocks", ranges.num_blocks());

                for range in &ranges {
                    copy_range(&mut source, &mut sink, *range, &mut buf, cancel_signal)?;
                }

                new_blocks += ranges.num_blocks();
            }
            Command::Erase(ranges) | Command::Zero(ranges) => {
                debug!("Leaving {} blocks untouched", ranges.num_blocks());
            }
        }
    }

    let size = sink
        .seek(SeekFrom::End(0))
        .map_err(|e| Error::DataWrite("size", e))?;

    if size < image_size {
        debug!("Extending image from {size} to {image_size} bytes");

        sink.set_len(image_size)
            .map_err(|e| Error::DataWrite("set_len", e))?;
    }

    sink.flush().map_err(|e| Error::DataWrite("flush", e))?;

    let (_, bytes_read) = source.finish();

    Ok(Summary {
        new_blocks,
        bytes_read,
        image_size,
    })
}

/// Open the new data file for reading.
pub fn open_source(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            Error::SourceNotFound(path.to_owned())
        } else {
            Error::DataRead("open", e)
        }
    })
}

/// Create a temporary file next to `path` for writing the image. This fails
/// if `path` already exists. The temporary file is deleted when dropped unless
/// it is moved into place with [`persist_sink`].
pub fn create_sink(path: &Path) -> Result<NamedTempFile> {
    if path
        .try_exists()
        .map_err(|e| Error::DataWrite("exists", e))?
    {
        return Err(Error::SinkConflict(path.to_owned()));
    }

    NamedTempFile::with_prefix_in(
        path.file_name()
            .unwrap_or_else(|| OsStr::new("sdat2img.tmp")),
        util::parent_path(path),
    )
    .map_err(|e| Error::DataWrite("temp_file", e))
}

/// Move the temporary image created by [`create_sink`] to `path`. This never
/// replaces an existing file.
pub fn persist_sink(sink: NamedTempFile, path: &Path) -> Result<File> {
    // NamedTempFile forces 600 permissions on temp files because it's the safe
    // option for a shared /tmp. Since we're writing to the output file's
    // directory, just mimic umask.
    #[cfg(unix)]
    {
        use std::{fs::Permissions, os::unix::prelude::PermissionsExt};

        use rustix::{fs::Mode, process::umask};

        let mask = umask(Mode::empty());
        umask(mask);

        // Mac uses a 16-bit value.
        #[allow(clippy::useless_conversion)]
        let mode = u32::from(0o666 & !mask.bits());

        sink.as_file()
            .set_permissions(Permissions::from_mode(mode))
            .map_err(|e| Error::DataWrite("permissions", e))?;
    }

    sink.persist_noclobber(path).map_err(|e| {
        if e.error.kind() == io::ErrorKind::AlreadyExists {
            Error::SinkConflict(path.to_owned())
        } else {
            Error::DataWrite("persist", e.error)
        }
    })
}
