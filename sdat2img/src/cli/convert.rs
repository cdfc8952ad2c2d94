// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    io::{BufReader, Read},
    path::PathBuf,
    sync::atomic::AtomicBool,
    time::Instant,
};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use crate::{
    cli::{status, warning},
    format::{
        compression::{CompressedFormat, CompressedReader},
        transfer_list,
    },
    image,
    util::NumBytes,
};

pub fn convert_main(cli: &ConvertCli, cancel_signal: &AtomicBool) -> Result<()> {
    let start = Instant::now();

    status!("Parsing transfer list: {:?}", cli.transfer_list);

    let transfer_list = transfer_list::read_file(&cli.transfer_list)
        .with_context(|| format!("Failed to parse transfer list: {:?}", cli.transfer_list))?;

    let mut sink = image::create_sink(&cli.output)
        .with_context(|| format!("Failed to create output image: {:?}", cli.output))?;

    let raw_reader = image::open_source(&cli.new_data)
        .map(BufReader::new)
        .with_context(|| format!("Failed to open for reading: {:?}", cli.new_data))?;

    let mut reader = match cli
        .format
        .or_else(|| CompressedFormat::from_path(&cli.new_data))
    {
        Some(format) => CompressedReader::with_format(raw_reader, format),
        None => CompressedReader::new(raw_reader, true).with_context(|| {
            format!("Failed to detect compression format: {:?}", cli.new_data)
        })?,
    };

    debug!("New data compression format: {:?}", reader.format());

    status!("Writing image: {:?}", cli.output);

    let summary = image::reconstruct_image(transfer_list, &mut reader, &mut sink, cancel_signal)
        .with_context(|| {
            format!(
                "Failed to reconstruct image: {:?} -> {:?}",
                cli.new_data, cli.output
            )
        })?;

    let mut trailing = [0u8; 1];
    if reader
        .read(&mut trailing)
        .with_context(|| format!("Failed to read new data: {:?}", cli.new_data))?
        != 0
    {
        warning!(
            "New data has unused data after {:?}",
            NumBytes(summary.bytes_read)
        );
    }

    image::persist_sink(sink, &cli.output)
        .with_context(|| format!("Failed to move temporary file to output path: {:?}", cli.output))?;

    info!(
        "Copied {} new blocks ({:?}) into image of size {:?}",
        summary.new_blocks,
        NumBytes(summary.bytes_read),
        NumBytes(summary.image_size),
    );

    status!("Completed after {:.1}s", start.elapsed().as_secs_f64());

    Ok(())
}

/// Convert a block-based OTA's new data into a raw image.
///
/// The new data file may be compressed. The format is detected from the file
/// extension (eg. `.br` for brotli) or, failing that, from the file contents.
#[derive(Debug, Parser)]
pub struct ConvertCli {
    /// Path to the transfer list.
    #[arg(
        short,
        long,
        value_name = "FILE",
        value_parser,
        default_value = "system.transfer.list"
    )]
    pub transfer_list: PathBuf,

    /// Path to the (possibly compressed) new data.
    #[arg(
        short = 'd',
        long,
        value_name = "FILE",
        value_parser,
        default_value = "system.new.dat.br"
    )]
    pub new_data: PathBuf,

    /// Path to the output raw image.
    ///
    /// The file must not already exist.
    #[arg(
        short,
        long,
        value_name = "FILE",
        value_parser,
        default_value = "system.img"
    )]
    pub output: PathBuf,

    /// Compression format of the new data.
    ///
    /// If unspecified, the format is detected automatically.
    #[arg(short, long, value_name = "FORMAT", value_enum)]
    pub format: Option<CompressedFormat>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn default_paths() {
        let cli = ConvertCli::try_parse_from(["convert"]).unwrap();

        assert_eq!(cli.transfer_list, PathBuf::from("system.transfer.list"));
        assert_eq!(cli.new_data, PathBuf::from("system.new.dat.br"));
        assert_eq!(cli.output, PathBuf::from("system.img"));
        assert_eq!(cli.format, None);
    }

    #[test]
    fn explicit_format() {
        let cli = ConvertCli::try_parse_from(["convert", "-d", "vendor.new.dat", "-f", "brotli"])
            .unwrap();

        assert_eq!(cli.format, Some(CompressedFormat::Brotli));
    }
}
