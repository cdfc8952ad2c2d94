// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    io::{self, Read, Seek},
    path::Path,
};

use brotli::Decompressor;
use clap::ValueEnum;
use flate2::read::GzDecoder;
use liblzma::read::XzDecoder;
use lz4_flex::frame::FrameDecoder;
use thiserror::Error;

use crate::stream::ReadFixedSizeExt;

static GZIP_MAGIC: &[u8; 2] = b"\x1f\x8b";
static LZ4_FRAME_MAGIC: &[u8; 4] = b"\x04\x22\x4d\x18";
static XZ_MAGIC: &[u8; 6] = b"\xfd\x37\x7a\x58\x5a\x00";

/// Internal buffer size for the brotli decoder.
const BROTLI_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown compression format")]
    UnknownFormat,
    #[error("I/O error when autodetecting compression format")]
    AutoDetect(#[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompressedFormat {
    None,
    Brotli,
    Gzip,
    Lz4,
    Xz,
}

impl CompressedFormat {
    /// Guess the format from the file extension. Brotli streams have no magic
    /// value, so this is the only way to detect them.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?;

        match extension.to_ascii_lowercase().as_str() {
            "br" => Some(Self::Brotli),
            "gz" => Some(Self::Gzip),
            "lz4" => Some(Self::Lz4),
            "xz" => Some(Self::Xz),
            "dat" => Some(Self::None),
            _ => None,
        }
    }
}

pub enum CompressedReader<R: Read> {
    None(R),
    /// Not autodetected. Boxed because the decoder state is large.
    Brotli(Box<Decompressor<R>>),
    Gzip(GzDecoder<R>),
    Lz4(FrameDecoder<R>),
    Xz(XzDecoder<R>),
}

impl<R: Read> CompressedReader<R> {
    pub fn with_format(reader: R, format: CompressedFormat) -> Self {
        match format {
            CompressedFormat::None => Self::None(reader),
            CompressedFormat::Brotli => {
                Self::Brotli(Box::new(Decompressor::new(reader, BROTLI_BUFFER_SIZE)))
            }
            CompressedFormat::Gzip => Self::Gzip(GzDecoder::new(reader)),
            CompressedFormat::Lz4 => Self::Lz4(FrameDecoder::new(reader)),
            CompressedFormat::Xz => Self::Xz(XzDecoder::new(reader)),
        }
    }

    pub fn format(&self) -> CompressedFormat {
        match self {
            Self::None(_) => CompressedFormat::None,
            Self::Brotli(_) => CompressedFormat::Brotli,
            Self::Gzip(_) => CompressedFormat::Gzip,
            Self::Lz4(_) => CompressedFormat::Lz4,
            Self::Xz(_) => CompressedFormat::Xz,
        }
    }
}

impl<R: Read + Seek> CompressedReader<R> {
    /// Autodetect the compression format from the magic value. Files shorter
    /// than the longest magic value are treated as unknown.
    pub fn new(mut reader: R, raw_if_unknown: bool) -> Result<Self> {
        let magic = match reader.read_array_exact::<6>() {
            Ok(magic) => Some(magic),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => None,
            Err(e) => return Err(Error::AutoDetect(e)),
        };

        reader.rewind().map_err(Error::AutoDetect)?;

        match magic {
            Some(m) if &m[0..2] == GZIP_MAGIC => Ok(Self::Gzip(GzDecoder::new(reader))),
            Some(m) if &m[0..4] == LZ4_FRAME_MAGIC => Ok(Self::Lz4(FrameDecoder::new(reader))),
            Some(m) if &m == XZ_MAGIC => Ok(Self::Xz(XzDecoder::new(reader))),
            _ if raw_if_unknown => Ok(Self::None(reader)),
            _ => Err(Error::UnknownFormat),
        }
    }
}

impl<R: Read> Read for CompressedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::None(r) => r.read(buf),
            Self::Brotli(r) => r.read(buf),
            Self::Gzip(r) => r.read(buf),
            Self::Lz4(r) => r.read(buf),
            Self::Xz(r) => r.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn format_from_path() {
        assert_eq!(
            CompressedFormat::from_path(Path::new("system.new.dat.br")),
            Some(CompressedFormat::Brotli),
        );
        assert_eq!(
            CompressedFormat::from_path(Path::new("vendor.new.dat.XZ")),
            Some(CompressedFormat::Xz),
        );
        assert_eq!(
            CompressedFormat::from_path(Path::new("system.new.dat")),
            Some(CompressedFormat::None),
        );
        assert_eq!(CompressedFormat::from_path(Path::new("system")), None);
        assert_eq!(CompressedFormat::from_path(Path::new("a.bin")), None);
    }
}
