// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs::File,
    io::{self, Cursor, Read, Seek, SeekFrom},
    sync::atomic::{AtomicBool, Ordering},
};

use tempfile::NamedTempFile;

/// Common function for reading a structure from a reader.
pub trait FromReader<R: Read>: Sized {
    type Error;

    fn from_reader(reader: R) -> Result<Self, Self::Error>;
}

/// Extensions for readers to read fixed-size buffers.
pub trait ReadFixedSizeExt {
    /// Read fixed-size array.
    fn read_array_exact<const N: usize>(&mut self) -> io::Result<[u8; N]>;
}

impl<R: Read> ReadFixedSizeExt for R {
    fn read_array_exact<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Extensions for readers to fill a buffer without treating EOF as an error.
pub trait ReadFillExt {
    /// Read until `buf` is full or EOF is reached. Unlike
    /// [`Read::read_exact`], the number of bytes read is reported when EOF is
    /// reached early.
    fn read_fill(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl<R: Read> ReadFillExt for R {
    fn read_fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;

        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        Ok(filled)
    }
}

/// Extensions for file-like types that can be resized. Growing the file must
/// not change existing data and the new region must read back as zeros. No
/// guarantees are made about the state of the underlying file position after
/// performing any operation.
pub trait SetLen {
    fn set_len(&mut self, size: u64) -> io::Result<()>;
}

macro_rules! set_len_blanket_impl {
    ($type:ty) => {
        impl<F: ?Sized + SetLen> SetLen for $type {
            fn set_len(&mut self, size: u64) -> io::Result<()> {
                (**self).set_len(size)
            }
        }
    };
}

set_len_blanket_impl!(&mut F);
set_len_blanket_impl!(Box<F>);

impl SetLen for File {
    fn set_len(&mut self, size: u64) -> io::Result<()> {
        File::set_len(self, size)
    }
}

impl SetLen for NamedTempFile {
    fn set_len(&mut self, size: u64) -> io::Result<()> {
        self.as_file().set_len(size)
    }
}

impl SetLen for Cursor<Vec<u8>> {
    fn set_len(&mut self, size: u64) -> io::Result<()> {
        let size = usize::try_from(size).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Size {size} does not fit in memory"),
            )
        })?;

        self.get_mut().resize(size, 0);

        Ok(())
    }
}

/// A reader wrapper that implements [`Seek`], but only for reporting the
/// current file position.
pub struct CountingReader<R> {
    inner: R,
    offset: u64,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    pub fn finish(self) -> (R, u64) {
        (self.inner, self.offset)
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.offset += n as u64;
        Ok(n)
    }
}

impl<R: Read> Seek for CountingReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if pos == SeekFrom::Current(0) {
            Ok(self.offset)
        } else {
            Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Can only report current offset",
            ))
        }
    }
}

/// Returns an I/O error with the [`io::ErrorKind::Interrupted`] type if
/// `cancel_signal` is true. This should be called frequently in I/O loops for
/// cancellation to be responsive.
#[inline]
pub fn check_cancel(cancel_signal: &AtomicBool) -> io::Result<()> {
    if cancel_signal.load(Ordering::SeqCst) {
        return Err(io::Error::new(
            io::ErrorKind::Interrupted,
            "Received cancel signal",
        ));
    }

    Ok(())
}
