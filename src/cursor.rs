/*
 * Static decoder for the on-disk layout of PE images.
 * 
 * The MIT License (MIT)
 * 
 * Copyright (c) 2015 athre0z
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 * 
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 * 
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! Little-endian primitive readers.
//!
//! [`ByteCursor`] walks a seekable byte source and is what every decoder
//! reads the file through. [`SliceReader`] does the same over a header
//! buffer that has already been pulled into memory.

use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{PeError, Result};

/// Sequential/random-access reader over a seekable byte source.
///
/// The cursor tracks its own absolute offset so a short read can be
/// reported against the offset it started at.
pub struct ByteCursor<R> {
    inner: R,
    pos: u64,
}

impl<R: Read + Seek> ByteCursor<R> {
    /// Takes ownership of `inner` and rewinds it to the start of the file.
    pub fn new(mut inner: R) -> Result<ByteCursor<R>> {
        inner.seek(SeekFrom::Start(0))?;
        Ok(ByteCursor { inner, pos: 0 })
    }

    /// Absolute file offset of the next read.
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.pos = offset;
        Ok(())
    }

    /// Runs one fixed-width read, advancing the tracked offset on success.
    fn read_with<T, F>(&mut self, wanted: usize, read: F) -> Result<T>
    where
        F: FnOnce(&mut R) -> io::Result<T>,
    {
        let offset = self.pos;
        match read(&mut self.inner) {
            Ok(value) => {
                self.pos += wanted as u64;
                Ok(value)
            }
            Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(PeError::TruncatedRead { offset, wanted })
            }
            Err(e) => Err(PeError::Io(e)),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_with(1, |r| r.read_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_with(2, |r| r.read_u16::<LittleEndian>())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_with(4, |r| r.read_u32::<LittleEndian>())
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_with(8, |r| r.read_u64::<LittleEndian>())
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.read_with(1, |r| r.read_i8())
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.read_with(2, |r| r.read_i16::<LittleEndian>())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_with(4, |r| r.read_i32::<LittleEndian>())
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.read_with(8, |r| r.read_i64::<LittleEndian>())
    }

    /// Reads exactly `N` bytes at the current offset.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.read_with(N, |r| {
            let mut buf = [0u8; N];
            r.read_exact(&mut buf)?;
            Ok(buf)
        })
    }

    /// Reads exactly `len` bytes at the current offset.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        self.read_with(len, |r| {
            let mut buf = vec![0u8; len];
            r.read_exact(&mut buf)?;
            Ok(buf)
        })
    }

    /// Seeks to `offset` and reads exactly `len` bytes from there.
    pub fn read_exact_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.seek(offset)?;
        self.read_bytes(len)
    }

    /// Gives the byte source back.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Little-endian sequential reads over an in-memory header buffer.
///
/// `base` is the file offset the buffer was read from, so truncation is
/// still reported as an absolute file offset.
pub struct SliceReader<'a> {
    data: &'a [u8],
    consumed: usize,
    base: u64,
}

impl<'a> SliceReader<'a> {
    pub fn new(data: &'a [u8], base: u64) -> SliceReader<'a> {
        SliceReader {
            data,
            consumed: 0,
            base,
        }
    }

    /// Number of bytes read so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.consumed
    }

    fn read_with<T, F>(&mut self, wanted: usize, read: F) -> Result<T>
    where
        F: FnOnce(&mut &'a [u8]) -> io::Result<T>,
    {
        let data = self.data;
        let mut rest = &data[self.consumed..];
        match read(&mut rest) {
            Ok(value) => {
                self.consumed += wanted;
                Ok(value)
            }
            Err(_) => Err(PeError::TruncatedRead {
                offset: self.base + self.consumed as u64,
                wanted,
            }),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_with(1, |r| r.read_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_with(2, |r| r.read_u16::<LittleEndian>())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_with(4, |r| r.read_u32::<LittleEndian>())
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_with(8, |r| r.read_u64::<LittleEndian>())
    }
}
