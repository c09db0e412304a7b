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

use std::io;

use thiserror::Error;

/// Everything that can abort decoding a PE image.
///
/// All variants are fatal to the `open` call that produced them; there is
/// no partially decoded image.
#[derive(Error, Debug)]
pub enum PeError {
    /// A fixed-size region ran past the end of the byte source.
    #[error("truncated read: wanted {wanted} bytes at file offset 0x{offset:x}")]
    TruncatedRead { offset: u64, wanted: usize },

    /// The Optional header is shorter than its magic's field layout.
    #[error("truncated optional header (magic 0x{magic:04x}): {available} of {wanted} bytes")]
    TruncatedHeader {
        magic: u16,
        wanted: usize,
        available: usize,
    },

    #[error("invalid PE signature at file offset 0x{offset:x}: {found:02x?}")]
    InvalidSignature { offset: u64, found: [u8; 4] },

    #[error("unsupported optional header magic 0x{0:04x}")]
    UnsupportedOptionalHeaderMagic(u16),

    /// Resource directory recursion went past the type/name/language levels,
    /// or revisited a directory already on the current path.
    #[error("resource tree too deep: directory at file offset 0x{offset:x} sits at depth {depth}")]
    ResourceTreeTooDeep { offset: u64, depth: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, PeError>;
