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

//! Byte-level fixture builders shared by the unit tests.

use crate::pe::{PE32PLUS_MAGIC, PE32_MAGIC};

/// File offset the builder places the PE signature at.
pub const NT_HEADER_OFFS: usize = 0x40;

fn put(buf: &mut Vec<u8>, at: usize, bytes: &[u8]) {
    if buf.len() < at + bytes.len() {
        buf.resize(at + bytes.len(), 0);
    }
    buf[at..at + bytes.len()].copy_from_slice(bytes);
}

pub fn put_u16(buf: &mut Vec<u8>, at: usize, value: u16) {
    put(buf, at, &value.to_le_bytes());
}

pub fn put_u32(buf: &mut Vec<u8>, at: usize, value: u32) {
    put(buf, at, &value.to_le_bytes());
}

/// The Optional header fields tests care about; everything else is zero.
#[derive(Default)]
pub struct OptionalFields {
    pub entry_point: u32,
    pub base_of_data: u32,
    pub image_base: u64,
    pub stack_reserve: u64,
    pub heap_commit: u64,
    pub subsystem: u16,
    pub dll_characteristics: u16,
}

/// Lays out an Optional header of `len` bytes for `magic` with
/// `NumberOfRvaAndSizes = count` and `dirs` written after the fixed part.
/// Unknown magics get the PE32 layout.
pub fn optional_header(
    magic: u16,
    fields: &OptionalFields,
    count: u32,
    dirs: &[(u32, u32)],
    len: usize,
) -> Vec<u8> {
    let mut buf = Vec::new();
    put_u16(&mut buf, 0, magic);
    put_u32(&mut buf, 16, fields.entry_point);
    let dirs_at = if magic == PE32PLUS_MAGIC {
        put(&mut buf, 24, &fields.image_base.to_le_bytes());
        put_u16(&mut buf, 68, fields.subsystem);
        put_u16(&mut buf, 70, fields.dll_characteristics);
        put(&mut buf, 72, &fields.stack_reserve.to_le_bytes());
        put(&mut buf, 96, &fields.heap_commit.to_le_bytes());
        put_u32(&mut buf, 108, count);
        112
    } else {
        put_u32(&mut buf, 24, fields.base_of_data);
        put_u32(&mut buf, 28, fields.image_base as u32);
        put_u16(&mut buf, 68, fields.subsystem);
        put_u16(&mut buf, 70, fields.dll_characteristics);
        put_u32(&mut buf, 72, fields.stack_reserve as u32);
        put_u32(&mut buf, 84, fields.heap_commit as u32);
        put_u32(&mut buf, 92, count);
        96
    };
    for (i, &(va, size)) in dirs.iter().enumerate() {
        put_u32(&mut buf, dirs_at + 8 * i, va);
        put_u32(&mut buf, dirs_at + 8 * i + 4, size);
    }
    buf.resize(len, 0);
    buf
}

/// One 40-byte section record; relocation/line-number fields are zero.
pub fn section_record(
    name: &[u8],
    virtual_address: u32,
    size_of_raw_data: u32,
    pointer_to_raw_data: u32,
    characteristics: u32,
) -> Vec<u8> {
    let mut rec = vec![0u8; 40];
    rec[..name.len()].copy_from_slice(name);
    put_u32(&mut rec, 12, virtual_address);
    put_u32(&mut rec, 16, size_of_raw_data);
    put_u32(&mut rec, 20, pointer_to_raw_data);
    put_u32(&mut rec, 36, characteristics);
    rec
}

/// Assembles a whole image: DOS stub, signature, COFF header, Optional
/// header, section table and any extra data at fixed file offsets.
pub struct ImageBuilder {
    machine: u16,
    characteristics: u16,
    time_date_stamp: u32,
    optional: Vec<u8>,
    sections: Vec<Vec<u8>>,
    blobs: Vec<(usize, Vec<u8>)>,
}

impl ImageBuilder {
    /// x64 executable with a 240-byte PE32+ Optional header and no
    /// data directories.
    pub fn new() -> ImageBuilder {
        ImageBuilder {
            machine: 0x8664,
            characteristics: 0x0022,
            time_date_stamp: 0,
            optional: optional_header(PE32PLUS_MAGIC, &OptionalFields::default(), 0, &[], 240),
            sections: Vec::new(),
            blobs: Vec::new(),
        }
    }

    pub fn pe32() -> ImageBuilder {
        ImageBuilder {
            machine: 0x014C,
            characteristics: 0x0102,
            optional: optional_header(PE32_MAGIC, &OptionalFields::default(), 16, &[], 224),
            ..ImageBuilder::new()
        }
    }

    pub fn machine(mut self, machine: u16) -> ImageBuilder {
        self.machine = machine;
        self
    }

    pub fn time_date_stamp(mut self, stamp: u32) -> ImageBuilder {
        self.time_date_stamp = stamp;
        self
    }

    pub fn optional(mut self, optional: Vec<u8>) -> ImageBuilder {
        self.optional = optional;
        self
    }

    pub fn section(mut self, record: Vec<u8>) -> ImageBuilder {
        self.sections.push(record);
        self
    }

    /// Places `bytes` at file offset `at`.
    pub fn blob(mut self, at: usize, bytes: Vec<u8>) -> ImageBuilder {
        self.blobs.push((at, bytes));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut buf = vec![0u8; NT_HEADER_OFFS];
        buf[0] = b'M';
        buf[1] = b'Z';
        put_u32(&mut buf, 0x3C, NT_HEADER_OFFS as u32);

        put(&mut buf, NT_HEADER_OFFS, b"PE\0\0");
        let coff = NT_HEADER_OFFS + 4;
        put_u16(&mut buf, coff, self.machine);
        put_u16(&mut buf, coff + 2, self.sections.len() as u16);
        put_u32(&mut buf, coff + 4, self.time_date_stamp);
        put_u16(&mut buf, coff + 16, self.optional.len() as u16);
        put_u16(&mut buf, coff + 18, self.characteristics);

        let mut at = coff + 20;
        put(&mut buf, at, &self.optional);
        at += self.optional.len();
        for record in &self.sections {
            put(&mut buf, at, record);
            at += record.len();
        }
        for (blob_at, bytes) in &self.blobs {
            put(&mut buf, *blob_at, bytes);
        }
        buf
    }
}

/// Builds a `.rsrc` blob; all offsets are relative to the blob start.
#[derive(Default)]
pub struct RsrcBuilder {
    buf: Vec<u8>,
}

impl RsrcBuilder {
    pub fn new() -> RsrcBuilder {
        RsrcBuilder::default()
    }

    /// Directory table at `at` with the given `(key, offset)` entries; the
    /// first `name_count` entries are name-keyed.
    pub fn directory(mut self, at: usize, name_count: u16, entries: &[(u32, u32)]) -> RsrcBuilder {
        put_u32(&mut self.buf, at + 4, 0x5F00_0000);
        put_u16(&mut self.buf, at + 12, name_count);
        put_u16(&mut self.buf, at + 14, entries.len() as u16 - name_count);
        for (i, &(key, offset)) in entries.iter().enumerate() {
            put_u32(&mut self.buf, at + 16 + 8 * i, key);
            put_u32(&mut self.buf, at + 16 + 8 * i + 4, offset);
        }
        self
    }

    /// Length-prefixed UTF-16LE string at `at`.
    pub fn string(mut self, at: usize, text: &str) -> RsrcBuilder {
        let units: Vec<u16> = text.encode_utf16().collect();
        put_u16(&mut self.buf, at, units.len() as u16);
        for (i, unit) in units.iter().enumerate() {
            put_u16(&mut self.buf, at + 2 + 2 * i, *unit);
        }
        self
    }

    pub fn data_entry(
        mut self,
        at: usize,
        data_rva: u32,
        size: u32,
        code_page: u32,
    ) -> RsrcBuilder {
        put_u32(&mut self.buf, at, data_rva);
        put_u32(&mut self.buf, at + 4, size);
        put_u32(&mut self.buf, at + 8, code_page);
        self
    }

    pub fn raw(mut self, at: usize, bytes: &[u8]) -> RsrcBuilder {
        put(&mut self.buf, at, bytes);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}
