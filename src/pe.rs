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

//! On-disk header records and their decoders: the PE signature pointer,
//! the COFF header, both flavors of the Optional header with its data
//! directory table, and the section table.

use std::cmp;
use std::io::{Read, Seek};

use chrono::{DateTime, TimeZone, Utc};
use log::{debug, trace, warn};

use crate::cursor::{ByteCursor, SliceReader};
use crate::error::{PeError, Result};
use crate::flags::{
    CoffCharacteristics, DllCharacteristics, MachineType, SectionCharacteristics, Subsystem,
};

/// File offset of `e_lfanew` inside the DOS header.
pub const PE_SIGNATURE_OFFSET: u64 = 0x3C;
pub const PE_SIGNATURE: [u8; 4] = *b"PE\0\0";

pub const PE32_MAGIC: u16 = 0x010B;
pub const PE32PLUS_MAGIC: u16 = 0x020B;

pub const COFF_HEADER_LEN: usize = 20;
pub const SECTION_HEADER_LEN: usize = 40;
pub const NUM_DATA_DIRECTORIES: usize = 16;

/// Bytes of fixed fields (magic through `NumberOfRvaAndSizes`) per flavor.
pub const PE32_FIXED_LEN: usize = 96;
pub const PE32PLUS_FIXED_LEN: usize = 112;
const DATA_DIRECTORY_LEN: usize = 8;

// Data directory indices.
pub const IMAGE_DIRECTORY_ENTRY_EXPORT: usize = 0;
pub const IMAGE_DIRECTORY_ENTRY_IMPORT: usize = 1;
pub const IMAGE_DIRECTORY_ENTRY_RESOURCE: usize = 2;
pub const IMAGE_DIRECTORY_ENTRY_EXCEPTION: usize = 3;
pub const IMAGE_DIRECTORY_ENTRY_SECURITY: usize = 4;
pub const IMAGE_DIRECTORY_ENTRY_BASERELOC: usize = 5;
pub const IMAGE_DIRECTORY_ENTRY_DEBUG: usize = 6;
pub const IMAGE_DIRECTORY_ENTRY_ARCHITECTURE: usize = 7;
pub const IMAGE_DIRECTORY_ENTRY_GLOBALPTR: usize = 8;
pub const IMAGE_DIRECTORY_ENTRY_TLS: usize = 9;
pub const IMAGE_DIRECTORY_ENTRY_LOAD_CONFIG: usize = 10;
pub const IMAGE_DIRECTORY_ENTRY_BOUND_IMPORT: usize = 11;
pub const IMAGE_DIRECTORY_ENTRY_IAT: usize = 12;
pub const IMAGE_DIRECTORY_ENTRY_DELAY_IMPORT: usize = 13;
pub const IMAGE_DIRECTORY_ENTRY_COM_DESCRIPTOR: usize = 14;
pub const IMAGE_DIRECTORY_ENTRY_RESERVED: usize = 15;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoffHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

impl CoffHeader {
    fn read<R: Read + Seek>(cursor: &mut ByteCursor<R>) -> Result<CoffHeader> {
        Ok(CoffHeader {
            machine: cursor.read_u16()?,
            number_of_sections: cursor.read_u16()?,
            time_date_stamp: cursor.read_u32()?,
            pointer_to_symbol_table: cursor.read_u32()?,
            number_of_symbols: cursor.read_u32()?,
            size_of_optional_header: cursor.read_u16()?,
            characteristics: cursor.read_u16()?,
        })
    }

    pub fn machine_type(&self) -> MachineType {
        MachineType::from_code(self.machine)
    }

    /// Link time as UTC. The stamp is unsigned seconds since the epoch.
    pub fn time_date_stamp_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(i64::from(self.time_date_stamp), 0).single()
    }

    pub fn flags(&self) -> CoffCharacteristics {
        CoffCharacteristics::from_bits_retain(self.characteristics)
    }

    /// True if any bit of `flag` is set.
    pub fn contains(&self, flag: CoffCharacteristics) -> bool {
        self.characteristics & flag.bits() != 0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

impl DataDirectory {
    pub const ZERO: DataDirectory = DataDirectory {
        virtual_address: 0,
        size: 0,
    };

    pub fn is_zero(&self) -> bool {
        *self == DataDirectory::ZERO
    }
}

/// The sixteen canonical data directory slots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DataDirectories([DataDirectory; NUM_DATA_DIRECTORIES]);

impl DataDirectories {
    /// Reads the first `count` slots (clamped to 16) and zero-fills the
    /// rest without consuming bytes for them.
    fn read(reader: &mut SliceReader<'_>, count: u32) -> Result<DataDirectories> {
        let present = cmp::min(count as usize, NUM_DATA_DIRECTORIES);
        let mut slots = [DataDirectory::ZERO; NUM_DATA_DIRECTORIES];
        for slot in slots.iter_mut().take(present) {
            *slot = DataDirectory {
                virtual_address: reader.read_u32()?,
                size: reader.read_u32()?,
            };
        }
        Ok(DataDirectories(slots))
    }

    pub fn get(&self, index: usize) -> Option<&DataDirectory> {
        self.0.get(index)
    }

    pub fn as_slice(&self) -> &[DataDirectory] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DataDirectory> {
        self.0.iter()
    }

    pub fn export_table(&self) -> DataDirectory {
        self.0[IMAGE_DIRECTORY_ENTRY_EXPORT]
    }

    pub fn import_table(&self) -> DataDirectory {
        self.0[IMAGE_DIRECTORY_ENTRY_IMPORT]
    }

    pub fn resource_table(&self) -> DataDirectory {
        self.0[IMAGE_DIRECTORY_ENTRY_RESOURCE]
    }

    pub fn exception_table(&self) -> DataDirectory {
        self.0[IMAGE_DIRECTORY_ENTRY_EXCEPTION]
    }

    pub fn certificate_table(&self) -> DataDirectory {
        self.0[IMAGE_DIRECTORY_ENTRY_SECURITY]
    }

    pub fn base_relocation_table(&self) -> DataDirectory {
        self.0[IMAGE_DIRECTORY_ENTRY_BASERELOC]
    }

    pub fn debug(&self) -> DataDirectory {
        self.0[IMAGE_DIRECTORY_ENTRY_DEBUG]
    }

    pub fn global_ptr(&self) -> DataDirectory {
        self.0[IMAGE_DIRECTORY_ENTRY_GLOBALPTR]
    }

    pub fn tls_table(&self) -> DataDirectory {
        self.0[IMAGE_DIRECTORY_ENTRY_TLS]
    }

    pub fn load_config_table(&self) -> DataDirectory {
        self.0[IMAGE_DIRECTORY_ENTRY_LOAD_CONFIG]
    }

    pub fn bound_import(&self) -> DataDirectory {
        self.0[IMAGE_DIRECTORY_ENTRY_BOUND_IMPORT]
    }

    pub fn import_address_table(&self) -> DataDirectory {
        self.0[IMAGE_DIRECTORY_ENTRY_IAT]
    }

    pub fn delay_import_descriptor(&self) -> DataDirectory {
        self.0[IMAGE_DIRECTORY_ENTRY_DELAY_IMPORT]
    }

    pub fn clr_runtime_header(&self) -> DataDirectory {
        self.0[IMAGE_DIRECTORY_ENTRY_COM_DESCRIPTOR]
    }

    /// Slots 7 and 15, which the format reserves.
    pub fn reserved(&self) -> [DataDirectory; 2] {
        [
            self.0[IMAGE_DIRECTORY_ENTRY_ARCHITECTURE],
            self.0[IMAGE_DIRECTORY_ENTRY_RESERVED],
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OptionalHeader32 {
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub base_of_data: u32,
    pub image_base: u32,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u32,
    pub size_of_stack_commit: u32,
    pub size_of_heap_reserve: u32,
    pub size_of_heap_commit: u32,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
    pub data_directories: DataDirectories,
}

impl OptionalHeader32 {
    /// Decodes everything after the magic.
    fn read(r: &mut SliceReader<'_>) -> Result<OptionalHeader32> {
        let major_linker_version = r.read_u8()?;
        let minor_linker_version = r.read_u8()?;
        let size_of_code = r.read_u32()?;
        let size_of_initialized_data = r.read_u32()?;
        let size_of_uninitialized_data = r.read_u32()?;
        let address_of_entry_point = r.read_u32()?;
        let base_of_code = r.read_u32()?;
        let base_of_data = r.read_u32()?;
        let image_base = r.read_u32()?;
        let section_alignment = r.read_u32()?;
        let file_alignment = r.read_u32()?;
        let major_operating_system_version = r.read_u16()?;
        let minor_operating_system_version = r.read_u16()?;
        let major_image_version = r.read_u16()?;
        let minor_image_version = r.read_u16()?;
        let major_subsystem_version = r.read_u16()?;
        let minor_subsystem_version = r.read_u16()?;
        let win32_version_value = r.read_u32()?;
        let size_of_image = r.read_u32()?;
        let size_of_headers = r.read_u32()?;
        let check_sum = r.read_u32()?;
        let subsystem = r.read_u16()?;
        let dll_characteristics = r.read_u16()?;
        let size_of_stack_reserve = r.read_u32()?;
        let size_of_stack_commit = r.read_u32()?;
        let size_of_heap_reserve = r.read_u32()?;
        let size_of_heap_commit = r.read_u32()?;
        let loader_flags = r.read_u32()?;
        let number_of_rva_and_sizes = r.read_u32()?;
        require_directories(r, PE32_MAGIC, number_of_rva_and_sizes)?;
        let data_directories = DataDirectories::read(r, number_of_rva_and_sizes)?;

        Ok(OptionalHeader32 {
            major_linker_version,
            minor_linker_version,
            size_of_code,
            size_of_initialized_data,
            size_of_uninitialized_data,
            address_of_entry_point,
            base_of_code,
            base_of_data,
            image_base,
            section_alignment,
            file_alignment,
            major_operating_system_version,
            minor_operating_system_version,
            major_image_version,
            minor_image_version,
            major_subsystem_version,
            minor_subsystem_version,
            win32_version_value,
            size_of_image,
            size_of_headers,
            check_sum,
            subsystem,
            dll_characteristics,
            size_of_stack_reserve,
            size_of_stack_commit,
            size_of_heap_reserve,
            size_of_heap_commit,
            loader_flags,
            number_of_rva_and_sizes,
            data_directories,
        })
    }
}

/// PE32+ layout: no `BaseOfData`, and the image base plus the four
/// stack/heap sizes are 64 bits wide.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OptionalHeader64 {
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
    pub data_directories: DataDirectories,
}

impl OptionalHeader64 {
    fn read(r: &mut SliceReader<'_>) -> Result<OptionalHeader64> {
        let major_linker_version = r.read_u8()?;
        let minor_linker_version = r.read_u8()?;
        let size_of_code = r.read_u32()?;
        let size_of_initialized_data = r.read_u32()?;
        let size_of_uninitialized_data = r.read_u32()?;
        let address_of_entry_point = r.read_u32()?;
        let base_of_code = r.read_u32()?;
        let image_base = r.read_u64()?;
        let section_alignment = r.read_u32()?;
        let file_alignment = r.read_u32()?;
        let major_operating_system_version = r.read_u16()?;
        let minor_operating_system_version = r.read_u16()?;
        let major_image_version = r.read_u16()?;
        let minor_image_version = r.read_u16()?;
        let major_subsystem_version = r.read_u16()?;
        let minor_subsystem_version = r.read_u16()?;
        let win32_version_value = r.read_u32()?;
        let size_of_image = r.read_u32()?;
        let size_of_headers = r.read_u32()?;
        let check_sum = r.read_u32()?;
        let subsystem = r.read_u16()?;
        let dll_characteristics = r.read_u16()?;
        let size_of_stack_reserve = r.read_u64()?;
        let size_of_stack_commit = r.read_u64()?;
        let size_of_heap_reserve = r.read_u64()?;
        let size_of_heap_commit = r.read_u64()?;
        let loader_flags = r.read_u32()?;
        let number_of_rva_and_sizes = r.read_u32()?;
        require_directories(r, PE32PLUS_MAGIC, number_of_rva_and_sizes)?;
        let data_directories = DataDirectories::read(r, number_of_rva_and_sizes)?;

        Ok(OptionalHeader64 {
            major_linker_version,
            minor_linker_version,
            size_of_code,
            size_of_initialized_data,
            size_of_uninitialized_data,
            address_of_entry_point,
            base_of_code,
            image_base,
            section_alignment,
            file_alignment,
            major_operating_system_version,
            minor_operating_system_version,
            major_image_version,
            minor_image_version,
            major_subsystem_version,
            minor_subsystem_version,
            win32_version_value,
            size_of_image,
            size_of_headers,
            check_sum,
            subsystem,
            dll_characteristics,
            size_of_stack_reserve,
            size_of_stack_commit,
            size_of_heap_reserve,
            size_of_heap_commit,
            loader_flags,
            number_of_rva_and_sizes,
            data_directories,
        })
    }
}

/// Fails with `TruncatedHeader` unless the declared directory slots fit in
/// what is left of the buffer.
fn require_directories(r: &SliceReader<'_>, magic: u16, count: u32) -> Result<()> {
    let needed = cmp::min(count as usize, NUM_DATA_DIRECTORIES) * DATA_DIRECTORY_LEN;
    if r.remaining() < needed {
        return Err(PeError::TruncatedHeader {
            magic,
            wanted: r.consumed() + needed,
            available: r.consumed() + r.remaining(),
        });
    }
    Ok(())
}

/// Optional header, tagged by its magic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionalHeader {
    Pe32(OptionalHeader32),
    Pe32Plus(OptionalHeader64),
}

/// Reads a field that exists with the same width in both flavors.
macro_rules! shared {
    ($self:ident . $field:ident) => {
        match $self {
            OptionalHeader::Pe32(h) => h.$field,
            OptionalHeader::Pe32Plus(h) => h.$field,
        }
    };
}

impl OptionalHeader {
    /// Decodes the Optional header from its `SizeOfOptionalHeader`-byte
    /// buffer. `base` is the buffer's file offset.
    pub fn parse(buf: &[u8], base: u64) -> Result<OptionalHeader> {
        let mut r = SliceReader::new(buf, base);
        let magic = r.read_u16().map_err(|_| PeError::TruncatedHeader {
            magic: 0,
            wanted: 2,
            available: buf.len(),
        })?;

        let fixed_len = match magic {
            PE32_MAGIC => PE32_FIXED_LEN,
            PE32PLUS_MAGIC => PE32PLUS_FIXED_LEN,
            _ => {
                warn!("[-] Unsupported optional header magic 0x{:04x}", magic);
                return Err(PeError::UnsupportedOptionalHeaderMagic(magic));
            }
        };
        if buf.len() < fixed_len {
            warn!("[-] Optional header too short: {} < {} bytes", buf.len(), fixed_len);
            return Err(PeError::TruncatedHeader {
                magic,
                wanted: fixed_len,
                available: buf.len(),
            });
        }

        let header = if magic == PE32PLUS_MAGIC {
            OptionalHeader::Pe32Plus(OptionalHeader64::read(&mut r)?)
        } else {
            OptionalHeader::Pe32(OptionalHeader32::read(&mut r)?)
        };
        trace!("[+] Optional header consumed {} of {} bytes", r.consumed(), buf.len());
        Ok(header)
    }

    pub fn magic(&self) -> u16 {
        match self {
            OptionalHeader::Pe32(_) => PE32_MAGIC,
            OptionalHeader::Pe32Plus(_) => PE32PLUS_MAGIC,
        }
    }

    pub fn pe32_plus(&self) -> bool {
        matches!(self, OptionalHeader::Pe32Plus(_))
    }

    /// `BaseOfData`; PE32+ images have no such field.
    pub fn base_of_data(&self) -> Option<u32> {
        match self {
            OptionalHeader::Pe32(h) => Some(h.base_of_data),
            OptionalHeader::Pe32Plus(_) => None,
        }
    }

    pub fn image_base(&self) -> u64 {
        match self {
            OptionalHeader::Pe32(h) => u64::from(h.image_base),
            OptionalHeader::Pe32Plus(h) => h.image_base,
        }
    }

    pub fn size_of_stack_reserve(&self) -> u64 {
        match self {
            OptionalHeader::Pe32(h) => u64::from(h.size_of_stack_reserve),
            OptionalHeader::Pe32Plus(h) => h.size_of_stack_reserve,
        }
    }

    pub fn size_of_stack_commit(&self) -> u64 {
        match self {
            OptionalHeader::Pe32(h) => u64::from(h.size_of_stack_commit),
            OptionalHeader::Pe32Plus(h) => h.size_of_stack_commit,
        }
    }

    pub fn size_of_heap_reserve(&self) -> u64 {
        match self {
            OptionalHeader::Pe32(h) => u64::from(h.size_of_heap_reserve),
            OptionalHeader::Pe32Plus(h) => h.size_of_heap_reserve,
        }
    }

    pub fn size_of_heap_commit(&self) -> u64 {
        match self {
            OptionalHeader::Pe32(h) => u64::from(h.size_of_heap_commit),
            OptionalHeader::Pe32Plus(h) => h.size_of_heap_commit,
        }
    }

    pub fn linker_version(&self) -> (u8, u8) {
        (shared!(self.major_linker_version), shared!(self.minor_linker_version))
    }

    pub fn operating_system_version(&self) -> (u16, u16) {
        (
            shared!(self.major_operating_system_version),
            shared!(self.minor_operating_system_version),
        )
    }

    pub fn image_version(&self) -> (u16, u16) {
        (shared!(self.major_image_version), shared!(self.minor_image_version))
    }

    pub fn subsystem_version(&self) -> (u16, u16) {
        (shared!(self.major_subsystem_version), shared!(self.minor_subsystem_version))
    }

    pub fn size_of_code(&self) -> u32 {
        shared!(self.size_of_code)
    }

    pub fn size_of_initialized_data(&self) -> u32 {
        shared!(self.size_of_initialized_data)
    }

    pub fn size_of_uninitialized_data(&self) -> u32 {
        shared!(self.size_of_uninitialized_data)
    }

    pub fn address_of_entry_point(&self) -> u32 {
        shared!(self.address_of_entry_point)
    }

    pub fn base_of_code(&self) -> u32 {
        shared!(self.base_of_code)
    }

    pub fn section_alignment(&self) -> u32 {
        shared!(self.section_alignment)
    }

    pub fn file_alignment(&self) -> u32 {
        shared!(self.file_alignment)
    }

    pub fn win32_version_value(&self) -> u32 {
        shared!(self.win32_version_value)
    }

    pub fn size_of_image(&self) -> u32 {
        shared!(self.size_of_image)
    }

    pub fn size_of_headers(&self) -> u32 {
        shared!(self.size_of_headers)
    }

    pub fn check_sum(&self) -> u32 {
        shared!(self.check_sum)
    }

    pub fn subsystem(&self) -> u16 {
        shared!(self.subsystem)
    }

    pub fn windows_subsystem(&self) -> Subsystem {
        Subsystem::from_code(self.subsystem())
    }

    pub fn dll_characteristics(&self) -> u16 {
        shared!(self.dll_characteristics)
    }

    pub fn dll_flags(&self) -> DllCharacteristics {
        DllCharacteristics::from_bits_retain(self.dll_characteristics())
    }

    /// True if any bit of `flag` is set in `DllCharacteristics`.
    pub fn contains(&self, flag: DllCharacteristics) -> bool {
        self.dll_characteristics() & flag.bits() != 0
    }

    pub fn loader_flags(&self) -> u32 {
        shared!(self.loader_flags)
    }

    /// The declared count, as stored. Only `min(count, 16)` slots are read.
    pub fn number_of_rva_and_sizes(&self) -> u32 {
        shared!(self.number_of_rva_and_sizes)
    }

    pub fn data_directories(&self) -> &DataDirectories {
        match self {
            OptionalHeader::Pe32(h) => &h.data_directories,
            OptionalHeader::Pe32Plus(h) => &h.data_directories,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionHeader {
    /// Name up to the first NUL (or all 8 bytes), decoded as UTF-8.
    pub name: String,
    pub raw_name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_linenumbers: u32,
    pub number_of_relocations: u16,
    pub number_of_linenumbers: u16,
    pub characteristics: u32,
}

impl SectionHeader {
    /// Decodes one 40-byte section record.
    pub fn parse(record: &[u8], base: u64) -> Result<SectionHeader> {
        let mut r = SliceReader::new(record, base);
        let mut raw_name = [0u8; 8];
        for byte in raw_name.iter_mut() {
            *byte = r.read_u8()?;
        }
        let name_len = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
        let name = String::from_utf8_lossy(&raw_name[..name_len]).into_owned();

        Ok(SectionHeader {
            name,
            raw_name,
            virtual_size: r.read_u32()?,
            virtual_address: r.read_u32()?,
            size_of_raw_data: r.read_u32()?,
            pointer_to_raw_data: r.read_u32()?,
            pointer_to_relocations: r.read_u32()?,
            pointer_to_linenumbers: r.read_u32()?,
            number_of_relocations: r.read_u16()?,
            number_of_linenumbers: r.read_u16()?,
            characteristics: r.read_u32()?,
        })
    }

    /// Characteristics as flags; unnamed bits such as the alignment
    /// nibble are retained.
    pub fn flags(&self) -> SectionCharacteristics {
        SectionCharacteristics::from_bits_retain(self.characteristics)
    }

    /// True if any bit of `flag` is set.
    pub fn contains(&self, flag: SectionCharacteristics) -> bool {
        self.characteristics & flag.bits() != 0
    }
}

/// COFF and Optional header as found behind the PE signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NtHeaders {
    pub coff_header: CoffHeader,
    pub optional_header: OptionalHeader,
}

/// Follows `e_lfanew`, checks the signature and decodes both headers.
/// Leaves the cursor at the first section record.
pub fn read_nt_headers<R: Read + Seek>(cursor: &mut ByteCursor<R>) -> Result<NtHeaders> {
    cursor.seek(PE_SIGNATURE_OFFSET)?;
    let nt_header_offs = u64::from(cursor.read_u32()?);
    debug!("[*] PE signature pointer -> FO 0x{:x}", nt_header_offs);

    cursor.seek(nt_header_offs)?;
    let signature = cursor.read_array::<4>()?;
    if signature != PE_SIGNATURE {
        warn!("[-] Invalid PE signature at FO 0x{:x}: {:02x?}", nt_header_offs, signature);
        return Err(PeError::InvalidSignature {
            offset: nt_header_offs,
            found: signature,
        });
    }

    let coff_header = CoffHeader::read(cursor)?;
    debug!(
        "[+] COFF header: machine 0x{:04x}, {} sections, optional header {} bytes",
        coff_header.machine, coff_header.number_of_sections, coff_header.size_of_optional_header
    );

    let opt_offs = cursor.position();
    let opt_buf = cursor.read_bytes(usize::from(coff_header.size_of_optional_header))?;
    let optional_header = OptionalHeader::parse(&opt_buf, opt_offs)?;
    debug!(
        "[+] Optional header: {}, {} data directories declared",
        if optional_header.pe32_plus() { "PE32+" } else { "PE32" },
        optional_header.number_of_rva_and_sizes()
    );

    Ok(NtHeaders {
        coff_header,
        optional_header,
    })
}

/// Reads `count` section records starting at the cursor's position.
pub fn read_section_table<R: Read + Seek>(
    cursor: &mut ByteCursor<R>,
    count: u16,
) -> Result<Vec<SectionHeader>> {
    let sec_table_offs = cursor.position();
    let data = cursor.read_bytes(SECTION_HEADER_LEN * usize::from(count))?;

    let mut sections = Vec::with_capacity(usize::from(count));
    for (i, record) in data.chunks_exact(SECTION_HEADER_LEN).enumerate() {
        let record_offs = sec_table_offs + (i * SECTION_HEADER_LEN) as u64;
        let section = SectionHeader::parse(record, record_offs)?;
        trace!(
            "[+] Section {:?}: RVA 0x{:x}, FO 0x{:x}, {} raw bytes",
            section.name,
            section.virtual_address,
            section.pointer_to_raw_data,
            section.size_of_raw_data
        );
        sections.push(section);
    }
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{self, OptionalFields};
    use std::io::Cursor;

    fn no_fields() -> OptionalFields {
        OptionalFields::default()
    }

    fn directories(n: usize) -> Vec<(u32, u32)> {
        (0..n as u32).map(|i| (0x1000 * (i + 1), 0x10 + i)).collect()
    }

    #[test]
    fn pe32_plus_reads_wide_fields() {
        let fields = OptionalFields {
            image_base: 0x0000_0001_4000_0000,
            stack_reserve: 0x10_0000_0000,
            heap_commit: 0x2000,
            subsystem: 3,
            ..OptionalFields::default()
        };
        let buf = testutil::optional_header(PE32PLUS_MAGIC, &fields, 0, &[], 240);
        let header = OptionalHeader::parse(&buf, 0x98).unwrap();
        assert!(header.pe32_plus());
        assert_eq!(header.magic(), PE32PLUS_MAGIC);
        assert_eq!(header.image_base(), 0x0000_0001_4000_0000);
        assert_eq!(header.size_of_stack_reserve(), 0x10_0000_0000);
        assert_eq!(header.size_of_heap_commit(), 0x2000);
        assert_eq!(header.base_of_data(), None);
        assert_eq!(header.windows_subsystem(), Subsystem::WindowsCui);
    }

    #[test]
    fn pe32_reads_base_of_data_and_narrow_fields() {
        let fields = OptionalFields {
            entry_point: 0x1234,
            base_of_data: 0x3000,
            image_base: 0x40_0000,
            stack_reserve: 0x10_0000,
            dll_characteristics: 0x0140,
            ..OptionalFields::default()
        };
        let buf = testutil::optional_header(PE32_MAGIC, &fields, 0, &[], PE32_FIXED_LEN);
        let header = OptionalHeader::parse(&buf, 0).unwrap();
        assert!(!header.pe32_plus());
        assert_eq!(header.address_of_entry_point(), 0x1234);
        assert_eq!(header.base_of_data(), Some(0x3000));
        assert_eq!(header.image_base(), 0x40_0000);
        assert_eq!(header.size_of_stack_reserve(), 0x10_0000);
        assert!(header.contains(DllCharacteristics::NX_COMPAT));
        assert!(header.contains(DllCharacteristics::DYNAMIC_BASE));
        assert!(!header.contains(DllCharacteristics::GUARD_CF));
    }

    #[test]
    fn sixteen_directories_match_fixed_offsets() {
        let dirs = directories(NUM_DATA_DIRECTORIES);
        let buf = testutil::optional_header(PE32PLUS_MAGIC, &no_fields(), 16, &dirs, 240);
        let header = OptionalHeader::parse(&buf, 0).unwrap();

        // Directory i sits at 112 + 8 * i in a PE32+ header.
        for (i, dir) in header.data_directories().iter().enumerate() {
            let at = PE32PLUS_FIXED_LEN + 8 * i;
            let va = u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
            let size = u32::from_le_bytes([buf[at + 4], buf[at + 5], buf[at + 6], buf[at + 7]]);
            assert_eq!(dir.virtual_address, va);
            assert_eq!(dir.size, size);
        }
        let dd = header.data_directories();
        assert_eq!(dd.export_table(), DataDirectory { virtual_address: 0x1000, size: 0x10 });
        assert_eq!(dd.resource_table().virtual_address, 0x3000);
        assert_eq!(dd.clr_runtime_header().virtual_address, 0xF000);
        assert_eq!(dd.reserved()[1].virtual_address, 0x10000);
    }

    #[test]
    fn zero_directories_consume_nothing() {
        // Exactly the fixed part: any directory read would run off the end.
        let buf = testutil::optional_header(PE32_MAGIC, &no_fields(), 0, &[], PE32_FIXED_LEN);
        let header = OptionalHeader::parse(&buf, 0).unwrap();
        assert_eq!(header.number_of_rva_and_sizes(), 0);
        assert!(header.data_directories().iter().all(DataDirectory::is_zero));
    }

    #[test]
    fn partial_directory_count_zero_fills_the_rest() {
        let dirs = directories(3);
        let len = PE32PLUS_FIXED_LEN + 3 * 8;
        let buf = testutil::optional_header(PE32PLUS_MAGIC, &no_fields(), 3, &dirs, len);
        let header = OptionalHeader::parse(&buf, 0).unwrap();
        let dd = header.data_directories();
        assert_eq!(dd.resource_table().virtual_address, 0x3000);
        assert!(dd.exception_table().is_zero());
        assert_eq!(dd.iter().filter(|d| !d.is_zero()).count(), 3);
    }

    #[test]
    fn oversized_directory_count_is_clamped() {
        let dirs = directories(NUM_DATA_DIRECTORIES);
        let buf = testutil::optional_header(PE32_MAGIC, &no_fields(), 0x20, &dirs, 224);
        let header = OptionalHeader::parse(&buf, 0).unwrap();
        assert_eq!(header.number_of_rva_and_sizes(), 0x20);
        assert_eq!(header.data_directories().get(15).unwrap().virtual_address, 0x10000);
        assert!(header.data_directories().get(16).is_none());
    }

    #[test]
    fn short_buffers_are_truncated_headers() {
        let buf = testutil::optional_header(PE32PLUS_MAGIC, &no_fields(), 0, &[], PE32_FIXED_LEN);
        assert!(matches!(
            OptionalHeader::parse(&buf, 0),
            Err(PeError::TruncatedHeader {
                magic: PE32PLUS_MAGIC,
                wanted: PE32PLUS_FIXED_LEN,
                available: PE32_FIXED_LEN,
            })
        ));

        let buf = testutil::optional_header(PE32_MAGIC, &no_fields(), 2, &[], PE32_FIXED_LEN + 8);
        assert!(matches!(
            OptionalHeader::parse(&buf, 0),
            Err(PeError::TruncatedHeader { wanted: 112, available: 104, .. })
        ));

        assert!(matches!(
            OptionalHeader::parse(&[0x0B], 0),
            Err(PeError::TruncatedHeader { wanted: 2, available: 1, .. })
        ));
    }

    #[test]
    fn unknown_magic_is_rejected() {
        let buf = testutil::optional_header(0x0107, &OptionalFields::default(), 0, &[], 240);
        assert!(matches!(
            OptionalHeader::parse(&buf, 0),
            Err(PeError::UnsupportedOptionalHeaderMagic(0x0107))
        ));
    }

    #[test]
    fn section_names_stop_at_nul() {
        let record = testutil::section_record(b".text", 0x1000, 0x200, 0x400, 0x6000_0020);
        let section = SectionHeader::parse(&record, 0).unwrap();
        assert_eq!(section.name, ".text");
        assert_eq!(&section.raw_name, b".text\0\0\0");
        assert_eq!(section.virtual_address, 0x1000);
        assert_eq!(section.size_of_raw_data, 0x200);
        assert_eq!(section.pointer_to_raw_data, 0x400);
        assert!(section.contains(SectionCharacteristics::MEM_EXECUTE));
        assert!(!section.contains(SectionCharacteristics::MEM_WRITE));
        assert!(section
            .flags()
            .contains(SectionCharacteristics::CNT_CODE | SectionCharacteristics::MEM_READ));

        let full = testutil::section_record(b".textbss", 0, 0, 0, 0);
        assert_eq!(SectionHeader::parse(&full, 0).unwrap().name, ".textbss");
    }

    #[test]
    fn section_flags_keep_alignment_nibble() {
        // IMAGE_SCN_ALIGN_16BYTES | CNT_INITIALIZED_DATA | MEM_READ
        let record = testutil::section_record(b".rdata", 0x2000, 0x200, 0x600, 0x4050_0040);
        let section = SectionHeader::parse(&record, 0).unwrap();
        let flags = section.flags();
        assert_eq!(flags.bits(), 0x4050_0040);
        assert_eq!(flags.bits() & 0x00F0_0000, 0x0050_0000);
        assert!(flags.contains(SectionCharacteristics::CNT_INITIALIZED_DATA));
    }

    #[test]
    fn reserved_dll_bits_are_queryable() {
        let fields = OptionalFields {
            dll_characteristics: 0x0009,
            ..OptionalFields::default()
        };
        let buf = testutil::optional_header(PE32_MAGIC, &fields, 0, &[], PE32_FIXED_LEN);
        let header = OptionalHeader::parse(&buf, 0).unwrap();
        assert!(header.contains(DllCharacteristics::RESERVED_0001));
        assert!(header.contains(DllCharacteristics::RESERVED_0008));
        assert!(!header.contains(DllCharacteristics::RESERVED_0002));
        assert_eq!(
            header.dll_flags(),
            DllCharacteristics::RESERVED_0001 | DllCharacteristics::RESERVED_0008
        );
    }

    #[test]
    fn nt_headers_reject_bad_signature() {
        let mut image = testutil::ImageBuilder::new().build();
        image[0x40] = b'N';
        let mut cursor = ByteCursor::new(Cursor::new(image)).unwrap();
        assert!(matches!(
            read_nt_headers(&mut cursor),
            Err(PeError::InvalidSignature { offset: 0x40, found: [b'N', b'E', 0, 0] })
        ));
    }

    #[test]
    fn nt_headers_and_sections() {
        let image = testutil::ImageBuilder::new()
            .section(testutil::section_record(b".text", 0x1000, 0x200, 0x400, 0x6000_0020))
            .section(testutil::section_record(b".data", 0x2000, 0x200, 0x600, 0xC000_0040))
            .build();
        let mut cursor = ByteCursor::new(Cursor::new(image)).unwrap();
        let nt = read_nt_headers(&mut cursor).unwrap();
        assert_eq!(nt.coff_header.machine_type(), MachineType::Amd64);
        assert_eq!(nt.coff_header.number_of_sections, 2);
        assert!(nt.coff_header.contains(CoffCharacteristics::EXECUTABLE_IMAGE));
        assert!(!nt.coff_header.contains(CoffCharacteristics::DLL));

        let sections = read_section_table(&mut cursor, nt.coff_header.number_of_sections).unwrap();
        let names: Vec<_> = sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, [".text", ".data"]);
    }

    #[test]
    fn timestamp_converts_to_utc() {
        let header = CoffHeader {
            machine: 0x14C,
            number_of_sections: 0,
            time_date_stamp: 0x8000_0000,
            pointer_to_symbol_table: 0,
            number_of_symbols: 0,
            size_of_optional_header: 0,
            characteristics: 0,
        };
        // Unsigned: past 2038, not before 1970.
        assert_eq!(header.time_date_stamp_utc().unwrap().timestamp(), 0x8000_0000);
    }
}
