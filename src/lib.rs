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

//! Decodes the on-disk structure of Windows PE images (COFF header,
//! PE32/PE32+ Optional header, data directories, section table and the
//! `.rsrc` resource tree) without mapping or executing anything.
//!
//! ```no_run
//! use pe_inspect::{flags::MachineType, PeImage};
//!
//! let mut image = PeImage::open_path("notepad.exe")?;
//! image.close();
//! assert_eq!(image.coff_header().machine_type(), MachineType::Amd64);
//! for section in image.sections() {
//!     println!("{} @ 0x{:x}", section.name, section.virtual_address);
//! }
//! # Ok::<(), pe_inspect::PeError>(())
//! ```

pub mod cursor;
pub mod error;
pub mod flags;
pub mod options;
pub mod pe;
pub mod rsrc;

#[cfg(test)]
mod testutil;

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use log::debug;

pub use crate::cursor::ByteCursor;
pub use crate::error::{PeError, Result};
pub use crate::flags::{
    CoffCharacteristics, DllCharacteristics, MachineType, SectionCharacteristics, Subsystem,
};
pub use crate::options::DecodeOptions;
pub use crate::pe::{
    CoffHeader, DataDirectories, DataDirectory, OptionalHeader, OptionalHeader32,
    OptionalHeader64, SectionHeader,
};
pub use crate::rsrc::{
    ResourceData, ResourceDirectoryTable, ResourceKey, ResourceNode, ResourceNodeKind,
};

/// A decoded PE image.
///
/// Owns its byte source until [`close`](PeImage::close); every decoded
/// structure is an owned copy and stays valid after the source is gone.
pub struct PeImage<R> {
    source: Option<R>,
    coff_header: CoffHeader,
    optional_header: OptionalHeader,
    sections: Vec<SectionHeader>,
    resource_tree: Vec<ResourceNode>,
}

impl PeImage<BufReader<File>> {
    /// Opens and decodes the file at `path`.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<PeImage<BufReader<File>>> {
        let f = File::open(path.as_ref())?;
        debug!("[*] Opened {}", path.as_ref().display());
        PeImage::open(BufReader::new(f))
    }
}

impl<R: Read + Seek> PeImage<R> {
    pub fn open(source: R) -> Result<PeImage<R>> {
        PeImage::open_with(source, DecodeOptions::default())
    }

    /// Decodes headers, section table and resource tree, in that order.
    /// On failure the source is dropped before the error is returned.
    pub fn open_with(source: R, options: DecodeOptions) -> Result<PeImage<R>> {
        let mut cursor = ByteCursor::new(source)?;

        let nt = pe::read_nt_headers(&mut cursor)?;
        let sections = pe::read_section_table(&mut cursor, nt.coff_header.number_of_sections)?;
        debug!("[+] Read {} section headers", sections.len());
        let resource_tree = rsrc::read_resource_tree(&mut cursor, &sections, &options)?;

        Ok(PeImage {
            source: Some(cursor.into_inner()),
            coff_header: nt.coff_header,
            optional_header: nt.optional_header,
            sections,
            resource_tree,
        })
    }
}

impl<R> PeImage<R> {
    pub fn coff_header(&self) -> &CoffHeader {
        &self.coff_header
    }

    pub fn optional_header(&self) -> &OptionalHeader {
        &self.optional_header
    }

    /// Section headers in file order.
    pub fn sections(&self) -> &[SectionHeader] {
        &self.sections
    }

    /// Root-level resource nodes (the type level); empty without `.rsrc`.
    pub fn resource_tree(&self) -> &[ResourceNode] {
        &self.resource_tree
    }

    /// First section called `name`. Names need not be unique.
    pub fn section_by_name(&self, name: &str) -> Option<&SectionHeader> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Looks a resource up by its type/name/language path.
    pub fn find_resource(&self, path: &[ResourceKey]) -> Option<&ResourceNode> {
        rsrc::find(&self.resource_tree, path)
    }

    pub fn machine_type(&self) -> MachineType {
        self.coff_header.machine_type()
    }

    pub fn subsystem(&self) -> Subsystem {
        self.optional_header.windows_subsystem()
    }

    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    /// Releases the byte source, handing it back on the first call.
    pub fn close(&mut self) -> Option<R> {
        if self.source.is_some() {
            debug!("[*] Releasing byte source");
        }
        self.source.take()
    }
}
