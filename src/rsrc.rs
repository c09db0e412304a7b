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

//! `.rsrc` resource directory tree.
//!
//! The tree has three levels (type, name/ID, language). Every offset inside
//! it, whether to a name string, a subdirectory or a data entry, is relative
//! to the file offset of the `.rsrc` section's raw data.

use std::fmt;
use std::io::{Read, Seek};

use log::{debug, trace, warn};

use crate::cursor::ByteCursor;
use crate::error::{PeError, Result};
use crate::options::DecodeOptions;
use crate::pe::SectionHeader;

pub const RSRC_SECTION_NAME: &str = ".rsrc";

/// Deepest directory level that may be decoded (0 = type level).
pub const MAX_RESOURCE_DEPTH: usize = 2;

/// High bit of an entry's key (name) or offset (subdirectory).
const HIGH_BIT_MASK: u32 = 0x7FFF_FFFF;

/// Well-known resource type IDs (top-level keys).
pub mod types {
    pub const RT_CURSOR: u32 = 1;
    pub const RT_BITMAP: u32 = 2;
    pub const RT_ICON: u32 = 3;
    pub const RT_MENU: u32 = 4;
    pub const RT_DIALOG: u32 = 5;
    pub const RT_STRING: u32 = 6;
    pub const RT_FONTDIR: u32 = 7;
    pub const RT_FONT: u32 = 8;
    pub const RT_ACCELERATOR: u32 = 9;
    pub const RT_RCDATA: u32 = 10;
    pub const RT_MESSAGETABLE: u32 = 11;
    pub const RT_GROUP_CURSOR: u32 = 12;
    pub const RT_GROUP_ICON: u32 = 14;
    pub const RT_VERSION: u32 = 16;
    pub const RT_DLGINCLUDE: u32 = 17;
    pub const RT_PLUGPLAY: u32 = 19;
    pub const RT_VXD: u32 = 20;
    pub const RT_ANICURSOR: u32 = 21;
    pub const RT_ANIICON: u32 = 22;
    pub const RT_HTML: u32 = 23;
    pub const RT_MANIFEST: u32 = 24;
}

/// Header of one directory node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceDirectoryTable {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub number_of_name_entries: u16,
    pub number_of_id_entries: u16,
}

impl ResourceDirectoryTable {
    fn read<R: Read + Seek>(cursor: &mut ByteCursor<R>) -> Result<ResourceDirectoryTable> {
        Ok(ResourceDirectoryTable {
            characteristics: cursor.read_u32()?,
            time_date_stamp: cursor.read_u32()?,
            major_version: cursor.read_u16()?,
            minor_version: cursor.read_u16()?,
            number_of_name_entries: cursor.read_u16()?,
            number_of_id_entries: cursor.read_u16()?,
        })
    }

    pub fn entry_count(&self) -> usize {
        usize::from(self.number_of_name_entries) + usize::from(self.number_of_id_entries)
    }
}

/// Payload of a leaf.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceData {
    pub data_rva: u32,
    pub size: u32,
    pub code_page: u32,
}

impl fmt::Display for ResourceData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[RVA 0x{:x}, {} bytes, code page {}]", self.data_rva, self.size, self.code_page)
    }
}

/// What a node is keyed by. Also serves as one segment of a lookup path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Name(String),
    Id(u32),
}

impl From<u32> for ResourceKey {
    fn from(id: u32) -> ResourceKey {
        ResourceKey::Id(id)
    }
}

impl From<&str> for ResourceKey {
    fn from(name: &str) -> ResourceKey {
        ResourceKey::Name(name.to_owned())
    }
}

impl From<String> for ResourceKey {
    fn from(name: String) -> ResourceKey {
        ResourceKey::Name(name)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKey::Name(name) => write!(f, "Name: {}", name),
            ResourceKey::Id(id) => write!(f, "ID: {}", id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceNodeKind {
    Directory {
        table: ResourceDirectoryTable,
        children: Vec<ResourceNode>,
    },
    Leaf(ResourceData),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceNode {
    pub key: ResourceKey,
    pub kind: ResourceNodeKind,
}

impl ResourceNode {
    pub fn name(&self) -> Option<&str> {
        match &self.key {
            ResourceKey::Name(name) => Some(name),
            ResourceKey::Id(_) => None,
        }
    }

    pub fn id(&self) -> Option<u32> {
        match self.key {
            ResourceKey::Id(id) => Some(id),
            ResourceKey::Name(_) => None,
        }
    }

    /// Child nodes; empty for a leaf.
    pub fn children(&self) -> &[ResourceNode] {
        match &self.kind {
            ResourceNodeKind::Directory { children, .. } => children,
            ResourceNodeKind::Leaf(_) => &[],
        }
    }

    pub fn data(&self) -> Option<&ResourceData> {
        match &self.kind {
            ResourceNodeKind::Leaf(data) => Some(data),
            ResourceNodeKind::Directory { .. } => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, ResourceNodeKind::Leaf(_))
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, level: usize) -> fmt::Result {
        write!(f, "{:width$}{}", "", self.key, width = level * 2)?;
        if let Some(data) = self.data() {
            write!(f, " {}", data)?;
        }
        writeln!(f)?;
        for child in self.children() {
            child.write_indented(f, level + 1)?;
        }
        Ok(())
    }
}

/// Indented dump of the node and everything below it.
impl fmt::Display for ResourceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

/// Walks `path` from the root-level `nodes`, one key per level.
pub fn find<'a>(nodes: &'a [ResourceNode], path: &[ResourceKey]) -> Option<&'a ResourceNode> {
    let (first, rest) = path.split_first()?;
    let node = nodes.iter().find(|n| n.key == *first)?;
    if rest.is_empty() {
        Some(node)
    } else {
        find(node.children(), rest)
    }
}

struct ResourceDecoder<'c, R> {
    cursor: &'c mut ByteCursor<R>,
    base: u64,
    max_depth: usize,
    guard_cycles: bool,
    /// Directory offsets on the current recursion path.
    path: Vec<u64>,
}

impl<'c, R: Read + Seek> ResourceDecoder<'c, R> {
    fn read_directory(
        &mut self,
        pos: u64,
        depth: usize,
    ) -> Result<(ResourceDirectoryTable, Vec<ResourceNode>)> {
        if depth > self.max_depth {
            warn!("[-] Resource directory at FO 0x{:x} exceeds depth {}", pos, self.max_depth);
            return Err(PeError::ResourceTreeTooDeep { offset: pos, depth });
        }
        if self.guard_cycles && self.path.contains(&pos) {
            warn!("[-] Resource directory at FO 0x{:x} refers back to itself", pos);
            return Err(PeError::ResourceTreeTooDeep { offset: pos, depth });
        }

        self.cursor.seek(pos)?;
        let table = ResourceDirectoryTable::read(self.cursor)?;
        let name_count = usize::from(table.number_of_name_entries);
        trace!(
            "[+] Resource directory @ FO 0x{:x}: {} named, {} ID entries",
            pos,
            table.number_of_name_entries,
            table.number_of_id_entries
        );

        let mut entries = Vec::with_capacity(table.entry_count());
        for _ in 0..table.entry_count() {
            let key = self.cursor.read_u32()?;
            let offset = self.cursor.read_u32()?;
            entries.push((key, offset));
        }

        // Names first: they live in shared string storage, not in the
        // subdirectories visited below.
        let mut keys = Vec::with_capacity(entries.len());
        for &(key, _) in &entries[..name_count] {
            keys.push(ResourceKey::Name(self.read_name(key & HIGH_BIT_MASK)?));
        }
        keys.extend(entries[name_count..].iter().map(|&(key, _)| ResourceKey::Id(key)));

        self.path.push(pos);
        let mut children = Vec::with_capacity(entries.len());
        for (key, &(_, offset)) in keys.into_iter().zip(entries.iter()) {
            let target = self.base + u64::from(offset & HIGH_BIT_MASK);
            let kind = if (offset as i32) >= 0 {
                ResourceNodeKind::Leaf(self.read_data_entry(target)?)
            } else {
                let (table, nested) = self.read_directory(target, depth + 1)?;
                ResourceNodeKind::Directory { table, children: nested }
            };
            children.push(ResourceNode { key, kind });
        }
        self.path.pop();

        Ok((table, children))
    }

    /// u16 character count followed by that many UTF-16LE code units.
    fn read_name(&mut self, offset: u32) -> Result<String> {
        self.cursor.seek(self.base + u64::from(offset))?;
        let len = self.cursor.read_u16()?;
        let bytes = self.cursor.read_bytes(usize::from(len) * 2)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(String::from_utf16_lossy(&units))
    }

    fn read_data_entry(&mut self, pos: u64) -> Result<ResourceData> {
        self.cursor.seek(pos)?;
        Ok(ResourceData {
            data_rva: self.cursor.read_u32()?,
            size: self.cursor.read_u32()?,
            code_page: self.cursor.read_u32()?,
        })
    }
}

/// Decodes the tree of the first `.rsrc` section, returning the root's
/// children. No such section means no resources.
pub fn read_resource_tree<R: Read + Seek>(
    cursor: &mut ByteCursor<R>,
    sections: &[SectionHeader],
    options: &DecodeOptions,
) -> Result<Vec<ResourceNode>> {
    let rsrc = match sections.iter().find(|s| s.name == RSRC_SECTION_NAME) {
        Some(section) => section,
        None => {
            debug!("[*] No {} section, resource tree is empty", RSRC_SECTION_NAME);
            return Ok(Vec::new());
        }
    };

    let base = u64::from(rsrc.pointer_to_raw_data);
    debug!("[*] Decoding resource tree @ FO 0x{:x}", base);

    let mut decoder = ResourceDecoder {
        cursor,
        base,
        max_depth: options.resource_depth_limit(),
        guard_cycles: options.guards_resource_cycles(),
        path: Vec::new(),
    };
    let (_, nodes) = decoder.read_directory(base, 0)?;
    debug!("[+] Resource tree: {} top-level entries", nodes.len());
    Ok(nodes)
}
