//! Resource tree decoding
//!
//! The resource directory is a recursive tree: directory tables with named
//! and ID entries, whose offsets are relative to the resource section base.
//! Recursion depth is strictly limited; crafted files love to loop the tree
//! back on itself.

use crate::cursor::Cursor;
use crate::error::{DecodeError, Result};
use crate::pe::types::{DataDirectory, ResourceEntry, ResourceId, ResourceNode, SectionTags};
use crate::pe::Binary;

const MAX_DEPTH: usize = 32;
/// Total entry budget across the whole tree. Depth alone does not bound the
/// node count: many entries per level can reference the same subdirectory.
const MAX_NODES: usize = 0x10000;

/// Decode the resource directory into `bin.resources`.
pub(crate) fn decode(bin: &mut Binary, cursor: &Cursor, directory: &DataDirectory) -> Result<()> {
    if let Some(index) = directory.section {
        bin.sections.add_tags(index, SectionTags::RESOURCE);
    }

    let base = bin.sections.rva_to_offset(directory.virtual_address)?;
    let mut budget = MAX_NODES;
    let root = decode_directory(cursor, base, 0, 0, &mut budget)?;
    bin.resources = Some(root);

    Ok(())
}

/// Decode one directory table at `base + table_offset`.
fn decode_directory(
    cursor: &Cursor,
    base: usize,
    table_offset: usize,
    depth: usize,
    budget: &mut usize,
) -> Result<ResourceNode> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::corrupted(
            "resource table corrupted (depth exceeded)",
        ));
    }

    let table = base + table_offset;
    let number_of_name_entries = cursor.read_u16(table + 12)? as usize;
    let number_of_id_entries = cursor.read_u16(table + 14)? as usize;
    let total = number_of_name_entries + number_of_id_entries;

    let mut entries = Vec::with_capacity(total);
    for index in 0..total {
        if *budget == 0 {
            return Err(DecodeError::corrupted(
                "resource table corrupted (too many entries)",
            ));
        }
        *budget -= 1;

        let entry_offset = table + 16 + index * 8;
        let name_or_id = cursor.read_u32(entry_offset)?;
        let data_or_subdir = cursor.read_u32(entry_offset + 4)?;

        let id = if name_or_id & 0x8000_0000 != 0 {
            let string_offset = base + (name_or_id & 0x7FFF_FFFF) as usize;
            ResourceId::Name(read_utf16_string(cursor, string_offset)?)
        } else {
            ResourceId::Id(name_or_id)
        };

        let node = if data_or_subdir & 0x8000_0000 != 0 {
            decode_directory(
                cursor,
                base,
                (data_or_subdir & 0x7FFF_FFFF) as usize,
                depth + 1,
                budget,
            )?
        } else {
            let data_offset = base + data_or_subdir as usize;
            ResourceNode::Data {
                rva: cursor.read_u32(data_offset)?,
                size: cursor.read_u32(data_offset + 4)?,
                code_page: cursor.read_u32(data_offset + 8)?,
            }
        };

        entries.push(ResourceEntry { id, node });
    }

    Ok(ResourceNode::Directory { entries })
}

/// Read a length-prefixed UTF-16LE resource name.
fn read_utf16_string(cursor: &Cursor, offset: usize) -> Result<String> {
    let length = cursor.read_u16(offset)? as usize;
    let bytes = cursor.read(offset + 2, length * 2)?;
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Ok(String::from_utf16_lossy(&units))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::sections::SectionTable;
    use crate::pe::types::{DirectoryKind, Section, DIRECTORY_COUNT};

    fn build_binary(rsrc: &[u8]) -> (Vec<u8>, Binary) {
        let mut data = vec![0u8; 0x1200];
        data[0x200..0x200 + rsrc.len()].copy_from_slice(rsrc);

        let mut bin = Binary::default();
        bin.sections = SectionTable::new(vec![Section {
            name: ".rsrc".to_string(),
            virtual_address: 0x1000,
            virtual_size: 0x1000,
            pointer_to_raw_data: 0x200,
            size_of_raw_data: 0x1000,
            characteristics: 0,
            tags: SectionTags::empty(),
        }]);
        bin.directories = (0..DIRECTORY_COUNT)
            .map(|i| DataDirectory {
                kind: DirectoryKind::from_index(i),
                virtual_address: 0,
                size: 0,
                section: None,
            })
            .collect();
        let index = DirectoryKind::ResourceTable.index();
        bin.directories[index].virtual_address = 0x1000;
        bin.directories[index].size = rsrc.len() as u32;
        bin.directories[index].section = Some(0);

        (data, bin)
    }

    #[test]
    fn test_decode_resource_tree() {
        let mut rsrc = vec![0u8; 0x100];
        let put16 = |d: &mut Vec<u8>, off: usize, val: u16| {
            d[off..off + 2].copy_from_slice(&val.to_le_bytes());
        };
        let put32 = |d: &mut Vec<u8>, off: usize, val: u32| {
            d[off..off + 4].copy_from_slice(&val.to_le_bytes());
        };

        // Root: one ID entry pointing at a subdirectory at offset 0x20.
        put16(&mut rsrc, 14, 1);
        put32(&mut rsrc, 16, 6); // RT_STRING
        put32(&mut rsrc, 20, 0x8000_0020);

        // Subdirectory: one named entry pointing at a data entry at 0x60.
        put16(&mut rsrc, 0x20 + 12, 1);
        put32(&mut rsrc, 0x20 + 16, 0x8000_0040); // name at offset 0x40
        put32(&mut rsrc, 0x20 + 20, 0x60);

        // Name string "AB" at 0x40.
        put16(&mut rsrc, 0x40, 2);
        put16(&mut rsrc, 0x42, 'A' as u16);
        put16(&mut rsrc, 0x44, 'B' as u16);

        // Data entry at 0x60.
        put32(&mut rsrc, 0x60, 0x1800); // data RVA
        put32(&mut rsrc, 0x64, 0x10); // size
        put32(&mut rsrc, 0x68, 1252); // code page

        let (data, mut bin) = build_binary(&rsrc);
        let cursor = Cursor::new(&data);
        let directory = bin.directories[DirectoryKind::ResourceTable.index()].clone();

        decode(&mut bin, &cursor, &directory).unwrap();

        let ResourceNode::Directory { entries } = bin.resources.as_ref().unwrap() else {
            panic!("root must be a directory");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, ResourceId::Id(6));

        let ResourceNode::Directory { entries: inner } = &entries[0].node else {
            panic!("expected subdirectory");
        };
        assert_eq!(inner[0].id, ResourceId::Name("AB".to_string()));
        assert_eq!(
            inner[0].node,
            ResourceNode::Data {
                rva: 0x1800,
                size: 0x10,
                code_page: 1252
            }
        );
        assert!(bin
            .sections
            .get(0)
            .unwrap()
            .tags
            .contains(SectionTags::RESOURCE));
    }

    #[test]
    fn test_wide_shallow_tree_hits_node_limit() {
        // Root with 260 entries all referencing one 260-entry subdirectory:
        // two levels deep, but 260 + 260 * 260 entries traversed.
        let mut rsrc = vec![0u8; 0x1100];
        let subdir = 16 + 260 * 8; // 0x830
        let leaf = subdir + 16 + 260 * 8; // 0x1060

        rsrc[14..16].copy_from_slice(&260u16.to_le_bytes());
        for index in 0..260usize {
            let off = 16 + index * 8;
            rsrc[off..off + 4].copy_from_slice(&(index as u32).to_le_bytes());
            rsrc[off + 4..off + 8]
                .copy_from_slice(&(0x8000_0000 | subdir as u32).to_le_bytes());
        }

        rsrc[subdir + 14..subdir + 16].copy_from_slice(&260u16.to_le_bytes());
        for index in 0..260usize {
            let off = subdir + 16 + index * 8;
            rsrc[off..off + 4].copy_from_slice(&(index as u32).to_le_bytes());
            rsrc[off + 4..off + 8].copy_from_slice(&(leaf as u32).to_le_bytes());
        }

        let mut data = vec![0u8; 0x200 + 0x1100];
        data[0x200..0x200 + rsrc.len()].copy_from_slice(&rsrc);

        let mut bin = Binary::default();
        bin.sections = SectionTable::new(vec![Section {
            name: ".rsrc".to_string(),
            virtual_address: 0x1000,
            virtual_size: 0x1100,
            pointer_to_raw_data: 0x200,
            size_of_raw_data: 0x1100,
            characteristics: 0,
            tags: SectionTags::empty(),
        }]);
        let index = DirectoryKind::ResourceTable.index();
        bin.directories[index].virtual_address = 0x1000;
        bin.directories[index].size = rsrc.len() as u32;
        bin.directories[index].section = Some(0);

        let cursor = Cursor::new(&data);
        let directory = bin.directories[index].clone();

        let err = decode(&mut bin, &cursor, &directory).unwrap_err();
        assert!(matches!(err, DecodeError::Corrupted(msg) if msg.contains("too many entries")));
        assert!(bin.resources.is_none());
    }

    #[test]
    fn test_self_referencing_tree_hits_depth_limit() {
        let mut rsrc = vec![0u8; 0x40];
        // Root: one ID entry whose subdirectory is the root itself.
        rsrc[14] = 1;
        rsrc[16..20].copy_from_slice(&1u32.to_le_bytes());
        rsrc[20..24].copy_from_slice(&0x8000_0000u32.to_le_bytes());

        let (data, mut bin) = build_binary(&rsrc);
        let cursor = Cursor::new(&data);
        let directory = bin.directories[DirectoryKind::ResourceTable.index()].clone();

        let err = decode(&mut bin, &cursor, &directory).unwrap_err();
        assert!(matches!(err, DecodeError::Corrupted(msg) if msg.contains("depth")));
        assert!(bin.resources.is_none());
    }
}
