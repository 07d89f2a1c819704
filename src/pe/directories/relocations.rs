//! Base relocation table decoding
//!
//! The directory span is a sequence of page blocks: an 8-byte block header
//! (page RVA, block size) followed by 16-bit entries packing a 4-bit type
//! and a 12-bit page offset.

use crate::cursor::Cursor;
use crate::error::{DecodeError, Result};
use crate::pe::types::{DataDirectory, Relocation, RelocationBlock, SectionTags};
use crate::pe::Binary;

/// Decode the base relocation directory into `bin.relocations`.
pub(crate) fn decode(bin: &mut Binary, cursor: &Cursor, directory: &DataDirectory) -> Result<()> {
    if let Some(index) = directory.section {
        bin.sections.add_tags(index, SectionTags::RELOCATION);
    }

    let base = bin.sections.rva_to_offset(directory.virtual_address)?;
    let span = directory.size as usize;
    let mut consumed = 0usize;

    while consumed + 8 <= span {
        let page_rva = cursor.read_u32(base + consumed)?;
        let block_size = cursor.read_u32(base + consumed + 4)? as usize;

        if block_size < 8 || consumed + block_size > span {
            return Err(DecodeError::corrupted(
                "base relocation table corrupted (bad block size)",
            ));
        }

        // The directory span is attacker-controlled too; the block must fit
        // the byte source before its entry count sizes an allocation.
        cursor.read(base + consumed, block_size)?;

        let count = (block_size - 8) / 2;
        let mut entries = Vec::with_capacity(count);
        for index in 0..count {
            let word = cursor.read_u16(base + consumed + 8 + index * 2)?;
            entries.push(Relocation {
                kind: (word >> 12) as u8,
                offset: word & 0x0FFF,
            });
        }

        bin.relocations.push(RelocationBlock { page_rva, entries });
        consumed += block_size;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::sections::SectionTable;
    use crate::pe::types::{DirectoryKind, Section, DIRECTORY_COUNT};

    fn build_binary(block: &[u8]) -> (Vec<u8>, Binary) {
        let mut data = vec![0u8; 0x1200];
        data[0x200..0x200 + block.len()].copy_from_slice(block);

        let mut bin = Binary::default();
        bin.sections = SectionTable::new(vec![Section {
            name: ".reloc".to_string(),
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
        let index = DirectoryKind::BaseRelocationTable.index();
        bin.directories[index].virtual_address = 0x1000;
        bin.directories[index].size = block.len() as u32;
        bin.directories[index].section = Some(0);

        (data, bin)
    }

    #[test]
    fn test_decode_relocation_blocks() {
        // Block 1: page 0x1000, 12 bytes, two entries. Block 2: page 0x2000,
        // 10 bytes, one entry.
        let mut block = Vec::new();
        block.extend_from_slice(&0x1000u32.to_le_bytes());
        block.extend_from_slice(&12u32.to_le_bytes());
        block.extend_from_slice(&0x3A10u16.to_le_bytes()); // HIGHLOW at 0xA10
        block.extend_from_slice(&0x3A14u16.to_le_bytes());
        block.extend_from_slice(&0x2000u32.to_le_bytes());
        block.extend_from_slice(&10u32.to_le_bytes());
        block.extend_from_slice(&0xA123u16.to_le_bytes()); // DIR64 at 0x123

        let (data, mut bin) = build_binary(&block);
        let cursor = Cursor::new(&data);
        let directory = bin.directories[DirectoryKind::BaseRelocationTable.index()].clone();

        decode(&mut bin, &cursor, &directory).unwrap();

        assert_eq!(bin.relocations.len(), 2);
        assert_eq!(bin.relocations[0].page_rva, 0x1000);
        assert_eq!(bin.relocations[0].entries.len(), 2);
        assert_eq!(bin.relocations[0].entries[0].kind, 3);
        assert_eq!(bin.relocations[0].entries[0].offset, 0xA10);
        assert_eq!(bin.relocations[0].entries[0].rva(0x1000), 0x1A10);
        assert_eq!(bin.relocations[1].entries[0].kind, 0xA);
        assert!(bin
            .sections
            .get(0)
            .unwrap()
            .tags
            .contains(SectionTags::RELOCATION));
    }

    #[test]
    fn test_undersized_block_is_corrupted() {
        let mut block = Vec::new();
        block.extend_from_slice(&0x1000u32.to_le_bytes());
        block.extend_from_slice(&4u32.to_le_bytes()); // block size below header size

        let (data, mut bin) = build_binary(&block);
        let cursor = Cursor::new(&data);
        let directory = bin.directories[DirectoryKind::BaseRelocationTable.index()].clone();

        let err = decode(&mut bin, &cursor, &directory).unwrap_err();
        assert!(matches!(err, DecodeError::Corrupted(_)));
    }

    #[test]
    fn test_huge_claimed_block_fails_before_entry_walk() {
        // Both the span and the block size claim ~2 GiB while the file is a
        // few KiB. The walk must fail on the bounds check, not size an
        // allocation from the claimed entry count.
        let mut block = Vec::new();
        block.extend_from_slice(&0x1000u32.to_le_bytes());
        block.extend_from_slice(&0x7FFF_FFE0u32.to_le_bytes());

        let (data, mut bin) = build_binary(&block);
        let index = DirectoryKind::BaseRelocationTable.index();
        bin.directories[index].size = 0x7FFF_FFF0;
        let directory = bin.directories[index].clone();
        let cursor = Cursor::new(&data);

        let err = decode(&mut bin, &cursor, &directory).unwrap_err();
        assert!(matches!(err, DecodeError::OutOfBounds { .. }));
        assert!(bin.relocations.is_empty());
    }

    #[test]
    fn test_block_overrunning_directory_span_is_corrupted() {
        let mut block = Vec::new();
        block.extend_from_slice(&0x1000u32.to_le_bytes());
        block.extend_from_slice(&0x4000u32.to_le_bytes()); // larger than the span

        let (data, mut bin) = build_binary(&block);
        let cursor = Cursor::new(&data);
        let directory = bin.directories[DirectoryKind::BaseRelocationTable.index()].clone();

        assert!(decode(&mut bin, &cursor, &directory).is_err());
        assert!(bin.relocations.is_empty());
    }
}
