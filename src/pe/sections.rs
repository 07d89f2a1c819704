//! Section table building and address translation
//!
//! The section table is decoded once, then its length never changes; later
//! stages refer to sections by index and only mutate their tag sets. The
//! table is kept in file order: when malformed input makes virtual ranges
//! overlap, the first section in table order wins address translation, which
//! matches loader precedence and is relied on by format-compatibility tests.

use crate::cursor::Cursor;
use crate::error::{DecodeError, Result};
use crate::pe::types::{Section, SectionTags};

/// Size of one on-disk section record.
const SECTION_RECORD_SIZE: usize = 40;

/// Decoded section sequence with index-stable lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionTable {
    sections: Vec<Section>,
}

impl SectionTable {
    pub fn new(sections: Vec<Section>) -> Self {
        Self { sections }
    }

    /// Decode a fixed-count array of section records at `offset`.
    ///
    /// Zero-sized sections are retained, not skipped: later stages query by
    /// address, not by size, and indices must stay aligned with the table.
    pub fn decode(cursor: &Cursor, offset: usize, count: u16) -> Result<Self> {
        let mut sections = Vec::with_capacity(count as usize);

        for index in 0..count as usize {
            let base = offset + index * SECTION_RECORD_SIZE;
            let record = cursor
                .read(base, SECTION_RECORD_SIZE)
                .map_err(|_| DecodeError::corrupted("section table corrupted"))?;

            let name_len = record[..8].iter().position(|&b| b == 0).unwrap_or(8);
            let name = String::from_utf8_lossy(&record[..name_len]).into_owned();

            sections.push(Section {
                name,
                virtual_size: cursor.read_u32(base + 8)?,
                virtual_address: cursor.read_u32(base + 12)?,
                size_of_raw_data: cursor.read_u32(base + 16)?,
                pointer_to_raw_data: cursor.read_u32(base + 20)?,
                characteristics: cursor.read_u32(base + 36)?,
                tags: SectionTags::empty(),
            });
        }

        Ok(Self { sections })
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn get(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn by_name(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Add semantic tags to a section. Additive: tagging an already-tagged
    /// section is a no-op. Out-of-range indices are ignored.
    pub fn add_tags(&mut self, index: usize, tags: SectionTags) {
        if let Some(section) = self.sections.get_mut(index) {
            section.tags |= tags;
        }
    }

    /// Index of the first section in table order whose virtual range
    /// contains `rva`.
    pub fn section_from_rva(&self, rva: u32) -> Option<usize> {
        self.sections.iter().position(|s| s.contains_rva(rva))
    }

    /// Index of the first section in table order whose file range contains
    /// `offset`.
    pub fn section_from_offset(&self, offset: usize) -> Option<usize> {
        self.sections.iter().position(|s| s.contains_offset(offset))
    }

    /// Translate a virtual address to a file offset through the section
    /// table.
    ///
    /// A partial function: absence of a containing section is `NotFound`,
    /// never a silent zero.
    pub fn rva_to_offset(&self, rva: u32) -> Result<usize> {
        let index = self
            .section_from_rva(rva)
            .ok_or(DecodeError::NotFound { rva })?;
        let section = &self.sections[index];
        Ok(section.pointer_to_raw_data as usize + (rva - section.virtual_address) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(name: &str, va: u32, vsize: u32, raw: u32, rsize: u32) -> Section {
        Section {
            name: name.to_string(),
            virtual_address: va,
            virtual_size: vsize,
            pointer_to_raw_data: raw,
            size_of_raw_data: rsize,
            characteristics: 0,
            tags: SectionTags::empty(),
        }
    }

    #[test]
    fn test_rva_to_offset() {
        let table = SectionTable::new(vec![
            section(".text", 0x1000, 0x1000, 0x400, 0x1000),
            section(".data", 0x2000, 0x1000, 0x1400, 0x1000),
        ]);

        assert_eq!(table.rva_to_offset(0x1000).unwrap(), 0x400);
        assert_eq!(table.rva_to_offset(0x1500).unwrap(), 0x900);
        assert_eq!(table.rva_to_offset(0x2FFF).unwrap(), 0x23FF);

        assert_eq!(
            table.rva_to_offset(0x500),
            Err(DecodeError::NotFound { rva: 0x500 })
        );
        assert_eq!(
            table.rva_to_offset(0x3000),
            Err(DecodeError::NotFound { rva: 0x3000 })
        );
    }

    #[test]
    fn test_overlapping_sections_first_in_table_order_wins() {
        // Malformed input: both ranges contain 0x1800. The first section in
        // table order must win, regardless of address ordering.
        let table = SectionTable::new(vec![
            section(".b", 0x1500, 0x1000, 0x2000, 0x1000),
            section(".a", 0x1000, 0x1000, 0x400, 0x1000),
        ]);

        assert_eq!(table.section_from_rva(0x1800), Some(0));
        assert_eq!(table.rva_to_offset(0x1800).unwrap(), 0x2000 + 0x300);
        // An address only inside the second section still resolves.
        assert_eq!(table.rva_to_offset(0x1100).unwrap(), 0x400 + 0x100);
    }

    #[test]
    fn test_section_from_offset() {
        let table = SectionTable::new(vec![
            section(".text", 0x1000, 0x1000, 0x400, 0x1000),
            section(".data", 0x2000, 0x1000, 0x1400, 0x1000),
        ]);

        assert_eq!(table.section_from_offset(0x400), Some(0));
        assert_eq!(table.section_from_offset(0x1400), Some(1));
        assert_eq!(table.section_from_offset(0x100), None);
        assert_eq!(table.section_from_offset(0x2400), None);
    }

    #[test]
    fn test_zero_sized_sections_are_retained() {
        let table = SectionTable::new(vec![
            section(".bss", 0x1000, 0, 0, 0),
            section(".data", 0x2000, 0x1000, 0x400, 0x1000),
        ]);

        assert_eq!(table.len(), 2);
        // The zero-sized range contains nothing, including its own start.
        assert_eq!(table.section_from_rva(0x1000), None);
        assert_eq!(table.section_from_rva(0x2000), Some(1));
    }

    #[test]
    fn test_add_tags_idempotent() {
        let mut table = SectionTable::new(vec![section(".rdata", 0x1000, 0x1000, 0x400, 0x1000)]);

        table.add_tags(0, SectionTags::IMPORT);
        let once = table.get(0).unwrap().tags;
        table.add_tags(0, SectionTags::IMPORT);
        assert_eq!(table.get(0).unwrap().tags, once);

        table.add_tags(0, SectionTags::TLS);
        assert!(table
            .get(0)
            .unwrap()
            .tags
            .contains(SectionTags::IMPORT | SectionTags::TLS));

        // Out-of-range index is ignored
        table.add_tags(5, SectionTags::DEBUG);
    }

    #[test]
    fn test_decode_section_records() {
        let mut data = vec![0u8; 2 * SECTION_RECORD_SIZE];
        data[0..5].copy_from_slice(b".text");
        data[8] = 0x00; // virtual size 0x1000
        data[9] = 0x10;
        data[13] = 0x10; // virtual address 0x1000
        data[17] = 0x02; // raw size 0x200
        data[21] = 0x02; // raw pointer 0x200
        data[39] = 0x60; // characteristics

        data[40..45].copy_from_slice(b".data");
        data[53] = 0x20; // virtual address 0x2000

        let table = SectionTable::decode(&Cursor::new(&data), 0, 2).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0).unwrap().name, ".text");
        assert_eq!(table.get(0).unwrap().virtual_address, 0x1000);
        assert_eq!(table.get(0).unwrap().size_of_raw_data, 0x200);
        assert_eq!(table.get(1).unwrap().name, ".data");
        assert_eq!(table.get(1).unwrap().virtual_size, 0);
    }

    #[test]
    fn test_decode_truncated_table() {
        let data = vec![0u8; SECTION_RECORD_SIZE + 10];
        let err = SectionTable::decode(&Cursor::new(&data), 0, 2).unwrap_err();
        assert_eq!(err, DecodeError::corrupted("section table corrupted"));
    }
}
