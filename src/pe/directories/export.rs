//! Export table decoding
//!
//! Walks the export address table, then overlays names from the parallel
//! name-pointer and ordinal tables. An address that points back inside the
//! export directory's own range is a forwarder string, not code.

use tracing::debug;

use crate::cursor::Cursor;
use crate::error::Result;
use crate::pe::types::{DataDirectory, Export, ExportEntry, SectionTags};
use crate::pe::Binary;

/// Cap on table entry counts; adversarial headers routinely claim millions.
const MAX_ENTRIES: u32 = 0x10000;

/// Decode the export directory into `bin.export`.
pub(crate) fn decode(bin: &mut Binary, cursor: &Cursor, directory: &DataDirectory) -> Result<()> {
    if let Some(index) = directory.section {
        bin.sections.add_tags(index, SectionTags::EXPORT);
    }

    let offset = bin.sections.rva_to_offset(directory.virtual_address)?;

    let timestamp = cursor.read_u32(offset + 4)?;
    let name_rva = cursor.read_u32(offset + 12)?;
    let ordinal_base = cursor.read_u32(offset + 16)?;
    let number_of_functions = cursor.read_u32(offset + 20)?.min(MAX_ENTRIES);
    let number_of_names = cursor.read_u32(offset + 24)?.min(MAX_ENTRIES);
    let address_table_rva = cursor.read_u32(offset + 28)?;
    let name_table_rva = cursor.read_u32(offset + 32)?;
    let ordinal_table_rva = cursor.read_u32(offset + 36)?;

    let name = match bin.sections.rva_to_offset(name_rva) {
        Ok(name_offset) => cursor.read_cstring(name_offset).unwrap_or_default(),
        Err(_) => String::new(),
    };

    // Address table: one entry per exported slot.
    let mut entries = Vec::new();
    let table_offset = bin.sections.rva_to_offset(address_table_rva)?;
    let directory_range =
        directory.virtual_address..directory.virtual_address.wrapping_add(directory.size);
    for index in 0..number_of_functions {
        let rva = cursor.read_u32(table_offset + index as usize * 4)?;

        // An RVA inside the export directory itself is a forwarder string.
        let forwarder = if directory_range.contains(&rva) {
            bin.sections
                .rva_to_offset(rva)
                .ok()
                .and_then(|off| cursor.read_cstring(off).ok())
        } else {
            None
        };

        entries.push(ExportEntry {
            ordinal: ordinal_base.wrapping_add(index),
            rva,
            name: None,
            forwarder,
        });
    }

    // Name table: (name RVA, address-table index) pairs.
    if name_table_rva != 0 && ordinal_table_rva != 0 {
        let names_offset = bin.sections.rva_to_offset(name_table_rva)?;
        let ordinals_offset = bin.sections.rva_to_offset(ordinal_table_rva)?;

        for index in 0..number_of_names as usize {
            let symbol_rva = cursor.read_u32(names_offset + index * 4)?;
            let position = cursor.read_u16(ordinals_offset + index * 2)? as usize;

            let symbol = match bin.sections.rva_to_offset(symbol_rva) {
                Ok(off) => cursor.read_cstring(off)?,
                Err(err) => {
                    debug!(index, error = %err, "export name not resolved");
                    continue;
                }
            };

            if let Some(entry) = entries.get_mut(position) {
                entry.name = Some(symbol);
            }
        }
    }

    bin.export = Some(Export {
        name,
        ordinal_base,
        timestamp,
        entries,
    });

    Ok(())
}
