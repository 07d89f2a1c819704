//! Import table decoding
//!
//! Walks the import descriptor array to its all-zero address-table sentinel,
//! then walks each library's driver table (lookup table preferred, address
//! table as fallback) word by word to the zero sentinel. The high bit of a
//! driver word marks an ordinal import; otherwise the low bits point at a
//! (hint, name) pair. IAT values are captured from the parallel address
//! table when it is readable.

use tracing::debug;

use crate::cursor::Cursor;
use crate::error::{DecodeError, Result};
use crate::pe::types::{
    DataDirectory, DirectoryKind, Import, ImportEntry, PeClass, SectionTags,
};
use crate::pe::Binary;

/// Size of one import descriptor record.
const DESCRIPTOR_SIZE: usize = 20;

/// Decode the import directory into `bin.imports`.
///
/// Marks the binary as having imports before the first read, so a corrupted
/// table still leaves `has_imports` observable.
pub(crate) fn decode(
    bin: &mut Binary,
    cursor: &Cursor,
    class: PeClass,
    directory: &DataDirectory,
) -> Result<()> {
    bin.has_imports = true;

    if let Some(index) = directory.section {
        bin.sections.add_tags(index, SectionTags::IMPORT);
    }

    let iat_directory = &bin.directories[DirectoryKind::ImportAddressTable.index()];
    let directory_index = Some(DirectoryKind::ImportTable.index());
    let iat_directory_index = iat_directory.is_present().then(|| DirectoryKind::ImportAddressTable.index());

    let mut offset = bin.sections.rva_to_offset(directory.virtual_address)?;

    loop {
        let lookup_table_rva = cursor.read_u32(offset)?;
        let timestamp = cursor.read_u32(offset + 4)?;
        let forwarder_chain = cursor.read_u32(offset + 8)?;
        let name_rva = cursor.read_u32(offset + 12)?;
        let address_table_rva = cursor.read_u32(offset + 16)?;

        // Sentinel: a descriptor with no address table ends the array.
        if address_table_rva == 0 {
            break;
        }

        if name_rva == 0 {
            return Err(DecodeError::MalformedImport(
                "library name RVA is zero".to_string(),
            ));
        }

        let name_offset = bin.sections.rva_to_offset(name_rva)?;
        let name = cursor.read_cstring(name_offset)?;

        let mut entries = Vec::new();
        if let Err(err) = decode_entries(
            bin,
            cursor,
            class,
            lookup_table_rva,
            address_table_rva,
            &mut entries,
        ) {
            // Absorbed locally: this library keeps whatever entries were
            // decoded before the failure, and the descriptor walk continues.
            debug!(library = %name, error = %err, "import entry walk truncated");
        }

        bin.imports.push(Import {
            name,
            import_lookup_table_rva: lookup_table_rva,
            import_address_table_rva: address_table_rva,
            timestamp,
            forwarder_chain,
            directory: directory_index,
            iat_directory: iat_directory_index,
            entries,
        });

        offset += DESCRIPTOR_SIZE;
    }

    Ok(())
}

/// Walk one library's driver table into `entries`.
///
/// The driver table is the lookup table when its RVA is non-zero, else the
/// address table; with both absent the library has no entries. Entry count
/// is governed solely by the driver table's zero sentinel.
fn decode_entries(
    bin: &Binary,
    cursor: &Cursor,
    class: PeClass,
    lookup_table_rva: u32,
    address_table_rva: u32,
    entries: &mut Vec<ImportEntry>,
) -> Result<()> {
    let driver_rva = if lookup_table_rva != 0 {
        lookup_table_rva
    } else {
        address_table_rva
    };
    if driver_rva == 0 {
        return Ok(());
    }

    let driver_offset = bin.sections.rva_to_offset(driver_rva)?;
    // Best effort: an unreadable IAT zeroes the iat_value fields but does
    // not shorten the entry list.
    let iat_offset = bin.sections.rva_to_offset(address_table_rva).ok();

    let word_size = class.word_size();

    for index in 0.. {
        let word = cursor.read_word(driver_offset + index * word_size, class)?;
        if word == 0 {
            break;
        }

        let iat_value = iat_offset
            .and_then(|base| cursor.read_word(base + index * word_size, class).ok())
            .unwrap_or(0);

        // Originating slot address, kept even when the address table itself
        // was unreadable.
        let rva = address_table_rva as u64 + (index * word_size) as u64;

        let entry = if word & class.ordinal_flag() != 0 {
            ImportEntry {
                ordinal: Some((word & 0xFFFF) as u16),
                hint: None,
                name: None,
                iat_value,
                rva,
            }
        } else {
            let hint_name_rva = (word & 0x7FFF_FFFF) as u32;
            let hint_offset = bin.sections.rva_to_offset(hint_name_rva)?;
            ImportEntry {
                ordinal: None,
                hint: Some(cursor.read_u16(hint_offset)?),
                name: Some(cursor.read_cstring(hint_offset + 2)?),
                iat_value,
                rva,
            }
        };

        entries.push(entry);
    }

    Ok(())
}
