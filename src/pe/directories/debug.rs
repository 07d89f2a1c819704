//! Debug directory decoding
//!
//! A flat array of fixed 28-byte records; the count comes from the directory
//! size, capped against adversarial values.

use crate::cursor::Cursor;
use crate::error::Result;
use crate::pe::types::{DataDirectory, DebugEntry, SectionTags};
use crate::pe::Binary;

const RECORD_SIZE: usize = 28;
const MAX_RECORDS: usize = 1024;

/// Decode the debug directory into `bin.debug_entries`.
pub(crate) fn decode(bin: &mut Binary, cursor: &Cursor, directory: &DataDirectory) -> Result<()> {
    if let Some(index) = directory.section {
        bin.sections.add_tags(index, SectionTags::DEBUG);
    }

    let base = bin.sections.rva_to_offset(directory.virtual_address)?;
    let count = (directory.size as usize / RECORD_SIZE).min(MAX_RECORDS);

    for index in 0..count {
        let offset = base + index * RECORD_SIZE;
        bin.debug_entries.push(DebugEntry {
            characteristics: cursor.read_u32(offset)?,
            time_date_stamp: cursor.read_u32(offset + 4)?,
            major_version: cursor.read_u16(offset + 8)?,
            minor_version: cursor.read_u16(offset + 10)?,
            debug_type: cursor.read_u32(offset + 12)?,
            size_of_data: cursor.read_u32(offset + 16)?,
            address_of_raw_data: cursor.read_u32(offset + 20)?,
            pointer_to_raw_data: cursor.read_u32(offset + 24)?,
        });
    }

    Ok(())
}
