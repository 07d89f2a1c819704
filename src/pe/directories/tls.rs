//! TLS directory decoding
//!
//! Decodes the fixed-layout TLS header, copies the raw-data template between
//! the rebased start/end addresses, and walks the sentinel-terminated
//! callback array. The format allows at most one TLS record per binary.

use crate::cursor::Cursor;
use crate::error::{DecodeError, Result};
use crate::pe::types::{DataDirectory, DirectoryKind, PeClass, SectionTags, Tls};
use crate::pe::Binary;

/// Decode the TLS directory into `bin.tls`.
///
/// Marks the binary as having TLS before the first read.
pub(crate) fn decode(
    bin: &mut Binary,
    cursor: &Cursor,
    class: PeClass,
    image_base: u64,
    directory: &DataDirectory,
) -> Result<()> {
    bin.has_tls = true;

    if let Some(index) = directory.section {
        bin.sections.add_tags(index, SectionTags::TLS);
    }

    let offset = bin.sections.rva_to_offset(directory.virtual_address)?;

    let (raw_data_start, raw_data_end, address_of_index, address_of_callbacks, aux_offset) =
        match class {
            PeClass::Pe32 => (
                cursor.read_u32(offset)? as u64,
                cursor.read_u32(offset + 4)? as u64,
                cursor.read_u32(offset + 8)? as u64,
                cursor.read_u32(offset + 12)? as u64,
                offset + 16,
            ),
            PeClass::Pe64 => (
                cursor.read_u64(offset)?,
                cursor.read_u64(offset + 8)?,
                cursor.read_u64(offset + 16)?,
                cursor.read_u64(offset + 24)?,
                offset + 32,
            ),
        };
    let size_of_zero_fill = cursor.read_u32(aux_offset)?;
    let characteristics = cursor.read_u32(aux_offset + 4)?;

    let data_template = decode_template(bin, cursor, image_base, raw_data_start, raw_data_end)?;
    let callbacks = decode_callbacks(bin, cursor, class, image_base, address_of_callbacks)?;

    bin.tls = Some(Tls {
        raw_data_start,
        raw_data_end,
        address_of_index,
        address_of_callbacks,
        size_of_zero_fill,
        characteristics,
        data_template,
        callbacks,
        section: directory.section,
        directory: Some(DirectoryKind::TlsTable.index()),
    });

    Ok(())
}

/// Copy the raw-data template between the rebased start and end addresses.
///
/// An inverted range is rejected before the length subtraction: the span
/// length computation is unsigned, and letting it wrap would turn a
/// malformed header into an enormous read.
fn decode_template(
    bin: &Binary,
    cursor: &Cursor,
    image_base: u64,
    raw_data_start: u64,
    raw_data_end: u64,
) -> Result<Vec<u8>> {
    if raw_data_start == 0 && raw_data_end == 0 {
        return Ok(Vec::new());
    }

    let start_rva = raw_data_start.wrapping_sub(image_base);
    let end_rva = raw_data_end.wrapping_sub(image_base);
    if end_rva < start_rva || start_rva > u32::MAX as u64 || end_rva > u32::MAX as u64 {
        return Err(DecodeError::corrupted("TLS corrupted (data template)"));
    }

    let start = bin
        .sections
        .rva_to_offset(start_rva as u32)
        .map_err(|_| DecodeError::corrupted("TLS corrupted (data template)"))?;
    let length = (end_rva - start_rva) as usize;
    let template = cursor
        .read(start, length)
        .map_err(|_| DecodeError::corrupted("TLS corrupted (data template)"))?;

    Ok(template.to_vec())
}

/// Walk the callback array to its zero sentinel.
///
/// There is no upper bound other than the sentinel; running off the end of
/// the source is an `OutOfBounds` that aborts only TLS decoding.
fn decode_callbacks(
    bin: &Binary,
    cursor: &Cursor,
    class: PeClass,
    image_base: u64,
    address_of_callbacks: u64,
) -> Result<Vec<u64>> {
    let mut callbacks = Vec::new();
    if address_of_callbacks == 0 {
        return Ok(callbacks);
    }

    let rva = address_of_callbacks.wrapping_sub(image_base);
    if rva > u32::MAX as u64 {
        return Err(DecodeError::corrupted("TLS corrupted (callbacks)"));
    }
    let base = bin.sections.rva_to_offset(rva as u32)?;

    let word_size = class.word_size();
    for index in 0.. {
        let word = cursor.read_word(base + index * word_size, class)?;
        if word == 0 {
            break;
        }
        callbacks.push(word);
    }

    Ok(callbacks)
}
