//! PE header decoding
//!
//! Three sequential fixed-offset reads: the DOS stub header at offset 0, the
//! COFF file header at `e_lfanew`, and the size-variant optional header
//! immediately after it. Cursor bounds violations are re-signaled as
//! stage-labelled `Corrupted` errors; nothing past this stage can be located
//! until it completes.

use crate::cursor::Cursor;
use crate::error::{DecodeError, Result};
use crate::pe::types::*;

/// Re-signal a cursor bounds failure as a stage-labelled corruption.
fn at_stage(stage: &str, err: DecodeError) -> DecodeError {
    match err {
        DecodeError::OutOfBounds { .. } => DecodeError::corrupted(format!("{stage} corrupted")),
        other => other,
    }
}

/// Decode the DOS stub header at offset 0.
pub fn decode_dos_header(cursor: &Cursor) -> Result<DosHeader> {
    let stage = "DOS header";
    let read16 = |offset| cursor.read_u16(offset).map_err(|e| at_stage(stage, e));

    let e_magic = read16(0)?;
    if e_magic != DOS_SIGNATURE {
        return Err(DecodeError::corrupted("DOS header corrupted (bad magic)"));
    }

    Ok(DosHeader {
        e_magic,
        e_cblp: read16(2)?,
        e_cp: read16(4)?,
        e_crlc: read16(6)?,
        e_cparhdr: read16(8)?,
        e_minalloc: read16(10)?,
        e_maxalloc: read16(12)?,
        e_ss: read16(14)?,
        e_sp: read16(16)?,
        e_csum: read16(18)?,
        e_ip: read16(20)?,
        e_cs: read16(22)?,
        e_lfarlc: read16(24)?,
        e_ovno: read16(26)?,
        e_lfanew: cursor.read_u32(60).map_err(|e| at_stage(stage, e))?,
    })
}

/// Decode the PE signature and COFF file header at `offset` (`e_lfanew`).
pub fn decode_coff_header(cursor: &Cursor, offset: usize) -> Result<CoffHeader> {
    let stage = "COFF header";

    let signature = cursor.read(offset, 4).map_err(|e| at_stage(stage, e))?;
    if signature != PE_SIGNATURE {
        return Err(DecodeError::corrupted("COFF header corrupted (bad PE signature)"));
    }

    let base = offset + 4;
    let read16 = |offset| cursor.read_u16(offset).map_err(|e| at_stage(stage, e));
    let read32 = |offset| cursor.read_u32(offset).map_err(|e| at_stage(stage, e));

    Ok(CoffHeader {
        machine: Machine::from(read16(base)?),
        number_of_sections: read16(base + 2)?,
        time_date_stamp: read32(base + 4)?,
        pointer_to_symbol_table: read32(base + 8)?,
        number_of_symbols: read32(base + 12)?,
        size_of_optional_header: read16(base + 16)?,
        characteristics: read16(base + 18)?,
    })
}

/// Decode the optional header at `offset`, selecting the 32- or 64-bit
/// layout from the magic field.
pub fn decode_optional_header(cursor: &Cursor, offset: usize) -> Result<OptionalHeader> {
    let stage = "optional header";
    let magic = cursor.read_u16(offset).map_err(|e| at_stage(stage, e))?;

    match magic {
        PE32_MAGIC => decode_optional_header32(cursor, offset).map_err(|e| at_stage(stage, e)),
        PE32PLUS_MAGIC => decode_optional_header64(cursor, offset).map_err(|e| at_stage(stage, e)),
        _ => Err(DecodeError::corrupted(format!(
            "optional header corrupted (unknown magic {magic:#06x})"
        ))),
    }
}

fn decode_common(cursor: &Cursor, offset: usize) -> Result<OptionalHeaderCommon> {
    Ok(OptionalHeaderCommon {
        magic: cursor.read_u16(offset)?,
        major_linker_version: cursor.read_u8(offset + 2)?,
        minor_linker_version: cursor.read_u8(offset + 3)?,
        size_of_code: cursor.read_u32(offset + 4)?,
        size_of_initialized_data: cursor.read_u32(offset + 8)?,
        size_of_uninitialized_data: cursor.read_u32(offset + 12)?,
        address_of_entry_point: cursor.read_u32(offset + 16)?,
        base_of_code: cursor.read_u32(offset + 20)?,
    })
}

fn decode_optional_header32(cursor: &Cursor, offset: usize) -> Result<OptionalHeader> {
    let common = decode_common(cursor, offset)?;

    let header = OptionalHeader32 {
        common,
        base_of_data: cursor.read_u32(offset + 24)?,
        image_base: cursor.read_u32(offset + 28)?,
        section_alignment: cursor.read_u32(offset + 32)?,
        file_alignment: cursor.read_u32(offset + 36)?,
        major_operating_system_version: cursor.read_u16(offset + 40)?,
        minor_operating_system_version: cursor.read_u16(offset + 42)?,
        major_image_version: cursor.read_u16(offset + 44)?,
        minor_image_version: cursor.read_u16(offset + 46)?,
        major_subsystem_version: cursor.read_u16(offset + 48)?,
        minor_subsystem_version: cursor.read_u16(offset + 50)?,
        win32_version_value: cursor.read_u32(offset + 52)?,
        size_of_image: cursor.read_u32(offset + 56)?,
        size_of_headers: cursor.read_u32(offset + 60)?,
        checksum: cursor.read_u32(offset + 64)?,
        subsystem: Subsystem::from(cursor.read_u16(offset + 68)?),
        dll_characteristics: cursor.read_u16(offset + 70)?,
        size_of_stack_reserve: cursor.read_u32(offset + 72)?,
        size_of_stack_commit: cursor.read_u32(offset + 76)?,
        size_of_heap_reserve: cursor.read_u32(offset + 80)?,
        size_of_heap_commit: cursor.read_u32(offset + 84)?,
        loader_flags: cursor.read_u32(offset + 88)?,
        number_of_rva_and_sizes: cursor.read_u32(offset + 92)?,
    };

    Ok(OptionalHeader::Pe32(header))
}

fn decode_optional_header64(cursor: &Cursor, offset: usize) -> Result<OptionalHeader> {
    let common = decode_common(cursor, offset)?;

    let header = OptionalHeader64 {
        common,
        image_base: cursor.read_u64(offset + 24)?,
        section_alignment: cursor.read_u32(offset + 32)?,
        file_alignment: cursor.read_u32(offset + 36)?,
        major_operating_system_version: cursor.read_u16(offset + 40)?,
        minor_operating_system_version: cursor.read_u16(offset + 42)?,
        major_image_version: cursor.read_u16(offset + 44)?,
        minor_image_version: cursor.read_u16(offset + 46)?,
        major_subsystem_version: cursor.read_u16(offset + 48)?,
        minor_subsystem_version: cursor.read_u16(offset + 50)?,
        win32_version_value: cursor.read_u32(offset + 52)?,
        size_of_image: cursor.read_u32(offset + 56)?,
        size_of_headers: cursor.read_u32(offset + 60)?,
        checksum: cursor.read_u32(offset + 64)?,
        subsystem: Subsystem::from(cursor.read_u16(offset + 68)?),
        dll_characteristics: cursor.read_u16(offset + 70)?,
        size_of_stack_reserve: cursor.read_u64(offset + 72)?,
        size_of_stack_commit: cursor.read_u64(offset + 80)?,
        size_of_heap_reserve: cursor.read_u64(offset + 88)?,
        size_of_heap_commit: cursor.read_u64(offset + 96)?,
        loader_flags: cursor.read_u32(offset + 104)?,
        number_of_rva_and_sizes: cursor.read_u32(offset + 108)?,
    };

    Ok(OptionalHeader::Pe32Plus(header))
}

/// Decode the full preamble: DOS header, COFF header, optional header.
pub fn decode_headers(cursor: &Cursor) -> Result<Header> {
    let dos = decode_dos_header(cursor)?;
    let coff = decode_coff_header(cursor, dos.e_lfanew as usize)?;
    let optional = decode_optional_header(cursor, dos.e_lfanew as usize + 24)?;

    Ok(Header {
        dos,
        coff,
        optional,
    })
}
