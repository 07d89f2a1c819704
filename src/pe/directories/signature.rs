//! Certificate table decoding
//!
//! Format quirk: the certificate directory's "virtual address" is a plain
//! file offset, not an RVA, so it never resolves to a section. The table is
//! a sequence of WIN_CERTIFICATE records, each 8-byte aligned.

use tracing::debug;

use crate::cursor::Cursor;
use crate::error::Result;
use crate::pe::types::{Certificate, DataDirectory, SectionTags};
use crate::pe::Binary;

/// Decode the certificate table into `bin.certificates`.
pub(crate) fn decode(bin: &mut Binary, cursor: &Cursor, directory: &DataDirectory) -> Result<()> {
    if let Some(index) = directory.section {
        bin.sections.add_tags(index, SectionTags::CERTIFICATE);
    }

    // File offset, not an RVA. No address translation.
    let mut offset = directory.virtual_address as usize;
    let end = offset + directory.size as usize;

    while offset + 8 <= end {
        let length = cursor.read_u32(offset)? as usize;
        let revision = cursor.read_u16(offset + 4)?;
        let certificate_type = cursor.read_u16(offset + 6)?;

        if length < 8 || offset + length > end {
            // Keep what was decoded; a bad record ends the walk.
            debug!(offset, length, "certificate record with bad length");
            break;
        }

        let data = cursor.read(offset + 8, length - 8)?.to_vec();
        bin.certificates.push(Certificate {
            revision,
            certificate_type,
            data,
        });

        // Records are 8-byte aligned.
        offset += (length + 7) & !7;
    }

    Ok(())
}
