//! Data directory table decoding and sub-parser dispatch
//!
//! The directory table has a fixed number of slots; the count is a format
//! constant and is never trusted from the file. Each present directory is
//! associated with its owning section on a best-effort basis and then handed
//! to its sub-parser inside an isolated failure boundary: one corrupted
//! directory never prevents decoding of its siblings.

use tracing::debug;

use crate::cursor::Cursor;
use crate::pe::types::{DataDirectory, DirectoryKind, Header, PeClass, DIRECTORY_COUNT};
use crate::pe::Binary;

pub mod debug;
pub mod export;
pub mod import;
pub mod relocations;
pub mod resources;
pub mod signature;
pub mod tls;

/// Fixed canonical dispatch order, not file order.
const DISPATCH_ORDER: [DirectoryKind; 7] = [
    DirectoryKind::ImportTable,
    DirectoryKind::ExportTable,
    DirectoryKind::CertificateTable,
    DirectoryKind::TlsTable,
    DirectoryKind::BaseRelocationTable,
    DirectoryKind::Debug,
    DirectoryKind::ResourceTable,
];

/// Decode the fixed-count directory table following the optional header and
/// associate each present directory with its owning section.
///
/// Truncation is absorbed: slots that cannot be read stay zeroed so the
/// table length invariant (always [`DIRECTORY_COUNT`]) holds regardless of
/// input.
pub(crate) fn decode_directory_table(bin: &mut Binary, cursor: &Cursor, header: &Header) {
    let table_offset =
        header.dos.e_lfanew as usize + 24 + header.optional.fixed_size();

    let mut directories = Vec::with_capacity(DIRECTORY_COUNT);
    let mut truncated = false;

    for index in 0..DIRECTORY_COUNT {
        let kind = DirectoryKind::from_index(index);
        let base = table_offset + index * 8;

        let (virtual_address, size) = match (cursor.read_u32(base), cursor.read_u32(base + 4)) {
            (Ok(va), Ok(size)) => (va, size),
            _ => {
                truncated = true;
                (0, 0)
            }
        };

        let section = if virtual_address != 0 {
            match bin
                .sections
                .rva_to_offset(virtual_address)
                .map(|offset| bin.sections.section_from_offset(offset))
            {
                Ok(section) => section,
                Err(err) => {
                    debug!(kind = kind.label(), error = %err, "directory owner not resolved");
                    None
                }
            }
        } else {
            None
        };

        directories.push(DataDirectory {
            kind,
            virtual_address,
            size,
            section,
        });
    }

    if truncated {
        bin.absorb(
            "data directories",
            crate::error::DecodeError::corrupted("data directory table corrupted"),
        );
    }

    bin.directories = directories;
}

/// Dispatch each present directory to its sub-parser, in canonical order.
///
/// Every sub-parser runs behind the same isolation boundary: a failure is
/// absorbed and recorded on the binary, and dispatch continues with the
/// remaining kinds.
pub(crate) fn dispatch(bin: &mut Binary, cursor: &Cursor, class: PeClass, image_base: u64) {
    for kind in DISPATCH_ORDER {
        let directory = bin.directories[kind.index()].clone();
        if !directory.is_present() {
            continue;
        }

        let result = match kind {
            DirectoryKind::ImportTable => import::decode(bin, cursor, class, &directory),
            DirectoryKind::ExportTable => export::decode(bin, cursor, &directory),
            DirectoryKind::CertificateTable => signature::decode(bin, cursor, &directory),
            DirectoryKind::TlsTable => tls::decode(bin, cursor, class, image_base, &directory),
            DirectoryKind::BaseRelocationTable => relocations::decode(bin, cursor, &directory),
            DirectoryKind::Debug => debug::decode(bin, cursor, &directory),
            DirectoryKind::ResourceTable => resources::decode(bin, cursor, &directory),
            _ => Ok(()),
        };

        if let Err(err) = result {
            bin.absorb(kind.label(), err);
        }
    }
}
