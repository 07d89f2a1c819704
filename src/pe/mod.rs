//! PE image decoding
//!
//! [`Binary::decode`] is the entry point: it never fails. Every stage runs
//! behind an isolation boundary; a stage that cannot complete is logged,
//! recorded on the binary as an absorbed failure, and the pipeline continues
//! with whatever later stages can still be located. The result is a sparse
//! model: fields for stages that failed stay at their empty defaults.

use tracing::{debug, warn};

use crate::cursor::Cursor;
use crate::error::{AbsorbedError, DecodeError};

pub mod directories;
pub mod headers;
pub mod sections;
pub mod types;

pub use sections::SectionTable;
pub use types::*;

/// Decoded model of one PE image.
///
/// All fields are plain owned data; directory records reference their owning
/// sections by table index, never by pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    /// Header preamble, absent when it could not be established.
    pub header: Option<Header>,
    pub sections: SectionTable,
    /// Always [`DIRECTORY_COUNT`] slots; unused slots are zeroed.
    pub directories: Vec<DataDirectory>,
    pub imports: Vec<Import>,
    /// Set as soon as a present import directory is seen, before any
    /// descriptor is read. Survives a corrupted descriptor array.
    pub has_imports: bool,
    pub tls: Option<Tls>,
    /// Like `has_imports`, set on sight of a present TLS directory.
    pub has_tls: bool,
    pub export: Option<Export>,
    pub relocations: Vec<RelocationBlock>,
    pub debug_entries: Vec<DebugEntry>,
    pub resources: Option<ResourceNode>,
    pub certificates: Vec<Certificate>,
    /// Stage failures absorbed during decoding, in pipeline order.
    pub warnings: Vec<AbsorbedError>,
}

impl Default for Binary {
    fn default() -> Self {
        Self {
            header: None,
            sections: SectionTable::default(),
            directories: zeroed_directories(),
            imports: Vec::new(),
            has_imports: false,
            tls: None,
            has_tls: false,
            export: None,
            relocations: Vec::new(),
            debug_entries: Vec::new(),
            resources: None,
            certificates: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

fn zeroed_directories() -> Vec<DataDirectory> {
    (0..DIRECTORY_COUNT)
        .map(|index| DataDirectory {
            kind: DirectoryKind::from_index(index),
            virtual_address: 0,
            size: 0,
            section: None,
        })
        .collect()
}

impl Binary {
    /// Decode a PE image from raw bytes. Never fails: structural damage is
    /// absorbed into [`Binary::warnings`] and the model stays sparse where
    /// decoding could not proceed.
    pub fn decode(data: &[u8]) -> Binary {
        let cursor = Cursor::new(data);
        let mut bin = Binary::default();
        debug!(size = data.len(), "decoding PE image");

        // DOS and COFF headers locate everything else; without them there is
        // nothing more to decode.
        let dos = match headers::decode_dos_header(&cursor) {
            Ok(dos) => dos,
            Err(err) => {
                bin.absorb("DOS header", err);
                return bin;
            }
        };
        let coff = match headers::decode_coff_header(&cursor, dos.e_lfanew as usize) {
            Ok(coff) => coff,
            Err(err) => {
                bin.absorb("COFF header", err);
                return bin;
            }
        };

        // The section table is located by the COFF header alone, so a broken
        // optional header does not cost us the sections.
        let section_table_offset =
            dos.e_lfanew as usize + 24 + coff.size_of_optional_header as usize;
        let number_of_sections = coff.number_of_sections;

        let optional = match headers::decode_optional_header(&cursor, dos.e_lfanew as usize + 24) {
            Ok(optional) => Some(optional),
            Err(err) => {
                bin.absorb("optional header", err);
                None
            }
        };

        match SectionTable::decode(&cursor, section_table_offset, number_of_sections) {
            Ok(table) => bin.sections = table,
            Err(err) => bin.absorb("section table", err),
        }

        // Directories need the optional header for their table offset and
        // for class-dependent record layouts.
        if let Some(optional) = optional {
            let header = Header {
                dos,
                coff,
                optional,
            };
            let class = header.class();
            let image_base = header.image_base();

            directories::decode_directory_table(&mut bin, &cursor, &header);
            bin.header = Some(header);
            directories::dispatch(&mut bin, &cursor, class, image_base);
        }

        bin
    }

    /// Record a stage failure and keep going. Cursor bounds violations are
    /// re-signaled as stage-labelled corruptions; by the time a failure
    /// crosses a stage boundary, "which read" no longer matters, only "which
    /// structure".
    pub(crate) fn absorb(&mut self, stage: &str, err: DecodeError) {
        let err = match err {
            DecodeError::OutOfBounds { .. } => {
                DecodeError::corrupted(format!("{stage} corrupted"))
            }
            other => other,
        };
        warn!(stage, error = %err, "decode stage failed");
        self.warnings.push(AbsorbedError {
            stage: stage.to_string(),
            error: err,
        });
    }

    /// Translate a relative virtual address to a file offset through the
    /// section table.
    pub fn rva_to_offset(&self, rva: u32) -> crate::error::Result<usize> {
        self.sections.rva_to_offset(rva)
    }

    /// The section containing `rva`, by table order.
    pub fn section_from_rva(&self, rva: u32) -> Option<&Section> {
        self.sections
            .section_from_rva(rva)
            .and_then(|index| self.sections.get(index))
    }

    /// The directory slot for `kind`. The table always has a slot for every
    /// kind; absence is signaled by a zeroed record, not a missing one.
    pub fn data_directory(&self, kind: DirectoryKind) -> &DataDirectory {
        &self.directories[kind.index()]
    }

    pub fn imports(&self) -> &[Import] {
        &self.imports
    }

    pub fn tls(&self) -> Option<&Tls> {
        self.tls.as_ref()
    }

    pub fn exports(&self) -> Option<&Export> {
        self.export.as_ref()
    }

    pub fn has_relocations(&self) -> bool {
        !self.relocations.is_empty()
    }

    pub fn has_debug_info(&self) -> bool {
        !self.debug_entries.is_empty()
    }

    pub fn has_resources(&self) -> bool {
        self.resources.is_some()
    }

    pub fn is_signed(&self) -> bool {
        !self.certificates.is_empty()
    }

    pub fn is_64bit(&self) -> bool {
        self.header
            .as_ref()
            .is_some_and(|h| h.optional.is_64bit())
    }

    pub fn entry_point(&self) -> Option<u32> {
        self.header.as_ref().map(Header::entry_point)
    }

    pub fn image_base(&self) -> Option<u64> {
        self.header.as_ref().map(Header::image_base)
    }

    pub fn machine(&self) -> Option<Machine> {
        self.header.as_ref().map(Header::machine)
    }
}
