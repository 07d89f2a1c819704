//! Core PE data types and structures
//!
//! Everything here is an owned, alignment-safe value record produced by the
//! field-by-field decoders; nothing borrows the byte source. Records compare
//! by structural value and hash consistently with equality, so binding and
//! accessor layers can treat them as plain value data.

use bitflags::bitflags;
use std::ops::Range;

// PE constants
pub const DOS_SIGNATURE: u16 = 0x5A4D; // MZ
pub const PE_SIGNATURE: [u8; 4] = *b"PE\0\0";
pub const PE32_MAGIC: u16 = 0x10B;
pub const PE32PLUS_MAGIC: u16 = 0x20B;

/// Number of data directory slots. A format constant, never input-derived.
pub const DIRECTORY_COUNT: usize = 16;

// Section characteristics
pub const IMAGE_SCN_CNT_CODE: u32 = 0x00000020;
pub const IMAGE_SCN_CNT_INITIALIZED_DATA: u32 = 0x00000040;
pub const IMAGE_SCN_CNT_UNINITIALIZED_DATA: u32 = 0x00000080;
pub const IMAGE_SCN_MEM_EXECUTE: u32 = 0x20000000;
pub const IMAGE_SCN_MEM_READ: u32 = 0x40000000;
pub const IMAGE_SCN_MEM_WRITE: u32 = 0x80000000;

/// Format class, selected once at runtime from the optional header magic and
/// threaded explicitly through the decoders. Determines word width and the
/// optional-header layout variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeClass {
    Pe32,
    Pe64,
}

impl PeClass {
    /// Import thunk / TLS callback word width in bytes.
    pub fn word_size(self) -> usize {
        match self {
            Self::Pe32 => 4,
            Self::Pe64 => 8,
        }
    }

    /// High bit of an import lookup word, marking an ordinal import.
    pub fn ordinal_flag(self) -> u64 {
        match self {
            Self::Pe32 => 1 << 31,
            Self::Pe64 => 1 << 63,
        }
    }
}

/// Machine types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Machine {
    Unknown,
    I386,   // 0x014c
    X86_64, // 0x8664
    Arm,    // 0x01c0
    Arm64,  // 0xaa64
    ArmNT,  // 0x01c4
    IA64,   // 0x0200
    EBC,    // 0x0ebc
    Other(u16),
}

impl From<u16> for Machine {
    fn from(value: u16) -> Self {
        match value {
            0x014c => Self::I386,
            0x8664 => Self::X86_64,
            0x01c0 => Self::Arm,
            0xaa64 => Self::Arm64,
            0x01c4 => Self::ArmNT,
            0x0200 => Self::IA64,
            0x0ebc => Self::EBC,
            0 => Self::Unknown,
            other => Self::Other(other),
        }
    }
}

/// Subsystem types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Unknown,
    Native,                 // 1
    WindowsGui,             // 2
    WindowsCui,             // 3
    Os2Cui,                 // 5
    PosixCui,               // 7
    WindowsCeGui,           // 9
    EfiApplication,         // 10
    EfiBootServiceDriver,   // 11
    EfiRuntimeDriver,       // 12
    EfiRom,                 // 13
    Xbox,                   // 14
    WindowsBootApplication, // 16
    Other(u16),
}

impl From<u16> for Subsystem {
    fn from(value: u16) -> Self {
        match value {
            0 => Self::Unknown,
            1 => Self::Native,
            2 => Self::WindowsGui,
            3 => Self::WindowsCui,
            5 => Self::Os2Cui,
            7 => Self::PosixCui,
            9 => Self::WindowsCeGui,
            10 => Self::EfiApplication,
            11 => Self::EfiBootServiceDriver,
            12 => Self::EfiRuntimeDriver,
            13 => Self::EfiRom,
            14 => Self::Xbox,
            16 => Self::WindowsBootApplication,
            other => Self::Other(other),
        }
    }
}

/// DOS stub header (64 bytes). Only `e_lfanew` is consumed by later stages,
/// but the whole record is decoded and kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DosHeader {
    pub e_magic: u16,    // Magic number (MZ)
    pub e_cblp: u16,     // Bytes on last page of file
    pub e_cp: u16,       // Pages in file
    pub e_crlc: u16,     // Relocations
    pub e_cparhdr: u16,  // Size of header in paragraphs
    pub e_minalloc: u16, // Minimum extra paragraphs needed
    pub e_maxalloc: u16, // Maximum extra paragraphs needed
    pub e_ss: u16,       // Initial (relative) SS value
    pub e_sp: u16,       // Initial SP value
    pub e_csum: u16,     // Checksum
    pub e_ip: u16,       // Initial IP value
    pub e_cs: u16,       // Initial (relative) CS value
    pub e_lfarlc: u16,   // File address of relocation table
    pub e_ovno: u16,     // Overlay number
    pub e_lfanew: u32,   // File address of PE header
}

/// COFF file header (20 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoffHeader {
    pub machine: Machine,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

/// Optional header - common fields
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptionalHeaderCommon {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
}

/// 32-bit optional header
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptionalHeader32 {
    pub common: OptionalHeaderCommon,
    pub base_of_data: u32,
    pub image_base: u32,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub checksum: u32,
    pub subsystem: Subsystem,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u32,
    pub size_of_stack_commit: u32,
    pub size_of_heap_reserve: u32,
    pub size_of_heap_commit: u32,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

/// 64-bit optional header
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptionalHeader64 {
    pub common: OptionalHeaderCommon,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub checksum: u32,
    pub subsystem: Subsystem,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

/// Combined optional header enum
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OptionalHeader {
    Pe32(OptionalHeader32),
    Pe32Plus(OptionalHeader64),
}

impl OptionalHeader {
    pub fn magic(&self) -> u16 {
        match self {
            Self::Pe32(h) => h.common.magic,
            Self::Pe32Plus(h) => h.common.magic,
        }
    }

    pub fn class(&self) -> PeClass {
        match self {
            Self::Pe32(_) => PeClass::Pe32,
            Self::Pe32Plus(_) => PeClass::Pe64,
        }
    }

    pub fn entry_point(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.common.address_of_entry_point,
            Self::Pe32Plus(h) => h.common.address_of_entry_point,
        }
    }

    pub fn image_base(&self) -> u64 {
        match self {
            Self::Pe32(h) => h.image_base as u64,
            Self::Pe32Plus(h) => h.image_base,
        }
    }

    pub fn subsystem(&self) -> Subsystem {
        match self {
            Self::Pe32(h) => h.subsystem,
            Self::Pe32Plus(h) => h.subsystem,
        }
    }

    pub fn number_of_rva_and_sizes(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.number_of_rva_and_sizes,
            Self::Pe32Plus(h) => h.number_of_rva_and_sizes,
        }
    }

    pub fn is_64bit(&self) -> bool {
        matches!(self, Self::Pe32Plus(_))
    }

    /// Size of the fixed part of the optional header, i.e. the offset of the
    /// data directory table relative to the optional header start.
    pub fn fixed_size(&self) -> usize {
        match self {
            Self::Pe32(_) => 96,
            Self::Pe32Plus(_) => 112,
        }
    }
}

/// Decoded preamble: DOS stub header, COFF file header, optional header.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Header {
    pub dos: DosHeader,
    pub coff: CoffHeader,
    pub optional: OptionalHeader,
}

impl Header {
    pub fn class(&self) -> PeClass {
        self.optional.class()
    }

    pub fn machine(&self) -> Machine {
        self.coff.machine
    }

    pub fn image_base(&self) -> u64 {
        self.optional.image_base()
    }

    pub fn entry_point(&self) -> u32 {
        self.optional.entry_point()
    }

    /// File offset of the section table: just past the optional header.
    pub fn section_table_offset(&self) -> usize {
        self.dos.e_lfanew as usize + 24 + self.coff.size_of_optional_header as usize
    }
}

/// Data directory kinds, one per fixed table slot. The slot index determines
/// the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectoryKind {
    ExportTable,
    ImportTable,
    ResourceTable,
    ExceptionTable,
    CertificateTable,
    BaseRelocationTable,
    Debug,
    Architecture,
    GlobalPtr,
    TlsTable,
    LoadConfigTable,
    BoundImport,
    ImportAddressTable,
    DelayImportDescriptor,
    ClrRuntimeHeader,
    Reserved,
}

impl DirectoryKind {
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Self::ExportTable,
            1 => Self::ImportTable,
            2 => Self::ResourceTable,
            3 => Self::ExceptionTable,
            4 => Self::CertificateTable,
            5 => Self::BaseRelocationTable,
            6 => Self::Debug,
            7 => Self::Architecture,
            8 => Self::GlobalPtr,
            9 => Self::TlsTable,
            10 => Self::LoadConfigTable,
            11 => Self::BoundImport,
            12 => Self::ImportAddressTable,
            13 => Self::DelayImportDescriptor,
            14 => Self::ClrRuntimeHeader,
            _ => Self::Reserved,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::ExportTable => 0,
            Self::ImportTable => 1,
            Self::ResourceTable => 2,
            Self::ExceptionTable => 3,
            Self::CertificateTable => 4,
            Self::BaseRelocationTable => 5,
            Self::Debug => 6,
            Self::Architecture => 7,
            Self::GlobalPtr => 8,
            Self::TlsTable => 9,
            Self::LoadConfigTable => 10,
            Self::BoundImport => 11,
            Self::ImportAddressTable => 12,
            Self::DelayImportDescriptor => 13,
            Self::ClrRuntimeHeader => 14,
            Self::Reserved => 15,
        }
    }

    /// Stage label used when a sub-parser failure is absorbed.
    pub fn label(self) -> &'static str {
        match self {
            Self::ExportTable => "export table",
            Self::ImportTable => "import table",
            Self::ResourceTable => "resource table",
            Self::ExceptionTable => "exception table",
            Self::CertificateTable => "certificate table",
            Self::BaseRelocationTable => "base relocation table",
            Self::Debug => "debug directory",
            Self::Architecture => "architecture",
            Self::GlobalPtr => "global pointer",
            Self::TlsTable => "TLS table",
            Self::LoadConfigTable => "load config table",
            Self::BoundImport => "bound import table",
            Self::ImportAddressTable => "import address table",
            Self::DelayImportDescriptor => "delay import descriptor",
            Self::ClrRuntimeHeader => "CLR runtime header",
            Self::Reserved => "reserved",
        }
    }
}

bitflags! {
    /// Semantic tags attached to sections during directory dispatch.
    /// Additive only: re-tagging is a no-op, never a conflict, and one
    /// section can carry several tags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SectionTags: u32 {
        const IMPORT      = 1 << 0;
        const EXPORT      = 1 << 1;
        const TLS         = 1 << 2;
        const RELOCATION  = 1 << 3;
        const DEBUG       = 1 << 4;
        const RESOURCE    = 1 << 5;
        const CERTIFICATE = 1 << 6;
    }
}

/// A contiguous region with a virtual-address range, a file range, and a
/// mutable tag set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Section {
    pub name: String,
    pub virtual_address: u32,
    pub virtual_size: u32,
    pub pointer_to_raw_data: u32,
    pub size_of_raw_data: u32,
    pub characteristics: u32,
    pub tags: SectionTags,
}

impl Section {
    pub fn virtual_range(&self) -> Range<u64> {
        let start = self.virtual_address as u64;
        start..start + self.virtual_size as u64
    }

    pub fn file_range(&self) -> Range<usize> {
        let start = self.pointer_to_raw_data as usize;
        start..start + self.size_of_raw_data as usize
    }

    pub fn contains_rva(&self, rva: u32) -> bool {
        self.virtual_range().contains(&(rva as u64))
    }

    pub fn contains_offset(&self, offset: usize) -> bool {
        self.file_range().contains(&offset)
    }

    pub fn is_executable(&self) -> bool {
        (self.characteristics & IMAGE_SCN_MEM_EXECUTE) != 0
    }

    pub fn is_readable(&self) -> bool {
        (self.characteristics & IMAGE_SCN_MEM_READ) != 0
    }

    pub fn is_writable(&self) -> bool {
        (self.characteristics & IMAGE_SCN_MEM_WRITE) != 0
    }

    pub fn contains_code(&self) -> bool {
        (self.characteristics & IMAGE_SCN_CNT_CODE) != 0
    }
}

/// One fixed-kind directory slot. `section` is a stable index into the
/// decoded binary's section sequence; it is absent when no section's virtual
/// range contains the directory's address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataDirectory {
    pub kind: DirectoryKind,
    pub virtual_address: u32,
    pub size: u32,
    pub section: Option<usize>,
}

impl DataDirectory {
    pub fn is_present(&self) -> bool {
        self.virtual_address != 0
    }
}

/// One imported library with its resolved entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Import {
    pub name: String,
    pub import_lookup_table_rva: u32,
    pub import_address_table_rva: u32,
    pub timestamp: u32,
    pub forwarder_chain: u32,
    /// Directory-table index of the import table slot, when present.
    pub directory: Option<usize>,
    /// Directory-table index of the IAT slot, when present.
    pub iat_directory: Option<usize>,
    pub entries: Vec<ImportEntry>,
}

/// One imported symbol slot: either an ordinal or a (hint, name) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportEntry {
    pub ordinal: Option<u16>,
    pub hint: Option<u16>,
    pub name: Option<String>,
    /// The IAT word paired with this slot, zero when the IAT was unreadable.
    pub iat_value: u64,
    /// Address-table RVA of this slot, kept even when the table itself was
    /// unreadable, for traceability.
    pub rva: u64,
}

impl ImportEntry {
    /// True iff the high bit of the lookup word was set; mutually exclusive
    /// with a populated (hint, name) pair.
    pub fn is_ordinal(&self) -> bool {
        self.ordinal.is_some()
    }
}

/// Thread-local-storage descriptor. At most one per binary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tls {
    pub raw_data_start: u64,
    pub raw_data_end: u64,
    pub address_of_index: u64,
    pub address_of_callbacks: u64,
    pub size_of_zero_fill: u32,
    pub characteristics: u32,
    /// Template blob copied between the rebased raw-data start/end addresses.
    pub data_template: Vec<u8>,
    /// Sentinel-terminated callback target addresses, sentinel excluded.
    pub callbacks: Vec<u64>,
    pub section: Option<usize>,
    pub directory: Option<usize>,
}

/// Export directory with its resolved entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Export {
    pub name: String,
    pub ordinal_base: u32,
    pub timestamp: u32,
    pub entries: Vec<ExportEntry>,
}

/// One exported symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExportEntry {
    pub ordinal: u32,
    pub rva: u32,
    pub name: Option<String>,
    /// Forwarder string when the address points back inside the export
    /// directory instead of at code.
    pub forwarder: Option<String>,
}

/// One base-relocation page block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelocationBlock {
    pub page_rva: u32,
    pub entries: Vec<Relocation>,
}

/// One relocation: 4-bit type, 12-bit page offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Relocation {
    pub kind: u8,
    pub offset: u16,
}

impl Relocation {
    pub fn rva(&self, page_rva: u32) -> u32 {
        page_rva.wrapping_add(self.offset as u32)
    }
}

/// Debug directory entry (28 bytes on disk)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DebugEntry {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub debug_type: u32,
    pub size_of_data: u32,
    pub address_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
}

/// Resource directory node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceNode {
    Directory {
        entries: Vec<ResourceEntry>,
    },
    Data {
        rva: u32,
        size: u32,
        code_page: u32,
    },
}

/// Resource entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceEntry {
    pub id: ResourceId,
    pub node: ResourceNode,
}

/// Resource ID
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Name(String),
    Id(u32),
}

/// Attribute certificate entry from the certificate table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Certificate {
    pub revision: u16,
    pub certificate_type: u16,
    pub data: Vec<u8>,
}
