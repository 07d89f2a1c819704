//! Error types for the petrel PE decoder.
//!
//! Every decode stage reports failures through [`DecodeError`]. The
//! orchestrator absorbs stage-level failures instead of propagating them
//! (see [`crate::pe::Binary::decode`]); the absorbed errors are kept on the
//! decoded binary as [`AbsorbedError`] records so the policy stays auditable.

use thiserror::Error;

/// Decode error raised by the cursor or by a decode stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A cursor read fell outside the byte source.
    #[error("read of {length} bytes at offset {offset:#x} is out of bounds")]
    OutOfBounds { offset: usize, length: usize },

    /// A stage-specific structural violation. Carries the stage label,
    /// e.g. `"optional header corrupted"`.
    #[error("{0}")]
    Corrupted(String),

    /// Address translation miss: no section contains the virtual address.
    #[error("no section contains virtual address {rva:#x}")]
    NotFound { rva: u32 },

    /// Import-specific invariant violation.
    #[error("malformed import: {0}")]
    MalformedImport(String),
}

impl DecodeError {
    /// Shorthand for a stage-labelled corruption error.
    pub fn corrupted(stage: impl Into<String>) -> Self {
        Self::Corrupted(stage.into())
    }
}

/// Result type alias for petrel operations
pub type Result<T> = std::result::Result<T, DecodeError>;

/// A failure that was caught at a stage boundary and logged instead of
/// aborting the decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsorbedError {
    /// Which stage or directory kind failed, e.g. `"headers"` or `"import table"`.
    pub stage: String,
    pub error: DecodeError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DecodeError::OutOfBounds {
            offset: 0x200,
            length: 8,
        };
        assert_eq!(
            err.to_string(),
            "read of 8 bytes at offset 0x200 is out of bounds"
        );

        let err = DecodeError::corrupted("TLS corrupted (data template)");
        assert_eq!(err.to_string(), "TLS corrupted (data template)");

        let err = DecodeError::NotFound { rva: 0xdead0 };
        assert_eq!(
            err.to_string(),
            "no section contains virtual address 0xdead0"
        );

        let err = DecodeError::MalformedImport("library name RVA is zero".to_string());
        assert_eq!(err.to_string(), "malformed import: library name RVA is zero");
    }
}
