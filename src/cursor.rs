//! Bounds-checked byte cursor over the raw image.
//!
//! Every read of the byte source goes through [`Cursor`]: fixed-layout
//! structures are decoded by reading their exact byte span and interpreting
//! it field by field with the explicit little-endian readers below, never by
//! aliasing a typed pointer onto the buffer. The buffer length carries no
//! alignment guarantee and may end in attacker-chosen garbage, so every read
//! is range-checked and fails with [`DecodeError::OutOfBounds`] instead of
//! touching out-of-range memory.

use crate::error::{DecodeError, Result};
use crate::pe::types::PeClass;

/// Read-only view over the immutable byte source of one decode session.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'d> {
    data: &'d [u8],
}

impl<'d> Cursor<'d> {
    pub fn new(data: &'d [u8]) -> Self {
        Self { data }
    }

    /// Length of the byte source.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The whole backing buffer.
    pub fn data(&self) -> &'d [u8] {
        self.data
    }

    /// Read `length` bytes at `offset`.
    ///
    /// Fails with `OutOfBounds` if `offset + length` overflows or exceeds the
    /// source length.
    pub fn read(&self, offset: usize, length: usize) -> Result<&'d [u8]> {
        let end = offset
            .checked_add(length)
            .ok_or(DecodeError::OutOfBounds { offset, length })?;
        self.data
            .get(offset..end)
            .ok_or(DecodeError::OutOfBounds { offset, length })
    }

    #[inline]
    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        Ok(self.read(offset, 1)?[0])
    }

    #[inline]
    pub fn read_u16(&self, offset: usize) -> Result<u16> {
        let bytes = self.read(offset, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    #[inline]
    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        let bytes = self.read(offset, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    #[inline]
    pub fn read_u64(&self, offset: usize) -> Result<u64> {
        let bytes = self.read(offset, 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Read one pointer-width word for the given format class, zero-extended
    /// to `u64`. The class is a runtime value chosen once from the optional
    /// header magic.
    #[inline]
    pub fn read_word(&self, offset: usize, class: PeClass) -> Result<u64> {
        match class {
            PeClass::Pe32 => Ok(self.read_u32(offset)? as u64),
            PeClass::Pe64 => self.read_u64(offset),
        }
    }

    /// Read a NUL-terminated string at `offset`.
    ///
    /// Fails with `OutOfBounds` if no terminator is found before the end of
    /// the source. Non-UTF-8 bytes are replaced rather than rejected; import
    /// names in the wild are not guaranteed clean.
    pub fn read_cstring(&self, offset: usize) -> Result<String> {
        let tail = self
            .data
            .get(offset..)
            .ok_or(DecodeError::OutOfBounds { offset, length: 1 })?;
        let len = memchr::memchr(0, tail).ok_or(DecodeError::OutOfBounds {
            offset,
            length: tail.len() + 1,
        })?;
        Ok(String::from_utf8_lossy(&tail[..len]).into_owned())
    }
}
