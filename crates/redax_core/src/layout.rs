//! Fixed header geometry of a PE image and the probe that classifies an
//! `MZ` candidate.
//!
//! Offsets in the DOS header are relative to the `MZ` match. Offsets in the
//! PE header are relative to the `PE` signature, which sits at
//! `match + e_lfanew`.

use std::fmt;
use std::ops::Range;

use crate::error::Result;
use crate::traits::ByteStore;

pub const MZ_SIGNATURE: &[u8; 2] = b"MZ";
pub const PE_SIGNATURE: &[u8; 2] = b"PE";

/// Text of the DOS stub every PE linker emits. Its presence is the only
/// admissibility test for an `MZ` candidate.
pub const DOS_STUB_MESSAGE: &[u8; 39] = b"This program cannot be run in DOS mode.";

/// `e_lfanew`: signed 32-bit offset of the PE header, relative to the match.
pub const NEW_HEADER_POINTER: u64 = 0x3C;
/// Start of the DOS stub message, relative to the match.
pub const DOS_STUB: u64 = 0x4E;

/// `SizeOfOptionalHeader` (signed 16-bit), relative to the PE header.
pub const SIZE_OF_OPTIONAL_HEADER: u64 = 20;
/// First byte of the optional header, relative to the PE header.
pub const OPTIONAL_HEADER: u64 = 24;
/// `SizeOfCode` (signed 32-bit), relative to the PE header.
pub const SIZE_OF_CODE: u64 = 28;
/// `SizeOfInitializedData` (signed 32-bit), relative to the PE header.
pub const SIZE_OF_INITIALIZED_DATA: u64 = 32;
/// One past the last header byte the redactor reads.
pub const HEADER_FIELDS_END: u64 = 36;

/// The fields read from a confirmed PE header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeHeader {
    /// Absolute offset of the `PE` signature.
    pub offset: u64,
    pub size_of_optional_header: i16,
    pub size_of_code: i32,
    pub size_of_initialized_data: i32,
}

impl PeHeader {
    /// First byte after the optional header.
    #[must_use]
    pub fn text_start(&self) -> i64 {
        self.offset as i64 + OPTIONAL_HEADER as i64 + i64::from(self.size_of_optional_header)
    }

    /// Number of bytes covered by code and initialized data.
    #[must_use]
    pub fn code_size(&self) -> i64 {
        i64::from(self.size_of_code) + i64::from(self.size_of_initialized_data)
    }

    /// Resolves the byte range to overwrite for a header found by the match
    /// at `match_offset` in a store of `store_len` bytes.
    pub fn redaction_range(
        &self,
        match_offset: u64,
        store_len: u64,
    ) -> std::result::Result<Range<u64>, Malformed> {
        let code_size = self.code_size();
        if code_size <= 0 {
            return Err(Malformed::NonPositiveSize(code_size));
        }

        let start = self.text_start();
        if start <= match_offset as i64 {
            return Err(Malformed::BeforeMatch { start });
        }

        let start = start as u64;
        let end = start + code_size as u64;
        if end > store_len {
            return Err(Malformed::PastEnd {
                end,
                size: store_len,
            });
        }

        Ok(start..end)
    }
}

/// Why a confirmed PE header cannot be redacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    /// The header fields run past the end of the store.
    Truncated,
    /// `SizeOfCode + SizeOfInitializedData` is zero or negative.
    NonPositiveSize(i64),
    /// The range would start at or before the `MZ` match.
    BeforeMatch { start: i64 },
    /// The range would end past the end of the store.
    PastEnd { end: u64, size: u64 },
}

impl fmt::Display for Malformed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "header fields truncated by end of image"),
            Self::NonPositiveSize(size) => write!(f, "non-positive code size {}", size),
            Self::BeforeMatch { start } => {
                write!(f, "section data at {} precedes the MZ signature", start)
            }
            Self::PastEnd { end, size } => {
                write!(f, "section data ends at {} past image size {}", end, size)
            }
        }
    }
}

/// Outcome of probing an `MZ` candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// No DOS stub message: a coincidental `MZ`.
    NoStub,
    /// DOS stub present but `e_lfanew` does not lead to a `PE` signature.
    Corrupt,
    /// A PE header whose geometry cannot be redacted safely.
    Malformed(Malformed),
    /// A PE header with a valid redaction range.
    Redactable { header: PeHeader, range: Range<u64> },
}

/// Classifies the `MZ` match at `match_offset`.
///
/// Reads that would run past the end of the store fail closed: a truncated
/// DOS stub is [`Probe::NoStub`], an unreachable `PE` signature is
/// [`Probe::Corrupt`] and truncated header fields are [`Malformed::Truncated`].
pub fn probe<S: ByteStore + ?Sized>(store: &mut S, match_offset: u64) -> Result<Probe> {
    let mut stub = [0u8; DOS_STUB_MESSAGE.len()];
    if !store.read_exact_at(match_offset + DOS_STUB, &mut stub)? || &stub != DOS_STUB_MESSAGE {
        return Ok(Probe::NoStub);
    }

    let mut pointer = [0u8; 4];
    if !store.read_exact_at(match_offset + NEW_HEADER_POINTER, &mut pointer)? {
        return Ok(Probe::NoStub);
    }
    let e_lfanew = i32::from_le_bytes(pointer);

    let header_offset = match match_offset.checked_add_signed(i64::from(e_lfanew)) {
        Some(offset) => offset,
        None => return Ok(Probe::Corrupt),
    };

    let mut signature = [0u8; 2];
    if !store.read_exact_at(header_offset, &mut signature)? || &signature != PE_SIGNATURE {
        return Ok(Probe::Corrupt);
    }

    let mut fields = [0u8; HEADER_FIELDS_END as usize];
    if !store.read_exact_at(header_offset, &mut fields)? {
        return Ok(Probe::Malformed(Malformed::Truncated));
    }

    let header = PeHeader {
        offset: header_offset,
        size_of_optional_header: i16::from_le_bytes(field(&fields, SIZE_OF_OPTIONAL_HEADER)),
        size_of_code: i32::from_le_bytes(field(&fields, SIZE_OF_CODE)),
        size_of_initialized_data: i32::from_le_bytes(field(&fields, SIZE_OF_INITIALIZED_DATA)),
    };

    match header.redaction_range(match_offset, store.len()) {
        Ok(range) => Ok(Probe::Redactable { header, range }),
        Err(reason) => Ok(Probe::Malformed(reason)),
    }
}

#[inline]
fn field<const N: usize>(fields: &[u8], at: u64) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&fields[at as usize..at as usize + N]);
    out
}
