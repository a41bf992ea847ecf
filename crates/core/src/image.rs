//! Loaded executable image metadata
//!
//! # Record Layout (288 bytes, little-endian)
//!
//! ```text
//! start(8) + len(8) + data_size(8) + data_offset(8) + filename(256) = 288 bytes
//! ```
//!
//! The filename is NUL-padded. At most 255 bytes are stored so that the
//! record always carries a terminator.

use crate::error::{FormatError, FormatResult};
use crate::le_u64;

/// Size of the filename field
pub const FILENAME_CAPACITY: usize = 256;

/// Size of one packed image record
pub const IMAGE_RECORD_SIZE: usize = 32 + FILENAME_CAPACITY;

/// Owned image metadata, as produced on the capture side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    /// Load address
    pub start: u64,
    /// Mapped length in bytes
    pub len: u64,
    /// Number of captured bytes stored in the file
    pub data_size: u64,
    /// File offset of the captured bytes
    pub data_offset: u64,
    /// Path the image was loaded from
    pub filename: String,
}

impl ImageRecord {
    /// Create a record whose captured data is not yet placed
    pub fn pending(start: u64, len: u64, filename: impl Into<String>) -> Self {
        ImageRecord {
            start,
            len,
            data_size: 0,
            data_offset: 0,
            filename: filename.into(),
        }
    }

    /// The part of the filename that fits in the record
    pub fn stored_filename(&self) -> &str {
        truncate_to_boundary(&self.filename, FILENAME_CAPACITY - 1)
    }

    /// Whether the filename is cut when stored
    pub fn filename_truncated(&self) -> bool {
        self.stored_filename().len() < self.filename.len()
    }

    /// Serialize to the packed record
    pub fn to_bytes(&self) -> [u8; IMAGE_RECORD_SIZE] {
        let mut bytes = [0u8; IMAGE_RECORD_SIZE];
        bytes[0..8].copy_from_slice(&self.start.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.len.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.data_size.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.data_offset.to_le_bytes());
        let name = self.stored_filename().as_bytes();
        bytes[32..32 + name.len()].copy_from_slice(name);
        bytes
    }
}

/// Borrowed view of a packed image record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRef<'a> {
    /// Load address
    pub start: u64,
    /// Mapped length in bytes
    pub len: u64,
    /// Number of captured bytes stored in the file
    pub data_size: u64,
    /// File offset of the captured bytes
    pub data_offset: u64,
    /// Stored filename, borrowed from the record
    pub filename: &'a str,
}

impl<'a> ImageRef<'a> {
    /// Parse a packed record from the start of `bytes` without copying the name
    pub fn from_bytes(bytes: &'a [u8]) -> FormatResult<Self> {
        if bytes.len() < IMAGE_RECORD_SIZE {
            return Err(FormatError::truncated(
                "image",
                IMAGE_RECORD_SIZE,
                bytes.len(),
            ));
        }
        let raw_name = &bytes[32..IMAGE_RECORD_SIZE];
        let name_len = raw_name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(raw_name.len());
        let filename =
            std::str::from_utf8(&raw_name[..name_len]).map_err(|_| FormatError::InvalidFilename)?;

        Ok(ImageRef {
            start: le_u64(bytes, 0),
            len: le_u64(bytes, 8),
            data_size: le_u64(bytes, 16),
            data_offset: le_u64(bytes, 24),
            filename,
        })
    }

    /// Whether `addr` falls inside the mapped range
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr - self.start < self.len
    }

    /// Copy into an owned record
    pub fn to_record(&self) -> ImageRecord {
        ImageRecord {
            start: self.start,
            len: self.len,
            data_size: self.data_size,
            data_offset: self.data_offset,
            filename: self.filename.to_string(),
        }
    }
}

fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
