//! Trace file header
//!
//! # File Structure
//!
//! ```text
//! +----------------------+ 0
//! | FileHeader           | 72 bytes
//! +----------------------+ entries_offset (= 72)
//! | Entries              | entries_size bytes, one zstd stream
//! +----------------------+ branches_offset
//! | Branch records       | num_branches * 24 bytes
//! +----------------------+
//! | Image payloads       | captured bytes, one span per image
//! +----------------------+ images_offset
//! | Image records        | num_images * 288 bytes
//! +----------------------+
//! ```
//!
//! The header is written last, over a zeroed placeholder.

use crate::branch::BRANCH_RECORD_SIZE;
use crate::error::{FormatError, FormatResult};
use crate::image::IMAGE_RECORD_SIZE;
use crate::le_u64;

/// Magic constant: `b"CBPEXP!!"` read as a little-endian u64
pub const TRACE_MAGIC: u64 = 0x2121_5058_4550_4243;

/// Format version this build writes and reads
///
/// Version 0 is the layout produced by the DynamoRIO tracer client.
pub const TRACE_FORMAT_VERSION: u64 = 0;

/// Header size in bytes
pub const HEADER_SIZE: usize = 72;

/// Trace file header (72 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileHeader {
    /// Magic constant
    pub magic: u64,
    /// Format version
    pub version: u64,
    /// Number of logical entries in the compressed stream
    pub num_entries: u64,
    /// Offset of the compressed entry stream
    pub entries_offset: u64,
    /// Byte length of the compressed entry stream
    pub entries_size: u64,
    /// Number of branch records
    pub num_branches: u64,
    /// Offset of the branch record array
    pub branches_offset: u64,
    /// Number of image records
    pub num_images: u64,
    /// Offset of the image record array
    pub images_offset: u64,
}

impl FileHeader {
    /// A header carrying the current magic and version, all sections empty
    pub fn new() -> Self {
        FileHeader {
            magic: TRACE_MAGIC,
            version: TRACE_FORMAT_VERSION,
            ..Default::default()
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        let fields = [
            self.magic,
            self.version,
            self.num_entries,
            self.entries_offset,
            self.entries_size,
            self.num_branches,
            self.branches_offset,
            self.num_images,
            self.images_offset,
        ];
        for (i, field) in fields.iter().enumerate() {
            bytes[i * 8..i * 8 + 8].copy_from_slice(&field.to_le_bytes());
        }
        bytes
    }

    /// Parse header from the start of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> FormatResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::truncated("header", HEADER_SIZE, bytes.len()));
        }
        Ok(FileHeader {
            magic: le_u64(bytes, 0),
            version: le_u64(bytes, 8),
            num_entries: le_u64(bytes, 16),
            entries_offset: le_u64(bytes, 24),
            entries_size: le_u64(bytes, 32),
            num_branches: le_u64(bytes, 40),
            branches_offset: le_u64(bytes, 48),
            num_images: le_u64(bytes, 56),
            images_offset: le_u64(bytes, 64),
        })
    }

    /// Check magic and version
    pub fn validate(&self) -> FormatResult<()> {
        if self.magic != TRACE_MAGIC {
            return Err(FormatError::InvalidMagic {
                expected: TRACE_MAGIC,
                actual: self.magic,
            });
        }
        if self.version != TRACE_FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion {
                version: self.version,
                supported: TRACE_FORMAT_VERSION,
            });
        }
        Ok(())
    }

    /// Byte length of the branch record array, `None` on overflow
    pub fn branches_size(&self) -> Option<u64> {
        self.num_branches.checked_mul(BRANCH_RECORD_SIZE as u64)
    }

    /// Byte length of the image record array, `None` on overflow
    pub fn images_size(&self) -> Option<u64> {
        self.num_images.checked_mul(IMAGE_RECORD_SIZE as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FileHeader {
        FileHeader {
            num_entries: 100,
            entries_offset: 72,
            entries_size: 40,
            num_branches: 3,
            branches_offset: 112,
            num_images: 1,
            images_offset: 400,
            ..FileHeader::new()
        }
    }

    #[test]
    fn test_header_layout() {
        let bytes = sample().to_bytes();
        assert_eq!(&bytes[0..8], b"CBPEXP!!");
        assert_eq!(u64::from_le_bytes(bytes[8..16].try_into().unwrap()), 1);
        assert_eq!(u64::from_le_bytes(bytes[16..24].try_into().unwrap()), 100);
        assert_eq!(u64::from_le_bytes(bytes[64..72].try_into().unwrap()), 400);
        assert_eq!(FileHeader::from_bytes(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_zeroed_placeholder_fails_validation() {
        let header = FileHeader::from_bytes(&[0u8; HEADER_SIZE]).unwrap();
        assert!(matches!(
            header.validate(),
            Err(FormatError::InvalidMagic { actual: 0, .. })
        ));
    }

    #[test]
    fn test_version_mismatch() {
        let header = FileHeader {
            version: 1,
            ..sample()
        };
        assert_eq!(
            header.validate(),
            Err(FormatError::UnsupportedVersion {
                version: 1,
                supported: TRACE_FORMAT_VERSION
            })
        );
    }

    #[test]
    fn test_version_field_is_zero_on_disk() {
        let bytes = FileHeader::new().to_bytes();
        assert_eq!(&bytes[0..8], b"CBPEXP!!");
        assert_eq!(&bytes[8..16], &[0u8; 8]);
        assert!(FileHeader::from_bytes(&bytes).unwrap().validate().is_ok());
    }

    #[test]
    fn test_section_sizes() {
        let header = sample();
        assert_eq!(header.branches_size(), Some(72));
        assert_eq!(header.images_size(), Some(288));

        let huge = FileHeader {
            num_branches: u64::MAX,
            ..header
        };
        assert_eq!(huge.branches_size(), None);
    }
}
