//! Record-level format errors
//!
//! Raised while packing or unpacking a single on-disk record. Section-level
//! problems (bounds, decompression) belong to the analysis crate.

use thiserror::Error;

/// Result type alias for record encode/decode
pub type FormatResult<T> = std::result::Result<T, FormatError>;

/// Errors produced by the record pack/unpack routines
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Not enough bytes for the record
    #[error("Truncated {record}: need {expected} bytes, got {actual}")]
    Truncated {
        /// Record kind being decoded
        record: &'static str,
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Branch type tag outside the known set
    #[error("Invalid branch type tag: {0}")]
    InvalidBranchType(u32),

    /// Branch index does not fit the entry encoding
    #[error("Branch index {index} does not fit in an entry (max {max})")]
    BranchIndexTooLarge {
        /// Offending index
        index: u64,
        /// Largest encodable index
        max: u64,
    },

    /// Image filename is not valid UTF-8
    #[error("Image filename is not valid UTF-8")]
    InvalidFilename,

    /// Header magic constant mismatch
    #[error("Invalid magic: expected {expected:#018x}, got {actual:#018x}")]
    InvalidMagic {
        /// Expected magic
        expected: u64,
        /// Magic found in the file
        actual: u64,
    },

    /// Header version is not the one this decoder understands
    #[error("Unsupported trace format version {version} (supported: {supported})")]
    UnsupportedVersion {
        /// Version found in the file
        version: u64,
        /// Version this build reads
        supported: u64,
    },
}

impl FormatError {
    /// Create a truncation error for `record`
    pub fn truncated(record: &'static str, expected: usize, actual: usize) -> Self {
        FormatError::Truncated {
            record,
            expected,
            actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FormatError::truncated("branch", 24, 10);
        let msg = err.to_string();
        assert!(msg.contains("branch"));
        assert!(msg.contains("24"));
        assert!(msg.contains("10"));

        let err = FormatError::InvalidMagic {
            expected: 0x2121_5058_4550_4243,
            actual: 0,
        };
        assert!(err.to_string().contains("0x2121505845504243"));

        let err = FormatError::UnsupportedVersion {
            version: 7,
            supported: 1,
        };
        assert!(err.to_string().contains('7'));
    }
}
