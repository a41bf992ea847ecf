//! Trace decoding errors
//!
//! Every variant is fatal: the reader never repairs or skips malformed
//! data.

use brtrace_core::FormatError;
use std::io;
use thiserror::Error;

/// Errors raised while opening or decoding a trace file
#[derive(Debug, Error)]
pub enum TraceReadError {
    /// File cannot even hold a header
    #[error("Trace file too small: {size} bytes, header needs {minimum}")]
    FileTooSmall {
        /// Actual file size
        size: u64,
        /// Header size
        minimum: u64,
    },

    /// Magic constant mismatch
    #[error("Not a branch trace: magic {actual:#018x}, expected {expected:#018x}")]
    InvalidMagic {
        /// Expected magic
        expected: u64,
        /// Magic found in the file
        actual: u64,
    },

    /// Format version this reader does not understand
    #[error("Unsupported trace format version {version} (supported: {supported})")]
    UnsupportedVersion {
        /// Version found in the file
        version: u64,
        /// Version this reader decodes
        supported: u64,
    },

    /// A header section extends past the end of the file
    #[error(
        "Section '{section}' at offset {offset} with length {len} exceeds file size {file_size}"
    )]
    SectionOutOfBounds {
        /// Section name
        section: &'static str,
        /// Declared offset
        offset: u64,
        /// Declared length in bytes, saturated on overflow
        len: u64,
        /// File size
        file_size: u64,
    },

    /// An image's captured bytes lie outside the file
    #[error("Image {index} data at offset {offset} with size {size} exceeds file size {file_size}")]
    ImageDataOutOfBounds {
        /// Image position in the image table
        index: usize,
        /// Declared data offset
        offset: u64,
        /// Declared data size
        size: u64,
        /// File size
        file_size: u64,
    },

    /// A record failed to decode
    #[error("Malformed record: {0}")]
    Format(#[from] FormatError),

    /// The entry stream is not valid zstd
    #[error("Entry stream decompression failed: {0}")]
    Decompression(String),

    /// The entry stream ends inside an entry
    #[error("Entry stream ends with {trailing_bytes} stray bytes")]
    TruncatedEntry {
        /// Bytes left after the last whole entry
        trailing_bytes: usize,
    },

    /// An entry references a branch the table does not have
    #[error("Entry {position} references branch {index}, table holds {num_branches}")]
    BranchIndexOutOfRange {
        /// Position of the entry in the stream
        position: u64,
        /// Referenced index
        index: u32,
        /// Branch table length
        num_branches: u64,
    },

    /// Decoded entry count disagrees with the header
    #[error("Header declares {expected} entries, stream holds {actual}")]
    EntryCountMismatch {
        /// Count from the header
        expected: u64,
        /// Entries decoded
        actual: u64,
    },

    /// The disassembler could not be set up or failed on a code section
    #[error("Disassembly failed: {0}")]
    Disassembly(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl TraceReadError {
    /// Create a decompression error
    pub fn decompression(msg: impl Into<String>) -> Self {
        Self::Decompression(msg.into())
    }

    /// Create a disassembly error
    pub fn disassembly(msg: impl Into<String>) -> Self {
        Self::Disassembly(msg.into())
    }

    /// Lift header validation failures into their dedicated variants
    pub(crate) fn from_header(err: FormatError) -> Self {
        match err {
            FormatError::InvalidMagic { expected, actual } => {
                Self::InvalidMagic { expected, actual }
            }
            FormatError::UnsupportedVersion { version, supported } => {
                Self::UnsupportedVersion { version, supported }
            }
            other => Self::Format(other),
        }
    }
}

/// Result type for trace reading
pub type TraceResult<T> = Result<T, TraceReadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_errors_lifted() {
        let err = TraceReadError::from_header(FormatError::InvalidMagic {
            expected: 1,
            actual: 2,
        });
        assert!(matches!(
            err,
            TraceReadError::InvalidMagic {
                expected: 1,
                actual: 2
            }
        ));

        let err = TraceReadError::from_header(FormatError::UnsupportedVersion {
            version: 9,
            supported: 1,
        });
        assert!(err.to_string().contains('9'));

        let err = TraceReadError::from_header(FormatError::InvalidBranchType(7));
        assert!(matches!(err, TraceReadError::Format(_)));
    }

    #[test]
    fn test_display() {
        let err = TraceReadError::SectionOutOfBounds {
            section: "branches",
            offset: 100,
            len: 48,
            file_size: 120,
        };
        let msg = err.to_string();
        assert!(msg.contains("branches"));
        assert!(msg.contains("120"));

        let err = TraceReadError::BranchIndexOutOfRange {
            position: 4,
            index: 17,
            num_branches: 3,
        };
        assert!(err.to_string().contains("17"));
    }
}
