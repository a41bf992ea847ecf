//! Capture error types
//!
//! Every capture-side failure is fatal to its session: a trace is either
//! exact or it does not exist.

use crate::config::ConfigError;
use brtrace_core::FormatError;
use std::io;
use thiserror::Error;

/// Errors that can occur while capturing a trace
#[derive(Debug, Error)]
pub enum CaptureError {
    /// More distinct branches than the table can hold
    #[error("Branch table capacity exceeded ({capacity} branches)")]
    BranchCapacityExceeded {
        /// Configured capacity
        capacity: u64,
    },

    /// More loaded images than the registry can hold
    #[error("Image table capacity exceeded ({capacity} images)")]
    ImageCapacityExceeded {
        /// Configured capacity
        capacity: usize,
    },

    /// A caller-supplied branch index is not in the table
    #[error("Branch index {index} out of range (table holds {len})")]
    UnknownBranchIndex {
        /// Requested index
        index: u32,
        /// Current table length
        len: usize,
    },

    /// Streaming compressor reported an error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Record encoding failed
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Invalid configuration
    #[error("Invalid capture config: {0}")]
    Config(#[from] ConfigError),

    /// File layout phase called out of order
    #[error("Layout phase out of order: expected {expected}, at {actual}")]
    LayoutOrder {
        /// Phase the call requires
        expected: &'static str,
        /// Phase the writer is in
        actual: &'static str,
    },

    /// An earlier failure already aborted this session
    #[error("Capture session aborted by an earlier error")]
    SessionAborted,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl CaptureError {
    /// Create a compression error
    pub fn compression(msg: impl Into<String>) -> Self {
        Self::Compression(msg.into())
    }
}

/// Result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CaptureError::BranchCapacityExceeded { capacity: 1024 };
        assert!(err.to_string().contains("1024"));

        let err = CaptureError::UnknownBranchIndex { index: 9, len: 3 };
        let msg = err.to_string();
        assert!(msg.contains('9'));
        assert!(msg.contains('3'));

        let err = CaptureError::LayoutOrder {
            expected: "entries",
            actual: "finished",
        };
        assert!(err.to_string().contains("finished"));
    }

    #[test]
    fn test_conversions() {
        let err: CaptureError = io::Error::new(io::ErrorKind::Other, "disk full").into();
        assert!(matches!(err, CaptureError::Io(_)));

        let err: CaptureError = ConfigError::ZeroBufferEntries.into();
        assert!(matches!(err, CaptureError::Config(_)));

        let err: CaptureError = FormatError::InvalidFilename.into();
        assert!(matches!(err, CaptureError::Format(_)));

        assert!(matches!(
            CaptureError::compression("zstd failed"),
            CaptureError::Compression(_)
        ));
    }
}
