//! Core types for branch traces
//!
//! This crate defines the records shared by the capture and analysis sides
//! and the exact byte layout each one has inside a trace file:
//! - BranchType / Branch: static branch identity (24-byte record)
//! - Entry: one dynamic branch execution (packed u32)
//! - ImageRecord / ImageRef: loaded executable image metadata (288-byte record)
//! - FileHeader: fixed 72-byte header at offset 0
//! - FormatError: record-level decode failures
//!
//! Every record is packed and unpacked by explicit little-endian routines so
//! that the format never depends on compiler struct layout.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod branch;
pub mod entry;
pub mod error;
pub mod header;
pub mod image;

pub use branch::{Branch, BranchType, BRANCH_RECORD_SIZE};
pub use entry::{Entry, ENTRY_SIZE, MAX_BRANCHES};
pub use error::{FormatError, FormatResult};
pub use header::{FileHeader, HEADER_SIZE, TRACE_FORMAT_VERSION, TRACE_MAGIC};
pub use image::{ImageRecord, ImageRef, FILENAME_CAPACITY, IMAGE_RECORD_SIZE};

/// Read a little-endian `u64` at `at`. Callers guarantee the bounds.
pub(crate) fn le_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

/// Read a little-endian `u32` at `at`. Callers guarantee the bounds.
pub(crate) fn le_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}
