//! Fixed-size entry staging buffer
//!
//! Entries are packed as they arrive. Once the buffer is full its bytes are
//! handed to the compressor in `Continue` mode and the buffer starts over;
//! the final partial buffer goes through an `End` drain that closes the
//! zstd frame.

use crate::compressor::{DrainMode, StreamCompressor};
use crate::error::CaptureResult;
use brtrace_core::{Entry, ENTRY_SIZE};
use std::io::Write;
use tracing::debug;

/// Insertion-ordered buffer of packed entries
#[derive(Debug)]
pub struct EntryBuffer {
    bytes: Vec<u8>,
    capacity: usize,
    total: u64,
    drains: u64,
}

impl EntryBuffer {
    /// Create a buffer holding up to `capacity` entries
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        EntryBuffer {
            bytes: Vec::with_capacity(capacity * ENTRY_SIZE),
            capacity,
            total: 0,
            drains: 0,
        }
    }

    /// Append an entry, draining into `compressor` once the buffer fills
    pub fn push<W: Write + ?Sized>(
        &mut self,
        entry: Entry,
        compressor: &mut StreamCompressor,
        sink: &mut W,
    ) -> CaptureResult<()> {
        self.bytes.extend_from_slice(&entry.to_bytes());
        self.total += 1;
        if self.is_full() {
            self.drain_continue(compressor, sink)?;
        }
        Ok(())
    }

    /// Compress the buffered entries without ending the stream, then reset
    pub fn drain_continue<W: Write + ?Sized>(
        &mut self,
        compressor: &mut StreamCompressor,
        sink: &mut W,
    ) -> CaptureResult<()> {
        let written = compressor.drain_until_consumed(&self.bytes, DrainMode::Continue, sink)?;
        self.drains += 1;
        debug!(
            entries = self.len(),
            compressed_bytes = written,
            drain = self.drains,
            "Drained entry buffer"
        );
        self.bytes.clear();
        Ok(())
    }

    /// Compress what remains and terminate the stream
    ///
    /// Returns the total number of entries pushed over the buffer's life.
    pub fn flush_final<W: Write + ?Sized>(
        &mut self,
        compressor: &mut StreamCompressor,
        sink: &mut W,
    ) -> CaptureResult<u64> {
        let written = compressor.drain_until_consumed(&self.bytes, DrainMode::End, sink)?;
        debug!(
            entries = self.len(),
            compressed_bytes = written,
            total_entries = self.total,
            "Flushed final entry buffer"
        );
        self.bytes.clear();
        Ok(self.total)
    }

    /// Entries currently buffered
    pub fn len(&self) -> usize {
        self.bytes.len() / ENTRY_SIZE
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the buffer holds `capacity` entries
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Buffer capacity in entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries pushed since creation
    pub fn total_entries(&self) -> u64 {
        self.total
    }

    /// Completed `Continue` drains
    pub fn drains(&self) -> u64 {
        self.drains
    }
}
