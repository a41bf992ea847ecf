//! Streaming entry decoder
//!
//! Decompresses the entry span chunk by chunk and yields entries in
//! program order. Validation happens in-line: every index is checked
//! against the branch table, and reaching the end of the stream checks
//! for a partial trailing entry and for agreement with the header count.
//! The first error ends the iteration.

use crate::error::{TraceReadError, TraceResult};
use brtrace_core::{Entry, ENTRY_SIZE};
use std::io::{self, Read};
use zstd::stream::read::Decoder;

/// Decompressed bytes held between reads
const CHUNK_SIZE: usize = 256 * 1024;

/// Iterator over the decoded entries of one trace
pub struct EntryIter<'a> {
    // None for an empty span
    decoder: Option<Decoder<'static, &'a [u8]>>,
    buf: Vec<u8>,
    start: usize,
    end: usize,
    num_branches: u64,
    expected: u64,
    decoded: u64,
    done: bool,
}

impl<'a> EntryIter<'a> {
    pub(crate) fn new(span: &'a [u8], num_branches: u64, expected: u64) -> TraceResult<Self> {
        let decoder = if span.is_empty() {
            None
        } else {
            Some(
                Decoder::with_buffer(span)
                    .map_err(|e| TraceReadError::decompression(e.to_string()))?,
            )
        };
        Ok(EntryIter {
            decoder,
            buf: vec![0u8; CHUNK_SIZE],
            start: 0,
            end: 0,
            num_branches,
            expected,
            decoded: 0,
            done: false,
        })
    }

    /// Entries yielded so far
    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    fn next_entry(&mut self) -> TraceResult<Option<Entry>> {
        if self.end - self.start < ENTRY_SIZE && !self.refill()? {
            let trailing_bytes = self.end - self.start;
            if trailing_bytes > 0 {
                return Err(TraceReadError::TruncatedEntry { trailing_bytes });
            }
            if self.decoded != self.expected {
                return Err(TraceReadError::EntryCountMismatch {
                    expected: self.expected,
                    actual: self.decoded,
                });
            }
            return Ok(None);
        }

        let s = self.start;
        let entry = Entry::from_bytes([
            self.buf[s],
            self.buf[s + 1],
            self.buf[s + 2],
            self.buf[s + 3],
        ]);
        self.start += ENTRY_SIZE;

        let index = entry.branch_index();
        if u64::from(index) >= self.num_branches {
            return Err(TraceReadError::BranchIndexOutOfRange {
                position: self.decoded,
                index,
                num_branches: self.num_branches,
            });
        }
        self.decoded += 1;
        Ok(Some(entry))
    }

    /// Read until a whole entry is buffered; `false` at end of stream
    fn refill(&mut self) -> TraceResult<bool> {
        self.buf.copy_within(self.start..self.end, 0);
        self.end -= self.start;
        self.start = 0;

        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(false);
        };
        while self.end < ENTRY_SIZE {
            match decoder.read(&mut self.buf[self.end..]) {
                Ok(0) => return Ok(false),
                Ok(n) => self.end += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TraceReadError::decompression(e.to_string())),
            }
        }
        Ok(true)
    }
}

impl Iterator for EntryIter<'_> {
    type Item = TraceResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl std::fmt::Debug for EntryIter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryIter")
            .field("decoded", &self.decoded)
            .field("expected", &self.expected)
            .field("done", &self.done)
            .finish()
    }
}
