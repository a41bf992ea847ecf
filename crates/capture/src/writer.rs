//! Trace file layout assembly
//!
//! Sections are written strictly in file order:
//!
//! ```text
//! [header placeholder][entries][branches][image bytes...][images]
//! ```
//!
//! The header is written as zeros first and backpatched once every other
//! section's offset and size is known. Offsets are absolute positions
//! tracked by `SectionWriter`, so the file is never queried for its size.

use crate::error::{CaptureError, CaptureResult};
use crate::image_registry::ImageRegistry;
use crate::memory::MemorySource;
use brtrace_core::{Branch, FileHeader, ImageRecord, HEADER_SIZE};
use std::io::{self, Seek, SeekFrom, Write};
use tracing::debug;

/// `Write` adapter that tracks the absolute output position
#[derive(Debug)]
pub struct SectionWriter<W: Write> {
    inner: W,
    position: u64,
}

impl<W: Write> SectionWriter<W> {
    /// Wrap `inner`, which is assumed to be positioned at `position`
    pub fn new(inner: W, position: u64) -> Self {
        SectionWriter { inner, position }
    }

    /// Bytes written so far, plus the starting position
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Access the wrapped writer
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Unwrap
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for SectionWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Entries,
    Branches,
    Images,
    Header,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Entries => "entries",
            Phase::Branches => "branches",
            Phase::Images => "images",
            Phase::Header => "header",
        }
    }
}

/// Writes one trace file section by section
#[derive(Debug)]
pub struct TraceFileWriter<W: Write + Seek> {
    out: SectionWriter<W>,
    header: FileHeader,
    phase: Phase,
}

impl<W: Write + Seek> TraceFileWriter<W> {
    /// Start a trace at the beginning of `inner`
    ///
    /// Writes the zeroed header placeholder; the entries section starts
    /// right after it.
    pub fn new(mut inner: W) -> CaptureResult<Self> {
        inner.seek(SeekFrom::Start(0))?;
        inner.write_all(&[0u8; HEADER_SIZE])?;

        let mut header = FileHeader::new();
        header.entries_offset = HEADER_SIZE as u64;
        Ok(TraceFileWriter {
            out: SectionWriter::new(inner, HEADER_SIZE as u64),
            header,
            phase: Phase::Entries,
        })
    }

    /// Sink for the compressed entry stream
    pub fn sink(&mut self) -> &mut SectionWriter<W> {
        &mut self.out
    }

    /// Close the entries section
    pub fn end_entries(&mut self, num_entries: u64) -> CaptureResult<()> {
        self.expect(Phase::Entries)?;
        self.header.num_entries = num_entries;
        self.header.entries_size = self.out.position() - self.header.entries_offset;
        self.phase = Phase::Branches;
        Ok(())
    }

    /// Write the branch table in index order
    pub fn write_branches(&mut self, branches: &[Branch]) -> CaptureResult<()> {
        self.expect(Phase::Branches)?;
        self.header.branches_offset = self.out.position();
        self.header.num_branches = branches.len() as u64;
        for branch in branches {
            self.out.write_all(&branch.to_bytes())?;
        }
        self.phase = Phase::Images;
        Ok(())
    }

    /// Capture every image's bytes, then write the image records
    pub fn write_images(
        &mut self,
        registry: ImageRegistry,
        memory: &mut dyn MemorySource,
    ) -> CaptureResult<Vec<ImageRecord>> {
        self.expect(Phase::Images)?;
        let records = registry.capture_all(&mut self.out, memory)?;

        self.header.images_offset = self.out.position();
        self.header.num_images = records.len() as u64;
        for record in &records {
            self.out.write_all(&record.to_bytes())?;
        }
        self.phase = Phase::Header;
        Ok(records)
    }

    /// Backpatch the header and hand back the writer
    pub fn finish(self) -> CaptureResult<(W, FileHeader)> {
        self.expect(Phase::Header)?;
        let file_size = self.out.position();
        let header = self.header;

        let mut inner = self.out.into_inner();
        inner.flush()?;
        inner.seek(SeekFrom::Start(0))?;
        inner.write_all(&header.to_bytes())?;
        inner.seek(SeekFrom::Start(file_size))?;
        inner.flush()?;

        debug!(
            num_entries = header.num_entries,
            entries_size = header.entries_size,
            num_branches = header.num_branches,
            num_images = header.num_images,
            file_size,
            "Backpatched trace header"
        );
        Ok((inner, header))
    }

    /// Header as known so far
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    fn expect(&self, phase: Phase) -> CaptureResult<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(CaptureError::LayoutOrder {
                expected: phase.name(),
                actual: self.phase.name(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brtrace_core::{BranchType, BRANCH_RECORD_SIZE, IMAGE_RECORD_SIZE};
    use std::io::Cursor;

    struct NoMemory;

    impl MemorySource for NoMemory {
        fn read_at(&mut self, _addr: u64, _buf: &mut [u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "no memory"))
        }
    }

    #[test]
    fn test_section_writer_tracks_position() {
        let mut w = SectionWriter::new(Vec::new(), 100);
        w.write_all(b"hello").unwrap();
        w.write_all(b"!").unwrap();
        assert_eq!(w.position(), 106);
        assert_eq!(w.into_inner(), b"hello!");
    }

    #[test]
    fn test_layout_offsets() {
        let mut w = TraceFileWriter::new(Cursor::new(Vec::new())).unwrap();
        w.sink().write_all(&[0xAA; 10]).unwrap();
        w.end_entries(3).unwrap();

        let branches = [
            Branch::new(0x1000, 0x2000, 2, BranchType::DirectJump),
            Branch::new(0x1010, 0x3000, 5, BranchType::DirectCall),
        ];
        w.write_branches(&branches).unwrap();
        let records = w.write_images(ImageRegistry::new(4), &mut NoMemory).unwrap();
        assert!(records.is_empty());

        let (cursor, header) = w.finish().unwrap();
        let bytes = cursor.into_inner();

        assert_eq!(header.entries_offset, HEADER_SIZE as u64);
        assert_eq!(header.entries_size, 10);
        assert_eq!(header.num_entries, 3);
        assert_eq!(header.branches_offset, HEADER_SIZE as u64 + 10);
        assert_eq!(header.num_branches, 2);
        assert_eq!(
            header.images_offset,
            header.branches_offset + 2 * BRANCH_RECORD_SIZE as u64
        );
        assert_eq!(bytes.len() as u64, header.images_offset);

        let parsed = FileHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
        parsed.validate().unwrap();
        assert_eq!(
            Branch::from_bytes(&bytes[header.branches_offset as usize..]).unwrap(),
            branches[0]
        );
    }

    #[test]
    fn test_image_bytes_precede_records() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("libfoo.so");
        std::fs::write(&path, b"ELF-ish contents").unwrap();

        let mut registry = ImageRegistry::new(4);
        registry
            .report_load(0x7000, 0x1000, path.to_str().unwrap())
            .unwrap();

        let mut w = TraceFileWriter::new(Cursor::new(Vec::new())).unwrap();
        w.end_entries(0).unwrap();
        w.write_branches(&[]).unwrap();
        let records = w.write_images(registry, &mut NoMemory).unwrap();
        let (cursor, header) = w.finish().unwrap();
        let bytes = cursor.into_inner();

        let rec = &records[0];
        assert_eq!(rec.data_offset, header.branches_offset);
        assert_eq!(rec.data_size, 16);
        assert_eq!(header.images_offset, rec.data_offset + rec.data_size);
        assert_eq!(
            bytes.len(),
            header.images_offset as usize + IMAGE_RECORD_SIZE
        );
        let start = rec.data_offset as usize;
        assert_eq!(&bytes[start..start + 16], b"ELF-ish contents");
    }

    #[test]
    fn test_out_of_order_calls_rejected() {
        let mut w = TraceFileWriter::new(Cursor::new(Vec::new())).unwrap();
        let err = w.write_branches(&[]).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::LayoutOrder {
                expected: "branches",
                actual: "entries"
            }
        ));

        w.end_entries(0).unwrap();
        assert!(w.end_entries(0).is_err());
    }

    #[test]
    fn test_finish_requires_all_sections() {
        let mut w = TraceFileWriter::new(Cursor::new(Vec::new())).unwrap();
        w.end_entries(0).unwrap();
        assert!(matches!(
            w.finish().unwrap_err(),
            CaptureError::LayoutOrder { .. }
        ));
    }
}
