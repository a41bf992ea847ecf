//! Loaded-image registry
//!
//! Images are registered at load time but their bytes are only captured
//! when the session finishes. For each image the backing file is preferred;
//! when it cannot be read (anonymous or synthetic mappings, deleted files)
//! the mapped range is snapshotted from live memory instead.

use crate::error::{CaptureError, CaptureResult};
use crate::memory::MemorySource;
use crate::writer::SectionWriter;
use brtrace_core::ImageRecord;
use std::io::Write;
use tracing::{debug, warn};

/// Chunk size for live memory snapshots
const SNAPSHOT_CHUNK: usize = 64 * 1024;

/// Where an image's captured bytes came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Contents of the file at the reported path
    File,
    /// Live read of the mapped range
    Memory,
}

/// Images reported during a session, in registration order
#[derive(Debug)]
pub struct ImageRegistry {
    images: Vec<ImageRecord>,
    capacity: usize,
}

impl ImageRegistry {
    /// Create an empty registry holding at most `capacity` images
    pub fn new(capacity: usize) -> Self {
        ImageRegistry {
            images: Vec::new(),
            capacity,
        }
    }

    /// Register a loaded image
    ///
    /// The full path is kept for capture; only the stored record name is
    /// truncated.
    pub fn report_load(&mut self, start: u64, len: u64, filename: &str) -> CaptureResult<()> {
        if self.images.len() >= self.capacity {
            return Err(CaptureError::ImageCapacityExceeded {
                capacity: self.capacity,
            });
        }
        let record = ImageRecord::pending(start, len, filename);
        if record.filename_truncated() {
            warn!(
                filename,
                stored = record.stored_filename(),
                "Image filename truncated in trace record"
            );
        }
        debug!(start, len, filename, "Registered image");
        self.images.push(record);
        Ok(())
    }

    /// Number of registered images
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Registered images, data fields still pending
    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    /// Append every image's bytes to `sink` and fill in their data ranges
    ///
    /// Consumes the registry; returns the finalized records in
    /// registration order.
    pub fn capture_all<W: Write>(
        self,
        sink: &mut SectionWriter<W>,
        memory: &mut dyn MemorySource,
    ) -> CaptureResult<Vec<ImageRecord>> {
        let mut records = self.images;
        for record in &mut records {
            record.data_offset = sink.position();
            let source = capture_one(record, sink, memory)?;
            record.data_size = sink.position() - record.data_offset;
            debug!(
                filename = %record.filename,
                data_offset = record.data_offset,
                data_size = record.data_size,
                ?source,
                "Captured image"
            );
        }
        Ok(records)
    }
}

fn capture_one<W: Write>(
    record: &ImageRecord,
    sink: &mut SectionWriter<W>,
    memory: &mut dyn MemorySource,
) -> CaptureResult<ImageSource> {
    // Whole-file read so a failure leaves nothing half-written
    match std::fs::read(&record.filename) {
        Ok(contents) => {
            sink.write_all(&contents)?;
            Ok(ImageSource::File)
        }
        Err(e) => {
            debug!(
                filename = %record.filename,
                error = %e,
                "Backing file unreadable, snapshotting memory"
            );
            snapshot(record.start, record.len, sink, memory)?;
            Ok(ImageSource::Memory)
        }
    }
}

fn snapshot<W: Write>(
    start: u64,
    len: u64,
    sink: &mut SectionWriter<W>,
    memory: &mut dyn MemorySource,
) -> CaptureResult<()> {
    let mut chunk = vec![0u8; SNAPSHOT_CHUNK];
    let mut done = 0u64;
    while done < len {
        let n = (len - done).min(SNAPSHOT_CHUNK as u64) as usize;
        memory.read_at(start + done, &mut chunk[..n])?;
        sink.write_all(&chunk[..n])?;
        done += n as u64;
    }
    Ok(())
}
