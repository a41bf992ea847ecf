//! Capture session
//!
//! Owns one branch table, entry buffer, compressor and image registry, and
//! drives them from the two host callbacks. Sessions are single-threaded:
//! one per traced thread, nothing shared, no locks on the record path.
//!
//! Any error poisons the session. Later calls fail with `SessionAborted`
//! and a file-backed session removes its temporary file when dropped, so
//! an aborted capture never leaves a trace behind.

use crate::branch_table::BranchTable;
use crate::compressor::StreamCompressor;
use crate::config::CaptureConfig;
use crate::entry_buffer::EntryBuffer;
use crate::error::{CaptureError, CaptureResult};
use crate::image_registry::ImageRegistry;
use crate::memory::{MemorySource, ProcessMemory};
use crate::writer::TraceFileWriter;
use brtrace_core::{Branch, BranchType, Entry, FileHeader, IMAGE_RECORD_SIZE};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Callbacks an instrumentation host invokes on the capture core
pub trait TraceHost {
    /// Record one dynamic execution of a branch
    ///
    /// Returns the branch's dense index.
    fn record_branch(
        &mut self,
        inst_addr: u64,
        targ_addr: u64,
        inst_length: u32,
        branch_type: BranchType,
        taken: bool,
    ) -> CaptureResult<u32>;

    /// Report a newly loaded executable image
    fn report_image_load(&mut self, start: u64, len: u64, path: &str) -> CaptureResult<()>;
}

/// Totals of a finished trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TraceSummary {
    /// Entries recorded
    pub num_entries: u64,
    /// Distinct branches
    pub num_branches: u64,
    /// Images captured
    pub num_images: u64,
    /// Compressed entry stream length in bytes
    pub entries_size: u64,
    /// Total file length in bytes
    pub file_size: u64,
}

impl TraceSummary {
    fn from_header(header: &FileHeader) -> Self {
        TraceSummary {
            num_entries: header.num_entries,
            num_branches: header.num_branches,
            num_images: header.num_images,
            entries_size: header.entries_size,
            file_size: header.images_offset + header.num_images * IMAGE_RECORD_SIZE as u64,
        }
    }
}

/// Temp file that becomes the trace on commit and is removed otherwise
#[derive(Debug)]
struct PendingFile {
    temp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl PendingFile {
    fn commit(&mut self) -> io::Result<()> {
        fs::rename(&self.temp, &self.target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp);
        }
    }
}

/// One capture, start to finish
pub struct CaptureSession<W: Write + Seek = BufWriter<File>> {
    writer: TraceFileWriter<W>,
    branches: BranchTable,
    entries: EntryBuffer,
    compressor: StreamCompressor,
    images: ImageRegistry,
    memory: Box<dyn MemorySource>,
    config: CaptureConfig,
    aborted: bool,
    pending: Option<PendingFile>,
}

impl CaptureSession<BufWriter<File>> {
    /// Start a session writing to `path`
    ///
    /// Output goes to `<path>.tmp` and is renamed into place by `finish`.
    pub fn create(path: impl AsRef<Path>, config: CaptureConfig) -> CaptureResult<Self> {
        let target = path.as_ref().to_path_buf();
        let temp = temp_path(&target)?;

        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(&temp)?;
        let pending = PendingFile {
            temp,
            target,
            committed: false,
        };
        let mut session = Self::new(BufWriter::new(file), config)?;
        session.pending = Some(pending);
        Ok(session)
    }

    /// Finalize, sync and move the trace into place
    pub fn finish(self) -> CaptureResult<TraceSummary> {
        let (out, summary, pending) = self.finalize()?;
        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);
        if let Some(mut pending) = pending {
            pending.commit()?;
            info!(path = %pending.target.display(), "Trace committed");
        }
        Ok(summary)
    }
}

impl<W: Write + Seek> CaptureSession<W> {
    /// Start a session over an arbitrary seekable sink
    pub fn new(out: W, config: CaptureConfig) -> CaptureResult<Self> {
        config.validate()?;
        let writer = TraceFileWriter::new(out)?;
        let compressor = StreamCompressor::new(config.compression_level)?;

        info!(
            branch_capacity = config.branch_capacity,
            image_capacity = config.image_capacity,
            buffer_entries = config.buffer_entries,
            compression_level = config.compression_level,
            "Capture session started"
        );
        Ok(CaptureSession {
            writer,
            branches: BranchTable::new(config.branch_capacity),
            entries: EntryBuffer::new(config.buffer_entries),
            compressor,
            images: ImageRegistry::new(config.image_capacity),
            memory: Box::new(ProcessMemory::new()),
            config,
            aborted: false,
            pending: None,
        })
    }

    /// Replace the live-memory source used for file-less images
    pub fn with_memory_source(mut self, memory: impl MemorySource + 'static) -> Self {
        self.memory = Box::new(memory);
        self
    }

    /// Record another execution of an already-indexed branch
    ///
    /// Skips the table lookup for hosts that cache indices.
    pub fn record_with_index(&mut self, index: u32, taken: bool) -> CaptureResult<()> {
        self.check_alive()?;
        let result = self.push_indexed(index, taken);
        self.guard(result)
    }

    /// Finalize and return the sink with the trace's totals
    ///
    /// A file-backed session is also renamed into place.
    pub fn finish_into_inner(self) -> CaptureResult<(W, TraceSummary)> {
        let (out, summary, pending) = self.finalize()?;
        if let Some(mut pending) = pending {
            pending.commit()?;
        }
        Ok((out, summary))
    }

    /// Branch at `index`
    pub fn branch(&self, index: u32) -> Option<&Branch> {
        self.branches.get(index)
    }

    /// Distinct branches so far
    pub fn num_branches(&self) -> usize {
        self.branches.len()
    }

    /// Entries recorded so far
    pub fn num_entries(&self) -> u64 {
        self.entries.total_entries()
    }

    /// Images registered so far
    pub fn num_images(&self) -> usize {
        self.images.len()
    }

    /// Whether an earlier error aborted the session
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Session configuration
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    fn push_indexed(&mut self, index: u32, taken: bool) -> CaptureResult<()> {
        if index as usize >= self.branches.len() {
            return Err(CaptureError::UnknownBranchIndex {
                index,
                len: self.branches.len(),
            });
        }
        let entry = Entry::new(index, taken)?;
        self.entries
            .push(entry, &mut self.compressor, self.writer.sink())
    }

    fn check_alive(&self) -> CaptureResult<()> {
        if self.aborted {
            Err(CaptureError::SessionAborted)
        } else {
            Ok(())
        }
    }

    fn guard<T>(&mut self, result: CaptureResult<T>) -> CaptureResult<T> {
        if let Err(e) = &result {
            self.aborted = true;
            error!(error = %e, "Capture session aborted");
        }
        result
    }

    fn finalize(self) -> CaptureResult<(W, TraceSummary, Option<PendingFile>)> {
        self.check_alive()?;
        let CaptureSession {
            mut writer,
            branches,
            mut entries,
            mut compressor,
            images,
            mut memory,
            pending,
            ..
        } = self;

        let num_entries = entries.flush_final(&mut compressor, writer.sink())?;
        writer.end_entries(num_entries)?;
        writer.write_branches(branches.as_slice())?;
        writer.write_images(images, memory.as_mut())?;
        let (out, header) = writer.finish()?;

        let summary = TraceSummary::from_header(&header);
        info!(
            num_entries = summary.num_entries,
            num_branches = summary.num_branches,
            num_images = summary.num_images,
            entries_size = summary.entries_size,
            uncompressed_size = compressor.bytes_in(),
            file_size = summary.file_size,
            "Capture session finished"
        );
        Ok((out, summary, pending))
    }
}

impl<W: Write + Seek> TraceHost for CaptureSession<W> {
    fn record_branch(
        &mut self,
        inst_addr: u64,
        targ_addr: u64,
        inst_length: u32,
        branch_type: BranchType,
        taken: bool,
    ) -> CaptureResult<u32> {
        self.check_alive()?;
        let branch = Branch::new(inst_addr, targ_addr, inst_length, branch_type);
        let result = self.branches.insert_or_get(branch).and_then(|index| {
            let entry = Entry::new(index, taken)?;
            self.entries
                .push(entry, &mut self.compressor, self.writer.sink())?;
            Ok(index)
        });
        self.guard(result)
    }

    fn report_image_load(&mut self, start: u64, len: u64, path: &str) -> CaptureResult<()> {
        self.check_alive()?;
        let result = self.images.report_load(start, len, path);
        self.guard(result)
    }
}

impl<W: Write + Seek> std::fmt::Debug for CaptureSession<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("branches", &self.branches.len())
            .field("entries", &self.entries.total_entries())
            .field("images", &self.images.len())
            .field("aborted", &self.aborted)
            .finish()
    }
}

fn temp_path(target: &Path) -> io::Result<PathBuf> {
    let name = target.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("trace path '{}' has no file name", target.display()),
        )
    })?;
    let mut temp = name.to_os_string();
    temp.push(".tmp");
    Ok(target.with_file_name(temp))
}
