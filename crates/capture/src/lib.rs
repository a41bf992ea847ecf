//! Write side of the branch trace pipeline
//!
//! A `CaptureSession` receives branch executions and image loads from an
//! instrumentation host through the `TraceHost` callbacks:
//!
//! - each branch identity gets a dense index from the `BranchTable`
//! - each execution becomes a 4-byte entry in the `EntryBuffer`
//! - full buffers drain through the `StreamCompressor` straight to disk
//!
//! `finish` closes the compressed stream, appends the branch table and the
//! captured image bytes, and backpatches the header.
//!
//! ```no_run
//! use brtrace_capture::{CaptureConfig, CaptureSession, TraceHost};
//! use brtrace_core::BranchType;
//!
//! let mut session = CaptureSession::create("out.trace", CaptureConfig::default())?;
//! session.report_image_load(0x40_0000, 0x2000, "/usr/bin/app")?;
//! session.record_branch(0x40_1000, 0x40_1040, 2, BranchType::ConditionalDirectJump, true)?;
//! let summary = session.finish()?;
//! println!("{} entries", summary.num_entries);
//! # Ok::<(), brtrace_capture::CaptureError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod branch_table;
pub mod compressor;
pub mod config;
pub mod entry_buffer;
pub mod error;
pub mod image_registry;
pub mod memory;
pub mod session;
pub mod writer;

pub use branch_table::BranchTable;
pub use compressor::{DrainMode, StreamCompressor};
pub use config::{CaptureConfig, ConfigError};
pub use entry_buffer::EntryBuffer;
pub use error::{CaptureError, CaptureResult};
pub use image_registry::{ImageRegistry, ImageSource};
pub use memory::{MemorySource, ProcessMemory};
pub use session::{CaptureSession, TraceHost, TraceSummary};
pub use writer::{SectionWriter, TraceFileWriter};
