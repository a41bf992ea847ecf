//! brtrace - compact, compressed branch traces
//!
//! Captures every dynamically executed control-flow transfer of a program
//! into a self-describing trace file, and decodes those files into
//! per-branch execution statistics.
//!
//! # Quick Start
//!
//! ```no_run
//! use brtrace::{BranchType, CaptureConfig, CaptureSession, StatsEngine, TraceFile, TraceHost};
//!
//! let mut session = CaptureSession::create("run.trace", CaptureConfig::default())?;
//! session.record_branch(0x40_1000, 0x40_1040, 2, BranchType::ConditionalDirectJump, true)?;
//! session.finish()?;
//!
//! let trace = TraceFile::open("run.trace")?;
//! let report = StatsEngine::aggregate(&trace)?;
//! assert_eq!(report.total_entries, 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! - [`records`]: on-disk records and the file layout constants
//! - [`capture`]: the write side, driven by an instrumentation host
//! - [`analysis`]: the read side, validation and statistics

pub use brtrace_analysis as analysis;
pub use brtrace_capture as capture;
pub use brtrace_core as records;

pub use brtrace_analysis::{
    InstructionCount, InstructionCounter, InstructionMap, Report, StatsEngine, TraceFile,
    TraceReadError,
};
pub use brtrace_capture::{
    CaptureConfig, CaptureError, CaptureSession, MemorySource, TraceHost, TraceSummary,
};
pub use brtrace_core::{Branch, BranchType, Entry, FileHeader};
