//! Read side of the branch trace pipeline
//!
//! `TraceFile::open` maps a trace and validates its structure. Branches and
//! images are then read in place; entries are decompressed on demand and
//! checked as they stream. `StatsEngine` reduces the entry stream into a
//! ranked `Report`, and `InstructionCounter` turns the captured images
//! plus the taken branches into an executed-instruction count.
//!
//! ```no_run
//! use brtrace_analysis::{StatsEngine, TraceFile};
//!
//! let trace = TraceFile::open("out.trace")?;
//! let report = StatsEngine::aggregate(&trace)?;
//! for row in report.top(10) {
//!     println!("0x{:08x} {:>10}", row.branch.inst_addr, row.execution_count);
//! }
//! # Ok::<(), brtrace_analysis::TraceReadError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entries;
pub mod error;
pub mod instructions;
pub mod reader;
pub mod stats;

pub use entries::EntryIter;
pub use error::{TraceReadError, TraceResult};
pub use instructions::{InstructionCount, InstructionCounter, InstructionMap};
pub use reader::{BranchView, ImageView, TraceFile};
pub use stats::{BranchCounters, BranchStats, Report, StatsEngine, TypeTotals};
