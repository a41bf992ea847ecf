//! Trace info → human/json string formatting.
//!
//! - **Human** (default): summary line, loaded images, per-type counts, the
//!   executed instruction count and the ranked branch table (`cli_table`)
//! - **JSON** (`--json`): the same content via `serde_json::to_string_pretty`

use brtrace_analysis::{BranchStats, InstructionCount, Report, TraceFile};
use brtrace_core::BranchType;
use cli_table::{Cell, Table};
use serde::Serialize;
use std::fmt::Write;

/// Output formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Everything one run of the analyzer computed over a trace.
#[derive(Clone, Copy)]
pub struct TraceInfo<'a> {
    pub trace: &'a TraceFile,
    pub report: &'a Report,
    pub instructions: InstructionCount,
}

/// Format the full info output, limited to `top` ranked branches.
pub fn format_trace(info: &TraceInfo<'_>, top: usize, mode: OutputMode) -> anyhow::Result<String> {
    match mode {
        OutputMode::Human => format_human(info, top),
        OutputMode::Json => {
            let mut out = serde_json::to_string_pretty(&JsonInfo::new(info, top))?;
            out.push('\n');
            Ok(out)
        }
    }
}

fn format_human(info: &TraceInfo<'_>, top: usize) -> anyhow::Result<String> {
    let TraceInfo {
        trace,
        report,
        instructions,
    } = *info;
    let mut out = String::new();

    let density = match trace.bits_per_entry() {
        Some(bits) => format!("{:.2} bit/entry", bits),
        None => "no entries".to_string(),
    };
    writeln!(
        out,
        "Got {} branches, {}({:.2e}, {}) entries and {} images",
        trace.num_branches(),
        trace.num_entries(),
        trace.num_entries() as f64,
        density,
        trace.num_images()
    )?;

    writeln!(out, "Loaded images:")?;
    for image in trace.images().iter() {
        writeln!(
            out,
            "Image {} loaded to 0x{:x} ({} bytes captured)",
            image.filename, image.start, image.data_size
        )?;
    }

    writeln!(out, "Branch counts:")?;
    let static_counts = trace.static_type_counts();
    for branch_type in BranchType::ALL {
        writeln!(
            out,
            "- {}: {}",
            branch_type.label(),
            static_counts[branch_type.index()]
        )?;
    }

    writeln!(out, "Executions by type:")?;
    for totals in &report.per_type {
        writeln!(
            out,
            "- {}: {} ({} taken)",
            totals.branch_type.label(),
            totals.executions,
            totals.taken
        )?;
    }

    write!(out, "Executed {} instructions", instructions.executed)?;
    if instructions.unresolved > 0 {
        write!(
            out,
            " ({} stretches outside mapped code)",
            instructions.unresolved
        )?;
    }
    out.push('\n');

    let rows = report.top(top);
    writeln!(out, "Top {} branches:", rows.len())?;
    writeln!(out, "{}", branch_table(trace, rows).display()?)?;
    Ok(out)
}

fn branch_table(trace: &TraceFile, rows: &[BranchStats]) -> cli_table::TableStruct {
    rows.iter()
        .map(|row| {
            vec![
                format!("0x{:08x}", row.branch.inst_addr).cell(),
                format!("{:?}", row.branch.branch_type).cell(),
                row.execution_count.cell(),
                format!("{:.2}%", row.taken_percent()).cell(),
                trace.locate(row.branch.inst_addr).cell(),
            ]
        })
        .collect::<Vec<_>>()
        .table()
        .title(vec![
            "Branch PC".cell(),
            "Branch Type".cell(),
            "Execution Count".cell(),
            "Taken Rate".cell(),
            "Image & Offset".cell(),
        ])
}

#[derive(Serialize)]
struct JsonInfo<'a> {
    num_branches: u64,
    num_entries: u64,
    num_images: u64,
    file_size: u64,
    bits_per_entry: Option<f64>,
    images: Vec<JsonImage<'a>>,
    static_type_counts: Vec<JsonTypeCount>,
    per_type: &'a [brtrace_analysis::TypeTotals],
    instructions: InstructionCount,
    top: Vec<JsonRow<'a>>,
}

#[derive(Serialize)]
struct JsonImage<'a> {
    filename: &'a str,
    start: u64,
    len: u64,
    data_size: u64,
}

#[derive(Serialize)]
struct JsonTypeCount {
    branch_type: BranchType,
    branches: u64,
}

#[derive(Serialize)]
struct JsonRow<'a> {
    #[serde(flatten)]
    stats: &'a BranchStats,
    taken_percent: f64,
    location: String,
}

impl<'a> JsonInfo<'a> {
    fn new(info: &TraceInfo<'a>, top: usize) -> Self {
        let TraceInfo {
            trace,
            report,
            instructions,
        } = *info;
        let static_counts = trace.static_type_counts();
        JsonInfo {
            num_branches: trace.num_branches(),
            num_entries: trace.num_entries(),
            num_images: trace.num_images(),
            file_size: trace.file_size(),
            bits_per_entry: trace.bits_per_entry(),
            images: trace
                .images()
                .iter()
                .map(|image| JsonImage {
                    filename: image.filename,
                    start: image.start,
                    len: image.len,
                    data_size: image.data_size,
                })
                .collect(),
            static_type_counts: BranchType::ALL
                .iter()
                .map(|&branch_type| JsonTypeCount {
                    branch_type,
                    branches: static_counts[branch_type.index()],
                })
                .collect(),
            per_type: &report.per_type,
            instructions,
            top: report
                .top(top)
                .iter()
                .map(|stats| JsonRow {
                    stats,
                    taken_percent: stats.taken_percent(),
                    location: trace.locate(stats.branch.inst_addr),
                })
                .collect(),
        }
    }
}
