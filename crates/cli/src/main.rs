//! brtrace — display info and statistics of a branch trace file.
//!
//! `brtrace <TRACE> [--top N] [--json]`
//!
//! Log verbosity follows `RUST_LOG`; logs and the progress bar go to stderr.

mod commands;
mod format;

use anyhow::{Context, Result};
use brtrace_analysis::{InstructionCounter, InstructionMap, Report, StatsEngine, TraceFile};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use commands::{build_cli, DEFAULT_TOP};
use format::{format_trace, OutputMode, TraceInfo};

/// Entries decoded between progress bar updates
const PROGRESS_STEP: u64 = 1 << 16;

const PROGRESS_TEMPLATE: &str =
    "{percent:>3}% |{wide_bar}| {human_pos}/{human_len} [{elapsed_precise}<{eta_precise}, {per_sec}]";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = build_cli().get_matches();
    let path = matches
        .get_one::<PathBuf>("trace")
        .context("missing trace path")?;
    let top = matches
        .get_one::<usize>("top")
        .copied()
        .unwrap_or(DEFAULT_TOP);
    let mode = if matches.get_flag("json") {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let trace = TraceFile::open(path)
        .with_context(|| format!("failed to open trace '{}'", path.display()))?;
    let map = InstructionMap::from_trace(&trace)
        .with_context(|| format!("failed to map image code of '{}'", path.display()))?;
    let mut counter = InstructionCounter::new(&map, trace.branches().iter());

    info!(path = %path.display(), "Iterating entries");
    let pbar = progress_bar(trace.num_entries())?;
    let mut pending = 0u64;
    let counters = StatsEngine::count_with(&trace, |entry| {
        counter.record(entry);
        pending += 1;
        if pending == PROGRESS_STEP {
            pbar.inc(pending);
            pending = 0;
        }
    })
    .with_context(|| format!("failed to decode entries of '{}'", path.display()))?;
    pbar.inc(pending);
    pbar.finish_and_clear();

    let report = Report::from_counters(trace.branches().iter(), &counters);
    let info = TraceInfo {
        trace: &trace,
        report: &report,
        instructions: counter.count(),
    };
    print!("{}", format_trace(&info, top, mode)?);
    Ok(())
}

fn progress_bar(len: u64) -> Result<ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return Ok(ProgressBar::hidden());
    }
    let pbar = ProgressBar::new(len);
    pbar.set_style(ProgressStyle::with_template(PROGRESS_TEMPLATE)?.progress_chars("██ "));
    Ok(pbar)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_template_parses() {
        assert!(ProgressStyle::with_template(PROGRESS_TEMPLATE).is_ok());
    }

    #[test]
    fn test_progress_bar_hidden_off_terminal() {
        let pbar = progress_bar(1000).unwrap();
        pbar.inc(PROGRESS_STEP);
        pbar.finish_and_clear();
        if !std::io::stderr().is_terminal() {
            assert!(pbar.is_hidden());
        }
    }
}
