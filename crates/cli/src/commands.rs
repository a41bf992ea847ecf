//! Clap command definition.

use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;

/// Default number of ranked branches.
pub const DEFAULT_TOP: usize = 10;

/// Build the CLI command.
pub fn build_cli() -> Command {
    Command::new("brtrace")
        .about("Display info and statistics of a branch trace file")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("trace")
                .help("Path to trace file")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("top")
                .long("top")
                .short('n')
                .help("Number of most-executed branches to list (default: 10)")
                .value_parser(value_parser!(usize))
                .default_value("10"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("JSON output mode")
                .action(ArgAction::SetTrue),
        )
}
