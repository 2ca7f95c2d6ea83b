use std::path::PathBuf;

use clap::Parser;

use crate::io::format::protomatch_output;

const VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

/// Logs a nicely formatted `protomatch` heading to the `protomatch-output` logger.
pub fn log_heading() {
    let version = if let Some(ver) = VERSION {
        format!("v{ver}")
    } else {
        "v unknown".to_string()
    };
    protomatch_output!("╭─────────────────────────────────────────────────────────────────────────────────────────────────────╮");
    protomatch_output!("│                                                                                                     │");
    protomatch_output!("│   ████▄ ████▄  ▄███▄ ██████ ▄███▄ ██▄  ▄██  ▄███▄  ██████ ▄███▄ ██  ██                              │");
    protomatch_output!("│   ██  █ ██  █  ██ ██   ██   ██ ██ ██▀██▀██  ██ ██    ██   ██    ██  ██                              │");
    protomatch_output!("│   ████▀ ████▀  ██ ██   ██   ██ ██ ██ ▀▀ ██  █████    ██   ██    ██████                              │");
    protomatch_output!("│   ██    ██ ▀█  ██ ██   ██   ██ ██ ██    ██  ██ ██    ██   ██    ██  ██                              │");
    protomatch_output!("│   ██    ██  █  ▀███▀   ██   ▀███▀ ██    ██  ██ ██    ██   ▀███▀ ██  ██                              │");
    protomatch_output!("│                                                                                                     │");
    protomatch_output!("│   Crystal-prototype matching and free-parameter resolution                                          │");
    protomatch_output!("│                                                                                       {version:>13} │");
    protomatch_output!("╰─────────────────────────────────────────────────────────────────────────────────────────────────────╯");
    protomatch_output!("");
}

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// YAML input file describing the jobs to run.
    #[arg(short, long)]
    pub config: PathBuf,

    /// File to which the formatted output is written in addition to the console.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Enables debug messages from the resolution engine.
    #[arg(short, long)]
    pub debug: bool,
}
