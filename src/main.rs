//! Binary entry point for snapward.
//!
//! Loads the YAML configuration, runs the audit over every configured
//! repository and prints the monitoring-plugin style report. The process
//! exit code follows the worst repository severity: 0 OK, 1 WARNING,
//! 2 CRITICAL, 3 for configuration errors.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr/print_stdout in main binary for report output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context as _;
use clap::Parser;
use snapward::config::Config;
use snapward::{logging, runner};
use std::path::PathBuf;
use std::process::ExitCode;

/// Exit code for configuration errors, outside the OK/WARNING/CRITICAL range.
const EXIT_CONFIG_ERROR: u8 = 3;

/// Snapward - backup repository audit, retention and compliance checks.
#[derive(Parser)]
#[command(name = "snapward")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short = 'c', long = "conf", value_name = "FILE")]
    conf: PathBuf,

    /// Log at debug level to stderr, ignoring the configured log file.
    #[arg(short, long)]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load_from_file(&cli.conf)
        .with_context(|| format!("error in configuration file '{}'", cli.conf.display()))
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    if let Err(e) = logging::init(&config.logging, cli.debug).context("cannot initialize logging")
    {
        eprintln!("{e:#}");
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }

    let report = runner::run(&config);
    println!("{} | {}", report.text(), report.perfdata_line());
    ExitCode::from(report.severity().exit_code())
}
