//! Command-line interface for cve-finder
//!
//! This module parses arguments, loads configuration, wires logging, progress
//! reporting and signal handling around a [`Finder`](crate::finder::Finder) run,
//! and writes the results.
//!
//! # Commands
//!
//! - **find**: search repositories, extract CVE identifiers, and write
//!   `results.txt`, one file per identifier, and an optional JSON report
//! - **init**: generate a default configuration file
//!
//! A failed run still writes whatever it collected before failing and then exits
//! with status 1. An interrupted run (Ctrl-C or SIGTERM) writes its partial results
//! and exits normally.

mod find;
mod host;
mod init;
mod progress_reporter;
mod run;

pub use find::{ColorMode, FindArgs, LogLevel, SearchScope, process_find};
pub use host::Host;
pub use init::{InitArgs, init_config};
pub use progress_reporter::ProgressReporter;
pub use run::run;
