//! Waypoint CLI library
//!
//! Argument parsing, configuration and reporting for the `waypoint`
//! binary. Scenario execution itself lives in the `waypoint` crate.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
mod output;
mod runner;

pub use commands::{
    Cli, ColorArg, Commands, ListArgs, LogFormat, PlaybookArgs, RunAllArgs, RunArgs, RunOptions,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{ProgressReporter, RunReport};
pub use runner::{conclude, execute, run_scenarios};
