//! CLI command definitions using clap

use crate::config::{CliConfig, ColorChoice, Verbosity};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Waypoint: seeded UI verification runs against a local web application
#[derive(Parser, Debug)]
#[command(name = "waypoint")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, value_enum, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Log line format
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List built-in scenarios
    List(ListArgs),

    /// Run built-in scenarios by name
    Run(RunArgs),

    /// Run every built-in scenario
    RunAll(RunAllArgs),

    /// Run scenarios declared in YAML playbooks
    Playbook(PlaybookArgs),
}

/// Arguments for the list command
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Settings shared by every command that drives a browser
#[derive(Args, Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunOptions {
    /// Application address
    #[arg(long, env = "WAYPOINT_BASE_URL", default_value = waypoint::DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Artifact root directory
    #[arg(short, long, env = "WAYPOINT_OUTPUT_DIR", default_value = "verification")]
    pub output_dir: PathBuf,

    /// Chromium binary (auto-detected when absent)
    #[arg(long, env = "CHROMIUM_PATH")]
    pub chromium: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Disable the Chromium sandbox (containers/CI)
    #[arg(long)]
    pub no_sandbox: bool,

    /// Scenarios run at once, each in its own browser context
    #[arg(short = 'j', long, default_value = "1")]
    pub parallel: usize,

    /// Write a JSON report of every run to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Also save console logs at checkpoints
    #[arg(long)]
    pub save_console: bool,

    /// Navigation timeout in milliseconds
    #[arg(long, default_value = "30000")]
    pub navigation_timeout: u64,
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scenario names (see `waypoint list`)
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Run settings
    #[command(flatten)]
    pub options: RunOptions,
}

/// Arguments for the run-all command
#[derive(Args, Debug)]
pub struct RunAllArgs {
    /// Run settings
    #[command(flatten)]
    pub options: RunOptions,
}

/// Arguments for the playbook command
#[derive(Args, Debug)]
pub struct PlaybookArgs {
    /// Playbook YAML file(s) to run
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Validate playbooks without running them
    #[arg(long)]
    pub validate: bool,

    /// Run settings
    #[command(flatten)]
    pub options: RunOptions,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

impl Cli {
    /// Verbosity from `-q`/`-v`
    #[must_use]
    pub const fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }

    /// Configuration for a run, merging global flags with `options`
    #[must_use]
    pub fn config(&self, options: &RunOptions) -> CliConfig {
        CliConfig {
            report: options.report.clone(),
            chromium_path: options.chromium.clone(),
            headed: options.headed,
            sandbox: !options.no_sandbox,
            console_on_success: options.save_console,
            navigation_timeout_ms: options.navigation_timeout,
            ..CliConfig::new()
                .with_verbosity(self.verbosity())
                .with_color(self.color.into())
                .with_base_url(&options.base_url)
                .with_output_dir(&options.output_dir)
                .with_parallel(options.parallel)
        }
    }

    /// Configuration for commands that do not run scenarios
    #[must_use]
    pub fn base_config(&self) -> CliConfig {
        CliConfig::new()
            .with_verbosity(self.verbosity())
            .with_color(self.color.into())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod parse_tests {
        use super::*;

        #[test]
        fn test_verify_cli() {
            use clap::CommandFactory;
            Cli::command().debug_assert();
        }

        #[test]
        fn test_parse_run() {
            let cli = Cli::try_parse_from([
                "waypoint",
                "run",
                "admin-console",
                "student-dashboard",
                "--base-url",
                "http://localhost:5173",
                "-j",
                "2",
                "--no-sandbox",
            ])
            .unwrap();
            let Commands::Run(args) = &cli.command else {
                panic!("expected run");
            };
            assert_eq!(args.names, vec!["admin-console", "student-dashboard"]);
            let config = cli.config(&args.options);
            assert_eq!(config.base_url, "http://localhost:5173");
            assert_eq!(config.parallel, 2);
            assert!(!config.sandbox);
        }

        #[test]
        fn test_run_requires_name() {
            assert!(Cli::try_parse_from(["waypoint", "run"]).is_err());
        }

        #[test]
        fn test_global_flags() {
            let cli = Cli::try_parse_from(["waypoint", "list", "-vv", "--color", "never"]).unwrap();
            assert_eq!(cli.verbosity(), Verbosity::Debug);
            assert_eq!(cli.base_config().color, ColorChoice::Never);
        }

        #[test]
        fn test_parse_playbook() {
            let cli = Cli::try_parse_from([
                "waypoint",
                "playbook",
                "a.yaml",
                "b.yaml",
                "--validate",
                "--report",
                "out.json",
            ])
            .unwrap();
            let Commands::Playbook(args) = &cli.command else {
                panic!("expected playbook");
            };
            assert_eq!(args.files.len(), 2);
            assert!(args.validate);
            assert_eq!(
                cli.config(&args.options).report,
                Some(PathBuf::from("out.json"))
            );
        }
    }
}
