//! Waypoint CLI: seeded UI verification runs
//!
//! ## Usage
//!
//! ```bash
//! waypoint list                               # Built-in scenarios
//! waypoint run admin-console                  # One scenario
//! waypoint run-all -j 3 --report out.json     # Everything, three at a time
//! waypoint playbook flows/*.yaml              # Scenarios from YAML
//! ```

use chrono::Utc;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use waypoint::{Catalog, Playbook};
use waypoint_cli::{
    execute, Cli, CliConfig, CliError, CliResult, Commands, ListArgs, LogFormat, PlaybookArgs,
    ProgressReporter, RunArgs, RunOptions, Verbosity,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbosity(), cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbosity: Verbosity, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));
    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };
    if let Err(e) = result {
        eprintln!("warning: logging not initialised: {e}");
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::List(ref args) => {
            run_list(args);
            Ok(())
        }
        Commands::Run(ref args) => run_named(&cli, args).await,
        Commands::RunAll(ref args) => {
            let config = checked_config(&cli, &args.options)?;
            let scenarios = Catalog::new(&config.base_url).scenarios();
            execute(&config, scenarios).await
        }
        Commands::Playbook(ref args) => run_playbooks(&cli, args).await,
    }
}

fn checked_config(cli: &Cli, options: &RunOptions) -> CliResult<CliConfig> {
    let config = cli.config(options);
    if config.base_url.trim().is_empty() {
        return Err(CliError::config("base URL must not be empty"));
    }
    Ok(config)
}

fn run_list(args: &ListArgs) {
    let scenarios = Catalog::default().scenarios();
    if args.json {
        let listing: Vec<_> = scenarios
            .iter()
            .map(|s| {
                serde_json::json!({
                    "name": s.name,
                    "description": s.description,
                    "expected_failure": s.expected_failure,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&listing).unwrap_or_else(|_| "[]".to_string())
        );
        return;
    }
    let width = scenarios.iter().map(|s| s.name.len()).max().unwrap_or(0);
    for scenario in &scenarios {
        println!("{:width$}  {}", scenario.name, scenario.description);
    }
}

async fn run_named(cli: &Cli, args: &RunArgs) -> CliResult<()> {
    let config = checked_config(cli, &args.options)?;
    let catalog = Catalog::new(&config.base_url);
    let scenarios = args
        .names
        .iter()
        .map(|name| {
            catalog.get(name).ok_or_else(|| {
                CliError::invalid_argument(format!("unknown scenario '{name}' (see `waypoint list`)"))
            })
        })
        .collect::<CliResult<Vec<_>>>()?;
    execute(&config, scenarios).await
}

async fn run_playbooks(cli: &Cli, args: &PlaybookArgs) -> CliResult<()> {
    let config = checked_config(cli, &args.options)?;
    let now = Utc::now();
    let mut scenarios = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let playbook = Playbook::from_file(path)?;
        scenarios.push(playbook.into_scenario(&config.base_url, now)?);
    }

    if args.validate {
        let reporter = ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
        for (path, scenario) in args.files.iter().zip(&scenarios) {
            reporter.success(&format!(
                "{}: {} ({} steps) OK",
                path.display(),
                scenario.name,
                scenario.steps.len()
            ));
        }
        return Ok(());
    }

    execute(&config, scenarios).await
}
