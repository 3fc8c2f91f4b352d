//! Scenario execution and result reporting for the CLI

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::{ProgressReporter, RunReport};
use futures::stream::{self, StreamExt};
use std::time::Instant;
use tracing::{info, warn};
use waypoint::{Browser, ContextFactory, RunResult, Scenario, ScenarioRunner};

/// Run `scenarios` through `runner`, reporting each result as it completes.
/// Results come back in input order.
pub async fn run_scenarios<F: ContextFactory>(
    runner: &ScenarioRunner<F>,
    scenarios: &[Scenario],
    parallel: usize,
    reporter: &mut ProgressReporter,
) -> Vec<RunResult> {
    reporter.start_progress(scenarios.len() as u64, "scenarios");
    let mut results = Vec::with_capacity(scenarios.len());
    let mut runs = stream::iter(scenarios.iter().map(|s| runner.run(s))).buffered(parallel.max(1));
    while let Some(result) = runs.next().await {
        reporter.result(&result);
        reporter.increment(1);
        results.push(result);
    }
    reporter.finish();
    results
}

/// Print the summary, write the report and turn failures into an error
pub fn conclude(config: &CliConfig, reporter: &ProgressReporter, results: Vec<RunResult>, started: Instant) -> CliResult<()> {
    let report = RunReport::new(&config.base_url, results);
    reporter.summary(report.passed, report.failed, started.elapsed());
    if let Some(ref path) = config.report {
        report.write(path)?;
        reporter.info(&format!("report written to {}", path.display()));
    }
    if report.failed > 0 {
        return Err(CliError::RunsFailed {
            failed: report.failed,
            total: report.results.len(),
        });
    }
    Ok(())
}

/// Launch Chromium, run `scenarios` and shut the browser down
pub async fn execute(config: &CliConfig, scenarios: Vec<Scenario>) -> CliResult<()> {
    let started = Instant::now();
    let mut reporter = ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
    reporter.header(&format!("Verifying {} against {}", plural(scenarios.len()), config.base_url));

    let browser = Browser::launch(config.browser_config()).await?;
    let runner = ScenarioRunner::new(browser, config.runner_config());
    let results = run_scenarios(&runner, &scenarios, config.parallel, &mut reporter).await;
    if let Err(e) = runner.into_factory().shutdown().await {
        warn!(error = %e, "browser shutdown failed");
    }
    info!(runs = results.len(), "verification finished");

    conclude(config, &reporter, results, started)
}

fn plural(n: usize) -> String {
    if n == 1 {
        "1 scenario".to_string()
    } else {
        format!("{n} scenarios")
    }
}
