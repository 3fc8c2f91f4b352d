//! Output formatting and progress reporting

use crate::error::{CliError, CliResult};
use chrono::{DateTime, Utc};
use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use waypoint::{Outcome, RunResult};

/// Progress reporter for scenario runs
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stdout(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar over `total` scenarios
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet || total < 2 {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Increment progress
    pub fn increment(&self, delta: u64) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(delta);
        }
    }

    /// Finish progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    fn line(&self, text: &str) {
        match self.progress_bar {
            Some(ref pb) => pb.suspend(|| {
                let _ = self.term.write_line(text);
            }),
            None => {
                let _ = self.term.write_line(text);
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "PASS".to_string()
        };

        self.line(&format!("{prefix} {message}"));
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Always print failures, even in quiet mode
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };

        self.line(&format!("{prefix} {message}"));
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("ℹ").blue().bold().to_string()
        } else {
            "INFO".to_string()
        };

        self.line(&format!("{prefix} {message}"));
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }

        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };

        self.line("");
        self.line(&styled);
    }

    /// Print one scenario outcome, including the failing step and evidence
    pub fn result(&self, result: &RunResult) {
        let elapsed = format!("{}ms", result.duration_ms);
        match (&result.outcome, result.passed()) {
            (Outcome::Passed, true) => {
                self.success(&format!("{} ({elapsed})", result.scenario));
            }
            (Outcome::Failed(failure), true) => {
                self.success(&format!(
                    "{} failed as expected with {} ({elapsed})",
                    result.scenario, failure.kind
                ));
            }
            (Outcome::Passed, false) => {
                let expected = result
                    .expected_failure
                    .map_or_else(String::new, |k| k.to_string());
                self.failure(&format!(
                    "{} passed but was expected to fail with {expected}",
                    result.scenario
                ));
            }
            (Outcome::Failed(failure), false) => {
                self.failure(&format!("{}: {failure}", result.scenario));
                if let Some(path) = result.failure_screenshot() {
                    self.failure(&format!("  screenshot: {}", path.display()));
                }
            }
        }
        if !self.quiet {
            for artifact in result.artifacts.iter().filter(|a| !a.failure) {
                self.line(&format!("    {}", artifact.path.display()));
            }
        }
    }

    /// Print run summary
    pub fn summary(&self, passed: usize, failed: usize, duration: Duration) {
        if self.quiet && failed == 0 {
            return;
        }

        self.line("");

        let total = passed + failed;
        let duration_secs = duration.as_secs_f64();

        if self.use_color {
            let passed_style = Style::new().green().bold();
            let failed_style = Style::new().red().bold();

            let status = if failed > 0 {
                failed_style.apply_to("FAILED")
            } else {
                passed_style.apply_to("PASSED")
            };

            self.line(&format!(
                "{} {} scenario(s) in {:.2}s ({} passed, {} failed)",
                status,
                total,
                duration_secs,
                passed_style.apply_to(passed),
                if failed > 0 {
                    failed_style.apply_to(failed).to_string()
                } else {
                    failed.to_string()
                },
            ));
        } else {
            let status = if failed > 0 { "FAILED" } else { "PASSED" };
            self.line(&format!(
                "{status} {total} scenario(s) in {duration_secs:.2}s ({passed} passed, {failed} failed)"
            ));
        }
    }
}

/// JSON report of one CLI invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Report creation time
    pub generated_at: DateTime<Utc>,
    /// Default application address
    pub base_url: String,
    /// Runs that ended as expected
    pub passed: usize,
    /// Runs that did not
    pub failed: usize,
    /// Every run, in request order
    pub results: Vec<RunResult>,
}

impl RunReport {
    /// Build a report over `results`
    #[must_use]
    pub fn new(base_url: impl Into<String>, results: Vec<RunResult>) -> Self {
        let passed = results.iter().filter(|r| r.passed()).count();
        Self {
            generated_at: Utc::now(),
            base_url: base_url.into(),
            passed,
            failed: results.len() - passed,
            results,
        }
    }

    /// Write as pretty JSON, creating parent directories
    pub fn write(&self, path: &Path) -> CliResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CliError::report_generation(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
