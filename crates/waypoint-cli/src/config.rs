//! CLI configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use waypoint::{BrowserConfig, RunnerConfig, DEFAULT_BASE_URL};

/// CLI verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Quiet - minimal output
    Quiet,
    /// Normal - default output
    #[default]
    Normal,
    /// Verbose - extra output
    Verbose,
    /// Debug - maximum output
    Debug,
}

impl Verbosity {
    /// From `-q` and the `-v` count
    #[must_use]
    pub const fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Verbose,
            _ => Self::Debug,
        }
    }

    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Check if verbose or higher
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose | Self::Debug)
    }

    /// Default `tracing` filter when `RUST_LOG` is unset
    #[must_use]
    pub const fn log_filter(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "info",
            Self::Verbose => "debug",
            Self::Debug => "trace",
        }
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorChoice {
    /// Always use colors
    Always,
    /// Use colors when output is a terminal
    #[default]
    Auto,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Should use colors based on output detection
    #[must_use]
    pub fn should_color(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => console::Term::stderr().features().colors_supported(),
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct CliConfig {
    /// Verbosity level
    pub verbosity: Verbosity,
    /// Color output choice
    pub color: ColorChoice,
    /// Application address used by every scenario without its own
    pub base_url: String,
    /// Artifact root directory
    pub output_dir: PathBuf,
    /// Scenarios run at once
    pub parallel: usize,
    /// JSON report destination
    pub report: Option<PathBuf>,
    /// Chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
    /// Show the browser window
    pub headed: bool,
    /// Chromium sandbox
    pub sandbox: bool,
    /// Save console logs at checkpoints as well as on failure
    pub console_on_success: bool,
    /// Navigation timeout in milliseconds
    pub navigation_timeout_ms: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Normal,
            color: ColorChoice::Auto,
            base_url: DEFAULT_BASE_URL.to_string(),
            output_dir: PathBuf::from("verification"),
            parallel: 1,
            report: None,
            chromium_path: None,
            headed: false,
            sandbox: true,
            console_on_success: false,
            navigation_timeout_ms: waypoint::browser::DEFAULT_NAVIGATION_TIMEOUT_MS,
        }
    }
}

impl CliConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set color choice
    #[must_use]
    pub const fn with_color(mut self, color: ColorChoice) -> Self {
        self.color = color;
        self
    }

    /// Set base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set output directory
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set parallelism; zero is treated as one
    #[must_use]
    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel.max(1);
        self
    }

    /// Set JSON report path
    #[must_use]
    pub fn with_report(mut self, report: Option<PathBuf>) -> Self {
        self.report = report;
        self
    }

    /// Browser launch settings
    #[must_use]
    pub fn browser_config(&self) -> BrowserConfig {
        let mut config = BrowserConfig::default()
            .with_headless(!self.headed)
            .with_navigation_timeout(Duration::from_millis(self.navigation_timeout_ms));
        if !self.sandbox {
            config = config.with_no_sandbox();
        }
        if let Some(ref path) = self.chromium_path {
            config = config.with_chromium_path(path);
        }
        config
    }

    /// Runner settings
    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig::new(&self.output_dir).with_console_on_success(self.console_on_success)
    }
}
