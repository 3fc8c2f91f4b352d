//! Declarative YAML scenarios
//!
//! ```yaml
//! name: admin-console
//! injection: post_navigation
//! seed:
//!   suppress_onboarding: true
//!   user: { id: admin_123, name: Admin User, role: ADMIN }
//! overlays: [daily-challenge, daily-goal-tracker]
//! steps:
//!   - action: dismiss_overlays
//!   - action: click
//!     selector: text=Enter Master Mode
//!     force: true
//!   - action: wait
//!     selector: text=Admin Console
//!     timeout_ms: 10000
//!   - action: screenshot
//!     name: admin_console
//! ```

use crate::action::Action;
use crate::driver::{ContextOptions, Viewport};
use crate::locator::Selector;
use crate::overlay::{known_overlay, known_overlays, OverlaySignature, DEFAULT_MAX_PASSES, DEFAULT_SETTLE_MS};
use crate::result::{ErrorKind, WaypointError, WaypointResult};
use crate::scenario::{Scenario, Step};
use crate::seed::{FlagValue, InjectionMode, SeedState, SystemSettings, UserRecord};
use crate::wait::{WaitTarget, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WAIT_TIMEOUT_MS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// A scenario declared in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    /// Scenario name
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Application address; the runner's default when absent
    #[serde(default)]
    pub base_url: Option<String>,

    /// Path loaded after seeding
    #[serde(default = "default_entry")]
    pub entry: String,

    /// Viewport override
    #[serde(default)]
    pub viewport: Option<Viewport>,

    /// Phone viewport and user agent
    #[serde(default)]
    pub mobile: bool,

    /// Seed injection mode
    #[serde(default)]
    pub injection: InjectionMode,

    /// Storage payload
    #[serde(default)]
    pub seed: PlaybookSeed,

    /// Known overlay names to dismiss; all known overlays when absent
    #[serde(default)]
    pub overlays: Option<Vec<String>>,

    /// Additional overlay signatures, checked after the named ones
    #[serde(default)]
    pub custom_overlays: Vec<OverlaySignature>,

    /// Error kind this playbook is expected to end with
    #[serde(default)]
    pub expect_failure: Option<ErrorKind>,

    /// Steps to execute in order
    pub steps: Vec<PlaybookStep>,
}

fn default_entry() -> String {
    "/".to_string()
}

/// Seed section of a playbook
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaybookSeed {
    /// Current user
    #[serde(default)]
    pub user: Option<UserRecord>,
    /// Also write the user list
    #[serde(default)]
    pub register_user: bool,
    /// Raw flags keyed by storage key
    #[serde(default)]
    pub flags: BTreeMap<String, FlagValue>,
    /// System settings
    #[serde(default)]
    pub settings: Option<SystemSettings>,
    /// Write every "already seen today" marker
    #[serde(default)]
    pub suppress_onboarding: bool,
}

/// A single playbook step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlaybookStep {
    /// Run the overlay dismissal loop
    DismissOverlays {
        /// Upper bound on scan passes
        #[serde(default = "default_max_passes")]
        max_passes: u32,
        /// Delay before each scan
        #[serde(default = "default_settle_ms")]
        settle_ms: u64,
    },

    /// Wait for an element to become visible
    Wait {
        /// Element to wait for
        selector: Selector,
        /// Deadline in milliseconds
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
        /// Probe interval in milliseconds
        #[serde(default = "default_poll_ms")]
        poll_ms: u64,
    },

    /// Navigate to a URL (relative to base)
    Navigate {
        /// Absolute URL or path
        url: String,
        /// Log and continue on failure
        #[serde(default)]
        best_effort: bool,
    },

    /// Reload the page
    Reload {
        /// Log and continue on failure
        #[serde(default)]
        best_effort: bool,
    },

    /// Click an element
    Click {
        /// Element to click
        selector: Selector,
        /// Skip actionability checks
        #[serde(default)]
        force: bool,
        /// Log and continue on failure
        #[serde(default)]
        best_effort: bool,
    },

    /// Scroll an element into view
    ScrollIntoView {
        /// Element to scroll to
        selector: Selector,
        /// Log and continue on failure
        #[serde(default)]
        best_effort: bool,
    },

    /// Execute a JavaScript function expression
    Evaluate {
        /// Function expression, e.g. `(label) => ...`
        script: String,
        /// Arguments; an array is spread
        #[serde(default)]
        args: Value,
        /// Fail unless the result is truthy
        #[serde(default)]
        require_truthy: bool,
        /// Log and continue on failure
        #[serde(default)]
        best_effort: bool,
    },

    /// Try alternatives until one succeeds
    FirstOf {
        /// Actions tried in order
        alternatives: Vec<Action>,
    },

    /// Take a screenshot
    Screenshot {
        /// Checkpoint tag
        name: String,
    },
}

const fn default_max_passes() -> u32 {
    DEFAULT_MAX_PASSES
}

const fn default_settle_ms() -> u64 {
    DEFAULT_SETTLE_MS
}

const fn default_wait_timeout() -> u64 {
    DEFAULT_WAIT_TIMEOUT_MS
}

const fn default_poll_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn invalid(message: impl Into<String>) -> WaypointError {
    WaypointError::Playbook {
        message: message.into(),
    }
}

impl PlaybookStep {
    fn into_step(self, index: usize) -> WaypointResult<Step> {
        let wrap = |action: Action, best_effort: bool| {
            if best_effort {
                Step::BestEffort(action)
            } else {
                Step::Act(action)
            }
        };
        Ok(match self {
            Self::DismissOverlays {
                max_passes,
                settle_ms,
            } => Step::DismissOverlays {
                max_passes,
                settle: Duration::from_millis(settle_ms),
            },
            Self::Wait {
                selector,
                timeout_ms,
                poll_ms,
            } => {
                if poll_ms == 0 {
                    return Err(invalid(format!("step {index}: poll_ms must be positive")));
                }
                Step::WaitFor(
                    WaitTarget::new(selector)
                        .with_timeout(Duration::from_millis(timeout_ms))
                        .with_poll_interval(Duration::from_millis(poll_ms)),
                )
            }
            Self::Navigate { url, best_effort } => wrap(Action::Navigate { url }, best_effort),
            Self::Reload { best_effort } => wrap(Action::Reload, best_effort),
            Self::Click {
                selector,
                force,
                best_effort,
            } => wrap(Action::Click { selector, force }, best_effort),
            Self::ScrollIntoView {
                selector,
                best_effort,
            } => wrap(Action::ScrollIntoView { selector }, best_effort),
            Self::Evaluate {
                script,
                args,
                require_truthy,
                best_effort,
            } => wrap(
                Action::Evaluate {
                    script,
                    args,
                    require_truthy,
                },
                best_effort,
            ),
            Self::FirstOf { alternatives } => {
                if alternatives.is_empty() {
                    return Err(invalid(format!("step {index}: first_of needs alternatives")));
                }
                Step::FirstOf(alternatives)
            }
            Self::Screenshot { name } => Step::Capture { tag: name },
        })
    }
}

impl PlaybookSeed {
    fn into_seed(self, now: DateTime<Utc>) -> SeedState {
        let mut seed = if self.suppress_onboarding {
            SeedState::new().suppress_onboarding(now)
        } else {
            SeedState::new()
        };
        seed.flags.extend(self.flags);
        seed.user = self.user;
        seed.register_user = self.register_user;
        seed.settings = self.settings;
        seed
    }
}

impl Playbook {
    /// Parse a playbook from a YAML string
    pub fn from_yaml(yaml: &str) -> WaypointResult<Self> {
        serde_yaml_ng::from_str(yaml).map_err(WaypointError::from)
    }

    /// Parse a playbook from a YAML file
    pub fn from_file(path: &Path) -> WaypointResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Serialize back to YAML
    pub fn to_yaml(&self) -> WaypointResult<String> {
        serde_yaml_ng::to_string(self).map_err(WaypointError::from)
    }

    fn overlay_list(&self) -> WaypointResult<Vec<OverlaySignature>> {
        let mut overlays = match &self.overlays {
            None => known_overlays(),
            Some(names) => names
                .iter()
                .map(|name| known_overlay(name).ok_or_else(|| invalid(format!("unknown overlay '{name}'"))))
                .collect::<WaypointResult<Vec<_>>>()?,
        };
        overlays.extend(self.custom_overlays.iter().cloned());
        Ok(overlays)
    }

    /// Build the scenario, using `default_base_url` when the playbook has none
    ///
    /// # Errors
    ///
    /// [`WaypointError::Playbook`] for an empty name, an unknown overlay or
    /// an invalid step.
    pub fn into_scenario(self, default_base_url: &str, now: DateTime<Utc>) -> WaypointResult<Scenario> {
        if self.name.trim().is_empty() {
            return Err(invalid("playbook name is empty"));
        }
        let overlays = self.overlay_list()?;
        let mut context = if self.mobile {
            ContextOptions::mobile()
        } else {
            ContextOptions::default()
        };
        if let Some(viewport) = self.viewport {
            context = context.with_viewport(viewport);
        }
        let base_url = self
            .base_url
            .unwrap_or_else(|| default_base_url.to_string());
        let mut scenario = Scenario::new(self.name, base_url)
            .describe(self.description)
            .entry(self.entry)
            .context(context)
            .seed(self.seed.into_seed(now), self.injection)
            .overlays(overlays);
        for (i, step) in self.steps.into_iter().enumerate() {
            scenario = scenario.step(step.into_step(i + 1)?);
        }
        if let Some(kind) = self.expect_failure {
            scenario = scenario.expect_failure(kind);
        }
        Ok(scenario)
    }
}
