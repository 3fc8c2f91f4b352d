//! Scenarios and the runner that executes them.
//!
//! A [`Scenario`] is a seed, an entry URL, an overlay checklist and an ordered
//! list of [`Step`]s. [`ScenarioRunner`] opens one isolated context per run,
//! loads the seeded application, executes the steps strictly in order and
//! always tears the context down. The first failing step ends the run with a
//! failure screenshot (and console log when any was recorded).
//!
//! ## Run state machine
//!
//! ```text
//! Init -> Seeded -> Loaded -> {Dismissing <-> Waiting, Acting, Capturing}* -> Done
//!   any non-terminal state -> CapturingFailure -> Failed
//! ```

use crate::action::{resolve_url, Action, InteractionDriver};
use crate::artifact::{Artifact, ArtifactCapturer, ArtifactKind};
use crate::driver::{ContextFactory, ContextOptions, PageDriver};
use crate::overlay::{known_overlays, OverlayDismisser, OverlaySignature, DEFAULT_MAX_PASSES, DEFAULT_SETTLE_MS};
use crate::result::{ErrorKind, WaypointError, WaypointResult};
use crate::seed::{InjectionMode, SeedState, StateSeeder};
use crate::wait::{ConditionWaiter, WaitTarget};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

// =============================================================================
// STEPS
// =============================================================================

/// One step of a scenario
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Run the overlay dismissal loop over the scenario's overlay list
    DismissOverlays {
        /// Pass limit
        max_passes: u32,
        /// Settle delay before each pass
        settle: Duration,
    },
    /// Wait for a milestone
    WaitFor(WaitTarget),
    /// Required interaction; any failure ends the run
    Act(Action),
    /// Optional interaction; an action error is logged and ignored
    BestEffort(Action),
    /// Alternatives tried in order until one succeeds
    FirstOf(Vec<Action>),
    /// Checkpoint screenshot
    Capture {
        /// File tag
        tag: String,
    },
}

impl Step {
    /// Dismissal with default limits
    #[must_use]
    pub const fn dismiss_overlays() -> Self {
        Self::DismissOverlays {
            max_passes: DEFAULT_MAX_PASSES,
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
        }
    }

    const fn state(&self) -> RunState {
        match self {
            Self::DismissOverlays { .. } => RunState::Dismissing,
            Self::WaitFor(_) => RunState::Waiting,
            Self::Act(_) | Self::BestEffort(_) | Self::FirstOf(_) => RunState::Acting,
            Self::Capture { .. } => RunState::Capturing,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DismissOverlays { max_passes, .. } => {
                write!(f, "dismiss overlays (max {max_passes} passes)")
            }
            Self::WaitFor(target) => {
                write!(f, "wait for {} ({}ms)", target.selector, target.timeout_ms())
            }
            Self::Act(action) => write!(f, "{action}"),
            Self::BestEffort(action) => write!(f, "best-effort {action}"),
            Self::FirstOf(actions) => {
                let labels: Vec<String> = actions.iter().map(ToString::to_string).collect();
                write!(f, "first of [{}]", labels.join(" | "))
            }
            Self::Capture { tag } => write!(f, "capture {tag}"),
        }
    }
}

// =============================================================================
// RUN STATE
// =============================================================================

/// State of one scenario run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Context open, nothing written
    Init,
    /// Seed written
    Seeded,
    /// Application loaded with the seed in place
    Loaded,
    /// Dismissing overlays
    Dismissing,
    /// Waiting for a milestone
    Waiting,
    /// Performing an interaction
    Acting,
    /// Writing a checkpoint screenshot
    Capturing,
    /// Writing failure artifacts
    CapturingFailure,
    /// All steps succeeded
    Done,
    /// A step failed
    Failed,
}

impl RunState {
    /// Whether no further transition is allowed
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    const fn is_working(self) -> bool {
        matches!(
            self,
            Self::Loaded | Self::Dismissing | Self::Waiting | Self::Acting | Self::Capturing
        )
    }

    /// Whether `self -> next` is a legal transition
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Done | Self::Failed, _) => false,
            (Self::CapturingFailure, Self::Failed) => true,
            (Self::CapturingFailure, _) => false,
            (_, Self::CapturingFailure) => true,
            (Self::Init, Self::Seeded) | (Self::Seeded, Self::Loaded) => true,
            (from, Self::Dismissing | Self::Waiting | Self::Acting | Self::Capturing | Self::Done) => {
                from.is_working()
            }
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::Seeded => "SEEDED",
            Self::Loaded => "LOADED",
            Self::Dismissing => "DISMISSING",
            Self::Waiting => "WAITING",
            Self::Acting => "ACTING",
            Self::Capturing => "CAPTURING",
            Self::CapturingFailure => "CAPTURING(failure)",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Records the states a run passes through and rejects illegal transitions
#[derive(Debug, Clone)]
pub struct RunTracker {
    states: Vec<RunState>,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self {
            states: vec![RunState::Init],
        }
    }
}

impl RunTracker {
    /// Tracker in [`RunState::Init`]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    #[must_use]
    pub fn current(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Init)
    }

    /// Move to `next`
    ///
    /// # Errors
    ///
    /// [`WaypointError::InvalidState`] for an illegal transition.
    pub fn advance(&mut self, next: RunState) -> WaypointResult<()> {
        let current = self.current();
        if !current.can_transition_to(next) {
            return Err(WaypointError::InvalidState {
                message: format!("{current} -> {next}"),
            });
        }
        debug!(from = %current, to = %next, "run state");
        self.states.push(next);
        Ok(())
    }

    /// Every state entered, in order
    #[must_use]
    pub fn into_states(self) -> Vec<RunState> {
        self.states
    }
}

// =============================================================================
// SCENARIO
// =============================================================================

/// A seeded verification flow
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Identifier, also the artifact directory name
    pub name: String,
    /// One-line description
    pub description: String,
    /// Target application address
    pub base_url: String,
    /// Viewport and user agent of the run's context
    pub context: ContextOptions,
    /// Path or URL loaded after seeding
    pub entry: String,
    /// Storage payload
    pub seed: SeedState,
    /// How the seed is injected
    pub injection: InjectionMode,
    /// Overlay checklist, highest priority first
    pub overlays: Vec<OverlaySignature>,
    /// Steps after the seeded load
    pub steps: Vec<Step>,
    /// Error kind this scenario is expected to end with (negative controls)
    pub expected_failure: Option<ErrorKind>,
}

impl Scenario {
    /// Scenario loading `/` on `base_url` with an empty seed and the known overlays
    #[must_use]
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            base_url: base_url.into(),
            context: ContextOptions::default(),
            entry: "/".to_string(),
            seed: SeedState::default(),
            injection: InjectionMode::default(),
            overlays: known_overlays(),
            steps: Vec::new(),
            expected_failure: None,
        }
    }

    /// Set description
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set context emulation
    #[must_use]
    pub fn context(mut self, context: ContextOptions) -> Self {
        self.context = context;
        self
    }

    /// Set entry path
    #[must_use]
    pub fn entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    /// Set seed and injection mode
    #[must_use]
    pub fn seed(mut self, seed: SeedState, injection: InjectionMode) -> Self {
        self.seed = seed;
        self.injection = injection;
        self
    }

    /// Replace the overlay checklist
    #[must_use]
    pub fn overlays(mut self, overlays: Vec<OverlaySignature>) -> Self {
        self.overlays = overlays;
        self
    }

    /// Append a step
    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Append a default overlay dismissal
    #[must_use]
    pub fn dismiss_overlays(self) -> Self {
        self.step(Step::dismiss_overlays())
    }

    /// Append a milestone wait
    #[must_use]
    pub fn wait_for(self, selector: impl Into<crate::Selector>, timeout: Duration) -> Self {
        self.step(Step::WaitFor(WaitTarget::new(selector).with_timeout(timeout)))
    }

    /// Append a required action
    #[must_use]
    pub fn act(self, action: Action) -> Self {
        self.step(Step::Act(action))
    }

    /// Append a best-effort action
    #[must_use]
    pub fn best_effort(self, action: Action) -> Self {
        self.step(Step::BestEffort(action))
    }

    /// Append alternatives
    #[must_use]
    pub fn first_of(self, actions: Vec<Action>) -> Self {
        self.step(Step::FirstOf(actions))
    }

    /// Append a checkpoint screenshot
    #[must_use]
    pub fn capture(self, tag: impl Into<String>) -> Self {
        self.step(Step::Capture { tag: tag.into() })
    }

    /// Mark as a negative control expected to fail with `kind`
    #[must_use]
    pub const fn expect_failure(mut self, kind: ErrorKind) -> Self {
        self.expected_failure = Some(kind);
        self
    }

    /// Point the scenario at another application address
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// URL loaded after seeding
    #[must_use]
    pub fn entry_url(&self) -> String {
        resolve_url(Some(&self.base_url), &self.entry)
    }
}

// =============================================================================
// RUN RESULT
// =============================================================================

/// The step a run failed at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Step index (0 is the seeded load)
    pub step: usize,
    /// Step description
    pub label: String,
    /// Error classification
    pub kind: ErrorKind,
    /// Error message
    pub message: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step {} ({}) failed: {}: {}",
            self.step, self.label, self.kind, self.message
        )
    }
}

/// Outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Every step succeeded
    Passed,
    /// A step failed
    Failed(Failure),
}

/// Report of one scenario execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Scenario name
    pub scenario: String,
    /// Outcome
    pub outcome: Outcome,
    /// Expected failure kind, for negative controls
    pub expected_failure: Option<ErrorKind>,
    /// Files written
    pub artifacts: Vec<Artifact>,
    /// States entered, in order
    pub states: Vec<RunState>,
    /// Overlays dismissed across the run
    pub dismissed: Vec<String>,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Wall time in milliseconds
    pub duration_ms: u64,
}

impl RunResult {
    /// Whether the outcome matches expectations
    #[must_use]
    pub fn passed(&self) -> bool {
        match (&self.outcome, self.expected_failure) {
            (Outcome::Passed, None) => true,
            (Outcome::Failed(failure), Some(kind)) => failure.kind == kind,
            _ => false,
        }
    }

    /// Failure details, if the run failed
    #[must_use]
    pub const fn failure(&self) -> Option<&Failure> {
        match &self.outcome {
            Outcome::Failed(failure) => Some(failure),
            Outcome::Passed => None,
        }
    }

    /// Path of the failure screenshot, if one was written
    #[must_use]
    pub fn failure_screenshot(&self) -> Option<&Path> {
        self.artifacts
            .iter()
            .find(|a| a.failure && a.kind == ArtifactKind::Screenshot)
            .map(|a| a.path.as_path())
    }

    /// Final state
    #[must_use]
    pub fn final_state(&self) -> Option<RunState> {
        self.states.last().copied()
    }
}

// =============================================================================
// RUNNER
// =============================================================================

/// Runner settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Root directory for artifacts
    pub output_dir: PathBuf,
    /// Write console logs next to failure screenshots
    pub console_on_failure: bool,
    /// Write console logs next to checkpoint screenshots
    pub console_on_success: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("verification"),
            console_on_failure: true,
            console_on_success: false,
        }
    }
}

impl RunnerConfig {
    /// Config writing under `output_dir`
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Also save console logs at checkpoints
    #[must_use]
    pub const fn with_console_on_success(mut self, enabled: bool) -> Self {
        self.console_on_success = enabled;
        self
    }
}

/// Mutable bookkeeping for one run on one page
struct Execution<'a, P: ?Sized> {
    page: &'a P,
    scenario: &'a Scenario,
    config: &'a RunnerConfig,
    driver: InteractionDriver,
    tracker: RunTracker,
    capturer: ArtifactCapturer,
    dismissed: Vec<String>,
}

impl<P: PageDriver + ?Sized> Execution<'_, P> {
    async fn load(&mut self) -> WaypointResult<()> {
        let url = self.scenario.entry_url();
        let seeder = StateSeeder::new();
        match self.scenario.injection {
            InjectionMode::PreNavigation => {
                seeder
                    .seed(self.page, &self.scenario.seed, InjectionMode::PreNavigation)
                    .await?;
                self.tracker.advance(RunState::Seeded)?;
                self.page.goto(&url).await?;
            }
            InjectionMode::PostNavigation => {
                self.page.goto(&url).await?;
                seeder
                    .seed(self.page, &self.scenario.seed, InjectionMode::PostNavigation)
                    .await?;
                self.tracker.advance(RunState::Seeded)?;
                self.page.reload().await?;
            }
        }
        self.tracker.advance(RunState::Loaded)
    }

    async fn step(&mut self, index: usize, step: &Step) -> WaypointResult<()> {
        self.tracker.advance(step.state())?;
        match step {
            Step::DismissOverlays { max_passes, settle } => {
                let report = OverlayDismisser::new(&self.scenario.overlays)
                    .dismiss(self.page, *max_passes, *settle)
                    .await?;
                self.dismissed.extend(report.dismissed);
            }
            Step::WaitFor(target) => {
                ConditionWaiter::new()
                    .wait_for_visible(self.page, target)
                    .await?;
            }
            Step::Act(action) => {
                self.driver.act(self.page, action).await?;
            }
            Step::BestEffort(action) => match self.driver.act(self.page, action).await {
                Ok(_) => {}
                Err(e) if e.is_action() => warn!(%action, error = %e, "best-effort action skipped"),
                Err(e) => return Err(e),
            },
            Step::FirstOf(actions) => {
                let mut last = None;
                for action in actions {
                    match self.driver.act(self.page, action).await {
                        Ok(_) => return Ok(()),
                        Err(e) if e.is_action() => {
                            debug!(%action, error = %e, "alternative failed");
                            last = Some(e);
                        }
                        Err(e) => return Err(e),
                    }
                }
                let message = last.map_or_else(|| "no alternatives given".to_string(), |e| e.to_string());
                return Err(WaypointError::action(step.to_string(), message));
            }
            Step::Capture { tag } => {
                self.capturer.capture(self.page, index, tag, false).await?;
                if self.config.console_on_success {
                    self.capturer
                        .capture_console(self.page, index, tag, false)
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn run(&mut self) -> Result<(), Failure> {
        let scenario = self.scenario;
        let load_label = format!("load {}", scenario.entry_url());
        info!(scenario = %scenario.name, step = 0, "{load_label}");
        if let Err(e) = self.load().await {
            return Err(self.fail(0, load_label, &e).await);
        }
        for (i, step) in scenario.steps.iter().enumerate() {
            let index = i + 1;
            info!(scenario = %scenario.name, step = index, "{step}");
            if let Err(e) = self.step(index, step).await {
                return Err(self.fail(index, step.to_string(), &e).await);
            }
        }
        if let Err(e) = self.tracker.advance(RunState::Done) {
            let index = scenario.steps.len() + 1;
            return Err(self.fail(index, "finish".to_string(), &e).await);
        }
        Ok(())
    }

    async fn fail(&mut self, index: usize, label: String, err: &WaypointError) -> Failure {
        let failure = Failure {
            step: index,
            label,
            kind: err.kind(),
            message: err.to_string(),
        };
        error!(scenario = %self.scenario.name, "{failure}");
        if let Err(e) = self.tracker.advance(RunState::CapturingFailure) {
            warn!(error = %e, "failure capture out of sequence");
        }
        if let Err(e) = self.capturer.capture(self.page, index, "failure", true).await {
            warn!(error = %e, "failure screenshot not captured");
        }
        if self.config.console_on_failure {
            if let Err(e) = self
                .capturer
                .capture_console(self.page, index, "failure", true)
                .await
            {
                warn!(error = %e, "failure console log not captured");
            }
        }
        if let Err(e) = self.tracker.advance(RunState::Failed) {
            warn!(error = %e, "failed state out of sequence");
        }
        failure
    }
}

/// Executes scenarios in isolated contexts from a [`ContextFactory`]
#[derive(Debug)]
pub struct ScenarioRunner<F> {
    factory: F,
    config: RunnerConfig,
}

impl<F: ContextFactory> ScenarioRunner<F> {
    /// Runner over `factory`
    #[must_use]
    pub const fn new(factory: F, config: RunnerConfig) -> Self {
        Self { factory, config }
    }

    /// Context factory
    #[must_use]
    pub const fn factory(&self) -> &F {
        &self.factory
    }

    /// Runner settings
    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Give back the factory, for shutdown
    #[must_use]
    pub fn into_factory(self) -> F {
        self.factory
    }

    /// Run `scenario` in a fresh context, releasing it whatever the outcome
    pub async fn run(&self, scenario: &Scenario) -> RunResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let page = match self.factory.open(&scenario.context).await {
            Ok(page) => page,
            Err(e) => {
                error!(scenario = %scenario.name, error = %e, "context not created");
                return RunResult {
                    scenario: scenario.name.clone(),
                    outcome: Outcome::Failed(Failure {
                        step: 0,
                        label: "open context".to_string(),
                        kind: e.kind(),
                        message: e.to_string(),
                    }),
                    expected_failure: scenario.expected_failure,
                    artifacts: Vec::new(),
                    states: vec![RunState::Init, RunState::Failed],
                    dismissed: Vec::new(),
                    started_at,
                    duration_ms: elapsed_ms(clock),
                };
            }
        };
        let mut result = self.run_on_page(&page, scenario).await;
        if let Err(e) = self.factory.close(page).await {
            warn!(scenario = %scenario.name, error = %e, "context teardown failed");
        }
        result.started_at = started_at;
        result.duration_ms = elapsed_ms(clock);
        result
    }

    /// Run `scenario` on an already open page; the caller owns teardown
    pub async fn run_on_page<P: PageDriver + ?Sized>(&self, page: &P, scenario: &Scenario) -> RunResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut execution = Execution {
            page,
            scenario,
            config: &self.config,
            driver: InteractionDriver::new(scenario.base_url.clone()),
            tracker: RunTracker::new(),
            capturer: ArtifactCapturer::new(&self.config.output_dir, &scenario.name),
            dismissed: Vec::new(),
        };
        let outcome = match execution.run().await {
            Ok(()) => Outcome::Passed,
            Err(failure) => Outcome::Failed(failure),
        };
        let result = RunResult {
            scenario: scenario.name.clone(),
            outcome,
            expected_failure: scenario.expected_failure,
            artifacts: execution.capturer.into_artifacts(),
            states: execution.tracker.into_states(),
            dismissed: execution.dismissed,
            started_at,
            duration_ms: elapsed_ms(clock),
        };
        if result.passed() {
            info!(scenario = %result.scenario, duration_ms = result.duration_ms, "scenario passed");
        } else {
            warn!(scenario = %result.scenario, duration_ms = result.duration_ms, "scenario failed");
        }
        result
    }

    /// Run scenarios concurrently, at most `parallelism` at a time.
    /// Results come back in input order.
    pub async fn run_all(&self, scenarios: &[Scenario], parallelism: usize) -> Vec<RunResult> {
        stream::iter(scenarios.iter().map(|s| self.run(s)))
            .buffered(parallelism.max(1))
            .collect()
            .await
    }
}

fn elapsed_ms(clock: Instant) -> u64 {
    u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mock::{Condition, Effect, MockApp, MockBrowser, MockPage};
    use crate::seed::UserRecord;
    use crate::Selector;
    use tempfile::TempDir;

    fn quick(scenario: Scenario) -> Scenario {
        let overlays = scenario
            .overlays
            .iter()
            .cloned()
            .map(|o| o.with_settle(Duration::ZERO))
            .collect();
        Scenario {
            steps: scenario
                .steps
                .into_iter()
                .map(|s| match s {
                    Step::DismissOverlays { max_passes, .. } => Step::DismissOverlays {
                        max_passes,
                        settle: Duration::ZERO,
                    },
                    other => other,
                })
                .collect(),
            overlays,
            ..scenario
        }
    }

    fn dashboard_app() -> MockApp {
        MockApp::new()
            .on_load(
                Condition::StorageHas("nst_current_user".into()),
                [Effect::show(Selector::text("Study Time"))],
            )
            .on_load(
                Condition::StorageMissing("nst_current_user".into()),
                [Effect::show(Selector::text("Sign In"))],
            )
    }

    mod state_tests {
        use super::*;

        #[test]
        fn test_happy_path_transitions() {
            let mut tracker = RunTracker::new();
            for state in [
                RunState::Seeded,
                RunState::Loaded,
                RunState::Dismissing,
                RunState::Waiting,
                RunState::Dismissing,
                RunState::Acting,
                RunState::Waiting,
                RunState::Capturing,
                RunState::Done,
            ] {
                tracker.advance(state).unwrap();
            }
            assert!(tracker.current().is_terminal());
        }

        #[test]
        fn test_illegal_transitions() {
            assert!(!RunState::Init.can_transition_to(RunState::Loaded));
            assert!(!RunState::Seeded.can_transition_to(RunState::Acting));
            assert!(!RunState::Done.can_transition_to(RunState::CapturingFailure));
            assert!(!RunState::Failed.can_transition_to(RunState::Init));
            assert!(!RunState::CapturingFailure.can_transition_to(RunState::Done));
            let mut tracker = RunTracker::new();
            let err = tracker.advance(RunState::Waiting).unwrap_err();
            assert!(matches!(err, WaypointError::InvalidState { .. }));
        }

        #[test]
        fn test_failure_from_any_live_state() {
            for state in [
                RunState::Init,
                RunState::Seeded,
                RunState::Loaded,
                RunState::Dismissing,
                RunState::Waiting,
                RunState::Acting,
                RunState::Capturing,
            ] {
                assert!(state.can_transition_to(RunState::CapturingFailure), "{state}");
            }
            assert!(RunState::CapturingFailure.can_transition_to(RunState::Failed));
        }

        #[test]
        fn test_step_labels() {
            assert_eq!(
                Step::WaitFor(WaitTarget::new("text=Admin Console").with_timeout(Duration::from_secs(10)))
                    .to_string(),
                "wait for text=Admin Console (10000ms)"
            );
            assert_eq!(
                Step::FirstOf(vec![Action::click("text=AI Tutor"), Action::click("text=AI Config")])
                    .to_string(),
                "first of [click text=AI Tutor | click text=AI Config]"
            );
        }
    }

    mod runner_tests {
        use super::*;

        #[tokio::test]
        async fn test_positive_control() {
            let tmp = TempDir::new().unwrap();
            let scenario = quick(
                Scenario::new("student", "http://localhost:5000")
                    .seed(
                        SeedState::new().with_user(UserRecord::student("u", "U")),
                        InjectionMode::PreNavigation,
                    )
                    .dismiss_overlays()
                    .wait_for("text=Study Time", Duration::from_secs(1))
                    .capture("dashboard"),
            );
            let runner = ScenarioRunner::new(MockBrowser::new(dashboard_app()), RunnerConfig::new(tmp.path()));
            let result = runner.run(&scenario).await;
            assert!(result.passed(), "{:?}", result.outcome);
            assert_eq!(result.final_state(), Some(RunState::Done));
            assert_eq!(result.artifacts.len(), 1);
            assert!(result.artifacts[0].path.ends_with("student/03_dashboard.png"));
            assert_eq!(runner.factory().closed(), 1);
        }

        #[tokio::test]
        async fn test_post_navigation_seed_reloads() {
            let tmp = TempDir::new().unwrap();
            let scenario = Scenario::new("post", "http://localhost:5000")
                .seed(
                    SeedState::new().with_user(UserRecord::student("u", "U")),
                    InjectionMode::PostNavigation,
                )
                .wait_for("text=Study Time", Duration::from_millis(300));
            let runner = ScenarioRunner::new(MockBrowser::new(dashboard_app()), RunnerConfig::new(tmp.path()));
            let result = runner.run(&scenario).await;
            assert!(result.passed());
            let calls = runner.factory().pages()[0].calls();
            assert_eq!(calls[0], "goto:http://localhost:5000/");
            assert_eq!(calls[1], "write_storage");
            assert_eq!(calls[2], "reload");
        }

        #[tokio::test]
        async fn test_wait_timeout_captures_failure() {
            let tmp = TempDir::new().unwrap();
            let scenario = Scenario::new("anon", "http://localhost:5000")
                .wait_for("text=Study Time", Duration::from_millis(100))
                .capture("never");
            let runner = ScenarioRunner::new(MockBrowser::new(dashboard_app()), RunnerConfig::new(tmp.path()));
            let result = runner.run(&scenario).await;
            assert!(!result.passed());
            let failure = result.failure().unwrap();
            assert_eq!(failure.kind, ErrorKind::WaitTimeout);
            assert_eq!(failure.step, 1);
            let shot = result.failure_screenshot().unwrap();
            assert!(shot.ends_with("anon/01_failure.png"));
            assert!(shot.exists());
            assert_eq!(
                &result.states[result.states.len() - 2..],
                &[RunState::CapturingFailure, RunState::Failed]
            );
            assert_eq!(runner.factory().closed(), 1);
        }

        #[tokio::test]
        async fn test_expected_failure_counts_as_pass() {
            let tmp = TempDir::new().unwrap();
            let scenario = Scenario::new("anon", "http://localhost:5000")
                .wait_for("text=Study Time", Duration::from_millis(50))
                .expect_failure(ErrorKind::WaitTimeout);
            let runner = ScenarioRunner::new(MockBrowser::new(dashboard_app()), RunnerConfig::new(tmp.path()));
            assert!(runner.run(&scenario).await.passed());
        }

        #[tokio::test]
        async fn test_navigation_failure_at_load() {
            let tmp = TempDir::new().unwrap();
            let scenario = Scenario::new("down", "http://localhost:5000").capture("x");
            let runner = ScenarioRunner::new(
                MockBrowser::new(MockApp::new().unreachable()),
                RunnerConfig::new(tmp.path()),
            );
            let result = runner.run(&scenario).await;
            let failure = result.failure().unwrap();
            assert_eq!(failure.step, 0);
            assert_eq!(failure.kind, ErrorKind::Navigation);
            assert!(result.failure_screenshot().is_some());
            assert_eq!(runner.factory().closed(), 1);
        }

        #[tokio::test]
        async fn test_best_effort_and_first_of() {
            let tmp = TempDir::new().unwrap();
            let app = dashboard_app().on_load(Condition::Always, [Effect::show(Selector::text("AI Config"))]);
            let scenario = Scenario::new("alts", "http://localhost:5000")
                .best_effort(Action::force_click("text=Not There"))
                .first_of(vec![Action::click("text=AI Tutor"), Action::click("text=AI Config")]);
            let runner = ScenarioRunner::new(MockBrowser::new(app), RunnerConfig::new(tmp.path()));
            let result = runner.run(&scenario).await;
            assert!(result.passed(), "{:?}", result.outcome);
            assert_eq!(
                runner.factory().pages()[0].clicks(),
                vec![Selector::text("AI Config")]
            );
        }

        #[tokio::test]
        async fn test_required_action_error_propagates() {
            let tmp = TempDir::new().unwrap();
            let scenario = Scenario::new("req", "http://localhost:5000")
                .act(Action::force_click("text=Missing"));
            let runner = ScenarioRunner::new(MockBrowser::new(dashboard_app()), RunnerConfig::new(tmp.path()));
            let result = runner.run(&scenario).await;
            assert_eq!(result.failure().unwrap().kind, ErrorKind::Action);
        }

        #[tokio::test]
        async fn test_first_of_all_failing() {
            let tmp = TempDir::new().unwrap();
            let scenario = Scenario::new("none", "http://localhost:5000")
                .first_of(vec![Action::click("text=A"), Action::click("text=B")]);
            let runner = ScenarioRunner::new(MockBrowser::new(dashboard_app()), RunnerConfig::new(tmp.path()));
            let failure = runner.run(&scenario).await.failure().cloned().unwrap();
            assert_eq!(failure.kind, ErrorKind::Action);
            assert!(failure.message.contains("text=B"));
        }

        #[tokio::test]
        async fn test_context_options_reach_factory() {
            let tmp = TempDir::new().unwrap();
            let scenario = Scenario::new("phone", "http://localhost:5000").context(ContextOptions::mobile());
            let runner = ScenarioRunner::new(MockBrowser::new(MockApp::new()), RunnerConfig::new(tmp.path()));
            assert!(runner.run(&scenario).await.passed());
            assert_eq!(runner.factory().pages()[0].options(), ContextOptions::mobile());
        }

        #[tokio::test]
        async fn test_run_on_page_leaves_page_open() {
            let tmp = TempDir::new().unwrap();
            let runner = ScenarioRunner::new(MockBrowser::new(MockApp::new()), RunnerConfig::new(tmp.path()));
            let page = MockPage::new(dashboard_app());
            let result = runner
                .run_on_page(&page, &Scenario::new("p", "http://localhost:5000"))
                .await;
            assert!(result.passed());
            assert!(!page.is_closed());
        }

        #[tokio::test]
        async fn test_run_all_preserves_order_and_isolation() {
            let tmp = TempDir::new().unwrap();
            let student = Scenario::new("student", "http://localhost:5000")
                .seed(
                    SeedState::new().with_user(UserRecord::student("u", "U")),
                    InjectionMode::PreNavigation,
                )
                .wait_for("text=Study Time", Duration::from_millis(500));
            let anon = Scenario::new("anon", "http://localhost:5000")
                .wait_for("text=Sign In", Duration::from_millis(500));
            let runner = ScenarioRunner::new(MockBrowser::new(dashboard_app()), RunnerConfig::new(tmp.path()));
            let results = runner.run_all(&[student, anon], 2).await;
            assert_eq!(results[0].scenario, "student");
            assert_eq!(results[1].scenario, "anon");
            assert!(results.iter().all(RunResult::passed));
            assert_eq!(runner.factory().opened(), 2);
            assert_eq!(runner.factory().closed(), 2);
        }

        #[test]
        fn test_result_serializes() {
            let result = RunResult {
                scenario: "s".into(),
                outcome: Outcome::Failed(Failure {
                    step: 2,
                    label: "wait for text=X (10ms)".into(),
                    kind: ErrorKind::WaitTimeout,
                    message: "timed out".into(),
                }),
                expected_failure: None,
                artifacts: Vec::new(),
                states: vec![RunState::Init, RunState::CapturingFailure, RunState::Failed],
                dismissed: Vec::new(),
                started_at: Utc::now(),
                duration_ms: 12,
            };
            let json = serde_json::to_value(&result).unwrap();
            assert_eq!(json["outcome"]["status"], "failed");
            assert_eq!(json["outcome"]["kind"], "wait_timeout");
            assert_eq!(json["states"][1], "capturing_failure");
        }
    }
}
