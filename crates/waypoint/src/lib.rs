//! Waypoint: seeded, overlay-tolerant UI verification runs
//!
//! Waypoint drives a web application through short scripted flows and
//! captures evidence of what it rendered. Each run seeds persisted storage
//! so the application starts in a chosen state, clears the popups it throws
//! up on load, waits for a milestone, performs interactions and captures
//! screenshots. Failures are captured as evidence too.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    WAYPOINT Architecture                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Scenario / │    │ Scenario   │    │ PageDriver │            │
//! │   │ Playbook   │───►│ Runner     │───►│ (chromium  │            │
//! │   │            │    │            │    │  or mock)  │            │
//! │   └────────────┘    └─────┬──────┘    └────────────┘            │
//! │                           │                                     │
//! │      seed ─► load ─► dismiss ─► wait ─► act ─► capture          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use waypoint::mock::{Condition, Effect, MockApp, MockBrowser};
//! use waypoint::{RunnerConfig, Scenario, ScenarioRunner, SeedState, Selector, UserRecord};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let app = MockApp::new().on_load(
//!     Condition::StorageHas("nst_current_user".into()),
//!     [Effect::show(Selector::text("Study Time"))],
//! );
//! let dir = std::env::temp_dir().join("waypoint-doc");
//! let runner = ScenarioRunner::new(MockBrowser::new(app), RunnerConfig::new(&dir));
//! let scenario = Scenario::new("student", "http://localhost:5000")
//!     .seed(
//!         SeedState::new().with_user(UserRecord::student("s1", "Student")),
//!         Default::default(),
//!     )
//!     .wait_for("text=Study Time", Duration::from_secs(1))
//!     .capture("dashboard");
//! let result = runner.run(&scenario).await;
//! assert!(result.passed());
//! # });
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

/// Interaction driver and the action vocabulary
pub mod action;

/// Screenshot and console log capture
pub mod artifact;

/// Chromium over CDP (real backend behind the `browser` feature)
pub mod browser;

/// Built-in verification scenarios
pub mod catalog;

/// Page and context abstractions
pub mod driver;

/// Element selectors and the scripts that resolve them
pub mod locator;

/// Scripted in-process application for tests
pub mod mock;

/// Overlay dismissal
pub mod overlay;

/// YAML playbooks
pub mod playbook;

/// Error types
pub mod result;

/// Scenarios, run state machine and runner
pub mod scenario;

/// Persisted-state seeding
pub mod seed;

/// Condition waiting
pub mod wait;

pub use action::{Action, InteractionDriver};
pub use artifact::{Artifact, ArtifactCapturer, ArtifactKind};
pub use browser::{Browser, BrowserConfig};
pub use catalog::{Catalog, DEFAULT_BASE_URL};
pub use driver::{ConsoleMessage, ContextFactory, ContextOptions, PageDriver, StorageEntry, Viewport};
pub use locator::Selector;
pub use overlay::{known_overlays, DismissReport, OverlayDismisser, OverlaySignature};
pub use playbook::Playbook;
pub use result::{ErrorKind, WaypointError, WaypointResult};
pub use scenario::{
    Failure, Outcome, RunResult, RunState, RunTracker, RunnerConfig, Scenario, ScenarioRunner,
    Step,
};
pub use seed::{InjectionMode, SeedState, StateSeeder, UserRecord};
pub use wait::{ConditionWaiter, WaitTarget};

#[cfg(feature = "browser")]
pub use browser::Page;
