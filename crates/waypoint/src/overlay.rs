//! Overlay dismissal: a bounded, re-scanning loop over known overlay signatures.
//!
//! Each pass settles, scans the signature list in priority order and
//! dismisses only the **first** visible overlay before scanning again, since
//! a dismissal can re-render the page and invalidate whatever else was found.
//! The loop stops at the first pass where nothing matches, or after
//! `max_passes`. An overlay that never closes is not an error here; the
//! following milestone wait reports it.
//!
//! Dismissal actions are best-effort: an overlay can vanish on its own timer
//! between detection and click, so an action error is logged and the pass
//! still counts as progress.

use crate::action::{Action, InteractionDriver};
use crate::driver::PageDriver;
use crate::locator::Selector;
use crate::result::WaypointResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default pass limit for one dismissal run
pub const DEFAULT_MAX_PASSES: u32 = 5;

/// Default settle delay before each pass (500ms)
pub const DEFAULT_SETTLE_MS: u64 = 500;

/// A known transient overlay: how to spot it and how to close it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlaySignature {
    /// Catalog name (`daily-challenge`, ...)
    pub name: String,
    /// Visible element identifying the overlay
    pub detect: Selector,
    /// Action closing it
    pub dismiss: Action,
    /// Extra delay after dismissing this overlay
    #[serde(with = "crate::wait::millis", default)]
    pub settle: Duration,
}

impl OverlaySignature {
    /// Overlay closed by force-clicking `control`
    #[must_use]
    pub fn click(
        name: impl Into<String>,
        detect: impl Into<Selector>,
        control: impl Into<Selector>,
    ) -> Self {
        Self {
            name: name.into(),
            detect: detect.into(),
            dismiss: Action::force_click(control),
            settle: Duration::ZERO,
        }
    }

    /// Overlay closed by an arbitrary action
    #[must_use]
    pub fn with_action(name: impl Into<String>, detect: impl Into<Selector>, dismiss: Action) -> Self {
        Self {
            name: name.into(),
            detect: detect.into(),
            dismiss,
            settle: Duration::ZERO,
        }
    }

    /// Set post-dismiss settle delay
    #[must_use]
    pub const fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

/// The overlays the application is known to present, in priority order
#[must_use]
pub fn known_overlays() -> Vec<OverlaySignature> {
    let settle = Duration::from_millis(300);
    vec![
        OverlaySignature::click("daily-challenge", Selector::text("Daily Challenge"), Selector::text("Remind me later"))
            .with_settle(settle),
        OverlaySignature::click(
            "daily-goal-tracker",
            Selector::text("Daily Goal Tracker"),
            Selector::text("Continue Learning"),
        )
        .with_settle(settle),
        OverlaySignature::click(
            "referral-code",
            Selector::text("Referral Code"),
            Selector::css_with_text("button", "Skip"),
        )
        .with_settle(settle),
        OverlaySignature::click(
            "login-reward",
            Selector::css_with_text("button", "Claim Later"),
            Selector::css_with_text("button", "Claim Later"),
        )
        .with_settle(settle),
        OverlaySignature::click(
            "close-button",
            Selector::css("button:has(.lucide-x)"),
            Selector::css("button:has(.lucide-x)"),
        ),
    ]
}

/// Look up a known overlay by name
#[must_use]
pub fn known_overlay(name: &str) -> Option<OverlaySignature> {
    known_overlays().into_iter().find(|s| s.name == name)
}

/// What one dismissal run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DismissReport {
    /// Passes executed, including the final empty scan
    pub passes_used: u32,
    /// Names of dismissed overlays, in order
    pub dismissed: Vec<String>,
    /// Dismissal actions that failed and were swallowed
    pub failed: Vec<String>,
    /// Pass limit reached while overlays were still being found
    pub exhausted: bool,
}

/// Runs the dismissal loop over a signature list
#[derive(Debug, Clone)]
pub struct OverlayDismisser<'a> {
    signatures: &'a [OverlaySignature],
    driver: InteractionDriver,
}

impl<'a> OverlayDismisser<'a> {
    /// Dismisser over `signatures`, highest priority first
    #[must_use]
    pub fn new(signatures: &'a [OverlaySignature]) -> Self {
        Self {
            signatures,
            driver: InteractionDriver::default(),
        }
    }

    /// First signature whose detector is visible now
    async fn scan<P: PageDriver + ?Sized>(&self, page: &P) -> Option<&'a OverlaySignature> {
        for signature in self.signatures {
            match page.is_visible(&signature.detect).await {
                Ok(true) => return Some(signature),
                Ok(false) => {}
                Err(e) => debug!(overlay = %signature.name, error = %e, "overlay probe failed"),
            }
        }
        None
    }

    /// Dismiss visible overlays for at most `max_passes` passes.
    ///
    /// # Errors
    ///
    /// Only non-action failures (navigation, closed context) propagate.
    pub async fn dismiss<P: PageDriver + ?Sized>(
        &self,
        page: &P,
        max_passes: u32,
        settle: Duration,
    ) -> WaypointResult<DismissReport> {
        let mut report = DismissReport::default();
        for pass in 1..=max_passes {
            if !settle.is_zero() {
                tokio::time::sleep(settle).await;
            }
            report.passes_used = pass;
            let Some(signature) = self.scan(page).await else {
                debug!(pass, "no overlay visible");
                return Ok(report);
            };
            match self.driver.act(page, &signature.dismiss).await {
                Ok(_) => {
                    info!(overlay = %signature.name, pass, "dismissed overlay");
                    report.dismissed.push(signature.name.clone());
                }
                Err(e) if e.is_action() => {
                    warn!(overlay = %signature.name, pass, error = %e, "overlay dismissal failed");
                    report.failed.push(signature.name.clone());
                }
                Err(e) => return Err(e),
            }
            if !signature.settle.is_zero() {
                tokio::time::sleep(signature.settle).await;
            }
        }
        report.exhausted = max_passes > 0;
        if report.exhausted {
            warn!(max_passes, "overlay pass limit reached");
        }
        Ok(report)
    }
}
