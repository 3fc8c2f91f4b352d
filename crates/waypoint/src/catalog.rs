//! Built-in verification scenarios for the learning application.
//!
//! Every scenario targets one configurable base URL. "Already seen today"
//! markers resolve to the browser's local date when written; the catalog's
//! clock stamps everything else (read-update marker, subscription expiry)
//! so a run is reproducible for a fixed `now`.

use crate::action::{js_click_by_text, Action};
use crate::driver::{ContextOptions, Viewport};
use crate::locator::Selector;
use crate::result::ErrorKind;
use crate::scenario::Scenario;
use crate::seed::{
    DiscountEvent, InjectionMode, SeedState, SubscriptionLevel, SystemSettings, UserRecord,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use std::time::Duration;

/// Default application address
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

const SECS_2024_01_01: i64 = 1_704_067_200;
const SECS_2099_01_01: i64 = 4_070_908_800;

/// Built-in scenario set bound to one application address and clock
#[derive(Debug, Clone)]
pub struct Catalog {
    base_url: String,
    now: DateTime<Utc>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl Catalog {
    /// Catalog for `base_url` at the current time
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            now: Utc::now(),
        }
    }

    /// Pin the clock
    #[must_use]
    pub const fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Names of every built-in scenario
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.scenarios().into_iter().map(|s| s.name).collect()
    }

    /// Look up a scenario by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Scenario> {
        self.scenarios().into_iter().find(|s| s.name == name)
    }

    /// All built-in scenarios
    #[must_use]
    pub fn scenarios(&self) -> Vec<Scenario> {
        vec![
            self.admin_console(),
            self.student_dashboard(),
            self.unauthenticated(),
            self.ai_control_tower(),
            self.ai_save_button(),
            self.visibility_controls(),
            self.explore_page(),
            self.ai_tools_nav(),
            self.initial_state(),
        ]
    }

    fn fixed(&self, secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or(self.now)
    }

    fn quiet(&self) -> SeedState {
        SeedState::new().suppress_onboarding(self.now)
    }

    fn admin_console(&self) -> Scenario {
        Scenario::new("admin-console", &self.base_url)
            .describe("Admin enters master mode and reaches the admin console")
            .seed(
                self.quiet().with_user(
                    UserRecord::admin("admin_123", "Admin User").with_email("admin@example.com"),
                ),
                InjectionMode::PostNavigation,
            )
            .dismiss_overlays()
            .act(Action::force_click(Selector::text("Enter Master Mode")))
            .wait_for(Selector::text("Admin Console"), Duration::from_secs(10))
            .capture("admin_console")
    }

    fn student_dashboard(&self) -> Scenario {
        let student = UserRecord::student("test-student", "Test Student");
        Scenario::new("student-dashboard", &self.base_url)
            .describe("Free student lands on the dashboard past the daily challenge")
            .seed(
                SeedState::new().accept_terms().with_user(student),
                InjectionMode::PostNavigation,
            )
            .dismiss_overlays()
            .wait_for(Selector::text("Study Time"), Duration::from_secs(15))
            .capture("student_dashboard")
    }

    fn unauthenticated(&self) -> Scenario {
        Scenario::new("unauthenticated", &self.base_url)
            .describe("Visitor without a session never sees the dashboard (expected to fail)")
            .wait_for(Selector::text("Study Time"), Duration::from_secs(5))
            .capture("dashboard")
            .expect_failure(ErrorKind::WaitTimeout)
    }

    fn ai_control_tower(&self) -> Scenario {
        let admin = UserRecord::admin("admin", "Admin");
        Scenario::new("ai-control-tower", &self.base_url)
            .describe("Admin opens the AI control tower from master mode")
            .seed(SeedState::new().with_user(admin), InjectionMode::PostNavigation)
            .dismiss_overlays()
            .act(Action::force_click(Selector::text("Enter Master Mode")))
            .first_of(vec![
                Action::force_click(Selector::exact_text("AI Tutor")),
                Action::force_click(Selector::text("AI Config")),
            ])
            .wait_for(Selector::text("AI Control Tower"), Duration::from_secs(5))
            .capture("ai_control")
    }

    fn ai_save_button(&self) -> Scenario {
        Scenario::new("ai-save-button", &self.base_url)
            .describe("AI control tower shows its save button")
            .seed(
                self.quiet().with_user(
                    UserRecord::admin("admin_123", "Admin User").with_email("admin@example.com"),
                ),
                InjectionMode::PostNavigation,
            )
            .dismiss_overlays()
            .best_effort(Action::click(Selector::text("Enter Master Mode")))
            .wait_for(Selector::text("Admin Console"), Duration::from_secs(10))
            .act(Action::click(Selector::text("AI Control Tower")))
            .wait_for(Selector::css_with_text("button", "Save Changes"), Duration::from_secs(5))
            .capture("ai_tower_save")
    }

    fn visibility_controls(&self) -> Scenario {
        let admin = UserRecord {
            is_premium: true,
            ..UserRecord::admin("ADMIN_001", "Admin User")
        };
        let settings = SystemSettings {
            app_name: Some("Test App".to_string()),
            maintenance_mode: Some(false),
            ..SystemSettings::default()
        };
        Scenario::new("visibility-controls", &self.base_url)
            .describe("Admin opens the explore grid visibility toggles")
            .context(ContextOptions::default().with_viewport(Viewport::DESKTOP))
            .seed(
                self.quiet().with_user(admin).with_settings(settings),
                InjectionMode::PreNavigation,
            )
            .capture("initial")
            .dismiss_overlays()
            .wait_for(Selector::text("Enter Master Mode"), Duration::from_secs(5))
            .act(Action::click(Selector::text("Enter Master Mode")))
            .wait_for(Selector::text("Visibility"), Duration::from_secs(5))
            .act(Action::click(Selector::text("Visibility")))
            .wait_for(Selector::text("Explore Grid Visibility"), Duration::from_secs(5))
            .capture("visibility")
    }

    fn explore_page(&self) -> Scenario {
        let student = UserRecord::student("test-user", "Test Student").created_at(self.fixed(SECS_2024_01_01));
        let student = UserRecord {
            is_premium: true,
            subscription_level: Some(SubscriptionLevel::Ultra),
            ..student
        };
        let settings = SystemSettings {
            special_discount_event: Some(DiscountEvent {
                enabled: true,
                event_name: "TEST SALE".to_string(),
                starts_at: self.fixed(SECS_2024_01_01),
                ends_at: self.fixed(SECS_2099_01_01),
                discount_percent: 50,
            }),
            ..SystemSettings::default()
        };
        let explore_more = Selector::css_with_text("button", "Explore More");
        Scenario::new("explore-page", &self.base_url)
            .describe("Premium student opens the explore page from the home grid")
            .seed(
                self.quiet()
                    .with_registered_user(student)
                    .with_settings(settings),
                InjectionMode::PostNavigation,
            )
            .dismiss_overlays()
            .wait_for(explore_more.clone(), Duration::from_secs(10))
            .act(Action::scroll_into_view(explore_more.clone()))
            .capture("home_explore")
            .act(Action::click(explore_more))
            .wait_for(Selector::exact_text("Explore"), Duration::from_secs(5))
            .capture("explore_page")
    }

    fn ai_tools_nav(&self) -> Scenario {
        let student = UserRecord {
            is_premium: true,
            subscription_level: Some(SubscriptionLevel::Ultra),
            subscription_end_date: Some(self.now + ChronoDuration::days(1)),
            ..UserRecord::student("test-student", "Test Student")
        }
        .reward_claimed_at(self.now);
        Scenario::new("ai-tools-nav", &self.base_url)
            .describe("Phone layout reaches AI tools through the bottom navigation")
            .context(ContextOptions::mobile())
            .seed(self.quiet().with_user(student), InjectionMode::PreNavigation)
            .dismiss_overlays()
            .act(Action::evaluate_checked(
                js_click_by_text(".fixed.bottom-0 button"),
                json!(["AI Tools"]),
            ))
            .wait_for(Selector::exact_text("AI Tools"), Duration::from_secs(5))
            .wait_for(Selector::text("Notes Generator"), Duration::from_secs(5))
            .capture("ai_tools_page")
    }

    fn initial_state(&self) -> Scenario {
        Scenario::new("initial-state", &self.base_url)
            .describe("Probe: load without a seed and capture whatever renders")
            .capture("initial_state")
    }
}
