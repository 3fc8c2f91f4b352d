//! State seeding: synthetic application state written into persisted storage.
//!
//! A [`SeedState`] is the payload (current user, flags, system settings);
//! [`StateSeeder`] writes it into a page in one of two [`InjectionMode`]s.
//! Reloading after a post-navigation seed is the caller's job.

use crate::driver::{PageDriver, StorageEntry};
use crate::locator::js_string;
use crate::result::{WaypointError, WaypointResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Application namespace prefix for storage keys
pub const NAMESPACE: &str = "nst_";

/// Well-known storage keys read by the application
pub mod keys {
    /// Serialized current user record
    pub const CURRENT_USER: &str = "nst_current_user";
    /// Serialized array of known users
    pub const USERS: &str = "nst_users";
    /// Terms-of-service acceptance
    pub const TERMS_ACCEPTED: &str = "nst_terms_accepted";
    /// Welcome tour already shown
    pub const HAS_SEEN_WELCOME: &str = "nst_has_seen_welcome";
    /// Date the daily goal tracker was last shown
    pub const LAST_DAILY_TRACKER_DATE: &str = "nst_last_daily_tracker_date";
    /// Date the daily challenge was last shown
    pub const LAST_DAILY_CHALLENGE_DATE: &str = "nst_last_daily_challenge_date";
    /// Epoch millis of the last read update notice
    pub const LAST_READ_UPDATE: &str = "nst_last_read_update";
    /// Daily goal tracker collapsed
    pub const TRACKER_MINIMIZED: &str = "nst_tracker_minimized";
    /// Serialized system settings
    pub const SYSTEM_SETTINGS: &str = "nst_system_settings";
    /// Prefix of the per-day challenge generation marker (not namespaced)
    pub const DAILY_CHALLENGE_GEN_PREFIX: &str = "daily_challenge_gen_";
}

/// Placeholder the page replaces with its own local
/// `new Date().toDateString()` when the seed is written.
///
/// "Seen today" markers must match the date the application computes in the
/// browser's timezone, so they are never rendered on the harness side.
pub const TODAY: &str = "{today}";

/// Render a date the way the browser's `Date.prototype.toDateString` does
#[must_use]
pub fn date_marker(date: NaiveDate) -> String {
    date.format("%a %b %d %Y").to_string()
}

/// Replace every [`TODAY`] placeholder in `text` with `today`'s marker
#[must_use]
pub fn expand_today(text: &str, today: NaiveDate) -> String {
    if text.contains(TODAY) {
        text.replace(TODAY, &date_marker(today))
    } else {
        text.to_string()
    }
}

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Learner account
    Student,
    /// Administrator account
    Admin,
}

/// Billing period of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionTier {
    /// Weekly plan
    Weekly,
    /// Monthly plan
    Monthly,
    /// Yearly plan
    Yearly,
    /// One-off lifetime plan
    Lifetime,
}

/// Feature level of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionLevel {
    /// Basic paid features
    Basic,
    /// Every paid feature
    Ultra,
}

/// Mock user record as stored under [`keys::CURRENT_USER`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// User id
    pub id: String,
    /// Display name
    pub name: String,
    /// Role
    pub role: Role,
    /// School class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_level: Option<String>,
    /// Examination board
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board: Option<String>,
    /// Stream (science, commerce, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    /// Contact email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Credit balance
    #[serde(default)]
    pub credits: i64,
    /// Daily streak
    #[serde(default)]
    pub streak: i64,
    /// Paying subscriber
    #[serde(default)]
    pub is_premium: bool,
    /// Billing period
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_tier: Option<SubscriptionTier>,
    /// Feature level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_level: Option<SubscriptionLevel>,
    /// Subscription expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_end_date: Option<DateTime<Utc>>,
    /// Last claimed login reward
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_reward_date: Option<DateTime<Utc>>,
    /// Admin permissions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    /// Account creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// Student account with the defaults the verification flows use
    #[must_use]
    pub fn student(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: Role::Student,
            class_level: Some("10".to_string()),
            board: Some("CBSE".to_string()),
            stream: None,
            email: None,
            credits: 100,
            streak: 5,
            is_premium: false,
            subscription_tier: None,
            subscription_level: None,
            subscription_end_date: None,
            last_login_reward_date: None,
            permissions: Vec::new(),
            created_at: None,
        }
    }

    /// Admin account with full permissions
    #[must_use]
    pub fn admin(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: Role::Admin,
            class_level: None,
            board: None,
            credits: 0,
            streak: 0,
            permissions: vec!["ALL".to_string()],
            ..Self::student(id, name)
        }
    }

    /// Mark as premium subscriber
    #[must_use]
    pub fn premium(
        mut self,
        tier: SubscriptionTier,
        level: SubscriptionLevel,
        ends: DateTime<Utc>,
    ) -> Self {
        self.is_premium = true;
        self.subscription_tier = Some(tier);
        self.subscription_level = Some(level);
        self.subscription_end_date = Some(ends);
        self
    }

    /// Set creation time
    #[must_use]
    pub const fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Set stream
    #[must_use]
    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    /// Set email
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set last login reward date (suppresses the reward popup)
    #[must_use]
    pub const fn reward_claimed_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_login_reward_date = Some(at);
        self
    }
}

/// Limited-time discount banner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountEvent {
    /// Banner shown
    pub enabled: bool,
    /// Event title
    pub event_name: String,
    /// Start time
    pub starts_at: DateTime<Utc>,
    /// End time
    pub ends_at: DateTime<Utc>,
    /// Discount percentage
    pub discount_percent: u8,
}

/// System settings stored under [`keys::SYSTEM_SETTINGS`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettings {
    /// Application title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    /// Maintenance banner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_mode: Option<bool>,
    /// Discount banner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_discount_event: Option<DiscountEvent>,
    /// Any other settings the application reads
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Flag value; booleans are stored as `"true"`/`"false"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    /// Boolean flag
    Bool(bool),
    /// Free-form string flag
    Text(String),
}

impl FlagValue {
    /// Storage string form
    #[must_use]
    pub fn as_storage(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl From<bool> for FlagValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for FlagValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FlagValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Synthetic persisted-storage payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedState {
    /// Current user; absent means an anonymous visitor
    #[serde(default)]
    pub user: Option<UserRecord>,
    /// Also write the user as the single entry of [`keys::USERS`]
    #[serde(default)]
    pub register_user: bool,
    /// Flags and "seen" markers keyed by full storage key
    #[serde(default)]
    pub flags: BTreeMap<String, FlagValue>,
    /// System settings
    #[serde(default)]
    pub settings: Option<SystemSettings>,
}

impl SeedState {
    /// Empty seed (anonymous visitor, no markers)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current user
    #[must_use]
    pub fn with_user(mut self, user: UserRecord) -> Self {
        self.user = Some(user);
        self
    }

    /// Set the current user and register it in the user list
    #[must_use]
    pub fn with_registered_user(mut self, user: UserRecord) -> Self {
        self.user = Some(user);
        self.register_user = true;
        self
    }

    /// Set a flag
    #[must_use]
    pub fn with_flag(mut self, key: impl Into<String>, value: impl Into<FlagValue>) -> Self {
        self.flags.insert(key.into(), value.into());
        self
    }

    /// Set system settings
    #[must_use]
    pub fn with_settings(mut self, settings: SystemSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Accept terms and skip the welcome tour
    #[must_use]
    pub fn accept_terms(self) -> Self {
        self.with_flag(keys::TERMS_ACCEPTED, true)
            .with_flag(keys::HAS_SEEN_WELCOME, true)
    }

    /// Write every known overlay-gating marker.
    ///
    /// Date markers hold [`TODAY`] and resolve to the browser's local date;
    /// `now` only stamps the read-update marker, which is epoch based.
    #[must_use]
    pub fn suppress_onboarding(self, now: DateTime<Utc>) -> Self {
        self.accept_terms()
            .with_flag(keys::LAST_DAILY_TRACKER_DATE, TODAY)
            .with_flag(keys::LAST_DAILY_CHALLENGE_DATE, TODAY)
            .with_flag(keys::LAST_READ_UPDATE, now.timestamp_millis().to_string())
            .with_flag(keys::TRACKER_MINIMIZED, true)
            .with_flag(format!("{}{}", keys::DAILY_CHALLENGE_GEN_PREFIX, TODAY), true)
    }

    /// Storage entries in deterministic (key-sorted) order
    pub fn entries(&self) -> WaypointResult<Vec<StorageEntry>> {
        let mut map: BTreeMap<String, String> = self
            .flags
            .iter()
            .map(|(k, v)| (k.clone(), v.as_storage()))
            .collect();
        if let Some(ref user) = self.user {
            let json = serde_json::to_string(user)?;
            if self.register_user {
                map.insert(keys::USERS.to_string(), format!("[{json}]"));
            }
            map.insert(keys::CURRENT_USER.to_string(), json);
        }
        if let Some(ref settings) = self.settings {
            map.insert(
                keys::SYSTEM_SETTINGS.to_string(),
                serde_json::to_string(settings)?,
            );
        }
        Ok(map.into_iter().collect())
    }
}

/// Script writing `entries` into `localStorage`, returning the count written.
/// [`TODAY`] in keys and values expands to the page's local date string.
#[must_use]
pub fn storage_script(entries: &[StorageEntry]) -> String {
    let mut script = format!(
        "(() => {{ const today = new Date().toDateString(); \
         const put = (k, v) => localStorage.setItem(k.split({t}).join(today), v.split({t}).join(today)); ",
        t = js_string(TODAY)
    );
    for (key, value) in entries {
        script.push_str(&format!("put({}, {}); ", js_string(key), js_string(value)));
    }
    script.push_str(&format!("return {}; }})()", entries.len()));
    script
}

/// When the seed reaches storage relative to the application's first read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionMode {
    /// Registered to run before any page script on every new document
    #[default]
    PreNavigation,
    /// Written into the already loaded document; a reload must follow
    PostNavigation,
}

/// Writes a [`SeedState`] into a page
#[derive(Debug, Clone, Copy, Default)]
pub struct StateSeeder;

impl StateSeeder {
    /// Create a seeder
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Write every entry of `state`; returns the number of entries written.
    ///
    /// Navigation errors pass through unchanged; any other failure of the
    /// storage write surfaces as a seed write error.
    pub async fn seed<P: PageDriver + ?Sized>(
        &self,
        page: &P,
        state: &SeedState,
        mode: InjectionMode,
    ) -> WaypointResult<usize> {
        let entries = state.entries()?;
        debug!(count = entries.len(), ?mode, "writing seed entries");
        let written = match mode {
            InjectionMode::PreNavigation => page.write_storage_on_new_document(&entries).await,
            InjectionMode::PostNavigation => page.write_storage(&entries).await,
        };
        written.map_err(|e| match e {
            WaypointError::Navigation { .. } | WaypointError::SeedWrite { .. } => e,
            other => WaypointError::seed_write(other.to_string()),
        })?;
        info!(count = entries.len(), ?mode, "seeded storage");
        Ok(entries.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mock::{MockApp, MockPage};
    use chrono::TimeZone;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap()
    }

    mod payload_tests {
        use super::*;

        #[test]
        fn test_date_marker_matches_to_date_string() {
            assert_eq!(date_marker(today()), "Sun Oct 18 2026");
            assert_eq!(
                date_marker(NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()),
                "Mon Jan 05 2026"
            );
        }

        #[test]
        fn test_user_record_camel_case() {
            let user = UserRecord::student("test-user", "Test Student").premium(
                SubscriptionTier::Monthly,
                SubscriptionLevel::Ultra,
                now(),
            );
            let json = serde_json::to_value(&user).unwrap();
            assert_eq!(json["role"], "STUDENT");
            assert_eq!(json["classLevel"], "10");
            assert_eq!(json["isPremium"], true);
            assert_eq!(json["subscriptionTier"], "MONTHLY");
            assert_eq!(json["subscriptionLevel"], "ULTRA");
            assert!(json.get("email").is_none());
            assert!(json.get("permissions").is_none());
        }

        #[test]
        fn test_admin_has_permissions() {
            let json = serde_json::to_value(UserRecord::admin("admin", "Admin")).unwrap();
            assert_eq!(json["role"], "ADMIN");
            assert_eq!(json["permissions"][0], "ALL");
        }

        #[test]
        fn test_entries_sorted_and_complete() {
            let state = SeedState::new()
                .with_registered_user(UserRecord::student("u", "U"))
                .accept_terms()
                .with_settings(SystemSettings {
                    app_name: Some("Test App".into()),
                    maintenance_mode: Some(false),
                    ..SystemSettings::default()
                });
            let entries = state.entries().unwrap();
            let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
            assert_eq!(
                keys,
                vec![
                    keys::CURRENT_USER,
                    keys::HAS_SEEN_WELCOME,
                    keys::SYSTEM_SETTINGS,
                    keys::TERMS_ACCEPTED,
                    keys::USERS,
                ]
            );
            let users = &entries.iter().find(|(k, _)| k == keys::USERS).unwrap().1;
            assert!(users.starts_with("[{"));
            let settings = &entries
                .iter()
                .find(|(k, _)| k == keys::SYSTEM_SETTINGS)
                .unwrap()
                .1;
            assert!(settings.contains("\"appName\":\"Test App\""));
        }

        #[test]
        fn test_anonymous_seed_has_no_user_key() {
            let entries = SeedState::new().accept_terms().entries().unwrap();
            assert!(entries.iter().all(|(k, _)| k != keys::CURRENT_USER));
        }

        #[test]
        fn test_expand_today() {
            assert_eq!(
                expand_today("daily_challenge_gen_{today}", today()),
                "daily_challenge_gen_Sun Oct 18 2026"
            );
            assert_eq!(expand_today("plain", today()), "plain");
        }

        #[test]
        fn test_suppress_onboarding_markers() {
            let entries = SeedState::new().suppress_onboarding(now()).entries().unwrap();
            let get = |key: &str| {
                entries
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
            };
            assert_eq!(get(keys::LAST_DAILY_TRACKER_DATE).as_deref(), Some(TODAY));
            assert_eq!(get(keys::LAST_DAILY_CHALLENGE_DATE).as_deref(), Some(TODAY));
            assert_eq!(get(keys::TERMS_ACCEPTED).as_deref(), Some("true"));
            assert_eq!(get("daily_challenge_gen_{today}").as_deref(), Some("true"));
            assert_eq!(
                get(keys::LAST_READ_UPDATE),
                Some(now().timestamp_millis().to_string())
            );
        }

        #[test]
        fn test_storage_script_escapes_values() {
            let script = storage_script(&[("k".into(), "{\"a\":\"it's\"}".into())]);
            assert!(script.contains("put(\"k\", \"{\\\"a\\\":\\\"it's\\\"}\");"));
            assert!(script.ends_with("return 1; })()"));
        }

        #[test]
        fn test_storage_script_dates_in_page() {
            let script = storage_script(&[("nst_last_daily_challenge_date".into(), TODAY.into())]);
            assert!(script.contains("const today = new Date().toDateString();"));
            assert!(script.contains("split(\"{today}\").join(today)"));
        }
    }

    mod seeder_tests {
        use super::*;
        use crate::driver::PageDriver;

        #[tokio::test]
        async fn test_pre_navigation_seed_visible_on_first_load() {
            let page = MockPage::new(MockApp::new());
            let state = SeedState::new().with_user(UserRecord::student("u", "U"));
            let n = StateSeeder::new()
                .seed(&page, &state, InjectionMode::PreNavigation)
                .await
                .unwrap();
            assert_eq!(n, 1);
            assert!(page.storage(keys::CURRENT_USER).is_none());
            page.goto("http://localhost:5000").await.unwrap();
            assert!(page.storage(keys::CURRENT_USER).unwrap().contains("\"id\":\"u\""));
        }

        #[tokio::test]
        async fn test_post_navigation_seed_does_not_reload() {
            let page = MockPage::new(MockApp::new());
            page.goto("http://localhost:5000").await.unwrap();
            StateSeeder::new()
                .seed(&page, &SeedState::new().accept_terms(), InjectionMode::PostNavigation)
                .await
                .unwrap();
            assert_eq!(page.storage(keys::TERMS_ACCEPTED).as_deref(), Some("true"));
            assert!(!page.calls().iter().any(|c| c == "reload"));
        }

        #[tokio::test]
        async fn test_post_navigation_without_document_fails() {
            let page = MockPage::new(MockApp::new());
            let err = StateSeeder::new()
                .seed(&page, &SeedState::new().accept_terms(), InjectionMode::PostNavigation)
                .await
                .unwrap_err();
            assert!(matches!(err, WaypointError::SeedWrite { .. }));
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_entries_deterministic_and_sorted(
                flags in proptest::collection::btree_map("nst_[a-z_]{1,12}", any::<bool>(), 0..8)
            ) {
                let state = flags
                    .iter()
                    .fold(SeedState::new(), |s, (k, v)| s.with_flag(k.clone(), *v));
                let a = state.entries().unwrap();
                let b = state.clone().entries().unwrap();
                prop_assert_eq!(&a, &b);
                prop_assert!(a.windows(2).all(|w| w[0].0 < w[1].0));
                prop_assert_eq!(a.len(), flags.len());
            }
        }
    }
}
