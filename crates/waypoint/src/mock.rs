//! Scripted in-process application for exercising the engine without Chromium.
//!
//! A [`MockApp`] is a small rule set standing in for the real web
//! application: load rules decide which elements render after a navigation
//! (optionally gated on seeded storage), click rules mutate the rendered set,
//! and occlusion rules make unforced clicks fail while an overlay covers the
//! target. [`MockPage`] renders an app and implements [`PageDriver`];
//! [`MockBrowser`] hands out one fresh page per context.
//!
//! ```
//! use waypoint::mock::{Condition, Effect, MockApp};
//! use waypoint::Selector;
//!
//! let app = MockApp::new()
//!     .on_load(Condition::StorageHas("nst_current_user".into()), [Effect::show(Selector::text("Study Time"))])
//!     .on_load(Condition::Always, [Effect::show(Selector::text("Daily Challenge"))])
//!     .on_click(Selector::text("Remind me later"), [Effect::hide(Selector::text("Daily Challenge"))]);
//! # let _ = app;
//! ```

use crate::driver::{ConsoleMessage, ContextFactory, ContextOptions, PageDriver, StorageEntry};
use crate::locator::Selector;
use crate::result::{WaypointError, WaypointResult};
use crate::seed::{date_marker, expand_today};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Minimal PNG signature returned as screenshot payload
pub const MOCK_PNG: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Storage predicate gating a load rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Always applies
    Always,
    /// Key is present
    StorageHas(String),
    /// Key is absent
    StorageMissing(String),
    /// Key is present and its value contains the needle
    StorageContains {
        /// Storage key
        key: String,
        /// Substring to look for
        needle: String,
    },
    /// Key does not hold the page's local `toDateString()` for today
    NotSeenToday(String),
}

impl Condition {
    fn holds(&self, storage: &BTreeMap<String, String>, today: NaiveDate) -> bool {
        match self {
            Self::Always => true,
            Self::StorageHas(key) => storage.contains_key(key),
            Self::StorageMissing(key) => !storage.contains_key(key),
            Self::StorageContains { key, needle } => storage
                .get(key)
                .is_some_and(|value| value.contains(needle.as_str())),
            Self::NotSeenToday(key) => storage.get(key) != Some(&date_marker(today)),
        }
    }
}

/// Mutation applied to the rendered page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Render the element visible
    Show(Selector),
    /// Render the element, visible only once the delay has elapsed
    ShowAfter(Selector, Duration),
    /// Render the element but keep it hidden
    ShowHidden(Selector),
    /// Hide a rendered element
    Hide(Selector),
    /// Remove an element from the page
    Remove(Selector),
    /// Emit a console message
    Log(ConsoleMessage),
    /// Write to storage
    SetStorage(String, String),
}

impl Effect {
    /// Shorthand for [`Effect::Show`]
    #[must_use]
    pub fn show(selector: impl Into<Selector>) -> Self {
        Self::Show(selector.into())
    }

    /// Shorthand for [`Effect::Hide`]
    #[must_use]
    pub fn hide(selector: impl Into<Selector>) -> Self {
        Self::Hide(selector.into())
    }
}

#[derive(Debug, Clone)]
struct Rule {
    condition: Condition,
    effects: Vec<Effect>,
}

/// Rule set standing in for the web application
#[derive(Debug, Clone)]
pub struct MockApp {
    load_rules: Vec<Rule>,
    click_rules: Vec<(Selector, Vec<Effect>)>,
    script_rules: Vec<(String, Vec<Effect>)>,
    occlusions: Vec<(Selector, Selector)>,
    unreachable: bool,
    screenshot: Vec<u8>,
    local_time: Option<DateTime<FixedOffset>>,
}

impl Default for MockApp {
    fn default() -> Self {
        Self {
            load_rules: Vec::new(),
            click_rules: Vec::new(),
            script_rules: Vec::new(),
            occlusions: Vec::new(),
            unreachable: false,
            screenshot: MOCK_PNG.to_vec(),
            local_time: None,
        }
    }
}

impl MockApp {
    /// Create an empty application
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `effects` on every load where `condition` holds
    #[must_use]
    pub fn on_load(mut self, condition: Condition, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.load_rules.push(Rule {
            condition,
            effects: effects.into_iter().collect(),
        });
        self
    }

    /// Apply `effects` whenever `target` is clicked
    #[must_use]
    pub fn on_click(
        mut self,
        target: impl Into<Selector>,
        effects: impl IntoIterator<Item = Effect>,
    ) -> Self {
        self.click_rules
            .push((target.into(), effects.into_iter().collect()));
        self
    }

    /// Apply `effects` whenever an evaluated script contains `needle`.
    ///
    /// Matched scripts evaluate to `true`, unmatched ones to `null`.
    #[must_use]
    pub fn on_script(
        mut self,
        needle: impl Into<String>,
        effects: impl IntoIterator<Item = Effect>,
    ) -> Self {
        self.script_rules
            .push((needle.into(), effects.into_iter().collect()));
        self
    }

    /// Unforced clicks on `target` fail while `blocker` is visible
    #[must_use]
    pub fn occluded_by(mut self, target: impl Into<Selector>, blocker: impl Into<Selector>) -> Self {
        self.occlusions.push((target.into(), blocker.into()));
        self
    }

    /// Every navigation fails
    #[must_use]
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Pin the page clock, in the browser's own timezone
    #[must_use]
    pub fn with_local_time(mut self, at: DateTime<FixedOffset>) -> Self {
        self.local_time = Some(at);
        self
    }

    /// Date the page's `new Date()` reports
    fn today(&self) -> NaiveDate {
        self.local_time
            .map_or_else(|| Local::now().date_naive(), |at| at.date_naive())
    }
}

#[derive(Debug, Clone)]
struct MockElement {
    selector: Selector,
    visible: bool,
    appears_at: Option<Instant>,
}

impl MockElement {
    fn present(&self, now: Instant) -> bool {
        self.appears_at.map_or(true, |at| now >= at)
    }
}

#[derive(Debug)]
struct MockState {
    app: MockApp,
    url: String,
    loaded: bool,
    closed: bool,
    storage: BTreeMap<String, String>,
    init_entries: Vec<StorageEntry>,
    elements: Vec<MockElement>,
    console: Vec<ConsoleMessage>,
    clicks: Vec<Selector>,
    calls: Vec<String>,
    options: ContextOptions,
}

impl MockState {
    fn load_document(&mut self) {
        self.loaded = true;
        for (key, value) in self.init_entries.clone() {
            self.put(&key, &value);
        }
        self.elements.clear();
        let today = self.app.today();
        let rules = self.app.load_rules.clone();
        for rule in rules {
            if rule.condition.holds(&self.storage, today) {
                self.apply(&rule.effects);
            }
        }
    }

    fn apply(&mut self, effects: &[Effect]) {
        for effect in effects {
            match effect {
                Effect::Show(selector) => self.upsert(selector, true, None),
                Effect::ShowAfter(selector, delay) => {
                    self.upsert(selector, true, Some(Instant::now() + *delay));
                }
                Effect::ShowHidden(selector) => self.upsert(selector, false, None),
                Effect::Hide(selector) => {
                    for el in self.elements.iter_mut().filter(|el| &el.selector == selector) {
                        el.visible = false;
                    }
                }
                Effect::Remove(selector) => self.elements.retain(|el| &el.selector != selector),
                Effect::Log(message) => self.console.push(message.clone()),
                Effect::SetStorage(key, value) => {
                    self.storage.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// `localStorage.setItem` as the seeding script performs it
    fn put(&mut self, key: &str, value: &str) {
        let today = self.app.today();
        self.storage
            .insert(expand_today(key, today), expand_today(value, today));
    }

    fn upsert(&mut self, selector: &Selector, visible: bool, appears_at: Option<Instant>) {
        if let Some(el) = self.elements.iter_mut().find(|el| &el.selector == selector) {
            el.visible = visible;
            el.appears_at = appears_at;
        } else {
            self.elements.push(MockElement {
                selector: selector.clone(),
                visible,
                appears_at,
            });
        }
    }

    fn element(&self, selector: &Selector) -> Option<&MockElement> {
        let now = Instant::now();
        self.elements
            .iter()
            .find(|el| &el.selector == selector && el.present(now))
    }

    fn is_visible(&self, selector: &Selector) -> bool {
        self.element(selector).is_some_and(|el| el.visible)
    }

    fn ensure_open(&self) -> WaypointResult<()> {
        if self.closed {
            return Err(WaypointError::Context {
                message: "page has been closed".to_string(),
            });
        }
        Ok(())
    }
}

/// A page rendering a [`MockApp`]
#[derive(Debug, Clone)]
pub struct MockPage {
    state: Arc<Mutex<MockState>>,
}

impl MockPage {
    /// Create a blank page for `app`
    #[must_use]
    pub fn new(app: MockApp) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                app,
                url: String::from("about:blank"),
                loaded: false,
                closed: false,
                storage: BTreeMap::new(),
                init_entries: Vec::new(),
                elements: Vec::new(),
                console: Vec::new(),
                clicks: Vec::new(),
                calls: Vec::new(),
                options: ContextOptions::default(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read a storage value
    #[must_use]
    pub fn storage(&self, key: &str) -> Option<String> {
        self.state().storage.get(key).cloned()
    }

    /// Selectors of every successful click, in order
    #[must_use]
    pub fn clicks(&self) -> Vec<Selector> {
        self.state().clicks.clone()
    }

    /// Every driver call, in order (`goto:<url>`, `click:<selector>`, ...)
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Whether the rendered element is currently visible
    #[must_use]
    pub fn element_visible(&self, selector: &Selector) -> bool {
        self.state().is_visible(selector)
    }

    /// Emulation settings of the owning context
    #[must_use]
    pub fn options(&self) -> ContextOptions {
        self.state().options.clone()
    }

    /// Whether the owning context has been torn down
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn mark_closed(&self) {
        self.state().closed = true;
    }
}

#[async_trait]
impl PageDriver for MockPage {
    async fn goto(&self, url: &str) -> WaypointResult<()> {
        let mut state = self.state();
        state.ensure_open()?;
        state.calls.push(format!("goto:{url}"));
        if state.app.unreachable {
            state.loaded = false;
            return Err(WaypointError::navigation(url, "net::ERR_CONNECTION_REFUSED"));
        }
        state.url = url.to_string();
        state.load_document();
        Ok(())
    }

    async fn reload(&self) -> WaypointResult<()> {
        let mut state = self.state();
        state.ensure_open()?;
        state.calls.push("reload".to_string());
        if !state.loaded {
            let url = state.url.clone();
            return Err(WaypointError::navigation(url, "no document to reload"));
        }
        state.load_document();
        Ok(())
    }

    async fn current_url(&self) -> WaypointResult<String> {
        Ok(self.state().url.clone())
    }

    async fn write_storage(&self, entries: &[StorageEntry]) -> WaypointResult<()> {
        let mut state = self.state();
        state.ensure_open()?;
        state.calls.push("write_storage".to_string());
        if !state.loaded {
            return Err(WaypointError::seed_write(
                "localStorage is unavailable: no active document",
            ));
        }
        for (key, value) in entries {
            state.put(key, value);
        }
        Ok(())
    }

    async fn write_storage_on_new_document(&self, entries: &[StorageEntry]) -> WaypointResult<()> {
        let mut state = self.state();
        state.ensure_open()?;
        state.calls.push("write_storage_on_new_document".to_string());
        state.init_entries.extend(entries.iter().cloned());
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> WaypointResult<serde_json::Value> {
        let mut state = self.state();
        state.ensure_open()?;
        state.calls.push("evaluate".to_string());
        let matched: Vec<Vec<Effect>> = state
            .app
            .script_rules
            .iter()
            .filter(|(needle, _)| script.contains(needle.as_str()))
            .map(|(_, effects)| effects.clone())
            .collect();
        if matched.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        for effects in matched {
            state.apply(&effects);
        }
        Ok(serde_json::Value::Bool(true))
    }

    async fn is_visible(&self, selector: &Selector) -> WaypointResult<bool> {
        let state = self.state();
        state.ensure_open()?;
        Ok(state.is_visible(selector))
    }

    async fn count(&self, selector: &Selector) -> WaypointResult<usize> {
        let mut state = self.state();
        state.ensure_open()?;
        state.calls.push(format!("count:{selector}"));
        Ok(usize::from(state.element(selector).is_some()))
    }

    async fn click(&self, selector: &Selector, force: bool) -> WaypointResult<()> {
        let mut state = self.state();
        state.ensure_open()?;
        state.calls.push(format!("click:{selector}"));
        let label = format!("click {selector}");
        let Some(element) = state.element(selector) else {
            return Err(WaypointError::action(label, "no element matches"));
        };
        if !force {
            if !element.visible {
                return Err(WaypointError::action(label, "no matching element is visible"));
            }
            let obscured = state
                .app
                .occlusions
                .iter()
                .any(|(target, blocker)| target == selector && state.is_visible(blocker));
            if obscured {
                return Err(WaypointError::action(
                    label,
                    "element is covered by another element",
                ));
            }
        }
        let effects: Vec<Effect> = state
            .app
            .click_rules
            .iter()
            .filter(|(target, _)| target == selector)
            .flat_map(|(_, effects)| effects.iter().cloned())
            .collect();
        state.apply(&effects);
        state.clicks.push(selector.clone());
        Ok(())
    }

    async fn scroll_into_view(&self, selector: &Selector) -> WaypointResult<()> {
        let mut state = self.state();
        state.ensure_open()?;
        state.calls.push(format!("scroll:{selector}"));
        if state.element(selector).is_none() {
            return Err(WaypointError::action(
                format!("scroll {selector}"),
                "no element matches",
            ));
        }
        Ok(())
    }

    async fn screenshot(&self) -> WaypointResult<Vec<u8>> {
        let mut state = self.state();
        if state.closed {
            return Err(WaypointError::Screenshot {
                message: "page has been closed".to_string(),
            });
        }
        state.calls.push("screenshot".to_string());
        Ok(state.app.screenshot.clone())
    }

    async fn console_messages(&self) -> Vec<ConsoleMessage> {
        self.state().console.clone()
    }
}

/// Context factory handing out one fresh [`MockPage`] per run
#[derive(Debug)]
pub struct MockBrowser {
    app: MockApp,
    pages: Mutex<Vec<MockPage>>,
    closed: AtomicUsize,
}

impl MockBrowser {
    /// Create a factory rendering `app`
    #[must_use]
    pub fn new(app: MockApp) -> Self {
        Self {
            app,
            pages: Mutex::new(Vec::new()),
            closed: AtomicUsize::new(0),
        }
    }

    /// Every page opened so far, in order
    #[must_use]
    pub fn pages(&self) -> Vec<MockPage> {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of contexts opened
    #[must_use]
    pub fn opened(&self) -> usize {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of contexts torn down
    #[must_use]
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextFactory for MockBrowser {
    type Page = MockPage;

    async fn open(&self, options: &ContextOptions) -> WaypointResult<MockPage> {
        let page = MockPage::new(self.app.clone());
        page.state().options = options.clone();
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(page.clone());
        Ok(page)
    }

    async fn close(&self, page: MockPage) -> WaypointResult<()> {
        page.mark_closed();
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn study_app() -> MockApp {
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

    #[tokio::test]
    async fn test_load_rules_follow_storage() {
        let page = MockPage::new(study_app());
        page.goto("http://localhost:5000").await.unwrap();
        assert!(page.element_visible(&Selector::text("Sign In")));

        page.write_storage(&[("nst_current_user".into(), "{}".into())])
            .await
            .unwrap();
        page.reload().await.unwrap();
        assert!(page.element_visible(&Selector::text("Study Time")));
        assert!(!page.element_visible(&Selector::text("Sign In")));
    }

    #[tokio::test]
    async fn test_write_storage_requires_document() {
        let page = MockPage::new(study_app());
        let err = page
            .write_storage(&[("k".into(), "v".into())])
            .await
            .unwrap_err();
        assert!(matches!(err, WaypointError::SeedWrite { .. }));
    }

    #[tokio::test]
    async fn test_init_entries_apply_before_load_rules() {
        let page = MockPage::new(study_app());
        page.write_storage_on_new_document(&[("nst_current_user".into(), "{}".into())])
            .await
            .unwrap();
        page.goto("http://localhost:5000").await.unwrap();
        assert!(page.element_visible(&Selector::text("Study Time")));
    }

    #[tokio::test]
    async fn test_today_marker_uses_page_timezone() {
        use crate::seed::TODAY;
        // 23:30 UTC on the 18th is already the 19th at UTC+2
        let local = DateTime::parse_from_rfc3339("2026-10-19T01:30:00+02:00").unwrap();
        let app = MockApp::new()
            .with_local_time(local)
            .on_load(
                Condition::NotSeenToday("nst_last_daily_challenge_date".into()),
                [Effect::show(Selector::text("Daily Challenge"))],
            );
        let page = MockPage::new(app);
        page.write_storage_on_new_document(&[
            ("nst_last_daily_challenge_date".into(), TODAY.into()),
            (format!("daily_challenge_gen_{TODAY}"), "true".into()),
        ])
        .await
        .unwrap();
        page.goto("http://x").await.unwrap();
        assert_eq!(
            page.storage("nst_last_daily_challenge_date").as_deref(),
            Some("Mon Oct 19 2026")
        );
        assert!(page.storage("daily_challenge_gen_Mon Oct 19 2026").is_some());
        assert!(!page.element_visible(&Selector::text("Daily Challenge")));
    }

    #[tokio::test]
    async fn test_stale_marker_shows_overlay() {
        let local = DateTime::parse_from_rfc3339("2026-10-19T01:30:00+02:00").unwrap();
        let app = MockApp::new().with_local_time(local).on_load(
            Condition::NotSeenToday("nst_last_daily_challenge_date".into()),
            [Effect::show(Selector::text("Daily Challenge"))],
        );
        let page = MockPage::new(app);
        page.write_storage_on_new_document(&[(
            "nst_last_daily_challenge_date".into(),
            "Sun Oct 18 2026".into(),
        )])
        .await
        .unwrap();
        page.goto("http://x").await.unwrap();
        assert!(page.element_visible(&Selector::text("Daily Challenge")));
    }

    #[tokio::test]
    async fn test_unreachable_navigation() {
        let page = MockPage::new(MockApp::new().unreachable());
        let err = page.goto("http://localhost:5000").await.unwrap_err();
        assert!(matches!(err, WaypointError::Navigation { .. }));
    }

    #[tokio::test]
    async fn test_occlusion_blocks_unforced_click_only() {
        let target = Selector::text("Enter Master Mode");
        let blocker = Selector::text("Daily Goal Tracker");
        let app = MockApp::new()
            .on_load(Condition::Always, [Effect::show(target.clone()), Effect::show(blocker.clone())])
            .occluded_by(target.clone(), blocker);
        let page = MockPage::new(app);
        page.goto("http://x").await.unwrap();

        let err = page.click(&target, false).await.unwrap_err();
        assert!(err.to_string().contains("covered"));
        page.click(&target, true).await.unwrap();
        assert_eq!(page.clicks(), vec![target]);
    }

    #[tokio::test]
    async fn test_hidden_element_needs_force() {
        let target = Selector::css("button.hidden");
        let app = MockApp::new().on_load(Condition::Always, [Effect::ShowHidden(target.clone())]);
        let page = MockPage::new(app);
        page.goto("http://x").await.unwrap();
        assert!(!page.is_visible(&target).await.unwrap());
        assert!(page.click(&target, false).await.is_err());
        assert!(page.click(&target, true).await.is_ok());
    }

    #[tokio::test]
    async fn test_delayed_element_absent_until_due() {
        let target = Selector::text("Late");
        let app = MockApp::new().on_load(
            Condition::Always,
            [Effect::ShowAfter(target.clone(), Duration::from_secs(60))],
        );
        let page = MockPage::new(app);
        page.goto("http://x").await.unwrap();
        assert_eq!(page.count(&target).await.unwrap(), 0);
        assert!(page.click(&target, true).await.is_err());
    }

    #[tokio::test]
    async fn test_script_rules() {
        let app = MockApp::new().on_script("AI Tools", [Effect::show(Selector::text("Notes Generator"))]);
        let page = MockPage::new(app);
        page.goto("http://x").await.unwrap();
        let hit = page
            .evaluate("buttons.find(b => b.innerText.includes('AI Tools'))")
            .await
            .unwrap();
        assert_eq!(hit, serde_json::Value::Bool(true));
        assert!(page.element_visible(&Selector::text("Notes Generator")));
        assert!(page.evaluate("1 + 1").await.unwrap().is_null());
    }

    #[tokio::test]
    async fn test_browser_tracks_contexts() {
        let browser = MockBrowser::new(MockApp::new());
        let page = browser.open(&ContextOptions::mobile()).await.unwrap();
        assert_eq!(browser.opened(), 1);
        assert_eq!(page.options(), ContextOptions::mobile());
        browser.close(page.clone()).await.unwrap();
        assert_eq!(browser.closed(), 1);
        assert!(page.is_closed());
        assert!(page.screenshot().await.is_err());
    }
}
