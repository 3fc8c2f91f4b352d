//! PageDriver - the browser capability consumed by the engine
//!
//! Every engine component (seeder, dismisser, waiter, interaction driver,
//! capturer) talks to a live page only through [`PageDriver`]. Scenario runs
//! acquire and release an isolated page through [`ContextFactory`].
//!
//! # Implementations
//!
//! - `browser::Page` - Chromium over CDP via chromiumoxide (`browser` feature)
//! - [`crate::mock::MockPage`] - scripted in-process application for tests

use crate::locator::Selector;
use crate::result::WaypointResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A key/value pair destined for the page's persisted storage
pub type StorageEntry = (String, String);

/// Console output or uncaught page error observed on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    /// Level (`log`, `warning`, `error`, ... or `pageerror`)
    pub level: String,
    /// Rendered message text
    pub text: String,
}

impl ConsoleMessage {
    /// Create a new console message
    #[must_use]
    pub fn new(level: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            text: text.into(),
        }
    }

    /// Whether this is an error-level entry
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.level.as_str(), "error" | "pageerror")
    }
}

impl std::fmt::Display for ConsoleMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.level, self.text)
    }
}

/// Abstract page automation surface.
///
/// Methods take `&self`; implementations synchronise internally so a page
/// handle can be shared by reference between components of one run.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to URL, failing with a navigation error when unreachable
    async fn goto(&self, url: &str) -> WaypointResult<()>;

    /// Reload the current document
    async fn reload(&self) -> WaypointResult<()>;

    /// Current URL
    async fn current_url(&self) -> WaypointResult<String>;

    /// Write entries into persisted storage of the current document
    async fn write_storage(&self, entries: &[StorageEntry]) -> WaypointResult<()>;

    /// Register entries to be written before any page script on every new document
    async fn write_storage_on_new_document(&self, entries: &[StorageEntry]) -> WaypointResult<()>;

    /// Evaluate a script and return its JSON value (`null` when undefined)
    async fn evaluate(&self, script: &str) -> WaypointResult<serde_json::Value>;

    /// Whether any element matching `selector` is visible.
    ///
    /// A missing element is reported as not visible, never as an error.
    async fn is_visible(&self, selector: &Selector) -> WaypointResult<bool>;

    /// Number of elements matching `selector`
    async fn count(&self, selector: &Selector) -> WaypointResult<usize>;

    /// Click the element matching `selector`.
    ///
    /// `force` skips the visible/unobstructed precondition; existence is
    /// always required and a missing element is an action error.
    async fn click(&self, selector: &Selector, force: bool) -> WaypointResult<()>;

    /// Scroll the element matching `selector` into view
    async fn scroll_into_view(&self, selector: &Selector) -> WaypointResult<()>;

    /// Full-page PNG screenshot
    async fn screenshot(&self) -> WaypointResult<Vec<u8>>;

    /// Console messages and page errors observed so far
    async fn console_messages(&self) -> Vec<ConsoleMessage>;
}

/// Browser viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    /// Width in CSS pixels
    pub width: u32,
    /// Height in CSS pixels
    pub height: u32,
}

impl Viewport {
    /// Desktop viewport (1280x720)
    pub const DESKTOP: Self = Self::new(1280, 720);

    /// Phone viewport (375x812)
    pub const MOBILE: Self = Self::new(375, 812);

    /// Create a viewport
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::DESKTOP
    }
}

/// User agent of a mobile Safari, for phone-layout runs
pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 14_0 like Mac OS X) \
AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0 Mobile/15E148 Safari/604.1";

/// Per-context emulation settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextOptions {
    /// Viewport override
    #[serde(default)]
    pub viewport: Option<Viewport>,
    /// User agent override
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl ContextOptions {
    /// Phone viewport with a mobile user agent
    #[must_use]
    pub fn mobile() -> Self {
        Self {
            viewport: Some(Viewport::MOBILE),
            user_agent: Some(MOBILE_USER_AGENT.to_string()),
        }
    }

    /// Set viewport
    #[must_use]
    pub const fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = Some(viewport);
        self
    }
}

/// Source of isolated pages, one per scenario run.
///
/// Each page returned by [`ContextFactory::open`] owns its own storage and
/// cookies; [`ContextFactory::close`] releases it.
#[async_trait]
pub trait ContextFactory: Send + Sync {
    /// Page type produced by this factory
    type Page: PageDriver;

    /// Create a fresh isolated context and a page inside it
    async fn open(&self, options: &ContextOptions) -> WaypointResult<Self::Page>;

    /// Tear down the context owning `page`
    async fn close(&self, page: Self::Page) -> WaypointResult<()>;
}
