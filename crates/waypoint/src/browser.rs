//! Browser control over the Chrome `DevTools` Protocol.
//!
//! With the `browser` feature this module drives a real Chromium through
//! chromiumoxide: one browser process per run, one isolated browser context
//! per scenario. Without the feature, [`Browser::launch`] reports that no
//! browser backend is compiled in.

use crate::driver::Viewport;
use std::time::Duration;

/// Default navigation timeout (30 seconds)
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;

/// Browser configuration
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run in headless mode
    pub headless: bool,
    /// Viewport used when a scenario does not set one
    pub viewport: Viewport,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
    /// User agent used when a scenario does not set one
    pub user_agent: Option<String>,
    /// Upper bound on a single navigation
    pub navigation_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::DESKTOP,
            chromium_path: None,
            sandbox: true,
            user_agent: None,
            navigation_timeout: Duration::from_millis(DEFAULT_NAVIGATION_TIMEOUT_MS),
        }
    }
}

impl BrowserConfig {
    /// Set viewport dimensions
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = Viewport::new(width, height);
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Set user agent
    #[must_use]
    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }

    /// Set navigation timeout
    #[must_use]
    pub const fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }
}

// ============================================================================
// Real CDP Implementation (when `browser` feature is enabled)
// ============================================================================

#[cfg(feature = "browser")]
#[allow(clippy::significant_drop_tightening, clippy::missing_errors_doc)]
mod cdp {
    use super::BrowserConfig;
    use crate::driver::{ConsoleMessage, ContextFactory, ContextOptions, PageDriver, StorageEntry};
    use crate::locator::{ClickOutcome, Selector};
    use crate::result::{WaypointError, WaypointResult};
    use crate::seed::storage_script;
    use async_trait::async_trait;
    use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
    use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
    use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
    use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
    use chromiumoxide::cdp::browser_protocol::page::{
        AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat,
    };
    use chromiumoxide::cdp::browser_protocol::target::{
        CreateBrowserContextParams, CreateTargetParams,
    };
    use chromiumoxide::cdp::js_protocol::runtime::{
        EventConsoleApiCalled, EventExceptionThrown, RemoteObject,
    };
    use chromiumoxide::page::{Page as CdpPage, ScreenshotParams};
    use futures::StreamExt;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;
    use tokio::task::JoinHandle;
    use tracing::{debug, info, warn};

    fn context_error(e: impl std::fmt::Display) -> WaypointError {
        WaypointError::Context {
            message: e.to_string(),
        }
    }

    fn script_error(e: impl std::fmt::Display) -> WaypointError {
        WaypointError::Script {
            message: e.to_string(),
        }
    }

    /// Log how the Chromium process ended; true on a clean exit
    pub(super) fn log_exit(result: std::io::Result<Option<std::process::ExitStatus>>) -> bool {
        match result {
            Ok(Some(status)) if status.success() => {
                debug!(%status, "chromium exited");
                true
            }
            Ok(Some(status)) => {
                warn!(%status, "chromium exited abnormally");
                false
            }
            Ok(None) => {
                debug!("no chromium child process to wait for");
                true
            }
            Err(e) => {
                warn!(error = %e, "waiting for chromium to exit failed");
                false
            }
        }
    }

    /// Browser instance with real CDP connection
    #[derive(Debug)]
    pub struct Browser {
        config: BrowserConfig,
        inner: Mutex<CdpBrowser>,
        handle: JoinHandle<()>,
    }

    impl Browser {
        /// Launch a new browser instance
        ///
        /// # Errors
        ///
        /// Returns error if browser cannot be launched
        pub async fn launch(config: BrowserConfig) -> WaypointResult<Self> {
            let mut builder = CdpConfig::builder().window_size(
                config.viewport.width,
                config.viewport.height,
            );

            if !config.headless {
                builder = builder.with_head();
            }

            if !config.sandbox {
                builder = builder.no_sandbox();
            }

            if let Some(ref path) = config.chromium_path {
                builder = builder.chrome_executable(path);
            }

            let cdp_config = builder
                .build()
                .map_err(|e| WaypointError::BrowserLaunch { message: e })?;

            let (browser, mut handler) = CdpBrowser::launch(cdp_config).await.map_err(|e| {
                WaypointError::BrowserLaunch {
                    message: e.to_string(),
                }
            })?;

            // Spawn handler task
            let handle = tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            info!(headless = config.headless, "browser launched");
            Ok(Self {
                config,
                inner: Mutex::new(browser),
                handle,
            })
        }

        /// Get the browser configuration
        #[must_use]
        pub const fn config(&self) -> &BrowserConfig {
            &self.config
        }

        /// Close the browser process
        pub async fn shutdown(self) -> WaypointResult<()> {
            let mut browser = self.inner.lock().await;
            browser
                .close()
                .await
                .map_err(|e| WaypointError::BrowserLaunch {
                    message: e.to_string(),
                })?;
            log_exit(browser.wait().await);
            self.handle.abort();
            debug!("browser closed");
            Ok(())
        }

        async fn emulate(&self, page: &CdpPage, options: &ContextOptions) -> WaypointResult<()> {
            let viewport = options.viewport.unwrap_or(self.config.viewport);
            page.execute(SetDeviceMetricsOverrideParams::new(
                i64::from(viewport.width),
                i64::from(viewport.height),
                1.0,
                false,
            ))
            .await
            .map_err(context_error)?;
            if let Some(ua) = options.user_agent.as_ref().or(self.config.user_agent.as_ref()) {
                page.execute(SetUserAgentOverrideParams::new(ua.clone()))
                    .await
                    .map_err(context_error)?;
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ContextFactory for Browser {
        type Page = Page;

        async fn open(&self, options: &ContextOptions) -> WaypointResult<Page> {
            let (context_id, cdp_page) = {
                let mut browser = self.inner.lock().await;
                let context_id = browser
                    .create_browser_context(CreateBrowserContextParams::default())
                    .await
                    .map_err(context_error)?;
                let params = CreateTargetParams::builder()
                    .url("about:blank")
                    .browser_context_id(context_id.clone())
                    .build()
                    .map_err(context_error)?;
                let cdp_page = browser.new_page(params).await.map_err(context_error)?;
                (context_id, cdp_page)
            };

            self.emulate(&cdp_page, options).await?;
            let console = Arc::new(Mutex::new(Vec::new()));
            let listeners = listen_console(&cdp_page, &console).await?;
            debug!(context = ?context_id, "opened isolated context");

            Ok(Page {
                inner: cdp_page,
                context_id,
                console,
                listeners,
                navigation_timeout: self.config.navigation_timeout,
            })
        }

        async fn close(&self, page: Page) -> WaypointResult<()> {
            for listener in &page.listeners {
                listener.abort();
            }
            if let Err(e) = page.inner.close().await {
                warn!(error = %e, "page close failed");
            }
            let browser = self.inner.lock().await;
            browser
                .dispose_browser_context(page.context_id.clone())
                .await
                .map_err(context_error)?;
            debug!(context = ?page.context_id, "disposed isolated context");
            Ok(())
        }
    }

    fn render_arg(arg: &RemoteObject) -> String {
        match &arg.value {
            Some(Value::String(s)) => s.clone(),
            Some(v) => v.to_string(),
            None => arg.description.clone().unwrap_or_default(),
        }
    }

    async fn listen_console(
        page: &CdpPage,
        console: &Arc<Mutex<Vec<ConsoleMessage>>>,
    ) -> WaypointResult<Vec<JoinHandle<()>>> {
        let mut calls = page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(context_error)?;
        let mut exceptions = page
            .event_listener::<EventExceptionThrown>()
            .await
            .map_err(context_error)?;

        let buf = Arc::clone(console);
        let on_call = tokio::spawn(async move {
            while let Some(evt) = calls.next().await {
                let text: Vec<String> = evt.args.iter().map(render_arg).collect();
                let level = format!("{:?}", evt.r#type).to_lowercase();
                buf.lock().await.push(ConsoleMessage::new(level, text.join(" ")));
            }
        });

        let buf = Arc::clone(console);
        let on_exception = tokio::spawn(async move {
            while let Some(evt) = exceptions.next().await {
                let details = &evt.exception_details;
                let text = details
                    .exception
                    .as_ref()
                    .and_then(|e| e.description.clone())
                    .unwrap_or_else(|| details.text.clone());
                buf.lock().await.push(ConsoleMessage::new("pageerror", text));
            }
        });

        Ok(vec![on_call, on_exception])
    }

    /// A page inside its own browser context
    #[derive(Debug)]
    pub struct Page {
        inner: CdpPage,
        context_id: BrowserContextId,
        console: Arc<Mutex<Vec<ConsoleMessage>>>,
        listeners: Vec<JoinHandle<()>>,
        navigation_timeout: Duration,
    }

    #[async_trait]
    impl PageDriver for Page {
        async fn goto(&self, url: &str) -> WaypointResult<()> {
            debug!(url, "navigating");
            match tokio::time::timeout(self.navigation_timeout, self.inner.goto(url)).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(WaypointError::navigation(url, e.to_string())),
                Err(_) => Err(WaypointError::navigation(
                    url,
                    format!("no load within {}ms", self.navigation_timeout.as_millis()),
                )),
            }
        }

        async fn reload(&self) -> WaypointResult<()> {
            let url = self.current_url().await.unwrap_or_default();
            match tokio::time::timeout(self.navigation_timeout, self.inner.reload()).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(WaypointError::navigation(url, e.to_string())),
                Err(_) => Err(WaypointError::navigation(url, "reload timed out")),
            }
        }

        async fn current_url(&self) -> WaypointResult<String> {
            let url = self.inner.url().await.map_err(script_error)?;
            Ok(url.unwrap_or_default())
        }

        async fn write_storage(&self, entries: &[StorageEntry]) -> WaypointResult<()> {
            self.inner
                .evaluate(storage_script(entries))
                .await
                .map_err(|e| WaypointError::seed_write(e.to_string()))?;
            Ok(())
        }

        async fn write_storage_on_new_document(
            &self,
            entries: &[StorageEntry],
        ) -> WaypointResult<()> {
            self.inner
                .execute(AddScriptToEvaluateOnNewDocumentParams::new(storage_script(
                    entries,
                )))
                .await
                .map_err(|e| WaypointError::seed_write(e.to_string()))?;
            Ok(())
        }

        async fn evaluate(&self, script: &str) -> WaypointResult<Value> {
            let result = self.inner.evaluate(script).await.map_err(script_error)?;
            Ok(result.value().cloned().unwrap_or(Value::Null))
        }

        async fn is_visible(&self, selector: &Selector) -> WaypointResult<bool> {
            let value = self.evaluate(&selector.visibility_script()).await?;
            Ok(value.as_bool().unwrap_or(false))
        }

        async fn count(&self, selector: &Selector) -> WaypointResult<usize> {
            let value = self.evaluate(&selector.count_script()).await?;
            Ok(value
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(0))
        }

        async fn click(&self, selector: &Selector, force: bool) -> WaypointResult<()> {
            let label = format!("click {selector}");
            let value = self
                .evaluate(&selector.click_script(force))
                .await
                .map_err(|e| WaypointError::action(&label, e.to_string()))?;
            match value.as_str().and_then(ClickOutcome::from_tag) {
                Some(ClickOutcome::Clicked) => Ok(()),
                Some(outcome) => Err(WaypointError::action(label, outcome.reason())),
                None => Err(WaypointError::action(
                    label,
                    format!("unexpected click result {value}"),
                )),
            }
        }

        async fn scroll_into_view(&self, selector: &Selector) -> WaypointResult<()> {
            let label = format!("scroll {selector}");
            let value = self
                .evaluate(&selector.scroll_script())
                .await
                .map_err(|e| WaypointError::action(&label, e.to_string()))?;
            if value.as_bool() == Some(true) {
                Ok(())
            } else {
                Err(WaypointError::action(label, "no element matches"))
            }
        }

        async fn screenshot(&self) -> WaypointResult<Vec<u8>> {
            let params = ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .full_page(true)
                .build();
            self.inner
                .screenshot(params)
                .await
                .map_err(|e| WaypointError::Screenshot {
                    message: e.to_string(),
                })
        }

        async fn console_messages(&self) -> Vec<ConsoleMessage> {
            self.console.lock().await.clone()
        }
    }
}

// ============================================================================
// Stub (when `browser` feature is NOT enabled)
// ============================================================================

#[cfg(not(feature = "browser"))]
mod stub {
    use super::BrowserConfig;
    use crate::driver::{ContextFactory, ContextOptions};
    use crate::mock::MockPage;
    use crate::result::{WaypointError, WaypointResult};
    use async_trait::async_trait;

    /// Placeholder for the CDP browser; cannot be constructed
    #[derive(Debug)]
    pub enum Browser {}

    impl Browser {
        /// Always fails: no browser backend is compiled in
        ///
        /// # Errors
        ///
        /// Always returns [`WaypointError::BrowserLaunch`]
        #[allow(clippy::unused_async)]
        pub async fn launch(_config: BrowserConfig) -> WaypointResult<Self> {
            Err(WaypointError::BrowserLaunch {
                message: "Browser feature not enabled. Enable 'browser' feature for real CDP support."
                    .to_string(),
            })
        }

        /// Get the browser configuration
        #[must_use]
        pub const fn config(&self) -> &BrowserConfig {
            match *self {}
        }

        /// Close the browser process
        ///
        /// # Errors
        ///
        /// Never returns
        #[allow(clippy::unused_async)]
        pub async fn shutdown(self) -> WaypointResult<()> {
            match self {}
        }
    }

    #[async_trait]
    impl ContextFactory for Browser {
        type Page = MockPage;

        async fn open(&self, _options: &ContextOptions) -> WaypointResult<MockPage> {
            match *self {}
        }

        async fn close(&self, _page: MockPage) -> WaypointResult<()> {
            match *self {}
        }
    }
}

// Re-export based on feature
#[cfg(feature = "browser")]
pub use cdp::{Browser, Page};

#[cfg(not(feature = "browser"))]
pub use stub::Browser;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    #[cfg(not(feature = "browser"))]
    use crate::result::WaypointError;

    #[test]
    fn test_default_config() {
        let config = BrowserConfig::default();
        assert!(config.headless);
        assert!(config.sandbox);
        assert_eq!(config.viewport, Viewport::DESKTOP);
        assert_eq!(config.navigation_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builder() {
        let config = BrowserConfig::default()
            .with_viewport(375, 812)
            .with_headless(false)
            .with_no_sandbox()
            .with_chromium_path("/usr/bin/chromium")
            .with_user_agent("waypoint")
            .with_navigation_timeout(Duration::from_secs(5));
        assert_eq!(config.viewport, Viewport::MOBILE);
        assert!(!config.headless);
        assert!(!config.sandbox);
        assert_eq!(config.chromium_path.as_deref(), Some("/usr/bin/chromium"));
        assert_eq!(config.user_agent.as_deref(), Some("waypoint"));
        assert_eq!(config.navigation_timeout, Duration::from_secs(5));
    }

    #[cfg(feature = "browser")]
    #[test]
    fn test_exit_result_logged() {
        assert!(cdp::log_exit(Ok(None)));
        assert!(!cdp::log_exit(Err(std::io::Error::other("child reaped elsewhere"))));
    }

    #[cfg(not(feature = "browser"))]
    #[tokio::test]
    async fn test_launch_without_feature_fails() {
        let err = Browser::launch(BrowserConfig::default()).await.unwrap_err();
        assert!(matches!(err, WaypointError::BrowserLaunch { .. }));
    }
}
