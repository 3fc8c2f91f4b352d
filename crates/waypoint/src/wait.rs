//! Condition waiting: block until a UI milestone becomes visible.
//!
//! The waiter polls [`PageDriver::is_visible`] at a fixed interval inside a
//! single deadline. Detection failures during polling (for example a probe
//! racing a navigation) count as "not yet visible"; only the deadline ends
//! the wait unsuccessfully.

use crate::driver::PageDriver;
use crate::locator::Selector;
use crate::result::{WaypointError, WaypointResult};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for milestone waits (10 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Shortest polling interval; anything below it is raised to it
pub const MIN_POLL_INTERVAL_MS: u64 = 5;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(MIN_POLL_INTERVAL_MS);

// =============================================================================
// WAIT TARGET
// =============================================================================

/// A selector plus the bounded time allowed for it to appear
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitTarget {
    /// Element to wait for
    pub selector: Selector,
    /// Maximum wait
    #[serde(with = "millis")]
    pub timeout: Duration,
    /// Delay between visibility probes
    #[serde(with = "millis", default = "default_poll")]
    pub poll_interval: Duration,
}

const fn default_poll() -> Duration {
    Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)
}

impl WaitTarget {
    /// Wait for `selector` with the default timeout
    #[must_use]
    pub fn new(selector: impl Into<Selector>) -> Self {
        Self {
            selector: selector.into(),
            timeout: Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS),
            poll_interval: default_poll(),
        }
    }

    /// Set timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set polling interval, never below [`MIN_POLL_INTERVAL_MS`]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Interval actually slept between probes
    #[must_use]
    pub fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.max(MIN_POLL_INTERVAL)
    }

    /// Timeout in whole milliseconds
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Serialize durations as integer milliseconds
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

// =============================================================================
// WAIT RESULT
// =============================================================================

/// Outcome of a successful wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitResult {
    /// Time until the element was seen
    pub elapsed: Duration,
    /// Number of visibility probes issued
    pub polls: u32,
}

// =============================================================================
// WAITER
// =============================================================================

/// Polls a page until a [`WaitTarget`] is visible
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionWaiter;

impl ConditionWaiter {
    /// Create a waiter
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Block until `target` is visible or its timeout elapses.
    ///
    /// # Errors
    ///
    /// [`WaypointError::WaitTimeout`] when the element is not visible in time.
    pub async fn wait_for_visible<P: PageDriver + ?Sized>(
        &self,
        page: &P,
        target: &WaitTarget,
    ) -> WaypointResult<WaitResult> {
        let start = Instant::now();
        let interval = target.effective_poll_interval();
        let mut polls = 0u32;
        let poll = async {
            loop {
                polls += 1;
                match page.is_visible(&target.selector).await {
                    Ok(true) => break,
                    Ok(false) => trace!(selector = %target.selector, "not visible yet"),
                    Err(e) => trace!(selector = %target.selector, error = %e, "visibility probe failed"),
                }
                tokio::time::sleep(interval).await;
            }
        };
        if tokio::time::timeout(target.timeout, poll).await.is_err() {
            // Missing and hidden both fail the wait; the count only tells them apart in the log
            match page.count(&target.selector).await {
                Ok(0) => warn!(selector = %target.selector, timeout_ms = target.timeout_ms(), "wait timed out: no matching element"),
                Ok(n) => warn!(selector = %target.selector, timeout_ms = target.timeout_ms(), matches = n, "wait timed out: matches present but none visible"),
                Err(e) => debug!(selector = %target.selector, error = %e, "wait timed out; element count unavailable"),
            }
            return Err(WaypointError::WaitTimeout {
                target: target.selector.to_string(),
                timeout_ms: target.timeout_ms(),
            });
        }
        let elapsed = start.elapsed();
        debug!(selector = %target.selector, ?elapsed, polls, "milestone visible");
        Ok(WaitResult { elapsed, polls })
    }
}
