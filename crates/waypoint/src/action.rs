//! Interaction driver: the user-facing actions that move a page forward.
//!
//! Each [`Action`] performs exactly one primitive on the page. There is no
//! implicit waiting beyond what the primitive needs to locate its element;
//! milestones are confirmed separately by the condition waiter.

use crate::driver::PageDriver;
use crate::locator::{js_string, Selector};
use crate::result::{WaypointError, WaypointResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info};

/// A single interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Navigate to a URL; relative URLs resolve against the base URL
    Navigate {
        /// Absolute URL or path
        url: String,
    },
    /// Reload the current document
    Reload,
    /// Click an element
    Click {
        /// Element to click
        selector: Selector,
        /// Skip the visible/unobstructed precondition
        #[serde(default)]
        force: bool,
    },
    /// Scroll an element into view
    ScrollIntoView {
        /// Element to scroll to
        selector: Selector,
    },
    /// Invoke a function expression in the page with JSON arguments
    Evaluate {
        /// Function expression, e.g. `(label) => ...`
        script: String,
        /// Arguments; an array is spread, `null` passes none
        #[serde(default)]
        args: Value,
        /// Fail unless the function returns a truthy value
        #[serde(default)]
        require_truthy: bool,
    },
}

impl Action {
    /// Navigate to `url`
    #[must_use]
    pub fn navigate(url: impl Into<String>) -> Self {
        Self::Navigate { url: url.into() }
    }

    /// Actionability-checked click
    #[must_use]
    pub fn click(selector: impl Into<Selector>) -> Self {
        Self::Click {
            selector: selector.into(),
            force: false,
        }
    }

    /// Forced click
    #[must_use]
    pub fn force_click(selector: impl Into<Selector>) -> Self {
        Self::Click {
            selector: selector.into(),
            force: true,
        }
    }

    /// Scroll into view
    #[must_use]
    pub fn scroll_into_view(selector: impl Into<Selector>) -> Self {
        Self::ScrollIntoView {
            selector: selector.into(),
        }
    }

    /// Evaluate a function expression with `args`
    #[must_use]
    pub fn evaluate(script: impl Into<String>, args: Value) -> Self {
        Self::Evaluate {
            script: script.into(),
            args,
            require_truthy: false,
        }
    }

    /// Evaluate a function expression that must return a truthy value
    #[must_use]
    pub fn evaluate_checked(script: impl Into<String>, args: Value) -> Self {
        Self::Evaluate {
            script: script.into(),
            args,
            require_truthy: true,
        }
    }

    /// Script expression invoking an evaluate action's function
    #[must_use]
    pub fn invocation(script: &str, args: &Value) -> String {
        let args = match args {
            Value::Null => String::new(),
            Value::Array(items) => items
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            other => other.to_string(),
        };
        format!("({script})({args})")
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigate { url } => write!(f, "navigate {url}"),
            Self::Reload => f.write_str("reload"),
            Self::Click { selector, force } => {
                if *force {
                    write!(f, "force-click {selector}")
                } else {
                    write!(f, "click {selector}")
                }
            }
            Self::ScrollIntoView { selector } => write!(f, "scroll to {selector}"),
            Self::Evaluate { script, .. } => {
                let head: String = script.chars().take(40).collect();
                if head.len() < script.len() {
                    write!(f, "evaluate {head}...")
                } else {
                    write!(f, "evaluate {head}")
                }
            }
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Resolve `url` against `base` unless it is already absolute
#[must_use]
pub fn resolve_url(base: Option<&str>, url: &str) -> String {
    let absolute = ["http://", "https://", "about:", "file://", "data:"]
        .iter()
        .any(|scheme| url.starts_with(scheme));
    match base {
        Some(base) if !absolute => format!(
            "{}/{}",
            base.trim_end_matches('/'),
            url.trim_start_matches('/')
        ),
        _ => url.to_string(),
    }
}

/// Performs [`Action`]s against a page
#[derive(Debug, Clone, Default)]
pub struct InteractionDriver {
    base_url: Option<String>,
}

impl InteractionDriver {
    /// Driver resolving relative navigation against `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
        }
    }

    /// Base URL, if any
    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Perform one action, returning the script value for evaluations
    /// and `null` otherwise.
    ///
    /// # Errors
    ///
    /// Navigation failures surface as navigation errors; every other failure
    /// of the interaction itself is an action error.
    pub async fn act<P: PageDriver + ?Sized>(
        &self,
        page: &P,
        action: &Action,
    ) -> WaypointResult<Value> {
        info!(%action, "act");
        match action {
            Action::Navigate { url } => {
                let url = resolve_url(self.base_url(), url);
                page.goto(&url).await?;
                Ok(Value::Null)
            }
            Action::Reload => {
                page.reload().await?;
                Ok(Value::Null)
            }
            Action::Click { selector, force } => {
                page.click(selector, *force).await?;
                Ok(Value::Null)
            }
            Action::ScrollIntoView { selector } => {
                page.scroll_into_view(selector).await?;
                Ok(Value::Null)
            }
            Action::Evaluate {
                script,
                args,
                require_truthy,
            } => {
                let label = action.to_string();
                let value = page
                    .evaluate(&Action::invocation(script, args))
                    .await
                    .map_err(|e| match e {
                        WaypointError::Script { message } => WaypointError::action(&label, message),
                        other => other,
                    })?;
                debug!(%value, "evaluated");
                if *require_truthy && !truthy(&value) {
                    return Err(WaypointError::action(
                        label,
                        format!("script returned {value}"),
                    ));
                }
                Ok(value)
            }
        }
    }
}

/// Function expression clicking the first element of `css` whose text
/// contains the argument; returns whether one was clicked
#[must_use]
pub fn js_click_by_text(css: &str) -> String {
    format!(
        "(label) => {{ const el = Array.from(document.querySelectorAll({})) \
         .find(b => (b.innerText || b.textContent || '').includes(label)); \
         if (!el) return false; el.click(); return true; }}",
        js_string(css)
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mock::{Condition, Effect, MockApp, MockPage};
    use serde_json::json;

    mod url_tests {
        use super::*;

        #[test]
        fn test_resolve_relative() {
            assert_eq!(
                resolve_url(Some("http://localhost:5000/"), "/admin"),
                "http://localhost:5000/admin"
            );
            assert_eq!(
                resolve_url(Some("http://localhost:5000"), "dashboard"),
                "http://localhost:5000/dashboard"
            );
        }

        #[test]
        fn test_resolve_absolute_untouched() {
            assert_eq!(
                resolve_url(Some("http://localhost:5000"), "http://localhost:5173/"),
                "http://localhost:5173/"
            );
            assert_eq!(resolve_url(None, "/x"), "/x");
        }
    }

    mod action_tests {
        use super::*;

        #[test]
        fn test_invocation_spreads_array() {
            assert_eq!(
                Action::invocation("(a, b) => a + b", &json!([1, "x"])),
                "((a, b) => a + b)(1, \"x\")"
            );
            assert_eq!(Action::invocation("() => 1", &Value::Null), "(() => 1)()");
            assert_eq!(
                Action::invocation("(o) => o.k", &json!({"k": 2})),
                "((o) => o.k)({\"k\":2})"
            );
        }

        #[test]
        fn test_truthy() {
            assert!(!truthy(&Value::Null));
            assert!(!truthy(&json!(false)));
            assert!(!truthy(&json!(0)));
            assert!(!truthy(&json!("")));
            assert!(truthy(&json!("ok")));
            assert!(truthy(&json!([])));
        }

        #[test]
        fn test_serde_tagged() {
            let action: Action =
                serde_json::from_str(r#"{"action":"click","selector":"text=Explore","force":true}"#)
                    .unwrap();
            assert_eq!(action, Action::force_click(Selector::text("Explore")));
            let reload: Action = serde_json::from_str(r#"{"action":"reload"}"#).unwrap();
            assert_eq!(reload, Action::Reload);
        }

        #[test]
        fn test_display() {
            assert_eq!(
                Action::force_click("text=Enter Master Mode").to_string(),
                "force-click text=Enter Master Mode"
            );
            let long = Action::evaluate("x".repeat(60), Value::Null).to_string();
            assert!(long.ends_with("..."));
        }

        #[test]
        fn test_js_click_by_text() {
            let js = js_click_by_text(".fixed.bottom-0 button");
            assert!(js.contains("\".fixed.bottom-0 button\""));
            assert!(js.contains("includes(label)"));
        }
    }

    mod driver_tests {
        use super::*;

        fn app() -> MockApp {
            MockApp::new()
                .on_load(Condition::Always, [Effect::show(Selector::text("Admin"))])
                .on_click(
                    Selector::text("Admin"),
                    [Effect::show(Selector::text("Admin Console"))],
                )
        }

        #[tokio::test]
        async fn test_navigate_resolves_base() {
            let page = MockPage::new(app());
            let driver = InteractionDriver::new("http://localhost:5000");
            driver.act(&page, &Action::navigate("/admin")).await.unwrap();
            assert_eq!(page.current_url().await.unwrap(), "http://localhost:5000/admin");
        }

        #[tokio::test]
        async fn test_click_applies_effects() {
            let page = MockPage::new(app());
            let driver = InteractionDriver::default();
            driver.act(&page, &Action::navigate("http://x")).await.unwrap();
            driver.act(&page, &Action::click("text=Admin")).await.unwrap();
            assert!(page.element_visible(&Selector::text("Admin Console")));
        }

        #[tokio::test]
        async fn test_forced_click_on_missing_is_action_error() {
            let page = MockPage::new(app());
            let driver = InteractionDriver::default();
            driver.act(&page, &Action::navigate("http://x")).await.unwrap();
            let err = driver
                .act(&page, &Action::force_click("text=Nope"))
                .await
                .unwrap_err();
            assert!(err.is_action());
        }

        #[tokio::test]
        async fn test_scroll_missing_is_action_error() {
            let page = MockPage::new(app());
            let driver = InteractionDriver::default();
            driver.act(&page, &Action::navigate("http://x")).await.unwrap();
            let err = driver
                .act(&page, &Action::scroll_into_view("text=Nope"))
                .await
                .unwrap_err();
            assert!(err.is_action());
        }

        #[tokio::test]
        async fn test_checked_evaluate_rejects_falsy() {
            let page = MockPage::new(app());
            let driver = InteractionDriver::default();
            driver.act(&page, &Action::navigate("http://x")).await.unwrap();
            let err = driver
                .act(&page, &Action::evaluate_checked("() => false", Value::Null))
                .await
                .unwrap_err();
            assert!(err.is_action());
            let value = driver
                .act(&page, &Action::evaluate("() => 1", Value::Null))
                .await
                .unwrap();
            assert_eq!(value, Value::Null);
        }

        #[tokio::test]
        async fn test_navigate_unreachable() {
            let page = MockPage::new(MockApp::new().unreachable());
            let err = InteractionDriver::new("http://localhost:5000")
                .act(&page, &Action::navigate("/"))
                .await
                .unwrap_err();
            assert!(matches!(err, WaypointError::Navigation { .. }));
        }
    }
}
