//! Selector language and the page scripts compiled from it.
//!
//! A [`Selector`] is a single concrete detection rule: either structural (CSS,
//! XPath) or textual. Selectors print and parse in the Playwright-style string
//! form used by playbooks (`text=Study Time`, `text="Explore"`,
//! `button >> text=Skip`, `xpath=//h2`), and every selector compiles to a
//! JavaScript expression yielding the list of matching elements. Visibility,
//! click, scroll and count probes are built on that list.
//!
//! # Visibility
//!
//! An element is visible when it is attached, has a non-empty bounding box and
//! its computed style is not `display: none`, `visibility: hidden` or
//! `opacity: 0`. A selector is visible when *any* match is visible; a missing
//! element and a hidden one are indistinguishable to callers.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Default timeout for single-element probes (5 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

const VISIBLE_FN: &str = "const visible = (el) => { \
if (!el || !el.isConnected) return false; \
const style = window.getComputedStyle(el); \
if (style.display === 'none' || style.visibility === 'hidden' || Number(style.opacity) === 0) return false; \
const rect = el.getBoundingClientRect(); \
return rect.width > 0 && rect.height > 0; };";

/// Selector type for locating elements
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Selector {
    /// CSS selector (e.g., "button.primary")
    Css(String),
    /// Case-insensitive substring match on the innermost element containing the text
    Text(String),
    /// Trimmed text equality on the innermost element
    ExactText(String),
    /// CSS selector filtered by contained text (`button:has-text('Skip')`)
    CssWithText {
        /// Base CSS selector
        css: String,
        /// Text content to match
        text: String,
    },
    /// XPath selector
    XPath(String),
}

impl Selector {
    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create a text selector
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create an exact text selector
    #[must_use]
    pub fn exact_text(text: impl Into<String>) -> Self {
        Self::ExactText(text.into())
    }

    /// Create a CSS selector filtered by text
    #[must_use]
    pub fn css_with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self::CssWithText {
            css: css.into(),
            text: text.into(),
        }
    }

    /// Create an XPath selector
    #[must_use]
    pub fn xpath(path: impl Into<String>) -> Self {
        Self::XPath(path.into())
    }

    /// Parse the Playwright-style string form. Anything unprefixed is CSS.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if let Some(rest) = input.strip_prefix("text=") {
            return text_selector(rest);
        }
        if let Some(rest) = input.strip_prefix("xpath=") {
            return Self::XPath(rest.to_string());
        }
        if input.starts_with("//") {
            return Self::XPath(input.to_string());
        }
        if let Some(rest) = input.strip_prefix("css=") {
            return Self::Css(rest.to_string());
        }
        if let Some((css, text)) = input.split_once(" >> text=") {
            return Self::CssWithText {
                css: css.trim().to_string(),
                text: unquote(text).to_string(),
            };
        }
        if let Some((css, rest)) = input.split_once(":has-text(") {
            if let Some(text) = rest.strip_suffix(')') {
                return Self::CssWithText {
                    css: css.to_string(),
                    text: unquote(text).to_string(),
                };
            }
        }
        Self::Css(input.to_string())
    }

    /// JavaScript expression evaluating to an `Array` of matching elements
    #[must_use]
    pub fn to_match_all(&self) -> String {
        match self {
            Self::Css(s) => format!("Array.from(document.querySelectorAll({}))", js_string(s)),
            Self::XPath(s) => format!(
                "(() => {{ const r = document.evaluate({}, document, null, \
                 XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); const out = []; \
                 for (let i = 0; i < r.snapshotLength; i++) out.push(r.snapshotItem(i)); \
                 return out; }})()",
                js_string(s)
            ),
            Self::Text(t) => format!(
                "(() => {{ const needle = {}.toLowerCase(); \
                 const has = (el) => (el.textContent || '').toLowerCase().includes(needle); \
                 return Array.from(document.querySelectorAll('body *')) \
                 .filter(el => has(el) && !Array.from(el.children).some(has)); }})()",
                js_string(t)
            ),
            Self::ExactText(t) => format!(
                "(() => {{ const needle = {}; \
                 const has = (el) => (el.textContent || '').trim() === needle; \
                 return Array.from(document.querySelectorAll('body *')) \
                 .filter(el => has(el) && !Array.from(el.children).some(has)); }})()",
                js_string(t)
            ),
            Self::CssWithText { css, text } => format!(
                "(() => {{ const needle = {}.toLowerCase(); \
                 return Array.from(document.querySelectorAll({})) \
                 .filter(el => (el.textContent || '').toLowerCase().includes(needle)); }})()",
                js_string(text),
                js_string(css)
            ),
        }
    }

    /// Script returning `true` when any match is visible
    #[must_use]
    pub fn visibility_script(&self) -> String {
        format!(
            "(() => {{ {VISIBLE_FN} return ({}).some(visible); }})()",
            self.to_match_all()
        )
    }

    /// Script returning the number of matches
    #[must_use]
    pub fn count_script(&self) -> String {
        format!("({}).length", self.to_match_all())
    }

    /// Script clicking the first usable match, returning a [`ClickOutcome`] tag.
    ///
    /// Forced clicks only require the element to exist. Unforced clicks
    /// require a visible match whose center is not covered by another element.
    #[must_use]
    pub fn click_script(&self, force: bool) -> String {
        format!(
            "(() => {{ {VISIBLE_FN} \
             const fire = (el) => el.dispatchEvent(new MouseEvent('click', {{ bubbles: true, cancelable: true, view: window }})); \
             const els = {}; \
             if (els.length === 0) return 'missing'; \
             if ({force}) {{ fire(els.find(visible) || els[0]); return 'clicked'; }} \
             const el = els.find(visible); \
             if (!el) return 'hidden'; \
             el.scrollIntoView({{ block: 'center', inline: 'center' }}); \
             const r = el.getBoundingClientRect(); \
             const hit = document.elementFromPoint(r.left + r.width / 2, r.top + r.height / 2); \
             if (hit && hit !== el && !el.contains(hit)) return 'obscured'; \
             fire(el); return 'clicked'; }})()",
            self.to_match_all()
        )
    }

    /// Script scrolling the first match into view, returning whether one existed
    #[must_use]
    pub fn scroll_script(&self) -> String {
        format!(
            "(() => {{ {VISIBLE_FN} const els = {}; \
             if (els.length === 0) return false; \
             (els.find(visible) || els[0]).scrollIntoView({{ block: 'center', inline: 'nearest' }}); \
             return true; }})()",
            self.to_match_all()
        )
    }
}

fn text_selector(rest: &str) -> Selector {
    let quoted = rest.len() >= 2
        && ((rest.starts_with('"') && rest.ends_with('"'))
            || (rest.starts_with('\'') && rest.ends_with('\'')));
    if quoted {
        Selector::ExactText(rest[1..rest.len() - 1].to_string())
    } else {
        Selector::Text(rest.to_string())
    }
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Encode a string as a JavaScript string literal
#[must_use]
pub fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => {
                if matches!(Self::parse(s), Self::Css(ref parsed) if parsed == s) {
                    f.write_str(s)
                } else {
                    write!(f, "css={s}")
                }
            }
            Self::Text(t) => write!(f, "text={t}"),
            Self::ExactText(t) => write!(f, "text=\"{t}\""),
            Self::CssWithText { css, text } => write!(f, "{css} >> text={text}"),
            Self::XPath(p) => write!(f, "xpath={p}"),
        }
    }
}

impl FromStr for Selector {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<Selector> for String {
    fn from(selector: Selector) -> Self {
        selector.to_string()
    }
}

/// Result tag returned by [`Selector::click_script`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The click was dispatched
    Clicked,
    /// No element matched
    Missing,
    /// Elements matched but none was visible
    Hidden,
    /// The visible match was covered by another element
    Obscured,
}

impl ClickOutcome {
    /// Parse the tag returned by the click script
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "clicked" => Some(Self::Clicked),
            "missing" => Some(Self::Missing),
            "hidden" => Some(Self::Hidden),
            "obscured" => Some(Self::Obscured),
            _ => None,
        }
    }

    /// Human-readable reason for a failed click
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Clicked => "clicked",
            Self::Missing => "no element matches",
            Self::Hidden => "no matching element is visible",
            Self::Obscured => "element is covered by another element",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod parse_tests {
        use super::*;

        #[test]
        fn test_parse_text() {
            assert_eq!(
                Selector::parse("text=Study Time"),
                Selector::text("Study Time")
            );
        }

        #[test]
        fn test_parse_exact_text() {
            assert_eq!(
                Selector::parse("text=\"Explore\""),
                Selector::exact_text("Explore")
            );
            assert_eq!(
                Selector::parse("text='AI Tutor'"),
                Selector::exact_text("AI Tutor")
            );
        }

        #[test]
        fn test_parse_has_text() {
            assert_eq!(
                Selector::parse("button:has-text('Skip')"),
                Selector::css_with_text("button", "Skip")
            );
            assert_eq!(
                Selector::parse("h2 >> text=Explore"),
                Selector::css_with_text("h2", "Explore")
            );
        }

        #[test]
        fn test_parse_xpath() {
            assert_eq!(Selector::parse("xpath=//h2"), Selector::xpath("//h2"));
            assert_eq!(Selector::parse("//div[@id='x']"), Selector::xpath("//div[@id='x']"));
        }

        #[test]
        fn test_parse_css_fallback() {
            assert_eq!(
                Selector::parse("button:has(.lucide-x)"),
                Selector::css("button:has(.lucide-x)")
            );
            assert_eq!(Selector::parse("css=text=odd"), Selector::css("text=odd"));
        }

        #[test]
        fn test_display_parses_back() {
            let selectors = [
                Selector::css(".fixed.bottom-0 button"),
                Selector::css("text=odd"),
                Selector::text("Daily Challenge"),
                Selector::exact_text("AI Tools"),
                Selector::css_with_text("button", "Claim Later"),
                Selector::xpath("//h2"),
            ];
            for selector in selectors {
                assert_eq!(Selector::parse(&selector.to_string()), selector);
            }
        }

        #[test]
        fn test_serde_string_form() {
            let json = serde_json::to_string(&Selector::text("Admin Console")).unwrap();
            assert_eq!(json, "\"text=Admin Console\"");
            let back: Selector = serde_json::from_str("\"button:has-text('Skip')\"").unwrap();
            assert_eq!(back, Selector::css_with_text("button", "Skip"));
        }
    }

    mod script_tests {
        use super::*;

        #[test]
        fn test_js_string_escapes() {
            assert_eq!(js_string("it's \"quoted\""), "\"it's \\\"quoted\\\"\"");
        }

        #[test]
        fn test_css_match_all() {
            let js = Selector::css("button.primary").to_match_all();
            assert_eq!(js, "Array.from(document.querySelectorAll(\"button.primary\"))");
        }

        #[test]
        fn test_text_match_is_innermost_and_case_insensitive() {
            let js = Selector::text("Study Time").to_match_all();
            assert!(js.contains("toLowerCase()"));
            assert!(js.contains("el.children"));
            assert!(js.contains("\"Study Time\""));
        }

        #[test]
        fn test_visibility_script_uses_any_match() {
            let js = Selector::text("Admin Console").visibility_script();
            assert!(js.contains(".some(visible)"));
            assert!(js.contains("getBoundingClientRect"));
        }

        #[test]
        fn test_click_script_force_flag() {
            assert!(Selector::css("a").click_script(true).contains("if (true)"));
            assert!(Selector::css("a").click_script(false).contains("if (false)"));
            assert!(Selector::css("a").click_script(false).contains("elementFromPoint"));
        }

        #[test]
        fn test_count_and_scroll_scripts() {
            assert!(Selector::xpath("//h2").count_script().ends_with(".length"));
            assert!(Selector::css("a").scroll_script().contains("scrollIntoView"));
        }
    }

    mod click_outcome_tests {
        use super::*;

        #[test]
        fn test_from_tag() {
            assert_eq!(ClickOutcome::from_tag("clicked"), Some(ClickOutcome::Clicked));
            assert_eq!(ClickOutcome::from_tag("obscured"), Some(ClickOutcome::Obscured));
            assert_eq!(ClickOutcome::from_tag("weird"), None);
        }

        #[test]
        fn test_reason() {
            assert_eq!(ClickOutcome::Missing.reason(), "no element matches");
        }
    }
}
