//! Result and error types for Waypoint.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for Waypoint operations
pub type WaypointResult<T> = Result<T, WaypointError>;

/// Errors that can occur while driving a verification run
#[derive(Debug, Error)]
pub enum WaypointError {
    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// Isolated browser context could not be created or disposed
    #[error("Browser context error: {message}")]
    Context {
        /// Error message
        message: String,
    },

    /// Target application unreachable or did not load in time
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// An expected UI milestone never became visible
    #[error("Timed out after {timeout_ms}ms waiting for {target} to become visible")]
    WaitTimeout {
        /// Selector that was waited for
        target: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// A requested interaction could not be performed
    #[error("Action {action} failed: {message}")]
    Action {
        /// Description of the action
        action: String,
        /// Error message
        message: String,
    },

    /// Persisted storage rejected the seed
    #[error("Seed write failed: {message}")]
    SeedWrite {
        /// Error message
        message: String,
    },

    /// Screenshot error
    #[error("Screenshot failed: {message}")]
    Screenshot {
        /// Error message
        message: String,
    },

    /// Script evaluation error
    #[error("Script evaluation failed: {message}")]
    Script {
        /// Error message
        message: String,
    },

    /// Invalid state error (run state machine violated)
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// Playbook could not be turned into a scenario
    #[error("Playbook error: {message}")]
    Playbook {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl WaypointError {
    /// Create an action error
    #[must_use]
    pub fn action(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Action {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Create a navigation error
    #[must_use]
    pub fn navigation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a seed write error
    #[must_use]
    pub fn seed_write(message: impl Into<String>) -> Self {
        Self::SeedWrite {
            message: message.into(),
        }
    }

    /// Classify this error for reporting
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Navigation { .. } => ErrorKind::Navigation,
            Self::WaitTimeout { .. } => ErrorKind::WaitTimeout,
            Self::Action { .. } => ErrorKind::Action,
            Self::SeedWrite { .. } => ErrorKind::SeedWrite,
            _ => ErrorKind::Other,
        }
    }

    /// Whether a best-effort step may swallow this error
    #[must_use]
    pub const fn is_action(&self) -> bool {
        matches!(self, Self::Action { .. })
    }
}

/// Coarse error classification carried in run reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Application unreachable
    Navigation,
    /// Milestone never appeared
    WaitTimeout,
    /// Interaction could not be performed
    Action,
    /// Storage rejected the seed
    SeedWrite,
    /// Anything else (browser, I/O, screenshot)
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Navigation => "NavigationError",
            Self::WaitTimeout => "WaitTimeoutError",
            Self::Action => "ActionError",
            Self::SeedWrite => "SeedWriteError",
            Self::Other => "Error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_timeout_message() {
        let err = WaypointError::WaitTimeout {
            target: "text=Study Time".to_string(),
            timeout_ms: 15_000,
        };
        assert!(err.to_string().contains("15000ms"));
        assert!(err.to_string().contains("text=Study Time"));
        assert_eq!(err.kind(), ErrorKind::WaitTimeout);
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            WaypointError::navigation("http://localhost:5000", "refused").kind(),
            ErrorKind::Navigation
        );
        assert_eq!(
            WaypointError::action("click", "missing").kind(),
            ErrorKind::Action
        );
        assert_eq!(
            WaypointError::seed_write("no document").kind(),
            ErrorKind::SeedWrite
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(WaypointError::from(io).kind(), ErrorKind::Other);
    }

    #[test]
    fn test_is_action() {
        assert!(WaypointError::action("click", "x").is_action());
        assert!(!WaypointError::seed_write("x").is_action());
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::WaitTimeout.to_string(), "WaitTimeoutError");
        assert_eq!(ErrorKind::Action.to_string(), "ActionError");
    }
}
