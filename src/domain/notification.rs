//! User-visible notifications
//!
//! Toast messages produced by the backend; the client decides how to render
//! them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Default,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notification {
    pub fn new(title: impl Into<String>, description: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity,
        }
    }

    pub fn session_expired() -> Self {
        Self::new(
            "Session Expired",
            "Please log in again to continue",
            Severity::Destructive,
        )
    }

    pub fn profile_error(description: impl Into<String>) -> Self {
        Self::new("Profile Error", description, Severity::Destructive)
    }

    pub fn fetch_exhausted() -> Self {
        Self::new(
            "Error",
            "Failed to load profile data. Please try again later.",
            Severity::Destructive,
        )
    }

    pub fn reset_sent() -> Self {
        Self::new(
            "Reset Instructions Sent",
            "Please check your email for password reset instructions. The link will expire in 1 hour.",
            Severity::Default,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_serialization() {
        let value = serde_json::to_value(Notification::session_expired()).unwrap();
        assert_eq!(value["severity"], "destructive");
        assert_eq!(value["title"], "Session Expired");
    }
}
