//! Message Classification
//!
//! Derives a category and a delivery priority from raw notification text by
//! case-insensitive keyword match. The category drives subject lines and
//! icons; the priority decides whether a message may wait in the batch queue.

use serde::{Deserialize, Serialize};
use std::fmt;

const ERROR_KEYWORDS: &[&str] = &["error", "failed", "failure", "critical", "fatal", "exception"];
const WARNING_KEYWORDS: &[&str] = &["warning", "warn"];
const SUCCESS_KEYWORDS: &[&str] = &[
    "success",
    "succeeded",
    "complete",
    "completed",
    "done",
    "passed",
    "finished",
];
const PROGRESS_KEYWORDS: &[&str] = &["progress", "running", "started", "starting", "iteration", "loop"];

/// Keywords that make a message high priority (never batched).
const HIGH_PRIORITY_KEYWORDS: &[&str] = &["error", "failed", "critical", "warning"];

/// Category derived from message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageCategory {
    Success,
    Warning,
    Error,
    Progress,
    Info,
}

impl MessageCategory {
    /// Classify a message. Precedence: error, warning, success, progress, info.
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();
        let has_any = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

        if has_any(ERROR_KEYWORDS) {
            Self::Error
        } else if has_any(WARNING_KEYWORDS) {
            Self::Warning
        } else if has_any(SUCCESS_KEYWORDS) {
            Self::Success
        } else if has_any(PROGRESS_KEYWORDS) {
            Self::Progress
        } else {
            Self::Info
        }
    }

    /// Human-readable label used in subject lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::Progress => "Progress",
            Self::Info => "Info",
        }
    }

    /// Emoji shortcode that leads chat messages of this category.
    pub fn shortcode(&self) -> &'static str {
        match self {
            Self::Success => ":white_check_mark:",
            Self::Warning => ":warning:",
            Self::Error => ":x:",
            Self::Progress => ":hourglass:",
            Self::Info => ":information_source:",
        }
    }
}

impl fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Progress => write!(f, "progress"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// Delivery priority derived from message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Delivered immediately on every channel.
    High,
    /// May be deferred into the batch queue.
    Low,
}

impl Priority {
    /// Classify a message's priority.
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();
        if HIGH_PRIORITY_KEYWORDS.iter().any(|k| lower.contains(k)) {
            Self::High
        } else {
            Self::Low
        }
    }
}
