//! Notification Core Types
//!
//! Messages, per-channel outcomes, the aggregated dispatch report, and the
//! delivery error taxonomy.

use std::fmt;

use chrono::{DateTime, Utc};
use notify_relay_core::{MessageCategory, Priority, ValidationError};
use serde::{Deserialize, Serialize};

use crate::storage::credentials::DecryptionError;

/// Supported notification channels, in dispatch order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Slack,
    Discord,
    Telegram,
    Email,
    Custom,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 5] = [
        Self::Slack,
        Self::Discord,
        Self::Telegram,
        Self::Email,
        Self::Custom,
    ];
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slack => write!(f, "slack"),
            Self::Discord => write!(f, "discord"),
            Self::Telegram => write!(f, "telegram"),
            Self::Email => write!(f, "email"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// A single notification with its derived category and priority.
#[derive(Debug, Clone)]
pub struct Notification {
    pub text: String,
    pub category: MessageCategory,
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Classify raw text into a notification stamped with the current time.
    pub fn new(text: impl Into<String>) -> Self {
        Self::at(text, Utc::now())
    }

    /// Classify raw text into a notification stamped with `timestamp`.
    pub fn at(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let text = text.into();
        Self {
            category: MessageCategory::classify(&text),
            priority: Priority::classify(&text),
            text,
            timestamp,
        }
    }

    /// Text prefixed with the category's emoji shortcode.
    pub fn decorated_text(&self) -> String {
        format!("{} {}", self.category.shortcode(), self.text)
    }
}

/// Why the custom-script gatekeeper refused to run a script.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DenialReason {
    #[error("script path must be absolute")]
    NotAbsolute,

    #[error("script path contains a '..' segment")]
    PathTraversal,

    #[error("script path is unsafe: {0}")]
    UnsafePath(String),

    #[error("script does not exist")]
    NotFound,

    #[error("script is not a regular file")]
    NotRegularFile,

    #[error("script is not executable")]
    NotExecutable,

    #[error("script is owned by untrusted uid {uid}")]
    UntrustedOwner { uid: u32 },

    #[error("script is world-writable")]
    WorldWritable,

    #[error("script content matches deny-list rule '{rule}'")]
    DangerousContent { rule: String },

    #[error("script execution was not confirmed")]
    ConfirmationDeclined,

    #[error("custom scripts are not supported on this platform")]
    UnsupportedPlatform,
}

/// Delivery errors
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("credential {key} could not be decrypted: {source}")]
    Decryption {
        key: String,
        #[source]
        source: DecryptionError,
    },

    #[error("security check failed: {0}")]
    Security(#[from] DenialReason),

    #[error("rate limit of {limit} messages per {window_secs}s exceeded")]
    RateLimited { limit: u64, window_secs: u64 },

    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("exited with status {0}")]
    ExitStatus(i32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NotifyError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

/// Outcome of one channel for one dispatch.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// Channel not configured
    Skipped,
    /// Delivered
    Sent,
    /// Accepted into the batch queue
    Deferred,
    /// Configured but delivery failed
    Failed(NotifyError),
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Sent | Self::Deferred)
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => write!(f, "skipped"),
            Self::Sent => write!(f, "sent"),
            Self::Deferred => write!(f, "deferred"),
            Self::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Outcome record for one channel.
#[derive(Debug)]
pub struct ChannelDelivery {
    pub channel: ChannelKind,
    pub outcome: DeliveryOutcome,
    pub duration_ms: u64,
}

/// Aggregated result of one dispatch call.
#[derive(Debug)]
pub struct DispatchReport {
    pub id: String,
    pub category: MessageCategory,
    pub deliveries: Vec<ChannelDelivery>,
}

impl DispatchReport {
    pub fn new(category: MessageCategory) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            category,
            deliveries: Vec::new(),
        }
    }

    pub fn record(&mut self, channel: ChannelKind, outcome: DeliveryOutcome, duration_ms: u64) {
        self.deliveries.push(ChannelDelivery {
            channel,
            outcome,
            duration_ms,
        });
    }

    /// Number of channels that were configured for this dispatch.
    pub fn configured_count(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| d.outcome.is_configured())
            .count()
    }

    /// Overall success: at least one channel sent or deferred, or nothing
    /// configured at all.
    pub fn succeeded(&self) -> bool {
        self.configured_count() == 0 || self.deliveries.iter().any(|d| d.outcome.is_success())
    }

    /// Outcome for a given channel, if it was recorded.
    pub fn outcome(&self, channel: ChannelKind) -> Option<&DeliveryOutcome> {
        self.deliveries
            .iter()
            .find(|d| d.channel == channel)
            .map(|d| &d.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_kind_display() {
        let names: Vec<String> = ChannelKind::ALL.iter().map(|k| k.to_string()).collect();
        assert_eq!(names, vec!["slack", "discord", "telegram", "email", "custom"]);
    }

    #[test]
    fn test_notification_classification() {
        let n = Notification::new("Build FAILED on main");
        assert_eq!(n.category, MessageCategory::Error);
        assert_eq!(n.priority, Priority::High);
        assert_eq!(n.decorated_text(), ":x: Build FAILED on main");

        let n = Notification::new("Iteration 3 done");
        assert_eq!(n.category, MessageCategory::Success);
        assert_eq!(n.priority, Priority::Low);
    }

    #[test]
    fn test_report_success_rules() {
        // Nothing configured: silent success
        let mut report = DispatchReport::new(MessageCategory::Info);
        report.record(ChannelKind::Slack, DeliveryOutcome::Skipped, 0);
        assert!(report.succeeded());
        assert_eq!(report.configured_count(), 0);

        // Configured but all failed
        report.record(
            ChannelKind::Email,
            DeliveryOutcome::Failed(NotifyError::transport("boom")),
            3,
        );
        assert!(!report.succeeded());

        // One deferred is enough
        report.record(ChannelKind::Telegram, DeliveryOutcome::Deferred, 1);
        assert!(report.succeeded());
        assert!(matches!(
            report.outcome(ChannelKind::Telegram),
            Some(DeliveryOutcome::Deferred)
        ));
        assert!(report.outcome(ChannelKind::Custom).is_none());
    }

    #[test]
    fn test_error_display() {
        let err = NotifyError::RateLimited {
            limit: 10,
            window_secs: 60,
        };
        assert_eq!(err.to_string(), "rate limit of 10 messages per 60s exceeded");

        let err: NotifyError = DenialReason::UntrustedOwner { uid: 1001 }.into();
        assert_eq!(
            err.to_string(),
            "security check failed: script is owned by untrusted uid 1001"
        );

        let err = NotifyError::Decryption {
            key: "SMTP_PASSWORD".to_string(),
            source: DecryptionError::WrongKeyOrCorrupt,
        };
        assert!(err.to_string().contains("SMTP_PASSWORD"));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(DeliveryOutcome::Sent.to_string(), "sent");
        assert_eq!(
            DeliveryOutcome::Failed(NotifyError::ExitStatus(3)).to_string(),
            "failed: exited with status 3"
        );
    }
}
