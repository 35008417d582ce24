//! Notification Channel Trait and Registry
//!
//! Defines the async trait every channel sender implements, the endpoint
//! table for API-based channels, and the shared JSON POST helper.

pub mod custom;
pub mod discord;
pub mod email;
pub mod slack;
pub mod telegram;

use std::time::Duration;

use async_trait::async_trait;

use crate::storage::config::NotifyConfig;

use super::types::{ChannelKind, Notification, NotifyError};

/// Extra time granted on top of a channel's own timeout before the
/// dispatcher abandons it.
pub const TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Longest response body excerpt kept in an error message.
const MAX_ERROR_BODY: usize = 200;

/// Async trait for notification channel implementations.
///
/// Each channel validates its own settings before touching the network and
/// receives a shared, timeout-bounded `reqwest::Client` at construction time.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel identifier.
    fn kind(&self) -> ChannelKind;

    /// Whether the channel's primary identifier is present.
    fn is_configured(&self, config: &NotifyConfig) -> bool;

    /// Config keys holding this channel's settings and secrets.
    fn config_keys(&self) -> &'static [&'static str];

    /// Upper bound on one send, including grace.
    fn timeout(&self, config: &NotifyConfig) -> Duration {
        Duration::from_secs(config.http_timeout_secs) + TIMEOUT_GRACE
    }

    /// Deliver a notification.
    async fn send(&self, notification: &Notification, config: &NotifyConfig)
        -> Result<(), NotifyError>;
}

/// Base URLs for API-based backends. Overridable for testing and for
/// self-hosted gateways.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    pub telegram: String,
    pub sendgrid: String,
    pub mailgun: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            telegram: "https://api.telegram.org".to_string(),
            sendgrid: "https://api.sendgrid.com".to_string(),
            mailgun: "https://api.mailgun.net".to_string(),
        }
    }
}

/// POST a JSON body and map non-2xx responses to transport errors.
///
/// `label` names the service in error messages; the URL itself is never
/// included, since webhook URLs are secrets.
pub(crate) async fn post_json(
    client: &reqwest::Client,
    url: &str,
    body: &serde_json::Value,
    label: &str,
) -> Result<(), NotifyError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| NotifyError::transport(format!("{} request failed: {}", label, e.without_url())))?;

    check_status(response, label).await
}

/// Map a non-2xx response to a transport error with a short body excerpt.
pub(crate) async fn check_status(
    response: reqwest::Response,
    label: &str,
) -> Result<(), NotifyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
    Err(NotifyError::transport(format!(
        "{} returned HTTP {}: {}",
        label,
        status.as_u16(),
        excerpt.trim()
    )))
}
