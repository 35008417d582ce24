//! Slack Incoming Webhook Channel
//!
//! Sends notifications via a Slack Incoming Webhook URL as a simple
//! `{text, username?, icon_emoji?}` payload.

use async_trait::async_trait;
use serde_json::json;

use notify_relay_core::validation::validate_url;

use super::{post_json, NotificationChannel};
use crate::services::notification::format;
use crate::services::notification::types::{ChannelKind, Notification, NotifyError};
use crate::storage::config::NotifyConfig;

/// Slack Incoming Webhook integration.
///
/// Webhook URL format: `https://hooks.slack.com/services/T.../B.../xxx`.
/// Slack renders emoji shortcodes itself, so only the bold dialect changes.
pub struct SlackChannel {
    client: reqwest::Client,
}

impl SlackChannel {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build the webhook JSON payload.
    pub fn build_payload(notification: &Notification, config: &NotifyConfig) -> serde_json::Value {
        let mut payload = json!({
            "text": format::SLACK.apply(&notification.decorated_text()),
        });
        if let Some(ref username) = config.slack.username {
            payload["username"] = json!(username);
        }
        if let Some(ref icon) = config.slack.icon_emoji {
            payload["icon_emoji"] = json!(icon);
        }
        payload
    }
}

#[async_trait]
impl NotificationChannel for SlackChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Slack
    }

    fn is_configured(&self, config: &NotifyConfig) -> bool {
        !config.slack.webhook_url.is_empty()
    }

    fn config_keys(&self) -> &'static [&'static str] {
        &["SLACK_WEBHOOK_URL", "SLACK_USERNAME", "SLACK_ICON_EMOJI"]
    }

    async fn send(
        &self,
        notification: &Notification,
        config: &NotifyConfig,
    ) -> Result<(), NotifyError> {
        validate_url(&config.slack.webhook_url)?;
        let payload = Self::build_payload(notification, config);
        post_json(&self.client, &config.slack.webhook_url, &payload, "Slack").await
    }
}
