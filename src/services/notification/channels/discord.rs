//! Discord Webhook Channel
//!
//! Sends notifications via a Discord webhook as `{content, username?,
//! avatar_url?}`. Discord does not expand Slack-style shortcodes, so they are
//! rewritten to Unicode, and content is capped at the API's 2000 characters.

use async_trait::async_trait;
use serde_json::json;

use notify_relay_core::validation::validate_url;

use super::{post_json, NotificationChannel};
use crate::services::notification::format;
use crate::services::notification::types::{ChannelKind, Notification, NotifyError};
use crate::storage::config::NotifyConfig;

/// Discord webhook integration.
///
/// Webhook URL format: `https://discord.com/api/webhooks/<id>/<token>`
pub struct DiscordChannel {
    client: reqwest::Client,
}

impl DiscordChannel {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build the webhook JSON payload.
    pub fn build_payload(notification: &Notification, config: &NotifyConfig) -> serde_json::Value {
        let mut payload = json!({
            "content": format::DISCORD.apply(&notification.decorated_text()),
        });
        if let Some(ref username) = config.discord.username {
            payload["username"] = json!(username);
        }
        if let Some(ref avatar) = config.discord.avatar_url {
            payload["avatar_url"] = json!(avatar);
        }
        payload
    }
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Discord
    }

    fn is_configured(&self, config: &NotifyConfig) -> bool {
        !config.discord.webhook_url.is_empty()
    }

    fn config_keys(&self) -> &'static [&'static str] {
        &["DISCORD_WEBHOOK_URL", "DISCORD_USERNAME", "DISCORD_AVATAR_URL"]
    }

    async fn send(
        &self,
        notification: &Notification,
        config: &NotifyConfig,
    ) -> Result<(), NotifyError> {
        validate_url(&config.discord.webhook_url)?;
        if let Some(ref avatar) = config.discord.avatar_url {
            validate_url(avatar)?;
        }

        let payload = Self::build_payload(notification, config);
        post_json(&self.client, &config.discord.webhook_url, &payload, "Discord").await
    }
}
