//! Telegram Bot API Notification Channel
//!
//! Sends notifications via the Bot API `sendMessage` endpoint using
//! MarkdownV2 formatting. The bot token is part of the request URL, so it is
//! masked in every diagnostic and stripped from transport errors.

use async_trait::async_trait;
use serde_json::json;

use notify_relay_core::validation::{mask_token, validate_bot_token, validate_chat_id};

use super::{post_json, NotificationChannel};
use crate::services::notification::format;
use crate::services::notification::types::{ChannelKind, Notification, NotifyError};
use crate::storage::config::NotifyConfig;

/// Telegram Bot API integration for notifications only.
///
/// API endpoint: `<api_base>/bot<token>/sendMessage`
pub struct TelegramChannel {
    client: reqwest::Client,
    api_base: String,
}

impl TelegramChannel {
    pub fn new(client: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build the `sendMessage` JSON body.
    pub fn build_payload(notification: &Notification, chat_id: &str) -> serde_json::Value {
        json!({
            "chat_id": chat_id,
            "text": format::TELEGRAM.apply(&notification.decorated_text()),
            "parse_mode": "MarkdownV2",
        })
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    fn is_configured(&self, config: &NotifyConfig) -> bool {
        !config.telegram.bot_token.is_empty()
    }

    fn config_keys(&self) -> &'static [&'static str] {
        &["TELEGRAM_BOT_TOKEN", "TELEGRAM_CHAT_ID"]
    }

    async fn send(
        &self,
        notification: &Notification,
        config: &NotifyConfig,
    ) -> Result<(), NotifyError> {
        let token = &config.telegram.bot_token;
        let chat_id = &config.telegram.chat_id;

        validate_bot_token(token)?;
        if chat_id.is_empty() {
            return Err(NotifyError::NotConfigured(
                "TELEGRAM_CHAT_ID is required".to_string(),
            ));
        }
        validate_chat_id(chat_id)?;

        let url = format!("{}/bot{}/sendMessage", self.api_base, token);
        let payload = Self::build_payload(notification, chat_id);

        tracing::debug!("Sending Telegram message with bot {}", mask_token(token));
        post_json(&self.client, &url, &payload, "Telegram")
            .await
            .map_err(|e| match e {
                // Response bodies may echo the request path
                NotifyError::Transport(msg) => {
                    NotifyError::Transport(msg.replace(token.as_str(), &mask_token(token)))
                }
                other => other,
            })
    }
}
