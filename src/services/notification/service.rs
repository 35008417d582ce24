//! Notification Dispatcher
//!
//! Central dispatcher that applies the shared rate limit, routes one message
//! to every configured channel, and then flushes the email batch if it is
//! due. Each channel is attempted in turn under its own timeout and its
//! outcome is captured in the [`DispatchReport`]; one channel's failure never
//! stops the others.
//!
//! A call rejected by the rate limiter touches no channel and no batch. A
//! batch flush rides on the accepted call that triggered it and takes no
//! rate-limit slot of its own.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify_relay_core::Priority;

use crate::services::http::build_http_client;
use crate::storage::config::NotifyConfig;
use crate::utils::error::{AppError, AppResult};

use super::batch::{Batch, BatchQueue};
use super::channels::custom::CustomScriptChannel;
use super::channels::discord::DiscordChannel;
use super::channels::email::EmailChannel;
use super::channels::slack::SlackChannel;
use super::channels::telegram::TelegramChannel;
use super::channels::{ApiEndpoints, NotificationChannel};
use super::gatekeeper::{DialoguerConfirmer, Gatekeeper, GatekeeperPolicy};
use super::rate_limit::RateLimiter;
use super::types::*;

/// Configuration state of one channel, as shown by `diagnose`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    pub channel: ChannelKind,
    pub configured: bool,
    /// Config key whose encrypted value could not be decrypted
    pub decryption_failure: Option<String>,
}

/// Multi-channel notification dispatcher.
///
/// Owns the immutable [`NotifyConfig`], one shared HTTP client (inside the
/// channels), and the file-backed rate limiter and batch queue.
pub struct Dispatcher {
    config: NotifyConfig,
    channels: Vec<Box<dyn NotificationChannel>>,
    rate_limiter: RateLimiter,
    batch: BatchQueue,
}

impl Dispatcher {
    /// Create a dispatcher with production endpoints and interactive script
    /// confirmation.
    pub fn new(config: NotifyConfig, state_dir: &Path) -> AppResult<Self> {
        let gatekeeper = Gatekeeper::new(
            state_dir,
            GatekeeperPolicy::default(),
            Arc::new(DialoguerConfirmer),
        );
        Self::with_parts(config, state_dir, &ApiEndpoints::default(), gatekeeper)
    }

    /// Create a dispatcher with explicit API endpoints and gatekeeper.
    pub fn with_parts(
        config: NotifyConfig,
        state_dir: &Path,
        endpoints: &ApiEndpoints,
        gatekeeper: Gatekeeper,
    ) -> AppResult<Self> {
        let client = build_http_client(
            config.proxy.as_ref(),
            Duration::from_secs(config.http_timeout_secs),
        )
        .map_err(|e| AppError::config(format!("failed to build HTTP client: {}", e)))?;

        let channels: Vec<Box<dyn NotificationChannel>> = vec![
            Box::new(SlackChannel::new(client.clone())),
            Box::new(DiscordChannel::new(client.clone())),
            Box::new(TelegramChannel::new(client.clone(), endpoints.telegram.clone())),
            Box::new(EmailChannel::new(client, endpoints)),
            Box::new(CustomScriptChannel::new(gatekeeper)),
        ];

        Ok(Self {
            rate_limiter: RateLimiter::new(state_dir, config.rate_limit),
            batch: BatchQueue::new(state_dir, config.batch),
            config,
            channels,
        })
    }

    pub fn config(&self) -> &NotifyConfig {
        &self.config
    }

    /// Configured/unconfigured state of every channel, in dispatch order.
    pub fn channel_status(&self) -> Vec<ChannelStatus> {
        self.channels
            .iter()
            .map(|channel| ChannelStatus {
                channel: channel.kind(),
                configured: channel.is_configured(&self.config),
                decryption_failure: self
                    .config
                    .decryption_failure(channel.config_keys())
                    .map(|(key, _)| key.to_string()),
            })
            .collect()
    }

    /// Number of messages waiting in the batch queue.
    pub fn pending_batch(&self) -> usize {
        self.batch.pending()
    }

    /// Dispatch one message to every channel.
    ///
    /// Fails only when the rate limit rejects the call; per-channel failures
    /// are reported in the returned [`DispatchReport`].
    pub async fn send(&self, text: &str) -> Result<DispatchReport, NotifyError> {
        self.rate_limiter.check()?;

        let notification = Notification::new(text);
        let mut report = DispatchReport::new(notification.category);

        for channel in &self.channels {
            let started = Instant::now();
            let outcome = self.deliver(channel.as_ref(), &notification).await;
            report.record(channel.kind(), outcome, started.elapsed().as_millis() as u64);
        }

        // Runs after this message was queued, so a batch that just hit its
        // size cap goes out now
        if let Some(outcome) = self.flush().await {
            tracing::debug!("Batch flush after dispatch: {}", outcome);
        }

        if !report.succeeded() {
            tracing::error!(
                "Notification {} failed on all {} configured channels",
                report.id,
                report.configured_count()
            );
        }
        Ok(report)
    }

    /// Send the batch queue through email if it is due.
    ///
    /// Returns `None` when nothing was flushed. A failed send puts the
    /// entries back at the head of the queue.
    pub async fn flush(&self) -> Option<DeliveryOutcome> {
        if !self.batch.is_enabled() {
            return None;
        }
        let batch = self.batch.maybe_flush()?;
        Some(self.deliver_batch(&batch).await)
    }

    async fn deliver(
        &self,
        channel: &dyn NotificationChannel,
        notification: &Notification,
    ) -> DeliveryOutcome {
        if let Some(outcome) = self.decryption_outcome(channel) {
            return outcome;
        }
        if !channel.is_configured(&self.config) {
            return DeliveryOutcome::Skipped;
        }

        if channel.kind() == ChannelKind::Email
            && notification.priority == Priority::Low
            && self.batch.is_enabled()
        {
            match self.batch.enqueue(&notification.text) {
                Ok(()) => return DeliveryOutcome::Deferred,
                Err(e) => {
                    tracing::warn!("Failed to queue notification, sending immediately: {}", e);
                }
            }
        }

        self.send_bounded(channel, notification).await
    }

    async fn deliver_batch(&self, batch: &Batch) -> DeliveryOutcome {
        let outcome = match self.channel(ChannelKind::Email) {
            Some(email) => match self.decryption_outcome(email) {
                Some(outcome) => outcome,
                None if !email.is_configured(&self.config) => DeliveryOutcome::Failed(
                    NotifyError::NotConfigured("EMAIL_TO is required to flush batches".to_string()),
                ),
                None => {
                    let notification = Notification::new(batch.combined_message());
                    self.send_bounded(email, &notification).await
                }
            },
            None => DeliveryOutcome::Skipped,
        };

        if !outcome.is_success() {
            tracing::warn!("Batched notifications not delivered: {}", outcome);
            if let Err(e) = self.batch.requeue(batch) {
                tracing::error!("Failed to requeue {} batched notifications: {}", batch.len(), e);
            }
        }
        outcome
    }

    async fn send_bounded(
        &self,
        channel: &dyn NotificationChannel,
        notification: &Notification,
    ) -> DeliveryOutcome {
        let limit = channel.timeout(&self.config);
        match tokio::time::timeout(limit, channel.send(notification, &self.config)).await {
            Ok(Ok(())) => DeliveryOutcome::Sent,
            Ok(Err(e)) => {
                tracing::warn!("{} notification failed: {}", channel.kind(), e);
                DeliveryOutcome::Failed(e)
            }
            Err(_) => {
                tracing::warn!(
                    "{} notification timed out after {}s",
                    channel.kind(),
                    limit.as_secs()
                );
                DeliveryOutcome::Failed(NotifyError::Timeout {
                    secs: limit.as_secs(),
                })
            }
        }
    }

    fn decryption_outcome(&self, channel: &dyn NotificationChannel) -> Option<DeliveryOutcome> {
        self.config
            .decryption_failure(channel.config_keys())
            .map(|(key, source)| {
                tracing::warn!("{} channel disabled: {} could not be decrypted", channel.kind(), key);
                DeliveryOutcome::Failed(NotifyError::Decryption {
                    key: key.to_string(),
                    source: source.clone(),
                })
            })
    }

    fn channel(&self, kind: ChannelKind) -> Option<&dyn NotificationChannel> {
        self.channels
            .iter()
            .find(|c| c.kind() == kind)
            .map(|c| c.as_ref())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field(
                "channels",
                &self.channels.iter().map(|c| c.kind()).collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .finish()
    }
}
