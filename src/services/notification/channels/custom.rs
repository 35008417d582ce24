//! Custom Executable Notification Channel
//!
//! Runs an operator-supplied script as `<script> <message> <category>` with
//! `NOTIFY_MESSAGE` and `NOTIFY_CATEGORY` in its environment. Every run goes
//! through the [`Gatekeeper`] first. Vetting reads the script and may prompt
//! on the terminal, so it runs on the blocking pool where the dispatcher's
//! timeout can still fire.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{NotificationChannel, TIMEOUT_GRACE};
use crate::services::notification::gatekeeper::Gatekeeper;
use crate::services::notification::types::{ChannelKind, Notification, NotifyError};
use crate::storage::config::NotifyConfig;

/// Custom script integration.
pub struct CustomScriptChannel {
    gatekeeper: Gatekeeper,
}

impl CustomScriptChannel {
    pub fn new(gatekeeper: Gatekeeper) -> Self {
        Self { gatekeeper }
    }
}

#[async_trait]
impl NotificationChannel for CustomScriptChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Custom
    }

    fn is_configured(&self, config: &NotifyConfig) -> bool {
        !config.custom.script.is_empty()
    }

    fn config_keys(&self) -> &'static [&'static str] {
        &["CUSTOM_SCRIPT"]
    }

    fn timeout(&self, config: &NotifyConfig) -> Duration {
        Duration::from_secs(config.custom.timeout_secs) + TIMEOUT_GRACE
    }

    async fn send(
        &self,
        notification: &Notification,
        config: &NotifyConfig,
    ) -> Result<(), NotifyError> {
        let gatekeeper = self.gatekeeper.clone();
        let script = config.custom.script.clone();
        let path = tokio::task::spawn_blocking(move || gatekeeper.vet(&script))
            .await
            .map_err(|e| {
                NotifyError::Io(std::io::Error::other(format!(
                    "failed to join script vetting task: {e}"
                )))
            })??;
        let category = notification.category.to_string();

        let mut child = Command::new(&path)
            .arg(&notification.text)
            .arg(&category)
            .env("NOTIFY_MESSAGE", &notification.text)
            .env("NOTIFY_CATEGORY", &category)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let secs = config.custom.timeout_secs;
        let waited = tokio::time::timeout(Duration::from_secs(secs), child.wait()).await;
        let status = match waited {
            Ok(status) => status?,
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::debug!("Failed to kill timed-out script: {}", e);
                }
                tracing::warn!("Custom script {} timed out after {}s", path.display(), secs);
                return Err(NotifyError::Timeout { secs });
            }
        };

        if status.success() {
            return Ok(());
        }
        // Terminated by a signal
        let code = status.code().unwrap_or(-1);
        tracing::warn!("Custom script {} exited with status {}", path.display(), code);
        Err(NotifyError::ExitStatus(code))
    }
}
