//! Email Notification Channel
//!
//! Delivers through a fixed fallback chain: SendGrid, then Mailgun, then an
//! SMTP relay. Each backend is skipped when its own credentials are absent
//! and the first success wins. Addresses are validated before any backend is
//! contacted.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::json;

use notify_relay_core::validation::{html_escape, validate_email};

use super::{check_status, ApiEndpoints, NotificationChannel, TIMEOUT_GRACE};
use crate::services::notification::format;
use crate::services::notification::types::{ChannelKind, Notification, NotifyError};
use crate::storage::config::{EmailConfig, NotifyConfig, SmtpConfig};

/// Port on which SMTP relays expect implicit TLS instead of STARTTLS.
const SMTPS_PORT: u16 = 465;

/// Built-in HTML layout used when `EMAIL_HTML` is set without a template.
const HTML_LAYOUT: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: -apple-system, Helvetica, Arial, sans-serif; color: #1f2328;">
  <h2 style="margin: 0 0 4px 0;">{{CATEGORY}}</h2>
  <p style="margin: 0 0 16px 0; color: #656d76; font-size: 12px;">{{TIMESTAMP}} &middot; {{HOSTNAME}}</p>
  <div style="padding: 12px 16px; border-left: 4px solid #d0d7de; background: #f6f8fa;">{{MESSAGE}}</div>
</body>
</html>
"#;

/// A rendered email ready for any backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub subject: String,
    pub body: String,
    pub html: bool,
}

impl EmailContent {
    /// Render subject and body for a notification.
    ///
    /// The body is HTML when `EMAIL_HTML` is set or a readable template is
    /// configured; an unreadable template falls back to the built-in layout
    /// or plain text.
    pub fn compose(notification: &Notification, config: &EmailConfig) -> Self {
        let subject = sanitize_header(&format!(
            "{} - {}",
            config.subject_prefix,
            notification.category.label()
        ));

        let template = config.template.as_deref().and_then(load_template);
        let (body, html) = match template {
            Some(template) => (render_html(&template, notification), true),
            None if config.html => (render_html(HTML_LAYOUT, notification), true),
            None => (render_plain(notification), false),
        };

        Self {
            subject,
            body,
            html,
        }
    }

    fn content_type(&self) -> &'static str {
        if self.html {
            "text/html"
        } else {
            "text/plain"
        }
    }
}

fn load_template(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            tracing::warn!("Email template {} is not readable: {}", path.display(), e);
            None
        }
    }
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

fn timestamp(notification: &Notification) -> String {
    notification
        .timestamp
        .format("%Y-%m-%d %H:%M:%S UTC")
        .to_string()
}

/// Fill `{{MESSAGE}}`, `{{CATEGORY}}`, `{{TIMESTAMP}}` and `{{HOSTNAME}}`.
/// Every substituted value is entity-escaped.
fn render_html(template: &str, notification: &Notification) -> String {
    let message = html_escape(&format::PLAIN.apply(&notification.text)).replace('\n', "<br>\n");
    template
        .replace("{{CATEGORY}}", &html_escape(notification.category.label()))
        .replace("{{TIMESTAMP}}", &html_escape(&timestamp(notification)))
        .replace("{{HOSTNAME}}", &html_escape(&host_name()))
        .replace("{{MESSAGE}}", &message)
}

fn render_plain(notification: &Notification) -> String {
    format!(
        "{}\n\nCategory: {}\nTime: {}\nHost: {}\n",
        format::PLAIN.apply(&notification.text),
        notification.category.label(),
        timestamp(notification),
        host_name()
    )
}

/// Strip control characters so a configured prefix can never inject headers.
fn sanitize_header(value: &str) -> String {
    value.chars().filter(|c| !c.is_control()).collect()
}

fn is_valid_domain(domain: &str) -> bool {
    !domain.is_empty()
        && domain.len() <= 253
        && !domain.starts_with(['.', '-'])
        && !domain.ends_with(['.', '-'])
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

/// Reason text for the aggregated failure message.
fn reason(err: NotifyError) -> String {
    match err {
        NotifyError::Transport(msg) => msg,
        other => other.to_string(),
    }
}

/// Email integration with SendGrid, Mailgun and SMTP backends.
pub struct EmailChannel {
    client: reqwest::Client,
    sendgrid_base: String,
    mailgun_base: String,
}

impl EmailChannel {
    pub fn new(client: reqwest::Client, endpoints: &ApiEndpoints) -> Self {
        Self {
            client,
            sendgrid_base: endpoints.sendgrid.trim_end_matches('/').to_string(),
            mailgun_base: endpoints.mailgun.trim_end_matches('/').to_string(),
        }
    }

    /// Build the SendGrid v3 `mail/send` JSON body.
    pub fn sendgrid_payload(to: &str, from: &str, content: &EmailContent) -> serde_json::Value {
        json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": from },
            "subject": content.subject,
            "content": [{ "type": content.content_type(), "value": content.body }],
        })
    }

    async fn send_sendgrid(
        &self,
        api_key: &str,
        to: &str,
        from: &str,
        content: &EmailContent,
    ) -> Result<(), NotifyError> {
        let url = format!("{}/v3/mail/send", self.sendgrid_base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&Self::sendgrid_payload(to, from, content))
            .send()
            .await
            .map_err(|e| NotifyError::transport(format!("request failed: {}", e.without_url())))?;

        check_status(response, "SendGrid").await
    }

    async fn send_mailgun(
        &self,
        api_key: &str,
        domain: &str,
        to: &str,
        from: &str,
        content: &EmailContent,
    ) -> Result<(), NotifyError> {
        if !is_valid_domain(domain) {
            return Err(NotifyError::transport("invalid MAILGUN_DOMAIN"));
        }

        let url = format!("{}/v3/{}/messages", self.mailgun_base, domain);
        let body_field = if content.html { "html" } else { "text" };
        let form = [
            ("from", from),
            ("to", to),
            ("subject", content.subject.as_str()),
            (body_field, content.body.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth("api", Some(api_key))
            .form(&form)
            .send()
            .await
            .map_err(|e| NotifyError::transport(format!("request failed: {}", e.without_url())))?;

        check_status(response, "Mailgun").await
    }

    async fn send_smtp(
        smtp: &SmtpConfig,
        timeout: Duration,
        to: &str,
        from: &str,
        content: &EmailContent,
    ) -> Result<(), NotifyError> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| NotifyError::transport(format!("invalid recipient: {}", e)))?;
        let from: Mailbox = from
            .parse()
            .map_err(|e| NotifyError::transport(format!("invalid sender: {}", e)))?;
        let content_type = if content.html {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(content.subject.clone())
            .header(content_type)
            .body(content.body.clone())
            .map_err(|e| NotifyError::transport(format!("failed to build message: {}", e)))?;

        let builder = if smtp.port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
        }
        .map_err(|e| NotifyError::transport(format!("SMTP relay setup failed: {}", e)))?;

        let mut builder = builder.port(smtp.port).timeout(Some(timeout));
        if let Some(user) = smtp.user.as_deref().filter(|u| !u.is_empty()) {
            let password = smtp.password.clone().unwrap_or_default();
            builder = builder.credentials(Credentials::new(user.to_string(), password));
        }

        builder
            .build()
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| NotifyError::transport(format!("SMTP delivery failed: {}", e)))
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn is_configured(&self, config: &NotifyConfig) -> bool {
        !config.email.to.is_empty()
    }

    fn config_keys(&self) -> &'static [&'static str] {
        &[
            "EMAIL_TO",
            "EMAIL_FROM",
            "SENDGRID_API_KEY",
            "MAILGUN_API_KEY",
            "MAILGUN_DOMAIN",
            "SMTP_HOST",
            "SMTP_USER",
            "SMTP_PASSWORD",
        ]
    }

    /// Up to three backends may each use the full HTTP timeout.
    fn timeout(&self, config: &NotifyConfig) -> Duration {
        Duration::from_secs(config.http_timeout_secs.saturating_mul(3)) + TIMEOUT_GRACE
    }

    async fn send(
        &self,
        notification: &Notification,
        config: &NotifyConfig,
    ) -> Result<(), NotifyError> {
        let email = &config.email;
        if email.to.is_empty() {
            return Err(NotifyError::NotConfigured("EMAIL_TO is required".to_string()));
        }
        validate_email(&email.to)?;
        let from = if email.from.is_empty() {
            email.to.as_str()
        } else {
            email.from.as_str()
        };
        validate_email(from)?;

        let content = EmailContent::compose(notification, email);
        let mut failures: Vec<String> = Vec::new();

        if let Some(key) = email.sendgrid_api_key.as_deref().filter(|k| !k.is_empty()) {
            match self.send_sendgrid(key, &email.to, from, &content).await {
                Ok(()) => {
                    tracing::debug!("Email delivered via SendGrid");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("SendGrid delivery failed, trying next backend: {}", e);
                    failures.push(format!("sendgrid: {}", reason(e)));
                }
            }
        }

        if let (Some(key), Some(domain)) = (
            email.mailgun_api_key.as_deref().filter(|k| !k.is_empty()),
            email.mailgun_domain.as_deref().filter(|d| !d.is_empty()),
        ) {
            match self.send_mailgun(key, domain, &email.to, from, &content).await {
                Ok(()) => {
                    tracing::debug!("Email delivered via Mailgun");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Mailgun delivery failed, trying next backend: {}", e);
                    failures.push(format!("mailgun: {}", reason(e)));
                }
            }
        }

        if !email.smtp.host.is_empty() {
            let timeout = Duration::from_secs(config.http_timeout_secs);
            match Self::send_smtp(&email.smtp, timeout, &email.to, from, &content).await {
                Ok(()) => {
                    tracing::debug!("Email delivered via SMTP relay {}", email.smtp.host);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("SMTP delivery failed: {}", e);
                    failures.push(format!("smtp: {}", reason(e)));
                }
            }
        }

        if failures.is_empty() {
            return Err(NotifyError::NotConfigured(
                "no email backend configured (SENDGRID_API_KEY, MAILGUN_API_KEY with MAILGUN_DOMAIN, or SMTP_HOST)"
                    .to_string(),
            ));
        }
        Err(NotifyError::Transport(failures.join("; ")))
    }
}
