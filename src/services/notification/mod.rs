//! Notification Delivery
//!
//! Multi-channel, rate-limited, batching dispatcher for status messages.
//! Supports Slack and Discord webhooks, the Telegram Bot API, email through a
//! SendGrid/Mailgun/SMTP fallback chain, and operator-supplied scripts vetted
//! by the [`gatekeeper`].

pub mod batch;
pub mod channels;
pub mod format;
pub mod gatekeeper;
pub mod rate_limit;
pub mod service;
pub mod types;

pub use channels::{ApiEndpoints, NotificationChannel};
pub use gatekeeper::{DialoguerConfirmer, Gatekeeper, GatekeeperPolicy, ScriptConfirmer};
pub use service::{ChannelStatus, Dispatcher};
pub use types::*;
