//! Notify Relay - Notification Delivery Library
//!
//! Multi-channel status notifications for long-running automation loops.
//! It includes:
//! - Dispatcher with rate limiting and low-priority batching
//! - Channel senders (Slack, Discord, Telegram, email, custom scripts)
//! - Storage layer (config file, machine-bound credential cipher, file locks)
//! - Platform paths and error types

pub mod services;
pub mod storage;
pub mod utils;

pub use services::notification::{DispatchReport, Dispatcher, NotifyError};
pub use storage::{CredentialCipher, NotifyConfig};
pub use utils::error::{AppError, AppResult};
