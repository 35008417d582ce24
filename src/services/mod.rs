//! Services
//!
//! Notification delivery and the shared HTTP client factory.

pub mod http;
pub mod notification;

pub use notification::Dispatcher;
