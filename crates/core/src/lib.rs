//! notify-relay Core
//!
//! Side-effect-free building blocks for the notify-relay workspace. Nothing in
//! this crate touches the network, the filesystem (beyond an optional
//! existence check), or process state.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `ValidationError`)
//! - `validation` - Format/security predicates plus escaping and masking helpers
//! - `category` - Keyword-based message category and priority classification
//! - `proxy` - Proxy configuration shared by every HTTP-using channel

pub mod category;
pub mod error;
pub mod proxy;
pub mod validation;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult, ValidationError};

// ── Classification ─────────────────────────────────────────────────────
pub use category::{MessageCategory, Priority};

// ── Proxy Types ────────────────────────────────────────────────────────
pub use proxy::{ProxyConfig, ProxyProtocol};
