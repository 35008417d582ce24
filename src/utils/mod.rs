//! Utilities
//!
//! Error types and platform path helpers.

pub mod error;
pub mod paths;
