//! Integration Tests Module
//!
//! End-to-end tests for the notification relay: dispatch aggregation,
//! low-priority batching, the custom-script gatekeeper, and encrypted
//! credentials flowing from the config file into the channels.

// Dispatcher aggregation and isolation tests
mod dispatch_test;

// Batch queue behaviour through the dispatcher
mod batching_test;

// Custom-script gatekeeper tests
#[cfg(unix)]
mod gatekeeper_test;

// Config file and credential cipher tests
mod credentials_test;
