//! Batching Integration Tests
//!
//! Tests for low-priority email batching through the dispatcher:
//! - Low-priority messages are deferred until a threshold is met
//! - High-priority messages bypass the queue
//! - A batch reaching its size cap is delivered by the call that filled it
//! - A batch older than the delay is delivered on the next accepted call
//! - A rate-limited call never flushes the batch
//! - A failed combined send keeps every entry

use std::sync::Arc;

use httpmock::prelude::*;
use tempfile::{tempdir, TempDir};

use notify_relay::services::notification::batch::BatchQueue;
use notify_relay::services::notification::{
    ApiEndpoints, ChannelKind, DeliveryOutcome, DialoguerConfirmer, Dispatcher, Gatekeeper,
    GatekeeperPolicy, NotifyError,
};
use notify_relay::storage::{BatchConfig, NotifyConfig};

// ============================================================================
// Helpers
// ============================================================================

fn batching_config(delay_secs: u64, max_size: u64) -> NotifyConfig {
    let mut config = NotifyConfig::default();
    config.email.to = "ops@example.com".to_string();
    config.email.sendgrid_api_key = Some("SG.batch".to_string());
    config.batch = BatchConfig {
        delay_secs,
        max_size,
    };
    config
}

fn create_dispatcher(state: &TempDir, config: NotifyConfig, server: &MockServer) -> Dispatcher {
    let endpoints = ApiEndpoints {
        sendgrid: server.base_url(),
        ..ApiEndpoints::default()
    };
    let gatekeeper = Gatekeeper::new(
        state.path(),
        GatekeeperPolicy::default(),
        Arc::new(DialoguerConfirmer),
    );
    Dispatcher::with_parts(config, state.path(), &endpoints, gatekeeper)
        .expect("Failed to create dispatcher")
}

// ============================================================================
// Thresholds
// ============================================================================

#[tokio::test]
async fn test_low_priority_deferred_until_threshold() {
    let server = MockServer::start();
    let sendgrid = server.mock(|when, then| {
        when.method(POST).path("/v3/mail/send");
        then.status(202);
    });

    let state = tempdir().unwrap();
    let dispatcher = create_dispatcher(&state, batching_config(300, 10), &server);

    for text in ["Iteration 1 started", "Iteration 1 done", "Iteration 2 started"] {
        let report = dispatcher.send(text).await.unwrap();
        assert!(report.succeeded());
        assert!(matches!(
            report.outcome(ChannelKind::Email),
            Some(DeliveryOutcome::Deferred)
        ));
    }

    assert!(dispatcher.flush().await.is_none());
    assert_eq!(dispatcher.pending_batch(), 3);
    assert_eq!(sendgrid.calls(), 0);
}

#[tokio::test]
async fn test_high_priority_bypasses_queue() {
    let server = MockServer::start();
    let sendgrid = server.mock(|when, then| {
        when.method(POST)
            .path("/v3/mail/send")
            .body_includes("Critical: database unreachable");
        then.status(202);
    });

    let state = tempdir().unwrap();
    let dispatcher = create_dispatcher(&state, batching_config(300, 10), &server);

    dispatcher.send("Iteration 7 done").await.unwrap();
    let report = dispatcher.send("Critical: database unreachable").await.unwrap();

    assert!(matches!(report.outcome(ChannelKind::Email), Some(DeliveryOutcome::Sent)));
    assert_eq!(dispatcher.pending_batch(), 1);
    sendgrid.assert();
}

#[tokio::test]
async fn test_full_batch_sent_by_call_that_fills_it() {
    let server = MockServer::start();
    let combined = server.mock(|when, then| {
        when.method(POST)
            .path("/v3/mail/send")
            .body_includes("Batched notifications (3)")
            .body_includes("] step a done")
            .body_includes("] step c done");
        then.status(202);
    });

    let state = tempdir().unwrap();
    let dispatcher = create_dispatcher(&state, batching_config(3600, 3), &server);

    dispatcher.send("step a done").await.unwrap();
    dispatcher.send("step b done").await.unwrap();
    assert_eq!(combined.calls(), 0);

    let report = dispatcher.send("step c done").await.unwrap();
    assert!(matches!(
        report.outcome(ChannelKind::Email),
        Some(DeliveryOutcome::Deferred)
    ));
    assert_eq!(dispatcher.pending_batch(), 0);
    assert!(dispatcher.flush().await.is_none());
    combined.assert();
}

#[tokio::test]
async fn test_due_batch_flushed_on_next_send() {
    let server = MockServer::start();
    let combined = server.mock(|when, then| {
        when.method(POST)
            .path("/v3/mail/send")
            .body_includes("Batched notifications (3)")
            .body_includes("] first run done")
            .body_includes("] third run done");
        then.status(202);
    });

    let state = tempdir().unwrap();
    let config = batching_config(60, 10);

    // Seed entries older than the delay, as an earlier process would have
    let queue = BatchQueue::new(state.path(), config.batch);
    let old = chrono::Utc::now().timestamp_millis() - 120_000;
    queue.enqueue_at("first run done", old).unwrap();
    queue.enqueue_at("second run done", old + 1_000).unwrap();

    let dispatcher = create_dispatcher(&state, config, &server);
    let report = dispatcher.send("third run done").await.unwrap();

    assert!(matches!(report.outcome(ChannelKind::Email), Some(DeliveryOutcome::Deferred)));
    assert_eq!(dispatcher.pending_batch(), 0);
    combined.assert();
}

#[tokio::test]
async fn test_rate_limited_call_leaves_due_batch_queued() {
    let server = MockServer::start();
    let sendgrid = server.mock(|when, then| {
        when.method(POST).path("/v3/mail/send");
        then.status(202);
    });

    let state = tempdir().unwrap();
    let mut config = batching_config(60, 10);
    config.rate_limit.max_messages = 1;
    config.rate_limit.window_secs = 3600;

    let queue = BatchQueue::new(state.path(), config.batch);
    let old = chrono::Utc::now().timestamp_millis() - 120_000;
    queue.enqueue_at("nightly build done", old).unwrap();

    let dispatcher = create_dispatcher(&state, config, &server);
    dispatcher.send("first deploy done").await.unwrap();
    assert_eq!(sendgrid.calls(), 1);
    assert_eq!(dispatcher.pending_batch(), 0);

    queue.enqueue_at("second deploy done", old).unwrap();
    let err = dispatcher.send("third deploy done").await.unwrap_err();
    assert!(matches!(err, NotifyError::RateLimited { limit: 1, .. }));
    assert_eq!(sendgrid.calls(), 1);
    assert_eq!(dispatcher.pending_batch(), 1);
}

#[tokio::test]
async fn test_failed_batch_send_keeps_entries() {
    let server = MockServer::start();
    let sendgrid = server.mock(|when, then| {
        when.method(POST).path("/v3/mail/send");
        then.status(502).body("bad gateway");
    });

    let state = tempdir().unwrap();
    let dispatcher = create_dispatcher(&state, batching_config(3600, 2), &server);

    dispatcher.send("build 1 passed").await.unwrap();
    let report = dispatcher.send("build 2 passed").await.unwrap();

    assert!(report.succeeded());
    assert_eq!(sendgrid.calls(), 1);
    assert_eq!(dispatcher.pending_batch(), 2);
}
