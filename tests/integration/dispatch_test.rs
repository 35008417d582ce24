//! Dispatcher Integration Tests
//!
//! Tests for the full dispatch path against local mock endpoints:
//! - Silent success with nothing configured
//! - Validation failures abort before any network call
//! - Channel isolation and aggregated success
//! - Rate limiting across dispatcher instances sharing a state directory
//! - Custom scripts run through the gatekeeper

use std::sync::Arc;

use httpmock::prelude::*;
use tempfile::{tempdir, TempDir};

use notify_relay::services::notification::{
    ApiEndpoints, ChannelKind, DeliveryOutcome, DialoguerConfirmer, Dispatcher, Gatekeeper,
    GatekeeperPolicy, NotifyError,
};
use notify_relay::storage::NotifyConfig;
use notify_relay_core::ValidationError;

// ============================================================================
// Helpers
// ============================================================================

fn endpoints(server: &MockServer) -> ApiEndpoints {
    ApiEndpoints {
        telegram: server.base_url(),
        sendgrid: server.base_url(),
        mailgun: server.base_url(),
    }
}

fn create_dispatcher(
    state: &TempDir,
    config: NotifyConfig,
    server: &MockServer,
    policy: GatekeeperPolicy,
) -> Dispatcher {
    let gatekeeper = Gatekeeper::new(state.path(), policy, Arc::new(DialoguerConfirmer));
    Dispatcher::with_parts(config, state.path(), &endpoints(server), gatekeeper)
        .expect("Failed to create dispatcher")
}

fn catch_all(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.any_request();
        then.status(200);
    })
}

// ============================================================================
// Aggregation
// ============================================================================

#[tokio::test]
async fn test_no_channels_configured_is_silent_success() {
    let server = MockServer::start();
    let any = catch_all(&server);
    let state = tempdir().unwrap();
    let dispatcher = create_dispatcher(
        &state,
        NotifyConfig::default(),
        &server,
        GatekeeperPolicy::default(),
    );

    let report = dispatcher.send("Loop iteration 4 complete").await.unwrap();

    assert!(report.succeeded());
    assert_eq!(report.configured_count(), 0);
    assert!(report
        .deliveries
        .iter()
        .all(|d| matches!(d.outcome, DeliveryOutcome::Skipped)));
    assert_eq!(any.calls(), 0);
}

#[tokio::test]
async fn test_malformed_email_recipient_fails_without_network() {
    let server = MockServer::start();
    let any = catch_all(&server);

    let mut config = NotifyConfig::default();
    config.email.to = "ops-at-example".to_string();
    config.email.sendgrid_api_key = Some("SG.integration".to_string());
    config.email.mailgun_api_key = Some("key-integration".to_string());
    config.email.mailgun_domain = Some("mg.example.com".to_string());

    let state = tempdir().unwrap();
    let dispatcher = create_dispatcher(&state, config, &server, GatekeeperPolicy::default());
    let report = dispatcher.send("Build finished").await.unwrap();

    assert!(!report.succeeded());
    assert_eq!(report.configured_count(), 1);
    assert!(matches!(
        report.outcome(ChannelKind::Email),
        Some(DeliveryOutcome::Failed(NotifyError::Validation(
            ValidationError::MalformedEmail
        )))
    ));
    assert_eq!(any.calls(), 0);
}

#[tokio::test]
async fn test_insecure_webhook_rejected_before_network() {
    let server = MockServer::start();
    let any = catch_all(&server);

    let mut config = NotifyConfig::default();
    config.slack.webhook_url = server.url("/hooks/slack");
    config.discord.webhook_url = "https://127.0.0.1/api/webhooks/1/abc".to_string();

    let state = tempdir().unwrap();
    let dispatcher = create_dispatcher(&state, config, &server, GatekeeperPolicy::default());
    let report = dispatcher.send("Deploy failed").await.unwrap();

    assert!(!report.succeeded());
    for channel in [ChannelKind::Slack, ChannelKind::Discord] {
        assert!(matches!(
            report.outcome(channel),
            Some(DeliveryOutcome::Failed(NotifyError::Validation(_)))
        ));
    }
    assert_eq!(any.calls(), 0);
}

#[tokio::test]
async fn test_telegram_and_email_both_delivered() {
    let server = MockServer::start();
    let telegram = server.mock(|when, then| {
        when.method(POST)
            .path("/bot123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw/sendMessage")
            .body_includes("\"chat_id\":\"-100200300\"");
        then.status(200).json_body(serde_json::json!({"ok": true}));
    });
    let sendgrid = server.mock(|when, then| {
        when.method(POST)
            .path("/v3/mail/send")
            .body_includes("\"subject\":\"CI - Error\"");
        then.status(202);
    });

    let mut config = NotifyConfig::default();
    config.telegram.bot_token = "123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw".to_string();
    config.telegram.chat_id = "-100200300".to_string();
    config.email.to = "ops@example.com".to_string();
    config.email.subject_prefix = "CI".to_string();
    config.email.sendgrid_api_key = Some("SG.integration".to_string());

    let state = tempdir().unwrap();
    let dispatcher = create_dispatcher(&state, config, &server, GatekeeperPolicy::default());
    let report = dispatcher.send("Pipeline FAILED at stage 3").await.unwrap();

    assert!(report.succeeded());
    assert_eq!(report.configured_count(), 2);
    assert!(matches!(report.outcome(ChannelKind::Telegram), Some(DeliveryOutcome::Sent)));
    assert!(matches!(report.outcome(ChannelKind::Email), Some(DeliveryOutcome::Sent)));
    telegram.assert();
    sendgrid.assert();
}

// ============================================================================
// Rate limiting
// ============================================================================

#[tokio::test]
async fn test_rate_limit_shared_between_dispatchers() {
    let server = MockServer::start();
    let sendgrid = server.mock(|when, then| {
        when.method(POST).path("/v3/mail/send");
        then.status(202);
    });

    let mut config = NotifyConfig::default();
    config.email.to = "ops@example.com".to_string();
    config.email.sendgrid_api_key = Some("SG.integration".to_string());
    config.rate_limit.max_messages = 3;
    config.rate_limit.window_secs = 600;

    let state = tempdir().unwrap();
    let first = create_dispatcher(&state, config.clone(), &server, GatekeeperPolicy::default());
    let second = create_dispatcher(&state, config, &server, GatekeeperPolicy::default());

    first.send("error one").await.unwrap();
    second.send("error two").await.unwrap();
    first.send("error three").await.unwrap();

    let err = second.send("error four").await.unwrap_err();
    assert!(matches!(
        err,
        NotifyError::RateLimited {
            limit: 3,
            window_secs: 600
        }
    ));
    assert_eq!(sendgrid.calls(), 3);
}

// ============================================================================
// Custom scripts
// ============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_custom_script_runs_after_vetting() {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let server = MockServer::start();
    let scripts = tempdir().unwrap();
    let marker = scripts.path().join("ran.txt");
    let script = scripts.path().join("hook.sh");
    std::fs::write(
        &script,
        format!("#!/bin/sh\necho \"$NOTIFY_CATEGORY\" > '{}'\n", marker.display()),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o750)).unwrap();

    let policy = GatekeeperPolicy {
        invoking_uid: std::fs::metadata(&script).unwrap().uid(),
        privileged_uids: vec![],
    };
    let mut config = NotifyConfig::default();
    config.custom.script = script.to_string_lossy().into_owned();

    let state = tempdir().unwrap();
    let dispatcher = create_dispatcher(&state, config, &server, policy);
    let report = dispatcher.send("Warning: disk nearly full").await.unwrap();

    assert!(matches!(report.outcome(ChannelKind::Custom), Some(DeliveryOutcome::Sent)));
    assert_eq!(std::fs::read_to_string(&marker).unwrap().trim(), "warning");
}

#[cfg(unix)]
#[tokio::test]
async fn test_custom_script_denied_for_foreign_owner() {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let server = MockServer::start();
    let scripts = tempdir().unwrap();
    let script = scripts.path().join("hook.sh");
    std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    let owner = std::fs::metadata(&script).unwrap().uid();

    let policy = GatekeeperPolicy {
        invoking_uid: owner.wrapping_add(1),
        privileged_uids: vec![],
    };
    let mut config = NotifyConfig::default();
    config.custom.script = script.to_string_lossy().into_owned();

    let state = tempdir().unwrap();
    let dispatcher = create_dispatcher(&state, config, &server, policy);
    let report = dispatcher.send("done").await.unwrap();

    assert!(!report.succeeded());
    assert!(matches!(
        report.outcome(ChannelKind::Custom),
        Some(DeliveryOutcome::Failed(NotifyError::Security(_)))
    ));
}
