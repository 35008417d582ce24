//! Custom-Script Gatekeeper
//!
//! Security chokepoint for the custom executable channel. A script must pass
//! every check below, in order, before it may run:
//!
//! 1. absolute path, no `..` segment, no shell metacharacters
//! 2. existing, regular, executable file
//! 3. owned by the invoking user or a privileged account
//! 4. not world-writable
//! 5. content free of known destructive idioms
//! 6. privileged-owner scripts confirmed once per content hash
//!
//! The content deny-list is a best-effort static match; ownership and
//! confirmation are what actually gate execution.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;

use notify_relay_core::validation::validate_path;

use super::types::DenialReason;

const CONFIRMED_SCRIPTS_FILE: &str = "confirmed_scripts";

// ============================================================================
// Policy
// ============================================================================

/// Which owners the gatekeeper trusts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatekeeperPolicy {
    /// Effective uid of the invoking user
    pub invoking_uid: u32,
    /// Accounts whose scripts are trusted after confirmation
    pub privileged_uids: Vec<u32>,
}

impl Default for GatekeeperPolicy {
    fn default() -> Self {
        Self {
            invoking_uid: current_uid(),
            privileged_uids: vec![0],
        }
    }
}

#[cfg(unix)]
fn current_uid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() }
}

#[cfg(not(unix))]
fn current_uid() -> u32 {
    0
}

// ============================================================================
// Confirmation
// ============================================================================

/// Asks the operator whether a privileged-owner script may run.
pub trait ScriptConfirmer: Send + Sync {
    fn confirm(&self, path: &Path, digest: &str) -> bool;
}

/// Interactive terminal confirmation. Declines when there is no terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct DialoguerConfirmer;

impl ScriptConfirmer for DialoguerConfirmer {
    fn confirm(&self, path: &Path, digest: &str) -> bool {
        use std::io::IsTerminal;

        if !std::io::stdin().is_terminal() || !std::io::stderr().is_terminal() {
            tracing::warn!(
                "Custom script {} needs confirmation but no terminal is attached",
                path.display()
            );
            return false;
        }

        let short = digest.get(..16).unwrap_or(digest);
        dialoguer::Confirm::new()
            .with_prompt(format!(
                "Allow custom notification script {} (sha256 {}) to run?",
                path.display(),
                short
            ))
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

// ============================================================================
// Content deny-list
// ============================================================================

struct DenyRule {
    name: &'static str,
    regex: Regex,
}

const DENY_PATTERNS: &[(&str, &str)] = &[
    (
        "recursive-delete-root",
        r#"(?im)\brm\s+(?:-\S+\s+)*-[a-z]*r[a-z]*\s+(?:-\S+\s+)*(?:/\*?|~/?|"?\$HOME"?/?|\$\{HOME\}/?)(?:[\s;&|]|$)"#,
    ),
    (
        "raw-disk-write",
        r"(?im)\bdd\b[^\n]*\bof=/dev/(?:sd|hd|vd|xvd|nvme|mmcblk|disk|rdisk)",
    ),
    (
        "raw-disk-redirect",
        r"(?im)>\s*/dev/(?:sd[a-z]|hd[a-z]|vd[a-z]|xvd[a-z]|nvme\d|mmcblk\d|r?disk\d)",
    ),
    ("filesystem-format", r"(?im)\bmkfs(?:\.\w+)?\b"),
    (
        "disk-erase",
        r"(?im)\bdiskutil\s+(?:erase\w*|zerodisk|randomdisk|secureerase)\b",
    ),
    ("drive-format", r"(?im)\bformat\s+[a-z]:"),
    (
        "fetch-pipe-shell",
        r"(?im)\b(?:curl|wget)\b[^|\n]*\|\s*(?:sudo\s+)?(?:ba|z|k|da|fi)?sh\b",
    ),
    ("reverse-shell-dev-tcp", r"(?im)/dev/(?:tcp|udp)/"),
    ("reverse-shell-netcat", r"(?im)\b(?:nc|ncat|netcat)\b[^\n]*\s-[a-z]*e\b"),
    ("reverse-shell-socat", r"(?im)\bsocat\b[^\n]*\bexec:"),
    ("interactive-shell-redirect", r"(?im)\bbash\s+-i\s*>&"),
    ("fork-bomb", r"(?m):\s*\(\s*\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:"),
    (
        "chmod-777-root",
        r"(?im)\bchmod\s+(?:-\S+\s+)*777\s+(?:-\S+\s+)*/(?:[\s;&|]|$)",
    ),
];

fn deny_rules() -> &'static [DenyRule] {
    static RULES: OnceLock<Vec<DenyRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        DENY_PATTERNS
            .iter()
            .filter_map(|&(name, pattern)| {
                Regex::new(pattern)
                    .map_err(|e| tracing::error!("Invalid deny-list rule {}: {}", name, e))
                    .ok()
                    .map(|regex| DenyRule { name, regex })
            })
            .collect()
    })
}

/// Name of the first deny-list rule matching `content`, if any.
pub fn scan_content(content: &str) -> Option<&'static str> {
    deny_rules()
        .iter()
        .find(|rule| rule.regex.is_match(content))
        .map(|rule| rule.name)
}

// ============================================================================
// Gatekeeper
// ============================================================================

/// Vets custom scripts before they are executed.
#[derive(Clone)]
pub struct Gatekeeper {
    policy: GatekeeperPolicy,
    confirmer: Arc<dyn ScriptConfirmer>,
    cache_path: PathBuf,
}

impl Gatekeeper {
    pub fn new(
        state_dir: &Path,
        policy: GatekeeperPolicy,
        confirmer: Arc<dyn ScriptConfirmer>,
    ) -> Self {
        Self {
            policy,
            confirmer,
            cache_path: state_dir.join(CONFIRMED_SCRIPTS_FILE),
        }
    }

    pub fn policy(&self) -> &GatekeeperPolicy {
        &self.policy
    }

    /// Run every check against `script`, returning the path to execute.
    #[cfg(unix)]
    pub fn vet(&self, script: &str) -> Result<PathBuf, DenialReason> {
        use std::os::unix::fs::MetadataExt;

        let path = Self::check_path(script)?;

        let meta = std::fs::metadata(&path).map_err(|_| DenialReason::NotFound)?;
        if !meta.is_file() {
            return Err(DenialReason::NotRegularFile);
        }
        let mode = meta.mode();
        if mode & 0o111 == 0 {
            return Err(DenialReason::NotExecutable);
        }

        let owner = meta.uid();
        let privileged_owner = self.policy.privileged_uids.contains(&owner);
        if owner != self.policy.invoking_uid && !privileged_owner {
            return Err(DenialReason::UntrustedOwner { uid: owner });
        }

        if mode & 0o002 != 0 {
            return Err(DenialReason::WorldWritable);
        }

        let content = std::fs::read(&path).map_err(|_| DenialReason::NotFound)?;
        if let Some(rule) = scan_content(&String::from_utf8_lossy(&content)) {
            tracing::warn!("Custom script {} matches deny-list rule {}", path.display(), rule);
            return Err(DenialReason::DangerousContent {
                rule: rule.to_string(),
            });
        }

        if privileged_owner {
            self.require_confirmation(&path, &content)?;
        }

        Ok(path)
    }

    #[cfg(not(unix))]
    pub fn vet(&self, script: &str) -> Result<PathBuf, DenialReason> {
        Self::check_path(script)?;
        Err(DenialReason::UnsupportedPlatform)
    }

    fn check_path(script: &str) -> Result<PathBuf, DenialReason> {
        let path = Path::new(script);
        if !path.is_absolute() {
            return Err(DenialReason::NotAbsolute);
        }
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(DenialReason::PathTraversal);
        }
        validate_path(script, false).map_err(|e| DenialReason::UnsafePath(e.to_string()))?;
        Ok(path.to_path_buf())
    }

    /// Check the confirmation cache for this content, prompting on a miss.
    fn require_confirmation(&self, path: &Path, content: &[u8]) -> Result<(), DenialReason> {
        let digest = sha256_hex(content);
        if self.is_confirmed(&digest) {
            tracing::debug!("Custom script {} already confirmed", path.display());
            return Ok(());
        }

        if !self.confirmer.confirm(path, &digest) {
            return Err(DenialReason::ConfirmationDeclined);
        }

        if let Err(e) = self.remember(&digest, path) {
            tracing::warn!("Failed to record script confirmation: {}", e);
        }
        Ok(())
    }

    fn is_confirmed(&self, digest: &str) -> bool {
        std::fs::read_to_string(&self.cache_path)
            .map(|content| {
                content
                    .lines()
                    .any(|line| line.split_whitespace().next() == Some(digest))
            })
            .unwrap_or(false)
    }

    fn remember(&self, digest: &str, path: &Path) -> std::io::Result<()> {
        use std::io::Write;

        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.cache_path)?;
        writeln!(file, "{}  {}", digest, path.display())
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
