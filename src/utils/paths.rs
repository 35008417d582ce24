//! Cross-Platform Path Utilities
//!
//! Functions for resolving application directories across platforms.
//! Handles ~/.notify-relay/ and the state/lock directory beneath it.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Name of the application directory under the home directory.
const APP_DIR_NAME: &str = ".notify-relay";

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the notify-relay directory (~/.notify-relay/)
pub fn notify_relay_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(APP_DIR_NAME))
}

/// Get the config file path (~/.notify-relay/notify.conf)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(notify_relay_dir()?.join("notify.conf"))
}

/// Get the state directory holding queue, rate-limit and lock files.
///
/// Falls back to the OS temp directory when no home directory is known.
pub fn state_dir() -> PathBuf {
    match notify_relay_dir() {
        Ok(dir) => dir.join("state"),
        Err(_) => std::env::temp_dir().join("notify-relay-state"),
    }
}

/// Ensure a directory exists, creating it owner-only if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
        }
    }
    Ok(())
}

/// Get the state directory, creating it if it doesn't exist
pub fn ensure_state_dir() -> AppResult<PathBuf> {
    let path = state_dir();
    ensure_dir(&path)?;
    Ok(path)
}
