//! Sliding-Window Rate Limiter
//!
//! Caps total dispatch attempts (not per channel) at N per trailing window of
//! W seconds. State is one millisecond timestamp per line in
//! `<state_dir>/rate_limit.log`, guarded by an advisory lock so overlapping
//! processes share the budget. Storage or lock failures fail open.

use std::fs;
use std::path::{Path, PathBuf};

use crate::storage::config::RateLimitConfig;
use crate::storage::lock::FileLock;
use crate::utils::error::AppResult;

use super::types::NotifyError;

const LOG_FILE: &str = "rate_limit.log";
const LOCK_FILE: &str = "rate_limit.lock";

/// Shared, file-backed sliding-window rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    log_path: PathBuf,
    lock_path: PathBuf,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(state_dir: &Path, config: RateLimitConfig) -> Self {
        Self {
            log_path: state_dir.join(LOG_FILE),
            lock_path: state_dir.join(LOCK_FILE),
            config,
        }
    }

    /// Whether limiting is active at all.
    pub fn is_enabled(&self) -> bool {
        self.config.max_messages > 0
    }

    /// Check and record an attempt at the current time.
    pub fn check(&self) -> Result<(), NotifyError> {
        self.check_at(chrono::Utc::now().timestamp_millis())
    }

    /// Check and record an attempt at `now_ms` (Unix milliseconds).
    ///
    /// Rejects when the window already holds N attempts; otherwise records
    /// `now_ms` and accepts.
    pub fn check_at(&self, now_ms: i64) -> Result<(), NotifyError> {
        if !self.is_enabled() {
            return Ok(());
        }

        match self.record(now_ms) {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(
                    "Rate limit reached: {} notifications per {}s",
                    self.config.max_messages,
                    self.config.window_secs
                );
                Err(NotifyError::RateLimited {
                    limit: self.config.max_messages,
                    window_secs: self.config.window_secs,
                })
            }
            Err(e) => {
                tracing::warn!("Rate limiter unavailable, allowing notification: {}", e);
                Ok(())
            }
        }
    }

    /// Number of attempts currently inside the window ending at `now_ms`.
    pub fn current_count_at(&self, now_ms: i64) -> usize {
        self.read_window(now_ms).map(|w| w.len()).unwrap_or(0)
    }

    fn record(&self, now_ms: i64) -> AppResult<bool> {
        let _lock = FileLock::acquire(&self.lock_path)?;

        let mut window = self.read_window(now_ms)?;
        let allowed = (window.len() as u64) < self.config.max_messages;
        if allowed {
            window.push(now_ms);
        }

        let mut content = String::with_capacity(window.len() * 14);
        for ts in &window {
            content.push_str(&ts.to_string());
            content.push('\n');
        }
        fs::write(&self.log_path, content)?;

        Ok(allowed)
    }

    /// Read recorded timestamps, dropping malformed lines and entries that
    /// have left the window.
    fn read_window(&self, now_ms: i64) -> AppResult<Vec<i64>> {
        let content = match fs::read_to_string(&self.log_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let cutoff = now_ms.saturating_sub((self.config.window_secs as i64).saturating_mul(1000));
        Ok(content
            .lines()
            .filter_map(|line| line.trim().parse::<i64>().ok())
            .filter(|ts| *ts > cutoff)
            .collect())
    }
}
