//! Batching Queue
//!
//! Defers low-priority messages into an on-disk JSON-lines queue
//! (`<state_dir>/batch_queue.jsonl`) and later drains them as one combined
//! message. Every read-modify-write happens under an advisory lock. A flush
//! either drains the whole queue or, on lock contention, leaves it untouched.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::storage::config::BatchConfig;
use crate::storage::lock::FileLock;

use super::types::NotifyError;

const QUEUE_FILE: &str = "batch_queue.jsonl";
const LOCK_FILE: &str = "batch_queue.lock";

/// One deferred message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub timestamp_ms: i64,
    pub text: String,
}

impl BatchEntry {
    fn clock_time(&self) -> String {
        match Local.timestamp_millis_opt(self.timestamp_ms).single() {
            Some(dt) => dt.format("%H:%M:%S").to_string(),
            None => "--:--:--".to_string(),
        }
    }
}

/// A drained set of queued messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub entries: Vec<BatchEntry>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the batch as a single message: a header line followed by one
    /// `[HH:MM:SS] text` line per entry.
    pub fn combined_message(&self) -> String {
        let mut out = format!("Batched notifications ({})", self.entries.len());
        for entry in &self.entries {
            out.push('\n');
            out.push_str(&format!("[{}] {}", entry.clock_time(), entry.text));
        }
        out
    }
}

/// File-backed batching queue shared across processes.
#[derive(Debug, Clone)]
pub struct BatchQueue {
    queue_path: PathBuf,
    lock_path: PathBuf,
    config: BatchConfig,
}

impl BatchQueue {
    pub fn new(state_dir: &Path, config: BatchConfig) -> Self {
        Self {
            queue_path: state_dir.join(QUEUE_FILE),
            lock_path: state_dir.join(LOCK_FILE),
            config,
        }
    }

    /// Batching is active only with a non-zero delay.
    pub fn is_enabled(&self) -> bool {
        self.config.delay_secs > 0
    }

    /// Append a message stamped with the current time.
    pub fn enqueue(&self, text: &str) -> Result<(), NotifyError> {
        self.enqueue_at(text, chrono::Utc::now().timestamp_millis())
    }

    /// Append a message stamped with `now_ms`.
    pub fn enqueue_at(&self, text: &str, now_ms: i64) -> Result<(), NotifyError> {
        let _lock = self.lock()?;
        let entry = BatchEntry {
            timestamp_ms: now_ms,
            text: text.to_string(),
        };
        let line = serde_json::to_string(&entry)
            .map_err(|e| NotifyError::Io(std::io::Error::other(e)))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.queue_path)?;
        writeln!(file, "{}", line)?;

        tracing::debug!("Queued notification for batching");
        Ok(())
    }

    /// Drain the queue if its oldest entry is due or it reached the size cap.
    pub fn maybe_flush(&self) -> Option<Batch> {
        self.maybe_flush_at(chrono::Utc::now().timestamp_millis())
    }

    /// Drain the queue if due at `now_ms`.
    ///
    /// Returns `None` when the queue is empty, not yet due, or locked by
    /// another process. When the queue was read but could not be cleared the
    /// batch is still returned and the entries stay on disk, so a failure
    /// duplicates messages rather than losing them.
    pub fn maybe_flush_at(&self, now_ms: i64) -> Option<Batch> {
        let _lock = match self.lock() {
            Ok(lock) => lock,
            Err(e) => {
                tracing::debug!("Skipping batch flush: {}", e);
                return None;
            }
        };

        let entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to read batch queue: {}", e);
                return None;
            }
        };
        let oldest = entries.iter().map(|e| e.timestamp_ms).min()?;

        let age_ms = now_ms.saturating_sub(oldest);
        let due = age_ms >= (self.config.delay_secs as i64).saturating_mul(1000)
            || entries.len() as u64 >= self.config.max_size;
        if !due {
            return None;
        }

        if let Err(e) = fs::write(&self.queue_path, "") {
            tracing::warn!("Failed to clear batch queue, entries will be resent: {}", e);
        }

        tracing::info!("Flushing {} batched notifications", entries.len());
        Some(Batch { entries })
    }

    /// Put a drained batch back at the head of the queue.
    pub fn requeue(&self, batch: &Batch) -> Result<(), NotifyError> {
        if batch.is_empty() {
            return Ok(());
        }
        let _lock = self.lock()?;

        let mut content = String::new();
        for entry in &batch.entries {
            let line = serde_json::to_string(entry)
                .map_err(|e| NotifyError::Io(std::io::Error::other(e)))?;
            content.push_str(&line);
            content.push('\n');
        }
        match fs::read_to_string(&self.queue_path) {
            Ok(existing) => content.push_str(&existing),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::write(&self.queue_path, content)?;

        tracing::warn!("Requeued {} batched notifications", batch.len());
        Ok(())
    }

    /// Number of queued entries (unlocked snapshot).
    pub fn pending(&self) -> usize {
        self.read_entries().map(|e| e.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<FileLock, NotifyError> {
        FileLock::acquire(&self.lock_path)
            .map_err(|e| NotifyError::Io(std::io::Error::other(e.to_string())))
    }

    fn read_entries(&self) -> std::io::Result<Vec<BatchEntry>> {
        let content = match fs::read_to_string(&self.queue_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<BatchEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Dropping malformed batch queue line: {}", e);
                    None
                }
            })
            .collect())
    }
}
