//! Locally persisted view state.
//!
//! Each entry is stored under its own key and is independently
//! absent-tolerant: a missing entry reads as empty, a corrupt one is
//! dropped with a warning.

use std::collections::BTreeSet;
use std::sync::Arc;

use clipflow_models::ClipResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::StoreResult;
use crate::kv::KeyValueStore;

const RESULTS_KEY: &str = "saved_results";
const LOGS_KEY: &str = "saved_logs";
const FILTER_TAGS_KEY: &str = "filter_tags";

/// Maximum number of log lines kept; older lines are discarded first.
pub const MAX_LOG_LINES: usize = 500;

/// Saved results, log lines and filter tags.
#[derive(Clone)]
pub struct LocalState {
    kv: Arc<dyn KeyValueStore>,
}

impl LocalState {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Results saved by the last run.
    pub async fn saved_results(&self) -> Vec<ClipResult> {
        self.read_or_default(RESULTS_KEY).await
    }

    pub async fn save_results(&self, results: &[ClipResult]) -> StoreResult<()> {
        self.write(RESULTS_KEY, &results).await
    }

    /// Saved activity log, oldest first.
    pub async fn log_lines(&self) -> Vec<String> {
        self.read_or_default(LOGS_KEY).await
    }

    /// Append one line, trimming the log to [`MAX_LOG_LINES`].
    pub async fn append_log(&self, line: impl Into<String>) -> StoreResult<()> {
        self.append_logs(vec![line.into()]).await
    }

    /// Append several lines with a single write.
    pub async fn append_logs(&self, new_lines: Vec<String>) -> StoreResult<()> {
        if new_lines.is_empty() {
            return Ok(());
        }

        let mut lines = self.log_lines().await;
        lines.extend(new_lines);
        if lines.len() > MAX_LOG_LINES {
            let excess = lines.len() - MAX_LOG_LINES;
            lines.drain(..excess);
        }
        self.write(LOGS_KEY, &lines).await
    }

    pub async fn clear_logs(&self) -> StoreResult<()> {
        self.kv.remove(LOGS_KEY).await
    }

    /// Tags the user filters results by.
    pub async fn filter_tags(&self) -> BTreeSet<String> {
        self.read_or_default(FILTER_TAGS_KEY).await
    }

    pub async fn save_filter_tags(&self, tags: &BTreeSet<String>) -> StoreResult<()> {
        self.write(FILTER_TAGS_KEY, tags).await
    }

    async fn read_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let raw = match self.kv.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return T::default(),
            Err(e) => {
                warn!(key = %key, "Failed to read local state: {}", e);
                return T::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, "Dropping corrupt local state entry: {}", e);
                if let Err(e) = self.kv.remove(key).await {
                    warn!(key = %key, "Failed to remove corrupt entry: {}", e);
                }
                T::default()
            }
        }
    }

    async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        let encoded = serde_json::to_string(value)?;
        self.kv.set(key, &encoded).await
    }
}
