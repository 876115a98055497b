//! Retry queue for legs that exhausted their in-request attempts
//!
//! The orchestrator only records entries; redriving them is the job of an
//! out-of-band process that polls [`RetryQueueStore::due`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{PlatformError, Result};
use crate::transform::PlatformContent;
use crate::types::Platform;

/// Cap on the exponent of the queue backoff
const MAX_BACKOFF_EXPONENT: u32 = 6;

/// A leg waiting to be re-attempted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryQueueEntry {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    /// JSON of the transformed [`PlatformContent`]
    pub serialized_content: String,
    /// JSON of the request's publish options
    pub serialized_options: String,
    /// SHA-256 hex digest of `serialized_content`
    pub content_hash: String,
    /// Attempts made so far
    pub attempt_count: u32,
    pub last_error: Option<String>,
    /// Unix timestamp before which the entry must not be redriven
    pub next_retry_at: i64,
    pub created_at: i64,
}

impl RetryQueueEntry {
    /// Capture a failed leg for later redrive
    pub fn new(
        user_id: impl Into<String>,
        content: &PlatformContent,
        attempt_count: u32,
        last_error: &PlatformError,
        next_retry_at: i64,
        now: i64,
    ) -> serde_json::Result<Self> {
        let serialized_content = serde_json::to_string(content)?;
        let serialized_options = serde_json::to_string(&content.options)?;

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            platform: content.platform,
            content_hash: content_hash(&serialized_content),
            serialized_content,
            serialized_options,
            attempt_count,
            last_error: Some(last_error.to_string()),
            next_retry_at,
            created_at: now,
        })
    }

    /// Decode the stored content
    pub fn content(&self) -> serde_json::Result<PlatformContent> {
        serde_json::from_str(&self.serialized_content)
    }

    pub fn is_due(&self, now: i64) -> bool {
        self.next_retry_at <= now
    }
}

/// SHA-256 hex digest used to spot duplicate queue entries
pub fn content_hash(serialized: &str) -> String {
    format!("{:x}", Sha256::digest(serialized.as_bytes()))
}

/// `now + base * 2^min(attempts, 6)` in unix seconds
pub fn next_retry_at(now: i64, base: Duration, attempts: u32) -> i64 {
    let factor = 2_i64.pow(attempts.min(MAX_BACKOFF_EXPONENT));
    now.saturating_add((base.as_secs() as i64).saturating_mul(factor))
}

/// Durable store of retry queue entries
#[async_trait]
pub trait RetryQueueStore: Send + Sync {
    async fn enqueue(&self, entry: RetryQueueEntry) -> Result<()>;

    /// Entries due at `now`, earliest first
    async fn due(&self, now: i64, limit: usize) -> Result<Vec<RetryQueueEntry>>;

    /// Remove an entry; false if it did not exist
    async fn remove(&self, id: &str) -> Result<bool>;

    async fn len(&self) -> Result<usize>;
}

/// Process-local retry queue
#[derive(Default)]
pub struct InMemoryRetryQueue {
    entries: Mutex<Vec<RetryQueueEntry>>,
}

impl InMemoryRetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every queued entry
    pub fn entries(&self) -> Vec<RetryQueueEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl RetryQueueStore for InMemoryRetryQueue {
    async fn enqueue(&self, entry: RetryQueueEntry) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
        Ok(())
    }

    async fn due(&self, now: i64, limit: usize) -> Result<Vec<RetryQueueEntry>> {
        let mut due: Vec<RetryQueueEntry> = self
            .entries()
            .into_iter()
            .filter(|e| e.is_due(now))
            .collect();
        due.sort_by_key(|e| e.next_retry_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|e| e.id != id);
        Ok(entries.len() != before)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.lock().unwrap_or_else(|e| e.into_inner()).len())
    }
}
