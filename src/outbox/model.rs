//! Outbox records
//!
//! A pending posting is written by the after-save hook of another module and
//! applied later by the outbox worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::PostingRequest;

/// Processing status of a pending posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Processing,
    Completed,
    Skipped,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Processing => "processing",
            OutboxStatus::Completed => "completed",
            OutboxStatus::Skipped => "skipped",
            OutboxStatus::Failed => "failed",
        }
    }

    /// Whether the worker is done with this row
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OutboxStatus::Completed | OutboxStatus::Skipped | OutboxStatus::Failed
        )
    }
}

impl From<String> for OutboxStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "processing" => OutboxStatus::Processing,
            "completed" => OutboxStatus::Completed,
            "skipped" => OutboxStatus::Skipped,
            "failed" => OutboxStatus::Failed,
            _ => OutboxStatus::Pending,
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable request to run the posting engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingPosting {
    /// Also used as the posting id of the rows it produces
    pub id: Uuid,
    /// Set when the caller supplied a source id; repeated hook calls collapse onto one row
    pub dedupe_key: Option<String>,
    pub request: PostingRequest,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub posting_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PendingPosting {
    pub fn new(request: PostingRequest) -> Self {
        let dedupe_key = dedupe_key(&request);
        Self {
            id: Uuid::new_v4(),
            dedupe_key,
            request,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            posting_id: None,
            created_at: Utc::now(),
            processing_started_at: None,
            completed_at: None,
        }
    }
}

/// Hex SHA-256 of trigger kind and source id, when a source id is present.
pub fn dedupe_key(request: &PostingRequest) -> Option<String> {
    let source_id = request.source_id.as_deref()?.trim();
    if source_id.is_empty() {
        return None;
    }

    let mut hasher = Sha256::new();
    hasher.update(request.trigger.kind().as_str().as_bytes());
    hasher.update(b":");
    hasher.update(source_id.as_bytes());
    Some(hex::encode(hasher.finalize()))
}
