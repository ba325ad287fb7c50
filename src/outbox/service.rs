//! Outbox service
//!
//! Writes pending postings for the after-save hook and drains them through
//! the posting engine.

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{OperationContext, PostingRequest};
use crate::posting::{PostingEngine, PostingError, PostingOutcome};
use crate::store::{LedgerStore, OutboxUpdate, StoreResult};

use super::{OutboxStatus, PendingPosting};

/// What the hook caller gets back. Never an error.
#[derive(Debug, Clone, Serialize)]
pub struct HookReceipt {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_id: Option<Uuid>,
}

/// Counts from one worker pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutboxReport {
    pub claimed: usize,
    pub posted: usize,
    pub skipped: usize,
    pub retried: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct OutboxService {
    store: Arc<dyn LedgerStore>,
    engine: PostingEngine,
}

impl OutboxService {
    pub fn new(store: Arc<dyn LedgerStore>, engine: PostingEngine) -> Self {
        Self { store, engine }
    }

    /// Record a posting request for later processing.
    ///
    /// The worker posts without a caller, so the acting staff member is
    /// stored as the responsible party when the request names none.
    ///
    /// A store failure is logged and reported as `accepted: false`; the
    /// triggering module's save is never affected.
    pub async fn after_save(&self, mut request: PostingRequest, context: &OperationContext) -> HookReceipt {
        let blank = request
            .responsible_party
            .as_deref()
            .map_or(true, |p| p.trim().is_empty());
        if blank {
            request.responsible_party = context.actor.clone();
        }

        let pending = PendingPosting::new(request);
        let kind = pending.request.trigger.kind();

        match self.store.enqueue_posting(&pending).await {
            Ok(id) => {
                if id != pending.id {
                    tracing::debug!(pending_id = %id, trigger = %kind, "Hook call deduplicated");
                } else {
                    tracing::debug!(pending_id = %id, trigger = %kind, "Posting queued");
                }
                HookReceipt {
                    accepted: true,
                    pending_id: Some(id),
                }
            }
            Err(e) => {
                tracing::warn!(
                    trigger = %kind,
                    unit = %pending.request.unit,
                    error = %e,
                    "Failed to queue posting"
                );
                HookReceipt {
                    accepted: false,
                    pending_id: None,
                }
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> StoreResult<Option<PendingPosting>> {
        self.store.get_pending(id).await
    }

    /// Claim up to `batch_size` pending rows and run each through the engine.
    ///
    /// The pending id doubles as the posting id, so a row that is processed
    /// twice (crash between posting and completion) posts only once.
    pub async fn process_batch(&self, batch_size: i64, max_attempts: i32) -> StoreResult<OutboxReport> {
        let claimed = self.store.claim_pending(batch_size, max_attempts).await?;
        let mut report = OutboxReport {
            claimed: claimed.len(),
            ..Default::default()
        };

        for pending in claimed {
            let context = OperationContext::system();
            let result = self
                .engine
                .post_with_id(pending.id, &pending.request, &context)
                .await;

            let update = match result {
                Ok(PostingOutcome::Posted { posting_id, .. })
                | Ok(PostingOutcome::AlreadyPosted { posting_id }) => {
                    report.posted += 1;
                    OutboxUpdate {
                        status: OutboxStatus::Completed,
                        posting_id: Some(posting_id),
                        error: None,
                    }
                }
                Ok(PostingOutcome::Skipped { reason }) => {
                    report.skipped += 1;
                    OutboxUpdate {
                        status: OutboxStatus::Skipped,
                        posting_id: None,
                        error: Some(reason),
                    }
                }
                Err(e) => self.failure_update(&pending, e, max_attempts, &mut report),
            };

            let status = update.status;
            if let Err(e) = self.store.finish_pending(pending.id, update).await {
                // The posting itself may be committed; the next pass finds it
                // through its posting id.
                tracing::warn!(
                    pending_id = %pending.id,
                    status = %status,
                    error = %e,
                    "Partial posting failure: could not finish outbox row"
                );
            }
        }

        if report.claimed > 0 {
            tracing::info!(
                claimed = report.claimed,
                posted = report.posted,
                skipped = report.skipped,
                retried = report.retried,
                failed = report.failed,
                "Outbox batch processed"
            );
        }

        Ok(report)
    }

    fn failure_update(
        &self,
        pending: &PendingPosting,
        error: PostingError,
        max_attempts: i32,
        report: &mut OutboxReport,
    ) -> OutboxUpdate {
        let exhausted = pending.attempts >= max_attempts;
        let status = if error.is_retryable() && !exhausted {
            report.retried += 1;
            OutboxStatus::Pending
        } else {
            report.failed += 1;
            OutboxStatus::Failed
        };

        tracing::warn!(
            pending_id = %pending.id,
            attempts = pending.attempts,
            status = %status,
            error = %error,
            "Posting attempt failed"
        );

        OutboxUpdate {
            status,
            posting_id: None,
            error: Some(error.to_string()),
        }
    }

    /// Return rows stuck in processing for longer than `stale_after` to the queue.
    ///
    /// Rows that were on their last attempt are failed rather than requeued.
    pub async fn reset_stale(
        &self,
        stale_after: std::time::Duration,
        max_attempts: i32,
    ) -> StoreResult<u64> {
        let stale_after = chrono::Duration::from_std(stale_after)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        let reset = self
            .store
            .reset_stale_pending(chrono::Utc::now() - stale_after, max_attempts)
            .await?;

        if reset > 0 {
            tracing::warn!(rows_affected = reset, "Reset stale outbox claims");
        }
        Ok(reset)
    }
}

impl std::fmt::Debug for OutboxService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxService").finish_non_exhaustive()
    }
}
