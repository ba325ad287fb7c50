//! Posting Engine
//!
//! Turns a domain trigger into one service record and one cash movement,
//! written together under a shared posting id.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::FeeCatalog;
use crate::domain::{
    CashMovement, Direction, DomainError, OperationContext, PostingRequest, ServiceRecord,
    SettlementStatus,
};
use crate::store::{LedgerStore, StoreError};

use super::directory::{NoDirectory, SubjectDirectory};
use super::rules::RuleTable;

/// Result of a posting attempt
#[derive(Debug, Clone)]
pub enum PostingOutcome {
    /// Both rows were written
    Posted {
        posting_id: Uuid,
        service_record: ServiceRecord,
        cash_movement: CashMovement,
    },
    /// Rows for this posting id already exist. Callers treat this as success.
    AlreadyPosted { posting_id: Uuid },
    /// No rule matched; nothing was written
    Skipped { reason: String },
}

impl PostingOutcome {
    pub fn posting_id(&self) -> Option<Uuid> {
        match self {
            PostingOutcome::Posted { posting_id, .. }
            | PostingOutcome::AlreadyPosted { posting_id } => Some(*posting_id),
            PostingOutcome::Skipped { .. } => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, PostingOutcome::Skipped { .. })
    }
}

/// Posting failures
#[derive(Debug, thiserror::Error)]
pub enum PostingError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl PostingError {
    /// Whether running the same request again may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            PostingError::Domain(_) => false,
            PostingError::Store(e) => e.is_retryable(),
        }
    }
}

/// Posting Engine
#[derive(Clone)]
pub struct PostingEngine {
    store: Arc<dyn LedgerStore>,
    catalog: FeeCatalog,
    rules: Arc<RuleTable>,
    directory: Arc<dyn SubjectDirectory>,
}

impl PostingEngine {
    pub fn new(store: Arc<dyn LedgerStore>, catalog: FeeCatalog, rules: RuleTable) -> Self {
        Self {
            store,
            catalog,
            rules: Arc::new(rules),
            directory: Arc::new(NoDirectory),
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn SubjectDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Post under a fresh posting id
    pub async fn post(
        &self,
        request: &PostingRequest,
        context: &OperationContext,
    ) -> Result<PostingOutcome, PostingError> {
        self.post_with_id(Uuid::new_v4(), request, context).await
    }

    /// Post under a caller-chosen posting id. Repeating a call with the same
    /// id writes nothing and returns `AlreadyPosted`.
    pub async fn post_with_id(
        &self,
        posting_id: Uuid,
        request: &PostingRequest,
        context: &OperationContext,
    ) -> Result<PostingOutcome, PostingError> {
        let origin_unit = request.unit.trim();
        let subject_name = request.subject_name.trim();
        if origin_unit.is_empty() {
            return Err(DomainError::validation("unit is required").into());
        }
        if subject_name.is_empty() {
            return Err(DomainError::validation("subject_name is required").into());
        }
        if request.quantity == 0 {
            return Err(DomainError::validation("quantity must be at least 1").into());
        }

        let Some(resolved) = self.rules.resolve(request) else {
            let reason = format!(
                "no posting rule for {} '{}'",
                request.trigger.kind(),
                request.trigger.primary_value()
            );
            tracing::debug!(unit = %origin_unit, reason = %reason, "Posting skipped");
            return Ok(PostingOutcome::Skipped { reason });
        };

        let unit_price = self
            .catalog
            .price_or_default(&resolved.unit, &resolved.service_name, resolved.default_price)
            .await;
        let amount = unit_price.times(request.quantity).map_err(DomainError::from)?;

        let subject_id = match non_blank(request.subject_id.as_deref()) {
            Some(id) => Some(id.to_string()),
            None => self.find_subject_id(subject_name).await,
        };

        let responsible_party = match non_blank(request.responsible_party.as_deref()) {
            Some(party) => party.to_string(),
            None => context.responsible_party_for(origin_unit),
        };

        let note = match non_blank(request.note.as_deref()) {
            Some(note) => note.to_string(),
            None => format!("{} a.n. {}", resolved.service_name, subject_name),
        };

        let now = Utc::now();
        let quantity = i32::try_from(request.quantity)
            .map_err(|_| DomainError::validation("quantity is too large"))?;

        let service_record = ServiceRecord {
            id: Uuid::new_v4(),
            posting_id: Some(posting_id),
            date: request.date,
            unit: resolved.unit.clone(),
            subject_name: subject_name.to_string(),
            subject_id,
            service_name: resolved.service_name.clone(),
            amount,
            note: note.clone(),
            responsible_party: responsible_party.clone(),
            quantity,
            created_at: now,
            updated_at: now,
        };

        let cash_movement = CashMovement {
            id: Uuid::new_v4(),
            posting_id: Some(posting_id),
            date: request.date,
            unit: resolved.unit.clone(),
            direction: Direction::Masuk,
            category: resolved.category.clone(),
            amount,
            subject_name: Some(subject_name.to_string()),
            note,
            responsible_party,
            settlement_status: SettlementStatus::Unsettled,
            settlement_id: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        match self.store.insert_posting(&service_record, &cash_movement).await {
            Ok(()) => {}
            Err(StoreError::DuplicatePosting(_)) => {
                tracing::info!(posting_id = %posting_id, "Posting already recorded");
                return Ok(PostingOutcome::AlreadyPosted { posting_id });
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            posting_id = %posting_id,
            unit = %resolved.unit,
            service_name = %resolved.service_name,
            amount = %amount,
            correlation_id = ?context.correlation_id,
            "Posting recorded"
        );

        Ok(PostingOutcome::Posted {
            posting_id,
            service_record,
            cash_movement,
        })
    }

    async fn find_subject_id(&self, subject_name: &str) -> Option<String> {
        match self.directory.find_subject_id(subject_name).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(subject_name = %subject_name, error = %e, "Subject lookup failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for PostingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostingEngine")
            .field("rules", &self.rules.rules().len())
            .finish()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
