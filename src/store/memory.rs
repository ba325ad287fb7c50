//! In-memory ledger store for development and testing.
//!
//! All tables sit behind one async `RwLock`, so every trait method is atomic
//! with respect to every other. Not durable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    check_settleable, check_settlement_amount, CashFilter, LedgerStore, OutboxUpdate, StoreError,
    StoreResult, STALE_CLAIM_EXHAUSTED,
};
use crate::domain::{
    CashMovement, FeeCatalogEntry, RowVersion, ServiceRecord, SettlementStatus, TreasuryEntry,
};
use crate::outbox::{OutboxStatus, PendingPosting};

#[derive(Debug, Default)]
struct Tables {
    fees: Vec<FeeCatalogEntry>,
    service_records: Vec<ServiceRecord>,
    cash_movements: Vec<CashMovement>,
    treasury: Vec<TreasuryEntry>,
    outbox: Vec<PendingPosting>,
}

impl Tables {
    fn posting_exists(&self, posting_id: Uuid) -> bool {
        self.service_records
            .iter()
            .any(|r| r.posting_id == Some(posting_id))
            || self
                .cash_movements
                .iter()
                .any(|m| m.posting_id == Some(posting_id))
    }
}

/// In-memory implementation of [`LedgerStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in each table: (service records, cash movements, treasury entries)
    pub async fn counts(&self) -> (usize, usize, usize) {
        let tables = self.tables.read().await;
        (
            tables.service_records.len(),
            tables.cash_movements.len(),
            tables.treasury.len(),
        )
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn list_fees(&self) -> StoreResult<Vec<FeeCatalogEntry>> {
        Ok(self.tables.read().await.fees.clone())
    }

    async fn find_fee(
        &self,
        unit: &str,
        service_name: &str,
    ) -> StoreResult<Option<FeeCatalogEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .fees
            .iter()
            .find(|f| f.unit == unit && f.service_name == service_name)
            .cloned())
    }

    async fn upsert_fee(&self, entry: &FeeCatalogEntry) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables
            .fees
            .iter_mut()
            .find(|f| f.unit == entry.unit && f.service_name == entry.service_name)
        {
            Some(existing) => *existing = entry.clone(),
            None => tables.fees.push(entry.clone()),
        }
        Ok(())
    }

    async fn insert_posting(
        &self,
        record: &ServiceRecord,
        movement: &CashMovement,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;

        for posting_id in [record.posting_id, movement.posting_id].into_iter().flatten() {
            if tables.posting_exists(posting_id) {
                return Err(StoreError::DuplicatePosting(posting_id));
            }
        }

        tables.service_records.push(record.clone());
        tables.cash_movements.push(movement.clone());
        Ok(())
    }

    async fn list_service_records(&self, unit: Option<&str>) -> StoreResult<Vec<ServiceRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .service_records
            .iter()
            .filter(|r| unit.map_or(true, |u| r.unit == u))
            .cloned()
            .collect())
    }

    async fn get_service_record(&self, id: Uuid) -> StoreResult<Option<ServiceRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.service_records.iter().find(|r| r.id == id).cloned())
    }

    async fn save_service_record(&self, record: &ServiceRecord) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables.service_records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => tables.service_records.push(record.clone()),
        }
        Ok(())
    }

    async fn list_cash_movements(&self, filter: &CashFilter) -> StoreResult<Vec<CashMovement>> {
        let tables = self.tables.read().await;
        Ok(tables
            .cash_movements
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect())
    }

    async fn get_cash_movement(&self, id: Uuid) -> StoreResult<Option<CashMovement>> {
        let tables = self.tables.read().await;
        Ok(tables.cash_movements.iter().find(|m| m.id == id).cloned())
    }

    async fn insert_cash_movement(&self, movement: &CashMovement) -> StoreResult<()> {
        self.tables.write().await.cash_movements.push(movement.clone());
        Ok(())
    }

    async fn update_cash_movement(
        &self,
        movement: &CashMovement,
        expected_version: i64,
    ) -> StoreResult<CashMovement> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .cash_movements
            .iter_mut()
            .find(|m| m.id == movement.id)
            .ok_or(StoreError::NotFound(movement.id))?;

        if stored.settlement_status == SettlementStatus::Settled {
            return Err(StoreError::Immutable(stored.id));
        }
        if stored.version != expected_version {
            return Err(StoreError::ConcurrencyConflict {
                id: stored.id,
                expected: expected_version,
                actual: stored.version,
            });
        }

        let mut updated = movement.clone();
        updated.version = stored.version + 1;
        updated.created_at = stored.created_at;
        updated.updated_at = Utc::now();
        *stored = updated.clone();
        Ok(updated)
    }

    async fn commit_settlement(
        &self,
        entry: &TreasuryEntry,
        rows: &[RowVersion],
    ) -> StoreResult<Vec<CashMovement>> {
        let mut tables = self.tables.write().await;

        // Verify everything before touching anything
        let mut selected = Vec::with_capacity(rows.len());
        for expected in rows {
            let row = tables
                .cash_movements
                .iter()
                .find(|m| m.id == expected.id)
                .ok_or(StoreError::NotFound(expected.id))?;
            check_settleable(row, expected)?;
            selected.push(row.clone());
        }
        check_settlement_amount(entry, &selected)?;

        let now = Utc::now();
        let mut settled = Vec::with_capacity(rows.len());
        for row in tables
            .cash_movements
            .iter_mut()
            .filter(|m| rows.iter().any(|r| r.id == m.id))
        {
            row.settlement_status = SettlementStatus::Settled;
            row.settlement_id = Some(entry.id);
            row.version += 1;
            row.updated_at = now;
            settled.push(row.clone());
        }
        tables.treasury.push(entry.clone());

        Ok(settled)
    }

    async fn insert_treasury_entry(&self, entry: &TreasuryEntry) -> StoreResult<()> {
        self.tables.write().await.treasury.push(entry.clone());
        Ok(())
    }

    async fn list_treasury_entries(&self) -> StoreResult<Vec<TreasuryEntry>> {
        Ok(self.tables.read().await.treasury.clone())
    }

    async fn enqueue_posting(&self, pending: &PendingPosting) -> StoreResult<Uuid> {
        let mut tables = self.tables.write().await;
        if let Some(key) = pending.dedupe_key.as_deref() {
            if let Some(existing) = tables
                .outbox
                .iter()
                .find(|p| p.dedupe_key.as_deref() == Some(key))
            {
                return Ok(existing.id);
            }
        }
        tables.outbox.push(pending.clone());
        Ok(pending.id)
    }

    async fn get_pending(&self, id: Uuid) -> StoreResult<Option<PendingPosting>> {
        let tables = self.tables.read().await;
        Ok(tables.outbox.iter().find(|p| p.id == id).cloned())
    }

    async fn claim_pending(
        &self,
        limit: i64,
        max_attempts: i32,
    ) -> StoreResult<Vec<PendingPosting>> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let limit = usize::try_from(limit).unwrap_or(0);

        let mut claimed = Vec::new();
        for pending in tables
            .outbox
            .iter_mut()
            .filter(|p| p.status == OutboxStatus::Pending && p.attempts < max_attempts)
            .take(limit)
        {
            pending.status = OutboxStatus::Processing;
            pending.attempts += 1;
            pending.processing_started_at = Some(now);
            claimed.push(pending.clone());
        }
        Ok(claimed)
    }

    async fn finish_pending(&self, id: Uuid, update: OutboxUpdate) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let pending = tables
            .outbox
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::NotFound(id))?;

        pending.status = update.status;
        pending.posting_id = update.posting_id.or(pending.posting_id);
        pending.last_error = update.error;
        if update.status.is_terminal() {
            pending.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn reset_stale_pending(&self, older_than: DateTime<Utc>, max_attempts: i32) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let mut reset = 0;
        for pending in tables.outbox.iter_mut().filter(|p| {
            p.status == OutboxStatus::Processing
                && p.processing_started_at.map_or(true, |t| t < older_than)
        }) {
            if pending.attempts >= max_attempts {
                pending.status = OutboxStatus::Failed;
                pending.last_error = Some(STALE_CLAIM_EXHAUSTED.to_string());
                pending.completed_at = Some(now);
            } else {
                pending.status = OutboxStatus::Pending;
            }
            reset += 1;
        }
        Ok(reset)
    }
}
