//! Ledger Entry Store
//!
//! Persistence for the fee catalog, service records, cash movements, treasury
//! entries and the posting outbox. Two backends share one contract:
//! PostgreSQL for deployments and an in-memory store for development and tests.

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    CashMovement, FeeCatalogEntry, RowVersion, ServiceRecord, SettlementStatus, TreasuryEntry,
};
use crate::outbox::{OutboxStatus, PendingPosting};

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// `last_error` for a claim abandoned on its final attempt
pub(crate) const STALE_CLAIM_EXHAUSTED: &str = "worker did not finish the final attempt";

/// Filter for cash movement listings
#[derive(Debug, Clone, Default)]
pub struct CashFilter {
    pub unit: Option<String>,
    pub status: Option<SettlementStatus>,
}

impl CashFilter {
    pub fn unit(unit: impl Into<String>) -> Self {
        Self {
            unit: Some(unit.into()),
            status: None,
        }
    }

    pub fn with_status(mut self, status: SettlementStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, movement: &CashMovement) -> bool {
        self.unit.as_deref().map_or(true, |u| movement.unit == u)
            && self.status.map_or(true, |s| movement.settlement_status == s)
    }
}

/// How a claimed outbox row ends
#[derive(Debug, Clone)]
pub struct OutboxUpdate {
    pub status: OutboxStatus,
    pub posting_id: Option<Uuid>,
    pub error: Option<String>,
}

/// Storage contract for the unit ledger.
///
/// Every method is atomic. In particular `insert_posting` writes both rows or
/// neither, and `commit_settlement` either sweeps every listed row and writes
/// the treasury entry, or changes nothing.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // Fee catalog

    async fn list_fees(&self) -> StoreResult<Vec<FeeCatalogEntry>>;

    async fn find_fee(&self, unit: &str, service_name: &str)
        -> StoreResult<Option<FeeCatalogEntry>>;

    async fn upsert_fee(&self, entry: &FeeCatalogEntry) -> StoreResult<()>;

    // Postings

    /// Write the service record and cash movement of one posting.
    /// Fails with `DuplicatePosting` if the posting id is already present.
    async fn insert_posting(
        &self,
        record: &ServiceRecord,
        movement: &CashMovement,
    ) -> StoreResult<()>;

    // Service records

    async fn list_service_records(&self, unit: Option<&str>) -> StoreResult<Vec<ServiceRecord>>;

    async fn get_service_record(&self, id: Uuid) -> StoreResult<Option<ServiceRecord>>;

    /// Insert or replace by id
    async fn save_service_record(&self, record: &ServiceRecord) -> StoreResult<()>;

    // Cash movements

    async fn list_cash_movements(&self, filter: &CashFilter) -> StoreResult<Vec<CashMovement>>;

    async fn get_cash_movement(&self, id: Uuid) -> StoreResult<Option<CashMovement>>;

    async fn insert_cash_movement(&self, movement: &CashMovement) -> StoreResult<()>;

    /// Replace a row if its stored version equals `expected_version`.
    /// Returns the stored row with its bumped version.
    /// Settled rows are refused with `Immutable`.
    async fn update_cash_movement(
        &self,
        movement: &CashMovement,
        expected_version: i64,
    ) -> StoreResult<CashMovement>;

    // Settlement

    /// Insert `entry` and flip every listed row to `Settled`.
    ///
    /// Each row must still be `Unsettled` at the listed version, and the net of
    /// the rows must equal the entry amount.
    async fn commit_settlement(
        &self,
        entry: &TreasuryEntry,
        rows: &[RowVersion],
    ) -> StoreResult<Vec<CashMovement>>;

    // Treasury

    async fn insert_treasury_entry(&self, entry: &TreasuryEntry) -> StoreResult<()>;

    async fn list_treasury_entries(&self) -> StoreResult<Vec<TreasuryEntry>>;

    // Outbox

    /// Store a pending posting. When a row with the same dedupe key exists,
    /// nothing is written and the existing id is returned.
    async fn enqueue_posting(&self, pending: &PendingPosting) -> StoreResult<Uuid>;

    async fn get_pending(&self, id: Uuid) -> StoreResult<Option<PendingPosting>>;

    /// Claim up to `limit` pending rows with fewer than `max_attempts`
    /// attempts, marking them processing and counting the attempt.
    async fn claim_pending(&self, limit: i64, max_attempts: i32)
        -> StoreResult<Vec<PendingPosting>>;

    async fn finish_pending(&self, id: Uuid, update: OutboxUpdate) -> StoreResult<()>;

    /// Return rows stuck in processing since before `older_than` to pending.
    ///
    /// A row whose claim already used its last attempt is marked failed
    /// instead, since `claim_pending` would never take it again.
    async fn reset_stale_pending(&self, older_than: DateTime<Utc>, max_attempts: i32)
        -> StoreResult<u64>;
}

/// Net of a set of rows, failing when it differs from the deposit amount.
pub(crate) fn check_settlement_amount(
    entry: &TreasuryEntry,
    rows: &[CashMovement],
) -> StoreResult<()> {
    let rows_net: rust_decimal::Decimal = rows.iter().map(CashMovement::signed_amount).sum();
    if rows_net != entry.amount.value() {
        return Err(StoreError::AmountMismatch {
            rows_net,
            deposit: entry.amount.value(),
        });
    }
    Ok(())
}

/// Reject a row whose observed state no longer allows settlement.
pub(crate) fn check_settleable(row: &CashMovement, expected: &RowVersion) -> StoreResult<()> {
    if row.settlement_status != SettlementStatus::Unsettled || row.version != expected.version {
        return Err(StoreError::NotSettleable {
            id: row.id,
            status: row.settlement_status,
            version: row.version,
        });
    }
    Ok(())
}
