//! PostgreSQL ledger store
//!
//! Every multi-row operation runs in a single transaction. Settlement locks
//! the selected rows with `FOR UPDATE` before verifying their versions.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{
    check_settleable, check_settlement_amount, CashFilter, LedgerStore, OutboxUpdate, StoreError,
    StoreResult, STALE_CLAIM_EXHAUSTED,
};
use crate::domain::{
    Amount, CashMovement, FeeCatalogEntry, RowVersion, ServiceRecord, SettlementStatus,
    TreasuryEntry,
};
use crate::outbox::{OutboxStatus, PendingPosting};

const SERVICE_RECORD_COLUMNS: &str = "id, posting_id, date, unit, subject_name, subject_id, \
     service_name, amount, note, responsible_party, quantity, created_at, updated_at";

const CASH_MOVEMENT_COLUMNS: &str = "id, posting_id, date, unit, direction, category, amount, \
     subject_name, note, responsible_party, settlement_status, settlement_id, version, \
     created_at, updated_at";

const TREASURY_COLUMNS: &str =
    "id, date, direction, amount, category, note, recipient, unit, created_at";

const OUTBOX_COLUMNS: &str = "id, dedupe_key, request, status, attempts, last_error, \
     posting_id, created_at, processing_started_at, completed_at";

// =========================================================================
// Row mappings
// =========================================================================

fn amount(value: Decimal) -> StoreResult<Amount> {
    Amount::new(value).map_err(|e| StoreError::Corrupt(e.to_string()))
}

#[derive(sqlx::FromRow)]
struct FeeRow {
    unit: String,
    service_name: String,
    price: Decimal,
    active: bool,
}

impl TryFrom<FeeRow> for FeeCatalogEntry {
    type Error = StoreError;

    fn try_from(row: FeeRow) -> StoreResult<Self> {
        Ok(Self {
            unit: row.unit,
            service_name: row.service_name,
            price: amount(row.price)?,
            active: row.active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ServiceRecordRow {
    id: Uuid,
    posting_id: Option<Uuid>,
    date: NaiveDate,
    unit: String,
    subject_name: String,
    subject_id: Option<String>,
    service_name: String,
    amount: Decimal,
    note: String,
    responsible_party: String,
    quantity: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ServiceRecordRow> for ServiceRecord {
    type Error = StoreError;

    fn try_from(row: ServiceRecordRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            posting_id: row.posting_id,
            date: row.date,
            unit: row.unit,
            subject_name: row.subject_name,
            subject_id: row.subject_id,
            service_name: row.service_name,
            amount: amount(row.amount)?,
            note: row.note,
            responsible_party: row.responsible_party,
            quantity: row.quantity,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CashMovementRow {
    id: Uuid,
    posting_id: Option<Uuid>,
    date: NaiveDate,
    unit: String,
    direction: String,
    category: String,
    amount: Decimal,
    subject_name: Option<String>,
    note: String,
    responsible_party: String,
    settlement_status: String,
    settlement_id: Option<Uuid>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CashMovementRow> for CashMovement {
    type Error = StoreError;

    fn try_from(row: CashMovementRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            posting_id: row.posting_id,
            date: row.date,
            unit: row.unit,
            direction: row.direction.parse().map_err(StoreError::Corrupt)?,
            category: row.category,
            amount: amount(row.amount)?,
            subject_name: row.subject_name,
            note: row.note,
            responsible_party: row.responsible_party,
            settlement_status: row.settlement_status.parse().map_err(StoreError::Corrupt)?,
            settlement_id: row.settlement_id,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TreasuryRow {
    id: Uuid,
    date: NaiveDate,
    direction: String,
    amount: Decimal,
    category: String,
    note: String,
    recipient: String,
    unit: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TreasuryRow> for TreasuryEntry {
    type Error = StoreError;

    fn try_from(row: TreasuryRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            date: row.date,
            direction: row.direction.parse().map_err(StoreError::Corrupt)?,
            amount: amount(row.amount)?,
            category: row.category,
            note: row.note,
            recipient: row.recipient,
            unit: row.unit,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: Uuid,
    dedupe_key: Option<String>,
    request: serde_json::Value,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    posting_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    processing_started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<OutboxRow> for PendingPosting {
    type Error = StoreError;

    fn try_from(row: OutboxRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.id,
            dedupe_key: row.dedupe_key,
            request: serde_json::from_value(row.request)?,
            status: OutboxStatus::from(row.status),
            attempts: row.attempts,
            last_error: row.last_error,
            posting_id: row.posting_id,
            created_at: row.created_at,
            processing_started_at: row.processing_started_at,
            completed_at: row.completed_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

// =========================================================================
// PgLedgerStore
// =========================================================================

/// PostgreSQL implementation of [`LedgerStore`].
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a new store with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_cash_movement_tx(
        tx: &mut Transaction<'_, Postgres>,
        movement: &CashMovement,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO cash_movements (
                id, posting_id, date, unit, direction, category, amount,
                subject_name, note, responsible_party, settlement_status,
                settlement_id, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(movement.id)
        .bind(movement.posting_id)
        .bind(movement.date)
        .bind(&movement.unit)
        .bind(movement.direction.as_str())
        .bind(&movement.category)
        .bind(movement.amount.value())
        .bind(&movement.subject_name)
        .bind(&movement.note)
        .bind(&movement.responsible_party)
        .bind(movement.settlement_status.as_str())
        .bind(movement.settlement_id)
        .bind(movement.version)
        .bind(movement.created_at)
        .bind(movement.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn upsert_service_record_tx(
        tx: &mut Transaction<'_, Postgres>,
        record: &ServiceRecord,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO service_records (
                id, posting_id, date, unit, subject_name, subject_id,
                service_name, amount, note, responsible_party, quantity,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                date = EXCLUDED.date,
                unit = EXCLUDED.unit,
                subject_name = EXCLUDED.subject_name,
                subject_id = EXCLUDED.subject_id,
                service_name = EXCLUDED.service_name,
                amount = EXCLUDED.amount,
                note = EXCLUDED.note,
                responsible_party = EXCLUDED.responsible_party,
                quantity = EXCLUDED.quantity,
                updated_at = NOW()
            "#,
        )
        .bind(record.id)
        .bind(record.posting_id)
        .bind(record.date)
        .bind(&record.unit)
        .bind(&record.subject_name)
        .bind(&record.subject_id)
        .bind(&record.service_name)
        .bind(record.amount.value())
        .bind(&record.note)
        .bind(&record.responsible_party)
        .bind(record.quantity)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn insert_treasury_tx(
        tx: &mut Transaction<'_, Postgres>,
        entry: &TreasuryEntry,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO treasury_entries (
                id, date, direction, amount, category, note, recipient, unit, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.date)
        .bind(entry.direction.as_str())
        .bind(entry.amount.value())
        .bind(&entry.category)
        .bind(&entry.note)
        .bind(&entry.recipient)
        .bind(&entry.unit)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn list_fees(&self) -> StoreResult<Vec<FeeCatalogEntry>> {
        let rows: Vec<FeeRow> = sqlx::query_as(
            "SELECT unit, service_name, price, active FROM fee_catalog ORDER BY unit, service_name",
        )
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn find_fee(
        &self,
        unit: &str,
        service_name: &str,
    ) -> StoreResult<Option<FeeCatalogEntry>> {
        let row: Option<FeeRow> = sqlx::query_as(
            r#"
            SELECT unit, service_name, price, active
            FROM fee_catalog
            WHERE unit = $1 AND service_name = $2
            "#,
        )
        .bind(unit)
        .bind(service_name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FeeCatalogEntry::try_from).transpose()
    }

    async fn upsert_fee(&self, entry: &FeeCatalogEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO fee_catalog (unit, service_name, price, active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (unit, service_name)
            DO UPDATE SET price = EXCLUDED.price, active = EXCLUDED.active
            "#,
        )
        .bind(&entry.unit)
        .bind(&entry.service_name)
        .bind(entry.price.value())
        .bind(entry.active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_posting(
        &self,
        record: &ServiceRecord,
        movement: &CashMovement,
    ) -> StoreResult<()> {
        let duplicate = || {
            StoreError::DuplicatePosting(movement.posting_id.or(record.posting_id).unwrap_or(movement.id))
        };

        let mut tx = self.pool.begin().await?;

        Self::upsert_service_record_tx(&mut tx, record)
            .await
            .map_err(|e| if is_unique_violation(&e) { duplicate() } else { e.into() })?;
        Self::insert_cash_movement_tx(&mut tx, movement)
            .await
            .map_err(|e| if is_unique_violation(&e) { duplicate() } else { e.into() })?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_service_records(&self, unit: Option<&str>) -> StoreResult<Vec<ServiceRecord>> {
        let sql = format!(
            "SELECT {} FROM service_records WHERE ($1::text IS NULL OR unit = $1) ORDER BY date, created_at",
            SERVICE_RECORD_COLUMNS
        );
        let rows: Vec<ServiceRecordRow> = sqlx::query_as(&sql)
            .bind(unit)
            .fetch_all(&self.pool)
            .await?;

        convert_all(rows)
    }

    async fn get_service_record(&self, id: Uuid) -> StoreResult<Option<ServiceRecord>> {
        let sql = format!("SELECT {} FROM service_records WHERE id = $1", SERVICE_RECORD_COLUMNS);
        let row: Option<ServiceRecordRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ServiceRecord::try_from).transpose()
    }

    async fn save_service_record(&self, record: &ServiceRecord) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_service_record_tx(&mut tx, record).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_cash_movements(&self, filter: &CashFilter) -> StoreResult<Vec<CashMovement>> {
        let sql = format!(
            r#"
            SELECT {} FROM cash_movements
            WHERE ($1::text IS NULL OR unit = $1)
              AND ($2::text IS NULL OR settlement_status = $2)
            ORDER BY date, created_at
            "#,
            CASH_MOVEMENT_COLUMNS
        );
        let rows: Vec<CashMovementRow> = sqlx::query_as(&sql)
            .bind(filter.unit.as_deref())
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?;

        convert_all(rows)
    }

    async fn get_cash_movement(&self, id: Uuid) -> StoreResult<Option<CashMovement>> {
        let sql = format!("SELECT {} FROM cash_movements WHERE id = $1", CASH_MOVEMENT_COLUMNS);
        let row: Option<CashMovementRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(CashMovement::try_from).transpose()
    }

    async fn insert_cash_movement(&self, movement: &CashMovement) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_cash_movement_tx(&mut tx, movement).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_cash_movement(
        &self,
        movement: &CashMovement,
        expected_version: i64,
    ) -> StoreResult<CashMovement> {
        let sql = format!(
            r#"
            UPDATE cash_movements SET
                date = $3,
                unit = $4,
                direction = $5,
                category = $6,
                amount = $7,
                subject_name = $8,
                note = $9,
                responsible_party = $10,
                settlement_status = $11,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2 AND settlement_status <> 'settled'
            RETURNING {}
            "#,
            CASH_MOVEMENT_COLUMNS
        );
        let updated: Option<CashMovementRow> = sqlx::query_as(&sql)
            .bind(movement.id)
            .bind(expected_version)
            .bind(movement.date)
            .bind(&movement.unit)
            .bind(movement.direction.as_str())
            .bind(&movement.category)
            .bind(movement.amount.value())
            .bind(&movement.subject_name)
            .bind(&movement.note)
            .bind(&movement.responsible_party)
            .bind(movement.settlement_status.as_str())
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = updated {
            return CashMovement::try_from(row);
        }

        // Work out why nothing matched
        let current = self
            .get_cash_movement(movement.id)
            .await?
            .ok_or(StoreError::NotFound(movement.id))?;
        if current.settlement_status == SettlementStatus::Settled {
            return Err(StoreError::Immutable(current.id));
        }
        Err(StoreError::ConcurrencyConflict {
            id: current.id,
            expected: expected_version,
            actual: current.version,
        })
    }

    async fn commit_settlement(
        &self,
        entry: &TreasuryEntry,
        rows: &[RowVersion],
    ) -> StoreResult<Vec<CashMovement>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {} FROM cash_movements WHERE id = ANY($1) FOR UPDATE",
            CASH_MOVEMENT_COLUMNS
        );
        let locked: Vec<CashMovementRow> = sqlx::query_as(&sql)
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await?;
        let locked: Vec<CashMovement> = convert_all(locked)?;

        for expected in rows {
            let row = locked
                .iter()
                .find(|m| m.id == expected.id)
                .ok_or(StoreError::NotFound(expected.id))?;
            check_settleable(row, expected)?;
        }
        check_settlement_amount(entry, &locked)?;

        Self::insert_treasury_tx(&mut tx, entry).await?;

        let sql = format!(
            r#"
            UPDATE cash_movements SET
                settlement_status = 'settled',
                settlement_id = $1,
                version = version + 1,
                updated_at = NOW()
            WHERE id = ANY($2)
            RETURNING {}
            "#,
            CASH_MOVEMENT_COLUMNS
        );
        let settled: Vec<CashMovementRow> = sqlx::query_as(&sql)
            .bind(entry.id)
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        convert_all(settled)
    }

    async fn insert_treasury_entry(&self, entry: &TreasuryEntry) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_treasury_tx(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_treasury_entries(&self) -> StoreResult<Vec<TreasuryEntry>> {
        let sql = format!(
            "SELECT {} FROM treasury_entries ORDER BY date, created_at",
            TREASURY_COLUMNS
        );
        let rows: Vec<TreasuryRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        convert_all(rows)
    }

    async fn enqueue_posting(&self, pending: &PendingPosting) -> StoreResult<Uuid> {
        let request = serde_json::to_value(&pending.request)?;

        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO posting_outbox (id, dedupe_key, request, status, attempts, created_at)
            VALUES ($1, $2, $3, $4, 0, $5)
            ON CONFLICT (dedupe_key) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(pending.id)
        .bind(&pending.dedupe_key)
        .bind(&request)
        .bind(pending.status.as_str())
        .bind(pending.created_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(id) = inserted {
            return Ok(id);
        }

        // Conflict on dedupe key: hand back the row already queued
        let existing: Uuid =
            sqlx::query_scalar("SELECT id FROM posting_outbox WHERE dedupe_key = $1")
                .bind(&pending.dedupe_key)
                .fetch_one(&self.pool)
                .await?;

        Ok(existing)
    }

    async fn get_pending(&self, id: Uuid) -> StoreResult<Option<PendingPosting>> {
        let sql = format!("SELECT {} FROM posting_outbox WHERE id = $1", OUTBOX_COLUMNS);
        let row: Option<OutboxRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(PendingPosting::try_from).transpose()
    }

    async fn claim_pending(
        &self,
        limit: i64,
        max_attempts: i32,
    ) -> StoreResult<Vec<PendingPosting>> {
        let sql = format!(
            r#"
            UPDATE posting_outbox SET
                status = 'processing',
                attempts = attempts + 1,
                processing_started_at = NOW()
            WHERE id IN (
                SELECT id FROM posting_outbox
                WHERE status = 'pending' AND attempts < $2
                ORDER BY created_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            OUTBOX_COLUMNS
        );
        let rows: Vec<OutboxRow> = sqlx::query_as(&sql)
            .bind(limit)
            .bind(max_attempts)
            .fetch_all(&self.pool)
            .await?;

        convert_all(rows)
    }

    async fn finish_pending(&self, id: Uuid, update: OutboxUpdate) -> StoreResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE posting_outbox SET
                status = $2,
                posting_id = COALESCE($3, posting_id),
                last_error = $4,
                completed_at = CASE WHEN $5 THEN NOW() ELSE completed_at END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(update.status.as_str())
        .bind(update.posting_id)
        .bind(&update.error)
        .bind(update.status.is_terminal())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn reset_stale_pending(&self, older_than: DateTime<Utc>, max_attempts: i32) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE posting_outbox SET
                status = CASE WHEN attempts >= $2 THEN 'failed' ELSE 'pending' END,
                last_error = CASE WHEN attempts >= $2 THEN $3 ELSE last_error END,
                completed_at = CASE WHEN attempts >= $2 THEN NOW() ELSE completed_at END
            WHERE status = 'processing'
              AND (processing_started_at IS NULL OR processing_started_at < $1)
            "#,
        )
        .bind(older_than)
        .bind(max_attempts)
        .bind(STALE_CLAIM_EXHAUSTED)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
