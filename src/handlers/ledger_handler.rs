//! Ledger Handler
//!
//! Manual entries and corrections made from the ledger screens.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::FeeCatalog;
use crate::domain::{
    CashMovement, DomainError, FeeCatalogEntry, OperationContext, ServiceRecord, SettlementStatus,
    TreasuryEntry,
};
use crate::error::AppError;
use crate::store::{CashFilter, LedgerStore, StoreError};

use super::{CashMovementInput, ServiceRecordInput, StatusTransitionCommand, TreasuryEntryInput};

/// Handler for manual ledger maintenance
#[derive(Clone)]
pub struct LedgerHandler {
    store: Arc<dyn LedgerStore>,
    catalog: FeeCatalog,
}

impl LedgerHandler {
    pub fn new(store: Arc<dyn LedgerStore>, catalog: FeeCatalog) -> Self {
        Self { store, catalog }
    }

    // ===== Reads =====

    pub async fn list_cash_movements(&self, filter: &CashFilter) -> Result<Vec<CashMovement>, AppError> {
        Ok(self.store.list_cash_movements(filter).await?)
    }

    pub async fn list_service_records(&self, unit: Option<&str>) -> Result<Vec<ServiceRecord>, AppError> {
        Ok(self.store.list_service_records(unit).await?)
    }

    pub async fn list_treasury_entries(&self) -> Result<Vec<TreasuryEntry>, AppError> {
        Ok(self.store.list_treasury_entries().await?)
    }

    pub async fn list_fees(&self) -> Result<Vec<FeeCatalogEntry>, AppError> {
        Ok(self.catalog.list().await?)
    }

    // ===== Cash movements =====

    /// Create a cash movement, or edit one when `input.id` is set.
    ///
    /// New rows start `Unsettled` unless marked `InProgress`. Settled rows
    /// cannot be edited, and no edit can mark a row settled.
    pub async fn save_cash_movement(
        &self,
        input: CashMovementInput,
        context: &OperationContext,
    ) -> Result<CashMovement, AppError> {
        let unit = required("unit", &input.unit)?;
        let category = required("category", &input.category)?;
        let responsible_party = non_blank(input.responsible_party.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| context.responsible_party_for(&unit));

        let Some(id) = input.id else {
            let status = input.settlement_status.unwrap_or(SettlementStatus::Unsettled);
            if status == SettlementStatus::Settled {
                return Err(DomainError::InvalidStatusTransition {
                    from: SettlementStatus::Unsettled,
                    to: SettlementStatus::Settled,
                }
                .into());
            }

            let now = Utc::now();
            let movement = CashMovement {
                id: Uuid::new_v4(),
                posting_id: None,
                date: input.date,
                unit,
                direction: input.direction,
                category,
                amount: input.amount,
                subject_name: non_blank(input.subject_name.as_deref()).map(str::to_string),
                note: input.note.unwrap_or_default(),
                responsible_party,
                settlement_status: status,
                settlement_id: None,
                version: 1,
                created_at: now,
                updated_at: now,
            };
            self.store.insert_cash_movement(&movement).await?;

            tracing::info!(
                cash_movement_id = %movement.id,
                unit = %movement.unit,
                direction = %movement.direction,
                amount = %movement.amount,
                "Cash movement created"
            );
            return Ok(movement);
        };

        let existing = self.existing_cash_movement(id).await?;
        let status = input.settlement_status.unwrap_or(existing.settlement_status);
        check_transition(&existing, status)?;
        if let Some(posting_id) = existing.posting_id {
            let changed = existing.date != input.date
                || existing.unit != unit
                || existing.direction != input.direction
                || existing.amount != input.amount;
            if changed {
                return Err(posted_row_locked("cash movement", id, posting_id).into());
            }
        }

        let expected_version = input.version.unwrap_or(existing.version);
        let updated = CashMovement {
            date: input.date,
            unit,
            direction: input.direction,
            category,
            amount: input.amount,
            subject_name: non_blank(input.subject_name.as_deref()).map(str::to_string),
            note: input.note.unwrap_or(existing.note.clone()),
            responsible_party,
            settlement_status: status,
            ..existing
        };

        let stored = self.update(&updated, expected_version).await?;
        tracing::info!(cash_movement_id = %stored.id, version = stored.version, "Cash movement updated");
        Ok(stored)
    }

    /// Manual status change: `Unsettled` and `InProgress` only.
    pub async fn transition(
        &self,
        unit: &str,
        id: Uuid,
        command: StatusTransitionCommand,
        context: &OperationContext,
    ) -> Result<CashMovement, AppError> {
        let existing = self.existing_cash_movement(id).await?;
        if existing.unit != unit.trim() {
            return Err(AppError::NotFound(format!("cash movement {} in unit {}", id, unit)));
        }

        check_transition(&existing, command.to)?;
        if existing.settlement_status == command.to {
            return Ok(existing);
        }

        let expected_version = command.expected_version.unwrap_or(existing.version);
        let from = existing.settlement_status;
        let updated = CashMovement {
            settlement_status: command.to,
            ..existing
        };

        let stored = self.update(&updated, expected_version).await?;
        tracing::info!(
            cash_movement_id = %stored.id,
            from = %from,
            to = %stored.settlement_status,
            actor = ?context.actor,
            "Settlement status changed"
        );
        Ok(stored)
    }

    async fn existing_cash_movement(&self, id: Uuid) -> Result<CashMovement, AppError> {
        let existing = self
            .store
            .get_cash_movement(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("cash movement {}", id)))?;

        if existing.settlement_status == SettlementStatus::Settled {
            return Err(DomainError::SettledRowImmutable(id).into());
        }
        Ok(existing)
    }

    async fn update(&self, movement: &CashMovement, expected_version: i64) -> Result<CashMovement, AppError> {
        self.store
            .update_cash_movement(movement, expected_version)
            .await
            .map_err(|e| match e {
                StoreError::ConcurrencyConflict { expected, actual, .. } => {
                    DomainError::VersionConflict {
                        expected,
                        found: actual,
                    }
                    .into()
                }
                StoreError::Immutable(id) => DomainError::SettledRowImmutable(id).into(),
                other => AppError::Store(other),
            })
    }

    // ===== Service records =====

    pub async fn save_service_record(
        &self,
        input: ServiceRecordInput,
        context: &OperationContext,
    ) -> Result<ServiceRecord, AppError> {
        let unit = required("unit", &input.unit)?;
        let subject_name = required("subject_name", &input.subject_name)?;
        let service_name = required("service_name", &input.service_name)?;
        let quantity = i32::try_from(input.quantity.unwrap_or(1))
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| DomainError::validation("quantity must be at least 1"))?;
        let responsible_party = non_blank(input.responsible_party.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| context.responsible_party_for(&unit));

        let now = Utc::now();
        let (id, posting_id, created_at) = match input.id {
            Some(id) => {
                let existing = self
                    .store
                    .get_service_record(id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("service record {}", id)))?;
                if let Some(posting_id) = existing.posting_id {
                    let changed = existing.date != input.date
                        || existing.unit != unit
                        || existing.amount != input.amount;
                    if changed {
                        return Err(posted_row_locked("service record", id, posting_id).into());
                    }
                }
                (id, existing.posting_id, existing.created_at)
            }
            None => (Uuid::new_v4(), None, now),
        };

        let record = ServiceRecord {
            id,
            posting_id,
            date: input.date,
            unit,
            subject_name,
            subject_id: non_blank(input.subject_id.as_deref()).map(str::to_string),
            service_name,
            amount: input.amount,
            note: input.note.unwrap_or_default(),
            responsible_party,
            quantity,
            created_at,
            updated_at: now,
        };
        self.store.save_service_record(&record).await?;

        Ok(record)
    }

    // ===== Treasury =====

    pub async fn create_treasury_entry(
        &self,
        input: TreasuryEntryInput,
        context: &OperationContext,
    ) -> Result<TreasuryEntry, AppError> {
        let category = required("category", &input.category)?;

        let entry = TreasuryEntry {
            id: Uuid::new_v4(),
            date: input.date,
            direction: input.direction,
            amount: input.amount,
            category,
            note: input.note.unwrap_or_default(),
            recipient: non_blank(input.recipient.as_deref())
                .map(str::to_string)
                .or_else(|| context.actor.clone())
                .unwrap_or_default(),
            unit: non_blank(input.unit.as_deref()).map(str::to_string),
            created_at: Utc::now(),
        };
        self.store.insert_treasury_entry(&entry).await?;

        tracing::info!(
            treasury_entry_id = %entry.id,
            direction = %entry.direction,
            amount = %entry.amount,
            "Treasury entry created"
        );
        Ok(entry)
    }

    // ===== Fee catalog =====

    pub async fn upsert_fee(&self, entry: FeeCatalogEntry) -> Result<FeeCatalogEntry, AppError> {
        let entry = FeeCatalogEntry {
            unit: required("unit", &entry.unit)?,
            service_name: required("service_name", &entry.service_name)?,
            ..entry
        };
        self.catalog.upsert(&entry).await?;
        Ok(entry)
    }
}

impl std::fmt::Debug for LedgerHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerHandler").finish_non_exhaustive()
    }
}

/// Settled rows are frozen, and `Settled` is only reachable through settlement.
fn check_transition(existing: &CashMovement, to: SettlementStatus) -> Result<(), DomainError> {
    let from = existing.settlement_status;
    if from == to && from != SettlementStatus::Settled {
        return Ok(());
    }
    if !from.allows_manual_transition_to(to) {
        return Err(DomainError::InvalidStatusTransition { from, to });
    }
    Ok(())
}

/// Rows written together by a posting must keep agreeing on what was posted.
fn posted_row_locked(kind: &str, id: Uuid, posting_id: Uuid) -> DomainError {
    DomainError::validation(format!(
        "{} {} was written by posting {}; its date, unit and amount cannot be edited",
        kind, id, posting_id
    ))
}

fn required(field: &str, value: &str) -> Result<String, DomainError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
