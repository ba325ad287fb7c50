//! Settlement Handler
//!
//! Deposits a unit's unsettled cash into the treasury in two steps: a quote
//! shown to the operator, then a confirmation that commits it.

use chrono::Utc;
use moka::sync::Cache;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    Amount, DomainError, OperationContext, SettlementStatus, TreasuryEntry, MAX_AMOUNT,
    TREASURY_RECIPIENT,
};
use crate::error::AppError;
use crate::projection::BalanceSummary;
use crate::store::{CashFilter, LedgerStore, StoreError};

use super::unit_lock::UnitLocks;
use super::{SettlementQuote, SettlementResult};

/// Upper bound on quotes held at once
const MAX_OPEN_QUOTES: u64 = 10_000;

/// Handler for unit settlements
#[derive(Clone)]
pub struct SettlementHandler {
    store: Arc<dyn LedgerStore>,
    locks: UnitLocks,
    quotes: Cache<Uuid, SettlementQuote>,
    quote_ttl: Duration,
}

impl SettlementHandler {
    pub fn new(store: Arc<dyn LedgerStore>, lock_timeout: Duration, quote_ttl: Duration) -> Self {
        let quotes = Cache::builder()
            .max_capacity(MAX_OPEN_QUOTES)
            .time_to_live(quote_ttl)
            .build();

        Self {
            store,
            locks: UnitLocks::new(lock_timeout),
            quotes,
            quote_ttl,
        }
    }

    /// The per-unit locks confirmations run under
    pub fn locks(&self) -> &UnitLocks {
        &self.locks
    }

    /// Compute what a settlement of `unit` would deposit.
    ///
    /// Nothing is written to the ledger. Fails with `InsufficientBalance`
    /// when the unsettled net is not positive.
    pub async fn quote(&self, unit: &str) -> Result<SettlementQuote, AppError> {
        let unit = unit.trim();
        if unit.is_empty() {
            return Err(DomainError::validation("unit is required").into());
        }

        let rows = self
            .store
            .list_cash_movements(&CashFilter::unit(unit).with_status(SettlementStatus::Unsettled))
            .await?;
        let summary = BalanceSummary::from_movements(unit, Some(SettlementStatus::Unsettled), &rows);

        if summary.net <= Decimal::ZERO {
            return Err(DomainError::insufficient_balance(unit, summary.net).into());
        }
        let cap = Decimal::from(MAX_AMOUNT);
        if summary.net > cap {
            return Err(DomainError::SettlementCapExceeded {
                unit: unit.to_string(),
                net: summary.net,
                cap,
            }
            .into());
        }
        let amount = Amount::new(summary.net).map_err(DomainError::from)?;

        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(self.quote_ttl)
            .map_err(|e| AppError::Internal(format!("quote ttl out of range: {}", e)))?;

        let quote = SettlementQuote {
            quote_id: Uuid::new_v4(),
            unit: unit.to_string(),
            amount,
            inflow: summary.inflow,
            outflow: summary.outflow,
            rows: rows.iter().map(|m| m.row_version()).collect(),
            created_at,
            expires_at: created_at + ttl,
        };

        self.quotes.insert(quote.quote_id, quote.clone());

        tracing::info!(
            quote_id = %quote.quote_id,
            unit = %quote.unit,
            amount = %quote.amount,
            rows = quote.rows.len(),
            "Settlement quoted"
        );

        Ok(quote)
    }

    /// Commit a quote: one treasury entry, every quoted row settled.
    ///
    /// Runs under the unit lock. If any quoted row changed since the quote,
    /// nothing is written and `SettlementConflict` is returned.
    pub async fn confirm(
        &self,
        quote_id: Uuid,
        context: &OperationContext,
    ) -> Result<SettlementResult, AppError> {
        let unit = self
            .quotes
            .get(&quote_id)
            .map(|q| q.unit)
            .ok_or(AppError::QuoteNotFound(quote_id))?;

        let _guard = self
            .locks
            .acquire(&unit)
            .await
            .ok_or_else(|| AppError::ConcurrentSettlement { unit: unit.clone() })?;

        // Taken under the lock: a second confirm of the same quote finds nothing
        let quote = self
            .quotes
            .remove(&quote_id)
            .filter(|q| q.expires_at > Utc::now())
            .ok_or(AppError::QuoteNotFound(quote_id))?;

        let entry = TreasuryEntry::unit_deposit(
            &quote.unit,
            quote.amount,
            Utc::now().date_naive(),
            TREASURY_RECIPIENT,
        );

        let settled_rows = self
            .store
            .commit_settlement(&entry, &quote.rows)
            .await
            .map_err(|e| match e {
                StoreError::NotSettleable { .. }
                | StoreError::ConcurrencyConflict { .. }
                | StoreError::AmountMismatch { .. }
                | StoreError::NotFound(_) => AppError::SettlementConflict(e.to_string()),
                other => AppError::Store(other),
            })?;

        tracing::info!(
            quote_id = %quote_id,
            treasury_entry_id = %entry.id,
            unit = %quote.unit,
            amount = %quote.amount,
            rows = settled_rows.len(),
            actor = ?context.actor,
            correlation_id = ?context.correlation_id,
            "Settlement committed"
        );

        Ok(SettlementResult {
            treasury_entry: entry,
            settled_rows,
            amount: quote.amount,
        })
    }

    /// Drop a quote without settling.
    pub fn cancel(&self, quote_id: Uuid) -> Result<(), AppError> {
        self.quotes
            .remove(&quote_id)
            .map(|_| ())
            .ok_or(AppError::QuoteNotFound(quote_id))
    }

    /// Quote, ask `confirm`, and commit if it agrees.
    pub async fn settle<F>(
        &self,
        unit: &str,
        context: &OperationContext,
        confirm: F,
    ) -> Result<SettlementResult, AppError>
    where
        F: FnOnce(&SettlementQuote) -> bool,
    {
        let quote = self.quote(unit).await?;

        if !confirm(&quote) {
            self.quotes.invalidate(&quote.quote_id);
            tracing::info!(quote_id = %quote.quote_id, unit = %quote.unit, "Settlement cancelled");
            return Err(AppError::SettlementCancelled);
        }

        self.confirm(quote.quote_id, context).await
    }
}

impl std::fmt::Debug for SettlementHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementHandler")
            .field("open_quotes", &self.quotes.entry_count())
            .field("quote_ttl", &self.quote_ttl)
            .field("lock_timeout", &self.locks.timeout())
            .finish()
    }
}
