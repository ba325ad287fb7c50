//! Unit balance aggregation
//!
//! Inflow, outflow and net of a unit's cash movements, optionally restricted
//! to one settlement status.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use crate::domain::{CashMovement, Direction, SettlementStatus};
use crate::store::{CashFilter, LedgerStore};

use super::ProjectionError;

/// Totals over a set of cash movements
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceSummary {
    pub unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SettlementStatus>,
    pub inflow: Decimal,
    pub outflow: Decimal,
    pub net: Decimal,
    pub rows: usize,
}

impl BalanceSummary {
    /// Sum `movements` of `unit`, keeping only `status` when given.
    pub fn from_movements<'a>(
        unit: &str,
        status: Option<SettlementStatus>,
        movements: impl IntoIterator<Item = &'a CashMovement>,
    ) -> Self {
        let mut inflow = Decimal::ZERO;
        let mut outflow = Decimal::ZERO;
        let mut rows = 0;

        for movement in movements
            .into_iter()
            .filter(|m| m.unit == unit)
            .filter(|m| status.map_or(true, |s| m.settlement_status == s))
        {
            match movement.direction {
                Direction::Masuk => inflow += movement.amount.value(),
                Direction::Keluar => outflow += movement.amount.value(),
            }
            rows += 1;
        }

        Self {
            unit: unit.to_string(),
            status,
            inflow,
            outflow,
            net: inflow - outflow,
            rows,
        }
    }
}

/// Read-side service for unit balances
#[derive(Clone)]
pub struct UnitBalanceService {
    store: Arc<dyn LedgerStore>,
}

impl UnitBalanceService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn balance(
        &self,
        unit: &str,
        status: Option<SettlementStatus>,
    ) -> Result<BalanceSummary, ProjectionError> {
        let unit = require_unit(unit)?;
        let mut filter = CashFilter::unit(unit);
        filter.status = status;

        let movements = self.store.list_cash_movements(&filter).await?;
        Ok(BalanceSummary::from_movements(unit, status, &movements))
    }

    /// One summary per settlement status, in lifecycle order
    pub async fn balances_by_status(&self, unit: &str) -> Result<Vec<BalanceSummary>, ProjectionError> {
        let unit = require_unit(unit)?;
        let movements = self.store.list_cash_movements(&CashFilter::unit(unit)).await?;

        Ok(SettlementStatus::ALL
            .iter()
            .map(|status| BalanceSummary::from_movements(unit, Some(*status), &movements))
            .collect())
    }
}

fn require_unit(unit: &str) -> Result<&str, ProjectionError> {
    let unit = unit.trim();
    if unit.is_empty() {
        return Err(ProjectionError::InvalidQuery("unit is required".to_string()));
    }
    Ok(unit)
}
