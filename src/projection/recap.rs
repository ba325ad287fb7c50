//! Periodic recap
//!
//! Monthly and yearly rollups of the treasury ledger, of one unit's cash,
//! or of both combined.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{Direction, SettlementStatus};
use crate::store::{CashFilter, LedgerStore};

use super::ProjectionError;

const MONTH_NAMES: [&str; 12] = [
    "Januari",
    "Februari",
    "Maret",
    "April",
    "Mei",
    "Juni",
    "Juli",
    "Agustus",
    "September",
    "Oktober",
    "November",
    "Desember",
];

/// Indonesian name of a month (1-based)
pub fn month_name(month: u32) -> &'static str {
    MONTH_NAMES
        .get(month.saturating_sub(1) as usize)
        .copied()
        .unwrap_or("")
}

/// Which ledger a recap reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecapSource {
    Treasury,
    Unit(String),
    /// Treasury entries plus unit cash not yet swept into the treasury
    Combined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PeriodStatus {
    Surplus,
    Deficit,
}

/// One row of a recap
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecapPeriod {
    /// `YYYY-MM` or `YYYY`
    pub period: String,
    /// `Januari 2024` or `2024`
    pub label: String,
    pub inflow: Decimal,
    pub outflow: Decimal,
    pub net: Decimal,
    pub status: PeriodStatus,
}

/// A dated, directed amount from any ledger
#[derive(Debug, Clone, Copy)]
pub struct RecapLine {
    pub date: NaiveDate,
    pub direction: Direction,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct RecapQuery {
    pub source: RecapSource,
    /// Monthly recaps only: restrict to one year
    pub year: Option<i32>,
    /// Case-insensitive match on period key or label
    pub filter: Option<String>,
    pub order: SortOrder,
}

impl RecapQuery {
    pub fn new(source: RecapSource) -> Self {
        Self {
            source,
            year: None,
            filter: None,
            order: SortOrder::Desc,
        }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }
}

/// Group `lines` into periods.
pub fn build_recap(
    lines: impl IntoIterator<Item = RecapLine>,
    granularity: Granularity,
    year: Option<i32>,
    filter: Option<&str>,
    order: SortOrder,
) -> Vec<RecapPeriod> {
    // (year, month); month is 0 for yearly buckets
    let mut buckets: BTreeMap<(i32, u32), (Decimal, Decimal)> = BTreeMap::new();

    for line in lines {
        if granularity == Granularity::Monthly && year.map_or(false, |y| line.date.year() != y) {
            continue;
        }
        let key = match granularity {
            Granularity::Monthly => (line.date.year(), line.date.month()),
            Granularity::Yearly => (line.date.year(), 0),
        };
        let (inflow, outflow) = buckets.entry(key).or_default();
        match line.direction {
            Direction::Masuk => *inflow += line.amount,
            Direction::Keluar => *outflow += line.amount,
        }
    }

    let needle = filter
        .map(|f| f.trim().to_lowercase())
        .filter(|f| !f.is_empty());

    let mut periods: Vec<RecapPeriod> = buckets
        .into_iter()
        .map(|((year, month), (inflow, outflow))| {
            let (period, label) = match granularity {
                Granularity::Monthly => (
                    format!("{:04}-{:02}", year, month),
                    format!("{} {}", month_name(month), year),
                ),
                Granularity::Yearly => (format!("{:04}", year), format!("{}", year)),
            };
            let net = inflow - outflow;
            RecapPeriod {
                period,
                label,
                inflow,
                outflow,
                net,
                status: if net >= Decimal::ZERO {
                    PeriodStatus::Surplus
                } else {
                    PeriodStatus::Deficit
                },
            }
        })
        .filter(|p| {
            needle.as_deref().map_or(true, |n| {
                p.period.to_lowercase().contains(n) || p.label.to_lowercase().contains(n)
            })
        })
        .collect();

    if order == SortOrder::Desc {
        periods.reverse();
    }
    periods
}

/// Recap reader over the ledger store
#[derive(Clone)]
pub struct TreasuryRecapService {
    store: Arc<dyn LedgerStore>,
}

impl TreasuryRecapService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn monthly_recap(&self, query: &RecapQuery) -> Result<Vec<RecapPeriod>, ProjectionError> {
        self.recap(query, Granularity::Monthly).await
    }

    pub async fn yearly_recap(&self, query: &RecapQuery) -> Result<Vec<RecapPeriod>, ProjectionError> {
        self.recap(query, Granularity::Yearly).await
    }

    async fn recap(
        &self,
        query: &RecapQuery,
        granularity: Granularity,
    ) -> Result<Vec<RecapPeriod>, ProjectionError> {
        let lines = self.lines(&query.source).await?;
        Ok(build_recap(
            lines,
            granularity,
            query.year,
            query.filter.as_deref(),
            query.order,
        ))
    }

    async fn lines(&self, source: &RecapSource) -> Result<Vec<RecapLine>, ProjectionError> {
        let mut lines = Vec::new();

        if matches!(source, RecapSource::Treasury | RecapSource::Combined) {
            lines.extend(
                self.store
                    .list_treasury_entries()
                    .await?
                    .into_iter()
                    .map(|e| RecapLine {
                        date: e.date,
                        direction: e.direction,
                        amount: e.amount.value(),
                    }),
            );
        }

        match source {
            RecapSource::Treasury => {}
            RecapSource::Unit(unit) => {
                let unit = unit.trim();
                if unit.is_empty() {
                    return Err(ProjectionError::InvalidQuery("unit is required".to_string()));
                }
                lines.extend(
                    self.store
                        .list_cash_movements(&CashFilter::unit(unit))
                        .await?
                        .into_iter()
                        .map(|m| RecapLine {
                            date: m.date,
                            direction: m.direction,
                            amount: m.amount.value(),
                        }),
                );
            }
            RecapSource::Combined => {
                // Settled cash is already in the treasury as its deposit
                lines.extend(
                    self.store
                        .list_cash_movements(&CashFilter::default())
                        .await?
                        .into_iter()
                        .filter(|m| m.settlement_status != SettlementStatus::Settled)
                        .map(|m| RecapLine {
                            date: m.date,
                            direction: m.direction,
                            amount: m.amount.value(),
                        }),
                );
            }
        }

        Ok(lines)
    }
}
