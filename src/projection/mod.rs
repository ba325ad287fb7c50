//! Projection module
//!
//! Read models computed from the ledger: unit balances and periodic recaps.

mod balance;
mod recap;

pub use balance::{BalanceSummary, UnitBalanceService};
pub use recap::{
    build_recap, month_name, Granularity, PeriodStatus, RecapLine, RecapPeriod, RecapQuery,
    RecapSource, SortOrder, TreasuryRecapService,
};

use crate::store::StoreError;

/// Projection errors
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}
