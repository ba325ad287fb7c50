//! Domain module
//!
//! Core domain types and business rules.

pub mod amount;
pub mod context;
pub mod error;
pub mod records;
pub mod trigger;

pub use amount::{Amount, AmountError, MAX_AMOUNT};
pub use context::OperationContext;
pub use error::DomainError;
pub use records::{
    CashMovement, Direction, FeeCatalogEntry, RowVersion, ServiceRecord, SettlementStatus,
    TreasuryEntry, SETTLEMENT_CATEGORY, TREASURY_RECIPIENT,
};
pub use trigger::{PostingRequest, PostingTrigger, TriggerKind};
