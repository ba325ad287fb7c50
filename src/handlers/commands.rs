//! Command definitions
//!
//! Inputs of the manual ledger screens and the settlement workflow, and the
//! results handed back to callers.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Amount, CashMovement, Direction, RowVersion, SettlementStatus, TreasuryEntry};

// =========================================================================
// Manual ledger entries
// =========================================================================

/// Create or edit a unit cash movement (`kas_unit`). Present `id` means edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashMovementInput {
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Version the editor read; defaults to the stored version
    #[serde(default)]
    pub version: Option<i64>,
    pub date: NaiveDate,
    pub unit: String,
    pub direction: Direction,
    pub category: String,
    pub amount: Amount,
    #[serde(default)]
    pub subject_name: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub responsible_party: Option<String>,
    #[serde(default)]
    pub settlement_status: Option<SettlementStatus>,
}

/// Create or edit a service record (`layanan_admin`). Present `id` means edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecordInput {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub date: NaiveDate,
    pub unit: String,
    pub subject_name: String,
    #[serde(default)]
    pub subject_id: Option<String>,
    pub service_name: String,
    pub amount: Amount,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub responsible_party: Option<String>,
    #[serde(default)]
    pub quantity: Option<u32>,
}

/// Manual central ledger line (`arus_kas`). Create only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreasuryEntryInput {
    pub date: NaiveDate,
    pub direction: Direction,
    pub amount: Amount,
    pub category: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Manual settlement status change of one cash movement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransitionCommand {
    pub to: SettlementStatus,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

// =========================================================================
// Settlement
// =========================================================================

/// Unsettled cash of a unit, awaiting operator confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementQuote {
    pub quote_id: Uuid,
    pub unit: String,
    /// Net of the quoted rows; what the treasury entry will carry
    pub amount: Amount,
    pub inflow: Decimal,
    pub outflow: Decimal,
    /// Rows swept on confirmation, at the versions observed
    pub rows: Vec<RowVersion>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Result of a confirmed settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementResult {
    pub treasury_entry: TreasuryEntry,
    pub settled_rows: Vec<CashMovement>,
    pub amount: Amount,
}
