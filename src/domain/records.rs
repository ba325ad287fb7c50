//! Ledger records
//!
//! The four row types of the unit cash ledger: fee catalog entries,
//! service records (billing trail), cash movements (unit ledger lines) and
//! treasury entries (central ledger lines).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::Amount;

/// Category written on the treasury entry of a unit deposit
pub const SETTLEMENT_CATEGORY: &str = "Setoran Unit";

/// Default recipient of unit deposits
pub const TREASURY_RECIPIENT: &str = "Bendahara";

/// Direction of a ledger line. Amounts are always stored non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Inflow
    Masuk,
    /// Outflow
    Keluar,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Masuk => "Masuk",
            Direction::Keluar => "Keluar",
        }
    }

    /// Contribution of `amount` to a running balance.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            Direction::Masuk => amount,
            Direction::Keluar => -amount,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Masuk" => Ok(Direction::Masuk),
            "Keluar" => Ok(Direction::Keluar),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

/// Settlement lifecycle of a cash movement.
///
/// `Unsettled -> Settled` happens only through the settlement workflow.
/// `Unsettled <-> InProgress` is a manual bookkeeping mark.
/// `Settled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    #[serde(alias = "Belum Setor")]
    Unsettled,
    #[serde(alias = "Proses Setor")]
    InProgress,
    #[serde(alias = "Sudah Diterima Bendahara")]
    Settled,
}

impl SettlementStatus {
    pub const ALL: [SettlementStatus; 3] = [
        SettlementStatus::Unsettled,
        SettlementStatus::InProgress,
        SettlementStatus::Settled,
    ];

    /// Storage code
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Unsettled => "unsettled",
            SettlementStatus::InProgress => "in_progress",
            SettlementStatus::Settled => "settled",
        }
    }

    /// Label shown to staff
    pub fn label(&self) -> &'static str {
        match self {
            SettlementStatus::Unsettled => "Belum Setor",
            SettlementStatus::InProgress => "Proses Setor",
            SettlementStatus::Settled => "Sudah Diterima Bendahara",
        }
    }

    /// Whether a manual edit may move a row from `self` to `to`.
    pub fn allows_manual_transition_to(&self, to: SettlementStatus) -> bool {
        use SettlementStatus::*;
        match (self, to) {
            (Settled, _) => false,
            (_, Settled) => false,
            _ => true,
        }
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SettlementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unsettled" | "Belum Setor" => Ok(SettlementStatus::Unsettled),
            "in_progress" | "Proses Setor" => Ok(SettlementStatus::InProgress),
            "settled" | "Sudah Diterima Bendahara" => Ok(SettlementStatus::Settled),
            other => Err(format!("unknown settlement status '{}'", other)),
        }
    }
}

/// A priced service offered by a unit (`layanan_info`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCatalogEntry {
    pub unit: String,
    pub service_name: String,
    pub price: Amount,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Billing/audit trail row of a rendered service (`layanan_admin`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: Uuid,
    /// Shared with the cash movement written by the same posting
    pub posting_id: Option<Uuid>,
    pub date: NaiveDate,
    pub unit: String,
    pub subject_name: String,
    /// External reference of the subject (stambuk)
    pub subject_id: Option<String>,
    pub service_name: String,
    pub amount: Amount,
    pub note: String,
    pub responsible_party: String,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A unit ledger line (`kas_unit`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashMovement {
    pub id: Uuid,
    /// Shared with the service record written by the same posting
    pub posting_id: Option<Uuid>,
    pub date: NaiveDate,
    pub unit: String,
    pub direction: Direction,
    pub category: String,
    pub amount: Amount,
    pub subject_name: Option<String>,
    pub note: String,
    pub responsible_party: String,
    pub settlement_status: SettlementStatus,
    /// Treasury entry that swept this row
    pub settlement_id: Option<Uuid>,
    /// Row version, bumped on every mutation
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CashMovement {
    /// Contribution of this line to the unit balance
    pub fn signed_amount(&self) -> Decimal {
        self.direction.signed(self.amount.value())
    }

    pub fn row_version(&self) -> RowVersion {
        RowVersion {
            id: self.id,
            version: self.version,
        }
    }
}

/// A central treasury ledger line (`arus_kas`). Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreasuryEntry {
    pub id: Uuid,
    pub date: NaiveDate,
    pub direction: Direction,
    pub amount: Amount,
    pub category: String,
    pub note: String,
    pub recipient: String,
    /// Depositing unit, for settlement entries
    pub unit: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TreasuryEntry {
    /// The aggregate deposit written by a settlement
    pub fn unit_deposit(unit: &str, amount: Amount, date: NaiveDate, recipient: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            direction: Direction::Masuk,
            amount,
            category: SETTLEMENT_CATEGORY.to_string(),
            note: format!("Setoran Operasional Unit {}", unit),
            recipient: recipient.to_string(),
            unit: Some(unit.to_string()),
            created_at: Utc::now(),
        }
    }

    pub fn signed_amount(&self) -> Decimal {
        self.direction.signed(self.amount.value())
    }
}

/// Identity and version of a row as observed by a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowVersion {
    pub id: Uuid,
    pub version: i64,
}
