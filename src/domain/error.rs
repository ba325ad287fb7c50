//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::records::SettlementStatus;

/// Business rule violations and domain invariant failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Settlement attempted with a non-positive unsettled net
    #[error("Insufficient balance for unit {unit}: unsettled net is {balance}")]
    InsufficientBalance { unit: String, balance: Decimal },

    /// Missing or malformed input on a manual entry
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Invalid amount (negative, too precise, or too large)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Status change not permitted by the settlement lifecycle
    #[error("Cannot move cash movement from {from} to {to}")]
    InvalidStatusTransition {
        from: SettlementStatus,
        to: SettlementStatus,
    },

    /// Settled rows belong to a treasury deposit and are frozen
    #[error("Cash movement {0} is already settled and cannot be changed")]
    SettledRowImmutable(Uuid),

    /// Unsettled net too large for a single treasury deposit
    #[error("Unsettled net {net} for unit {unit} exceeds the settlement cap of {cap}")]
    SettlementCapExceeded {
        unit: String,
        net: Decimal,
        cap: Decimal,
    },

    /// Row version conflict (optimistic locking)
    #[error("Version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: i64, found: i64 },
}

impl DomainError {
    /// Create an insufficient balance error
    pub fn insufficient_balance(unit: impl Into<String>, balance: Decimal) -> Self {
        Self::InsufficientBalance {
            unit: unit.into(),
            balance,
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InsufficientBalance { .. }
                | Self::Validation(_)
                | Self::InvalidAmount(_)
                | Self::InvalidStatusTransition { .. }
                | Self::SettledRowImmutable(_)
                | Self::SettlementCapExceeded { .. }
        )
    }

    /// Check if this is a conflict error (retry may help)
    pub fn is_conflict_error(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

impl From<super::AmountError> for DomainError {
    fn from(err: super::AmountError) -> Self {
        Self::InvalidAmount(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_balance_error() {
        let err = DomainError::insufficient_balance("Kesehatan", Decimal::new(-1500, 0));

        assert!(err.is_client_error());
        assert!(!err.is_conflict_error());
        assert!(err.to_string().contains("Kesehatan"));
        assert!(err.to_string().contains("-1500"));
    }

    #[test]
    fn test_status_transition_error_message() {
        let err = DomainError::InvalidStatusTransition {
            from: SettlementStatus::Settled,
            to: SettlementStatus::Unsettled,
        };

        assert!(err.is_client_error());
        assert!(err.to_string().contains("Sudah Diterima Bendahara"));
    }

    #[test]
    fn test_version_conflict_error() {
        let err = DomainError::VersionConflict {
            expected: 1,
            found: 2,
        };

        assert!(!err.is_client_error());
        assert!(err.is_conflict_error());
    }
}
