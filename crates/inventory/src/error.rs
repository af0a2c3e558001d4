use thiserror::Error;

use spoolledger_core::{AccountId, DomainError, Quantity, Unit};

use crate::account::AccountSummary;

fn fmt_qty(unit: &Unit, quantity: &Quantity) -> String {
    unit.format(*quantity)
}

fn tracking_of(summary: &AccountSummary) -> &str {
    summary.tracking_id.as_deref().unwrap_or_default()
}

/// Stock ledger failure.
///
/// Every variant that concerns an amount carries the numbers involved, so the
/// caller can show exactly why a movement was refused.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    #[error("account {0} not found")]
    UnknownAccount(AccountId),

    #[error("account {0} is inactive")]
    Inactive(AccountId),

    #[error("account {account_id}: quantity cannot be negative (got {quantity} base units)")]
    NegativeQuantity { account_id: AccountId, quantity: Quantity },

    #[error(
        "account {account_id}: cannot consume {} with only {} remaining",
        fmt_qty(.unit, .requested),
        fmt_qty(.unit, .remaining)
    )]
    Insufficient {
        account_id: AccountId,
        unit: Unit,
        remaining: Quantity,
        requested: Quantity,
    },

    #[error(
        "account {account_id}: consumption would leave {}, below the reserve of {}",
        fmt_qty(.unit, .resulting),
        fmt_qty(.unit, .reserve_floor)
    )]
    BelowReserve {
        account_id: AccountId,
        unit: Unit,
        resulting: Quantity,
        reserve_floor: Quantity,
    },

    #[error(
        "account {account_id}: restoring {} to {} would exceed the total of {}",
        fmt_qty(.unit, .restored),
        fmt_qty(.unit, .remaining),
        fmt_qty(.unit, .total)
    )]
    OverCapacity {
        account_id: AccountId,
        unit: Unit,
        remaining: Quantity,
        restored: Quantity,
        total: Quantity,
    },

    #[error("tracking id '{}' is already used by an active account", tracking_of(.existing))]
    DuplicateTrackingId { existing: AccountSummary },

    #[error("ledger lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl LedgerError {
    /// The account the failure is about, when there is one.
    pub fn account_id(&self) -> Option<AccountId> {
        match self {
            LedgerError::UnknownAccount(id) | LedgerError::Inactive(id) => Some(*id),
            LedgerError::NegativeQuantity { account_id, .. }
            | LedgerError::Insufficient { account_id, .. }
            | LedgerError::BelowReserve { account_id, .. }
            | LedgerError::OverCapacity { account_id, .. } => Some(*account_id),
            LedgerError::DuplicateTrackingId { existing } => Some(existing.id),
            LedgerError::Poisoned | LedgerError::Domain(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortfall_message_uses_natural_units() {
        let err = LedgerError::Insufficient {
            account_id: AccountId::new(),
            unit: Unit::Mass,
            remaining: Quantity::grams(100.0),
            requested: Quantity::grams(110.0),
        };
        let msg = err.to_string();
        assert!(msg.contains("cannot consume 110 g with only 100 g remaining"), "{msg}");
    }
}
