use thiserror::Error;

use spoolledger_core::{AccountId, ConsumptionId, DomainError};
use spoolledger_inventory::{AccountSummary, LedgerError, ShortageReport};

use crate::consumption_store::StoreError;

fn classification(report: &ShortageReport) -> &'static str {
    report.classification()
}

fn line_count(report: &ShortageReport) -> usize {
    report.entries().len()
}

fn tracking_of(summary: &AccountSummary) -> &str {
    summary.tracking_id.as_deref().unwrap_or_default()
}

fn label_of(summary: &AccountSummary) -> &str {
    &summary.label
}

/// Why a consumption (or revise / cancel / registration) did not go through.
///
/// Nothing has been mutated when any of these is returned.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConsumeError {
    /// Malformed request: no lines, negative quantities, unknown or inactive
    /// accounts at submission.
    #[error("invalid consumption request: {0}")]
    Validation(String),

    /// Not `Clean` and not forced. Resubmit with force or smaller quantities.
    #[error("consumption needs force: {} shortage on {} line(s)", classification(.report), line_count(.report))]
    ShortageBlocked { report: ShortageReport },

    /// An account was deactivated or removed after validation. Retryable.
    #[error("account {account_id} changed between validation and commit")]
    ConcurrentModification { account_id: AccountId },

    #[error(
        "tracking id '{}' is already used by active account '{}'",
        tracking_of(.existing),
        label_of(.existing)
    )]
    DuplicateIdentifier { existing: AccountSummary },

    #[error(transparent)]
    Ledger(LedgerError),

    #[error("persistence failed: {0}")]
    Persistence(StoreError),

    #[error("consumption aborted before commit")]
    Aborted,

    #[error("consumption {0} not found")]
    NotFound(ConsumptionId),
}

impl ConsumeError {
    /// Whether resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConsumeError::ConcurrentModification { .. }
                | ConsumeError::Persistence(StoreError::RevisionConflict { .. })
        )
    }

    /// Failures raised while the batch holds its locks. An account that has
    /// vanished or been deactivated since the pre-flight read is a concurrent
    /// modification, not a malformed request.
    pub(crate) fn at_commit(err: LedgerError) -> Self {
        match err {
            LedgerError::UnknownAccount(account_id) | LedgerError::Inactive(account_id) => {
                ConsumeError::ConcurrentModification { account_id }
            }
            other => other.into(),
        }
    }

    /// Failures raised before anything is locked for commit.
    pub(crate) fn at_submission(err: LedgerError) -> Self {
        match err {
            LedgerError::UnknownAccount(id) => ConsumeError::Validation(format!("account {id} does not exist")),
            LedgerError::NegativeQuantity { account_id, .. } => {
                ConsumeError::Validation(format!("negative quantity requested from account {account_id}"))
            }
            other => other.into(),
        }
    }
}

impl From<LedgerError> for ConsumeError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::DuplicateTrackingId { existing } => ConsumeError::DuplicateIdentifier { existing },
            LedgerError::Domain(err) => err.into(),
            other => ConsumeError::Ledger(other),
        }
    }
}

impl From<DomainError> for ConsumeError {
    fn from(value: DomainError) -> Self {
        ConsumeError::Validation(value.to_string())
    }
}

impl From<StoreError> for ConsumeError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => ConsumeError::NotFound(id),
            other => ConsumeError::Persistence(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spoolledger_core::{Quantity, Unit};

    #[test]
    fn vanished_accounts_at_commit_are_concurrent_modifications() {
        let id = AccountId::new();
        let err = ConsumeError::at_commit(LedgerError::Inactive(id));
        assert_eq!(err, ConsumeError::ConcurrentModification { account_id: id });
        assert!(err.is_retryable());

        let err = ConsumeError::at_submission(LedgerError::UnknownAccount(id));
        assert!(matches!(err, ConsumeError::Validation(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn duplicate_tracking_ids_surface_the_existing_account() {
        let existing = AccountSummary {
            id: AccountId::new(),
            label: "Galaxy Black PLA".to_string(),
            tracking_id: Some("PLA01".to_string()),
            unit: Unit::Mass,
            remaining: Quantity::grams(800.0),
            active: true,
        };
        let err: ConsumeError = LedgerError::DuplicateTrackingId {
            existing: existing.clone(),
        }
        .into();
        assert_eq!(err.to_string(), "tracking id 'PLA01' is already used by active account 'Galaxy Black PLA'");
        assert_eq!(err, ConsumeError::DuplicateIdentifier { existing });
    }

    #[test]
    fn store_errors_map_by_kind() {
        let id = ConsumptionId::new();
        assert_eq!(ConsumeError::from(StoreError::NotFound(id)), ConsumeError::NotFound(id));
        let conflict = ConsumeError::from(StoreError::RevisionConflict { id, expected: 1, found: 2 });
        assert!(conflict.is_retryable());
        assert!(!ConsumeError::from(StoreError::Unavailable("disk".into())).is_retryable());
    }
}
