use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spoolledger_core::{AccountId, ConsumptionId, Quantity, Unit};
use spoolledger_costing::CostSnapshot;
use spoolledger_inventory::{ConsumptionLine, Movement, ShortageReport};

use super::error::ConsumeError;

/// A batch of lines to draw down together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionRequest {
    pub lines: Vec<ConsumptionLine>,
    /// Machine time, priced into the snapshot.
    #[serde(default)]
    pub hours: f64,
    /// Accept warnings and dip below reserve floors.
    #[serde(default)]
    pub force: bool,
}

impl ConsumptionRequest {
    pub fn new(lines: Vec<ConsumptionLine>) -> Self {
        Self {
            lines,
            hours: 0.0,
            force: false,
        }
    }

    pub fn with_hours(mut self, hours: f64) -> Self {
        self.hours = hours;
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn account_ids(&self) -> Vec<AccountId> {
        self.lines.iter().map(|l| l.account_id).collect()
    }

    /// Lines in commit order (by position, ties keep submission order).
    pub(crate) fn ordered_lines(&self) -> Vec<&ConsumptionLine> {
        let mut lines: Vec<&ConsumptionLine> = self.lines.iter().collect();
        lines.sort_by_key(|l| l.position);
        lines
    }

    pub(crate) fn check(&self) -> Result<(), ConsumeError> {
        check_lines(&self.lines)?;
        if !self.hours.is_finite() || self.hours < 0.0 {
            return Err(ConsumeError::Validation(format!(
                "machine hours must be a non-negative number (got {})",
                self.hours
            )));
        }
        Ok(())
    }
}

pub(crate) fn check_lines(lines: &[ConsumptionLine]) -> Result<(), ConsumeError> {
    if lines.is_empty() {
        return Err(ConsumeError::Validation("at least one line is required".to_string()));
    }
    if let Some(line) = lines.iter().find(|l| l.quantity.is_negative()) {
        return Err(ConsumeError::Validation(format!(
            "line {} requests a negative quantity",
            line.position
        )));
    }
    Ok(())
}

/// Lifecycle of one consumption.
///
/// ```text
/// Received → Validated → Blocked
///                      → Snapshotted → Committed
/// (any non-terminal)   → Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionStage {
    Received,
    Validated,
    Blocked,
    Snapshotted,
    Committed,
    Aborted,
}

impl ConsumptionStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConsumptionStage::Blocked | ConsumptionStage::Committed | ConsumptionStage::Aborted
        )
    }

    pub fn can_advance_to(self, next: ConsumptionStage) -> bool {
        use ConsumptionStage::*;
        match (self, next) {
            (Received, Validated) | (Validated, Blocked) | (Validated, Snapshotted) | (Snapshotted, Committed) => {
                true
            }
            (from, Aborted) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ConsumptionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsumptionStage::Received => "received",
            ConsumptionStage::Validated => "validated",
            ConsumptionStage::Blocked => "blocked",
            ConsumptionStage::Snapshotted => "snapshotted",
            ConsumptionStage::Committed => "committed",
            ConsumptionStage::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Caller-side cancellation. Checked at stage boundaries up to the moment the
/// ledger starts committing; after that the batch always runs to completion
/// or rolls back.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<(), ConsumeError> {
        if self.is_cancelled() {
            Err(ConsumeError::Aborted)
        } else {
            Ok(())
        }
    }
}

/// Result of a committed consume or revise.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    pub consumption_id: ConsumptionId,
    pub revision: u64,
    pub snapshot: CostSnapshot,
    /// What the validator saw under the commit locks; non-`Clean` only when forced.
    pub report: ShortageReport,
    pub movements: Vec<Movement>,
}

/// One consumption as seen from a single account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageEntry {
    pub consumption_id: ConsumptionId,
    /// Sum of the record's lines on this account.
    pub quantity: Quantity,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Consumptions that drew on one account, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageHistory {
    pub account_id: AccountId,
    pub unit: Unit,
    pub total: Quantity,
    pub remaining: Quantity,
    /// Sum over `entries`.
    pub consumed: Quantity,
    pub entries: Vec<UsageEntry>,
}
