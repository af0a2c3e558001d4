//! Pre-flight shortage classification.
//!
//! Never mutates anything: it reads account state through an [`AccountView`]
//! (a copied map, or a live [`LedgerTransaction`](crate::LedgerTransaction)
//! holding the locks) and reports what a batch *would* do.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use spoolledger_core::{AccountId, Quantity, Unit};

use crate::account::ConsumptionLine;
use crate::error::LedgerError;
use crate::ledger::AccountView;

/// One line that would breach the zero floor (hard) or the reserve floor (soft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortageEntry {
    pub account_id: AccountId,
    pub label: String,
    pub tracking_id: Option<String>,
    pub unit: Unit,
    pub position: u32,
    /// Remaining before this line, after earlier lines of the same batch.
    pub current: Quantity,
    pub requested: Quantity,
    /// May be negative for a hard shortage.
    pub resulting: Quantity,
    /// `-resulting` for a hard shortage, zero otherwise.
    pub shortage_amount: Quantity,
    pub within_reserve: bool,
}

impl ShortageEntry {
    pub fn is_hard(&self) -> bool {
        !self.within_reserve
    }
}

/// Outcome of a dry run over a batch.
///
/// `Blocking` carries every entry of the batch, soft ones included, so a
/// caller can render the whole picture before resubmitting with force.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "classification", content = "entries", rename_all = "snake_case")]
pub enum ShortageReport {
    #[default]
    Clean,
    Warning(Vec<ShortageEntry>),
    Blocking(Vec<ShortageEntry>),
}

impl ShortageReport {
    fn from_entries(entries: Vec<ShortageEntry>) -> Self {
        if entries.is_empty() {
            ShortageReport::Clean
        } else if entries.iter().any(ShortageEntry::is_hard) {
            ShortageReport::Blocking(entries)
        } else {
            ShortageReport::Warning(entries)
        }
    }

    pub fn entries(&self) -> &[ShortageEntry] {
        match self {
            ShortageReport::Clean => &[],
            ShortageReport::Warning(entries) | ShortageReport::Blocking(entries) => entries,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, ShortageReport::Clean)
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, ShortageReport::Blocking(_))
    }

    /// Anything other than `Clean` needs an explicit force to proceed.
    pub fn requires_force(&self) -> bool {
        !self.is_clean()
    }

    pub fn classification(&self) -> &'static str {
        match self {
            ShortageReport::Clean => "clean",
            ShortageReport::Warning(_) => "warning",
            ShortageReport::Blocking(_) => "blocking",
        }
    }
}

/// Classifies a batch of consumption lines against current account state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortageValidator {
    enabled: bool,
}

impl Default for ShortageValidator {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl ShortageValidator {
    /// A disabled validator reports every batch as `Clean`. The ledger still
    /// refuses to go below zero.
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Lines are evaluated in position order; several lines against the same
    /// account draw down one running balance.
    pub fn evaluate<V>(&self, lines: &[ConsumptionLine], accounts: &V) -> Result<ShortageReport, LedgerError>
    where
        V: AccountView + ?Sized,
    {
        let mut ordered: Vec<&ConsumptionLine> = lines.iter().collect();
        ordered.sort_by_key(|l| l.position);

        let mut running: BTreeMap<AccountId, Quantity> = BTreeMap::new();
        let mut entries = Vec::new();

        for line in ordered {
            let account = accounts
                .view(line.account_id)
                .ok_or(LedgerError::UnknownAccount(line.account_id))?;
            if line.quantity.is_negative() {
                return Err(LedgerError::NegativeQuantity {
                    account_id: line.account_id,
                    quantity: line.quantity,
                });
            }
            if !self.enabled {
                continue;
            }

            let current = *running.entry(line.account_id).or_insert(account.remaining());
            let resulting = Quantity::from_base(current.base().saturating_sub(line.quantity.base()));
            running.insert(line.account_id, resulting);

            let entry = |shortage_amount: Quantity, within_reserve: bool| ShortageEntry {
                account_id: line.account_id,
                label: account.label().to_string(),
                tracking_id: account.tracking_id().map(str::to_string),
                unit: account.unit(),
                position: line.position,
                current,
                requested: line.quantity,
                resulting,
                shortage_amount,
                within_reserve,
            };

            if resulting.is_negative() {
                entries.push(entry(resulting.negated(), false));
            } else if resulting < account.reserve_floor() {
                entries.push(entry(Quantity::ZERO, true));
            }
        }

        let report = ShortageReport::from_entries(entries);
        if !report.is_clean() {
            tracing::debug!(
                classification = report.classification(),
                entries = report.entries().len(),
                "shortage detected"
            );
        }
        Ok(report)
    }
}
