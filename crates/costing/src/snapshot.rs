//! Frozen cost records.
//!
//! A [`CostSnapshot`] copies every input it was priced from (quantities, unit
//! costs at the time, machine hours, the whole rate card) and holds no link to
//! live accounts. It is never patched: a corrected job gets a new snapshot
//! whose `supersedes` points at the old one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spoolledger_core::{AccountId, DomainResult, Entity, Quantity, SnapshotId, Unit};
use spoolledger_inventory::{ConsumptionLine, ResourceAccount};

use crate::breakdown::{CostBreakdown, CostLine, line_cost, price_lines};
use crate::rates::RateCard;

/// Catalog values to freeze for one consumption line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInput {
    pub account_id: AccountId,
    pub label: String,
    pub tracking_id: Option<String>,
    pub unit: Unit,
    pub position: u32,
    pub quantity: Quantity,
    pub unit_cost: f64,
}

impl SnapshotInput {
    /// Copy what is needed out of the account as it is right now.
    pub fn from_account(account: &ResourceAccount, line: &ConsumptionLine) -> Self {
        Self {
            account_id: account.id(),
            label: account.label().to_string(),
            tracking_id: account.tracking_id().map(str::to_string),
            unit: account.unit(),
            position: line.position,
            quantity: line.quantity,
            unit_cost: account.unit_cost(),
        }
    }

    fn cost_line(&self) -> CostLine {
        CostLine::new(self.unit, self.quantity, self.unit_cost)
    }
}

/// One priced line inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotLine {
    account_id: AccountId,
    label: String,
    tracking_id: Option<String>,
    unit: Unit,
    position: u32,
    quantity: Quantity,
    unit_cost_at_time: f64,
    line_cost: f64,
}

impl SnapshotLine {
    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn tracking_id(&self) -> Option<&str> {
        self.tracking_id.as_deref()
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn unit_cost_at_time(&self) -> f64 {
        self.unit_cost_at_time
    }

    pub fn line_cost(&self) -> f64 {
        self.line_cost
    }

    fn cost_line(&self) -> CostLine {
        CostLine::new(self.unit, self.quantity, self.unit_cost_at_time)
    }
}

/// Write-once cost record of a consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSnapshot {
    id: SnapshotId,
    created_at: DateTime<Utc>,
    supersedes: Option<SnapshotId>,
    hours: f64,
    rates: RateCard,
    lines: Vec<SnapshotLine>,
    breakdown: CostBreakdown,
}

impl CostSnapshot {
    /// Price `inputs` and freeze the result. Lines are stored in position order.
    pub fn capture(inputs: Vec<SnapshotInput>, hours: f64, rates: &RateCard) -> DomainResult<Self> {
        Self::build(inputs, hours, rates, None)
    }

    /// A replacement for `self`, priced from fresh inputs. `self` is untouched.
    pub fn revise(&self, inputs: Vec<SnapshotInput>, hours: f64, rates: &RateCard) -> DomainResult<Self> {
        Self::build(inputs, hours, rates, Some(self.id))
    }

    fn build(
        mut inputs: Vec<SnapshotInput>,
        hours: f64,
        rates: &RateCard,
        supersedes: Option<SnapshotId>,
    ) -> DomainResult<Self> {
        inputs.sort_by_key(|i| i.position);
        let cost_lines: Vec<CostLine> = inputs.iter().map(SnapshotInput::cost_line).collect();
        let breakdown = price_lines(&cost_lines, hours, rates)?;

        let lines = inputs
            .into_iter()
            .map(|input| SnapshotLine {
                line_cost: line_cost(input.unit, input.quantity, input.unit_cost),
                account_id: input.account_id,
                label: input.label,
                tracking_id: input.tracking_id,
                unit: input.unit,
                position: input.position,
                quantity: input.quantity,
                unit_cost_at_time: input.unit_cost,
            })
            .collect();

        let snapshot = Self {
            id: SnapshotId::new(),
            created_at: Utc::now(),
            supersedes,
            hours,
            rates: rates.clone(),
            lines,
            breakdown,
        };
        tracing::debug!(
            snapshot_id = %snapshot.id,
            supersedes = ?snapshot.supersedes.map(|s| s.to_string()),
            total = snapshot.breakdown.total,
            "cost snapshot captured"
        );
        Ok(snapshot)
    }

    pub fn id(&self) -> SnapshotId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn supersedes(&self) -> Option<SnapshotId> {
        self.supersedes
    }

    pub fn hours(&self) -> f64 {
        self.hours
    }

    pub fn rates(&self) -> &RateCard {
        &self.rates
    }

    pub fn lines(&self) -> &[SnapshotLine] {
        &self.lines
    }

    pub fn breakdown(&self) -> &CostBreakdown {
        &self.breakdown
    }

    pub fn total(&self) -> f64 {
        self.breakdown.total
    }

    /// Re-price from the stored inputs alone. For an untampered snapshot this
    /// equals [`Self::breakdown`] exactly.
    pub fn recompute(&self) -> DomainResult<CostBreakdown> {
        let cost_lines: Vec<CostLine> = self.lines.iter().map(SnapshotLine::cost_line).collect();
        price_lines(&cost_lines, self.hours, &self.rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spoolledger_inventory::{AccountDefaults, NewAccount, StockLedger};

    fn input(quantity: Quantity, unit_cost: f64) -> SnapshotInput {
        SnapshotInput {
            account_id: AccountId::new(),
            label: "Matte White PLA".to_string(),
            tracking_id: Some("PLA02".to_string()),
            unit: Unit::Mass,
            position: 0,
            quantity,
            unit_cost,
        }
    }

    #[test]
    fn fifty_grams_at_twenty_per_kilogram_costs_one() {
        let snapshot = CostSnapshot::capture(vec![input(Quantity::grams(50.0), 20.0)], 0.0, &RateCard::default())
            .unwrap();
        assert_eq!(snapshot.lines()[0].line_cost(), 1.0);
        assert_eq!(snapshot.breakdown().resource_cost, 1.0);
    }

    #[test]
    fn repricing_the_account_does_not_touch_an_existing_snapshot() {
        let ledger = StockLedger::new(AccountDefaults::default());
        let id = ledger
            .register(NewAccount::spool("PETG Blue", Quantity::grams(1000.0), 20.0))
            .unwrap();
        let line = ConsumptionLine::new(id, Quantity::grams(50.0));

        let account = ledger.account(id).unwrap();
        let snapshot =
            CostSnapshot::capture(vec![SnapshotInput::from_account(&account, &line)], 1.5, &RateCard::default())
                .unwrap();
        let frozen = serde_json::to_string(&snapshot).unwrap();

        ledger.reprice(id, 45.0).unwrap();

        assert_eq!(serde_json::to_string(&snapshot).unwrap(), frozen);
        assert_eq!(snapshot.lines()[0].unit_cost_at_time(), 20.0);
        assert_eq!(snapshot.recompute().unwrap(), *snapshot.breakdown());
    }

    #[test]
    fn revision_creates_a_new_snapshot_linked_to_the_old_one() {
        let rates = RateCard::default();
        let original = CostSnapshot::capture(vec![input(Quantity::grams(50.0), 20.0)], 1.0, &rates).unwrap();
        let before = original.clone();

        let revised = original
            .revise(vec![input(Quantity::grams(80.0), 20.0)], 1.0, &rates)
            .unwrap();

        assert_eq!(original, before);
        assert_ne!(revised.id(), original.id());
        assert_eq!(revised.supersedes(), Some(original.id()));
        assert!(revised.total() > original.total());
    }

    #[test]
    fn lines_are_stored_in_position_order() {
        let mut second = input(Quantity::items(3), 0.1);
        second.unit = Unit::Count;
        second.position = 2;
        let mut first = input(Quantity::grams(10.0), 20.0);
        first.position = 1;

        let snapshot = CostSnapshot::capture(vec![second, first], 0.0, &RateCard::default()).unwrap();
        let positions: Vec<u32> = snapshot.lines().iter().map(SnapshotLine::position).collect();
        assert_eq!(positions, vec![1, 2]);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let snapshot = CostSnapshot::capture(vec![input(Quantity::grams(12.5), 19.99)], 0.75, &RateCard::default())
            .unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: CostSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), snapshot.id());
        assert_eq!(back.created_at(), snapshot.created_at());
        assert_eq!(back.lines()[0].quantity(), Quantity::grams(12.5));
        assert_eq!(back.lines()[0].tracking_id(), Some("PLA02"));
        assert!((back.total() - snapshot.total()).abs() < 1e-9);
    }
}
