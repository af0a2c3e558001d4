use serde::{Deserialize, Serialize};

use spoolledger_core::error::ensure_non_negative;
use spoolledger_core::{AccountId, DomainError, DomainResult, Entity, Quantity, Unit};

use crate::error::LedgerError;

/// Per-install defaults applied when an account is opened without explicit
/// reserve floor / alert threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDefaults {
    pub mass_reserve_floor: Quantity,
    pub count_reserve_floor: Quantity,
    pub mass_alert_threshold: Option<Quantity>,
    pub count_alert_threshold: Option<Quantity>,
}

impl Default for AccountDefaults {
    fn default() -> Self {
        Self {
            mass_reserve_floor: Quantity::grams(5.0),
            count_reserve_floor: Quantity::ZERO,
            mass_alert_threshold: Some(Quantity::grams(50.0)),
            count_alert_threshold: None,
        }
    }
}

impl AccountDefaults {
    pub fn reserve_floor(&self, unit: Unit) -> Quantity {
        match unit {
            Unit::Mass => self.mass_reserve_floor,
            Unit::Count => self.count_reserve_floor,
        }
    }

    pub fn alert_threshold(&self, unit: Unit) -> Option<Quantity> {
        match unit {
            Unit::Mass => self.mass_alert_threshold,
            Unit::Count => self.count_alert_threshold,
        }
    }
}

/// Catalog data for opening a new account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAccount {
    pub label: String,
    pub tracking_id: Option<String>,
    /// Interchangeable-stock key (e.g. `PLA` for every PLA spool).
    #[serde(default)]
    pub family: Option<String>,
    pub unit: Unit,
    pub total: Quantity,
    /// Defaults to `total` (a fresh spool / a full box).
    pub remaining: Option<Quantity>,
    pub reserve_floor: Option<Quantity>,
    pub alert_threshold: Option<Quantity>,
    /// Per kilogram for mass accounts, per item for count accounts.
    pub unit_cost: f64,
}

impl NewAccount {
    pub fn spool(label: impl Into<String>, total: Quantity, cost_per_kg: f64) -> Self {
        Self {
            label: label.into(),
            tracking_id: None,
            family: None,
            unit: Unit::Mass,
            total,
            remaining: None,
            reserve_floor: None,
            alert_threshold: None,
            unit_cost: cost_per_kg,
        }
    }

    pub fn hardware(label: impl Into<String>, total: Quantity, cost_per_item: f64) -> Self {
        Self {
            unit: Unit::Count,
            ..Self::spool(label, total, cost_per_item)
        }
    }

    pub fn with_tracking_id(mut self, tracking_id: impl Into<String>) -> Self {
        self.tracking_id = Some(tracking_id.into());
        self
    }

    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }

    pub fn with_remaining(mut self, remaining: Quantity) -> Self {
        self.remaining = Some(remaining);
        self
    }

    pub fn with_reserve_floor(mut self, reserve_floor: Quantity) -> Self {
        self.reserve_floor = Some(reserve_floor);
        self
    }

    pub fn with_alert_threshold(mut self, threshold: Quantity) -> Self {
        self.alert_threshold = Some(threshold);
        self
    }
}

/// Ledger record for one consumable.
///
/// Invariant: `0 <= remaining <= total`. `remaining` may sit below
/// `reserve_floor` only after a forced consumption.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceAccount {
    id: AccountId,
    label: String,
    tracking_id: Option<String>,
    family: Option<String>,
    unit: Unit,
    total: Quantity,
    remaining: Quantity,
    reserve_floor: Quantity,
    alert_threshold: Option<Quantity>,
    unit_cost: f64,
    active: bool,
}

impl Entity for ResourceAccount {
    type Id = AccountId;

    fn id(&self) -> AccountId {
        self.id
    }
}

impl ResourceAccount {
    pub(crate) fn open(id: AccountId, new: NewAccount, defaults: &AccountDefaults) -> DomainResult<Self> {
        let label = new.label.trim().to_string();
        if label.is_empty() {
            return Err(DomainError::validation("label cannot be empty"));
        }
        if new.total.is_negative() {
            return Err(DomainError::validation("total quantity cannot be negative"));
        }
        let remaining = new.remaining.unwrap_or(new.total);
        if remaining.is_negative() || remaining > new.total {
            return Err(DomainError::invariant(format!(
                "remaining {} must be between 0 and total {}",
                new.unit.format(remaining),
                new.unit.format(new.total)
            )));
        }
        let reserve_floor = new.reserve_floor.unwrap_or_else(|| defaults.reserve_floor(new.unit));
        if reserve_floor.is_negative() {
            return Err(DomainError::validation("reserve floor cannot be negative"));
        }
        ensure_non_negative("unit cost", new.unit_cost)?;
        let tracking_id = new
            .tracking_id
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let family = new
            .family
            .map(|f| f.trim().to_ascii_uppercase())
            .filter(|f| !f.is_empty());

        Ok(Self {
            id,
            label,
            tracking_id,
            family,
            unit: new.unit,
            total: new.total,
            remaining,
            reserve_floor,
            alert_threshold: new.alert_threshold.or_else(|| defaults.alert_threshold(new.unit)),
            unit_cost: new.unit_cost,
            active: true,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn tracking_id(&self) -> Option<&str> {
        self.tracking_id.as_deref()
    }

    /// Upper-cased family key, if the account belongs to one.
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn total(&self) -> Quantity {
        self.total
    }

    pub fn remaining(&self) -> Quantity {
        self.remaining
    }

    pub fn reserve_floor(&self) -> Quantity {
        self.reserve_floor
    }

    pub fn alert_threshold(&self) -> Option<Quantity> {
        self.alert_threshold
    }

    /// Current catalog unit cost (per kg for mass, per item for count).
    pub fn unit_cost(&self) -> f64 {
        self.unit_cost
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.base() <= 0
    }

    /// At or below `threshold` but not empty.
    pub fn is_low(&self, threshold: Quantity) -> bool {
        !self.is_empty() && self.remaining <= threshold
    }

    /// Remaining as a percentage of total, one decimal place.
    pub fn remaining_percent(&self) -> f64 {
        if self.total.base() <= 0 {
            return 0.0;
        }
        let pct = self.remaining.base() as f64 / self.total.base() as f64 * 100.0;
        (pct * 10.0).round() / 10.0
    }

    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            id: self.id,
            label: self.label.clone(),
            tracking_id: self.tracking_id.clone(),
            unit: self.unit,
            remaining: self.remaining,
            active: self.active,
        }
    }

    /// Quantity left after consuming `qty`, or why it is not allowed.
    pub(crate) fn after_commit(&self, qty: Quantity, force: bool) -> Result<Quantity, LedgerError> {
        if !self.active {
            return Err(LedgerError::Inactive(self.id));
        }
        if qty.is_negative() {
            return Err(LedgerError::NegativeQuantity { account_id: self.id, quantity: qty });
        }
        let resulting = self
            .remaining
            .checked_sub(qty)
            .filter(|r| !r.is_negative())
            .ok_or_else(|| LedgerError::Insufficient {
                account_id: self.id,
                unit: self.unit,
                remaining: self.remaining,
                requested: qty,
            })?;
        if !force && resulting < self.reserve_floor {
            return Err(LedgerError::BelowReserve {
                account_id: self.id,
                unit: self.unit,
                resulting,
                reserve_floor: self.reserve_floor,
            });
        }
        Ok(resulting)
    }

    /// Quantity after putting `qty` back. Allowed on inactive accounts so a
    /// cancelled job can always be unwound.
    pub(crate) fn after_restore(&self, qty: Quantity) -> Result<Quantity, LedgerError> {
        if qty.is_negative() {
            return Err(LedgerError::NegativeQuantity { account_id: self.id, quantity: qty });
        }
        self.remaining
            .checked_add(qty)
            .filter(|r| *r <= self.total)
            .ok_or_else(|| LedgerError::OverCapacity {
                account_id: self.id,
                unit: self.unit,
                remaining: self.remaining,
                restored: qty,
                total: self.total,
            })
    }

    pub(crate) fn set_remaining(&mut self, remaining: Quantity) {
        debug_assert!(!remaining.is_negative() && remaining <= self.total);
        self.remaining = remaining;
    }

    pub(crate) fn set_unit_cost(&mut self, unit_cost: f64) {
        self.unit_cost = unit_cost;
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) fn set_reserve_floor(&mut self, reserve_floor: Quantity) {
        self.reserve_floor = reserve_floor;
    }
}

/// Identifying data of an account, returned alongside conflicts so a caller
/// can decide what to do with the existing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub id: AccountId,
    pub label: String,
    pub tracking_id: Option<String>,
    pub unit: Unit,
    pub remaining: Quantity,
    pub active: bool,
}

/// One line of a consumption request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionLine {
    pub account_id: AccountId,
    pub quantity: Quantity,
    /// Ordering within a multi-line job (e.g. extruder slot).
    pub position: u32,
}

impl ConsumptionLine {
    pub fn new(account_id: AccountId, quantity: Quantity) -> Self {
        Self { account_id, quantity, position: 0 }
    }

    pub fn at(mut self, position: u32) -> Self {
        self.position = position;
        self
    }

    /// Everything `lines` draw from `account_id`.
    pub fn sum_for(lines: &[ConsumptionLine], account_id: AccountId) -> Quantity {
        let base = lines
            .iter()
            .filter(|l| l.account_id == account_id)
            .map(|l| l.quantity.base())
            .fold(0i64, i64::saturating_add);
        Quantity::from_base(base)
    }
}
