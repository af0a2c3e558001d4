//! What-if pricing for quotes. No account is read or touched.

use spoolledger_core::{DomainResult, Quantity, Unit};

use crate::breakdown::{CostBreakdown, CostLine, price_lines};
use crate::rates::RateCard;

/// Price a single hypothetical line plus machine time.
pub fn estimate(
    unit: Unit,
    unit_cost: f64,
    quantity: Quantity,
    hours: f64,
    rates: &RateCard,
) -> DomainResult<CostBreakdown> {
    estimate_lines(&[CostLine::new(unit, quantity, unit_cost)], hours, rates)
}

/// Price several hypothetical lines (multi-material jobs).
pub fn estimate_lines(lines: &[CostLine], hours: f64, rates: &RateCard) -> DomainResult<CostBreakdown> {
    price_lines(lines, hours, rates)
}
