//! The one place cost arithmetic lives.

use serde::{Deserialize, Serialize};

use spoolledger_core::error::ensure_non_negative;
use spoolledger_core::{DomainError, DomainResult, Quantity, Unit, ValueObject};

use crate::rates::RateCard;

/// A quantity of one resource at a given unit cost.
///
/// `unit_cost` is per kilogram for mass, per item for count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostLine {
    pub unit: Unit,
    pub quantity: Quantity,
    pub unit_cost: f64,
}

impl CostLine {
    pub fn new(unit: Unit, quantity: Quantity, unit_cost: f64) -> Self {
        Self { unit, quantity, unit_cost }
    }

    pub fn cost(&self) -> f64 {
        line_cost(self.unit, self.quantity, self.unit_cost)
    }
}

/// `(grams / 1000) * cost_per_kg` for mass, `items * cost_per_item` for count.
pub fn line_cost(unit: Unit, quantity: Quantity, unit_cost: f64) -> f64 {
    match unit {
        Unit::Mass => (quantity.to_natural(Unit::Mass) / 1000.0) * unit_cost,
        Unit::Count => quantity.to_natural(Unit::Count) * unit_cost,
    }
}

/// Aggregate cost of a job, unrounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub resource_cost: f64,
    pub energy_cost: f64,
    pub time_cost: f64,
    pub depreciation_cost: f64,
    pub fixed_fee: f64,
    pub subtotal: f64,
    pub margin_percent: f64,
    pub margin: f64,
    pub total: f64,
}

impl ValueObject for CostBreakdown {}

impl CostBreakdown {
    /// Presentation copy with every amount rounded to cents. Arithmetic always
    /// runs on the unrounded values.
    pub fn rounded(&self) -> CostBreakdown {
        CostBreakdown {
            resource_cost: round2(self.resource_cost),
            energy_cost: round2(self.energy_cost),
            time_cost: round2(self.time_cost),
            depreciation_cost: round2(self.depreciation_cost),
            fixed_fee: round2(self.fixed_fee),
            subtotal: round2(self.subtotal),
            margin_percent: self.margin_percent,
            margin: round2(self.margin),
            total: round2(self.total),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Price a set of lines plus `hours` of machine time.
///
/// ```text
/// energy       = hours * (wattage / 1000) * electricity rate
/// time         = hours * hourly rate
/// depreciation = hours * depreciation rate
/// subtotal     = Σ line costs + energy + time + depreciation + fixed fee
/// margin       = subtotal * margin% / 100
/// total        = subtotal + margin
/// ```
pub fn price_lines(lines: &[CostLine], hours: f64, rates: &RateCard) -> DomainResult<CostBreakdown> {
    ensure_non_negative("machine hours", hours)?;
    rates.validate()?;
    for line in lines {
        if line.quantity.is_negative() {
            return Err(DomainError::validation("line quantity cannot be negative"));
        }
        ensure_non_negative("unit cost", line.unit_cost)?;
    }

    let resource_cost: f64 = lines.iter().map(CostLine::cost).sum();
    let energy_cost = hours * (rates.printer_wattage_w / 1000.0) * rates.electricity_rate_kwh;
    let time_cost = hours * rates.hourly_rate;
    let depreciation_cost = hours * rates.depreciation_rate;
    let fixed_fee = rates.fixed_fee;

    let subtotal = resource_cost + energy_cost + time_cost + depreciation_cost + fixed_fee;
    let margin = subtotal * rates.margin_percent / 100.0;

    Ok(CostBreakdown {
        resource_cost,
        energy_cost,
        time_cost,
        depreciation_cost,
        fixed_fee,
        subtotal,
        margin_percent: rates.margin_percent,
        margin,
        total: subtotal + margin,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mass_lines_are_priced_per_kilogram() {
        assert_eq!(line_cost(Unit::Mass, Quantity::grams(50.0), 20.0), 1.0);
        assert_eq!(line_cost(Unit::Mass, Quantity::grams(1000.0), 25.0), 25.0);
    }

    #[test]
    fn count_lines_are_priced_per_item() {
        assert_eq!(line_cost(Unit::Count, Quantity::items(4), 0.25), 1.0);
    }

    #[test]
    fn a_two_hour_job_with_default_rates() {
        let lines = [
            CostLine::new(Unit::Mass, Quantity::grams(100.0), 20.0),
            CostLine::new(Unit::Count, Quantity::items(4), 0.5),
        ];
        let b = price_lines(&lines, 2.0, &RateCard::default()).unwrap().rounded();

        assert_eq!(b.resource_cost, 4.0);
        assert_eq!(b.energy_cost, 0.05);
        assert_eq!(b.time_cost, 4.0);
        assert_eq!(b.depreciation_cost, 1.0);
        assert_eq!(b.fixed_fee, 5.0);
        assert_eq!(b.subtotal, 14.05);
        assert_eq!(b.margin, 0.7);
        assert_eq!(b.total, 14.75);
    }

    #[test]
    fn bad_inputs_are_rejected() {
        let rates = RateCard::default();
        assert!(price_lines(&[], -1.0, &rates).is_err());
        assert!(price_lines(&[CostLine::new(Unit::Mass, Quantity::grams(-1.0), 20.0)], 1.0, &rates).is_err());
        assert!(price_lines(&[CostLine::new(Unit::Mass, Quantity::grams(1.0), f64::INFINITY)], 1.0, &rates).is_err());
    }

    #[test]
    fn an_empty_job_still_pays_the_fixed_fee() {
        let b = price_lines(&[], 0.0, &RateCard::default()).unwrap();
        assert_eq!(b.subtotal, 5.0);
        assert_eq!(b.total, 5.25);
    }
}
