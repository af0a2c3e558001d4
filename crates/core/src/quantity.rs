//! Exact stock quantities.
//!
//! Quantities are stored as signed integers in the smallest tracked unit
//! (milligrams for filament, pieces for hardware) so that consuming and then
//! restoring the same amount always lands on the exact starting value. Cost
//! arithmetic works on the natural unit (grams / items) as `f64`.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// How a resource is measured.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Filament and other bulk material, tracked in grams.
    Mass,
    /// Discrete parts (magnets, screws, inserts), tracked in pieces.
    Count,
}

impl Unit {
    /// Base units per natural unit (milligrams per gram, pieces per piece).
    pub const fn scale(self) -> i64 {
        match self {
            Unit::Mass => 1_000,
            Unit::Count => 1,
        }
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Unit::Mass => "g",
            Unit::Count => "pcs",
        }
    }

    /// Render `quantity` in this unit, e.g. `96 g` or `3 pcs`.
    pub fn format(self, quantity: Quantity) -> String {
        format!("{} {}", quantity.to_natural(self), self.symbol())
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Mass => f.write_str("mass"),
            Unit::Count => f.write_str("count"),
        }
    }
}

/// Signed amount of a resource in base units.
///
/// Signed on purpose: a shortage report carries the (possibly negative)
/// quantity a consumption *would* leave behind.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(i64);

impl ValueObject for Quantity {}

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    pub const fn from_base(base: i64) -> Self {
        Self(base)
    }

    pub const fn milligrams(mg: i64) -> Self {
        Self(mg)
    }

    /// Grams, rounded to the nearest milligram.
    pub fn grams(grams: f64) -> Self {
        Self::from_natural_lossy(Unit::Mass, grams)
    }

    pub const fn items(count: i64) -> Self {
        Self(count)
    }

    /// Convert a natural-unit value, rejecting NaN and infinities.
    pub fn from_natural(unit: Unit, value: f64) -> DomainResult<Self> {
        if !value.is_finite() {
            return Err(DomainError::validation(format!(
                "quantity must be a finite number (got {value})"
            )));
        }
        Ok(Self::from_natural_lossy(unit, value))
    }

    fn from_natural_lossy(unit: Unit, value: f64) -> Self {
        // `as` saturates at the i64 bounds.
        Self((value * unit.scale() as f64).round() as i64)
    }

    pub const fn base(self) -> i64 {
        self.0
    }

    /// Value in grams (mass) or pieces (count).
    pub fn to_natural(self, unit: Unit) -> f64 {
        self.0 as f64 / unit.scale() as f64
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Quantity) -> Option<Quantity> {
        self.0.checked_add(rhs.0).map(Quantity)
    }

    pub fn checked_sub(self, rhs: Quantity) -> Option<Quantity> {
        self.0.checked_sub(rhs.0).map(Quantity)
    }

    /// Additive inverse; saturates for `i64::MIN`.
    pub fn negated(self) -> Quantity {
        Quantity(self.0.saturating_neg())
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn grams_are_stored_as_milligrams() {
        assert_eq!(Quantity::grams(96.0).base(), 96_000);
        assert_eq!(Quantity::grams(0.0016).base(), 2);
        assert_eq!(Quantity::grams(12.5).to_natural(Unit::Mass), 12.5);
    }

    #[test]
    fn items_are_whole_pieces() {
        assert_eq!(Quantity::items(3).to_natural(Unit::Count), 3.0);
        assert_eq!(Unit::Count.format(Quantity::items(3)), "3 pcs");
        assert_eq!(Unit::Mass.format(Quantity::grams(4.0)), "4 g");
    }

    #[test]
    fn non_finite_natural_values_are_rejected() {
        assert!(Quantity::from_natural(Unit::Mass, f64::NAN).is_err());
        assert!(Quantity::from_natural(Unit::Count, f64::NEG_INFINITY).is_err());
        assert_eq!(
            Quantity::from_natural(Unit::Count, 7.0).unwrap(),
            Quantity::items(7)
        );
    }

    #[test]
    fn units_serialize_in_lowercase() {
        assert_eq!(serde_json::to_string(&Unit::Mass).unwrap(), "\"mass\"");
        assert_eq!(serde_json::to_string(&Quantity::items(5)).unwrap(), "5");
    }

    proptest! {
        /// Subtracting then adding the same amount is exact.
        #[test]
        fn subtract_then_add_is_exact(start in 0i64..10_000_000, amount in 0i64..10_000_000) {
            let start = Quantity::from_base(start);
            let amount = Quantity::from_base(amount);
            let back = start
                .checked_sub(amount)
                .and_then(|q| q.checked_add(amount))
                .unwrap();
            prop_assert_eq!(back, start);
        }
    }
}
