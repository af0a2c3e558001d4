use serde::{Deserialize, Serialize};

use spoolledger_core::error::ensure_non_negative;
use spoolledger_core::{DomainResult, ValueObject};

/// Install-wide rates applied to every job.
///
/// Read from configuration at request time; a snapshot stores its own copy so
/// later rate edits never reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateCard {
    /// Price per kWh.
    pub electricity_rate_kwh: f64,
    /// Printer draw in watts.
    pub printer_wattage_w: f64,
    /// Labour / machine time per hour.
    pub hourly_rate: f64,
    /// Machine wear per hour.
    pub depreciation_rate: f64,
    /// Flat fee added once per job.
    pub fixed_fee: f64,
    /// Margin applied on top of the subtotal, in percent.
    pub margin_percent: f64,
    pub currency_symbol: String,
}

impl ValueObject for RateCard {}

impl Default for RateCard {
    fn default() -> Self {
        Self {
            electricity_rate_kwh: 0.12,
            printer_wattage_w: 200.0,
            hourly_rate: 2.0,
            depreciation_rate: 0.5,
            fixed_fee: 5.0,
            margin_percent: 5.0,
            currency_symbol: "$".to_string(),
        }
    }
}

impl RateCard {
    pub fn validate(&self) -> DomainResult<()> {
        ensure_non_negative("electricity rate", self.electricity_rate_kwh)?;
        ensure_non_negative("printer wattage", self.printer_wattage_w)?;
        ensure_non_negative("hourly rate", self.hourly_rate)?;
        ensure_non_negative("depreciation rate", self.depreciation_rate)?;
        ensure_non_negative("fixed fee", self.fixed_fee)?;
        ensure_non_negative("margin percent", self.margin_percent)?;
        Ok(())
    }

    /// `12.3456` → `"$12.35"`.
    pub fn format_amount(&self, amount: f64) -> String {
        format!("{}{:.2}", self.currency_symbol, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RateCard::default().validate().is_ok());
    }

    #[test]
    fn negative_or_nan_rates_are_rejected() {
        let rates = RateCard {
            hourly_rate: -2.0,
            ..RateCard::default()
        };
        assert!(rates.validate().is_err());

        let rates = RateCard {
            margin_percent: f64::NAN,
            ..RateCard::default()
        };
        assert!(rates.validate().is_err());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let rates: RateCard = serde_json::from_str(r#"{"hourly_rate": 3.5, "currency_symbol": "€"}"#).unwrap();
        assert_eq!(rates.hourly_rate, 3.5);
        assert_eq!(rates.fixed_fee, 5.0);
        assert_eq!(rates.format_amount(12.3456), "€12.35");
    }
}
