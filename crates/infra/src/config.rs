//! Runtime settings.
//!
//! Settings come from an optional JSON file (`SPOOLLEDGER_CONFIG`) and are then
//! overridden field by field from `SPOOLLEDGER_*` environment variables. A
//! malformed variable is logged and ignored; a malformed file is an error.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use spoolledger_core::Quantity;
use spoolledger_costing::RateCard;
use spoolledger_inventory::AccountDefaults;

pub const CONFIG_PATH_VAR: &str = "SPOOLLEDGER_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rates: RateCard,
    /// Grams that should stay on a spool after a non-forced consumption.
    pub mass_reserve_floor_g: f64,
    /// Pieces that should stay in a hardware bin after a non-forced consumption.
    pub count_reserve_floor: i64,
    /// Low-stock alert level for new spools.
    pub low_stock_threshold_g: Option<f64>,
    pub count_alert_threshold: Option<i64>,
    /// When off, every batch validates as clean; the ledger still refuses to
    /// go below zero.
    pub shortage_checks: bool,
    /// Generate a tracking id for accounts registered without one.
    pub auto_tracking_ids: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rates: RateCard::default(),
            mass_reserve_floor_g: 5.0,
            count_reserve_floor: 0,
            low_stock_threshold_g: Some(50.0),
            count_alert_threshold: None,
            shortage_checks: true,
            auto_tracking_ids: true,
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// File named by `SPOOLLEDGER_CONFIG` (or defaults), then env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        let settings = base.with_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `SPOOLLEDGER_*` overrides looked up through `lookup`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let rates = &mut self.rates;
        read_var(&lookup, "SPOOLLEDGER_ELECTRICITY_RATE_KWH", &mut rates.electricity_rate_kwh);
        read_var(&lookup, "SPOOLLEDGER_PRINTER_WATTAGE_W", &mut rates.printer_wattage_w);
        read_var(&lookup, "SPOOLLEDGER_HOURLY_RATE", &mut rates.hourly_rate);
        read_var(&lookup, "SPOOLLEDGER_DEPRECIATION_RATE", &mut rates.depreciation_rate);
        read_var(&lookup, "SPOOLLEDGER_FIXED_FEE", &mut rates.fixed_fee);
        read_var(&lookup, "SPOOLLEDGER_MARGIN_PERCENT", &mut rates.margin_percent);
        if let Some(symbol) = lookup("SPOOLLEDGER_CURRENCY_SYMBOL") {
            rates.currency_symbol = symbol;
        }

        read_var(&lookup, "SPOOLLEDGER_MASS_RESERVE_FLOOR_G", &mut self.mass_reserve_floor_g);
        read_var(&lookup, "SPOOLLEDGER_COUNT_RESERVE_FLOOR", &mut self.count_reserve_floor);
        let mut threshold = self.low_stock_threshold_g.unwrap_or_default();
        if read_var(&lookup, "SPOOLLEDGER_LOW_STOCK_THRESHOLD_G", &mut threshold) {
            self.low_stock_threshold_g = (threshold > 0.0).then_some(threshold);
        }
        read_var(&lookup, "SPOOLLEDGER_SHORTAGE_CHECKS", &mut self.shortage_checks);
        read_var(&lookup, "SPOOLLEDGER_AUTO_TRACKING_IDS", &mut self.auto_tracking_ids);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rates
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if !self.mass_reserve_floor_g.is_finite() || self.mass_reserve_floor_g < 0.0 {
            return Err(ConfigError::Invalid("mass_reserve_floor_g must be >= 0".to_string()));
        }
        if self.count_reserve_floor < 0 {
            return Err(ConfigError::Invalid("count_reserve_floor must be >= 0".to_string()));
        }
        if matches!(self.low_stock_threshold_g, Some(t) if !t.is_finite() || t < 0.0) {
            return Err(ConfigError::Invalid("low_stock_threshold_g must be >= 0".to_string()));
        }
        if matches!(self.count_alert_threshold, Some(t) if t < 0) {
            return Err(ConfigError::Invalid("count_alert_threshold must be >= 0".to_string()));
        }
        Ok(())
    }

    pub fn account_defaults(&self) -> AccountDefaults {
        AccountDefaults {
            mass_reserve_floor: Quantity::grams(self.mass_reserve_floor_g),
            count_reserve_floor: Quantity::items(self.count_reserve_floor),
            mass_alert_threshold: self.low_stock_threshold_g.map(Quantity::grams),
            count_alert_threshold: self.count_alert_threshold.map(Quantity::items),
        }
    }
}

/// Returns true when `key` was present and parsed.
fn read_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) -> bool
where
    T: std::str::FromStr,
{
    let Some(raw) = lookup(key) else {
        return false;
    };
    match raw.trim().parse() {
        Ok(value) => {
            *target = value;
            true
        }
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring malformed setting");
            false
        }
    }
}
