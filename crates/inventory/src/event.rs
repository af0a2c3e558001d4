use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spoolledger_core::{AccountId, ConsumptionId, Quantity, Unit};
use spoolledger_events::Event;

use crate::ledger::Movement;

/// Why an account's remaining quantity moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCause {
    Consumed,
    Restored,
}

/// Event: InventoryChanged.
///
/// Emitted once per touched account after a batch has committed. Alert and
/// webhook dispatchers key off `threshold_crossed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryChanged {
    pub account_id: AccountId,
    pub tracking_id: Option<String>,
    pub label: String,
    pub unit: Unit,
    pub previous_remaining: Quantity,
    pub remaining: Quantity,
    pub cause: ChangeCause,
    pub threshold_crossed: bool,
    /// The consumption record that caused the movement, if any.
    pub consumption_id: Option<ConsumptionId>,
    pub occurred_at: DateTime<Utc>,
}

impl InventoryChanged {
    pub fn from_movement(
        movement: &Movement,
        consumption_id: Option<ConsumptionId>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id: movement.account_id,
            tracking_id: movement.tracking_id.clone(),
            label: movement.label.clone(),
            unit: movement.unit,
            previous_remaining: movement.previous,
            remaining: movement.current,
            cause: if movement.is_consumption() {
                ChangeCause::Consumed
            } else {
                ChangeCause::Restored
            },
            threshold_crossed: movement.crossed_alert_threshold(),
            consumption_id,
            occurred_at,
        }
    }
}

impl Event for InventoryChanged {
    fn event_type(&self) -> &'static str {
        "inventory.account.changed"
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(previous: f64, current: f64) -> Movement {
        Movement {
            account_id: AccountId::new(),
            label: "Galaxy Black PLA".to_string(),
            tracking_id: Some("PLA03".to_string()),
            unit: Unit::Mass,
            previous: Quantity::grams(previous),
            current: Quantity::grams(current),
            alert_threshold: Some(Quantity::grams(50.0)),
        }
    }

    #[test]
    fn consumption_across_the_threshold_is_flagged() {
        let event = InventoryChanged::from_movement(&movement(80.0, 40.0), None, Utc::now());
        assert_eq!(event.cause, ChangeCause::Consumed);
        assert!(event.threshold_crossed);
        assert_eq!(event.event_type(), "inventory.account.changed");
    }

    #[test]
    fn staying_below_the_threshold_is_not_a_new_crossing() {
        let event = InventoryChanged::from_movement(&movement(40.0, 30.0), None, Utc::now());
        assert!(!event.threshold_crossed);
    }

    #[test]
    fn restores_are_never_crossings() {
        let event = InventoryChanged::from_movement(&movement(40.0, 90.0), None, Utc::now());
        assert_eq!(event.cause, ChangeCause::Restored);
        assert!(!event.threshold_crossed);
    }

    #[test]
    fn serializes_cause_in_snake_case() {
        let event = InventoryChanged::from_movement(&movement(80.0, 40.0), None, Utc::now());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["cause"], "consumed");
        assert_eq!(json["remaining"], 40_000);
    }
}
