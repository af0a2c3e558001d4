//! Inventory ledger for consumable resources.
//!
//! Filament spools (mass) and hardware stock (count) are resource accounts
//! held in the [`StockLedger`]. The ledger is the only thing allowed to move
//! `remaining` quantities; everything else reads copies.

pub mod account;
pub mod error;
pub mod event;
pub mod ledger;
pub mod shortage;
pub mod tracking;

pub use account::{AccountDefaults, AccountSummary, ConsumptionLine, NewAccount, ResourceAccount};
pub use error::LedgerError;
pub use event::{ChangeCause, InventoryChanged};
pub use ledger::{AccountView, LedgerTransaction, MAX_ALTERNATIVES, Movement, StockAlerts, StockLedger};
pub use shortage::{ShortageEntry, ShortageReport, ShortageValidator};
pub use tracking::suggest_tracking_id;
