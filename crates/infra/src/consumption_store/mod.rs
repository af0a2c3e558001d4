//! Persistence boundary for consumption records.
//!
//! The orchestrator writes a record inside the same ledger transaction that
//! moves stock, so a failed write rolls the stock back. Implementations only
//! need per-record compare-and-set on `revision`.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryConsumptionStore;
pub use r#trait::{ConsumptionRecord, ConsumptionStore, StoreError};
