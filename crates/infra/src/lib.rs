//! Infrastructure layer: configuration, consumption storage and the
//! consumption orchestrator that ties the ledger, costing and event bus
//! together.

pub mod config;
pub mod consumption_store;
pub mod orchestrator;


pub use config::{ConfigError, Settings};
pub use consumption_store::{ConsumptionRecord, ConsumptionStore, InMemoryConsumptionStore, StoreError};
pub use orchestrator::{
    CancelToken, Committed, ConsumeError, ConsumptionOrchestrator, ConsumptionRequest, ConsumptionStage,
    UsageEntry, UsageHistory,
};
