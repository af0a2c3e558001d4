//! Change events and their transport.
//!
//! The ledger only *emits* events; delivery to webhooks, alert mailers and
//! dashboards is the job of whatever subscribes to the bus.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
