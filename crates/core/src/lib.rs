//! Shared building blocks for the ledger crates.
//!
//! Pure domain primitives only: identifiers, quantities and the domain error
//! model. No IO, no locking, no storage.

pub mod entity;
pub mod error;
pub mod id;
pub mod quantity;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AccountId, ConsumptionId, SnapshotId};
pub use quantity::{Quantity, Unit};
pub use value_object::ValueObject;
