//! Costing: rate card, shared cost arithmetic, frozen cost snapshots and
//! what-if estimates.
//!
//! Pure domain logic only: no IO, no locking. Snapshots and estimates go
//! through the same [`price_lines`] routine, so a quote and the actual job
//! agree to the bit when their inputs match.

pub mod breakdown;
pub mod estimator;
pub mod rates;
pub mod snapshot;

pub use breakdown::{CostBreakdown, CostLine, line_cost, price_lines};
pub use estimator::{estimate, estimate_lines};
pub use rates::RateCard;
pub use snapshot::{CostSnapshot, SnapshotInput, SnapshotLine};
