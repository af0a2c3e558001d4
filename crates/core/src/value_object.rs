//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity and are never mutated in place; a changed
/// value is a new value. Quantities, rate cards and cost breakdowns are value
/// objects, which is what lets a cost snapshot hold them without any link back
/// to the live catalog.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
