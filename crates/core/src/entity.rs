//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Resource accounts and consumption records are entities: two copies with
/// the same id describe the same thing at different points in time.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + Ord + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
