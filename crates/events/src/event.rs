use chrono::{DateTime, Utc};

/// A domain-agnostic event.
///
/// Events are facts about something that already happened (a committed stock
/// movement). They are never edited after emission.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "inventory.account.changed").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
