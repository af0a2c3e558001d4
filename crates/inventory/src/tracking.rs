//! Human-readable tracking identifiers such as `PLA01`.

use spoolledger_core::{DomainError, DomainResult};

/// Suggest the next identifier for a resource family.
///
/// The prefix is the family key upper-cased. Every existing identifier made
/// of that prefix followed only by digits counts, active or not; the result is
/// the highest number plus one, zero-padded to two digits (`PLA99` is followed
/// by `PLA100`). Gaps left by deleted resources are not reused.
///
/// Advisory only: a caller may still supply its own identifier.
pub fn suggest_tracking_id<'a, I>(family: &str, existing: I) -> DomainResult<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let prefix = family.trim().to_ascii_uppercase();
    if prefix.is_empty() {
        return Err(DomainError::validation("tracking id family cannot be empty"));
    }

    let highest = existing
        .into_iter()
        .filter_map(|id| sequence_number(&prefix, id))
        .max()
        .unwrap_or(0);

    Ok(format!("{prefix}{:02}", highest.saturating_add(1)))
}

fn sequence_number(prefix: &str, id: &str) -> Option<u64> {
    let id = id.trim().to_ascii_uppercase();
    let digits = id.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continues_after_the_highest_number() {
        let next = suggest_tracking_id("PLA", ["PLA01", "PLA02"]).unwrap();
        assert_eq!(next, "PLA03");
    }

    #[test]
    fn starts_at_one_for_a_new_family() {
        assert_eq!(suggest_tracking_id("petg", ["PLA01"]).unwrap(), "PETG01");
        assert_eq!(suggest_tracking_id("ABS", std::iter::empty()).unwrap(), "ABS01");
    }

    #[test]
    fn gaps_are_not_filled() {
        let next = suggest_tracking_id("PLA", ["PLA01", "PLA07"]).unwrap();
        assert_eq!(next, "PLA08");
    }

    #[test]
    fn expands_past_two_digits() {
        assert_eq!(suggest_tracking_id("PLA", ["PLA99"]).unwrap(), "PLA100");
        assert_eq!(suggest_tracking_id("PLA", ["PLA100", "PLA05"]).unwrap(), "PLA101");
    }

    #[test]
    fn ignores_other_families_sharing_the_prefix() {
        // "PLA+" is a different family; "PLAX3" has a non-numeric suffix.
        let existing = ["PLA02", "PLA+09", "PLAX3", "PLA", "pla04"];
        assert_eq!(suggest_tracking_id("PLA", existing).unwrap(), "PLA05");
    }

    #[test]
    fn empty_family_is_rejected() {
        assert!(suggest_tracking_id("  ", ["PLA01"]).is_err());
    }
}
