//! Prefixed record identifiers (`FAC-001`, `BL-012`, ...).

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a record inside its collection.
///
/// Format is `<PREFIX>-<counter>`, the counter zero-padded to at least three
/// digits. Identifiers loaded from older snapshots are accepted as-is, even if
/// they do not follow the format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build `<prefix>-<counter>` with the counter padded to three digits.
    pub fn format(prefix: &str, counter: u64) -> Self {
        Self(format!("{prefix}-{counter:03}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric suffix after the last `-`, if it parses.
    pub fn counter(&self) -> Option<u64> {
        self.0
            .rsplit_once('-')
            .and_then(|(_, suffix)| suffix.parse().ok())
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('-'))
    }
}

impl core::fmt::Display for EntityId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl FromStr for EntityId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_id("EntityId: empty identifier"));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Allocate the next identifier for a collection.
///
/// The counter is one past the larger of `high_water` (the last counter ever
/// handed out for this collection) and the largest counter among `existing`
/// IDs carrying `prefix`. Returns the identifier and its counter, which the
/// caller persists as the new high-water mark.
pub fn next_id<'a>(
    prefix: &str,
    existing: impl IntoIterator<Item = &'a EntityId>,
    high_water: u64,
) -> (EntityId, u64) {
    let max_existing = existing
        .into_iter()
        .filter(|id| id.has_prefix(prefix))
        .filter_map(EntityId::counter)
        .max()
        .unwrap_or(0);

    let counter = max_existing.max(high_water) + 1;
    (EntityId::format(prefix, counter), counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn formats_with_three_digit_padding() {
        assert_eq!(EntityId::format("FAC", 1).as_str(), "FAC-001");
        assert_eq!(EntityId::format("BL", 42).as_str(), "BL-042");
        assert_eq!(EntityId::format("FAC", 1234).as_str(), "FAC-1234");
    }

    #[test]
    fn counter_parses_numeric_suffix_only() {
        assert_eq!(EntityId::new("FAC-007").counter(), Some(7));
        assert_eq!(EntityId::new("legacy").counter(), None);
        assert_eq!(EntityId::new("BL-abc").counter(), None);
    }

    #[test]
    fn next_id_starts_at_one_for_empty_collection() {
        let (id, counter) = next_id("FAC", std::iter::empty(), 0);
        assert_eq!(id.as_str(), "FAC-001");
        assert_eq!(counter, 1);
    }

    #[test]
    fn next_id_ignores_foreign_prefixes() {
        let existing = vec![EntityId::new("BL-010"), EntityId::new("FAC-002")];
        let (id, _) = next_id("FAC", &existing, 0);
        assert_eq!(id.as_str(), "FAC-003");
    }

    #[test]
    fn next_id_respects_high_water_after_deletes() {
        // FAC-003 was handed out then deleted; only FAC-001 remains.
        let existing = vec![EntityId::new("FAC-001")];
        let (id, counter) = next_id("FAC", &existing, 3);
        assert_eq!(id.as_str(), "FAC-004");
        assert_eq!(counter, 4);
    }

    #[test]
    fn parse_rejects_blank_ids() {
        assert!("   ".parse::<EntityId>().is_err());
        assert_eq!("FAC-001".parse::<EntityId>().unwrap().as_str(), "FAC-001");
    }

    proptest! {
        /// The allocated counter is strictly above every existing counter and
        /// above the high-water mark.
        #[test]
        fn next_counter_exceeds_everything_seen(
            counters in prop::collection::vec(0u64..10_000, 0..20),
            high_water in 0u64..10_000,
        ) {
            let existing: Vec<EntityId> = counters
                .iter()
                .map(|c| EntityId::format("TSK", *c))
                .collect();
            let (id, counter) = next_id("TSK", &existing, high_water);

            prop_assert!(counter > high_water);
            for c in &counters {
                prop_assert!(counter > *c);
            }
            prop_assert_eq!(id.counter(), Some(counter));
        }
    }
}
