//! Batched property differences for one convergence pass.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Rendered before/after values of one out-of-sync property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyChange {
    /// Observed value as shown to operators
    pub observed: String,
    /// Desired value as shown to operators
    pub desired: String,
}

/// The complete set of out-of-sync properties of a resource.
///
/// A strategy receives the whole set in a single `flush` call, so one pass
/// never produces more than one rewrite or remote round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet<P: Ord> {
    changes: BTreeMap<P, PropertyChange>,
}

impl<P: Ord> Default for ChangeSet<P> {
    fn default() -> Self {
        Self {
            changes: BTreeMap::new(),
        }
    }
}

impl<P: Ord> ChangeSet<P> {
    /// Create an empty change set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a property as out of sync.
    pub fn record(&mut self, property: P, observed: impl fmt::Display, desired: impl fmt::Display) {
        self.changes.insert(
            property,
            PropertyChange {
                observed: observed.to_string(),
                desired: desired.to_string(),
            },
        );
    }

    /// Whether the property is out of sync
    pub fn contains(&self, property: &P) -> bool {
        self.changes.contains_key(property)
    }

    /// Get the recorded change for a property
    pub fn get(&self, property: &P) -> Option<&PropertyChange> {
        self.changes.get(property)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&P, &PropertyChange)> {
        self.changes.iter()
    }
}

impl<P: Ord + Copy> ChangeSet<P> {
    /// Out-of-sync properties in a stable order.
    pub fn properties(&self) -> Vec<P> {
        self.changes.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    enum Prop {
        Url,
        Token,
    }

    #[test]
    fn test_record_is_batched_and_ordered() {
        let mut changes = ChangeSet::new();
        changes.record(Prop::Token, "old", "new");
        changes.record(Prop::Url, "http://a", "http://b");

        assert_eq!(changes.len(), 2);
        assert_eq!(changes.properties(), vec![Prop::Url, Prop::Token]);
        assert!(changes.contains(&Prop::Url));
        assert_eq!(changes.get(&Prop::Token).unwrap().desired, "new");
    }

    #[test]
    fn test_rerecord_replaces() {
        let mut changes = ChangeSet::new();
        changes.record(Prop::Url, "a", "b");
        changes.record(Prop::Url, "a", "c");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.get(&Prop::Url).unwrap().desired, "c");
    }
}
