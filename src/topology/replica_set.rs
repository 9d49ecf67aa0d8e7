//! Replica Set
//!
//! The known replicas of one shard, excluding its master. This is a
//! working snapshot for a single reparent: the coordinator removes the
//! promoted candidate from it and never inserts.

use std::collections::btree_map;
use std::collections::BTreeMap;

use super::tablet::{Tablet, TabletPath};

/// Replicas of one shard keyed by tablet path.
///
/// Iteration order is by path so that logs and error messages are
/// deterministic regardless of how the set was built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaSet {
    tablets: BTreeMap<TabletPath, Tablet>,
}

impl ReplicaSet {
    /// Create an empty replica set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tablet while building the snapshot.
    ///
    /// A later tablet with the same path replaces the earlier one.
    pub fn with_tablet(mut self, tablet: Tablet) -> Self {
        self.tablets.insert(tablet.path.clone(), tablet);
        self
    }

    pub fn contains(&self, path: &TabletPath) -> bool {
        self.tablets.contains_key(path)
    }

    /// Remove a tablet, returning it if it was present.
    pub fn remove(&mut self, path: &TabletPath) -> Option<Tablet> {
        self.tablets.remove(path)
    }

    pub fn len(&self) -> usize {
        self.tablets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tablets.is_empty()
    }

    pub fn iter(&self) -> btree_map::Values<'_, TabletPath, Tablet> {
        self.tablets.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &TabletPath> {
        self.tablets.keys()
    }

    /// Subset of replicas that can accept a new master pointer.
    pub fn restartable(&self) -> ReplicaSet {
        self.iter()
            .filter(|tablet| tablet.is_restartable())
            .cloned()
            .collect()
    }

    /// Comma-separated paths, for error messages.
    pub fn describe_paths(&self) -> String {
        let paths: Vec<&str> = self.paths().map(TabletPath::as_str).collect();
        format!("[{}]", paths.join(", "))
    }
}

impl FromIterator<Tablet> for ReplicaSet {
    fn from_iter<I: IntoIterator<Item = Tablet>>(iter: I) -> Self {
        Self {
            tablets: iter
                .into_iter()
                .map(|tablet| (tablet.path.clone(), tablet))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ReplicaSet {
    type Item = &'a Tablet;
    type IntoIter = btree_map::Values<'a, TabletPath, Tablet>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
