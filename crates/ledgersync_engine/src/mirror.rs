//! Local mirror of one remote collection.

use ledgersync_protocol::{Item, OperationSet};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::AddAssign;

/// Counts from one commit into the mirror.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitStats {
    /// Records inserted or overwritten.
    pub stored: usize,
    /// Records removed.
    pub evicted: usize,
    /// Records ignored because they had no identity key.
    pub skipped: usize,
}

impl AddAssign for CommitStats {
    fn add_assign(&mut self, other: Self) {
        self.stored += other.stored;
        self.evicted += other.evicted;
        self.skipped += other.skipped;
    }
}

/// Identity key to last-known snapshot.
///
/// Readers never block on remote calls: the lock is only taken for the
/// duration of an in-memory read or a commit.
#[derive(Debug, Default)]
pub struct Mirror {
    records: RwLock<BTreeMap<String, Item>>,
}

impl Mirror {
    /// Creates an empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the snapshot for `id`.
    pub fn get(&self, id: &str) -> Option<Item> {
        self.records.read().get(id).cloned()
    }

    /// Returns true if a snapshot exists for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.records.read().contains_key(id)
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the mirror is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns every snapshot, ordered by identity key.
    pub fn snapshot(&self) -> Vec<Item> {
        self.records.read().values().cloned().collect()
    }

    /// Returns every identity key, in order.
    pub fn ids(&self) -> Vec<String> {
        self.records.read().keys().cloned().collect()
    }

    /// Replaces the whole mirror.
    pub fn replace_all(&self, items: Vec<Item>) -> CommitStats {
        let mut stats = CommitStats::default();
        let mut fresh = BTreeMap::new();
        for item in items {
            match item.id().map(str::to_string) {
                Some(id) => {
                    fresh.insert(id, item);
                    stats.stored += 1;
                }
                None => stats.skipped += 1,
            }
        }
        *self.records.write() = fresh;
        stats
    }

    /// Stores one snapshot. Returns false if it has no identity key.
    pub fn upsert(&self, item: Item) -> bool {
        match item.id().map(str::to_string) {
            Some(id) => {
                self.records.write().insert(id, item);
                true
            }
            None => false,
        }
    }

    /// Removes the snapshot for `id`.
    pub fn evict(&self, id: &str) -> Option<Item> {
        self.records.write().remove(id)
    }

    /// Applies an accepted operation set.
    ///
    /// Created and replaced records are stored, deleted records evicted.
    pub fn commit(&self, operations: &OperationSet) -> CommitStats {
        let mut stats = CommitStats::default();
        let mut records = self.records.write();

        for item in operations.create.iter().chain(&operations.replace) {
            match item.id() {
                Some(id) => {
                    records.insert(id.to_string(), item.clone());
                    stats.stored += 1;
                }
                None => stats.skipped += 1,
            }
        }
        for item in &operations.delete {
            match item.id() {
                Some(id) => {
                    records.remove(id);
                    stats.evicted += 1;
                }
                None => stats.skipped += 1,
            }
        }
        stats
    }

    /// Removes every snapshot.
    pub fn clear(&self) {
        self.records.write().clear();
    }
}
