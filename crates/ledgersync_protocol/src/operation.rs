//! Operation sets.

use crate::item::{Item, ItemIntent};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of remote mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Record creation.
    Create,
    /// Record replacement.
    Replace,
    /// Record deletion.
    Delete,
}

impl OperationKind {
    /// All kinds, in the order an [`OperationSet`] is visited.
    pub const ALL: [OperationKind; 3] = [
        OperationKind::Create,
        OperationKind::Replace,
        OperationKind::Delete,
    ];

    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Replace => "replace",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ItemIntent> for OperationKind {
    fn from(intent: ItemIntent) -> Self {
        match intent {
            ItemIntent::Create => OperationKind::Create,
            ItemIntent::Replace => OperationKind::Replace,
            ItemIntent::Delete => OperationKind::Delete,
        }
    }
}

/// One unit of intended remote mutation.
///
/// # Invariants
///
/// - Each sequence keeps the order items were pushed in
/// - An item appears in at most one sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationSet {
    /// Items to create.
    #[serde(default)]
    pub create: Vec<Item>,
    /// Items to replace.
    #[serde(default)]
    pub replace: Vec<Item>,
    /// Items to delete.
    #[serde(default)]
    pub delete: Vec<Item>,
}

impl OperationSet {
    /// Creates an empty operation set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sequence for `kind`.
    pub fn get(&self, kind: OperationKind) -> &[Item] {
        match kind {
            OperationKind::Create => &self.create,
            OperationKind::Replace => &self.replace,
            OperationKind::Delete => &self.delete,
        }
    }

    /// Returns the sequence for `kind`, mutably.
    pub fn get_mut(&mut self, kind: OperationKind) -> &mut Vec<Item> {
        match kind {
            OperationKind::Create => &mut self.create,
            OperationKind::Replace => &mut self.replace,
            OperationKind::Delete => &mut self.delete,
        }
    }

    /// Appends an item to the sequence for `kind`.
    pub fn push(&mut self, kind: OperationKind, item: Item) {
        self.get_mut(kind).push(item);
    }

    /// Returns the total number of items across all sequences.
    pub fn len(&self) -> usize {
        self.create.len() + self.replace.len() + self.delete.len()
    }

    /// Returns true if every sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.replace.is_empty() && self.delete.is_empty()
    }

    /// Splits the set into its keyed sequences, in visit order.
    pub fn into_groups(self) -> [(OperationKind, Vec<Item>); 3] {
        [
            (OperationKind::Create, self.create),
            (OperationKind::Replace, self.replace),
            (OperationKind::Delete, self.delete),
        ]
    }

    /// Rebuilds a set from keyed sequences.
    ///
    /// Sequences sharing a kind are concatenated in iteration order.
    pub fn from_groups(groups: impl IntoIterator<Item = (OperationKind, Vec<Item>)>) -> Self {
        let mut set = Self::new();
        for (kind, items) in groups {
            set.get_mut(kind).extend(items);
        }
        set
    }

    /// Moves every item of `other` to the end of the matching sequence.
    pub fn append(&mut self, other: OperationSet) {
        for (kind, items) in other.into_groups() {
            self.get_mut(kind).extend(items);
        }
    }

    /// Returns the identity keys of the items under `kind`.
    pub fn ids(&self, kind: OperationKind) -> Vec<&str> {
        self.get(kind).iter().filter_map(Item::id).collect()
    }
}
