//! Payload regulation.
//!
//! Splits a keyed payload into an `included` part that fits one remote
//! call and an order-preserving `remainder`.

use crate::item::Item;
use crate::operation::OperationSet;

/// Default size budget per remote call, in kilobytes.
pub const DEFAULT_SIZE_BUDGET_KB: usize = 4;

/// Default item budget per remote call.
pub const DEFAULT_COUNT_BUDGET: usize = 10;

/// Default page size for paginated reads.
///
/// This is a fan-out limit for queries, unrelated to the batch budgets.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Per-call limits.
///
/// A running [`Tally`] is admitted while its byte total is strictly below
/// `max_bytes` and its item count is at most `max_items`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    /// Exclusive upper bound on the encoded size, in bytes.
    pub max_bytes: usize,
    /// Inclusive upper bound on the item count.
    pub max_items: usize,
}

impl Budget {
    /// Creates a budget. The item bound is at least one.
    pub fn new(max_bytes: usize, max_items: usize) -> Self {
        Self {
            max_bytes,
            max_items: max_items.max(1),
        }
    }

    /// Creates a budget with the size bound given in kilobytes.
    pub fn from_kilobytes(kilobytes: usize, max_items: usize) -> Self {
        Self::new(kilobytes.saturating_mul(1024), max_items)
    }

    /// Returns true if `tally` is within this budget.
    pub fn admits(&self, tally: Tally) -> bool {
        tally.bytes < self.max_bytes && tally.items <= self.max_items
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::from_kilobytes(DEFAULT_SIZE_BUDGET_KB, DEFAULT_COUNT_BUDGET)
    }
}

/// Running totals threaded through one regulation pass.
///
/// Both counters only grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    /// Cumulative encoded size, in bytes.
    pub bytes: usize,
    /// Cumulative item count.
    pub items: usize,
}

impl Tally {
    /// Returns the tally after charging one more item.
    #[must_use]
    pub fn charge(self, item: &Item) -> Self {
        Self {
            bytes: self.bytes.saturating_add(item.encoded_len()),
            items: self.items + 1,
        }
    }
}

/// Result of regulating an [`OperationSet`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayloadBatch {
    /// The part that fits one remote call.
    pub included: OperationSet,
    /// Everything else, in visit order.
    pub remainder: OperationSet,
}

impl PayloadBatch {
    /// Returns true if nothing was left over.
    pub fn is_complete(&self) -> bool {
        self.remainder.is_empty()
    }

    /// Returns true if regulation cannot make progress.
    ///
    /// This happens when the very first item visited is over budget on its
    /// own: nothing is included and the remainder equals the input.
    pub fn is_stalled(&self) -> bool {
        self.included.is_empty() && !self.remainder.is_empty()
    }
}

/// Result of a keyed split.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedSplit<K> {
    /// Included items per key, one entry per input key, in input order.
    pub included: Vec<(K, Vec<Item>)>,
    /// Overflowing items per key, one entry per input key, in input order.
    pub remainder: Vec<(K, Vec<Item>)>,
    /// Final tally over every visited item.
    pub tally: Tally,
}

/// Cuts payloads into budget-respecting batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Regulator {
    budget: Budget,
}

impl Regulator {
    /// Creates a regulator with the given budget.
    pub fn new(budget: Budget) -> Self {
        Self { budget }
    }

    /// Returns the budget.
    pub fn budget(&self) -> Budget {
        self.budget
    }

    /// Splits a keyed payload in a single pass.
    ///
    /// Keys are visited in iteration order and items in sequence order.
    /// One tally is shared by all keys and never reset, so the split is a
    /// global prefix/suffix cut: once an item is refused, every item
    /// visited after it is refused too, under any key.
    pub fn split<K: Clone>(
        &self,
        groups: impl IntoIterator<Item = (K, Vec<Item>)>,
    ) -> KeyedSplit<K> {
        let mut tally = Tally::default();
        let mut overflowed = false;
        let mut included = Vec::new();
        let mut remainder = Vec::new();

        for (key, items) in groups {
            let mut fits = Vec::new();
            let mut spills = Vec::new();

            for item in items {
                tally = tally.charge(&item);
                if !overflowed && self.budget.admits(tally) {
                    fits.push(item);
                } else {
                    overflowed = true;
                    spills.push(item);
                }
            }

            included.push((key.clone(), fits));
            remainder.push((key, spills));
        }

        KeyedSplit {
            included,
            remainder,
            tally,
        }
    }

    /// Regulates an operation set, visiting create, replace, then delete.
    pub fn regulate(&self, operations: OperationSet) -> PayloadBatch {
        let split = self.split(operations.into_groups());
        PayloadBatch {
            included: OperationSet::from_groups(split.included),
            remainder: OperationSet::from_groups(split.remainder),
        }
    }

    /// Regulates a flat list of raw items.
    ///
    /// Returns `(included, remainder)`.
    pub fn regulate_items(&self, items: Vec<Item>) -> (Vec<Item>, Vec<Item>) {
        let mut split = self.split([((), items)]);
        let included = split.included.pop().map(|(_, items)| items);
        let remainder = split.remainder.pop().map(|(_, items)| items);
        (included.unwrap_or_default(), remainder.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationKind;

    fn small(n: usize) -> Item {
        Item::new().set("n", n)
    }

    /// An item whose compact encoding is exactly `bytes` long.
    fn sized(bytes: usize) -> Item {
        // {"p":""} is 8 bytes of framing.
        Item::new().set("p", "x".repeat(bytes - 8))
    }

    #[test]
    fn default_budget() {
        let budget = Budget::default();
        assert_eq!(budget.max_bytes, 4096);
        assert_eq!(budget.max_items, 10);
        assert_eq!(sized(100).encoded_len(), 100);
    }

    #[test]
    fn count_budget_is_inclusive() {
        let regulator = Regulator::new(Budget::new(usize::MAX, 3));
        let (included, remainder) = regulator.regulate_items((0..5).map(small).collect());
        assert_eq!(included, vec![small(0), small(1), small(2)]);
        assert_eq!(remainder, vec![small(3), small(4)]);
    }

    #[test]
    fn zero_count_budget_still_admits_one_item() {
        let budget = Budget::new(4096, 0);
        assert_eq!(budget.max_items, 1);

        let (included, remainder) = Regulator::new(budget).regulate_items(vec![small(0), small(1)]);
        assert_eq!(included, vec![small(0)]);
        assert_eq!(remainder, vec![small(1)]);
    }

    #[test]
    fn size_budget_is_exclusive() {
        let regulator = Regulator::new(Budget::new(300, 100));
        // 100 + 100 = 200 < 300 fits, +100 = 300 does not.
        let (included, remainder) =
            regulator.regulate_items(vec![sized(100), sized(100), sized(100)]);
        assert_eq!(included.len(), 2);
        assert_eq!(remainder.len(), 1);
    }

    #[test]
    fn split_is_global_across_keys() {
        let regulator = Regulator::new(Budget::new(usize::MAX, 3));
        let mut set = OperationSet::new();
        set.create = vec![small(0), small(1)];
        set.replace = vec![Item::with_id("r1").set("v", 1), Item::with_id("r2").set("v", 2)];
        set.delete = vec![Item::with_id("d1")];

        let batch = regulator.regulate(set);

        assert_eq!(batch.included.create.len(), 2);
        assert_eq!(batch.included.ids(OperationKind::Replace), vec!["r1"]);
        assert!(batch.included.delete.is_empty());
        assert_eq!(batch.remainder.ids(OperationKind::Replace), vec!["r2"]);
        assert_eq!(batch.remainder.ids(OperationKind::Delete), vec!["d1"]);
        assert!(batch.remainder.create.is_empty());
    }

    #[test]
    fn small_item_after_overflow_stays_in_remainder() {
        let regulator = Regulator::new(Budget::new(250, 100));
        let mut set = OperationSet::new();
        set.create = vec![sized(100), sized(200)];
        // Would fit on its own, but the cut already happened.
        set.delete = vec![Item::with_id("d")];

        let batch = regulator.regulate(set);
        assert_eq!(batch.included.create.len(), 1);
        assert_eq!(batch.remainder.create.len(), 1);
        assert_eq!(batch.remainder.delete.len(), 1);
    }

    #[test]
    fn oversized_first_item_stalls() {
        let regulator = Regulator::new(Budget::new(50, 10));
        let mut set = OperationSet::new();
        set.create = vec![sized(60), small(1)];

        let batch = regulator.regulate(set);
        assert!(batch.is_stalled());
        assert!(!batch.is_complete());
        assert_eq!(batch.remainder.create.len(), 2);
    }

    #[test]
    fn empty_payload_is_complete() {
        let batch = Regulator::default().regulate(OperationSet::new());
        assert!(batch.is_complete());
        assert!(!batch.is_stalled());
    }

    #[test]
    fn tally_tracks_every_visited_item() {
        let regulator = Regulator::new(Budget::new(usize::MAX, 1));
        let split = regulator.split([("a", vec![small(1), small(2)]), ("b", vec![small(3)])]);
        assert_eq!(split.tally.items, 3);
        assert_eq!(split.included[0].1.len(), 1);
        assert_eq!(split.remainder[1].1.len(), 1);
    }
}
