//! Property tests for planning, plus budget edge cases of the broadcaster.

use ledgersync_engine::{
    Broadcaster, FailurePolicy, MockRemote, Planner, Resource, SingletonKind, SyncError,
};
use ledgersync_protocol::{Budget, Item, ItemIntent, OperationKind, OperationSet, Regulator};
use ledgersync_testkit::{operation_set_of, padded, raw_item_strategy, PropTestConfig};
use proptest::prelude::*;
use std::collections::HashSet;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
        .block_on(future)
}

/// Seeds the ids of the even-indexed items that carry one, so roughly half
/// of the lookups miss.
fn seed_even(remote: &MockRemote, raw: &[Item]) -> HashSet<String> {
    let mut seeded = HashSet::new();
    for (index, item) in raw.iter().enumerate() {
        if let (0, Some(id)) = (index % 2, item.id()) {
            remote.seed("notes", Item::with_id(id).set("_rev", index));
            seeded.insert(id.to_string());
        }
    }
    seeded
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    /// Every raw item ends up planned or failed, never both, never neither.
    #[test]
    fn every_item_is_planned_or_failed(raw in prop::collection::vec(raw_item_strategy(), 0..20)) {
        let remote = MockRemote::new();
        let seeded = seed_even(&remote, &raw);

        let report = block_on(Planner::new(&remote, "notes").plan(raw.clone()));

        prop_assert_eq!(report.operations.len() + report.failures.len(), raw.len());

        let expected: Vec<usize> = raw
            .iter()
            .enumerate()
            .filter(|(_, item)| item.intent() != ItemIntent::Create)
            .filter(|(_, item)| !item.id().is_some_and(|id| seeded.contains(id)))
            .map(|(index, _)| index)
            .collect();
        let failed: Vec<usize> = report.failures.iter().map(|failure| failure.index).collect();
        prop_assert_eq!(failed, expected);
    }

    /// Each kind keeps the input order of the items routed to it.
    #[test]
    fn order_is_kept_per_kind(raw in prop::collection::vec(raw_item_strategy(), 0..20)) {
        let remote = MockRemote::new();
        let seeded = seed_even(&remote, &raw);

        let report = block_on(Planner::new(&remote, "notes").plan(raw.clone()));

        for (kind, intent) in [
            (OperationKind::Replace, ItemIntent::Replace),
            (OperationKind::Delete, ItemIntent::Delete),
        ] {
            let expected: Vec<&str> = raw
                .iter()
                .filter(|item| item.intent() == intent)
                .filter_map(Item::id)
                .filter(|id| seeded.contains(*id))
                .collect();
            prop_assert_eq!(report.operations.ids(kind), expected);
        }

        let composed: Vec<Item> = report
            .operations
            .create
            .iter()
            .cloned()
            .map(|mut record| {
                record.remove("id");
                record.remove("_seq");
                record
            })
            .collect();
        let expected: Vec<Item> = raw
            .into_iter()
            .filter(|item| item.intent() == ItemIntent::Create)
            .collect();
        prop_assert_eq!(composed, expected);
    }
}

fn identity() -> Resource {
    Resource::new(SingletonKind::Identity, "signer")
}

#[tokio::test]
async fn count_budget_drains_in_full_chunks() {
    let remote = MockRemote::new();
    let policy = FailurePolicy::Halt;
    let regulator = Regulator::new(Budget::new(4096, 4));
    let broadcaster = Broadcaster::new(&remote, regulator, &policy);

    let report = broadcaster
        .broadcast("notes", operation_set_of(OperationKind::Replace, 10), &identity())
        .await;

    assert!(report.success);
    assert_eq!(report.chunks_accepted, 3);
    assert_eq!(report.items_accepted, 10);
    let sizes: Vec<usize> = remote.broadcasts().iter().map(|chunk| chunk.len()).collect();
    assert_eq!(sizes, vec![4, 4, 2]);
}

#[tokio::test]
async fn item_at_the_size_budget_is_oversized() {
    let remote = MockRemote::new();
    let policy = FailurePolicy::Halt;
    let regulator = Regulator::new(Budget::new(100, 10));
    let broadcaster = Broadcaster::new(&remote, regulator, &policy);

    let mut operations = OperationSet::new();
    operations.push(OperationKind::Create, Item::with_id("a").set("title", "t"));
    operations.push(OperationKind::Create, padded(100));
    let report = broadcaster.broadcast("notes", operations, &identity()).await;

    assert!(!report.success);
    assert_eq!(report.items_accepted, 1);
    assert!(matches!(
        report.error,
        Some(SyncError::PayloadTooLarge { bytes: 100, budget: 100 })
    ));
}
