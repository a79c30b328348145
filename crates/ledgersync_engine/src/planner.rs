//! Classification of raw items into operation sets.

use crate::error::{SyncError, SyncResult};
use crate::remote::DocumentRemote;
use ledgersync_protocol::{Item, ItemIntent, OperationKind, OperationSet};
use tracing::{debug, warn};

/// A raw item that could not be planned.
#[derive(Debug)]
pub struct PlanFailure {
    /// Position of the item in the planned input.
    pub index: usize,
    /// What the item asked for.
    pub intent: ItemIntent,
    /// Identity key of the item, when it had one.
    pub id: Option<String>,
    /// Why planning failed.
    pub error: SyncError,
}

/// Result of planning a list of raw items.
#[derive(Debug, Default)]
pub struct PlanReport {
    /// Operations ready for broadcast.
    pub operations: OperationSet,
    /// Items left out of `operations`.
    pub failures: Vec<PlanFailure>,
}

impl PlanReport {
    /// Returns true if every raw item was planned.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Turns raw items into create, replace and delete operations.
///
/// Rules, per item:
///
/// 1. Only an identity key: look up the record and delete it.
/// 2. A non-empty identity key: look up the record, merge the raw fields
///    over it except reserved ones, and replace it.
/// 3. Anything else: compose a new record and create it.
///
/// A failing lookup or compose drops that item only.
pub struct Planner<'a, R: ?Sized> {
    remote: &'a R,
    doc_type: &'a str,
}

impl<'a, R: DocumentRemote + ?Sized> Planner<'a, R> {
    /// Creates a planner for `doc_type`.
    pub fn new(remote: &'a R, doc_type: &'a str) -> Self {
        Self { remote, doc_type }
    }

    /// Plans `raw`, preserving input order within each kind.
    pub async fn plan(&self, raw: Vec<Item>) -> PlanReport {
        let mut report = PlanReport::default();

        for (index, item) in raw.into_iter().enumerate() {
            let intent = item.intent();
            let id = item.id().map(str::to_string);

            match self.resolve(intent, &item).await {
                Ok(resolved) => report.operations.push(OperationKind::from(intent), resolved),
                Err(error) => {
                    warn!(
                        doc_type = self.doc_type,
                        index,
                        ?intent,
                        id = id.as_deref().unwrap_or("-"),
                        error = %error,
                        "skipping item"
                    );
                    report.failures.push(PlanFailure {
                        index,
                        intent,
                        id,
                        error,
                    });
                }
            }
        }

        debug!(
            doc_type = self.doc_type,
            create = report.operations.create.len(),
            replace = report.operations.replace.len(),
            delete = report.operations.delete.len(),
            failed = report.failures.len(),
            "planned bulk mutation"
        );
        report
    }

    async fn resolve(&self, intent: ItemIntent, item: &Item) -> SyncResult<Item> {
        match intent {
            ItemIntent::Delete => {
                let id = item.require_id()?;
                self.remote.lookup(self.doc_type, id).await
            }
            ItemIntent::Replace => {
                let id = item.require_id()?;
                let mut existing = self.remote.lookup(self.doc_type, id).await?;
                existing.merge_from(item);
                Ok(existing)
            }
            ItemIntent::Create => self.remote.compose(self.doc_type, item).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemote;
    use serde_json::json;

    fn seeded() -> MockRemote {
        let remote = MockRemote::new();
        remote.seed("notes", Item::with_id("A").set("title", "a"));
        remote.seed(
            "notes",
            Item::with_id("B").set("title", "old").set("_rev", 3),
        );
        remote
    }

    #[tokio::test]
    async fn classifies_by_shape() {
        let remote = seeded();
        let raw = vec![
            Item::with_id("A"),
            Item::with_id("B").set("title", "x"),
            Item::new().set("title", "y"),
        ];

        let report = Planner::new(&remote, "notes").plan(raw).await;

        assert!(report.is_complete());
        assert_eq!(report.operations.ids(OperationKind::Delete), vec!["A"]);
        assert_eq!(report.operations.ids(OperationKind::Replace), vec!["B"]);
        assert_eq!(report.operations.create.len(), 1);
        assert_eq!(report.operations.create[0].get("title"), Some(&json!("y")));
    }

    #[tokio::test]
    async fn replace_merges_over_existing_record() {
        let remote = seeded();
        let raw = vec![Item::with_id("B").set("title", "new").set("_rev", 99)];

        let report = Planner::new(&remote, "notes").plan(raw).await;

        let replaced = &report.operations.replace[0];
        assert_eq!(replaced.get("title"), Some(&json!("new")));
        assert_eq!(replaced.get("_rev"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn failures_do_not_abort_the_plan() {
        let remote = seeded();
        remote.fail_lookup("A");
        let raw = vec![
            Item::with_id("A"),
            Item::with_id("missing").set("title", "t"),
            Item::with_id("B").set("title", "x"),
        ];

        let report = Planner::new(&remote, "notes").plan(raw).await;

        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].index, 0);
        assert_eq!(report.failures[0].intent, ItemIntent::Delete);
        assert!(matches!(
            report.failures[1].error,
            SyncError::NotFound { .. }
        ));
        assert_eq!(report.operations.ids(OperationKind::Replace), vec!["B"]);
        assert!(report.operations.delete.is_empty());
    }

    #[tokio::test]
    async fn compose_failure_is_recorded() {
        let remote = seeded();
        remote.fail_composes(1);
        let raw = vec![Item::new().set("title", "1"), Item::new().set("title", "2")];

        let report = Planner::new(&remote, "notes").plan(raw).await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, None);
        assert_eq!(report.operations.create.len(), 1);
        assert_eq!(report.operations.create[0].get("title"), Some(&json!("2")));
    }

    #[tokio::test]
    async fn empty_id_tombstone_fails_without_remote_call() {
        let remote = seeded();
        let report = Planner::new(&remote, "notes").plan(vec![Item::with_id("")]).await;

        assert!(matches!(report.failures[0].error, SyncError::Protocol(_)));
        assert!(remote.calls().is_empty());
    }
}
