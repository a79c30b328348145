//! Per-collection sync store.

use crate::broadcaster::Broadcaster;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::fetcher::Paginator;
use crate::mirror::{CommitStats, Mirror};
use crate::planner::{PlanFailure, Planner};
use crate::remote::DocumentRemote;
use crate::singleton::SingletonSync;
use ledgersync_protocol::{Item, ItemError, OperationKind, OperationSet, Query, Regulator, ID_KEY};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a full refresh.
#[derive(Debug)]
pub struct RefreshReport {
    /// Document type refreshed.
    pub doc_type: String,
    /// Records now held by the mirror.
    pub records: usize,
    /// Why the refresh failed. The mirror is untouched on failure.
    pub error: Option<SyncError>,
}

impl RefreshReport {
    /// Returns true if the mirror was replaced.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a bulk mutation.
#[derive(Debug, Default)]
pub struct BulkReport {
    /// Regulation rounds that were planned.
    pub rounds: usize,
    /// Operations the remote accepted, in submission order.
    pub accepted: OperationSet,
    /// Effect on the local mirror.
    pub committed: CommitStats,
    /// Raw items that could not be planned.
    pub failures: Vec<PlanFailure>,
    /// Raw items of the round whose broadcast failed, including any that
    /// also failed planning.
    ///
    /// None of them reached the mirror, but chunks of the round accepted
    /// before the failing one are already on the remote. A `fetch_one` or
    /// `refresh_all` reconciles them.
    pub rejected: Vec<Item>,
    /// Raw items never planned because an earlier round failed.
    pub unprocessed: Vec<Item>,
    /// The error that halted the mutation.
    pub error: Option<SyncError>,
}

impl BulkReport {
    /// Returns true if every raw item was planned, accepted and committed.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
            && self.failures.is_empty()
            && self.rejected.is_empty()
            && self.unprocessed.is_empty()
    }

    /// Returns true if some, but not all, raw items went through.
    pub fn is_partial(&self) -> bool {
        !self.is_success() && !self.accepted.is_empty()
    }

    /// Collapses a one-item report into the accepted record of `kind`.
    fn into_single(mut self, kind: OperationKind) -> SyncResult<Item> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if let Some(failure) = self.failures.pop() {
            return Err(failure.error);
        }
        self.accepted
            .get_mut(kind)
            .pop()
            .ok_or_else(|| SyncError::Rejected(format!("no {kind} accepted")))
    }
}

/// Local mirror plus the remote operations of one document type.
pub struct CollectionStore<R: ?Sized> {
    doc_type: String,
    remote: Arc<R>,
    singletons: Arc<SingletonSync>,
    config: SyncConfig,
    mirror: Mirror,
}

impl<R: DocumentRemote + ?Sized> CollectionStore<R> {
    /// Creates a store with an empty mirror.
    pub fn new(
        doc_type: impl Into<String>,
        remote: Arc<R>,
        singletons: Arc<SingletonSync>,
        config: SyncConfig,
    ) -> Self {
        Self {
            doc_type: doc_type.into(),
            remote,
            singletons,
            config,
            mirror: Mirror::new(),
        }
    }

    /// Returns the document type.
    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    /// Returns the local mirror.
    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    /// Returns the mirrored record for `id`.
    pub fn get(&self, id: &str) -> Option<Item> {
        self.mirror.get(id)
    }

    /// Returns the number of mirrored records.
    pub fn len(&self) -> usize {
        self.mirror.len()
    }

    /// Returns true if nothing is mirrored.
    pub fn is_empty(&self) -> bool {
        self.mirror.is_empty()
    }

    /// Returns every mirrored record.
    pub fn snapshot(&self) -> Vec<Item> {
        self.mirror.snapshot()
    }

    /// Replaces the mirror with the whole remote collection.
    pub async fn refresh_all(&self) -> RefreshReport {
        let query = Query::new(self.doc_type.as_str());
        let fetched = Paginator::from_config(&self.config)
            .fetch_all(&*self.remote, &query)
            .await;

        match fetched {
            Ok(items) => {
                let stats = self.mirror.replace_all(items);
                if stats.skipped > 0 {
                    warn!(
                        doc_type = %self.doc_type,
                        skipped = stats.skipped,
                        "fetched records without identity key"
                    );
                }
                info!(doc_type = %self.doc_type, records = stats.stored, "collection refreshed");
                RefreshReport {
                    doc_type: self.doc_type.clone(),
                    records: self.mirror.len(),
                    error: None,
                }
            }
            Err(error) => {
                warn!(doc_type = %self.doc_type, error = %error, "refresh failed");
                RefreshReport {
                    doc_type: self.doc_type.clone(),
                    records: self.mirror.len(),
                    error: Some(error),
                }
            }
        }
    }

    /// Re-reads one record into the mirror.
    ///
    /// A record the remote no longer has is evicted and `None` returned.
    pub async fn fetch_one(&self, id: &str) -> SyncResult<Option<Item>> {
        match self.remote.lookup(&self.doc_type, id).await {
            Ok(item) => {
                self.mirror.upsert(item.clone());
                Ok(Some(item))
            }
            Err(SyncError::NotFound { .. }) => {
                if self.mirror.evict(id).is_some() {
                    debug!(doc_type = %self.doc_type, id, "evicted vanished record");
                }
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Plans, broadcasts and commits a list of raw items.
    ///
    /// The raw list is regulated first. Each regulated round is planned,
    /// broadcast and committed to the mirror before the next round starts.
    /// A failing broadcast stops the mutation: its round is not committed
    /// and is reported as rejected, later rounds as unprocessed.
    pub async fn apply_bulk(&self, raw: Vec<Item>) -> BulkReport {
        let mut report = BulkReport::default();
        if raw.is_empty() {
            return report;
        }

        let Some(identity) = self.singletons.ensure_identity().await else {
            warn!(doc_type = %self.doc_type, "no acting identity, mutation skipped");
            report.error = Some(SyncError::MissingIdentity);
            report.unprocessed = raw;
            return report;
        };

        let regulator = Regulator::new(self.config.budget);
        let planner = Planner::new(&*self.remote, &self.doc_type);
        let broadcaster = Broadcaster::new(&*self.remote, regulator, &self.config.failure_policy);
        let mut pending = raw;
        let mut offset = 0;

        loop {
            let (round, rest) = regulator.regulate_items(pending);
            if round.is_empty() {
                let bytes = rest.first().map_or(0, Item::encoded_len);
                let error = SyncError::PayloadTooLarge {
                    bytes,
                    budget: regulator.budget().max_bytes,
                };
                warn!(doc_type = %self.doc_type, error = %error, "raw item exceeds budget");
                report.error = Some(error);
                report.unprocessed = rest;
                break;
            }

            report.rounds += 1;
            let round_len = round.len();
            let round_raw = round.clone();
            let plan = planner.plan(round).await;
            report
                .failures
                .extend(plan.failures.into_iter().map(|mut failure| {
                    failure.index += offset;
                    failure
                }));
            offset += round_len;

            let outcome = broadcaster
                .broadcast(&self.doc_type, plan.operations.clone(), &identity)
                .await;
            if !outcome.success {
                report.error = outcome.error;
                report.rejected = round_raw;
                report.unprocessed = rest;
                break;
            }

            report.committed += self.mirror.commit(&plan.operations);
            report.accepted.append(plan.operations);

            if rest.is_empty() {
                break;
            }
            pending = rest;
        }

        debug!(
            doc_type = %self.doc_type,
            rounds = report.rounds,
            accepted = report.accepted.len(),
            failed = report.failures.len(),
            rejected = report.rejected.len(),
            unprocessed = report.unprocessed.len(),
            "bulk mutation finished"
        );
        report
    }

    /// Creates one record from `fields`. Any identity key is ignored.
    pub async fn create(&self, mut fields: Item) -> SyncResult<Item> {
        fields.remove(ID_KEY);
        if fields.is_empty() {
            return Err(ItemError::Malformed("create needs at least one field".into()).into());
        }
        self.apply_bulk(vec![fields])
            .await
            .into_single(OperationKind::Create)
    }

    /// Merges `fields` over the record they identify.
    pub async fn replace(&self, fields: Item) -> SyncResult<Item> {
        fields.require_id()?;
        if fields.is_tombstone() {
            return Err(ItemError::Malformed("replace needs at least one field".into()).into());
        }
        self.apply_bulk(vec![fields])
            .await
            .into_single(OperationKind::Replace)
    }

    /// Deletes the record `id`, returning its last remote state.
    pub async fn delete(&self, id: &str) -> SyncResult<Item> {
        let tombstone = Item::with_id(id);
        tombstone.require_id()?;
        self.apply_bulk(vec![tombstone])
            .await
            .into_single(OperationKind::Delete)
    }
}
