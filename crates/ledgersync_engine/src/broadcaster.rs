//! Budgeted broadcasting of operation sets.

use crate::config::FailurePolicy;
use crate::error::{SyncError, SyncResult};
use crate::remote::{DocumentRemote, Resource};
use ledgersync_protocol::{OperationKind, OperationSet, Regulator};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result of one broadcast.
#[derive(Debug)]
pub struct BroadcastReport {
    /// Whether every chunk was accepted.
    pub success: bool,
    /// Number of chunks the remote accepted.
    pub chunks_accepted: usize,
    /// Number of items the remote accepted.
    pub items_accepted: usize,
    /// Number of remote broadcast calls, retries included.
    pub remote_calls: usize,
    /// The error that halted the broadcast.
    pub error: Option<SyncError>,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl BroadcastReport {
    fn new() -> Self {
        Self {
            success: false,
            chunks_accepted: 0,
            items_accepted: 0,
            remote_calls: 0,
            error: None,
            duration: Duration::ZERO,
        }
    }
}

/// Submits operation sets through a remote in budget-respecting chunks.
///
/// # Invariants
///
/// - Chunks are submitted strictly in the order the regulator cuts them
/// - The first chunk that fails halts every later chunk
/// - An empty chunk is never submitted
pub struct Broadcaster<'a, R: ?Sized> {
    remote: &'a R,
    regulator: Regulator,
    policy: &'a FailurePolicy,
}

impl<'a, R: DocumentRemote + ?Sized> Broadcaster<'a, R> {
    /// Creates a broadcaster.
    pub fn new(remote: &'a R, regulator: Regulator, policy: &'a FailurePolicy) -> Self {
        Self {
            remote,
            regulator,
            policy,
        }
    }

    /// Broadcasts `operations` for `doc_type`, signed by `identity`.
    ///
    /// The remainder of each regulation round is drained iteratively until
    /// nothing is left or a chunk fails.
    pub async fn broadcast(
        &self,
        doc_type: &str,
        operations: OperationSet,
        identity: &Resource,
    ) -> BroadcastReport {
        let start = Instant::now();
        let mut report = BroadcastReport::new();
        let mut pending = operations;

        loop {
            let batch = self.regulator.regulate(pending);

            if batch.is_stalled() {
                let error = self.oversized(&batch.remainder);
                warn!(doc_type, error = %error, "broadcast cannot make progress");
                report.error = Some(error);
                break;
            }

            if !batch.included.is_empty() {
                let chunk = report.chunks_accepted + 1;
                match self
                    .submit(doc_type, &batch.included, identity, &mut report)
                    .await
                {
                    Ok(()) => {
                        debug!(doc_type, chunk, items = batch.included.len(), "chunk accepted");
                        report.chunks_accepted += 1;
                        report.items_accepted += batch.included.len();
                    }
                    Err(error) => {
                        warn!(
                            doc_type,
                            chunk,
                            left = batch.remainder.len(),
                            error = %error,
                            "chunk rejected, halting broadcast"
                        );
                        report.error = Some(error);
                        break;
                    }
                }
            }

            if batch.remainder.is_empty() {
                report.success = true;
                break;
            }
            pending = batch.remainder;
        }

        report.duration = start.elapsed();
        report
    }

    /// Submits one chunk, retrying as the failure policy allows.
    async fn submit(
        &self,
        doc_type: &str,
        chunk: &OperationSet,
        identity: &Resource,
        report: &mut BroadcastReport,
    ) -> SyncResult<()> {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                tokio::time::sleep(self.policy.delay_for_attempt(attempt)).await;
            }
            report.remote_calls += 1;

            match self.remote.broadcast(doc_type, chunk, identity).await {
                Ok(()) => return Ok(()),
                Err(error) if error.is_retryable() && attempt + 1 < max_attempts => {
                    debug!(doc_type, attempt, error = %error, "retrying chunk");
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn oversized(&self, remainder: &OperationSet) -> SyncError {
        let bytes = OperationKind::ALL
            .into_iter()
            .find_map(|kind| remainder.get(kind).first())
            .map_or(0, |item| item.encoded_len());
        SyncError::PayloadTooLarge {
            bytes,
            budget: self.regulator.budget().max_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::remote::{MockRemote, SingletonKind};
    use ledgersync_protocol::{Budget, Item};

    fn identity() -> Resource {
        Resource::new(SingletonKind::Identity, "did:test")
    }

    fn creates(count: usize) -> OperationSet {
        let mut set = OperationSet::new();
        for n in 0..count {
            set.push(OperationKind::Create, Item::with_id(format!("c{n}")).set("n", n));
        }
        set
    }

    fn by_count(items: usize) -> Regulator {
        Regulator::new(Budget::new(usize::MAX, items))
    }

    #[tokio::test]
    async fn drains_remainder_in_order() {
        let remote = MockRemote::new();
        let policy = FailurePolicy::Halt;

        let report = Broadcaster::new(&remote, by_count(2), &policy)
            .broadcast("notes", creates(5), &identity())
            .await;

        assert!(report.success);
        assert_eq!(report.chunks_accepted, 3);
        assert_eq!(report.items_accepted, 5);

        let chunks: Vec<Vec<String>> = remote
            .broadcasts()
            .iter()
            .map(|ops| {
                ops.ids(OperationKind::Create)
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .collect();
        assert_eq!(chunks, vec![vec!["c0", "c1"], vec!["c2", "c3"], vec!["c4"]]);
    }

    #[tokio::test]
    async fn failing_chunk_halts_later_chunks() {
        let remote = MockRemote::new();
        remote.fail_broadcast(2, false);
        let policy = FailurePolicy::Halt;

        let report = Broadcaster::new(&remote, by_count(2), &policy)
            .broadcast("notes", creates(6), &identity())
            .await;

        assert!(!report.success);
        assert_eq!(report.remote_calls, 2);
        assert_eq!(report.chunks_accepted, 1);
        assert_eq!(remote.broadcasts().len(), 2);
        assert!(matches!(report.error, Some(SyncError::Remote { .. })));
    }

    #[tokio::test]
    async fn empty_set_makes_no_calls() {
        let remote = MockRemote::new();
        let policy = FailurePolicy::Halt;

        let report = Broadcaster::new(&remote, Regulator::default(), &policy)
            .broadcast("notes", OperationSet::new(), &identity())
            .await;

        assert!(report.success);
        assert_eq!(report.remote_calls, 0);
    }

    #[tokio::test]
    async fn oversized_item_is_reported() {
        let remote = MockRemote::new();
        let policy = FailurePolicy::Halt;
        let mut set = OperationSet::new();
        set.push(OperationKind::Create, Item::new().set("blob", "x".repeat(100)));

        let report = Broadcaster::new(&remote, Regulator::new(Budget::new(50, 10)), &policy)
            .broadcast("notes", set, &identity())
            .await;

        assert!(!report.success);
        assert_eq!(report.remote_calls, 0);
        assert!(matches!(
            report.error,
            Some(SyncError::PayloadTooLarge { budget: 50, .. })
        ));
    }

    #[tokio::test]
    async fn retry_policy_resubmits_retryable_failures() {
        let remote = MockRemote::new();
        remote.fail_broadcast(2, true);
        let policy = FailurePolicy::Retry(
            RetryConfig::new(3)
                .with_initial_delay(Duration::from_millis(1))
                .without_jitter(),
        );

        let report = Broadcaster::new(&remote, by_count(2), &policy)
            .broadcast("notes", creates(4), &identity())
            .await;

        assert!(report.success);
        assert_eq!(report.chunks_accepted, 2);
        assert_eq!(report.remote_calls, 3);
    }

    #[tokio::test]
    async fn retry_policy_gives_up_on_fatal_errors() {
        let remote = MockRemote::new();
        remote.fail_broadcast(1, false);
        let policy = FailurePolicy::Retry(RetryConfig::new(3).without_jitter());

        let report = Broadcaster::new(&remote, by_count(2), &policy)
            .broadcast("notes", creates(4), &identity())
            .await;

        assert!(!report.success);
        assert_eq!(report.remote_calls, 1);
    }
}
