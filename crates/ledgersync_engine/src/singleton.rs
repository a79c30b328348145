//! Lazy, one-shot initialization of singleton resources.
//!
//! Each resource moves through
//!
//! ```text
//! Uninitialized --arm--> Initializing --ensure_initialized--> Syncing --ok--> Synced(t)
//!       ^                                                        |
//!       +----------------------- fetch failed -------------------+
//! ```
//!
//! `reset` returns any state to `Uninitialized`. Nothing is fetched until a
//! consumer calls [`LazyResource::ensure_initialized`], and the armed
//! trigger runs at most once however many consumers call it concurrently.

use crate::remote::{Credential, Resource, SingletonKind, SingletonSource};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Sync state of one singleton resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "at", rename_all = "snake_case")]
pub enum SyncState {
    /// Nothing armed, nothing resolved.
    Uninitialized,
    /// A one-shot trigger is armed and waiting for the first reader.
    Initializing,
    /// The trigger fired and the remote fetch is in flight.
    Syncing,
    /// The resource is resolved. Holds the last sync time.
    Synced(DateTime<Utc>),
}

impl SyncState {
    /// Returns true if the resource is resolved.
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncState::Synced(_))
    }

    /// Returns true if a fetch is in flight.
    pub fn is_syncing(&self) -> bool {
        matches!(self, SyncState::Syncing)
    }

    /// Returns the last sync time.
    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        match self {
            SyncState::Synced(at) => Some(*at),
            _ => None,
        }
    }
}

/// The armed one-shot trigger. Taking it out of the slot is the firing.
#[derive(Debug)]
struct Trigger {
    credential: Credential,
}

#[derive(Debug, Default)]
struct Slot {
    trigger: Option<Trigger>,
    value: Option<Arc<Resource>>,
    /// Bumped on every reset so that a fetch started before the reset
    /// cannot publish into the new epoch.
    generation: u64,
}

enum Step {
    Ready(Arc<Resource>),
    Fire(Trigger, u64),
    Wait,
    Idle,
}

/// One lazily initialized singleton resource.
pub struct LazyResource {
    kind: SingletonKind,
    source: Arc<dyn SingletonSource>,
    slot: Mutex<Slot>,
    state: watch::Sender<SyncState>,
}

impl LazyResource {
    /// Creates an uninitialized resource.
    pub fn new(kind: SingletonKind, source: Arc<dyn SingletonSource>) -> Self {
        let (state, _) = watch::channel(SyncState::Uninitialized);
        Self {
            kind,
            source,
            slot: Mutex::new(Slot::default()),
            state,
        }
    }

    /// Returns which singleton this is.
    pub fn kind(&self) -> SingletonKind {
        self.kind
    }

    /// Returns the current state.
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Returns true if the resource is resolved.
    pub fn is_synced(&self) -> bool {
        self.state().is_synced()
    }

    /// Returns true if a fetch is in flight.
    pub fn is_syncing(&self) -> bool {
        self.state().is_syncing()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Returns the resolved resource without triggering anything.
    pub fn current(&self) -> Option<Arc<Resource>> {
        self.slot.lock().value.clone()
    }

    /// Forces the resource back to `Uninitialized`.
    ///
    /// Drops the resolved value and any armed trigger. A fetch already in
    /// flight completes but its result is discarded.
    pub fn reset(&self) {
        let mut slot = self.slot.lock();
        slot.trigger = None;
        slot.value = None;
        slot.generation += 1;
        self.state.send_replace(SyncState::Uninitialized);
        debug!(kind = %self.kind, "singleton reset");
    }

    /// Arms the one-shot trigger if `credential` is present.
    ///
    /// Returns true if a trigger was installed. Arming while a trigger is
    /// already armed, in flight, or resolved does nothing.
    pub fn arm(&self, credential: Option<&Credential>) -> bool {
        let Some(credential) = credential else {
            debug!(kind = %self.kind, "no credential, not arming");
            return false;
        };

        let mut slot = self.slot.lock();
        if slot.trigger.is_some() || slot.value.is_some() || self.state().is_syncing() {
            return false;
        }
        slot.trigger = Some(Trigger {
            credential: credential.clone(),
        });
        self.state.send_replace(SyncState::Initializing);
        debug!(kind = %self.kind, "singleton armed");
        true
    }

    /// Resolves the resource on first use.
    ///
    /// - Resolved: returns the cached value.
    /// - Armed: fires the trigger, fetches, and caches the result.
    /// - In flight: waits for the running fetch instead of firing again.
    /// - Not armed: returns `None` at once.
    ///
    /// A failed fetch is logged, leaves the resource unset and returns
    /// `None`; the trigger is spent and must be re-armed.
    pub async fn ensure_initialized(&self) -> Option<Arc<Resource>> {
        let step = {
            let mut slot = self.slot.lock();
            if let Some(value) = &slot.value {
                Step::Ready(Arc::clone(value))
            } else if let Some(trigger) = slot.trigger.take() {
                self.state.send_replace(SyncState::Syncing);
                Step::Fire(trigger, slot.generation)
            } else if self.state().is_syncing() {
                Step::Wait
            } else {
                Step::Idle
            }
        };

        match step {
            Step::Ready(value) => Some(value),
            Step::Fire(trigger, generation) => self.fire(trigger, generation).await,
            Step::Wait => self.wait_for_fetch().await,
            Step::Idle => None,
        }
    }

    /// Re-stamps `Synced` with the current time, if resolved.
    pub fn touch(&self) -> bool {
        let _slot = self.slot.lock();
        if self.state().is_synced() {
            self.state.send_replace(SyncState::Synced(Utc::now()));
            true
        } else {
            false
        }
    }

    async fn fire(&self, trigger: Trigger, generation: u64) -> Option<Arc<Resource>> {
        debug!(kind = %self.kind, "singleton trigger fired");
        let mut guard = InFlight {
            resource: self,
            generation,
            settled: false,
        };

        let result = self
            .source
            .fetch_singleton(self.kind, &trigger.credential)
            .await;

        let mut slot = self.slot.lock();
        guard.settled = true;
        if slot.generation != generation {
            debug!(kind = %self.kind, "singleton reset during fetch, discarding result");
            return None;
        }

        match result {
            Ok(resource) => {
                let value = Arc::new(resource);
                slot.value = Some(Arc::clone(&value));
                self.state.send_replace(SyncState::Synced(Utc::now()));
                info!(kind = %self.kind, handle = %value.handle, "singleton synced");
                Some(value)
            }
            Err(error) => {
                warn!(kind = %self.kind, error = %error, "singleton fetch failed");
                self.state.send_replace(SyncState::Uninitialized);
                None
            }
        }
    }

    async fn wait_for_fetch(&self) -> Option<Arc<Resource>> {
        let mut receiver = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail here.
        let _ = receiver.wait_for(|state| !state.is_syncing()).await;
        self.current()
    }
}

/// Clears `Syncing` if the fetching future is dropped before it settles.
struct InFlight<'a> {
    resource: &'a LazyResource,
    generation: u64,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let slot = self.resource.slot.lock();
        if slot.generation == self.generation && self.resource.state().is_syncing() {
            warn!(kind = %self.resource.kind, "singleton fetch abandoned");
            self.resource.state.send_replace(SyncState::Uninitialized);
        }
    }
}

/// Activity reported by the remote for an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountActivity {
    /// Handle of the account concerned.
    pub account: String,
    /// Ledger transaction that caused the activity.
    pub transaction: String,
}

/// The account and identity singletons.
pub struct SingletonSync {
    account: LazyResource,
    identity: LazyResource,
}

impl SingletonSync {
    /// Creates both resources, uninitialized.
    pub fn new(source: Arc<dyn SingletonSource>) -> Self {
        Self {
            account: LazyResource::new(SingletonKind::Account, Arc::clone(&source)),
            identity: LazyResource::new(SingletonKind::Identity, source),
        }
    }

    /// Returns the account resource.
    pub fn account(&self) -> &LazyResource {
        &self.account
    }

    /// Returns the identity resource.
    pub fn identity(&self) -> &LazyResource {
        &self.identity
    }

    /// Returns the resource for `kind`.
    pub fn get(&self, kind: SingletonKind) -> &LazyResource {
        match kind {
            SingletonKind::Account => &self.account,
            SingletonKind::Identity => &self.identity,
        }
    }

    /// Applies a configuration change: resets both resources, then arms
    /// them if `credential` is present.
    pub fn configure(&self, credential: Option<&Credential>) {
        for resource in [&self.account, &self.identity] {
            resource.reset();
            resource.arm(credential);
        }
    }

    /// Resolves the account on first use.
    pub async fn ensure_account(&self) -> Option<Arc<Resource>> {
        self.account.ensure_initialized().await
    }

    /// Resolves the identity on first use.
    pub async fn ensure_identity(&self) -> Option<Arc<Resource>> {
        self.identity.ensure_initialized().await
    }

    /// Re-stamps the account's `Synced` time on every activity event for
    /// the resolved account, until the sender side closes.
    pub fn follow_account_activity(
        self: Arc<Self>,
        mut events: mpsc::Receiver<AccountActivity>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let relevant = self
                    .account
                    .current()
                    .is_some_and(|account| account.handle == event.account);
                if relevant && self.account.touch() {
                    debug!(transaction = %event.transaction, "account activity");
                }
            }
            debug!("account activity feed closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemote;
    use std::time::Duration;

    fn setup() -> (Arc<MockRemote>, LazyResource) {
        let remote = Arc::new(MockRemote::new());
        let resource = LazyResource::new(SingletonKind::Identity, remote.clone());
        (remote, resource)
    }

    #[test]
    fn state_checks() {
        assert!(SyncState::Synced(Utc::now()).is_synced());
        assert!(SyncState::Syncing.is_syncing());
        assert!(!SyncState::Initializing.is_syncing());
        assert_eq!(SyncState::Uninitialized.synced_at(), None);
    }

    #[test]
    fn state_serializes_with_timestamp() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(
            serde_json::to_value(SyncState::Synced(at)).unwrap(),
            serde_json::json!({"state": "synced", "at": "2024-05-01T12:00:00Z"})
        );
        assert_eq!(
            serde_json::to_value(SyncState::Syncing).unwrap(),
            serde_json::json!({"state": "syncing"})
        );
    }

    #[tokio::test]
    async fn nothing_is_fetched_until_first_use() {
        let (remote, resource) = setup();
        assert!(resource.arm(Some(&Credential::new("did:key:1"))));
        assert_eq!(resource.state(), SyncState::Initializing);
        assert_eq!(remote.singleton_fetches(SingletonKind::Identity), 0);

        let value = resource.ensure_initialized().await.unwrap();
        assert_eq!(value.handle, "did:key:1");
        assert!(resource.is_synced());
        assert_eq!(remote.singleton_fetches(SingletonKind::Identity), 1);
    }

    #[tokio::test]
    async fn repeated_reads_fetch_once() {
        let (remote, resource) = setup();
        resource.arm(Some(&Credential::new("did:key:1")));

        for _ in 0..5 {
            assert!(resource.ensure_initialized().await.is_some());
        }
        let stamp = resource.state().synced_at();

        assert_eq!(remote.singleton_fetches(SingletonKind::Identity), 1);
        assert!(stamp.is_some());
        assert_eq!(resource.state().synced_at(), stamp);
    }

    #[tokio::test]
    async fn concurrent_reads_share_one_fetch() {
        let (remote, resource) = setup();
        remote.set_singleton_delay(Duration::from_millis(20));
        resource.arm(Some(&Credential::new("did:key:1")));

        let (first, second, third) = tokio::join!(
            resource.ensure_initialized(),
            resource.ensure_initialized(),
            resource.ensure_initialized()
        );

        assert!(first.is_some() && second.is_some() && third.is_some());
        assert_eq!(remote.singleton_fetches(SingletonKind::Identity), 1);
    }

    #[tokio::test]
    async fn arming_is_idempotent() {
        let (_, resource) = setup();
        let credential = Credential::new("did:key:1");
        assert!(resource.arm(Some(&credential)));
        assert!(!resource.arm(Some(&credential)));
    }

    #[tokio::test]
    async fn missing_credential_skips_initialization() {
        let (remote, resource) = setup();
        assert!(!resource.arm(None));
        assert_eq!(resource.state(), SyncState::Uninitialized);
        assert!(resource.ensure_initialized().await.is_none());
        assert_eq!(remote.singleton_fetches(SingletonKind::Identity), 0);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_resource_unset() {
        let (remote, resource) = setup();
        remote.fail_singleton(SingletonKind::Identity);
        resource.arm(Some(&Credential::new("did:key:1")));

        assert!(resource.ensure_initialized().await.is_none());
        assert_eq!(resource.state(), SyncState::Uninitialized);
        assert!(resource.current().is_none());

        // The trigger is spent.
        assert!(resource.ensure_initialized().await.is_none());
        assert_eq!(remote.singleton_fetches(SingletonKind::Identity), 1);
    }

    #[tokio::test]
    async fn reset_clears_value_and_timestamp() {
        let (remote, resource) = setup();
        resource.arm(Some(&Credential::new("did:key:1")));
        resource.ensure_initialized().await;

        resource.reset();
        assert_eq!(resource.state(), SyncState::Uninitialized);
        assert!(resource.current().is_none());

        resource.arm(Some(&Credential::new("did:key:2")));
        let value = resource.ensure_initialized().await.unwrap();
        assert_eq!(value.handle, "did:key:2");
        assert_eq!(remote.singleton_fetches(SingletonKind::Identity), 2);
    }

    #[tokio::test]
    async fn reset_during_fetch_discards_result() {
        let (remote, resource) = setup();
        remote.set_singleton_delay(Duration::from_millis(20));
        resource.arm(Some(&Credential::new("did:key:1")));

        let (value, ()) = tokio::join!(resource.ensure_initialized(), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            resource.reset();
        });

        assert!(value.is_none());
        assert!(resource.current().is_none());
        assert_eq!(resource.state(), SyncState::Uninitialized);
    }

    #[tokio::test]
    async fn abandoned_fetch_unblocks_state() {
        let (remote, resource) = setup();
        remote.set_singleton_delay(Duration::from_secs(5));
        resource.arm(Some(&Credential::new("did:key:1")));

        let result =
            tokio::time::timeout(Duration::from_millis(10), resource.ensure_initialized()).await;

        assert!(result.is_err());
        assert_eq!(resource.state(), SyncState::Uninitialized);
    }

    #[tokio::test]
    async fn activity_restamps_synced_account() {
        let remote = Arc::new(MockRemote::new());
        let singletons = Arc::new(SingletonSync::new(remote));
        singletons.configure(Some(&Credential::new("0xacc")));
        singletons.ensure_account().await.unwrap();
        let first = singletons.account().state().synced_at().unwrap();

        let (sender, receiver) = mpsc::channel(4);
        let mut states = singletons.account().subscribe();
        let handle = Arc::clone(&singletons).follow_account_activity(receiver);

        tokio::time::sleep(Duration::from_millis(2)).await;
        sender
            .send(AccountActivity {
                account: "0xacc".into(),
                transaction: "tx1".into(),
            })
            .await
            .unwrap();
        states.changed().await.unwrap();

        let second = singletons.account().state().synced_at().unwrap();
        assert!(second > first);

        drop(sender);
        handle.await.unwrap();
        assert_eq!(singletons.get(SingletonKind::Identity).state(), SyncState::Initializing);
    }
}
