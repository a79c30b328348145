//! Remote capabilities consumed by the sync layer.
//!
//! The engine never talks to the network itself. Collaborators implement
//! [`DocumentRemote`] for collection reads and writes and
//! [`SingletonSource`] for the account and identity resources.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use ledgersync_protocol::{Item, OperationKind, OperationSet, PagedQuery, ID_KEY};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::time::Duration;

/// The two singleton resources managed by the lazy sync state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SingletonKind {
    /// The ledger account.
    Account,
    /// The acting identity used to sign broadcasts.
    Identity,
}

impl SingletonKind {
    /// Returns a short name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SingletonKind::Account => "account",
            SingletonKind::Identity => "identity",
        }
    }
}

impl fmt::Display for SingletonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credential whose presence allows singleton initialization.
///
/// Key management is out of scope; this is only an opaque handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Address the credential controls.
    pub address: String,
}

impl Credential {
    /// Creates a credential for `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

/// A resolved singleton resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Which singleton this is.
    pub kind: SingletonKind,
    /// Stable handle (account address, identity key).
    pub handle: String,
    /// Remote payload, kept opaque.
    pub body: Value,
}

impl Resource {
    /// Creates a resource with an empty body.
    pub fn new(kind: SingletonKind, handle: impl Into<String>) -> Self {
        Self {
            kind,
            handle: handle.into(),
            body: Value::Null,
        }
    }
}

/// Read and write access to remote document collections.
///
/// Every method is a suspension point.
#[async_trait]
pub trait DocumentRemote: Send + Sync {
    /// Returns one window of a collection.
    async fn query(&self, query: &PagedQuery) -> SyncResult<Vec<Item>>;

    /// Returns the record with identity key `id`.
    async fn lookup(&self, doc_type: &str, id: &str) -> SyncResult<Item>;

    /// Composes a brand-new record from raw fields, without submitting it.
    async fn compose(&self, doc_type: &str, fields: &Item) -> SyncResult<Item>;

    /// Submits one budget-respecting operation set, signed by `identity`.
    async fn broadcast(
        &self,
        doc_type: &str,
        operations: &OperationSet,
        identity: &Resource,
    ) -> SyncResult<()>;
}

/// Resolution of singleton resources.
#[async_trait]
pub trait SingletonSource: Send + Sync {
    /// Fetches the singleton `kind` for `credential`.
    async fn fetch_singleton(
        &self,
        kind: SingletonKind,
        credential: &Credential,
    ) -> SyncResult<Resource>;
}

/// Calls recorded by [`MockRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    /// A paged query.
    Query(PagedQuery),
    /// A lookup by identity key.
    Lookup {
        /// Document type.
        doc_type: String,
        /// Identity key.
        id: String,
    },
    /// A compose call.
    Compose {
        /// Document type.
        doc_type: String,
    },
    /// A broadcast.
    Broadcast {
        /// Document type.
        doc_type: String,
        /// Submitted operations.
        operations: OperationSet,
        /// Handle of the acting identity.
        identity: String,
    },
    /// A singleton fetch.
    Singleton(SingletonKind),
}

#[derive(Default)]
struct MockState {
    collections: BTreeMap<String, BTreeMap<String, Item>>,
    singletons: HashMap<SingletonKind, Resource>,
    calls: Vec<RemoteCall>,
    broadcasts: usize,
    failing_broadcasts: HashMap<usize, bool>,
    failing_lookups: HashSet<String>,
    failing_composes: usize,
    failing_queries: bool,
    failing_singletons: HashSet<SingletonKind>,
    ignore_query_limit: bool,
    singleton_delay: Duration,
    next_id: u64,
}

/// An in-memory remote for testing.
///
/// Collections are kept ordered by identity key. A successful broadcast
/// is applied to the stored collection, so later queries observe it.
#[derive(Default)]
pub struct MockRemote {
    state: Mutex<MockState>,
}

impl MockRemote {
    /// Creates an empty mock remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record. Records without an identity key are ignored.
    pub fn seed(&self, doc_type: &str, item: Item) {
        if let Some(id) = item.id().map(str::to_string) {
            self.state
                .lock()
                .collections
                .entry(doc_type.to_string())
                .or_default()
                .insert(id, item);
        }
    }

    /// Stores `count` records `{id: "<prefix><n>", n}` with zero-padded ids.
    pub fn seed_many(&self, doc_type: &str, prefix: &str, count: usize) {
        for n in 0..count {
            self.seed(doc_type, Item::with_id(format!("{prefix}{n:05}")).set("n", n));
        }
    }

    /// Returns a stored record.
    pub fn record(&self, doc_type: &str, id: &str) -> Option<Item> {
        self.state
            .lock()
            .collections
            .get(doc_type)
            .and_then(|records| records.get(id))
            .cloned()
    }

    /// Returns the number of stored records of `doc_type`.
    pub fn record_count(&self, doc_type: &str) -> usize {
        self.state
            .lock()
            .collections
            .get(doc_type)
            .map_or(0, |records| records.len())
    }

    /// Sets the resource returned for singleton `kind`.
    pub fn set_singleton(&self, resource: Resource) {
        self.state.lock().singletons.insert(resource.kind, resource);
    }

    /// Makes broadcast number `call` (1-based) fail.
    pub fn fail_broadcast(&self, call: usize, retryable: bool) {
        self.state.lock().failing_broadcasts.insert(call, retryable);
    }

    /// Makes lookups of `id` fail.
    pub fn fail_lookup(&self, id: &str) {
        self.state.lock().failing_lookups.insert(id.to_string());
    }

    /// Makes the next `count` compose calls fail.
    pub fn fail_composes(&self, count: usize) {
        self.state.lock().failing_composes = count;
    }

    /// Makes every query fail.
    pub fn fail_queries(&self, failing: bool) {
        self.state.lock().failing_queries = failing;
    }

    /// Makes fetches of singleton `kind` fail.
    pub fn fail_singleton(&self, kind: SingletonKind) {
        self.state.lock().failing_singletons.insert(kind);
    }

    /// Makes queries return full pages forever, ignoring the window.
    pub fn ignore_query_limit(&self, ignore: bool) {
        self.state.lock().ignore_query_limit = ignore;
    }

    /// Delays every singleton fetch.
    pub fn set_singleton_delay(&self, delay: Duration) {
        self.state.lock().singleton_delay = delay;
    }

    /// Returns every recorded call, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    /// Returns the recorded broadcasts, in order.
    pub fn broadcasts(&self) -> Vec<OperationSet> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                RemoteCall::Broadcast { operations, .. } => Some(operations.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the number of recorded queries.
    pub fn query_count(&self) -> usize {
        self.count_calls(|call| matches!(call, RemoteCall::Query(_)))
    }

    /// Returns the number of recorded fetches of singleton `kind`.
    pub fn singleton_fetches(&self, kind: SingletonKind) -> usize {
        self.count_calls(|call| *call == RemoteCall::Singleton(kind))
    }

    /// Clears the call log.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn count_calls(&self, predicate: impl Fn(&RemoteCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|call| predicate(call)).count()
    }
}

#[async_trait]
impl DocumentRemote for MockRemote {
    async fn query(&self, query: &PagedQuery) -> SyncResult<Vec<Item>> {
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::Query(query.clone()));
        if state.failing_queries {
            return Err(SyncError::remote_retryable("mock query failure"));
        }

        let matching: Vec<Item> = state
            .collections
            .get(query.doc_type())
            .into_iter()
            .flat_map(|records| records.values())
            .filter(|item| {
                query
                    .query
                    .filter
                    .iter()
                    .all(|(key, value)| item.get(key) == Some(value))
            })
            .cloned()
            .collect();

        if state.ignore_query_limit {
            return Ok(matching.into_iter().cycle().take(query.limit).collect());
        }

        Ok(matching
            .into_iter()
            .skip(query.start_at)
            .take(query.limit)
            .collect())
    }

    async fn lookup(&self, doc_type: &str, id: &str) -> SyncResult<Item> {
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::Lookup {
            doc_type: doc_type.to_string(),
            id: id.to_string(),
        });
        if state.failing_lookups.contains(id) {
            return Err(SyncError::remote_fatal(format!("mock lookup failure for {id}")));
        }

        state
            .collections
            .get(doc_type)
            .and_then(|records| records.get(id))
            .cloned()
            .ok_or_else(|| SyncError::not_found(doc_type, id))
    }

    async fn compose(&self, doc_type: &str, fields: &Item) -> SyncResult<Item> {
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::Compose {
            doc_type: doc_type.to_string(),
        });
        if state.failing_composes > 0 {
            state.failing_composes -= 1;
            return Err(SyncError::remote_fatal("mock compose failure"));
        }

        state.next_id += 1;
        let id = uuid::Uuid::new_v4().to_string();
        let mut record = fields.clone();
        record.insert(ID_KEY, id);
        record.insert("_seq", state.next_id);
        Ok(record)
    }

    async fn broadcast(
        &self,
        doc_type: &str,
        operations: &OperationSet,
        identity: &Resource,
    ) -> SyncResult<()> {
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::Broadcast {
            doc_type: doc_type.to_string(),
            operations: operations.clone(),
            identity: identity.handle.clone(),
        });
        state.broadcasts += 1;
        let call = state.broadcasts;
        if let Some(retryable) = state.failing_broadcasts.remove(&call) {
            return Err(SyncError::Remote {
                message: format!("mock broadcast failure on call {call}"),
                retryable,
            });
        }

        let records = state.collections.entry(doc_type.to_string()).or_default();
        for kind in OperationKind::ALL {
            for item in operations.get(kind) {
                let Some(id) = item.id() else {
                    return Err(SyncError::Rejected(format!("{kind} without identity key")));
                };
                match kind {
                    OperationKind::Create | OperationKind::Replace => {
                        records.insert(id.to_string(), item.clone());
                    }
                    OperationKind::Delete => {
                        records.remove(id);
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SingletonSource for MockRemote {
    async fn fetch_singleton(
        &self,
        kind: SingletonKind,
        credential: &Credential,
    ) -> SyncResult<Resource> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(RemoteCall::Singleton(kind));
            state.singleton_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock();
        if state.failing_singletons.contains(&kind) {
            return Err(SyncError::remote_retryable(format!("mock {kind} fetch failure")));
        }
        Ok(state.singletons.get(&kind).cloned().unwrap_or_else(|| Resource {
            kind,
            handle: credential.address.clone(),
            body: Value::Null,
        }))
    }
}
