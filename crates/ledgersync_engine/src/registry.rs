//! Collection lifecycle driven by the watched list of document types.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::DocumentRemote;
use crate::singleton::SingletonSync;
use crate::store::{CollectionStore, RefreshReport};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of one resync.
#[derive(Debug, Default)]
pub struct ResyncReport {
    /// Names unregistered because they left the list.
    pub removed: Vec<String>,
    /// Names registered with a fresh store, in list order.
    pub registered: Vec<String>,
    /// One refresh per registered name.
    pub refreshes: Vec<RefreshReport>,
}

impl ResyncReport {
    /// Returns true if every refresh succeeded.
    pub fn is_success(&self) -> bool {
        self.refreshes.iter().all(RefreshReport::is_success)
    }
}

/// Owns one [`CollectionStore`] per watched document type.
///
/// Every change to the list is a coarse resync: names that left are
/// dropped, every present name gets a brand-new store, and each store is
/// then refreshed. A name that leaves and comes back starts empty.
pub struct CollectionRegistry<R: ?Sized> {
    remote: Arc<R>,
    singletons: Arc<SingletonSync>,
    config: SyncConfig,
    stores: RwLock<BTreeMap<String, Arc<CollectionStore<R>>>>,
}

impl<R: DocumentRemote + ?Sized> CollectionRegistry<R> {
    /// Creates an empty registry.
    pub fn new(remote: Arc<R>, singletons: Arc<SingletonSync>, config: SyncConfig) -> Self {
        Self {
            remote,
            singletons,
            config,
            stores: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the shared singletons.
    pub fn singletons(&self) -> &Arc<SingletonSync> {
        &self.singletons
    }

    /// Returns the store for `name`, if registered.
    pub fn store(&self, name: &str) -> Option<Arc<CollectionStore<R>>> {
        self.stores.read().get(name).cloned()
    }

    /// Returns the store for `name` or [`SyncError::UnknownCollection`].
    pub fn get(&self, name: &str) -> SyncResult<Arc<CollectionStore<R>>> {
        self.store(name)
            .ok_or_else(|| SyncError::UnknownCollection(name.to_string()))
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.stores.read().keys().cloned().collect()
    }

    /// Returns the number of registered collections.
    pub fn len(&self) -> usize {
        self.stores.read().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.stores.read().is_empty()
    }

    /// Resyncs the registry against `names`.
    pub async fn apply_names(&self, names: &[String]) -> ResyncReport {
        let mut report = ResyncReport::default();
        let wanted: BTreeSet<&str> = names.iter().map(String::as_str).collect();

        let fresh: Vec<Arc<CollectionStore<R>>> = {
            let mut stores = self.stores.write();
            let stale: Vec<String> = stores
                .keys()
                .filter(|name| !wanted.contains(name.as_str()))
                .cloned()
                .collect();
            for name in stale {
                stores.remove(&name);
                debug!(doc_type = %name, "collection unregistered");
                report.removed.push(name);
            }

            let mut seen = BTreeSet::new();
            let mut fresh = Vec::with_capacity(wanted.len());
            for name in names.iter().filter(|name| seen.insert(name.as_str())) {
                let store = Arc::new(CollectionStore::new(
                    name.as_str(),
                    Arc::clone(&self.remote),
                    Arc::clone(&self.singletons),
                    self.config.clone(),
                ));
                stores.insert(name.clone(), Arc::clone(&store));
                report.registered.push(name.clone());
                fresh.push(store);
            }
            fresh
        };

        for store in fresh {
            report.refreshes.push(store.refresh_all().await);
        }

        let failed = report.refreshes.iter().filter(|r| !r.is_success()).count();
        if failed > 0 {
            warn!(failed, "some collections failed to refresh");
        }
        info!(
            removed = report.removed.len(),
            registered = report.registered.len(),
            "collections resynced"
        );
        report
    }

    /// Resyncs on the current list and again on every change, until the
    /// sending side is dropped.
    pub fn watch(self: Arc<Self>, mut names: watch::Receiver<Vec<String>>) -> JoinHandle<()>
    where
        R: 'static,
    {
        tokio::spawn(async move {
            loop {
                let current = names.borrow_and_update().clone();
                self.apply_names(&current).await;
                if names.changed().await.is_err() {
                    break;
                }
            }
            debug!("collection list closed");
        })
    }
}
