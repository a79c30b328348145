//! # LedgerSync Engine
//!
//! Client-side synchronization of ledger-backed document collections.
//!
//! This crate provides:
//! - Paginated full-collection reads
//! - Classification of raw items into create/replace/delete operations
//! - Budgeted, strictly ordered broadcasting of operation sets
//! - Lazy, single-shot initialization of the account and identity
//! - Per-collection local mirrors driven by a watched list of names
//!
//! ## Architecture
//!
//! A mutation flows **regulate → plan → broadcast → commit**:
//! 1. The raw item list is cut into budget-sized rounds
//! 2. Each round is planned against the remote (lookup, compose)
//! 3. The planned operations are broadcast in budget-sized chunks
//! 4. Accepted operations are committed to the local mirror
//!
//! Remote access goes through the [`DocumentRemote`] and
//! [`SingletonSource`] traits; the engine does no I/O of its own.
//!
//! ## Key Invariants
//!
//! - Chunks are submitted in the order they are cut
//! - The first failing chunk halts every later chunk
//! - The mirror only changes after a successful broadcast or refresh
//! - An armed singleton trigger fires at most once
//! - Failures come back as report values, never as panics

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod broadcaster;
mod config;
mod error;
mod fetcher;
mod mirror;
mod planner;
mod registry;
mod remote;
mod singleton;
mod store;

pub use broadcaster::{BroadcastReport, Broadcaster};
pub use config::{FailurePolicy, RetryConfig, SyncConfig, DEFAULT_MAX_PAGES};
pub use error::{SyncError, SyncResult};
pub use fetcher::Paginator;
pub use mirror::{CommitStats, Mirror};
pub use planner::{PlanFailure, PlanReport, Planner};
pub use registry::{CollectionRegistry, ResyncReport};
pub use remote::{
    Credential, DocumentRemote, MockRemote, RemoteCall, Resource, SingletonKind, SingletonSource,
};
pub use singleton::{AccountActivity, LazyResource, SingletonSync, SyncState};
pub use store::{BulkReport, CollectionStore, RefreshReport};
