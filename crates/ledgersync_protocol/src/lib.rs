//! # ledgersync protocol
//!
//! Data types shared by every layer of ledgersync.
//!
//! This crate provides:
//! - `Item` for records exchanged with a remote document collection
//! - `OperationSet` for one unit of intended remote mutation
//! - `Regulator` for cutting payloads into size/count-bounded batches
//! - `Query` / `PagedQuery` for paginated collection reads
//!
//! This is a pure data crate with no I/O operations.
//!
//! ## Regulation
//!
//! The regulator walks every item of a payload exactly once, in visit
//! order, while threading a single running [`Tally`] across all keys.
//! The result is a global prefix/suffix split: once the budget is crossed
//! every later item lands in the remainder, whatever key it sits under.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod item;
mod operation;
mod query;
mod regulator;

pub use error::{ItemError, ProtocolResult};
pub use item::{Item, ItemIntent, ID_KEY, RESERVED_PREFIX};
pub use operation::{OperationKind, OperationSet};
pub use query::{PagedQuery, Query};
pub use regulator::{
    Budget, KeyedSplit, PayloadBatch, Regulator, Tally, DEFAULT_COUNT_BUDGET, DEFAULT_PAGE_SIZE,
    DEFAULT_SIZE_BUDGET_KB,
};

/// Crate version, as published.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
