//! # ledgersync testkit
//!
//! Test utilities for ledgersync.
//!
//! This crate provides:
//! - Property-based test generators using proptest
//! - Item and payload fixtures with predictable encoded sizes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ledgersync_testkit::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn never_loses_items(set in operation_set_strategy(8)) {
//!         // ...
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
