//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random items, operation sets and
//! budgets that keep the sync layer's shape rules.

use ledgersync_protocol::{Budget, Item, OperationSet};
use proptest::prelude::*;

/// Strategy for generating identity keys.
pub fn id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,12}").expect("Invalid regex")
}

/// Strategy for generating non-reserved field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}")
        .expect("Invalid regex")
        .prop_filter("Field name must not be the identity key", |s| s != "id")
}

/// Strategy for generating field maps without an identity key.
fn fields_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    let value = prop::string::string_regex("[ -~]{0,300}").expect("Invalid regex");
    prop::collection::vec((field_name_strategy(), value), 1..4)
}

/// Strategy for generating creation items (no identity key).
pub fn create_item_strategy() -> impl Strategy<Value = Item> {
    fields_strategy().prop_map(|fields| {
        fields
            .into_iter()
            .fold(Item::new(), |item, (key, value)| item.set(key, value))
    })
}

/// Strategy for generating replacement items (identity key plus fields).
pub fn replace_item_strategy() -> impl Strategy<Value = Item> {
    (id_strategy(), fields_strategy()).prop_map(|(id, fields)| {
        fields
            .into_iter()
            .fold(Item::with_id(id), |item, (key, value)| item.set(key, value))
    })
}

/// Strategy for generating deletion markers (identity key only).
pub fn delete_item_strategy() -> impl Strategy<Value = Item> {
    id_strategy().prop_map(|id| Item::with_id(id))
}

/// Strategy for generating raw items of any intent.
pub fn raw_item_strategy() -> impl Strategy<Value = Item> {
    prop_oneof![
        3 => create_item_strategy(),
        2 => replace_item_strategy(),
        1 => delete_item_strategy(),
    ]
}

/// Strategy for generating operation sets with up to `max_per_kind` items
/// in each sequence.
pub fn operation_set_strategy(max_per_kind: usize) -> impl Strategy<Value = OperationSet> {
    (
        prop::collection::vec(create_item_strategy(), 0..=max_per_kind),
        prop::collection::vec(replace_item_strategy(), 0..=max_per_kind),
        prop::collection::vec(delete_item_strategy(), 0..=max_per_kind),
    )
        .prop_map(|(create, replace, delete)| OperationSet {
            create,
            replace,
            delete,
        })
}

/// Strategy for generating budgets, from very tight to the defaults.
pub fn budget_strategy() -> impl Strategy<Value = Budget> {
    (1usize..=4096, 1usize..=10).prop_map(|(bytes, items)| Budget::new(bytes, items))
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
