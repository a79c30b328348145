//! Item and payload fixtures.
//!
//! Sizes are exact: every helper documents the length of the compact JSON
//! encoding it produces so budget-sensitive tests can reason in bytes.

use ledgersync_protocol::{Item, OperationKind, OperationSet};
use serde_json::Value;

/// Framing bytes of `{"pad":""}`.
const PAD_FRAMING: usize = 10;

/// Returns a creation item `{"title":"note-<n>"}`.
pub fn new_note(n: usize) -> Item {
    Item::new().set("title", format!("note-{n}"))
}

/// Returns a replacement item for `id` with a `title` field.
pub fn note_update(id: &str, title: &str) -> Item {
    Item::with_id(id).set("title", title)
}

/// Returns a stored record for `id`, as the remote would hold it.
pub fn stored_note(id: &str, title: &str) -> Item {
    Item::with_id(id)
        .set("title", title)
        .set("_created_by", "fixture")
}

/// Returns a creation item whose encoded length is exactly `bytes`.
///
/// # Panics
///
/// Panics if `bytes` is smaller than the 10 bytes of framing.
pub fn padded(bytes: usize) -> Item {
    assert!(bytes >= PAD_FRAMING, "padded item needs at least {PAD_FRAMING} bytes");
    Item::new().set("pad", Value::String("x".repeat(bytes - PAD_FRAMING)))
}

/// Returns `count` creation items.
pub fn new_notes(count: usize) -> Vec<Item> {
    (0..count).map(new_note).collect()
}

/// Builds an operation set with `count` items of `kind`.
pub fn operation_set_of(kind: OperationKind, count: usize) -> OperationSet {
    let mut set = OperationSet::new();
    for n in 0..count {
        let item = match kind {
            OperationKind::Create => new_note(n),
            OperationKind::Replace => note_update(&format!("r{n}"), "updated"),
            OperationKind::Delete => Item::with_id(format!("d{n}")),
        };
        set.push(kind, item);
    }
    set
}
