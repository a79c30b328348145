//! Benchmark utilities.

use ledgersync_protocol::{Item, OperationKind, OperationSet};
use rand::Rng;

/// Generates a creation item with a random text payload of `size` bytes.
pub fn random_item(size: usize) -> Item {
    let mut rng = rand::thread_rng();
    let text: String = (0..size)
        .map(|_| rng.gen_range(b'a'..=b'z') as char)
        .collect();
    Item::new()
        .set("body", text)
        .set("rank", rng.gen_range(0..1_000))
}

/// Generates `count` raw items with a random mix of shapes.
pub fn random_raw_items(count: usize, payload_size: usize) -> Vec<Item> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|n| match rng.gen_range(0..3) {
            0 => random_item(payload_size),
            1 => Item::with_id(format!("r{n}")).set("body", "updated"),
            _ => Item::with_id(format!("d{n}")),
        })
        .collect()
}

/// Builds an operation set of `per_kind` random items under every kind.
pub fn random_operation_set(per_kind: usize, payload_size: usize) -> OperationSet {
    let mut set = OperationSet::new();
    for kind in OperationKind::ALL {
        for n in 0..per_kind {
            let item = random_item(payload_size).set("id", format!("{kind}-{n}"));
            set.push(kind, item);
        }
    }
    set
}
