//! Chunk command implementation.

use super::Payload;
use ledgersync_engine::SyncConfig;
use ledgersync_protocol::{Budget, Item, OperationKind, OperationSet, Regulator};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// One chunk as a broadcast would submit it.
#[derive(Debug, Serialize)]
pub struct ChunkSummary {
    /// Position of the chunk, starting at 1.
    pub index: usize,
    /// Items to create.
    pub create: usize,
    /// Items to replace.
    pub replace: usize,
    /// Items to delete.
    pub delete: usize,
    /// Encoded size of the chunk's items, in bytes.
    pub bytes: usize,
    /// Identity keys in the chunk, in visit order.
    pub ids: Vec<String>,
}

/// Chunking result.
#[derive(Debug, Serialize)]
pub struct ChunkResult {
    /// Size budget, in bytes.
    pub max_bytes: usize,
    /// Item budget.
    pub max_items: usize,
    /// Total items in the payload.
    pub total_items: usize,
    /// Successive chunks.
    pub chunks: Vec<ChunkSummary>,
    /// Items left over because one of them can never fit the size budget.
    pub stalled: usize,
}

/// Runs the chunk command.
pub fn run(
    path: &Path,
    size_kb: usize,
    count: usize,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = SyncConfig::new()
        .with_size_budget_kb(size_kb)
        .with_count_budget(count);
    let payload = Payload::load(path)?;
    let result = chunk_payload(payload, config.budget);
    info!(
        items = result.total_items,
        chunks = result.chunks.len(),
        stalled = result.stalled,
        "payload chunked"
    );

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text_output(&result),
    }

    if result.stalled > 0 {
        return Err(format!(
            "{} item(s) left over: the next item exceeds the {} byte budget",
            result.stalled, result.max_bytes
        )
        .into());
    }
    Ok(())
}

/// Drains `payload` through a regulator the way a broadcast does.
pub fn chunk_payload(payload: Payload, budget: Budget) -> ChunkResult {
    let regulator = Regulator::new(budget);
    let mut pending = match payload {
        Payload::Operations(set) => set,
        Payload::Raw(items) => route_by_shape(items),
    };

    let mut result = ChunkResult {
        max_bytes: budget.max_bytes,
        max_items: budget.max_items,
        total_items: pending.len(),
        chunks: Vec::new(),
        stalled: 0,
    };

    while !pending.is_empty() {
        let batch = regulator.regulate(pending);
        if batch.is_stalled() {
            result.stalled = batch.remainder.len();
            warn!(
                left = result.stalled,
                max_bytes = budget.max_bytes,
                "next item exceeds the size budget"
            );
            break;
        }
        if !batch.included.is_empty() {
            let chunk = summarize(result.chunks.len() + 1, &batch.included);
            debug!(index = chunk.index, items = chunk.ids.len(), bytes = chunk.bytes, "chunk cut");
            result.chunks.push(chunk);
        }
        pending = batch.remainder;
    }
    result
}

/// Routes raw items by shape, so the chunks match what a bulk mutation
/// would broadcast before lookups and composes enrich them.
fn route_by_shape(items: Vec<Item>) -> OperationSet {
    let mut set = OperationSet::new();
    for item in items {
        set.push(OperationKind::from(item.intent()), item);
    }
    set
}

fn summarize(index: usize, chunk: &OperationSet) -> ChunkSummary {
    let items: Vec<&Item> = OperationKind::ALL
        .into_iter()
        .flat_map(|kind| chunk.get(kind))
        .collect();
    ChunkSummary {
        index,
        create: chunk.create.len(),
        replace: chunk.replace.len(),
        delete: chunk.delete.len(),
        bytes: items.iter().map(|item| item.encoded_len()).sum(),
        ids: items
            .iter()
            .map(|item| item.id().unwrap_or("<new>").to_string())
            .collect(),
    }
}

fn print_text_output(result: &ChunkResult) {
    println!("Payload Chunking");
    println!("================");
    println!();
    println!("Budget:  {} bytes, {} items", result.max_bytes, result.max_items);
    println!("Items:   {}", result.total_items);
    println!("Chunks:  {}", result.chunks.len());
    println!();

    for chunk in &result.chunks {
        println!(
            "  #{:<3} create={:<3} replace={:<3} delete={:<3} {:>6} bytes",
            chunk.index, chunk.create, chunk.replace, chunk.delete, chunk.bytes
        );
    }

    if result.stalled > 0 {
        println!();
        println!("Stalled: {} item(s) cannot be sent", result.stalled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_set_is_cut_in_visit_order() {
        let payload = Payload::parse(
            r#"{"create":[{"t":1},{"t":2}],"replace":[{"id":"r","t":3}],"delete":[{"id":"d"}]}"#,
        )
        .unwrap();

        let result = chunk_payload(payload, Budget::new(4096, 3));

        assert_eq!(result.total_items, 4);
        assert_eq!(result.chunks.len(), 2);
        assert_eq!(result.chunks[0].create, 2);
        assert_eq!(result.chunks[0].replace, 1);
        assert_eq!(result.chunks[1].ids, vec!["d"]);
    }

    #[test]
    fn raw_items_are_routed_by_shape() {
        let payload = Payload::parse(r#"[{"id":"a"},{"id":"b","t":1},{"t":2}]"#).unwrap();

        let result = chunk_payload(payload, Budget::default());

        assert_eq!(result.chunks.len(), 1);
        let chunk = &result.chunks[0];
        assert_eq!((chunk.create, chunk.replace, chunk.delete), (1, 1, 1));
        assert_eq!(chunk.ids, vec!["<new>", "b", "a"]);
    }

    #[test]
    fn oversized_item_stalls() {
        let text = format!(r#"[{{"t":1}},{{"blob":"{}"}}]"#, "x".repeat(40));
        let payload = Payload::parse(&text).unwrap();

        let result = chunk_payload(payload, Budget::new(20, 10));

        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.stalled, 1);
    }
}
