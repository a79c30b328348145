//! Classify command implementation.

use super::Payload;
use ledgersync_protocol::{Item, ItemIntent};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// Classification of one raw item.
#[derive(Debug, Serialize)]
pub struct ItemClass {
    /// Position in the input.
    pub index: usize,
    /// What a bulk mutation would do with it.
    pub intent: ItemIntent,
    /// Identity key, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Encoded size, in bytes.
    pub bytes: usize,
    /// Fields a replace would ignore.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reserved: Vec<String>,
}

/// Classification result.
#[derive(Debug, Default, Serialize)]
pub struct ClassifyResult {
    /// Items to create.
    pub create: usize,
    /// Items to replace.
    pub replace: usize,
    /// Items to delete.
    pub delete: usize,
    /// Per-item detail.
    pub items: Vec<ItemClass>,
}

/// Runs the classify command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let items = match Payload::load(path)? {
        Payload::Raw(items) => items,
        Payload::Operations(_) => {
            return Err("classify expects a JSON array of raw items".into());
        }
    };
    let result = classify(&items);
    info!(
        create = result.create,
        replace = result.replace,
        delete = result.delete,
        "payload classified"
    );

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text_output(&result),
    }
    Ok(())
}

/// Classifies every raw item by shape.
pub fn classify(items: &[Item]) -> ClassifyResult {
    let mut result = ClassifyResult::default();

    for (index, item) in items.iter().enumerate() {
        let intent = item.intent();
        match intent {
            ItemIntent::Create => result.create += 1,
            ItemIntent::Replace => result.replace += 1,
            ItemIntent::Delete => result.delete += 1,
        }
        let reserved = match intent {
            ItemIntent::Replace => item
                .fields()
                .map(|(key, _)| key)
                .filter(|key| Item::is_reserved(key) && key.as_str() != ledgersync_protocol::ID_KEY)
                .cloned()
                .collect(),
            _ => Vec::new(),
        };
        if !reserved.is_empty() {
            debug!(index, ignored = ?reserved, "replace carries reserved fields");
        }
        result.items.push(ItemClass {
            index,
            intent,
            id: item.id().map(str::to_string),
            bytes: item.encoded_len(),
            reserved,
        });
    }
    result
}

fn print_text_output(result: &ClassifyResult) {
    println!("Raw Item Classification");
    println!("=======================");
    println!();
    println!("  create:  {}", result.create);
    println!("  replace: {}", result.replace);
    println!("  delete:  {}", result.delete);
    println!();

    for item in &result.items {
        let id = item.id.as_deref().unwrap_or("-");
        println!(
            "  [{:>4}] {:<8} {:<24} {:>6} bytes",
            item.index,
            format!("{:?}", item.intent).to_lowercase(),
            id,
            item.bytes
        );
        if !item.reserved.is_empty() {
            println!("         ignored: {}", item.reserved.join(", "));
        }
    }
}
