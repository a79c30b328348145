//! CLI command implementations.

pub mod chunk;
pub mod classify;

use ledgersync_protocol::{Item, OperationSet};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

/// A payload read from disk.
#[derive(Debug)]
pub enum Payload {
    /// `{"create": [..], "replace": [..], "delete": [..]}`
    Operations(OperationSet),
    /// `[item, item, ..]`
    Raw(Vec<Item>),
}

impl Payload {
    /// Parses a payload from JSON text.
    pub fn parse(text: &str) -> Result<Self, Box<dyn std::error::Error>> {
        match serde_json::from_str(text)? {
            Value::Array(values) => {
                let items = values
                    .into_iter()
                    .map(Item::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Payload::Raw(items))
            }
            value @ Value::Object(_) => Ok(Payload::Operations(serde_json::from_value(value)?)),
            _ => Err("payload must be a JSON object or array".into()),
        }
    }

    /// Reads and parses `path`.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        debug!(path = %path.display(), bytes = text.len(), "payload read");
        let payload = Self::parse(&text)?;
        info!(
            path = %path.display(),
            shape = payload.shape(),
            items = payload.len(),
            "payload loaded"
        );
        Ok(payload)
    }

    /// Returns the number of items in the payload.
    pub fn len(&self) -> usize {
        match self {
            Payload::Operations(set) => set.len(),
            Payload::Raw(items) => items.len(),
        }
    }

    /// Returns true if the payload holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shape(&self) -> &'static str {
        match self {
            Payload::Operations(_) => "operations",
            Payload::Raw(_) => "raw",
        }
    }
}
