//! Collection queries.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A query over one remote document collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Document type (collection) name.
    pub doc_type: String,
    /// Field equality filter. Empty matches everything.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub filter: Map<String, Value>,
}

impl Query {
    /// Creates a query matching every document of `doc_type`.
    pub fn new(doc_type: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            filter: Map::new(),
        }
    }

    /// Adds an equality constraint.
    #[must_use]
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(key.into(), value.into());
        self
    }

    /// Returns this query restricted to page `page` of `page_size` items.
    pub fn page(&self, page: usize, page_size: usize) -> PagedQuery {
        PagedQuery {
            query: self.clone(),
            start_at: page.saturating_mul(page_size),
            limit: page_size,
        }
    }
}

/// A query annotated with a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagedQuery {
    /// The underlying query.
    #[serde(flatten)]
    pub query: Query,
    /// Offset of the first item to return.
    pub start_at: usize,
    /// Maximum number of items to return.
    pub limit: usize,
}

impl PagedQuery {
    /// Returns the document type being queried.
    pub fn doc_type(&self) -> &str {
        &self.query.doc_type
    }
}
