//! Paginated full-collection reads.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::DocumentRemote;
use ledgersync_protocol::{Item, Query};
use tracing::{debug, trace};

/// Reads a whole collection, one page at a time.
///
/// Pages are requested as `start_at = page * page_size, limit = page_size`
/// starting at page 0. The loop stops on the first short page: once the
/// accumulated total falls below `page * page_size`. The first page is
/// always requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    page_size: usize,
    max_pages: usize,
}

impl Paginator {
    /// Creates a paginator.
    ///
    /// `max_pages` guards against a remote that keeps returning full pages.
    pub fn new(page_size: usize, max_pages: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            max_pages,
        }
    }

    /// Creates a paginator from the sync configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.page_size, config.max_pages)
    }

    /// Returns the page size.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fetches every item matching `query`, in remote order.
    pub async fn fetch_all<R>(&self, remote: &R, query: &Query) -> SyncResult<Vec<Item>>
    where
        R: DocumentRemote + ?Sized,
    {
        let mut items = Vec::new();
        let mut page = 0usize;

        loop {
            if page >= self.max_pages {
                return Err(SyncError::PaginationOverflow { pages: page });
            }

            let batch = remote.query(&query.page(page, self.page_size)).await?;
            trace!(
                doc_type = %query.doc_type,
                page,
                returned = batch.len(),
                "fetched page"
            );
            items.extend(batch);
            page += 1;

            if items.len() < page.saturating_mul(self.page_size) {
                break;
            }
        }

        debug!(
            doc_type = %query.doc_type,
            pages = page,
            items = items.len(),
            "collection fetched"
        );
        Ok(items)
    }
}

impl Default for Paginator {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}
