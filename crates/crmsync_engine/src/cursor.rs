//! Pagination cursor.

use crmsync_remote::ListPage;
use std::collections::BTreeSet;

/// State of one pagination pass.
///
/// The watermark only moves forward; a page whose last identifier does not
/// advance it ends the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCursor {
    /// Highest identifier processed so far; the next page starts after it.
    pub last_seen_id: i64,
    /// Expected page size. A shorter page is the last one.
    pub page_size: usize,
    /// Every identifier observed during the pass.
    pub collected_ids: BTreeSet<i64>,
}

impl SyncCursor {
    /// Creates a cursor positioned before the first record.
    pub fn new(page_size: usize) -> Self {
        Self {
            last_seen_id: 0,
            page_size,
            collected_ids: BTreeSet::new(),
        }
    }

    /// Records an observed identifier.
    pub fn observe(&mut self, id: i64) {
        self.collected_ids.insert(id);
    }

    /// Moves the watermark to the last identifier of `page`.
    ///
    /// Returns false when the watermark did not advance.
    pub fn advance(&mut self, page: &ListPage) -> bool {
        match page.last_id() {
            Some(id) if id > self.last_seen_id => {
                self.last_seen_id = id;
                true
            }
            _ => false,
        }
    }

    /// Returns true if `page` is the last page of the pass.
    pub fn is_last_page(&self, page: &ListPage) -> bool {
        page.len() < self.page_size
    }

    /// Number of distinct identifiers observed.
    pub fn observed(&self) -> u64 {
        self.collected_ids.len() as u64
    }
}
