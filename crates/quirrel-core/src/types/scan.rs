//! Cursor-based scan pages.

use serde::{Deserialize, Serialize};

/// One page of a cursor-based scan.
///
/// Cursors follow the Redis SCAN convention: the scan starts at cursor
/// `0`, each page carries the cursor of the next page, and a returned
/// cursor of `0` means the scan is complete. [`ScanPage::next_cursor`]
/// surfaces the completion sentinel as `None` for API callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPage<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Raw cursor of the next page; `0` when the scan is complete.
    pub cursor: u64,
}

impl<T> ScanPage<T> {
    /// A page with no items that ends the scan.
    pub fn done(items: Vec<T>) -> Self {
        Self { items, cursor: 0 }
    }

    /// The cursor to pass to the next call, or `None` when done.
    pub fn next_cursor(&self) -> Option<u64> {
        if self.cursor == 0 {
            None
        } else {
            Some(self.cursor)
        }
    }
}
