//! Pagination and table visibility options
//!
//! # Example
//!
//! ```rust
//! use groundwork::repository::{Pagination, TableOptions};
//!
//! let page = Pagination::page(3, 20);
//! assert_eq!(page.offset, 40);
//! assert_eq!(page.limit_or(100), 20);
//!
//! // A zero limit falls back to the operation's default
//! assert_eq!(Pagination::default().limit_or(100), 100);
//!
//! assert_eq!(
//!     TableOptions::default().live_predicate(),
//!     "deactivated_at IS NULL AND deleted_at IS NULL"
//! );
//! ```

use serde::{Deserialize, Serialize};

/// Pagination parameters for list queries
///
/// A `limit` of zero means "use the operation's default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Number of results to skip
    pub offset: u64,
    /// Maximum number of results to return, zero for the default
    pub limit: u64,
}

impl Pagination {
    /// Create new pagination parameters
    #[must_use]
    pub const fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Create pagination for the first page with the given limit
    #[must_use]
    pub const fn first_page(limit: u64) -> Self {
        Self { offset: 0, limit }
    }

    /// Create pagination for a specific page number (1-indexed)
    ///
    /// The offset saturates at `u64::MAX` instead of overflowing.
    #[must_use]
    pub const fn page(page_number: u64, page_size: u64) -> Self {
        let offset = page_number.saturating_sub(1).saturating_mul(page_size);
        Self {
            offset,
            limit: page_size,
        }
    }

    /// The effective limit, substituting `default` for zero
    pub const fn limit_or(&self, default: u64) -> u64 {
        if self.limit == 0 {
            default
        } else {
            self.limit
        }
    }
}

/// Which soft-state markers hide a row from reads
///
/// Both markers are nullable timestamp columns. A soft-deleted row is hidden
/// from every read and list; a deactivated row is hidden only while
/// `hide_deactivated` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOptions {
    /// Exclude rows with `deactivated_at` set
    pub hide_deactivated: bool,
    /// Exclude rows with `deleted_at` set
    pub hide_deleted: bool,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            hide_deactivated: true,
            hide_deleted: true,
        }
    }
}

impl TableOptions {
    /// SQL predicate selecting visible rows
    pub fn live_predicate(&self) -> &'static str {
        match (self.hide_deactivated, self.hide_deleted) {
            (true, true) => "deactivated_at IS NULL AND deleted_at IS NULL",
            (true, false) => "deactivated_at IS NULL",
            (false, true) => "deleted_at IS NULL",
            (false, false) => "TRUE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_page_calculation() {
        let page1 = Pagination::page(1, 10);
        assert_eq!(page1.offset, 0);
        assert_eq!(page1.limit, 10);

        let page2 = Pagination::page(2, 10);
        assert_eq!(page2.offset, 10);

        // Page 0 is treated as page 1
        assert_eq!(Pagination::page(0, 10).offset, 0);
    }

    #[test]
    fn test_huge_page_number_saturates() {
        let page = Pagination::page(u64::MAX, 10);
        assert_eq!(page.offset, u64::MAX);
        assert_eq!(page.limit, 10);

        assert_eq!(Pagination::page(u64::MAX / 2, 4).offset, u64::MAX);
        assert_eq!(Pagination::page(u64::MAX, 0).offset, 0);
    }

    #[test]
    fn test_limit_or() {
        assert_eq!(Pagination::new(0, 0).limit_or(20), 20);
        assert_eq!(Pagination::new(0, 5).limit_or(20), 5);
        assert_eq!(Pagination::first_page(0).limit_or(100), 100);
    }

    #[test]
    fn test_live_predicate() {
        let only_deleted = TableOptions {
            hide_deactivated: false,
            hide_deleted: true,
        };
        assert_eq!(only_deleted.live_predicate(), "deleted_at IS NULL");

        let nothing = TableOptions {
            hide_deactivated: false,
            hide_deleted: false,
        };
        assert_eq!(nothing.live_predicate(), "TRUE");
    }
}
