//! Page/limit pagination metadata
//!
//! `Pagination` is always derived from the list it describes; it is never
//! persisted on its own. Serialized in camelCase to match what listing clients
//! already consume (`currentPage`, `totalPages`, `totalItems`, `limit`).
//!
//! # Example
//!
//! ```
//! use vod_catalog_core::pagination::{Pagination, PaginationParams};
//!
//! let params = PaginationParams::new(2, 24).normalized();
//! let pagination = Pagination::from_totals(params.page, params.limit, 100);
//! assert_eq!(pagination.total_pages, 5);
//! assert!(pagination.has_next());
//! ```

use serde::{Deserialize, Serialize};

/// Default number of items per page
pub const DEFAULT_LIMIT: u32 = 24;

/// Maximum number of items per page
pub const MAX_LIMIT: u32 = 100;

/// Requested page window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationParams {
    /// 1-based page number
    pub page: u32,
    /// Items per page
    pub limit: u32,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PaginationParams {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    /// Clamp page to at least 1 and limit into `1..=MAX_LIMIT`
    pub fn normalized(self) -> Self {
        let limit = match self.limit {
            0 => DEFAULT_LIMIT,
            l => l.min(MAX_LIMIT),
        };
        Self {
            page: self.page.max(1),
            limit,
        }
    }
}

/// Pagination metadata for a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_items: u64,
    pub limit: u32,
}

impl Pagination {
    /// Derive metadata from a known item total
    pub fn from_totals(current_page: u32, limit: u32, total_items: u64) -> Self {
        let limit = limit.max(1);
        let total_pages = total_items.div_ceil(u64::from(limit));
        Self {
            current_page: current_page.max(1),
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
            total_items,
            limit,
        }
    }

    /// Derive metadata when the source only reports the page it returned
    ///
    /// Without an upstream total the best estimate is everything seen so far,
    /// plus one more page when the current one came back full.
    pub fn from_page_len(current_page: u32, limit: u32, items_on_page: usize) -> Self {
        let limit = limit.max(1);
        let current_page = current_page.max(1);
        let seen = u64::from(current_page - 1) * u64::from(limit) + items_on_page as u64;
        let mut pagination = Self::from_totals(current_page, limit, seen);
        if items_on_page as u64 >= u64::from(limit) {
            pagination.total_pages = pagination.total_pages.max(current_page + 1);
        }
        pagination
    }

    /// Empty listing metadata
    pub fn empty(limit: u32) -> Self {
        Self::from_totals(1, limit, 0)
    }

    /// Whether a page after the current one exists
    pub fn has_next(&self) -> bool {
        self.current_page < self.total_pages
    }
}
