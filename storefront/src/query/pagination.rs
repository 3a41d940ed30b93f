//! Page windows and list results
//!
//! # Example
//!
//! ```rust
//! use storefront::query::{ListPage, PageRequest, Pagination};
//!
//! let request = PageRequest::new(2, 3);
//! assert_eq!(request.skip(), 3);
//!
//! let pagination = Pagination::new(10, request);
//! assert_eq!(pagination.pages, 4);
//!
//! let page = ListPage::Paged { records: vec!["d", "e", "f"], pagination };
//! assert_eq!(page.len(), 3);
//! assert_eq!(page.pagination().map(|p| p.total), Some(10));
//! ```

use serde::{Deserialize, Serialize};

/// Page number used when `page` is absent or invalid
pub const DEFAULT_PAGE: u64 = 1;

/// Page size used when `limit` is absent or invalid
pub const DEFAULT_LIMIT: u64 = 8;

/// A requested page: 1-based page number and page size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number
    pub page: u64,
    /// Page size
    pub limit: u64,
}

impl PageRequest {
    /// Create a page request; zero values are raised to 1
    #[must_use]
    pub const fn new(page: u64, limit: u64) -> Self {
        Self {
            page: if page == 0 { 1 } else { page },
            limit: if limit == 0 { 1 } else { limit },
        }
    }

    /// Documents to skip before this page
    #[must_use]
    pub const fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE, DEFAULT_LIMIT)
    }
}

/// Pagination metadata returned with a paged list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Documents matching the filter
    pub total: u64,
    /// Page size
    pub limit: u64,
    /// Number of pages (`ceil(total / limit)`)
    pub pages: u64,
    /// 1-based page number
    pub page: u64,
    /// Documents skipped before this page
    pub skip: u64,
}

impl Pagination {
    /// Build metadata for `request` over `total` matching documents
    #[must_use]
    pub fn new(total: u64, request: PageRequest) -> Self {
        Self {
            total,
            limit: request.limit,
            pages: calculate_total_pages(total, request.limit),
            page: request.page,
            skip: request.skip(),
        }
    }
}

/// Calculate total pages, rounding up
fn calculate_total_pages(total: u64, limit: u64) -> u64 {
    if limit == 0 {
        return 0;
    }
    total.div_ceil(limit)
}

/// Result of a list query
///
/// Pagination metadata exists only when a page was requested.
#[derive(Debug, Clone, PartialEq)]
pub enum ListPage<T> {
    /// Every matching record
    Unpaged(Vec<T>),
    /// One page of matching records
    Paged {
        /// Records on this page
        records: Vec<T>,
        /// Page metadata
        pagination: Pagination,
    },
}

impl<T> ListPage<T> {
    /// Records in this result
    pub fn records(&self) -> &[T] {
        match self {
            Self::Unpaged(records) | Self::Paged { records, .. } => records,
        }
    }

    /// Pagination metadata, if paged
    pub fn pagination(&self) -> Option<&Pagination> {
        match self {
            Self::Unpaged(_) => None,
            Self::Paged { pagination, .. } => Some(pagination),
        }
    }

    /// Number of records in this result
    pub fn len(&self) -> usize {
        self.records().len()
    }

    /// Whether this result has no records
    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    /// Split into records and optional pagination
    pub fn into_parts(self) -> (Vec<T>, Option<Pagination>) {
        match self {
            Self::Unpaged(records) => (records, None),
            Self::Paged {
                records,
                pagination,
            } => (records, Some(pagination)),
        }
    }

    /// Convert every record, keeping the pagination
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> ListPage<U> {
        match self {
            Self::Unpaged(records) => ListPage::Unpaged(records.into_iter().map(f).collect()),
            Self::Paged {
                records,
                pagination,
            } => ListPage::Paged {
                records: records.into_iter().map(f).collect(),
                pagination,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_skip() {
        assert_eq!(PageRequest::new(1, 8).skip(), 0);
        assert_eq!(PageRequest::new(2, 3).skip(), 3);
        assert_eq!(PageRequest::new(5, 10).skip(), 40);
        assert_eq!(PageRequest::new(0, 0), PageRequest::new(1, 1));
        assert_eq!(PageRequest::default(), PageRequest::new(1, 8));
    }

    #[test]
    fn test_calculate_total_pages() {
        assert_eq!(calculate_total_pages(0, 8), 0);
        assert_eq!(calculate_total_pages(1, 8), 1);
        assert_eq!(calculate_total_pages(8, 8), 1);
        assert_eq!(calculate_total_pages(9, 8), 2);
        assert_eq!(calculate_total_pages(10, 3), 4);
    }

    #[test]
    fn test_pagination_metadata() {
        let pagination = Pagination::new(10, PageRequest::new(2, 3));
        assert_eq!(
            pagination,
            Pagination {
                total: 10,
                limit: 3,
                pages: 4,
                page: 2,
                skip: 3
            }
        );
    }

    #[test]
    fn test_pagination_serializes_flat() {
        let json = serde_json::to_value(Pagination::new(5, PageRequest::new(1, 2))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "total": 5, "limit": 2, "pages": 3, "page": 1, "skip": 0 })
        );
    }

    #[test]
    fn test_list_page_parts() {
        let unpaged = ListPage::Unpaged(vec![1, 2, 3]);
        assert!(unpaged.pagination().is_none());
        assert_eq!(unpaged.clone().map(|n| n * 2).records(), &[2, 4, 6]);

        let (records, pagination) = unpaged.into_parts();
        assert_eq!(records.len(), 3);
        assert!(pagination.is_none());
    }
}
