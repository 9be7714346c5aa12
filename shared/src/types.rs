//! Common types used across the platform

use serde::{Deserialize, Serialize};

/// Largest page a list endpoint will return
pub const MAX_PER_PAGE: u32 = 500;

/// Pagination parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    100
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl Pagination {
    /// Page size clamped to `1..=MAX_PER_PAGE`
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page.clamp(1, MAX_PER_PAGE))
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * self.limit()
    }

    pub fn meta(&self, total_items: u64) -> PaginationMeta {
        let per_page = self.per_page.clamp(1, MAX_PER_PAGE);
        let total_pages = total_items.div_ceil(u64::from(per_page));
        PaginationMeta {
            page: self.page.max(1),
            per_page,
            total_items,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        }
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_and_limit() {
        let p = Pagination { page: 3, per_page: 20 };
        assert_eq!(p.limit(), 20);
        assert_eq!(p.offset(), 40);

        let zero = Pagination { page: 0, per_page: 0 };
        assert_eq!(zero.limit(), 1);
        assert_eq!(zero.offset(), 0);
    }

    #[test]
    fn test_limit_is_capped() {
        let p = Pagination { page: 1, per_page: 10_000 };
        assert_eq!(p.limit(), i64::from(MAX_PER_PAGE));
    }

    #[test]
    fn test_meta_total_pages() {
        let p = Pagination { page: 1, per_page: 20 };
        assert_eq!(p.meta(41).total_pages, 3);
        assert_eq!(p.meta(0).total_pages, 0);
    }
}
