//! HTTP handlers.

pub mod events;
pub mod health;
pub mod jobs;
pub mod relationships;

use serde::Serialize;
use utoipa::ToSchema;

// =============================================================================
// STANDARD RESPONSE TYPES
// =============================================================================

/// Pagination metadata for list responses.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PaginationMeta {
    /// Items matching the query across all pages.
    pub total: i64,
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(total: i64, page: u32, per_page: u32) -> Self {
        let per_page_i = i64::from(per_page.max(1));
        let total_pages = (total + per_page_i - 1) / per_page_i;
        Self {
            total,
            page,
            per_page,
            total_pages,
            has_next: i64::from(page) < total_pages,
            has_prev: page > 1,
        }
    }
}

/// List response wrapper with pagination metadata.
///
/// ```json
/// {
///   "data": [...],
///   "pagination": {"total": 42, "page": 1, "per_page": 20, "total_pages": 3, "has_next": true, "has_prev": false}
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T: Serialize> ListResponse<T> {
    pub fn new(data: Vec<T>, total: i64, page: u32, per_page: u32) -> Self {
        Self {
            data,
            pagination: PaginationMeta::new(total, page, per_page),
        }
    }
}
