//! Pagination for record listings (100 records per page)

pub const PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based page actually served
    pub page: i64,
    pub total_pages: i64,
    /// Rows to skip for this page
    pub offset: i64,
}

/// Clamp `requested_page` into `[1, total_pages]` and derive the offset
///
/// ```
/// use lombada_review::pagination::calculate_pagination;
///
/// let p = calculate_pagination(250, 99);
/// assert_eq!((p.page, p.total_pages, p.offset), (3, 3, 200));
/// ```
pub fn calculate_pagination(total_results: i64, requested_page: i64) -> Pagination {
    let total_pages = (total_results.max(0) + PAGE_SIZE - 1) / PAGE_SIZE;
    let page = requested_page.clamp(1, total_pages.max(1));

    Pagination {
        page,
        total_pages,
        offset: (page - 1) * PAGE_SIZE,
    }
}
