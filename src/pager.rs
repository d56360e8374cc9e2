use crate::table::DataFrame;
use serde::{Deserialize, Serialize};

/// Rows per page for paginated data views
pub const PAGE_SIZE: usize = 50;

/// CSS class attached to every rendered data table
pub const TABLE_CLASS: &str = "data-table";

/// Position of a rendered page within a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total_pages: usize,
    pub current_page: usize,
    pub page_size: usize,
    pub total_rows: usize,
}

/// Number of pages needed for `total_rows`; never less than one
pub fn total_pages(total_rows: usize, page_size: usize) -> usize {
    total_rows.div_ceil(page_size.max(1)).max(1)
}

/// Cut one page out of a dataset
///
/// The requested page is clamped into `[1, total_pages]`, so page 0 (or a
/// negative page) yields the first page and anything past the end yields
/// the last one.
pub fn page_slice(df: &DataFrame, page: i64, page_size: usize) -> (DataFrame, Pagination) {
    let page_size = page_size.max(1);
    let total_rows = df.shape().0;
    let total_pages = total_pages(total_rows, page_size);
    let current_page = page.clamp(1, total_pages as i64) as usize;

    let start = (current_page - 1) * page_size;
    (
        df.slice(start, start + page_size),
        Pagination {
            total_pages,
            current_page,
            page_size,
            total_rows,
        },
    )
}

/// Render one page of a dataset, clamped as in [`page_slice`]
///
/// # Returns
/// * The HTML table for the page and its [`Pagination`] block
pub fn make_page(df: &DataFrame, page: i64, page_size: usize) -> (String, Pagination) {
    let (rows, pagination) = page_slice(df, page, page_size);
    (rows.to_html(TABLE_CLASS, false), pagination)
}
