//! This modules defines the common functionality for paging data.

use serde::Serialize;

use crate::Error;

/// The config for pagination
#[derive(Debug, Clone)]
pub struct PaginationConfig {
    /// The maximum number of items returned per page.
    pub page_size: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self { page_size: 30 }
    }
}

/// One page of results along with the numbers of the neighbouring pages.
#[derive(Debug, PartialEq, Serialize)]
pub struct Page<T> {
    /// The number of results on this page.
    pub count: usize,
    /// The next page, if this page was full.
    pub next_page: Option<u64>,
    /// The previous page, if this is not the first page.
    pub previous_page: Option<u64>,
    /// The results on this page.
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Wrap `results`, the contents of page `page` fetched with `page_size`.
    ///
    /// A full page is assumed to have a next page. When the last page is exactly full, this
    /// points to a page that turns out to be empty.
    pub fn new(results: Vec<T>, page: u64, page_size: u64) -> Self {
        let count = results.len();
        let is_full = page_size > 0 && count as u64 == page_size;

        Self {
            count,
            next_page: if is_full { page.checked_add(1) } else { None },
            previous_page: page.checked_sub(1).filter(|previous| *previous > 0),
            results,
        }
    }
}

/// Parse the page number from a request, defaulting to the first page.
///
/// # Errors
/// Returns [Error::InvalidParameter] if `page` is given but is not a positive integer.
pub fn parse_page(page: Option<&str>) -> Result<u64, Error> {
    let Some(page) = page else {
        return Ok(1);
    };

    match page.parse::<u64>() {
        Ok(page) if page > 0 => Ok(page),
        _ => Err(Error::InvalidParameter(
            "the \"page\" parameter is required to be a positive integer".to_owned(),
        )),
    }
}
