//! Request/response payloads for the HTTP API.

mod customer;
mod invoice;

pub use customer::CustomerRequest;
pub use invoice::{
    CalculateTotalsRequest, CalculationItemRequest, InvoiceItemRequest, InvoiceItemResponse,
    InvoiceRequest, InvoiceResponse, InvoiceSearchQuery, InvoiceSummary, InvoiceTotals,
    TestEmailRequest,
};
pub use service_core::response::ApiResponse;

use serde::{Deserialize, Serialize};

/// One page of search results plus the bookkeeping clients need to drive
/// pagination controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult<T> {
    pub data: Vec<T>,
    pub total_records: i64,
    pub page_number: i32,
    pub page_size: i32,
    pub total_pages: i64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl<T> PagedResult<T> {
    /// `page_size` must be positive; handlers clamp it before calling.
    pub fn new(data: Vec<T>, total_records: i64, page_number: i32, page_size: i32) -> Self {
        let total_pages = (total_records + page_size as i64 - 1) / page_size as i64;
        Self {
            data,
            total_records,
            page_number,
            page_size,
            total_pages,
            has_next_page: (page_number as i64) < total_pages,
            has_previous_page: page_number > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        let page = PagedResult::new(vec![0; 10], 25, 1, 10);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn exact_multiple_does_not_add_a_page() {
        let page = PagedResult::new(vec![0; 10], 30, 1, 10);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn empty_result_has_no_pages_or_neighbors() {
        let page = PagedResult::<i32>::new(Vec::new(), 0, 1, 10);
        assert_eq!(page.total_pages, 0);
        assert!(!page.has_next_page);
        assert!(!page.has_previous_page);
    }

    #[test]
    fn first_page_of_many_has_next_only() {
        let page = PagedResult::new(vec![0; 10], 25, 1, 10);
        assert!(page.has_next_page);
        assert!(!page.has_previous_page);
    }

    #[test]
    fn middle_page_has_both_neighbors() {
        let page = PagedResult::new(vec![0; 10], 25, 2, 10);
        assert!(page.has_next_page);
        assert!(page.has_previous_page);
    }

    #[test]
    fn last_page_has_previous_only() {
        let page = PagedResult::new(vec![0; 5], 25, 3, 10);
        assert!(!page.has_next_page);
        assert!(page.has_previous_page);
    }
}
