//! The API endpoints URIs.

/// The route for listing transactions as JSON, one page at a time.
pub const TRANSACTIONS_JSON: &str = "/api/transactions/json";
/// The route for exporting every matching transaction as CSV.
pub const TRANSACTIONS_CSV: &str = "/api/transactions/csv";
/// The route for uploading a CSV file of transactions.
pub const TRANSACTIONS_UPLOAD: &str = "/api/transactions/upload";

#[cfg(test)]
mod tests {
    use axum::http::Uri;

    use crate::endpoints;

    fn assert_endpoint_is_valid_uri(uri: &str) {
        assert!(uri.parse::<Uri>().is_ok());
    }

    #[test]
    fn endpoints_are_valid_uris() {
        assert_endpoint_is_valid_uri(endpoints::TRANSACTIONS_JSON);
        assert_endpoint_is_valid_uri(endpoints::TRANSACTIONS_CSV);
        assert_endpoint_is_valid_uri(endpoints::TRANSACTIONS_UPLOAD);
    }
}
