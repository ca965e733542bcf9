//! Query string parameters shared by the list and export endpoints.
//!
//! Every parameter is collected as a list so that repeated keys are not an error. Apart from
//! `terminal_id`, only the first value of a parameter is used.

use axum_extra::extract::QueryRejection;
use serde::Deserialize;

use crate::Error;

use super::filter::{FilterBuilder, TransactionFilter};

/// The optional filter parameters of a transaction query.
///
/// `terminal_id` may be repeated, e.g. `?terminal_id=3506&terminal_id=3508`.
#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    /// A transaction ID.
    #[serde(default)]
    pub id: Vec<String>,
    /// Another name for `id`, used when `id` is absent or empty.
    #[serde(default)]
    pub transaction_id: Vec<String>,
    /// Any number of terminal IDs.
    #[serde(default)]
    pub terminal_id: Vec<String>,
    /// "accepted" or "declined".
    #[serde(default)]
    pub status: Vec<String>,
    /// "cash" or "card".
    #[serde(default)]
    pub payment_type: Vec<String>,
    /// The start of the post date range.
    #[serde(default)]
    pub date_post_from: Vec<String>,
    /// The end of the post date range, required with `date_post_from`.
    #[serde(default)]
    pub date_post_to: Vec<String>,
    /// Text that the payment narrative must contain.
    #[serde(default)]
    pub payment_narrative: Vec<String>,
}

impl FilterParams {
    /// Validate the parameters and convert them into store filters.
    ///
    /// # Errors
    /// Returns [Error::InvalidParameter] for the first invalid parameter.
    pub fn to_filters(&self) -> Result<Vec<TransactionFilter>, Error> {
        let mut builder = FilterBuilder::new();

        let id = match first(&self.id) {
            "" => first(&self.transaction_id),
            id => id,
        };

        builder.add_transaction_id(id)?;
        builder.add_terminal_ids(&self.terminal_id)?;
        builder.add_status(first(&self.status))?;
        builder.add_payment_type(first(&self.payment_type))?;
        builder.add_date_post_range(first(&self.date_post_from), first(&self.date_post_to))?;
        builder.add_payment_narrative(first(&self.payment_narrative))?;

        Ok(builder.filters())
    }
}

/// The page parameter of the JSON list endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    /// The page number, starting from 1. Kept as text so invalid values get a clear error.
    #[serde(default)]
    pub page: Vec<String>,
}

impl PageParams {
    /// The first `page` value, if there is one. `?page=` gives an empty string.
    pub fn page(&self) -> Option<&str> {
        self.page.first().map(String::as_str)
    }
}

/// Turn a query string that could not be read into a client error.
pub fn query_rejection_error(rejection: QueryRejection) -> Error {
    Error::InvalidParameter(rejection.body_text())
}

fn first(values: &[String]) -> &str {
    values.first().map(String::as_str).unwrap_or_default()
}
