//! The endpoint that lists transactions as pages of JSON.

use axum::{Json, extract::State};
use axum_extra::extract::{Query, QueryRejection};

use crate::{
    Error,
    app_state::TransactionsState,
    pagination::{Page, parse_page},
};

use super::{
    core::Transaction,
    query::{FilterParams, PageParams, query_rejection_error},
    store::TransactionStore,
};

/// Get one page of the transactions matching the filters in the query string.
///
/// # Errors
/// Returns [Error::InvalidParameter] if the query string cannot be read or the page number or a
/// filter is invalid, or a storage error if the database could not be queried.
pub async fn list_transactions_endpoint(
    State(state): State<TransactionsState>,
    page_params: Result<Query<PageParams>, QueryRejection>,
    filter_params: Result<Query<FilterParams>, QueryRejection>,
) -> Result<Json<Page<Transaction>>, Error> {
    let Query(page_params) = page_params.map_err(query_rejection_error)?;
    let Query(filter_params) = filter_params.map_err(query_rejection_error)?;

    let page = parse_page(page_params.page())?;
    let filters = filter_params.to_filters()?;
    let page_size = state.pagination_config.page_size;
    tracing::debug!("Listing page {page} of transactions with filters {filters:?}");

    let store = state.store.clone();
    let transactions = tokio::task::spawn_blocking(move || store.filter(&filters, page, page_size))
        .await
        .map_err(|error| Error::TaskFailed(error.to_string()))??;

    Ok(Json(Page::new(transactions, page, page_size)))
}
