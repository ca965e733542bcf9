//! The endpoint that streams matching transactions as a CSV file.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::{Query, QueryRejection};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::ReceiverStream;

use crate::{Error, app_state::TransactionsState};

use super::{
    csv::{CSV_HEADER, encode_row},
    filter::TransactionFilter,
    query::{FilterParams, query_rejection_error},
    store::{SQLiteTransactionStore, TransactionStore},
};

/// The number of encoded rows buffered ahead of the client.
const ROW_BUFFER_SIZE: usize = 64;

/// Stream every transaction matching the filters in the query string as CSV, header first.
///
/// Filters are validated before anything is sent, so an invalid filter gets a 400 response.
/// Once streaming has started, a storage error ends the response early. If the client
/// disconnects, the export stops at the next row.
///
/// # Errors
/// Returns [Error::InvalidParameter] if the query string cannot be read or a filter is invalid.
pub async fn export_transactions_endpoint(
    State(state): State<TransactionsState>,
    filter_params: Result<Query<FilterParams>, QueryRejection>,
) -> Result<Response, Error> {
    let Query(filter_params) = filter_params.map_err(query_rejection_error)?;
    let filters = filter_params.to_filters()?;

    let (rows, _) = stream_rows(state.store, filters);

    let mut response = Body::from_stream(ReceiverStream::new(rows)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/csv"));
    headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

    Ok(response)
}

/// How an export stream ended.
#[derive(Debug, PartialEq)]
enum ExportEnd {
    /// Every matching row was sent.
    Complete { row_count: usize },
    /// The receiver was dropped after `row_count` rows.
    Disconnected { row_count: usize },
    /// A storage error was sent in place of the remaining rows.
    Failed,
}

/// Encode the header and every transaction matching `filters` on a blocking task.
///
/// Each line ends with a newline. The returned handle resolves once the task stops sending.
fn stream_rows(
    store: SQLiteTransactionStore,
    filters: Vec<TransactionFilter>,
) -> (mpsc::Receiver<Result<String, Error>>, JoinHandle<ExportEnd>) {
    let (sender, receiver) = mpsc::channel(ROW_BUFFER_SIZE);

    let task = tokio::task::spawn_blocking(move || {
        if sender.blocking_send(Ok(format!("{CSV_HEADER}\n"))).is_err() {
            return ExportEnd::Disconnected { row_count: 0 };
        }

        let mut row_count = 0;
        let result = store.for_each(&filters, |transaction| {
            sender
                .blocking_send(Ok(format!("{}\n", encode_row(&transaction))))
                .map_err(|_| Error::StreamClosed)?;
            row_count += 1;
            Ok(())
        });

        match result {
            Ok(()) => {
                tracing::debug!("Exported {row_count} transactions");
                ExportEnd::Complete { row_count }
            }
            Err(Error::StreamClosed) => {
                tracing::debug!("Client closed the export after {row_count} transactions");
                ExportEnd::Disconnected { row_count }
            }
            Err(error) => {
                tracing::error!("Could not export transactions: {error}");
                // The status code has already been sent, failing the stream aborts the body.
                let _ = sender.blocking_send(Err(error));
                ExportEnd::Failed
            }
        }
    });

    (receiver, task)
}
