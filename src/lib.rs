//! A REST service for financial transaction records.
//!
//! Transactions are uploaded in bulk as CSV files, listed as pages of JSON with optional filters,
//! and exported as a CSV stream. They are stored in a single SQLite table.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod app_state;
mod db;
mod endpoints;
mod pagination;
mod routing;
mod transaction;

#[cfg(test)]
mod test_utils;

pub use app_state::{AppState, UploadConfig};
pub use db::initialize as initialize_db;
pub use pagination::PaginationConfig;
pub use routing::build_router;
pub use transaction::{
    CSV_HEADER, CsvError, FilterBuilder, PaymentType, SQLiteTransactionStore, Status,
    Transaction, TransactionFilter, TransactionStore, UnknownVariant, UploadSummary, decode_row,
    encode_row,
};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`. Open connections get `grace_period` to finish
/// before they are closed.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>, grace_period: Duration) {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!("failed to install terminate signal handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
        },
    }

    tracing::info!("Shutting down, waiting up to {grace_period:?} for open connections.");
    handle.graceful_shutdown(Some(grace_period));
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// A query parameter had an invalid value.
    ///
    /// The string describes which parameter was wrong and how.
    #[error("{0}")]
    InvalidParameter(String),

    /// A row in an uploaded file could not be decoded.
    ///
    /// `line` counts from 1 and includes the header.
    #[error("invalid file data on line {line}: {source}")]
    InvalidCsv {
        /// The line of the file containing the row.
        line: usize,
        /// Why the row was rejected.
        source: CsvError,
    },

    /// The request body could not be read as a multipart form.
    #[error("could not read multipart form: {0}")]
    MultipartError(String),

    /// The multipart form did not contain a part named "file".
    #[error("the upload requires a multipart form with a \"file\" field")]
    MissingFile,

    /// An unexpected error occurred with the underlying database.
    ///
    /// The error should only be logged for debugging on the server. The client only learns
    /// that an internal error occurred.
    #[error("an unexpected error occurred with the database: {0}")]
    SqlError(rusqlite::Error),

    /// The lock for the database connection was poisoned by a thread that panicked.
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// The upload stopped before the end of the file, so its rows were rolled back.
    #[error("the upload was aborted before it finished")]
    UploadAborted,

    /// The client stopped reading the response stream.
    #[error("the response stream was closed by the client")]
    StreamClosed,

    /// A background task panicked or was cancelled.
    #[error("a background task failed: {0}")]
    TaskFailed(String),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        tracing::error!("an unhandled SQL error occurred: {}", value);
        Error::SqlError(value)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code = match &self {
            Error::InvalidParameter(_)
            | Error::InvalidCsv { .. }
            | Error::MultipartError(_)
            | Error::MissingFile => StatusCode::BAD_REQUEST,
            // Any errors that are not handled above are not intended to be shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "message": "internal error" })),
                )
                    .into_response();
            }
        };

        (status_code, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use crate::{CsvError, Error};

    async fn body_json(error: Error) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn invalid_parameter_is_bad_request() {
        let (status, body) = body_json(Error::InvalidParameter("bad \"status\"".to_owned())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, serde_json::json!({ "message": "bad \"status\"" }));
    }

    #[tokio::test]
    async fn invalid_csv_names_line_and_cause() {
        let (status, body) = body_json(Error::InvalidCsv {
            line: 3,
            source: CsvError::FieldCount(4),
        })
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "invalid file data on line 3: invalid number of transaction fields: 21 required, 4 got"
        );
    }

    #[tokio::test]
    async fn storage_errors_hide_details() {
        let (status, body) = body_json(Error::SqlError(rusqlite::Error::InvalidQuery)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, serde_json::json!({ "message": "internal error" }));

        let (status, _) = body_json(Error::DatabaseLockError).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
