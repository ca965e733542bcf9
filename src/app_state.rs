//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use axum::extract::FromRef;
use rusqlite::Connection;

use crate::{
    Error, db::initialize, pagination::PaginationConfig, transaction::SQLiteTransactionStore,
};

/// The config that controls how uploaded files are read and stored.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// The number of rows decoded before they are written to the database together.
    pub batch_size: usize,
    /// The maximum size of an upload request body in bytes.
    pub max_upload_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: 1500,
            max_upload_size: 32 * 1024 * 1024,
        }
    }
}

/// The state of the REST server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The config that controls how to display pages of data.
    pub pagination_config: PaginationConfig,

    /// The config that controls how uploaded files are read and stored.
    pub upload_config: UploadConfig,

    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the transaction table if it does
    /// not exist yet.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(
        db_connection: Connection,
        pagination_config: PaginationConfig,
        upload_config: UploadConfig,
    ) -> Result<Self, Error> {
        initialize(&db_connection)?;

        Ok(Self {
            pagination_config,
            upload_config,
            db_connection: Arc::new(Mutex::new(db_connection)),
        })
    }
}

/// The state needed to list and export transactions.
#[derive(Debug, Clone)]
pub struct TransactionsState {
    /// The transaction store.
    pub store: SQLiteTransactionStore,
    /// The config that controls the size of each page.
    pub pagination_config: PaginationConfig,
}

impl FromRef<AppState> for TransactionsState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            store: SQLiteTransactionStore::new(state.db_connection.clone()),
            pagination_config: state.pagination_config.clone(),
        }
    }
}

/// The state needed to upload transactions.
#[derive(Debug, Clone)]
pub struct UploadState {
    /// The transaction store.
    pub store: SQLiteTransactionStore,
    /// The config that controls how uploaded files are stored.
    pub upload_config: UploadConfig,
}

impl FromRef<AppState> for UploadState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            store: SQLiteTransactionStore::new(state.db_connection.clone()),
            upload_config: state.upload_config.clone(),
        }
    }
}
