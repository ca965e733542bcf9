//! Transaction records and the endpoints for listing, exporting and uploading them.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model and its database mapping
//! - The CSV codec for single rows
//! - Filters built from query parameters and the store that runs them
//! - The JSON list, CSV export and CSV upload endpoints

mod core;
mod csv;
mod export_endpoint;
mod filter;
mod list_endpoint;
mod query;
mod store;
mod upload_endpoint;

pub use core::{PaymentType, Status, Transaction, UnknownVariant, create_transaction_table};
pub use csv::{CSV_HEADER, CsvError, decode_row, encode_row};
pub use export_endpoint::export_transactions_endpoint;
pub use filter::{FilterBuilder, TransactionFilter};
pub use list_endpoint::list_transactions_endpoint;
pub use store::{SQLiteTransactionStore, TransactionStore};
pub use upload_endpoint::{UploadSummary, upload_transactions_endpoint};
