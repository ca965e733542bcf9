//! Stores transactions in SQLite and queries them with filters.

use std::sync::{Arc, Mutex};

use rusqlite::{Connection, params, params_from_iter, types::Value};

use crate::Error;

use super::{
    core::{TRANSACTION_COLUMNS, Transaction, format_timestamp, map_transaction_row},
    filter::TransactionFilter,
};

/// Creates and queries transactions.
pub trait TransactionStore {
    /// Insert a single transaction.
    ///
    /// # Errors
    /// Returns [Error::SqlError] if the ID is already taken, a value breaks a table constraint,
    /// or there is some other SQL error.
    fn create(&self, transaction: &Transaction) -> Result<(), Error>;

    /// Insert `transactions` as a unit. If any insert fails, none of them are kept.
    ///
    /// # Errors
    /// Returns [Error::SqlError] for the first transaction that could not be inserted.
    fn create_batch(&self, transactions: &[Transaction]) -> Result<(), Error>;

    /// Get page `page` (starting from 1) of the transactions matching every filter in `filters`,
    /// ordered by ID.
    ///
    /// If `page` or `page_size` is zero, every matching transaction is returned.
    ///
    /// # Errors
    /// Returns [Error::SqlError] if there is a SQL error.
    fn filter(
        &self,
        filters: &[TransactionFilter],
        page: u64,
        page_size: u64,
    ) -> Result<Vec<Transaction>, Error>;

    /// Call `visit` with each transaction matching every filter in `filters`, in ID order.
    ///
    /// Rows are read from the database one at a time as `visit` consumes them.
    ///
    /// # Errors
    /// Stops at and returns the first error from `visit` or the database.
    fn for_each<F>(&self, filters: &[TransactionFilter], visit: F) -> Result<(), Error>
    where
        F: FnMut(Transaction) -> Result<(), Error>;
}

impl TransactionStore for Connection {
    fn create(&self, transaction: &Transaction) -> Result<(), Error> {
        let mut statement = self.prepare_cached(&format!(
            "INSERT INTO \"transaction\" ({TRANSACTION_COLUMNS}) VALUES \
            (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, \
            ?19, ?20, ?21)"
        ))?;

        statement.execute(params![
            to_sql_integer(transaction.id)?,
            to_sql_integer(transaction.request_id)?,
            to_sql_integer(transaction.terminal_id)?,
            transaction.partner_object_id,
            transaction.amount_total,
            transaction.amount_original,
            transaction.commission_ps,
            transaction.commission_client,
            transaction.commission_provider,
            format_timestamp(&transaction.date_input),
            format_timestamp(&transaction.date_post),
            transaction.status,
            transaction.payment_type,
            transaction.payment_number,
            to_sql_integer(transaction.service_id)?,
            transaction.service,
            to_sql_integer(transaction.payee_id)?,
            transaction.payee_name,
            transaction.payee_bank_mfo,
            transaction.payee_bank_account,
            transaction.payment_narrative,
        ])?;

        Ok(())
    }

    fn create_batch(&self, transactions: &[Transaction]) -> Result<(), Error> {
        // A savepoint rather than a transaction so batches can nest inside an upload's
        // transaction.
        self.execute_batch("SAVEPOINT create_batch")?;

        let result = transactions
            .iter()
            .try_for_each(|transaction| self.create(transaction));

        match result {
            Ok(()) => {
                self.execute_batch("RELEASE create_batch")?;
                Ok(())
            }
            Err(error) => {
                // RAISE(ROLLBACK) or a full disk can end the enclosing transaction and the
                // savepoint with it.
                if let Err(rollback_error) =
                    self.execute_batch("ROLLBACK TO create_batch; RELEASE create_batch")
                {
                    tracing::error!(
                        "Could not roll back batch after \"{error}\": {rollback_error}"
                    );
                }

                Err(error)
            }
        }
    }

    fn filter(
        &self,
        filters: &[TransactionFilter],
        page: u64,
        page_size: u64,
    ) -> Result<Vec<Transaction>, Error> {
        let (mut query, query_parameters) = build_select_query(filters, None);

        if page > 0 && page_size > 0 {
            let limit = page_size.min(i64::MAX as u64);
            let offset = (page - 1).saturating_mul(page_size).min(i64::MAX as u64);
            query.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
        }

        self.prepare(&query)?
            .query_map(params_from_iter(query_parameters.iter()), map_transaction_row)?
            .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
            .collect()
    }

    fn for_each<F>(&self, filters: &[TransactionFilter], mut visit: F) -> Result<(), Error>
    where
        F: FnMut(Transaction) -> Result<(), Error>,
    {
        let (query, query_parameters) = build_select_query(filters, None);

        let mut statement = self.prepare(&query)?;
        let mut rows = statement.query(params_from_iter(query_parameters.iter()))?;

        while let Some(row) = rows.next()? {
            visit(map_transaction_row(row)?)?;
        }

        Ok(())
    }
}

/// SQLite integers are signed 64-bit values.
fn to_sql_integer(value: u64) -> Result<i64, Error> {
    i64::try_from(value)
        .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)).into())
}

/// Get at most `limit` transactions matching `filters` with an ID greater than `after_id`.
fn select_chunk(
    connection: &Connection,
    filters: &[TransactionFilter],
    after_id: Option<u64>,
    limit: u64,
) -> Result<Vec<Transaction>, Error> {
    let (mut query, query_parameters) = build_select_query(filters, after_id);
    query.push_str(&format!(" LIMIT {}", limit.min(i64::MAX as u64)));

    connection
        .prepare_cached(&query)?
        .query_map(params_from_iter(query_parameters.iter()), map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
        .collect()
}

/// Build the select statement for `filters` and the values for its numbered parameters.
///
/// If `after_id` is given, only rows with a greater ID are selected.
fn build_select_query(
    filters: &[TransactionFilter],
    after_id: Option<u64>,
) -> (String, Vec<Value>) {
    let mut where_clause_parts = vec![];
    let mut query_parameters = vec![];

    if let Some(after_id) = after_id {
        query_parameters.push(unsigned_value(after_id));
        where_clause_parts.push(format!("id > ?{}", query_parameters.len()));
    }

    for filter in filters {
        match filter {
            TransactionFilter::TransactionId(id) => {
                query_parameters.push(unsigned_value(*id));
                where_clause_parts.push(format!("id = ?{}", query_parameters.len()));
            }
            TransactionFilter::TerminalIds(terminal_ids) => {
                let placeholders = terminal_ids
                    .iter()
                    .map(|terminal_id| {
                        query_parameters.push(unsigned_value(*terminal_id));
                        format!("?{}", query_parameters.len())
                    })
                    .collect::<Vec<_>>();
                where_clause_parts.push(format!("terminal_id IN ({})", placeholders.join(", ")));
            }
            TransactionFilter::Status(status) => {
                query_parameters.push(Value::Text(status.as_str().to_owned()));
                where_clause_parts.push(format!("status = ?{}", query_parameters.len()));
            }
            TransactionFilter::PaymentType(payment_type) => {
                query_parameters.push(Value::Text(payment_type.as_str().to_owned()));
                where_clause_parts.push(format!("payment_type = ?{}", query_parameters.len()));
            }
            TransactionFilter::DatePostRange { from, to } => {
                where_clause_parts.push(format!(
                    "date_post BETWEEN ?{} AND ?{}",
                    query_parameters.len() + 1,
                    query_parameters.len() + 2,
                ));
                query_parameters.push(Value::Text(format_timestamp(from)));
                query_parameters.push(Value::Text(format_timestamp(to)));
            }
            TransactionFilter::PaymentNarrative(text) => {
                query_parameters.push(Value::Text(text.clone()));
                where_clause_parts.push(format!(
                    "instr(payment_narrative, ?{}) > 0",
                    query_parameters.len()
                ));
            }
        }
    }

    let mut query = format!("SELECT {TRANSACTION_COLUMNS} FROM \"transaction\"");

    if !where_clause_parts.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&where_clause_parts.join(" AND "));
    }

    query.push_str(" ORDER BY id ASC");

    (query, query_parameters)
}

/// SQLite integers are signed, so IDs past [i64::MAX] are compared as reals that no stored
/// integer equals.
fn unsigned_value(value: u64) -> Value {
    i64::try_from(value)
        .map(Value::Integer)
        .unwrap_or(Value::Real(value as f64))
}

/// The number of rows [SQLiteTransactionStore::for_each] reads each time it takes the lock.
const VISIT_CHUNK_SIZE: u64 = 256;

/// Creates and queries transactions in a SQLite database shared by the whole server.
///
/// Every method blocks while another request holds the connection, so call them from
/// [tokio::task::spawn_blocking] in async code.
#[derive(Debug, Clone)]
pub struct SQLiteTransactionStore {
    connection: Arc<Mutex<Connection>>,
}

impl SQLiteTransactionStore {
    /// Create a store that uses `connection`.
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    /// Run `body` inside one database transaction.
    ///
    /// The transaction is committed if `body` returns `Ok` and rolled back if it returns an
    /// error. The database is locked for other requests until `body` returns.
    ///
    /// # Errors
    /// Returns the error from `body`, or [Error::SqlError] if the transaction could not be
    /// started or committed.
    pub fn use_transaction<T, F>(&self, body: F) -> Result<T, Error>
    where
        F: FnOnce(&Connection) -> Result<T, Error>,
    {
        let mut connection = self.lock()?;
        let transaction = connection.transaction()?;

        // Dropping the transaction without committing rolls it back.
        let value = body(&transaction)?;
        transaction.commit()?;

        Ok(value)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, Error> {
        self.connection.lock().map_err(|_| Error::DatabaseLockError)
    }
}

impl TransactionStore for SQLiteTransactionStore {
    fn create(&self, transaction: &Transaction) -> Result<(), Error> {
        self.lock()?.create(transaction)
    }

    fn create_batch(&self, transactions: &[Transaction]) -> Result<(), Error> {
        self.lock()?.create_batch(transactions)
    }

    fn filter(
        &self,
        filters: &[TransactionFilter],
        page: u64,
        page_size: u64,
    ) -> Result<Vec<Transaction>, Error> {
        self.lock()?.filter(filters, page, page_size)
    }

    /// Unlike the [Connection] version, rows are read in chunks ordered by ID and the lock is
    /// released while `visit` runs. A visitor that waits on a slow client does not hold up other
    /// requests, but rows inserted with a higher ID during the visit are included.
    fn for_each<F>(&self, filters: &[TransactionFilter], mut visit: F) -> Result<(), Error>
    where
        F: FnMut(Transaction) -> Result<(), Error>,
    {
        let mut last_id = None;

        loop {
            let chunk = {
                let connection = self.lock()?;
                select_chunk(&connection, filters, last_id, VISIT_CHUNK_SIZE)?
            };

            let is_last_chunk = (chunk.len() as u64) < VISIT_CHUNK_SIZE;
            last_id = chunk.last().map(|transaction| transaction.id).or(last_id);

            for transaction in chunk {
                visit(transaction)?;
            }

            if is_last_chunk {
                return Ok(());
            }
        }
    }
}
