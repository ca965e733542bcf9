//! Defines the core data model for transactions and how it maps to and from the database.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::{PrimitiveDateTime, format_description::BorrowedFormatItem, macros::format_description};

// ============================================================================
// MODELS
// ============================================================================

/// A financial transaction reported by a payment terminal.
///
/// Records are created from uploaded CSV rows or read back from the database,
/// and are never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The unique ID of the transaction.
    pub id: u64,
    /// The ID of the request that produced the transaction.
    pub request_id: u64,
    /// The ID of the terminal the transaction was made on.
    pub terminal_id: u64,
    /// The ID of the partner object.
    pub partner_object_id: u16,
    /// The total amount paid.
    pub amount_total: f32,
    /// The amount before commissions.
    pub amount_original: f32,
    /// The payment system's commission.
    pub commission_ps: f32,
    /// The client's commission.
    pub commission_client: f32,
    /// The provider's commission.
    pub commission_provider: f32,
    /// When the transaction was entered.
    #[serde(with = "datetime_format")]
    pub date_input: PrimitiveDateTime,
    /// When the transaction was posted.
    #[serde(with = "datetime_format")]
    pub date_post: PrimitiveDateTime,
    /// Whether the transaction went through.
    pub status: Status,
    /// How the transaction was paid for.
    pub payment_type: PaymentType,
    /// The payment number, two capital letters followed by eight digits.
    pub payment_number: String,
    /// The ID of the service that was paid for.
    pub service_id: u64,
    /// The name of the service that was paid for.
    pub service: String,
    /// The ID of the payee.
    pub payee_id: u64,
    /// The name of the payee.
    pub payee_name: String,
    /// The MFO code of the payee's bank.
    pub payee_bank_mfo: u32,
    /// The payee's account, two capital letters followed by fifteen digits.
    pub payee_bank_account: String,
    /// Free text describing the purpose of the payment.
    pub payment_narrative: String,
}

/// Raised when text does not name a variant of [Status] or [PaymentType].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected}, received \"{received}\"")]
pub struct UnknownVariant {
    /// The accepted values, ready for display.
    pub expected: &'static str,
    /// The text that was rejected.
    pub received: String,
}

/// The outcome of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The payment went through.
    Accepted,
    /// The payment was refused.
    Declined,
}

impl Status {
    /// The accepted text values, formatted for error messages.
    pub const EXPECTED: &'static str = "\"accepted\" or \"declined\"";

    /// The text value used on the wire and in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }
}

impl FromStr for Status {
    type Err = UnknownVariant;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            other => Err(UnknownVariant {
                expected: Self::EXPECTED,
                received: other.to_owned(),
            }),
        }
    }
}

/// How a transaction was paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    /// Paid in cash.
    Cash,
    /// Paid by card.
    Card,
}

impl PaymentType {
    /// The accepted text values, formatted for error messages.
    pub const EXPECTED: &'static str = "\"cash\" or \"card\"";

    /// The text value used on the wire and in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Card => "card",
        }
    }
}

impl FromStr for PaymentType {
    type Err = UnknownVariant;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "cash" => Ok(Self::Cash),
            "card" => Ok(Self::Card),
            other => Err(UnknownVariant {
                expected: Self::EXPECTED,
                received: other.to_owned(),
            }),
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}

impl ToSql for PaymentType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PaymentType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}

// ============================================================================
// TIMESTAMPS
// ============================================================================

/// The layout used to read timestamps, e.g. "2022-08-12 14:25:27".
///
/// The hour may be written with a single digit ("2022-08-17 9:53:43").
const TIMESTAMP_INPUT_FORMAT: &[BorrowedFormatItem] =
    format_description!("[year]-[month]-[day] [hour padding:none]:[minute]:[second]");

/// Parse a timestamp written as `YYYY-MM-DD HH:MM:SS`.
pub fn parse_timestamp(text: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
    PrimitiveDateTime::parse(text, TIMESTAMP_INPUT_FORMAT)
}

/// Format a timestamp as `YYYY-MM-DD HH:MM:SS` with every component zero padded.
pub fn format_timestamp(timestamp: &PrimitiveDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        timestamp.year(),
        u8::from(timestamp.month()),
        timestamp.day(),
        timestamp.hour(),
        timestamp.minute(),
        timestamp.second()
    )
}

mod datetime_format {
    //! Serializes a [time::PrimitiveDateTime] with the fixed `YYYY-MM-DD HH:MM:SS` layout
    //! instead of the ISO 8601 default.
    use serde::{Deserialize, Deserializer, Serializer};
    use time::PrimitiveDateTime;

    pub fn serialize<S>(dt: &PrimitiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_timestamp(dt))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<PrimitiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_timestamp(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// DATABASE
// ============================================================================

/// Create the transaction table if it does not exist yet.
///
/// SQLite stores integers as signed 64-bit values, so IDs above [i64::MAX] cannot be stored.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY CHECK (id >= 0),
                request_id INTEGER NOT NULL CHECK (request_id >= 0),
                terminal_id INTEGER NOT NULL CHECK (terminal_id >= 0),
                partner_object_id INTEGER NOT NULL
                    CHECK (partner_object_id BETWEEN 0 AND 65535),
                amount_total REAL NOT NULL,
                amount_original REAL NOT NULL,
                commission_ps REAL NOT NULL,
                commission_client REAL NOT NULL,
                commission_provider REAL NOT NULL,
                date_input TEXT NOT NULL,
                date_post TEXT NOT NULL,
                status TEXT NOT NULL CHECK (status IN ('accepted', 'declined')),
                payment_type TEXT NOT NULL CHECK (payment_type IN ('cash', 'card')),
                payment_number TEXT NOT NULL
                    CHECK (payment_number GLOB '[A-Z][A-Z][0-9][0-9][0-9][0-9][0-9][0-9][0-9][0-9]'),
                service_id INTEGER NOT NULL CHECK (service_id >= 0),
                service TEXT NOT NULL,
                payee_id INTEGER NOT NULL CHECK (payee_id >= 0),
                payee_name TEXT NOT NULL,
                payee_bank_mfo INTEGER NOT NULL CHECK (payee_bank_mfo BETWEEN 0 AND 4294967295),
                payee_bank_account TEXT NOT NULL
                    CHECK (length(payee_bank_account) = 17
                        AND payee_bank_account GLOB '[A-Z][A-Z][0-9]*'
                        AND substr(payee_bank_account, 3) NOT GLOB '*[^0-9]*'),
                payment_narrative TEXT NOT NULL
                )",
        (),
    )?;

    // Used by the terminal and date range filters.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_terminal ON \"transaction\"(terminal_id);",
        (),
    )?;
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_date_post ON \"transaction\"(date_post);",
        (),
    )?;

    Ok(())
}

/// The columns of the transaction table in the order [map_transaction_row] reads them.
pub const TRANSACTION_COLUMNS: &str = "id, request_id, terminal_id, partner_object_id, \
    amount_total, amount_original, commission_ps, commission_client, commission_provider, \
    date_input, date_post, status, payment_type, payment_number, service_id, service, \
    payee_id, payee_name, payee_bank_mfo, payee_bank_account, payment_narrative";

/// Map a database row selecting [TRANSACTION_COLUMNS] to a [Transaction].
///
/// # Errors
/// Returns an error if a column cannot be converted into its Rust type, including a stored
/// timestamp that does not follow the fixed layout.
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    Ok(Transaction {
        id: get_unsigned(row, 0)?,
        request_id: get_unsigned(row, 1)?,
        terminal_id: get_unsigned(row, 2)?,
        partner_object_id: row.get(3)?,
        amount_total: row.get(4)?,
        amount_original: row.get(5)?,
        commission_ps: row.get(6)?,
        commission_client: row.get(7)?,
        commission_provider: row.get(8)?,
        date_input: get_timestamp(row, 9)?,
        date_post: get_timestamp(row, 10)?,
        status: row.get(11)?,
        payment_type: row.get(12)?,
        payment_number: row.get(13)?,
        service_id: get_unsigned(row, 14)?,
        service: row.get(15)?,
        payee_id: get_unsigned(row, 16)?,
        payee_name: row.get(17)?,
        payee_bank_mfo: row.get(18)?,
        payee_bank_account: row.get(19)?,
        payment_narrative: row.get(20)?,
    })
}

/// SQLite integers are signed, the unsigned 64-bit columns are read through [i64].
fn get_unsigned(row: &Row, index: usize) -> Result<u64, rusqlite::Error> {
    let value: i64 = row.get(index)?;

    u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(index, value))
}

fn get_timestamp(row: &Row, index: usize) -> Result<PrimitiveDateTime, rusqlite::Error> {
    let text: String = row.get(index)?;

    parse_timestamp(&text).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
    })
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use crate::test_utils::sample_transactions;

    use super::{PaymentType, Status, format_timestamp, parse_timestamp};

    #[test]
    fn parses_single_digit_hour() {
        let got = parse_timestamp("2022-08-17 9:53:43").unwrap();

        assert_eq!(got, datetime!(2022-08-17 9:53:43));
    }

    #[test]
    fn formats_with_zero_padding() {
        let got = format_timestamp(&datetime!(2022-08-17 9:03:04));

        assert_eq!(got, "2022-08-17 09:03:04");
    }

    #[test]
    fn rejects_timestamp_with_timezone() {
        assert!(parse_timestamp("2022-08-12 14:25:27+02:00").is_err());
        assert!(parse_timestamp("2022-08-12T14:25:27").is_err());
        assert!(parse_timestamp("2022-8-12 14:25:27").is_err());
    }

    #[test]
    fn enum_text_values_are_case_sensitive() {
        assert_eq!("accepted".parse::<Status>(), Ok(Status::Accepted));
        assert_eq!("card".parse::<PaymentType>(), Ok(PaymentType::Card));

        let error = "Accepted".parse::<Status>().unwrap_err();
        assert_eq!(
            error.to_string(),
            "expected \"accepted\" or \"declined\", received \"Accepted\""
        );
        assert!("CASH".parse::<PaymentType>().is_err());
    }

    #[test]
    fn serializes_json_with_snake_case_names_and_fixed_layout() {
        let transaction = &sample_transactions()[0];

        let json = serde_json::to_value(transaction).unwrap();

        assert_eq!(json["id"], 1);
        assert_eq!(json["terminal_id"], 3506);
        assert_eq!(json["date_post"], "2022-08-12 14:25:27");
        assert_eq!(json["status"], "accepted");
        assert_eq!(json["payment_type"], "cash");
        assert_eq!(json["payee_bank_account"], "UA713451373919523");
    }

    #[test]
    fn json_round_trip() {
        let transaction = sample_transactions()[2].clone();

        let json = serde_json::to_string(&transaction).unwrap();
        let got: super::Transaction = serde_json::from_str(&json).unwrap();

        assert_eq!(got, transaction);
    }
}
