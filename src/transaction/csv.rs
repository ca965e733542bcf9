//! Converts single transactions to and from rows of comma separated values.
//!
//! Fields are never quoted or escaped. Free text containing commas will not survive a round
//! trip, except in the last column: decoding splits a row into at most [FIELD_COUNT] fields,
//! so any commas past the twentieth are kept verbatim in the payment narrative.

use std::{any::type_name, str::FromStr};

use super::core::{PaymentType, Status, Transaction, UnknownVariant, format_timestamp};

/// The number of columns in a transaction row.
pub const FIELD_COUNT: usize = 21;

/// The header row written before exported transactions.
pub const CSV_HEADER: &str = "TransactionId,RequestId,TerminalId,PartnerObjectId,AmountTotal,\
    AmountOriginal,CommissionPS,CommissionClient,CommissionProvider,DateInput,DatePost,Status,\
    PaymentType,PaymentNumber,ServiceId,Service,PayeeId,PayeeName,PayeeBankMfo,\
    PayeeBankAccount,PaymentNarrative";

/// The ways a CSV row can fail to decode into a [Transaction].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CsvError {
    /// The row did not split into exactly [FIELD_COUNT] fields.
    #[error("invalid number of transaction fields: 21 required, {0} got")]
    FieldCount(usize),

    /// An unsigned column started with a sign.
    #[error("{column} must be an unsigned integer without a sign, got \"{value}\"")]
    SignedInteger {
        /// The column that failed.
        column: &'static str,
        /// The rejected text.
        value: String,
    },

    /// An unsigned column was not a number or did not fit its integer type.
    #[error("{column} must be an unsigned integer that fits in {kind}, got \"{value}\"")]
    Integer {
        /// The column that failed.
        column: &'static str,
        /// The rejected text.
        value: String,
        /// The integer type of the column.
        kind: &'static str,
    },

    /// An amount was not a finite number within single precision range.
    #[error("{column} must be a finite number within single precision range, got \"{value}\"")]
    Float {
        /// The column that failed.
        column: &'static str,
        /// The rejected text.
        value: String,
    },

    /// A timestamp did not follow the `YYYY-MM-DD HH:MM:SS` layout.
    #[error("{column} must use the layout YYYY-MM-DD HH:MM:SS, got \"{value}\"")]
    Timestamp {
        /// The column that failed.
        column: &'static str,
        /// The rejected text.
        value: String,
    },

    /// A status or payment type was not one of the known values.
    #[error("invalid {column}: {source}")]
    Variant {
        /// The column that failed.
        column: &'static str,
        /// Which values were expected and what was received.
        source: UnknownVariant,
    },

    /// A payment number or bank account did not match its pattern.
    #[error("{column} must match the pattern {pattern}, got \"{value}\"")]
    Pattern {
        /// The column that failed.
        column: &'static str,
        /// The rejected text.
        value: String,
        /// The expected pattern.
        pattern: &'static str,
    },

    /// The row contained bytes that are not UTF-8.
    #[error("row is not valid UTF-8")]
    Encoding,
}

/// Format `transaction` as a CSV row without a trailing newline.
///
/// Amounts are written with exactly two decimal digits and timestamps with the fixed
/// `YYYY-MM-DD HH:MM:SS` layout.
pub fn encode_row(transaction: &Transaction) -> String {
    format!(
        "{},{},{},{},{:.2},{:.2},{:.2},{:.2},{:.2},{},{},{},{},{},{},{},{},{},{},{},{}",
        transaction.id,
        transaction.request_id,
        transaction.terminal_id,
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
        transaction.service_id,
        transaction.service,
        transaction.payee_id,
        transaction.payee_name,
        transaction.payee_bank_mfo,
        transaction.payee_bank_account,
        transaction.payment_narrative,
    )
}

/// Parse a CSV row into a [Transaction].
///
/// The row is split into at most [FIELD_COUNT] fields and each field is validated in column
/// order. The first invalid field stops decoding.
///
/// # Errors
/// Returns the [CsvError] describing the first field that failed.
pub fn decode_row(row: &str) -> Result<Transaction, CsvError> {
    let fields = row.splitn(FIELD_COUNT, ',').collect::<Vec<_>>();

    if fields.len() != FIELD_COUNT {
        return Err(CsvError::FieldCount(fields.len()));
    }

    Ok(Transaction {
        id: parse_unsigned("TransactionId", fields[0])?,
        request_id: parse_unsigned("RequestId", fields[1])?,
        terminal_id: parse_unsigned("TerminalId", fields[2])?,
        partner_object_id: parse_unsigned("PartnerObjectId", fields[3])?,
        amount_total: parse_amount("AmountTotal", fields[4])?,
        amount_original: parse_amount("AmountOriginal", fields[5])?,
        commission_ps: parse_amount("CommissionPS", fields[6])?,
        commission_client: parse_amount("CommissionClient", fields[7])?,
        commission_provider: parse_amount("CommissionProvider", fields[8])?,
        date_input: parse_timestamp("DateInput", fields[9])?,
        date_post: parse_timestamp("DatePost", fields[10])?,
        status: parse_variant::<Status>("Status", fields[11])?,
        payment_type: parse_variant::<PaymentType>("PaymentType", fields[12])?,
        payment_number: parse_pattern("PaymentNumber", fields[13], 2, 8)?,
        service_id: parse_unsigned("ServiceId", fields[14])?,
        service: fields[15].to_owned(),
        payee_id: parse_unsigned("PayeeId", fields[16])?,
        payee_name: fields[17].to_owned(),
        payee_bank_mfo: parse_unsigned("PayeeBankMfo", fields[18])?,
        payee_bank_account: parse_pattern("PayeeBankAccount", fields[19], 2, 15)?,
        payment_narrative: fields[20].to_owned(),
    })
}

fn parse_unsigned<T: FromStr>(column: &'static str, value: &str) -> Result<T, CsvError> {
    if value.starts_with(['-', '+']) {
        return Err(CsvError::SignedInteger {
            column,
            value: value.to_owned(),
        });
    }

    value.parse().map_err(|_| CsvError::Integer {
        column,
        value: value.to_owned(),
        kind: type_name::<T>(),
    })
}

fn parse_amount(column: &'static str, value: &str) -> Result<f32, CsvError> {
    let error = || CsvError::Float {
        column,
        value: value.to_owned(),
    };

    // Parsing straight to f32 would silently round overflowing values to infinity.
    let amount = value.parse::<f64>().map_err(|_| error())? as f32;

    if amount.is_finite() {
        Ok(amount)
    } else {
        Err(error())
    }
}

fn parse_timestamp(
    column: &'static str,
    value: &str,
) -> Result<time::PrimitiveDateTime, CsvError> {
    super::core::parse_timestamp(value).map_err(|_| CsvError::Timestamp {
        column,
        value: value.to_owned(),
    })
}

fn parse_variant<T>(column: &'static str, value: &str) -> Result<T, CsvError>
where
    T: FromStr<Err = UnknownVariant>,
{
    value
        .parse()
        .map_err(|source| CsvError::Variant { column, source })
}

/// Accept `value` if it is exactly `letters` capital ASCII letters followed by `digits` ASCII
/// digits.
fn parse_pattern(
    column: &'static str,
    value: &str,
    letters: usize,
    digits: usize,
) -> Result<String, CsvError> {
    let bytes = value.as_bytes();
    let is_match = bytes.len() == letters + digits
        && bytes[..letters].iter().all(u8::is_ascii_uppercase)
        && bytes[letters..].iter().all(u8::is_ascii_digit);

    if is_match {
        Ok(value.to_owned())
    } else {
        Err(CsvError::Pattern {
            column,
            value: value.to_owned(),
            pattern: if digits == 8 {
                "[A-Z]{2}[0-9]{8}"
            } else {
                "[A-Z]{2}[0-9]{15}"
            },
        })
    }
}
