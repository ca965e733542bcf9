//! Validates optional query parameters and turns them into filters for the transaction store.

use time::PrimitiveDateTime;

use crate::Error;

use super::core::{PaymentType, Status, parse_timestamp};

/// A single restriction on which transactions a query returns.
///
/// A query returns the transactions that match every filter in its list.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionFilter {
    /// Only the transaction with this ID.
    TransactionId(u64),
    /// Transactions made on any of these terminals.
    TerminalIds(Vec<u64>),
    /// Transactions with this status.
    Status(Status),
    /// Transactions paid for this way.
    PaymentType(PaymentType),
    /// Transactions posted between `from` and `to`, both inclusive.
    DatePostRange {
        /// The earliest post date.
        from: PrimitiveDateTime,
        /// The latest post date.
        to: PrimitiveDateTime,
    },
    /// Transactions whose narrative contains this text, compared case-sensitively.
    PaymentNarrative(String),
}

/// Accumulates the filters for one request.
///
/// Each `add_*` method ignores an empty value. A non-empty value is validated and, if valid,
/// replaces any filter of the same kind added before. [FilterBuilder::filters] lists the
/// filters in a fixed order, so a kind never appears twice.
#[derive(Debug, Default)]
pub struct FilterBuilder {
    transaction_id: Option<u64>,
    terminal_ids: Option<Vec<u64>>,
    status: Option<Status>,
    payment_type: Option<PaymentType>,
    date_post_range: Option<(PrimitiveDateTime, PrimitiveDateTime)>,
    payment_narrative: Option<String>,
}

impl FilterBuilder {
    /// Create a builder without any filters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only match the transaction with the ID in `value`.
    ///
    /// # Errors
    /// Returns [Error::InvalidParameter] if `value` is not an unsigned 64-bit integer.
    pub fn add_transaction_id(&mut self, value: &str) -> Result<(), Error> {
        if value.is_empty() {
            return Ok(());
        }

        self.transaction_id = Some(parse_unsigned("id", value)?);

        Ok(())
    }

    /// Only match transactions made on one of the terminals in `values`.
    ///
    /// # Errors
    /// Returns [Error::InvalidParameter] if any value, including an empty one, is not an
    /// unsigned 64-bit integer.
    pub fn add_terminal_ids<S: AsRef<str>>(&mut self, values: &[S]) -> Result<(), Error> {
        if values.is_empty() {
            return Ok(());
        }

        let terminal_ids = values
            .iter()
            .map(|value| parse_unsigned("terminal_id", value.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        self.terminal_ids = Some(terminal_ids);

        Ok(())
    }

    /// Only match transactions with the status in `value`.
    ///
    /// # Errors
    /// Returns [Error::InvalidParameter] if `value` is not "accepted" or "declined".
    pub fn add_status(&mut self, value: &str) -> Result<(), Error> {
        if value.is_empty() {
            return Ok(());
        }

        let status = value.parse().map_err(|_| {
            Error::InvalidParameter(format!(
                "value of \"status\" parameter should be either {}",
                Status::EXPECTED
            ))
        })?;
        self.status = Some(status);

        Ok(())
    }

    /// Only match transactions with the payment type in `value`.
    ///
    /// # Errors
    /// Returns [Error::InvalidParameter] if `value` is not "cash" or "card".
    pub fn add_payment_type(&mut self, value: &str) -> Result<(), Error> {
        if value.is_empty() {
            return Ok(());
        }

        let payment_type = value.parse().map_err(|_| {
            Error::InvalidParameter(format!(
                "value of \"payment_type\" parameter should be either {}",
                PaymentType::EXPECTED
            ))
        })?;
        self.payment_type = Some(payment_type);

        Ok(())
    }

    /// Only match transactions posted between `from` and `to`, both inclusive.
    ///
    /// Nothing is added when `from` is empty, whatever the value of `to`.
    ///
    /// # Errors
    /// Returns [Error::InvalidParameter] if `from` is given without `to`, or if either does not
    /// follow the `YYYY-MM-DD HH:MM:SS` layout.
    pub fn add_date_post_range(&mut self, from: &str, to: &str) -> Result<(), Error> {
        if from.is_empty() {
            return Ok(());
        }

        if to.is_empty() {
            return Err(Error::InvalidParameter(
                "parameter \"date_post_to\" is required when using \"date_post_from\"".to_owned(),
            ));
        }

        let from = parse_date("date_post_from", from)?;
        let to = parse_date("date_post_to", to)?;
        self.date_post_range = Some((from, to));

        Ok(())
    }

    /// Only match transactions whose narrative contains `value`.
    ///
    /// The match is literal and case-sensitive, `%` and `_` have no special meaning.
    pub fn add_payment_narrative(&mut self, value: &str) -> Result<(), Error> {
        if !value.is_empty() {
            self.payment_narrative = Some(value.to_owned());
        }

        Ok(())
    }

    /// The filters added so far, in the order transaction ID, terminal IDs, status, payment
    /// type, post date range and narrative.
    pub fn filters(&self) -> Vec<TransactionFilter> {
        let mut filters = Vec::new();

        if let Some(id) = self.transaction_id {
            filters.push(TransactionFilter::TransactionId(id));
        }

        if let Some(terminal_ids) = &self.terminal_ids {
            filters.push(TransactionFilter::TerminalIds(terminal_ids.clone()));
        }

        if let Some(status) = self.status {
            filters.push(TransactionFilter::Status(status));
        }

        if let Some(payment_type) = self.payment_type {
            filters.push(TransactionFilter::PaymentType(payment_type));
        }

        if let Some((from, to)) = self.date_post_range {
            filters.push(TransactionFilter::DatePostRange { from, to });
        }

        if let Some(narrative) = &self.payment_narrative {
            filters.push(TransactionFilter::PaymentNarrative(narrative.clone()));
        }

        filters
    }
}

fn parse_unsigned(parameter: &str, value: &str) -> Result<u64, Error> {
    let error = || {
        Error::InvalidParameter(format!(
            "value of \"{parameter}\" parameter should be an unsigned integer, got \"{value}\""
        ))
    };

    if value.starts_with(['-', '+']) {
        return Err(error());
    }

    value.parse().map_err(|_| error())
}

fn parse_date(parameter: &str, value: &str) -> Result<PrimitiveDateTime, Error> {
    parse_timestamp(value).map_err(|_| {
        Error::InvalidParameter(format!(
            "value of \"{parameter}\" parameter should use the layout YYYY-MM-DD HH:MM:SS, \
            got \"{value}\""
        ))
    })
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use crate::{
        Error,
        transaction::core::{PaymentType, Status},
    };

    use super::{FilterBuilder, TransactionFilter};

    #[test]
    fn empty_values_add_nothing() {
        let mut builder = FilterBuilder::new();

        builder.add_transaction_id("").unwrap();
        builder.add_terminal_ids::<&str>(&[]).unwrap();
        builder.add_status("").unwrap();
        builder.add_payment_type("").unwrap();
        builder.add_date_post_range("", "").unwrap();
        builder.add_payment_narrative("").unwrap();

        assert_eq!(builder.filters(), vec![]);
    }

    #[test]
    fn lists_filters_in_fixed_order() {
        let mut builder = FilterBuilder::new();

        builder.add_payment_narrative("27122").unwrap();
        builder
            .add_date_post_range("2022-08-12 00:00:00", "2022-08-17 9:00:00")
            .unwrap();
        builder.add_payment_type("card").unwrap();
        builder.add_status("accepted").unwrap();
        builder.add_terminal_ids(&["3506", "3508"]).unwrap();
        builder.add_transaction_id("3").unwrap();

        assert_eq!(
            builder.filters(),
            vec![
                TransactionFilter::TransactionId(3),
                TransactionFilter::TerminalIds(vec![3506, 3508]),
                TransactionFilter::Status(Status::Accepted),
                TransactionFilter::PaymentType(PaymentType::Card),
                TransactionFilter::DatePostRange {
                    from: datetime!(2022-08-12 00:00:00),
                    to: datetime!(2022-08-17 09:00:00),
                },
                TransactionFilter::PaymentNarrative("27122".to_owned()),
            ]
        );
    }

    #[test]
    fn adding_a_kind_twice_keeps_one_filter() {
        let mut builder = FilterBuilder::new();

        builder.add_status("accepted").unwrap();
        builder.add_status("declined").unwrap();

        assert_eq!(
            builder.filters(),
            vec![TransactionFilter::Status(Status::Declined)]
        );
    }

    #[test]
    fn rejects_signed_or_invalid_transaction_id() {
        let mut builder = FilterBuilder::new();

        for value in ["-1", "+1", "abc", "1.5", "18446744073709551616"] {
            let result = builder.add_transaction_id(value);

            assert!(
                matches!(result, Err(Error::InvalidParameter(_))),
                "want invalid parameter for {value:?}, got {result:?}"
            );
        }

        assert_eq!(builder.filters(), vec![]);
    }

    #[test]
    fn rejects_empty_terminal_id_in_list() {
        let mut builder = FilterBuilder::new();

        let result = builder.add_terminal_ids(&["3506", ""]);

        assert_eq!(
            result,
            Err(Error::InvalidParameter(
                "value of \"terminal_id\" parameter should be an unsigned integer, got \"\""
                    .to_owned()
            ))
        );
        assert_eq!(builder.filters(), vec![]);
    }

    #[test]
    fn rejects_unknown_status_and_payment_type() {
        let mut builder = FilterBuilder::new();

        assert_eq!(
            builder.add_status("Accepted"),
            Err(Error::InvalidParameter(
                "value of \"status\" parameter should be either \"accepted\" or \"declined\""
                    .to_owned()
            ))
        );
        assert_eq!(
            builder.add_payment_type("cheque"),
            Err(Error::InvalidParameter(
                "value of \"payment_type\" parameter should be either \"cash\" or \"card\""
                    .to_owned()
            ))
        );
    }

    #[test]
    fn date_range_requires_to_when_from_given() {
        let mut builder = FilterBuilder::new();

        assert_eq!(
            builder.add_date_post_range("2022-08-12 00:00:00", ""),
            Err(Error::InvalidParameter(
                "parameter \"date_post_to\" is required when using \"date_post_from\"".to_owned()
            ))
        );
    }

    #[test]
    fn date_range_without_from_is_ignored() {
        let mut builder = FilterBuilder::new();

        builder.add_date_post_range("", "not even a date").unwrap();

        assert_eq!(builder.filters(), vec![]);
    }

    #[test]
    fn rejects_badly_formatted_dates() {
        let mut builder = FilterBuilder::new();

        assert!(matches!(
            builder.add_date_post_range("2022-08-12", "2022-08-13 00:00:00"),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            builder.add_date_post_range("2022-08-12 00:00:00", "2022-08-13T00:00:00"),
            Err(Error::InvalidParameter(_))
        ));
    }
}
