//! The endpoint for uploading a CSV file of transactions.
//!
//! The file is read as it arrives and decoded line by line. Decoded rows are grouped into
//! batches and handed to a blocking task that writes them inside a single database transaction,
//! so either every row in the file is stored or none are.

use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartRejection},
    },
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{Error, app_state::UploadState};

use super::{
    core::Transaction,
    csv::{CsvError, decode_row},
    store::TransactionStore,
};

/// The number of decoded batches that may wait for the database.
const BATCH_BUFFER_SIZE: usize = 2;

/// The response to a successful upload.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadSummary {
    /// The number of transactions stored.
    pub row_count: usize,
}

/// Store every transaction in the multipart field named "file".
///
/// The first line of the file is a header and is skipped without being checked. Empty lines are
/// skipped, and lines may end with `\n` or `\r\n`.
///
/// # Errors
/// Returns a 400 error if the request is not a multipart form, has no "file" field, or any row
/// fails to decode. Returns a 500 error if the rows could not be stored. Either way, none of the
/// file's rows are kept.
pub async fn upload_transactions_endpoint(
    State(state): State<UploadState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UploadSummary>), Error> {
    let mut multipart =
        multipart.map_err(|rejection| Error::MultipartError(rejection.body_text()))?;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|error| Error::MultipartError(error.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        tracing::debug!("Receiving upload {:?}", field.file_name());
        let start_time = std::time::Instant::now();
        let row_count = store_upload(&state, &mut field).await?;
        tracing::debug!(
            "Stored {row_count} uploaded transactions in {:.1}ms",
            start_time.elapsed().as_secs_f64() * 1000.0
        );

        return Ok((StatusCode::CREATED, Json(UploadSummary { row_count })));
    }

    Err(Error::MissingFile)
}

enum UploadMessage {
    Batch(Vec<Transaction>),
    /// Every row was decoded, commit the upload.
    Finish,
}

enum ReadOutcome {
    Complete,
    /// The database task stopped early and will report why.
    WorkerStopped,
}

async fn store_upload(state: &UploadState, field: &mut Field<'_>) -> Result<usize, Error> {
    let (sender, mut receiver) = mpsc::channel(BATCH_BUFFER_SIZE);
    let store = state.store.clone();

    let worker = tokio::task::spawn_blocking(move || {
        // The database is not locked until the file has produced something to store.
        let Some(first_message) = receiver.blocking_recv() else {
            return Err(Error::UploadAborted);
        };

        store.use_transaction(|connection| {
            let mut row_count = 0;
            let messages = std::iter::once(first_message)
                .chain(std::iter::from_fn(|| receiver.blocking_recv()));

            for message in messages {
                match message {
                    UploadMessage::Batch(batch) => {
                        connection.create_batch(&batch)?;
                        row_count += batch.len();
                    }
                    UploadMessage::Finish => return Ok(row_count),
                }
            }

            // The reader stopped without finishing, so roll back.
            Err(Error::UploadAborted)
        })
    });

    let outcome = send_batches(field, state.upload_config.batch_size, &sender).await;

    if let Ok(ReadOutcome::Complete) = outcome {
        // If this fails the worker has already stopped with an error, which is returned below.
        let _ = sender.send(UploadMessage::Finish).await;
    }

    drop(sender);
    let stored = worker
        .await
        .map_err(|error| Error::TaskFailed(error.to_string()))?;

    // A bad row explains an aborted upload better than the abort itself.
    outcome?;
    stored
}

async fn send_batches(
    field: &mut Field<'_>,
    batch_size: usize,
    sender: &mpsc::Sender<UploadMessage>,
) -> Result<ReadOutcome, Error> {
    let mut reader = BatchReader::new(batch_size);

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|error| Error::MultipartError(error.body_text()))?
    {
        for batch in reader.feed(&chunk)? {
            if sender.send(UploadMessage::Batch(batch)).await.is_err() {
                return Ok(ReadOutcome::WorkerStopped);
            }
        }
    }

    if let Some(batch) = reader.finish()?
        && sender.send(UploadMessage::Batch(batch)).await.is_err()
    {
        return Ok(ReadOutcome::WorkerStopped);
    }

    Ok(ReadOutcome::Complete)
}

/// Splits uploaded bytes into lines and decodes them into batches of transactions.
#[derive(Debug)]
struct BatchReader {
    /// Bytes after the last newline seen so far.
    pending: Vec<u8>,
    batch: Vec<Transaction>,
    batch_size: usize,
    line_number: usize,
}

impl BatchReader {
    fn new(batch_size: usize) -> Self {
        Self {
            pending: Vec::new(),
            batch: Vec::new(),
            batch_size: batch_size.max(1),
            line_number: 0,
        }
    }

    /// Decode the complete lines in `chunk` and return any batches that filled up.
    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Vec<Transaction>>, Error> {
        let mut pending = std::mem::take(&mut self.pending);
        pending.extend_from_slice(chunk);

        let mut batches = Vec::new();
        let mut start = 0;

        while let Some(offset) = pending[start..].iter().position(|byte| *byte == b'\n') {
            if let Some(batch) = self.accept_line(&pending[start..start + offset])? {
                batches.push(batch);
            }

            start += offset + 1;
        }

        pending.drain(..start);
        self.pending = pending;

        Ok(batches)
    }

    /// Decode the last line if it had no trailing newline and return the final batch.
    fn finish(mut self) -> Result<Option<Vec<Transaction>>, Error> {
        let last_line = std::mem::take(&mut self.pending);

        if !last_line.is_empty()
            && let Some(batch) = self.accept_line(&last_line)?
        {
            return Ok(Some(batch));
        }

        Ok((!self.batch.is_empty()).then_some(self.batch))
    }

    fn accept_line(&mut self, line: &[u8]) -> Result<Option<Vec<Transaction>>, Error> {
        self.line_number += 1;
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        if self.line_number == 1 || line.is_empty() {
            return Ok(None);
        }

        let invalid_csv = |source| Error::InvalidCsv {
            line: self.line_number,
            source,
        };

        let text = std::str::from_utf8(line).map_err(|_| invalid_csv(CsvError::Encoding))?;
        let transaction = decode_row(text).map_err(invalid_csv)?;
        self.batch.push(transaction);

        if self.batch.len() >= self.batch_size {
            Ok(Some(std::mem::take(&mut self.batch)))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod batch_reader_tests {
    use crate::{
        Error,
        test_utils::{SAMPLE_ROWS, sample_csv, sample_transactions},
        transaction::csv::CsvError,
    };

    use super::BatchReader;

    #[test]
    fn skips_header_and_batches_rows() {
        let mut reader = BatchReader::new(2);

        let batches = reader.feed(sample_csv().as_bytes()).unwrap();
        let last = reader.finish().unwrap();

        let transactions = sample_transactions();
        assert_eq!(batches, vec![transactions[..2].to_vec()]);
        assert_eq!(last, Some(transactions[2..].to_vec()));
    }

    #[test]
    fn joins_lines_split_across_chunks() {
        let mut reader = BatchReader::new(10);
        let csv = sample_csv();
        let bytes = csv.as_bytes();

        // Split in the middle of multi-byte characters too.
        for chunk in bytes.chunks(7) {
            assert_eq!(reader.feed(chunk).unwrap(), Vec::<Vec<_>>::new());
        }

        assert_eq!(reader.finish().unwrap(), Some(sample_transactions()));
    }

    #[test]
    fn accepts_crlf_blank_lines_and_missing_final_newline() {
        let mut reader = BatchReader::new(10);
        let csv = format!(
            "header\r\n{}\r\n\r\n{}\r\n\n{}",
            SAMPLE_ROWS[0], SAMPLE_ROWS[1], SAMPLE_ROWS[2]
        );

        assert_eq!(reader.feed(csv.as_bytes()).unwrap(), Vec::<Vec<_>>::new());
        assert_eq!(reader.finish().unwrap(), Some(sample_transactions()));
    }

    #[test]
    fn header_only_file_has_no_rows() {
        let mut reader = BatchReader::new(10);

        reader.feed(b"TransactionId,RequestId\n").unwrap();

        assert_eq!(reader.finish().unwrap(), None);
    }

    #[test]
    fn reports_line_of_bad_row() {
        let mut reader = BatchReader::new(10);
        let csv = format!("header\n{}\n1,2,3\n{}\n", SAMPLE_ROWS[0], SAMPLE_ROWS[2]);

        let result = reader.feed(csv.as_bytes());

        assert_eq!(
            result,
            Err(Error::InvalidCsv {
                line: 3,
                source: CsvError::FieldCount(3),
            })
        );
    }

    #[test]
    fn rejects_invalid_utf8() {
        let mut reader = BatchReader::new(10);
        let mut bytes = b"header\n".to_vec();
        bytes.extend_from_slice(SAMPLE_ROWS[0].as_bytes());
        bytes.extend_from_slice(b"\xff\xfe\n");

        let result = reader.feed(&bytes);

        assert_eq!(
            result,
            Err(Error::InvalidCsv {
                line: 2,
                source: CsvError::Encoding,
            })
        );
    }
}
