#![allow(missing_docs)]

pub(crate) mod http;

use std::sync::{Arc, Mutex};

use axum_test::TestServer;
use rusqlite::Connection;

use crate::{
    AppState, PaginationConfig, UploadConfig, build_router,
    db::initialize,
    transaction::{Status, Transaction, decode_row},
};

pub(crate) use http::{assert_content_type, assert_error_message, must_make_multipart};

/// Three valid rows in upload order, without the header.
pub(crate) const SAMPLE_ROWS: [&str; 3] = [
    "1,20020,3506,1111,1.00,1.00,0.00,0.00,0.00,2022-08-12 11:25:27,2022-08-12 14:25:27,accepted,cash,PS16698205,13980,Поповнення карток,14232155,pumb,254751,UA713451373919523,Перерахування коштів згідно договору про надання послуг А11/27122 від 19.11.2020 р.",
    "2,20030,3507,1111,1.00,1.00,0.00,0.00,0.00,2022-08-12 12:36:52,2022-08-12 15:36:53,declined,cash,PS16698215,13990,Поповнення карток,14332255,privat,255752,UA713461333619513,Перерахування коштів згідно договору про надання послуг А11/27123 від 19.11.2020 р.",
    "3,20040,3508,1111,3.00,3.00,0.00,0.00,-0.01,2022-08-17 9:53:43,2022-08-17 12:53:44,accepted,card,PS16698225,14000,Поповнення карток,14432355,privat,256753,UA713471293319503,Перерахування коштів згідно договору про надання послуг А11/27122 від 19.11.2020 р.",
];

/// The sample rows as an upload file, header included.
pub(crate) fn sample_csv() -> String {
    let mut csv = String::from(crate::transaction::CSV_HEADER);

    for row in SAMPLE_ROWS {
        csv.push('\n');
        csv.push_str(row);
    }

    csv.push('\n');
    csv
}

pub(crate) fn sample_transactions() -> Vec<Transaction> {
    SAMPLE_ROWS
        .iter()
        .map(|row| decode_row(row).expect("Could not decode sample row"))
        .collect()
}

/// `count` copies of the first sample row with IDs counting from 1. Even IDs are declined.
pub(crate) fn numbered_transactions(count: u64) -> Vec<Transaction> {
    let template = sample_transactions().remove(0);

    (1..=count)
        .map(|id| Transaction {
            id,
            status: if id % 2 == 0 {
                Status::Declined
            } else {
                Status::Accepted
            },
            ..template.clone()
        })
        .collect()
}

pub(crate) fn get_test_connection() -> Connection {
    let connection = Connection::open_in_memory().unwrap();
    initialize(&connection).unwrap();
    connection
}

pub(crate) fn get_test_state(page_size: u64, batch_size: usize) -> AppState {
    AppState::new(
        Connection::open_in_memory().unwrap(),
        PaginationConfig { page_size },
        UploadConfig {
            batch_size,
            ..Default::default()
        },
    )
    .expect("Could not create app state")
}

pub(crate) fn get_test_server(state: AppState) -> TestServer {
    TestServer::try_new(build_router(state)).expect("Could not create test server.")
}

/// Insert `transactions` directly into the database behind `state`.
pub(crate) fn insert_transactions(
    connection: &Arc<Mutex<Connection>>,
    transactions: &[Transaction],
) {
    use crate::transaction::TransactionStore;

    let connection = connection.lock().unwrap();
    connection
        .create_batch(transactions)
        .expect("Could not insert test transactions");
}

pub(crate) fn count_transactions(connection: &Arc<Mutex<Connection>>) -> i64 {
    connection
        .lock()
        .unwrap()
        .query_row("SELECT COUNT(*) FROM \"transaction\"", [], |row| row.get(0))
        .expect("Could not count transactions")
}
