use axum::http::{HeaderMap, StatusCode};
use axum_test::{
    TestResponse,
    multipart::{MultipartForm, Part},
};

#[track_caller]
pub(crate) fn get_header(headers: &HeaderMap, header_name: &str) -> String {
    let header_error_message = format!("Headers missing {header_name}");

    headers
        .get(header_name)
        .expect(&header_error_message)
        .to_str()
        .expect("Could not convert to str")
        .to_string()
}

#[track_caller]
pub(crate) fn assert_content_type(response: &TestResponse, content_type: &str) {
    assert_eq!(get_header(response.headers(), "content-type"), content_type);
}

/// Check that `response` has status `status` and the JSON body `{"message": message}`.
#[track_caller]
pub(crate) fn assert_error_message(response: &TestResponse, status: StatusCode, message: &str) {
    assert_eq!(
        response.status_code(),
        status,
        "unexpected status, body: {}",
        response.text()
    );
    response.assert_json(&serde_json::json!({ "message": message }));
}

/// A multipart form with `csv` attached as a file part named `field_name`.
pub(crate) fn must_make_multipart(field_name: &str, csv: impl Into<String>) -> MultipartForm {
    let part = Part::bytes(csv.into().into_bytes())
        .file_name("transactions.csv")
        .mime_type("text/csv");

    MultipartForm::new().add_part(field_name.to_owned(), part)
}
