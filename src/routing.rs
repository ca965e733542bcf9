//! Application router configuration.

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use crate::{
    AppState, endpoints,
    transaction::{
        export_transactions_endpoint, list_transactions_endpoint, upload_transactions_endpoint,
    },
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.upload_config.max_upload_size);

    Router::new()
        .route(endpoints::TRANSACTIONS_JSON, get(list_transactions_endpoint))
        .route(endpoints::TRANSACTIONS_CSV, get(export_transactions_endpoint))
        .route(
            endpoints::TRANSACTIONS_UPLOAD,
            post(upload_transactions_endpoint).layer(upload_limit),
        )
        .fallback(get_404_not_found)
        .with_state(state)
}

async fn get_404_not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "message": "not found" }))).into_response()
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::{
        endpoints,
        test_utils::{assert_error_message, get_test_server, get_test_state},
    };

    #[tokio::test]
    async fn unknown_route_is_json_not_found() {
        let server = get_test_server(get_test_state(30, 1500));

        let response = server.get("/api/transactions").expect_failure().await;

        assert_error_message(&response, StatusCode::NOT_FOUND, "not found");
    }

    #[tokio::test]
    async fn wrong_method_is_rejected() {
        let server = get_test_server(get_test_state(30, 1500));

        let response = server
            .post(endpoints::TRANSACTIONS_JSON)
            .expect_failure()
            .await;

        assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
