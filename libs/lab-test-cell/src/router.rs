// libs/lab-test-cell/src/router.rs
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::upload::MAX_UPLOAD_BYTES;

use crate::handlers;
use crate::state::LabTestState;

/// Mounted at `/api/lab`.
pub fn lab_routes(state: Arc<LabTestState>) -> Router {
    Router::new()
        .route("/book-test", post(handlers::book_test))
        .route("/upload-result/{id}", post(handlers::upload_result))
        .route("/download-result/{id}", get(handlers::download_result))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Mounted at `/api/lab-tests`.
pub fn lab_test_routes(state: Arc<LabTestState>) -> Router {
    Router::new()
        .route("/", get(handlers::get_lab_test_requests))
        .route("/my-tests", get(handlers::get_patient_lab_tests))
        .route("/{id}", put(handlers::update_lab_test_status))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
