use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use appointment_cell::{appointment_routes, AppointmentState};
use lab_test_cell::{lab_routes, lab_test_routes, LabTestState};

pub fn create_router(appointments: Arc<AppointmentState>, labs: Arc<LabTestState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Health Consultation API is running!" }))
        .route("/health", get(health))
        .nest("/api/appointments", appointment_routes(appointments))
        .nest("/api/lab", lab_routes(labs.clone()))
        .nest("/api/lab-tests", lab_test_routes(labs))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
