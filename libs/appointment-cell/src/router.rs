// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::upload::MAX_UPLOAD_BYTES;

use crate::handlers;
use crate::state::AppointmentState;

pub fn appointment_routes(state: Arc<AppointmentState>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/pending", get(handlers::get_pending_appointments))
        .route("/my", get(handlers::get_my_appointments))
        .route("/status/patient", get(handlers::get_patient_appointments))
        .route("/pending/patient", get(handlers::get_patient_pending_appointments))
        // GET takes a status name, PATCH an appointment id
        .route(
            "/status/{id}",
            get(handlers::get_appointments_by_status).patch(handlers::update_appointment_status),
        )
        .route("/upload-report/{id}", post(handlers::upload_report))
        .route("/view-report/{id}", get(handlers::view_report))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    let public_routes = Router::new()
        .route("/booked-slots/{doctor_id}", get(handlers::get_booked_slots));

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}
