// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::{Actor, ActorRole, User};
use shared_models::error::AppError;
use shared_utils::upload::{multipart_error, UploadedFile};

use crate::models::{
    parse_id, Appointment, AppointmentStatus, AppointmentWithReport,
    BookAppointmentRequest, TransitionPayload, UpdateStatusRequest,
};
use crate::state::AppointmentState;

fn require_role(user: &User, role: ActorRole) -> Result<(Actor, Uuid), AppError> {
    let actor = Actor::from(user);
    if !actor.is(role) {
        return Err(AppError::Forbidden(format!("Only a {} can access this resource", role)));
    }
    let id = Uuid::parse_str(&actor.id).map_err(|_| AppError::Auth("Token subject is not a valid id".to_string()))?;
    Ok((actor, id))
}

// ==============================================================================
// BOOKING
// ==============================================================================

/// `POST /` with a multipart form; the optional file part is `document`.
#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = Actor::from(&user);
    let mut request = BookAppointmentRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "document" {
            request.document = UploadedFile::from_field(field).await?;
            continue;
        }

        let value = field.text().await.map_err(multipart_error)?;
        match name.as_str() {
            "doctorId" | "doctor_id" => request.doctor_id = Some(value),
            "patientId" | "patient_id" => request.patient_id = Some(value),
            "patientName" | "patient_name" => request.patient_name = Some(value),
            "email" => request.email = Some(value),
            "date" => request.date = Some(value),
            "time" => request.time = Some(value),
            "symptoms" => request.symptoms = Some(value),
            "phone" => request.phone = Some(value),
            "gender" => request.gender = Some(value),
            other => debug!("Ignoring unknown booking field {}", other),
        }
    }

    let appointment = state
        .booking_service()
        .book_appointment(request, &actor, Utc::now())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Appointment booked successfully",
            "appointment": appointment
        })),
    ))
}

/// Public: `"date|time"` tokens for the booking form.
pub async fn get_booked_slots(
    State(state): State<Arc<AppointmentState>>,
    Path(doctor_id): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    let doctor_id = parse_id(&doctor_id, "doctor")?;
    let booked = state.slot_calendar().booked_slots(doctor_id).await?;

    Ok(Json(booked.into_iter().collect()))
}

// ==============================================================================
// DOCTOR DASHBOARD
// ==============================================================================

pub async fn get_appointments_by_status(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(status): Path<String>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let (_, doctor_id) = require_role(&user, ActorRole::Doctor)?;
    let status: AppointmentStatus = status.parse()?;

    let appointments = state
        .query_service()
        .by_status_for_doctor(doctor_id, status, Utc::now())
        .await?;

    Ok(Json(appointments))
}

pub async fn get_pending_appointments(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let (_, doctor_id) = require_role(&user, ActorRole::Doctor)?;
    Ok(Json(state.query_service().pending_for_doctor(doctor_id).await?))
}

pub async fn get_my_appointments(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let (_, doctor_id) = require_role(&user, ActorRole::Doctor)?;
    Ok(Json(state.query_service().active_for_doctor(doctor_id, Utc::now()).await?))
}

/// `PATCH /status/{id}` with `{status, prescription?, medicines?}`.
#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment_id = parse_id(&appointment_id, "appointment")?;
    let requested: AppointmentStatus = request.status.parse()?;
    let actor = Actor::from(&user);

    let appointment = state
        .status_service()
        .update_status(
            appointment_id,
            requested,
            TransitionPayload {
                prescription: request.prescription,
                medicines: request.medicines,
            },
            &actor,
            Utc::now(),
        )
        .await?;

    Ok(Json(json!({
        "message": "Appointment updated successfully",
        "appointment": appointment
    })))
}

// ==============================================================================
// PATIENT DASHBOARD
// ==============================================================================

pub async fn get_patient_appointments(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<AppointmentWithReport>>, AppError> {
    let (_, patient_id) = require_role(&user, ActorRole::Patient)?;
    Ok(Json(state.query_service().for_patient(patient_id, None).await?))
}

pub async fn get_patient_pending_appointments(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<AppointmentWithReport>>, AppError> {
    let (_, patient_id) = require_role(&user, ActorRole::Patient)?;
    Ok(Json(
        state
            .query_service()
            .for_patient(patient_id, Some(AppointmentStatus::Pending))
            .await?,
    ))
}

// ==============================================================================
// REPORTS
// ==============================================================================

/// `POST /upload-report/{id}`; the file part is `reportFile`.
pub async fn upload_report(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let appointment_id = parse_id(&appointment_id, "appointment")?;
    let actor = Actor::from(&user);

    let mut report = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let is_report = matches!(field.name(), Some("reportFile" | "report_file" | "file"));
        if is_report {
            report = UploadedFile::from_field(field).await?;
        }
    }
    let report = report.ok_or_else(|| AppError::BadRequest("No report file provided".to_string()))?;

    let appointment = state
        .report_service()
        .upload_report(appointment_id, report, &actor)
        .await?;

    Ok(Json(json!({
        "message": "Report uploaded successfully",
        "report_url": appointment.report_url(),
        "appointment": appointment
    })))
}

pub async fn view_report(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Response, AppError> {
    let appointment_id = parse_id(&appointment_id, "appointment")?;
    let actor = Actor::from(&user);

    let (file, blob) = state
        .report_service()
        .open_report(appointment_id, &actor)
        .await?;

    let filename = file
        .filename
        .as_deref()
        .unwrap_or("report")
        .replace('"', "");

    Ok((
        [
            (header::CONTENT_TYPE, blob.content_type),
            (header::CONTENT_DISPOSITION, format!("inline; filename=\"{}\"", filename)),
        ],
        blob.data,
    )
        .into_response())
}
