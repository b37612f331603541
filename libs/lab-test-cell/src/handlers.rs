// libs/lab-test-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::{Actor, ActorRole, User};
use shared_models::error::AppError;
use shared_utils::upload::{multipart_error, UploadedFile};

use crate::models::{parse_id, BookLabTestRequest, LabTest, LabTestStatus, UpdateLabTestRequest};
use crate::state::LabTestState;

fn require_role(user: &User, role: ActorRole) -> Result<(Actor, Uuid), AppError> {
    let actor = Actor::from(user);
    if !actor.is(role) {
        return Err(AppError::Forbidden(format!("Only a {} can access this resource", role)));
    }
    let id = Uuid::parse_str(&actor.id).map_err(|_| AppError::Auth("Token subject is not a valid id".to_string()))?;
    Ok((actor, id))
}

// ==============================================================================
// /api/lab
// ==============================================================================

pub async fn book_test(
    State(state): State<Arc<LabTestState>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookLabTestRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = Actor::from(&user);
    let booking = state.service().book_test(request, &actor, Utc::now()).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Lab test booked successfully",
            "booking": booking
        })),
    ))
}

/// `POST /upload-result/{id}`; the file part is `file`.
pub async fn upload_result(
    State(state): State<Arc<LabTestState>>,
    Extension(user): Extension<User>,
    Path(test_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let test_id = parse_id(&test_id, "lab test")?;
    let actor = Actor::from(&user);

    let mut result = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("file") {
            result = UploadedFile::from_field(field).await?;
        }
    }
    let result = result.ok_or_else(|| AppError::BadRequest("No result file provided".to_string()))?;

    let test = state
        .service()
        .upload_result(test_id, result, &actor, Utc::now())
        .await?;

    Ok(Json(json!({
        "message": "File uploaded successfully",
        "labTest": test
    })))
}

pub async fn download_result(
    State(state): State<Arc<LabTestState>>,
    Extension(user): Extension<User>,
    Path(test_id): Path<String>,
) -> Result<Response, AppError> {
    let test_id = parse_id(&test_id, "lab test")?;
    let actor = Actor::from(&user);

    let (test, _, blob) = state.service().open_result(test_id, &actor).await?;

    Ok((
        [
            (header::CONTENT_TYPE, blob.content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", test.result_filename()),
            ),
        ],
        blob.data,
    )
        .into_response())
}

// ==============================================================================
// /api/lab-tests
// ==============================================================================

pub async fn get_lab_test_requests(
    State(state): State<Arc<LabTestState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<LabTest>>, AppError> {
    let (_, lab_id) = require_role(&user, ActorRole::Lab)?;
    Ok(Json(state.service().requests_for_lab(lab_id).await?))
}

pub async fn update_lab_test_status(
    State(state): State<Arc<LabTestState>>,
    Extension(user): Extension<User>,
    Path(test_id): Path<String>,
    Json(request): Json<UpdateLabTestRequest>,
) -> Result<Json<LabTest>, AppError> {
    let test_id = parse_id(&test_id, "lab test")?;
    let requested: LabTestStatus = request.status.parse()?;
    let actor = Actor::from(&user);

    let test = state
        .service()
        .update_status(test_id, requested, &actor, Utc::now())
        .await?;

    Ok(Json(test))
}

pub async fn get_patient_lab_tests(
    State(state): State<Arc<LabTestState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<LabTest>>, AppError> {
    let (_, patient_id) = require_role(&user, ActorRole::Patient)?;
    Ok(Json(state.service().tests_for_patient(patient_id).await?))
}
