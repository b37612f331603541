mod common;

use std::time::Duration as StdDuration;

use axum::http::{header, Method, StatusCode};
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use lab_test_cell::models::LabTestStatus;
use shared_utils::test_utils::{TestConfig, TestUser};

use common::{json_body, TestApp};

#[tokio::test]
async fn patient_books_a_pending_test() {
    let app = TestApp::new().await;

    let response = app
        .json(
            Method::POST,
            "/lab/book-test",
            &app.patient,
            json!({
                "labId": app.lab.id,
                "testName": "Lipid Panel",
                "appointmentDate": "2025-03-01T09:30:00Z"
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Lab test booked successfully");
    assert_eq!(body["booking"]["status"], "pending");
    assert_eq!(body["booking"]["patient_id"], app.patient.id);
    assert_eq!(body["booking"]["description"], "");
}

#[tokio::test]
async fn booking_requires_core_fields_and_a_known_lab() {
    let app = TestApp::new().await;

    let response = app
        .json(Method::POST, "/lab/book-test", &app.patient, json!({"labId": app.lab.id}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["error"],
        "Lab ID, test name, patient ID, and appointment date are required"
    );

    let response = app
        .json(
            Method::POST,
            "/lab/book-test",
            &app.patient,
            json!({
                "labId": Uuid::new_v4(),
                "testName": "Lipid Panel",
                "appointmentDate": "2025-03-01"
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "Lab not found");
}

#[tokio::test]
async fn lab_accepts_and_patient_is_told() {
    let app = TestApp::new().await;
    let test = app.seed(LabTestStatus::Pending, Utc::now() + Duration::days(2)).await;

    let response = app
        .json(Method::PUT, &format!("/lab-tests/{}", test.id), &app.lab, json!({"status": "accepted"}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "accepted");

    let sent = app.gateway.wait_for(1, StdDuration::from_secs(1)).await;
    assert_eq!(sent[0].subject, "Your Lab Test Has Been Accepted");
    assert_eq!(sent[0].to, "patient@example.com");
}

#[tokio::test]
async fn rejected_tests_stay_rejected() {
    let app = TestApp::new().await;
    let test = app.seed(LabTestStatus::Rejected, Utc::now()).await;

    let response = app
        .json(Method::PUT, &format!("/lab-tests/{}", test.id), &app.lab, json!({"status": "accepted"}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Invalid transition from rejected to accepted");
}

#[tokio::test]
async fn completing_by_status_alone_needs_a_file() {
    let app = TestApp::new().await;
    let test = app.seed(LabTestStatus::Accepted, Utc::now() - Duration::hours(1)).await;

    let response = app
        .json(Method::PUT, &format!("/lab-tests/{}", test.id), &app.lab, json!({"status": "completed"}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.stored(test.id).await.status, LabTestStatus::Accepted);
}

#[tokio::test]
async fn only_the_assigned_lab_updates() {
    let app = TestApp::new().await;
    let test = app.seed(LabTestStatus::Pending, Utc::now()).await;
    let other_lab = TestUser::lab("other@example.com");

    let response = app
        .json(Method::PUT, &format!("/lab-tests/{}", test.id), &other_lab, json!({"status": "rejected"}))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn result_upload_completes_and_can_be_downloaded() {
    let app = TestApp::new().await;
    let test = app.seed(LabTestStatus::Accepted, Utc::now() - Duration::hours(2)).await;

    let response = app
        .upload(&format!("/lab/upload-result/{}", test.id), &app.lab, "cbc.pdf", "application/pdf", b"%PDF-1.7 cbc")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["message"], "File uploaded successfully");
    assert_eq!(body["labTest"]["status"], "completed");
    assert!(body["labTest"]["completed_at"].is_string());

    let response = app.get(&format!("/lab/download-result/{}", test.id), &app.patient).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Complete_Blood_Count-result.pdf\""
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"%PDF-1.7 cbc");

    // completion is silent unless enabled
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    assert!(app.gateway.messages().is_empty());
}

#[tokio::test]
async fn completion_notice_when_enabled() {
    let mut config = TestConfig::default().to_app_config();
    config.lab_notify_on_completion = true;
    let app = TestApp::with_config(config).await;
    let test = app.seed(LabTestStatus::Accepted, Utc::now() - Duration::hours(2)).await;

    let response = app
        .upload(&format!("/lab/upload-result/{}", test.id), &app.lab, "cbc.pdf", "application/pdf", b"%PDF")
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let sent = app.gateway.wait_for(1, StdDuration::from_secs(1)).await;
    assert_eq!(sent[0].subject, "Your Lab Test Results Are Ready");
}

#[tokio::test]
async fn results_cannot_precede_the_test_date() {
    let app = TestApp::new().await;
    let test = app.seed(LabTestStatus::Accepted, Utc::now() + Duration::days(1)).await;

    let response = app
        .upload(&format!("/lab/upload-result/{}", test.id), &app.lab, "cbc.pdf", "application/pdf", b"%PDF")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.stored(test.id).await.status, LabTestStatus::Accepted);
    assert_eq!(app.blobs.object_count().await, 0);
}

#[tokio::test]
async fn download_without_result_is_not_found() {
    let app = TestApp::new().await;
    let test = app.seed(LabTestStatus::Accepted, Utc::now()).await;

    let response = app.get(&format!("/lab/download-result/{}", test.id), &app.lab).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "Result file not found");
}

#[tokio::test]
async fn listings_are_scoped_by_role() {
    let app = TestApp::new().await;
    let first = app.seed(LabTestStatus::Pending, Utc::now()).await;
    let second = app.seed(LabTestStatus::Accepted, Utc::now()).await;

    let body = json_body(app.get("/lab-tests", &app.lab).await).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let body = json_body(app.get("/lab-tests/my-tests", &app.patient).await).await;
    let ids: Vec<&str> = body.as_array().unwrap().iter().map(|t| t["id"].as_str().unwrap()).collect();
    assert!(ids.contains(&first.id.to_string().as_str()));
    assert!(ids.contains(&second.id.to_string().as_str()));

    let response = app.get("/lab-tests", &app.patient).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
