#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, Response},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentStatus, SlotTime};
use appointment_cell::services::InMemoryAppointmentRepository;
use appointment_cell::{appointment_routes, AppointmentState};
use notification_cell::testing::RecordingGateway;
use notification_cell::Notifier;
use shared_config::AppConfig;
use shared_database::directory::InMemoryDirectory;
use shared_database::storage::InMemoryBlobStore;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

pub const BOUNDARY: &str = "----clinic-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppointmentState>,
    pub repository: Arc<InMemoryAppointmentRepository>,
    pub gateway: Arc<RecordingGateway>,
    pub config: Arc<AppConfig>,
    pub doctor: TestUser,
    pub patient: TestUser,
}

impl TestApp {
    pub async fn new() -> Self {
        let config = TestConfig::default().to_arc();
        let repository = Arc::new(InMemoryAppointmentRepository::new());
        let gateway = Arc::new(RecordingGateway::new());
        let doctor = TestUser::doctor("doctor@example.com");
        let patient = TestUser::patient("patient@example.com");

        let directory = Arc::new(InMemoryDirectory::new());
        directory.add_doctor(doctor.uuid(), "Grey", Some("doctor@example.com")).await;
        directory.add_patient(patient.uuid(), "Ada", Some("patient@example.com")).await;

        let state = Arc::new(AppointmentState::new(
            config.clone(),
            repository.clone(),
            directory,
            Arc::new(InMemoryBlobStore::new()),
            Notifier::new(gateway.clone()),
        ));

        Self {
            router: appointment_routes(state.clone()),
            state,
            repository,
            gateway,
            config,
            doctor,
            patient,
        }
    }

    pub fn bearer(&self, user: &TestUser) -> String {
        JwtTestUtils::bearer(user, &self.config)
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, user: Option<&TestUser>) -> Response<Body> {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, self.bearer(user));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn patch_json(&self, uri: &str, user: &TestUser, body: Value) -> Response<Body> {
        let request = Request::builder()
            .method(Method::PATCH)
            .uri(uri)
            .header(header::AUTHORIZATION, self.bearer(user))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_form(&self, uri: &str, user: &TestUser, body: Vec<u8>) -> Response<Body> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, self.bearer(user))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub async fn book(&self, date: &str, time: &str) -> Response<Body> {
        let form = multipart_form(
            &[
                ("doctorId", self.doctor.id.as_str()),
                ("patientId", self.patient.id.as_str()),
                ("patientName", "Ada"),
                ("email", "patient@example.com"),
                ("date", date),
                ("time", time),
                ("symptoms", "Headache"),
            ],
            None,
        );
        self.post_form("/", &self.patient, form).await
    }

    pub async fn seed(&self, date: NaiveDate, time: &str, status: AppointmentStatus) -> Appointment {
        let appointment = appointment(self.doctor.uuid(), self.patient.uuid(), date, time, status);
        use appointment_cell::services::AppointmentRepository;
        self.repository.insert(appointment).await.unwrap()
    }

    pub async fn stored(&self, id: Uuid) -> Appointment {
        use appointment_cell::services::AppointmentRepository;
        self.repository.find(id).await.unwrap().unwrap()
    }
}

pub fn appointment(
    doctor_id: Uuid,
    patient_id: Uuid,
    date: NaiveDate,
    time: &str,
    status: AppointmentStatus,
) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        doctor_id,
        patient_id,
        patient_name: "Ada".to_string(),
        email: Some("patient@example.com".to_string()),
        phone: None,
        gender: None,
        date,
        time: SlotTime::parse(time).unwrap(),
        symptoms: Some("Headache".to_string()),
        status,
        prescription: None,
        medicines: vec![],
        document: None,
        report_file: None,
        created_at: Utc::now(),
        completed_at: None,
    }
}

/// Text fields plus an optional `(field, filename, content type, bytes)` file part.
pub fn multipart_form(fields: &[(&str, &str)], file: Option<(&str, &str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((name, filename, content_type, data)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, name, filename, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
