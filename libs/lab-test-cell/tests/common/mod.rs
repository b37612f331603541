#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, Response},
    Router,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use lab_test_cell::models::{LabTest, LabTestStatus};
use lab_test_cell::services::{InMemoryLabTestRepository, LabTestRepository};
use lab_test_cell::{lab_routes, lab_test_routes, LabTestState};
use notification_cell::testing::RecordingGateway;
use notification_cell::Notifier;
use shared_config::AppConfig;
use shared_database::directory::InMemoryDirectory;
use shared_database::storage::InMemoryBlobStore;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

pub const BOUNDARY: &str = "----lab-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub repository: Arc<InMemoryLabTestRepository>,
    pub blobs: Arc<InMemoryBlobStore>,
    pub gateway: Arc<RecordingGateway>,
    pub config: Arc<AppConfig>,
    pub lab: TestUser,
    pub patient: TestUser,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default().to_app_config()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let config = Arc::new(config);
        let repository = Arc::new(InMemoryLabTestRepository::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let gateway = Arc::new(RecordingGateway::new());
        let lab = TestUser::lab("lab@example.com");
        let patient = TestUser::patient("patient@example.com");

        let directory = Arc::new(InMemoryDirectory::new());
        directory.add_lab(lab.uuid(), "City Diagnostics", Some("lab@example.com")).await;
        directory.add_patient(patient.uuid(), "Ada", Some("patient@example.com")).await;

        let state = Arc::new(LabTestState::new(
            config.clone(),
            repository.clone(),
            directory,
            blobs.clone(),
            Notifier::new(gateway.clone()),
        ));

        let router = Router::new()
            .nest("/lab", lab_routes(state.clone()))
            .nest("/lab-tests", lab_test_routes(state));

        Self {
            router,
            repository,
            blobs,
            gateway,
            config,
            lab,
            patient,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;
        self.router.clone().oneshot(request).await.unwrap()
    }

    fn authorized(&self, method: Method, uri: &str, user: &TestUser) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, JwtTestUtils::bearer(user, &self.config))
    }

    pub async fn get(&self, uri: &str, user: &TestUser) -> Response<Body> {
        self.send(self.authorized(Method::GET, uri, user).body(Body::empty()).unwrap())
            .await
    }

    pub async fn json(&self, method: Method, uri: &str, user: &TestUser, body: Value) -> Response<Body> {
        let request = self
            .authorized(method, uri, user)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn upload(&self, uri: &str, user: &TestUser, filename: &str, content_type: &str, data: &[u8]) -> Response<Body> {
        let mut body = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            BOUNDARY, filename, content_type
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        let request = self
            .authorized(Method::POST, uri, user)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub async fn seed(&self, status: LabTestStatus, appointment_date: DateTime<Utc>) -> LabTest {
        let test = LabTest {
            id: Uuid::new_v4(),
            lab_id: self.lab.uuid(),
            patient_id: self.patient.uuid(),
            test_name: "Complete Blood Count".to_string(),
            description: String::new(),
            appointment_date,
            status,
            result_file: None,
            requested_at: Utc::now(),
            completed_at: None,
        };
        self.repository.insert(test).await.unwrap()
    }

    pub async fn stored(&self, id: Uuid) -> LabTest {
        self.repository.find(id).await.unwrap().unwrap()
    }
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
