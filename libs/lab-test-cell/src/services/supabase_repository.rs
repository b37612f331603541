// libs/lab-test-cell/src/services/supabase_repository.rs
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{LabTest, LabTestStatus};
use crate::services::repository::{LabTestRepository, RepositoryError};

const TABLE: &str = "/rest/v1/lab_tests";

pub struct SupabaseLabTestRepository {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseLabTestRepository {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn select(&self, filter: String) -> Result<Vec<LabTest>, RepositoryError> {
        let path = format!("{}?{}&order=requested_at.desc", TABLE, filter);
        self.supabase
            .request::<Vec<LabTest>>(Method::GET, &path, None)
            .await
            .map_err(backend)
    }
}

fn backend(error: SupabaseError) -> RepositoryError {
    RepositoryError(error.to_string())
}

#[async_trait]
impl LabTestRepository for SupabaseLabTestRepository {
    async fn insert(&self, test: LabTest) -> Result<LabTest, RepositoryError> {
        let body = serde_json::to_value(&test).map_err(|e| RepositoryError(e.to_string()))?;
        let rows: Vec<LabTest> = self
            .supabase
            .request_returning(Method::POST, TABLE, body)
            .await
            .map_err(backend)?;

        rows.into_iter()
            .next()
            .ok_or_else(|| RepositoryError("insert returned no rows".to_string()))
    }

    async fn find(&self, id: Uuid) -> Result<Option<LabTest>, RepositoryError> {
        let path = format!("{}?id=eq.{}&limit=1", TABLE, id);
        let rows: Vec<LabTest> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(backend)?;

        Ok(rows.into_iter().next())
    }

    async fn list_for_lab(&self, lab_id: Uuid) -> Result<Vec<LabTest>, RepositoryError> {
        self.select(format!("lab_id=eq.{}", lab_id)).await
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<LabTest>, RepositoryError> {
        self.select(format!("patient_id=eq.{}", patient_id)).await
    }

    async fn compare_and_set(
        &self,
        test: &LabTest,
        expected: LabTestStatus,
    ) -> Result<Option<LabTest>, RepositoryError> {
        let path = format!("{}?id=eq.{}&status=eq.{}", TABLE, test.id, expected.label());
        let body = json!({
            "status": test.status,
            "result_file": test.result_file,
            "completed_at": test.completed_at,
        });

        let rows: Vec<LabTest> = self
            .supabase
            .request_returning(Method::PATCH, &path, body)
            .await
            .map_err(backend)?;

        if rows.is_empty() {
            warn!("Lab test {} was no longer {} when writing {}", test.id, expected, test.status);
        }
        Ok(rows.into_iter().next())
    }
}
