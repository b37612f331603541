// libs/lab-test-cell/src/services/repository.rs
use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{LabTest, LabTestError, LabTestStatus};

#[derive(Debug, Error)]
#[error("{0}")]
pub struct RepositoryError(pub String);

impl From<RepositoryError> for LabTestError {
    fn from(error: RepositoryError) -> Self {
        LabTestError::Database(error.0)
    }
}

/// Persistence seam for lab tests. `compare_and_set` writes only while the
/// stored status still equals `expected` and returns `None` otherwise.
#[async_trait]
pub trait LabTestRepository: Send + Sync {
    async fn insert(&self, test: LabTest) -> Result<LabTest, RepositoryError>;

    async fn find(&self, id: Uuid) -> Result<Option<LabTest>, RepositoryError>;

    async fn list_for_lab(&self, lab_id: Uuid) -> Result<Vec<LabTest>, RepositoryError>;

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<LabTest>, RepositoryError>;

    async fn compare_and_set(
        &self,
        test: &LabTest,
        expected: LabTestStatus,
    ) -> Result<Option<LabTest>, RepositoryError>;
}

#[derive(Default)]
pub struct InMemoryLabTestRepository {
    rows: RwLock<HashMap<Uuid, LabTest>>,
}

impl InMemoryLabTestRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tests(tests: impl IntoIterator<Item = LabTest>) -> Self {
        let rows = tests.into_iter().map(|t| (t.id, t)).collect();
        Self { rows: RwLock::new(rows) }
    }

    async fn select(&self, predicate: impl Fn(&LabTest) -> bool) -> Vec<LabTest> {
        let mut rows: Vec<LabTest> = self
            .rows
            .read()
            .await
            .values()
            .filter(|t| predicate(t))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.requested_at.cmp(&a.requested_at).then_with(|| a.id.cmp(&b.id)));
        rows
    }
}

#[async_trait]
impl LabTestRepository for InMemoryLabTestRepository {
    async fn insert(&self, test: LabTest) -> Result<LabTest, RepositoryError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&test.id) {
            return Err(RepositoryError(format!("duplicate lab test id {}", test.id)));
        }
        rows.insert(test.id, test.clone());
        Ok(test)
    }

    async fn find(&self, id: Uuid) -> Result<Option<LabTest>, RepositoryError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn list_for_lab(&self, lab_id: Uuid) -> Result<Vec<LabTest>, RepositoryError> {
        Ok(self.select(|t| t.lab_id == lab_id).await)
    }

    async fn list_for_patient(&self, patient_id: Uuid) -> Result<Vec<LabTest>, RepositoryError> {
        Ok(self.select(|t| t.patient_id == patient_id).await)
    }

    async fn compare_and_set(
        &self,
        test: &LabTest,
        expected: LabTestStatus,
    ) -> Result<Option<LabTest>, RepositoryError> {
        let mut rows = self.rows.write().await;

        match rows.get_mut(&test.id) {
            Some(stored) if stored.status == expected => {
                stored.status = test.status;
                stored.result_file = test.result_file.clone();
                stored.completed_at = test.completed_at;
                Ok(Some(stored.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn lab_test(lab_id: Uuid, requested_days_ago: i64) -> LabTest {
        LabTest {
            id: Uuid::new_v4(),
            lab_id,
            patient_id: Uuid::new_v4(),
            test_name: "Thyroid Panel".to_string(),
            description: String::new(),
            appointment_date: Utc::now(),
            status: LabTestStatus::Pending,
            result_file: None,
            requested_at: Utc::now() - Duration::days(requested_days_ago),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn lab_listing_is_newest_first() {
        let lab = Uuid::new_v4();
        let older = lab_test(lab, 3);
        let newer = lab_test(lab, 1);
        let repository = InMemoryLabTestRepository::with_tests(vec![older.clone(), newer.clone(), lab_test(Uuid::new_v4(), 0)]);

        let ids: Vec<Uuid> = repository.list_for_lab(lab).await.unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn compare_and_set_requires_expected_status() {
        let test = lab_test(Uuid::new_v4(), 0);
        let repository = InMemoryLabTestRepository::with_tests(vec![test.clone()]);

        let mut accepted = test.clone();
        accepted.status = LabTestStatus::Accepted;
        assert!(repository.compare_and_set(&accepted, LabTestStatus::Pending).await.unwrap().is_some());

        let mut rejected = test.clone();
        rejected.status = LabTestStatus::Rejected;
        assert!(repository.compare_and_set(&rejected, LabTestStatus::Pending).await.unwrap().is_none());
        assert_eq!(repository.find(test.id).await.unwrap().unwrap().status, LabTestStatus::Accepted);
    }
}
