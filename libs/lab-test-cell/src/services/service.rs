// libs/lab-test-cell/src/services/service.rs
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use notification_cell::Notifier;
use shared_database::directory::Directory;
use shared_database::storage::{object_path, Blob, BlobStore, StorageError, StoredFile};
use shared_models::auth::{Actor, ActorRole};

use crate::models::{
    parse_appointment_date, parse_id, BookLabTestRequest, LabTest, LabTestError, LabTestStatus, UploadedFile,
};
use crate::services::lifecycle::LabTestLifecycleService;
use crate::services::notifications;
use crate::services::repository::LabTestRepository;

/// Lab-side settings the service needs from configuration.
#[derive(Debug, Clone)]
pub struct LabTestSettings {
    pub results_bucket: String,
    pub notify_on_completion: bool,
    pub clinic_offset: FixedOffset,
}

pub struct LabTestService {
    repository: Arc<dyn LabTestRepository>,
    directory: Arc<dyn Directory>,
    blobs: Arc<dyn BlobStore>,
    notifier: Notifier,
    lifecycle: LabTestLifecycleService,
    settings: LabTestSettings,
}

impl LabTestService {
    pub fn new(
        repository: Arc<dyn LabTestRepository>,
        directory: Arc<dyn Directory>,
        blobs: Arc<dyn BlobStore>,
        notifier: Notifier,
        settings: LabTestSettings,
    ) -> Self {
        Self {
            repository,
            directory,
            blobs,
            notifier,
            lifecycle: LabTestLifecycleService::new(),
            settings,
        }
    }

    #[instrument(skip(self, request, actor), fields(actor = %actor.id))]
    pub async fn book_test(
        &self,
        request: BookLabTestRequest,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<LabTest, LabTestError> {
        let required = |value: &Option<String>| value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);

        let patient_id = required(&request.patient_id)
            .or_else(|| actor.is(ActorRole::Patient).then(|| actor.id.clone()));
        let (Some(lab_id), Some(test_name), Some(patient_id), Some(appointment_date)) = (
            required(&request.lab_id),
            required(&request.test_name),
            patient_id,
            required(&request.appointment_date),
        ) else {
            return Err(LabTestError::Validation(
                "Lab ID, test name, patient ID, and appointment date are required".to_string(),
            ));
        };

        let lab_id = parse_id(&lab_id, "lab")?;
        let patient_id = parse_id(&patient_id, "patient")?;
        if !(actor.is(ActorRole::Admin) || (actor.is(ActorRole::Patient) && actor.owns(patient_id))) {
            warn!("{} {} tried to book a lab test for patient {}", actor.role, actor.id, patient_id);
            return Err(LabTestError::Forbidden("Patients can only book tests for themselves".to_string()));
        }
        let appointment_date = parse_appointment_date(&appointment_date, self.settings.clinic_offset)?;

        let lab = self
            .directory
            .find_lab(lab_id)
            .await
            .map_err(|e| LabTestError::Database(e.to_string()))?
            .ok_or(LabTestError::LabNotFound)?;
        debug!("Booking {} at lab {}", test_name, lab.name);

        let test = LabTest {
            id: Uuid::new_v4(),
            lab_id,
            patient_id,
            test_name,
            description: request.description.unwrap_or_default().trim().to_string(),
            appointment_date,
            status: LabTestStatus::Pending,
            result_file: None,
            requested_at: now,
            completed_at: None,
        };

        let saved = self.repository.insert(test).await?;
        info!("Lab test {} booked for patient {}", saved.id, saved.patient_id);
        Ok(saved)
    }

    /// Status change requested by the lab. Completion goes through
    /// [`LabTestService::upload_result`], which carries the file.
    #[instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn update_status(
        &self,
        test_id: Uuid,
        requested: LabTestStatus,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<LabTest, LabTestError> {
        let current = self.load(test_id).await?;
        let updated = self.lifecycle.attempt_transition(&current, requested, None, actor, now)?;
        self.save(updated, current.status).await
    }

    #[instrument(skip(self, file, actor), fields(actor = %actor.id))]
    pub async fn upload_result(
        &self,
        test_id: Uuid,
        file: UploadedFile,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<LabTest, LabTestError> {
        let current = self.load(test_id).await?;
        self.lifecycle
            .check_transition(&current, LabTestStatus::Completed, true, actor, now)?;

        let path = object_path(test_id, file.filename.as_deref());
        let stored = self
            .blobs
            .put(&self.settings.results_bucket, &path, file.data, &file.content_type, file.filename)
            .await
            .map_err(|e| LabTestError::Storage(e.to_string()))?;

        let updated = self
            .lifecycle
            .attempt_transition(&current, LabTestStatus::Completed, Some(stored), actor, now)?;
        self.save(updated, current.status).await
    }

    /// The result file, for the assigned lab, the patient or an admin.
    pub async fn open_result(&self, test_id: Uuid, actor: &Actor) -> Result<(LabTest, StoredFile, Blob), LabTestError> {
        let test = self.load(test_id).await?;

        let allowed = match actor.role {
            ActorRole::Lab => actor.owns(test.lab_id),
            ActorRole::Patient => actor.owns(test.patient_id),
            ActorRole::Admin => true,
            ActorRole::Doctor | ActorRole::System => false,
        };
        if !allowed {
            return Err(LabTestError::Forbidden(
                "Only the lab or the patient can download this result".to_string(),
            ));
        }

        let file = test.result_file.clone().ok_or(LabTestError::ResultNotFound)?;
        let blob = self.blobs.get(&file).await.map_err(|e| match e {
            StorageError::NotFound(_) => LabTestError::ResultNotFound,
            other => LabTestError::Storage(other.to_string()),
        })?;
        Ok((test, file, blob))
    }

    pub async fn requests_for_lab(&self, lab_id: Uuid) -> Result<Vec<LabTest>, LabTestError> {
        Ok(self.repository.list_for_lab(lab_id).await?)
    }

    pub async fn tests_for_patient(&self, patient_id: Uuid) -> Result<Vec<LabTest>, LabTestError> {
        Ok(self.repository.list_for_patient(patient_id).await?)
    }

    async fn load(&self, test_id: Uuid) -> Result<LabTest, LabTestError> {
        self.repository.find(test_id).await?.ok_or(LabTestError::NotFound)
    }

    async fn save(&self, updated: LabTest, expected: LabTestStatus) -> Result<LabTest, LabTestError> {
        let saved = self
            .repository
            .compare_and_set(&updated, expected)
            .await?
            .ok_or_else(|| {
                warn!("Lab test {} changed while {} was being applied", updated.id, updated.status);
                LabTestError::ConcurrentModification
            })?;

        self.notify(&saved).await;
        info!("Lab test {} is now {}", saved.id, saved.status);
        Ok(saved)
    }

    async fn notify(&self, test: &LabTest) {
        let patient = match self.directory.find_patient(test.patient_id).await {
            Ok(Some(patient)) => patient,
            Ok(None) => {
                debug!("Patient {} has no profile, skipping notification", test.patient_id);
                return;
            }
            Err(e) => {
                warn!("Could not look up patient {}: {}", test.patient_id, e);
                return;
            }
        };

        if let Some(message) = notifications::for_status(test, &patient, self.settings.notify_on_completion) {
            self.notifier.dispatch(message);
        }
    }
}
