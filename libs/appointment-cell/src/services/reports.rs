// libs/appointment-cell/src/services/reports.rs
use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use shared_database::storage::{object_path, Blob, BlobStore, StorageError, StoredFile};
use shared_models::auth::{Actor, ActorRole};

use crate::models::{Appointment, AppointmentError, UploadedFile};
use crate::services::repository::AppointmentRepository;

pub struct AppointmentReportService {
    repository: Arc<dyn AppointmentRepository>,
    blobs: Arc<dyn BlobStore>,
    bucket: String,
}

impl AppointmentReportService {
    pub fn new(repository: Arc<dyn AppointmentRepository>, blobs: Arc<dyn BlobStore>, bucket: impl Into<String>) -> Self {
        Self {
            repository,
            blobs,
            bucket: bucket.into(),
        }
    }

    async fn load_for(&self, appointment_id: Uuid, actor: &Actor) -> Result<Appointment, AppointmentError> {
        let appointment = self
            .repository
            .find(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)?;

        let allowed = match actor.role {
            ActorRole::Doctor => actor.owns(appointment.doctor_id),
            ActorRole::Patient => actor.owns(appointment.patient_id),
            ActorRole::Admin => true,
            ActorRole::Lab | ActorRole::System => false,
        };
        if !allowed {
            warn!("{} {} denied access to appointment {}", actor.role, actor.id, appointment_id);
            return Err(AppointmentError::Forbidden(
                "Only the appointment's doctor or patient can access its report".to_string(),
            ));
        }
        Ok(appointment)
    }

    #[instrument(skip(self, file, actor), fields(actor = %actor.id))]
    pub async fn upload_report(
        &self,
        appointment_id: Uuid,
        file: UploadedFile,
        actor: &Actor,
    ) -> Result<Appointment, AppointmentError> {
        self.load_for(appointment_id, actor).await?;

        let path = object_path(format!("{}/reports", appointment_id), file.filename.as_deref());
        let stored = self
            .blobs
            .put(&self.bucket, &path, file.data, &file.content_type, file.filename)
            .await
            .map_err(|e| AppointmentError::Storage(e.to_string()))?;

        let updated = self
            .repository
            .attach_report(appointment_id, stored)
            .await?
            .ok_or(AppointmentError::NotFound)?;

        info!("Report attached to appointment {}", appointment_id);
        Ok(updated)
    }

    /// The uploaded report, or the booking document when no report exists yet.
    pub async fn open_report(&self, appointment_id: Uuid, actor: &Actor) -> Result<(StoredFile, Blob), AppointmentError> {
        let appointment = self.load_for(appointment_id, actor).await?;
        let file = appointment
            .report_file
            .or(appointment.document)
            .ok_or(AppointmentError::ReportNotFound)?;

        let blob = self.blobs.get(&file).await.map_err(|e| match e {
            StorageError::NotFound(_) => AppointmentError::ReportNotFound,
            other => AppointmentError::Storage(other.to_string()),
        })?;
        Ok((file, blob))
    }
}
