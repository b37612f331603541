// libs/appointment-cell/src/services/queries.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, AppointmentWithReport};
use crate::services::reconciler::TemporalReconciler;
use crate::services::repository::AppointmentRepository;

/// Dashboard listings. Doctor listings that can contain `Approved` rows run
/// the lazy missed sweep first so they reflect elapsed time.
pub struct AppointmentQueryService {
    repository: Arc<dyn AppointmentRepository>,
    reconciler: Arc<TemporalReconciler>,
}

impl AppointmentQueryService {
    pub fn new(repository: Arc<dyn AppointmentRepository>, reconciler: Arc<TemporalReconciler>) -> Self {
        Self { repository, reconciler }
    }

    pub async fn by_status_for_doctor(
        &self,
        doctor_id: Uuid,
        status: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let report = self.reconciler.sweep_missed_for_doctor(doctor_id, now).await;
        debug!("Lazy sweep for doctor {}: {:?}", doctor_id, report);

        Ok(self.repository.list_for_doctor(doctor_id, Some(status)).await?)
    }

    pub async fn pending_for_doctor(&self, doctor_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        Ok(self
            .repository
            .list_for_doctor(doctor_id, Some(AppointmentStatus::Pending))
            .await?)
    }

    /// Approved and in-progress appointments in calendar order.
    pub async fn active_for_doctor(
        &self,
        doctor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.reconciler.sweep_missed_for_doctor(doctor_id, now).await;

        let mut active: Vec<Appointment> = self
            .repository
            .list_for_doctor(doctor_id, None)
            .await?
            .into_iter()
            .filter(|a| matches!(a.status, AppointmentStatus::Approved | AppointmentStatus::InProgress))
            .collect();
        active.sort_by_key(|a| (a.date, a.time.naive_time()));
        Ok(active)
    }

    pub async fn for_patient(
        &self,
        patient_id: Uuid,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<AppointmentWithReport>, AppointmentError> {
        Ok(self
            .repository
            .list_for_patient(patient_id, status)
            .await?
            .into_iter()
            .map(AppointmentWithReport::from)
            .collect())
    }
}
