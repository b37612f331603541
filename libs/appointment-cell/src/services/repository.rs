// libs/appointment-cell/src/services/repository.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_database::storage::StoredFile;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("slot {0} is already held by another appointment")]
    SlotTaken(String),

    #[error("{0}")]
    Backend(String),
}

impl From<RepositoryError> for AppointmentError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::SlotTaken(token) => {
                let (date, time) = token.split_once('|').unwrap_or((token.as_str(), ""));
                AppointmentError::SlotNotAvailable {
                    date: date.to_string(),
                    time: time.to_string(),
                }
            }
            RepositoryError::Backend(message) => AppointmentError::Database(message),
        }
    }
}

/// Persistence seam for appointments.
///
/// `insert` must fail with [`RepositoryError::SlotTaken`] when another
/// non-rejected appointment already holds the same doctor/date/time, and
/// `compare_and_set` only writes when the stored status still equals
/// `expected`, returning `None` otherwise.
#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, RepositoryError>;

    async fn find(&self, id: Uuid) -> Result<Option<Appointment>, RepositoryError>;

    async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>, RepositoryError>;

    async fn list_for_patient(
        &self,
        patient_id: Uuid,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>, RepositoryError>;

    async fn list_by_status(
        &self,
        status: AppointmentStatus,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Appointment>, RepositoryError>;

    async fn compare_and_set(
        &self,
        appointment: &Appointment,
        expected: AppointmentStatus,
    ) -> Result<Option<Appointment>, RepositoryError>;

    async fn attach_report(&self, id: Uuid, report: StoredFile) -> Result<Option<Appointment>, RepositoryError>;
}

/// Process-local repository used by `STORAGE_BACKEND=memory` and the tests.
#[derive(Default)]
pub struct InMemoryAppointmentRepository {
    rows: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_appointments(appointments: impl IntoIterator<Item = Appointment>) -> Self {
        let rows = appointments.into_iter().map(|a| (a.id, a)).collect();
        Self { rows: RwLock::new(rows) }
    }

    pub async fn snapshot(&self) -> Vec<Appointment> {
        let mut rows: Vec<Appointment> = self.rows.read().await.values().cloned().collect();
        sort_newest_first(&mut rows);
        rows
    }

    async fn select(&self, predicate: impl Fn(&Appointment) -> bool) -> Vec<Appointment> {
        let mut rows: Vec<Appointment> = self
            .rows
            .read()
            .await
            .values()
            .filter(|a| predicate(a))
            .cloned()
            .collect();
        sort_newest_first(&mut rows);
        rows
    }
}

fn sort_newest_first(rows: &mut [Appointment]) {
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

#[async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, RepositoryError> {
        // Single write guard: the uniqueness check and the insert are atomic.
        let mut rows = self.rows.write().await;

        let clash = rows.values().any(|existing| {
            existing.doctor_id == appointment.doctor_id
                && existing.date == appointment.date
                && existing.time == appointment.time
                && existing.status.holds_slot()
        });
        if clash && appointment.status.holds_slot() {
            return Err(RepositoryError::SlotTaken(appointment.slot_token()));
        }
        if rows.contains_key(&appointment.id) {
            return Err(RepositoryError::Backend(format!("duplicate appointment id {}", appointment.id)));
        }

        rows.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Appointment>, RepositoryError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        Ok(self
            .select(|a| a.doctor_id == doctor_id && status.map_or(true, |s| a.status == s))
            .await)
    }

    async fn list_for_patient(
        &self,
        patient_id: Uuid,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        Ok(self
            .select(|a| a.patient_id == patient_id && status.map_or(true, |s| a.status == s))
            .await)
    }

    async fn list_by_status(
        &self,
        status: AppointmentStatus,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        Ok(self
            .select(|a| a.status == status && date.map_or(true, |d| a.date == d))
            .await)
    }

    async fn compare_and_set(
        &self,
        appointment: &Appointment,
        expected: AppointmentStatus,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let mut rows = self.rows.write().await;

        match rows.get_mut(&appointment.id) {
            Some(stored) if stored.status == expected => {
                stored.status = appointment.status;
                stored.prescription = appointment.prescription.clone();
                stored.medicines = appointment.medicines.clone();
                stored.completed_at = appointment.completed_at;
                Ok(Some(stored.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn attach_report(&self, id: Uuid, report: StoredFile) -> Result<Option<Appointment>, RepositoryError> {
        let mut rows = self.rows.write().await;

        Ok(rows.get_mut(&id).map(|stored| {
            stored.report_file = Some(report);
            stored.clone()
        }))
    }
}
