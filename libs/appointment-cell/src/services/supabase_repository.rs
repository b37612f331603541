// libs/appointment-cell/src/services/supabase_repository.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::storage::StoredFile;
use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{Appointment, AppointmentStatus};
use crate::services::repository::{AppointmentRepository, RepositoryError};

const TABLE: &str = "/rest/v1/appointments";

/// PostgREST-backed repository. The `appointments_active_slot_key` partial
/// unique index turns a double booking into a 409, which maps to
/// [`RepositoryError::SlotTaken`].
pub struct SupabaseAppointmentRepository {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentRepository {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn select(&self, filters: Vec<String>) -> Result<Vec<Appointment>, RepositoryError> {
        let mut query = filters;
        query.push("order=created_at.desc".to_string());
        let path = format!("{}?{}", TABLE, query.join("&"));

        self.supabase
            .request::<Vec<Appointment>>(Method::GET, &path, None)
            .await
            .map_err(backend)
    }
}

fn backend(error: SupabaseError) -> RepositoryError {
    RepositoryError::Backend(error.to_string())
}

fn status_filter(status: AppointmentStatus) -> String {
    format!("status=eq.{}", urlencoding::encode(status.label()))
}

#[async_trait]
impl AppointmentRepository for SupabaseAppointmentRepository {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, RepositoryError> {
        let body = serde_json::to_value(&appointment).map_err(|e| RepositoryError::Backend(e.to_string()))?;

        let rows: Vec<Appointment> = self
            .supabase
            .request_returning(Method::POST, TABLE, body)
            .await
            .map_err(|e| match e {
                SupabaseError::Conflict(details) => {
                    debug!("Unique slot index rejected insert: {}", details);
                    RepositoryError::SlotTaken(appointment.slot_token())
                }
                other => backend(other),
            })?;

        rows.into_iter()
            .next()
            .ok_or_else(|| RepositoryError::Backend("insert returned no rows".to_string()))
    }

    async fn find(&self, id: Uuid) -> Result<Option<Appointment>, RepositoryError> {
        let path = format!("{}?id=eq.{}&limit=1", TABLE, id);
        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(backend)?;

        Ok(rows.into_iter().next())
    }

    async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let mut filters = vec![format!("doctor_id=eq.{}", doctor_id)];
        filters.extend(status.map(status_filter));
        self.select(filters).await
    }

    async fn list_for_patient(
        &self,
        patient_id: Uuid,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let mut filters = vec![format!("patient_id=eq.{}", patient_id)];
        filters.extend(status.map(status_filter));
        self.select(filters).await
    }

    async fn list_by_status(
        &self,
        status: AppointmentStatus,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Appointment>, RepositoryError> {
        let mut filters = vec![status_filter(status)];
        filters.extend(date.map(|d| format!("date=eq.{}", d.format("%Y-%m-%d"))));
        self.select(filters).await
    }

    async fn compare_and_set(
        &self,
        appointment: &Appointment,
        expected: AppointmentStatus,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let path = format!("{}?id=eq.{}&{}", TABLE, appointment.id, status_filter(expected));
        let body: Value = json!({
            "status": appointment.status,
            "prescription": appointment.prescription,
            "medicines": appointment.medicines,
            "completed_at": appointment.completed_at,
        });

        let rows: Vec<Appointment> = self
            .supabase
            .request_returning(Method::PATCH, &path, body)
            .await
            .map_err(backend)?;

        if rows.is_empty() {
            warn!(
                "Status of appointment {} was no longer {} when writing {}",
                appointment.id, expected, appointment.status
            );
        }
        Ok(rows.into_iter().next())
    }

    async fn attach_report(&self, id: Uuid, report: StoredFile) -> Result<Option<Appointment>, RepositoryError> {
        let path = format!("{}?id=eq.{}", TABLE, id);
        let rows: Vec<Appointment> = self
            .supabase
            .request_returning(Method::PATCH, &path, json!({ "report_file": report }))
            .await
            .map_err(backend)?;

        Ok(rows.into_iter().next())
    }
}
