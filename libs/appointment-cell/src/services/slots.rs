// libs/appointment-cell/src/services/slots.rs
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use crate::models::{slot_token, AppointmentError, SlotTime};
use crate::services::repository::AppointmentRepository;

/// Read-side view of which slots a doctor has given away.
pub struct SlotCalendar {
    repository: Arc<dyn AppointmentRepository>,
}

impl SlotCalendar {
    pub fn new(repository: Arc<dyn AppointmentRepository>) -> Self {
        Self { repository }
    }

    /// `"<date>|<time>"` tokens for every appointment of the doctor that still
    /// holds its slot. Rejected appointments are left out.
    pub async fn booked_slots(&self, doctor_id: Uuid) -> Result<BTreeSet<String>, AppointmentError> {
        let appointments = self.repository.list_for_doctor(doctor_id, None).await?;

        let booked: BTreeSet<String> = appointments
            .iter()
            .filter(|a| a.status.holds_slot())
            .map(|a| a.slot_token())
            .collect();

        debug!("Doctor {} has {} booked slots", doctor_id, booked.len());
        Ok(booked)
    }

    pub async fn is_available(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: &SlotTime,
    ) -> Result<bool, AppointmentError> {
        let booked = self.booked_slots(doctor_id).await?;
        Ok(!booked.contains(&slot_token(date, time)))
    }
}
