// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use notification_cell::Notifier;
use shared_database::directory::{Contact, Directory};
use shared_database::storage::{object_path, BlobStore, StoredFile};
use shared_models::auth::{Actor, ActorRole};

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest, SchedulingRules,
    SlotTime, UploadedFile,
};
use crate::services::notifications;
use crate::services::repository::AppointmentRepository;
use crate::services::slots::SlotCalendar;

/// Booking request after every field has been checked.
struct ValidatedBooking {
    doctor_id: Uuid,
    patient_id: Uuid,
    patient_name: String,
    date: NaiveDate,
    time: SlotTime,
}

pub struct AppointmentBookingService {
    repository: Arc<dyn AppointmentRepository>,
    calendar: SlotCalendar,
    directory: Arc<dyn Directory>,
    blobs: Arc<dyn BlobStore>,
    notifier: Notifier,
    rules: SchedulingRules,
    documents_bucket: String,
}

impl AppointmentBookingService {
    pub fn new(
        repository: Arc<dyn AppointmentRepository>,
        directory: Arc<dyn Directory>,
        blobs: Arc<dyn BlobStore>,
        notifier: Notifier,
        rules: SchedulingRules,
        documents_bucket: impl Into<String>,
    ) -> Self {
        Self {
            calendar: SlotCalendar::new(Arc::clone(&repository)),
            repository,
            directory,
            blobs,
            notifier,
            rules,
            documents_bucket: documents_bucket.into(),
        }
    }

    /// Admits a booking in `Pending`. The availability check gives the caller a
    /// clear reason; the repository's unique slot constraint closes the race
    /// between two concurrent admissions.
    #[instrument(skip(self, request, actor), fields(actor = %actor.id))]
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        let booking = self.validate_request(&request, actor)?;
        debug!(
            "Booking doctor {} for {} at {}",
            booking.doctor_id, booking.date, booking.time
        );

        if !self
            .calendar
            .is_available(booking.doctor_id, booking.date, &booking.time)
            .await?
        {
            warn!(
                "Slot {} {} already taken for doctor {}",
                booking.date, booking.time, booking.doctor_id
            );
            return Err(slot_taken(&booking));
        }

        let appointment_id = Uuid::new_v4();
        let document = match request.document {
            Some(file) => Some(self.store_document(appointment_id, file).await?),
            None => None,
        };

        let appointment = Appointment {
            id: appointment_id,
            doctor_id: booking.doctor_id,
            patient_id: booking.patient_id,
            patient_name: booking.patient_name,
            email: non_blank(request.email),
            phone: non_blank(request.phone),
            gender: non_blank(request.gender),
            date: booking.date,
            time: booking.time,
            symptoms: non_blank(request.symptoms),
            status: AppointmentStatus::Pending,
            prescription: None,
            medicines: Vec::new(),
            document,
            report_file: None,
            created_at: now,
            completed_at: None,
        };

        let created = match self.repository.insert(appointment).await {
            Ok(created) => created,
            Err(e) => {
                warn!("Appointment {} was not stored: {}", appointment_id, e);
                return Err(e.into());
            }
        };
        info!(
            "Appointment {} booked for doctor {} on {}",
            created.id,
            created.doctor_id,
            created.slot_token()
        );

        self.notify_booking(&created).await;
        Ok(created)
    }

    fn validate_request(
        &self,
        request: &BookAppointmentRequest,
        actor: &Actor,
    ) -> Result<ValidatedBooking, AppointmentError> {
        let doctor_id = request
            .doctor_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppointmentError::Validation("doctorId is required".to_string()))?;
        let doctor_id = Uuid::parse_str(doctor_id).map_err(|_| AppointmentError::InvalidId("doctor"))?;

        let patient_id = match request.patient_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            Some(raw) => Uuid::parse_str(raw).map_err(|_| AppointmentError::InvalidId("patient"))?,
            None if actor.is(ActorRole::Patient) => {
                Uuid::parse_str(&actor.id).map_err(|_| AppointmentError::InvalidId("patient"))?
            }
            None => return Err(AppointmentError::Validation("patientId is required".to_string())),
        };

        if !(actor.is(ActorRole::Admin) || (actor.is(ActorRole::Patient) && actor.owns(patient_id))) {
            return Err(AppointmentError::Forbidden(
                "Appointments can only be booked by the patient they are for".to_string(),
            ));
        }

        let patient_name = non_blank(request.patient_name.clone())
            .ok_or_else(|| AppointmentError::Validation("patientName is required".to_string()))?;

        let (raw_date, raw_time) = match (
            request.date.as_deref().map(str::trim).filter(|d| !d.is_empty()),
            request.time.as_deref().map(str::trim).filter(|t| !t.is_empty()),
        ) {
            (Some(date), Some(time)) => (date, time),
            _ => return Err(AppointmentError::Validation("Date and time are required".to_string())),
        };

        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|_| {
            AppointmentError::Validation(format!("Invalid date '{}', expected YYYY-MM-DD", raw_date))
        })?;
        let time = SlotTime::parse(raw_time)?;
        if !self.rules.is_bookable_slot(&time) {
            return Err(AppointmentError::UnknownSlot(time.to_string()));
        }

        Ok(ValidatedBooking {
            doctor_id,
            patient_id,
            patient_name,
            date,
            time,
        })
    }

    async fn store_document(&self, appointment_id: Uuid, file: UploadedFile) -> Result<StoredFile, AppointmentError> {
        let path = object_path(appointment_id, file.filename.as_deref());
        self.blobs
            .put(&self.documents_bucket, &path, file.data, &file.content_type, file.filename)
            .await
            .map_err(|e| AppointmentError::Storage(e.to_string()))
    }

    /// Both emails are best effort; a missing doctor profile only skips the
    /// doctor's copy.
    async fn notify_booking(&self, appointment: &Appointment) {
        let doctor: Option<Contact> = match self.directory.find_doctor(appointment.doctor_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Could not load doctor {} for notification: {}", appointment.doctor_id, e);
                None
            }
        };

        let messages = doctor
            .as_ref()
            .and_then(|d| notifications::booking_received_for_doctor(appointment, d))
            .into_iter()
            .chain(notifications::booking_sent_to_patient(appointment, doctor.as_ref()));

        self.notifier.dispatch_all(messages);
    }
}

fn slot_taken(booking: &ValidatedBooking) -> AppointmentError {
    AppointmentError::SlotNotAvailable {
        date: booking.date.format("%Y-%m-%d").to_string(),
        time: booking.time.to_string(),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
