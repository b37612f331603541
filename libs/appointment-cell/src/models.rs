// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::storage::StoredFile;
use shared_models::error::AppError;

pub use shared_utils::upload::UploadedFile;

/// Slots a doctor can be booked into each day.
pub const DEFAULT_DAILY_SLOTS: [&str; 7] = [
    "09:00 am",
    "10:00 am",
    "11:00 am",
    "12:00 pm",
    "01:30 pm",
    "03:00 pm",
    "04:30 pm",
];

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub date: NaiveDate,
    pub time: SlotTime,
    pub symptoms: Option<String>,
    pub status: AppointmentStatus,
    pub prescription: Option<String>,
    #[serde(default)]
    pub medicines: Vec<Medicine>,
    pub document: Option<StoredFile>,
    pub report_file: Option<StoredFile>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Appointment {
    /// `"<date>|<time>"`, the token the booking UI uses to grey out taken slots.
    pub fn slot_token(&self) -> String {
        slot_token(self.date, &self.time)
    }

    pub fn report_url(&self) -> Option<String> {
        (self.report_file.is_some() || self.document.is_some())
            .then(|| format!("/api/appointments/view-report/{}", self.id))
    }
}

pub fn slot_token(date: NaiveDate, time: &SlotTime) -> String {
    format!("{}|{}", date.format("%Y-%m-%d"), time.label())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AppointmentStatus {
    Pending,
    Approved,
    Rejected,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Missed,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 6] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Approved,
        AppointmentStatus::Rejected,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
        AppointmentStatus::Missed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "Pending",
            AppointmentStatus::Approved => "Approved",
            AppointmentStatus::Rejected => "Rejected",
            AppointmentStatus::InProgress => "In Progress",
            AppointmentStatus::Completed => "Completed",
            AppointmentStatus::Missed => "Missed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Rejected | AppointmentStatus::Completed | AppointmentStatus::Missed
        )
    }

    /// Whether an appointment in this status keeps its slot taken.
    pub fn holds_slot(&self) -> bool {
        !matches!(self, AppointmentStatus::Rejected)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted: String = value
            .trim()
            .chars()
            .map(|c| if c == '_' || c == '-' { ' ' } else { c })
            .collect();

        Self::ALL
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| AppointmentError::Validation(format!("Unknown appointment status: {}", value)))
    }
}

/// A 12-hour slot label such as `"09:00 am"`, kept in normalised form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotTime {
    label: String,
    time: NaiveTime,
}

fn slot_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\d{1,2}):(\d{2})\s*([aApP][mM])\s*$").expect("slot pattern is valid")
    })
}

impl SlotTime {
    pub fn parse(label: &str) -> Result<Self, AppointmentError> {
        let invalid = || AppointmentError::Validation(format!("Invalid time slot '{}', expected hh:mm am|pm", label));

        let captures = slot_pattern().captures(label).ok_or_else(invalid)?;
        let hour: u32 = captures[1].parse().map_err(|_| invalid())?;
        let minute: u32 = captures[2].parse().map_err(|_| invalid())?;
        let meridian = captures[3].to_ascii_lowercase();

        if !(1..=12).contains(&hour) || minute > 59 {
            return Err(invalid());
        }

        let hour24 = match (meridian.as_str(), hour) {
            ("am", 12) => 0,
            ("am", h) => h,
            ("pm", 12) => 12,
            (_, h) => h + 12,
        };
        let time = NaiveTime::from_hms_opt(hour24, minute, 0).ok_or_else(invalid)?;

        Ok(Self {
            label: format!("{:02}:{:02} {}", hour, minute, meridian),
            time,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn naive_time(&self) -> NaiveTime {
        self.time
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl TryFrom<String> for SlotTime {
    type Error = AppointmentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SlotTime::parse(&value)
    }
}

impl From<SlotTime> for String {
    fn from(slot: SlotTime) -> Self {
        slot.label
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Medicine {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    #[serde(default)]
    pub timing: Vec<MedicineTiming>,
}

/// Declaration order is the order medicines are grouped in patient emails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MedicineTiming {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl fmt::Display for MedicineTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MedicineTiming::Morning => "Morning",
            MedicineTiming::Afternoon => "Afternoon",
            MedicineTiming::Evening => "Evening",
            MedicineTiming::Night => "Night",
        };
        f.write_str(label)
    }
}

/// Appointment row plus the link the patient dashboard uses to open the report.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentWithReport {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub report_url: Option<String>,
}

impl From<Appointment> for AppointmentWithReport {
    fn from(appointment: Appointment) -> Self {
        let report_url = appointment.report_url();
        Self {
            appointment,
            report_url,
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// Booking form as submitted; every field is validated by booking admission.
#[derive(Debug, Clone, Default)]
pub struct BookAppointmentRequest {
    pub doctor_id: Option<String>,
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub email: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub symptoms: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub document: Option<UploadedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub prescription: Option<String>,
    pub medicines: Option<Vec<Medicine>>,
}

/// Clinical artifacts that accompany a transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionPayload {
    pub prescription: Option<String>,
    pub medicines: Option<Vec<Medicine>>,
}

// ==============================================================================
// SCHEDULING RULES
// ==============================================================================

#[derive(Debug, Clone)]
pub struct SchedulingRules {
    pub utc_offset: FixedOffset,
    pub start_grace: Duration,
    pub missed_after: Duration,
    pub reminder_hour: u32,
    pub daily_slots: Vec<SlotTime>,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            utc_offset: Utc.fix(),
            start_grace: Duration::minutes(5),
            missed_after: Duration::hours(24),
            reminder_hour: 8,
            daily_slots: DEFAULT_DAILY_SLOTS
                .iter()
                .filter_map(|label| SlotTime::parse(label).ok())
                .collect(),
        }
    }
}

impl SchedulingRules {
    pub fn from_config(config: &AppConfig) -> Self {
        let defaults = Self::default();
        Self {
            utc_offset: FixedOffset::east_opt(config.clinic_utc_offset_minutes * 60)
                .unwrap_or(defaults.utc_offset),
            reminder_hour: config.reminder_hour,
            ..defaults
        }
    }

    /// Converts a clinic-local wall-clock reading into an instant.
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let offset = Duration::seconds(self.utc_offset.local_minus_utc() as i64);
        Utc.from_utc_datetime(&(local - offset))
    }

    pub fn appointment_instant(&self, date: NaiveDate, time: &SlotTime) -> DateTime<Utc> {
        self.to_utc(date.and_time(time.naive_time()))
    }

    /// Last second of `date` in clinic-local time.
    pub fn end_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        self.to_utc(date.and_time(last_second))
    }

    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.utc_offset).date_naive()
    }

    pub fn is_bookable_slot(&self, time: &SlotTime) -> bool {
        self.daily_slots.iter().any(|slot| slot == time)
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Invalid {0} ID")]
    InvalidId(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("{0} is not one of the clinic's appointment slots")]
    UnknownSlot(String),

    #[error("Slot {date} at {time} is already booked for this doctor")]
    SlotNotAvailable { date: String, time: String },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Prescription is required to complete appointment")]
    PrescriptionRequired,

    #[error("Treatment can only be started between {opens} and {closes}")]
    OutsideTreatmentWindow {
        opens: DateTime<Utc>,
        closes: DateTime<Utc>,
    },

    #[error("{0}")]
    Forbidden(String),

    #[error("Appointment was updated by someone else, reload and try again")]
    ConcurrentModification,

    #[error("Report not found")]
    ReportNotFound,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<AppointmentError> for AppError {
    fn from(error: AppointmentError) -> Self {
        let message = error.to_string();
        match error {
            AppointmentError::NotFound | AppointmentError::ReportNotFound => AppError::NotFound(message),
            AppointmentError::InvalidId(_)
            | AppointmentError::Validation(_)
            | AppointmentError::UnknownSlot(_)
            | AppointmentError::SlotNotAvailable { .. }
            | AppointmentError::InvalidTransition { .. }
            | AppointmentError::PrescriptionRequired
            | AppointmentError::OutsideTreatmentWindow { .. } => AppError::BadRequest(message),
            AppointmentError::Forbidden(_) => AppError::Forbidden(message),
            AppointmentError::ConcurrentModification => AppError::Conflict(message),
            AppointmentError::Database(_) => AppError::Database(message),
            AppointmentError::Storage(_) => AppError::Internal(message),
        }
    }
}

pub fn parse_id(raw: &str, what: &'static str) -> Result<Uuid, AppointmentError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppointmentError::InvalidId(what))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_labels_convert_to_24_hour_time() {
        let cases = [
            ("09:00 am", 9, 0),
            ("12:00 pm", 12, 0),
            ("12:15 am", 0, 15),
            ("01:30 pm", 13, 30),
            ("4:30 PM", 16, 30),
        ];
        for (label, hour, minute) in cases {
            let slot = SlotTime::parse(label).unwrap();
            assert_eq!(slot.naive_time(), NaiveTime::from_hms_opt(hour, minute, 0).unwrap(), "{}", label);
        }
    }

    #[test]
    fn slot_labels_are_normalised() {
        assert_eq!(SlotTime::parse("4:30 PM").unwrap().label(), "04:30 pm");
        assert_eq!(SlotTime::parse(" 09:00am ").unwrap().label(), "09:00 am");
    }

    #[test]
    fn malformed_slot_labels_are_rejected() {
        for label in ["13:00 pm", "00:30 am", "09:60 am", "09:00", "nine am", ""] {
            assert!(SlotTime::parse(label).is_err(), "{}", label);
        }
    }

    #[test]
    fn status_parses_display_labels_case_insensitively() {
        assert_eq!("in progress".parse::<AppointmentStatus>().unwrap(), AppointmentStatus::InProgress);
        assert_eq!("In_Progress".parse::<AppointmentStatus>().unwrap(), AppointmentStatus::InProgress);
        assert_eq!("APPROVED".parse::<AppointmentStatus>().unwrap(), AppointmentStatus::Approved);
        assert!("cancelled".parse::<AppointmentStatus>().is_err());
    }

    #[test]
    fn status_serialises_with_display_label() {
        let json = serde_json::to_string(&AppointmentStatus::InProgress).unwrap();
        assert_eq!(json, "\"In Progress\"");
    }

    #[test]
    fn rejected_is_the_only_status_that_releases_a_slot() {
        for status in AppointmentStatus::ALL {
            assert_eq!(status.holds_slot(), status != AppointmentStatus::Rejected);
        }
    }

    #[test]
    fn clinic_offset_shifts_appointment_instant() {
        let rules = SchedulingRules {
            utc_offset: FixedOffset::east_opt(5 * 3600 + 1800).unwrap(),
            ..SchedulingRules::default()
        };
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let slot = SlotTime::parse("09:00 am").unwrap();

        let instant = rules.appointment_instant(date, &slot);
        assert_eq!(instant.to_rfc3339(), "2025-03-01T03:30:00+00:00");
    }

    #[test]
    fn only_listed_slots_are_bookable() {
        let rules = SchedulingRules::default();
        assert!(rules.is_bookable_slot(&SlotTime::parse("01:30 pm").unwrap()));
        assert!(!rules.is_bookable_slot(&SlotTime::parse("02:00 pm").unwrap()));
    }
}
