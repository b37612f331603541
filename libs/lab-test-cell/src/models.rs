// libs/lab-test-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::storage::StoredFile;
use shared_models::error::AppError;

pub use shared_utils::upload::UploadedFile;

// ==============================================================================
// CORE LAB TEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabTest {
    pub id: Uuid,
    pub lab_id: Uuid,
    pub patient_id: Uuid,
    pub test_name: String,
    #[serde(default)]
    pub description: String,
    pub appointment_date: DateTime<Utc>,
    pub status: LabTestStatus,
    pub result_file: Option<StoredFile>,
    pub requested_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LabTest {
    /// Download name for the result, keeping the stored file's extension.
    pub fn result_filename(&self) -> String {
        let extension = self
            .result_file
            .as_ref()
            .and_then(|file| file.filename.as_deref())
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_string())
            .unwrap_or_else(|| "pdf".to_string());

        let stem: String = self
            .test_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();

        format!("{}-result.{}", stem, extension)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LabTestStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

impl LabTestStatus {
    pub const ALL: [LabTestStatus; 4] = [
        LabTestStatus::Pending,
        LabTestStatus::Accepted,
        LabTestStatus::Rejected,
        LabTestStatus::Completed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            LabTestStatus::Pending => "pending",
            LabTestStatus::Accepted => "accepted",
            LabTestStatus::Rejected => "rejected",
            LabTestStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LabTestStatus::Rejected | LabTestStatus::Completed)
    }
}

impl fmt::Display for LabTestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for LabTestStatus {
    type Err = LabTestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        LabTestStatus::ALL
            .into_iter()
            .find(|status| status.label() == wanted)
            .ok_or_else(|| LabTestError::Validation(format!("Unknown lab test status: {}", value.trim())))
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookLabTestRequest {
    #[serde(alias = "lab_id")]
    pub lab_id: Option<String>,
    #[serde(alias = "patient_id")]
    pub patient_id: Option<String>,
    #[serde(alias = "test_name")]
    pub test_name: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "appointment_date")]
    pub appointment_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateLabTestRequest {
    pub status: String,
}

/// Accepts an RFC 3339 instant, or a naive date / date-time read in the
/// clinic's local time.
pub fn parse_appointment_date(raw: &str, offset: FixedOffset) -> Result<DateTime<Utc>, LabTestError> {
    let raw = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }

    let local = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
        .ok_or_else(|| LabTestError::Validation(format!("Invalid appointment date '{}'", raw)))?;

    offset
        .from_local_datetime(&local)
        .single()
        .map(|instant| instant.with_timezone(&Utc))
        .ok_or_else(|| LabTestError::Validation(format!("Invalid appointment date '{}'", raw)))
}

pub fn parse_id(raw: &str, what: &'static str) -> Result<Uuid, LabTestError> {
    Uuid::parse_str(raw.trim()).map_err(|_| LabTestError::InvalidId(what))
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum LabTestError {
    #[error("Lab test not found")]
    NotFound,

    #[error("Lab not found")]
    LabNotFound,

    #[error("Invalid {0} ID")]
    InvalidId(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: LabTestStatus, to: LabTestStatus },

    #[error("A result file is required to complete a lab test")]
    ResultFileRequired,

    #[error("Results cannot be uploaded before the test date ({0})")]
    TestNotYetDue(DateTime<Utc>),

    #[error("{0}")]
    Forbidden(String),

    #[error("Lab test was updated by someone else, reload and try again")]
    ConcurrentModification,

    #[error("Result file not found")]
    ResultNotFound,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<LabTestError> for AppError {
    fn from(error: LabTestError) -> Self {
        let message = error.to_string();
        match error {
            LabTestError::NotFound | LabTestError::LabNotFound | LabTestError::ResultNotFound => {
                AppError::NotFound(message)
            }
            LabTestError::InvalidId(_)
            | LabTestError::Validation(_)
            | LabTestError::InvalidTransition { .. }
            | LabTestError::ResultFileRequired
            | LabTestError::TestNotYetDue(_) => AppError::BadRequest(message),
            LabTestError::Forbidden(_) => AppError::Forbidden(message),
            LabTestError::ConcurrentModification => AppError::Conflict(message),
            LabTestError::Database(_) => AppError::Database(message),
            LabTestError::Storage(_) => AppError::Internal(message),
        }
    }
}
