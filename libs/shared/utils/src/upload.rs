use axum::extract::multipart::{Field, MultipartError};

use shared_models::error::AppError;

/// Request body cap for routes that accept file uploads.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// A file part read out of a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    /// Reads a file part. Browsers send an empty part when no file was chosen;
    /// that comes back as `None`.
    pub async fn from_field(field: Field<'_>) -> Result<Option<Self>, AppError> {
        let filename = field
            .file_name()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let data = field.bytes().await.map_err(multipart_error)?;
        if data.is_empty() {
            return Ok(None);
        }

        Ok(Some(Self {
            filename,
            content_type,
            data: data.to_vec(),
        }))
    }
}

pub fn multipart_error(error: MultipartError) -> AppError {
    AppError::BadRequest(format!("Failed to read form data: {}", error.body_text()))
}
