use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::supabase::{SupabaseClient, SupabaseError};

/// Reference to an uploaded object, persisted on the owning row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub bucket: String,
    pub path: String,
    pub content_type: String,
    pub filename: Option<String>,
    pub size_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct Blob {
    pub data: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Stored file not found: {0}")]
    NotFound(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
        filename: Option<String>,
    ) -> Result<StoredFile, StorageError>;

    async fn get(&self, file: &StoredFile) -> Result<Blob, StorageError>;
}

/// Builds a collision-free object path under `prefix`, keeping a readable file stem.
pub fn object_path(prefix: impl std::fmt::Display, filename: Option<&str>) -> String {
    let stem: String = filename
        .unwrap_or("upload")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();

    format!("{}/{}-{}", prefix, Uuid::new_v4(), stem)
}

pub struct SupabaseBlobStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseBlobStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl BlobStore for SupabaseBlobStore {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
        filename: Option<String>,
    ) -> Result<StoredFile, StorageError> {
        let size_bytes = data.len();
        self.supabase
            .upload_object(bucket, path, data, content_type)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        info!("Stored {} bytes at {}/{}", size_bytes, bucket, path);
        Ok(StoredFile {
            bucket: bucket.to_string(),
            path: path.to_string(),
            content_type: content_type.to_string(),
            filename,
            size_bytes,
        })
    }

    async fn get(&self, file: &StoredFile) -> Result<Blob, StorageError> {
        debug!("Downloading {}/{}", file.bucket, file.path);
        let (data, reported_type) = self
            .supabase
            .download_object(&file.bucket, &file.path)
            .await
            .map_err(|e| match e {
                SupabaseError::NotFound(_) => StorageError::NotFound(file.path.clone()),
                other => StorageError::Backend(other.to_string()),
            })?;

        Ok(Blob {
            data,
            content_type: reported_type.unwrap_or_else(|| file.content_type.clone()),
        })
    }
}

#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: RwLock<HashMap<(String, String), Blob>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
        filename: Option<String>,
    ) -> Result<StoredFile, StorageError> {
        let size_bytes = data.len();
        self.objects.write().await.insert(
            (bucket.to_string(), path.to_string()),
            Blob {
                data,
                content_type: content_type.to_string(),
            },
        );

        Ok(StoredFile {
            bucket: bucket.to_string(),
            path: path.to_string(),
            content_type: content_type.to_string(),
            filename,
            size_bytes,
        })
    }

    async fn get(&self, file: &StoredFile) -> Result<Blob, StorageError> {
        self.objects
            .read()
            .await
            .get(&(file.bucket.clone(), file.path.clone()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(file.path.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_path_sanitises_filename() {
        let path = object_path("appointments/42", Some("blood test (1).pdf"));
        assert!(path.starts_with("appointments/42/"));
        assert!(path.ends_with("-blood_test__1_.pdf"));
    }

    #[tokio::test]
    async fn in_memory_store_round_trips_bytes_and_content_type() {
        let store = InMemoryBlobStore::new();
        let stored = store
            .put("reports", "a/b.pdf", b"%PDF-1.7".to_vec(), "application/pdf", Some("b.pdf".into()))
            .await
            .unwrap();

        assert_eq!(stored.size_bytes, 8);
        let blob = store.get(&stored).await.unwrap();
        assert_eq!(blob.content_type, "application/pdf");
        assert_eq!(blob.data, b"%PDF-1.7");

        let missing = StoredFile { path: "nope".into(), ..stored };
        assert!(matches!(store.get(&missing).await, Err(StorageError::NotFound(_))));
    }
}
