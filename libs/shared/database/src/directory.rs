use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::supabase::SupabaseClient;

/// Name and address used when composing notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    #[serde(alias = "full_name")]
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Error)]
#[error("Directory lookup failed: {0}")]
pub struct DirectoryError(pub String);

/// Identity/profile lookups against the doctor, patient and lab stores.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_doctor(&self, id: Uuid) -> Result<Option<Contact>, DirectoryError>;
    async fn find_patient(&self, id: Uuid) -> Result<Option<Contact>, DirectoryError>;
    async fn find_lab(&self, id: Uuid) -> Result<Option<Contact>, DirectoryError>;
}

pub struct SupabaseDirectory {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn find_in(&self, table: &str, id: Uuid) -> Result<Option<Contact>, DirectoryError> {
        debug!("Looking up {} {}", table, id);
        let path = format!("/rest/v1/{}?id=eq.{}&limit=1", table, id);

        let rows: Vec<Contact> = self
            .supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| DirectoryError(e.to_string()))?;

        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl Directory for SupabaseDirectory {
    async fn find_doctor(&self, id: Uuid) -> Result<Option<Contact>, DirectoryError> {
        self.find_in("doctors", id).await
    }

    async fn find_patient(&self, id: Uuid) -> Result<Option<Contact>, DirectoryError> {
        self.find_in("patients", id).await
    }

    async fn find_lab(&self, id: Uuid) -> Result<Option<Contact>, DirectoryError> {
        self.find_in("labs", id).await
    }
}

#[derive(Default)]
pub struct InMemoryDirectory {
    doctors: RwLock<HashMap<Uuid, Contact>>,
    patients: RwLock<HashMap<Uuid, Contact>>,
    labs: RwLock<HashMap<Uuid, Contact>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_doctor(&self, id: Uuid, name: &str, email: Option<&str>) {
        self.doctors.write().await.insert(id, contact(id, name, email));
    }

    pub async fn add_patient(&self, id: Uuid, name: &str, email: Option<&str>) {
        self.patients.write().await.insert(id, contact(id, name, email));
    }

    pub async fn add_lab(&self, id: Uuid, name: &str, email: Option<&str>) {
        self.labs.write().await.insert(id, contact(id, name, email));
    }
}

fn contact(id: Uuid, name: &str, email: Option<&str>) -> Contact {
    Contact {
        id,
        name: name.to_string(),
        email: email.map(str::to_string),
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn find_doctor(&self, id: Uuid) -> Result<Option<Contact>, DirectoryError> {
        Ok(self.doctors.read().await.get(&id).cloned())
    }

    async fn find_patient(&self, id: Uuid) -> Result<Option<Contact>, DirectoryError> {
        Ok(self.patients.read().await.get(&id).cloned())
    }

    async fn find_lab(&self, id: Uuid) -> Result<Option<Contact>, DirectoryError> {
        Ok(self.labs.read().await.get(&id).cloned())
    }
}
