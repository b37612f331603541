// libs/lab-test-cell/src/state.rs
use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc};
use tracing::info;

use notification_cell::Notifier;
use shared_config::{AppConfig, StorageBackend};
use shared_database::directory::Directory;
use shared_database::storage::BlobStore;
use shared_database::supabase::SupabaseClient;

use crate::services::repository::{InMemoryLabTestRepository, LabTestRepository};
use crate::services::service::{LabTestService, LabTestSettings};
use crate::services::supabase_repository::SupabaseLabTestRepository;

pub struct LabTestState {
    pub config: Arc<AppConfig>,
    pub repository: Arc<dyn LabTestRepository>,
    pub directory: Arc<dyn Directory>,
    pub blobs: Arc<dyn BlobStore>,
    pub notifier: Notifier,
}

impl LabTestState {
    pub fn new(
        config: Arc<AppConfig>,
        repository: Arc<dyn LabTestRepository>,
        directory: Arc<dyn Directory>,
        blobs: Arc<dyn BlobStore>,
        notifier: Notifier,
    ) -> Self {
        Self {
            config,
            repository,
            directory,
            blobs,
            notifier,
        }
    }

    pub fn repository_for(config: &AppConfig, supabase: Arc<SupabaseClient>) -> Arc<dyn LabTestRepository> {
        match config.storage_backend {
            StorageBackend::Supabase => Arc::new(SupabaseLabTestRepository::new(supabase)),
            StorageBackend::Memory => {
                info!("Lab tests are kept in memory");
                Arc::new(InMemoryLabTestRepository::new())
            }
        }
    }

    pub fn service(&self) -> LabTestService {
        let settings = LabTestSettings {
            results_bucket: self.config.lab_results_bucket.clone(),
            notify_on_completion: self.config.lab_notify_on_completion,
            clinic_offset: FixedOffset::east_opt(self.config.clinic_utc_offset_minutes * 60)
                .unwrap_or_else(|| Utc.fix()),
        };

        LabTestService::new(
            Arc::clone(&self.repository),
            Arc::clone(&self.directory),
            Arc::clone(&self.blobs),
            self.notifier.clone(),
            settings,
        )
    }
}
