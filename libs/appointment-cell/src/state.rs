// libs/appointment-cell/src/state.rs
use std::sync::Arc;

use tracing::info;

use notification_cell::Notifier;
use shared_config::{AppConfig, StorageBackend};
use shared_database::directory::Directory;
use shared_database::storage::BlobStore;
use shared_database::supabase::SupabaseClient;

use crate::models::SchedulingRules;
use crate::services::booking::AppointmentBookingService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::queries::AppointmentQueryService;
use crate::services::reconciler::TemporalReconciler;
use crate::services::reports::AppointmentReportService;
use crate::services::repository::{AppointmentRepository, InMemoryAppointmentRepository};
use crate::services::slots::SlotCalendar;
use crate::services::status::AppointmentStatusService;
use crate::services::supabase_repository::SupabaseAppointmentRepository;

/// Shared handler state for the appointment routes. Services are cheap views
/// over these handles and are built per request.
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub repository: Arc<dyn AppointmentRepository>,
    pub directory: Arc<dyn Directory>,
    pub blobs: Arc<dyn BlobStore>,
    pub notifier: Notifier,
    pub lifecycle: AppointmentLifecycleService,
    pub reconciler: Arc<TemporalReconciler>,
}

impl AppointmentState {
    pub fn new(
        config: Arc<AppConfig>,
        repository: Arc<dyn AppointmentRepository>,
        directory: Arc<dyn Directory>,
        blobs: Arc<dyn BlobStore>,
        notifier: Notifier,
    ) -> Self {
        let lifecycle = AppointmentLifecycleService::new(SchedulingRules::from_config(&config));
        let reconciler = Arc::new(TemporalReconciler::new(
            Arc::clone(&repository),
            Arc::clone(&directory),
            notifier.clone(),
            lifecycle.clone(),
        ));

        Self {
            config,
            repository,
            directory,
            blobs,
            notifier,
            lifecycle,
            reconciler,
        }
    }

    pub fn repository_for(config: &AppConfig, supabase: Arc<SupabaseClient>) -> Arc<dyn AppointmentRepository> {
        match config.storage_backend {
            StorageBackend::Supabase => Arc::new(SupabaseAppointmentRepository::new(supabase)),
            StorageBackend::Memory => {
                info!("Appointments are kept in memory");
                Arc::new(InMemoryAppointmentRepository::new())
            }
        }
    }

    pub fn slot_calendar(&self) -> SlotCalendar {
        SlotCalendar::new(Arc::clone(&self.repository))
    }

    pub fn booking_service(&self) -> AppointmentBookingService {
        AppointmentBookingService::new(
            Arc::clone(&self.repository),
            Arc::clone(&self.directory),
            Arc::clone(&self.blobs),
            self.notifier.clone(),
            self.lifecycle.rules().clone(),
            self.config.documents_bucket.clone(),
        )
    }

    pub fn status_service(&self) -> AppointmentStatusService {
        AppointmentStatusService::new(Arc::clone(&self.repository), self.lifecycle.clone(), self.notifier.clone())
    }

    pub fn query_service(&self) -> AppointmentQueryService {
        AppointmentQueryService::new(Arc::clone(&self.repository), Arc::clone(&self.reconciler))
    }

    pub fn report_service(&self) -> AppointmentReportService {
        AppointmentReportService::new(
            Arc::clone(&self.repository),
            Arc::clone(&self.blobs),
            self.config.documents_bucket.clone(),
        )
    }
}
