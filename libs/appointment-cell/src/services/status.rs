// libs/appointment-cell/src/services/status.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use notification_cell::Notifier;
use shared_models::auth::Actor;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, TransitionPayload};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::notifications;
use crate::services::repository::AppointmentRepository;

/// Applies actor-requested status changes: load, check through the
/// lifecycle, write with compare-and-set, then notify.
pub struct AppointmentStatusService {
    repository: Arc<dyn AppointmentRepository>,
    lifecycle: AppointmentLifecycleService,
    notifier: Notifier,
}

impl AppointmentStatusService {
    pub fn new(
        repository: Arc<dyn AppointmentRepository>,
        lifecycle: AppointmentLifecycleService,
        notifier: Notifier,
    ) -> Self {
        Self {
            repository,
            lifecycle,
            notifier,
        }
    }

    #[instrument(skip(self, payload, actor), fields(actor = %actor.id))]
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        requested: AppointmentStatus,
        payload: TransitionPayload,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        let current = self
            .repository
            .find(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)?;

        let transition = self
            .lifecycle
            .attempt_transition(&current, requested, payload, actor, now)?;

        let saved = self
            .repository
            .compare_and_set(&transition.appointment, transition.previous)
            .await?
            .ok_or_else(|| {
                warn!("Appointment {} changed while {} was being applied", appointment_id, requested);
                AppointmentError::ConcurrentModification
            })?;

        if let Some(message) = notifications::for_event(&saved, transition.event) {
            self.notifier.dispatch(message);
        }

        info!("Appointment {} is now {}", saved.id, saved.status);
        Ok(saved)
    }
}
