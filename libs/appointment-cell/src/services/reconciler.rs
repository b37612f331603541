// libs/appointment-cell/src/services/reconciler.rs
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use notification_cell::Notifier;
use shared_database::directory::Directory;
use shared_models::auth::Actor;
use shared_utils::expiring_store::ExpiringStore;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, SchedulingRules, TransitionPayload};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::notifications;
use crate::services::repository::AppointmentRepository;

const REMINDER_MEMORY: StdDuration = StdDuration::from_secs(36 * 60 * 60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub marked_missed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Moves abandoned approved appointments to `Missed` and sends next-day
/// reminders. Never returns errors to its caller; every failure is logged and
/// the next candidate is evaluated.
pub struct TemporalReconciler {
    repository: Arc<dyn AppointmentRepository>,
    directory: Arc<dyn Directory>,
    notifier: Notifier,
    lifecycle: AppointmentLifecycleService,
    reminders_sent: ExpiringStore<Uuid, ()>,
}

impl TemporalReconciler {
    pub fn new(
        repository: Arc<dyn AppointmentRepository>,
        directory: Arc<dyn Directory>,
        notifier: Notifier,
        lifecycle: AppointmentLifecycleService,
    ) -> Self {
        Self {
            repository,
            directory,
            notifier,
            lifecycle,
            reminders_sent: ExpiringStore::new(),
        }
    }

    pub fn rules(&self) -> &SchedulingRules {
        self.lifecycle.rules()
    }

    #[instrument(skip(self))]
    pub async fn sweep_missed_for_doctor(&self, doctor_id: Uuid, now: DateTime<Utc>) -> SweepReport {
        match self
            .repository
            .list_for_doctor(doctor_id, Some(AppointmentStatus::Approved))
            .await
        {
            Ok(candidates) => self.sweep(candidates, now).await,
            Err(e) => {
                warn!("Missed sweep for doctor {} could not load appointments: {}", doctor_id, e);
                SweepReport::default()
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn sweep_all_missed(&self, now: DateTime<Utc>) -> SweepReport {
        match self
            .repository
            .list_by_status(AppointmentStatus::Approved, None)
            .await
        {
            Ok(candidates) => self.sweep(candidates, now).await,
            Err(e) => {
                error!("Global missed sweep could not load appointments: {}", e);
                SweepReport::default()
            }
        }
    }

    async fn sweep(&self, candidates: Vec<Appointment>, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport {
            examined: candidates.len(),
            ..SweepReport::default()
        };

        for appointment in candidates.iter().filter(|a| self.lifecycle.is_overdue(a, now)) {
            match self.mark_missed(appointment, now).await {
                Ok(true) => report.marked_missed += 1,
                Ok(false) => {
                    debug!("Appointment {} changed before it could be marked missed", appointment.id);
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!("Could not mark appointment {} missed: {}", appointment.id, e);
                    report.failed += 1;
                }
            }
        }

        if report.marked_missed > 0 || report.failed > 0 {
            info!(
                "Missed sweep: {} examined, {} marked missed, {} failed",
                report.examined, report.marked_missed, report.failed
            );
        }
        report
    }

    async fn mark_missed(&self, appointment: &Appointment, now: DateTime<Utc>) -> Result<bool, AppointmentError> {
        let transition = self.lifecycle.attempt_transition(
            appointment,
            AppointmentStatus::Missed,
            TransitionPayload::default(),
            &Actor::system(),
            now,
        )?;

        Ok(self
            .repository
            .compare_and_set(&transition.appointment, transition.previous)
            .await?
            .is_some())
    }

    /// Reminds doctor and patient of every approved appointment dated tomorrow
    /// (clinic-local). Returns how many appointments were reminded.
    #[instrument(skip(self))]
    pub async fn send_reminders(&self, now: DateTime<Utc>) -> usize {
        let tomorrow = self.rules().local_date(now) + Duration::days(1);
        let appointments = match self
            .repository
            .list_by_status(AppointmentStatus::Approved, Some(tomorrow))
            .await
        {
            Ok(appointments) => appointments,
            Err(e) => {
                error!("Reminder run could not load appointments for {}: {}", tomorrow, e);
                return 0;
            }
        };

        self.reminders_sent.purge_expired().await;

        let mut reminded = 0;
        for appointment in &appointments {
            if self.reminders_sent.contains(&appointment.id).await {
                debug!("Reminder for appointment {} already sent", appointment.id);
                continue;
            }

            let messages = self.reminder_messages(appointment).await;
            if messages.is_empty() {
                continue;
            }
            if self.notifier.deliver_all(messages).await > 0 {
                self.reminders_sent.insert(appointment.id, (), REMINDER_MEMORY).await;
                reminded += 1;
            }
        }

        info!("Sent reminders for {} of {} appointments on {}", reminded, appointments.len(), tomorrow);
        reminded
    }

    async fn reminder_messages(&self, appointment: &Appointment) -> Vec<notification_cell::EmailMessage> {
        let doctor = self
            .directory
            .find_doctor(appointment.doctor_id)
            .await
            .unwrap_or_else(|e| {
                warn!("Doctor lookup failed for reminder {}: {}", appointment.id, e);
                None
            });

        let patient_email = if appointment.email.is_some() {
            None
        } else {
            self.directory
                .find_patient(appointment.patient_id)
                .await
                .unwrap_or_else(|e| {
                    warn!("Patient lookup failed for reminder {}: {}", appointment.id, e);
                    None
                })
                .and_then(|p| p.email)
        };

        doctor
            .as_ref()
            .and_then(|d| notifications::reminder_for_doctor(appointment, d))
            .into_iter()
            .chain(notifications::reminder_for_patient(
                appointment,
                patient_email.as_deref(),
                doctor.as_ref(),
            ))
            .collect()
    }

    /// The scheduled job: global missed sweep, then reminders.
    pub async fn run_daily(&self, now: DateTime<Utc>) {
        info!("Running daily appointment reconciliation");
        self.sweep_all_missed(now).await;
        self.send_reminders(now).await;
    }
}

/// Next occurrence of the reminder hour in clinic-local time, strictly after `now`.
pub fn next_daily_run(now: DateTime<Utc>, rules: &SchedulingRules) -> DateTime<Utc> {
    let today = rules.local_date(now);
    let hour = chrono::NaiveTime::from_hms_opt(rules.reminder_hour.min(23), 0, 0).unwrap_or(chrono::NaiveTime::MIN);

    let candidate = rules.to_utc(today.and_time(hour));
    if candidate > now {
        candidate
    } else {
        rules.to_utc((today + Duration::days(1)).and_time(hour))
    }
}

pub struct ReminderScheduler;

impl ReminderScheduler {
    pub fn start(reconciler: Arc<TemporalReconciler>) -> ReminderSchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!("Reminder scheduler started");
            loop {
                let now = Utc::now();
                let next_run = next_daily_run(now, reconciler.rules());
                let wait = (next_run - now).to_std().unwrap_or(StdDuration::ZERO);
                debug!("Next reconciliation run at {}", next_run);

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        reconciler.run_daily(Utc::now()).await;
                    }
                    _ = shutdown_rx.changed() => {
                        break;
                    }
                }
            }
            info!("Reminder scheduler stopped");
        });

        ReminderSchedulerHandle { shutdown_tx, task }
    }
}

pub struct ReminderSchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReminderSchedulerHandle {
    pub async fn shutdown(self) {
        info!("Initiating reminder scheduler shutdown");
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!("Reminder scheduler task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn next_run_is_later_today_before_the_hour() {
        let rules = SchedulingRules::default();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 6, 30, 0).unwrap();
        assert_eq!(next_daily_run(now, &rules), Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap());
    }

    #[test]
    fn next_run_rolls_to_tomorrow_at_or_after_the_hour() {
        let rules = SchedulingRules::default();
        let at_hour = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        assert_eq!(next_daily_run(at_hour, &rules), Utc.with_ymd_and_hms(2025, 3, 2, 8, 0, 0).unwrap());
    }

    #[test]
    fn next_run_uses_clinic_local_hour() {
        let rules = SchedulingRules {
            utc_offset: FixedOffset::east_opt(2 * 3600).unwrap(),
            ..SchedulingRules::default()
        };
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 5, 0, 0).unwrap();
        assert_eq!(next_daily_run(now, &rules), Utc.with_ymd_and_hms(2025, 3, 1, 6, 0, 0).unwrap());
    }
}
