// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use shared_models::auth::{Actor, ActorRole};

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, SchedulingRules, TransitionPayload,
};

/// What happened to an appointment, used to pick the notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentEvent {
    Approved,
    Rejected,
    TreatmentStarted,
    Completed,
    Missed,
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub appointment: Appointment,
    pub previous: AppointmentStatus,
    pub event: AppointmentEvent,
}

/// The single authority on appointment status changes. Every entry point
/// (doctor requests and the reconciler) goes through `attempt_transition`.
#[derive(Debug, Clone)]
pub struct AppointmentLifecycleService {
    rules: SchedulingRules,
}

impl AppointmentLifecycleService {
    pub fn new(rules: SchedulingRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &SchedulingRules {
        &self.rules
    }

    /// Edges a doctor may request. `Approved -> Missed` is absent: only the
    /// system actor takes it.
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> &'static [AppointmentStatus] {
        match current_status {
            AppointmentStatus::Pending => &[AppointmentStatus::Approved, AppointmentStatus::Rejected],
            AppointmentStatus::Approved => &[AppointmentStatus::InProgress],
            AppointmentStatus::InProgress => &[AppointmentStatus::Completed],
            AppointmentStatus::Rejected | AppointmentStatus::Completed | AppointmentStatus::Missed => &[],
        }
    }

    pub fn appointment_instant(&self, appointment: &Appointment) -> DateTime<Utc> {
        self.rules.appointment_instant(appointment.date, &appointment.time)
    }

    /// Inclusive bounds during which an approved appointment may be started.
    pub fn treatment_window(&self, appointment: &Appointment) -> (DateTime<Utc>, DateTime<Utc>) {
        let opens = self.appointment_instant(appointment) - self.rules.start_grace;
        let closes = self.rules.end_of_day(appointment.date);
        (opens, closes)
    }

    pub fn can_start_treatment(&self, appointment: &Appointment, now: DateTime<Utc>) -> bool {
        let (opens, closes) = self.treatment_window(appointment);
        opens <= now && now <= closes
    }

    /// An approved appointment nobody started within `missed_after` of its slot.
    pub fn is_overdue(&self, appointment: &Appointment, now: DateTime<Utc>) -> bool {
        appointment.status == AppointmentStatus::Approved
            && now - self.appointment_instant(appointment) > self.rules.missed_after
    }

    pub fn attempt_transition(
        &self,
        appointment: &Appointment,
        requested: AppointmentStatus,
        payload: TransitionPayload,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Transition, AppointmentError> {
        let current = appointment.status;
        debug!(
            "Appointment {}: {} requests {} -> {}",
            appointment.id, actor.role, current, requested
        );

        match actor.role {
            ActorRole::System => self.check_system_transition(appointment, requested, now)?,
            ActorRole::Doctor if actor.owns(appointment.doctor_id) => {
                self.check_doctor_transition(appointment, requested, &payload, now)?
            }
            _ => {
                warn!(
                    "{} {} attempted to update appointment {} owned by doctor {}",
                    actor.role, actor.id, appointment.id, appointment.doctor_id
                );
                return Err(AppointmentError::Forbidden(
                    "Only the treating doctor can update this appointment".to_string(),
                ));
            }
        }

        let mut updated = appointment.clone();
        updated.status = requested;

        let event = match requested {
            AppointmentStatus::Approved => AppointmentEvent::Approved,
            AppointmentStatus::Rejected => AppointmentEvent::Rejected,
            AppointmentStatus::InProgress => AppointmentEvent::TreatmentStarted,
            AppointmentStatus::Missed => AppointmentEvent::Missed,
            AppointmentStatus::Completed => {
                updated.prescription = payload.prescription.map(|p| p.trim().to_string());
                updated.medicines = payload
                    .medicines
                    .unwrap_or_default()
                    .into_iter()
                    .map(|mut medicine| {
                        medicine.timing.sort();
                        medicine.timing.dedup();
                        medicine
                    })
                    .collect();
                updated.completed_at = Some(now);
                AppointmentEvent::Completed
            }
            AppointmentStatus::Pending => {
                return Err(AppointmentError::InvalidTransition { from: current, to: requested })
            }
        };

        info!("Appointment {} transitioned {} -> {}", appointment.id, current, requested);
        Ok(Transition {
            appointment: updated,
            previous: current,
            event,
        })
    }

    fn check_doctor_transition(
        &self,
        appointment: &Appointment,
        requested: AppointmentStatus,
        payload: &TransitionPayload,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        let current = appointment.status;
        if !self.get_valid_transitions(current).contains(&requested) {
            warn!("Invalid status transition attempted: {} -> {}", current, requested);
            return Err(AppointmentError::InvalidTransition { from: current, to: requested });
        }

        match requested {
            AppointmentStatus::InProgress if !self.can_start_treatment(appointment, now) => {
                let (opens, closes) = self.treatment_window(appointment);
                Err(AppointmentError::OutsideTreatmentWindow { opens, closes })
            }
            AppointmentStatus::Completed
                if payload.prescription.as_deref().map_or(true, |p| p.trim().is_empty()) =>
            {
                Err(AppointmentError::PrescriptionRequired)
            }
            _ => Ok(()),
        }
    }

    fn check_system_transition(
        &self,
        appointment: &Appointment,
        requested: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        let current = appointment.status;
        if requested != AppointmentStatus::Missed || current != AppointmentStatus::Approved {
            return Err(AppointmentError::InvalidTransition { from: current, to: requested });
        }
        if !self.is_overdue(appointment, now) {
            return Err(AppointmentError::Validation(format!(
                "Appointment {} is not yet overdue",
                appointment.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Medicine, MedicineTiming, SlotTime};
    use assert_matches::assert_matches;
    use chrono::{Duration, NaiveDate, TimeZone};
    use uuid::Uuid;

    fn service() -> AppointmentLifecycleService {
        AppointmentLifecycleService::new(SchedulingRules::default())
    }

    fn appointment(status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            patient_name: "Test Patient".to_string(),
            email: Some("patient@example.com".to_string()),
            phone: None,
            gender: None,
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            time: SlotTime::parse("09:00 am").unwrap(),
            symptoms: None,
            status,
            prescription: None,
            medicines: vec![],
            document: None,
            report_file: None,
            created_at: Utc.with_ymd_and_hms(2025, 2, 20, 10, 0, 0).unwrap(),
            completed_at: None,
        }
    }

    fn doctor_of(appointment: &Appointment) -> Actor {
        Actor {
            id: appointment.doctor_id.to_string(),
            role: ActorRole::Doctor,
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn transition_table_matches_lifecycle() {
        let service = service();
        for from in AppointmentStatus::ALL {
            for to in AppointmentStatus::ALL {
                let expected = matches!(
                    (from, to),
                    (AppointmentStatus::Pending, AppointmentStatus::Approved)
                        | (AppointmentStatus::Pending, AppointmentStatus::Rejected)
                        | (AppointmentStatus::Approved, AppointmentStatus::InProgress)
                        | (AppointmentStatus::InProgress, AppointmentStatus::Completed)
                );
                assert_eq!(service.get_valid_transitions(from).contains(&to), expected, "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        let service = service();
        for status in AppointmentStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            assert!(service.get_valid_transitions(status).is_empty());
        }
    }

    #[test]
    fn pending_cannot_jump_to_in_progress() {
        let appt = appointment(AppointmentStatus::Pending);
        let result = service().attempt_transition(
            &appt,
            AppointmentStatus::InProgress,
            TransitionPayload::default(),
            &doctor_of(&appt),
            at(9, 0),
        );

        let error = result.unwrap_err();
        assert_eq!(error.to_string(), "Invalid transition from Pending to In Progress");
    }

    #[test]
    fn only_the_owning_doctor_may_transition() {
        let appt = appointment(AppointmentStatus::Pending);
        let other_doctor = Actor {
            id: Uuid::new_v4().to_string(),
            role: ActorRole::Doctor,
        };
        let patient = Actor {
            id: appt.patient_id.to_string(),
            role: ActorRole::Patient,
        };

        for actor in [other_doctor, patient] {
            let result = service().attempt_transition(
                &appt,
                AppointmentStatus::Approved,
                TransitionPayload::default(),
                &actor,
                at(8, 0),
            );
            assert_matches!(result, Err(AppointmentError::Forbidden(_)));
        }
    }

    #[test]
    fn treatment_window_is_inclusive_at_both_ends() {
        let service = service();
        let appt = appointment(AppointmentStatus::Approved);

        assert!(!service.can_start_treatment(&appt, at(8, 54)));
        assert!(service.can_start_treatment(&appt, at(8, 55)));
        assert!(service.can_start_treatment(&appt, at(14, 0)));
        assert!(service.can_start_treatment(&appt, Utc.with_ymd_and_hms(2025, 3, 1, 23, 59, 59).unwrap()));
        assert!(!service.can_start_treatment(&appt, Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap()));
    }

    #[test]
    fn starting_early_reports_the_window() {
        let appt = appointment(AppointmentStatus::Approved);
        let result = service().attempt_transition(
            &appt,
            AppointmentStatus::InProgress,
            TransitionPayload::default(),
            &doctor_of(&appt),
            at(8, 0),
        );

        assert_matches!(result, Err(AppointmentError::OutsideTreatmentWindow { .. }));
    }

    #[test]
    fn completion_requires_a_prescription() {
        let appt = appointment(AppointmentStatus::InProgress);
        for prescription in [None, Some("   ".to_string())] {
            let result = service().attempt_transition(
                &appt,
                AppointmentStatus::Completed,
                TransitionPayload {
                    prescription,
                    medicines: None,
                },
                &doctor_of(&appt),
                at(9, 30),
            );
            assert_matches!(result, Err(AppointmentError::PrescriptionRequired));
        }
    }

    #[test]
    fn completion_records_artifacts_and_timestamp() {
        let appt = appointment(AppointmentStatus::InProgress);
        let medicine = Medicine {
            name: "Paracetamol".to_string(),
            dosage: "500mg".to_string(),
            frequency: "2x/day".to_string(),
            timing: vec![MedicineTiming::Night, MedicineTiming::Morning, MedicineTiming::Night],
        };

        let transition = service()
            .attempt_transition(
                &appt,
                AppointmentStatus::Completed,
                TransitionPayload {
                    prescription: Some(" Rest and fluids ".to_string()),
                    medicines: Some(vec![medicine]),
                },
                &doctor_of(&appt),
                at(9, 30),
            )
            .unwrap();

        let completed = transition.appointment;
        assert_eq!(transition.previous, AppointmentStatus::InProgress);
        assert_eq!(transition.event, AppointmentEvent::Completed);
        assert_eq!(completed.prescription.as_deref(), Some("Rest and fluids"));
        assert_eq!(completed.medicines[0].timing, vec![MedicineTiming::Morning, MedicineTiming::Night]);
        assert_eq!(completed.completed_at, Some(at(9, 30)));
    }

    #[test]
    fn completion_defaults_medicines_to_empty() {
        let appt = appointment(AppointmentStatus::InProgress);
        let transition = service()
            .attempt_transition(
                &appt,
                AppointmentStatus::Completed,
                TransitionPayload {
                    prescription: Some("Rest".to_string()),
                    medicines: None,
                },
                &doctor_of(&appt),
                at(9, 30),
            )
            .unwrap();
        assert!(transition.appointment.medicines.is_empty());
    }

    #[test]
    fn doctors_cannot_mark_appointments_missed() {
        let appt = appointment(AppointmentStatus::Approved);
        let result = service().attempt_transition(
            &appt,
            AppointmentStatus::Missed,
            TransitionPayload::default(),
            &doctor_of(&appt),
            at(9, 0) + Duration::days(3),
        );
        assert_matches!(
            result,
            Err(AppointmentError::InvalidTransition {
                from: AppointmentStatus::Approved,
                to: AppointmentStatus::Missed
            })
        );
    }

    #[test]
    fn system_marks_missed_only_after_24_hours() {
        let service = service();
        let appt = appointment(AppointmentStatus::Approved);
        let system = Actor::system();

        let exactly_a_day = at(9, 0) + Duration::hours(24);
        assert!(service
            .attempt_transition(&appt, AppointmentStatus::Missed, TransitionPayload::default(), &system, exactly_a_day)
            .is_err());

        let transition = service
            .attempt_transition(
                &appt,
                AppointmentStatus::Missed,
                TransitionPayload::default(),
                &system,
                exactly_a_day + Duration::seconds(1),
            )
            .unwrap();
        assert_eq!(transition.appointment.status, AppointmentStatus::Missed);
        assert_eq!(transition.event, AppointmentEvent::Missed);
    }

    #[test]
    fn system_cannot_take_doctor_edges() {
        let appt = appointment(AppointmentStatus::Pending);
        let result = service().attempt_transition(
            &appt,
            AppointmentStatus::Approved,
            TransitionPayload::default(),
            &Actor::system(),
            at(8, 0),
        );
        assert_matches!(result, Err(AppointmentError::InvalidTransition { .. }));
    }
}
