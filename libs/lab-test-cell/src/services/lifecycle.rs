// libs/lab-test-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use shared_database::storage::StoredFile;
use shared_models::auth::{Actor, ActorRole};

use crate::models::{LabTest, LabTestError, LabTestStatus};

/// Lab test state machine: `pending -> accepted | rejected` is the lab's
/// decision, `accepted -> completed` needs an elapsed test date and a result.
#[derive(Debug, Clone, Default)]
pub struct LabTestLifecycleService;

impl LabTestLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn get_valid_transitions(&self, current_status: LabTestStatus) -> &'static [LabTestStatus] {
        match current_status {
            LabTestStatus::Pending => &[LabTestStatus::Accepted, LabTestStatus::Rejected],
            LabTestStatus::Accepted => &[LabTestStatus::Completed],
            LabTestStatus::Rejected | LabTestStatus::Completed => &[],
        }
    }

    /// Everything `attempt_transition` checks, without the result file itself.
    /// Lets callers reject a completion before storing an upload.
    pub fn check_transition(
        &self,
        test: &LabTest,
        requested: LabTestStatus,
        has_result: bool,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<(), LabTestError> {
        let current = test.status;
        debug!("Lab test {}: {} requests {} -> {}", test.id, actor.role, current, requested);

        if !(actor.is(ActorRole::Lab) && actor.owns(test.lab_id)) {
            warn!(
                "{} {} attempted to update lab test {} assigned to lab {}",
                actor.role, actor.id, test.id, test.lab_id
            );
            return Err(LabTestError::Forbidden(
                "Only the assigned lab can update this test".to_string(),
            ));
        }

        if !self.get_valid_transitions(current).contains(&requested) {
            warn!("Invalid lab test transition attempted: {} -> {}", current, requested);
            return Err(LabTestError::InvalidTransition { from: current, to: requested });
        }

        if requested == LabTestStatus::Completed {
            if test.appointment_date > now {
                return Err(LabTestError::TestNotYetDue(test.appointment_date));
            }
            if !has_result {
                return Err(LabTestError::ResultFileRequired);
            }
        }
        Ok(())
    }

    pub fn attempt_transition(
        &self,
        test: &LabTest,
        requested: LabTestStatus,
        result_file: Option<StoredFile>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<LabTest, LabTestError> {
        self.check_transition(test, requested, result_file.is_some(), actor, now)?;

        let mut updated = test.clone();
        updated.status = requested;
        if requested == LabTestStatus::Completed {
            updated.result_file = result_file;
            updated.completed_at = Some(now);
        }

        info!("Lab test {} transitioned {} -> {}", test.id, test.status, requested);
        Ok(updated)
    }
}
