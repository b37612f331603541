// libs/lab-test-cell/src/services/notifications.rs
use notification_cell::EmailMessage;
use shared_database::directory::Contact;

use crate::models::{LabTest, LabTestStatus};

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Patient email after a status change. Completion only notifies when the
/// deployment opts in with `LAB_NOTIFY_ON_COMPLETION`.
pub fn for_status(test: &LabTest, patient: &Contact, notify_on_completion: bool) -> Option<EmailMessage> {
    let to = patient.email.as_deref()?;
    let name = escape(&patient.name);
    let test_name = escape(&test.test_name);

    let (subject, body) = match test.status {
        LabTestStatus::Accepted => (
            "Your Lab Test Has Been Accepted",
            format!(
                "<h2>Hello {},</h2>\
                 <p>Your lab test <b>{}</b> has been <b>ACCEPTED</b>.</p>\
                 <p>Appointment Date: <b>{}</b></p>\
                 <p>Please be available at the scheduled time.</p>",
                name,
                test_name,
                test.appointment_date.format("%Y-%m-%d %H:%M UTC")
            ),
        ),
        LabTestStatus::Rejected => (
            "Your Lab Test Has Been Rejected",
            format!(
                "<h2>Hello {},</h2>\
                 <p>Your lab test <b>{}</b> has been <b>REJECTED</b>.</p>\
                 <p>Please contact support for further details.</p>",
                name, test_name
            ),
        ),
        LabTestStatus::Completed if notify_on_completion => (
            "Your Lab Test Results Are Ready",
            format!(
                "<h2>Hello {},</h2>\
                 <p>The results for your lab test <b>{}</b> are now available.</p>\
                 <p>You can download them from your dashboard.</p>",
                name, test_name
            ),
        ),
        _ => return None,
    };

    Some(EmailMessage::new(to, subject, body))
}
