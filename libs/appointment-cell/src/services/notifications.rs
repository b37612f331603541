// libs/appointment-cell/src/services/notifications.rs
//! Email content for appointment events. These functions only decide whether
//! a message is due and what it says; delivery belongs to the notifier.

use std::collections::BTreeMap;

use notification_cell::EmailMessage;
use shared_database::directory::Contact;

use crate::models::{Appointment, Medicine, MedicineTiming};
use crate::services::lifecycle::AppointmentEvent;

const AS_DIRECTED: &str = "As directed";

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn when(appointment: &Appointment) -> String {
    format!(
        "<p><b>Date:</b> {} <br><b>Time:</b> {}</p>",
        appointment.date.format("%Y-%m-%d"),
        appointment.time
    )
}

fn doctor_name(doctor: Option<&Contact>) -> String {
    doctor
        .map(|d| format!("Dr. {}", escape_html(&d.name)))
        .unwrap_or_else(|| "your doctor".to_string())
}

pub fn booking_received_for_doctor(appointment: &Appointment, doctor: &Contact) -> Option<EmailMessage> {
    let to = doctor.email.as_deref()?;
    Some(EmailMessage::new(
        to,
        "New Appointment Booked",
        format!(
            "<p>Dear Dr. {},</p>\
             <p>Patient <b>{}</b> has booked an appointment.</p>\
             {}\
             <p>Please review and approve or reject the appointment from your dashboard.</p>",
            escape_html(&doctor.name),
            escape_html(&appointment.patient_name),
            when(appointment)
        ),
    ))
}

pub fn booking_sent_to_patient(appointment: &Appointment, doctor: Option<&Contact>) -> Option<EmailMessage> {
    let to = appointment.email.as_deref()?;
    Some(EmailMessage::new(
        to,
        "Appointment Request Sent",
        format!(
            "<p>Dear {},</p>\
             <p>Your appointment request has been sent to <b>{}</b>.</p>\
             {}\
             <p>You will receive another email once the doctor approves or rejects your appointment.</p>",
            escape_html(&appointment.patient_name),
            doctor_name(doctor),
            when(appointment)
        ),
    ))
}

/// Patient email for a lifecycle event, if that event warrants one.
pub fn for_event(appointment: &Appointment, event: AppointmentEvent) -> Option<EmailMessage> {
    let to = appointment.email.as_deref()?;
    let greeting = format!("<p>Dear {},</p>", escape_html(&appointment.patient_name));
    let slot = format!(
        "<b>{}</b> at <b>{}</b>",
        appointment.date.format("%Y-%m-%d"),
        appointment.time
    );

    match event {
        AppointmentEvent::Approved => Some(EmailMessage::new(
            to,
            "Appointment Approved",
            format!("{}<p>Your appointment on {} has been approved by the doctor.</p>", greeting, slot),
        )),
        AppointmentEvent::Rejected => Some(EmailMessage::new(
            to,
            "Appointment Rejected",
            format!(
                "{}<p>Unfortunately, your appointment on {} has been rejected by the doctor.</p>",
                greeting, slot
            ),
        )),
        AppointmentEvent::Completed => Some(EmailMessage::new(
            to,
            "Appointment Completed",
            format!(
                "{}<p>Your appointment on {} has been completed.</p>\
                 <p><b>Prescription:</b></p><p>{}</p>{}",
                greeting,
                slot,
                escape_html(appointment.prescription.as_deref().unwrap_or_default()),
                medicine_schedule_html(&appointment.medicines)
            ),
        )),
        AppointmentEvent::TreatmentStarted | AppointmentEvent::Missed => None,
    }
}

/// Medicines bucketed by timing tag, Morning through Night. A medicine with
/// several tags appears under each; untagged ones go under "As directed".
pub fn group_medicines_by_timing(medicines: &[Medicine]) -> Vec<(String, Vec<&Medicine>)> {
    let mut by_timing: BTreeMap<MedicineTiming, Vec<&Medicine>> = BTreeMap::new();
    let mut untimed = Vec::new();

    for medicine in medicines {
        if medicine.timing.is_empty() {
            untimed.push(medicine);
        }
        for timing in &medicine.timing {
            let bucket = by_timing.entry(*timing).or_default();
            if !bucket.iter().any(|m| std::ptr::eq(*m, medicine)) {
                bucket.push(medicine);
            }
        }
    }

    let mut groups: Vec<(String, Vec<&Medicine>)> = by_timing
        .into_iter()
        .map(|(timing, meds)| (timing.to_string(), meds))
        .collect();
    if !untimed.is_empty() {
        groups.push((AS_DIRECTED.to_string(), untimed));
    }
    groups
}

pub fn medicine_schedule_html(medicines: &[Medicine]) -> String {
    group_medicines_by_timing(medicines)
        .into_iter()
        .map(|(heading, meds)| {
            let items: String = meds
                .iter()
                .map(|m| {
                    format!(
                        "<li>{} - {}, {}</li>",
                        escape_html(&m.name),
                        escape_html(&m.dosage),
                        escape_html(&m.frequency)
                    )
                })
                .collect();
            format!("<h4>{}</h4><ul>{}</ul>", heading, items)
        })
        .collect()
}

pub fn reminder_for_doctor(appointment: &Appointment, doctor: &Contact) -> Option<EmailMessage> {
    let to = doctor.email.as_deref()?;
    Some(EmailMessage::new(
        to,
        "Upcoming Appointment Reminder",
        format!(
            "<p>Dear Dr. {},</p><p>You have an appointment with <b>{}</b> tomorrow at <b>{}</b>.</p>",
            escape_html(&doctor.name),
            escape_html(&appointment.patient_name),
            appointment.time
        ),
    ))
}

pub fn reminder_for_patient(
    appointment: &Appointment,
    patient_email: Option<&str>,
    doctor: Option<&Contact>,
) -> Option<EmailMessage> {
    let to = appointment.email.as_deref().or(patient_email)?;
    Some(EmailMessage::new(
        to,
        "Appointment Reminder",
        format!(
            "<p>Dear {},</p><p>This is a reminder for your appointment with {} tomorrow at <b>{}</b>.</p>",
            escape_html(&appointment.patient_name),
            doctor_name(doctor),
            appointment.time
        ),
    ))
}
