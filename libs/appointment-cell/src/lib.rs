// libs/appointment-cell/src/lib.rs
//! Appointment booking and lifecycle: slot calendar, booking admission, the
//! status state machine and the temporal reconciler that marks abandoned
//! appointments missed and sends next-day reminders.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod state;

pub use models::{
    Appointment, AppointmentError, AppointmentStatus, Medicine, MedicineTiming, SchedulingRules, SlotTime,
};
pub use router::appointment_routes;
pub use state::AppointmentState;
