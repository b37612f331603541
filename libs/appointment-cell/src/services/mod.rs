pub mod booking;
pub mod lifecycle;
pub mod notifications;
pub mod queries;
pub mod reconciler;
pub mod reports;
pub mod repository;
pub mod slots;
pub mod status;
pub mod supabase_repository;

pub use booking::AppointmentBookingService;
pub use lifecycle::{AppointmentEvent, AppointmentLifecycleService, Transition};
pub use queries::AppointmentQueryService;
pub use reconciler::{ReminderScheduler, ReminderSchedulerHandle, SweepReport, TemporalReconciler};
pub use reports::AppointmentReportService;
pub use repository::{AppointmentRepository, InMemoryAppointmentRepository, RepositoryError};
pub use slots::SlotCalendar;
pub use status::AppointmentStatusService;
pub use supabase_repository::SupabaseAppointmentRepository;
