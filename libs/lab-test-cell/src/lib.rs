// libs/lab-test-cell/src/lib.rs
//! Lab test requests: booking, the accept/reject/complete state machine and
//! result files.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod state;

pub use models::{LabTest, LabTestError, LabTestStatus};
pub use router::{lab_routes, lab_test_routes};
pub use state::LabTestState;
