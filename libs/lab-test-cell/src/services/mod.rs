pub mod lifecycle;
pub mod notifications;
pub mod repository;
pub mod service;
pub mod supabase_repository;

pub use lifecycle::LabTestLifecycleService;
pub use repository::{InMemoryLabTestRepository, LabTestRepository, RepositoryError};
pub use service::{LabTestService, LabTestSettings};
pub use supabase_repository::SupabaseLabTestRepository;
