pub mod gateway;
pub mod models;
pub mod notifier;
pub mod testing;

pub use gateway::{LogOnlyGateway, NotificationGateway, SupabaseEmailGateway};
pub use models::{EmailMessage, NotificationError};
pub use notifier::Notifier;
