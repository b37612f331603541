use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{EmailMessage, NotificationError};

/// Delivers transactional email. Callers decide whether and what to send; the
/// gateway only decides how.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError>;
}

/// Sends mail through a Supabase edge function (`/functions/v1/<name>`).
pub struct SupabaseEmailGateway {
    supabase: Arc<SupabaseClient>,
    function_name: String,
    sender: String,
}

impl SupabaseEmailGateway {
    pub fn new(supabase: Arc<SupabaseClient>, config: &AppConfig) -> Self {
        Self {
            supabase,
            function_name: config.email_function_name.clone(),
            sender: config.email_sender.clone(),
        }
    }
}

#[async_trait]
impl NotificationGateway for SupabaseEmailGateway {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        debug!("Sending '{}' to {}", message.subject, message.to);

        self.supabase
            .invoke_function(
                &self.function_name,
                json!({
                    "from": self.sender,
                    "to": message.to,
                    "subject": message.subject,
                    "html": message.html,
                }),
            )
            .await
            .map_err(|e| match e {
                SupabaseError::Transport(err) => NotificationError::Unavailable(err.to_string()),
                other => NotificationError::Delivery(other.to_string()),
            })?;

        info!("Email sent successfully to {}", message.to);
        Ok(())
    }
}

/// Used when email delivery is disabled; records intent in the log only.
pub struct LogOnlyGateway;

#[async_trait]
impl NotificationGateway for LogOnlyGateway {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        info!(to = %message.to, subject = %message.subject, "Email delivery disabled, not sending");
        Ok(())
    }
}
