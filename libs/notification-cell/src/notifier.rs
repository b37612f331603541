use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::gateway::{LogOnlyGateway, NotificationGateway, SupabaseEmailGateway};
use crate::models::EmailMessage;

/// Front door for outbound notifications. Failures are logged here and never
/// reach the operation that triggered the message.
#[derive(Clone)]
pub struct Notifier {
    gateway: Arc<dyn NotificationGateway>,
}

impl Notifier {
    pub fn new(gateway: Arc<dyn NotificationGateway>) -> Self {
        Self { gateway }
    }

    pub fn from_config(config: &AppConfig, supabase: Arc<SupabaseClient>) -> Self {
        if config.email_enabled {
            info!("Email notifications enabled via function '{}'", config.email_function_name);
            Self::new(Arc::new(SupabaseEmailGateway::new(supabase, config)))
        } else {
            warn!("Email notifications disabled, messages will only be logged");
            Self::new(Arc::new(LogOnlyGateway))
        }
    }

    /// Fire-and-forget: the send runs on its own task so a slow gateway cannot
    /// delay the caller's response.
    pub fn dispatch(&self, message: EmailMessage) {
        let gateway = Arc::clone(&self.gateway);
        tokio::spawn(async move {
            if let Err(e) = gateway.send(&message).await {
                warn!(to = %message.to, subject = %message.subject, "Notification failed: {}", e);
            }
        });
    }

    pub fn dispatch_all(&self, messages: impl IntoIterator<Item = EmailMessage>) {
        for message in messages {
            self.dispatch(message);
        }
    }

    /// Sends and waits, for callers that are already off the request path.
    /// Returns how many messages were delivered.
    pub async fn deliver_all(&self, messages: Vec<EmailMessage>) -> usize {
        let results = join_all(messages.iter().map(|message| self.gateway.send(message))).await;

        results
            .iter()
            .zip(&messages)
            .filter(|(result, message)| match result {
                Ok(()) => true,
                Err(e) => {
                    warn!(to = %message.to, subject = %message.subject, "Notification failed: {}", e);
                    false
                }
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingGateway;
    use std::time::Duration;

    #[tokio::test]
    async fn dispatch_delivers_in_the_background() {
        let gateway = Arc::new(RecordingGateway::new());
        let notifier = Notifier::new(gateway.clone());

        notifier.dispatch_all(vec![
            EmailMessage::new("a@example.com", "One", "<p>1</p>"),
            EmailMessage::new("b@example.com", "Two", "<p>2</p>"),
        ]);

        let sent = gateway.wait_for(2, Duration::from_secs(1)).await;
        assert_eq!(sent.len(), 2);
    }

    #[tokio::test]
    async fn failures_are_counted_not_propagated() {
        let gateway = Arc::new(RecordingGateway::failing_for("down@example.com"));
        let notifier = Notifier::new(gateway.clone());

        let delivered = notifier
            .deliver_all(vec![
                EmailMessage::new("down@example.com", "One", "<p>1</p>"),
                EmailMessage::new("up@example.com", "Two", "<p>2</p>"),
            ])
            .await;

        assert_eq!(delivered, 1);
        assert_eq!(gateway.messages().len(), 1);
    }
}
