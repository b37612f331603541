//! Test double for `NotificationGateway`, shared by the cells' test suites.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::gateway::NotificationGateway;
use crate::models::{EmailMessage, NotificationError};

#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<EmailMessage>>,
    failing_recipient: Option<String>,
    fail_everything: bool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects mail for one recipient, records everything else.
    pub fn failing_for(recipient: &str) -> Self {
        Self {
            failing_recipient: Some(recipient.to_string()),
            ..Self::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            fail_everything: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn messages_to(&self, recipient: &str) -> Vec<EmailMessage> {
        self.messages()
            .into_iter()
            .filter(|message| message.to == recipient)
            .collect()
    }

    /// Polls until at least `count` messages were recorded or `timeout` passes.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<EmailMessage> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let sent = self.messages();
            if sent.len() >= count || tokio::time::Instant::now() >= deadline {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        if self.fail_everything {
            return Err(NotificationError::Unavailable("gateway offline".to_string()));
        }
        if self.failing_recipient.as_deref() == Some(message.to.as_str()) {
            return Err(NotificationError::Delivery(format!("mailbox {} rejected", message.to)));
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }
}
