//! Outbound notifications.
//!
//! Delivery is a best-effort side effect: the order workflow logs failures
//! and never lets them unwind a persisted order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, note: Notification) -> anyhow::Result<()>;
}

/// Logs instead of sending. Default for tests and local runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSender for LogNotifier {
    async fn send(&self, note: Notification) -> anyhow::Result<()> {
        tracing::info!(recipient = %note.recipient, subject = %note.subject, "notification");
        Ok(())
    }
}

/// Publishes notifications onto NATS for the mailer service to pick up.
#[derive(Clone)]
pub struct NatsNotifier {
    client: async_nats::Client,
    subject: String,
}

impl NatsNotifier {
    pub fn new(client: async_nats::Client, subject: impl Into<String>) -> Self {
        Self {
            client,
            subject: subject.into(),
        }
    }
}

#[async_trait]
impl NotificationSender for NatsNotifier {
    async fn send(&self, note: Notification) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(&note)?;
        self.client
            .publish(self.subject.clone(), payload.into())
            .await?;
        Ok(())
    }
}
