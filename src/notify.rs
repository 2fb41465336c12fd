use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

/// Payload handed to the mail gateway when a reset is initiated.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetNotification {
    pub source: String,
    pub destination: String,
    pub password_reset_code: String,
}

/// Fire-and-forget delivery of reset codes.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_reset_code(&self, notification: &ResetNotification) -> anyhow::Result<()>;
}

/// POSTs the payload as JSON to an external mail gateway.
pub struct HttpNotificationSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpNotificationSink {
    pub fn new(endpoint: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("build notification client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for HttpNotificationSink {
    async fn send_reset_code(&self, notification: &ResetNotification) -> anyhow::Result<()> {
        self.client
            .post(&self.endpoint)
            .json(notification)
            .send()
            .await
            .with_context(|| format!("post to {}", self.endpoint))?
            .error_for_status()
            .context("notification gateway rejected request")?;
        info!(destination = %notification.destination, "reset notification delivered");
        Ok(())
    }
}

/// Used when no gateway is configured; records that a notification would be sent.
#[derive(Clone, Debug)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn send_reset_code(&self, notification: &ResetNotification) -> anyhow::Result<()> {
        info!(
            source = %notification.source,
            destination = %notification.destination,
            "reset notification send stub"
        );
        Ok(())
    }
}
