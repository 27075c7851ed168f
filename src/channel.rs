//! Outbound event channel between the scheduler and the notification
//! consumer.
//!
//! Payloads travel as JSON text. Delivery is at-least-once at best: the
//! scheduler treats a returned `Ok` as "handed off" and nothing more.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::mpsc;

// ---

#[async_trait::async_trait]
pub trait EventChannel: Send + Sync {
    /// Hand one serialized event to the channel.
    async fn publish(&self, payload: String) -> Result<()>;
}

/// Bounded in-process queue drained by a [`NotificationConsumer`] task.
///
/// [`NotificationConsumer`]: crate::NotificationConsumer
#[derive(Debug, Clone)]
pub struct InProcessChannel {
    tx: mpsc::Sender<String>,
}

impl InProcessChannel {
    // ---
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl EventChannel for InProcessChannel {
    async fn publish(&self, payload: String) -> Result<()> {
        self.tx
            .send(payload)
            .await
            .map_err(|_| anyhow!("notification consumer has shut down"))
    }
}

/// Publishes each event as an HTTP POST to a remote consumer, e.g. another
/// instance's `/api/notifications` route.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    // ---
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build webhook HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait::async_trait]
impl EventChannel for WebhookChannel {
    async fn publish(&self, payload: String) -> Result<()> {
        // ---
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.url))?;

        response
            .error_for_status()
            .with_context(|| format!("POST {} was rejected", self.url))?;

        Ok(())
    }
}
