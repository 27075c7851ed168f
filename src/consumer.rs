//! Notification consumer: the receiving end of the event channel.
//!
//! The consumer does not deduplicate. If the channel redelivers a payload,
//! the user is notified again. A payload that does not decode is logged and
//! dropped so that it cannot block the messages behind it.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::NotificationEvent;

// ---

/// Final delivery of a notification to the end user.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> Result<()>;
}

/// Stand-in for push delivery: writes the notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &NotificationEvent) -> Result<()> {
        // ---
        info!(
            reminder_id = %event.reminder_id,
            user_id = %event.user_id,
            departure_time = %event.departure_time,
            "[SIMULATED] Sending push notification: {}",
            event.message
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct NotificationConsumer {
    notifier: Arc<dyn Notifier>,
}

impl NotificationConsumer {
    // ---
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Decode and deliver one payload.
    ///
    /// Returns the decoded event, or `None` if the payload was malformed and
    /// dropped. Delivery failures are logged; the event is still returned.
    pub async fn handle(&self, payload: &str) -> Option<NotificationEvent> {
        // ---
        let event: NotificationEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping malformed notification payload: {} - Raw: {}", e, payload);
                return None;
            }
        };

        info!(
            reminder_id = %event.reminder_id,
            user_id = %event.user_id,
            "Notification received"
        );

        if let Err(e) = self.notifier.notify(&event).await {
            warn!(reminder_id = %event.reminder_id, "Notification delivery failed: {:#}", e);
        }

        Some(event)
    }

    /// Drain `rx` until every sender is gone.
    pub async fn run(self, mut rx: mpsc::Receiver<String>) {
        // ---
        info!("Notification consumer started");
        while let Some(payload) = rx.recv().await {
            self.handle(&payload).await;
        }
        info!("Notification consumer stopped, channel closed");
    }

    pub fn spawn(self, rx: mpsc::Receiver<String>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::channel::{EventChannel, InProcessChannel};
    use chrono::Utc;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<NotificationEvent>>,
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, event: &NotificationEvent) -> Result<()> {
            self.seen.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn event(message: &str) -> NotificationEvent {
        NotificationEvent {
            reminder_id: Uuid::new_v4(),
            user_id: "user1".to_string(),
            message: message.to_string(),
            stop_id: Some("tampere:0001".to_string()),
            route_name: Some("3".to_string()),
            trigger_time: Utc::now(),
            departure_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_dropped() {
        // ---
        let notifier = Arc::new(RecordingNotifier::default());
        let consumer = NotificationConsumer::new(notifier.clone());

        assert!(consumer.handle("not json").await.is_none());
        assert!(consumer.handle(r#"{"reminderId":"nope"}"#).await.is_none());
        assert!(notifier.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_poisoned_message_does_not_block_the_loop() {
        // ---
        let notifier = Arc::new(RecordingNotifier::default());
        let consumer = NotificationConsumer::new(notifier.clone());
        let (channel, rx) = InProcessChannel::new(8);

        let first = event("first");
        let second = event("second");
        channel.publish(serde_json::to_string(&first).unwrap()).await.unwrap();
        channel.publish("{garbage".to_string()).await.unwrap();
        channel.publish(serde_json::to_string(&second).unwrap()).await.unwrap();
        drop(channel);

        consumer.run(rx).await;

        let seen = notifier.seen.lock().unwrap();
        assert_eq!(*seen, vec![first, second]);
    }

    #[tokio::test]
    async fn test_redelivery_is_not_deduplicated() {
        // ---
        let notifier = Arc::new(RecordingNotifier::default());
        let consumer = NotificationConsumer::new(notifier.clone());
        let payload = serde_json::to_string(&event("twice")).unwrap();

        consumer.handle(&payload).await;
        consumer.handle(&payload).await;

        assert_eq!(notifier.seen.lock().unwrap().len(), 2);
    }
}
