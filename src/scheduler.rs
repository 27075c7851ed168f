//! Reminder scheduler: creation, cancellation, and poll-based triggering.
//!
//! A reminder is armed simply by being stored as PENDING. One background task
//! polls on a fixed period for PENDING reminders whose trigger time has
//! passed and, for each, publishes a [`NotificationEvent`] and then moves the
//! record to TRIGGERED. Worst-case trigger latency is one poll period.
//!
//! The status flip only happens after a successful publish, and it goes
//! through [`ReminderStore::save`], which refuses to overwrite a record that
//! has already left PENDING. Ticks run one after another inside a single
//! task, so a reminder is never selected by two ticks at once.
//!
//! [`NotificationEvent`]: crate::NotificationEvent

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    Clock, EventChannel, Reminder, ReminderError, ReminderRequest, ReminderStatus, ReminderStore,
};

// ---

/// Outcome of trying to fire one due reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Event published and reminder marked TRIGGERED.
    Triggered,
    /// Reminder left PENDING before it could be fired; nothing was published.
    Skipped,
    /// Event published, but the reminder left PENDING (cancelled, or fired
    /// by another process) before the status write landed.
    LostRace,
    /// Publishing failed; the reminder stays PENDING for the next tick.
    PublishFailed,
}

pub struct ReminderScheduler {
    store: Arc<dyn ReminderStore>,
    channel: Arc<dyn EventChannel>,
    clock: Arc<dyn Clock>,
}

impl ReminderScheduler {
    // ---
    pub fn new(
        store: Arc<dyn ReminderStore>,
        channel: Arc<dyn EventChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            channel,
            clock,
        }
    }

    /// Validate, persist as PENDING, and arm a reminder.
    pub async fn create_reminder(&self, request: ReminderRequest) -> Result<Reminder, ReminderError> {
        // ---
        let now = self.clock.now();
        let new = request.into_new_reminder(now)?;

        info!(
            "Creating reminder for user {} at stop {}",
            new.user_id, new.stop_name
        );

        let reminder = self.store.create(Reminder::new(new, now)?).await?;

        info!(
            reminder_id = %reminder.id,
            "Created reminder with trigger time {} (departure {})",
            reminder.trigger_time,
            reminder.departure_time
        );
        if reminder.trigger_time <= now {
            debug!(reminder_id = %reminder.id, "Trigger time already passed, fires on next poll");
        }

        Ok(reminder)
    }

    /// Cancel a PENDING reminder.
    ///
    /// Returns `false` if the reminder does not exist or is already terminal.
    /// An event that was already published is not retracted.
    pub async fn cancel_reminder(&self, id: Uuid) -> Result<bool, ReminderError> {
        // ---
        let Some(mut reminder) = self.store.get(id).await? else {
            debug!(reminder_id = %id, "Cancel requested for unknown reminder");
            return Ok(false);
        };

        if !reminder.cancel() {
            debug!(reminder_id = %id, status = %reminder.status, "Cancel is a no-op on terminal reminder");
            return Ok(false);
        }

        let cancelled = self.store.save(&reminder).await?;
        if cancelled {
            info!(reminder_id = %id, "Cancelled reminder");
        } else {
            info!(reminder_id = %id, "Reminder left PENDING before it could be cancelled");
        }
        Ok(cancelled)
    }

    /// All of a user's reminders, earliest trigger first.
    pub async fn get_user_reminders(&self, user_id: &str) -> Result<Vec<Reminder>, ReminderError> {
        // ---
        let mut reminders = self.store.list_by_user(user_id).await?;
        reminders.sort_by_key(|r| r.trigger_time);
        Ok(reminders)
    }

    pub async fn get_pending_reminders(
        &self,
        user_id: &str,
    ) -> Result<Vec<Reminder>, ReminderError> {
        // ---
        let mut reminders = self
            .store
            .list_by_user_and_status(user_id, ReminderStatus::Pending)
            .await?;
        reminders.sort_by_key(|r| r.trigger_time);
        Ok(reminders)
    }

    /// One poll tick: fire every PENDING reminder that is due now.
    ///
    /// Returns how many reminders were moved to TRIGGERED. Store errors are
    /// logged and end the tick early; the next tick retries.
    pub async fn run_due(&self) -> usize {
        // ---
        let now = self.clock.now();
        debug!("Checking for reminders to trigger at {}", now);

        let due = match self
            .store
            .list_due_before(ReminderStatus::Pending, now)
            .await
        {
            Ok(due) => due,
            Err(e) => {
                error!("Failed to load due reminders: {:#}", e);
                return 0;
            }
        };

        let mut triggered = 0;
        for reminder in due {
            let id = reminder.id;
            match self.trigger(reminder, now).await {
                Ok(TriggerOutcome::Triggered) => triggered += 1,
                Ok(_) => {}
                Err(e) => error!(reminder_id = %id, "Failed to trigger reminder: {:#}", e),
            }
        }

        if triggered > 0 {
            info!("Triggered {} reminders", triggered);
        }
        triggered
    }

    /// Publish the event for `reminder` and mark it TRIGGERED, as one unit.
    pub async fn trigger(
        &self,
        reminder: Reminder,
        now: DateTime<Utc>,
    ) -> anyhow::Result<TriggerOutcome> {
        // ---
        // Re-read so a cancel that landed after the poll query is honoured
        let Some(mut current) = self.store.get(reminder.id).await? else {
            return Ok(TriggerOutcome::Skipped);
        };
        if !current.is_due(now) {
            return Ok(TriggerOutcome::Skipped);
        }

        info!(
            reminder_id = %current.id,
            "Triggering reminder for user {}",
            current.user_id
        );

        let event = current.notification(now);
        let payload =
            serde_json::to_string(&event).context("Failed to serialize notification event")?;

        if let Err(e) = self.channel.publish(payload).await {
            warn!(reminder_id = %current.id, "Failed to publish reminder event, will retry: {:#}", e);
            return Ok(TriggerOutcome::PublishFailed);
        }

        current.trigger(now);
        if self.store.save(&current).await? {
            info!(reminder_id = %current.id, "Published reminder event");
            Ok(TriggerOutcome::Triggered)
        } else {
            warn!(
                reminder_id = %current.id,
                "Reminder left PENDING while its event was being published"
            );
            Ok(TriggerOutcome::LostRace)
        }
    }

    /// Start the recurring poll on its own task.
    pub fn spawn_poller(self: Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        // ---
        tokio::spawn(async move {
            info!("Reminder poller started, period {:?}", period);
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_due().await;
            }
        })
    }
}
