//! Durable records of reminders and their lifecycle.
//!
//! Records are never deleted. The only mutation after creation is [`save`],
//! which overwrites `status`/`triggered_at` as a single-row compare-and-set
//! against a stored PENDING status, so that a trigger and a cancel racing on
//! the same reminder can never both win.
//!
//! [`save`]: ReminderStore::save

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Reminder, ReminderStatus};

mod memory;
mod postgres;

pub use memory::InMemoryReminderStore;
pub use postgres::PostgresReminderStore;

// ---

#[async_trait::async_trait]
pub trait ReminderStore: Send + Sync {
    /// Persist a freshly built reminder and return the stored record.
    async fn create(&self, reminder: Reminder) -> anyhow::Result<Reminder>;

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Reminder>>;

    async fn list_by_user(&self, user_id: &str) -> anyhow::Result<Vec<Reminder>>;

    async fn list_by_user_and_status(
        &self,
        user_id: &str,
        status: ReminderStatus,
    ) -> anyhow::Result<Vec<Reminder>>;

    /// All reminders in `status` whose `trigger_time <= before`.
    async fn list_due_before(
        &self,
        status: ReminderStatus,
        before: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Reminder>>;

    /// Overwrite the mutable fields of `reminder`, but only while the stored
    /// record is still PENDING. Returns whether the write took effect.
    async fn save(&self, reminder: &Reminder) -> anyhow::Result<bool>;
}
