use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::ReminderStore;
use crate::{Reminder, ReminderStatus};

// ---

/// Non-durable store used when no database is configured, and in tests.
#[derive(Debug, Default)]
pub struct InMemoryReminderStore {
    reminders: Mutex<HashMap<Uuid, Reminder>>,
}

impl InMemoryReminderStore {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Reminder>> {
        self.reminders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn find_by<F: Fn(&Reminder) -> bool>(&self, compare: F) -> Vec<Reminder> {
        self.lock().values().filter(|r| compare(r)).cloned().collect()
    }
}

#[async_trait::async_trait]
impl ReminderStore for InMemoryReminderStore {
    async fn create(&self, reminder: Reminder) -> anyhow::Result<Reminder> {
        // ---
        let mut reminders = self.lock();
        if reminders.contains_key(&reminder.id) {
            anyhow::bail!("reminder {} already exists", reminder.id);
        }
        reminders.insert(reminder.id, reminder.clone());
        Ok(reminder)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Reminder>> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn list_by_user(&self, user_id: &str) -> anyhow::Result<Vec<Reminder>> {
        Ok(self.find_by(|r| r.user_id == user_id))
    }

    async fn list_by_user_and_status(
        &self,
        user_id: &str,
        status: ReminderStatus,
    ) -> anyhow::Result<Vec<Reminder>> {
        Ok(self.find_by(|r| r.user_id == user_id && r.status == status))
    }

    async fn list_due_before(
        &self,
        status: ReminderStatus,
        before: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Reminder>> {
        Ok(self.find_by(|r| r.status == status && r.trigger_time <= before))
    }

    async fn save(&self, reminder: &Reminder) -> anyhow::Result<bool> {
        // ---
        let mut reminders = self.lock();
        match reminders.get_mut(&reminder.id) {
            Some(stored) if stored.status == ReminderStatus::Pending => {
                stored.status = reminder.status;
                stored.triggered_at = reminder.triggered_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
