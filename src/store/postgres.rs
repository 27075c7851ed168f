use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::ReminderStore;
use crate::{Reminder, ReminderStatus};

// ---

pub struct PostgresReminderStore {
    pool: PgPool,
}

impl PostgresReminderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Row shape of the `reminders` table; `status` is stored as text.
#[derive(Debug, FromRow)]
struct ReminderRow {
    // ---
    id: Uuid,
    user_id: String,
    stop_name: String,
    stop_id: Option<String>,
    route_name: Option<String>,
    minutes_before: i32,
    departure_time: DateTime<Utc>,
    trigger_time: DateTime<Utc>,
    status: String,
    created_at: DateTime<Utc>,
    triggered_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReminderRow> for Reminder {
    type Error = anyhow::Error;

    fn try_from(row: ReminderRow) -> Result<Self, Self::Error> {
        // ---
        Ok(Reminder {
            status: row.status.parse()?,
            id: row.id,
            user_id: row.user_id,
            stop_name: row.stop_name,
            stop_id: row.stop_id,
            route_name: row.route_name,
            minutes_before: row.minutes_before,
            departure_time: row.departure_time,
            trigger_time: row.trigger_time,
            created_at: row.created_at,
            triggered_at: row.triggered_at,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, user_id, stop_name, stop_id, route_name, minutes_before,
           departure_time, trigger_time, status, created_at, triggered_at
    FROM reminders
"#;

fn into_reminders(rows: Vec<ReminderRow>) -> anyhow::Result<Vec<Reminder>> {
    rows.into_iter().map(Reminder::try_from).collect()
}

#[async_trait::async_trait]
impl ReminderStore for PostgresReminderStore {
    async fn create(&self, reminder: Reminder) -> anyhow::Result<Reminder> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO reminders (
                id, user_id, stop_name, stop_id, route_name, minutes_before,
                departure_time, trigger_time, status, created_at, triggered_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(reminder.id)
        .bind(&reminder.user_id)
        .bind(&reminder.stop_name)
        .bind(&reminder.stop_id)
        .bind(&reminder.route_name)
        .bind(reminder.minutes_before)
        .bind(reminder.departure_time)
        .bind(reminder.trigger_time)
        .bind(reminder.status.as_str())
        .bind(reminder.created_at)
        .bind(reminder.triggered_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert reminder {}", reminder.id))?;

        Ok(reminder)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Reminder>> {
        // ---
        let row = sqlx::query_as::<_, ReminderRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Reminder::try_from).transpose()
    }

    async fn list_by_user(&self, user_id: &str) -> anyhow::Result<Vec<Reminder>> {
        // ---
        let rows =
            sqlx::query_as::<_, ReminderRow>(&format!("{SELECT_COLUMNS} WHERE user_id = $1"))
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        into_reminders(rows)
    }

    async fn list_by_user_and_status(
        &self,
        user_id: &str,
        status: ReminderStatus,
    ) -> anyhow::Result<Vec<Reminder>> {
        // ---
        let rows = sqlx::query_as::<_, ReminderRow>(&format!(
            "{SELECT_COLUMNS} WHERE user_id = $1 AND status = $2"
        ))
        .bind(user_id)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        into_reminders(rows)
    }

    async fn list_due_before(
        &self,
        status: ReminderStatus,
        before: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Reminder>> {
        // ---
        let rows = sqlx::query_as::<_, ReminderRow>(&format!(
            "{SELECT_COLUMNS} WHERE status = $1 AND trigger_time <= $2"
        ))
        .bind(status.as_str())
        .bind(before)
        .fetch_all(&self.pool)
        .await?;

        into_reminders(rows)
    }

    async fn save(&self, reminder: &Reminder) -> anyhow::Result<bool> {
        // ---
        // Row-level compare-and-set: a terminal row is never overwritten.
        let result = sqlx::query(
            r#"
            UPDATE reminders
               SET status = $2, triggered_at = $3
             WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(reminder.id)
        .bind(reminder.status.as_str())
        .bind(reminder.triggered_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save reminder {}", reminder.id))?;

        Ok(result.rows_affected() == 1)
    }
}
