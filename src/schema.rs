//! Database schema management for `tripmind-reminder`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` when a database is configured.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `reminders` table. The CHECK constraints mirror the entity
/// invariants: a known status, `trigger_time <= departure_time`, and
/// `triggered_at` present exactly when the status is TRIGGERED. Safe to call
/// on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // One row per reminder; rows are never deleted
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reminders (
            id             UUID        PRIMARY KEY,
            user_id        TEXT        NOT NULL,
            stop_name      TEXT        NOT NULL,
            stop_id        TEXT,
            route_name     TEXT,
            minutes_before INTEGER     NOT NULL CHECK (minutes_before > 0),
            departure_time TIMESTAMPTZ NOT NULL,
            trigger_time   TIMESTAMPTZ NOT NULL,
            status         TEXT        NOT NULL
                CHECK (status IN ('PENDING', 'TRIGGERED', 'CANCELLED')),
            created_at     TIMESTAMPTZ NOT NULL,
            triggered_at   TIMESTAMPTZ,
            CHECK (trigger_time <= departure_time),
            CHECK ((status = 'TRIGGERED') = (triggered_at IS NOT NULL))
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Per-user listings
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_reminders_user_id
            ON reminders (user_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Due-reminder poll
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_reminders_status_trigger_time
            ON reminders (status, trigger_time);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
