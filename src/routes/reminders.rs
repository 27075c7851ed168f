use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::AppState;
use crate::{Reminder, ReminderError, ReminderRequest};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/reminders", post(create))
        .route("/api/reminders/{id}", get(list_for_user).delete(cancel))
        .route("/api/reminders/{id}/pending", get(list_pending_for_user))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatedResponse {
    id: Uuid,
    status: String,
    trigger_time: String,
    departure_time: String,
    message: String,
}

impl From<Reminder> for CreatedResponse {
    fn from(r: Reminder) -> Self {
        Self {
            message: r.confirmation_message(),
            id: r.id,
            status: r.status.to_string(),
            trigger_time: r.trigger_time.to_rfc3339(),
            departure_time: r.departure_time.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CancelResponse {
    id: String,
    cancelled: bool,
}

async fn create(
    State(state): State<AppState>,
    body: Result<Json<ReminderRequest>, JsonRejection>,
) -> Result<Json<CreatedResponse>, ReminderError> {
    // ---
    info!("POST /api/reminders");
    let Json(request) = body?;
    let reminder = state.scheduler.create_reminder(request).await?;
    Ok(Json(reminder.into()))
}

/// The `{id}` segment is the user id here.
async fn list_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Reminder>>, ReminderError> {
    // ---
    Ok(Json(state.scheduler.get_user_reminders(&user_id).await?))
}

async fn list_pending_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Reminder>>, ReminderError> {
    // ---
    Ok(Json(state.scheduler.get_pending_reminders(&user_id).await?))
}

/// A malformed id cannot name a reminder, so it is reported as not cancelled.
async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ReminderError> {
    // ---
    info!("DELETE /api/reminders/{}", id);
    let cancelled = match Uuid::parse_str(&id) {
        Ok(uuid) => state.scheduler.cancel_reminder(uuid).await?,
        Err(_) => false,
    };
    Ok(Json(CancelResponse { id, cancelled }))
}
