//! Webhook entry point of the notification consumer, for deployments where
//! another instance publishes events over HTTP.

use axum::{extract::State, http::StatusCode, routing::post, Router};

use super::AppState;

// ---

pub fn router() -> Router<AppState> {
    Router::new().route("/api/notifications", post(receive))
}

/// Malformed payloads are logged and dropped by the consumer; the sender is
/// told with a 400 so that it does not retry them.
async fn receive(State(state): State<AppState>, payload: String) -> StatusCode {
    // ---
    match state.consumer.handle(&payload).await {
        Some(_) => StatusCode::ACCEPTED,
        None => StatusCode::BAD_REQUEST,
    }
}
