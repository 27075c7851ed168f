//! Route gateway: merges every endpoint subrouter and attaches the shared
//! application state. `main.rs` and the tests only see [`router`].

use std::sync::Arc;

use axum::Router;

use crate::{DepartureCache, NotificationConsumer, ReminderScheduler};

mod health;
mod notifications;
mod reminders;
mod transit;

// ---

/// Process-wide components, constructed once at startup and shared by every
/// request handler.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<ReminderScheduler>,
    pub departures: Arc<DepartureCache>,
    pub consumer: NotificationConsumer,
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(reminders::router())
        .merge(transit::router())
        .merge(notifications::router())
        .merge(health::router())
        .with_state(state)
}
