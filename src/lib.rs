//! `tripmind-reminder`: departure reminders delivered by a polling scheduler,
//! and cached next-departure lookups.
//!
//! Module map:
//! - `models`    – the reminder entity, its lifecycle, the notification event
//! - `store`     – durable reminder records (PostgreSQL or in-memory)
//! - `scheduler` – create/cancel/list and the due-reminder poll
//! - `channel`   – the outbound event channel (in-process or webhook)
//! - `consumer`  – the receiving end of the channel
//! - `transit`   – stop resolution, departures, and the TTL cache
//! - `routes`    – the HTTP surface
//!
//! Sibling modules import shared types through the re-exports below rather
//! than reaching into each other's paths.

pub mod channel;
pub mod clock;
pub mod config;
pub mod consumer;
pub mod error;
pub mod models;
pub mod routes;
pub mod scheduler;
pub mod schema;
pub mod store;
pub mod transit;

pub use channel::{EventChannel, InProcessChannel, WebhookChannel};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use consumer::{LogNotifier, NotificationConsumer, Notifier};
pub use error::ReminderError;
pub use models::{NewReminder, NotificationEvent, Reminder, ReminderRequest, ReminderStatus};
pub use routes::{router, AppState};
pub use scheduler::{ReminderScheduler, TriggerOutcome};
pub use store::{InMemoryReminderStore, PostgresReminderStore, ReminderStore};
pub use transit::{
    DepartureCache, DepartureSource, DigitransitClient, HttpStopDirectory,
    NextDeparturesResponse, StaticStopDirectory, StopDirectory,
};
