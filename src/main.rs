//! Application entry point for the `tripmind-reminder` service.
//!
//! This binary orchestrates the full startup sequence, including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Connecting to PostgreSQL and creating the schema (or falling back to an
//!   in-memory store when no database is configured)
//! - Choosing the event channel and starting the notification consumer
//! - Starting the due-reminder poller
//! - Mounting all API routes via the `routes` gateway
//! - Binding the Axum HTTP server and serving requests
//!
//! # Environment Variables
//! See [`tripmind_reminder::config::load_from_env`] for the full list, plus:
//! - `APP_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `APP_SPAN_EVENTS` (optional) – span event mode for tracing
use std::{env, sync::Arc};

use anyhow::Result;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use tripmind_reminder::{
    config, router, schema, AppState, Clock, Config, DepartureCache, DigitransitClient,
    EventChannel, HttpStopDirectory, InMemoryReminderStore, InProcessChannel, LogNotifier,
    NotificationConsumer, PostgresReminderStore, ReminderScheduler, ReminderStore,
    StaticStopDirectory, StopDirectory, SystemClock, WebhookChannel,
};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = connect_store(&cfg).await?;

    // Event channel and its consumer
    let consumer = NotificationConsumer::new(Arc::new(LogNotifier));
    let channel: Arc<dyn EventChannel> = match &cfg.notify_webhook_url {
        Some(url) => {
            tracing::info!("Publishing notification events to webhook {}", url);
            Arc::new(WebhookChannel::new(url.clone(), cfg.upstream_timeout)?)
        }
        None => {
            let (channel, rx) = InProcessChannel::new(cfg.event_channel_capacity);
            consumer.clone().spawn(rx);
            Arc::new(channel)
        }
    };

    let scheduler = Arc::new(ReminderScheduler::new(store, channel, clock.clone()));
    scheduler.clone().spawn_poller(cfg.poll_period);

    let departures = Arc::new(build_departure_cache(&cfg, clock)?);

    // Build app from routes gateway
    let app = router(AppState {
        scheduler,
        departures,
        consumer,
    });

    tracing::info!("Listening on {}", cfg.bind_addr);

    let listener = tokio::net::TcpListener::bind(cfg.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---

/// Connect to PostgreSQL and ensure the schema, or fall back to the
/// in-memory store when `DATABASE_URL` is unset.
async fn connect_store(cfg: &Config) -> Result<Arc<dyn ReminderStore>> {
    // ---
    let Some(db_url) = &cfg.db_url else {
        tracing::warn!("DATABASE_URL not set; reminders are kept in memory and lost on restart");
        return Ok(Arc::new(InMemoryReminderStore::new()));
    };

    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .connect(db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    Ok(Arc::new(PostgresReminderStore::new(pool)))
}

fn build_departure_cache(cfg: &Config, clock: Arc<dyn Clock>) -> Result<DepartureCache> {
    // ---
    let directory: Arc<dyn StopDirectory> = match &cfg.location_api_url {
        Some(url) => Arc::new(HttpStopDirectory::new(url.clone(), cfg.upstream_timeout)?),
        None => Arc::new(StaticStopDirectory::tampere()),
    };

    let source = Arc::new(DigitransitClient::new(
        cfg.transit_api_url.clone(),
        cfg.transit_api_key.clone(),
        cfg.upstream_timeout,
        cfg.transit_mock_fallback,
        clock.clone(),
    )?);

    Ok(DepartureCache::new(directory, source, clock)
        .with_ttl(cfg.cache_ttl)
        .with_capacity(cfg.cache_capacity)
        .with_upstream_timeout(cfg.upstream_timeout))
}

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `APP_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, else the `APP_LOG_LEVEL` env var
///
/// Called once at startup before any logging macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("APP_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("APP_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,hyper=info,reqwest=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
