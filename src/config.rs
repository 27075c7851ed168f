//! Configuration loader for the `tripmind-reminder` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Nothing else in the crate reads `env::var` for
//! settings; components receive the values they need from [`Config`].
//!
use std::{env, net::SocketAddr, time::Duration};

use anyhow::{anyhow, Result};

/// Parse an optional numeric environment variable with a default value.
macro_rules! parse_env {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional boolean environment variable with a default value.
macro_rules! parse_env_bool {
    ($var_name:expr, $default:expr) => {
        match env::var($var_name).ok().as_deref() {
            None => $default,
            Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            Some(other) => return Err(anyhow!("Invalid {}: {}", $var_name, other)),
        }
    };
}

/// Read an optional, non-empty string environment variable.
macro_rules! optional_env {
    ($var_name:expr) => {
        env::var($var_name).ok().filter(|v| !v.trim().is_empty())
    };
}

pub const DEFAULT_TRANSIT_API_URL: &str = "https://api.digitransit.fi";

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string. `None` selects the in-memory store.
    pub db_url: Option<String>,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,

    /// Period of the due-reminder poll.
    pub poll_period: Duration,

    /// Lifetime of a departure cache entry.
    pub cache_ttl: Duration,

    /// Maximum number of cached departure keys; `0` means unbounded.
    pub cache_capacity: usize,

    /// Stop directory base URL. `None` selects the built-in directory.
    pub location_api_url: Option<String>,

    /// Digitransit routing API base URL.
    pub transit_api_url: String,

    /// Digitransit subscription key.
    pub transit_api_key: Option<String>,

    /// Serve mock departures when the transit API fails.
    pub transit_mock_fallback: bool,

    /// Timeout for every outbound HTTP call.
    pub upstream_timeout: Duration,

    /// When set, notification events are POSTed here instead of being
    /// consumed in-process.
    pub notify_webhook_url: Option<String>,

    /// Buffer size of the in-process event channel.
    pub event_channel_capacity: usize,
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `DATABASE_URL` – PostgreSQL connection string (default: in-memory store)
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `BIND_ADDR` – listen address (default: 0.0.0.0:8080)
/// - `REMINDER_POLL_SECS` – due-reminder poll period (default: 30)
/// - `DEPARTURE_CACHE_TTL_SECS` – cache TTL (default: 10)
/// - `DEPARTURE_CACHE_CAPACITY` – cache key limit, 0 = unbounded (default: 1024)
/// - `LOCATION_API_URL` – stop directory service (default: built-in stops)
/// - `TRANSIT_API_URL` – Digitransit base URL
/// - `DIGITRANSIT_API_KEY` – Digitransit subscription key
/// - `TRANSIT_MOCK_FALLBACK` – mock departures on upstream failure (default: true)
/// - `UPSTREAM_TIMEOUT_MS` – outbound HTTP timeout (default: 3000)
/// - `NOTIFY_WEBHOOK_URL` – publish events to this URL
/// - `EVENT_CHANNEL_CAPACITY` – in-process channel buffer (default: 256)
///
/// Returns an error if any variable is present but invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = optional_env!("DATABASE_URL");
    let db_pool_max = parse_env!("DB_POOL_MAX", u32, 5);
    let bind_addr = parse_env!("BIND_ADDR", SocketAddr, SocketAddr::from(([0, 0, 0, 0], 8080)));
    let poll_secs = parse_env!("REMINDER_POLL_SECS", u64, 30);
    let ttl_secs = parse_env!("DEPARTURE_CACHE_TTL_SECS", u64, 10);
    let cache_capacity = parse_env!("DEPARTURE_CACHE_CAPACITY", usize, 1024);
    let location_api_url = optional_env!("LOCATION_API_URL");
    let transit_api_url =
        optional_env!("TRANSIT_API_URL").unwrap_or_else(|| DEFAULT_TRANSIT_API_URL.to_string());
    let transit_api_key = optional_env!("DIGITRANSIT_API_KEY");
    let transit_mock_fallback = parse_env_bool!("TRANSIT_MOCK_FALLBACK", true);
    let timeout_ms = parse_env!("UPSTREAM_TIMEOUT_MS", u64, 3000);
    let notify_webhook_url = optional_env!("NOTIFY_WEBHOOK_URL");
    let event_channel_capacity = parse_env!("EVENT_CHANNEL_CAPACITY", usize, 256);

    if poll_secs == 0 {
        return Err(anyhow!("Invalid REMINDER_POLL_SECS: must be at least 1"));
    }
    if event_channel_capacity == 0 {
        return Err(anyhow!("Invalid EVENT_CHANNEL_CAPACITY: must be at least 1"));
    }

    Ok(Config {
        db_url,
        db_pool_max,
        bind_addr,
        poll_period: Duration::from_secs(poll_secs),
        cache_ttl: Duration::from_secs(ttl_secs),
        cache_capacity,
        location_api_url,
        transit_api_url,
        transit_api_key,
        transit_mock_fallback,
        upstream_timeout: Duration::from_millis(timeout_ms),
        notify_webhook_url,
        event_channel_capacity,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords and API keys while
    /// showing all other configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        let masked_db_url = self
            .db_url
            .as_deref()
            .map(mask_password)
            .unwrap_or_else(|| "<unset, in-memory store>".to_string());

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL             : {}", masked_db_url);
        tracing::info!("  DB_POOL_MAX              : {}", self.db_pool_max);
        tracing::info!("  BIND_ADDR                : {}", self.bind_addr);
        tracing::info!("  REMINDER_POLL_SECS       : {}", self.poll_period.as_secs());
        tracing::info!("  DEPARTURE_CACHE_TTL_SECS : {}", self.cache_ttl.as_secs());
        tracing::info!("  DEPARTURE_CACHE_CAPACITY : {}", self.cache_capacity);
        tracing::info!(
            "  LOCATION_API_URL         : {}",
            self.location_api_url.as_deref().unwrap_or("<unset, built-in stops>")
        );
        tracing::info!("  TRANSIT_API_URL          : {}", self.transit_api_url);
        tracing::info!(
            "  DIGITRANSIT_API_KEY      : {}",
            if self.transit_api_key.is_some() { "****" } else { "<unset>" }
        );
        tracing::info!("  TRANSIT_MOCK_FALLBACK    : {}", self.transit_mock_fallback);
        tracing::info!("  UPSTREAM_TIMEOUT_MS      : {}", self.upstream_timeout.as_millis());
        tracing::info!(
            "  NOTIFY_WEBHOOK_URL       : {}",
            self.notify_webhook_url.as_deref().unwrap_or("<unset, in-process>")
        );
        tracing::info!("  EVENT_CHANNEL_CAPACITY   : {}", self.event_channel_capacity);
    }
}

/// Replace the password segment of a connection URL with `****`.
fn mask_password(url: &str) -> String {
    // ---
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            // "postgres://user@host" has its only colon in the scheme
            if !url[colon_pos..].starts_with("://") {
                return format!("{}:****{}", &url[..colon_pos], &url[at_pos..]);
            }
        }
    }
    url.to_string()
}
