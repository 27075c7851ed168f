use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::Departure;
use crate::Clock;

// ---

const ROUTING_PATH: &str = "/routing/v2/waltti/gtfs/v1";

const STOPTIMES_QUERY: &str = r#"
query NextDepartures($id: String!, $n: Int!) {
  stop(id: $id) {
    name
    stoptimesWithoutPatterns(numberOfDepartures: $n) {
      serviceDay
      realtimeDeparture
      scheduledDeparture
      trip {
        routeShortName
      }
    }
  }
}
"#;

/// Upcoming departures for a stop, earliest first, at most `limit` long.
#[async_trait::async_trait]
pub trait DepartureSource: Send + Sync {
    async fn fetch_departures(&self, stop_id: &str, limit: usize) -> Result<Vec<Departure>>;
}

/// Digitransit GraphQL routing API client.
pub struct DigitransitClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    mock_fallback: bool,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<GraphQlData>,
}

#[derive(Debug, Deserialize)]
struct GraphQlData {
    stop: Option<StopTimes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopTimes {
    stoptimes_without_patterns: Option<Vec<StopTime>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StopTime {
    /// Service day start, epoch seconds.
    service_day: i64,
    /// Seconds since `service_day`.
    realtime_departure: i64,
    trip: Option<Trip>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Trip {
    route_short_name: Option<String>,
}

impl GraphQlResponse {
    fn into_departures(self) -> Vec<Departure> {
        // ---
        self.data
            .and_then(|d| d.stop)
            .and_then(|s| s.stoptimes_without_patterns)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|st| {
                let epoch = st.service_day.checked_add(st.realtime_departure)?;
                let departure_time = DateTime::from_timestamp(epoch, 0)?;
                let route = st
                    .trip
                    .and_then(|t| t.route_short_name)
                    .unwrap_or_else(|| "?".to_string());
                Some(Departure {
                    route,
                    departure_time,
                })
            })
            .collect()
    }
}

impl DigitransitClient {
    // ---
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        mock_fallback: bool,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build transit HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            mock_fallback,
            clock,
        })
    }

    async fn fetch_from_api(&self, stop_id: &str, limit: usize) -> Result<Vec<Departure>> {
        // ---
        let url = format!("{}{}", self.base_url, ROUTING_PATH);
        debug!("Fetching departures for {} from {}", stop_id, url);

        let body = json!({
            "query": STOPTIMES_QUERY,
            "variables": { "id": stop_id, "n": limit },
        });
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("digitransit-subscription-key", key);
        }

        let response: GraphQlResponse = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("Malformed Digitransit response")?;

        let mut departures = response.into_departures();
        departures.truncate(limit);
        Ok(departures)
    }
}

#[async_trait::async_trait]
impl DepartureSource for DigitransitClient {
    async fn fetch_departures(&self, stop_id: &str, limit: usize) -> Result<Vec<Departure>> {
        // ---
        match self.fetch_from_api(stop_id, limit).await {
            Ok(departures) => Ok(departures),
            Err(e) if self.mock_fallback => {
                warn!("Digitransit unavailable for {}, serving mock departures: {:#}", stop_id, e);
                Ok(mock_departures(self.clock.now(), limit))
            }
            Err(e) => Err(e),
        }
    }
}

/// Deterministic stand-in schedule relative to `now`.
pub fn mock_departures(now: DateTime<Utc>, limit: usize) -> Vec<Departure> {
    // ---
    [("3", 180), ("1", 420), ("25", 660), ("8", 900), ("3", 1200)]
        .into_iter()
        .take(limit)
        .map(|(route, secs)| Departure {
            route: route.to_string(),
            departure_time: now + ChronoDuration::seconds(secs),
        })
        .collect()
}
