//! Departure lookups: stop resolution, the upstream transit source, and the
//! short-lived cache in front of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod cache;
mod digitransit;
mod directory;

pub use cache::DepartureCache;
pub use digitransit::{mock_departures, DepartureSource, DigitransitClient};
pub use directory::{HttpStopDirectory, StaticStopDirectory, StopDirectory, StopLocation};

// ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Departure {
    pub route: String,
    pub departure_time: DateTime<Utc>,
}

/// Answer to "what leaves from this stop next".
///
/// `stop_id` is `None` when the stop name could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextDeparturesResponse {
    pub stop_name: String,
    pub stop_id: Option<String>,
    pub departures: Vec<Departure>,
}

impl NextDeparturesResponse {
    // ---
    pub fn not_found(stop_name: &str) -> Self {
        Self {
            stop_name: stop_name.to_string(),
            stop_id: None,
            departures: Vec::new(),
        }
    }

    /// One-line text for the end user.
    pub fn summary(&self) -> String {
        // ---
        if self.stop_id.is_none() {
            return format!("could not find stop: {}", self.stop_name);
        }
        if self.departures.is_empty() {
            return format!("no upcoming departures from {}", self.stop_name);
        }
        let next = self
            .departures
            .iter()
            .map(|d| format!("{} at {}", d.route, d.departure_time.format("%H:%M")))
            .collect::<Vec<_>>()
            .join(", ");
        format!("Next departures from {}: {}", self.stop_name, next)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_summary_texts() {
        // ---
        assert_eq!(
            NextDeparturesResponse::not_found("Nowhereistan").summary(),
            "could not find stop: Nowhereistan"
        );

        let mut response = NextDeparturesResponse {
            stop_name: "Keskustori".to_string(),
            stop_id: Some("tampere:0001".to_string()),
            departures: Vec::new(),
        };
        assert_eq!(response.summary(), "no upcoming departures from Keskustori");

        response.departures.push(Departure {
            route: "3".to_string(),
            departure_time: Utc.with_ymd_and_hms(2025, 3, 26, 18, 5, 0).unwrap(),
        });
        assert_eq!(response.summary(), "Next departures from Keskustori: 3 at 18:05");
    }
}
