use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

// ---

/// A stop as known to the location directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopLocation {
    pub id: String,
    pub name: String,
    /// Identifier in the transit routing API, e.g. `tampere:0001`.
    pub stop_id: Option<String>,
}

impl StopLocation {
    /// The identifier to query departures with.
    pub fn transit_id(&self) -> &str {
        self.stop_id.as_deref().unwrap_or(&self.id)
    }
}

/// Resolves a user-typed stop name (or id) to a stop.
#[async_trait::async_trait]
pub trait StopDirectory: Send + Sync {
    async fn resolve(&self, stop_name_or_id: &str) -> Result<Option<StopLocation>>;
}

/// Client for the location service's search endpoint.
#[derive(Debug, Clone)]
pub struct HttpStopDirectory {
    client: reqwest::Client,
    base_url: String,
}

/// Location service wire format. Unknown fields are ignored; a missing `id`
/// or `name` fails the decode rather than producing a partial stop.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationDto {
    id: String,
    name: String,
    stop_id: Option<String>,
}

impl HttpStopDirectory {
    // ---
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build location HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl StopDirectory for HttpStopDirectory {
    async fn resolve(&self, stop_name_or_id: &str) -> Result<Option<StopLocation>> {
        // ---
        let url = format!("{}/api/locations/search", self.base_url);
        debug!("Resolving stop '{}' via {}", stop_name_or_id, url);

        let results: Vec<LocationDto> = self
            .client
            .get(&url)
            .query(&[("name", stop_name_or_id)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("Malformed location search response")?;

        // first match wins
        Ok(results.into_iter().next().map(|dto| StopLocation {
            id: dto.id,
            name: dto.name,
            stop_id: dto.stop_id,
        }))
    }
}

/// Fixed directory of Tampere stops, used when no location service is
/// configured.
#[derive(Debug, Clone)]
pub struct StaticStopDirectory {
    stops: Vec<StopLocation>,
}

impl StaticStopDirectory {
    // ---
    pub fn new(stops: Vec<StopLocation>) -> Self {
        Self { stops }
    }

    pub fn tampere() -> Self {
        // ---
        let stops = [
            ("Keskustori", "tampere:0001"),
            ("Rautatieasema", "tampere:0002"),
            ("Hervanta", "tampere:0003"),
            ("Lielahti", "tampere:0004"),
            ("Tays", "tampere:0005"),
        ]
        .into_iter()
        .map(|(name, stop_id)| StopLocation {
            id: stop_id.to_string(),
            name: name.to_string(),
            stop_id: Some(stop_id.to_string()),
        })
        .collect();

        Self::new(stops)
    }
}

#[async_trait::async_trait]
impl StopDirectory for StaticStopDirectory {
    async fn resolve(&self, stop_name_or_id: &str) -> Result<Option<StopLocation>> {
        // ---
        let needle = stop_name_or_id.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }

        let found = self
            .stops
            .iter()
            .find(|s| {
                s.id.eq_ignore_ascii_case(&needle) || s.stop_id.as_deref() == Some(needle.as_str())
            })
            .or_else(|| {
                self.stops
                    .iter()
                    .find(|s| s.name.to_lowercase().contains(&needle))
            });

        Ok(found.cloned())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[tokio::test]
    async fn test_static_directory_matches_names_case_insensitively() {
        // ---
        let directory = StaticStopDirectory::tampere();

        let stop = directory.resolve("keskus").await.unwrap().unwrap();
        assert_eq!(stop.name, "Keskustori");
        assert_eq!(stop.transit_id(), "tampere:0001");

        let stop = directory.resolve("tampere:0003").await.unwrap().unwrap();
        assert_eq!(stop.name, "Hervanta");

        assert!(directory.resolve("Nowhereistan").await.unwrap().is_none());
        assert!(directory.resolve("  ").await.unwrap().is_none());
    }

    #[test]
    fn test_location_decode_fails_closed() {
        // ---
        let ok: Vec<LocationDto> = serde_json::from_str(
            r#"[{"id":"abc","name":"Tays","stopId":"tampere:0005","latitude":61.5,"type":"STOP"}]"#,
        )
        .unwrap();
        assert_eq!(ok[0].stop_id.as_deref(), Some("tampere:0005"));

        let missing_name = serde_json::from_str::<Vec<LocationDto>>(r#"[{"id":"abc"}]"#);
        assert!(missing_name.is_err());
    }
}
