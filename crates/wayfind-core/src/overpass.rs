//! [`PlaceQueryClient`] backed by the OpenStreetMap Overpass API.
//!
//! Requires the `overpass` feature.
//!
//! # Example
//!
//! ```no_run
//! use wayfind_core::overpass::OverpassClient;
//! use wayfind_core::PlaceQueryClient;
//! use wayfind_types::Coordinate;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OverpassClient::new(wayfind_core::overpass::DEFAULT_ENDPOINT)?;
//! let places = client.fetch_nearby(Coordinate::new(52.52, 13.405), 15_000).await?;
//! for place in places {
//!     println!("{} ({})", place.name, place.category);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use wayfind_types::{Coordinate, PlaceCandidate};

use crate::error::{Error, QueryError, Result};
use crate::traits::PlaceQueryClient;

/// Public Overpass interpreter endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://overpass-api.de/api/interpreter";

/// Default HTTP timeout for one query.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default `place=*` values queried.
pub const DEFAULT_PLACE_KINDS: &[&str] = &["city", "town", "village"];

/// Server-side evaluation limit embedded in the query, in seconds.
const SERVER_TIMEOUT_SECS: u32 = 25;

/// HTTP client for the Overpass API.
#[derive(Debug, Clone)]
pub struct OverpassClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
    place_kinds: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

impl OverpassElement {
    /// Node coordinates, or the computed center of a way or relation.
    fn position(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon, &self.center) {
            (Some(lat), Some(lon), _) => Some((lat, lon)),
            (_, _, Some(center)) => Some((center.lat, center.lon)),
            _ => None,
        }
    }

    fn into_candidate(self) -> Option<PlaceCandidate> {
        let (latitude, longitude) = self.position()?;
        let name = self.tags.get("name").map(|n| n.trim()).filter(|n| !n.is_empty())?;
        let category = self
            .tags
            .get("place")
            .map(String::as_str)
            .unwrap_or("unknown");

        Some(PlaceCandidate::new(
            self.id.to_string(),
            name,
            latitude,
            longitude,
            category,
        ))
    }
}

impl OverpassClient {
    /// Create a client for the given interpreter endpoint.
    pub fn new(endpoint: &str) -> Result<Self> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.trim_end_matches('/').to_string();

        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(Error::invalid_config(format!(
                "Overpass endpoint must start with http:// or https://, got: {}",
                endpoint
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wayfind/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::invalid_config(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            timeout,
            place_kinds: DEFAULT_PLACE_KINDS.iter().map(|k| k.to_string()).collect(),
        })
    }

    /// Query these `place=*` values instead of the defaults.
    pub fn with_place_kinds(mut self, kinds: Vec<String>) -> Self {
        self.place_kinds = kinds;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the Overpass QL query for places around `center`.
    pub fn build_query(&self, center: Coordinate, radius_m: u32) -> String {
        let kinds = self.place_kinds.join("|");
        let server_timeout = SERVER_TIMEOUT_SECS;
        let around = format!("(around:{},{},{})", radius_m, center.latitude, center.longitude);
        format!(
            "[out:json][timeout:{server_timeout}];\n\
             (\n  \
               node[\"place\"~\"{kinds}\"]{around};\n  \
               way[\"place\"~\"{kinds}\"]{around};\n  \
               relation[\"place\"~\"{kinds}\"]{around};\n\
             );\n\
             out center;"
        )
    }

    fn map_transport_error(&self, err: reqwest::Error) -> QueryError {
        if err.is_timeout() {
            QueryError::Timeout(self.timeout)
        } else {
            QueryError::Network(err.to_string())
        }
    }
}

/// Decode an Overpass JSON body into named candidates.
///
/// Elements without a usable name or without any coordinates are dropped.
pub fn parse_response(body: &str) -> std::result::Result<Vec<PlaceCandidate>, QueryError> {
    let response: OverpassResponse =
        serde_json::from_str(body).map_err(|e| QueryError::Decode(e.to_string()))?;

    Ok(response
        .elements
        .into_iter()
        .filter_map(OverpassElement::into_candidate)
        .collect())
}

#[async_trait]
impl PlaceQueryClient for OverpassClient {
    async fn fetch_nearby(
        &self,
        center: Coordinate,
        radius_m: u32,
    ) -> std::result::Result<Vec<PlaceCandidate>, QueryError> {
        let query = self.build_query(center, radius_m);
        debug!("POST {} ({} bytes of Overpass QL)", self.endpoint, query.len());

        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("data", query.as_str())])
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(QueryError::Service {
                status: status.as_u16(),
                message: message.trim().chars().take(200).collect(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        let candidates = parse_response(&body)?;
        debug!("Overpass returned {} named places", candidates.len());
        Ok(candidates)
    }
}
