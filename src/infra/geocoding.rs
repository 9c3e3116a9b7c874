use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use super::http_client::read_json;
use crate::app::GeocoderPort;
use crate::error::PortError;
use crate::types::Coordinates;

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Coordinates,
}

/// Google Maps geocoding API.
pub struct GoogleGeocoder {
    http: Client,
    base_url: String,
    api_key: String,
}

impl GoogleGeocoder {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into(), api_key: api_key.into() }
    }
}

fn interpret(response: GeocodeResponse) -> Result<Option<Coordinates>, PortError> {
    match response.status.as_str() {
        "OK" => Ok(response.results.into_iter().next().map(|r| r.geometry.location)),
        "ZERO_RESULTS" => Ok(None),
        other => Err(PortError::Api(match response.error_message {
            Some(message) => format!("{}: {}", other, message),
            None => other.to_string(),
        })),
    }
}

#[async_trait]
impl GeocoderPort for GoogleGeocoder {
    #[instrument(skip(self), fields(api = "google_geocode"))]
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, PortError> {
        let resp = self
            .http
            .get(&self.base_url)
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await?;
        interpret(read_json(resp).await?)
    }
}
