use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::http_client::read_json;
use crate::app::EventSourcePort;
use crate::error::PortError;
use crate::types::RawEvent;

#[derive(Debug, Deserialize)]
struct EventsPage {
    #[serde(default)]
    results: Vec<RawEvent>,
}

/// BlogTO events listing, one page per date.
pub struct BlogToClient {
    http: Client,
    base_url: String,
}

impl BlogToClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }
}

#[async_trait]
impl EventSourcePort for BlogToClient {
    #[instrument(skip(self), fields(api = "blogto"))]
    async fn fetch_events(&self, date: NaiveDate) -> Result<Vec<RawEvent>, PortError> {
        let date = date.format("%Y-%m-%d").to_string();
        let resp = self
            .http
            .get(&self.base_url)
            .query(&[
                ("bundle_type", "medium"),
                ("date", date.as_str()),
                ("limit", "9999"),
                ("offset", "0"),
                ("status", "ongoing"),
            ])
            .header("accept-language", "en-US,en;q=0.9")
            .send()
            .await?;

        let page: EventsPage = read_json(resp).await?;
        debug!("{} listings for {}", page.results.len(), date);
        Ok(page.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_without_results_is_empty() {
        let page: EventsPage = serde_json::from_str(r#"{"count": 0}"#).unwrap();
        assert!(page.results.is_empty());

        let page: EventsPage =
            serde_json::from_str(r#"{"results": [{"id": 42, "title": "Jazz"}]}"#).unwrap();
        assert_eq!(page.results[0]["id"], 42);
    }
}
