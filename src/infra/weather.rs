use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use super::http_client::read_json;
use crate::app::WeatherPort;
use crate::error::PortError;
use crate::time_utils::sunset_to_numeric;
use crate::types::WeatherSummary;

#[derive(Debug, Deserialize)]
struct Timeline {
    #[serde(default)]
    days: Vec<Day>,
}

#[derive(Debug, Deserialize)]
struct Day {
    tempmax: Option<f64>,
    tempmin: Option<f64>,
    conditions: Option<String>,
    sunset: Option<String>,
}

impl From<Day> for WeatherSummary {
    fn from(day: Day) -> Self {
        WeatherSummary {
            tempmax: day.tempmax,
            tempmin: day.tempmin,
            conditions: day.conditions,
            sunset: day.sunset.as_deref().and_then(sunset_to_numeric),
        }
    }
}

/// Visual Crossing timeline API, daily summary in metric units.
pub struct VisualCrossingClient {
    http: Client,
    base_url: String,
    location: String,
    api_key: String,
}

impl VisualCrossingClient {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        location: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            location: location.into(),
            api_key: api_key.into(),
        }
    }
}

fn first_day(timeline: Timeline) -> Result<WeatherSummary, PortError> {
    timeline
        .days
        .into_iter()
        .next()
        .map(WeatherSummary::from)
        .ok_or_else(|| PortError::Api("no daily forecast in response".to_string()))
}

#[async_trait]
impl WeatherPort for VisualCrossingClient {
    #[instrument(skip(self), fields(api = "visual_crossing"))]
    async fn fetch_weather(&self, date: NaiveDate) -> Result<WeatherSummary, PortError> {
        let url = format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.location,
            date.format("%Y-%m-%d")
        );
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("elements", "tempmax,tempmin,conditions,sunset"),
                ("include", "days"),
                ("unitGroup", "metric"),
            ])
            .send()
            .await?;
        first_day(read_json(resp).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_day_becomes_summary() {
        let timeline: Timeline = serde_json::from_str(
            r#"{"days": [{"tempmax": 26.4, "tempmin": 17.2, "conditions": "Rain, Overcast", "sunset": "20:47:12"}]}"#,
        )
        .unwrap();
        let summary = first_day(timeline).unwrap();
        assert_eq!(summary.tempmax, Some(26.4));
        assert_eq!(summary.conditions.as_deref(), Some("Rain, Overcast"));
        assert_eq!(summary.sunset, Some(2047));
    }

    #[test]
    fn test_empty_timeline_is_an_error() {
        let timeline: Timeline = serde_json::from_str(r#"{"days": []}"#).unwrap();
        assert!(first_day(timeline).is_err());
    }
}
