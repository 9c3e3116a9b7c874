use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::types::{Event, NumericTime, WeatherSummary, WorkflowState};

/// Published document: weather and surviving events, both keyed by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// `null` for dates whose forecast could not be fetched.
    pub weather_report_by_date: BTreeMap<NaiveDate, Option<WeatherSummary>>,
    pub results_by_date: BTreeMap<NaiveDate, Vec<PublishedEvent>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    pub venue: String,
    pub venue_address: Option<String>,
    pub start: DateTime<FixedOffset>,
    pub end: Option<DateTime<FixedOffset>>,
    pub numeric_time: NumericTime,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub category: Option<String>,
    pub share_url: Option<String>,
    pub image_url: Option<String>,
}

impl From<&Event> for PublishedEvent {
    fn from(event: &Event) -> Self {
        let coords = event.coordinates.resolved();
        Self {
            id: event.id.clone(),
            title: event.title.clone(),
            description: event.description.clone(),
            venue: event.venue_name.clone(),
            venue_address: event.venue_address.clone(),
            start: event.starts_at,
            end: event.ends_at,
            numeric_time: event.numeric_time,
            lat: coords.map(|c| c.lat),
            lng: coords.map(|c| c.lng),
            category: event.category.resolved().cloned(),
            share_url: event.share_url.clone(),
            image_url: event.image_url.clone(),
        }
    }
}

impl Schema {
    /// Every date of the window appears in both maps, including dates with no
    /// surviving events.
    pub fn from_state(state: &WorkflowState) -> Self {
        let mut weather_report_by_date = BTreeMap::new();
        let mut results_by_date = BTreeMap::new();
        for (date, bucket) in &state.buckets {
            weather_report_by_date.insert(*date, bucket.weather.resolved().cloned());
            results_by_date.insert(*date, bucket.events.iter().map(PublishedEvent::from).collect());
        }
        Self { weather_report_by_date, results_by_date }
    }

    pub fn event_count(&self) -> usize {
        self.results_by_date.values().map(Vec::len).sum()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serverless handler that serves the schema to API-key holders.
    /// The output depends only on the schema contents.
    pub fn render_module(&self) -> Result<String> {
        let json = self.to_json_pretty()?.replace('\n', "\n  ");
        Ok(format!(
            r#"export default function handler(req, res) {{
  res.setHeader('Access-Control-Allow-Origin', '*');
  res.setHeader('Access-Control-Allow-Methods', 'GET, OPTIONS');
  res.setHeader('Access-Control-Allow-Headers', 'X-API-Key, Content-Type');

  if (req.method === 'OPTIONS') {{
    return res.status(200).end();
  }}

  if (req.method !== 'GET') {{
    return res.status(405).json({{ error: 'Method not allowed' }});
  }}

  const apiKey = req.headers['x-api-key'];
  if (!apiKey || apiKey !== process.env.API_SECRET_KEY) {{
    return res.status(401).json({{ error: 'Unauthorized' }});
  }}

  const schema = {json};

  res.setHeader('Cache-Control', 'public, max-age=3600');
  res.setHeader('Content-Type', 'application/json');

  return res.status(200).json(schema);
}}
"#
        ))
    }
}
