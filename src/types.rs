use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::pipeline::{StageName, StageReport};

/// Raw event record as returned by the events source.
pub type RawEvent = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Start and end of an event as 24-hour HHMM numbers (14:30 -> 1430, 09:05 -> 905).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericTime {
    pub start: u16,
    pub end: Option<u16>,
}

/// State of a field filled in by a later stage.
///
/// `Pending` means no stage has tried yet; `Failed` means a stage tried and
/// could not resolve it. A resolved or failed value is never replaced.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Enrichment<T> {
    #[default]
    Pending,
    Resolved(T),
    Failed,
}

impl<T> Enrichment<T> {
    pub fn resolved(&self) -> Option<&T> {
        match self {
            Enrichment::Resolved(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Enrichment::Pending)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Enrichment::Resolved(_))
    }

    /// Records the outcome of an enrichment attempt. Returns false, leaving the
    /// field untouched, when an earlier attempt already settled it.
    pub fn settle(&mut self, outcome: Enrichment<T>) -> bool {
        if !self.is_pending() || outcome.is_pending() {
            return false;
        }
        *self = outcome;
        true
    }
}

impl<T> From<Option<T>> for Enrichment<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Enrichment::Failed, Enrichment::Resolved)
    }
}

/// A validated event. Identity (`id`) is fixed at validation; enrichment
/// fields are settled by the geocoding and merge stages.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: String,
    pub venue_name: String,
    pub venue_address: Option<String>,
    pub starts_at: DateTime<FixedOffset>,
    pub ends_at: Option<DateTime<FixedOffset>>,
    pub numeric_time: NumericTime,
    pub share_url: Option<String>,
    pub image_url: Option<String>,
    pub coordinates: Enrichment<Coordinates>,
    pub category: Enrichment<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSummary {
    pub tempmax: Option<f64>,
    pub tempmin: Option<f64>,
    pub conditions: Option<String>,
    /// Sunset as HHMM.
    pub sunset: Option<u16>,
}

/// Events and weather for one calendar date of the window.
#[derive(Debug, Clone, PartialEq)]
pub struct DateBucket {
    pub date: NaiveDate,
    /// Records from the events source, drained by validation.
    pub raw_events: Vec<RawEvent>,
    pub events: Vec<Event>,
    pub weather: Enrichment<WeatherSummary>,
}

impl DateBucket {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            raw_events: Vec::new(),
            events: Vec::new(),
            weather: Enrichment::Pending,
        }
    }
}

/// Overall status of a pipeline run.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RunStatus {
    #[default]
    Running,
    Succeeded,
    Failed { stage: StageName, cause: String },
}

/// Receipt of a successful publish.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishReceipt {
    pub path: String,
    pub version: String,
    pub created: bool,
    pub attempts: u32,
}

/// Accumulator threaded through every stage of a run.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    pub buckets: BTreeMap<NaiveDate, DateBucket>,
    /// Category labels returned by the categorizer, keyed by event id.
    pub categories: HashMap<String, String>,
    pub reports: Vec<StageReport>,
    pub status: RunStatus,
    pub published: Option<PublishReceipt>,
}

impl WorkflowState {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            buckets: dates.into_iter().map(|d| (d, DateBucket::new(d))).collect(),
            ..Default::default()
        }
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.buckets.keys().copied().collect()
    }

    pub fn total_events(&self) -> usize {
        self.buckets.values().map(|b| b.events.len()).sum()
    }

    pub fn total_raw_events(&self) -> usize {
        self.buckets.values().map(|b| b.raw_events.len()).sum()
    }

    /// Number of items a stage operates on: raw records before validation has
    /// drained them, validated events afterwards.
    pub fn item_count(&self) -> usize {
        self.total_raw_events() + self.total_events()
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.buckets.values().flat_map(|b| b.events.iter())
    }

    pub fn event_counts(&self) -> BTreeMap<NaiveDate, usize> {
        self.buckets.iter().map(|(d, b)| (*d, b.events.len())).collect()
    }

    pub fn report(&self, stage: StageName) -> Option<&StageReport> {
        self.reports.iter().find(|r| r.stage == stage)
    }
}
