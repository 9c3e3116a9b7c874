use async_trait::async_trait;
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use crate::config::RequiredField;
use crate::pipeline::{Stage, StageName, StageResult};
use crate::time_utils::{local_parts, numeric_time, parse_event_time, resolve_span};
use crate::types::{Enrichment, Event, NumericTime, RawEvent, WorkflowState};

/// Why a raw record did not become an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingFields(Vec<&'static str>),
    UnparsableStart(String),
}

/// Drops malformed records and turns the rest into typed events.
pub struct ValidateStage {
    required: Vec<RequiredField>,
    tz: Tz,
}

impl ValidateStage {
    pub fn new(required: Vec<RequiredField>, tz: Tz) -> Self {
        Self { required, tz }
    }

    /// Build an event from a raw record fetched for `date`.
    pub fn validate_event(&self, raw: &RawEvent, date: NaiveDate) -> Result<Event, Rejection> {
        let missing: Vec<&'static str> = self
            .required
            .iter()
            .map(RequiredField::key)
            .filter(|key| text(raw, key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(Rejection::MissingFields(missing));
        }

        let title = text(raw, "title").unwrap_or_default();
        let venue_name = text(raw, "venue_name").unwrap_or_default();
        let start_raw = text(raw, "start_time").unwrap_or_default();

        let start = parse_event_time(&start_raw, self.tz)
            .ok_or_else(|| Rejection::UnparsableStart(start_raw.clone()))?;
        let end = text(raw, "end_time").and_then(|s| parse_event_time(&s, self.tz));
        let (starts_at, ends_at) = resolve_span(date, start, end, self.tz)
            .ok_or_else(|| Rejection::UnparsableStart(start_raw.clone()))?;

        let numeric = NumericTime {
            start: numeric_time(local_parts(&starts_at, self.tz).1),
            end: ends_at.map(|e| numeric_time(local_parts(&e, self.tz).1)),
        };

        let id = text(raw, "id").unwrap_or_else(|| derived_id(&title, &venue_name, &start_raw));

        Ok(Event {
            id,
            title,
            description: text(raw, "description_stripped")
                .or_else(|| text(raw, "description"))
                .unwrap_or_default(),
            venue_name,
            venue_address: text(raw, "venue_address").or_else(|| text(raw, "address")),
            starts_at,
            ends_at,
            numeric_time: numeric,
            share_url: text(raw, "share_url"),
            image_url: text(raw, "hub_page_image_url"),
            coordinates: Enrichment::Pending,
            category: Enrichment::Pending,
        })
    }
}

/// Non-empty textual value of a field. Numbers are stringified, so numeric
/// source ids are accepted; null, empty and whitespace-only strings count as absent.
fn text(raw: &RawEvent, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Stable id for records that carry none of their own.
fn derived_id(title: &str, venue: &str, start: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0]);
    hasher.update(venue.as_bytes());
    hasher.update([0]);
    hasher.update(start.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("derived-{}", &digest[..16])
}

#[async_trait]
impl Stage for ValidateStage {
    fn name(&self) -> StageName {
        StageName::Validate
    }

    async fn execute(&self, state: &mut WorkflowState) -> StageResult {
        let attempted = state.total_raw_events();
        let mut placed: BTreeMap<NaiveDate, Vec<Event>> = BTreeMap::new();
        let mut rejected = 0;
        let mut out_of_window = 0;

        for (date, bucket) in state.buckets.iter_mut() {
            let raw_events = std::mem::take(&mut bucket.raw_events);
            let mut invalid = 0;
            for raw in &raw_events {
                match self.validate_event(raw, *date) {
                    Ok(event) => {
                        let (local_date, _) = local_parts(&event.starts_at, self.tz);
                        placed.entry(local_date).or_default().push(event);
                    }
                    Err(reason) => {
                        invalid += 1;
                        debug!("⚠️ Event {} rejected: {:?}", raw.get("id").unwrap_or(&serde_json::Value::Null), reason);
                    }
                }
            }
            rejected += invalid;
            info!("✓ {}: {} records checked, {} invalid", date, raw_events.len(), invalid);
        }

        let mut duplicates = 0;
        for (date, events) in placed {
            let Some(bucket) = state.buckets.get_mut(&date) else {
                out_of_window += events.len();
                continue;
            };
            let mut seen: HashSet<String> = bucket.events.iter().map(|e| e.id.clone()).collect();
            for event in events {
                if seen.insert(event.id.clone()) {
                    bucket.events.push(event);
                } else {
                    duplicates += 1;
                }
            }
        }

        let kept = state.total_events();
        let dropped = rejected + out_of_window + duplicates;
        if out_of_window > 0 || duplicates > 0 {
            warn!("Dropped {} events outside the window and {} duplicates", out_of_window, duplicates);
        }
        if kept == 0 {
            return StageResult::fatal(attempted, 0, format!("none of {} events passed validation", attempted));
        }

        StageResult::from_counts(
            attempted,
            kept,
            dropped,
            format!("{}/{} events passed validation", kept, attempted),
        )
    }
}
