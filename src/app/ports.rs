use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

use crate::error::PortError;
use crate::types::{Coordinates, RawEvent, WeatherSummary};

/// Source of raw event listings, one call per calendar date.
#[async_trait]
pub trait EventSourcePort: Send + Sync {
    async fn fetch_events(&self, date: NaiveDate) -> Result<Vec<RawEvent>, PortError>;
}

/// Resolves an address query to coordinates. `Ok(None)` means the service
/// answered but found nothing.
#[async_trait]
pub trait GeocoderPort: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, PortError>;
}

#[async_trait]
pub trait WeatherPort: Send + Sync {
    async fn fetch_weather(&self, date: NaiveDate) -> Result<WeatherSummary, PortError>;
}

/// One event as presented to the categorizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorizationItem {
    pub id: String,
    pub title: String,
    pub description: String,
}

/// Labels a whole batch of events in a single request. A response that cannot
/// be read as an id -> category mapping is a `PortError::Malformed`.
#[async_trait]
pub trait CategorizerPort: Send + Sync {
    async fn categorize(
        &self,
        batch: &[CategorizationItem],
    ) -> Result<HashMap<String, String>, PortError>;
}

/// Opaque token identifying the current revision of a published file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(pub String);

impl std::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The content was stored; the token identifies the new revision.
    Written(VersionToken),
    /// The expected token no longer matches the stored revision.
    Conflict,
}

/// Remote file store with compare-and-swap writes.
#[async_trait]
pub trait PublisherPort: Send + Sync {
    async fn read_current_version(&self, path: &str) -> Result<Option<VersionToken>, PortError>;

    /// Writes `content` at `path`. With `expected == None` the file must not
    /// exist yet; otherwise `expected` must match the current revision.
    async fn write(
        &self,
        path: &str,
        content: &str,
        expected: Option<&VersionToken>,
    ) -> Result<WriteOutcome, PortError>;
}
