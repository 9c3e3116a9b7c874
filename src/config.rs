use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::constants;
use crate::error::{AggregatorError, Result};
use crate::pipeline::RetryPolicy;

/// Raw-record fields an event must carry to survive validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    Id,
    Title,
    VenueName,
    StartTime,
    EndTime,
    DescriptionStripped,
    ShareUrl,
    HubPageImageUrl,
}

impl RequiredField {
    /// Key of this field in a raw source record.
    pub fn key(&self) -> &'static str {
        match self {
            RequiredField::Id => "id",
            RequiredField::Title => "title",
            RequiredField::VenueName => "venue_name",
            RequiredField::StartTime => "start_time",
            RequiredField::EndTime => "end_time",
            RequiredField::DescriptionStripped => "description_stripped",
            RequiredField::ShareUrl => "share_url",
            RequiredField::HubPageImageUrl => "hub_page_image_url",
        }
    }
}

/// What to do with an event whose venue could not be geocoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeocodeFailurePolicy {
    /// Keep the event without coordinates.
    #[default]
    Retain,
    /// Remove the event from its bucket.
    Drop,
}

/// Everything the orchestrator needs, validated once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub days: u32,
    pub timezone: Tz,
    pub fetch_delay_ms: u64,
    pub geocode_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub categorize_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Extra categorization attempts after a malformed response.
    pub categorization_retries: u32,
    pub required_fields: Vec<RequiredField>,
    pub excluded_categories: Vec<String>,
    pub geocode_failure: GeocodeFailurePolicy,
    /// Appended to venue names when an event has no street address.
    pub geocode_region: String,
    pub publish_path: String,
    pub publish_conflict_retries: u32,
    pub publish_retry_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            days: 7,
            timezone: chrono_tz::America::Toronto,
            fetch_delay_ms: 5_000,
            geocode_delay_ms: 10,
            request_timeout_secs: 30,
            categorize_timeout_secs: 120,
            max_retries: 2,
            retry_backoff_ms: 500,
            categorization_retries: 1,
            required_fields: vec![
                RequiredField::Id,
                RequiredField::VenueName,
                RequiredField::StartTime,
                RequiredField::EndTime,
                RequiredField::DescriptionStripped,
                RequiredField::Title,
                RequiredField::ShareUrl,
                RequiredField::HubPageImageUrl,
            ],
            excluded_categories: constants::DEFAULT_EXCLUDED_CATEGORIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            geocode_failure: GeocodeFailurePolicy::Retain,
            geocode_region: constants::DEFAULT_GEOCODE_REGION.to_string(),
            publish_path: constants::DEFAULT_PUBLISH_PATH.to_string(),
            publish_conflict_retries: 1,
            publish_retry_backoff_ms: 1_000,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=14).contains(&self.days) {
            return Err(AggregatorError::Config(format!(
                "days must be between 1 and 14, got {}",
                self.days
            )));
        }
        if self.max_retries > 2 {
            return Err(AggregatorError::Config(format!(
                "max_retries must be at most 2, got {}",
                self.max_retries
            )));
        }
        if self.categorization_retries > 2 || self.publish_conflict_retries > 2 {
            return Err(AggregatorError::Config(
                "categorization_retries and publish_conflict_retries must be at most 2".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 || self.categorize_timeout_secs == 0 {
            return Err(AggregatorError::Config("timeouts must be non-zero".to_string()));
        }
        for needed in [RequiredField::Title, RequiredField::VenueName, RequiredField::StartTime] {
            if !self.required_fields.contains(&needed) {
                return Err(AggregatorError::Config(format!(
                    "required_fields must include {}",
                    needed.key()
                )));
            }
        }
        if self.excluded_categories.iter().any(|c| c.trim().is_empty()) {
            return Err(AggregatorError::Config(
                "excluded_categories must not contain empty names".to_string(),
            ));
        }
        if self.publish_path.trim().is_empty() {
            return Err(AggregatorError::Config("publish_path must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn fetch_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_delay_ms)
    }

    pub fn geocode_delay(&self) -> Duration {
        Duration::from_millis(self.geocode_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_secs(self.request_timeout_secs),
            Duration::from_millis(self.retry_backoff_ms),
        )
    }

    /// Policy for the categorizer: longer timeout, malformed-response retry budget.
    pub fn categorize_policy(&self) -> RetryPolicy {
        self.retry_policy()
            .with_timeout(Duration::from_secs(self.categorize_timeout_secs))
            .with_max_retries(self.categorization_retries)
    }

    pub fn publish_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.publish_retry_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub events_api_base: String,
    pub geocode_api_base: String,
    pub weather_api_base: String,
    pub weather_location: String,
    pub anthropic_api_base: String,
    pub anthropic_model: String,
    pub anthropic_max_tokens: u32,
    pub anthropic_temperature: f32,
    pub github_api_base: String,
    pub github_repo: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            events_api_base: constants::BLOGTO_API_BASE.to_string(),
            geocode_api_base: constants::GOOGLE_GEOCODE_API_BASE.to_string(),
            weather_api_base: constants::WEATHER_API_BASE.to_string(),
            weather_location: constants::DEFAULT_WEATHER_LOCATION.to_string(),
            anthropic_api_base: constants::ANTHROPIC_API_BASE.to_string(),
            anthropic_model: constants::DEFAULT_ANTHROPIC_MODEL.to_string(),
            anthropic_max_tokens: 64_000,
            anthropic_temperature: 0.1,
            github_api_base: constants::GITHUB_API_BASE.to_string(),
            github_repo: constants::DEFAULT_PUBLISH_REPO.to_string(),
        }
    }
}

/// API credentials, read from the environment only.
#[derive(Clone, Default)]
pub struct Credentials {
    pub google_maps_api_key: String,
    pub weather_api_key: String,
    pub anthropic_api_key: String,
    pub github_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("google_maps_api_key", &"***")
            .field("weather_api_key", &"***")
            .field("anthropic_api_key", &"***")
            .field("github_token", &self.github_token.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Credentials {
    /// Read credentials through `lookup`. Every missing variable is reported
    /// in one error. The GitHub token is only required when publishing remotely.
    pub fn from_lookup<F>(lookup: F, require_github: bool) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut read = |name: &str| -> String {
            match lookup(name).filter(|v| !v.trim().is_empty()) {
                Some(v) => v,
                None => {
                    missing.push(name.to_string());
                    String::new()
                }
            }
        };

        let google_maps_api_key = read(constants::GOOGLE_MAPS_API_KEY);
        let weather_api_key = read(constants::WEATHER_API_KEY);
        let anthropic_api_key = read(constants::ANTHROPIC_API_KEY);
        let github_token = if require_github {
            Some(read(constants::GITHUB_TOKEN))
        } else {
            lookup(constants::GITHUB_TOKEN).filter(|v| !v.trim().is_empty())
        };

        if !missing.is_empty() {
            return Err(AggregatorError::MissingEnv(missing));
        }
        Ok(Self { google_maps_api_key, weather_api_key, anthropic_api_key, github_token })
    }

    pub fn from_env(require_github: bool) -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok(), require_github)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub services: ServiceConfig,
}

impl Config {
    /// Load from a TOML file. A missing file at the default path falls back to
    /// built-in defaults; an explicitly requested file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config_path, explicit) = match path {
            Some(p) => (p, true),
            None => (Path::new(constants::DEFAULT_CONFIG_PATH), false),
        };

        let config = if config_path.exists() {
            let content = fs::read_to_string(config_path).map_err(|e| {
                AggregatorError::Config(format!(
                    "Failed to read config file '{}': {}",
                    config_path.display(),
                    e
                ))
            })?;
            info!("Loaded configuration from {}", config_path.display());
            Self::from_toml(&content)?
        } else if explicit {
            return Err(AggregatorError::Config(format!(
                "Config file '{}' does not exist",
                config_path.display()
            )));
        } else {
            Self::default()
        };

        config.pipeline.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
