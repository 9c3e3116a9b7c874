use thiserror::Error;

#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<String>),
}

pub type Result<T> = std::result::Result<T, AggregatorError>;

/// Failures reported by an external collaborator (events source, geocoder,
/// weather, categorizer, publisher).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl PortError {
    /// Whether another attempt at the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            PortError::Transport(_) | PortError::Timeout(_) => true,
            PortError::Status { status, .. } => *status == 429 || *status >= 500,
            PortError::Malformed(_) => true,
            PortError::Api(_) => false,
        }
    }
}

impl From<reqwest::Error> for PortError {
    fn from(err: reqwest::Error) -> Self {
        // Request URLs carry API keys in their query strings
        let err = err.without_url();
        if err.is_decode() {
            PortError::Malformed(err.to_string())
        } else {
            PortError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PortError {
    fn from(err: serde_json::Error) -> Self {
        PortError::Malformed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let server = PortError::Status { status: 503, body: String::new() };
        let throttled = PortError::Status { status: 429, body: String::new() };
        let not_found = PortError::Status { status: 404, body: String::new() };

        assert!(server.is_retryable());
        assert!(throttled.is_retryable());
        assert!(!not_found.is_retryable());
        assert!(!PortError::Api("REQUEST_DENIED".to_string()).is_retryable());
    }

    #[test]
    fn test_missing_env_lists_every_variable() {
        let err = AggregatorError::MissingEnv(vec!["A".to_string(), "B".to_string()]);
        assert_eq!(err.to_string(), "Missing required environment variables: A, B");
    }

    #[tokio::test]
    async fn test_transport_error_hides_query_string() {
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:9/timeline?key=SECRET-KEY-123")
            .send()
            .await
            .unwrap_err();

        let port_err = PortError::from(err);

        assert!(matches!(port_err, PortError::Transport(_)));
        assert!(!port_err.to_string().contains("SECRET-KEY-123"));
    }
}
