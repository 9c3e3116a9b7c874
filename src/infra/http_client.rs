use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::constants::USER_AGENT;
use crate::error::{PortError, Result};

/// Shared client for every outbound call. Attempt timeouts are applied by the
/// retry policy; this one bounds a hung connection.
pub fn build_client(timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(timeout)
        .gzip(true)
        .build()?)
}

/// Turns a non-2xx response into `PortError::Status`, keeping the body for logs.
pub async fn check_status(resp: Response) -> std::result::Result<Response, PortError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(PortError::Status { status: status.as_u16(), body: truncate(&body, 500) })
}

/// Reads a successful response as JSON; a body that does not decode is malformed.
pub async fn read_json<T: DeserializeOwned>(resp: Response) -> std::result::Result<T, PortError> {
    let resp = check_status(resp).await?;
    let text = resp.text().await?;
    serde_json::from_str(&text).map_err(|e| PortError::Malformed(format!("{}: {}", e, truncate(&text, 200))))
}

pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    }
}
