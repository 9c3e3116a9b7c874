use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use chrono_tz::Tz;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::http_client::{check_status, read_json, truncate};
use crate::app::{PublisherPort, VersionToken, WriteOutcome};
use crate::error::PortError;

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutContents<'a> {
    message: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: ContentsEntry,
    commit: Option<CommitEntry>,
}

#[derive(Debug, Deserialize)]
struct CommitEntry {
    sha: String,
}

/// GitHub contents API. The blob sha of the file is the version token.
pub struct GitHubPublisher {
    http: Client,
    base_url: String,
    repo: String,
    token: String,
    tz: Tz,
}

impl GitHubPublisher {
    pub fn new(http: Client, base_url: impl Into<String>, repo: impl Into<String>, token: impl Into<String>, tz: Tz) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            repo: repo.into(),
            token: token.into(),
            tz,
        }
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.base_url.trim_end_matches('/'),
            self.repo,
            path.trim_start_matches('/')
        )
    }

    fn headers(&self) -> Result<HeaderMap, PortError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|e| PortError::Api(format!("invalid token header: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github.v3+json"));
        Ok(headers)
    }

    fn commit_message(&self) -> String {
        let now = Utc::now().with_timezone(&self.tz);
        format!("Update schema from DateSpot Aggregator - {}", now.to_rfc3339())
    }
}

/// GitHub answers a stale sha with 409 and a missing one with 422. Other 422s
/// are validation failures (bad path, bad content) and must not be retried.
fn is_conflict(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::CONFLICT {
        return true;
    }
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["message"].as_str().map(str::to_string))
        .unwrap_or_default();
    status == StatusCode::UNPROCESSABLE_ENTITY && message.contains("\"sha\"")
}

#[async_trait]
impl PublisherPort for GitHubPublisher {
    #[instrument(skip(self), fields(repo = %self.repo))]
    async fn read_current_version(&self, path: &str) -> Result<Option<VersionToken>, PortError> {
        let resp = self.http.get(self.contents_url(path)).headers(self.headers()?).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let entry: ContentsEntry = read_json(resp).await?;
        Ok(Some(VersionToken(entry.sha)))
    }

    #[instrument(skip(self, content), fields(repo = %self.repo, bytes = content.len()))]
    async fn write(
        &self,
        path: &str,
        content: &str,
        expected: Option<&VersionToken>,
    ) -> Result<WriteOutcome, PortError> {
        let body = PutContents {
            message: self.commit_message(),
            content: STANDARD.encode(content.as_bytes()),
            sha: expected.map(|t| t.0.as_str()),
        };
        let resp = self
            .http
            .put(self.contents_url(path))
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY {
            let body = resp.text().await.unwrap_or_default();
            if is_conflict(status, &body) {
                return Ok(WriteOutcome::Conflict);
            }
            return Err(PortError::Status { status: status.as_u16(), body: truncate(&body, 500) });
        }
        let resp = check_status(resp).await?;
        let text = resp.text().await?;
        let put: PutResponse = serde_json::from_str(&text)?;
        if let Some(commit) = &put.commit {
            info!("📊 Commit {}", commit.sha);
        }
        Ok(WriteOutcome::Written(VersionToken(put.content.sha)))
    }
}
