//! API client for the eyebreak agent

use anyhow::{Context, Result};
use eyebreak_core::BreakOutcome;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

pub use eyebreak_core::session::SessionSnapshot;

/// API client for the agent's break endpoints
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("Invalid path")
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.client.get(self.url(path)?);
        send(request).await?.context("Resource not found")
    }

    /// GET that maps 404 to `None`
    pub async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        send(self.client.get(self.url(path)?)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let request = self.client.post(self.url(path)?).json(body);
        send(request).await?.context("Resource not found")
    }

    /// DELETE that maps 404 to `None`
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        send(self.client.delete(self.url(path)?)).await
    }
}

async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<Option<T>> {
    let response = request.send().await.context("Failed to send request")?;
    let status = response.status();

    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        anyhow::bail!("API error ({}): {}", status, message);
    }

    response
        .json()
        .await
        .map(Some)
        .context("Failed to parse response")
}

// API request and response types

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartBreakRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_duration_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastBreak {
    pub session_id: String,
    #[serde(default)]
    pub outcome: Option<BreakOutcome>,
    #[serde(default)]
    pub error: Option<String>,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastBreakResponse {
    pub last_completed_at: Option<i64>,
    pub last_session: Option<LastBreak>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
