use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::{debug, warn};

use super::types::*;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// How much of an error body survives into the error message.
const ERROR_BODY_LIMIT: usize = 500;

/// The one custom_id used inside single-request research batches.
const RESEARCH_CUSTOM_ID: &str = "research";

pub(crate) struct ClaudeClient {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
    rate_limit_backoff: Duration,
}

impl ClaudeClient {
    pub fn new(api_key: &str, rate_limit_backoff: Duration) -> Self {
        Self {
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
            base_url: ANTHROPIC_API_URL.to_string(),
            rate_limit_backoff,
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/messages", self.base_url);

        debug!(model = %request.model, "chat request");

        let mut response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(request)
            .send()
            .await?;

        // One transparent retry on rate limit; a second 429 surfaces.
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!(
                backoff_secs = self.rate_limit_backoff.as_secs(),
                "Rate limited, retrying once"
            );
            tokio::time::sleep(self.rate_limit_backoff).await;
            response = self
                .http
                .post(&url)
                .headers(self.headers()?)
                .json(request)
                .send()
                .await?;
        }

        let response = check(response).await?;
        Ok(response.json().await?)
    }

    /// Submit a single-request message batch. Never retried here: a duplicate
    /// submission starts a second expensive job.
    pub async fn create_batch(&self, request: &ChatRequest) -> Result<String> {
        let url = format!("{}/messages/batches", self.base_url);
        let body = serde_json::json!({
            "requests": [{
                "custom_id": RESEARCH_CUSTOM_ID,
                "params": request,
            }]
        });

        debug!(model = %request.model, "batch create");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        let batch: BatchWire = check(response).await?.json().await?;
        Ok(batch.id)
    }

    pub async fn get_batch(&self, batch_id: &str) -> Result<BatchWire> {
        let url = format!("{}/messages/batches/{batch_id}", self.base_url);

        let mut response = self.http.get(&url).headers(self.headers()?).send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            tokio::time::sleep(self.rate_limit_backoff).await;
            response = self.http.get(&url).headers(self.headers()?).send().await?;
        }

        Ok(check(response).await?.json().await?)
    }

    /// Fetch and decode the JSONL results of an ended batch.
    pub async fn batch_result(&self, results_url: &str) -> Result<BatchResultWire> {
        let response = self
            .http
            .get(results_url)
            .headers(self.headers()?)
            .send()
            .await?;

        let body = check(response).await?.text().await?;
        let line = body
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| anyhow!("Batch results were empty"))?;
        let parsed: BatchResultLine = serde_json::from_str(line)?;
        Ok(parsed.result)
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let mut body = response.text().await.unwrap_or_default();
    let mut end = ERROR_BODY_LIMIT.min(body.len());
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body.truncate(end);
    Err(anyhow!("API error ({status}): {body}"))
}
