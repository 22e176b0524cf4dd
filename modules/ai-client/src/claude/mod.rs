mod client;
pub(crate) mod types;

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::capability::{Capability, ModelTier, ResearchJob, ResearchStatus};
use client::ClaudeClient;
use types::*;

const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(30);

/// Maximum provider-side searches per grounded call.
const GROUNDED_MAX_SEARCHES: u32 = 5;

/// Searches allowed to a deep research job; these run unattended for minutes.
const RESEARCH_MAX_SEARCHES: u32 = 15;

const EXTRACTION_TOOL_NAME: &str = "structured_response";

// =============================================================================
// Claude
// =============================================================================

#[derive(Clone)]
pub struct Claude {
    api_key: String,
    fast_model: String,
    quality_model: String,
    base_url: Option<String>,
    rate_limit_backoff: Duration,
}

impl Claude {
    pub fn new(
        api_key: impl Into<String>,
        fast_model: impl Into<String>,
        quality_model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            fast_model: fast_model.into(),
            quality_model: quality_model.into(),
            base_url: None,
            rate_limit_backoff: DEFAULT_RATE_LIMIT_BACKOFF,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    pub fn model(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Fast => &self.fast_model,
            ModelTier::Quality => &self.quality_model,
        }
    }

    fn client(&self) -> ClaudeClient {
        let client = ClaudeClient::new(&self.api_key, self.rate_limit_backoff);
        if let Some(ref url) = self.base_url {
            client.with_base_url(url)
        } else {
            client
        }
    }
}

// =============================================================================
// Capability implementation
// =============================================================================

#[async_trait]
impl Capability for Claude {
    async fn complete(&self, tier: ModelTier, system: &str, prompt: &str) -> Result<String> {
        let request = ChatRequest::new(self.model(tier))
            .system(system)
            .message(WireMessage::user(prompt))
            .temperature(0.7);

        let response = self.client().chat(&request).await?;
        response
            .text()
            .ok_or_else(|| anyhow!("No text in completion response"))
    }

    async fn complete_grounded(
        &self,
        tier: ModelTier,
        system: &str,
        prompt: &str,
    ) -> Result<String> {
        let request = ChatRequest::new(self.model(tier))
            .system(system)
            .message(WireMessage::user(prompt))
            .temperature(0.7)
            .web_search(GROUNDED_MAX_SEARCHES);

        let response = self.client().chat(&request).await?;
        response
            .text()
            .ok_or_else(|| anyhow!("No text in grounded response"))
    }

    async fn extract(
        &self,
        tier: ModelTier,
        system: &str,
        prompt: &str,
        schema: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let request = ChatRequest::new(self.model(tier))
            .system(system)
            .message(WireMessage::user(prompt))
            .temperature(0.0)
            .forced_tool(
                EXTRACTION_TOOL_NAME,
                "Record the extracted data in the required shape.",
                schema,
            );

        let response = self.client().chat(&request).await?;
        response
            .tool_input()
            .cloned()
            .ok_or_else(|| anyhow!("No structured output in response"))
    }

    async fn start_research(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest::new(&self.fast_model)
            .message(WireMessage::user(prompt))
            .temperature(0.7)
            .web_search(RESEARCH_MAX_SEARCHES);

        self.client().create_batch(&request).await
    }

    async fn poll_research(&self, job_id: &str) -> Result<ResearchJob> {
        let batch = self.client().get_batch(job_id).await?;

        if batch.processing_status != "ended" {
            return Ok(ResearchJob {
                status: ResearchStatus::Processing,
                result: None,
                error: None,
            });
        }

        let results_url = batch
            .results_url
            .ok_or_else(|| anyhow!("Batch {job_id} ended without a results URL"))?;
        let result = self.client().batch_result(&results_url).await?;

        match result.kind.as_str() {
            "succeeded" => {
                let text = result
                    .message
                    .as_ref()
                    .and_then(|m| m.text())
                    .ok_or_else(|| anyhow!("Batch {job_id} succeeded without text output"))?;
                Ok(ResearchJob {
                    status: ResearchStatus::Completed,
                    result: Some(text),
                    error: None,
                })
            }
            other => Ok(ResearchJob {
                status: ResearchStatus::Failed,
                result: None,
                error: Some(
                    result
                        .error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| other.to_string()),
                ),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_selected_by_tier() {
        let ai = Claude::new("sk-ant-test", "fast-model", "quality-model");
        assert_eq!(ai.model(ModelTier::Fast), "fast-model");
        assert_eq!(ai.model(ModelTier::Quality), "quality-model");
    }

    #[test]
    fn base_url_override() {
        let ai = Claude::new("sk-ant-test", "fast", "quality")
            .with_base_url("https://custom.api.com");
        assert_eq!(ai.base_url, Some("https://custom.api.com".to_string()));
    }
}
