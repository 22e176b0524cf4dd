//! Provider-independent capability surface consumed by the orchestration
//! engine. Grounded (web-search-augmented) generation and schema-constrained
//! extraction are deliberately separate calls: the provider cannot do both in
//! one request, so callers that need grounded *and* structured output make a
//! reasoning call first and a structuring call second.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::schema::StructuredOutput;

/// Which configured model a call should use. Only the article writing stage
/// warrants `Quality`; everything else runs on `Fast`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Fast,
    Quality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearchStatus {
    Processing,
    Completed,
    Failed,
}

/// Snapshot of a long-running research job.
#[derive(Debug, Clone)]
pub struct ResearchJob {
    pub status: ResearchStatus,
    /// Accumulated text, present once the job completes.
    pub result: Option<String>,
    /// Provider error detail for failed jobs.
    pub error: Option<String>,
}

#[async_trait]
pub trait Capability: Send + Sync {
    /// Plain text generation.
    async fn complete(&self, tier: ModelTier, system: &str, prompt: &str) -> Result<String>;

    /// Generation augmented with live web search. Used wherever factual
    /// freshness matters: research, fact verification, topic discovery.
    async fn complete_grounded(&self, tier: ModelTier, system: &str, prompt: &str)
        -> Result<String>;

    /// Generation constrained to return an object matching `schema`.
    async fn extract(
        &self,
        tier: ModelTier,
        system: &str,
        prompt: &str,
        schema: serde_json::Value,
    ) -> Result<serde_json::Value>;

    /// Start a research task too large for one synchronous call. Returns a
    /// job id. Must not be retried blindly — a retry starts a second job.
    async fn start_research(&self, prompt: &str) -> Result<String>;

    /// Poll a job started by [`Capability::start_research`].
    async fn poll_research(&self, job_id: &str) -> Result<ResearchJob>;
}

/// Typed structured extraction: builds the schema from `T`, then deserializes
/// the model's object through a strict serde boundary. Model output is
/// untrusted input; anything that does not match the schema is an error the
/// caller decides how to absorb.
pub async fn extract_as<T: StructuredOutput>(
    capability: &dyn Capability,
    tier: ModelTier,
    system: &str,
    prompt: &str,
) -> Result<T> {
    let value = capability
        .extract(tier, system, prompt, T::response_schema())
        .await?;
    serde_json::from_value(value)
        .map_err(|e| anyhow!("Response did not match the {} schema: {e}", T::type_name()))
}

/// Start a deep research job and poll it to completion.
///
/// Returns the accumulated text, or an error on terminal job failure or when
/// `timeout` elapses. The poll interval is caller-supplied so tests can run
/// without wall-clock waits.
pub async fn run_deep_research(
    capability: &dyn Capability,
    prompt: &str,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<String> {
    let job_id = capability.start_research(prompt).await?;
    let started = tokio::time::Instant::now();

    loop {
        tokio::time::sleep(poll_interval).await;

        let job = capability.poll_research(&job_id).await?;
        match job.status {
            ResearchStatus::Completed => {
                return job
                    .result
                    .ok_or_else(|| anyhow!("Research job {job_id} completed without a result"));
            }
            ResearchStatus::Failed => {
                return Err(anyhow!(
                    "Research job {job_id} failed: {}",
                    job.error.unwrap_or_else(|| "unknown error".to_string())
                ));
            }
            ResearchStatus::Processing => {}
        }

        if started.elapsed() >= timeout {
            return Err(anyhow!(
                "Research job {job_id} did not finish within {}s",
                timeout.as_secs()
            ));
        }
    }
}
