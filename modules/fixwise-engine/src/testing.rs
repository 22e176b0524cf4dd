//! Scripted test double for the AI capability. Responses are queued per call
//! kind and served FIFO; an empty queue is a test bug and errors loudly.
//! No network, no provider account.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use ai_client::{Capability, ModelTier, ResearchJob, ResearchStatus};

type Scripted<T> = Mutex<VecDeque<Result<T, String>>>;

#[derive(Default)]
pub struct MockCapability {
    texts: Scripted<String>,
    extractions: Scripted<serde_json::Value>,
    research: Scripted<String>,
    jobs: Mutex<HashMap<String, Result<String, String>>>,
    /// Method names in call order, for interaction assertions.
    pub calls: Mutex<Vec<&'static str>>,
}

impl MockCapability {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `complete` / `complete_grounded`.
    pub fn text(self, body: &str) -> Self {
        self.texts.lock().unwrap().push_back(Ok(body.to_string()));
        self
    }

    pub fn text_err(self, message: &str) -> Self {
        self.texts.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    /// Queue a response for `extract`.
    pub fn extraction(self, value: serde_json::Value) -> Self {
        self.extractions.lock().unwrap().push_back(Ok(value));
        self
    }

    pub fn extraction_err(self, message: &str) -> Self {
        self.extractions.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    /// Queue a research job that completes with `body` on first poll.
    pub fn research(self, body: &str) -> Self {
        self.research.lock().unwrap().push_back(Ok(body.to_string()));
        self
    }

    pub fn research_err(self, message: &str) -> Self {
        self.research.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    fn record(&self, method: &'static str) {
        self.calls.lock().unwrap().push(method);
    }

    fn pop<T>(queue: &Scripted<T>, method: &str) -> Result<T> {
        match queue.lock().unwrap().pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(anyhow!("{message}")),
            None => Err(anyhow!("MockCapability: no scripted response for {method}")),
        }
    }
}

#[async_trait]
impl Capability for MockCapability {
    async fn complete(&self, _tier: ModelTier, _system: &str, _prompt: &str) -> Result<String> {
        self.record("complete");
        Self::pop(&self.texts, "complete")
    }

    async fn complete_grounded(
        &self,
        _tier: ModelTier,
        _system: &str,
        _prompt: &str,
    ) -> Result<String> {
        self.record("complete_grounded");
        Self::pop(&self.texts, "complete_grounded")
    }

    async fn extract(
        &self,
        _tier: ModelTier,
        _system: &str,
        _prompt: &str,
        _schema: serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.record("extract");
        Self::pop(&self.extractions, "extract")
    }

    async fn start_research(&self, _prompt: &str) -> Result<String> {
        self.record("start_research");
        let outcome = match self.research.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => return Err(anyhow!("MockCapability: no scripted research job")),
        };
        let mut jobs = self.jobs.lock().unwrap();
        let job_id = format!("job-{}", jobs.len());
        jobs.insert(job_id.clone(), outcome);
        Ok(job_id)
    }

    async fn poll_research(&self, job_id: &str) -> Result<ResearchJob> {
        self.record("poll_research");
        let jobs = self.jobs.lock().unwrap();
        match jobs.get(job_id) {
            Some(Ok(body)) => Ok(ResearchJob {
                status: ResearchStatus::Completed,
                result: Some(body.clone()),
                error: None,
            }),
            Some(Err(message)) => Ok(ResearchJob {
                status: ResearchStatus::Failed,
                result: None,
                error: Some(message.clone()),
            }),
            None => Err(anyhow!("MockCapability: unknown research job {job_id}")),
        }
    }
}
