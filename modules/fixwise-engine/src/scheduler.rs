//! Batch scheduler: runs topics through the pipeline one at a time, either
//! from an explicit list or by draining a queue partition. Sequential by
//! contract; the stop flag is read before each unit and cleared when honored.

use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use tracing::{info, warn};
use uuid::Uuid;

use ai_client::Capability;
use fixwise_common::{ArticleStatus, AutomationSettings, QueueStatus, RunMode, SettingsKind};
use fixwise_store::ContentStore;

use crate::pacing::Pacing;
use crate::pipeline::{Pipeline, PipelineOutcome};

/// Items stuck in `processing` longer than this get requeued at the start of
/// every drain.
const STALE_PROCESSING_MINUTES: i64 = 30;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub generated: u32,
    pub published: u32,
    pub failed: u32,
    pub skipped: u32,
    /// True when the loop halted on the stop flag.
    pub stopped: bool,
}

pub struct BatchScheduler {
    store: Arc<dyn ContentStore>,
    pacing: Pacing,
    pipeline: Pipeline,
}

impl BatchScheduler {
    pub fn new(
        store: Arc<dyn ContentStore>,
        capability: Arc<dyn Capability>,
        pacing: Pacing,
    ) -> Self {
        let pipeline = Pipeline::new(store.clone(), capability, pacing);
        Self { store, pacing, pipeline }
    }

    /// Run an explicit topic list, at most `articles_per_run` of it. One
    /// pipeline failure does not abort the batch.
    pub async fn run_topics(
        &self,
        topics: &[(String, Option<Uuid>)],
        kind: SettingsKind,
        mode: RunMode,
    ) -> Result<BatchOutcome> {
        let settings = self.store.get_settings(kind).await?;
        let cap = settings.articles_per_run.max(0) as usize;
        if topics.len() > cap {
            info!(requested = topics.len(), cap, "Topic list capped at articles_per_run");
        }
        let topics = &topics[..topics.len().min(cap)];
        let mut outcome = BatchOutcome::default();

        for (i, (topic, category_id)) in topics.iter().enumerate() {
            if self.honor_stop(kind, &mut outcome).await? {
                break;
            }
            if i > 0 {
                tokio::time::sleep(self.pacing.item_delay).await;
            }
            match self.pipeline.run(topic, *category_id, mode).await {
                Ok(PipelineOutcome::Completed { article_id, quality_score, factual_score, .. }) => {
                    outcome.generated += 1;
                    if self
                        .maybe_publish(&settings, article_id, quality_score, factual_score)
                        .await?
                    {
                        outcome.published += 1;
                    }
                }
                Ok(PipelineOutcome::Skipped { .. }) => outcome.skipped += 1,
                Err(e) => {
                    warn!(topic, error = %e, "Topic failed, continuing batch");
                    outcome.failed += 1;
                }
            }
        }
        self.store.touch_last_run(kind).await?;
        info!(?outcome, "Batch finished");
        Ok(outcome)
    }

    /// Drain the pending items of one (run_date, batch_number) partition,
    /// priority order. Every item ends in exactly one terminal status.
    pub async fn drain_queue(
        &self,
        run_date: NaiveDate,
        batch_number: i16,
        kind: SettingsKind,
    ) -> Result<BatchOutcome> {
        let requeued = self.store.requeue_stale_processing(STALE_PROCESSING_MINUTES).await?;
        if requeued > 0 {
            warn!(requeued, "Requeued stale processing items");
        }

        let settings = self.store.get_settings(kind).await?;
        let items = self.store.fetch_pending(run_date, batch_number).await?;
        info!(%run_date, batch_number, count = items.len(), "Draining queue");
        let mut outcome = BatchOutcome::default();

        for (i, item) in items.iter().enumerate() {
            if self.honor_stop(kind, &mut outcome).await? {
                break;
            }
            if i > 0 {
                tokio::time::sleep(self.pacing.item_delay).await;
            }
            self.store
                .mark_queue_item(item.id, QueueStatus::Processing, None, None)
                .await?;

            match self
                .pipeline
                .run(&item.topic, item.category_id, RunMode::Batch)
                .await
            {
                Ok(PipelineOutcome::Completed { article_id, quality_score, factual_score, .. }) => {
                    outcome.generated += 1;
                    self.store
                        .mark_queue_item(item.id, QueueStatus::Completed, Some(article_id), None)
                        .await?;
                    if self
                        .maybe_publish(&settings, article_id, quality_score, factual_score)
                        .await?
                    {
                        outcome.published += 1;
                    }
                }
                Ok(PipelineOutcome::Skipped { reason, .. }) => {
                    outcome.skipped += 1;
                    self.store
                        .mark_queue_item(item.id, QueueStatus::Skipped, None, Some(&reason))
                        .await?;
                }
                Err(e) => {
                    outcome.failed += 1;
                    let message = format!("{e:#}");
                    self.store
                        .mark_queue_item(item.id, QueueStatus::Failed, None, Some(&message))
                        .await?;
                }
            }
        }
        self.store.touch_last_run(kind).await?;
        info!(?outcome, "Drain finished");
        Ok(outcome)
    }

    /// Read the stop flag; when set, clear it and flag the outcome.
    async fn honor_stop(&self, kind: SettingsKind, outcome: &mut BatchOutcome) -> Result<bool> {
        if self.store.stop_requested(kind).await? {
            info!(?kind, "Stop requested, halting batch");
            self.store.set_stop_requested(kind, false).await?;
            outcome.stopped = true;
            return Ok(true);
        }
        Ok(false)
    }

    /// Publish iff both scores clear the configured thresholds and auto
    /// publishing is on.
    async fn maybe_publish(
        &self,
        settings: &AutomationSettings,
        article_id: Uuid,
        quality_score: i32,
        factual_score: i32,
    ) -> Result<bool> {
        if settings.auto_publish
            && quality_score >= settings.min_quality_score
            && factual_score >= settings.min_factual_score
        {
            self.store
                .update_article_status(article_id, ArticleStatus::Published)
                .await?;
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCapability;
    use fixwise_common::NewQueueItem;
    use fixwise_store::MemoryStore;
    use serde_json::json;

    fn judgment_no() -> serde_json::Value {
        json!({"is_duplicate": false, "similarity": 10})
    }

    fn happy_article(capability: MockCapability, slug: &str, quality: i64, factual: i64) -> MockCapability {
        capability
            .text("Brief with https://kb.example.com/a.")
            .text("Outline")
            .text("Checked.")
            .extraction(json!({
                "title": slug.replace('-', " "),
                "slug": slug,
                "excerpt": "x",
                "content": "body",
                "category_id": null,
                "tags": [],
                "read_time": 3,
                "seo_title": null,
                "seo_description": null
            }))
            .extraction(json!({"factual_score": factual}))
            .extraction(json!({"quality_score": quality, "seo_title": null, "seo_description": null}))
    }

    async fn enqueue_topics(store: &MemoryStore, date: NaiveDate, topics: &[&str]) {
        let items: Vec<NewQueueItem> = topics
            .iter()
            .enumerate()
            .map(|(i, t)| NewQueueItem {
                run_date: date,
                batch_number: 1,
                topic: t.to_string(),
                category_id: None,
                priority: i as i32,
            })
            .collect();
        store.enqueue(&items).await.unwrap();
    }

    #[tokio::test]
    async fn drain_counts_partial_failures_per_item() {
        let store = Arc::new(MemoryStore::new());
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        enqueue_topics(&store, date, &["topic one", "topic two", "topic three"]).await;

        // Item 1 succeeds, item 2 dies in research, item 3 succeeds. Items
        // after the first face a non-empty catalog, so each needs a scripted
        // duplicate judgment.
        let capability = happy_article(MockCapability::new(), "topic-one", 8, 8)
            .extraction(judgment_no())
            .text_err("provider exploded")
            .extraction(judgment_no());
        let capability = happy_article(capability, "topic-three", 8, 8);

        let scheduler = BatchScheduler::new(store.clone(), Arc::new(capability), Pacing::instant());
        let outcome = scheduler.drain_queue(date, 1, SettingsKind::Adhoc).await.unwrap();

        assert_eq!(outcome.generated, 2);
        assert_eq!(outcome.failed, 1);
        assert!(!outcome.stopped);

        let items = store.queue_snapshot();
        let by_topic = |t: &str| items.iter().find(|i| i.topic == t).unwrap();
        assert_eq!(by_topic("topic one").status, QueueStatus::Completed);
        assert!(by_topic("topic one").article_id.is_some());
        assert_eq!(by_topic("topic two").status, QueueStatus::Failed);
        assert!(by_topic("topic two").error_message.is_some());
        assert_eq!(by_topic("topic three").status, QueueStatus::Completed);
    }

    #[tokio::test]
    async fn stop_flag_halts_batch_and_clears() {
        let store = Arc::new(MemoryStore::new());
        // Script exactly two articles; the stop lands before item 3.
        let capability =
            happy_article(MockCapability::new(), "one", 8, 8).extraction(judgment_no());
        let capability = happy_article(capability, "two", 8, 8);
        let capability = Arc::new(capability);

        let topics: Vec<(String, Option<Uuid>)> =
            ["one", "two", "three", "four", "five"].iter().map(|t| (t.to_string(), None)).collect();

        // Run the first two, then arm the flag and run the rest.
        let scheduler = BatchScheduler::new(store.clone(), capability.clone(), Pacing::instant());
        let first = scheduler
            .run_topics(&topics[..2], SettingsKind::Adhoc, RunMode::Batch)
            .await
            .unwrap();
        assert_eq!(first.generated, 2);

        store.set_stop_requested(SettingsKind::Adhoc, true).await.unwrap();
        let rest = scheduler
            .run_topics(&topics[2..], SettingsKind::Adhoc, RunMode::Batch)
            .await
            .unwrap();
        assert!(rest.stopped);
        assert_eq!(rest.generated, 0);
        // Flag cleared once honored.
        assert!(!store.stop_requested(SettingsKind::Adhoc).await.unwrap());
    }

    #[tokio::test]
    async fn topic_list_capped_at_articles_per_run_and_stamps_last_run() {
        let store = Arc::new(MemoryStore::new());
        let mut settings = store.get_settings(SettingsKind::Adhoc).await.unwrap();
        settings.articles_per_run = 2;
        store.update_settings(&settings).await.unwrap();

        // Only two articles scripted; the third topic must never reach the
        // pipeline.
        let capability =
            happy_article(MockCapability::new(), "first", 8, 8).extraction(judgment_no());
        let capability = happy_article(capability, "second", 8, 8);

        let topics: Vec<(String, Option<Uuid>)> =
            ["first", "second", "third"].iter().map(|t| (t.to_string(), None)).collect();
        let scheduler = BatchScheduler::new(store.clone(), Arc::new(capability), Pacing::instant());
        let outcome = scheduler
            .run_topics(&topics, SettingsKind::Adhoc, RunMode::Batch)
            .await
            .unwrap();

        assert_eq!(outcome.generated, 2);
        assert_eq!(outcome.failed, 0);
        assert_eq!(store.list_articles().await.unwrap().len(), 2);

        let settings = store.get_settings(SettingsKind::Adhoc).await.unwrap();
        assert!(settings.last_run_at.is_some());
    }

    #[tokio::test]
    async fn auto_publish_requires_both_thresholds() {
        let store = Arc::new(MemoryStore::new());
        let mut settings = store.get_settings(SettingsKind::Adhoc).await.unwrap();
        settings.auto_publish = true;
        store.update_settings(&settings).await.unwrap();

        // quality 8 / factual 6: below the factual threshold, stays draft.
        let capability =
            happy_article(MockCapability::new(), "below-threshold", 8, 6).extraction(judgment_no());
        // quality 7 / factual 7: exactly at both thresholds, published.
        let capability = happy_article(capability, "at-threshold", 7, 7);

        let scheduler = BatchScheduler::new(store.clone(), Arc::new(capability), Pacing::instant());
        let topics = vec![
            ("below threshold".to_string(), None),
            ("at threshold".to_string(), None),
        ];
        let outcome = scheduler
            .run_topics(&topics, SettingsKind::Adhoc, RunMode::Batch)
            .await
            .unwrap();

        assert_eq!(outcome.generated, 2);
        assert_eq!(outcome.published, 1);

        let articles = store.list_articles().await.unwrap();
        let by_slug = |s: &str| articles.iter().find(|a| a.slug == s).unwrap();
        assert_eq!(by_slug("below-threshold").status, ArticleStatus::Draft);
        assert_eq!(by_slug("at-threshold").status, ArticleStatus::Published);
    }
}
