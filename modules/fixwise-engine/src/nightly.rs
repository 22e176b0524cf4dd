//! Nightly builder. Batch 1 does the expensive work — deep research per
//! category, dedup, optional category discovery, queue partitioning — then
//! drains its own partition. Batches 2 and 3 only drain theirs. Progress is
//! written to the nightly_runs row after every category so a watcher always
//! sees where the run is.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use ai_client::{extract_as, run_deep_research, Capability, ModelTier};
use fixwise_common::{
    slug::slugify, Category, NewQueueItem, NightlyCounts, NightlyRun, NightlyStatus, SettingsKind,
};
use fixwise_store::ContentStore;

use crate::dedup;
use crate::pacing::Pacing;
use crate::scheduler::BatchScheduler;

/// Positional partition sizes: first 30 topics land in batch 1, the next 50
/// in batch 2, the rest in batch 3.
const BATCH_1_SIZE: usize = 30;
const BATCH_2_SIZE: usize = 50;

const MAX_NEW_CATEGORIES: usize = 5;

const ICON_ALLOW_LIST: &[&str] = &[
    "wifi", "printer", "laptop", "smartphone", "monitor", "keyboard", "router", "shield",
    "settings", "book",
];
const DEFAULT_ICON: &str = "book";

const RESEARCH_SYSTEM: &str = "You are the content planner of a tech-help knowledge base.";

#[derive(Debug, Deserialize, JsonSchema)]
struct TopicList {
    /// Candidate article topics, one short phrase each.
    topics: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CategorySuggestion {
    name: String,
    description: String,
    /// Icon name; must come from the offered list.
    icon: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CategorySuggestions {
    categories: Vec<CategorySuggestion>,
}

/// Which queue partition the topic at position `i` belongs to.
pub fn batch_for_index(i: usize) -> i16 {
    if i < BATCH_1_SIZE {
        1
    } else if i < BATCH_1_SIZE + BATCH_2_SIZE {
        2
    } else {
        3
    }
}

/// Partition sizes for `k` topics: (batch 1, batch 2, batch 3).
pub fn partition_counts(k: usize) -> (usize, usize, usize) {
    let b1 = k.min(BATCH_1_SIZE);
    let b2 = k.saturating_sub(BATCH_1_SIZE).min(BATCH_2_SIZE);
    let b3 = k.saturating_sub(BATCH_1_SIZE + BATCH_2_SIZE);
    (b1, b2, b3)
}

pub struct NightlyBuilder {
    store: Arc<dyn ContentStore>,
    capability: Arc<dyn Capability>,
    pacing: Pacing,
}

impl NightlyBuilder {
    pub fn new(
        store: Arc<dyn ContentStore>,
        capability: Arc<dyn Capability>,
        pacing: Pacing,
    ) -> Self {
        Self { store, capability, pacing }
    }

    /// Create today's nightly_runs row; work happens in
    /// [`NightlyBuilder::resume`].
    pub async fn start(&self, batch_number: i16) -> Result<NightlyRun> {
        let run_date = Utc::now().date_naive();
        let run = self.store.create_nightly_run(run_date, batch_number).await?;
        info!(nightly_run_id = %run.id, %run_date, batch_number, "Nightly run started");
        Ok(run)
    }

    /// Run the batch for an already-created row. Always leaves the row in a
    /// terminal status.
    pub async fn resume(&self, run: &NightlyRun) -> Result<()> {
        let mut counts = NightlyCounts::default();
        let mut details = serde_json::Map::new();
        let status = match self
            .execute(run.id, run.run_date, run.batch_number, &mut counts, &mut details)
            .await
        {
            Ok(true) => NightlyStatus::Stopped,
            Ok(false) => NightlyStatus::Completed,
            Err(e) => {
                warn!(nightly_run_id = %run.id, error = %e, "Nightly run failed");
                // {e:#} keeps the whole context chain, not just the outer layer.
                details.insert("error".to_string(), json!(format!("{e:#}")));
                NightlyStatus::Failed
            }
        };
        self.store
            .finish_nightly_run(run.id, status, counts, serde_json::Value::Object(details))
            .await?;
        info!(nightly_run_id = %run.id, ?status, "Nightly run finished");
        Ok(())
    }

    /// `start` and `resume` in one await; returns the run id.
    pub async fn run(&self, batch_number: i16) -> Result<Uuid> {
        let run = self.start(batch_number).await?;
        self.resume(&run).await?;
        Ok(run.id)
    }

    /// Returns Ok(true) when the run halted on the stop flag.
    async fn execute(
        &self,
        run_id: Uuid,
        run_date: NaiveDate,
        batch_number: i16,
        counts: &mut NightlyCounts,
        details: &mut serde_json::Map<String, serde_json::Value>,
    ) -> Result<bool> {
        if batch_number == 1 {
            let stopped = self.build_queue(run_id, run_date, counts, details).await?;
            if stopped {
                return Ok(true);
            }
        }

        // Drain this batch's partition. The scheduler clears the stop flag
        // itself when it honors one.
        let scheduler =
            BatchScheduler::new(self.store.clone(), self.capability.clone(), self.pacing);
        let outcome = scheduler
            .drain_queue(run_date, batch_number, SettingsKind::Nightly)
            .await?;
        counts.articles_generated += outcome.generated as i32;
        counts.articles_published += outcome.published as i32;
        counts.articles_failed += outcome.failed as i32;
        Ok(outcome.stopped)
    }

    /// Phases A through E: research, dedup, category discovery, partition.
    async fn build_queue(
        &self,
        run_id: Uuid,
        run_date: NaiveDate,
        counts: &mut NightlyCounts,
        details: &mut serde_json::Map<String, serde_json::Value>,
    ) -> Result<bool> {
        let settings = self.store.get_settings(SettingsKind::Nightly).await?;
        let all_categories = self.store.list_categories().await?;
        let targets: Vec<Category> = match &settings.target_category_ids {
            Some(ids) => all_categories.iter().filter(|c| ids.contains(&c.id)).cloned().collect(),
            None => all_categories.clone(),
        };
        let existing_titles = self.store.list_article_titles().await?;

        // Phase A: deep research per category. A category's failure lands in
        // its details entry; the loop continues.
        let mut per_category: Vec<(Category, Vec<String>)> = Vec::new();
        for (i, category) in targets.iter().enumerate() {
            if self.honor_stop().await? {
                return Ok(true);
            }
            if i > 0 {
                tokio::time::sleep(self.pacing.category_delay).await;
            }
            match self
                .research_category(category, settings.topics_per_category)
                .await
            {
                Ok(topics) => {
                    counts.categories_processed += 1;
                    counts.topics_found += topics.len() as i32;
                    details.insert(
                        category.name.clone(),
                        json!({"topics_found": topics.len()}),
                    );
                    per_category.push((category.clone(), topics));
                }
                Err(e) => {
                    warn!(category = %category.name, error = %e, "Category research failed");
                    details.insert(category.name.clone(), json!({"error": format!("{e:#}")}));
                }
            }
            self.store
                .update_nightly_run(run_id, *counts, serde_json::Value::Object(details.clone()))
                .await?;
        }

        // Phase C: drop topics already covered by existing articles.
        for (category, topics) in &mut per_category {
            let kept =
                dedup::dedup_topics(self.capability.as_ref(), std::mem::take(topics), &existing_titles)
                    .await;
            counts.topics_after_dedup += kept.len() as i32;
            if let Some(entry) = details.get_mut(&category.name) {
                entry["topics_after_dedup"] = json!(kept.len());
            }
            *topics = kept;
        }

        // Phase D: optional category discovery.
        if settings.allow_category_creation {
            if let Err(e) = self.discover_categories(&all_categories, counts).await {
                warn!(error = %e, "Category discovery failed, continuing");
                details.insert("category_discovery".to_string(), json!({"error": format!("{e:#}")}));
            }
        }

        // Phase E: positional partition into today's queue.
        let mut items = Vec::new();
        for (category, topics) in &per_category {
            for (i, topic) in topics.iter().enumerate() {
                items.push(NewQueueItem {
                    run_date,
                    batch_number: batch_for_index(i),
                    topic: topic.clone(),
                    category_id: Some(category.id),
                    priority: i as i32,
                });
            }
        }
        if !items.is_empty() {
            let queued = self.store.enqueue(&items).await?;
            info!(queued, "Nightly queue built");
        }
        self.store
            .update_nightly_run(run_id, *counts, serde_json::Value::Object(details.clone()))
            .await?;
        Ok(false)
    }

    async fn research_category(&self, category: &Category, count: i32) -> Result<Vec<String>> {
        let prompt = format!(
            "Research the most useful how-to article topics for the \"{}\" category of a \
             tech-help knowledge base ({}). Search for the problems people actually ask about. \
             Produce roughly {count} candidate topics, most common problems first.",
            category.name, category.description
        );
        let research = run_deep_research(
            self.capability.as_ref(),
            &prompt,
            self.pacing.research_poll,
            self.pacing.research_cap,
        )
        .await
        .context("Deep research failed")?;

        let list: TopicList = extract_as(
            self.capability.as_ref(),
            ModelTier::Fast,
            RESEARCH_SYSTEM,
            &format!("Extract the candidate topics from this research, best first:\n\n{research}"),
        )
        .await
        .context("Topic extraction failed")?;
        Ok(list.topics)
    }

    async fn discover_categories(
        &self,
        existing: &[Category],
        counts: &mut NightlyCounts,
    ) -> Result<()> {
        let catalog = existing
            .iter()
            .map(|c| format!("- {} ({})", c.name, c.slug))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Existing knowledge base categories:\n{catalog}\n\nResearch what major tech-help \
             subject areas are missing. Suggest up to {MAX_NEW_CATEGORIES} new categories."
        );
        let research = run_deep_research(
            self.capability.as_ref(),
            &prompt,
            self.pacing.research_poll,
            self.pacing.research_cap,
        )
        .await?;

        let suggestions: CategorySuggestions = extract_as(
            self.capability.as_ref(),
            ModelTier::Fast,
            RESEARCH_SYSTEM,
            &format!(
                "Extract the suggested categories. icon must be one of: {}.\n\n{research}",
                ICON_ALLOW_LIST.join(", ")
            ),
        )
        .await?;

        let sort_base = existing.iter().map(|c| c.sort_order).max().unwrap_or(0);
        // Suggestions in the same batch can normalize to one slug; only the
        // first gets inserted.
        let mut accepted_slugs: Vec<String> = Vec::new();
        for (i, suggestion) in suggestions.categories.into_iter().take(MAX_NEW_CATEGORIES).enumerate() {
            let slug = slugify(&suggestion.name);
            if slug.is_empty()
                || existing.iter().any(|c| c.slug == slug)
                || accepted_slugs.contains(&slug)
            {
                continue;
            }
            accepted_slugs.push(slug.clone());
            let icon = if ICON_ALLOW_LIST.contains(&suggestion.icon.as_str()) {
                suggestion.icon.as_str()
            } else {
                DEFAULT_ICON
            };
            self.store
                .insert_category(
                    &suggestion.name,
                    &slug,
                    &suggestion.description,
                    icon,
                    sort_base + 1 + i as i32,
                )
                .await?;
            counts.categories_created += 1;
            info!(name = %suggestion.name, "Category created");
        }
        Ok(())
    }

    async fn honor_stop(&self) -> Result<bool> {
        if self.store.stop_requested(SettingsKind::Nightly).await? {
            info!("Stop requested, halting nightly run");
            self.store.set_stop_requested(SettingsKind::Nightly, false).await?;
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCapability;
    use fixwise_common::QueueStatus;
    use fixwise_store::MemoryStore;
    use serde_json::json;

    #[test]
    fn partition_law() {
        assert_eq!(partition_counts(0), (0, 0, 0));
        assert_eq!(partition_counts(10), (10, 0, 0));
        assert_eq!(partition_counts(30), (30, 0, 0));
        assert_eq!(partition_counts(31), (30, 1, 0));
        assert_eq!(partition_counts(80), (30, 50, 0));
        assert_eq!(partition_counts(100), (30, 50, 20));
    }

    #[test]
    fn batch_assignment_follows_position() {
        assert_eq!(batch_for_index(0), 1);
        assert_eq!(batch_for_index(29), 1);
        assert_eq!(batch_for_index(30), 2);
        assert_eq!(batch_for_index(79), 2);
        assert_eq!(batch_for_index(80), 3);
    }

    fn happy_article(capability: MockCapability, slug: &str) -> MockCapability {
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
            .extraction(json!({"factual_score": 8}))
            .extraction(json!({"quality_score": 8, "seo_title": null, "seo_description": null}))
    }

    #[tokio::test]
    async fn batch_one_researches_queues_and_drains() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_category("Printers", "printers", "Printer problems", "printer", 0)
            .await
            .unwrap();

        let capability = MockCapability::new()
            .research("Top problems: printer offline, spooler stuck.")
            .extraction(json!({"topics": ["Fix printer offline", "Clear a stuck print spooler"]}));
        // Empty article catalog: dedup needs no model call, drain items need
        // no duplicate judgment until the first article lands.
        let capability = happy_article(capability, "fix-printer-offline")
            .extraction(json!({"is_duplicate": false, "similarity": 5}));
        let capability = happy_article(capability, "clear-a-stuck-print-spooler");

        let builder = NightlyBuilder::new(store.clone(), Arc::new(capability), Pacing::instant());
        let run_id = builder.run(1).await.unwrap();

        let run = store.latest_nightly_run().await.unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.status, NightlyStatus::Completed);
        assert_eq!(run.counts.categories_processed, 1);
        assert_eq!(run.counts.topics_found, 2);
        assert_eq!(run.counts.topics_after_dedup, 2);
        assert_eq!(run.counts.articles_generated, 2);
        assert_eq!(run.details["Printers"]["topics_found"], 2);

        let items = store.queue_snapshot();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.batch_number == 1));
        assert!(items.iter().all(|i| i.status == QueueStatus::Completed));
    }

    #[tokio::test]
    async fn category_research_failure_is_contained() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_category("Printers", "printers", "Printer problems", "printer", 0)
            .await
            .unwrap();
        store
            .insert_category("Routers", "routers", "Router problems", "router", 1)
            .await
            .unwrap();

        // Printers research dies; Routers yields one topic, then one article.
        let capability = MockCapability::new()
            .research_err("batch job rejected")
            .research("One problem: slow wifi.")
            .extraction(json!({"topics": ["Fix slow WiFi"]}));
        let capability = happy_article(capability, "fix-slow-wifi");

        let builder = NightlyBuilder::new(store.clone(), Arc::new(capability), Pacing::instant());
        builder.run(1).await.unwrap();

        let run = store.latest_nightly_run().await.unwrap().unwrap();
        assert_eq!(run.status, NightlyStatus::Completed);
        assert_eq!(run.counts.categories_processed, 1);
        assert_eq!(run.counts.articles_generated, 1);
        assert!(run.details["Printers"]["error"]
            .as_str()
            .unwrap()
            .contains("batch job rejected"));
    }

    #[tokio::test]
    async fn discovery_skips_slug_collisions_within_one_batch() {
        let store = Arc::new(MemoryStore::new());
        let existing = vec![store
            .insert_category("Printers", "printers", "Printer problems", "printer", 0)
            .await
            .unwrap()];

        // "Smart Home" and "Smart home!" slugify identically; "Printers"
        // collides with the catalog. Only one insert may happen.
        let capability = MockCapability::new()
            .research("Missing areas: smart home devices.")
            .extraction(json!({"categories": [
                {"name": "Smart Home", "description": "Connected devices", "icon": "settings"},
                {"name": "Smart home!", "description": "Also connected devices", "icon": "settings"},
                {"name": "Printers", "description": "Already covered", "icon": "printer"}
            ]}));

        let builder = NightlyBuilder::new(store.clone(), Arc::new(capability), Pacing::instant());
        let mut counts = NightlyCounts::default();
        builder.discover_categories(&existing, &mut counts).await.unwrap();

        assert_eq!(counts.categories_created, 1);
        let categories = store.list_categories().await.unwrap();
        assert_eq!(categories.len(), 2);
        assert_eq!(
            categories.iter().filter(|c| c.slug == "smart-home").count(),
            1
        );
    }

    #[tokio::test]
    async fn stop_flag_ends_run_stopped_before_research() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_category("Printers", "printers", "Printer problems", "printer", 0)
            .await
            .unwrap();
        store.set_stop_requested(SettingsKind::Nightly, true).await.unwrap();

        let builder =
            NightlyBuilder::new(store.clone(), Arc::new(MockCapability::new()), Pacing::instant());
        builder.run(1).await.unwrap();

        let run = store.latest_nightly_run().await.unwrap().unwrap();
        assert_eq!(run.status, NightlyStatus::Stopped);
        assert_eq!(run.counts.topics_found, 0);
        assert!(!store.stop_requested(SettingsKind::Nightly).await.unwrap());
        assert!(store.queue_snapshot().is_empty());
    }

    #[tokio::test]
    async fn later_batches_only_drain_their_partition() {
        let store = Arc::new(MemoryStore::new());
        let run_date = Utc::now().date_naive();
        store
            .enqueue(&[NewQueueItem {
                run_date,
                batch_number: 2,
                topic: "Calibrate a monitor".to_string(),
                category_id: None,
                priority: 0,
            }])
            .await
            .unwrap();

        let capability = happy_article(MockCapability::new(), "calibrate-a-monitor");
        let builder = NightlyBuilder::new(store.clone(), Arc::new(capability), Pacing::instant());
        builder.run(2).await.unwrap();

        let run = store.latest_nightly_run().await.unwrap().unwrap();
        assert_eq!(run.status, NightlyStatus::Completed);
        // No research phases ran.
        assert_eq!(run.counts.categories_processed, 0);
        assert_eq!(run.counts.articles_generated, 1);
        assert_eq!(store.queue_snapshot()[0].status, QueueStatus::Completed);
    }
}
