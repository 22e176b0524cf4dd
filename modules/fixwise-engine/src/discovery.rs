//! Topic discovery: grounded research into what people are asking about,
//! reduced to typed suggestions and optionally queued for generation.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use ai_client::{extract_as, Capability, ModelTier};
use fixwise_common::NewQueueItem;
use fixwise_store::ContentStore;

use crate::dedup::titles_overlap;

const DISCOVERY_SYSTEM: &str = "You are the content planner of a tech-help knowledge base.";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TopicSuggestion {
    pub topic: String,
    /// Id of the best-fitting category from the catalog, or null.
    pub category_id: Option<String>,
    /// 1 (highest demand) to 10.
    pub priority: i64,
    pub reasoning: String,
    pub search_keywords: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SuggestionList {
    suggestions: Vec<TopicSuggestion>,
}

pub struct TopicDiscovery {
    store: Arc<dyn ContentStore>,
    capability: Arc<dyn Capability>,
}

impl TopicDiscovery {
    pub fn new(store: Arc<dyn ContentStore>, capability: Arc<dyn Capability>) -> Self {
        Self { store, capability }
    }

    /// Research and suggest up to `count` topics not already covered.
    pub async fn discover(
        &self,
        count: u32,
        target_categories: Option<&[Uuid]>,
    ) -> Result<Vec<TopicSuggestion>> {
        let categories = self.store.list_categories().await?;
        let categories: Vec<_> = match target_categories {
            Some(ids) => categories.into_iter().filter(|c| ids.contains(&c.id)).collect(),
            None => categories,
        };
        let existing_titles = self.store.list_article_titles().await?;

        let catalog = categories
            .iter()
            .map(|c| format!("- {} — {}", c.id, c.name))
            .collect::<Vec<_>>()
            .join("\n");
        let research = self
            .capability
            .complete_grounded(
                ModelTier::Fast,
                DISCOVERY_SYSTEM,
                &format!(
                    "Search for the tech-help questions people are asking right now. Suggest \
                     {count} article topics with demand reasoning and search keywords.\n\n\
                     Categories:\n{catalog}"
                ),
            )
            .await?;

        let list: SuggestionList = extract_as(
            self.capability.as_ref(),
            ModelTier::Fast,
            DISCOVERY_SYSTEM,
            &format!(
                "Extract the topic suggestions. category_id must come from the catalog or be \
                 null.\nCategories:\n{catalog}\n\n{research}"
            ),
        )
        .await?;

        let mut suggestions: Vec<TopicSuggestion> = list
            .suggestions
            .into_iter()
            .filter(|s| !existing_titles.iter().any(|t| titles_overlap(&s.topic, t)))
            .map(|mut s| {
                // An id outside the offered catalog drops to null.
                s.category_id = s
                    .category_id
                    .filter(|raw| {
                        Uuid::parse_str(raw).is_ok_and(|id| categories.iter().any(|c| c.id == id))
                    });
                s
            })
            .collect();
        suggestions.truncate(count as usize);
        info!(count = suggestions.len(), "Topics discovered");
        Ok(suggestions)
    }

    /// Queue suggestions as today's batch-1 items, best priority first.
    pub async fn enqueue_today(&self, suggestions: &[TopicSuggestion]) -> Result<u64> {
        let run_date = Utc::now().date_naive();
        let items: Vec<NewQueueItem> = suggestions
            .iter()
            .enumerate()
            .map(|(i, s)| NewQueueItem {
                run_date,
                batch_number: 1,
                topic: s.topic.clone(),
                category_id: s.category_id.as_deref().and_then(|raw| Uuid::parse_str(raw).ok()),
                priority: i as i32,
            })
            .collect();
        self.store.enqueue(&items).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCapability;
    use fixwise_common::ArticleStatus;
    use fixwise_store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn discovery_filters_covered_topics_and_bad_categories() {
        let store = Arc::new(MemoryStore::new());
        let category = store
            .insert_category("Networking", "networking", "Network problems", "wifi", 0)
            .await
            .unwrap();
        store.seed_article(
            "Fix slow WiFi at home",
            "fix-slow-wifi-at-home",
            ArticleStatus::Published,
        );

        let capability = MockCapability::new()
            .text("Research on current questions.")
            .extraction(json!({"suggestions": [
                {"topic": "Fix slow WiFi", "category_id": category.id.to_string(),
                 "priority": 1, "reasoning": "already covered", "search_keywords": ["wifi slow"]},
                {"topic": "Set up a mesh network", "category_id": category.id.to_string(),
                 "priority": 2, "reasoning": "high demand", "search_keywords": ["mesh wifi"]},
                {"topic": "Port forwarding basics", "category_id": Uuid::new_v4().to_string(),
                 "priority": 3, "reasoning": "steady demand", "search_keywords": ["port forward"]}
            ]}));

        let discovery = TopicDiscovery::new(store.clone(), Arc::new(capability));
        let suggestions = discovery.discover(10, None).await.unwrap();

        // "Fix slow WiFi" is contained in an existing title and drops out.
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].topic, "Set up a mesh network");
        assert_eq!(suggestions[0].category_id.as_deref(), Some(category.id.to_string().as_str()));
        // Unknown category id nulled.
        assert_eq!(suggestions[1].category_id, None);

        let queued = discovery.enqueue_today(&suggestions).await.unwrap();
        assert_eq!(queued, 2);
        let items = store.queue_snapshot();
        assert!(items.iter().all(|i| i.batch_number == 1));
        assert_eq!(items[0].category_id, Some(category.id));
    }
}
