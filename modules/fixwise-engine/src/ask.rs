//! Ask: answer a reader's question from the published corpus when it covers
//! the question, from model knowledge when it does not, and name the article
//! the knowledge base is missing.

use std::sync::Arc;

use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ai_client::{extract_as, Capability, ModelTier};
use fixwise_common::Article;
use fixwise_store::ContentStore;

use crate::dedup::{normalize_title, titles_overlap};

const ASK_SYSTEM: &str = "You are the help assistant of a tech-help knowledge base. Answer \
     from the provided articles when they cover the question; otherwise answer from general \
     knowledge and say so.";

/// At most this many candidate articles go into the prompt.
const MAX_CANDIDATES: usize = 5;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "what", "when", "where", "does", "how",
    "why", "can", "cant", "wont", "not", "you", "your", "from", "have", "has",
];

#[derive(Debug, Serialize)]
pub struct UsedArticle {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub used_articles: Vec<UsedArticle>,
    /// Topic worth generating when the corpus did not cover the question.
    pub suggested_topic: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AskAnswer {
    answer: String,
    /// Zero-based indices of the provided articles the answer drew on.
    used_article_indices: Vec<usize>,
    /// Null when the existing articles covered the question.
    suggested_topic: Option<String>,
}

pub struct AskEngine {
    store: Arc<dyn ContentStore>,
    capability: Arc<dyn Capability>,
}

impl AskEngine {
    pub fn new(store: Arc<dyn ContentStore>, capability: Arc<dyn Capability>) -> Self {
        Self { store, capability }
    }

    pub async fn ask(&self, question: &str, history: &[String]) -> Result<AskResponse> {
        let candidates = self.find_candidates(question).await?;

        let context = if candidates.is_empty() {
            "(no matching articles)".to_string()
        } else {
            candidates
                .iter()
                .enumerate()
                .map(|(i, a)| format!("### Article {i}: {}\n\n{}", a.title, a.content))
                .collect::<Vec<_>>()
                .join("\n\n---\n\n")
        };
        let history_block = if history.is_empty() {
            String::new()
        } else {
            format!("Earlier conversation:\n{}\n\n", history.join("\n"))
        };

        let answer: AskAnswer = extract_as(
            self.capability.as_ref(),
            ModelTier::Fast,
            ASK_SYSTEM,
            &format!(
                "{history_block}Question: {question}\n\nAvailable articles:\n\n{context}\n\n\
                 If no article covers the question, set suggested_topic to the how-to article \
                 title that would."
            ),
        )
        .await?;

        let used_articles = answer
            .used_article_indices
            .iter()
            .filter_map(|&i| candidates.get(i))
            .map(|a| UsedArticle { id: a.id, title: a.title.clone(), slug: a.slug.clone() })
            .collect();

        Ok(AskResponse {
            answer: answer.answer,
            used_articles,
            suggested_topic: answer.suggested_topic,
        })
    }

    /// Keyword search: each significant word of the question queried against
    /// published titles and bodies, merged until the candidate cap.
    async fn find_candidates(&self, question: &str) -> Result<Vec<Article>> {
        let mut candidates: Vec<Article> = Vec::new();
        for word in significant_words(question) {
            if candidates.len() >= MAX_CANDIDATES {
                break;
            }
            for article in self.store.search_articles(&word, MAX_CANDIDATES as u32).await? {
                if candidates.len() >= MAX_CANDIDATES {
                    break;
                }
                if !candidates.iter().any(|c| c.id == article.id) {
                    candidates.push(article);
                }
            }
        }
        Ok(candidates)
    }

    /// Whether a non-terminal run already exists for a similar topic. Guards
    /// the fire-a-generation-from-ask path against pile-ups.
    pub async fn has_active_similar_run(&self, topic: &str) -> Result<bool> {
        let active = self.store.list_active_runs().await?;
        Ok(active.iter().any(|run| titles_overlap(&run.topic, topic)))
    }
}

fn significant_words(question: &str) -> Vec<String> {
    let normalized = normalize_title(question);
    let mut seen = std::collections::HashSet::new();
    normalized
        .split_whitespace()
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(w))
        .filter(|w| seen.insert(w.to_string()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCapability;
    use fixwise_common::{ArticleStatus, RunMode};
    use serde_json::json;

    use fixwise_store::MemoryStore;

    #[tokio::test]
    async fn answers_from_matching_articles() {
        let store = Arc::new(MemoryStore::new());
        let article = store.seed_article(
            "Fix a Printer That Shows Offline",
            "fix-a-printer-that-shows-offline",
            ArticleStatus::Published,
        );
        // Draft articles are not searchable.
        store.seed_article("Printer Driver Guide", "printer-driver-guide", ArticleStatus::Draft);

        let capability = MockCapability::new().extraction(json!({
            "answer": "Restart the print spooler, then re-add the printer.",
            "used_article_indices": [0, 4],
            "suggested_topic": null
        }));

        let response = AskEngine::new(store, Arc::new(capability))
            .ask("Why does my printer say offline?", &[])
            .await
            .unwrap();

        assert!(response.answer.contains("spooler"));
        // Out-of-range index 4 silently drops.
        assert_eq!(response.used_articles.len(), 1);
        assert_eq!(response.used_articles[0].id, article.id);
        assert!(response.suggested_topic.is_none());
    }

    #[tokio::test]
    async fn uncovered_question_suggests_a_topic() {
        let store = Arc::new(MemoryStore::new());
        let capability = MockCapability::new().extraction(json!({
            "answer": "Generally you would pair it from Bluetooth settings.",
            "used_article_indices": [],
            "suggested_topic": "How to pair a Bluetooth keyboard"
        }));

        let response = AskEngine::new(store, Arc::new(capability))
            .ask("How do I pair a bluetooth keyboard?", &[])
            .await
            .unwrap();

        assert!(response.used_articles.is_empty());
        assert_eq!(
            response.suggested_topic.as_deref(),
            Some("How to pair a Bluetooth keyboard")
        );
    }

    #[tokio::test]
    async fn active_similar_run_guard() {
        let store = Arc::new(MemoryStore::new());
        store
            .create_run("How to pair a Bluetooth keyboard", RunMode::Manual)
            .await
            .unwrap();
        let engine = AskEngine::new(store.clone(), Arc::new(MockCapability::new()));

        assert!(engine
            .has_active_similar_run("pair a bluetooth keyboard")
            .await
            .unwrap());
        assert!(!engine.has_active_similar_run("clean a laptop fan").await.unwrap());
    }

    #[test]
    fn significant_words_drop_stopwords_and_short_words() {
        assert_eq!(
            significant_words("Why does my printer say it is offline?"),
            vec!["printer", "say", "offline"]
        );
    }

    #[test]
    fn significant_words_dedupe_across_the_whole_question() {
        // Repeats separated by other words still collapse, first mention wins.
        assert_eq!(
            significant_words("printer offline printer keeps going offline"),
            vec!["printer", "offline", "keeps", "going"]
        );
    }
}
