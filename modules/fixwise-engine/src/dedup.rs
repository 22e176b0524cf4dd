//! Duplicate detection. Three passes at three costs: a free normalized
//! substring check, an O(n²) corpus pass for the auditor, and model
//! similarity judgments for the cases string matching cannot settle.

use anyhow::Result;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, warn};

use ai_client::{extract_as, Capability, ModelTier};
use fixwise_common::Article;

/// Similarity score at or above which two topics count as the same article.
pub const DUPLICATE_THRESHOLD: i64 = 80;

/// Model keep-list chunks must stay small enough for reliable indexing.
const KEEP_CHUNK_SIZE: usize = 50;

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_space = true;
    for c in title.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_space = false;
        } else if c.is_whitespace() && !last_space {
            out.push(' ');
            last_space = true;
        }
        // Punctuation drops out entirely.
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Containment in either direction on normalized titles.
pub fn titles_overlap(a: &str, b: &str) -> bool {
    let a = normalize_title(a);
    let b = normalize_title(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

/// Model verdict on whether a candidate topic duplicates the catalog.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct TopicJudgment {
    pub is_duplicate: bool,
    /// 0-100 similarity to the closest existing article.
    pub similarity: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct KeepList {
    /// Zero-based indices of topics that are NOT already covered.
    keep_indices: Vec<usize>,
}

/// Decide whether `topic` duplicates any existing title. Substring overlap
/// settles it without a model call; otherwise one similarity judgment.
pub async fn is_duplicate_topic(
    capability: &dyn Capability,
    topic: &str,
    existing_titles: &[String],
) -> Result<bool> {
    if existing_titles.is_empty() {
        return Ok(false);
    }
    if existing_titles.iter().any(|t| titles_overlap(topic, t)) {
        debug!(topic, "Duplicate by substring overlap");
        return Ok(true);
    }

    let catalog = existing_titles
        .iter()
        .map(|t| format!("- {t}"))
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = format!(
        "Proposed article topic: \"{topic}\"\n\nExisting article titles:\n{catalog}\n\n\
         Judge whether an article on the proposed topic would substantially duplicate \
         any existing article. Report the similarity (0-100) to the closest match."
    );
    let judgment: TopicJudgment = extract_as(
        capability,
        ModelTier::Fast,
        "You judge topical overlap in a tech-help knowledge base.",
        &prompt,
    )
    .await?;

    Ok(judgment.is_duplicate && judgment.similarity >= DUPLICATE_THRESHOLD)
}

/// Cross-batch dedup: drop candidate topics already covered by existing
/// titles. Cheap substring filter first, then chunks through the model asking
/// which indices to KEEP. Any chunk the model answer cannot be trusted for is
/// kept whole; this pass may let a duplicate through but never drops a topic
/// silently.
pub async fn dedup_topics(
    capability: &dyn Capability,
    topics: Vec<String>,
    existing_titles: &[String],
) -> Vec<String> {
    let candidates: Vec<String> = topics
        .into_iter()
        .filter(|t| !existing_titles.iter().any(|e| titles_overlap(t, e)))
        .collect();
    if candidates.is_empty() || existing_titles.is_empty() {
        return candidates;
    }

    let catalog = existing_titles
        .iter()
        .map(|t| format!("- {t}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut kept = Vec::with_capacity(candidates.len());
    for chunk in candidates.chunks(KEEP_CHUNK_SIZE) {
        let numbered = chunk
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{i}. {t}"))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Existing article titles:\n{catalog}\n\nCandidate topics:\n{numbered}\n\n\
             Return the zero-based indices of candidates that are NOT already covered \
             by an existing article."
        );
        let keep = extract_as::<KeepList>(
            capability,
            ModelTier::Fast,
            "You judge topical overlap in a tech-help knowledge base.",
            &prompt,
        )
        .await;

        match keep {
            Ok(list) if list.keep_indices.iter().all(|&i| i < chunk.len()) => {
                kept.extend(list.keep_indices.iter().map(|&i| chunk[i].clone()));
            }
            Ok(list) => {
                warn!(?list.keep_indices, "Keep-list index out of range, keeping whole chunk");
                kept.extend(chunk.iter().cloned());
            }
            Err(e) => {
                warn!(error = %e, "Keep-list extraction failed, keeping whole chunk");
                kept.extend(chunk.iter().cloned());
            }
        }
    }
    kept
}

/// Corpus pass for the auditor: pairwise exact/containment on normalized
/// titles, plus exact slug match. Returns index pairs with i < j.
pub fn find_duplicate_pairs(articles: &[Article]) -> Vec<(usize, usize)> {
    let normalized: Vec<String> = articles.iter().map(|a| normalize_title(&a.title)).collect();
    let mut pairs = Vec::new();
    for i in 0..articles.len() {
        for j in (i + 1)..articles.len() {
            let title_dup = !normalized[i].is_empty()
                && !normalized[j].is_empty()
                && (normalized[i].contains(&normalized[j])
                    || normalized[j].contains(&normalized[i]));
            if title_dup || articles[i].slug == articles[j].slug {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCapability;
    use fixwise_common::ArticleStatus;
    use fixwise_store::MemoryStore;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(
            normalize_title("How to Reset Your WiFi Password!"),
            "how to reset your wifi password"
        );
        assert_eq!(normalize_title("  USB-C  vs.  Thunderbolt "), "usbc vs thunderbolt");
    }

    #[test]
    fn overlap_is_containment_both_directions() {
        assert!(titles_overlap("Reset WiFi password", "How to reset WiFi password quickly"));
        assert!(titles_overlap("How to reset WiFi password quickly", "Reset WiFi password"));
        assert!(!titles_overlap("Reset WiFi password", "Clean a laptop fan"));
        assert!(!titles_overlap("", "anything"));
    }

    #[tokio::test]
    async fn substring_match_skips_the_model() {
        let capability = MockCapability::new(); // nothing scripted
        let existing = vec!["How to Factory Reset an iPhone".to_string()];
        assert!(
            is_duplicate_topic(&capability, "factory reset an iphone", &existing)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn model_judgment_applies_threshold() {
        let capability = MockCapability::new()
            .extraction(serde_json::json!({"is_duplicate": true, "similarity": 92}))
            .extraction(serde_json::json!({"is_duplicate": true, "similarity": 60}));
        let existing = vec!["Speed up an old laptop".to_string()];

        assert!(is_duplicate_topic(&capability, "Fix a slow computer", &existing).await.unwrap());
        assert!(!is_duplicate_topic(&capability, "Fix a slow computer", &existing).await.unwrap());
    }

    #[tokio::test]
    async fn keep_list_parse_failure_keeps_whole_chunk() {
        let capability = MockCapability::new().extraction_err("scripted failure");
        let topics = vec!["Clean a mechanical keyboard".to_string(), "Calibrate a monitor".to_string()];
        let existing = vec!["Set up a home VPN".to_string()];

        let kept = dedup_topics(&capability, topics.clone(), &existing).await;
        assert_eq!(kept, topics);
    }

    #[tokio::test]
    async fn keep_list_out_of_range_keeps_whole_chunk() {
        let capability =
            MockCapability::new().extraction(serde_json::json!({"keep_indices": [0, 7]}));
        let topics = vec!["a".to_string(), "b".to_string()];
        let kept = dedup_topics(&capability, topics.clone(), &["c".to_string()]).await;
        assert_eq!(kept, topics);
    }

    #[tokio::test]
    async fn keep_list_filters_by_index() {
        let capability = MockCapability::new().extraction(serde_json::json!({"keep_indices": [1]}));
        let topics = vec!["first".to_string(), "second".to_string()];
        let kept = dedup_topics(&capability, topics, &["unrelated existing".to_string()]).await;
        assert_eq!(kept, vec!["second".to_string()]);
    }

    #[tokio::test]
    async fn corpus_pass_finds_title_and_slug_duplicates() {
        let store = MemoryStore::new();
        store.seed_article("Reset WiFi Password", "reset-wifi-password", ArticleStatus::Published);
        store.seed_article(
            "How to Reset WiFi Password",
            "how-to-reset-wifi-password",
            ArticleStatus::Published,
        );
        store.seed_article("Clean a Laptop Fan", "clean-a-laptop-fan", ArticleStatus::Published);

        use fixwise_store::ContentStore;
        let articles = store.list_articles().await.unwrap();
        let pairs = find_duplicate_pairs(&articles);
        assert_eq!(pairs, vec![(0, 1)]);
    }
}
