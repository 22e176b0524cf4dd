//! The article pipeline: one topic in, one published-ready article out,
//! with every stage transition persisted on the run row before the stage's
//! work happens. Stages never retry and never run concurrently; a stage
//! error fails the whole run.

use std::sync::Arc;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use ai_client::{extract_as, Capability, ModelTier};
use fixwise_common::{
    slug::{slugify, with_timestamp_suffix},
    ArticleSource, ArticleStatus, Category, FixwiseError, NewArticle, PipelineRun, RunMode,
    RunStatus, RunUsage,
};
use fixwise_store::ContentStore;

use crate::dedup;
use crate::pacing::Pacing;

/// Articles scoring below this go in as `needs_review` instead of `draft`.
const NEEDS_REVIEW_BELOW: i32 = 7;

const EDITOR_SYSTEM: &str = "You are the content engine of a tech-help knowledge base. \
     Articles are practical, step-by-step, written for non-technical readers.";

#[derive(Debug)]
pub enum PipelineOutcome {
    Completed {
        run_id: Uuid,
        article_id: Uuid,
        quality_score: i32,
        factual_score: i32,
    },
    Skipped {
        run_id: Uuid,
        reason: String,
    },
}

/// The full article as the writing stage returns it.
#[derive(Debug, Deserialize, JsonSchema)]
struct ArticleDraft {
    title: String,
    slug: String,
    excerpt: String,
    /// Markdown body.
    content: String,
    /// Id of the best-fitting category from the provided catalog, or null.
    category_id: Option<String>,
    tags: Vec<String>,
    /// Estimated read time in minutes.
    read_time: i64,
    seo_title: Option<String>,
    seo_description: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FactCheck {
    /// 0-10, from the verification narrative.
    factual_score: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct QualityReview {
    /// 0-10 overall quality.
    quality_score: i64,
    /// Improved SEO title, or null to keep the drafted one.
    seo_title: Option<String>,
    /// Improved SEO description, or null to keep the drafted one.
    seo_description: Option<String>,
}

pub struct Pipeline {
    store: Arc<dyn ContentStore>,
    capability: Arc<dyn Capability>,
    pacing: Pacing,
}

impl Pipeline {
    pub fn new(store: Arc<dyn ContentStore>, capability: Arc<dyn Capability>, pacing: Pacing) -> Self {
        Self { store, capability, pacing }
    }

    /// Create the run row without doing any work yet. Gives callers that
    /// spawn the pipeline in the background an id to hand out first.
    pub async fn start(&self, topic: &str, mode: RunMode) -> Result<PipelineRun> {
        let run = self.store.create_run(topic, mode).await?;
        info!(run_id = %run.id, topic, ?mode, "Pipeline run started");
        Ok(run)
    }

    /// Drive an already-created run through all six stages. A duplicate topic
    /// ends the run `skipped`; any stage error ends it `failed`. Either way
    /// the run row carries the outcome.
    pub async fn resume(
        &self,
        run_id: Uuid,
        topic: &str,
        category_id: Option<Uuid>,
    ) -> Result<PipelineOutcome> {
        match self.drive(run_id, topic, category_id).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Pipeline run failed");
                self.store.fail_run(run_id, &format!("{e:#}")).await?;
                Err(e)
            }
        }
    }

    /// `start` and `resume` in one await.
    pub async fn run(
        &self,
        topic: &str,
        category_id: Option<Uuid>,
        mode: RunMode,
    ) -> Result<PipelineOutcome> {
        let run = self.start(topic, mode).await?;
        self.resume(run.id, topic, category_id).await
    }

    async fn drive(
        &self,
        run_id: Uuid,
        topic: &str,
        requested_category: Option<Uuid>,
    ) -> Result<PipelineOutcome> {
        // Stage 1: duplicate check.
        self.store.advance_run(run_id, RunStatus::Checking, 1).await?;
        let titles = self.store.list_article_titles().await?;
        if dedup::is_duplicate_topic(self.capability.as_ref(), topic, &titles).await? {
            info!(run_id = %run_id, topic, "Duplicate topic, skipping");
            self.store.skip_run(run_id, "Duplicate topic").await?;
            return Ok(PipelineOutcome::Skipped {
                run_id,
                reason: "Duplicate topic".to_string(),
            });
        }
        tokio::time::sleep(self.pacing.stage_delay).await;

        // Stage 2: web-grounded research.
        self.store.advance_run(run_id, RunStatus::Researching, 2).await?;
        let research = self
            .capability
            .complete_grounded(
                ModelTier::Fast,
                EDITOR_SYSTEM,
                &format!(
                    "Research the topic \"{topic}\" for a how-to article. Search the web for \
                     current, accurate information. Produce a 500-800 word research brief \
                     covering the common causes, the fix procedure step by step, platform \
                     differences, and pitfalls. Cite source URLs inline."
                ),
            )
            .await
            .context("Research stage failed")?;
        let sources = extract_urls(&research);
        self.store.set_run_research(run_id, &research, &sources).await?;
        tokio::time::sleep(self.pacing.stage_delay).await;

        // Stage 3: outline.
        self.store.advance_run(run_id, RunStatus::Outlining, 3).await?;
        let outline = self
            .capability
            .complete(
                ModelTier::Fast,
                EDITOR_SYSTEM,
                &format!(
                    "Using this research brief, outline a how-to article on \"{topic}\". \
                     Markdown headings with one-line notes per section.\n\n{research}"
                ),
            )
            .await
            .context("Outline stage failed")?;
        self.store.set_run_outline(run_id, &outline).await?;
        tokio::time::sleep(self.pacing.stage_delay).await;

        // Stage 4: write the article (the only Quality-tier call).
        self.store.advance_run(run_id, RunStatus::Writing, 4).await?;
        let categories = self.store.list_categories().await?;
        let draft: ArticleDraft = extract_as(
            self.capability.as_ref(),
            ModelTier::Quality,
            EDITOR_SYSTEM,
            &format!(
                "Write the complete article on \"{topic}\".\n\nResearch brief:\n{research}\n\n\
                 Outline:\n{outline}\n\nCategories:\n{}\n\nPick category_id from the catalog \
                 above, or null if none fits. Content is Markdown, 800-1500 words, numbered \
                 steps where appropriate.",
                category_catalog(&categories)
            ),
        )
        .await
        .context("Writing stage failed")?;
        // A caller-pinned category wins; the model assigns one only when the
        // caller left it open.
        let category_id = requested_category
            .or_else(|| resolve_category(draft.category_id.as_deref(), &categories));
        tokio::time::sleep(self.pacing.stage_delay).await;

        // Stage 5: fact verification, grounded narrative then a score.
        self.store.advance_run(run_id, RunStatus::Verifying, 5).await?;
        let verification = self
            .capability
            .complete_grounded(
                ModelTier::Fast,
                EDITOR_SYSTEM,
                &format!(
                    "Fact-check this draft against current web sources. List every claim that \
                     is wrong, outdated, or unverifiable.\n\n# {}\n\n{}",
                    draft.title, draft.content
                ),
            )
            .await
            .context("Verification stage failed")?;
        let fact: FactCheck = extract_as(
            self.capability.as_ref(),
            ModelTier::Fast,
            EDITOR_SYSTEM,
            &format!(
                "Based on this fact-check report, score the article's factual accuracy \
                 from 0 (unusable) to 10 (fully verified).\n\n{verification}"
            ),
        )
        .await
        .context("Verification scoring failed")?;
        let factual_score = fact.factual_score.clamp(0, 10) as i32;
        tokio::time::sleep(self.pacing.stage_delay).await;

        // Stage 6: quality score and SEO polish.
        self.store.advance_run(run_id, RunStatus::Optimizing, 6).await?;
        let review: QualityReview = extract_as(
            self.capability.as_ref(),
            ModelTier::Fast,
            EDITOR_SYSTEM,
            &format!(
                "Review this article for clarity, completeness, and structure. Score overall \
                 quality 0-10. Suggest a better seo_title/seo_description only if yours is a \
                 clear improvement.\n\n# {}\n\n{}",
                draft.title, draft.content
            ),
        )
        .await
        .context("Optimization stage failed")?;
        let quality_score = review.quality_score.clamp(0, 10) as i32;

        let status = if quality_score < NEEDS_REVIEW_BELOW {
            ArticleStatus::NeedsReview
        } else {
            ArticleStatus::Draft
        };
        let new_article = NewArticle {
            title: draft.title.clone(),
            slug: draft_slug(&draft),
            excerpt: draft.excerpt,
            content: draft.content,
            category_id,
            status,
            read_time: draft.read_time.clamp(1, 120) as i32,
            tags: draft.tags,
            seo_title: review.seo_title.or(draft.seo_title),
            seo_description: review.seo_description.or(draft.seo_description),
            ai_generated: true,
            sources: sources
                .iter()
                .map(|url| ArticleSource { title: draft.title.clone(), url: url.clone() })
                .collect(),
        };
        let article = self.insert_with_slug_retry(new_article).await?;

        self.store
            .complete_run(
                run_id,
                article.id,
                RunUsage {
                    quality_score: Some(quality_score),
                    factual_score: Some(factual_score),
                    source_count: Some(sources.len() as i32),
                },
            )
            .await?;
        info!(run_id = %run_id, article_id = %article.id, quality_score, factual_score, "Pipeline run completed");

        Ok(PipelineOutcome::Completed {
            run_id,
            article_id: article.id,
            quality_score,
            factual_score,
        })
    }

    /// One retry with a timestamp suffix on slug collision. Anything else is
    /// fatal to the run.
    async fn insert_with_slug_retry(
        &self,
        mut article: NewArticle,
    ) -> Result<fixwise_common::Article> {
        match self.store.insert_article(&article).await {
            Ok(inserted) => Ok(inserted),
            Err(e) if is_slug_conflict(&e) => {
                article.slug = with_timestamp_suffix(&article.slug);
                warn!(slug = %article.slug, "Slug collision, retrying with suffix");
                self.store.insert_article(&article).await
            }
            Err(e) => Err(e),
        }
    }
}

fn is_slug_conflict(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<FixwiseError>(), Some(FixwiseError::SlugConflict))
}

fn draft_slug(draft: &ArticleDraft) -> String {
    let slug = slugify(&draft.slug);
    if slug.is_empty() {
        slugify(&draft.title)
    } else {
        slug
    }
}

fn category_catalog(categories: &[Category]) -> String {
    if categories.is_empty() {
        return "(none yet)".to_string();
    }
    categories
        .iter()
        .map(|c| format!("- {} — {}: {}", c.id, c.name, c.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The model hands back a category id as a string; anything not in the
/// catalog resolves to None.
fn resolve_category(raw: Option<&str>, categories: &[Category]) -> Option<Uuid> {
    let id = Uuid::parse_str(raw?).ok()?;
    categories.iter().any(|c| c.id == id).then_some(id)
}

fn extract_urls(text: &str) -> Vec<String> {
    static URL_RE: OnceLock<Regex> = OnceLock::new();
    let re = URL_RE.get_or_init(|| {
        Regex::new(r#"https?://[^\s<>"')\]]+"#).expect("url regex")
    });
    let mut urls = Vec::new();
    for m in re.find_iter(text) {
        let url = m.as_str().trim_end_matches(['.', ',', ';']).to_string();
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCapability;
    use fixwise_store::MemoryStore;
    use serde_json::json;

    fn draft_json(title: &str, slug: &str) -> serde_json::Value {
        json!({
            "title": title,
            "slug": slug,
            "excerpt": "Short summary.",
            "content": "1. Open settings.\n2. Do the thing.",
            "category_id": null,
            "tags": ["wifi", "network"],
            "read_time": 4,
            "seo_title": null,
            "seo_description": null
        })
    }

    fn pipeline(store: Arc<MemoryStore>, capability: MockCapability) -> Pipeline {
        Pipeline::new(store, Arc::new(capability), Pacing::instant())
    }

    #[tokio::test]
    async fn happy_path_produces_draft_article_with_usage() {
        let store = Arc::new(MemoryStore::new());
        let capability = MockCapability::new()
            .text("Research brief. See https://support.example.com/wifi and https://docs.example.com/router.")
            .text("## Outline")
            .text("Fact-check: all claims verified.")
            .extraction(draft_json("How to Reset Your WiFi Password", "how-to-reset-your-wifi-password"))
            .extraction(json!({"factual_score": 9}))
            .extraction(json!({"quality_score": 8, "seo_title": "Reset Your WiFi Password", "seo_description": null}));

        let outcome = pipeline(store.clone(), capability)
            .run("How to reset WiFi password", None, RunMode::Manual)
            .await
            .unwrap();

        let PipelineOutcome::Completed { run_id, article_id, quality_score, factual_score } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(quality_score, 8);
        assert_eq!(factual_score, 9);

        let article = store.get_article(article_id).await.unwrap().unwrap();
        assert_eq!(article.status, ArticleStatus::Draft);
        assert!(article.ai_generated);
        assert_eq!(article.sources.len(), 2);
        assert_eq!(article.seo_title.as_deref(), Some("Reset Your WiFi Password"));

        let run = store.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.article_id, Some(article_id));
        assert_eq!(run.usage.unwrap().source_count, Some(2));
        assert_eq!(run.research_sources.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_topic_skips_without_article() {
        let store = Arc::new(MemoryStore::new());
        store.seed_article(
            "How to Reset Your WiFi Password",
            "how-to-reset-your-wifi-password",
            ArticleStatus::Published,
        );
        // Not a substring match ("your" differs), so the model judges.
        let capability =
            MockCapability::new().extraction(json!({"is_duplicate": true, "similarity": 95}));

        let outcome = pipeline(store.clone(), capability)
            .run("How to reset WiFi password", None, RunMode::Manual)
            .await
            .unwrap();

        let PipelineOutcome::Skipped { run_id, reason } = outcome else {
            panic!("expected skip");
        };
        assert_eq!(reason, "Duplicate topic");
        let run = store.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Skipped);
        assert_eq!(run.error_message.as_deref(), Some("Duplicate topic"));
        assert!(run.article_id.is_none());
        assert_eq!(store.list_articles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stage_error_fails_run_with_message() {
        let store = Arc::new(MemoryStore::new());
        let capability = MockCapability::new().text_err("provider unavailable");

        let err = pipeline(store.clone(), capability)
            .run("Fix printer offline", None, RunMode::Manual)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Research stage failed"));

        let runs = store.list_active_runs().await.unwrap();
        assert!(runs.is_empty(), "failed run must be terminal");
        assert!(store.list_articles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scores_clamp_and_low_quality_needs_review() {
        let store = Arc::new(MemoryStore::new());
        let capability = MockCapability::new()
            .text("Brief without links.")
            .text("Outline")
            .text("Many problems found.")
            .extraction(draft_json("Speed Up an Old Laptop", "speed-up-an-old-laptop"))
            .extraction(json!({"factual_score": 15}))
            .extraction(json!({"quality_score": -3, "seo_title": null, "seo_description": null}));

        let outcome = pipeline(store.clone(), capability)
            .run("Speed up an old laptop", None, RunMode::Manual)
            .await
            .unwrap();

        let PipelineOutcome::Completed { article_id, quality_score, factual_score, .. } = outcome
        else {
            panic!("expected completion");
        };
        assert_eq!(factual_score, 10);
        assert_eq!(quality_score, 0);
        let article = store.get_article(article_id).await.unwrap().unwrap();
        assert_eq!(article.status, ArticleStatus::NeedsReview);
    }

    #[tokio::test]
    async fn pinned_category_wins_over_model_choice() {
        let store = Arc::new(MemoryStore::new());
        let pinned = store
            .insert_category("Networking", "networking", "Network guides", "wifi", 0)
            .await
            .unwrap();
        let other = store
            .insert_category("Printers", "printers", "Printer guides", "printer", 1)
            .await
            .unwrap();
        let mut draft = draft_json("Fix Slow Hotel WiFi", "fix-slow-hotel-wifi");
        draft["category_id"] = json!(other.id.to_string());
        let capability = MockCapability::new()
            .text("Brief.")
            .text("Outline")
            .text("Verified.")
            .extraction(draft)
            .extraction(json!({"factual_score": 8}))
            .extraction(json!({"quality_score": 8, "seo_title": null, "seo_description": null}));

        let outcome = pipeline(store.clone(), capability)
            .run("Fix slow hotel WiFi", Some(pinned.id), RunMode::Manual)
            .await
            .unwrap();

        let PipelineOutcome::Completed { article_id, .. } = outcome else {
            panic!("expected completion");
        };
        let article = store.get_article(article_id).await.unwrap().unwrap();
        assert_eq!(article.category_id, Some(pinned.id));
    }

    #[tokio::test]
    async fn slug_conflict_retries_once_with_suffix() {
        let store = Arc::new(MemoryStore::new());
        store.seed_article("Unrelated Existing", "fix-a-frozen-tablet", ArticleStatus::Draft);
        let capability = MockCapability::new()
            .extraction(json!({"is_duplicate": false, "similarity": 10}))
            .text("Brief.")
            .text("Outline")
            .text("Verified.")
            .extraction(draft_json("Fix a Frozen Tablet", "fix-a-frozen-tablet"))
            .extraction(json!({"factual_score": 8}))
            .extraction(json!({"quality_score": 8, "seo_title": null, "seo_description": null}));

        let outcome = pipeline(store.clone(), capability)
            .run("Fix a frozen tablet", None, RunMode::Manual)
            .await
            .unwrap();

        let PipelineOutcome::Completed { article_id, .. } = outcome else {
            panic!("expected completion");
        };
        let article = store.get_article(article_id).await.unwrap().unwrap();
        assert!(article.slug.starts_with("fix-a-frozen-tablet-"));
    }

    #[test]
    fn url_extraction_dedupes_and_trims() {
        let urls = extract_urls(
            "See https://a.example.com/x, then (https://b.example.com/y). \
             Again https://a.example.com/x.",
        );
        assert_eq!(urls, vec!["https://a.example.com/x", "https://b.example.com/y"]);
    }

    #[test]
    fn unknown_category_resolves_to_none() {
        assert_eq!(resolve_category(Some("not-a-uuid"), &[]), None);
        assert_eq!(resolve_category(Some(&Uuid::new_v4().to_string()), &[]), None);
        assert_eq!(resolve_category(None, &[]), None);
    }
}
