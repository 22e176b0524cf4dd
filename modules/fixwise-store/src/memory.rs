//! In-memory [`ContentStore`] used by unit tests. No database, no Docker.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use uuid::Uuid;

use fixwise_common::{
    Article, ArticleStatus, AuditCounts, AuditFinding, AuditRun, AuditStatus, AutomationSettings,
    Category, FindingStatus, FixwiseError, NewArticle, NewFinding, NewQueueItem, NightlyCounts,
    NightlyRun, NightlyStatus, PipelineRun, QueueItem, QueueStatus, RunMode, RunStatus, RunUsage,
    SettingsKind,
};

use crate::traits::ContentStore;

#[derive(Default)]
struct Inner {
    categories: Vec<Category>,
    articles: Vec<Article>,
    runs: Vec<PipelineRun>,
    queue: Vec<QueueItem>,
    nightly_runs: Vec<NightlyRun>,
    audit_runs: Vec<AuditRun>,
    findings: Vec<AuditFinding>,
    settings: HashMap<String, AutomationSettings>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a published article directly, bypassing the pipeline.
    pub fn seed_article(&self, title: &str, slug: &str, status: ArticleStatus) -> Article {
        let article = Article {
            id: Uuid::new_v4(),
            title: title.to_string(),
            slug: slug.to_string(),
            excerpt: String::new(),
            content: format!("Guide content for {title}."),
            category_id: None,
            status,
            featured: false,
            read_time: 5,
            tags: Vec::new(),
            seo_title: None,
            seo_description: None,
            ai_generated: true,
            sources: Vec::new(),
            view_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.inner.lock().unwrap().articles.push(article.clone());
        article
    }

    /// Backdate a processing queue item so the stale sweep will pick it up.
    pub fn age_queue_item(&self, id: Uuid, minutes: i64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(item) = inner.queue.iter_mut().find(|q| q.id == id) {
            item.created_at = Utc::now() - Duration::minutes(minutes);
        }
    }

    pub fn queue_snapshot(&self) -> Vec<QueueItem> {
        self.inner.lock().unwrap().queue.clone()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    // --- Categories ---

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let mut categories = self.inner.lock().unwrap().categories.clone();
        categories.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.name.cmp(&b.name)));
        Ok(categories)
    }

    async fn insert_category(
        &self,
        name: &str,
        slug: &str,
        description: &str,
        icon: &str,
        sort_order: i32,
    ) -> Result<Category> {
        let category = Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slug.to_string(),
            description: description.to_string(),
            icon: icon.to_string(),
            sort_order,
            created_at: Utc::now(),
        };
        self.inner.lock().unwrap().categories.push(category.clone());
        Ok(category)
    }

    // --- Articles ---

    async fn list_articles(&self) -> Result<Vec<Article>> {
        Ok(self.inner.lock().unwrap().articles.clone())
    }

    async fn list_article_titles(&self) -> Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .articles
            .iter()
            .map(|a| a.title.clone())
            .collect())
    }

    async fn get_article(&self, id: Uuid) -> Result<Option<Article>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .articles
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn insert_article(&self, article: &NewArticle) -> Result<Article> {
        let mut inner = self.inner.lock().unwrap();
        if inner.articles.iter().any(|a| a.slug == article.slug) {
            return Err(FixwiseError::SlugConflict.into());
        }
        let stored = Article {
            id: Uuid::new_v4(),
            title: article.title.clone(),
            slug: article.slug.clone(),
            excerpt: article.excerpt.clone(),
            content: article.content.clone(),
            category_id: article.category_id,
            status: article.status,
            featured: false,
            read_time: article.read_time,
            tags: article.tags.clone(),
            seo_title: article.seo_title.clone(),
            seo_description: article.seo_description.clone(),
            ai_generated: article.ai_generated,
            sources: article.sources.clone(),
            view_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        inner.articles.push(stored.clone());
        Ok(stored)
    }

    async fn update_article_status(&self, id: Uuid, status: ArticleStatus) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(article) = inner.articles.iter_mut().find(|a| a.id == id) {
            article.status = status;
            article.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_article_text(
        &self,
        id: Uuid,
        title: Option<&str>,
        excerpt: Option<&str>,
        content: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(article) = inner.articles.iter_mut().find(|a| a.id == id) {
            if let Some(title) = title {
                article.title = title.to_string();
            }
            if let Some(excerpt) = excerpt {
                article.excerpt = excerpt.to_string();
            }
            if let Some(content) = content {
                article.content = content.to_string();
            }
            article.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn search_articles(&self, query: &str, limit: u32) -> Result<Vec<Article>> {
        let needle = query.to_lowercase();
        let mut hits: Vec<Article> = self
            .inner
            .lock()
            .unwrap()
            .articles
            .iter()
            .filter(|a| a.status == ArticleStatus::Published)
            .filter(|a| {
                a.title.to_lowercase().contains(&needle)
                    || a.content.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.view_count.cmp(&a.view_count));
        hits.truncate(limit.min(20) as usize);
        Ok(hits)
    }

    // --- Pipeline runs ---

    async fn create_run(&self, topic: &str, mode: RunMode) -> Result<PipelineRun> {
        let run = PipelineRun {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            mode,
            status: RunStatus::Pending,
            current_step: 0,
            total_steps: 6,
            research_notes: None,
            research_sources: Vec::new(),
            generated_outline: None,
            article_id: None,
            error_message: None,
            usage: None,
            started_at: Utc::now(),
            completed_at: None,
        };
        self.inner.lock().unwrap().runs.push(run.clone());
        Ok(run)
    }

    async fn advance_run(&self, id: Uuid, status: RunStatus, current_step: i32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let run = inner
            .runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| FixwiseError::Validation(format!("No run {id}")))?;
        if !run.status.can_transition_to(status) {
            return Err(FixwiseError::Validation(format!(
                "Run {id} cannot move {} -> {status}",
                run.status
            ))
            .into());
        }
        run.status = status;
        run.current_step = current_step;
        Ok(())
    }

    async fn set_run_research(&self, id: Uuid, notes: &str, sources: &[String]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(run) = inner.runs.iter_mut().find(|r| r.id == id) {
            run.research_notes = Some(notes.to_string());
            run.research_sources = sources.to_vec();
        }
        Ok(())
    }

    async fn set_run_outline(&self, id: Uuid, outline: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(run) = inner.runs.iter_mut().find(|r| r.id == id) {
            run.generated_outline = Some(outline.to_string());
        }
        Ok(())
    }

    async fn complete_run(&self, id: Uuid, article_id: Uuid, usage: RunUsage) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(run) = inner.runs.iter_mut().find(|r| r.id == id) {
            run.status = RunStatus::Completed;
            run.article_id = Some(article_id);
            run.usage = Some(usage);
            run.current_step = run.total_steps;
            run.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn fail_run(&self, id: Uuid, error: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(run) = inner.runs.iter_mut().find(|r| r.id == id) {
            run.status = RunStatus::Failed;
            run.error_message = Some(error.to_string());
            run.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn skip_run(&self, id: Uuid, reason: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(run) = inner.runs.iter_mut().find(|r| r.id == id) {
            run.status = RunStatus::Skipped;
            run.error_message = Some(reason.to_string());
            run.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<PipelineRun>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .runs
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn list_active_runs(&self) -> Result<Vec<PipelineRun>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .runs
            .iter()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect())
    }

    // --- Queue ---

    async fn enqueue(&self, items: &[NewQueueItem]) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        for item in items {
            inner.queue.push(QueueItem {
                id: Uuid::new_v4(),
                run_date: item.run_date,
                batch_number: item.batch_number,
                topic: item.topic.clone(),
                category_id: item.category_id,
                priority: item.priority,
                status: QueueStatus::Pending,
                article_id: None,
                error_message: None,
                created_at: Utc::now(),
            });
        }
        Ok(items.len() as u64)
    }

    async fn fetch_pending(
        &self,
        run_date: NaiveDate,
        batch_number: i16,
    ) -> Result<Vec<QueueItem>> {
        let mut items: Vec<QueueItem> = self
            .inner
            .lock()
            .unwrap()
            .queue
            .iter()
            .filter(|q| {
                q.run_date == run_date
                    && q.batch_number == batch_number
                    && q.status == QueueStatus::Pending
            })
            .cloned()
            .collect();
        items.sort_by_key(|q| q.priority);
        Ok(items)
    }

    async fn mark_queue_item(
        &self,
        id: Uuid,
        status: QueueStatus,
        article_id: Option<Uuid>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(item) = inner.queue.iter_mut().find(|q| q.id == id) {
            item.status = status;
            item.article_id = article_id;
            item.error_message = error_message.map(str::to_string);
        }
        Ok(())
    }

    async fn requeue_stale_processing(&self, older_than_minutes: i64) -> Result<u64> {
        // created_at stands in for the last-touched timestamp here; tests
        // backdate it with age_queue_item.
        let cutoff = Utc::now() - Duration::minutes(older_than_minutes);
        let mut inner = self.inner.lock().unwrap();
        let mut requeued = 0;
        for item in inner
            .queue
            .iter_mut()
            .filter(|q| q.status == QueueStatus::Processing && q.created_at < cutoff)
        {
            item.status = QueueStatus::Pending;
            requeued += 1;
        }
        Ok(requeued)
    }

    // --- Nightly runs ---

    async fn create_nightly_run(
        &self,
        run_date: NaiveDate,
        batch_number: i16,
    ) -> Result<NightlyRun> {
        let run = NightlyRun {
            id: Uuid::new_v4(),
            run_date,
            batch_number,
            status: NightlyStatus::Running,
            counts: NightlyCounts::default(),
            details: serde_json::json!({}),
            started_at: Utc::now(),
            completed_at: None,
        };
        self.inner.lock().unwrap().nightly_runs.push(run.clone());
        Ok(run)
    }

    async fn update_nightly_run(
        &self,
        id: Uuid,
        counts: NightlyCounts,
        details: serde_json::Value,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(run) = inner.nightly_runs.iter_mut().find(|r| r.id == id) {
            run.counts = counts;
            run.details = details;
        }
        Ok(())
    }

    async fn finish_nightly_run(
        &self,
        id: Uuid,
        status: NightlyStatus,
        counts: NightlyCounts,
        details: serde_json::Value,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(run) = inner.nightly_runs.iter_mut().find(|r| r.id == id) {
            run.status = status;
            run.counts = counts;
            run.details = details;
            run.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn latest_nightly_run(&self) -> Result<Option<NightlyRun>> {
        Ok(self.inner.lock().unwrap().nightly_runs.last().cloned())
    }

    // --- Audit ---

    async fn create_audit_run(&self) -> Result<AuditRun> {
        let run = AuditRun {
            id: Uuid::new_v4(),
            status: AuditStatus::Running,
            counts: AuditCounts::default(),
            started_at: Utc::now(),
            completed_at: None,
        };
        self.inner.lock().unwrap().audit_runs.push(run.clone());
        Ok(run)
    }

    async fn finish_audit_run(
        &self,
        id: Uuid,
        status: AuditStatus,
        counts: AuditCounts,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(run) = inner.audit_runs.iter_mut().find(|r| r.id == id) {
            run.status = status;
            run.counts = counts;
            run.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn latest_audit_run(&self) -> Result<Option<AuditRun>> {
        Ok(self.inner.lock().unwrap().audit_runs.last().cloned())
    }

    async fn insert_finding(&self, finding: &NewFinding) -> Result<AuditFinding> {
        let stored = AuditFinding {
            id: Uuid::new_v4(),
            audit_run_id: finding.audit_run_id,
            article_id: finding.article_id,
            related_article_id: finding.related_article_id,
            finding_type: finding.finding_type,
            severity: finding.severity,
            description: finding.description.clone(),
            auto_fixable: finding.auto_fixable,
            status: FindingStatus::Open,
            fix_applied: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        self.inner.lock().unwrap().findings.push(stored.clone());
        Ok(stored)
    }

    async fn get_finding(&self, id: Uuid) -> Result<Option<AuditFinding>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .findings
            .iter()
            .find(|f| f.id == id)
            .cloned())
    }

    async fn list_findings(&self, audit_run_id: Uuid) -> Result<Vec<AuditFinding>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .findings
            .iter()
            .filter(|f| f.audit_run_id == audit_run_id)
            .cloned()
            .collect())
    }

    async fn open_auto_fixable_findings(&self) -> Result<Vec<AuditFinding>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .findings
            .iter()
            .filter(|f| f.status == FindingStatus::Open && f.auto_fixable)
            .cloned()
            .collect())
    }

    async fn resolve_finding(&self, id: Uuid, fix_applied: Option<&str>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(finding) = inner.findings.iter_mut().find(|f| f.id == id) {
            finding.status = FindingStatus::Resolved;
            if let Some(fix) = fix_applied {
                finding.fix_applied = Some(fix.to_string());
            }
            finding.resolved_at = Some(Utc::now());
        }
        Ok(())
    }

    // --- Automation settings ---

    async fn get_settings(&self, kind: SettingsKind) -> Result<AutomationSettings> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .settings
            .entry(kind.to_string())
            .or_insert_with(|| AutomationSettings::defaults(kind))
            .clone())
    }

    async fn update_settings(&self, settings: &AutomationSettings) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .settings
            .insert(settings.kind.to_string(), settings.clone());
        Ok(())
    }

    async fn set_stop_requested(&self, kind: SettingsKind, requested: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .settings
            .entry(kind.to_string())
            .or_insert_with(|| AutomationSettings::defaults(kind))
            .stop_requested = requested;
        Ok(())
    }

    async fn touch_last_run(&self, kind: SettingsKind) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .settings
            .entry(kind.to_string())
            .or_insert_with(|| AutomationSettings::defaults(kind))
            .last_run_at = Some(Utc::now());
        Ok(())
    }

    async fn stop_requested(&self, kind: SettingsKind) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .settings
            .get(&kind.to_string())
            .map(|s| s.stop_requested)
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slug_conflict_surfaces_as_typed_error() {
        let store = MemoryStore::new();
        store.seed_article("Reset A Router", "reset-a-router", ArticleStatus::Published);

        let new = NewArticle {
            title: "Reset a Router".to_string(),
            slug: "reset-a-router".to_string(),
            excerpt: String::new(),
            content: String::new(),
            category_id: None,
            status: ArticleStatus::Draft,
            read_time: 4,
            tags: Vec::new(),
            seo_title: None,
            seo_description: None,
            ai_generated: true,
            sources: Vec::new(),
        };
        let err = store.insert_article(&new).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FixwiseError>(),
            Some(FixwiseError::SlugConflict)
        ));
    }

    #[tokio::test]
    async fn advance_run_rejects_backward_moves() {
        let store = MemoryStore::new();
        let run = store.create_run("fix slow wifi", RunMode::Manual).await.unwrap();

        store.advance_run(run.id, RunStatus::Writing, 4).await.unwrap();
        let err = store
            .advance_run(run.id, RunStatus::Researching, 2)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot move"));

        store.complete_run(run.id, Uuid::new_v4(), RunUsage::default()).await.unwrap();
        assert!(store
            .advance_run(run.id, RunStatus::Failed, 4)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn fetch_pending_orders_by_priority() {
        let store = MemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        store
            .enqueue(&[
                NewQueueItem {
                    run_date: date,
                    batch_number: 1,
                    topic: "b".to_string(),
                    category_id: None,
                    priority: 2,
                },
                NewQueueItem {
                    run_date: date,
                    batch_number: 1,
                    topic: "a".to_string(),
                    category_id: None,
                    priority: 1,
                },
                NewQueueItem {
                    run_date: date,
                    batch_number: 2,
                    topic: "other batch".to_string(),
                    category_id: None,
                    priority: 0,
                },
            ])
            .await
            .unwrap();

        let pending = store.fetch_pending(date, 1).await.unwrap();
        assert_eq!(
            pending.iter().map(|q| q.topic.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[tokio::test]
    async fn stale_processing_items_requeue_after_timeout() {
        let store = MemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        store
            .enqueue(&[NewQueueItem {
                run_date: date,
                batch_number: 1,
                topic: "stuck".to_string(),
                category_id: None,
                priority: 0,
            }])
            .await
            .unwrap();
        let item = store.fetch_pending(date, 1).await.unwrap().remove(0);
        store
            .mark_queue_item(item.id, QueueStatus::Processing, None, None)
            .await
            .unwrap();

        // Too fresh to sweep.
        assert_eq!(store.requeue_stale_processing(30).await.unwrap(), 0);

        store.age_queue_item(item.id, 45);
        assert_eq!(store.requeue_stale_processing(30).await.unwrap(), 1);
        assert_eq!(store.fetch_pending(date, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn settings_provisioned_with_defaults_on_first_read() {
        let store = MemoryStore::new();
        let settings = store.get_settings(SettingsKind::Nightly).await.unwrap();
        assert_eq!(settings.articles_per_run, 5);
        assert_eq!(settings.min_quality_score, 7);
        assert!(!settings.stop_requested);

        store.set_stop_requested(SettingsKind::Nightly, true).await.unwrap();
        assert!(store.stop_requested(SettingsKind::Nightly).await.unwrap());
        // Other kind unaffected.
        assert!(!store.stop_requested(SettingsKind::Adhoc).await.unwrap());
    }
}
