use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use fixwise_common::{
    Article, ArticleStatus, AuditCounts, AuditFinding, AuditRun, AuditStatus, AutomationSettings,
    Category, FindingStatus, FindingType, FixwiseError, NewArticle, NewFinding, NewQueueItem,
    NightlyCounts, NightlyRun, NightlyStatus, PipelineRun, QueueItem, QueueStatus, RunMode,
    RunStatus, RunUsage, Severity, SettingsKind,
};

use crate::traits::ContentStore;

const ARTICLE_COLUMNS: &str = "id, title, slug, excerpt, content, category_id, status, featured, \
     read_time, tags, seo_title, seo_description, ai_generated, sources, view_count, \
     created_at, updated_at";

const RUN_COLUMNS: &str = "id, topic, mode, status, current_step, total_steps, research_notes, \
     research_sources, generated_outline, article_id, error_message, usage, started_at, \
     completed_at";

const QUEUE_COLUMNS: &str =
    "id, run_date, batch_number, topic, category_id, priority, status, article_id, \
     error_message, created_at";

const NIGHTLY_COLUMNS: &str = "id, run_date, batch_number, status, categories_processed, \
     categories_created, topics_found, topics_after_dedup, articles_generated, \
     articles_published, articles_failed, details, started_at, completed_at";

const FINDING_COLUMNS: &str = "id, audit_run_id, article_id, related_article_id, finding_type, \
     severity, description, auto_fixable, status, fix_applied, created_at, resolved_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and run pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to Postgres")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;
        tracing::info!("Database connected and migrated");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ContentStore for PgStore {
    // --- Categories ---

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query(
            "SELECT id, name, slug, description, icon, sort_order, created_at
             FROM categories ORDER BY sort_order, name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_category).collect())
    }

    async fn insert_category(
        &self,
        name: &str,
        slug: &str,
        description: &str,
        icon: &str,
        sort_order: i32,
    ) -> Result<Category> {
        let row = sqlx::query(
            "INSERT INTO categories (id, name, slug, description, icon, sort_order)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, name, slug, description, icon, sort_order, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(slug)
        .bind(description)
        .bind(icon)
        .bind(sort_order)
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_category(row))
    }

    // --- Articles ---

    async fn list_articles(&self) -> Result<Vec<Article>> {
        let rows = sqlx::query(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_article).collect())
    }

    async fn list_article_titles(&self) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>("SELECT title FROM articles")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn get_article(&self, id: Uuid) -> Result<Option<Article>> {
        let row = sqlx::query(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_article))
    }

    async fn insert_article(&self, article: &NewArticle) -> Result<Article> {
        let result = sqlx::query(&format!(
            "INSERT INTO articles (id, title, slug, excerpt, content, category_id, status,
                                   read_time, tags, seo_title, seo_description, ai_generated,
                                   sources)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             RETURNING {ARTICLE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&article.title)
        .bind(&article.slug)
        .bind(&article.excerpt)
        .bind(&article.content)
        .bind(article.category_id)
        .bind(article.status.to_string())
        .bind(article.read_time)
        .bind(&article.tags)
        .bind(&article.seo_title)
        .bind(&article.seo_description)
        .bind(article.ai_generated)
        .bind(serde_json::to_value(&article.sources).unwrap_or_default())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row_to_article(row)),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23505") => {
                Err(FixwiseError::SlugConflict.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_article_status(&self, id: Uuid, status: ArticleStatus) -> Result<()> {
        sqlx::query("UPDATE articles SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_article_text(
        &self,
        id: Uuid,
        title: Option<&str>,
        excerpt: Option<&str>,
        content: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE articles
             SET title   = COALESCE($2, title),
                 excerpt = COALESCE($3, excerpt),
                 content = COALESCE($4, content),
                 updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(title)
        .bind(excerpt)
        .bind(content)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn search_articles(&self, query: &str, limit: u32) -> Result<Vec<Article>> {
        let limit = limit.min(20) as i64;
        let pattern = format!("%{}%", query.replace('%', "").replace('_', ""));

        let rows = sqlx::query(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles
             WHERE status = 'published' AND (title ILIKE $1 OR content ILIKE $1)
             ORDER BY view_count DESC
             LIMIT $2"
        ))
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_article).collect())
    }

    // --- Pipeline runs ---

    async fn create_run(&self, topic: &str, mode: RunMode) -> Result<PipelineRun> {
        let row = sqlx::query(&format!(
            "INSERT INTO pipeline_runs (id, topic, mode)
             VALUES ($1, $2, $3)
             RETURNING {RUN_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(topic)
        .bind(mode.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_run(row))
    }

    async fn advance_run(&self, id: Uuid, status: RunStatus, current_step: i32) -> Result<()> {
        let current: Option<(String,)> =
            sqlx::query_as("SELECT status FROM pipeline_runs WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        let current = current
            .map(|r| RunStatus::from_str_loose(&r.0))
            .ok_or_else(|| FixwiseError::Validation(format!("No run {id}")))?;

        if !current.can_transition_to(status) {
            return Err(FixwiseError::Validation(format!(
                "Run {id} cannot move {current} -> {status}"
            ))
            .into());
        }

        sqlx::query("UPDATE pipeline_runs SET status = $2, current_step = $3 WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .bind(current_step)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_run_research(&self, id: Uuid, notes: &str, sources: &[String]) -> Result<()> {
        sqlx::query(
            "UPDATE pipeline_runs SET research_notes = $2, research_sources = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(notes)
        .bind(serde_json::to_value(sources).unwrap_or_default())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_run_outline(&self, id: Uuid, outline: &str) -> Result<()> {
        sqlx::query("UPDATE pipeline_runs SET generated_outline = $2 WHERE id = $1")
            .bind(id)
            .bind(outline)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn complete_run(&self, id: Uuid, article_id: Uuid, usage: RunUsage) -> Result<()> {
        sqlx::query(
            "UPDATE pipeline_runs
             SET status = 'completed', article_id = $2, usage = $3,
                 current_step = total_steps, completed_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(article_id)
        .bind(serde_json::to_value(usage).unwrap_or_default())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_run(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE pipeline_runs
             SET status = 'failed', error_message = $2, completed_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn skip_run(&self, id: Uuid, reason: &str) -> Result<()> {
        sqlx::query(
            "UPDATE pipeline_runs
             SET status = 'skipped', error_message = $2, completed_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> Result<Option<PipelineRun>> {
        let row = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM pipeline_runs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_run))
    }

    async fn list_active_runs(&self) -> Result<Vec<PipelineRun>> {
        let rows = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM pipeline_runs
             WHERE status NOT IN ('completed', 'failed', 'skipped')
             ORDER BY started_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_run).collect())
    }

    // --- Queue ---

    async fn enqueue(&self, items: &[NewQueueItem]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for item in items {
            sqlx::query(
                "INSERT INTO queue_items (id, run_date, batch_number, topic, category_id, priority)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(Uuid::new_v4())
            .bind(item.run_date)
            .bind(item.batch_number)
            .bind(&item.topic)
            .bind(item.category_id)
            .bind(item.priority)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(items.len() as u64)
    }

    async fn fetch_pending(
        &self,
        run_date: NaiveDate,
        batch_number: i16,
    ) -> Result<Vec<QueueItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {QUEUE_COLUMNS} FROM queue_items
             WHERE run_date = $1 AND batch_number = $2 AND status = 'pending'
             ORDER BY priority"
        ))
        .bind(run_date)
        .bind(batch_number)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_queue_item).collect())
    }

    async fn mark_queue_item(
        &self,
        id: Uuid,
        status: QueueStatus,
        article_id: Option<Uuid>,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE queue_items
             SET status = $2, article_id = $3, error_message = $4, updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.to_string())
        .bind(article_id)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn requeue_stale_processing(&self, older_than_minutes: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE queue_items
             SET status = 'pending', updated_at = now()
             WHERE status = 'processing'
               AND updated_at < now() - make_interval(mins => $1::int)",
        )
        .bind(older_than_minutes)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // --- Nightly runs ---

    async fn create_nightly_run(
        &self,
        run_date: NaiveDate,
        batch_number: i16,
    ) -> Result<NightlyRun> {
        let row = sqlx::query(&format!(
            "INSERT INTO nightly_runs (id, run_date, batch_number)
             VALUES ($1, $2, $3)
             RETURNING {NIGHTLY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(run_date)
        .bind(batch_number)
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_nightly_run(row))
    }

    async fn update_nightly_run(
        &self,
        id: Uuid,
        counts: NightlyCounts,
        details: serde_json::Value,
    ) -> Result<()> {
        write_nightly(&self.pool, id, None, counts, details).await
    }

    async fn finish_nightly_run(
        &self,
        id: Uuid,
        status: NightlyStatus,
        counts: NightlyCounts,
        details: serde_json::Value,
    ) -> Result<()> {
        write_nightly(&self.pool, id, Some(status), counts, details).await
    }

    async fn latest_nightly_run(&self) -> Result<Option<NightlyRun>> {
        let row = sqlx::query(&format!(
            "SELECT {NIGHTLY_COLUMNS} FROM nightly_runs ORDER BY started_at DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_nightly_run))
    }

    // --- Audit ---

    async fn create_audit_run(&self) -> Result<AuditRun> {
        let row = sqlx::query(
            "INSERT INTO audit_runs (id) VALUES ($1)
             RETURNING id, status, articles_scanned, issues_found, auto_fixed,
                       duplicates_found, set_to_draft, started_at, completed_at",
        )
        .bind(Uuid::new_v4())
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_audit_run(row))
    }

    async fn finish_audit_run(
        &self,
        id: Uuid,
        status: AuditStatus,
        counts: AuditCounts,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE audit_runs
             SET status = $2, articles_scanned = $3, issues_found = $4, auto_fixed = $5,
                 duplicates_found = $6, set_to_draft = $7, completed_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(status.to_string())
        .bind(counts.articles_scanned)
        .bind(counts.issues_found)
        .bind(counts.auto_fixed)
        .bind(counts.duplicates_found)
        .bind(counts.set_to_draft)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_audit_run(&self) -> Result<Option<AuditRun>> {
        let row = sqlx::query(
            "SELECT id, status, articles_scanned, issues_found, auto_fixed, duplicates_found,
                    set_to_draft, started_at, completed_at
             FROM audit_runs ORDER BY started_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_audit_run))
    }

    async fn insert_finding(&self, finding: &NewFinding) -> Result<AuditFinding> {
        let row = sqlx::query(&format!(
            "INSERT INTO audit_findings (id, audit_run_id, article_id, related_article_id,
                                         finding_type, severity, description, auto_fixable)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {FINDING_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(finding.audit_run_id)
        .bind(finding.article_id)
        .bind(finding.related_article_id)
        .bind(finding.finding_type.to_string())
        .bind(finding.severity.to_string())
        .bind(&finding.description)
        .bind(finding.auto_fixable)
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_finding(row))
    }

    async fn get_finding(&self, id: Uuid) -> Result<Option<AuditFinding>> {
        let row = sqlx::query(&format!(
            "SELECT {FINDING_COLUMNS} FROM audit_findings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_finding))
    }

    async fn list_findings(&self, audit_run_id: Uuid) -> Result<Vec<AuditFinding>> {
        let rows = sqlx::query(&format!(
            "SELECT {FINDING_COLUMNS} FROM audit_findings
             WHERE audit_run_id = $1 ORDER BY created_at"
        ))
        .bind(audit_run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_finding).collect())
    }

    async fn open_auto_fixable_findings(&self) -> Result<Vec<AuditFinding>> {
        let rows = sqlx::query(&format!(
            "SELECT {FINDING_COLUMNS} FROM audit_findings
             WHERE status = 'open' AND auto_fixable ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_finding).collect())
    }

    async fn resolve_finding(&self, id: Uuid, fix_applied: Option<&str>) -> Result<()> {
        sqlx::query(
            "UPDATE audit_findings
             SET status = 'resolved', fix_applied = COALESCE($2, fix_applied),
                 resolved_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(fix_applied)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // --- Automation settings ---

    async fn get_settings(&self, kind: SettingsKind) -> Result<AutomationSettings> {
        let defaults = AutomationSettings::defaults(kind);
        sqlx::query(
            "INSERT INTO automation_settings (id, kind) VALUES ($1, $2)
             ON CONFLICT (kind) DO NOTHING",
        )
        .bind(defaults.id)
        .bind(kind.to_string())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT id, kind, enabled, frequency, articles_per_run, topics_per_category,
                    min_quality_score, min_factual_score, auto_publish,
                    allow_category_creation, target_category_ids, stop_requested,
                    last_run_at, next_run_at
             FROM automation_settings WHERE kind = $1",
        )
        .bind(kind.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_settings(row))
    }

    async fn update_settings(&self, settings: &AutomationSettings) -> Result<()> {
        sqlx::query(
            "UPDATE automation_settings
             SET enabled = $2, frequency = $3, articles_per_run = $4,
                 topics_per_category = $5, min_quality_score = $6, min_factual_score = $7,
                 auto_publish = $8, allow_category_creation = $9, target_category_ids = $10,
                 stop_requested = $11, last_run_at = $12, next_run_at = $13
             WHERE kind = $1",
        )
        .bind(settings.kind.to_string())
        .bind(settings.enabled)
        .bind(&settings.frequency)
        .bind(settings.articles_per_run)
        .bind(settings.topics_per_category)
        .bind(settings.min_quality_score)
        .bind(settings.min_factual_score)
        .bind(settings.auto_publish)
        .bind(settings.allow_category_creation)
        .bind(&settings.target_category_ids)
        .bind(settings.stop_requested)
        .bind(settings.last_run_at)
        .bind(settings.next_run_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_stop_requested(&self, kind: SettingsKind, requested: bool) -> Result<()> {
        sqlx::query("UPDATE automation_settings SET stop_requested = $2 WHERE kind = $1")
            .bind(kind.to_string())
            .bind(requested)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn stop_requested(&self, kind: SettingsKind) -> Result<bool> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT stop_requested FROM automation_settings WHERE kind = $1")
                .bind(kind.to_string())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0).unwrap_or(false))
    }

    async fn touch_last_run(&self, kind: SettingsKind) -> Result<()> {
        sqlx::query("UPDATE automation_settings SET last_run_at = now() WHERE kind = $1")
            .bind(kind.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn write_nightly(
    pool: &PgPool,
    id: Uuid,
    status: Option<NightlyStatus>,
    counts: NightlyCounts,
    details: serde_json::Value,
) -> Result<()> {
    sqlx::query(
        "UPDATE nightly_runs
         SET status = COALESCE($2, status),
             categories_processed = $3, categories_created = $4, topics_found = $5,
             topics_after_dedup = $6, articles_generated = $7, articles_published = $8,
             articles_failed = $9, details = $10,
             completed_at = CASE WHEN $2 IS NULL THEN completed_at ELSE now() END
         WHERE id = $1",
    )
    .bind(id)
    .bind(status.map(|s| s.to_string()))
    .bind(counts.categories_processed)
    .bind(counts.categories_created)
    .bind(counts.topics_found)
    .bind(counts.topics_after_dedup)
    .bind(counts.articles_generated)
    .bind(counts.articles_published)
    .bind(counts.articles_failed)
    .bind(details)
    .execute(pool)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Row mappers
// ---------------------------------------------------------------------------

fn row_to_category(r: PgRow) -> Category {
    Category {
        id: r.get("id"),
        name: r.get("name"),
        slug: r.get("slug"),
        description: r.get("description"),
        icon: r.get("icon"),
        sort_order: r.get("sort_order"),
        created_at: r.get("created_at"),
    }
}

fn row_to_article(r: PgRow) -> Article {
    let status: String = r.get("status");
    let sources: serde_json::Value = r.get("sources");
    Article {
        id: r.get("id"),
        title: r.get("title"),
        slug: r.get("slug"),
        excerpt: r.get("excerpt"),
        content: r.get("content"),
        category_id: r.get("category_id"),
        status: ArticleStatus::from_str_loose(&status),
        featured: r.get("featured"),
        read_time: r.get("read_time"),
        tags: r.get("tags"),
        seo_title: r.get("seo_title"),
        seo_description: r.get("seo_description"),
        ai_generated: r.get("ai_generated"),
        sources: serde_json::from_value(sources).unwrap_or_default(),
        view_count: r.get("view_count"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

fn row_to_run(r: PgRow) -> PipelineRun {
    let mode: String = r.get("mode");
    let status: String = r.get("status");
    let sources: serde_json::Value = r.get("research_sources");
    let usage: Option<serde_json::Value> = r.get("usage");
    PipelineRun {
        id: r.get("id"),
        topic: r.get("topic"),
        mode: RunMode::from_str_loose(&mode),
        status: RunStatus::from_str_loose(&status),
        current_step: r.get("current_step"),
        total_steps: r.get("total_steps"),
        research_notes: r.get("research_notes"),
        research_sources: serde_json::from_value(sources).unwrap_or_default(),
        generated_outline: r.get("generated_outline"),
        article_id: r.get("article_id"),
        error_message: r.get("error_message"),
        usage: usage.and_then(|v| serde_json::from_value(v).ok()),
        started_at: r.get("started_at"),
        completed_at: r.get("completed_at"),
    }
}

fn row_to_queue_item(r: PgRow) -> QueueItem {
    let status: String = r.get("status");
    QueueItem {
        id: r.get("id"),
        run_date: r.get("run_date"),
        batch_number: r.get("batch_number"),
        topic: r.get("topic"),
        category_id: r.get("category_id"),
        priority: r.get("priority"),
        status: QueueStatus::from_str_loose(&status),
        article_id: r.get("article_id"),
        error_message: r.get("error_message"),
        created_at: r.get("created_at"),
    }
}

fn row_to_nightly_run(r: PgRow) -> NightlyRun {
    let status: String = r.get("status");
    NightlyRun {
        id: r.get("id"),
        run_date: r.get("run_date"),
        batch_number: r.get("batch_number"),
        status: NightlyStatus::from_str_loose(&status),
        counts: NightlyCounts {
            categories_processed: r.get("categories_processed"),
            categories_created: r.get("categories_created"),
            topics_found: r.get("topics_found"),
            topics_after_dedup: r.get("topics_after_dedup"),
            articles_generated: r.get("articles_generated"),
            articles_published: r.get("articles_published"),
            articles_failed: r.get("articles_failed"),
        },
        details: r.get("details"),
        started_at: r.get("started_at"),
        completed_at: r.get("completed_at"),
    }
}

fn row_to_audit_run(r: PgRow) -> AuditRun {
    let status: String = r.get("status");
    AuditRun {
        id: r.get("id"),
        status: AuditStatus::from_str_loose(&status),
        counts: AuditCounts {
            articles_scanned: r.get("articles_scanned"),
            issues_found: r.get("issues_found"),
            auto_fixed: r.get("auto_fixed"),
            duplicates_found: r.get("duplicates_found"),
            set_to_draft: r.get("set_to_draft"),
        },
        started_at: r.get("started_at"),
        completed_at: r.get("completed_at"),
    }
}

fn row_to_finding(r: PgRow) -> AuditFinding {
    let finding_type: String = r.get("finding_type");
    let severity: String = r.get("severity");
    let status: String = r.get("status");
    AuditFinding {
        id: r.get("id"),
        audit_run_id: r.get("audit_run_id"),
        article_id: r.get("article_id"),
        related_article_id: r.get("related_article_id"),
        finding_type: FindingType::from_str_loose(&finding_type),
        severity: Severity::from_str_loose(&severity),
        description: r.get("description"),
        auto_fixable: r.get("auto_fixable"),
        status: FindingStatus::from_str_loose(&status),
        fix_applied: r.get("fix_applied"),
        created_at: r.get("created_at"),
        resolved_at: r.get("resolved_at"),
    }
}

fn row_to_settings(r: PgRow) -> AutomationSettings {
    let kind: String = r.get("kind");
    AutomationSettings {
        id: r.get("id"),
        kind: SettingsKind::from_str_loose(&kind),
        enabled: r.get("enabled"),
        frequency: r.get("frequency"),
        articles_per_run: r.get("articles_per_run"),
        topics_per_category: r.get("topics_per_category"),
        min_quality_score: r.get("min_quality_score"),
        min_factual_score: r.get("min_factual_score"),
        auto_publish: r.get("auto_publish"),
        allow_category_creation: r.get("allow_category_creation"),
        target_category_ids: r.get("target_category_ids"),
        stop_requested: r.get("stop_requested"),
        last_run_at: r.get("last_run_at"),
        next_run_at: r.get("next_run_at"),
    }
}
