// The one persistence seam. Every orchestrator talks to the store through
// this trait; PgStore is the production implementation and MemoryStore backs
// deterministic tests: no network, no database, no Docker.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use fixwise_common::{
    Article, ArticleStatus, AuditCounts, AuditFinding, AuditRun, AuditStatus, AutomationSettings,
    Category, NewArticle, NewFinding, NewQueueItem, NightlyCounts, NightlyRun, NightlyStatus,
    PipelineRun, QueueItem, QueueStatus, RunMode, RunStatus, RunUsage, SettingsKind,
};

#[async_trait]
pub trait ContentStore: Send + Sync {
    // --- Categories ---

    async fn list_categories(&self) -> Result<Vec<Category>>;

    async fn insert_category(
        &self,
        name: &str,
        slug: &str,
        description: &str,
        icon: &str,
        sort_order: i32,
    ) -> Result<Category>;

    // --- Articles ---

    async fn list_articles(&self) -> Result<Vec<Article>>;

    /// Titles only; the duplicate checks run against these constantly.
    async fn list_article_titles(&self) -> Result<Vec<String>>;

    async fn get_article(&self, id: Uuid) -> Result<Option<Article>>;

    /// Insert a pipeline-written article. A slug uniqueness violation maps to
    /// `FixwiseError::SlugConflict` so the engine can retry with a suffix.
    async fn insert_article(&self, article: &NewArticle) -> Result<Article>;

    async fn update_article_status(&self, id: Uuid, status: ArticleStatus) -> Result<()>;

    /// Apply audit fixes. Only fields passed as `Some` are written.
    async fn update_article_text(
        &self,
        id: Uuid,
        title: Option<&str>,
        excerpt: Option<&str>,
        content: Option<&str>,
    ) -> Result<()>;

    /// Case-insensitive keyword search over title and content.
    async fn search_articles(&self, query: &str, limit: u32) -> Result<Vec<Article>>;

    // --- Pipeline runs ---

    async fn create_run(&self, topic: &str, mode: RunMode) -> Result<PipelineRun>;

    /// Move a run to `status`. Rejects backward transitions with a
    /// `FixwiseError::Validation` — the state machine only moves forward.
    async fn advance_run(&self, id: Uuid, status: RunStatus, current_step: i32) -> Result<()>;

    async fn set_run_research(&self, id: Uuid, notes: &str, sources: &[String]) -> Result<()>;

    async fn set_run_outline(&self, id: Uuid, outline: &str) -> Result<()>;

    async fn complete_run(&self, id: Uuid, article_id: Uuid, usage: RunUsage) -> Result<()>;

    async fn fail_run(&self, id: Uuid, error: &str) -> Result<()>;

    async fn skip_run(&self, id: Uuid, reason: &str) -> Result<()>;

    async fn get_run(&self, id: Uuid) -> Result<Option<PipelineRun>>;

    /// Runs not yet in a terminal state, newest first.
    async fn list_active_runs(&self) -> Result<Vec<PipelineRun>>;

    // --- Queue ---

    async fn enqueue(&self, items: &[NewQueueItem]) -> Result<u64>;

    /// Pending items for one (run_date, batch_number), priority ascending.
    async fn fetch_pending(&self, run_date: NaiveDate, batch_number: i16)
        -> Result<Vec<QueueItem>>;

    async fn mark_queue_item(
        &self,
        id: Uuid,
        status: QueueStatus,
        article_id: Option<Uuid>,
        error_message: Option<&str>,
    ) -> Result<()>;

    /// Crash-safe leasing: items stuck in `processing` longer than
    /// `older_than_minutes` go back to `pending`. Returns how many.
    async fn requeue_stale_processing(&self, older_than_minutes: i64) -> Result<u64>;

    // --- Nightly runs ---

    async fn create_nightly_run(&self, run_date: NaiveDate, batch_number: i16)
        -> Result<NightlyRun>;

    /// Progress write mid-run; counts and details replace the stored values.
    async fn update_nightly_run(
        &self,
        id: Uuid,
        counts: NightlyCounts,
        details: serde_json::Value,
    ) -> Result<()>;

    async fn finish_nightly_run(
        &self,
        id: Uuid,
        status: NightlyStatus,
        counts: NightlyCounts,
        details: serde_json::Value,
    ) -> Result<()>;

    async fn latest_nightly_run(&self) -> Result<Option<NightlyRun>>;

    // --- Audit ---

    async fn create_audit_run(&self) -> Result<AuditRun>;

    async fn finish_audit_run(&self, id: Uuid, status: AuditStatus, counts: AuditCounts)
        -> Result<()>;

    async fn latest_audit_run(&self) -> Result<Option<AuditRun>>;

    async fn insert_finding(&self, finding: &NewFinding) -> Result<AuditFinding>;

    async fn get_finding(&self, id: Uuid) -> Result<Option<AuditFinding>>;

    async fn list_findings(&self, audit_run_id: Uuid) -> Result<Vec<AuditFinding>>;

    /// Open auto-fixable findings across all audit runs (fix-all surface).
    async fn open_auto_fixable_findings(&self) -> Result<Vec<AuditFinding>>;

    async fn resolve_finding(&self, id: Uuid, fix_applied: Option<&str>) -> Result<()>;

    // --- Automation settings ---

    /// Read the singleton settings row for `kind`, provisioning defaults on
    /// first access.
    async fn get_settings(&self, kind: SettingsKind) -> Result<AutomationSettings>;

    /// Full-row write. No optimistic concurrency: last write wins.
    async fn update_settings(&self, settings: &AutomationSettings) -> Result<()>;

    async fn set_stop_requested(&self, kind: SettingsKind, requested: bool) -> Result<()>;

    async fn stop_requested(&self, kind: SettingsKind) -> Result<bool>;

    /// Stamp `last_run_at = now` on the settings row for `kind`.
    async fn touch_last_run(&self, kind: SettingsKind) -> Result<()>;
}
