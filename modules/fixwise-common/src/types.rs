use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Article ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStatus {
    Draft,
    Published,
    NeedsReview,
}

impl std::fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArticleStatus::Draft => write!(f, "draft"),
            ArticleStatus::Published => write!(f, "published"),
            ArticleStatus::NeedsReview => write!(f, "needs_review"),
        }
    }
}

impl ArticleStatus {
    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "published" => Self::Published,
            "needs_review" => Self::NeedsReview,
            _ => Self::Draft,
        }
    }
}

/// One cited source attached to an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArticleSource {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    /// Markdown body.
    pub content: String,
    pub category_id: Option<Uuid>,
    pub status: ArticleStatus,
    pub featured: bool,
    /// Estimated read time in minutes.
    pub read_time: i32,
    pub tags: Vec<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub ai_generated: bool,
    pub sources: Vec<ArticleSource>,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields the pipeline supplies when inserting a freshly written article.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub content: String,
    pub category_id: Option<Uuid>,
    pub status: ArticleStatus,
    pub read_time: i32,
    pub tags: Vec<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub ai_generated: bool,
    pub sources: Vec<ArticleSource>,
}

// --- Category ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub icon: String,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

// --- Pipeline Run ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Manual,
    Batch,
    Scheduled,
    Nightly,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Manual => write!(f, "manual"),
            RunMode::Batch => write!(f, "batch"),
            RunMode::Scheduled => write!(f, "scheduled"),
            RunMode::Nightly => write!(f, "nightly"),
        }
    }
}

impl RunMode {
    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "batch" => Self::Batch,
            "scheduled" => Self::Scheduled,
            "nightly" => Self::Nightly,
            _ => Self::Manual,
        }
    }
}

/// Pipeline state machine. Working stages advance in a fixed order; terminal
/// states end the run. A run never moves backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Checking,
    Researching,
    Outlining,
    Writing,
    Verifying,
    Optimizing,
    Completed,
    Failed,
    Skipped,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Checking => write!(f, "checking"),
            RunStatus::Researching => write!(f, "researching"),
            RunStatus::Outlining => write!(f, "outlining"),
            RunStatus::Writing => write!(f, "writing"),
            RunStatus::Verifying => write!(f, "verifying"),
            RunStatus::Optimizing => write!(f, "optimizing"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Skipped => write!(f, "skipped"),
        }
    }
}

impl RunStatus {
    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "checking" => Self::Checking,
            "researching" => Self::Researching,
            "outlining" => Self::Outlining,
            "writing" => Self::Writing,
            "verifying" => Self::Verifying,
            "optimizing" => Self::Optimizing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "skipped" => Self::Skipped,
            _ => Self::Pending,
        }
    }

    /// Position in the fixed working-stage order, None for terminal states.
    pub fn stage_index(&self) -> Option<u8> {
        match self {
            RunStatus::Pending => Some(0),
            RunStatus::Checking => Some(1),
            RunStatus::Researching => Some(2),
            RunStatus::Outlining => Some(3),
            RunStatus::Writing => Some(4),
            RunStatus::Verifying => Some(5),
            RunStatus::Optimizing => Some(6),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Skipped)
    }

    /// A run may only advance to a later working stage or jump to a terminal
    /// state. Terminal states accept no further transitions.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next.stage_index() {
            Some(next_idx) => {
                // self is a working stage here, so stage_index is Some
                next_idx > self.stage_index().unwrap_or(u8::MAX)
            }
            None => true,
        }
    }
}

/// Aggregate metrics recorded on a completed run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunUsage {
    pub quality_score: Option<i32>,
    pub factual_score: Option<i32>,
    pub source_count: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub topic: String,
    pub mode: RunMode,
    pub status: RunStatus,
    pub current_step: i32,
    pub total_steps: i32,
    pub research_notes: Option<String>,
    pub research_sources: Vec<String>,
    pub generated_outline: Option<String>,
    pub article_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub usage: Option<RunUsage>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// --- Queue ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Skipped,
    Failed,
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueStatus::Pending => write!(f, "pending"),
            QueueStatus::Processing => write!(f, "processing"),
            QueueStatus::Completed => write!(f, "completed"),
            QueueStatus::Skipped => write!(f, "skipped"),
            QueueStatus::Failed => write!(f, "failed"),
        }
    }
}

impl QueueStatus {
    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "skipped" => Self::Skipped,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Skipped | QueueStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub run_date: NaiveDate,
    /// Priority tier 1-3, not an arbitrary shard.
    pub batch_number: i16,
    pub topic: String,
    pub category_id: Option<Uuid>,
    /// Lower runs sooner.
    pub priority: i32,
    pub status: QueueStatus,
    pub article_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewQueueItem {
    pub run_date: NaiveDate,
    pub batch_number: i16,
    pub topic: String,
    pub category_id: Option<Uuid>,
    pub priority: i32,
}

// --- Nightly Run ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NightlyStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

impl std::fmt::Display for NightlyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NightlyStatus::Running => write!(f, "running"),
            NightlyStatus::Completed => write!(f, "completed"),
            NightlyStatus::Failed => write!(f, "failed"),
            NightlyStatus::Stopped => write!(f, "stopped"),
        }
    }
}

impl NightlyStatus {
    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "stopped" => Self::Stopped,
            _ => Self::Running,
        }
    }
}

/// Counts aggregated over one nightly builder invocation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NightlyCounts {
    pub categories_processed: i32,
    pub categories_created: i32,
    pub topics_found: i32,
    pub topics_after_dedup: i32,
    pub articles_generated: i32,
    pub articles_published: i32,
    pub articles_failed: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NightlyRun {
    pub id: Uuid,
    pub run_date: NaiveDate,
    pub batch_number: i16,
    pub status: NightlyStatus,
    pub counts: NightlyCounts,
    /// Per-category progress map, keyed by category name.
    pub details: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// --- Audit ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditStatus::Running => write!(f, "running"),
            AuditStatus::Completed => write!(f, "completed"),
            AuditStatus::Failed => write!(f, "failed"),
        }
    }
}

impl AuditStatus {
    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Running,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    Duplicate,
    Grammar,
    Wording,
    Seo,
    Factual,
    Quality,
    Formatting,
    AutoFix,
    AutoAction,
}

impl std::fmt::Display for FindingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingType::Duplicate => write!(f, "duplicate"),
            FindingType::Grammar => write!(f, "grammar"),
            FindingType::Wording => write!(f, "wording"),
            FindingType::Seo => write!(f, "seo"),
            FindingType::Factual => write!(f, "factual"),
            FindingType::Quality => write!(f, "quality"),
            FindingType::Formatting => write!(f, "formatting"),
            FindingType::AutoFix => write!(f, "auto_fix"),
            FindingType::AutoAction => write!(f, "auto_action"),
        }
    }
}

impl FindingType {
    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "duplicate" => Self::Duplicate,
            "grammar" => Self::Grammar,
            "wording" => Self::Wording,
            "seo" => Self::Seo,
            "factual" => Self::Factual,
            "formatting" => Self::Formatting,
            "auto_fix" => Self::AutoFix,
            "auto_action" => Self::AutoAction,
            _ => Self::Quality,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

impl Severity {
    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "critical" => Self::Critical,
            "warning" => Self::Warning,
            _ => Self::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Open,
    Resolved,
}

impl std::fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingStatus::Open => write!(f, "open"),
            FindingStatus::Resolved => write!(f, "resolved"),
        }
    }
}

impl FindingStatus {
    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "resolved" => Self::Resolved,
            _ => Self::Open,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AuditCounts {
    pub articles_scanned: i32,
    pub issues_found: i32,
    pub auto_fixed: i32,
    pub duplicates_found: i32,
    pub set_to_draft: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRun {
    pub id: Uuid,
    pub status: AuditStatus,
    pub counts: AuditCounts,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditFinding {
    pub id: Uuid,
    pub audit_run_id: Uuid,
    pub article_id: Uuid,
    /// For duplicate findings: the article this one duplicates.
    pub related_article_id: Option<Uuid>,
    pub finding_type: FindingType,
    pub severity: Severity,
    pub description: String,
    pub auto_fixable: bool,
    pub status: FindingStatus,
    /// Description of the machine-applied fix, if any.
    pub fix_applied: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewFinding {
    pub audit_run_id: Uuid,
    pub article_id: Uuid,
    pub related_article_id: Option<Uuid>,
    pub finding_type: FindingType,
    pub severity: Severity,
    pub description: String,
    pub auto_fixable: bool,
}

// --- Automation Settings ---

/// Which automation flow a settings row governs. Two singleton rows exist:
/// one for ad-hoc batch automation, one for the nightly builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsKind {
    Adhoc,
    Nightly,
}

impl std::fmt::Display for SettingsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsKind::Adhoc => write!(f, "adhoc"),
            SettingsKind::Nightly => write!(f, "nightly"),
        }
    }
}

impl SettingsKind {
    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "nightly" => Self::Nightly,
            _ => Self::Adhoc,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationSettings {
    pub id: Uuid,
    pub kind: SettingsKind,
    /// Read by the external schedule trigger, not the engine: a disabled
    /// kind means the cron skips its call. An explicit API trigger still runs.
    pub enabled: bool,
    /// Human-readable schedule hint for the external trigger (e.g. "daily").
    pub frequency: String,
    /// Upper bound on topics attempted by one explicit batch.
    pub articles_per_run: i32,
    pub topics_per_category: i32,
    pub min_quality_score: i32,
    pub min_factual_score: i32,
    pub auto_publish: bool,
    pub allow_category_creation: bool,
    /// When set, restrict runs to these categories.
    pub target_category_ids: Option<Vec<Uuid>>,
    /// Cooperative stop flag, polled between units of work.
    pub stop_requested: bool,
    /// Stamped by the scheduler when a batch or drain finishes.
    pub last_run_at: Option<DateTime<Utc>>,
    /// Maintained by the external schedule trigger.
    pub next_run_at: Option<DateTime<Utc>>,
}

impl AutomationSettings {
    /// In-code defaults for a freshly provisioned settings row.
    pub fn defaults(kind: SettingsKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            enabled: false,
            frequency: "daily".to_string(),
            articles_per_run: 5,
            topics_per_category: 50,
            min_quality_score: 7,
            min_factual_score: 7,
            auto_publish: false,
            allow_category_creation: false,
            target_category_ids: None,
            stop_requested: false,
            last_run_at: None,
            next_run_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_forward_only() {
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Checking));
        assert!(RunStatus::Checking.can_transition_to(RunStatus::Researching));
        assert!(RunStatus::Checking.can_transition_to(RunStatus::Skipped));
        assert!(RunStatus::Writing.can_transition_to(RunStatus::Failed));

        // No regression
        assert!(!RunStatus::Writing.can_transition_to(RunStatus::Researching));
        assert!(!RunStatus::Optimizing.can_transition_to(RunStatus::Optimizing));

        // Terminal states are final
        assert!(!RunStatus::Completed.can_transition_to(RunStatus::Failed));
        assert!(!RunStatus::Skipped.can_transition_to(RunStatus::Checking));
    }

    #[test]
    fn run_status_stage_order_matches_pipeline() {
        let order = [
            RunStatus::Pending,
            RunStatus::Checking,
            RunStatus::Researching,
            RunStatus::Outlining,
            RunStatus::Writing,
            RunStatus::Verifying,
            RunStatus::Optimizing,
        ];
        for (i, status) in order.iter().enumerate() {
            assert_eq!(status.stage_index(), Some(i as u8));
            assert!(!status.is_terminal());
        }
        assert_eq!(RunStatus::Completed.stage_index(), None);
    }

    #[test]
    fn status_string_round_trips() {
        for status in [
            RunStatus::Pending,
            RunStatus::Checking,
            RunStatus::Researching,
            RunStatus::Outlining,
            RunStatus::Writing,
            RunStatus::Verifying,
            RunStatus::Optimizing,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Skipped,
        ] {
            assert_eq!(RunStatus::from_str_loose(&status.to_string()), status);
        }
        for status in [QueueStatus::Pending, QueueStatus::Processing, QueueStatus::Completed, QueueStatus::Skipped, QueueStatus::Failed] {
            assert_eq!(QueueStatus::from_str_loose(&status.to_string()), status);
        }
        for ft in [
            FindingType::Duplicate,
            FindingType::Grammar,
            FindingType::Wording,
            FindingType::Seo,
            FindingType::Factual,
            FindingType::Quality,
            FindingType::Formatting,
            FindingType::AutoFix,
            FindingType::AutoAction,
        ] {
            assert_eq!(FindingType::from_str_loose(&ft.to_string()), ft);
        }
    }

    #[test]
    fn queue_terminal_statuses() {
        assert!(!QueueStatus::Pending.is_terminal());
        assert!(!QueueStatus::Processing.is_terminal());
        assert!(QueueStatus::Completed.is_terminal());
        assert!(QueueStatus::Skipped.is_terminal());
        assert!(QueueStatus::Failed.is_terminal());
    }
}
