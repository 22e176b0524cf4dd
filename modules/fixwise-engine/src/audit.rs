//! Content auditor: a corpus duplicate pass, then batched issue detection,
//! with optional machine-applied fixes. Findings are the audit trail — every
//! detected issue and every automatic action lands in audit_findings.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use ai_client::{extract_as, Capability, ModelTier};
use fixwise_common::{
    Article, ArticleStatus, AuditCounts, AuditFinding, AuditRun, AuditStatus, FindingStatus,
    FindingType, NewFinding, Severity,
};
use fixwise_store::ContentStore;

use crate::dedup;
use crate::pacing::Pacing;

/// Articles per issue-detection call.
const AUDIT_BATCH_SIZE: usize = 5;

const AUDITOR_SYSTEM: &str = "You are the copy editor of a tech-help knowledge base. \
     You find concrete, fixable problems; you never invent issues.";

#[derive(Debug)]
pub enum FixOutcome {
    Applied(String),
    AlreadyResolved,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FixAllOutcome {
    pub fixed: u32,
    pub failed: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ArticleIssue {
    /// Zero-based index of the article in the presented batch.
    article_index: usize,
    finding_type: FindingType,
    severity: Severity,
    description: String,
    /// True when the fix is a pure text edit a machine may apply.
    auto_fixable: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct IssueReport {
    issues: Vec<ArticleIssue>,
}

/// Full corrected text; unchanged fields come back verbatim.
#[derive(Debug, Deserialize, JsonSchema)]
struct CorrectedArticle {
    title: String,
    excerpt: String,
    content: String,
}

pub struct ContentAuditor {
    store: Arc<dyn ContentStore>,
    capability: Arc<dyn Capability>,
    pacing: Pacing,
}

impl ContentAuditor {
    pub fn new(
        store: Arc<dyn ContentStore>,
        capability: Arc<dyn Capability>,
        pacing: Pacing,
    ) -> Self {
        Self { store, capability, pacing }
    }

    /// Create the audit_runs row; work happens in [`ContentAuditor::resume`].
    pub async fn start(&self) -> Result<AuditRun> {
        let run = self.store.create_audit_run().await?;
        info!(audit_run_id = %run.id, "Audit started");
        Ok(run)
    }

    /// Scan the corpus. Always leaves the audit_runs row terminal.
    pub async fn resume(&self, run_id: Uuid, auto_fix: bool) -> Result<()> {
        let mut counts = AuditCounts::default();
        match self.execute(run_id, auto_fix, &mut counts).await {
            Ok(()) => {
                self.store.finish_audit_run(run_id, AuditStatus::Completed, counts).await?;
                info!(audit_run_id = %run_id, ?counts, "Audit completed");
                Ok(())
            }
            Err(e) => {
                warn!(audit_run_id = %run_id, error = %e, "Audit failed");
                self.store.finish_audit_run(run_id, AuditStatus::Failed, counts).await?;
                Err(e)
            }
        }
    }

    /// Full corpus audit in one await; returns the run id.
    pub async fn run(&self, auto_fix: bool) -> Result<Uuid> {
        let run = self.start().await?;
        self.resume(run.id, auto_fix).await?;
        Ok(run.id)
    }

    async fn execute(&self, run_id: Uuid, auto_fix: bool, counts: &mut AuditCounts) -> Result<()> {
        let articles = self.store.list_articles().await?;
        counts.articles_scanned = articles.len() as i32;

        self.demote_duplicates(run_id, &articles, counts).await?;

        // Issue detection in batches. One bad batch does not sink the audit.
        let mut fixable: Vec<(Article, Vec<AuditFinding>)> = Vec::new();
        for (batch_index, batch) in articles.chunks(AUDIT_BATCH_SIZE).enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(self.pacing.audit_batch_delay).await;
            }
            let report = match self.detect_issues(batch).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(batch_index, error = %e, "Issue detection failed for batch");
                    continue;
                }
            };
            for issue in report.issues {
                let Some(article) = batch.get(issue.article_index) else {
                    warn!(index = issue.article_index, "Issue points outside its batch, dropping");
                    continue;
                };
                let finding = self
                    .store
                    .insert_finding(&NewFinding {
                        audit_run_id: run_id,
                        article_id: article.id,
                        related_article_id: None,
                        finding_type: issue.finding_type,
                        severity: issue.severity,
                        description: issue.description,
                        auto_fixable: issue.auto_fixable,
                    })
                    .await?;
                counts.issues_found += 1;
                if finding.auto_fixable {
                    match fixable.iter_mut().find(|(a, _)| a.id == article.id) {
                        Some((_, findings)) => findings.push(finding),
                        None => fixable.push((article.clone(), vec![finding])),
                    }
                }
            }
        }

        if auto_fix {
            for (article, findings) in fixable {
                match self.fix_article(run_id, &article, &findings).await {
                    Ok(()) => counts.auto_fixed += findings.len() as i32,
                    Err(e) => warn!(article_id = %article.id, error = %e, "Auto-fix failed"),
                }
            }
        }
        Ok(())
    }

    /// For each duplicate pair of published articles, the newer one goes back
    /// to draft; both the duplicate relation and the taken action become
    /// findings.
    async fn demote_duplicates(
        &self,
        run_id: Uuid,
        articles: &[Article],
        counts: &mut AuditCounts,
    ) -> Result<()> {
        for (i, j) in dedup::find_duplicate_pairs(articles) {
            let (a, b) = (&articles[i], &articles[j]);
            if a.status != ArticleStatus::Published || b.status != ArticleStatus::Published {
                continue;
            }
            let (keep, demote) = if a.created_at <= b.created_at { (a, b) } else { (b, a) };
            counts.duplicates_found += 1;

            self.store
                .insert_finding(&NewFinding {
                    audit_run_id: run_id,
                    article_id: demote.id,
                    related_article_id: Some(keep.id),
                    finding_type: FindingType::Duplicate,
                    severity: Severity::Warning,
                    description: format!("Duplicates \"{}\"", keep.title),
                    auto_fixable: false,
                })
                .await?;

            self.store.update_article_status(demote.id, ArticleStatus::Draft).await?;
            counts.set_to_draft += 1;
            let action = self
                .store
                .insert_finding(&NewFinding {
                    audit_run_id: run_id,
                    article_id: demote.id,
                    related_article_id: Some(keep.id),
                    finding_type: FindingType::AutoAction,
                    severity: Severity::Info,
                    description: format!("Set to draft as the newer duplicate of \"{}\"", keep.title),
                    auto_fixable: false,
                })
                .await?;
            self.store.resolve_finding(action.id, Some("set_to_draft")).await?;
            info!(demoted = %demote.id, kept = %keep.id, "Demoted newer duplicate");
        }
        Ok(())
    }

    async fn detect_issues(&self, batch: &[Article]) -> Result<IssueReport> {
        let listing = batch
            .iter()
            .enumerate()
            .map(|(i, a)| format!("### Article {i}: {}\n\n{}\n\n{}", a.title, a.excerpt, a.content))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");
        extract_as(
            self.capability.as_ref(),
            ModelTier::Fast,
            AUDITOR_SYSTEM,
            &format!(
                "Review these articles for grammar, wording, seo, factual, quality, and \
                 formatting problems. Report each issue with the article's index.\n\n{listing}"
            ),
        )
        .await
    }

    /// One follow-up call applying ONLY the listed findings; fields that did
    /// not change are not written.
    async fn fix_article(
        &self,
        run_id: Uuid,
        article: &Article,
        findings: &[AuditFinding],
    ) -> Result<()> {
        let corrected = self.corrected_text(article, findings).await?;
        let applied = self.apply_corrections(article, &corrected).await?;

        for finding in findings {
            self.store.resolve_finding(finding.id, Some(&applied)).await?;
        }
        let record = self
            .store
            .insert_finding(&NewFinding {
                audit_run_id: run_id,
                article_id: article.id,
                related_article_id: None,
                finding_type: FindingType::AutoFix,
                severity: Severity::Info,
                description: format!("Applied {} fix(es)", findings.len()),
                auto_fixable: false,
            })
            .await?;
        self.store.resolve_finding(record.id, Some(&applied)).await?;
        Ok(())
    }

    async fn corrected_text(
        &self,
        article: &Article,
        findings: &[AuditFinding],
    ) -> Result<CorrectedArticle> {
        let issue_list = findings
            .iter()
            .map(|f| format!("- [{}] {}", f.finding_type, f.description))
            .collect::<Vec<_>>()
            .join("\n");
        extract_as(
            self.capability.as_ref(),
            ModelTier::Fast,
            AUDITOR_SYSTEM,
            &format!(
                "Fix ONLY these issues in the article; change nothing else. Return the full \
                 corrected title, excerpt, and content.\n\nIssues:\n{issue_list}\n\n\
                 # {}\n\nExcerpt: {}\n\n{}",
                article.title, article.excerpt, article.content
            ),
        )
        .await
    }

    /// Write only the fields that actually changed; returns a short summary.
    async fn apply_corrections(
        &self,
        article: &Article,
        corrected: &CorrectedArticle,
    ) -> Result<String> {
        let title = (corrected.title != article.title).then_some(corrected.title.as_str());
        let excerpt = (corrected.excerpt != article.excerpt).then_some(corrected.excerpt.as_str());
        let content = (corrected.content != article.content).then_some(corrected.content.as_str());

        let mut changed: Vec<&str> = Vec::new();
        if title.is_some() {
            changed.push("title");
        }
        if excerpt.is_some() {
            changed.push("excerpt");
        }
        if content.is_some() {
            changed.push("content");
        }
        if changed.is_empty() {
            return Ok("no changes needed".to_string());
        }
        self.store.update_article_text(article.id, title, excerpt, content).await?;
        Ok(format!("updated {}", changed.join(", ")))
    }

    /// Apply one finding's fix. Idempotent: a resolved finding is left alone.
    pub async fn apply_fix(&self, finding_id: Uuid) -> Result<FixOutcome> {
        let finding = self
            .store
            .get_finding(finding_id)
            .await?
            .ok_or_else(|| anyhow!("No finding {finding_id}"))?;
        if finding.status == FindingStatus::Resolved {
            return Ok(FixOutcome::AlreadyResolved);
        }
        if !finding.auto_fixable {
            return Err(anyhow!("Finding {finding_id} is not auto-fixable"));
        }
        let article = self
            .store
            .get_article(finding.article_id)
            .await?
            .ok_or_else(|| anyhow!("No article {} for finding", finding.article_id))?;

        let corrected = self.corrected_text(&article, std::slice::from_ref(&finding)).await?;
        let applied = self.apply_corrections(&article, &corrected).await?;
        self.store.resolve_finding(finding.id, Some(&applied)).await?;
        Ok(FixOutcome::Applied(applied))
    }

    /// Fix every open auto-fixable finding, continuing past failures.
    pub async fn fix_all(&self) -> Result<FixAllOutcome> {
        let findings = self.store.open_auto_fixable_findings().await?;
        let mut outcome = FixAllOutcome::default();
        for finding in findings {
            match self.apply_fix(finding.id).await {
                Ok(FixOutcome::Applied(_)) => outcome.fixed += 1,
                Ok(FixOutcome::AlreadyResolved) => {}
                Err(e) => {
                    warn!(finding_id = %finding.id, error = %e, "Fix failed, continuing");
                    outcome.failed += 1;
                }
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCapability;
    use fixwise_store::MemoryStore;
    use serde_json::json;

    fn auditor(store: Arc<MemoryStore>, capability: MockCapability) -> ContentAuditor {
        ContentAuditor::new(store, Arc::new(capability), Pacing::instant())
    }

    #[tokio::test]
    async fn duplicate_pair_demotes_newer_and_records_action() {
        let store = Arc::new(MemoryStore::new());
        let older = store.seed_article(
            "Reset WiFi Password",
            "reset-wifi-password",
            ArticleStatus::Published,
        );
        let newer = store.seed_article(
            "How to Reset WiFi Password",
            "how-to-reset-wifi-password",
            ArticleStatus::Published,
        );

        // One detection batch, no issues.
        let capability = MockCapability::new().extraction(json!({"issues": []}));
        let run_id = auditor(store.clone(), capability).run(false).await.unwrap();

        let run = store.latest_audit_run().await.unwrap().unwrap();
        assert_eq!(run.status, AuditStatus::Completed);
        assert_eq!(run.counts.duplicates_found, 1);
        assert_eq!(run.counts.set_to_draft, 1);

        assert_eq!(
            store.get_article(older.id).await.unwrap().unwrap().status,
            ArticleStatus::Published
        );
        assert_eq!(
            store.get_article(newer.id).await.unwrap().unwrap().status,
            ArticleStatus::Draft
        );

        let findings = store.list_findings(run_id).await.unwrap();
        let auto_actions: Vec<_> = findings
            .iter()
            .filter(|f| f.finding_type == FindingType::AutoAction)
            .collect();
        assert_eq!(auto_actions.len(), 1);
        assert_eq!(auto_actions[0].article_id, newer.id);
        assert_eq!(auto_actions[0].related_article_id, Some(older.id));
        assert!(findings.iter().any(|f| f.finding_type == FindingType::Duplicate));
    }

    #[tokio::test]
    async fn detected_issues_become_open_findings() {
        let store = Arc::new(MemoryStore::new());
        let article =
            store.seed_article("Fix Slow WiFi", "fix-slow-wifi", ArticleStatus::Published);

        let capability = MockCapability::new().extraction(json!({"issues": [
            {"article_index": 0, "finding_type": "grammar", "severity": "warning",
             "description": "Comma splice in step 2", "auto_fixable": true},
            {"article_index": 9, "finding_type": "seo", "severity": "info",
             "description": "out of range, must be dropped", "auto_fixable": false}
        ]}));
        let run_id = auditor(store.clone(), capability).run(false).await.unwrap();

        let findings = store.list_findings(run_id).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].article_id, article.id);
        assert_eq!(findings[0].status, FindingStatus::Open);
        assert!(findings[0].auto_fixable);

        let run = store.latest_audit_run().await.unwrap().unwrap();
        assert_eq!(run.counts.issues_found, 1);
        assert_eq!(run.counts.articles_scanned, 1);
    }

    #[tokio::test]
    async fn apply_fix_updates_changed_fields_and_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let article =
            store.seed_article("Fix Slow WiFi", "fix-slow-wifi", ArticleStatus::Published);
        let finding = store
            .insert_finding(&NewFinding {
                audit_run_id: store.create_audit_run().await.unwrap().id,
                article_id: article.id,
                related_article_id: None,
                finding_type: FindingType::Grammar,
                severity: Severity::Warning,
                description: "Typo in body".to_string(),
                auto_fixable: true,
            })
            .await
            .unwrap();

        let capability = MockCapability::new().extraction(json!({
            "title": "Fix Slow WiFi",
            "excerpt": "",
            "content": "Corrected body."
        }));
        let auditor = auditor(store.clone(), capability);

        let outcome = auditor.apply_fix(finding.id).await.unwrap();
        assert!(matches!(outcome, FixOutcome::Applied(ref s) if s == "updated content"));
        let updated = store.get_article(article.id).await.unwrap().unwrap();
        assert_eq!(updated.content, "Corrected body.");
        assert_eq!(updated.title, "Fix Slow WiFi");

        // Second application: no scripted responses left, and none needed.
        let again = auditor.apply_fix(finding.id).await.unwrap();
        assert!(matches!(again, FixOutcome::AlreadyResolved));

        let resolved = store.get_finding(finding.id).await.unwrap().unwrap();
        assert_eq!(resolved.status, FindingStatus::Resolved);
        assert_eq!(resolved.fix_applied.as_deref(), Some("updated content"));
    }

    #[tokio::test]
    async fn fix_all_continues_past_failures() {
        let store = Arc::new(MemoryStore::new());
        let run_id = store.create_audit_run().await.unwrap().id;
        let a = store.seed_article("A", "a", ArticleStatus::Draft);
        let b = store.seed_article("B", "b", ArticleStatus::Draft);
        for article in [&a, &b] {
            store
                .insert_finding(&NewFinding {
                    audit_run_id: run_id,
                    article_id: article.id,
                    related_article_id: None,
                    finding_type: FindingType::Wording,
                    severity: Severity::Info,
                    description: "Awkward phrasing".to_string(),
                    auto_fixable: true,
                })
                .await
                .unwrap();
        }

        // First fix call fails, second succeeds.
        let capability = MockCapability::new()
            .extraction_err("model unavailable")
            .extraction(json!({"title": "B", "excerpt": "", "content": "Fixed body."}));
        let outcome = auditor(store.clone(), capability).fix_all().await.unwrap();

        assert_eq!(outcome, FixAllOutcome { fixed: 1, failed: 1 });
    }
}
