use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use fixwise_common::{RunMode, SettingsKind};
use fixwise_engine::{
    AskEngine, BatchScheduler, ContentAuditor, FixOutcome, NightlyBuilder, Pipeline,
    TopicDiscovery,
};
use fixwise_store::ContentStore;

use crate::auth::AdminAuth;
use crate::AppState;

pub const ASK_RATE_LIMIT_PER_HOUR: usize = 20;

fn internal_error(e: anyhow::Error) -> Response {
    error!(error = %e, "Request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": format!("{e:#}")}))).into_response()
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"}))).into_response()
}

fn parse_kind(raw: &str) -> Option<SettingsKind> {
    match raw {
        "adhoc" => Some(SettingsKind::Adhoc),
        "nightly" => Some(SettingsKind::Nightly),
        _ => None,
    }
}

/// Sliding-window rate limit for one IP. Prunes expired entries and records
/// the request when allowed.
pub fn check_rate_limit(entries: &mut Vec<Instant>, now: Instant, max_per_hour: usize) -> bool {
    let cutoff = now - std::time::Duration::from_secs(3600);
    entries.retain(|t| *t > cutoff);
    if entries.len() >= max_per_hour {
        return false;
    }
    entries.push(now);
    true
}

// --- Pipeline ---

#[derive(Deserialize)]
pub struct GenerateRequest {
    topic: String,
    category_id: Option<Uuid>,
    mode: Option<String>,
}

/// 202 with the run id; the pipeline itself runs in the background with the
/// run row as the durable handle.
pub async fn api_generate(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<GenerateRequest>,
) -> Response {
    let topic = body.topic.trim().to_string();
    if topic.is_empty() {
        return bad_request("topic is required");
    }
    let mode = body.mode.as_deref().map(RunMode::from_str_loose).unwrap_or(RunMode::Manual);

    let pipeline = Pipeline::new(state.store.clone(), state.capability.clone(), state.pacing);
    let run = match pipeline.start(&topic, mode).await {
        Ok(run) => run,
        Err(e) => return internal_error(e),
    };

    let run_id = run.id;
    let category_id = body.category_id;
    tokio::spawn(async move {
        // resume() persists any failure onto the run row.
        let _ = pipeline.resume(run_id, &topic, category_id).await;
    });
    (StatusCode::ACCEPTED, Json(json!({"run_id": run_id}))).into_response()
}

pub async fn api_run_detail(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(id): Path<Uuid>,
) -> Response {
    match state.store.get_run(id).await {
        Ok(Some(run)) => Json(run).into_response(),
        Ok(None) => not_found(),
        Err(e) => internal_error(e),
    }
}

// --- Topic discovery ---

#[derive(Deserialize)]
pub struct DiscoverRequest {
    count: Option<u32>,
    target_categories: Option<Vec<Uuid>>,
    auto_make: Option<bool>,
}

pub async fn api_discover_topics(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<DiscoverRequest>,
) -> Response {
    let discovery = TopicDiscovery::new(state.store.clone(), state.capability.clone());
    let suggestions = match discovery
        .discover(body.count.unwrap_or(10), body.target_categories.as_deref())
        .await
    {
        Ok(suggestions) => suggestions,
        Err(e) => return internal_error(e),
    };

    let mut queued = 0;
    if body.auto_make.unwrap_or(false) && !suggestions.is_empty() {
        queued = match discovery.enqueue_today(&suggestions).await {
            Ok(queued) => queued,
            Err(e) => return internal_error(e),
        };
        let scheduler =
            BatchScheduler::new(state.store.clone(), state.capability.clone(), state.pacing);
        let run_date = chrono::Utc::now().date_naive();
        tokio::spawn(async move {
            if let Err(e) = scheduler.drain_queue(run_date, 1, SettingsKind::Adhoc).await {
                error!(error = %e, "Background drain failed");
            }
        });
        info!(queued, "Discovered topics queued for generation");
    }
    Json(json!({"suggestions": suggestions, "queued": queued})).into_response()
}

// --- Audit ---

#[derive(Deserialize)]
pub struct AuditRequest {
    auto_fix: Option<bool>,
}

pub async fn api_audit(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<AuditRequest>,
) -> Response {
    let auditor =
        ContentAuditor::new(state.store.clone(), state.capability.clone(), state.pacing);
    let run = match auditor.start().await {
        Ok(run) => run,
        Err(e) => return internal_error(e),
    };
    let run_id = run.id;
    let auto_fix = body.auto_fix.unwrap_or(false);
    tokio::spawn(async move {
        // resume() records the failure on the audit row.
        let _ = auditor.resume(run_id, auto_fix).await;
    });
    (StatusCode::ACCEPTED, Json(json!({"audit_run_id": run_id}))).into_response()
}

pub async fn api_audit_latest(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
) -> Response {
    match state.store.latest_audit_run().await {
        Ok(Some(run)) => Json(run).into_response(),
        Ok(None) => not_found(),
        Err(e) => internal_error(e),
    }
}

pub async fn api_audit_findings(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(id): Path<Uuid>,
) -> Response {
    match state.store.list_findings(id).await {
        Ok(findings) => Json(findings).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn api_apply_fix(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(id): Path<Uuid>,
) -> Response {
    let auditor =
        ContentAuditor::new(state.store.clone(), state.capability.clone(), state.pacing);
    match auditor.apply_fix(id).await {
        Ok(FixOutcome::Applied(fix)) => {
            Json(json!({"status": "applied", "fix_applied": fix})).into_response()
        }
        Ok(FixOutcome::AlreadyResolved) => {
            Json(json!({"status": "already_resolved"})).into_response()
        }
        Err(e) => bad_request(&format!("{e:#}")),
    }
}

pub async fn api_fix_all(State(state): State<Arc<AppState>>, _auth: AdminAuth) -> Response {
    let auditor =
        ContentAuditor::new(state.store.clone(), state.capability.clone(), state.pacing);
    match auditor.fix_all().await {
        Ok(outcome) => {
            Json(json!({"fixed": outcome.fixed, "failed": outcome.failed})).into_response()
        }
        Err(e) => internal_error(e),
    }
}

// --- Nightly builder ---

#[derive(Deserialize)]
pub struct NightlyRequest {
    batch: Option<i16>,
}

pub async fn api_nightly(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<NightlyRequest>,
) -> Response {
    let batch = body.batch.unwrap_or(1);
    if !(1..=3).contains(&batch) {
        return bad_request("batch must be 1, 2, or 3");
    }
    let builder =
        NightlyBuilder::new(state.store.clone(), state.capability.clone(), state.pacing);
    let run = match builder.start(batch).await {
        Ok(run) => run,
        Err(e) => return internal_error(e),
    };
    let run_id = run.id;
    tokio::spawn(async move {
        // resume() records the failure on the nightly row.
        let _ = builder.resume(&run).await;
    });
    (StatusCode::ACCEPTED, Json(json!({"nightly_run_id": run_id}))).into_response()
}

pub async fn api_nightly_latest(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
) -> Response {
    match state.store.latest_nightly_run().await {
        Ok(Some(run)) => Json(run).into_response(),
        Ok(None) => not_found(),
        Err(e) => internal_error(e),
    }
}

// --- Automation control ---

#[derive(Deserialize)]
pub struct StopRequest {
    kind: String,
}

pub async fn api_stop(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<StopRequest>,
) -> Response {
    let Some(kind) = parse_kind(&body.kind) else {
        return bad_request("kind must be adhoc or nightly");
    };
    match state.store.set_stop_requested(kind, true).await {
        Ok(()) => {
            info!(?kind, "Stop requested");
            Json(json!({"stopped": true})).into_response()
        }
        Err(e) => internal_error(e),
    }
}

pub async fn api_get_settings(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(kind): Path<String>,
) -> Response {
    let Some(kind) = parse_kind(&kind) else {
        return bad_request("kind must be adhoc or nightly");
    };
    match state.store.get_settings(kind).await {
        Ok(settings) => Json(settings).into_response(),
        Err(e) => internal_error(e),
    }
}

/// Partial update over the current row. Read-then-write; last write wins.
#[derive(Deserialize)]
pub struct SettingsUpdate {
    enabled: Option<bool>,
    frequency: Option<String>,
    articles_per_run: Option<i32>,
    topics_per_category: Option<i32>,
    min_quality_score: Option<i32>,
    min_factual_score: Option<i32>,
    auto_publish: Option<bool>,
    allow_category_creation: Option<bool>,
    target_category_ids: Option<Vec<Uuid>>,
}

pub async fn api_put_settings(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(kind): Path<String>,
    Json(body): Json<SettingsUpdate>,
) -> Response {
    let Some(kind) = parse_kind(&kind) else {
        return bad_request("kind must be adhoc or nightly");
    };
    let mut settings = match state.store.get_settings(kind).await {
        Ok(settings) => settings,
        Err(e) => return internal_error(e),
    };
    if let Some(enabled) = body.enabled {
        settings.enabled = enabled;
    }
    if let Some(frequency) = body.frequency {
        settings.frequency = frequency;
    }
    if let Some(articles_per_run) = body.articles_per_run {
        settings.articles_per_run = articles_per_run;
    }
    if let Some(topics_per_category) = body.topics_per_category {
        settings.topics_per_category = topics_per_category;
    }
    if let Some(min_quality_score) = body.min_quality_score {
        settings.min_quality_score = min_quality_score;
    }
    if let Some(min_factual_score) = body.min_factual_score {
        settings.min_factual_score = min_factual_score;
    }
    if let Some(auto_publish) = body.auto_publish {
        settings.auto_publish = auto_publish;
    }
    if let Some(allow_category_creation) = body.allow_category_creation {
        settings.allow_category_creation = allow_category_creation;
    }
    if let Some(ids) = body.target_category_ids {
        settings.target_category_ids = if ids.is_empty() { None } else { Some(ids) };
    }
    match state.store.update_settings(&settings).await {
        Ok(()) => Json(settings).into_response(),
        Err(e) => internal_error(e),
    }
}

// --- Ask (public, rate limited) ---

#[derive(Deserialize)]
pub struct AskRequest {
    question: String,
    history: Option<Vec<String>>,
}

pub async fn api_ask(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    Json(body): Json<AskRequest>,
) -> Response {
    let question = body.question.trim().to_string();
    if question.is_empty() {
        return bad_request("question is required");
    }

    {
        let mut limiter = state.rate_limiter.lock().await;
        let entries = limiter.entry(addr.ip()).or_default();
        if !check_rate_limit(entries, Instant::now(), ASK_RATE_LIMIT_PER_HOUR) {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"error": "Rate limit exceeded"})),
            )
                .into_response();
        }
    }

    let engine = AskEngine::new(state.store.clone(), state.capability.clone());
    let history = body.history.unwrap_or_default();
    let response = match engine.ask(&question, &history).await {
        Ok(response) => response,
        Err(e) => return internal_error(e),
    };

    // A question the corpus could not answer seeds a background generation,
    // unless a similar run is already in flight.
    if response.used_articles.is_empty() {
        if let Some(topic) = response.suggested_topic.clone() {
            match engine.has_active_similar_run(&topic).await {
                Ok(true) => info!(topic, "Similar run already active, not generating"),
                Ok(false) => {
                    let pipeline =
                        Pipeline::new(state.store.clone(), state.capability.clone(), state.pacing);
                    tokio::spawn(async move {
                        match pipeline.start(&topic, RunMode::Manual).await {
                            Ok(run) => {
                                let _ = pipeline.resume(run.id, &topic, None).await;
                            }
                            Err(e) => error!(error = %e, "Could not start ask-seeded run"),
                        }
                    });
                    info!("Ask-seeded generation started");
                }
                Err(e) => error!(error = %e, "Active-run check failed"),
            }
        }
    }
    Json(response).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn rate_limit_window_slides() {
        let now = Instant::now();
        let mut entries = Vec::new();
        for _ in 0..ASK_RATE_LIMIT_PER_HOUR {
            assert!(check_rate_limit(&mut entries, now, ASK_RATE_LIMIT_PER_HOUR));
        }
        assert!(!check_rate_limit(&mut entries, now, ASK_RATE_LIMIT_PER_HOUR));

        // An hour later the window is clear again.
        let later = now + Duration::from_secs(3601);
        assert!(check_rate_limit(&mut entries, later, ASK_RATE_LIMIT_PER_HOUR));
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn kind_parsing_is_strict() {
        assert_eq!(parse_kind("adhoc"), Some(SettingsKind::Adhoc));
        assert_eq!(parse_kind("nightly"), Some(SettingsKind::Nightly));
        assert_eq!(parse_kind("Nightly"), None);
        assert_eq!(parse_kind(""), None);
    }
}
