use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::{Capability, Claude};
use fixwise_common::Config;
use fixwise_engine::Pacing;
use fixwise_store::{ContentStore, PgStore};

mod auth;
mod rest;

pub struct AppState {
    pub store: Arc<dyn ContentStore>,
    pub capability: Arc<dyn Capability>,
    pub pacing: Pacing,
    pub admin_api_token: String,
    /// Per-IP request timestamps for the public ask endpoint. In-memory, so
    /// the limit holds per instance.
    pub rate_limiter: Mutex<HashMap<IpAddr, Vec<Instant>>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("fixwise=info".parse()?))
        .init();

    let config = Config::from_env();

    let store = PgStore::connect(&config.database_url).await?;
    let claude = Claude::new(
        config.anthropic_api_key.clone(),
        config.fast_model.clone(),
        config.quality_model.clone(),
    );

    let state = Arc::new(AppState {
        store: Arc::new(store),
        capability: Arc::new(claude),
        pacing: Pacing::default(),
        admin_api_token: config.admin_api_token.clone(),
        rate_limiter: Mutex::new(HashMap::new()),
    });

    let app = Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Pipeline
        .route("/api/generate", post(rest::api_generate))
        .route("/api/runs/{id}", get(rest::api_run_detail))
        // Topic discovery
        .route("/api/topics/discover", post(rest::api_discover_topics))
        // Audit
        .route("/api/audit", post(rest::api_audit))
        .route("/api/audit/latest", get(rest::api_audit_latest))
        .route("/api/audit/{id}/findings", get(rest::api_audit_findings))
        .route("/api/findings/{id}/fix", post(rest::api_apply_fix))
        .route("/api/findings/fix-all", post(rest::api_fix_all))
        // Nightly builder
        .route("/api/nightly", post(rest::api_nightly))
        .route("/api/nightly/latest", get(rest::api_nightly_latest))
        // Automation control
        .route("/api/stop", post(rest::api_stop))
        .route(
            "/api/settings/{kind}",
            get(rest::api_get_settings).put(rest::api_put_settings),
        )
        // Public
        .route("/api/ask", post(rest::api_ask))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("Fixwise API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
