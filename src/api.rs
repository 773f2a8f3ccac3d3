// src/api.rs
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use shuttle_axum::axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::digest::feeds::default_feeds;
use crate::digest::DigestService;
use crate::error::SummarizeError;
use crate::scheduler::Refresher;

#[derive(Clone)]
pub struct AppState {
    pub refresher: Refresher,
    pub digest: Arc<DigestService>,
    pub model: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/snapshot", get(snapshot))
        .route("/refresh", post(refresh))
        .route("/digest", get(digest))
        .route("/api/news/daily-brief", get(digest))
        .route("/api/brief", post(brief))
        .route("/api/osint/sources", get(sources))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "model": state.model,
        "provider": state.digest.provider_name(),
        "has_openai_key": state.digest.credentialed(),
    }))
}

async fn snapshot(State(state): State<AppState>) -> Json<Value> {
    let snap = state.refresher.snapshot();
    Json(serde_json::to_value(snap.as_ref()).unwrap_or(Value::Null))
}

async fn refresh(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    state.refresher.trigger();
    (StatusCode::ACCEPTED, Json(json!({ "ok": true, "queued": true })))
}

/// Feeds the digest reads from, one entry per desk.
async fn sources() -> Json<Value> {
    let sources: Vec<Value> = default_feeds()
        .into_iter()
        .map(|f| {
            json!({
                "id": f.source.to_lowercase().replace(' ', "-"),
                "label": f.source,
                "url": f.url,
                "type": "news",
            })
        })
        .collect();
    Json(json!({ "ok": true, "sources": sources }))
}

#[derive(Debug, Default, Deserialize)]
struct DigestQuery {
    #[serde(default)]
    force: Option<String>,
}

fn is_forced(raw: Option<&str>) -> bool {
    matches!(raw.map(str::trim), Some("1") | Some("true"))
}

async fn digest(State(state): State<AppState>, Query(q): Query<DigestQuery>) -> Response {
    match state.digest.get_digest(is_forced(q.force.as_deref())).await {
        Ok(data) => Json(json!({ "ok": true, "data": data })).into_response(),
        Err(e) => {
            warn!(target: "digest", error = %e, "daily brief failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": "daily_news_failed", "detail": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct BriefReq {
    #[serde(default)]
    text: String,
    #[serde(default)]
    scope: Option<String>,
}

async fn brief(State(state): State<AppState>, Json(req): Json<BriefReq>) -> Response {
    let text = req.text.trim();
    if text.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": "text_required" })),
        )
            .into_response();
    }
    let scope = req.scope.as_deref().unwrap_or("general");
    match state.digest.brief(text, scope).await {
        Ok(data) => Json(json!({ "ok": true, "data": data })).into_response(),
        Err(SummarizeError::NoCredentials) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "ok": false, "error": "OPENAI_API_KEY not configured" })),
        )
            .into_response(),
        Err(e) => {
            warn!(target: "digest", error = %e, "ad-hoc brief failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": "brief_failed", "detail": e.to_string() })),
            )
                .into_response()
        }
    }
}
