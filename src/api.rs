//! Observability HTTP surface (§6).
//!
//! Everything here is read-only except `/api/config/reload`. The
//! log-viewer endpoints (`GET /api/logs`, `GET /api/logs/domains`) are an
//! external collaborator and are intentionally not implemented here.

use crate::supervisor::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

pub async fn health(State(state): State<AppState>) -> Response {
    if state.publisher.is_connected().await {
        StatusCode::OK.into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    domain: Option<String>,
    #[serde(rename = "type", default = "default_type")]
    kind: String,
}

fn default_type() -> String {
    "all".to_string()
}

pub async fn events(State(state): State<AppState>, Query(q): Query<EventsQuery>) -> Response {
    let domain = q.domain.as_deref();
    let body = match q.kind.as_str() {
        "successful" => serde_json::json!({ "successful": state.outcomes.successes(domain) }),
        "failed" => serde_json::json!({ "failed": state.outcomes.failures(domain) }),
        _ => serde_json::json!({
            "successful": state.outcomes.successes(domain),
            "failed": state.outcomes.failures(domain),
        }),
    };
    Json(body).into_response()
}

pub async fn stats(State(state): State<AppState>) -> Response {
    Json(state.outcomes.stats()).into_response()
}

#[derive(Debug, Deserialize)]
pub struct StreamMessagesQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn stream_messages(State(state): State<AppState>, Query(q): Query<StreamMessagesQuery>) -> Response {
    match state.provider.history(Some(&state.subject_pattern), q.limit).await {
        Ok(events) => Json(serde_json::json!({ "messages": events })).into_response(),
        Err(e) => {
            tracing::error!("failed to tail stream: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to read stream").into_response()
        }
    }
}

pub async fn config_snapshot(State(state): State<AppState>) -> Response {
    Json(state.routes.snapshot()).into_response()
}

pub async fn config_domains(State(state): State<AppState>) -> Response {
    let domains: Vec<String> = state.routes.snapshot().into_keys().collect();
    Json(serde_json::json!({ "domains": domains })).into_response()
}

pub async fn config_reload(State(state): State<AppState>) -> Response {
    match state.watcher.reload_now().await {
        Ok(count) => Json(serde_json::json!({ "routes": count })).into_response(),
        Err(e) => (e.status_code(), e.to_string()).into_response(),
    }
}
