//! Ingress: the `POST /events` HTTP endpoint (§4.1).
//!
//! Deliberately parses the body into a dynamic JSON object rather than a
//! typed struct — a PBX dialect the broker doesn't know about yet must
//! still round-trip every field it sends.

use crate::event::TelephonyEvent;
use crate::supervisor::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;

pub async fn post_events(State(state): State<AppState>, body: Bytes) -> Response {
    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return (StatusCode::BAD_REQUEST, "Invalid JSON payload").into_response(),
    };

    let Some(mut event) = TelephonyEvent::from_value(value) else {
        return (StatusCode::BAD_REQUEST, "Invalid JSON payload").into_response();
    };

    if !event.normalize_tenant() {
        return (StatusCode::BAD_REQUEST, "domain is required").into_response();
    }

    match state.publisher.publish(&event).await {
        Ok(sequence) => {
            tracing::info!(
                tenant = ?event.tenant(),
                call_id = ?event.call_id(),
                sequence,
                event = %serde_json::Value::Object(event.as_map().clone()),
                "Event received and published"
            );
            (StatusCode::ACCEPTED, Json(serde_json::json!({"status": "accepted"}))).into_response()
        }
        Err(e) => {
            tracing::error!("publish failed: {}", e);
            (e.status_code(), "failed to publish event").into_response()
        }
    }
}
