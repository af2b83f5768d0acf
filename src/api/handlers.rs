use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use prometheus::TEXT_FORMAT;
use serde::Serialize;

use crate::api::server::AppState;

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn get_conditions(State(state): State<AppState>) -> Response {
    json_or_500(&state.manager.get_conditions())
}

pub async fn get_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Serializes `value` as the response body, or answers 500 with the error
/// text if that fails.
fn json_or_500<T: Serialize>(value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
