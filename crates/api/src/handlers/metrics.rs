//! Prometheus text-exposition endpoint.

use axum::{extract::State, http::header, response::IntoResponse};

use crate::state::AppState;

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics_registry.metrics_text();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response()
}
