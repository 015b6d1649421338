//! HTTP trigger endpoint for an external periodic scheduler.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::error::Error;
use crate::jobs::{JobRunner, TriggerRequest};

/// Shared state for the trigger routes.
#[derive(Clone)]
pub struct AppState {
    pub runner: JobRunner,
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// POST /trigger
///
/// Body `{"action": "<discriminator>"}`. Returns the run's counters, 400 for
/// an unknown action or malformed body, 500 when the store fails.
async fn trigger(State(state): State<AppState>, body: Bytes) -> Response {
    let action = match TriggerRequest::parse(&body) {
        Ok(action) => action,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected trigger");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response();
        }
    };

    match state.runner.run(action).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            tracing::error!(action = %action, error = %e, "Invocation failed");
            let status = match e {
                Error::Trigger(_) => StatusCode::BAD_REQUEST,
                Error::Config(_) | Error::Database(_) | Error::Channel(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            (status, Json(serde_json::json!({"error": e.to_string()}))).into_response()
        }
    }
}

/// Build the trigger routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/trigger", post(trigger))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(state: AppState, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(port, "Trigger server listening");
    axum::serve(listener, router(state)).await
}
