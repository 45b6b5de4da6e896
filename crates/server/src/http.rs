//! HTTP surface
//!
//! `/v1/stream` upgrades to the bidirectional WebSocket; the rest is a
//! small control surface: participant settings, health, and Prometheus
//! metrics.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::stream::ws_handler;

/// Unary participant-settings update.
#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantSettingsRequest {
    pub room_id: String,
    pub participant_id: String,
    pub target_language: String,
    pub translation_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantSettingsResponse {
    pub success: bool,
    pub message: String,
}

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    let max_streams = state.settings.server.max_workers;

    Router::new()
        .route("/v1/stream", get(ws_handler))
        .layer(GlobalConcurrencyLimitLayer::new(max_streams))
        .route("/v1/participants/settings", post(update_participant_settings))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    match &state.metrics {
        Some(handle) => Ok(handle.render()),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// Atomically update one participant's target language and translation
/// flag across every session in the room, recomputing each session's
/// buffering strategy.
async fn update_participant_settings(
    State(state): State<AppState>,
    Json(request): Json<ParticipantSettingsRequest>,
) -> Json<ParticipantSettingsResponse> {
    let updated = state
        .update_participant_settings(
            &request.room_id,
            &request.participant_id,
            &request.target_language,
            request.translation_enabled,
        )
        .await;

    tracing::info!(
        room_id = %request.room_id,
        participant_id = %request.participant_id,
        target_language = %request.target_language,
        translation_enabled = request.translation_enabled,
        updated,
        "Participant settings update"
    );

    Json(ParticipantSettingsResponse {
        success: updated,
        message: if updated {
            "Settings updated".to_string()
        } else {
            "Participant not found".to_string()
        },
    })
}
