//! REST request handlers.

use super::errors::ApiError;
use super::models::{HealthResponse, HistoryResponse, StatsResponse};
use crate::broadcast::BroadcastHub;
use crate::config::CrashwaveConfig;
use crate::engine::EngineHandle;
use crate::history::HistoryStore;
use crate::ledger::LedgerGateway;
use crate::metrics::EngineMetrics;
use crate::round::{CurrentGame, PlayerId};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

const DEFAULT_HISTORY_LIMIT: usize = 20;
const MAX_HISTORY_LIMIT: usize = 100;

/// Shared state for every handler and the WebSocket layer.
pub struct AppState {
    pub config: CrashwaveConfig,
    pub engine: EngineHandle,
    pub ledger: Arc<LedgerGateway>,
    pub history: Arc<HistoryStore>,
    pub hub: Arc<BroadcastHub>,
    pub metrics: Arc<EngineMetrics>,
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Current round and bet roster, straight from the engine's queue so it
/// is consistent with command ordering.
pub async fn current_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CurrentGame>, ApiError> {
    let current = state
        .engine
        .snapshot()
        .await
        .map_err(|e| ApiError::ServiceUnavailable(e.to_string()))?;
    Ok(Json(current))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub async fn history_handler(
    Query(query): Query<HistoryQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    let history = state.history.recent(limit).map_err(|e| {
        error!(error = %e, "history read failed");
        ApiError::InternalError("history unavailable".to_string())
    })?;
    Ok(Json(HistoryResponse { history }))
}

pub async fn stats_handler(
    Path(player_id): Path<PlayerId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state.history.stats(player_id).map_err(|e| {
        error!(error = %e, player_id, "stats read failed");
        ApiError::InternalError("stats unavailable".to_string())
    })?;
    Ok(Json(StatsResponse { stats }))
}

pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics.encode()
}
