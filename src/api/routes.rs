//! Route definitions.

use super::handlers::{
    current_handler, health_handler, history_handler, metrics_handler, stats_handler, AppState,
};
use super::websocket::websocket_handler;
use axum::{routing::get, Router};
use std::sync::Arc;

/// Build the API router with all endpoints.
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        // Health check
        .route("/health", get(health_handler))
        // Live game channel
        .route("/ws", get(websocket_handler))
        // Round state and records
        .route("/current", get(current_handler))
        .route("/history", get(history_handler))
        .route("/stats/:player_id", get(stats_handler));

    // Prometheus exposition
    if state.config.monitoring.enable_metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.with_state(state)
}
