//! REST response models.

use crate::history::{PlayerStats, RoundHistoryEntry};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Finished rounds, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub history: Vec<RoundHistoryEntry>,
}

/// Lifetime aggregates for one player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub stats: PlayerStats,
}
